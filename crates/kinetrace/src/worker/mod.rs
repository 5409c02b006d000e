pub mod job;
pub mod pool;

pub use job::{Job, RunReport};
pub use pool::{ShutdownHandle, WorkerPool};
