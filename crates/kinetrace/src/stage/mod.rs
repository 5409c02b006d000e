//! External stage invocation.
//!
//! Each ML stage is an opaque external process. This module builds the
//! argument contract for each stage, runs it through a [`ProcessRunner`],
//! and classifies the result. Failures are returned as values; deciding
//! whether the pipeline continues is the orchestrator's job.

pub mod command;
pub mod invoker;
pub mod runner;

pub use command::{StageCommand, StageCommands, StageKind};
pub use invoker::{FailureReason, StageFailure, StageInvoker, StageResult, StageSuccess};
pub use runner::{ProcessOutput, ProcessRunner, SystemProcessRunner};
