//! Shared test utilities for kinetrace integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with temp folders and a file database
//! - `ScriptedRunner`, a process runner that plays each stage from a script
//! - Builder patterns for creating test configurations programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedRunner, StageBehaviour, TestHarness};
