//! Pipeline orchestration for LessonForge.
//!
//! This crate ties the folder store, text extraction, and curriculum
//! synthesis together into one processing run ([`Pipeline::run`]).

pub mod aggregate;
pub mod pipeline;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use aggregate::aggregate;
pub use pipeline::{Pipeline, ProcessResult, ProgressReporter, SilentProgress};
