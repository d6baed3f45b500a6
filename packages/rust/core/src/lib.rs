//! Core orchestration for ContactScrub: the job pipeline.

pub mod pipeline;

pub use pipeline::{JobOutcome, ProgressReporter, SilentProgress, process_job};
