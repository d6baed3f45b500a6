//! Shared types, error model, and configuration for ContactScrub.
//!
//! This crate is the foundation depended on by all other ContactScrub crates.
//! It provides:
//! - [`ContactScrubError`] — the unified error type
//! - Domain types ([`Record`], [`Job`], [`JobStatus`], [`JobSummary`], [`JobId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, InferenceSettings, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{ContactScrubError, Result};
pub use types::{Job, JobId, JobStatus, JobSummary, Record};
