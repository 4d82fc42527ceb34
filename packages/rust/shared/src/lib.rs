//! Shared types, error model, and configuration for paperflow.
//!
//! This crate is the foundation depended on by all other paperflow crates.
//! It provides:
//! - [`PaperflowError`] — the unified error type
//! - Domain types ([`Task`], [`TaskManifest`], [`HarvestRequirements`], ...)
//! - Configuration ([`AppConfig`], config loading) and [`ProjectLayout`]

pub mod config;
pub mod error;
pub mod layout;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CleanConfig, ExportConfig, HarvestConfig, ManifestConfig, PipelineConfig,
    ProjectConfig, SectionSpec, VisualizeConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_config,
};
pub use error::{PaperflowError, Result};
pub use layout::ProjectLayout;
pub use types::{
    DEFAULT_TARGET_WORDS, GenerateLogEntry, HarvestAction, HarvestRequirements, HarvestTask,
    Task, TaskManifest, TaskStatus, write_json,
};
