//! External data harvesting.
//!
//! This crate provides:
//! - [`requirements`] — loading (or scaffolding) `data_requirements.json`
//! - [`engine`] — the HTTP harvester that downloads files and scrapes tables
//! - [`tables`] — HTML `<table>` extraction into [`paperflow_dataprep::Table`]

pub mod engine;
pub mod requirements;
pub mod tables;

pub use engine::{HarvestOutcome, HarvestReport, Harvester};
pub use requirements::{load_requirements, requirements_template};
pub use tables::extract_tables;
