//! Paper production stages and their orchestration.
//!
//! This crate ties together harvesting, data preparation, manifest planning,
//! template generation, merging, and Word export into the end-to-end
//! [`pipeline::run_all`] workflow.

pub mod assembler;
pub mod export;
pub mod generator;
pub mod pipeline;
pub mod planner;
pub mod status;

mod templates;

pub use assembler::{CollectedUnits, MergeResult, collect_units, merge};
pub use export::{Converter, ExportResult, export_docx, export_with};
pub use generator::{
    GenerateReport, Placeholders, generate_all, load_placeholders, load_results, render_unit,
    substitute_tokens,
};
pub use pipeline::{
    Deliverable, ProgressReporter, RunSummary, SilentProgress, StageRecord, StageState, run_all,
    run_calc_script,
};
pub use planner::{
    AuditReport, Completeness, audit_problem_dir, build_manifest, generate_manifest,
    init_project, run_audit, verify_completeness,
};
pub use status::{ProjectStatus, project_status};
