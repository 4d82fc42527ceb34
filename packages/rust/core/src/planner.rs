//! Project audit and task manifest planning.
//!
//! The audit gate refuses to plan a paper for an empty problem directory.
//! Past the gate, the manifest lists every micro-unit of every configured
//! section, and a completeness check reports how many units already reach
//! their target length.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use paperflow_shared::{
    ManifestConfig, PaperflowError, ProjectLayout, Result, Task, TaskManifest, TaskStatus,
};

/// Units at or above their target length, out of the manifest total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Completeness {
    pub ok: usize,
    pub total: usize,
    /// Characters across every unit file that exists.
    pub total_chars: usize,
}

/// Result of [`run_audit`].
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub manifest_path: PathBuf,
    pub tasks: usize,
    pub completeness: Completeness,
}

/// Create the problem, output, and micro-unit directories.
pub fn init_project(layout: &ProjectLayout) -> Result<()> {
    for dir in [
        layout.problem_dir().to_path_buf(),
        layout.output_dir().to_path_buf(),
        layout.units_dir(),
    ] {
        std::fs::create_dir_all(&dir).map_err(|e| PaperflowError::io(&dir, e))?;
    }
    debug!(root = %layout.root().display(), "project directories ready");
    Ok(())
}

/// Fail unless the problem directory exists and has at least one entry.
pub fn audit_problem_dir(layout: &ProjectLayout) -> Result<()> {
    let dir = layout.problem_dir();
    let has_entries = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);

    if !has_entries {
        warn!(dir = %dir.display(), "problem directory is empty");
        return Err(PaperflowError::Audit(format!(
            "{} is empty; add the problem statement and attachments before continuing",
            dir.display()
        )));
    }
    Ok(())
}

/// Build the manifest in memory: one pending task per unit, in section order.
pub fn build_manifest(layout: &ProjectLayout, config: &ManifestConfig) -> TaskManifest {
    let tasks = config
        .sections
        .iter()
        .flat_map(|section| {
            (1..=section.units).map(move |i| {
                let id = format!("{}-{i}", section.code);
                Task {
                    file_path: Some(layout.unit_file(&id).to_string_lossy().into_owned()),
                    id,
                    section: section.name.clone(),
                    status: TaskStatus::Pending,
                    target_words: config.target_words,
                }
            })
        })
        .collect();
    TaskManifest { tasks }
}

/// Build the manifest and write it to `tasks.json`.
///
/// Re-running with the same layout and config rewrites an identical file.
#[instrument(skip_all, fields(sections = config.sections.len()))]
pub fn generate_manifest(layout: &ProjectLayout, config: &ManifestConfig) -> Result<TaskManifest> {
    let manifest = build_manifest(layout, config);
    let path = layout.tasks_file();
    manifest.save(&path)?;
    info!(path = %path.display(), tasks = manifest.len(), "wrote task manifest");
    Ok(manifest)
}

/// Count units whose file reaches `target_words` characters.
///
/// A missing manifest counts as zero units.
pub fn verify_completeness(layout: &ProjectLayout) -> Result<Completeness> {
    let path = layout.tasks_file();
    if !path.exists() {
        return Ok(Completeness::default());
    }

    let manifest = TaskManifest::load(&path)?;
    let mut report = Completeness {
        total: manifest.len(),
        ..Completeness::default()
    };

    for task in &manifest.tasks {
        let file = task.resolved_path(layout);
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let chars = content.chars().count();
        report.total_chars += chars;
        if chars >= task.target_words as usize {
            report.ok += 1;
        }
    }

    Ok(report)
}

/// Initialize the project, pass the audit gate, write the manifest, and
/// report completeness.
#[instrument(skip_all, fields(root = %layout.root().display()))]
pub fn run_audit(layout: &ProjectLayout, config: &ManifestConfig) -> Result<AuditReport> {
    init_project(layout)?;
    audit_problem_dir(layout)?;

    let manifest = generate_manifest(layout, config)?;
    let completeness = verify_completeness(layout)?;

    info!(
        ok = completeness.ok,
        total = completeness.total,
        chars = completeness.total_chars,
        "audit complete"
    );

    Ok(AuditReport {
        manifest_path: layout.tasks_file(),
        tasks: manifest.len(),
        completeness,
    })
}
