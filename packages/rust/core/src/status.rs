//! Snapshot of a project's progress through the stages.

use std::path::Path;

use serde::Serialize;

use paperflow_shared::{ProjectLayout, Result, TaskManifest, TaskStatus};

use crate::planner::{Completeness, verify_completeness};

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub problem_files: usize,
    pub cleaned_datasets: usize,
    /// `None` when `tasks.json` does not exist yet.
    pub tasks: Option<usize>,
    pub generated: usize,
    pub completeness: Completeness,
    pub final_paper: bool,
    pub final_docx: bool,
}

/// Inspect the project directories without changing anything.
pub fn project_status(layout: &ProjectLayout) -> Result<ProjectStatus> {
    let tasks_file = layout.tasks_file();
    let (tasks, generated) = if tasks_file.exists() {
        let manifest = TaskManifest::load(&tasks_file)?;
        let generated = manifest
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Generated)
            .count();
        (Some(manifest.len()), generated)
    } else {
        (None, 0)
    };

    Ok(ProjectStatus {
        problem_files: count_files(layout.problem_dir(), None),
        cleaned_datasets: count_files(&layout.cleaned_dir(), Some("csv")),
        tasks,
        generated,
        completeness: verify_completeness(layout)?,
        final_paper: layout.final_paper().is_file(),
        final_docx: layout.final_docx().is_file(),
    })
}

fn count_files(dir: &Path, extension: Option<&str>) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| match extension {
            Some(ext) => p
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext)),
            None => true,
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperflow_shared::{AppConfig, ManifestConfig};

    #[test]
    fn fresh_project_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(tmp.path(), &AppConfig::default());
        let status = project_status(&layout).unwrap();
        assert_eq!(status.problem_files, 0);
        assert_eq!(status.tasks, None);
        assert!(!status.final_paper);
    }

    #[test]
    fn counts_after_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(tmp.path(), &AppConfig::default());
        std::fs::create_dir_all(layout.problem_dir()).unwrap();
        std::fs::write(layout.problem_dir().join("A.pdf"), b"%PDF").unwrap();
        std::fs::create_dir_all(layout.cleaned_dir()).unwrap();
        std::fs::write(layout.cleaned_dir().join("d_cleaned.csv"), "a\n1\n").unwrap();

        crate::planner::run_audit(&layout, &ManifestConfig::default()).unwrap();
        crate::generator::generate_all(&layout).unwrap();

        let status = project_status(&layout).unwrap();
        assert_eq!(status.problem_files, 1);
        assert_eq!(status.cleaned_datasets, 1);
        assert_eq!(status.tasks, Some(52));
        assert_eq!(status.generated, 52);
        assert_eq!(status.completeness.total, 52);
        assert!(!status.final_docx);
    }
}
