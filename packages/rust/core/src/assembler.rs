//! Merge stage: micro-units → `final_paper.md` + `ref_check.md`.
//!
//! Units are concatenated in manifest order under `## <section>` headings,
//! whitespace is tidied, figures/tables/equations/citations are renumbered,
//! and a table of contents is prepended. Both output files are written
//! atomically (temp file, then rename).

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use paperflow_markdown::{MarkerCounts, UnresolvedRef, generate_toc, ref_check_report, renumber, tidy};
use paperflow_shared::{PaperflowError, ProjectLayout, Result, TaskManifest};

/// Units gathered for merging, before any post-processing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedUnits {
    /// Section headings and unit texts, in output order.
    pub blocks: Vec<String>,
    /// Ids of manifest units whose file does not exist.
    pub missing: Vec<String>,
    pub sections: usize,
}

/// Output of [`merge`].
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub final_paper: PathBuf,
    pub ref_report: PathBuf,
    pub units: usize,
    pub sections: usize,
    pub missing: Vec<String>,
    /// Unresolved references, with line numbers in `final_paper.md`.
    pub unresolved: Vec<UnresolvedRef>,
    pub counts: MarkerCounts,
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Read every micro-unit in order.
///
/// With a manifest, a `## <section>` heading precedes each run of units from
/// the same section and a missing file becomes a `(缺失)` stub. Without one,
/// every `*.txt` in the units directory is read in order of file stem.
pub fn collect_units(layout: &ProjectLayout) -> Result<CollectedUnits> {
    let tasks_file = layout.tasks_file();
    if tasks_file.exists() {
        collect_from_manifest(layout, &TaskManifest::load(&tasks_file)?)
    } else {
        warn!(path = %tasks_file.display(), "no task manifest, merging unit files by name");
        collect_from_dir(&layout.units_dir())
    }
}

fn collect_from_manifest(layout: &ProjectLayout, manifest: &TaskManifest) -> Result<CollectedUnits> {
    let mut collected = CollectedUnits::default();
    let mut current_section: Option<&str> = None;

    for task in &manifest.tasks {
        if current_section != Some(task.section.as_str()) {
            collected.blocks.push(format!("## {}\n", task.section));
            collected.sections += 1;
            current_section = Some(task.section.as_str());
        }

        let path = task.resolved_path(layout);
        match std::fs::read_to_string(&path) {
            Ok(text) => collected.blocks.push(text.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(id = %task.id, path = %path.display(), "unit file missing");
                collected.blocks.push(format!("【{}】\n(缺失)\n", task.id));
                collected.missing.push(task.id.clone());
            }
            Err(e) => return Err(PaperflowError::io(&path, e)),
        }
    }

    Ok(collected)
}

fn collect_from_dir(dir: &Path) -> Result<CollectedUnits> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(PaperflowError::io(dir, e)),
    };
    files.sort_by(|a, b| a.file_stem().cmp(&b.file_stem()));

    let mut collected = CollectedUnits::default();
    for path in files {
        let text = std::fs::read_to_string(&path).map_err(|e| PaperflowError::io(&path, e))?;
        collected.blocks.push(text.trim().to_string());
    }
    Ok(collected)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Assemble the paper and its broken-reference report.
#[instrument(skip_all, fields(root = %layout.root().display()))]
pub fn merge(layout: &ProjectLayout) -> Result<MergeResult> {
    let collected = collect_units(layout)?;
    let units = collected.blocks.len() - collected.sections;
    if units == 0 {
        warn!("no micro-units found, the merged paper will be empty");
    }

    let body = tidy(&collected.blocks.join("\n\n"));
    let numbered = renumber(&body);
    let toc = generate_toc(&numbered.text);

    let offset = toc.matches('\n').count();
    let unresolved: Vec<UnresolvedRef> = numbered
        .unresolved
        .into_iter()
        .map(|mut r| {
            r.line += offset;
            r
        })
        .collect();

    let paper = format!("{toc}{}", numbered.text);
    let report = ref_check_report(&unresolved);

    let final_paper = layout.final_paper();
    let ref_report = layout.ref_report();
    let sha256 = write_atomic(&final_paper, &paper)?;
    write_atomic(&ref_report, &report)?;

    if !unresolved.is_empty() {
        warn!(count = unresolved.len(), report = %ref_report.display(), "unresolved references");
    }
    info!(
        units,
        sections = collected.sections,
        figures = numbered.counts.figures,
        tables = numbered.counts.tables,
        equations = numbered.counts.equations,
        citations = numbered.counts.citations,
        path = %final_paper.display(),
        "merged paper"
    );

    Ok(MergeResult {
        final_paper,
        ref_report,
        units,
        sections: collected.sections,
        missing: collected.missing,
        unresolved,
        counts: numbered.counts,
        sha256,
    })
}

/// Write `content` next to `target` under a dot-prefixed temp name, then
/// rename it into place. Returns the SHA-256 of the content.
pub(crate) fn write_atomic(target: &Path, content: &str) -> Result<String> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| PaperflowError::io(dir, e))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let temp = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| PaperflowError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| PaperflowError::io(target, e))?;

    let hash = compute_hash(content.as_bytes());
    debug!(path = %target.display(), size = content.len(), "wrote file");
    Ok(hash)
}

pub(crate) fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperflow_shared::{AppConfig, Task, TaskStatus};

    fn setup() -> (tempfile::TempDir, ProjectLayout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(tmp.path(), &AppConfig::default());
        std::fs::create_dir_all(layout.units_dir()).unwrap();
        (tmp, layout)
    }

    fn task(id: &str, section: &str) -> Task {
        Task {
            id: id.into(),
            section: section.into(),
            status: TaskStatus::Generated,
            target_words: 10,
            file_path: None,
        }
    }

    fn write_manifest(layout: &ProjectLayout, tasks: Vec<Task>) {
        TaskManifest { tasks }.save(&layout.tasks_file()).unwrap();
    }

    #[test]
    fn sections_headings_and_missing_stub() {
        let (_tmp, layout) = setup();
        write_manifest(
            &layout,
            vec![task("ABS-1", "摘要"), task("ABS-2", "摘要"), task("INTRO-1", "问题重述")],
        );
        std::fs::write(layout.unit_file("ABS-1"), "  摘要正文  \n\n").unwrap();
        std::fs::write(layout.unit_file("INTRO-1"), "重述正文").unwrap();

        let collected = collect_units(&layout).unwrap();
        assert_eq!(
            collected.blocks,
            vec![
                "## 摘要\n".to_string(),
                "摘要正文".into(),
                "【ABS-2】\n(缺失)\n".into(),
                "## 问题重述\n".into(),
                "重述正文".into(),
            ]
        );
        assert_eq!(collected.missing, vec!["ABS-2".to_string()]);
        assert_eq!(collected.sections, 2);
    }

    #[test]
    fn without_manifest_units_are_sorted_by_stem() {
        let (_tmp, layout) = setup();
        std::fs::write(layout.unit_file("B-1"), "second").unwrap();
        std::fs::write(layout.unit_file("A-1"), "first").unwrap();
        std::fs::write(layout.units_dir().join("notes.md"), "ignored").unwrap();

        let collected = collect_units(&layout).unwrap();
        assert_eq!(collected.blocks, vec!["first".to_string(), "second".into()]);
        assert_eq!(collected.sections, 0);
    }

    #[test]
    fn merge_numbers_and_reports_with_final_line_numbers() {
        let (_tmp, layout) = setup();
        write_manifest(&layout, vec![task("MODEL1-1", "问题一"), task("MODEL1-2", "问题一")]);
        std::fs::write(layout.unit_file("MODEL1-1"), "图5 流程图\n如图5所示。").unwrap();
        std::fs::write(layout.unit_file("MODEL1-2"), "见图9。").unwrap();

        let result = merge(&layout).unwrap();
        assert_eq!(result.units, 2);
        assert_eq!(result.counts.figures, 1);

        let paper = std::fs::read_to_string(&result.final_paper).unwrap();
        assert!(paper.starts_with("# 目录\n\n1. 问题一\n\n## 问题一\n"));
        assert!(paper.contains("图1 流程图\n如图1所示。"));
        assert!(paper.contains("见图9。"));

        assert_eq!(result.unresolved.len(), 1);
        let line = result.unresolved[0].line;
        assert_eq!(paper.lines().nth(line - 1), Some("见图9。"));

        let report = std::fs::read_to_string(&result.ref_report).unwrap();
        assert!(report.contains(&format!("- 断链：图9 被引用但未定义（第 {line} 行）")));
        assert_eq!(result.sha256, compute_hash(paper.as_bytes()));
    }

    #[test]
    fn merge_clean_paper_reports_no_breaks() {
        let (_tmp, layout) = setup();
        write_manifest(&layout, vec![task("CONCL-1", "结论")]);
        std::fs::write(layout.unit_file("CONCL-1"), "结论正文。").unwrap();

        let result = merge(&layout).unwrap();
        assert!(result.unresolved.is_empty());
        let report = std::fs::read_to_string(&result.ref_report).unwrap();
        assert!(report.ends_with("- 未检测到断链\n"));
        assert!(!layout.output_dir().join(".final_paper.md.tmp").exists());
    }
}
