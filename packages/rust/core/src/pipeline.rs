//! End-to-end `run` pipeline: harvest → clean/visualize → calc → audit →
//! generate → merge → export.
//!
//! Harvest, data preparation, the calculation script, and export are
//! optional: a failure there is recorded and logged, and the run continues.
//! Audit, generate, and merge are mandatory: a failure stops the run after
//! `run_summary.json` has been written.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use paperflow_dataprep::{clean_all, visualize_all};
use paperflow_harvester::{Harvester, load_requirements};
use paperflow_shared::{AppConfig, PaperflowError, PipelineConfig, ProjectLayout, Result, write_json};

use crate::assembler::{compute_hash, merge};
use crate::export::export_docx;
use crate::generator::generate_all;
use crate::planner::run_audit;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts.
    fn stage(&self, name: &str);
    /// Called when a stage ends, whatever its outcome.
    fn stage_finished(&self, record: &StageRecord);
    /// Called once the summary has been written.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _name: &str) {}
    fn stage_finished(&self, _record: &StageRecord) {}
    fn done(&self, _summary: &RunSummary) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Ok,
    /// Finished, but some items failed.
    Warned,
    Skipped,
    Failed,
}

/// Outcome of one stage in `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub name: String,
    pub state: StageState,
    pub detail: String,
    pub elapsed_ms: u64,
}

/// A produced file with its checksum.
#[derive(Debug, Clone, Serialize)]
pub struct Deliverable {
    /// Path relative to the project root.
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Contents of `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
    pub deliverables: Vec<Deliverable>,
}

impl RunSummary {
    pub fn failed(&self) -> bool {
        self.stages.iter().any(|s| s.state == StageState::Failed)
    }
}

const STAGE_HARVEST: &str = "harvest";
const STAGE_PREPARE: &str = "clean+visualize";
const STAGE_CALC: &str = "calc";
const STAGE_AUDIT: &str = "audit";
const STAGE_GENERATE: &str = "generate";
const STAGE_MERGE: &str = "merge";
const STAGE_EXPORT: &str = "export";

/// Collects stage records and forwards them to the progress reporter.
struct StageLog<'a> {
    progress: &'a dyn ProgressReporter,
    records: Vec<StageRecord>,
}

impl StageLog<'_> {
    fn start(&self, name: &str) -> Instant {
        info!(stage = name, "stage started");
        self.progress.stage(name);
        Instant::now()
    }

    fn finish(&mut self, name: &str, started: Instant, state: StageState, detail: String) {
        let record = StageRecord {
            name: name.to_string(),
            state,
            detail,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        match state {
            StageState::Ok | StageState::Skipped => {
                info!(stage = name, state = ?state, detail = %record.detail, "stage finished")
            }
            StageState::Warned | StageState::Failed => {
                warn!(stage = name, state = ?state, detail = %record.detail, "stage finished")
            }
        }
        self.progress.stage_finished(&record);
        self.records.push(record);
    }
}

/// Run every stage in order and write `run_summary.json`.
#[instrument(skip_all, fields(root = %root.display()))]
pub async fn run_all(
    root: &Path,
    config: &AppConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let started_at = Utc::now();
    let layout = ProjectLayout::new(root, config);
    let mut log = StageLog {
        progress,
        records: Vec::new(),
    };

    info!("starting paper pipeline");

    // --- Stage 1: Harvest ---
    let t = log.start(STAGE_HARVEST);
    if config.pipeline.skip_harvest {
        log.finish(STAGE_HARVEST, t, StageState::Skipped, "disabled in config".into());
    } else {
        let (state, detail) = match harvest(&layout, config).await {
            Ok((executed, 0)) => (StageState::Ok, format!("{executed} tasks")),
            Ok((executed, failed)) => (StageState::Warned, format!("{failed} of {executed} tasks failed")),
            Err(e) => (StageState::Failed, e.to_string()),
        };
        log.finish(STAGE_HARVEST, t, state, detail);
    }

    // --- Stage 2: Clean + visualize ---
    let t = log.start(STAGE_PREPARE);
    let (state, detail) = match prepare_data(&layout, config) {
        Ok((cleaned, 0, charts)) => (StageState::Ok, format!("{cleaned} datasets, {charts} charts")),
        Ok((cleaned, failed, charts)) => (
            StageState::Warned,
            format!("{cleaned} datasets, {failed} failed, {charts} charts"),
        ),
        Err(e) => (StageState::Failed, e.to_string()),
    };
    log.finish(STAGE_PREPARE, t, state, detail);

    // --- Stage 3: Calculation script ---
    let t = log.start(STAGE_CALC);
    let (state, detail) = match run_calc_script(root, &config.pipeline).await {
        Ok(true) => (StageState::Ok, config.pipeline.calc_script.clone()),
        Ok(false) => (StageState::Skipped, format!("{} not found", config.pipeline.calc_script)),
        Err(e) => (StageState::Failed, e.to_string()),
    };
    log.finish(STAGE_CALC, t, state, detail);

    // --- Stages 4-6: mandatory ---
    let t = log.start(STAGE_AUDIT);
    match run_audit(&layout, &config.manifest) {
        Ok(report) => log.finish(
            STAGE_AUDIT,
            t,
            StageState::Ok,
            format!(
                "{} tasks, {}/{} complete",
                report.tasks, report.completeness.ok, report.completeness.total
            ),
        ),
        Err(e) => return abort(log, &layout, started_at, STAGE_AUDIT, t, e),
    }

    let t = log.start(STAGE_GENERATE);
    match generate_all(&layout) {
        Ok(report) => log.finish(STAGE_GENERATE, t, StageState::Ok, format!("{} units", report.generated)),
        Err(e) => return abort(log, &layout, started_at, STAGE_GENERATE, t, e),
    }

    let t = log.start(STAGE_MERGE);
    match merge(&layout) {
        Ok(result) if result.unresolved.is_empty() => {
            log.finish(STAGE_MERGE, t, StageState::Ok, format!("{} units", result.units))
        }
        Ok(result) => log.finish(
            STAGE_MERGE,
            t,
            StageState::Warned,
            format!("{} units, {} unresolved references", result.units, result.unresolved.len()),
        ),
        Err(e) => return abort(log, &layout, started_at, STAGE_MERGE, t, e),
    }

    // --- Stage 7: Export ---
    let t = log.start(STAGE_EXPORT);
    let (state, detail) = match export_docx(&layout, &config.export) {
        Ok(result) => (StageState::Ok, format!("via {}", result.converter)),
        Err(e) => (StageState::Failed, e.to_string()),
    };
    log.finish(STAGE_EXPORT, t, state, detail);

    let summary = finish(log.records, &layout, started_at)?;
    progress.done(&summary);
    info!(deliverables = summary.deliverables.len(), "pipeline complete");
    Ok(summary)
}

/// Record a mandatory stage failure, write the summary, and return the error.
fn abort(
    mut log: StageLog<'_>,
    layout: &ProjectLayout,
    started_at: DateTime<Utc>,
    stage: &str,
    started: Instant,
    error: PaperflowError,
) -> Result<RunSummary> {
    log.finish(stage, started, StageState::Failed, error.to_string());
    let progress = log.progress;
    match finish(log.records, layout, started_at) {
        Ok(summary) => progress.done(&summary),
        Err(e) => warn!(error = %e, "could not write run summary"),
    }
    Err(error)
}

fn finish(
    stages: Vec<StageRecord>,
    layout: &ProjectLayout,
    started_at: DateTime<Utc>,
) -> Result<RunSummary> {
    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        stages,
        deliverables: collect_deliverables(layout),
    };
    write_json(&layout.run_summary(), &summary)?;
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Optional stages
// ---------------------------------------------------------------------------

/// Returns `(executed, failed)` task counts.
async fn harvest(layout: &ProjectLayout, config: &AppConfig) -> Result<(usize, usize)> {
    let requirements = load_requirements(&layout.root().join(&config.harvest.requirements_file))?;
    let harvester = Harvester::new(&config.harvest, layout.crawled_dir())?;
    let report = harvester.run(&requirements).await;
    Ok((report.executed(), report.failures()))
}

/// Returns `(cleaned, failed, charts)`.
fn prepare_data(layout: &ProjectLayout, config: &AppConfig) -> Result<(usize, usize, usize)> {
    let cleaned_dir = layout.cleaned_dir();
    let cleaned = clean_all(layout.root(), &config.clean, &cleaned_dir)?;
    let charts = visualize_all(&cleaned_dir, &layout.figures_dir(), &config.visualize)?;
    Ok((cleaned.cleaned(), cleaned.failed(), charts.chart_count()))
}

/// Run the user's calculation script from the project root.
///
/// Returns `Ok(false)` when the script does not exist.
pub async fn run_calc_script(root: &Path, config: &PipelineConfig) -> Result<bool> {
    let script = root.join(&config.calc_script);
    if !script.is_file() {
        debug!(path = %script.display(), "no calculation script");
        return Ok(false);
    }

    info!(interpreter = %config.calc_interpreter, script = %script.display(), "running calculation script");
    let status = tokio::process::Command::new(&config.calc_interpreter)
        .arg(&script)
        .current_dir(root)
        .status()
        .await
        .map_err(|e| {
            PaperflowError::Subprocess(format!(
                "failed to run {}: {e}. Is `{}` installed?",
                script.display(),
                config.calc_interpreter
            ))
        })?;

    if !status.success() {
        return Err(PaperflowError::Subprocess(format!(
            "{} exited with {status}",
            script.display()
        )));
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Deliverables
// ---------------------------------------------------------------------------

fn collect_deliverables(layout: &ProjectLayout) -> Vec<Deliverable> {
    let candidates: [PathBuf; 5] = [
        layout.tasks_file(),
        layout.generate_log_file(),
        layout.final_paper(),
        layout.ref_report(),
        layout.final_docx(),
    ];

    candidates
        .iter()
        .filter_map(|path| {
            let bytes = std::fs::read(path).ok()?;
            let rel = path.strip_prefix(layout.root()).unwrap_or(path);
            Some(Deliverable {
                path: rel.to_string_lossy().replace('\\', "/"),
                sha256: compute_hash(&bytes),
                size_bytes: bytes.len() as u64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.pipeline.skip_harvest = true;
        config.export.converter = "builtin".into();
        config.manifest.target_words = 5;
        config
    }

    #[tokio::test]
    async fn full_run_without_harvest() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("problem_files")).unwrap();
        std::fs::write(root.join("problem_files/data.csv"), "x,y\n1,2\n3,\n5,6\n").unwrap();
        std::fs::write(root.join("placeholders.toml"), "论文题目 = \"测试\"\n").unwrap();

        let summary = run_all(root, &offline_config(), &SilentProgress).await.unwrap();

        let states: Vec<(&str, StageState)> =
            summary.stages.iter().map(|s| (s.name.as_str(), s.state)).collect();
        assert_eq!(
            states,
            vec![
                (STAGE_HARVEST, StageState::Skipped),
                (STAGE_PREPARE, StageState::Ok),
                (STAGE_CALC, StageState::Skipped),
                (STAGE_AUDIT, StageState::Ok),
                (STAGE_GENERATE, StageState::Ok),
                (STAGE_MERGE, StageState::Ok),
                (STAGE_EXPORT, StageState::Ok),
            ]
        );
        assert!(!summary.failed());
        assert!(root.join("paper_output/data_cleaned/data_cleaned.csv").is_file());

        let paper = summary
            .deliverables
            .iter()
            .find(|d| d.path == "paper_output/final_paper.md")
            .unwrap();
        let bytes = std::fs::read(root.join(&paper.path)).unwrap();
        assert_eq!(paper.sha256, compute_hash(&bytes));
        assert_eq!(paper.size_bytes, bytes.len() as u64);
        assert!(summary.deliverables.iter().any(|d| d.path.ends_with("final_paper.docx")));
        assert!(root.join("paper_output/run_summary.json").is_file());
    }

    #[tokio::test]
    async fn audit_failure_aborts_after_writing_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        let err = run_all(root, &offline_config(), &SilentProgress).await.unwrap_err();
        assert!(matches!(err, PaperflowError::Audit(_)));

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(root.join("paper_output/run_summary.json")).unwrap(),
        )
        .unwrap();
        let stages = summary["stages"].as_array().unwrap();
        let last = stages.last().unwrap();
        assert_eq!(last["name"], "audit");
        assert_eq!(last["state"], "failed");
        assert!(!root.join("paper_output/final_paper.md").exists());
    }

    #[tokio::test]
    async fn missing_calc_script_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let ran = run_calc_script(tmp.path(), &PipelineConfig::default()).await.unwrap();
        assert!(!ran);
    }
}
