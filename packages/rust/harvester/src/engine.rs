//! Sequential harvester for the tasks in `data_requirements.json`.
//!
//! Tasks run one at a time with a fixed pause between them. A task that
//! fails is recorded in the report and the run moves on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use url::Url;

use paperflow_shared::{
    HarvestAction, HarvestConfig, HarvestRequirements, PaperflowError, Result,
};

use crate::tables::extract_tables;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one requirements entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HarvestOutcome {
    /// File saved under `raw/`.
    Downloaded {
        url: String,
        path: PathBuf,
        bytes: usize,
        sha256: String,
    },
    /// Tables saved under `processed/`.
    TablesSaved { url: String, paths: Vec<PathBuf> },
    /// Reminder for data the user has to find by hand.
    ManualSearch {
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    /// Inactive, missing a URL, or of an unknown type.
    Skipped { reason: String },
    Failed { url: String, error: String },
}

/// Summary of a harvest run, one outcome per requirements entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub outcomes: Vec<HarvestOutcome>,
}

impl HarvestReport {
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, HarvestOutcome::Failed { .. }))
            .count()
    }

    /// Number of tasks that actually ran (not skipped).
    pub fn executed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, HarvestOutcome::Skipped { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// HTTP harvester writing into `<crawled_dir>/raw` and `<crawled_dir>/processed`.
pub struct Harvester {
    client: Client,
    raw_dir: PathBuf,
    processed_dir: PathBuf,
    delay: Duration,
}

impl Harvester {
    /// Build the HTTP client and create the output directories.
    pub fn new(config: &HarvestConfig, crawled_dir: &Path) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperflowError::Network(format!("failed to build HTTP client: {e}")))?;

        let raw_dir = crawled_dir.join("raw");
        let processed_dir = crawled_dir.join("processed");
        for dir in [&raw_dir, &processed_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PaperflowError::io(dir, e))?;
        }

        Ok(Self {
            client,
            raw_dir,
            processed_dir,
            delay: Duration::from_millis(config.delay_ms),
        })
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Run every active task in order.
    #[instrument(skip_all, fields(tasks = requirements.tasks.len()))]
    pub async fn run(&self, requirements: &HarvestRequirements) -> HarvestReport {
        let mut report = HarvestReport::default();
        let active = requirements.tasks.iter().filter(|t| t.active).count();

        if active == 0 {
            warn!("no active harvest tasks; set \"active\": true in the requirements file");
        } else {
            info!(active, "starting harvest");
        }

        let mut ran = 0usize;
        for task in &requirements.tasks {
            if !task.active {
                report.outcomes.push(HarvestOutcome::Skipped {
                    reason: format!("inactive {} task", task.kind),
                });
                continue;
            }

            if ran > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            ran += 1;

            let outcome = self.execute(task.action()).await;
            if let HarvestOutcome::Failed { url, error } = &outcome {
                warn!(%url, %error, "harvest task failed");
            }
            report.outcomes.push(outcome);
        }

        info!(
            executed = report.executed(),
            failed = report.failures(),
            "harvest finished"
        );
        report
    }

    async fn execute(&self, action: HarvestAction) -> HarvestOutcome {
        match action {
            HarvestAction::DirectDownload { url, save_name } => {
                match self.download(&url, &save_name).await {
                    Ok(outcome) => outcome,
                    Err(e) => HarvestOutcome::Failed {
                        url,
                        error: e.to_string(),
                    },
                }
            }
            HarvestAction::ScrapeTables { url, save_prefix } => {
                match self.scrape_tables(&url, &save_prefix).await {
                    Ok(outcome) => outcome,
                    Err(e) => HarvestOutcome::Failed {
                        url,
                        error: e.to_string(),
                    },
                }
            }
            HarvestAction::ManualSearch { query, notes } => {
                info!(%query, notes = notes.as_deref().unwrap_or(""), "manual search reminder: please look this up by hand");
                HarvestOutcome::ManualSearch { query, notes }
            }
            HarvestAction::MissingUrl => HarvestOutcome::Skipped {
                reason: "task has no url".into(),
            },
            HarvestAction::Unknown(kind) => {
                warn!(%kind, "unknown harvest task type");
                HarvestOutcome::Skipped {
                    reason: format!("unknown task type: {kind}"),
                }
            }
        }
    }

    /// GET `url` and store the body as `raw/<save_name>`.
    async fn download(&self, url: &str, save_name: &str) -> Result<HarvestOutcome> {
        let url = parse_url(url)?;
        info!(%url, "downloading");

        let bytes = self.fetch(&url).await?;
        let path = self.raw_dir.join(safe_file_name(save_name, "downloaded_file.dat"));
        std::fs::write(&path, &bytes).map_err(|e| PaperflowError::io(&path, e))?;

        info!(path = %path.display(), bytes = bytes.len(), "saved download");
        Ok(HarvestOutcome::Downloaded {
            url: url.to_string(),
            sha256: compute_hash(&bytes),
            bytes: bytes.len(),
            path,
        })
    }

    /// GET `url` and store each HTML table as `processed/<prefix>_<i>.csv`.
    async fn scrape_tables(&self, url: &str, prefix: &str) -> Result<HarvestOutcome> {
        let url = parse_url(url)?;
        info!(%url, "scraping tables");

        let bytes = self.fetch(&url).await?;
        let html = String::from_utf8_lossy(&bytes);
        let tables = extract_tables(&html);
        if tables.is_empty() {
            return Err(PaperflowError::parse(format!("no tables found at {url}")));
        }

        let prefix = safe_file_name(prefix, "table");
        let mut paths = Vec::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            let path = self.processed_dir.join(format!("{prefix}_{i}.csv"));
            table.write_csv(&path)?;
            debug!(path = %path.display(), rows = table.rows.len(), "saved table");
            paths.push(path);
        }

        info!(count = paths.len(), "saved tables");
        Ok(HarvestOutcome::TablesSaved {
            url: url.to_string(),
            paths,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| PaperflowError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperflowError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PaperflowError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(body.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Only http(s) URLs are fetched.
fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| PaperflowError::validation(format!("invalid url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(PaperflowError::validation(format!(
            "unsupported url scheme: {other}"
        ))),
    }
}

/// Keep only the final path component so a save name cannot escape its directory.
fn safe_file_name(name: &str, fallback: &str) -> String {
    Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
