//! Core domain types shared by the paperflow stages.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PaperflowError, Result};
use crate::layout::ProjectLayout;

/// Target length used when a manifest entry omits `target_words`.
pub const DEFAULT_TARGET_WORDS: u32 = 300;

// ---------------------------------------------------------------------------
// Task manifest
// ---------------------------------------------------------------------------

/// Lifecycle of a micro-unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Generated,
    /// Any status string this version does not know, e.g. from a hand-edited manifest.
    #[serde(other)]
    Unknown,
}

/// One entry of `tasks.json`: a micro-unit to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unit identifier, `<CODE>-<n>`.
    #[serde(default)]
    pub id: String,
    /// Section heading the unit belongs to.
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Minimum character count the unit should reach.
    #[serde(default = "default_target_words")]
    pub target_words: u32,
    /// Where the unit's text lives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

fn default_target_words() -> u32 {
    DEFAULT_TARGET_WORDS
}

impl Task {
    /// The unit's text file, falling back to `<units_dir>/<id>.txt`.
    pub fn resolved_path(&self, layout: &ProjectLayout) -> PathBuf {
        match self.file_path.as_deref() {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => {
                let id = if self.id.is_empty() { "unit" } else { &self.id };
                layout.unit_file(id)
            }
        }
    }
}

/// The ordered list of micro-units stored in `tasks.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskManifest {
    pub tasks: Vec<Task>,
}

impl TaskManifest {
    /// Read `tasks.json`. The document must be a JSON array.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PaperflowError::io(path, e))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| PaperflowError::parse(format!("{}: {e}", path.display())))?;

        if !value.is_array() {
            return Err(PaperflowError::validation(format!(
                "{} is not a JSON list",
                path.display()
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| PaperflowError::validation(format!("{}: {e}", path.display())))
    }

    /// Write `tasks.json` pretty-printed, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// One line of `generate_log.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateLogEntry {
    pub id: String,
    /// Length of the written text in characters.
    pub len: usize,
    pub file: String,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Harvest requirements
// ---------------------------------------------------------------------------

/// Root of `data_requirements.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestRequirements {
    #[serde(default)]
    pub tasks: Vec<HarvestTask>,
}

/// A single harvest request, kept loose so unknown types survive parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestTask {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// What a harvest task asks for, after interpreting its `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestAction {
    DirectDownload { url: String, save_name: String },
    ScrapeTables { url: String, save_prefix: String },
    ManualSearch { query: String, notes: Option<String> },
    /// A known type with no URL.
    MissingUrl,
    Unknown(String),
}

impl HarvestTask {
    pub fn action(&self) -> HarvestAction {
        let url = self.url.clone().filter(|u| !u.trim().is_empty());
        match self.kind.as_str() {
            "direct_download" => match url {
                Some(url) => HarvestAction::DirectDownload {
                    url,
                    save_name: self
                        .save_name
                        .clone()
                        .unwrap_or_else(|| "downloaded_file.dat".into()),
                },
                None => HarvestAction::MissingUrl,
            },
            "scrape_tables" => match url {
                Some(url) => HarvestAction::ScrapeTables {
                    url,
                    save_prefix: self.save_prefix.clone().unwrap_or_else(|| "table".into()),
                },
                None => HarvestAction::MissingUrl,
            },
            "manual_search" => HarvestAction::ManualSearch {
                query: self.query.clone().unwrap_or_default(),
                notes: self.notes.clone(),
            },
            other => HarvestAction::Unknown(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write a JSON file (pretty-printed), creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| PaperflowError::validation(format!("JSON serialization failed: {e}")))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PaperflowError::io(parent, e))?;
    }
    std::fs::write(path, json).map_err(|e| PaperflowError::io(path, e))?;
    tracing::debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn task_defaults_fill_missing_fields() {
        let task: Task = serde_json::from_str(r#"{"id": "ABS-1", "section": "摘要"}"#)
            .expect("deserialize");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.target_words, DEFAULT_TARGET_WORDS);
        assert!(task.file_path.is_none());

        let layout = ProjectLayout::new("/p", &AppConfig::default());
        assert_eq!(
            task.resolved_path(&layout),
            PathBuf::from("/p/paper_output/micro_units/ABS-1.txt")
        );
    }

    #[test]
    fn manifest_rejects_non_list() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("tasks.json");
        std::fs::write(&path, r#"{"id": "ABS-1"}"#).expect("write");

        let err = TaskManifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("not a JSON list"));
    }

    #[test]
    fn manifest_save_and_load() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("out").join("tasks.json");
        let manifest = TaskManifest {
            tasks: vec![Task {
                id: "REF-1".into(),
                section: "参考文献".into(),
                status: TaskStatus::Generated,
                target_words: 270,
                file_path: Some("micro_units/REF-1.txt".into()),
            }],
        };
        manifest.save(&path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"status\": \"generated\""));
        assert!(raw.contains("参考文献"), "non-ASCII must not be escaped");

        assert_eq!(TaskManifest::load(&path).expect("load"), manifest);
    }

    #[test]
    fn unknown_status_does_not_break_loading() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "ABS-1", "section": "摘要", "status": "in_review"},
                {"id": "ABS-2", "section": "摘要", "status": "generated"}
            ]"#,
        )
        .expect("write");

        let manifest = TaskManifest::load(&path).expect("load");
        assert_eq!(manifest.tasks[0].status, TaskStatus::Unknown);
        assert_eq!(manifest.tasks[1].status, TaskStatus::Generated);
    }

    #[test]
    fn harvest_task_actions() {
        let reqs: HarvestRequirements = serde_json::from_str(
            r#"{"tasks": [
                {"type": "direct_download", "url": "https://example.com/a.csv", "active": true},
                {"type": "scrape_tables", "url": "https://example.com/t", "save_prefix": "gdp"},
                {"type": "manual_search", "query": "半导体产量"},
                {"type": "direct_download"},
                {"type": "ftp_mirror", "url": "ftp://x"}
            ]}"#,
        )
        .expect("parse");

        assert_eq!(
            reqs.tasks[0].action(),
            HarvestAction::DirectDownload {
                url: "https://example.com/a.csv".into(),
                save_name: "downloaded_file.dat".into(),
            }
        );
        assert!(reqs.tasks[0].active);
        assert!(!reqs.tasks[1].active);
        assert!(matches!(
            reqs.tasks[1].action(),
            HarvestAction::ScrapeTables { ref save_prefix, .. } if save_prefix == "gdp"
        ));
        assert!(matches!(reqs.tasks[2].action(), HarvestAction::ManualSearch { .. }));
        assert_eq!(reqs.tasks[3].action(), HarvestAction::MissingUrl);
        assert_eq!(reqs.tasks[4].action(), HarvestAction::Unknown("ftp_mirror".into()));
    }
}
