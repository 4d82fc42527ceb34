//! Micro-unit generation from fixed templates.
//!
//! Each task in `tasks.json` is rendered to its own text file: a header
//! naming the section and unit, then a body taken from the placeholder
//! dictionary or the built-in templates, with `{{dotted.path}}` tokens
//! filled from the calculation results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use paperflow_shared::{
    GenerateLogEntry, PaperflowError, ProjectLayout, Result, Task, TaskManifest, TaskStatus,
    write_json,
};

use crate::templates::{TITLE_KEY, fallback_body, slot_for};

/// Placeholder name → literal text.
pub type Placeholders = BTreeMap<String, String>;

/// Rendered in place of a token whose path is absent from the results.
const MISSING_VALUE: &str = "—";

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("valid regex"));

/// Result of [`generate_all`].
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub generated: usize,
    pub units_dir: PathBuf,
    pub log_file: PathBuf,
    pub entries: Vec<GenerateLogEntry>,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Load the placeholder dictionary (a flat TOML table).
///
/// A missing file yields an empty dictionary. Numbers and booleans are
/// stringified; nested tables and arrays are ignored.
pub fn load_placeholders(path: &Path) -> Result<Placeholders> {
    if !path.exists() {
        warn!(path = %path.display(), "placeholder file not found, using built-in text");
        return Ok(Placeholders::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| PaperflowError::io(path, e))?;
    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| PaperflowError::parse(format!("{}: {e}", path.display())))?;

    let mut placeholders = Placeholders::new();
    for (key, value) in table {
        let text = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => {
                debug!(%key, kind = other.type_str(), "ignoring non-scalar placeholder");
                continue;
            }
        };
        placeholders.insert(key, text);
    }

    debug!(count = placeholders.len(), "loaded placeholders");
    Ok(placeholders)
}

/// Load the calculation results. Anything but a readable JSON object is empty.
pub fn load_results(path: &Path) -> Map<String, Value> {
    let Ok(content) = std::fs::read_to_string(path) else {
        debug!(path = %path.display(), "no calculation results");
        return Map::new();
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(path = %path.display(), "calculation results are not a JSON object, ignoring");
            Map::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot parse calculation results, ignoring");
            Map::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render one micro-unit: `【section｜id】` header, then the body.
///
/// The body is, in order of preference: the placeholder keyed by the unit
/// id, the section's named placeholder for the unit, the built-in default
/// for that slot, or a generic in-progress line.
pub fn render_unit(task: &Task, placeholders: &Placeholders, results: &Map<String, Value>) -> String {
    let header = format!("【{}｜{}】\n", task.section, task.id);

    let body = if let Some(text) = placeholders.get(&task.id) {
        text.clone()
    } else if let Some(slot) = slot_for(
        &task.section,
        &task.id,
        placeholders.get(TITLE_KEY).map(String::as_str),
    ) {
        let text = placeholders.get(slot.key).cloned().unwrap_or(slot.default);
        format!("{}{text}", slot.prefix)
    } else {
        fallback_body(&task.section, &task.id)
    };

    format!("{header}{}\n", substitute_tokens(&body, results))
}

/// Replace `{{a.b.c}}` tokens with values from `results`.
///
/// Numbers print with four decimals, strings verbatim, and missing or null
/// values as `—`. Numeric path segments index into arrays.
pub fn substitute_tokens(text: &str, results: &Map<String, Value>) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &Captures| {
            lookup(results, &caps[1])
                .map(format_value)
                .unwrap_or_else(|| MISSING_VALUE.to_string())
        })
        .into_owned()
}

fn lookup<'a>(results: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = results.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => MISSING_VALUE.to_string(),
        Value::Number(n) => n
            .as_f64()
            .map(|f| format!("{f:.4}"))
            .unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Stage entry point
// ---------------------------------------------------------------------------

/// Render every task in `tasks.json`, mark it generated, and write
/// `generate_log.json`.
#[instrument(skip_all, fields(root = %layout.root().display()))]
pub fn generate_all(layout: &ProjectLayout) -> Result<GenerateReport> {
    let tasks_file = layout.tasks_file();
    if !tasks_file.exists() {
        return Err(PaperflowError::validation(format!(
            "task manifest not found: {} (run the audit stage first)",
            tasks_file.display()
        )));
    }

    let mut manifest = TaskManifest::load(&tasks_file)?;
    let placeholders = load_placeholders(layout.placeholders_file())?;
    let results = load_results(layout.results_file());

    let units_dir = layout.units_dir();
    std::fs::create_dir_all(&units_dir).map_err(|e| PaperflowError::io(&units_dir, e))?;

    let mut entries = Vec::with_capacity(manifest.len());
    for task in &mut manifest.tasks {
        let path = task.resolved_path(layout);
        let text = render_unit(task, &placeholders, &results);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PaperflowError::io(parent, e))?;
        }
        std::fs::write(&path, &text).map_err(|e| PaperflowError::io(&path, e))?;

        task.status = TaskStatus::Generated;
        debug!(id = %task.id, path = %path.display(), "generated unit");
        entries.push(GenerateLogEntry {
            id: task.id.clone(),
            len: text.chars().count(),
            file: path.to_string_lossy().into_owned(),
            generated_at: Utc::now(),
        });
    }

    manifest.save(&tasks_file)?;
    let log_file = layout.generate_log_file();
    write_json(&log_file, &entries)?;

    info!(count = entries.len(), dir = %units_dir.display(), "generated micro-units");
    Ok(GenerateReport {
        generated: entries.len(),
        units_dir,
        log_file,
        entries,
    })
}
