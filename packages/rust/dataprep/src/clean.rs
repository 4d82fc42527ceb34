//! Data cleaning stage.
//!
//! Scans the project's data directories, normalizes each table, and writes
//! `<stem>_cleaned.csv` files. A file that cannot be read is reported and
//! skipped; it never stops the stage.

use std::io::Write;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use paperflow_shared::{CleanConfig, PaperflowError, Result};

use crate::frame::{frame_err, numeric_cast, string_frame, value_counts};
use crate::table::{Table, UTF8_BOM, read_table};

/// Directory names never scanned for input data.
const EXCLUDED_DIRS: &[&str] = &["paper_output", "node_modules", ".git"];

/// Fill value for categorical columns without any observed value.
const UNKNOWN_CATEGORY: &str = "Unknown";

/// Inferred type of a cleaned column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Counters describing what cleaning changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanStats {
    /// `(rows, columns)` before cleaning.
    pub original_shape: (usize, usize),
    /// `(rows, columns)` after cleaning.
    pub cleaned_shape: (usize, usize),
    pub numeric_columns: Vec<String>,
    pub filled_cells: usize,
    pub duplicates_removed: usize,
}

/// A data frame after cleaning, with the inferred kind of each column.
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub frame: DataFrame,
    pub kinds: Vec<ColumnKind>,
    pub stats: CleanStats,
}

/// Per-file result of [`clean_all`].
#[derive(Debug, Clone, Serialize)]
pub struct CleanFileOutcome {
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CleanStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a cleaning run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub files: Vec<CleanFileOutcome>,
}

impl CleanReport {
    pub fn cleaned(&self) -> usize {
        self.files.iter().filter(|f| f.output.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Recursively collect data files under the configured search directories.
///
/// Skips excluded directories and Office lock files (`~$...`), deduplicates,
/// and sorts by path.
pub fn find_data_files(root: &Path, config: &CleanConfig) -> Vec<PathBuf> {
    let extensions: Vec<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut found = Vec::new();
    for dir_name in &config.search_dirs {
        let dir = root.join(dir_name);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "search dir missing, skipping");
            continue;
        }
        walk(&dir, &extensions, &mut found);
    }

    found.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
    found.dedup();
    found
}

fn walk(dir: &Path, extensions: &[String], out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if !EXCLUDED_DIRS.contains(&name.as_str()) {
                walk(&path, extensions, out);
            }
            continue;
        }

        if name.starts_with('~') {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e.to_ascii_lowercase()));
        if matches {
            out.push(path);
        }
    }
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

/// Clean a table.
///
/// 1. Drop rows, then columns, whose cells are all missing.
/// 2. Classify columns: numeric when every present cell parses, or when the
///    share of missing-or-unparseable cells is below `numeric_threshold`.
///    Numeric columns are cast, so `3` and `3.0` hold the same value.
/// 3. Fill numeric gaps with the column mean and categorical gaps with the
///    column mode (ties go to the smallest value).
/// 4. Drop duplicate rows, keeping the first.
pub fn clean_table(table: &Table, numeric_threshold: f64) -> Result<CleanedTable> {
    clean_frame(table, numeric_threshold).map_err(frame_err)
}

fn clean_frame(table: &Table, numeric_threshold: f64) -> PolarsResult<CleanedTable> {
    let original_shape = table.shape();
    let raw = string_frame(table)?;

    let mut keep_rows = BooleanChunked::full("keep".into(), false, raw.height());
    for column in raw.get_columns() {
        keep_rows = &keep_rows | &column.is_not_null();
    }
    let raw = raw.filter(&keep_rows)?;

    let keep_columns: Vec<PlSmallStr> = raw
        .get_columns()
        .iter()
        .filter(|c| c.null_count() < c.len())
        .map(|c| c.name().clone())
        .collect();
    if keep_columns.is_empty() {
        return Ok(CleanedTable {
            frame: DataFrame::empty(),
            kinds: Vec::new(),
            stats: CleanStats {
                original_shape,
                ..CleanStats::default()
            },
        });
    }
    let raw = raw.select(keep_columns)?;

    let mut columns = Vec::with_capacity(raw.width());
    let mut kinds = Vec::with_capacity(raw.width());
    let mut fills = Vec::new();
    let mut filled_cells = 0usize;

    for column in raw.get_columns() {
        let name = column.name().clone();
        let numbers = numeric_cast(column)?;
        let kind = classify(column.len(), column.null_count(), numbers.null_count(), numeric_threshold);

        match kind {
            ColumnKind::Numeric if numbers.null_count() == 0 => {
                let ints = column.cast(&DataType::Int64)?;
                if ints.null_count() == 0 {
                    columns.push(ints);
                } else {
                    columns.push(numbers.into_series().into());
                }
            }
            ColumnKind::Numeric => {
                filled_cells += numbers.null_count();
                fills.push(col(name.clone()).fill_null(col(name).mean()));
                columns.push(numbers.into_series().into());
            }
            ColumnKind::Categorical => {
                if column.null_count() > 0 {
                    let single = DataFrame::new(vec![column.clone()])?;
                    let mode = value_counts(&single, name.as_str())?
                        .into_iter()
                        .next()
                        .map(|(value, _)| value)
                        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
                    filled_cells += column.null_count();
                    fills.push(col(name).fill_null(lit(mode)));
                }
                columns.push(column.clone());
            }
        }
        kinds.push(kind);
    }

    let typed = DataFrame::new(columns)?;
    let before_dedup = typed.height();
    let frame = typed
        .lazy()
        .with_columns(fills)
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    let duplicates_removed = before_dedup - frame.height();

    let numeric_columns = frame
        .get_column_names()
        .into_iter()
        .zip(&kinds)
        .filter(|(_, k)| **k == ColumnKind::Numeric)
        .map(|(name, _)| name.to_string())
        .collect();

    let stats = CleanStats {
        original_shape,
        cleaned_shape: frame.shape(),
        numeric_columns,
        filled_cells,
        duplicates_removed,
    };

    Ok(CleanedTable {
        frame,
        kinds,
        stats,
    })
}

/// `missing` counts null cells; `unparsed` counts cells that did not cast to
/// a finite number, missing ones included.
fn classify(total: usize, missing: usize, unparsed: usize, threshold: f64) -> ColumnKind {
    let present = total - missing;
    let parsed = total - unparsed;

    if present > 0 && parsed == present {
        return ColumnKind::Numeric;
    }
    if total == 0 || parsed == 0 {
        return ColumnKind::Categorical;
    }

    let unusable = unparsed as f64 / total as f64;
    if unusable < threshold {
        ColumnKind::Numeric
    } else {
        ColumnKind::Categorical
    }
}

/// Write a cleaned frame as CSV with a UTF-8 BOM, header first.
pub fn write_frame_csv(frame: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PaperflowError::io(parent, e))?;
    }

    let mut file = std::fs::File::create(path).map_err(|e| PaperflowError::io(path, e))?;
    file.write_all(UTF8_BOM)
        .map_err(|e| PaperflowError::io(path, e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(frame)
        .map_err(frame_err)?;

    debug!(path = %path.display(), rows = frame.height(), "wrote CSV");
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage entry points
// ---------------------------------------------------------------------------

/// Clean one file and write `<out_dir>/<stem>_cleaned.csv`.
#[instrument(skip_all, fields(file = %path.display()))]
pub fn clean_file(path: &Path, out_dir: &Path, numeric_threshold: f64) -> Result<(PathBuf, CleanStats)> {
    let table = read_table(path)?;
    let mut cleaned = clean_table(&table, numeric_threshold)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PaperflowError::validation(format!("no file stem: {}", path.display())))?;
    let output = out_dir.join(format!("{stem}_cleaned.csv"));
    write_frame_csv(&mut cleaned.frame, &output)?;

    info!(
        file = %path.display(),
        original = ?cleaned.stats.original_shape,
        cleaned = ?cleaned.stats.cleaned_shape,
        output = %output.display(),
        "cleaned dataset"
    );

    Ok((output, cleaned.stats))
}

/// Clean every data file found under the project's search directories.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn clean_all(root: &Path, config: &CleanConfig, out_dir: &Path) -> Result<CleanReport> {
    std::fs::create_dir_all(out_dir).map_err(|e| PaperflowError::io(out_dir, e))?;

    let files = find_data_files(root, config);
    if files.is_empty() {
        warn!(
            dirs = ?config.search_dirs,
            "no data files found (CSV/Excel/TXT)"
        );
        return Ok(CleanReport::default());
    }

    info!(count = files.len(), "found data files");

    let mut report = CleanReport::default();
    for file in files {
        match clean_file(&file, out_dir, config.numeric_threshold) {
            Ok((output, stats)) => report.files.push(CleanFileOutcome {
                source: file,
                output: Some(output),
                stats: Some(stats),
                error: None,
            }),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to clean file");
                report.files.push(CleanFileOutcome {
                    source: file,
                    output: None,
                    stats: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    info!(
        cleaned = report.cleaned(),
        failed = report.failed(),
        "cleaning complete"
    );
    Ok(report)
}
