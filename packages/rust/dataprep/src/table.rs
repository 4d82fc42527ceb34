//! In-memory string table plus readers for the supported file formats.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use tracing::{debug, instrument};

use paperflow_shared::{PaperflowError, Result};

/// Cell spellings treated as missing values.
const MISSING_MARKERS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "#NA",
    "<NA>",
];

/// UTF-8 byte order mark, written so spreadsheet tools detect the encoding.
pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A rectangular table of raw cell text. Every row has `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, padding short rows and truncating long ones to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }

    /// Iterate the cells of column `idx`.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row[idx].as_str())
    }

    /// Write as CSV with a UTF-8 BOM, header first.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PaperflowError::io(parent, e))?;
        }

        let mut file = std::fs::File::create(path).map_err(|e| PaperflowError::io(path, e))?;
        file.write_all(UTF8_BOM)
            .map_err(|e| PaperflowError::io(path, e))?;

        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(&self.headers)
            .map_err(|e| PaperflowError::parse(format!("{}: {e}", path.display())))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| PaperflowError::parse(format!("{}: {e}", path.display())))?;
        }
        writer.flush().map_err(|e| PaperflowError::io(path, e))?;

        debug!(path = %path.display(), rows = self.rows.len(), "wrote CSV");
        Ok(())
    }
}

/// Whether a cell counts as a missing value.
pub fn is_missing(cell: &str) -> bool {
    let t = cell.trim();
    t.is_empty() || MISSING_MARKERS.contains(&t)
}

/// Parse a cell as a finite number.
pub fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a tabular file, choosing the parser from its extension.
///
/// - `.csv`: UTF-8 (BOM stripped), falling back to GBK
/// - `.txt`: same decoding; tab-separated when the header has tabs but no commas
/// - `.xlsx` / `.xls`: first worksheet
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_table(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => {
            let text = read_text(path)?;
            parse_delimited(&text, b',')
        }
        "txt" => {
            let text = read_text(path)?;
            parse_delimited(&text, sniff_delimiter(&text))
        }
        "xlsx" | "xls" | "xlsm" | "ods" => read_workbook(path),
        other => Err(PaperflowError::parse(format!(
            "unsupported file format: .{other}"
        ))),
    }
}

/// Read a file as text, trying UTF-8 first and GBK second.
fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| PaperflowError::io(path, e))?;
    Ok(decode_text(&bytes))
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::GBK.decode(bytes);
            if had_errors {
                debug!("GBK decode replaced invalid sequences");
            }
            text.into_owned()
        }
    }
}

fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first.contains('\t') && !first.contains(',') {
        b'\t'
    } else {
        b','
    }
}

/// Parse delimited text with a header row.
///
/// Rows with more fields than the header are dropped as malformed; short rows
/// are padded with missing cells.
pub(crate) fn parse_delimited(text: &str, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let raw_headers: Vec<String> = reader
        .headers()
        .map_err(|e| PaperflowError::parse(format!("failed to read header row: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if raw_headers.is_empty() || raw_headers.iter().all(|h| h.is_empty()) {
        return Err(PaperflowError::parse("no header row"));
    }

    let headers = normalize_headers(raw_headers);
    let width = headers.len();
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "skipping unreadable line");
                skipped += 1;
                continue;
            }
        };
        if record.len() > width {
            skipped += 1;
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    if skipped > 0 {
        debug!(skipped, "dropped malformed lines");
    }

    Ok(Table::new(headers, rows))
}

/// Read the first worksheet of a spreadsheet; its first row is the header.
fn read_workbook(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PaperflowError::parse(format!("{}: {e}", path.display())))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PaperflowError::parse(format!("{}: workbook has no sheets", path.display())))?
        .map_err(|e| PaperflowError::parse(format!("{}: {e}", path.display())))?;

    let mut rows = range.rows().map(|row| {
        row.iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<String>>()
    });

    let headers = rows
        .next()
        .ok_or_else(|| PaperflowError::parse(format!("{}: empty worksheet", path.display())))?;
    let headers = normalize_headers(headers.into_iter().map(|h| h.trim().to_string()).collect());

    Ok(Table::new(headers, rows.collect()))
}

/// Name blank headers `Unnamed: i` and suffix duplicates with `.1`, `.2`, ...
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.is_empty() {
                format!("Unnamed: {i}")
            } else {
                h
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base.clone()
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}
