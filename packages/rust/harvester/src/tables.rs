//! HTML table extraction.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use paperflow_dataprep::Table;

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").expect("valid selector"));
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

/// Extract every `<table>` in the document, in document order.
///
/// Tables without any cells are skipped.
pub fn extract_tables(html: &str) -> Vec<Table> {
    let doc = Html::parse_document(html);
    doc.select(&TABLE_SEL).filter_map(|t| table_to_rows(&t)).collect()
}

/// Convert one `<table>` element.
///
/// A leading row made only of `<th>` cells becomes the header; otherwise the
/// columns are named `0`, `1`, ... Every row is padded to the widest row.
fn table_to_rows(table: &ElementRef) -> Option<Table> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut header: Option<Vec<String>> = None;

    for tr in table.select(&TR_SEL) {
        let has_td = tr.select(&TD_SEL).next().is_some();
        let has_th = tr.select(&TH_SEL).next().is_some();

        let cells: Vec<String> = tr.select(&CELL_SEL).map(|cell| cell_text(&cell)).collect();
        if cells.is_empty() {
            continue;
        }

        if has_th && !has_td && header.is_none() && rows.is_empty() {
            header = Some(cells);
        } else {
            rows.push(cells);
        }
    }

    let col_count = rows
        .iter()
        .map(Vec::len)
        .chain(header.as_ref().map(Vec::len))
        .max()
        .unwrap_or(0);
    if col_count == 0 {
        return None;
    }

    let mut headers = header.unwrap_or_default();
    let start = headers.len();
    headers.extend((start..col_count).map(|i| i.to_string()));

    Some(Table::new(headers, rows))
}

/// Cell text with whitespace runs collapsed.
fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_from_th_and_rows_padded() {
        let html = r#"<html><body>
            <table>
              <tr><th>Country</th><th>GDP</th><th>Year</th></tr>
              <tr><td>China</td><td>17.9</td><td>2023</td></tr>
              <tr><td>India</td><td>3.7</td></tr>
            </table>
        </body></html>"#;

        let tables = extract_tables(html);
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.headers, vec!["Country", "GDP", "Year"]);
        assert_eq!(t.rows[1], vec!["India", "3.7", ""]);
    }

    #[test]
    fn headerless_tables_get_index_columns() {
        let html = "<table><tr><td>a</td><td>b</td></tr><tr><td>c</td></tr></table>\
                    <table><tr><td> x \n y </td></tr></table>\
                    <table></table>";
        let tables = extract_tables(html);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].headers, vec!["0", "1"]);
        assert_eq!(tables[0].rows[1], vec!["c", ""]);
        assert_eq!(tables[1].rows[0], vec!["x y"]);
    }

    #[test]
    fn row_headers_stay_in_body() {
        let html = "<table><tr><th>k</th><th>v</th></tr>\
                    <tr><th>alpha</th><td>1</td></tr></table>";
        let tables = extract_tables(html);
        assert_eq!(tables[0].headers, vec!["k", "v"]);
        assert_eq!(tables[0].rows, vec![vec!["alpha", "1"]]);
    }
}
