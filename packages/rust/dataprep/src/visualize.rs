//! Chart generation for cleaned datasets.
//!
//! Every `*.csv` in the input directory gets its own figure directory with
//! histograms, a correlation heatmap, a scatter matrix, and category bar
//! charts. Each chart is drawn as SVG and rendered to PNG next to it.
//! Labels are Chinese; the SVG root carries a CJK font stack.

use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use paperflow_shared::{PaperflowError, Result, VisualizeConfig};

use crate::frame::{frame_err, numeric_cast, string_frame, value_counts};
use crate::raster::write_png;
use crate::svg::{Anchor, BAR_FILL, Canvas, POINT_FILL, diverging_color, tick_label};
use crate::table::read_table;

/// Charts written for one dataset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetCharts {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    /// PNG figures, one per chart.
    pub charts: Vec<PathBuf>,
    /// SVG sources of the same charts.
    pub vectors: Vec<PathBuf>,
}

/// Summary of a visualization run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VisualizeReport {
    pub datasets: Vec<DatasetCharts>,
    /// Datasets that could not be charted, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

impl VisualizeReport {
    pub fn chart_count(&self) -> usize {
        self.datasets.iter().map(|d| d.charts.len()).sum()
    }
}

/// Chart every CSV under `input_dir` into `output_dir/<stem>/`.
#[instrument(skip_all, fields(input = %input_dir.display()))]
pub fn visualize_all(
    input_dir: &Path,
    output_dir: &Path,
    config: &VisualizeConfig,
) -> Result<VisualizeReport> {
    if !input_dir.is_dir() {
        warn!(dir = %input_dir.display(), "cleaned data directory not found; run the clean stage first");
        return Ok(VisualizeReport::default());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .map_err(|e| PaperflowError::io(input_dir, e))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        warn!(dir = %input_dir.display(), "no cleaned CSV files to chart");
        return Ok(VisualizeReport::default());
    }

    let mut report = VisualizeReport::default();
    for file in files {
        match visualize_dataset(&file, output_dir, config) {
            Ok(charts) => report.datasets.push(charts),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to chart dataset");
                report.failures.push((file, e.to_string()));
            }
        }
    }

    info!(
        datasets = report.datasets.len(),
        charts = report.chart_count(),
        "visualization complete"
    );
    Ok(report)
}

/// Chart a single CSV into `output_root/<stem>/`.
#[instrument(skip_all, fields(file = %csv_path.display()))]
pub fn visualize_dataset(
    csv_path: &Path,
    output_root: &Path,
    config: &VisualizeConfig,
) -> Result<DatasetCharts> {
    let table = read_table(csv_path)?;
    let frame = string_frame(&table).map_err(frame_err)?;
    let stem = csv_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    let out_dir = output_root.join(stem);
    std::fs::create_dir_all(&out_dir).map_err(|e| PaperflowError::io(&out_dir, e))?;

    let (numeric, categorical) = split_columns(&frame).map_err(frame_err)?;
    debug!(
        numeric = numeric.len(),
        categorical = categorical.len(),
        "classified columns"
    );

    let mut charts = DatasetCharts {
        source: csv_path.to_path_buf(),
        output_dir: out_dir.clone(),
        ..DatasetCharts::default()
    };

    for (i, col) in numeric.iter().take(config.max_columns).enumerate() {
        let svg = histogram_chart(&col.name, &col.values, config.bins);
        charts.save(&format!("dist_{i}_{}", sanitize(&col.name)), &svg)?;
    }

    if numeric.len() > 1 {
        let matrix = correlations(&numeric).map_err(frame_err)?;
        let svg = correlation_heatmap(&numeric, &matrix);
        charts.save("correlation_heatmap", &svg)?;
    }

    let top = top_variance(&numeric, config.pair_columns);
    if top.len() >= 2 {
        let svg = scatter_matrix(&top, config.bins);
        charts.save("pairplot_top5", &svg)?;
    }

    for (i, name) in categorical.iter().enumerate() {
        if i >= config.max_columns {
            break;
        }
        let counts = value_counts(&frame, name).map_err(frame_err)?;
        if counts.is_empty() || counts.len() > config.max_unique_categories {
            debug!(column = %name, distinct = counts.len(), "skipping category chart");
            continue;
        }
        let svg = category_chart(name, &counts, config.top_categories);
        charts.save(&format!("cat_{i}_{}", sanitize(name)), &svg)?;
    }

    info!(dataset = stem, charts = charts.charts.len(), "charted dataset");
    Ok(charts)
}

impl DatasetCharts {
    /// Write `<stem>.svg` and its `<stem>.png` rendering. A failed rendering
    /// is logged and the SVG stands in for the figure.
    fn save(&mut self, stem: &str, svg: &str) -> Result<()> {
        let vector = self.output_dir.join(format!("{stem}.svg"));
        std::fs::write(&vector, svg).map_err(|e| PaperflowError::io(&vector, e))?;

        let raster = self.output_dir.join(format!("{stem}.png"));
        match write_png(&raster, svg) {
            Ok(()) => self.charts.push(raster),
            Err(e) => {
                warn!(chart = %vector.display(), error = %e, "PNG rendering failed");
                self.charts.push(vector.clone());
            }
        }
        debug!(chart = stem, "wrote chart");
        self.vectors.push(vector);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Column handling
// ---------------------------------------------------------------------------

struct NumericColumn {
    name: String,
    /// One entry per row; null where the cell is missing.
    values: Float64Chunked,
}

/// A column is numeric when it has a value and every present cell casts to
/// a number. Columns without any value are ignored.
fn split_columns(frame: &DataFrame) -> PolarsResult<(Vec<NumericColumn>, Vec<String>)> {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();

    for column in frame.get_columns() {
        if column.null_count() == column.len() {
            continue;
        }
        let values = numeric_cast(column)?;
        if values.null_count() == column.null_count() {
            numeric.push(NumericColumn {
                name: column.name().to_string(),
                values,
            });
        } else {
            categorical.push(column.name().to_string());
        }
    }

    Ok((numeric, categorical))
}

/// Highest-variance columns first, at most `limit`.
fn top_variance(columns: &[NumericColumn], limit: usize) -> Vec<&NumericColumn> {
    let mut ranked: Vec<(f64, &NumericColumn)> = columns
        .iter()
        .filter_map(|c| c.values.var(1).map(|v| (v, c)))
        .filter(|(v, _)| v.is_finite() && *v > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked.into_iter().take(limit).map(|(_, c)| c).collect()
}

/// Lower-triangle Pearson coefficients over rows where both columns have a
/// value. `matrix[i][j]` for `j <= i`; `None` when undefined.
fn correlations(columns: &[NumericColumn]) -> PolarsResult<Vec<Vec<Option<f64>>>> {
    let frame = DataFrame::new(
        columns
            .iter()
            .enumerate()
            .map(|(i, c)| c.values.clone().with_name(format!("c{i}").into()).into_series().into())
            .collect(),
    )?;

    let mut matrix = Vec::with_capacity(columns.len());
    for i in 0..columns.len() {
        let mut row = Vec::with_capacity(i + 1);
        for j in 0..i {
            let (a, b) = (format!("c{i}"), format!("c{j}"));
            let out = frame
                .clone()
                .lazy()
                .filter(col(a.as_str()).is_not_null().and(col(b.as_str()).is_not_null()))
                .select([pearson_corr(col(a.as_str()), col(b.as_str())).alias("r")])
                .collect()?;
            let r = out.column("r")?.f64()?.get(0).filter(|r| r.is_finite());
            row.push(r);
        }
        row.push(Some(1.0));
        matrix.push(row);
    }
    Ok(matrix)
}

/// Values observed in both columns on the same row.
fn paired(a: &NumericColumn, b: &NumericColumn) -> (Vec<f64>, Vec<f64>) {
    (&a.values)
        .into_iter()
        .zip(&b.values)
        .filter_map(|(x, y)| Some((x?, y?)))
        .unzip()
}

/// Equal-width histogram over the column's values. Returns `(lo, hi, counts)`.
fn histogram(values: &Float64Chunked, bins: usize) -> (f64, f64, Vec<usize>) {
    let bins = bins.max(1);
    let mut counts = vec![0usize; bins];
    let (Some(min), Some(max)) = (values.min(), values.max()) else {
        return (0.0, 1.0, counts);
    };
    let (lo, hi) = if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    };
    let width = (hi - lo) / bins as f64;

    for v in values.into_iter().flatten() {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    (lo, hi, counts)
}

/// File-name-safe version of a column name. Non-ASCII letters are kept.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "column".into()
    } else {
        trimmed.chars().take(60).collect()
    }
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;

/// Axis frame shared by histogram and bar charts. Returns the plot rectangle.
fn draw_axes(canvas: &mut Canvas, bottom_margin: f64, y_max: usize, y_label: &str) -> (f64, f64, f64, f64) {
    let x0 = MARGIN_LEFT;
    let y0 = MARGIN_TOP;
    let w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let h = HEIGHT - MARGIN_TOP - bottom_margin;

    canvas.line(x0, y0 + h, x0 + w, y0 + h);
    canvas.line(x0, y0, x0, y0 + h);

    for step in 0..=4 {
        let value = y_max as f64 * step as f64 / 4.0;
        let y = y0 + h - h * step as f64 / 4.0;
        canvas.line(x0 - 4.0, y, x0, y);
        canvas.text(x0 - 8.0, y + 4.0, 11.0, Anchor::End, &tick_label(value.round()));
    }
    canvas.rotated_text(22.0, y0 + h / 2.0, 13.0, -90.0, Anchor::Middle, y_label);

    (x0, y0, w, h)
}

fn histogram_chart(name: &str, values: &Float64Chunked, bins: usize) -> String {
    let (lo, hi, counts) = histogram(values, bins);
    let y_max = counts.iter().copied().max().unwrap_or(0).max(1);

    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    canvas.title(&format!("{name} 分布图"));
    let (x0, y0, w, h) = draw_axes(&mut canvas, MARGIN_BOTTOM, y_max, "频数");

    let bar_w = w / counts.len() as f64;
    for (i, &count) in counts.iter().enumerate() {
        let bar_h = h * count as f64 / y_max as f64;
        canvas.outlined_rect(x0 + bar_w * i as f64, y0 + h - bar_h, bar_w, bar_h, BAR_FILL);
    }

    for step in 0..=4 {
        let value = lo + (hi - lo) * step as f64 / 4.0;
        let x = x0 + w * step as f64 / 4.0;
        canvas.line(x, y0 + h, x, y0 + h + 4.0);
        canvas.text(x, y0 + h + 18.0, 11.0, Anchor::Middle, &tick_label(value));
    }
    canvas.text(x0 + w / 2.0, HEIGHT - 20.0, 13.0, Anchor::Middle, name);

    canvas.finish()
}

fn category_chart(name: &str, counts: &[(String, usize)], top: usize) -> String {
    let shown = &counts[..counts.len().min(top.max(1))];
    let y_max = shown.iter().map(|(_, n)| *n).max().unwrap_or(0).max(1);
    let bottom = MARGIN_BOTTOM + 50.0;

    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    canvas.title(&format!("{name} 频数统计 (Top {top})"));
    let (x0, y0, w, h) = draw_axes(&mut canvas, bottom, y_max, "频数");

    let slot = w / shown.len() as f64;
    for (i, (label, count)) in shown.iter().enumerate() {
        let bar_h = h * *count as f64 / y_max as f64;
        let x = x0 + slot * i as f64;
        canvas.outlined_rect(x + slot * 0.1, y0 + h - bar_h, slot * 0.8, bar_h, BAR_FILL);

        let label: String = label.chars().take(12).collect();
        canvas.rotated_text(x + slot / 2.0, y0 + h + 14.0, 11.0, -45.0, Anchor::End, &label);
    }
    canvas.text(x0 + w / 2.0, HEIGHT - 12.0, 13.0, Anchor::Middle, name);

    canvas.finish()
}

fn correlation_heatmap(columns: &[NumericColumn], matrix: &[Vec<Option<f64>>]) -> String {
    let n = columns.len();
    let cell = (560.0 / n as f64).clamp(24.0, 80.0);
    let label_space = 140.0;
    let size = label_space + cell * n as f64 + 40.0;

    let mut canvas = Canvas::new(size, size + 20.0);
    canvas.title("变量相关性热力图");

    let x0 = label_space;
    let y0 = 60.0;
    let font = (cell / 4.0).clamp(8.0, 13.0);

    for i in 0..n {
        for j in 0..=i {
            let r = matrix[i][j];
            let x = x0 + cell * j as f64;
            let y = y0 + cell * i as f64;
            match r {
                Some(r) => {
                    canvas.outlined_rect(x, y, cell, cell, &diverging_color(r));
                    canvas.text(x + cell / 2.0, y + cell / 2.0 + font / 3.0, font, Anchor::Middle, &format!("{r:.2}"));
                }
                None => {
                    canvas.outlined_rect(x, y, cell, cell, "#f0f0f0");
                    canvas.text(x + cell / 2.0, y + cell / 2.0 + font / 3.0, font, Anchor::Middle, "—");
                }
            }
        }
    }

    for (i, col) in columns.iter().enumerate() {
        let label: String = col.name.chars().take(16).collect();
        canvas.text(x0 - 6.0, y0 + cell * i as f64 + cell / 2.0 + 4.0, 11.0, Anchor::End, &label);
        canvas.rotated_text(
            x0 + cell * i as f64 + cell / 2.0,
            y0 + cell * n as f64 + 10.0,
            11.0,
            -45.0,
            Anchor::End,
            &label,
        );
    }

    canvas.finish()
}

fn scatter_matrix(columns: &[&NumericColumn], bins: usize) -> String {
    let k = columns.len();
    let cell = 150.0;
    let pad = 8.0;
    let x0 = 90.0;
    let y0 = 60.0;
    let size = x0 + cell * k as f64 + 30.0;

    let mut canvas = Canvas::new(size, size + 30.0);
    canvas.title("主要变量散点矩阵");

    let bounds: Vec<(f64, f64)> = columns
        .iter()
        .map(|c| match (c.values.min(), c.values.max()) {
            (Some(lo), Some(hi)) if lo < hi => (lo, hi),
            (Some(lo), Some(hi)) => (lo - 0.5, hi + 0.5),
            _ => (0.0, 1.0),
        })
        .collect();

    for row in 0..k {
        for col in 0..k {
            let cx = x0 + cell * col as f64;
            let cy = y0 + cell * row as f64;
            let inner = cell - 2.0 * pad;
            canvas.rect(cx + pad, cy + pad, inner, inner, "#f7f7f7");

            if row == col {
                let (_, _, counts) = histogram(&columns[row].values, bins.min(20));
                let peak = counts.iter().copied().max().unwrap_or(0).max(1);
                let bar_w = inner / counts.len() as f64;
                for (b, &count) in counts.iter().enumerate() {
                    let bar_h = inner * count as f64 / peak as f64;
                    canvas.outlined_rect(cx + pad + bar_w * b as f64, cy + pad + inner - bar_h, bar_w, bar_h, BAR_FILL);
                }
            } else {
                let (xs, ys) = paired(columns[col], columns[row]);
                let (xlo, xhi) = bounds[col];
                let (ylo, yhi) = bounds[row];
                for (x, y) in xs.iter().zip(&ys) {
                    let px = cx + pad + inner * (x - xlo) / (xhi - xlo);
                    let py = cy + pad + inner - inner * (y - ylo) / (yhi - ylo);
                    canvas.circle(px, py, 2.0, POINT_FILL);
                }
            }
        }
    }

    for (i, c) in columns.iter().enumerate() {
        let label: String = c.name.chars().take(14).collect();
        canvas.text(x0 + cell * i as f64 + cell / 2.0, y0 + cell * k as f64 + 18.0, 11.0, Anchor::Middle, &label);
        canvas.rotated_text(x0 - 10.0, y0 + cell * i as f64 + cell / 2.0, 11.0, -90.0, Anchor::Middle, &label);
    }

    canvas.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn charts_numeric_and_categorical_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("data_cleaned");
        let output = tmp.path().join("figures");
        std::fs::create_dir_all(&input).unwrap();
        write(
            &input.join("sales_cleaned.csv"),
            "年份,销量,价格,地区\n2020,10,3.5,华东\n2021,14,3.1,华北\n2022,19,2.8,华东\n2023,25,2.2,华南\n",
        );

        let report = visualize_all(&input, &output, &VisualizeConfig::default()).unwrap();
        assert_eq!(report.datasets.len(), 1);

        let names = listing(&output.join("sales_cleaned"));
        let stems = [
            "cat_0_地区",
            "correlation_heatmap",
            "dist_0_年份",
            "dist_1_销量",
            "dist_2_价格",
            "pairplot_top5",
        ];
        let mut expected: Vec<String> = stems
            .iter()
            .flat_map(|s| [format!("{s}.png"), format!("{s}.svg")])
            .collect();
        expected.sort();
        assert_eq!(names, expected);
        assert_eq!(report.chart_count(), 6);
        assert!(report.datasets[0].charts.iter().all(|p| p.extension().unwrap() == "png"));

        let heatmap = std::fs::read_to_string(output.join("sales_cleaned/correlation_heatmap.svg")).unwrap();
        assert!(heatmap.contains("变量相关性热力图"));
        assert!(heatmap.contains(">1.00<"));

        let bars = std::fs::read_to_string(output.join("sales_cleaned/cat_0_地区.svg")).unwrap();
        assert!(bars.contains("频数统计 (Top 20)"));
    }

    #[test]
    fn single_numeric_column_has_no_heatmap_or_pairplot() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = tmp.path().join("one.csv");
        write(&csv, "x\n1\n2\n3\n");

        let charts = visualize_dataset(&csv, tmp.path(), &VisualizeConfig::default()).unwrap();
        assert_eq!(charts.charts.len(), 1);
        assert!(charts.charts[0].ends_with("dist_0_x.png"));
        assert!(charts.vectors[0].ends_with("dist_0_x.svg"));
        let png = std::fs::read(&charts.charts[0]).unwrap();
        assert!(crate::raster::png_dimensions(&png).is_some());
    }

    #[test]
    fn high_cardinality_categories_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = tmp.path().join("ids.csv");
        let mut content = String::from("id\n");
        for i in 0..5 {
            content.push_str(&format!("user{i}\n"));
        }
        write(&csv, &content);

        let config = VisualizeConfig {
            max_unique_categories: 3,
            ..VisualizeConfig::default()
        };
        let charts = visualize_dataset(&csv, tmp.path(), &config).unwrap();
        assert!(charts.charts.is_empty());
    }

    #[test]
    fn category_index_counts_skipped_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = tmp.path().join("mixed.csv");
        let mut content = String::from("id,kind\n");
        for i in 0..6 {
            content.push_str(&format!("user{i},{}\n", if i % 2 == 0 { "a" } else { "b" }));
        }
        write(&csv, &content);

        let config = VisualizeConfig {
            max_unique_categories: 3,
            ..VisualizeConfig::default()
        };
        let charts = visualize_dataset(&csv, tmp.path(), &config).unwrap();
        assert_eq!(charts.charts.len(), 1);
        assert!(charts.charts[0].ends_with("cat_1_kind.png"));
    }

    #[test]
    fn correlations_cover_lower_triangle() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = tmp.path().join("corr.csv");
        write(&csv, "a,b,c,flat\n1,2,3,7\n2,4,1,7\n3,6,2,7\n");

        let table = read_table(&csv).unwrap();
        let frame = string_frame(&table).unwrap();
        let (numeric, categorical) = split_columns(&frame).unwrap();
        assert!(categorical.is_empty());

        let matrix = correlations(&numeric).unwrap();
        assert_eq!(matrix.len(), 4);
        assert_eq!(matrix[3].len(), 4);
        assert!((matrix[1][0].unwrap() - 1.0).abs() < 1e-9);
        assert!((matrix[2][0].unwrap() + 0.5).abs() < 1e-9);
        assert_eq!(matrix[3][0], None);
        assert!(matrix.iter().enumerate().all(|(i, row)| row[i] == Some(1.0)));

        let top = top_variance(&numeric, 5);
        let names: Vec<&str> = top.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn histogram_puts_max_in_last_bin() {
        let values = Float64Chunked::from_slice("v".into(), &[0.0, 1.0, 2.0, 10.0]);
        let (lo, hi, counts) = histogram(&values, 5);
        assert_eq!((lo, hi), (0.0, 10.0));
        assert_eq!(counts.iter().sum::<usize>(), 4);
        assert_eq!(counts[0], 2);
        assert_eq!(counts[4], 1);

        let constant = Float64Chunked::from_slice("k".into(), &[7.0, 7.0]);
        let (_, _, counts) = histogram(&constant, 3);
        assert_eq!(counts.iter().sum::<usize>(), 2);
    }

    #[test]
    fn missing_input_dir_yields_empty_report() {
        let tmp = tempfile::tempdir().unwrap();
        let report = visualize_all(
            &tmp.path().join("absent"),
            &tmp.path().join("figures"),
            &VisualizeConfig::default(),
        )
        .unwrap();
        assert!(report.datasets.is_empty());
        assert_eq!(report.chart_count(), 0);
    }

    #[test]
    fn sanitize_keeps_cjk_and_replaces_separators() {
        assert_eq!(sanitize("GDP/人均 (元)"), "GDP_人均__元");
        assert_eq!(sanitize("///"), "column");
    }
}
