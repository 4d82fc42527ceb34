//! Tabular data preparation: reading, cleaning, and charting.
//!
//! This crate provides:
//! - [`table`] — CSV / TXT / Excel reading and BOM-prefixed CSV writing
//! - [`clean`] — polars-backed missing-value filling, type coercion, deduplication
//! - [`visualize`] — per-dataset charts (histograms, heatmap, scatter matrix, bars) as SVG and PNG
//! - [`raster`] — SVG to PNG rendering

pub mod clean;
pub mod raster;
pub mod table;
pub mod visualize;

mod frame;
mod svg;

pub use clean::{
    CleanFileOutcome, CleanReport, CleanStats, CleanedTable, ColumnKind, clean_all, clean_file,
    clean_table, find_data_files, write_frame_csv,
};
pub use raster::{png_dimensions, rasterize_svg};
pub use table::{Table, is_missing, parse_number, read_table};
pub use visualize::{DatasetCharts, VisualizeReport, visualize_all, visualize_dataset};
