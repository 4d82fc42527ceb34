//! Bridge between raw [`Table`] text and polars data frames.

use polars::prelude::*;

use paperflow_shared::PaperflowError;

use crate::table::{Table, is_missing};

/// Name of the count column produced by [`value_counts`].
const COUNT_COLUMN: &str = "__paperflow_count";

pub(crate) fn frame_err(e: PolarsError) -> PaperflowError {
    PaperflowError::parse(format!("dataframe: {e}"))
}

/// Load a table as all-string columns. Missing cells become nulls; present
/// cells are trimmed.
pub(crate) fn string_frame(table: &Table) -> PolarsResult<DataFrame> {
    let columns: Vec<Column> = table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<Option<&str>> = table
                .column(idx)
                .map(|cell| (!is_missing(cell)).then(|| cell.trim()))
                .collect();
            Series::new(name.as_str().into(), cells).into()
        })
        .collect();
    DataFrame::new(columns)
}

/// Cast a string column to `Float64`. Unparseable and non-finite cells
/// become null.
pub(crate) fn numeric_cast(column: &Column) -> PolarsResult<Float64Chunked> {
    let cast = column.cast(&DataType::Float64)?;
    let finite: Float64Chunked = cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    Ok(finite.with_name(column.name().clone()))
}

/// Non-null values of `name` with their counts, most frequent first and
/// ties ordered by value.
pub(crate) fn value_counts(frame: &DataFrame, name: &str) -> PolarsResult<Vec<(String, usize)>> {
    let counts = frame
        .clone()
        .lazy()
        .select([col(name).cast(DataType::String)])
        .filter(col(name).is_not_null())
        .group_by([col(name)])
        .agg([len().alias(COUNT_COLUMN)])
        .sort_by_exprs(
            [col(COUNT_COLUMN), col(name)],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?;

    let values = counts.column(name)?.str()?;
    let tallies = counts.column(COUNT_COLUMN)?.cast(&DataType::UInt64)?;
    let tallies = tallies.u64()?;

    Ok(values
        .into_iter()
        .zip(tallies)
        .filter_map(|(value, n)| Some((value?.to_string(), n? as usize)))
        .collect())
}
