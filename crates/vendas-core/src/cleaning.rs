//! Per-table cleaning pass applied to every raw extract before projection.

use std::collections::HashSet;

use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::normalize::normalize_value;
use crate::table::{ColumnKind, Table, NOT_DEFINED};

/// Fill value for missing text cells.
pub const UNKNOWN_TEXT: &str = "desconhecido";

/// Numeric columns whose name contains this marker default to zero, not the median.
const PAYMENT_MARKER: &str = "payment";

/// Runs the full cleaning pass. Step order matters: fills must see the nulls produced by
/// the sentinel step, and text normalization runs on already-filled values.
pub fn clean(table: Table) -> Result<Table> {
    let rows_in = table.height();
    let table_name = table.name().to_string();

    let table = map_columns(table, ColumnKind::Text, replace_not_defined)?;
    let table = map_columns(table, ColumnKind::Numeric, fill_numeric_nulls)?;
    let table = map_columns(table, ColumnKind::Text, fill_text_nulls)?;
    let table = trim_headers(table)?;
    let table = map_columns(table, ColumnKind::Text, normalize_text)?;
    let table = drop_duplicate_rows(table)?;

    debug!(
        table = %table_name,
        rows_in,
        rows_out = table.height(),
        "cleaned table"
    );
    Ok(table)
}

fn map_columns<F>(table: Table, kind: ColumnKind, mut transform: F) -> Result<Table>
where
    F: FnMut(&Series) -> Result<Series>,
{
    let (name, frame, schema) = table.into_parts();
    let mut columns: Vec<Column> = Vec::with_capacity(frame.width());

    for column in frame.get_columns() {
        if schema.kind(column.name().as_str()) == Some(kind) {
            columns.push(transform(column.as_materialized_series())?.into());
        } else {
            columns.push(column.clone());
        }
    }

    let frame = if columns.is_empty() {
        frame
    } else {
        DataFrame::new(columns)?
    };
    Ok(Table::from_parts(name, frame, schema))
}

fn replace_not_defined(series: &Series) -> Result<Series> {
    let values: StringChunked = series
        .str()?
        .into_iter()
        .map(|value| value.filter(|text| *text != NOT_DEFINED))
        .collect();
    Ok(values.with_name(series.name().clone()).into_series())
}

fn fill_numeric_nulls(series: &Series) -> Result<Series> {
    let series = nan_to_null(series)?;
    if series.null_count() == 0 {
        return Ok(series);
    }

    let fill = if series.name().contains(PAYMENT_MARKER) {
        0.0
    } else {
        // an all-null column has no median; zero keeps the no-null invariant
        series.median().unwrap_or(0.0)
    };
    let dtype = series.dtype().clone();

    if dtype.is_integer() && fill.fract() == 0.0 {
        return fill_with(&series, lit(fill as i64).cast(dtype));
    }

    let filled = fill_with(&series.cast(&DataType::Float64)?, lit(fill))?;
    if dtype.is_float() {
        Ok(filled.cast(&dtype)?)
    } else {
        // integer column with a fractional median
        Ok(filled)
    }
}

/// NaN cells count as missing, like nulls.
fn nan_to_null(series: &Series) -> Result<Series> {
    if !series.dtype().is_float() {
        return Ok(series.clone());
    }
    let floats = series.cast(&DataType::Float64)?;
    let floats = floats.f64()?;
    let cleared = floats.set(&floats.is_nan(), None)?;
    Ok(cleared.into_series().cast(series.dtype())?)
}

fn fill_with(series: &Series, value: Expr) -> Result<Series> {
    let name = series.name().clone();
    let frame = DataFrame::new(vec![series.clone().into()])?
        .lazy()
        .select([col(name.clone()).fill_null(value)])
        .collect()?;
    Ok(frame.column(name.as_str())?.as_materialized_series().clone())
}

fn fill_text_nulls(series: &Series) -> Result<Series> {
    let values: StringChunked = series
        .str()?
        .into_iter()
        .map(|value| Some(value.unwrap_or(UNKNOWN_TEXT)))
        .collect();
    Ok(values.with_name(series.name().clone()).into_series())
}

fn trim_headers(table: Table) -> Result<Table> {
    let (name, mut frame, mut schema) = table.into_parts();

    let trimmed: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|column| column.trim().to_string())
        .collect();

    let mut seen = HashSet::new();
    for column in &trimmed {
        if !seen.insert(column.as_str()) {
            return Err(PipelineError::DuplicateColumn {
                table: name,
                column: column.clone(),
            });
        }
    }

    frame.set_column_names(trimmed.iter().map(String::as_str))?;
    schema.rename_all(|column| column.trim().to_string());
    Ok(Table::from_parts(name, frame, schema))
}

fn normalize_text(series: &Series) -> Result<Series> {
    let values: StringChunked = series
        .str()?
        .into_iter()
        .map(|value| value.map(normalize_value))
        .collect();
    Ok(values.with_name(series.name().clone()).into_series())
}

fn drop_duplicate_rows(table: Table) -> Result<Table> {
    let (name, frame, schema) = table.into_parts();
    if frame.width() == 0 {
        return Ok(Table::from_parts(name, frame, schema));
    }
    let frame = frame.unique_stable(None, UniqueKeepStrategy::First, None)?;
    Ok(Table::from_parts(name, frame, schema))
}
