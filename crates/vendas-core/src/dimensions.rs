use polars::prelude::*;

use crate::dataset::DimensionSpec;
use crate::error::Result;
use crate::table::Table;

/// Selects `columns` in the given order. No rows are filtered and nothing is renamed.
pub fn project(table: &Table, columns: &[&str]) -> Result<Table> {
    let mut selected: Vec<Column> = Vec::with_capacity(columns.len());
    for name in columns {
        selected.push(table.column(name)?.clone());
    }
    let frame = DataFrame::new(selected)?;
    Ok(Table::new(table.name(), frame))
}

/// Projects a cleaned source extract into its dimension table.
pub fn build_dimension(dimension: &DimensionSpec, cleaned: &Table) -> Result<Table> {
    Ok(project(cleaned, dimension.columns())?.renamed(dimension.name))
}
