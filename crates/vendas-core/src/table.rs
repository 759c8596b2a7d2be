//! In-memory table model shared by every stage.
//!
//! A [`Table`] pairs a polars [`DataFrame`] with a [`TableSchema`] whose column kinds are
//! decided once, when the table is built. The cleaning pass dispatches on those kinds
//! instead of re-inspecting dtypes at every step.

use std::io::Cursor;

use polars::prelude::*;
use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Literal the raw extracts use for a value that was never recorded.
pub const NOT_DEFINED: &str = "not defined";

const CSV_INFER_SCHEMA_ROWS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
    /// Booleans, temporals and anything else the cleaning pass leaves alone.
    Other,
}

impl ColumnKind {
    pub fn of(dtype: &DataType) -> Self {
        if dtype.is_integer() || dtype.is_float() {
            ColumnKind::Numeric
        } else if matches!(dtype, DataType::String) {
            ColumnKind::Text
        } else {
            ColumnKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SchemaColumn {
    name: String,
    kind: ColumnKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    columns: Vec<SchemaColumn>,
}

impl TableSchema {
    pub fn from_frame(frame: &DataFrame) -> Self {
        let columns = frame
            .get_columns()
            .iter()
            .map(|column| SchemaColumn {
                name: column.name().to_string(),
                kind: ColumnKind::of(column.dtype()),
            })
            .collect();
        Self { columns }
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.kind)
    }

    pub(crate) fn rename_all<F>(&mut self, mut rename: F)
    where
        F: FnMut(&str) -> String,
    {
        for column in &mut self.columns {
            column.name = rename(&column.name);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    frame: DataFrame,
    schema: TableSchema,
}

impl Table {
    /// Builds a table and tags each column from its dtype.
    pub fn new(name: impl Into<String>, frame: DataFrame) -> Self {
        let schema = TableSchema::from_frame(&frame);
        Self {
            name: name.into(),
            frame,
            schema,
        }
    }

    /// Keeps an existing schema; callers guarantee the column names still line up.
    pub(crate) fn from_parts(name: String, frame: DataFrame, schema: TableSchema) -> Self {
        Self {
            name,
            frame,
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub(crate) fn into_parts(self) -> (String, DataFrame, TableSchema) {
        (self.name, self.frame, self.schema)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.frame
            .column(name)
            .map_err(|_| PipelineError::MissingColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn require(&self, columns: &[&str]) -> Result<()> {
        for column in columns {
            self.column(column)?;
        }
        Ok(())
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Parses a raw CSV extract. `"not defined"` cells are read as nulls.
pub fn read_csv(name: &str, contents: &[u8]) -> Result<Table> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(CSV_INFER_SCHEMA_ROWS))
        .map_parse_options(|options| {
            options.with_null_values(Some(NullValues::AllColumnsSingle(NOT_DEFINED.into())))
        })
        .into_reader_with_file_handle(Cursor::new(contents))
        .finish()?;
    Ok(Table::new(name, frame))
}

pub fn read_parquet(name: &str, contents: &[u8]) -> Result<Table> {
    let frame = ParquetReader::new(Cursor::new(contents)).finish()?;
    Ok(Table::new(name, frame))
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::outputs::create_parquet_bytes;

    #[test]
    fn kinds_are_tagged_from_dtypes() {
        let frame = df![
            "payment_value" => [1.5, 2.0],
            "order_item_id" => [1i64, 2],
            "order_status" => ["delivered", "canceled"],
            "is_gift" => [true, false],
        ]
        .expect("frame");
        let table = Table::new("orders", frame);

        assert_eq!(table.schema().kind("payment_value"), Some(ColumnKind::Numeric));
        assert_eq!(table.schema().kind("order_item_id"), Some(ColumnKind::Numeric));
        assert_eq!(table.schema().kind("order_status"), Some(ColumnKind::Text));
        assert_eq!(table.schema().kind("is_gift"), Some(ColumnKind::Other));
        assert_eq!(table.schema().kind("missing"), None);
    }

    #[test]
    fn csv_reader_treats_not_defined_as_null() {
        let csv = b"product_id,product_category_name,product_weight_g\n\
                    p1,not defined,100\n\
                    p2,moveis,\n";
        let table = read_csv("products", csv).expect("read");

        let category = table.column("product_category_name").expect("column");
        assert_eq!(category.null_count(), 1);
        let weight = table.column("product_weight_g").expect("column");
        assert_eq!(weight.null_count(), 1);
        assert_eq!(table.schema().kind("product_weight_g"), Some(ColumnKind::Numeric));
    }

    #[test]
    fn parquet_bytes_decode_to_same_frame() {
        let frame = df![
            "seller_id" => ["s1", "s2"],
            "seller_zip_code_prefix" => [13023i64, 4195],
        ]
        .expect("frame");
        let bytes = create_parquet_bytes(&frame).expect("write");
        let decoded = read_parquet("sellers", &bytes).expect("read");
        assert!(decoded.frame().equals(&frame));
    }

    #[test]
    fn missing_column_names_table() {
        let table = Table::new("sellers", df!["seller_id" => ["s1"]].expect("frame"));
        match table.column("seller_city") {
            Err(PipelineError::MissingColumn { table, column }) => {
                assert_eq!(table, "sellers");
                assert_eq!(column, "seller_city");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
