//! Staging run: raw CSV extracts in, seven dimensions and one fact table out.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;
use vendas_bucket::BucketStore;

use crate::cleaning::clean;
use crate::config::StageLayout;
use crate::dataset::{SourceTable, DIMENSIONS};
use crate::dimensions::{build_dimension, project};
use crate::error::{PipelineError, Result};
use crate::fact::build_fact;
use crate::outputs::{publish_tables, RunManifest};
use crate::table::{read_csv, Table};

pub const STAGE_NAME: &str = "staging";

#[derive(Debug, Clone, Serialize)]
pub struct CleaningSummary {
    pub source: SourceTable,
    pub rows_in: usize,
    pub rows_out: usize,
}

#[derive(Debug, Clone)]
pub struct StagedTables {
    pub dimensions: Vec<Table>,
    pub fact: Table,
    pub cleaning: Vec<CleaningSummary>,
}

impl StagedTables {
    pub fn dimension(&self, name: &str) -> Option<&Table> {
        self.dimensions.iter().find(|table| table.name() == name)
    }

    /// Dimensions first, fact last.
    pub fn into_outputs(self) -> Vec<Table> {
        let mut outputs = self.dimensions;
        outputs.push(self.fact);
        outputs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagingReport {
    pub cleaning: Vec<CleaningSummary>,
    pub manifest: RunManifest,
}

/// Cleans every raw extract, then projects dimensions and builds the fact table.
/// Pure: no I/O, and nothing is produced unless every table succeeds.
pub fn stage_tables(mut raw: HashMap<SourceTable, Table>) -> Result<StagedTables> {
    let mut cleaned: HashMap<SourceTable, Table> = HashMap::with_capacity(SourceTable::ALL.len());
    let mut cleaning = Vec::with_capacity(SourceTable::ALL.len());

    for source in SourceTable::ALL {
        let table = raw
            .remove(&source)
            .ok_or_else(|| PipelineError::MissingSource(source.name().to_string()))?;
        let rows_in = table.height();
        let table = clean(table)?;
        cleaning.push(CleaningSummary {
            source,
            rows_in,
            rows_out: table.height(),
        });
        cleaned.insert(source, table);
    }

    let mut dimensions = Vec::with_capacity(DIMENSIONS.len());
    for dimension in &DIMENSIONS {
        dimensions.push(build_dimension(dimension, cleaned_table(&cleaned, dimension.source)?)?);
    }

    let items = project(
        cleaned_table(&cleaned, SourceTable::OrderItems)?,
        SourceTable::OrderItems.staged_columns(),
    )?;
    let fact = build_fact(
        &items,
        find_dimension(&dimensions, "dim_orders")?,
        find_dimension(&dimensions, "dim_products")?,
        find_dimension(&dimensions, "dim_sellers")?,
        find_dimension(&dimensions, "dim_payments")?,
        find_dimension(&dimensions, "dim_reviews")?,
    )?;

    Ok(StagedTables {
        dimensions,
        fact,
        cleaning,
    })
}

fn cleaned_table(cleaned: &HashMap<SourceTable, Table>, source: SourceTable) -> Result<&Table> {
    cleaned
        .get(&source)
        .ok_or_else(|| PipelineError::MissingSource(source.name().to_string()))
}

fn find_dimension<'a>(dimensions: &'a [Table], name: &str) -> Result<&'a Table> {
    dimensions
        .iter()
        .find(|table| table.name() == name)
        .ok_or_else(|| PipelineError::MissingSource(name.to_string()))
}

/// Lists the landing prefix once and names every expected extract that is absent.
async fn ensure_extracts_present(source: &dyn BucketStore, layout: &StageLayout) -> Result<()> {
    let available = source
        .list_prefix(&layout.source_prefix)
        .await
        .map_err(|err| PipelineError::Read {
            key: layout.source_prefix.clone(),
            source: err,
        })?;

    let missing: Vec<&str> = SourceTable::ALL
        .iter()
        .map(|table| table.file_name())
        .filter(|file_name| !available.contains(&layout.source_key(file_name)))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingSource(missing.join(", ")))
    }
}

/// Reads the eight raw extracts, stages them, and publishes every output with full
/// overwrite semantics.
pub async fn run_staging(
    source: &dyn BucketStore,
    destination: &dyn BucketStore,
    layout: &StageLayout,
) -> Result<StagingReport> {
    ensure_extracts_present(source, layout).await?;

    let mut raw = HashMap::with_capacity(SourceTable::ALL.len());
    for table in SourceTable::ALL {
        let key = layout.source_key(table.file_name());
        let bytes = source
            .get_object(&key)
            .await
            .map_err(|err| PipelineError::Read {
                key: key.clone(),
                source: err,
            })?;
        let parsed = read_csv(table.name(), &bytes)?;
        info!(key = %key, rows = parsed.height(), "read raw extract");
        raw.insert(table, parsed);
    }

    let staged = stage_tables(raw)?;
    let cleaning = staged.cleaning.clone();
    let outputs = staged.into_outputs();
    let manifest = publish_tables(destination, layout, STAGE_NAME, &outputs).await?;

    info!(run_id = %manifest.run_id, outputs = manifest.outputs.len(), "staging run complete");
    Ok(StagingReport { cleaning, manifest })
}
