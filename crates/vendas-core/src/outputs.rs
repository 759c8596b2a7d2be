use std::io::Cursor;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use vendas_bucket::BucketStore;

use crate::config::StageLayout;
use crate::error::{PipelineError, Result};
use crate::table::Table;

/// Written after every output of a run; its presence and freshness mark a successful run.
pub const MANIFEST_FILE: &str = "_manifest.json";

const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub name: String,
    pub key: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub stage: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub outputs: Vec<OutputSummary>,
}

impl RunManifest {
    pub fn output(&self, name: &str) -> Option<&OutputSummary> {
        self.outputs.iter().find(|output| output.name == name)
    }
}

pub fn parquet_file_name(table: &str) -> String {
    format!("{table}.parquet")
}

/// Encodes every table before the first write, so an encoding failure writes nothing.
/// Writes then happen in order with the manifest last; a failed write leaves the
/// earlier outputs of this run in place and no fresh manifest.
pub async fn publish_tables(
    destination: &dyn BucketStore,
    layout: &StageLayout,
    stage: &str,
    tables: &[Table],
) -> Result<RunManifest> {
    let mut encoded = Vec::with_capacity(tables.len());
    for table in tables {
        let key = layout.destination_key(&parquet_file_name(table.name()));
        let bytes = create_parquet_bytes(table.frame())?;
        let summary = OutputSummary {
            name: table.name().to_string(),
            key,
            rows: table.height(),
            columns: table.frame().width(),
        };
        encoded.push((summary, bytes));
    }

    let mut outputs = Vec::with_capacity(encoded.len());
    for (summary, bytes) in encoded {
        put(destination, &summary.key, Bytes::from(bytes), PARQUET_CONTENT_TYPE).await?;
        info!(
            stage,
            table = %summary.name,
            key = %summary.key,
            rows = summary.rows,
            "wrote output table"
        );
        outputs.push(summary);
    }

    let manifest = RunManifest {
        stage: stage.to_string(),
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        outputs,
    };
    let manifest_key = layout.destination_key(MANIFEST_FILE);
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
    put(
        destination,
        &manifest_key,
        Bytes::from(manifest_bytes),
        "application/json",
    )
    .await?;

    Ok(manifest)
}

pub async fn fetch_manifest(
    source: &dyn BucketStore,
    layout: &StageLayout,
) -> Result<RunManifest> {
    let key = layout.source_key(MANIFEST_FILE);
    let bytes = source
        .get_object(&key)
        .await
        .map_err(|source| PipelineError::Read { key, source })?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn create_parquet_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut clone = df.clone();
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)?;
    }
    Ok(buffer)
}

async fn put(
    destination: &dyn BucketStore,
    key: &str,
    bytes: Bytes,
    content_type: &str,
) -> Result<()> {
    destination
        .put_object(key, bytes, content_type)
        .await
        .map_err(|source| PipelineError::Write {
            key: key.to_string(),
            source,
        })
}
