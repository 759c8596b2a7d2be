#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;
use vendas_bucket::{BucketStore, MemoryBucketStore};
use vendas_core::dataset::SourceTable;

pub fn fixture_path(file_name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(file_name)
}

pub fn fixture_bytes(source: SourceTable) -> Result<Vec<u8>> {
    let path = fixture_path(source.file_name());
    std::fs::read(&path).with_context(|| format!("reading fixture {}", path.display()))
}

/// A landing bucket holding every raw extract under `prefix`.
pub async fn landed_fixtures(prefix: &str) -> Result<MemoryBucketStore> {
    let store = MemoryBucketStore::new();
    for source in SourceTable::ALL {
        let key = format!("{prefix}{}", source.file_name());
        store
            .put_object(&key, Bytes::from(fixture_bytes(source)?), "text/csv")
            .await?;
    }
    Ok(store)
}
