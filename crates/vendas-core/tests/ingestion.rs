mod common;

use std::io::{Cursor, Write};

use anyhow::Result;
use vendas_bucket::{BucketStore, MemoryBucketStore};
use vendas_core::dataset::SourceTable;
use vendas_core::ingestion::{extract_csv_entries, land_files};
use vendas_core::PipelineError;
use zip::write::FileOptions;
use zip::ZipWriter;

use common::fixture_bytes;

fn archive(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, FileOptions::default())?;
        writer.write_all(contents)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[test]
fn csv_entries_are_extracted_by_base_name() -> Result<()> {
    let bytes = archive(&[
        ("olist/olist_sellers_dataset.csv", &b"seller_id\ns1\n"[..]),
        ("README.md", &b"not a table"[..]),
        ("product_category_name_translation.csv", &b"a,b\n"[..]),
    ])?;

    let files = extract_csv_entries(&bytes)?;

    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(
        names,
        ["olist_sellers_dataset.csv", "product_category_name_translation.csv"]
    );
    assert_eq!(files[0].contents.as_ref(), b"seller_id\ns1\n");
    assert_eq!(files[0].hash.len(), 64);
    assert_ne!(files[0].hash, files[1].hash);
    Ok(())
}

#[test]
fn garbage_is_not_an_archive() {
    assert!(matches!(
        extract_csv_entries(b"definitely not a zip"),
        Err(PipelineError::Archive(_))
    ));
}

#[tokio::test]
async fn landing_writes_every_extract_under_the_prefix() -> Result<()> {
    let mut entries = Vec::new();
    for source in SourceTable::ALL {
        entries.push((source.file_name(), fixture_bytes(source)?));
    }
    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, contents)| (*name, contents.as_slice()))
        .collect();
    let files = extract_csv_entries(&archive(&borrowed)?)?;

    let landing = MemoryBucketStore::new();
    let report = land_files(files, &landing, "raw/").await?;

    assert!(report.missing_sources.is_empty());
    assert_eq!(report.files.len(), SourceTable::ALL.len());
    assert_eq!(landing.len(), SourceTable::ALL.len());

    let key = format!("raw/{}", SourceTable::Orders.file_name());
    assert_eq!(
        landing.get_object(&key).await?.as_ref(),
        fixture_bytes(SourceTable::Orders)?.as_slice()
    );
    Ok(())
}

#[tokio::test]
async fn missing_extracts_are_reported_not_fatal() -> Result<()> {
    let bytes = archive(&[(
        SourceTable::Customers.file_name(),
        fixture_bytes(SourceTable::Customers)?.as_slice(),
    )])?;
    let files = extract_csv_entries(&bytes)?;

    let landing = MemoryBucketStore::new();
    let report = land_files(files, &landing, "").await?;

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.missing_sources.len(), SourceTable::ALL.len() - 1);
    assert!(!report
        .missing_sources
        .iter()
        .any(|name| name == SourceTable::Customers.file_name()));
    assert!(landing.contains(SourceTable::Customers.file_name()));
    Ok(())
}
