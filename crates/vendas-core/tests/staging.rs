mod common;

use std::collections::HashMap;

use anyhow::Result;
use polars::prelude::*;
use vendas_bucket::{BucketStore, MemoryBucketStore};
use vendas_core::cleaning::UNKNOWN_TEXT;
use vendas_core::config::StageLayout;
use vendas_core::dataset::{SourceTable, DIMENSIONS, FACT_ORDER_DETAILS};
use vendas_core::outputs::{fetch_manifest, parquet_file_name, MANIFEST_FILE};
use vendas_core::staging::{run_staging, stage_tables, STAGE_NAME};
use vendas_core::table::{read_csv, read_parquet};
use vendas_core::{PipelineError, Table};

use common::{fixture_bytes, landed_fixtures};

fn raw_tables() -> Result<HashMap<SourceTable, Table>> {
    let mut raw = HashMap::new();
    for source in SourceTable::ALL {
        raw.insert(source, read_csv(source.name(), &fixture_bytes(source)?)?);
    }
    Ok(raw)
}

fn layout() -> StageLayout {
    StageLayout {
        source_prefix: "raw/".to_string(),
        destination_prefix: "stg/".to_string(),
    }
}

fn strings(table: &Table, column: &str) -> Result<Vec<Option<String>>> {
    Ok(table
        .column(column)?
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

#[test]
fn staging_produces_seven_dimensions_and_the_fact() -> Result<()> {
    let staged = stage_tables(raw_tables()?)?;

    let names: Vec<&str> = staged.dimensions.iter().map(|table| table.name()).collect();
    let expected: Vec<&str> = DIMENSIONS.iter().map(|dim| dim.name).collect();
    assert_eq!(names, expected);
    assert_eq!(staged.fact.name(), FACT_ORDER_DETAILS);
    assert_eq!(staged.cleaning.len(), SourceTable::ALL.len());

    for table in staged.dimensions.iter().chain(std::iter::once(&staged.fact)) {
        if table.name() == FACT_ORDER_DETAILS {
            continue;
        }
        for column in table.frame().get_columns() {
            assert_eq!(column.null_count(), 0, "{}.{} has nulls", table.name(), column.name());
        }
    }
    Ok(())
}

#[test]
fn duplicates_are_removed_before_projection() -> Result<()> {
    let staged = stage_tables(raw_tables()?)?;

    let customers = staged.dimension("dim_customers").expect("customers");
    assert_eq!(customers.height(), 3);
    let geolocation = staged.dimension("dim_geolocation").expect("geolocation");
    assert_eq!(geolocation.height(), 2);

    let summary = staged
        .cleaning
        .iter()
        .find(|summary| summary.source == SourceTable::Customers)
        .expect("customers summary");
    assert_eq!((summary.rows_in, summary.rows_out), (4, 3));
    Ok(())
}

#[test]
fn dimension_values_are_cleaned() -> Result<()> {
    let staged = stage_tables(raw_tables()?)?;

    let customers = staged.dimension("dim_customers").expect("customers");
    assert_eq!(
        strings(customers, "customer_city")?,
        [
            Some("sao paulo".to_string()),
            Some("sao bernardo do campo".to_string()),
            Some("brasilia".to_string()),
        ]
    );
    assert_eq!(
        strings(customers, "customer_state")?,
        [Some("sp".to_string()), Some("sp".to_string()), Some("df".to_string())]
    );

    let products = staged.dimension("dim_products").expect("products");
    assert_eq!(
        strings(products, "product_category_name")?[1].as_deref(),
        Some(UNKNOWN_TEXT)
    );
    let weights = products.column("product_weight_g")?.cast(&DataType::Float64)?;
    // median of 225 and 1000
    assert_eq!(weights.f64()?.get(2), Some(612.5));

    let reviews = staged.dimension("dim_reviews").expect("reviews");
    assert_eq!(reviews.column("review_score")?.f64()?.get(1), Some(2.5));
    assert_eq!(
        strings(reviews, "review_comment_title")?,
        [
            Some(UNKNOWN_TEXT.to_string()),
            Some("atrasou".to_string()),
            Some(UNKNOWN_TEXT.to_string()),
        ]
    );

    let payments = staged.dimension("dim_payments").expect("payments");
    assert_eq!(payments.column("payment_value")?.f64()?.get(1), Some(0.0));

    let orders = staged.dimension("dim_orders").expect("orders");
    assert_eq!(
        strings(orders, "order_purchase_timestamp")?[0].as_deref(),
        Some("20171002 105633")
    );
    assert_eq!(
        strings(orders, "order_delivered_customer_date")?[2].as_deref(),
        Some(UNKNOWN_TEXT)
    );
    assert!(orders.column("order_delivered_carrier_date").is_err());
    Ok(())
}

#[test]
fn header_whitespace_is_trimmed() -> Result<()> {
    let staged = stage_tables(raw_tables()?)?;
    let sellers = staged.dimension("dim_sellers").expect("sellers");
    assert_eq!(
        strings(sellers, "seller_city")?,
        [Some("campinas".to_string()), Some("sao paulo".to_string())]
    );
    Ok(())
}

#[test]
fn fact_keeps_every_item_with_fan_out() -> Result<()> {
    let staged = stage_tables(raw_tables()?)?;
    let fact = &staged.fact;

    assert_eq!(fact.height(), 6);
    let prices = fact.column("price")?.f64()?;
    let orders = fact.column("order_id")?.str()?;
    let canceled = orders
        .into_iter()
        .zip(prices.into_iter())
        .find(|(order, _)| *order == Some("o3"))
        .and_then(|(_, price)| price);
    // the missing price was filled with the median item price
    assert_eq!(canceled, Some(29.99));
    Ok(())
}

#[test]
fn a_missing_source_stages_nothing() -> Result<()> {
    let mut raw = raw_tables()?;
    raw.remove(&SourceTable::Geolocation);

    match stage_tables(raw) {
        Err(PipelineError::MissingSource(name)) => assert_eq!(name, "geolocation"),
        other => panic!("unexpected result: {:?}", other.map(|staged| staged.fact.height())),
    }
    Ok(())
}

#[tokio::test]
async fn run_staging_publishes_outputs_then_manifest() -> Result<()> {
    let landing = landed_fixtures("raw/").await?;
    let staging = MemoryBucketStore::new();

    let report = run_staging(&landing, &staging, &layout()).await?;

    assert_eq!(report.manifest.stage, STAGE_NAME);
    assert_eq!(report.manifest.outputs.len(), DIMENSIONS.len() + 1);
    // seven dimensions, the fact and the manifest
    assert_eq!(staging.len(), DIMENSIONS.len() + 2);
    assert!(staging.contains(&format!("stg/{MANIFEST_FILE}")));

    let manifest = fetch_manifest(
        &staging,
        &StageLayout {
            source_prefix: "stg/".to_string(),
            destination_prefix: String::new(),
        },
    )
    .await?;
    assert_eq!(manifest, report.manifest);

    let fact_summary = manifest.output(FACT_ORDER_DETAILS).expect("fact summary");
    assert_eq!(fact_summary.key, format!("stg/{}", parquet_file_name(FACT_ORDER_DETAILS)));
    assert_eq!(fact_summary.rows, 6);

    let fact = read_parquet(FACT_ORDER_DETAILS, &staging.get_object(&fact_summary.key).await?)?;
    assert_eq!(fact.height(), 6);
    assert_eq!(fact.frame().width(), fact_summary.columns);
    Ok(())
}

#[tokio::test]
async fn rerunning_staging_overwrites_outputs() -> Result<()> {
    let landing = landed_fixtures("raw/").await?;
    let staging = MemoryBucketStore::new();

    let first = run_staging(&landing, &staging, &layout()).await?;
    let second = run_staging(&landing, &staging, &layout()).await?;

    assert_ne!(first.manifest.run_id, second.manifest.run_id);
    assert_eq!(staging.len(), DIMENSIONS.len() + 2);
    let key = format!("stg/{}", parquet_file_name("dim_customers"));
    let customers = read_parquet("dim_customers", &staging.get_object(&key).await?)?;
    assert_eq!(customers.height(), 3);
    Ok(())
}

#[tokio::test]
async fn missing_extract_writes_nothing() -> Result<()> {
    let landing = landed_fixtures("raw/").await?;
    landing
        .delete_object(&format!("raw/{}", SourceTable::Sellers.file_name()))
        .await?;
    let staging = MemoryBucketStore::new();

    let result = run_staging(&landing, &staging, &layout()).await;

    match result {
        Err(PipelineError::MissingSource(names)) => {
            assert_eq!(names, SourceTable::Sellers.file_name());
        }
        other => panic!("unexpected result: {:?}", other.map(|report| report.manifest)),
    }
    assert!(staging.is_empty());
    Ok(())
}

#[tokio::test]
async fn every_missing_extract_is_named_before_reading() -> Result<()> {
    let landing = MemoryBucketStore::new();
    landing
        .put_object(
            &format!("raw/{}", SourceTable::Customers.file_name()),
            fixture_bytes(SourceTable::Customers)?.into(),
            "text/csv",
        )
        .await?;
    // an extract under another prefix does not count
    landing
        .put_object(
            SourceTable::Orders.file_name(),
            fixture_bytes(SourceTable::Orders)?.into(),
            "text/csv",
        )
        .await?;
    let staging = MemoryBucketStore::new();

    let result = run_staging(&landing, &staging, &layout()).await;

    let Err(PipelineError::MissingSource(names)) = result else {
        panic!("expected missing extracts");
    };
    let named: Vec<&str> = names.split(", ").collect();
    assert_eq!(named.len(), SourceTable::ALL.len() - 1);
    assert!(named.contains(&SourceTable::Orders.file_name()));
    assert!(!named.contains(&SourceTable::Customers.file_name()));
    assert!(staging.is_empty());
    Ok(())
}
