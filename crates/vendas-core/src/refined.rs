//! Refined layer: business analyses derived from the staged fact table.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::info;
use vendas_bucket::BucketStore;

use crate::config::StageLayout;
use crate::dataset::FACT_ORDER_DETAILS;
use crate::error::{PipelineError, Result};
use crate::outputs::{parquet_file_name, publish_tables, RunManifest};
use crate::table::{read_parquet, Table};

pub const STAGE_NAME: &str = "refined";

pub const PRODUCT_PERFORMANCE: &str = "product_performance";
pub const REGIONAL_SALES: &str = "regional_sales";
pub const PAYMENT_ANALYSIS: &str = "payment_analysis";
pub const FRAUD_ANALYSIS: &str = "fraud_analysis";
pub const DELIVERY_ANALYSIS: &str = "delivery_analysis";

/// Deliveries slower than this many days count as delayed.
const DELAY_THRESHOLD_DAYS: i64 = 5;
/// A payment above this multiple of the mean payment marks its category as suspicious.
const SUSPICIOUS_PAYMENT_FACTOR: f64 = 3.0;
const CANCELED_STATUS: &str = "canceled";
const SECONDS_PER_DAY: i64 = 86_400;

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y%m%d %H%M%S",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

const FACT_COLUMNS: [&str; 8] = [
    "product_id",
    "order_item_id",
    "price",
    "order_status",
    "customer_id",
    "payment_type",
    "payment_value",
    "review_score",
];

#[derive(Debug, Clone, Serialize)]
pub struct RefineReport {
    pub fact_rows: usize,
    pub manifest: RunManifest,
}

/// Parses a staged timestamp. Accepts the raw extract layout and the layout left behind
/// by text normalization, which strips `-` and `:`.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
}

/// Whole days between purchase and delivery, floored. Unparseable values give null.
fn delivery_days(purchased: &Column, delivered: &Column) -> Result<Series> {
    let purchased = purchased.cast(&DataType::String)?;
    let delivered = delivered.cast(&DataType::String)?;

    let days: Vec<Option<i64>> = purchased
        .str()?
        .into_iter()
        .zip(delivered.str()?.into_iter())
        .map(|(start, end)| {
            let start = parse_timestamp(start?)?;
            let end = parse_timestamp(end?)?;
            Some((end - start).num_seconds().div_euclid(SECONDS_PER_DAY))
        })
        .collect();

    Ok(Series::new("delivery_time_days".into(), days))
}

/// Adds `delivery_time_days` and `total_order_value`, and zero-fills `payment_value`.
pub fn enrich_fact(fact: &Table) -> Result<DataFrame> {
    fact.require(&FACT_COLUMNS)?;
    fact.require(&["order_purchase_timestamp", "order_delivered_customer_date"])?;

    let days = delivery_days(
        fact.column("order_purchase_timestamp")?,
        fact.column("order_delivered_customer_date")?,
    )?;

    let mut frame = fact.frame().clone();
    frame.with_column(days)?;

    let enriched = frame
        .lazy()
        .with_columns([
            col("payment_value")
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
                .alias("payment_value"),
            col("price").alias("total_order_value"),
        ])
        .collect()?;
    Ok(enriched)
}

pub fn product_performance(fact: &DataFrame, products: &Table) -> Result<Table> {
    products.require(&["product_id", "product_category_name"])?;

    let frame = fact
        .clone()
        .lazy()
        .filter(col("product_id").is_not_null())
        .group_by([col("product_id")])
        .agg([
            col("order_item_id").count().alias("product_sales_volume"),
            col("total_order_value").sum().alias("product_sales_value"),
            (col("order_status")
                .eq(lit(CANCELED_STATUS))
                .sum()
                .cast(DataType::Float64)
                / col("order_status").count().cast(DataType::Float64))
            .alias("product_return_rate"),
            col("review_score").mean().alias("average_review_score"),
        ])
        .join(
            products
                .frame()
                .clone()
                .lazy()
                .select([col("product_id"), col("product_category_name")]),
            [col("product_id")],
            [col("product_id")],
            JoinArgs::new(JoinType::Left),
        )
        .sort(["product_id"], SortMultipleOptions::default())
        .collect()?;

    Ok(Table::new(PRODUCT_PERFORMANCE, frame))
}

fn with_customer_location(fact: &DataFrame, customers: &Table) -> Result<LazyFrame> {
    customers.require(&["customer_id", "customer_city", "customer_state"])?;
    let locations = customers.frame().clone().lazy().select([
        col("customer_id"),
        col("customer_city"),
        col("customer_state"),
    ]);
    Ok(fact.clone().lazy().join(
        locations,
        [col("customer_id")],
        [col("customer_id")],
        JoinArgs::new(JoinType::Left),
    ))
}

fn location_keys() -> [Expr; 3] {
    [col("customer_state"), col("customer_city"), col("product_id")]
}

fn keys_present() -> Expr {
    col("customer_state")
        .is_not_null()
        .and(col("customer_city").is_not_null())
        .and(col("product_id").is_not_null())
}

pub fn regional_sales(fact: &DataFrame, customers: &Table) -> Result<Table> {
    let frame = with_customer_location(fact, customers)?
        .filter(keys_present())
        .group_by(location_keys())
        .agg([
            col("order_item_id").count().alias("regional_sales_volume"),
            col("total_order_value").sum().alias("regional_sales_value"),
        ])
        .sort(
            ["customer_state", "customer_city", "product_id"],
            SortMultipleOptions::default(),
        )
        .collect()?;

    Ok(Table::new(REGIONAL_SALES, frame))
}

pub fn payment_analysis(fact: &DataFrame) -> Result<Table> {
    let frame = fact
        .clone()
        .lazy()
        .filter(col("payment_type").is_not_null())
        .group_by([col("payment_type")])
        .agg([
            len().alias("payment_frequency"),
            col("payment_value").mean().alias("average_payment_value"),
        ])
        .sort(["payment_type"], SortMultipleOptions::default())
        .collect()?;

    Ok(Table::new(PAYMENT_ANALYSIS, frame))
}

pub fn fraud_analysis(fact: &DataFrame) -> Result<Table> {
    let mean_payment = fact
        .column("payment_value")?
        .as_materialized_series()
        .mean()
        .unwrap_or(0.0);
    let threshold = mean_payment * SUSPICIOUS_PAYMENT_FACTOR;

    let frame = fact
        .clone()
        .lazy()
        .filter(col("product_category_name").is_not_null())
        .group_by([col("product_category_name")])
        .agg([
            col("total_order_value").sum().alias("total_order_value"),
            col("payment_value")
                .gt(lit(threshold))
                .sum()
                .gt(lit(0))
                .alias("is_suspicious_order"),
        ])
        .sort(["product_category_name"], SortMultipleOptions::default())
        .collect()?;

    Ok(Table::new(FRAUD_ANALYSIS, frame))
}

pub fn delivery_analysis(fact: &DataFrame, customers: &Table) -> Result<Table> {
    let known = col("delivery_time_days").count();
    let delayed = col("delivery_time_days")
        .gt(lit(DELAY_THRESHOLD_DAYS))
        .sum()
        .cast(DataType::Float64);

    let frame = with_customer_location(fact, customers)?
        .filter(keys_present())
        .group_by(location_keys())
        .agg([
            col("delivery_time_days")
                .mean()
                .alias("average_delivery_time"),
            when(known.clone().gt(lit(0)))
                .then(delayed / known.cast(DataType::Float64))
                .otherwise(lit(0.0))
                .alias("delivery_delay_rate"),
        ])
        .sort(
            ["customer_state", "customer_city", "product_id"],
            SortMultipleOptions::default(),
        )
        .collect()?;

    Ok(Table::new(DELIVERY_ANALYSIS, frame))
}

/// Every refined table, in publication order.
pub fn refine_tables(fact: &Table, customers: &Table, products: &Table) -> Result<Vec<Table>> {
    let enriched = enrich_fact(fact)?;
    Ok(vec![
        product_performance(&enriched, products)?,
        regional_sales(&enriched, customers)?,
        payment_analysis(&enriched)?,
        fraud_analysis(&enriched)?,
        delivery_analysis(&enriched, customers)?,
    ])
}

async fn read_staged(
    source: &dyn BucketStore,
    layout: &StageLayout,
    name: &str,
) -> Result<Table> {
    let key = layout.source_key(&parquet_file_name(name));
    let bytes = source
        .get_object(&key)
        .await
        .map_err(|err| PipelineError::Read {
            key: key.clone(),
            source: err,
        })?;
    let table = read_parquet(name, &bytes)?;
    info!(key = %key, rows = table.height(), "read staged table");
    Ok(table)
}

pub async fn run_refine(
    source: &dyn BucketStore,
    destination: &dyn BucketStore,
    layout: &StageLayout,
) -> Result<RefineReport> {
    let fact = read_staged(source, layout, FACT_ORDER_DETAILS).await?;
    let customers = read_staged(source, layout, "dim_customers").await?;
    let products = read_staged(source, layout, "dim_products").await?;

    let tables = refine_tables(&fact, &customers, &products)?;
    let manifest = publish_tables(destination, layout, STAGE_NAME, &tables).await?;

    info!(run_id = %manifest.run_id, outputs = manifest.outputs.len(), "refine run complete");
    Ok(RefineReport {
        fact_rows: fact.height(),
        manifest,
    })
}
