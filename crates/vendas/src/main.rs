use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vendas_bucket::{BucketStore, LocalBucketStore, S3BucketStore};
use vendas_core::config::{PipelineConfig, StorageKind};
use vendas_core::ingestion::{run_ingest, IngestReport};
use vendas_core::outputs::RunManifest;
use vendas_core::refined::{run_refine, RefineReport};
use vendas_core::staging::{run_staging, StagingReport};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Olist sales pipeline: landing, staging and refined layers",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// TOML config file; environment variables override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the dataset archive and land its CSV extracts
    Ingest,
    /// Clean the landed extracts into dimensions and the order details fact
    Stage,
    /// Derive the business analyses from the staged tables
    Refine,
    /// Stage, then refine
    Run(RunArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Download and land the dataset before staging
    #[arg(long)]
    ingest: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.global.config.as_deref())
        .context("failed to load pipeline configuration")?;
    info!(?config, "loaded configuration");

    let result = match cli.command {
        Command::Ingest => handle_ingest(&config).await,
        Command::Stage => handle_stage(&config).await,
        Command::Refine => handle_refine(&config).await,
        Command::Run(args) => handle_run(&config, args).await,
    };
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "pipeline command failed");
    }
    result
}

async fn open_store(config: &PipelineConfig, bucket: &str) -> Result<Box<dyn BucketStore>> {
    match config.storage {
        StorageKind::S3 => {
            let store = S3BucketStore::new(config.s3_config(bucket))
                .await
                .with_context(|| format!("failed to configure S3 bucket '{bucket}'"))?;
            Ok(Box::new(store))
        }
        StorageKind::Local => Ok(Box::new(LocalBucketStore::new(
            config.local_bucket_root(bucket),
        ))),
    }
}

async fn handle_ingest(config: &PipelineConfig) -> Result<()> {
    let credentials = config.kaggle_credentials()?;
    let landing = open_store(config, &config.landing_bucket).await?;
    let client = reqwest::Client::new();

    let report = run_ingest(
        &client,
        &config.dataset_url,
        &credentials,
        landing.as_ref(),
        &config.landing_prefix,
    )
    .await?;
    print_ingest(&report);
    Ok(())
}

async fn handle_stage(config: &PipelineConfig) -> Result<()> {
    let landing = open_store(config, &config.landing_bucket).await?;
    let staging = open_store(config, &config.staging_bucket).await?;

    let report = run_staging(landing.as_ref(), staging.as_ref(), &config.staging_layout()).await?;
    print_staging(&report);
    Ok(())
}

async fn handle_refine(config: &PipelineConfig) -> Result<()> {
    let staging = open_store(config, &config.staging_bucket).await?;
    let refined = open_store(config, &config.refined_bucket).await?;

    let report = run_refine(staging.as_ref(), refined.as_ref(), &config.refine_layout()).await?;
    print_refine(&report);
    Ok(())
}

async fn handle_run(config: &PipelineConfig, args: RunArgs) -> Result<()> {
    if args.ingest {
        handle_ingest(config).await?;
    }
    handle_stage(config).await?;
    handle_refine(config).await
}

fn print_ingest(report: &IngestReport) {
    println!("Landed {} files:", report.files.len());
    for file in &report.files {
        println!("  {} ({} bytes, blake3 {})", file.key, file.size, file.hash);
    }
    if !report.missing_sources.is_empty() {
        println!("Archive was missing {} expected extracts:", report.missing_sources.len());
        for name in &report.missing_sources {
            println!("  {name}");
        }
    }
}

fn print_staging(report: &StagingReport) {
    println!("Cleaned sources:");
    for summary in &report.cleaning {
        println!(
            "  {:<12} {:>8} rows in, {:>8} rows out",
            summary.source.name(),
            summary.rows_in,
            summary.rows_out
        );
    }
    print_manifest(&report.manifest);
}

fn print_refine(report: &RefineReport) {
    println!("Refined from {} fact rows.", report.fact_rows);
    print_manifest(&report.manifest);
}

fn print_manifest(manifest: &RunManifest) {
    println!(
        "Run {} ({} stage) wrote {} tables:",
        manifest.run_id,
        manifest.stage,
        manifest.outputs.len()
    );
    for output in &manifest.outputs {
        println!(
            "  {:<22} {:>8} rows {:>3} cols  {}",
            output.name, output.rows, output.columns, output.key
        );
    }
}
