use thiserror::Error;
use vendas_bucket::BucketError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: BucketError,
    },

    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: BucketError,
    },

    #[error("missing source extracts: {0}")]
    MissingSource(String),

    #[error("table {table} is missing column {column}")]
    MissingColumn { table: String, column: String },

    #[error("table {table} has duplicate column {column} after trimming headers")]
    DuplicateColumn { table: String, column: String },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("dataset download failed: {0}")]
    Download(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
