pub mod cleaning;
pub mod config;
pub mod dataset;
pub mod dimensions;
pub mod error;
pub mod fact;
pub mod ingestion;
pub mod normalize;
pub mod outputs;
pub mod refined;
pub mod staging;
pub mod table;

pub use error::{PipelineError, Result};
pub use table::{ColumnKind, Table, TableSchema};
