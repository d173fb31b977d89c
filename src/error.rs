use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type shared by the loader, the filter/aggregate engine and the config layer.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("data source '{}' not found", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    /// A column a named dashboard view depends on is missing from the dataset.
    #[error("view '{view}' requires column '{column}', which the dataset does not have")]
    SchemaMismatch { view: String, column: String },

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    /// Structural problem in an otherwise readable file (bad row shape, wrong JSON layout).
    #[error("malformed data: {0:#}")]
    Malformed(#[from] anyhow::Error),
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
