//! Error types for the segmentation pipeline

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Problems with the shape or readability of the input dataset.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing required columns {missing:?} (found {found:?})")]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("failed to read dataset {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("column {0} appears more than once after trimming names")]
    DuplicateColumn(String),

    #[error("unsupported dataset format {0:?}, expected .csv or .parquet")]
    UnsupportedFormat(PathBuf),
}

/// Fatal pipeline errors. Soft conditions (zero-variance features, empty
/// segments) are absorbed by the stage that meets them.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("dataset contains no valid transactions ({dropped} rows removed during cleaning)")]
    EmptyDataset { dropped: usize },

    #[error("only {distinct} distinct customer profiles, cannot fill {requested} segments")]
    TooFewCustomers { distinct: usize, requested: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("column {column} contains a null value after cleaning")]
    UnexpectedNull { column: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}
