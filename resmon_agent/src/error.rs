//! Error types for sampling, encoding, sinks and configuration.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Category;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("{category} sampling failed: {reason}")]
    Provider { category: Category, reason: String },
    #[error("{category} sampling panicked: {detail}")]
    Panicked { category: Category, detail: String },
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv row is not utf-8")]
    Utf8,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("opening {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rotating {path}: {source}")]
    Rotate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("unknown argument {0:?}")]
    UnknownArgument(String),
}

/// Failure of one category inside a tick; never escapes the tick boundary.
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
