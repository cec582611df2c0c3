//! Local error type for the `archethic-storage` crate.

use archethic_types::error::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("transaction not found")]
    NotFound,
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("record decode failed: {0}")]
    Decode(#[from] archethic_types::error::CodecError),
    #[error("beacon summary already exists at {0}")]
    SummaryAlreadyExists(String),
    #[error("chain stats overflowed for genesis {0}")]
    StatsOverflow(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "STORAGE_NOT_FOUND",
            Self::Io { .. } => "STORAGE_IO_ERROR",
            Self::Decode(_) => "STORAGE_DECODE_ERROR",
            Self::SummaryAlreadyExists(_) => "STORAGE_SUMMARY_EXISTS",
            Self::StatsOverflow(_) => "STORAGE_STATS_OVERFLOW",
        }
    }
}
