//! Local error type for the `archethic-election` crate.

use archethic_types::error::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("no nodes available to elect from")]
    EmptyNodeList,
    #[error("underlying hashing failed: {0}")]
    Hashing(String),
}

impl ErrorCode for ElectionError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyNodeList => "ELECTION_EMPTY_NODE_LIST",
            Self::Hashing(_) => "ELECTION_HASHING_FAILED",
        }
    }
}
