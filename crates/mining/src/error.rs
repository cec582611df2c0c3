//! Local error type for the `archethic-mining` crate.

use archethic_types::error::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiningError {
    #[error("transaction failed local validation: {0}")]
    InvalidTransaction(String),
    #[error("no origin key verified the transaction's origin signature")]
    UnknownProofOfWork,
    #[error("underlying crypto operation failed: {0}")]
    Crypto(String),
    #[error("underlying election failed: {0}")]
    Election(String),
    #[error("underlying network send failed: {0}")]
    Network(String),
    #[error("underlying storage operation failed: {0}")]
    Storage(#[from] archethic_storage::StorageError),
    #[error("consensus not reached: cross-validators disagree")]
    ConsensusFailure,
}

impl ErrorCode for MiningError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransaction(_) => "MINING_INVALID_TRANSACTION",
            Self::UnknownProofOfWork => "MINING_UNKNOWN_PROOF_OF_WORK",
            Self::Crypto(_) => "MINING_CRYPTO_ERROR",
            Self::Election(_) => "MINING_ELECTION_ERROR",
            Self::Network(_) => "MINING_NETWORK_ERROR",
            Self::Storage(_) => "MINING_STORAGE_ERROR",
            Self::ConsensusFailure => "MINING_CONSENSUS_FAILURE",
        }
    }
}
