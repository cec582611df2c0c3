//! Local error type for the `archethic-crypto` crate.

use archethic_types::error::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("unsupported curve id {0}")]
    UnsupportedCurve(u8),
    #[error("unsupported hash algo id {0}")]
    UnsupportedHashAlgo(u8),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("underlying cryptographic operation failed: {0}")]
    Backend(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedCurve(_) => "CRYPTO_UNSUPPORTED_CURVE",
            Self::UnsupportedHashAlgo(_) => "CRYPTO_UNSUPPORTED_HASH_ALGO",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::InvalidSignature(_) => "CRYPTO_INVALID_SIGNATURE",
            Self::VerificationFailed => "CRYPTO_VERIFICATION_FAILED",
            Self::Backend(_) => "CRYPTO_BACKEND_ERROR",
        }
    }
}
