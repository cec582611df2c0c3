//! Error types for the wire/on-disk data model.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Errors raised while decoding or constructing addresses, keys, transactions
/// and their on-disk record forms.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer ended before the self-describing header could be read.
    #[error("truncated record")]
    Truncated,
    /// A curve id byte did not match any known scheme.
    #[error("unknown curve id {0}")]
    UnknownCurveId(u8),
    /// A hash algorithm id byte did not match any known scheme.
    #[error("unknown hash algo id {0}")]
    UnknownHashAlgoId(u8),
    /// A digest did not have the length its hash algo id implies.
    #[error("digest length mismatch: expected {expected}, got {got}")]
    DigestLengthMismatch { expected: usize, got: usize },
    /// A key did not have the length its curve id implies.
    #[error("key length mismatch: expected {expected}, got {got}")]
    KeyLengthMismatch { expected: usize, got: usize },
    /// A transaction or record tag byte did not match any known variant.
    #[error("unknown tag {0}")]
    UnknownTag(u8),
    /// A transaction type id byte did not match any known variant.
    #[error("unknown transaction type id {0}")]
    UnknownTransactionType(u8),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Truncated => "CODEC_TRUNCATED",
            Self::UnknownCurveId(_) => "CODEC_UNKNOWN_CURVE",
            Self::UnknownHashAlgoId(_) => "CODEC_UNKNOWN_HASH_ALGO",
            Self::DigestLengthMismatch { .. } => "CODEC_DIGEST_LENGTH_MISMATCH",
            Self::KeyLengthMismatch { .. } => "CODEC_KEY_LENGTH_MISMATCH",
            Self::UnknownTag(_) => "CODEC_UNKNOWN_TAG",
            Self::UnknownTransactionType(_) => "CODEC_UNKNOWN_TX_TYPE",
        }
    }
}
