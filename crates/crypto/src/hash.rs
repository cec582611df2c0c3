//! Hash functions keyed by the wire `hash_algo_id` byte.

use crate::error::CryptoError;
use archethic_types::keys::HashAlgoId;
use dcrypt::algorithms::hash::sha2::{Sha256 as DcryptSha256, Sha512 as DcryptSha512};
use dcrypt::algorithms::hash::HashFunction as DcryptHashFunction;
use dcrypt::algorithms::ByteSerializable;

/// A hash function identified by a wire [`HashAlgoId`].
pub trait HashFunction {
    fn hash(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn digest_size(&self) -> usize;
}

#[derive(Default, Clone)]
pub struct Sha256Hash;

impl HashFunction for Sha256Hash {
    fn hash(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = DcryptSha256::digest(message).map_err(|e| CryptoError::Backend(e.to_string()))?;
        Ok(digest.to_bytes())
    }

    fn digest_size(&self) -> usize {
        32
    }
}

#[derive(Default, Clone)]
pub struct Sha512Hash;

impl HashFunction for Sha512Hash {
    fn hash(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = DcryptSha512::digest(message).map_err(|e| CryptoError::Backend(e.to_string()))?;
        Ok(digest.to_bytes())
    }

    fn digest_size(&self) -> usize {
        64
    }
}

/// Dispatches to the hash function named by a wire hash algo id. `Sha3_256` and
/// `Blake2b` share byte layouts with `Sha256`/`Sha512` respectively but are not
/// wired to a concrete backend; callers needing them should extend this match.
pub fn hash_with(hash_algo_id: u8, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match HashAlgoId::from_id(hash_algo_id).map_err(|_| CryptoError::UnsupportedHashAlgo(hash_algo_id))? {
        HashAlgoId::Sha256 => Sha256Hash.hash(message),
        HashAlgoId::Sha512 => Sha512Hash.hash(message),
        HashAlgoId::Sha3_256 | HashAlgoId::Blake2b => Err(CryptoError::UnsupportedHashAlgo(hash_algo_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_digest_size_matches_output() {
        let digest = hash_with(HashAlgoId::Sha256.id(), b"archethic").unwrap();
        assert_eq!(digest.len(), 32);
    }

    #[test]
    fn unsupported_algo_is_reported() {
        let err = hash_with(HashAlgoId::Blake2b.id(), b"x").unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedHashAlgo(_)));
    }
}
