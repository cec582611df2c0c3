//! Address and public key layouts, and the curve/hash size lookup tables.

use crate::error::CodecError;
use std::fmt;

/// Identifies the elliptic curve (or other key scheme) a [`PublicKey`] was derived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveId {
    Ed25519,
    P256,
    Secp256k1,
}

impl CurveId {
    pub fn from_id(id: u8) -> Result<Self, CodecError> {
        match id {
            0 => Ok(CurveId::Ed25519),
            1 => Ok(CurveId::P256),
            2 => Ok(CurveId::Secp256k1),
            other => Err(CodecError::UnknownCurveId(other)),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            CurveId::Ed25519 => 0,
            CurveId::P256 => 1,
            CurveId::Secp256k1 => 2,
        }
    }
}

/// Identifies the hash algorithm a digest (inside an [`Address`]) was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgoId {
    Sha256,
    Sha512,
    Sha3_256,
    Blake2b,
}

impl HashAlgoId {
    pub fn from_id(id: u8) -> Result<Self, CodecError> {
        match id {
            0 => Ok(HashAlgoId::Sha256),
            1 => Ok(HashAlgoId::Sha512),
            2 => Ok(HashAlgoId::Sha3_256),
            3 => Ok(HashAlgoId::Blake2b),
            other => Err(CodecError::UnknownHashAlgoId(other)),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            HashAlgoId::Sha256 => 0,
            HashAlgoId::Sha512 => 1,
            HashAlgoId::Sha3_256 => 2,
            HashAlgoId::Blake2b => 3,
        }
    }
}

/// Digest size in bytes for a given hash algorithm id.
pub fn hash_size(id: u8) -> Result<usize, CodecError> {
    Ok(match HashAlgoId::from_id(id)? {
        HashAlgoId::Sha256 => 32,
        HashAlgoId::Sha3_256 => 32,
        HashAlgoId::Blake2b => 64,
        HashAlgoId::Sha512 => 64,
    })
}

/// Public key material size in bytes for a given curve id.
pub fn key_size(id: u8) -> Result<usize, CodecError> {
    Ok(match CurveId::from_id(id)? {
        CurveId::Ed25519 => 32,
        CurveId::P256 => 33,
        CurveId::Secp256k1 => 33,
    })
}

/// `<curve_id:1><hash_algo_id:1><digest:N>`, N derived from `hash_algo_id` via [`hash_size`].
///
/// The byte at offset 2 (the first digest byte) is the address's subset, used to
/// partition on-disk indices across 256 buckets.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Vec<u8>);

impl Address {
    /// Builds an address from its curve id, hash algo id and digest bytes.
    ///
    /// `curve_id` identifies the key scheme of the *previous* public key (the one whose
    /// hash produced this address), not a key scheme of the address itself; it is carried
    /// so that a reader can later verify the previous key against this address.
    pub fn new(curve_id: u8, hash_algo_id: u8, digest: Vec<u8>) -> Result<Self, CodecError> {
        let expected = hash_size(hash_algo_id)?;
        if digest.len() != expected {
            return Err(CodecError::DigestLengthMismatch {
                expected,
                got: digest.len(),
            });
        }
        let mut bytes = Vec::with_capacity(2 + digest.len());
        bytes.push(curve_id);
        bytes.push(hash_algo_id);
        bytes.extend_from_slice(&digest);
        Ok(Address(bytes))
    }

    /// Wraps an already-assembled, already-validated address buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.len() < 2 {
            return Err(CodecError::Truncated);
        }
        let expected = hash_size(bytes[1])?;
        if bytes.len() != 2 + expected {
            return Err(CodecError::DigestLengthMismatch {
                expected,
                got: bytes.len().saturating_sub(2),
            });
        }
        Ok(Address(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn curve_id(&self) -> u8 {
        self.0[0]
    }

    pub fn hash_algo_id(&self) -> u8 {
        self.0[1]
    }

    pub fn digest(&self) -> &[u8] {
        &self.0[2..]
    }

    /// The third byte of the address (the first digest byte), partitioning key for
    /// subset indices and bloom filters.
    pub fn subset(&self) -> u8 {
        self.0[2]
    }

    /// Total encoded length of this address: `2 + hash_size(hash_algo_id)`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// `<curve_id:1><origin_id:1><key:K>`, K derived from `curve_id` via [`key_size`].
///
/// `origin_id` identifies the device/software class that produced the signature
/// this key will verify (hardware wallet, software keychain, ...); it carries no
/// size or hashing semantics of its own.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn new(curve_id: u8, origin_id: u8, key: Vec<u8>) -> Result<Self, CodecError> {
        let expected = key_size(curve_id)?;
        if key.len() != expected {
            return Err(CodecError::KeyLengthMismatch {
                expected,
                got: key.len(),
            });
        }
        let mut bytes = Vec::with_capacity(2 + key.len());
        bytes.push(curve_id);
        bytes.push(origin_id);
        bytes.extend_from_slice(&key);
        Ok(PublicKey(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CodecError> {
        if bytes.len() < 2 {
            return Err(CodecError::Truncated);
        }
        let expected = key_size(bytes[0])?;
        if bytes.len() != 2 + expected {
            return Err(CodecError::KeyLengthMismatch {
                expected,
                got: bytes.len().saturating_sub(2),
            });
        }
        Ok(PublicKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn curve_id(&self) -> u8 {
        self.0[0]
    }

    pub fn origin_id(&self) -> u8 {
        self.0[1]
    }

    pub fn key_material(&self) -> &[u8] {
        &self.0[2..]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Derives the chain address this key's hash would produce under `hash_algo_id`.
    pub fn derive_address(&self, hash_algo_id: u8, digest: Vec<u8>) -> Result<Address, CodecError> {
        Address::new(self.curve_id(), hash_algo_id, digest)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        let digest = vec![0x07u8; 32];
        let addr = Address::new(0, 0, digest.clone()).unwrap();
        assert_eq!(addr.len(), 34);
        assert_eq!(addr.subset(), 0x07);
        let bytes = addr.as_bytes().to_vec();
        let decoded = Address::from_bytes(bytes).unwrap();
        assert_eq!(decoded.digest(), digest.as_slice());
    }

    #[test]
    fn public_key_round_trip() {
        let key = vec![0xABu8; 32];
        let pk = PublicKey::new(0, 0, key.clone()).unwrap();
        assert_eq!(pk.len(), 34);
        let decoded = PublicKey::from_bytes(pk.as_bytes().to_vec()).unwrap();
        assert_eq!(decoded.key_material(), key.as_slice());
    }

    #[test]
    fn rejects_mismatched_digest_length() {
        let err = Address::new(0, 0, vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, CodecError::DigestLengthMismatch { .. }));
    }
}
