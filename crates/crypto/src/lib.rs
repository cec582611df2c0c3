//! Cryptographic primitives for the Archethic node core: key generation,
//! signing/verification, hashing and address derivation, behind a pluggable
//! [`Crypto`] trait so mining and election logic never depend on a concrete
//! backend.

pub mod error;
pub mod hash;
pub mod sign;

use archethic_types::keys::{Address, CurveId, PublicKey};
use error::CryptoError;
use sign::Ed25519KeyPair;

/// A generated key pair, carrying both the wire [`PublicKey`] and the private
/// material needed to sign with it.
pub struct Keypair {
    inner: Ed25519KeyPair,
    public_key: PublicKey,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl Keypair {
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

/// Hashing, signing and address derivation, dispatched on the wire curve and
/// hash algorithm ids carried by [`Address`]/[`PublicKey`].
pub trait Crypto: Send + Sync {
    fn hash(&self, hash_algo_id: u8, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn hash_size(&self, hash_algo_id: u8) -> Result<usize, CryptoError>;
    fn key_size(&self, curve_id: u8) -> Result<usize, CryptoError>;
    fn generate_keypair(&self, curve_id: u8) -> Result<Keypair, CryptoError>;
    fn sign(&self, keypair: &Keypair, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
    fn derive_address(&self, public_key: &PublicKey, hash_algo_id: u8) -> Result<Address, CryptoError>;
}

/// The node's default [`Crypto`] backend: Ed25519 signing over SHA-256/SHA-512
/// addresses.
#[derive(Default, Clone, Copy)]
pub struct DefaultCrypto;

impl Crypto for DefaultCrypto {
    fn hash(&self, hash_algo_id: u8, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        hash::hash_with(hash_algo_id, data)
    }

    fn hash_size(&self, hash_algo_id: u8) -> Result<usize, CryptoError> {
        archethic_types::keys::hash_size(hash_algo_id)
            .map_err(|_| CryptoError::UnsupportedHashAlgo(hash_algo_id))
    }

    fn key_size(&self, curve_id: u8) -> Result<usize, CryptoError> {
        archethic_types::keys::key_size(curve_id)
            .map_err(|_| CryptoError::UnsupportedCurve(curve_id))
    }

    fn generate_keypair(&self, curve_id: u8) -> Result<Keypair, CryptoError> {
        if CurveId::from_id(curve_id).map_err(|_| CryptoError::UnsupportedCurve(curve_id))?
            != CurveId::Ed25519
        {
            return Err(CryptoError::UnsupportedCurve(curve_id));
        }
        let inner = Ed25519KeyPair::generate()?;
        let public_key = PublicKey::new(CurveId::Ed25519.id(), 0, inner.public_key_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Keypair { inner, public_key })
    }

    fn sign(&self, keypair: &Keypair, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        keypair.inner.sign(message)
    }

    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        if CurveId::from_id(public_key.curve_id()).map_err(|_| {
            CryptoError::UnsupportedCurve(public_key.curve_id())
        })? != CurveId::Ed25519
        {
            return Err(CryptoError::UnsupportedCurve(public_key.curve_id()));
        }
        sign::verify(public_key.key_material(), message, signature)
    }

    fn derive_address(&self, public_key: &PublicKey, hash_algo_id: u8) -> Result<Address, CryptoError> {
        let digest = self.hash(hash_algo_id, public_key.as_bytes())?;
        public_key
            .derive_address(hash_algo_id, digest)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archethic_types::keys::HashAlgoId;

    #[test]
    fn generate_sign_verify_round_trip() {
        let crypto = DefaultCrypto;
        let keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let signature = crypto.sign(&keypair, b"hello").unwrap();
        crypto
            .verify(keypair.public_key(), b"hello", &signature)
            .unwrap();
    }

    #[test]
    fn derive_address_uses_requested_hash_algo() {
        let crypto = DefaultCrypto;
        let keypair = crypto.generate_keypair(CurveId::Ed25519.id()).unwrap();
        let address = crypto
            .derive_address(keypair.public_key(), HashAlgoId::Sha256.id())
            .unwrap();
        assert_eq!(address.hash_algo_id(), HashAlgoId::Sha256.id());
        assert_eq!(address.curve_id(), CurveId::Ed25519.id());
        assert_eq!(address.digest().len(), 32);
    }

    #[test]
    fn unsupported_curve_is_rejected() {
        let crypto = DefaultCrypto;
        let err = crypto.generate_keypair(CurveId::P256.id()).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedCurve(_)));
    }
}
