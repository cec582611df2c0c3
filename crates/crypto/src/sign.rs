//! Ed25519 key generation and signing, built on `dcrypt`.

use crate::error::CryptoError;
use dcrypt::api::Signature as SignatureTrait;
use dcrypt::sign::eddsa;
use rand::rngs::OsRng;
use zeroize::Zeroize;

pub struct Ed25519KeyPair {
    public_key: eddsa::Ed25519PublicKey,
    secret_key: eddsa::Ed25519SecretKey,
}

impl Ed25519KeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = OsRng;
        let (public_key, secret_key) = eddsa::Ed25519::keypair(&mut rng)
            .map_err(|e| CryptoError::Backend(e.to_string()))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        if seed.len() != 32 {
            return Err(CryptoError::InvalidKey(
                "ed25519 seed must be 32 bytes".to_string(),
            ));
        }
        let mut fixed = [0u8; 32];
        fixed.copy_from_slice(seed);
        let secret_key = eddsa::Ed25519SecretKey::from_seed(&fixed)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        fixed.zeroize();
        let public_key = secret_key
            .public_key()
            .map_err(|e| CryptoError::Backend(e.to_string()))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_bytes().to_vec()
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature = eddsa::Ed25519::sign(message, &self.secret_key)
            .map_err(|e| CryptoError::Backend(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

pub fn verify(public_key_bytes: &[u8], message: &[u8], signature_bytes: &[u8]) -> Result<(), CryptoError> {
    let public_key = eddsa::Ed25519PublicKey::from_bytes(public_key_bytes)
        .map_err(|e| CryptoError::InvalidKey(format!("{e:?}")))?;
    let signature = eddsa::Ed25519Signature::from_bytes(signature_bytes)
        .map_err(|e| CryptoError::InvalidSignature(format!("{e:?}")))?;
    eddsa::Ed25519::verify(message, &signature, &public_key)
        .map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = Ed25519KeyPair::generate().unwrap();
        let message = b"mining context seed";
        let signature = keypair.sign(message).unwrap();
        verify(&keypair.public_key_bytes(), message, &signature).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let keypair = Ed25519KeyPair::generate().unwrap();
        let signature = keypair.sign(b"original").unwrap();
        let err = verify(&keypair.public_key_bytes(), b"tampered", &signature).unwrap_err();
        assert!(matches!(err, CryptoError::VerificationFailed));
    }

    #[test]
    fn from_seed_is_deterministic() {
        let seed = [7u8; 32];
        let a = Ed25519KeyPair::from_seed(&seed).unwrap();
        let b = Ed25519KeyPair::from_seed(&seed).unwrap();
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
    }
}
