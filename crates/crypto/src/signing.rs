//! Ed25519 signature keys.
//!
//! A key pair may be public-only (imported from a certificate or key
//! components); signing then fails with [`EngineError::NoKey`].

use crate::error::{EngineError, EngineResult};
use crate::hash::key_id;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

pub const SIGNATURE_SIZE: usize = 64;
pub const PUBLIC_KEY_SIZE: usize = 32;

#[derive(Clone)]
pub struct SignatureKeyPair {
    signing: Option<SigningKey>,
    verifying: VerifyingKey,
}

impl SignatureKeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let signing = SigningKey::generate(rng);
        let verifying = signing.verifying_key();
        Self {
            signing: Some(signing),
            verifying,
        }
    }

    /// Rebuild from a 32-byte secret seed. The caller's copy is not retained.
    pub fn from_secret(secret: &[u8]) -> EngineResult<Self> {
        let mut seed: [u8; 32] = secret.try_into().map_err(|_| EngineError::KeyLength {
            expected: 32,
            actual: secret.len(),
        })?;
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        let verifying = signing.verifying_key();
        Ok(Self {
            signing: Some(signing),
            verifying,
        })
    }

    pub fn from_public(public: &[u8]) -> EngineResult<Self> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            public.try_into().map_err(|_| EngineError::KeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: public.len(),
            })?;
        let verifying = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| EngineError::Malformed(format!("ed25519 public key: {}", e)))?;
        Ok(Self {
            signing: None,
            verifying,
        })
    }

    pub fn has_private(&self) -> bool {
        self.signing.is_some()
    }

    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.verifying.to_bytes()
    }

    /// Secret seed, for wrapping into a keyset.
    pub fn secret_bytes(&self) -> EngineResult<[u8; 32]> {
        self.signing
            .as_ref()
            .map(SigningKey::to_bytes)
            .ok_or(EngineError::NoKey)
    }

    pub fn key_id(&self) -> [u8; 8] {
        key_id(&self.public_bytes())
    }

    /// Drop the private half, keeping a verification-only copy.
    pub fn public_only(&self) -> Self {
        Self {
            signing: None,
            verifying: self.verifying,
        }
    }

    pub fn sign(&self, message: &[u8]) -> EngineResult<[u8; SIGNATURE_SIZE]> {
        let signing = self.signing.as_ref().ok_or(EngineError::NoKey)?;
        Ok(signing.sign(message).to_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> EngineResult<()> {
        verify_with_public(&self.verifying, message, signature)
    }
}

/// Verify against a raw 32-byte public key.
pub fn verify(public: &[u8], message: &[u8], signature: &[u8]) -> EngineResult<()> {
    let pair = SignatureKeyPair::from_public(public)?;
    pair.verify(message, signature)
}

fn verify_with_public(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> EngineResult<()> {
    let bytes: [u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| EngineError::BadSignature)?;
    let signature = Signature::from_bytes(&bytes);
    key.verify(message, &signature)
        .map_err(|_| EngineError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::HardwareRng;

    #[test]
    fn test_sign_verify() {
        let pair = SignatureKeyPair::generate(&mut HardwareRng::new());
        let sig = pair.sign(b"message").unwrap();
        assert!(pair.verify(b"message", &sig).is_ok());
        assert!(matches!(
            pair.verify(b"massage", &sig),
            Err(EngineError::BadSignature)
        ));
    }

    #[test]
    fn test_public_only_cannot_sign() {
        let pair = SignatureKeyPair::generate(&mut HardwareRng::new());
        let public = SignatureKeyPair::from_public(&pair.public_bytes()).unwrap();
        assert!(!public.has_private());
        assert!(matches!(public.sign(b"x"), Err(EngineError::NoKey)));
        let sig = pair.sign(b"x").unwrap();
        assert!(verify(&pair.public_bytes(), b"x", &sig).is_ok());
    }

    #[test]
    fn test_secret_round_trip() {
        let pair = SignatureKeyPair::generate(&mut HardwareRng::new());
        let restored = SignatureKeyPair::from_secret(&pair.secret_bytes().unwrap()).unwrap();
        assert_eq!(restored.public_bytes(), pair.public_bytes());
        assert_eq!(restored.key_id(), pair.key_id());
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let pair = SignatureKeyPair::generate(&mut HardwareRng::new());
        assert!(matches!(
            pair.verify(b"x", &[0u8; 10]),
            Err(EngineError::BadSignature)
        ));
    }
}
