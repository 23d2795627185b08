//! Algorithm engine for the cryptkit kernel.
//!
//! This crate performs the actual cryptography behind kernel contexts,
//! envelopes and sessions. It knows nothing about handles or attributes;
//! the kernel configures engine objects from attribute values and maps
//! [`EngineError`] onto the status taxonomy.
//!
//! # Supported Algorithms
//!
//! - **Conventional**: ChaCha20, XChaCha20 (stream, in place)
//! - **Public key**: X25519 (key agreement, key wrap), Ed25519 (signatures)
//! - **Hash**: SHA-256, BLAKE3
//! - **MAC**: keyed BLAKE3
//! - **Records**: ChaCha20-Poly1305 with sequenced nonces
//!
//! # Security Principles
//!
//! - Never roll custom cryptographic primitives
//! - Secret key material is zeroized on drop
//! - Secrets must never be logged

pub mod algorithm;
pub mod cipher;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod keyex;
pub mod random;
pub mod record;
pub mod signing;

#[cfg(test)]
mod test_vectors;

pub use algorithm::{Algorithm, AlgorithmClass, Capability, Mode};
pub use cipher::StreamCipherState;
pub use error::{EngineError, EngineResult};
pub use hash::{digest, key_id, sha256, DigestState};
pub use kdf::derive_key;
pub use keyex::{AgreementKeyPair, ChannelKeys, EphemeralExchange, PublicKeyWrap};
pub use random::{HardwareRng, RandomPool};
pub use record::RecordCipher;
pub use signing::SignatureKeyPair;

use cryptkit_core::{CryptError, ErrorCode};

impl From<EngineError> for CryptError {
    fn from(err: EngineError) -> Self {
        let code = match &err {
            EngineError::Unsupported(_) => ErrorCode::NotAvail,
            EngineError::KeyLength { .. } | EngineError::IvLength { .. } => ErrorCode::Param3,
            EngineError::NoKey => ErrorCode::NotInited,
            EngineError::Authentication => ErrorCode::WrongKey,
            EngineError::BadSignature => ErrorCode::Signature,
            EngineError::Malformed(_) => ErrorCode::BadData,
            EngineError::Entropy(_) => ErrorCode::Random,
            EngineError::KeystreamExhausted => ErrorCode::Overflow,
            EngineError::Finalised => ErrorCode::Complete,
        };
        CryptError::new(code).with_detail(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_collapse_to_status() {
        let err: CryptError = EngineError::Authentication.into();
        assert_eq!(err.kind(), ErrorCode::WrongKey);
        let err: CryptError = EngineError::Unsupported("rc4".to_string()).into();
        assert_eq!(err.kind(), ErrorCode::NotAvail);
        let err: CryptError = EngineError::KeyLength { expected: 32, actual: 3 }.into();
        assert_eq!(err.kind(), ErrorCode::Param3);
    }
}
