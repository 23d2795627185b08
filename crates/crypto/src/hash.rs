//! Incremental hashing and MACs.
//!
//! Hash and MAC contexts accumulate data until finalised; after that the
//! value is fixed and further input is refused until the state is reset.

use crate::algorithm::Algorithm;
use crate::error::{EngineError, EngineResult};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// BLAKE3 context string used for password-free key derivations.
pub const KEY_ID_CONTEXT: &str = "cryptkit key identifier 2024-01";

enum Engine {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

/// Running hash or keyed MAC.
pub struct DigestState {
    algorithm: Algorithm,
    engine: Engine,
    /// MAC key, kept so the state can be reset.
    key: Option<Zeroizing<[u8; 32]>>,
    value: Option<Vec<u8>>,
}

impl DigestState {
    /// Unkeyed hash state.
    pub fn new_hash(algorithm: Algorithm) -> EngineResult<Self> {
        let engine = match algorithm {
            Algorithm::Sha256 => Engine::Sha256(Sha256::new()),
            Algorithm::Blake3 => Engine::Blake3(Box::new(blake3::Hasher::new())),
            other => return Err(EngineError::Unsupported(other.name().to_string())),
        };
        Ok(Self {
            algorithm,
            engine,
            key: None,
            value: None,
        })
    }

    /// Keyed MAC state.
    pub fn new_mac(algorithm: Algorithm, key: &[u8]) -> EngineResult<Self> {
        if algorithm != Algorithm::Blake3Mac {
            return Err(EngineError::Unsupported(algorithm.name().to_string()));
        }
        let key: [u8; 32] = key.try_into().map_err(|_| EngineError::KeyLength {
            expected: 32,
            actual: key.len(),
        })?;
        Ok(Self {
            algorithm,
            engine: Engine::Blake3(Box::new(blake3::Hasher::new_keyed(&key))),
            key: Some(Zeroizing::new(key)),
            value: None,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn is_finalised(&self) -> bool {
        self.value.is_some()
    }

    pub fn update(&mut self, data: &[u8]) -> EngineResult<()> {
        if self.value.is_some() {
            return Err(EngineError::Finalised);
        }
        match &mut self.engine {
            Engine::Sha256(h) => h.update(data),
            Engine::Blake3(h) => {
                h.update(data);
            }
        }
        Ok(())
    }

    /// Finalise and return the value. Finalising twice returns the same value.
    pub fn finalise(&mut self) -> &[u8] {
        if self.value.is_none() {
            let value = match &mut self.engine {
                Engine::Sha256(h) => h.finalize_reset().to_vec(),
                Engine::Blake3(h) => h.finalize().as_bytes().to_vec(),
            };
            self.value = Some(value);
        }
        self.value.as_deref().unwrap_or_default()
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Discard accumulated input and any final value.
    pub fn reset(&mut self) {
        self.engine = match (&self.engine, &self.key) {
            (Engine::Sha256(_), _) => Engine::Sha256(Sha256::new()),
            (Engine::Blake3(_), Some(key)) => Engine::Blake3(Box::new(blake3::Hasher::new_keyed(key))),
            (Engine::Blake3(_), None) => Engine::Blake3(Box::new(blake3::Hasher::new())),
        };
        self.value = None;
    }
}

/// One-shot hash.
pub fn digest(algorithm: Algorithm, data: &[u8]) -> EngineResult<Vec<u8>> {
    let mut state = DigestState::new_hash(algorithm)?;
    state.update(data)?;
    Ok(state.finalise().to_vec())
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Short identifier for a public key or key-encryption key.
pub fn key_id(material: &[u8]) -> [u8; 8] {
    let full = blake3::derive_key(KEY_ID_CONTEXT, material);
    let mut id = [0u8; 8];
    id.copy_from_slice(&full[..8]);
    id
}
