//! Conventional stream ciphers operating in place.
//!
//! A context keeps independent keystream positions for encryption and
//! decryption, both anchored at the current IV. Encrypting a message and
//! then decrypting the result on the same context therefore round-trips
//! without the caller having to reload the IV; loading an IV rewinds both.

use crate::algorithm::Algorithm;
use crate::error::{EngineError, EngineResult};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, XChaCha20};
use zeroize::Zeroizing;

enum Keystream {
    ChaCha(ChaCha20),
    XChaCha(XChaCha20),
}

impl Keystream {
    fn new(algorithm: Algorithm, key: &[u8], iv: &[u8]) -> EngineResult<Self> {
        let invalid = |_| EngineError::Malformed("cipher parameters".to_string());
        match algorithm {
            Algorithm::ChaCha20 => Ok(Keystream::ChaCha(
                ChaCha20::new_from_slices(key, iv).map_err(invalid)?,
            )),
            Algorithm::XChaCha20 => Ok(Keystream::XChaCha(
                XChaCha20::new_from_slices(key, iv).map_err(invalid)?,
            )),
            other => Err(EngineError::Unsupported(other.name().to_string())),
        }
    }

    fn apply(&mut self, buf: &mut [u8]) -> EngineResult<()> {
        let result = match self {
            Keystream::ChaCha(c) => c.try_apply_keystream(buf),
            Keystream::XChaCha(c) => c.try_apply_keystream(buf),
        };
        result.map_err(|_| EngineError::KeystreamExhausted)
    }
}

/// Keyed stream cipher state.
pub struct StreamCipherState {
    algorithm: Algorithm,
    key: Zeroizing<Vec<u8>>,
    iv: Vec<u8>,
    encryptor: Keystream,
    decryptor: Keystream,
}

impl StreamCipherState {
    pub fn new(algorithm: Algorithm, key: &[u8], iv: &[u8]) -> EngineResult<Self> {
        let cap = algorithm.capability();
        if key.len() != cap.key_size {
            return Err(EngineError::KeyLength {
                expected: cap.key_size,
                actual: key.len(),
            });
        }
        if iv.len() != cap.iv_size {
            return Err(EngineError::IvLength {
                expected: cap.iv_size,
                actual: iv.len(),
            });
        }
        Ok(Self {
            algorithm,
            key: Zeroizing::new(key.to_vec()),
            iv: iv.to_vec(),
            encryptor: Keystream::new(algorithm, key, iv)?,
            decryptor: Keystream::new(algorithm, key, iv)?,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Load a new IV, rewinding both directions.
    pub fn set_iv(&mut self, iv: &[u8]) -> EngineResult<()> {
        let fresh = Self::new(self.algorithm, &self.key, iv)?;
        *self = fresh;
        Ok(())
    }

    pub fn encrypt(&mut self, buf: &mut [u8]) -> EngineResult<()> {
        self.encryptor.apply(buf)
    }

    pub fn decrypt(&mut self, buf: &mut [u8]) -> EngineResult<()> {
        self.decryptor.apply(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_without_iv_reload() {
        let mut state = StreamCipherState::new(Algorithm::ChaCha20, &[7u8; 32], &[1u8; 12]).unwrap();
        for len in [0usize, 1, 16, 4096] {
            let plain: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut buf = plain.clone();
            state.encrypt(&mut buf).unwrap();
            if len > 0 {
                assert_ne!(buf, plain);
            }
            state.decrypt(&mut buf).unwrap();
            assert_eq!(buf, plain);
        }
    }

    #[test]
    fn test_set_iv_rewinds() {
        let mut state =
            StreamCipherState::new(Algorithm::XChaCha20, &[9u8; 32], &[2u8; 24]).unwrap();
        let mut first = [0u8; 8];
        state.encrypt(&mut first).unwrap();
        state.set_iv(&[2u8; 24]).unwrap();
        let mut again = [0u8; 8];
        state.encrypt(&mut again).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(matches!(
            StreamCipherState::new(Algorithm::ChaCha20, &[0u8; 16], &[0u8; 12]),
            Err(EngineError::KeyLength { expected: 32, actual: 16 })
        ));
        assert!(matches!(
            StreamCipherState::new(Algorithm::ChaCha20, &[0u8; 32], &[0u8; 24]),
            Err(EngineError::IvLength { expected: 12, actual: 24 })
        ));
        assert!(matches!(
            StreamCipherState::new(Algorithm::Sha256, &[0u8; 0], &[0u8; 0]),
            Err(EngineError::Unsupported(_))
        ));
    }
}
