//! Password stretching.
//!
//! An iterated BLAKE3 chain: the first link binds salt and password under a
//! fixed derivation context, each further link re-keys the previous output
//! with the iteration counter.

use crate::algorithm::Algorithm;
use crate::error::{EngineError, EngineResult};
use zeroize::Zeroizing;

const KEYING_CONTEXT: &str = "cryptkit password keying 2024-01";
pub const DEFAULT_SALT_SIZE: usize = 16;

/// Derive a 32-byte key from a password.
pub fn derive_key(
    algorithm: Algorithm,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> EngineResult<Zeroizing<[u8; 32]>> {
    if algorithm != Algorithm::Blake3 {
        return Err(EngineError::Unsupported(format!(
            "keying algorithm {}",
            algorithm.name()
        )));
    }
    if iterations == 0 {
        return Err(EngineError::Malformed("iteration count must be positive".to_string()));
    }

    let mut hasher = blake3::Hasher::new_derive_key(KEYING_CONTEXT);
    hasher.update(&(salt.len() as u64).to_le_bytes());
    hasher.update(salt);
    hasher.update(password);
    let mut key = Zeroizing::new(*hasher.finalize().as_bytes());

    for round in 1..iterations {
        let mut link = blake3::Hasher::new_keyed(&key);
        link.update(&round.to_le_bytes());
        link.update(salt);
        *key = *link.finalize().as_bytes();
    }
    Ok(key)
}
