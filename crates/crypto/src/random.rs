//! Randomness for key generation, IVs and nonces.
//!
//! The kernel owns one [`RandomPool`]. Callers may stir in their own entropy
//! with `add_random`; every draw combines the pool state with fresh output
//! from the operating system generator, so caller input can only add
//! unpredictability, never remove it.

use crate::error::{EngineError, EngineResult};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

const POOL_CONTEXT: &str = "cryptkit random pool 2024-01 mix";
const OUTPUT_CONTEXT: &str = "cryptkit random pool 2024-01 output";

/// OS-backed generator with a thread-local fast path.
///
/// Hardware sources plug in here when a platform offers one.
pub struct HardwareRng {
    rng: rand::rngs::ThreadRng,
}

impl HardwareRng {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for HardwareRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for HardwareRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

impl CryptoRng for HardwareRng {}

/// Entropy accumulator mixed into every draw.
pub struct RandomPool {
    state: [u8; 32],
    /// Bytes of caller entropy absorbed since creation.
    absorbed: u64,
    draws: u64,
}

impl RandomPool {
    /// Create a pool seeded from the operating system.
    pub fn new() -> EngineResult<Self> {
        let mut pool = Self {
            state: [0u8; 32],
            absorbed: 0,
            draws: 0,
        };
        pool.poll()?;
        Ok(pool)
    }

    /// Stir caller-supplied entropy into the pool.
    pub fn add_entropy(&mut self, data: &[u8]) {
        self.mix(data);
        self.absorbed = self.absorbed.saturating_add(data.len() as u64);
    }

    fn mix(&mut self, data: &[u8]) {
        let mut hasher = blake3::Hasher::new_derive_key(POOL_CONTEXT);
        hasher.update(&self.state);
        hasher.update(&(data.len() as u64).to_le_bytes());
        hasher.update(data);
        self.state = *hasher.finalize().as_bytes();
    }

    /// Reseed from the operating system entropy source.
    pub fn poll(&mut self) -> EngineResult<()> {
        let mut fresh = [0u8; 32];
        getrandom::getrandom(&mut fresh).map_err(|e| EngineError::Entropy(e.to_string()))?;
        self.mix(&fresh);
        fresh.zeroize();
        Ok(())
    }

    /// Fill `dest` with output derived from the pool and the OS generator.
    pub fn fill(&mut self, dest: &mut [u8]) {
        let mut fresh = [0u8; 32];
        HardwareRng::new().fill_bytes(&mut fresh);

        let mut hasher = blake3::Hasher::new_derive_key(OUTPUT_CONTEXT);
        hasher.update(&self.state);
        hasher.update(&fresh);
        hasher.update(&self.draws.to_le_bytes());
        hasher.finalize_xof().fill(dest);

        self.draws = self.draws.wrapping_add(1);
        // Ratchet so earlier outputs cannot be recomputed from a later state.
        self.mix(&fresh);
        fresh.zeroize();
    }

    pub fn bytes(&mut self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        self.fill(&mut out);
        out
    }

    pub fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        self.fill(&mut out);
        out
    }

    pub fn absorbed(&self) -> u64 {
        self.absorbed
    }
}

impl RngCore for RandomPool {
    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.fill(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill(dest);
        Ok(())
    }
}

impl CryptoRng for RandomPool {}

impl Drop for RandomPool {
    fn drop(&mut self) {
        self.state.zeroize();
    }
}
