//! Algorithm identifiers and capability descriptions.
//!
//! Identifiers are grouped in numeric bands:
//!
//! - `1..=99`    conventional (symmetric) ciphers
//! - `100..=199` public-key algorithms
//! - `200..=299` hash functions
//! - `300..=399` MAC algorithms

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum Algorithm {
    ChaCha20 = 1,
    XChaCha20 = 2,
    X25519 = 100,
    Ed25519 = 101,
    Sha256 = 205,
    Blake3 = 206,
    Blake3Mac = 300,
}

/// Coarse algorithm family, derived from the identifier band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmClass {
    Conventional,
    PublicKey,
    Hash,
    Mac,
}

/// Cipher mode reported through `CTXINFO_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Mode {
    None = 0,
    Ecb = 1,
    Cbc = 2,
    Cfb = 3,
    /// Keystream mode; the stream ciphers run here.
    Ofb = 4,
}

impl Mode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Mode::None),
            1 => Some(Mode::Ecb),
            2 => Some(Mode::Cbc),
            3 => Some(Mode::Cfb),
            4 => Some(Mode::Ofb),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::None => "none",
            Mode::Ecb => "ECB",
            Mode::Cbc => "CBC",
            Mode::Cfb => "CFB",
            Mode::Ofb => "OFB",
        }
    }
}

/// Static description of what an algorithm supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub algorithm: Algorithm,
    pub name: &'static str,
    /// Bytes processed per block (1 for stream ciphers).
    pub block_size: usize,
    pub iv_size: usize,
    pub min_key_size: usize,
    pub key_size: usize,
    pub max_key_size: usize,
    /// Size of a hash value, MAC value or signature.
    pub output_size: usize,
}

const ALL: [Algorithm; 7] = [
    Algorithm::ChaCha20,
    Algorithm::XChaCha20,
    Algorithm::X25519,
    Algorithm::Ed25519,
    Algorithm::Sha256,
    Algorithm::Blake3,
    Algorithm::Blake3Mac,
];

impl Algorithm {
    pub fn all() -> &'static [Algorithm] {
        &ALL
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        ALL.iter().copied().find(|a| *a as i32 == raw)
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<Self> {
        ALL.iter()
            .copied()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    pub fn class(self) -> AlgorithmClass {
        match self as i32 {
            1..=99 => AlgorithmClass::Conventional,
            100..=199 => AlgorithmClass::PublicKey,
            200..=299 => AlgorithmClass::Hash,
            _ => AlgorithmClass::Mac,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::ChaCha20 => "ChaCha20",
            Algorithm::XChaCha20 => "XChaCha20",
            Algorithm::X25519 => "X25519",
            Algorithm::Ed25519 => "Ed25519",
            Algorithm::Sha256 => "SHA2-256",
            Algorithm::Blake3 => "BLAKE3",
            Algorithm::Blake3Mac => "BLAKE3-MAC",
        }
    }

    /// Mode a freshly created context starts in.
    pub fn default_mode(self) -> Mode {
        match self.class() {
            AlgorithmClass::Conventional => Mode::Ofb,
            _ => Mode::None,
        }
    }

    pub fn is_signature(self) -> bool {
        self == Algorithm::Ed25519
    }

    pub fn is_key_agreement(self) -> bool {
        self == Algorithm::X25519
    }

    /// Whether the context can hold secret key material set by the caller.
    pub fn is_keyed(self) -> bool {
        !matches!(self.class(), AlgorithmClass::Hash)
    }

    pub fn capability(self) -> Capability {
        let (block_size, iv_size, key_size, output_size) = match self {
            Algorithm::ChaCha20 => (1, 12, 32, 0),
            Algorithm::XChaCha20 => (1, 24, 32, 0),
            Algorithm::X25519 => (32, 0, 32, 32),
            Algorithm::Ed25519 => (32, 0, 32, 64),
            Algorithm::Sha256 => (32, 0, 0, 32),
            Algorithm::Blake3 => (32, 0, 0, 32),
            Algorithm::Blake3Mac => (32, 0, 32, 32),
        };
        Capability {
            algorithm: self,
            name: self.name(),
            block_size,
            iv_size,
            min_key_size: key_size,
            key_size,
            max_key_size: key_size,
            output_size,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands() {
        assert_eq!(Algorithm::ChaCha20.class(), AlgorithmClass::Conventional);
        assert_eq!(Algorithm::X25519.class(), AlgorithmClass::PublicKey);
        assert_eq!(Algorithm::Ed25519.class(), AlgorithmClass::PublicKey);
        assert_eq!(Algorithm::Sha256.class(), AlgorithmClass::Hash);
        assert_eq!(Algorithm::Blake3Mac.class(), AlgorithmClass::Mac);
    }

    #[test]
    fn test_raw_lookup() {
        for algo in Algorithm::all() {
            assert_eq!(Algorithm::from_raw(algo.id()), Some(*algo));
        }
        assert_eq!(Algorithm::from_raw(0), None);
        assert_eq!(Algorithm::from_raw(3), None);
        assert_eq!(Algorithm::from_name("blake3"), Some(Algorithm::Blake3));
    }

    #[test]
    fn test_capabilities() {
        let cap = Algorithm::XChaCha20.capability();
        assert_eq!(cap.iv_size, 24);
        assert_eq!(cap.key_size, 32);
        assert_eq!(cap.block_size, 1);
        assert_eq!(Algorithm::Ed25519.capability().output_size, 64);
        assert_eq!(Algorithm::Sha256.capability().key_size, 0);
        assert!(!Algorithm::Blake3.is_keyed());
    }

    #[test]
    fn test_modes() {
        assert_eq!(Algorithm::ChaCha20.default_mode(), Mode::Ofb);
        assert_eq!(Algorithm::Sha256.default_mode(), Mode::None);
        assert_eq!(Mode::from_raw(4), Some(Mode::Ofb));
        assert_eq!(Mode::from_raw(9), None);
    }
}
