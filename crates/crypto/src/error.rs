//! Algorithm engine errors.

use thiserror::Error;

/// Errors raised by the algorithm engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Algorithm not available: {0}")]
    Unsupported(String),

    #[error("Invalid key length: {actual} (expected {expected})")]
    KeyLength { expected: usize, actual: usize },

    #[error("Invalid IV length: {actual} (expected {expected})")]
    IvLength { expected: usize, actual: usize },

    #[error("Key material not loaded")]
    NoKey,

    #[error("Authentication failed")]
    Authentication,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Keystream exhausted")]
    KeystreamExhausted,

    #[error("Hash already finalised")]
    Finalised,
}

pub type EngineResult<T> = Result<T, EngineError>;
