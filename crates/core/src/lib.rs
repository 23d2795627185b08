//! Core types shared by every cryptkit crate.
//!
//! This crate provides the status taxonomy, the error type returned by all
//! kernel operations, the kernel configuration and logging bootstrap.

pub mod config;
pub mod error;
pub mod logging;
pub mod status;

pub use config::{
    ConfigError, ConfigResult, EnvelopeConfig, KernelConfig, OptionsConfig, RegistryConfig,
    UserEntry, UserRole,
};
pub use error::{fail, CryptError, CryptResult};
pub use status::{status_message, ErrorCode, ErrorType, StatusClass, OK};

/// Value accepted wherever an optional numeric argument is not used.
pub const CRYPT_UNUSED: i32 = -11;
/// Value selecting the configured default.
pub const CRYPT_USE_DEFAULT: i32 = -10;
/// Longest text string accepted for names and labels.
pub const MAX_TEXTSIZE: usize = 64;
