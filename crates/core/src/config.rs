//! Kernel configuration.
//!
//! Configuration is read once when a kernel is created. The `[options]`
//! table seeds the user-visible `CRYPT_OPTION_*` attributes, which callers
//! may then override per user at runtime.
//!
//! ```toml
//! [options]
//! keying_iterations = 1000
//! cert_validity_days = 90
//!
//! [registry]
//! max_objects = 1024
//!
//! [[users]]
//! name = "ca-admin"
//! password = "correct horse"
//! user_type = "ca"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Largest slot count a handle can address.
pub const MAX_REGISTRY_OBJECTS: usize = 0xFFFF;
pub const MIN_ENVELOPE_BUFFER: usize = 1024;
pub const MAX_ENVELOPE_BUFFER: usize = 16 * 1024 * 1024;
pub const MAX_KEYING_ITERATIONS: i32 = 20_000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "config")]
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level kernel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    /// Accounts available to `login`.
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// Initial values of the `CRYPT_OPTION_*` attributes.
///
/// Algorithm fields hold raw algorithm identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    #[serde(default = "default_encr_algo")]
    pub encr_algo: i32,
    #[serde(default = "default_encr_hash")]
    pub encr_hash: i32,
    #[serde(default = "default_encr_mac")]
    pub encr_mac: i32,
    #[serde(default = "default_pkc_algo")]
    pub pkc_algo: i32,
    #[serde(default = "default_key_size")]
    pub pkc_keysize: i32,
    #[serde(default = "default_sig_algo")]
    pub sig_algo: i32,
    #[serde(default = "default_key_size")]
    pub sig_keysize: i32,
    #[serde(default = "default_keying_algo")]
    pub keying_algo: i32,
    #[serde(default = "default_keying_iterations")]
    pub keying_iterations: i32,
    #[serde(default = "default_cert_validity_days")]
    pub cert_validity_days: i32,
    /// Seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: i32,
    #[serde(default = "default_io_timeout")]
    pub read_timeout: i32,
    #[serde(default = "default_io_timeout")]
    pub write_timeout: i32,
    #[serde(default)]
    pub socks_server: Option<String>,
    #[serde(default)]
    pub socks_username: Option<String>,
    #[serde(default)]
    pub http_proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    /// Default `ATTRIBUTE_BUFFERSIZE` for new envelopes and sessions.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Normal,
    /// Security officer.
    So,
    /// Certification authority.
    Ca,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub user_type: UserRole,
}

fn default_encr_algo() -> i32 {
    1
}

fn default_encr_hash() -> i32 {
    205
}

fn default_encr_mac() -> i32 {
    300
}

fn default_pkc_algo() -> i32 {
    100
}

fn default_sig_algo() -> i32 {
    101
}

fn default_key_size() -> i32 {
    32
}

fn default_keying_algo() -> i32 {
    206
}

fn default_keying_iterations() -> i32 {
    500
}

fn default_cert_validity_days() -> i32 {
    365
}

fn default_connect_timeout() -> i32 {
    30
}

fn default_io_timeout() -> i32 {
    30
}

fn default_max_objects() -> usize {
    4096
}

fn default_buffer_size() -> usize {
    32 * 1024
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            encr_algo: default_encr_algo(),
            encr_hash: default_encr_hash(),
            encr_mac: default_encr_mac(),
            pkc_algo: default_pkc_algo(),
            pkc_keysize: default_key_size(),
            sig_algo: default_sig_algo(),
            sig_keysize: default_key_size(),
            keying_algo: default_keying_algo(),
            keying_iterations: default_keying_iterations(),
            cert_validity_days: default_cert_validity_days(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_io_timeout(),
            write_timeout: default_io_timeout(),
            socks_server: None,
            socks_username: None,
            http_proxy: None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_objects: default_max_objects(),
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

impl KernelConfig {
    /// Load and validate a TOML configuration file.
    #[cfg(feature = "config")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "config")]
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: KernelConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        let opts = &self.options;
        if opts.keying_iterations < 1 || opts.keying_iterations > MAX_KEYING_ITERATIONS {
            return Err(ConfigError::Invalid(format!(
                "keying_iterations must be in 1..={}, got {}",
                MAX_KEYING_ITERATIONS, opts.keying_iterations
            )));
        }
        if opts.cert_validity_days < 1 {
            return Err(ConfigError::Invalid(
                "cert_validity_days must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("connect_timeout", opts.connect_timeout),
            ("read_timeout", opts.read_timeout),
            ("write_timeout", opts.write_timeout),
        ] {
            if value < 0 {
                return Err(ConfigError::Invalid(format!("{} must not be negative", name)));
            }
        }
        if self.registry.max_objects == 0 || self.registry.max_objects > MAX_REGISTRY_OBJECTS {
            return Err(ConfigError::Invalid(format!(
                "max_objects must be in 1..={}",
                MAX_REGISTRY_OBJECTS
            )));
        }
        if !(MIN_ENVELOPE_BUFFER..=MAX_ENVELOPE_BUFFER).contains(&self.envelope.buffer_size) {
            return Err(ConfigError::Invalid(format!(
                "envelope buffer_size must be in {}..={}",
                MIN_ENVELOPE_BUFFER, MAX_ENVELOPE_BUFFER
            )));
        }
        let mut seen = HashSet::new();
        for user in &self.users {
            if user.name.is_empty() {
                return Err(ConfigError::Invalid("user name must not be empty".to_string()));
            }
            if !seen.insert(user.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate user {}", user.name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.options.keying_iterations, 500);
        assert_eq!(config.registry.max_objects, 4096);
        assert_eq!(config.envelope.buffer_size, 32 * 1024);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = KernelConfig::from_toml_str(
            r#"
            [options]
            cert_validity_days = 30

            [[users]]
            name = "alice"
            password = "secret"
            user_type = "ca"
            "#,
        )
        .unwrap();
        assert_eq!(config.options.cert_validity_days, 30);
        assert_eq!(config.options.encr_algo, 1);
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].user_type, UserRole::Ca);
    }

    #[test]
    fn test_rejects_duplicate_users() {
        let result = KernelConfig::from_toml_str(
            r#"
            [[users]]
            name = "bob"
            password = "a"
            [[users]]
            name = "bob"
            password = "b"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut config = KernelConfig::default();
        config.options.keying_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = KernelConfig::default();
        config.envelope.buffer_size = 16;
        assert!(config.validate().is_err());

        let mut config = KernelConfig::default();
        config.registry.max_objects = MAX_REGISTRY_OBJECTS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[registry]\nmax_objects = 16").unwrap();
        let config = KernelConfig::from_file(file.path()).unwrap();
        assert_eq!(config.registry.max_objects, 16);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = KernelConfig::from_toml_str("[options\nbroken");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
