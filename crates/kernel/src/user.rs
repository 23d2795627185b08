//! User objects: the option set in force for a principal, plus CA keys.

use crate::attribute::{AttributeId, AttributeValue};
use crate::context::KeySnapshot;
use crate::object::{AttrEnv, AttrInput, AttributeHandler, Lifecycle, ObjectRef};
use cryptkit_core::{CryptError, CryptResult, ErrorCode, OptionsConfig, UserRole};
use cryptkit_crypto::{Algorithm, AlgorithmClass};
use tracing::debug;
use zeroize::Zeroizing;

const DESCRIPTION: &str = "cryptkit security toolkit";
const COPYRIGHT: &str = "Copyright the cryptkit authors";

fn version_part(part: &str) -> i32 {
    part.parse().unwrap_or(0)
}

pub struct UserObject {
    name: String,
    role: UserRole,
    is_default: bool,
    options: OptionsConfig,
    pending_password: Option<Zeroizing<String>>,
    cert_sign_key: Option<KeySnapshot>,
    crl_sign_key: Option<KeySnapshot>,
}

impl UserObject {
    pub fn new(name: &str, role: UserRole, options: OptionsConfig, is_default: bool) -> Self {
        Self {
            name: name.to_string(),
            role,
            is_default,
            options,
            pending_password: None,
            cert_sign_key: None,
            crl_sign_key: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn options(&self) -> &OptionsConfig {
        &self.options
    }

    /// New password set through `USERINFO_PASSWORD`, not yet recorded in the
    /// account directory.
    pub fn take_password_change(&mut self) -> Option<Zeroizing<String>> {
        self.pending_password.take()
    }

    /// Key installed with `USERINFO_CAKEY_CERTSIGN` or `_CRLSIGN`.
    pub fn ca_key(&self, crl: bool) -> Option<&KeySnapshot> {
        if crl {
            self.crl_sign_key.as_ref().or(self.cert_sign_key.as_ref())
        } else {
            self.cert_sign_key.as_ref()
        }
    }

    fn option_int(&self, id: AttributeId) -> Option<i32> {
        let o = &self.options;
        Some(match id {
            AttributeId::OPTION_ENCR_ALGO => o.encr_algo,
            AttributeId::OPTION_ENCR_HASH => o.encr_hash,
            AttributeId::OPTION_ENCR_MAC => o.encr_mac,
            AttributeId::OPTION_PKC_ALGO => o.pkc_algo,
            AttributeId::OPTION_PKC_KEYSIZE => o.pkc_keysize,
            AttributeId::OPTION_SIG_ALGO => o.sig_algo,
            AttributeId::OPTION_SIG_KEYSIZE => o.sig_keysize,
            AttributeId::OPTION_KEYING_ALGO => o.keying_algo,
            AttributeId::OPTION_KEYING_ITERATIONS => o.keying_iterations,
            AttributeId::OPTION_CERT_VALIDITY => o.cert_validity_days,
            AttributeId::OPTION_NET_CONNECTTIMEOUT => o.connect_timeout,
            AttributeId::OPTION_NET_READTIMEOUT => o.read_timeout,
            AttributeId::OPTION_NET_WRITETIMEOUT => o.write_timeout,
            _ => return None,
        })
    }

    fn option_text(&mut self, id: AttributeId) -> Option<&mut Option<String>> {
        let o = &mut self.options;
        match id {
            AttributeId::OPTION_NET_SOCKS_SERVER => Some(&mut o.socks_server),
            AttributeId::OPTION_NET_SOCKS_USERNAME => Some(&mut o.socks_username),
            AttributeId::OPTION_NET_HTTP_PROXY => Some(&mut o.http_proxy),
            _ => None,
        }
    }

    fn set_option_int(&mut self, id: AttributeId, value: i32) -> CryptResult<()> {
        let require = |class: AlgorithmClass, check: fn(Algorithm) -> bool| -> CryptResult<i32> {
            match Algorithm::from_raw(value) {
                Some(algo) if algo.class() == class && check(algo) => Ok(value),
                _ => Err(CryptError::new(ErrorCode::NotAvail).with_detail(format!("algorithm {value}"))),
            }
        };
        let o = &mut self.options;
        match id {
            AttributeId::OPTION_ENCR_ALGO => o.encr_algo = require(AlgorithmClass::Conventional, |_| true)?,
            AttributeId::OPTION_ENCR_HASH => o.encr_hash = require(AlgorithmClass::Hash, |_| true)?,
            AttributeId::OPTION_ENCR_MAC => o.encr_mac = require(AlgorithmClass::Mac, |_| true)?,
            AttributeId::OPTION_PKC_ALGO => {
                o.pkc_algo = require(AlgorithmClass::PublicKey, Algorithm::is_key_agreement)?
            }
            AttributeId::OPTION_SIG_ALGO => o.sig_algo = require(AlgorithmClass::PublicKey, Algorithm::is_signature)?,
            AttributeId::OPTION_KEYING_ALGO => {
                o.keying_algo = require(AlgorithmClass::Hash, |algo| algo == Algorithm::Blake3)?
            }
            AttributeId::OPTION_PKC_KEYSIZE => o.pkc_keysize = value,
            AttributeId::OPTION_SIG_KEYSIZE => o.sig_keysize = value,
            AttributeId::OPTION_KEYING_ITERATIONS => o.keying_iterations = value,
            AttributeId::OPTION_CERT_VALIDITY => o.cert_validity_days = value,
            AttributeId::OPTION_NET_CONNECTTIMEOUT => o.connect_timeout = value,
            AttributeId::OPTION_NET_READTIMEOUT => o.read_timeout = value,
            AttributeId::OPTION_NET_WRITETIMEOUT => o.write_timeout = value,
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    fn set_ca_key(&mut self, crl: bool, value: AttrInput) -> CryptResult<()> {
        if self.role != UserRole::Ca {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("not a CA user"));
        }
        let key = match value.into_object()? {
            ObjectRef::Key(key) if key.signer().is_ok_and(|pair| pair.has_private()) => *key,
            _ => return Err(CryptError::new(ErrorCode::Param3)),
        };
        let slot = if crl { &mut self.crl_sign_key } else { &mut self.cert_sign_key };
        *slot = Some(key);
        Ok(())
    }
}

impl AttributeHandler for UserObject {
    fn get_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        let text = |s: &str| AttributeValue::String(s.as_bytes().to_vec());
        match id {
            AttributeId::OPTION_INFO_DESCRIPTION => Ok(text(DESCRIPTION)),
            AttributeId::OPTION_INFO_COPYRIGHT => Ok(text(COPYRIGHT)),
            AttributeId::OPTION_INFO_MAJORVERSION => {
                Ok(AttributeValue::Int(version_part(env!("CARGO_PKG_VERSION_MAJOR"))))
            }
            AttributeId::OPTION_INFO_MINORVERSION => {
                Ok(AttributeValue::Int(version_part(env!("CARGO_PKG_VERSION_MINOR"))))
            }
            AttributeId::OPTION_INFO_STEPPING => Ok(AttributeValue::Int(version_part(env!("CARGO_PKG_VERSION_PATCH")))),
            id => {
                if let Some(value) = self.option_int(id) {
                    return Ok(AttributeValue::Int(value));
                }
                match self.option_text(id) {
                    Some(slot) => slot.as_deref().map(text).ok_or_else(|| CryptError::new(ErrorCode::NotFound)),
                    None => Err(CryptError::new(ErrorCode::NotAvail)),
                }
            }
        }
    }

    fn set_attr(&mut self, id: AttributeId, value: AttrInput, _env: &AttrEnv<'_>) -> CryptResult<()> {
        match id {
            AttributeId::USERINFO_PASSWORD => {
                if self.is_default {
                    return Err(CryptError::new(ErrorCode::Permission).with_detail("default user has no password"));
                }
                self.pending_password = Some(Zeroizing::new(value.text()?));
                Ok(())
            }
            AttributeId::USERINFO_CAKEY_CERTSIGN => self.set_ca_key(false, value),
            AttributeId::USERINFO_CAKEY_CRLSIGN => self.set_ca_key(true, value),
            id if self.option_int(id).is_some() => {
                self.set_option_int(id, value.int()?)?;
                debug!(user = %self.name, option = %id, "option changed");
                Ok(())
            }
            id => {
                let text = value.text()?;
                match self.option_text(id) {
                    Some(slot) => {
                        *slot = Some(text);
                        Ok(())
                    }
                    None => Err(CryptError::new(ErrorCode::NotAvail)),
                }
            }
        }
    }

    fn delete_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<()> {
        match self.option_text(id) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            Some(_) => Err(CryptError::new(ErrorCode::NotFound)),
            None => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::KeyMaterial;
    use crate::handle::Handle;
    use cryptkit_core::KernelConfig;
    use cryptkit_crypto::RandomPool;
    use parking_lot::Mutex;

    fn with_env<T>(f: impl FnOnce(&AttrEnv<'_>) -> T) -> T {
        let random = Mutex::new(RandomPool::new().unwrap());
        let config = KernelConfig::default();
        let env = AttrEnv {
            random: &random,
            config: &config,
            handle: Handle::from_raw(0x10001).unwrap(),
        };
        f(&env)
    }

    fn signing_key() -> Box<KeySnapshot> {
        Box::new(KeySnapshot {
            algorithm: Algorithm::Ed25519,
            label: Some("ca".into()),
            material: KeyMaterial::from_seed(Algorithm::Ed25519, &[2; 32]).unwrap(),
            non_exportable: false,
            attached: None,
        })
    }

    #[test]
    fn test_options_read_and_write() {
        with_env(|env| {
            let mut user = UserObject::new("default", UserRole::Normal, OptionsConfig::default(), true);
            assert_eq!(
                user.get_attr(AttributeId::OPTION_KEYING_ITERATIONS, env).unwrap(),
                AttributeValue::Int(500)
            );
            user.set_attr(AttributeId::OPTION_KEYING_ITERATIONS, AttrInput::Int(900), env).unwrap();
            assert_eq!(user.options().keying_iterations, 900);

            let err = user
                .set_attr(AttributeId::OPTION_SIG_ALGO, AttrInput::Int(Algorithm::X25519.id()), env)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorCode::NotAvail);

            assert_eq!(
                user.get_attr(AttributeId::OPTION_NET_HTTP_PROXY, env).unwrap_err().kind(),
                ErrorCode::NotFound
            );
            user.set_attr(AttributeId::OPTION_NET_HTTP_PROXY, AttrInput::Bytes(b"proxy:8080".to_vec()), env)
                .unwrap();
            user.delete_attr(AttributeId::OPTION_NET_HTTP_PROXY, env).unwrap();
            assert_eq!(
                user.delete_attr(AttributeId::OPTION_NET_HTTP_PROXY, env).unwrap_err().kind(),
                ErrorCode::NotFound
            );
        });
    }

    #[test]
    fn test_version_info() {
        with_env(|env| {
            let mut user = UserObject::new("default", UserRole::Normal, OptionsConfig::default(), true);
            let major = user.get_attr(AttributeId::OPTION_INFO_MAJORVERSION, env).unwrap();
            assert_eq!(major, AttributeValue::Int(version_part(env!("CARGO_PKG_VERSION_MAJOR"))));
        });
    }

    #[test]
    fn test_default_user_password_is_fixed() {
        with_env(|env| {
            let mut user = UserObject::new("default", UserRole::Normal, OptionsConfig::default(), true);
            let err = user
                .set_attr(AttributeId::USERINFO_PASSWORD, AttrInput::Bytes(b"new".to_vec()), env)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorCode::Permission);

            let mut named = UserObject::new("alice", UserRole::Normal, OptionsConfig::default(), false);
            named
                .set_attr(AttributeId::USERINFO_PASSWORD, AttrInput::Bytes(b"new".to_vec()), env)
                .unwrap();
            assert_eq!(named.take_password_change().as_deref().map(String::as_str), Some("new"));
        });
    }

    #[test]
    fn test_ca_keys_need_ca_role() {
        with_env(|env| {
            let mut normal = UserObject::new("bob", UserRole::Normal, OptionsConfig::default(), false);
            let err = normal
                .set_attr(AttributeId::USERINFO_CAKEY_CERTSIGN, AttrInput::Object(ObjectRef::Key(signing_key())), env)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorCode::Permission);

            let mut ca = UserObject::new("ca", UserRole::Ca, OptionsConfig::default(), false);
            ca.set_attr(AttributeId::USERINFO_CAKEY_CERTSIGN, AttrInput::Object(ObjectRef::Key(signing_key())), env)
                .unwrap();
            assert!(ca.ca_key(false).is_some());
            assert!(ca.ca_key(true).is_some());
        });
    }
}
