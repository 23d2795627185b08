//! Built-in software token.
//!
//! The token holds a security-officer PIN and a user PIN. Contexts created
//! through a device depend on it and are signalled when the device is closed
//! or zeroised.

use crate::attribute::{AttributeId, AttributeValue};
use crate::object::{AttrEnv, AttrInput, AttributeHandler, Lifecycle};
use crate::types::DeviceType;
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use zeroize::Zeroizing;

const PIN_CONTEXT: &str = "cryptkit device pin 2024-01";
const PIN_SALT_SIZE: usize = 16;

/// Salted hash of a PIN.
struct PinHash {
    salt: Vec<u8>,
    digest: [u8; 32],
}

impl PinHash {
    fn new(pin: &[u8], salt: Vec<u8>) -> Self {
        let digest = Self::digest(pin, &salt);
        Self { salt, digest }
    }

    fn digest(pin: &[u8], salt: &[u8]) -> [u8; 32] {
        let mut material = Zeroizing::new(Vec::with_capacity(salt.len() + pin.len()));
        material.extend_from_slice(salt);
        material.extend_from_slice(pin);
        blake3::derive_key(PIN_CONTEXT, &material)
    }

    fn verify(&self, pin: &[u8]) -> bool {
        bool::from(Self::digest(pin, &self.salt).as_slice().ct_eq(self.digest.as_slice()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Login {
    User,
    Supervisor,
}

pub struct DeviceObject {
    name: String,
    label: Option<String>,
    so_pin: Option<PinHash>,
    user_pin: Option<PinHash>,
    login: Option<Login>,
}

impl DeviceObject {
    pub fn open(device_type: DeviceType, name: &str) -> CryptResult<Self> {
        if device_type != DeviceType::None {
            return Err(CryptError::new(ErrorCode::NotAvail)
                .with_detail(format!("device type {device_type:?} is not built in")));
        }
        Ok(Self {
            name: name.to_string(),
            label: None,
            so_pin: None,
            user_pin: None,
            login: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn login(&self) -> Option<Login> {
        self.login
    }

    /// Fail with `Permission` unless someone is logged in.
    pub fn ensure_logged_in(&self) -> CryptResult<()> {
        if self.login.is_none() {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("device login required"));
        }
        Ok(())
    }

    fn ensure_supervisor(&self) -> CryptResult<()> {
        if self.login != Some(Login::Supervisor) {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("supervisor login required"));
        }
        Ok(())
    }

    fn check_pin(hash: Option<&PinHash>, pin: &[u8]) -> CryptResult<()> {
        let hash = hash.ok_or_else(|| CryptError::new(ErrorCode::NotInited).with_detail("PIN not set"))?;
        if !hash.verify(pin) {
            return Err(CryptError::new(ErrorCode::WrongKey).with_detail("incorrect PIN"));
        }
        Ok(())
    }

    fn zeroise(&mut self) {
        self.so_pin = None;
        self.user_pin = None;
        self.login = None;
        self.label = None;
    }
}

impl AttributeHandler for DeviceObject {
    fn get_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        match id {
            AttributeId::DEVINFO_LOGGEDIN => Ok(AttributeValue::Bool(self.login.is_some())),
            AttributeId::DEVINFO_LABEL => Ok(AttributeValue::String(
                self.label.as_deref().unwrap_or(&self.name).as_bytes().to_vec(),
            )),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn set_attr(&mut self, id: AttributeId, value: AttrInput, env: &AttrEnv<'_>) -> CryptResult<()> {
        if id == AttributeId::DEVINFO_LABEL {
            self.label = Some(value.text()?);
            return Ok(());
        }
        let pin = Zeroizing::new(value.bytes()?.to_vec());
        match id {
            AttributeId::DEVINFO_INITIALISE => {
                if self.so_pin.is_some() {
                    return Err(CryptError::new(ErrorCode::Inited).with_detail("device already initialised"));
                }
                self.so_pin = Some(PinHash::new(&pin, env.random_bytes(PIN_SALT_SIZE)));
                self.login = Some(Login::Supervisor);
                info!(device = %self.name, "device initialised");
            }
            AttributeId::DEVINFO_AUTHENT_SUPERVISOR => {
                Self::check_pin(self.so_pin.as_ref(), &pin)?;
                self.login = Some(Login::Supervisor);
            }
            AttributeId::DEVINFO_AUTHENT_USER => {
                Self::check_pin(self.user_pin.as_ref(), &pin)?;
                self.login = Some(Login::User);
            }
            AttributeId::DEVINFO_SET_AUTHENT_SUPERVISOR => {
                self.ensure_supervisor()?;
                self.so_pin = Some(PinHash::new(&pin, env.random_bytes(PIN_SALT_SIZE)));
            }
            AttributeId::DEVINFO_SET_AUTHENT_USER => {
                self.ensure_supervisor()?;
                self.user_pin = Some(PinHash::new(&pin, env.random_bytes(PIN_SALT_SIZE)));
            }
            AttributeId::DEVINFO_ZEROISE => {
                if let Some(hash) = &self.so_pin {
                    Self::check_pin(Some(hash), &pin)?;
                }
                self.zeroise();
                warn!(device = %self.name, "device zeroised");
            }
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    fn delete_attr(&mut self, _id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<()> {
        Err(CryptError::new(ErrorCode::NotAvail))
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.so_pin.is_some() {
            Lifecycle::Active
        } else {
            Lifecycle::Configured
        }
    }
}
