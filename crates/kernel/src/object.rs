//! Per-object records.
//!
//! Every registry slot holds an [`ObjectCell`]: a mutex around the object's
//! record. The record carries what all kinds share (owner, properties, the
//! last error) and a kind-specific [`Payload`]. Attribute traffic that gets
//! past the descriptor checks lands here and is routed either to the shared
//! parts or to the payload's [`AttributeHandler`].

use crate::attribute::{AttributeDescriptor, AttributeId, AttributeValue, Group};
use crate::certificate::{CertSnapshot, CertificateObject};
use crate::context::{ContextObject, KeySnapshot};
use crate::device::DeviceObject;
use crate::envelope::EnvelopeObject;
use crate::handle::{Handle, ObjectKind};
use crate::keyset::KeysetObject;
use crate::session::SessionObject;
use crate::user::UserObject;
use cryptkit_core::{CryptError, CryptResult, ErrorCode, ErrorType, KernelConfig};
use cryptkit_crypto::RandomPool;
use parking_lot::Mutex;

pub type ObjectCell = Mutex<ObjectRecord>;

/// Coarse lifecycle position. Creation and destruction are registry events;
/// in between an object is either still being configured or active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Configured,
    Active,
}

/// A referenced object, captured before the target object is locked.
pub enum ObjectRef {
    Key(Box<KeySnapshot>),
    Certificate(Box<CertSnapshot>),
    User(Handle),
}

impl ObjectRef {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectRef::Key(_) => ObjectKind::Context,
            ObjectRef::Certificate(_) => ObjectKind::Certificate,
            ObjectRef::User(_) => ObjectKind::User,
        }
    }
}

/// Value handed to a set handler after type checking.
pub enum AttrInput {
    /// Integer, boolean (normalised to 0/1) or time value.
    Int(i32),
    Bytes(Vec<u8>),
    Object(ObjectRef),
}

impl AttrInput {
    pub fn int(&self) -> CryptResult<i32> {
        match self {
            AttrInput::Int(v) => Ok(*v),
            _ => Err(CryptError::new(ErrorCode::Param3)),
        }
    }

    pub fn flag(&self) -> CryptResult<bool> {
        self.int().map(|v| v != 0)
    }

    pub fn bytes(&self) -> CryptResult<&[u8]> {
        match self {
            AttrInput::Bytes(b) => Ok(b),
            _ => Err(CryptError::new(ErrorCode::Param3)),
        }
    }

    pub fn text(&self) -> CryptResult<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CryptError::new(ErrorCode::Param3))
    }

    pub fn into_object(self) -> CryptResult<ObjectRef> {
        match self {
            AttrInput::Object(obj) => Ok(obj),
            _ => Err(CryptError::new(ErrorCode::Param3)),
        }
    }
}

/// Kernel resources available to attribute handlers.
pub struct AttrEnv<'a> {
    pub random: &'a Mutex<RandomPool>,
    pub config: &'a KernelConfig,
    /// Handle of the object being accessed.
    pub handle: Handle,
}

impl AttrEnv<'_> {
    pub fn random_bytes(&self, len: usize) -> Vec<u8> {
        self.random.lock().bytes(len)
    }
}

/// Kind-specific attribute access.
pub trait AttributeHandler {
    fn get_attr(&mut self, id: AttributeId, env: &AttrEnv<'_>) -> CryptResult<AttributeValue>;
    fn set_attr(&mut self, id: AttributeId, value: AttrInput, env: &AttrEnv<'_>) -> CryptResult<()>;
    fn delete_attr(&mut self, id: AttributeId, env: &AttrEnv<'_>) -> CryptResult<()>;

    /// Whether a background operation is in progress.
    fn is_busy(&self) -> bool {
        false
    }

    fn lifecycle(&self) -> Lifecycle;
}

/// Properties shared by all objects.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    pub locked: bool,
    pub high_security: bool,
    pub forward_count: Option<i32>,
    pub usage_count: Option<i32>,
    pub non_exportable: bool,
}

impl Properties {
    fn get(&self, id: AttributeId) -> CryptResult<AttributeValue> {
        match id {
            AttributeId::PROPERTY_FORWARDCOUNT => self
                .forward_count
                .map(AttributeValue::Int)
                .ok_or_else(|| CryptError::new(ErrorCode::NotFound)),
            AttributeId::PROPERTY_LOCKED => Ok(AttributeValue::Bool(self.locked)),
            AttributeId::PROPERTY_USAGECOUNT => self
                .usage_count
                .map(AttributeValue::Int)
                .ok_or_else(|| CryptError::new(ErrorCode::NotFound)),
            AttributeId::PROPERTY_NONEXPORTABLE => Ok(AttributeValue::Bool(self.non_exportable)),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn set(&mut self, id: AttributeId, value: i32) -> CryptResult<()> {
        match id {
            AttributeId::PROPERTY_HIGHSECURITY => {
                if value == 0 {
                    return Err(CryptError::new(ErrorCode::Param3));
                }
                self.high_security = true;
                self.locked = true;
                self.forward_count = Some(0);
            }
            AttributeId::PROPERTY_FORWARDCOUNT => self.forward_count = Some(value),
            AttributeId::PROPERTY_LOCKED => {
                if value == 0 {
                    return Err(CryptError::new(ErrorCode::Param3));
                }
                self.locked = true;
            }
            AttributeId::PROPERTY_USAGECOUNT => {
                if self.usage_count.is_some() {
                    return Err(CryptError::new(ErrorCode::Permission));
                }
                self.usage_count = Some(value);
            }
            AttributeId::PROPERTY_NONEXPORTABLE => {
                if value == 0 && self.non_exportable {
                    return Err(CryptError::new(ErrorCode::Permission));
                }
                self.non_exportable = value != 0;
            }
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    /// Fail with `Permission` if the usage count is exhausted, without
    /// charging it.
    pub fn ensure_usable(&self) -> CryptResult<()> {
        match self.usage_count {
            Some(0) => Err(CryptError::new(ErrorCode::Permission).with_detail("usage count exhausted")),
            _ => Ok(()),
        }
    }

    /// Give back a use charged for an operation that then failed.
    pub fn refund_usage(&mut self) {
        if let Some(n) = self.usage_count {
            self.usage_count = Some(n + 1);
        }
    }

    /// Charge one use against the usage count.
    pub fn consume_usage(&mut self) -> CryptResult<()> {
        match self.usage_count {
            Some(0) => Err(CryptError::new(ErrorCode::Permission).with_detail("usage count exhausted")),
            Some(n) => {
                self.usage_count = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Charge one ownership transfer against the forward count.
    fn transfer(&mut self) -> CryptResult<()> {
        match self.forward_count {
            Some(0) => Err(CryptError::new(ErrorCode::Permission).with_detail("forward count exhausted")),
            Some(n) => {
                self.forward_count = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Extended information about the last failure on an object.
#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    locus: i32,
    error_type: ErrorType,
    status: i32,
    message: String,
}

impl ErrorInfo {
    pub fn record(&mut self, err: &CryptError, attribute: Option<AttributeId>) {
        self.locus = err
            .locus()
            .or_else(|| attribute.map(AttributeId::raw))
            .unwrap_or(0);
        self.error_type = match err.error_type() {
            ErrorType::None => default_error_type(err.kind(), attribute.is_some()),
            other => other,
        };
        self.status = err.code();
        self.message = err.detail().unwrap_or_else(|| err.message()).to_string();
    }

    pub fn locus(&self) -> i32 {
        self.locus
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    fn get(&self, id: AttributeId) -> CryptResult<AttributeValue> {
        match id {
            AttributeId::ATTRIBUTE_ERRORTYPE => Ok(AttributeValue::Int(self.error_type.code())),
            AttributeId::ATTRIBUTE_ERRORLOCUS => Ok(AttributeValue::Int(self.locus)),
            AttributeId::ATTRIBUTE_INT_ERRORCODE => Ok(AttributeValue::Int(self.status)),
            AttributeId::ATTRIBUTE_INT_ERRORMESSAGE if !self.message.is_empty() => {
                Ok(AttributeValue::String(self.message.as_bytes().to_vec()))
            }
            _ => Err(CryptError::new(ErrorCode::NotFound)),
        }
    }
}

fn default_error_type(code: ErrorCode, attribute_access: bool) -> ErrorType {
    match code {
        ErrorCode::NotFound => ErrorType::AttrAbsent,
        ErrorCode::Inited | ErrorCode::Duplicate => ErrorType::AttrPresent,
        ErrorCode::Param3 => ErrorType::AttrValue,
        ErrorCode::Permission if attribute_access => ErrorType::Constraint,
        ErrorCode::EnvelopeResource => ErrorType::AttrAbsent,
        _ => ErrorType::None,
    }
}

/// Kind-specific object state.
pub enum Payload {
    Context(Box<ContextObject>),
    Certificate(Box<CertificateObject>),
    Keyset(Box<KeysetObject>),
    Device(Box<DeviceObject>),
    Envelope(Box<EnvelopeObject>),
    Session(Box<SessionObject>),
    User(Box<UserObject>),
}

impl Payload {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Payload::Context(_) => ObjectKind::Context,
            Payload::Certificate(_) => ObjectKind::Certificate,
            Payload::Keyset(_) => ObjectKind::Keyset,
            Payload::Device(_) => ObjectKind::Device,
            Payload::Envelope(_) => ObjectKind::Envelope,
            Payload::Session(_) => ObjectKind::Session,
            Payload::User(_) => ObjectKind::User,
        }
    }

    fn handler(&mut self) -> &mut dyn AttributeHandler {
        match self {
            Payload::Context(obj) => &mut **obj,
            Payload::Certificate(obj) => &mut **obj,
            Payload::Keyset(obj) => &mut **obj,
            Payload::Device(obj) => &mut **obj,
            Payload::Envelope(obj) => &mut **obj,
            Payload::Session(obj) => &mut **obj,
            Payload::User(obj) => &mut **obj,
        }
    }

    fn handler_ref(&self) -> &dyn AttributeHandler {
        match self {
            Payload::Context(obj) => &**obj,
            Payload::Certificate(obj) => &**obj,
            Payload::Keyset(obj) => &**obj,
            Payload::Device(obj) => &**obj,
            Payload::Envelope(obj) => &**obj,
            Payload::Session(obj) => &**obj,
            Payload::User(obj) => &**obj,
        }
    }
}

/// Declares `as_*` / `as_*_mut` accessors on [`ObjectRecord`].
macro_rules! payload_accessors {
    ($($variant:ident: $ty:ty => $get:ident, $get_mut:ident;)+) => {
        impl ObjectRecord {
            $(
                pub fn $get(&self) -> Option<&$ty> {
                    match &self.payload {
                        Payload::$variant(obj) => Some(&**obj),
                        _ => None,
                    }
                }

                pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                    match &mut self.payload {
                        Payload::$variant(obj) => Some(&mut **obj),
                        _ => None,
                    }
                }
            )+
        }
    };
}

/// Shared state plus payload of one object.
pub struct ObjectRecord {
    pub owner: Handle,
    pub props: Properties,
    pub error: ErrorInfo,
    pub payload: Payload,
}

payload_accessors! {
    Context: ContextObject => as_context, as_context_mut;
    Certificate: CertificateObject => as_certificate, as_certificate_mut;
    Keyset: KeysetObject => as_keyset, as_keyset_mut;
    Device: DeviceObject => as_device, as_device_mut;
    Envelope: EnvelopeObject => as_envelope, as_envelope_mut;
    Session: SessionObject => as_session, as_session_mut;
    User: UserObject => as_user, as_user_mut;
}

impl ObjectRecord {
    pub fn new(owner: Handle, payload: Payload) -> Self {
        Self {
            owner,
            props: Properties::default(),
            error: ErrorInfo::default(),
            payload,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.payload.kind()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.payload.handler_ref().lifecycle()
    }

    pub fn is_busy(&self) -> bool {
        self.payload.handler_ref().is_busy()
    }

    /// Fail with `Timeout` while a background operation runs.
    pub fn ensure_idle(&self) -> CryptResult<()> {
        if self.is_busy() {
            return Err(CryptError::new(ErrorCode::Timeout));
        }
        Ok(())
    }

    fn checks_busy(desc: &AttributeDescriptor) -> bool {
        !matches!(desc.group, Group::Property)
            && !matches!(
                desc.id,
                AttributeId::ATTRIBUTE_ERRORTYPE
                    | AttributeId::ATTRIBUTE_ERRORLOCUS
                    | AttributeId::ATTRIBUTE_INT_ERRORCODE
                    | AttributeId::ATTRIBUTE_INT_ERRORMESSAGE
            )
    }

    /// Read an attribute. Kind applicability, value kind and access mode
    /// have already been checked.
    pub fn get_attr(&mut self, desc: &AttributeDescriptor, env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        if Self::checks_busy(desc) {
            self.ensure_idle()?;
        }
        match desc.id {
            AttributeId::PROPERTY_OWNER => Ok(AttributeValue::Int(self.owner.raw())),
            id if desc.group == Group::Property => self.props.get(id),
            AttributeId::ATTRIBUTE_ERRORTYPE
            | AttributeId::ATTRIBUTE_ERRORLOCUS
            | AttributeId::ATTRIBUTE_INT_ERRORCODE
            | AttributeId::ATTRIBUTE_INT_ERRORMESSAGE => self.error.get(desc.id),
            id => self.payload.handler().get_attr(id, env),
        }
    }

    /// Write an attribute, enforcing lock, busy and range rules.
    pub fn set_attr(
        &mut self,
        desc: &AttributeDescriptor,
        value: AttrInput,
        env: &AttrEnv<'_>,
    ) -> CryptResult<()> {
        if self.props.locked {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("object is locked"));
        }
        if Self::checks_busy(desc) {
            self.ensure_idle()?;
        }
        match &value {
            AttrInput::Int(v) => desc.check_int(*v)?,
            AttrInput::Bytes(b) => desc.check_len(b.len())?,
            AttrInput::Object(_) => {}
        }
        match desc.id {
            AttributeId::PROPERTY_OWNER => match value.into_object()? {
                ObjectRef::User(user) => {
                    self.props.transfer()?;
                    self.owner = user;
                    Ok(())
                }
                _ => Err(CryptError::new(ErrorCode::Param3)),
            },
            id if desc.group == Group::Property => self.props.set(id, value.int()?),
            id => self.payload.handler().set_attr(id, value, env),
        }
    }

    pub fn delete_attr(&mut self, desc: &AttributeDescriptor, env: &AttrEnv<'_>) -> CryptResult<()> {
        if self.props.locked {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("object is locked"));
        }
        self.ensure_idle()?;
        self.payload.handler().delete_attr(desc.id, env)
    }

    /// Record a failure so it can be read back through the error attributes.
    pub fn note_error(&mut self, err: &CryptError, attribute: Option<AttributeId>) {
        self.error.record(err, attribute);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locking_properties() {
        let mut props = Properties::default();
        assert_eq!(
            props.set(AttributeId::PROPERTY_LOCKED, 0).unwrap_err().kind(),
            ErrorCode::Param3
        );
        props.set(AttributeId::PROPERTY_LOCKED, 1).unwrap();
        assert!(props.locked);
        assert_eq!(props.get(AttributeId::PROPERTY_LOCKED).unwrap(), AttributeValue::Bool(true));
    }

    #[test]
    fn test_high_security_implies_lock() {
        let mut props = Properties::default();
        props.set(AttributeId::PROPERTY_HIGHSECURITY, 1).unwrap();
        assert!(props.locked);
        assert_eq!(props.forward_count, Some(0));
        assert_eq!(props.transfer().unwrap_err().kind(), ErrorCode::Permission);
    }

    #[test]
    fn test_usage_count_set_once_and_consumed() {
        let mut props = Properties::default();
        assert!(props.get(AttributeId::PROPERTY_USAGECOUNT).is_err());
        props.set(AttributeId::PROPERTY_USAGECOUNT, 2).unwrap();
        assert_eq!(
            props.set(AttributeId::PROPERTY_USAGECOUNT, 5).unwrap_err().kind(),
            ErrorCode::Permission
        );
        props.consume_usage().unwrap();
        props.consume_usage().unwrap();
        assert_eq!(props.ensure_usable().unwrap_err().kind(), ErrorCode::Permission);
        assert_eq!(props.consume_usage().unwrap_err().kind(), ErrorCode::Permission);
        props.refund_usage();
        props.ensure_usable().unwrap();
        assert_eq!(props.usage_count, Some(1));
    }

    #[test]
    fn test_non_exportable_is_sticky() {
        let mut props = Properties::default();
        props.set(AttributeId::PROPERTY_NONEXPORTABLE, 1).unwrap();
        assert_eq!(
            props.set(AttributeId::PROPERTY_NONEXPORTABLE, 0).unwrap_err().kind(),
            ErrorCode::Permission
        );
    }

    #[test]
    fn test_error_info_defaults() {
        let mut info = ErrorInfo::default();
        info.record(&CryptError::new(ErrorCode::NotFound), Some(AttributeId::CTXINFO_IV));
        assert_eq!(info.locus(), AttributeId::CTXINFO_IV.raw());
        assert_eq!(info.error_type(), ErrorType::AttrAbsent);

        let explicit = CryptError::new(ErrorCode::Invalid)
            .with_locus(AttributeId::CERTINFO_SUBJECTNAME.raw(), ErrorType::AttrAbsent);
        info.record(&explicit, None);
        assert_eq!(info.locus(), AttributeId::CERTINFO_SUBJECTNAME.raw());
        assert_eq!(
            info.get(AttributeId::ATTRIBUTE_INT_ERRORCODE).unwrap(),
            AttributeValue::Int(ErrorCode::Invalid.code())
        );
    }
}
