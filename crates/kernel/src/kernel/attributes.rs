//! The attribute protocol.
//!
//! Checks run in a fixed order: handle, unknown id, kind applicability,
//! value kind, access mode, then (inside the object) lock, busy state and
//! value range. Every failure after the handle check is recorded on the
//! object so it can be read back through `ATTRIBUTE_ERRORLOCUS` and
//! `ATTRIBUTE_ERRORTYPE`.

use super::{copy_out, Kernel};
use crate::attribute::{lookup, AttributeDescriptor, AttributeId, AttributeValue, ValueKind};
use crate::context::{ContextObject, KeyMaterial};
use crate::handle::{Handle, KindSet, ObjectKind};
use crate::object::{AttrEnv, AttrInput, ObjectCell, ObjectRef, Payload};
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use cryptkit_crypto::Algorithm;
use std::sync::Arc;
use tracing::{debug, warn};

enum Access {
    Read,
    Write,
    Delete,
}

impl Kernel {
    /// Resolve the target and check the attribute against its kind.
    fn attribute_target(
        &self,
        handle: Handle,
        id: AttributeId,
        numeric: Option<bool>,
        access: Access,
    ) -> CryptResult<(Arc<ObjectCell>, &'static AttributeDescriptor)> {
        let (kind, cell) = self.object(handle, 1, KindSet::ALL)?;
        let checked = Self::check_descriptor(kind, id, numeric, access);
        match checked {
            Ok(desc) => Ok((cell, desc)),
            Err(e) => {
                cell.lock().note_error(&e, Some(id));
                debug!(%handle, attribute = %id, error = %e, "attribute rejected");
                Err(e)
            }
        }
    }

    fn check_descriptor(
        kind: ObjectKind,
        id: AttributeId,
        numeric: Option<bool>,
        access: Access,
    ) -> CryptResult<&'static AttributeDescriptor> {
        let desc = lookup(id).ok_or_else(|| CryptError::param(2))?;
        if !desc.applies_to(kind) {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        if let Some(numeric) = numeric {
            if desc.kind.is_numeric() != numeric {
                return Err(CryptError::param(3));
            }
        }
        let permitted = match access {
            Access::Read => desc.access.readable(),
            Access::Write => desc.access.writable(),
            Access::Delete => desc.access.deletable(),
        };
        if !permitted {
            return Err(CryptError::new(ErrorCode::Permission));
        }
        Ok(desc)
    }

    fn env(&self, handle: Handle) -> AttrEnv<'_> {
        AttrEnv {
            random: &self.random,
            config: &self.config,
            handle,
        }
    }

    fn read(&self, handle: Handle, id: AttributeId, numeric: bool) -> CryptResult<AttributeValue> {
        let (cell, desc) = self.attribute_target(handle, id, Some(numeric), Access::Read)?;
        if desc.kind == ValueKind::Object {
            return self.read_object(handle, &cell, id).map(|h| AttributeValue::Int(h.raw()));
        }
        let env = self.env(handle);
        let mut record = cell.lock();
        let result = record.get_attr(desc, &env);
        if let Err(e) = &result {
            record.note_error(e, Some(id));
        }
        result
    }

    /// Object-valued reads hand out a new object.
    fn read_object(&self, handle: Handle, cell: &ObjectCell, id: AttributeId) -> CryptResult<Handle> {
        let (owner, result) = {
            let mut record = cell.lock();
            let owner = record.owner;
            let result = match id {
                AttributeId::PROPERTY_OWNER => return Ok(owner),
                AttributeId::ENVINFO_SIGNATURE => record
                    .as_envelope()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotAvail))
                    .and_then(|env| env.signer_key().cloned()),
                _ => Err(CryptError::new(ErrorCode::NotAvail)),
            };
            if let Err(e) = &result {
                record.note_error(e, Some(id));
            }
            (owner, result)
        };
        let signer = result?;
        let options = self.options_of(owner)?;
        let material = KeyMaterial::from_public(Algorithm::Ed25519, &signer.public_key)?;
        let mut ctx = ContextObject::with_key(Algorithm::Ed25519, material, signer.label, &options)?;
        if let Some(cert) = signer.certificate {
            ctx.attach(cert);
        }
        let key = self.register(owner, Payload::Context(Box::new(ctx)), None)?;
        debug!(envelope = %handle, %key, "signature key handed out");
        Ok(key)
    }

    /// Turn the integer setter's value for an object-valued attribute into
    /// a snapshot of the referenced object.
    fn reference(&self, target: Handle, value: i32) -> CryptResult<ObjectRef> {
        let handle = Handle::from_raw(value).ok_or_else(|| CryptError::param(3))?;
        Self::distinct(target, handle, 3)?;
        let (kind, cell) = self.object(handle, 3, KindSet::CONTEXT.union(KindSet::CERTIFICATE).union(KindSet::USER))?;
        let record = cell.lock();
        match kind {
            ObjectKind::Context => {
                let ctx = record.as_context().ok_or_else(|| CryptError::param(3))?;
                Ok(ObjectRef::Key(Box::new(ctx.snapshot(record.props.non_exportable)?)))
            }
            ObjectKind::Certificate => {
                let cert = record.as_certificate().ok_or_else(|| CryptError::param(3))?;
                Ok(ObjectRef::Certificate(Box::new(cert.snapshot())))
            }
            _ => Ok(ObjectRef::User(handle)),
        }
    }

    fn write(&self, handle: Handle, id: AttributeId, value: AttrInput, numeric: bool) -> CryptResult<()> {
        let (cell, desc) = self.attribute_target(handle, id, Some(numeric), Access::Write)?;
        let value = match value {
            AttrInput::Int(raw) if desc.kind == ValueKind::Object => match self.reference(handle, raw) {
                Ok(obj) => AttrInput::Object(obj),
                Err(e) => {
                    cell.lock().note_error(&e, Some(id));
                    return Err(e);
                }
            },
            AttrInput::Int(raw) if desc.kind == ValueKind::Bool => AttrInput::Int((raw != 0) as i32),
            other => other,
        };
        let env = self.env(handle);
        let password = {
            let mut record = cell.lock();
            if let Err(e) = record.set_attr(desc, value, &env) {
                record.note_error(&e, Some(id));
                debug!(%handle, attribute = %id, error = %e, "attribute set failed");
                return Err(e);
            }
            record
                .as_user_mut()
                .and_then(|user| user.take_password_change().map(|pw| (user.name().to_string(), pw)))
        };
        if let Some((name, password)) = password {
            self.change_password(&name, &password)?;
        }
        if id == AttributeId::DEVINFO_ZEROISE {
            for dependant in self.registry.signal_dependents_of(handle) {
                warn!(%dependant, device = %handle, "object signalled by zeroise");
            }
        }
        debug!(%handle, attribute = %id, "attribute set");
        Ok(())
    }

    /// Read a numeric, boolean (1/0), time or object attribute.
    pub fn get_attribute(&self, handle: Handle, id: AttributeId) -> CryptResult<i32> {
        let value = self.read(handle, id, true)?;
        value.as_int().ok_or_else(|| CryptError::new(ErrorCode::Failed))
    }

    /// Read a string attribute with the two-phase protocol: `None` returns
    /// the length, a buffer receives the value.
    pub fn get_attribute_string(&self, handle: Handle, id: AttributeId, buf: Option<&mut [u8]>) -> CryptResult<usize> {
        let value = self.read(handle, id, false)?;
        let bytes = value.as_bytes().ok_or_else(|| CryptError::new(ErrorCode::Failed))?;
        copy_out(bytes, buf)
    }

    /// Read a string attribute into a new buffer.
    pub fn get_attribute_bytes(&self, handle: Handle, id: AttributeId) -> CryptResult<Vec<u8>> {
        let len = self.get_attribute_string(handle, id, None)?;
        let mut buf = vec![0u8; len];
        let len = self.get_attribute_string(handle, id, Some(&mut buf))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Set a numeric, boolean, time or object attribute. Object attributes
    /// take the raw value of a handle.
    pub fn set_attribute(&self, handle: Handle, id: AttributeId, value: i32) -> CryptResult<()> {
        self.write(handle, id, AttrInput::Int(value), true)
    }

    pub fn set_attribute_string(&self, handle: Handle, id: AttributeId, value: &[u8]) -> CryptResult<()> {
        self.write(handle, id, AttrInput::Bytes(value.to_vec()), false)
    }

    pub fn delete_attribute(&self, handle: Handle, id: AttributeId) -> CryptResult<()> {
        let (cell, desc) = self.attribute_target(handle, id, None, Access::Delete)?;
        let env = self.env(handle);
        let mut record = cell.lock();
        let result = record.delete_attr(desc, &env);
        if let Err(e) = &result {
            record.note_error(e, Some(id));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::kernel;
    use crate::attribute::{descriptors, AttributeId, ValueKind};
    use crate::handle::{Handle, ObjectKind};
    use crate::kernel::Kernel;
    use crate::types::{CertType, DeviceType, EnvelopeFormat, KeysetOption, KeysetType, SessionType};
    use cryptkit_core::{ErrorCode, ErrorType};
    use tempfile::TempDir;

    fn one_of_each(kernel: &Kernel, dir: &TempDir) -> Vec<(ObjectKind, Handle)> {
        let path = dir.path().join("keys.json");
        vec![
            (ObjectKind::Context, kernel.create_context(None, 1).unwrap()),
            (ObjectKind::Certificate, kernel.create_cert(None, CertType::Certificate).unwrap()),
            (
                ObjectKind::Keyset,
                kernel
                    .keyset_open(None, KeysetType::File, path.to_str().unwrap(), KeysetOption::Create)
                    .unwrap(),
            ),
            (ObjectKind::Device, kernel.device_open(None, DeviceType::None, "soft").unwrap()),
            (ObjectKind::Envelope, kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap()),
            (ObjectKind::Session, kernel.create_session(None, SessionType::Channel).unwrap()),
            (ObjectKind::User, kernel.default_user()),
        ]
    }

    #[test]
    fn test_inapplicable_attributes_are_not_available() {
        let kernel = kernel();
        let dir = TempDir::new().unwrap();
        for (kind, handle) in one_of_each(&kernel, &dir) {
            for desc in descriptors() {
                if desc.applies_to(kind) {
                    continue;
                }
                let err = if desc.kind == ValueKind::String {
                    kernel.get_attribute_string(handle, desc.id, None).unwrap_err()
                } else {
                    kernel.get_attribute(handle, desc.id).unwrap_err()
                };
                assert_eq!(err.kind(), ErrorCode::NotAvail, "{:?} on {kind}", desc.id);
                let err = if desc.kind == ValueKind::String {
                    kernel.set_attribute_string(handle, desc.id, b"x").unwrap_err()
                } else {
                    kernel.set_attribute(handle, desc.id, 1).unwrap_err()
                };
                assert_eq!(err.kind(), ErrorCode::NotAvail, "{:?} on {kind}", desc.id);
            }
        }
    }

    #[test]
    fn test_unknown_attribute_is_second_parameter() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        let err = kernel.get_attribute(ctx, AttributeId(9999)).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Param2);
    }

    #[test]
    fn test_value_kind_mismatch_is_third_parameter() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        let err = kernel.set_attribute(ctx, AttributeId::CTXINFO_LABEL, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Param3);
        let err = kernel.get_attribute_string(ctx, AttributeId::CTXINFO_ALGO, None).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Param3);
    }

    #[test]
    fn test_write_only_attribute_cannot_be_read() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        let err = kernel.get_attribute_string(ctx, AttributeId::CTXINFO_KEY, None).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Permission);
    }

    #[test]
    fn test_locked_object_rejects_writes_but_reads() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        kernel.set_attribute_string(ctx, AttributeId::CTXINFO_LABEL, b"before").unwrap();
        kernel.set_attribute(ctx, AttributeId::PROPERTY_LOCKED, 1).unwrap();
        assert_eq!(
            kernel.set_attribute(ctx, AttributeId::CTXINFO_KEYSIZE, 32).unwrap_err().kind(),
            ErrorCode::Permission
        );
        assert_eq!(
            kernel.delete_attribute(ctx, AttributeId::CTXINFO_LABEL).unwrap_err().kind(),
            ErrorCode::Permission
        );
        assert_eq!(kernel.get_attribute(ctx, AttributeId::PROPERTY_LOCKED).unwrap(), 1);
        assert_eq!(kernel.get_attribute_bytes(ctx, AttributeId::CTXINFO_LABEL).unwrap(), b"before");
    }

    #[test]
    fn test_length_query_is_idempotent() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        kernel.set_attribute_string(ctx, AttributeId::CTXINFO_LABEL, b"session key").unwrap();
        let first = kernel.get_attribute_string(ctx, AttributeId::CTXINFO_LABEL, None).unwrap();
        let second = kernel.get_attribute_string(ctx, AttributeId::CTXINFO_LABEL, None).unwrap();
        assert_eq!(first, second);
        let mut short = vec![0u8; first - 1];
        assert_eq!(
            kernel
                .get_attribute_string(ctx, AttributeId::CTXINFO_LABEL, Some(&mut short))
                .unwrap_err()
                .kind(),
            ErrorCode::Overflow
        );
    }

    #[test]
    fn test_failures_record_error_locus() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        kernel.get_attribute_string(ctx, AttributeId::CTXINFO_IV, None).unwrap_err();
        assert_eq!(
            kernel.get_attribute(ctx, AttributeId::ATTRIBUTE_ERRORLOCUS).unwrap(),
            AttributeId::CTXINFO_IV.raw()
        );
        assert_eq!(
            kernel.get_attribute(ctx, AttributeId::ATTRIBUTE_ERRORTYPE).unwrap(),
            ErrorType::AttrAbsent.code()
        );
    }

    #[test]
    fn test_object_attribute_rejects_self_reference() {
        let kernel = kernel();
        let env = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
        let err = kernel.set_attribute(env, AttributeId::ENVINFO_KEY, env.raw()).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Param3);
        let err = kernel.set_attribute(env, AttributeId::ENVINFO_KEY, 12).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Param3);
    }

    #[test]
    fn test_owner_reads_back() {
        let kernel = kernel();
        let ctx = kernel.create_context(None, 1).unwrap();
        assert_eq!(
            kernel.get_attribute(ctx, AttributeId::PROPERTY_OWNER).unwrap(),
            kernel.default_user().raw()
        );
    }
}
