//! Certificate objects.

use super::{copy_out, Kernel};
use crate::certificate::{unix_time, CertificateObject, CheckAgainst, SERIAL_SIZE};
use crate::handle::{Handle, KindSet, ObjectKind};
use crate::object::Payload;
use crate::types::{CertFormat, CertType};
use cryptkit_core::{CryptError, CryptResult};
use tracing::{debug, info};

impl Kernel {
    /// Create an empty certificate object of `cert_type`.
    pub fn create_cert(&self, owner: Option<Handle>, cert_type: CertType) -> CryptResult<Handle> {
        let owner = self.owner(owner, 1)?;
        let validity = self.options_of(owner)?.cert_validity_days;
        let cert = CertificateObject::new(cert_type, validity).map_err(|e| {
            if e.is(cryptkit_core::ErrorCode::NotAvail) {
                CryptError::param(2)
            } else {
                e
            }
        })?;
        self.register(owner, Payload::Certificate(Box::new(cert)), None)
    }

    pub fn destroy_cert(&self, cert: Handle) -> CryptResult<()> {
        self.destroy_kind(cert, KindSet::CERTIFICATE)
    }

    /// Sign `cert` with the private key in `sign`.
    pub fn sign_cert(&self, cert: Handle, sign: Handle) -> CryptResult<()> {
        Self::distinct(cert, sign, 2)?;
        let key = self.key_snapshot(sign, 2)?;
        let serial = self.random.lock().bytes(SERIAL_SIZE);
        let cell = self.cell(cert, 1, KindSet::CERTIFICATE)?;
        let signer = self.cell(sign, 2, KindSet::CONTEXT)?;
        signer.lock().props.consume_usage()?;
        let mut record = cell.lock();
        let result = match record.as_certificate_mut() {
            Some(object) => object.sign(&key, unix_time(), serial),
            None => Err(CryptError::param(1)),
        };
        if let Err(e) = result {
            record.note_error(&e, None);
            drop(record);
            signer.lock().props.refund_usage();
            return Err(e);
        }
        drop(record);
        info!(%cert, signer = %sign, "certificate signed");
        Ok(())
    }

    /// Check `cert`. `against` may be a public-key context, an issuer
    /// certificate or a CRL; with none the object must verify on its own.
    pub fn check_cert(&self, cert: Handle, against: Option<Handle>) -> CryptResult<()> {
        let snapshot = match against {
            None => None,
            Some(other) => {
                Self::distinct(cert, other, 2)?;
                let (kind, cell) = self.object(other, 2, KindSet::CONTEXT.union(KindSet::CERTIFICATE))?;
                Some(if kind == ObjectKind::Context {
                    Against::Key(self.key_snapshot(other, 2)?)
                } else {
                    let record = cell.lock();
                    let object = record.as_certificate().ok_or_else(|| CryptError::param(2))?;
                    Against::Certificate(object.snapshot())
                })
            }
        };
        let cell = self.cell(cert, 1, KindSet::CERTIFICATE)?;
        let mut record = cell.lock();
        let object = record.as_certificate().ok_or_else(|| CryptError::param(1))?;
        let check = match &snapshot {
            None => CheckAgainst::None,
            Some(Against::Key(key)) => CheckAgainst::Key(key),
            Some(Against::Certificate(other)) => CheckAgainst::Certificate(other),
        };
        let result = object.check(check, unix_time());
        if let Err(e) = &result {
            debug!(%cert, error = %e, "certificate check failed");
            record.note_error(e, None);
        }
        result
    }

    /// Encode `cert` in `format`. With no buffer the encoded length is
    /// returned.
    pub fn export_cert(&self, buf: Option<&mut [u8]>, format: CertFormat, cert: Handle) -> CryptResult<usize> {
        let cell = self.cell(cert, 3, KindSet::CERTIFICATE)?;
        let record = cell.lock();
        let object = record.as_certificate().ok_or_else(|| CryptError::param(3))?;
        let encoded = object.export(format)?;
        copy_out(&encoded, buf)
    }

    /// Import an encoded certificate, chain, request or CRL.
    pub fn import_cert(&self, data: &[u8], owner: Option<Handle>) -> CryptResult<Handle> {
        if data.is_empty() {
            return Err(CryptError::param(1));
        }
        let owner = self.owner(owner, 2)?;
        let object = CertificateObject::import(data)?;
        let cert_type = object.cert_type();
        let handle = self.register(owner, Payload::Certificate(Box::new(object)), None)?;
        debug!(%handle, ?cert_type, "certificate imported");
        Ok(handle)
    }

    fn with_cert_mut<T>(
        &self,
        cert: Handle,
        f: impl FnOnce(&mut CertificateObject) -> CryptResult<T>,
    ) -> CryptResult<T> {
        let cell = self.cell(cert, 1, KindSet::CERTIFICATE)?;
        let mut record = cell.lock();
        if record.props.locked {
            return Err(CryptError::new(cryptkit_core::ErrorCode::Permission));
        }
        let result = match record.as_certificate_mut() {
            Some(object) => f(object),
            None => Err(CryptError::param(1)),
        };
        if let Err(e) = &result {
            record.note_error(e, None);
        }
        result
    }

    /// Add an extension identified by a dotted OID.
    pub fn add_cert_extension(&self, cert: Handle, oid: &str, critical: bool, data: &[u8]) -> CryptResult<()> {
        self.with_cert_mut(cert, |object| object.add_extension(oid, critical, data))
    }

    /// Read an extension: its critical flag and the data length, copying the
    /// data out if a buffer is given.
    pub fn get_cert_extension(&self, cert: Handle, oid: &str, buf: Option<&mut [u8]>) -> CryptResult<(bool, usize)> {
        let cell = self.cell(cert, 1, KindSet::CERTIFICATE)?;
        let record = cell.lock();
        let object = record.as_certificate().ok_or_else(|| CryptError::param(1))?;
        let extension = object.get_extension(oid)?;
        Ok((extension.critical, copy_out(&extension.data, buf)?))
    }

    pub fn delete_cert_extension(&self, cert: Handle, oid: &str) -> CryptResult<()> {
        self.with_cert_mut(cert, |object| object.delete_extension(oid))
    }
}

enum Against {
    Key(crate::context::KeySnapshot),
    Certificate(crate::certificate::CertSnapshot),
}
