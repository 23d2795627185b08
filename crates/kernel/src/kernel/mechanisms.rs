//! Key export/import and signatures.

use super::{copy_out, Kernel};
use crate::certificate::PublicKeyInfo;
use crate::handle::{Handle, KindSet, ObjectKind};
use crate::mechanism::{self, Verifier};
use crate::types::ObjectInfo;
use cryptkit_core::{CryptError, CryptResult};
use cryptkit_crypto::{Algorithm, AlgorithmClass};
use tracing::debug;

impl Kernel {
    /// Export the key in `session` wrapped under `wrap`. With no buffer the
    /// length of the exported blob is returned.
    pub fn export_key(&self, buf: Option<&mut [u8]>, wrap: Handle, session: Handle) -> CryptResult<usize> {
        Self::distinct(wrap, session, 3)?;
        let wrap_key = self.key_snapshot(wrap, 2)?;
        let session_key = self.key_snapshot(session, 3)?;
        let blob = mechanism::export_key(&wrap_key, &session_key, &mut self.random.lock())?;
        copy_out(&blob, buf)
    }

    /// Unwrap an exported key into the unkeyed context `session`.
    pub fn import_key(&self, data: &[u8], unwrap: Handle, session: Handle) -> CryptResult<()> {
        if data.is_empty() {
            return Err(CryptError::param(1));
        }
        Self::distinct(unwrap, session, 3)?;
        let unwrap_key = self.key_snapshot(unwrap, 2)?;
        let (algorithm, secret) = mechanism::import_key(data, &unwrap_key)?;
        let cell = self.cell(session, 3, KindSet::CONTEXT)?;
        let mut record = cell.lock();
        let ctx = record.as_context_mut().ok_or_else(|| CryptError::param(3))?;
        if ctx.is_keyed() || ctx.algorithm() != algorithm {
            return Err(CryptError::param(3));
        }
        ctx.load_secret(&secret)?;
        debug!(%session, %algorithm, "session key imported");
        Ok(())
    }

    /// Finalise the hash context `hash` and return its value.
    fn hash_of(&self, hash: Handle, param: usize) -> CryptResult<(Algorithm, Vec<u8>)> {
        let cell = self.cell(hash, param, KindSet::CONTEXT)?;
        let mut record = cell.lock();
        let ctx = record.as_context_mut().ok_or_else(|| CryptError::param(param))?;
        if ctx.algorithm().class() != AlgorithmClass::Hash {
            return Err(CryptError::param(param));
        }
        ctx.hash_value()
    }

    /// Sign the value of the hash context `hash` with `sign`.
    pub fn create_signature(&self, buf: Option<&mut [u8]>, sign: Handle, hash: Handle) -> CryptResult<usize> {
        Self::distinct(sign, hash, 3)?;
        let signer = self.key_snapshot(sign, 2)?;
        let (hash_algorithm, value) = self.hash_of(hash, 3)?;
        let signature = mechanism::create_signature(&signer, hash_algorithm, &value)?;
        if buf.is_none() {
            return copy_out(&signature, None);
        }
        let cell = self.cell(sign, 2, KindSet::CONTEXT)?;
        let mut record = cell.lock();
        record.props.ensure_usable()?;
        let written = copy_out(&signature, buf)?;
        record.props.consume_usage()?;
        Ok(written)
    }

    /// Check `signature` over the hash context `hash`. `check` is either a
    /// public-key context or a certificate.
    pub fn check_signature(&self, signature: &[u8], check: Handle, hash: Handle) -> CryptResult<()> {
        if signature.is_empty() {
            return Err(CryptError::param(1));
        }
        Self::distinct(check, hash, 3)?;
        let (kind, cell) = self.object(check, 2, KindSet::CONTEXT.union(KindSet::CERTIFICATE))?;
        let (hash_algorithm, value) = self.hash_of(hash, 3)?;
        let result = if kind == ObjectKind::Context {
            let key = self.key_snapshot(check, 2)?;
            mechanism::check_signature(signature, Verifier::Key(&key), hash_algorithm, &value)
        } else {
            let info: PublicKeyInfo = {
                let record = cell.lock();
                record
                    .as_certificate()
                    .and_then(|cert| cert.leaf().tbs.public_key.clone())
                    .ok_or_else(|| CryptError::param(2))?
            };
            mechanism::check_signature(signature, Verifier::Certificate(&info), hash_algorithm, &value)
        };
        if let Err(e) = &result {
            cell.lock().note_error(e, None);
        }
        result
    }

    /// Identify an exported key or signature.
    pub fn query_object(&self, data: &[u8]) -> CryptResult<ObjectInfo> {
        self.ensure_running()?;
        if data.is_empty() {
            return Err(CryptError::param(1));
        }
        mechanism::query_object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::kernel;
    use crate::attribute::AttributeId;
    use crate::types::ObjectType;
    use cryptkit_core::ErrorCode;
    use cryptkit_crypto::Algorithm;

    #[test]
    fn test_export_import_through_handles() {
        let kernel = kernel();
        let kek = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        kernel.generate_key(kek).unwrap();
        let session = kernel.create_context(None, Algorithm::XChaCha20.id()).unwrap();
        kernel.generate_key(session).unwrap();

        let len = kernel.export_key(None, kek, session).unwrap();
        let mut blob = vec![0u8; len];
        assert_eq!(kernel.export_key(Some(&mut blob), kek, session).unwrap(), len);
        assert_eq!(kernel.query_object(&blob).unwrap().object_type, ObjectType::EncryptedKey);

        let imported = kernel.create_context(None, Algorithm::XChaCha20.id()).unwrap();
        kernel.import_key(&blob, kek, imported).unwrap();

        let mut original = *b"the same plaintext";
        let mut copy = original;
        let iv = vec![9u8; 24];
        kernel.set_attribute_string(session, AttributeId::CTXINFO_IV, &iv).unwrap();
        kernel.set_attribute_string(imported, AttributeId::CTXINFO_IV, &iv).unwrap();
        kernel.encrypt(session, &mut original).unwrap();
        kernel.encrypt(imported, &mut copy).unwrap();
        assert_eq!(original, copy);

        assert_eq!(kernel.import_key(&blob, kek, imported).unwrap_err().kind(), ErrorCode::Param3);
    }

    #[test]
    fn test_export_argument_checks() {
        let kernel = kernel();
        let key = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        kernel.generate_key(key).unwrap();
        assert_eq!(kernel.export_key(None, key, key).unwrap_err().kind(), ErrorCode::Param3);

        let session = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        kernel.generate_key(session).unwrap();
        kernel.set_attribute(session, AttributeId::PROPERTY_NONEXPORTABLE, 1).unwrap();
        assert_eq!(kernel.export_key(None, key, session).unwrap_err().kind(), ErrorCode::Permission);

        let unkeyed = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        assert_eq!(kernel.export_key(None, key, unkeyed).unwrap_err().kind(), ErrorCode::NotInited);
    }

    fn hash_of(kernel: &crate::Kernel, data: &[u8]) -> crate::Handle {
        let hash = kernel.create_context(None, Algorithm::Sha256.id()).unwrap();
        let mut buf = data.to_vec();
        kernel.encrypt(hash, &mut buf).unwrap();
        kernel.encrypt(hash, &mut []).unwrap();
        hash
    }

    #[test]
    fn test_signature_round_trip_and_tamper() {
        let kernel = kernel();
        let signer = kernel.create_context(None, Algorithm::Ed25519.id()).unwrap();
        kernel.generate_key(signer).unwrap();
        let hash = hash_of(&kernel, b"purchase order 42");

        let len = kernel.create_signature(None, signer, hash).unwrap();
        let mut signature = vec![0u8; len];
        kernel.create_signature(Some(&mut signature), signer, hash).unwrap();
        kernel.check_signature(&signature, signer, hash).unwrap();

        let forged = hash_of(&kernel, b"purchase order 43");
        assert_eq!(
            kernel.check_signature(&signature, signer, forged).unwrap_err().kind(),
            ErrorCode::Signature
        );
    }

    #[test]
    fn test_signature_usage_charged_only_on_success() {
        let kernel = kernel();
        let signer = kernel.create_context(None, Algorithm::Ed25519.id()).unwrap();
        kernel.generate_key(signer).unwrap();
        kernel.set_attribute(signer, AttributeId::PROPERTY_USAGECOUNT, 1).unwrap();
        let hash = hash_of(&kernel, b"invoice");

        let len = kernel.create_signature(None, signer, hash).unwrap();
        let mut short = vec![0u8; len - 1];
        assert_eq!(
            kernel.create_signature(Some(&mut short), signer, hash).unwrap_err().kind(),
            ErrorCode::Overflow
        );
        assert_eq!(kernel.get_attribute(signer, AttributeId::PROPERTY_USAGECOUNT).unwrap(), 1);

        let mut signature = vec![0u8; len];
        kernel.create_signature(Some(&mut signature), signer, hash).unwrap();
        kernel.check_signature(&signature, signer, hash).unwrap();

        assert_eq!(kernel.create_signature(None, signer, hash).unwrap(), len);
        assert_eq!(
            kernel.create_signature(Some(&mut signature), signer, hash).unwrap_err().kind(),
            ErrorCode::Permission
        );
    }

    #[test]
    fn test_signature_needs_hash_context() {
        let kernel = kernel();
        let signer = kernel.create_context(None, Algorithm::Ed25519.id()).unwrap();
        kernel.generate_key(signer).unwrap();
        let cipher = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
        assert_eq!(
            kernel.create_signature(None, signer, cipher).unwrap_err().kind(),
            ErrorCode::Param3
        );
        let hash = hash_of(&kernel, b"x");
        assert_eq!(
            kernel.create_signature(None, cipher, hash).unwrap_err().kind(),
            ErrorCode::NotInited
        );
    }

    #[test]
    fn test_query_rejects_garbage() {
        let kernel = kernel();
        assert_eq!(kernel.query_object(b"garbage!").unwrap_err().kind(), ErrorCode::BadData);
        assert_eq!(kernel.query_object(&[]).unwrap_err().kind(), ErrorCode::Param1);
    }
}
