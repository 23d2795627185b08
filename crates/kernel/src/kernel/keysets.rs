//! Keysets and certificate store (CA) operations.

use super::Kernel;
use crate::certificate::{unix_time, CertSnapshot, CertificateObject, RevocationEntry, SERIAL_SIZE};
use crate::context::{ContextObject, KeyMaterial, KeySnapshot};
use crate::handle::{Handle, KindSet, ObjectKind};
use crate::keyset::{cert_name, IssuedCert, KeysetObject, PublicEntry, StoredRequest};
use crate::object::{ObjectCell, Payload};
use crate::types::{CertAction, CertType, KeyIdType, KeysetOption, KeysetType};
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use std::sync::Arc;
use tracing::{info, warn};

impl Kernel {
    /// Open a keyset. `name` is the backing file path.
    pub fn keyset_open(
        &self,
        owner: Option<Handle>,
        keyset_type: KeysetType,
        name: &str,
        option: KeysetOption,
    ) -> CryptResult<Handle> {
        let owner = self.owner(owner, 1)?;
        let keyset = KeysetObject::open(keyset_type, name, option)?;
        self.register(owner, Payload::Keyset(Box::new(keyset)), None)
    }

    pub fn keyset_close(&self, keyset: Handle) -> CryptResult<()> {
        self.destroy_kind(keyset, KindSet::KEYSET)
    }

    /// Run `f` on a keyset given as argument `param`, returning the result
    /// and the keyset's owner.
    fn with_keyset<T>(
        &self,
        keyset: Handle,
        param: usize,
        f: impl FnOnce(&mut KeysetObject) -> CryptResult<T>,
    ) -> CryptResult<(T, Handle)> {
        let cell = self.cell(keyset, param, KindSet::KEYSET)?;
        let mut record = cell.lock();
        let result = match record.as_keyset_mut() {
            Some(object) => f(object),
            None => Err(CryptError::param(param)),
        };
        match result {
            Ok(value) => Ok((value, record.owner)),
            Err(e) => {
                record.note_error(&e, None);
                Err(e)
            }
        }
    }

    fn register_cert(&self, owner: Handle, snapshot: CertSnapshot) -> CryptResult<Handle> {
        let object = CertificateObject::from_snapshot(snapshot);
        self.register(owner, Payload::Certificate(Box::new(object)), None)
    }

    fn cert_snapshot(&self, cert: Handle, param: usize) -> CryptResult<CertSnapshot> {
        let cell = self.cell(cert, param, KindSet::CERTIFICATE)?;
        let record = cell.lock();
        record
            .as_certificate()
            .map(CertificateObject::snapshot)
            .ok_or_else(|| CryptError::param(param))
    }

    /// Fetch a public key. Entries with a certificate come back as a
    /// certificate object, bare keys as a public-key context.
    pub fn get_public_key(&self, keyset: Handle, id_type: KeyIdType, id: &str) -> CryptResult<Handle> {
        let (entry, owner) = self.with_keyset(keyset, 1, |object| object.get_public(id_type, id))?;
        match entry {
            PublicEntry::Certificate(snapshot) => self.register_cert(owner, snapshot),
            PublicEntry::Key {
                algorithm,
                public_key,
                label,
            } => {
                let material = KeyMaterial::from_public(algorithm, &public_key)?;
                let ctx = ContextObject::with_key(algorithm, material, Some(label), &self.options_of(owner)?)?;
                self.register(owner, Payload::Context(Box::new(ctx)), None)
            }
        }
    }

    /// Fetch and unseal a private key. The key's certificate, if stored,
    /// comes attached to the context.
    pub fn get_private_key(&self, keyset: Handle, id_type: KeyIdType, id: &str, password: &str) -> CryptResult<Handle> {
        if password.is_empty() {
            return Err(CryptError::param(4));
        }
        let (entry, owner) = self.with_keyset(keyset, 1, |object| {
            object.get_private(id_type, id, password.as_bytes())
        })?;
        let mut ctx =
            ContextObject::with_key(entry.algorithm, entry.material, Some(entry.label), &self.options_of(owner)?)?;
        if let Some(cert) = entry.certificate {
            ctx.attach(cert);
        }
        let handle = self.register(owner, Payload::Context(Box::new(ctx)), None)?;
        info!(%keyset, %handle, "private key read");
        Ok(handle)
    }

    /// Store a certificate, or the public half of a context.
    pub fn add_public_key(&self, keyset: Handle, key: Handle) -> CryptResult<()> {
        let (kind, _) = self.object(key, 2, KindSet::CONTEXT.union(KindSet::CERTIFICATE))?;
        if kind == ObjectKind::Certificate {
            let snapshot = self.cert_snapshot(key, 2)?;
            self.with_keyset(keyset, 1, |object| object.add_certificate(&snapshot))?;
        } else {
            let snapshot = self.key_snapshot(key, 2)?;
            self.with_keyset(keyset, 1, |object| object.add_public_key(&snapshot))?;
        }
        Ok(())
    }

    /// Seal the private key in `key` under `password` and store it.
    pub fn add_private_key(&self, keyset: Handle, key: Handle, password: &str) -> CryptResult<()> {
        if password.is_empty() {
            return Err(CryptError::param(3));
        }
        let snapshot = self.key_snapshot(key, 2)?;
        let owner = self.cell(keyset, 1, KindSet::KEYSET)?.lock().owner;
        let iterations = self.options_of(owner)?.keying_iterations;
        self.with_keyset(keyset, 1, |object| {
            object.add_private_key(
                &snapshot,
                password.as_bytes(),
                u32::try_from(iterations).unwrap_or(1),
                &mut self.random.lock(),
            )
        })?;
        Ok(())
    }

    pub fn delete_key(&self, keyset: Handle, id_type: KeyIdType, id: &str) -> CryptResult<()> {
        self.with_keyset(keyset, 1, |object| object.delete(id_type, id))
            .map(|_| ())
    }

    /// Queue a signed certification or revocation request in a store.
    pub fn ca_add_item(&self, keyset: Handle, cert: Handle) -> CryptResult<()> {
        let snapshot = self.cert_snapshot(cert, 2)?;
        if !snapshot.is_signed() {
            return Err(CryptError::new(ErrorCode::NotInited).with_detail("requests must be signed"));
        }
        let leaf = snapshot.leaf();
        let key_id = match snapshot.cert_type {
            CertType::CertRequest => snapshot
                .public_key()
                .map(|public| hex::encode(public.key_id()))
                .ok_or_else(|| CryptError::param(2))?,
            CertType::RequestRevocation => leaf
                .tbs
                .entries
                .first()
                .map(|entry| hex::encode(&entry.serial))
                .ok_or_else(|| CryptError::param(2))?,
            _ => return Err(CryptError::param(2)),
        };
        let request = StoredRequest {
            cert_type: snapshot.cert_type,
            subject: cert_name(&snapshot),
            email: leaf.tbs.extensions.email.clone(),
            key_id,
            data: snapshot.encode_leaf()?,
        };
        let subject = request.subject.clone();
        self.with_keyset(keyset, 1, |object| object.writable_cert_store()?.add_request(request))?;
        info!(%keyset, %subject, "request queued");
        Ok(())
    }

    /// Fetch a queued request or an issued certificate. A request lookup
    /// with `KeyIdType::None` walks a `KEYINFO_QUERY_REQUESTS` query.
    pub fn ca_get_item(&self, keyset: Handle, cert_type: CertType, id_type: KeyIdType, id: &str) -> CryptResult<Handle> {
        let (data, owner) = self.with_keyset(keyset, 1, |object| match cert_type {
            CertType::CertRequest | CertType::RequestRevocation => {
                let request = if id_type == KeyIdType::None {
                    object.next_request()?
                } else {
                    object
                        .cert_store()?
                        .find_request(id_type, id)?
                        .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?
                };
                if request.cert_type != cert_type {
                    return Err(CryptError::new(ErrorCode::NotFound));
                }
                Ok(request.data)
            }
            CertType::Certificate => object
                .cert_store()?
                .find_issued_by_name(id_type, id)?
                .map(|issued| issued.data)
                .ok_or_else(|| CryptError::new(ErrorCode::NotFound)),
            _ => Err(CryptError::param(2)),
        })?;
        let object = CertificateObject::import(&data)?;
        self.register(owner, Payload::Certificate(Box::new(object)), None)
    }

    /// Remove a queued request.
    pub fn ca_delete_item(&self, keyset: Handle, cert_type: CertType, id_type: KeyIdType, id: &str) -> CryptResult<()> {
        if !matches!(cert_type, CertType::CertRequest | CertType::RequestRevocation) {
            return Err(CryptError::param(2));
        }
        self.with_keyset(keyset, 1, |object| {
            object.writable_cert_store()?.delete_request(id_type, id)
        })
        .map(|_| ())
    }

    /// The CA key for `action`: the given context, else the store owner's
    /// registered CA key.
    fn ca_signing_key(&self, keyset_cell: &Arc<ObjectCell>, ca_key: Option<Handle>, crl: bool) -> CryptResult<KeySnapshot> {
        if let Some(key) = ca_key {
            return self.key_snapshot(key, 3);
        }
        let owner = keyset_cell.lock().owner;
        let cell = self.cell(owner, 3, KindSet::USER)?;
        let record = cell.lock();
        record
            .as_user()
            .and_then(|user| user.ca_key(crl).cloned())
            .ok_or_else(|| CryptError::param(3).with_detail("no CA key given or registered"))
    }

    /// Run a certificate store management action. Issuing actions return
    /// the new certificate or CRL.
    pub fn ca_cert_management(
        &self,
        action: CertAction,
        keyset: Handle,
        ca_key: Option<Handle>,
        request: Option<Handle>,
    ) -> CryptResult<Option<Handle>> {
        let cell = self.cell(keyset, 2, KindSet::KEYSET)?;
        let owner = cell.lock().owner;
        let validity = self.options_of(owner)?.cert_validity_days;
        let now = unix_time();
        let result = match action {
            CertAction::IssueCert => {
                let request = self.cert_snapshot(request.ok_or_else(|| CryptError::param(4))?, 4)?;
                if request.cert_type != CertType::CertRequest {
                    return Err(CryptError::param(4));
                }
                let signer = self.ca_signing_key(&cell, ca_key, false)?;
                let serial = self.random.lock().bytes(SERIAL_SIZE);
                let mut object = CertificateObject::from_request(&request, validity)?;
                object.sign(&signer, now, serial)?;
                let issued = object.snapshot();
                let leaf = issued.leaf();
                let entry = IssuedCert {
                    serial: leaf.tbs.serial.clone(),
                    subject: cert_name(&issued),
                    email: leaf.tbs.extensions.email.clone(),
                    valid_to: leaf.tbs.valid_to.unwrap_or(now),
                    data: issued.encode_leaf()?,
                    revoked: None,
                };
                let subject = entry.subject.clone();
                let serial = entry.serial.clone();
                self.with_keyset(keyset, 2, |store| {
                    let store = store.writable_cert_store()?;
                    store.add_issued(entry)?;
                    match store.delete_request(KeyIdType::Name, &subject) {
                        Err(e) if e.is(ErrorCode::NotFound) => {
                            warn!(%subject, "issued certificate had no queued request");
                        }
                        other => other?,
                    }
                    store.log(action, &subject, Some(&serial), now)
                })?;
                info!(%keyset, %subject, "certificate issued");
                Some(self.register(owner, Payload::Certificate(Box::new(object)), None)?)
            }
            CertAction::IssueCrl => {
                let signer = self.ca_signing_key(&cell, ca_key, true)?;
                let (entries, _) = self.with_keyset(keyset, 2, |store| store.cert_store()?.revoked())?;
                let count = entries.len();
                let mut crl = CertificateObject::new_crl(entries, validity)?;
                let serial = self.random.lock().bytes(SERIAL_SIZE);
                crl.sign(&signer, now, serial)?;
                let issuer = crl.leaf().tbs.issuer.to_string();
                self.with_keyset(keyset, 2, |store| {
                    store.writable_cert_store()?.log(action, &issuer, None, now)
                })?;
                info!(%keyset, entries = count, "CRL issued");
                Some(self.register(owner, Payload::Certificate(Box::new(crl)), None)?)
            }
            CertAction::RevokeCert => {
                let request = self.cert_snapshot(request.ok_or_else(|| CryptError::param(4))?, 4)?;
                if request.cert_type != CertType::RequestRevocation {
                    return Err(CryptError::param(4));
                }
                let target = request
                    .leaf()
                    .tbs
                    .entries
                    .first()
                    .cloned()
                    .ok_or_else(|| CryptError::param(4))?;
                let subject = cert_name(&request);
                self.with_keyset(keyset, 2, |store| {
                    let store = store.writable_cert_store()?;
                    if store.find_issued(&target.serial)?.is_none() {
                        return Err(CryptError::new(ErrorCode::NotFound).with_detail("no such issued certificate"));
                    }
                    store.revoke(RevocationEntry {
                        serial: target.serial.clone(),
                        revoked_at: now,
                        reason: target.reason,
                    })?;
                    let _ = store.delete_request(KeyIdType::Name, &subject);
                    store.log(action, &subject, Some(&target.serial), now)
                })?;
                warn!(%keyset, %subject, serial = %hex::encode(&target.serial), "certificate revoked");
                None
            }
            CertAction::ExpireCert => {
                let (expired, _) = self.with_keyset(keyset, 2, |store| {
                    let store = store.writable_cert_store()?;
                    let expired = store.expire(now)?;
                    store.log(action, "", None, now)?;
                    Ok(expired)
                })?;
                info!(%keyset, expired, "expired certificates removed");
                None
            }
            CertAction::Cleanup => {
                let (purged, _) = self.with_keyset(keyset, 2, |store| {
                    let store = store.writable_cert_store()?;
                    let purged = store.purge_requests()? + store.expire(now)?;
                    store.log(action, "", None, now)?;
                    Ok(purged)
                })?;
                info!(%keyset, purged, "certificate store cleaned up");
                None
            }
        };
        Ok(result)
    }
}
