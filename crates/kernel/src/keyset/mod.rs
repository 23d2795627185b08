//! Keysets: persistent stores of keys and certificates.
//!
//! A keyset object wraps one [`KeyStore`] backend. Entries are
//! [`KeyRecord`]s addressed by name or email; private keys are kept sealed
//! under a password-derived key and never touch storage in the clear.
//! The database store backend additionally implements [`CertStore`], the
//! bookkeeping behind certificate authority operations.

mod database;
mod file;

pub use database::DatabaseKeyStore;
pub use file::FileKeyStore;

use crate::attribute::{AttributeId, AttributeValue};
use crate::certificate::{CertSnapshot, CertificateObject, RevocationEntry};
use crate::context::{KeyMaterial, KeySnapshot};
use crate::object::{AttrEnv, AttrInput, AttributeHandler, Lifecycle};
use crate::types::{CertAction, CertType, KeyIdType, KeysetOption, KeysetType};
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use cryptkit_crypto::kdf::DEFAULT_SALT_SIZE;
use cryptkit_crypto::{derive_key, keyex, Algorithm, RandomPool};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Query string that abandons an ongoing query.
pub const QUERY_CANCEL: &str = "cancel";

/// Private key sealed under a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    pub salt: Vec<u8>,
    pub iterations: u32,
    /// Nonce, ciphertext and tag.
    pub sealed: Vec<u8>,
}

/// One keyset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Hex key identifier of the public key.
    pub key_id: String,
    pub algorithm: i32,
    pub public_key: Vec<u8>,
    /// Encoded certificate or chain for the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<SealedKey>,
}

impl KeyRecord {
    pub fn matches(&self, id_type: KeyIdType, id: &str) -> bool {
        match id_type {
            KeyIdType::Name => self.name.eq_ignore_ascii_case(id),
            KeyIdType::Email => self.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(id)),
            KeyIdType::None => false,
        }
    }

    fn certificate(&self) -> CryptResult<Option<CertSnapshot>> {
        self.certificate
            .as_deref()
            .map(|data| CertificateObject::import(data).map(|cert| cert.snapshot()))
            .transpose()
    }
}

/// Storage behind a keyset object.
pub trait KeyStore: Send {
    fn find(&self, id_type: KeyIdType, id: &str) -> CryptResult<Option<KeyRecord>>;

    /// Insert or replace the record with the same name.
    fn store(&mut self, record: KeyRecord) -> CryptResult<()>;

    fn delete(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<()>;

    /// Records whose name contains `pattern`.
    fn query(&self, _pattern: &str) -> CryptResult<Vec<KeyRecord>> {
        Err(CryptError::new(ErrorCode::NotAvail))
    }

    fn cert_store(&mut self) -> Option<&mut dyn CertStore> {
        None
    }
}

/// A certification request held by a certificate store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRequest {
    pub cert_type: CertType,
    pub subject: String,
    pub email: Option<String>,
    /// Key identifier of a certification request, or the target serial of
    /// a revocation request.
    pub key_id: String,
    pub data: Vec<u8>,
}

/// A certificate issued from a certificate store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCert {
    pub serial: Vec<u8>,
    pub subject: String,
    pub email: Option<String>,
    pub valid_to: i64,
    pub data: Vec<u8>,
    pub revoked: Option<RevocationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub action: i32,
    pub subject: String,
    pub serial: Option<Vec<u8>>,
    pub at: i64,
}

/// Certificate authority bookkeeping.
pub trait CertStore {
    /// Fails with `Duplicate` if a request for the same key is pending.
    fn add_request(&mut self, request: StoredRequest) -> CryptResult<()>;
    fn find_request(&self, id_type: KeyIdType, id: &str) -> CryptResult<Option<StoredRequest>>;
    fn delete_request(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<()>;
    fn query_requests(&self, pattern: &str) -> CryptResult<Vec<StoredRequest>>;

    fn add_issued(&mut self, cert: IssuedCert) -> CryptResult<()>;
    fn find_issued(&self, serial: &[u8]) -> CryptResult<Option<IssuedCert>>;
    fn find_issued_by_name(&self, id_type: KeyIdType, id: &str) -> CryptResult<Option<IssuedCert>>;
    fn revoke(&mut self, entry: RevocationEntry) -> CryptResult<()>;
    fn revoked(&self) -> CryptResult<Vec<RevocationEntry>>;
    /// Drop certificates that expired before `now`. Returns how many.
    fn expire(&mut self, now: i64) -> CryptResult<usize>;
    /// Drop every pending request. Returns how many.
    fn purge_requests(&mut self) -> CryptResult<usize>;

    fn log(&mut self, action: CertAction, subject: &str, serial: Option<&[u8]>, at: i64) -> CryptResult<()>;
    fn log_entries(&self) -> CryptResult<Vec<LogEntry>>;
}

/// What a public-key lookup produced.
pub enum PublicEntry {
    Certificate(CertSnapshot),
    Key {
        algorithm: Algorithm,
        public_key: Vec<u8>,
        label: String,
    },
}

/// A private key recovered from a keyset.
pub struct PrivateEntry {
    pub algorithm: Algorithm,
    pub material: KeyMaterial,
    pub label: String,
    pub certificate: Option<CertSnapshot>,
}

fn record_algorithm(record: &KeyRecord) -> CryptResult<Algorithm> {
    Algorithm::from_raw(record.algorithm)
        .ok_or_else(|| CryptError::new(ErrorCode::BadData).with_detail("unknown key algorithm"))
}

fn key_aad(name: &str, key_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(name.len() + key_id.len() + 1);
    aad.extend_from_slice(name.as_bytes());
    aad.push(0);
    aad.extend_from_slice(key_id.as_bytes());
    aad
}

fn seal_private(
    material: &KeyMaterial,
    password: &[u8],
    iterations: u32,
    aad: &[u8],
    random: &mut RandomPool,
) -> CryptResult<SealedKey> {
    let salt = random.bytes(DEFAULT_SALT_SIZE);
    let kek = derive_key(Algorithm::Blake3, password, &salt, iterations)?;
    let secret = material.secret_bytes()?;
    let sealed = keyex::seal(&kek, random, &secret, aad)?;
    Ok(SealedKey {
        salt,
        iterations,
        sealed,
    })
}

fn open_private(sealed: &SealedKey, password: &[u8], aad: &[u8]) -> CryptResult<Zeroizing<Vec<u8>>> {
    let kek = derive_key(Algorithm::Blake3, password, &sealed.salt, sealed.iterations)?;
    keyex::open(&kek, &sealed.sealed, aad).map_err(|_| {
        CryptError::new(ErrorCode::WrongKey).with_detail("incorrect password for private key")
    })
}

/// Display name used to index a certificate: its CN, else the whole DN.
pub(crate) fn cert_name(cert: &CertSnapshot) -> String {
    let subject = cert.subject();
    subject.common_name.clone().unwrap_or_else(|| subject.to_string())
}

fn encode_snapshot(cert: &CertSnapshot) -> CryptResult<Vec<u8>> {
    match cert.cert_type {
        CertType::CertChain => cert.encode_all(),
        _ => cert.encode_leaf(),
    }
}

pub struct KeysetObject {
    keyset_type: KeysetType,
    name: String,
    read_only: bool,
    store: Box<dyn KeyStore>,
    query: Option<VecDeque<KeyRecord>>,
    request_query: Option<VecDeque<StoredRequest>>,
}

impl KeysetObject {
    pub fn open(keyset_type: KeysetType, name: &str, option: KeysetOption) -> CryptResult<Self> {
        if name.is_empty() {
            return Err(CryptError::param(3));
        }
        let path = Path::new(name);
        let store: Box<dyn KeyStore> = match keyset_type {
            KeysetType::File => Box::new(FileKeyStore::open(path, option == KeysetOption::Create)?),
            KeysetType::Database => Box::new(DatabaseKeyStore::open(path, option, false)?),
            KeysetType::DatabaseStore => Box::new(DatabaseKeyStore::open(path, option, true)?),
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        };
        info!(keyset = %name, keyset_type = ?keyset_type, ?option, "keyset opened");
        Ok(Self {
            keyset_type,
            name: name.to_string(),
            read_only: option == KeysetOption::ReadOnly,
            store,
            query: None,
            request_query: None,
        })
    }

    pub fn keyset_type(&self) -> KeysetType {
        self.keyset_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_writable(&self) -> CryptResult<()> {
        if self.read_only {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("keyset is read-only"));
        }
        Ok(())
    }

    fn lookup(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<KeyRecord> {
        if id_type == KeyIdType::None {
            let query = self
                .query
                .as_mut()
                .ok_or_else(|| CryptError::new(ErrorCode::NotInited).with_detail("no query in progress"))?;
            return match query.pop_front() {
                Some(record) => Ok(record),
                None => {
                    self.query = None;
                    Err(CryptError::new(ErrorCode::NotFound))
                }
            };
        }
        if id.is_empty() {
            return Err(CryptError::param(3));
        }
        self.store
            .find(id_type, id)?
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
    }

    pub fn get_public(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<PublicEntry> {
        let record = self.lookup(id_type, id)?;
        if let Some(cert) = record.certificate()? {
            return Ok(PublicEntry::Certificate(cert));
        }
        Ok(PublicEntry::Key {
            algorithm: record_algorithm(&record)?,
            public_key: record.public_key,
            label: record.name,
        })
    }

    pub fn get_private(&mut self, id_type: KeyIdType, id: &str, password: &[u8]) -> CryptResult<PrivateEntry> {
        let record = self.lookup(id_type, id)?;
        let sealed = record
            .private
            .as_ref()
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound).with_detail("no private key for entry"))?;
        let secret = open_private(sealed, password, &key_aad(&record.name, &record.key_id))?;
        let algorithm = record_algorithm(&record)?;
        let material = KeyMaterial::from_seed(algorithm, &secret)?;
        debug!(keyset = %self.name, entry = %record.name, "private key read");
        Ok(PrivateEntry {
            algorithm,
            material,
            certificate: record.certificate()?,
            label: record.name,
        })
    }

    /// Store a certificate, attaching it to an existing key entry if the
    /// keys match.
    pub fn add_certificate(&mut self, cert: &CertSnapshot) -> CryptResult<()> {
        self.ensure_writable()?;
        if !cert.is_signed() {
            return Err(CryptError::new(ErrorCode::NotInited));
        }
        let public = cert
            .public_key()
            .ok_or_else(|| CryptError::new(ErrorCode::Param2))?;
        let key_id = hex::encode(public.key_id());
        let name = cert_name(cert);
        let encoded = encode_snapshot(cert)?;

        let record = match self.store.find(KeyIdType::Name, &name)? {
            Some(existing) if existing.key_id == key_id && existing.certificate.is_none() => KeyRecord {
                certificate: Some(encoded),
                email: cert.leaf().tbs.extensions.email.clone().or(existing.email.clone()),
                ..existing
            },
            Some(_) => return Err(CryptError::new(ErrorCode::Duplicate)),
            None => KeyRecord {
                name,
                email: cert.leaf().tbs.extensions.email.clone(),
                key_id,
                algorithm: public.algorithm,
                public_key: public.key.clone(),
                certificate: Some(encoded),
                private: None,
            },
        };
        self.store.store(record)
    }

    /// Store a bare public key under the key's label.
    pub fn add_public_key(&mut self, key: &KeySnapshot) -> CryptResult<()> {
        self.ensure_writable()?;
        let name = key.label.clone().ok_or_else(|| {
            CryptError::new(ErrorCode::NotInited).with_detail("key needs a label to be stored")
        })?;
        let public = key
            .material
            .public_bytes()
            .ok_or_else(|| CryptError::new(ErrorCode::Param2))?;
        if self.store.find(KeyIdType::Name, &name)?.is_some() {
            return Err(CryptError::new(ErrorCode::Duplicate));
        }
        self.store.store(KeyRecord {
            name,
            email: None,
            key_id: hex::encode(key.key_id()),
            algorithm: key.algorithm.id(),
            public_key: public.to_vec(),
            certificate: None,
            private: None,
        })
    }

    /// Seal and store a private key under the key's label.
    pub fn add_private_key(
        &mut self,
        key: &KeySnapshot,
        password: &[u8],
        iterations: u32,
        random: &mut RandomPool,
    ) -> CryptResult<()> {
        self.ensure_writable()?;
        if key.non_exportable {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("key is not exportable"));
        }
        if !key.material.has_private() {
            return Err(CryptError::new(ErrorCode::Param2));
        }
        let name = key.label.clone().ok_or_else(|| {
            CryptError::new(ErrorCode::NotInited).with_detail("key needs a label to be stored")
        })?;
        let key_id = hex::encode(key.key_id());
        let existing = self.store.find(KeyIdType::Name, &name)?;
        if let Some(existing) = &existing {
            if existing.private.is_some() || existing.key_id != key_id {
                return Err(CryptError::new(ErrorCode::Duplicate));
            }
        }
        let private = seal_private(&key.material, password, iterations.max(1), &key_aad(&name, &key_id), random)?;
        let certificate = match (&key.attached, existing.as_ref().and_then(|r| r.certificate.clone())) {
            (_, Some(stored)) => Some(stored),
            (Some(cert), None) => Some(encode_snapshot(cert)?),
            (None, None) => None,
        };
        self.store.store(KeyRecord {
            email: existing.and_then(|r| r.email),
            name,
            key_id,
            algorithm: key.algorithm.id(),
            public_key: key.material.public_bytes().map(|p| p.to_vec()).unwrap_or_default(),
            certificate,
            private: Some(private),
        })
    }

    pub fn delete(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<()> {
        self.ensure_writable()?;
        if id_type == KeyIdType::None || id.is_empty() {
            return Err(CryptError::param(2));
        }
        self.store.delete(id_type, id)
    }

    pub fn cert_store(&mut self) -> CryptResult<&mut dyn CertStore> {
        self.store
            .cert_store()
            .ok_or_else(|| CryptError::new(ErrorCode::NotAvail).with_detail("keyset is not a certificate store"))
    }

    pub fn writable_cert_store(&mut self) -> CryptResult<&mut dyn CertStore> {
        self.ensure_writable()?;
        self.cert_store()
    }

    /// Next request from a `KEYINFO_QUERY_REQUESTS` query.
    pub fn next_request(&mut self) -> CryptResult<StoredRequest> {
        let query = self
            .request_query
            .as_mut()
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
        match query.pop_front() {
            Some(request) => Ok(request),
            None => {
                self.request_query = None;
                Err(CryptError::new(ErrorCode::NotFound))
            }
        }
    }

    fn start_query(&mut self, pattern: &str) -> CryptResult<()> {
        if pattern.eq_ignore_ascii_case(QUERY_CANCEL) {
            self.query = None;
            return Ok(());
        }
        if self.query.is_some() {
            return Err(CryptError::new(ErrorCode::Incomplete).with_detail("query already in progress"));
        }
        let results = self.store.query(pattern)?;
        debug!(keyset = %self.name, pattern, results = results.len(), "keyset query started");
        self.query = Some(results.into());
        Ok(())
    }

    fn start_request_query(&mut self, pattern: &str) -> CryptResult<()> {
        if pattern.eq_ignore_ascii_case(QUERY_CANCEL) {
            self.request_query = None;
            return Ok(());
        }
        if self.request_query.is_some() {
            return Err(CryptError::new(ErrorCode::Incomplete));
        }
        let results = self.cert_store()?.query_requests(pattern)?;
        self.request_query = Some(results.into());
        Ok(())
    }
}

impl AttributeHandler for KeysetObject {
    fn get_attr(&mut self, _id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        Err(CryptError::new(ErrorCode::NotAvail))
    }

    fn set_attr(&mut self, id: AttributeId, value: AttrInput, _env: &AttrEnv<'_>) -> CryptResult<()> {
        match id {
            AttributeId::KEYINFO_QUERY => self.start_query(&value.text()?),
            AttributeId::KEYINFO_QUERY_REQUESTS => self.start_request_query(&value.text()?),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn delete_attr(&mut self, _id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<()> {
        Err(CryptError::new(ErrorCode::NotAvail))
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn signing_key(label: &str, seed: u8) -> KeySnapshot {
        KeySnapshot {
            algorithm: Algorithm::Ed25519,
            label: Some(label.to_string()),
            material: KeyMaterial::from_seed(Algorithm::Ed25519, &[seed; 32]).unwrap(),
            non_exportable: false,
            attached: None,
        }
    }

    fn open(dir: &TempDir, keyset_type: KeysetType, file: &str, option: KeysetOption) -> CryptResult<KeysetObject> {
        let path = dir.path().join(file);
        KeysetObject::open(keyset_type, path.to_str().unwrap(), option)
    }

    fn private_round_trip(keyset_type: KeysetType) {
        let dir = TempDir::new().unwrap();
        let mut random = RandomPool::new().unwrap();
        let key = signing_key("alice", 5);
        {
            let mut keyset = open(&dir, keyset_type, "keys", KeysetOption::Create).unwrap();
            keyset.add_private_key(&key, b"secret", 10, &mut random).unwrap();
            let err = keyset.add_private_key(&key, b"secret", 10, &mut random).unwrap_err();
            assert_eq!(err.kind(), ErrorCode::Duplicate);
        }
        let mut keyset = open(&dir, keyset_type, "keys", KeysetOption::ReadOnly).unwrap();
        let entry = keyset.get_private(KeyIdType::Name, "ALICE", b"secret").unwrap();
        assert_eq!(entry.material.key_id(), key.key_id());
        assert_eq!(entry.label, "alice");

        let err = keyset.get_private(KeyIdType::Name, "alice", b"wrong").err().unwrap();
        assert_eq!(err.kind(), ErrorCode::WrongKey);
        let err = keyset.delete(KeyIdType::Name, "alice").unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Permission);
    }

    #[test]
    fn test_file_private_key_round_trip() {
        private_round_trip(KeysetType::File);
    }

    #[test]
    fn test_database_private_key_round_trip() {
        private_round_trip(KeysetType::Database);
    }

    #[test]
    fn test_open_modes() {
        let dir = TempDir::new().unwrap();
        let err = open(&dir, KeysetType::File, "missing.json", KeysetOption::None).err().unwrap();
        assert_eq!(err.kind(), ErrorCode::Open);
        open(&dir, KeysetType::File, "k.json", KeysetOption::Create).unwrap();
        let err = open(&dir, KeysetType::File, "k.json", KeysetOption::Create).err().unwrap();
        assert_eq!(err.kind(), ErrorCode::Duplicate);
        let err = open(&dir, KeysetType::Ldap, "x", KeysetOption::None).err().unwrap();
        assert_eq!(err.kind(), ErrorCode::NotAvail);
    }

    #[test]
    fn test_public_key_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut keyset = open(&dir, KeysetType::File, "pub.json", KeysetOption::Create).unwrap();
        let key = signing_key("bob", 9);
        keyset.add_public_key(&key).unwrap();
        match keyset.get_public(KeyIdType::Name, "bob").unwrap() {
            PublicEntry::Key { algorithm, public_key, .. } => {
                assert_eq!(algorithm, Algorithm::Ed25519);
                assert_eq!(public_key, key.material.public_bytes().unwrap().to_vec());
            }
            PublicEntry::Certificate(_) => panic!("expected a bare key"),
        }
        assert_eq!(
            keyset.get_private(KeyIdType::Name, "bob", b"x").err().unwrap().kind(),
            ErrorCode::NotFound
        );
        keyset.delete(KeyIdType::Name, "bob").unwrap();
        assert_eq!(
            keyset.delete(KeyIdType::Name, "bob").unwrap_err().kind(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn test_database_query() {
        let dir = TempDir::new().unwrap();
        let mut keyset = open(&dir, KeysetType::Database, "q.db", KeysetOption::Create).unwrap();
        for (label, seed) in [("node-a", 1u8), ("node-b", 2), ("other", 3)] {
            keyset.add_public_key(&signing_key(label, seed)).unwrap();
        }
        keyset.start_query("node").unwrap();
        let mut names = Vec::new();
        loop {
            match keyset.get_public(KeyIdType::None, "") {
                Ok(PublicEntry::Key { label, .. }) => names.push(label),
                Ok(PublicEntry::Certificate(_)) => panic!("unexpected certificate"),
                Err(e) => {
                    assert_eq!(e.kind(), ErrorCode::NotFound);
                    break;
                }
            }
        }
        names.sort();
        assert_eq!(names, ["node-a", "node-b"]);
    }

    #[test]
    fn test_file_keyset_has_no_query() {
        let dir = TempDir::new().unwrap();
        let mut keyset = open(&dir, KeysetType::File, "f.json", KeysetOption::Create).unwrap();
        assert_eq!(keyset.start_query("x").unwrap_err().kind(), ErrorCode::NotAvail);
        assert_eq!(keyset.cert_store().err().unwrap().kind(), ErrorCode::NotAvail);
    }
}
