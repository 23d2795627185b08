//! Encryption contexts.
//!
//! A context binds one algorithm to its key material and running state: a
//! stream cipher position for conventional algorithms, a digest for hashes
//! and MACs, a key pair for public-key algorithms.
//!
//! # Asynchronous key generation
//!
//! `generate_key_async` only marks the context as pending. The worker thread
//! is dispatched by the first `async_query`, which therefore always reports
//! `Incomplete` once. When the worker has finished, the next query installs
//! the key and reports success; after that the context has no outstanding
//! operation and queries report `Complete`. While a job is pending or
//! running every other operation on the context fails with `Timeout`.

use crate::attribute::{AttributeId, AttributeValue};
use crate::certificate::CertSnapshot;
use crate::object::{AttrEnv, AttrInput, AttributeHandler, Lifecycle};
use cryptkit_core::{CryptError, CryptResult, ErrorCode, OptionsConfig};
use cryptkit_crypto::kdf::DEFAULT_SALT_SIZE;
use cryptkit_crypto::{
    derive_key, Algorithm, AlgorithmClass, AgreementKeyPair, DigestState, Mode, RandomPool,
    SignatureKeyPair, StreamCipherState,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;
use zeroize::Zeroizing;

/// Key held by a context.
#[derive(Clone)]
pub enum KeyMaterial {
    /// Conventional or MAC key.
    Secret(Zeroizing<Vec<u8>>),
    Signature(SignatureKeyPair),
    Agreement(AgreementKeyPair),
}

impl KeyMaterial {
    /// Build key material for `algorithm` from 32 bytes of secret seed.
    pub fn from_seed(algorithm: Algorithm, seed: &[u8]) -> CryptResult<Self> {
        match algorithm.class() {
            AlgorithmClass::Conventional | AlgorithmClass::Mac => {
                Ok(KeyMaterial::Secret(Zeroizing::new(seed.to_vec())))
            }
            AlgorithmClass::PublicKey if algorithm.is_signature() => {
                Ok(KeyMaterial::Signature(SignatureKeyPair::from_secret(seed)?))
            }
            AlgorithmClass::PublicKey => Ok(KeyMaterial::Agreement(AgreementKeyPair::from_secret(seed)?)),
            AlgorithmClass::Hash => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    /// Public-only key for `algorithm`.
    pub fn from_public(algorithm: Algorithm, public: &[u8]) -> CryptResult<Self> {
        match algorithm {
            Algorithm::Ed25519 => Ok(KeyMaterial::Signature(SignatureKeyPair::from_public(public)?)),
            Algorithm::X25519 => Ok(KeyMaterial::Agreement(AgreementKeyPair::from_public(public)?)),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    pub fn public_bytes(&self) -> Option<[u8; 32]> {
        match self {
            KeyMaterial::Secret(_) => None,
            KeyMaterial::Signature(pair) => Some(pair.public_bytes()),
            KeyMaterial::Agreement(pair) => Some(pair.public_bytes()),
        }
    }

    pub fn has_private(&self) -> bool {
        match self {
            KeyMaterial::Secret(_) => true,
            KeyMaterial::Signature(pair) => pair.has_private(),
            KeyMaterial::Agreement(pair) => pair.has_private(),
        }
    }

    /// Raw secret: the conventional key, or the private half of a pair.
    pub fn secret_bytes(&self) -> CryptResult<Zeroizing<Vec<u8>>> {
        match self {
            KeyMaterial::Secret(key) => Ok(key.clone()),
            KeyMaterial::Signature(pair) => Ok(Zeroizing::new(pair.secret_bytes()?.to_vec())),
            KeyMaterial::Agreement(pair) => Ok(Zeroizing::new(pair.secret_bytes()?.to_vec())),
        }
    }

    pub fn key_id(&self) -> [u8; 8] {
        match self {
            KeyMaterial::Secret(key) => cryptkit_crypto::key_id(key),
            KeyMaterial::Signature(pair) => pair.key_id(),
            KeyMaterial::Agreement(pair) => pair.key_id(),
        }
    }
}

/// Copy of a keyed context, taken so another object can use the key
/// without holding the context's lock.
#[derive(Clone)]
pub struct KeySnapshot {
    pub algorithm: Algorithm,
    pub label: Option<String>,
    pub material: KeyMaterial,
    pub non_exportable: bool,
    pub attached: Option<CertSnapshot>,
}

impl KeySnapshot {
    pub fn key_id(&self) -> [u8; 8] {
        self.material.key_id()
    }

    pub fn secret(&self) -> CryptResult<&[u8]> {
        match &self.material {
            KeyMaterial::Secret(key) => Ok(key),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    pub fn signer(&self) -> CryptResult<&SignatureKeyPair> {
        match &self.material {
            KeyMaterial::Signature(pair) => Ok(pair),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    pub fn agreement(&self) -> CryptResult<&AgreementKeyPair> {
        match &self.material {
            KeyMaterial::Agreement(pair) => Ok(pair),
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }
}

enum AsyncJob {
    Idle,
    Pending,
    Running {
        worker: JoinHandle<CryptResult<KeyMaterial>>,
        cancel: Arc<AtomicBool>,
    },
}

/// State of one encryption context.
pub struct ContextObject {
    algorithm: Algorithm,
    mode: Mode,
    key_size: usize,
    label: Option<String>,
    keying_algorithm: Algorithm,
    keying_iterations: u32,
    keying_salt: Option<Vec<u8>>,
    material: Option<KeyMaterial>,
    iv: Option<Vec<u8>>,
    cipher: Option<StreamCipherState>,
    digest: Option<DigestState>,
    attached: Option<CertSnapshot>,
    job: AsyncJob,
}

impl ContextObject {
    pub fn new(algorithm: Algorithm, options: &OptionsConfig) -> CryptResult<Self> {
        let digest = match algorithm.class() {
            AlgorithmClass::Hash => Some(DigestState::new_hash(algorithm)?),
            _ => None,
        };
        let keying_algorithm =
            Algorithm::from_raw(options.keying_algo).unwrap_or(Algorithm::Blake3);
        Ok(Self {
            algorithm,
            mode: algorithm.default_mode(),
            key_size: algorithm.capability().key_size,
            label: None,
            keying_algorithm,
            keying_iterations: options.keying_iterations.max(1) as u32,
            keying_salt: None,
            material: None,
            iv: None,
            cipher: None,
            digest,
            attached: None,
            job: AsyncJob::Idle,
        })
    }

    /// Context holding an existing key, as loaded from a keyset.
    pub fn with_key(
        algorithm: Algorithm,
        material: KeyMaterial,
        label: Option<String>,
        options: &OptionsConfig,
    ) -> CryptResult<Self> {
        let mut ctx = Self::new(algorithm, options)?;
        ctx.label = label;
        ctx.install(material)?;
        Ok(ctx)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_keyed(&self) -> bool {
        self.material.is_some()
    }

    pub fn material(&self) -> Option<&KeyMaterial> {
        self.material.as_ref()
    }

    pub fn attached(&self) -> Option<&CertSnapshot> {
        self.attached.as_ref()
    }

    pub fn attach(&mut self, cert: CertSnapshot) {
        self.attached = Some(cert);
    }

    fn require_idle(&self) -> CryptResult<()> {
        if self.is_busy_job() {
            return Err(CryptError::new(ErrorCode::Timeout));
        }
        Ok(())
    }

    fn is_busy_job(&self) -> bool {
        !matches!(self.job, AsyncJob::Idle)
    }

    fn install(&mut self, material: KeyMaterial) -> CryptResult<()> {
        if self.material.is_some() {
            return Err(CryptError::new(ErrorCode::Inited));
        }
        if let KeyMaterial::Secret(key) = &material {
            if key.len() != self.key_size {
                return Err(CryptError::new(ErrorCode::Param3).with_detail(format!(
                    "key must be {} bytes, got {}",
                    self.key_size,
                    key.len()
                )));
            }
            if self.algorithm.class() == AlgorithmClass::Mac {
                self.digest = Some(DigestState::new_mac(self.algorithm, key)?);
            }
        }
        self.material = Some(material);
        self.cipher = None;
        debug!(algorithm = %self.algorithm, "context keyed");
        Ok(())
    }

    fn check_keyable(&self) -> CryptResult<()> {
        if !self.algorithm.is_keyed() {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        if self.material.is_some() {
            return Err(CryptError::new(ErrorCode::Inited));
        }
        Ok(())
    }

    /// Generate a fresh key synchronously.
    pub fn generate_key(&mut self, random: &mut RandomPool) -> CryptResult<()> {
        self.require_idle()?;
        self.check_keyable()?;
        let seed = Zeroizing::new(random.bytes(self.key_size));
        let material = KeyMaterial::from_seed(self.algorithm, &seed)?;
        self.install(material)
    }

    /// Mark an asynchronous generation as pending.
    pub fn generate_key_async(&mut self) -> CryptResult<()> {
        self.require_idle()?;
        self.check_keyable()?;
        self.job = AsyncJob::Pending;
        Ok(())
    }

    /// Advance the async state machine.
    pub fn async_query(&mut self, random: &mut RandomPool) -> CryptResult<()> {
        match std::mem::replace(&mut self.job, AsyncJob::Idle) {
            AsyncJob::Idle => Err(CryptError::new(ErrorCode::Complete)),
            AsyncJob::Pending => {
                let seed = Zeroizing::new(random.bytes(self.key_size));
                let algorithm = self.algorithm;
                let cancel = Arc::new(AtomicBool::new(false));
                let flag = Arc::clone(&cancel);
                let worker = std::thread::Builder::new()
                    .name("cryptkit-keygen".to_string())
                    .spawn(move || {
                        if flag.load(Ordering::Acquire) {
                            return Err(CryptError::new(ErrorCode::Incomplete));
                        }
                        KeyMaterial::from_seed(algorithm, &seed)
                    })
                    .map_err(|e| CryptError::new(ErrorCode::Memory).with_detail(e.to_string()))?;
                debug!(algorithm = %self.algorithm, "async keygen dispatched");
                self.job = AsyncJob::Running { worker, cancel };
                Err(CryptError::new(ErrorCode::Incomplete))
            }
            AsyncJob::Running { worker, cancel } => {
                if !worker.is_finished() {
                    self.job = AsyncJob::Running { worker, cancel };
                    return Err(CryptError::new(ErrorCode::Incomplete));
                }
                let material = worker
                    .join()
                    .map_err(|_| CryptError::new(ErrorCode::Failed).with_detail("keygen worker panicked"))??;
                self.install(material)
            }
        }
    }

    /// Abandon an outstanding generation. The result, if any, is discarded.
    pub fn async_cancel(&mut self) -> CryptResult<()> {
        match std::mem::replace(&mut self.job, AsyncJob::Idle) {
            AsyncJob::Idle => Err(CryptError::new(ErrorCode::Complete)),
            AsyncJob::Pending => Ok(()),
            AsyncJob::Running { cancel, .. } => {
                cancel.store(true, Ordering::Release);
                debug!(algorithm = %self.algorithm, "async keygen cancelled");
                Ok(())
            }
        }
    }

    fn ensure_cipher(&mut self, random: &mut RandomPool) -> CryptResult<&mut StreamCipherState> {
        let key = match &self.material {
            Some(KeyMaterial::Secret(key)) => key.clone(),
            _ => return Err(CryptError::new(ErrorCode::NotInited)),
        };
        if self.cipher.is_none() {
            let iv = match &self.iv {
                Some(iv) => iv.clone(),
                None => {
                    let iv = random.bytes(self.algorithm.capability().iv_size);
                    self.iv = Some(iv.clone());
                    iv
                }
            };
            self.cipher = Some(StreamCipherState::new(self.algorithm, &key, &iv)?);
        }
        self.cipher
            .as_mut()
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited))
    }

    /// Encrypt in place, or feed a hash/MAC (an empty buffer finalises).
    pub fn encrypt(&mut self, buf: &mut [u8], random: &mut RandomPool) -> CryptResult<()> {
        self.require_idle()?;
        match self.algorithm.class() {
            AlgorithmClass::Conventional => {
                self.ensure_cipher(random)?.encrypt(buf)?;
                Ok(())
            }
            AlgorithmClass::Hash | AlgorithmClass::Mac => {
                let digest = self
                    .digest
                    .as_mut()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
                if buf.is_empty() {
                    digest.finalise();
                    return Ok(());
                }
                digest.update(buf)?;
                Ok(())
            }
            AlgorithmClass::PublicKey => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    pub fn decrypt(&mut self, buf: &mut [u8], random: &mut RandomPool) -> CryptResult<()> {
        self.require_idle()?;
        match self.algorithm.class() {
            AlgorithmClass::Conventional => {
                self.ensure_cipher(random)?.decrypt(buf)?;
                Ok(())
            }
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    /// Finalise a hash context if needed and return its value.
    pub fn hash_value(&mut self) -> CryptResult<(Algorithm, Vec<u8>)> {
        self.require_idle()?;
        if self.algorithm.class() != AlgorithmClass::Hash {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        let digest = self
            .digest
            .as_mut()
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
        Ok((self.algorithm, digest.finalise().to_vec()))
    }

    /// Copy out the key for use by another object.
    pub fn snapshot(&self, non_exportable: bool) -> CryptResult<KeySnapshot> {
        self.require_idle()?;
        let material = self
            .material
            .clone()
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
        Ok(KeySnapshot {
            algorithm: self.algorithm,
            label: self.label.clone(),
            material,
            non_exportable,
            attached: self.attached.clone(),
        })
    }

    /// Load a raw key (the import side of a key exchange).
    pub fn load_secret(&mut self, secret: &[u8]) -> CryptResult<()> {
        self.require_idle()?;
        self.check_keyable()?;
        let material = KeyMaterial::from_seed(self.algorithm, secret)?;
        self.install(material)
    }

    fn require_conventional(&self) -> CryptResult<()> {
        if self.algorithm.class() != AlgorithmClass::Conventional {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        Ok(())
    }

    fn set_key_size(&mut self, size: i32) -> CryptResult<()> {
        if self.material.is_some() {
            return Err(CryptError::new(ErrorCode::Inited));
        }
        let cap = self.algorithm.capability();
        let size = size as usize;
        if !self.algorithm.is_keyed() {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        if size < cap.min_key_size || size > cap.max_key_size {
            return Err(CryptError::new(ErrorCode::Param3));
        }
        self.key_size = size;
        Ok(())
    }

    fn derive_from_password(&mut self, password: &[u8], env: &AttrEnv<'_>) -> CryptResult<()> {
        self.check_keyable()?;
        let salt = match &self.keying_salt {
            Some(salt) => salt.clone(),
            None => {
                let salt = env.random_bytes(DEFAULT_SALT_SIZE);
                self.keying_salt = Some(salt.clone());
                salt
            }
        };
        let key = derive_key(self.keying_algorithm, password, &salt, self.keying_iterations)?;
        let material = KeyMaterial::from_seed(self.algorithm, &key[..self.key_size.min(32)])?;
        self.install(material)
    }
}

impl AttributeHandler for ContextObject {
    fn get_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        let cap = self.algorithm.capability();
        let value = match id {
            AttributeId::CTXINFO_ALGO => AttributeValue::Int(self.algorithm.id()),
            AttributeId::CTXINFO_MODE => AttributeValue::Int(self.mode as i32),
            AttributeId::CTXINFO_NAME_ALGO => AttributeValue::String(self.algorithm.name().as_bytes().to_vec()),
            AttributeId::CTXINFO_NAME_MODE => AttributeValue::String(self.mode.name().as_bytes().to_vec()),
            AttributeId::CTXINFO_KEYSIZE => AttributeValue::Int(self.key_size as i32),
            AttributeId::CTXINFO_BLOCKSIZE => AttributeValue::Int(cap.block_size as i32),
            AttributeId::CTXINFO_IVSIZE => {
                self.require_conventional()?;
                AttributeValue::Int(cap.iv_size as i32)
            }
            AttributeId::CTXINFO_KEYING_ALGO => AttributeValue::Int(self.keying_algorithm.id()),
            AttributeId::CTXINFO_KEYING_ITERATIONS => AttributeValue::Int(self.keying_iterations as i32),
            AttributeId::CTXINFO_KEYING_SALT => AttributeValue::String(
                self.keying_salt
                    .clone()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?,
            ),
            AttributeId::CTXINFO_KEY_COMPONENTS => {
                let material = self
                    .material
                    .as_ref()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
                let public = material
                    .public_bytes()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotAvail))?;
                AttributeValue::String(public.to_vec())
            }
            AttributeId::CTXINFO_IV => {
                self.require_conventional()?;
                AttributeValue::String(self.iv.clone().ok_or_else(|| CryptError::new(ErrorCode::NotFound))?)
            }
            AttributeId::CTXINFO_HASHVALUE => {
                let value = self
                    .digest
                    .as_ref()
                    .and_then(|d| d.value())
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
                AttributeValue::String(value.to_vec())
            }
            AttributeId::CTXINFO_LABEL => AttributeValue::String(
                self.label
                    .as_ref()
                    .map(|l| l.as_bytes().to_vec())
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?,
            ),
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        };
        Ok(value)
    }

    fn set_attr(&mut self, id: AttributeId, value: AttrInput, env: &AttrEnv<'_>) -> CryptResult<()> {
        match id {
            AttributeId::CTXINFO_MODE => {
                let mode = Mode::from_raw(value.int()?).ok_or_else(|| CryptError::new(ErrorCode::Param3))?;
                if mode != self.algorithm.default_mode() {
                    return Err(CryptError::new(ErrorCode::NotAvail));
                }
                self.mode = mode;
            }
            AttributeId::CTXINFO_KEYSIZE => self.set_key_size(value.int()?)?,
            AttributeId::CTXINFO_KEYING_ALGO => {
                let algo = Algorithm::from_raw(value.int()?)
                    .filter(|a| *a == Algorithm::Blake3)
                    .ok_or_else(|| CryptError::new(ErrorCode::NotAvail))?;
                self.keying_algorithm = algo;
            }
            AttributeId::CTXINFO_KEYING_ITERATIONS => self.keying_iterations = value.int()? as u32,
            AttributeId::CTXINFO_KEYING_SALT => {
                if self.material.is_some() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                self.keying_salt = Some(value.bytes()?.to_vec());
            }
            AttributeId::CTXINFO_KEYING_VALUE => {
                let password = Zeroizing::new(value.bytes()?.to_vec());
                self.derive_from_password(&password, env)?;
            }
            AttributeId::CTXINFO_KEY => {
                self.check_keyable()?;
                let material = KeyMaterial::from_seed(self.algorithm, value.bytes()?)?;
                self.install(material)?;
            }
            AttributeId::CTXINFO_KEY_COMPONENTS => {
                if self.algorithm.class() != AlgorithmClass::PublicKey {
                    return Err(CryptError::new(ErrorCode::NotAvail));
                }
                self.check_keyable()?;
                let material = KeyMaterial::from_public(self.algorithm, value.bytes()?)?;
                self.install(material)?;
            }
            AttributeId::CTXINFO_IV => {
                self.require_conventional()?;
                let iv = value.bytes()?;
                let expected = self.algorithm.capability().iv_size;
                if iv.len() != expected {
                    return Err(CryptError::new(ErrorCode::Param3)
                        .with_detail(format!("IV must be {expected} bytes")));
                }
                if let Some(cipher) = self.cipher.as_mut() {
                    cipher.set_iv(iv)?;
                }
                self.iv = Some(iv.to_vec());
            }
            AttributeId::CTXINFO_LABEL => {
                if self.label.is_some() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                self.label = Some(value.text()?);
            }
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    fn delete_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<()> {
        match id {
            AttributeId::CTXINFO_HASHVALUE => {
                let digest = self
                    .digest
                    .as_mut()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
                digest.reset();
                Ok(())
            }
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn is_busy(&self) -> bool {
        self.is_busy_job()
    }

    fn lifecycle(&self) -> Lifecycle {
        let hashing = self.digest.as_ref().is_some_and(|d| d.is_finalised());
        if self.material.is_some() || hashing {
            Lifecycle::Active
        } else {
            Lifecycle::Configured
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn options() -> OptionsConfig {
        OptionsConfig::default()
    }

    fn pool() -> RandomPool {
        RandomPool::new().unwrap()
    }

    #[test]
    fn test_stream_round_trip() {
        let mut random = pool();
        let mut ctx = ContextObject::new(Algorithm::ChaCha20, &options()).unwrap();
        let mut buf = b"attack at dawn".to_vec();
        assert_eq!(ctx.encrypt(&mut buf, &mut random).unwrap_err().kind(), ErrorCode::NotInited);

        ctx.generate_key(&mut random).unwrap();
        ctx.encrypt(&mut buf, &mut random).unwrap();
        assert_ne!(&buf, b"attack at dawn");
        ctx.decrypt(&mut buf, &mut random).unwrap();
        assert_eq!(&buf, b"attack at dawn");
        assert_eq!(ctx.generate_key(&mut random).unwrap_err().kind(), ErrorCode::Inited);
    }

    #[test]
    fn test_hash_feed_and_finalise() {
        let mut random = pool();
        let mut ctx = ContextObject::new(Algorithm::Sha256, &options()).unwrap();
        let mut data = b"abc".to_vec();
        ctx.encrypt(&mut data, &mut random).unwrap();
        ctx.encrypt(&mut [], &mut random).unwrap();
        assert_eq!(
            ctx.encrypt(&mut data, &mut random).unwrap_err().kind(),
            ErrorCode::Complete
        );
        let (_, value) = ctx.hash_value().unwrap();
        assert_eq!(value, cryptkit_crypto::sha256(b"abc").to_vec());
        assert_eq!(ctx.lifecycle(), Lifecycle::Active);
    }

    #[test]
    fn test_async_lifecycle() {
        let mut random = pool();
        let mut ctx = ContextObject::new(Algorithm::Ed25519, &options()).unwrap();
        assert_eq!(ctx.async_query(&mut random).unwrap_err().kind(), ErrorCode::Complete);

        ctx.generate_key_async().unwrap();
        assert!(ctx.is_busy());
        assert_eq!(ctx.async_query(&mut random).unwrap_err().kind(), ErrorCode::Incomplete);

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            match ctx.async_query(&mut random) {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorCode::Incomplete && Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert!(ctx.is_keyed());
        assert_eq!(ctx.async_query(&mut random).unwrap_err().kind(), ErrorCode::Complete);
    }

    #[test]
    fn test_async_cancel_discards_key() {
        let mut random = pool();
        let mut ctx = ContextObject::new(Algorithm::ChaCha20, &options()).unwrap();
        ctx.generate_key_async().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(ctx.encrypt(&mut buf, &mut random).unwrap_err().kind(), ErrorCode::Timeout);
        ctx.async_cancel().unwrap();
        assert_eq!(ctx.async_query(&mut random).unwrap_err().kind(), ErrorCode::Complete);
        assert!(!ctx.is_keyed());
    }

    #[test]
    fn test_password_keying_is_deterministic() {
        let random = Mutex::new(pool());
        let config = cryptkit_core::KernelConfig::default();
        let env = AttrEnv {
            random: &random,
            config: &config,
            handle: crate::handle::Handle::from_raw(0x10000).unwrap(),
        };
        let salt = b"saltsaltsalt".to_vec();
        let mut a = ContextObject::new(Algorithm::ChaCha20, &options()).unwrap();
        let mut b = ContextObject::new(Algorithm::ChaCha20, &options()).unwrap();
        for ctx in [&mut a, &mut b] {
            ctx.set_attr(AttributeId::CTXINFO_KEYING_SALT, AttrInput::Bytes(salt.clone()), &env)
                .unwrap();
            ctx.set_attr(AttributeId::CTXINFO_KEYING_VALUE, AttrInput::Bytes(b"pw".to_vec()), &env)
                .unwrap();
        }
        assert_eq!(a.material().unwrap().key_id(), b.material().unwrap().key_id());
    }

    #[test]
    fn test_key_length_enforced() {
        let random = Mutex::new(pool());
        let config = cryptkit_core::KernelConfig::default();
        let env = AttrEnv {
            random: &random,
            config: &config,
            handle: crate::handle::Handle::from_raw(0x10000).unwrap(),
        };
        let mut ctx = ContextObject::new(Algorithm::ChaCha20, &options()).unwrap();
        let err = ctx
            .set_attr(AttributeId::CTXINFO_KEY, AttrInput::Bytes(vec![0u8; 16]), &env)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Param3);
        ctx.set_attr(AttributeId::CTXINFO_KEY, AttrInput::Bytes(vec![7u8; 32]), &env)
            .unwrap();
        let err = ctx
            .set_attr(AttributeId::CTXINFO_KEY, AttrInput::Bytes(vec![7u8; 32]), &env)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Inited);
    }
}
