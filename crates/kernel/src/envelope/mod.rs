//! Envelopes: streaming encrypt/sign/compress pipelines.
//!
//! An envelope created with the native format wraps pushed data; one created
//! with [`EnvelopeFormat::Auto`] unwraps it. Data moves through a bounded
//! buffer: `push` accepts what fits, `flush` ends the input and `pop` drains
//! the result.
//!
//! When de-enveloping reaches data it cannot process without a key, `push`
//! fails with `EnvelopeResource`, names the missing attribute through the
//! error locus and `ATTRIBUTE_CURRENT`, and leaves the buffer exactly as it
//! was before the call, so the caller supplies the resource and repeats the
//! same push.

pub mod format;

use crate::attribute::{AttributeId, AttributeValue, CursorMove};
use crate::certificate::{CertSnapshot, CertificateObject};
use crate::context::{KeyMaterial, KeySnapshot};
use crate::object::{AttrEnv, AttrInput, AttributeHandler, Lifecycle, ObjectRef};
use crate::types::{content_type, EnvelopeFormat};
use cryptkit_core::{CryptError, CryptResult, ErrorCode, ErrorType};
use cryptkit_crypto::kdf::DEFAULT_SALT_SIZE;
use cryptkit_crypto::{derive_key, keyex, signing, AgreementKeyPair, Algorithm, RandomPool, RecordCipher};
use format::{Header, Keying, Trailer, FORMAT_VERSION, KEYING_AAD, MAX_SEGMENT, SEGMENT_SIZE};
use std::collections::VecDeque;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const KEY_WRAP_CONTEXT: &str = "cryptkit envelope key wrap 2024-01";
const COMPRESSION_LEVEL: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Envelope,
    Deenvelope,
}

/// How an outgoing envelope protects its content key.
enum KeyingInput {
    Password(Zeroizing<Vec<u8>>),
    Key(KeySnapshot),
    PublicKey {
        pair: AgreementKeyPair,
        label: Option<String>,
    },
    Session(KeySnapshot),
}

/// Keys supplied for de-enveloping.
#[derive(Default)]
struct Resources {
    password: Option<Zeroizing<Vec<u8>>>,
    key: Option<KeySnapshot>,
    private_key: Option<KeySnapshot>,
    session_key: Option<KeySnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Segments,
    Trailer,
    Done,
}

/// Key that signed a de-enveloped message.
#[derive(Clone)]
pub struct SignerKey {
    pub public_key: Vec<u8>,
    pub label: Option<String>,
    pub certificate: Option<CertSnapshot>,
}

pub struct EnvelopeObject {
    direction: Direction,
    buffer_size: usize,
    keying_iterations: u32,

    data_size: Option<i64>,
    compression: bool,
    content_type: i32,
    keying: Option<KeyingInput>,
    signer: Option<KeySnapshot>,
    resources: Resources,
    check_key: Option<Vec<u8>>,

    started: bool,
    flushed: bool,
    stage: Stage,
    input: Vec<u8>,
    output: VecDeque<u8>,
    header: Option<Header>,
    pending_header: Option<Header>,
    header_digest: [u8; 32],
    content_key: Option<Zeroizing<[u8; 32]>>,
    cipher: Option<RecordCipher>,
    content_hash: blake3::Hasher,
    processed: i64,
    required: Option<AttributeId>,
    signature_status: Option<i32>,
    signer_key: Option<SignerKey>,
}

fn resource_needed(attribute: AttributeId) -> CryptError {
    CryptError::new(ErrorCode::EnvelopeResource).with_locus(attribute.raw(), ErrorType::AttrAbsent)
}

fn wrong_key(detail: &str) -> CryptError {
    CryptError::new(ErrorCode::WrongKey).with_detail(detail.to_string())
}

fn to_key(bytes: &[u8]) -> CryptResult<Zeroizing<[u8; 32]>> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptError::new(ErrorCode::BadData).with_detail("bad content key length"))?;
    Ok(Zeroizing::new(array))
}

fn plain_key(prefix: &[u8; 4]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(blake3::derive_key(format::PLAIN_KEY_CONTEXT, prefix))
}

fn session_content_key(secret: &[u8], prefix: &[u8; 4]) -> Zeroizing<[u8; 32]> {
    let mut material = Zeroizing::new(Vec::with_capacity(secret.len() + 4));
    material.extend_from_slice(secret);
    material.extend_from_slice(prefix);
    Zeroizing::new(blake3::derive_key(format::SESSION_KEY_CONTEXT, &material))
}

fn key_wrap_kek(secret: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(blake3::derive_key(KEY_WRAP_CONTEXT, secret))
}

fn conventional(obj: ObjectRef) -> CryptResult<KeySnapshot> {
    match obj {
        ObjectRef::Key(key) if matches!(key.material, KeyMaterial::Secret(_)) => Ok(*key),
        _ => Err(CryptError::new(ErrorCode::Param3)),
    }
}

fn cert_label(cert: &CertSnapshot) -> Option<String> {
    cert.subject().common_name.clone()
}

impl EnvelopeObject {
    pub fn new(format: EnvelopeFormat, buffer_size: usize, keying_iterations: u32) -> CryptResult<Self> {
        let direction = match format {
            EnvelopeFormat::Cryptlib => Direction::Envelope,
            EnvelopeFormat::Auto => Direction::Deenvelope,
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        };
        Ok(Self {
            direction,
            buffer_size,
            keying_iterations: keying_iterations.max(1),
            data_size: None,
            compression: false,
            content_type: content_type::DATA,
            keying: None,
            signer: None,
            resources: Resources::default(),
            check_key: None,
            started: false,
            flushed: false,
            stage: Stage::Header,
            input: Vec::new(),
            output: VecDeque::new(),
            header: None,
            pending_header: None,
            header_digest: [0; 32],
            content_key: None,
            cipher: None,
            content_hash: blake3::Hasher::new(),
            processed: 0,
            required: None,
            signature_status: None,
            signer_key: None,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Signing key found in the trailer of a de-enveloped message.
    pub fn signer_key(&self) -> CryptResult<&SignerKey> {
        if self.direction == Direction::Envelope {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        self.signer_key.as_ref().ok_or_else(|| CryptError::new(ErrorCode::NotFound))
    }

    fn capacity(&self) -> usize {
        self.buffer_size.max(MAX_SEGMENT + 8)
    }

    fn free_space(&self) -> usize {
        self.capacity().saturating_sub(self.input.len() + self.output.len())
    }

    fn ensure_unstarted(&self) -> CryptResult<()> {
        if self.started {
            return Err(CryptError::new(ErrorCode::Inited).with_detail("envelope data already pushed"));
        }
        Ok(())
    }

    fn ensure_direction(&self, direction: Direction) -> CryptResult<()> {
        if self.direction != direction {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        Ok(())
    }

    /// Accept up to the free buffer space from `data`.
    pub fn push(&mut self, data: &[u8], random: &mut RandomPool) -> CryptResult<usize> {
        if self.flushed {
            return Err(CryptError::new(ErrorCode::Complete));
        }
        let free = self.free_space();
        if free == 0 {
            return Err(CryptError::new(ErrorCode::Overflow).with_detail("envelope buffer full"));
        }
        let accepted = data.len().min(free);
        let data = &data[..accepted];
        match self.direction {
            Direction::Envelope => {
                if let Some(limit) = self.data_size {
                    if self.processed + accepted as i64 > limit {
                        return Err(CryptError::new(ErrorCode::Overflow).with_detail("more data than declared size"));
                    }
                }
                if !self.started {
                    self.start_enveloping(random)?;
                }
                self.input.extend_from_slice(data);
                self.processed += accepted as i64;
                while self.input.len() >= SEGMENT_SIZE {
                    let chunk: Vec<u8> = self.input.drain(..SEGMENT_SIZE).collect();
                    self.emit_segment(&chunk, false)?;
                }
            }
            Direction::Deenvelope => {
                let mark = self.input.len();
                self.input.extend_from_slice(data);
                self.started = true;
                if let Err(err) = self.process_input() {
                    if matches!(err.kind(), ErrorCode::EnvelopeResource | ErrorCode::WrongKey) {
                        self.input.truncate(mark);
                    }
                    return Err(err);
                }
            }
        }
        Ok(accepted)
    }

    /// End the input.
    pub fn flush(&mut self, random: &mut RandomPool) -> CryptResult<()> {
        if self.flushed {
            return Err(CryptError::new(ErrorCode::Complete));
        }
        match self.direction {
            Direction::Envelope => {
                if let Some(limit) = self.data_size {
                    if self.processed < limit {
                        return Err(CryptError::new(ErrorCode::Underflow).with_detail("less data than declared size"));
                    }
                }
                if !self.started {
                    self.start_enveloping(random)?;
                }
                let rest = std::mem::take(&mut self.input);
                self.emit_segment(&rest, true)?;
                if self.signer.is_some() {
                    self.emit_trailer()?;
                }
            }
            Direction::Deenvelope => {
                if self.stage != Stage::Done {
                    return Err(CryptError::new(ErrorCode::Underflow).with_detail("envelope data is incomplete"));
                }
            }
        }
        self.flushed = true;
        debug!(direction = ?self.direction, bytes = self.processed, "envelope flushed");
        Ok(())
    }

    /// Move processed data into `buf`, returning the count.
    pub fn pop(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.output.len());
        for (dst, src) in buf.iter_mut().zip(self.output.drain(..count)) {
            *dst = src;
        }
        count
    }

    fn start_enveloping(&mut self, random: &mut RandomPool) -> CryptResult<()> {
        let nonce_prefix: [u8; 4] = random.array();
        let (content_key, keying) = match &self.keying {
            None => (plain_key(&nonce_prefix), None),
            Some(KeyingInput::Password(password)) => {
                let content_key = Zeroizing::new(random.array::<32>());
                let salt = random.bytes(DEFAULT_SALT_SIZE);
                let kek = derive_key(Algorithm::Blake3, password, &salt, self.keying_iterations)?;
                let wrapped = keyex::seal(&kek, random, content_key.as_slice(), KEYING_AAD)?;
                let keying = Keying::Password {
                    salt,
                    iterations: self.keying_iterations,
                    wrapped,
                };
                (content_key, Some(keying))
            }
            Some(KeyingInput::Key(key)) => {
                let content_key = Zeroizing::new(random.array::<32>());
                let kek = key_wrap_kek(key.secret()?);
                let wrapped = keyex::seal(&kek, random, content_key.as_slice(), KEYING_AAD)?;
                let keying = Keying::Key {
                    key_id: hex::encode(key.key_id()),
                    wrapped,
                };
                (content_key, Some(keying))
            }
            Some(KeyingInput::PublicKey { pair, label }) => {
                let content_key = Zeroizing::new(random.array::<32>());
                let wrap = pair.wrap(random, content_key.as_slice(), KEYING_AAD)?;
                let keying = Keying::PublicKey {
                    key_id: hex::encode(pair.key_id()),
                    label: label.clone(),
                    wrap,
                };
                (content_key, Some(keying))
            }
            Some(KeyingInput::Session(key)) => {
                let content_key = session_content_key(key.secret()?, &nonce_prefix);
                let keying = Keying::Session {
                    key_id: hex::encode(key.key_id()),
                };
                (content_key, Some(keying))
            }
        };

        let header = Header {
            version: FORMAT_VERSION,
            content_type: self.content_type,
            compressed: self.compression,
            data_size: self.data_size,
            nonce_prefix,
            keying,
            signed: self.signer.is_some(),
        };
        let encoded = format::encode_header(&header)?;
        self.output.extend(format::frame_header(&encoded));
        self.begin_content(&header, &encoded, content_key);
        self.header = Some(header);
        self.started = true;
        Ok(())
    }

    fn begin_content(&mut self, header: &Header, encoded: &[u8], content_key: Zeroizing<[u8; 32]>) {
        self.header_digest = *blake3::hash(encoded).as_bytes();
        self.content_hash = blake3::Hasher::new();
        self.content_hash.update(encoded);
        self.cipher = Some(RecordCipher::new(&content_key, header.nonce_prefix));
        self.content_key = Some(content_key);
    }

    fn emit_segment(&mut self, chunk: &[u8], final_segment: bool) -> CryptResult<()> {
        self.content_hash.update(chunk);
        let body = if self.compression {
            miniz_oxide::deflate::compress_to_vec(chunk, COMPRESSION_LEVEL)
        } else {
            chunk.to_vec()
        };
        let cipher = self
            .cipher
            .as_mut()
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
        let sealed = cipher.seal(&body, final_segment, &self.header_digest)?;
        self.output.extend(format::frame_segment(&sealed, final_segment));
        Ok(())
    }

    fn emit_trailer(&mut self) -> CryptResult<()> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
        let pair = signer.signer()?;
        let content_hash = *self.content_hash.finalize().as_bytes();
        let signature = pair.sign(&format::signed_message(&content_hash))?;
        let certificate = signer.attached.as_ref().map(|cert| cert.encode_all()).transpose()?;
        let trailer = Trailer {
            key_id: hex::encode(pair.key_id()),
            public_key: pair.public_bytes().to_vec(),
            signature: signature.to_vec(),
            certificate,
        };
        self.output.extend(format::frame_trailer(&trailer)?);
        Ok(())
    }

    fn process_input(&mut self) -> CryptResult<()> {
        loop {
            match self.stage {
                Stage::Header => {
                    let Some((header, encoded, used)) = format::parse_header(&self.input)? else {
                        return Ok(());
                    };
                    let content_key = self.unlock(&header)?;
                    self.input.drain(..used);
                    self.begin_content(&header, &encoded, content_key);
                    debug!(keying = header.keying.is_some(), signed = header.signed, "envelope header accepted");
                    self.header = Some(header);
                    self.pending_header = None;
                    self.stage = Stage::Segments;
                }
                Stage::Segments => {
                    let Some((sealed, final_segment, used)) = format::parse_segment(&self.input)? else {
                        return Ok(());
                    };
                    let cipher = self
                        .cipher
                        .as_mut()
                        .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
                    let body = cipher.open(sealed, final_segment, &self.header_digest).map_err(|_| {
                        CryptError::new(ErrorCode::BadData).with_detail("envelope segment failed authentication")
                    })?;
                    let (compressed, data_size, signed) = match &self.header {
                        Some(h) => (h.compressed, h.data_size, h.signed),
                        None => return Err(CryptError::new(ErrorCode::NotInited)),
                    };
                    let plain = if compressed {
                        miniz_oxide::inflate::decompress_to_vec_with_limit(&body, 2 * SEGMENT_SIZE)
                            .map_err(|_| CryptError::new(ErrorCode::BadData).with_detail("bad compressed segment"))?
                    } else {
                        body
                    };
                    self.processed += plain.len() as i64;
                    if data_size.is_some_and(|limit| self.processed > limit) {
                        return Err(CryptError::new(ErrorCode::BadData).with_detail("more data than declared size"));
                    }
                    self.content_hash.update(&plain);
                    self.output.extend(plain);
                    self.input.drain(..used);
                    if final_segment {
                        if data_size.is_some_and(|limit| self.processed != limit) {
                            return Err(CryptError::new(ErrorCode::Underflow).with_detail("less data than declared size"));
                        }
                        self.stage = if signed { Stage::Trailer } else { Stage::Done };
                    }
                }
                Stage::Trailer => {
                    let Some((trailer, used)) = format::parse_trailer(&self.input)? else {
                        return Ok(());
                    };
                    self.input.drain(..used);
                    self.verify_trailer(trailer)?;
                    self.stage = Stage::Done;
                }
                Stage::Done => {
                    if !self.input.is_empty() {
                        return Err(CryptError::new(ErrorCode::BadData).with_detail("trailing data after envelope"));
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Note that `attribute` is required to read `header`.
    fn need(&mut self, attribute: AttributeId, header: &Header) -> CryptError {
        self.required = Some(attribute);
        self.pending_header = Some(header.clone());
        resource_needed(attribute)
    }

    /// Recover the content key for `header` from the supplied resources.
    fn unlock(&mut self, header: &Header) -> CryptResult<Zeroizing<[u8; 32]>> {
        let content_key = match &header.keying {
            None => plain_key(&header.nonce_prefix),
            Some(Keying::Password { salt, iterations, wrapped }) => {
                let Some(password) = &self.resources.password else {
                    return Err(self.need(AttributeId::ENVINFO_PASSWORD, header));
                };
                let kek = derive_key(Algorithm::Blake3, password, salt, (*iterations).max(1))?;
                let key = keyex::open(&kek, wrapped, KEYING_AAD).map_err(|_| wrong_key("incorrect password"))?;
                to_key(&key)?
            }
            Some(Keying::Key { key_id, wrapped }) => {
                let Some(key) = &self.resources.key else {
                    return Err(self.need(AttributeId::ENVINFO_KEY, header));
                };
                if hex::encode(key.key_id()) != *key_id {
                    return Err(wrong_key("envelope was keyed with a different key"));
                }
                let kek = key_wrap_kek(key.secret()?);
                to_key(&keyex::open(&kek, wrapped, KEYING_AAD).map_err(|_| wrong_key("key unwrap failed"))?)?
            }
            Some(Keying::PublicKey { key_id, wrap, .. }) => {
                let Some(key) = &self.resources.private_key else {
                    return Err(self.need(AttributeId::ENVINFO_PRIVATEKEY, header));
                };
                if hex::encode(key.key_id()) != *key_id {
                    return Err(wrong_key("envelope is for a different recipient"));
                }
                let pair = key.agreement()?;
                to_key(&pair.unwrap(wrap, KEYING_AAD).map_err(|_| wrong_key("key unwrap failed"))?)?
            }
            Some(Keying::Session { key_id }) => {
                let Some(key) = &self.resources.session_key else {
                    return Err(self.need(AttributeId::ENVINFO_SESSIONKEY, header));
                };
                if hex::encode(key.key_id()) != *key_id {
                    return Err(wrong_key("envelope used a different session key"));
                }
                session_content_key(key.secret()?, &header.nonce_prefix)
            }
        };
        self.required = None;
        Ok(content_key)
    }

    fn verify_trailer(&mut self, trailer: Trailer) -> CryptResult<()> {
        let content_hash = *self.content_hash.finalize().as_bytes();
        let certificate = trailer
            .certificate
            .as_deref()
            .map(|data| CertificateObject::import(data).map(|cert| cert.snapshot()))
            .transpose()?;
        if let Some(cert) = &certificate {
            if cert.public_key().map(|info| info.key.as_slice()) != Some(trailer.public_key.as_slice()) {
                return Err(CryptError::new(ErrorCode::BadData).with_detail("trailer certificate does not match key"));
            }
        }
        let status = match &self.check_key {
            Some(expected) if *expected != trailer.public_key => ErrorCode::WrongKey.code(),
            _ => match signing::verify(&trailer.public_key, &format::signed_message(&content_hash), &trailer.signature) {
                Ok(()) => 0,
                Err(_) => {
                    warn!(key_id = %trailer.key_id, "envelope signature did not verify");
                    ErrorCode::Signature.code()
                }
            },
        };
        self.signature_status = Some(status);
        self.signer_key = Some(SignerKey {
            label: certificate.as_ref().and_then(cert_label),
            public_key: trailer.public_key,
            certificate,
        });
        Ok(())
    }

    /// Store a de-enveloping resource. If the header is already known the
    /// resource is tried at once and rejected on mismatch.
    fn supply(&mut self, attribute: AttributeId, value: AttrInput) -> CryptResult<()> {
        if self.content_key.is_some() {
            return Err(CryptError::new(ErrorCode::Inited));
        }
        match attribute {
            AttributeId::ENVINFO_PASSWORD => self.resources.password = Some(Zeroizing::new(value.bytes()?.to_vec())),
            AttributeId::ENVINFO_KEY => self.resources.key = Some(conventional(value.into_object()?)?),
            AttributeId::ENVINFO_SESSIONKEY => self.resources.session_key = Some(conventional(value.into_object()?)?),
            AttributeId::ENVINFO_PRIVATEKEY => match value.into_object()? {
                ObjectRef::Key(key) if key.agreement().is_ok_and(|pair| pair.has_private()) => {
                    self.resources.private_key = Some(*key);
                }
                _ => return Err(CryptError::new(ErrorCode::Param3)),
            },
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        let Some(header) = self.pending_header.clone() else {
            return Ok(());
        };
        if self.required != Some(attribute) {
            return Ok(());
        }
        if let Err(err) = self.unlock(&header) {
            match attribute {
                AttributeId::ENVINFO_PASSWORD => self.resources.password = None,
                AttributeId::ENVINFO_KEY => self.resources.key = None,
                AttributeId::ENVINFO_SESSIONKEY => self.resources.session_key = None,
                _ => self.resources.private_key = None,
            }
            self.required = Some(attribute);
            return Err(err);
        }
        Ok(())
    }

    fn set_keying(&mut self, keying: KeyingInput) -> CryptResult<()> {
        self.ensure_unstarted()?;
        if self.keying.is_some() {
            return Err(CryptError::new(ErrorCode::Inited).with_detail("envelope keying already set"));
        }
        self.keying = Some(keying);
        Ok(())
    }

    fn set_envelope_attr(&mut self, id: AttributeId, value: AttrInput) -> CryptResult<()> {
        match id {
            AttributeId::ENVINFO_DATASIZE => {
                self.ensure_unstarted()?;
                self.data_size = Some(i64::from(value.int()?));
            }
            AttributeId::ENVINFO_COMPRESSION => {
                self.ensure_unstarted()?;
                self.compression = value.flag()?;
            }
            AttributeId::ENVINFO_CONTENTTYPE => {
                self.ensure_unstarted()?;
                self.content_type = value.int()?;
            }
            AttributeId::ENVINFO_PASSWORD => {
                self.set_keying(KeyingInput::Password(Zeroizing::new(value.bytes()?.to_vec())))?
            }
            AttributeId::ENVINFO_KEY => self.set_keying(KeyingInput::Key(conventional(value.into_object()?)?))?,
            AttributeId::ENVINFO_SESSIONKEY => {
                self.set_keying(KeyingInput::Session(conventional(value.into_object()?)?))?
            }
            AttributeId::ENVINFO_PUBLICKEY => {
                let (pair, label) = match value.into_object()? {
                    ObjectRef::Key(key) => {
                        let pair = key.agreement().map_err(|_| CryptError::new(ErrorCode::Param3))?;
                        (pair.public_only(), key.label.clone())
                    }
                    ObjectRef::Certificate(cert) => {
                        let info = cert
                            .public_key()
                            .filter(|info| info.algorithm == Algorithm::X25519.id())
                            .ok_or_else(|| CryptError::new(ErrorCode::Param3))?;
                        (AgreementKeyPair::from_public(&info.key)?, cert_label(&cert))
                    }
                    ObjectRef::User(_) => return Err(CryptError::new(ErrorCode::Param3)),
                };
                self.set_keying(KeyingInput::PublicKey { pair, label })?
            }
            AttributeId::ENVINFO_SIGNATURE => {
                self.ensure_unstarted()?;
                if self.signer.is_some() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                match value.into_object()? {
                    ObjectRef::Key(key) if key.signer().is_ok_and(|pair| pair.has_private()) => {
                        self.signer = Some(*key);
                    }
                    _ => return Err(CryptError::new(ErrorCode::Param3)),
                }
            }
            AttributeId::ENVINFO_PRIVATEKEY => return Err(CryptError::new(ErrorCode::NotAvail)),
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    fn set_deenvelope_attr(&mut self, id: AttributeId, value: AttrInput) -> CryptResult<()> {
        match id {
            AttributeId::ENVINFO_PASSWORD
            | AttributeId::ENVINFO_KEY
            | AttributeId::ENVINFO_SESSIONKEY
            | AttributeId::ENVINFO_PRIVATEKEY => self.supply(id, value),
            AttributeId::ENVINFO_SIGNATURE => {
                if self.check_key.is_some() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                let public = match value.into_object()? {
                    ObjectRef::Key(key) => key
                        .signer()
                        .map_err(|_| CryptError::new(ErrorCode::Param3))?
                        .public_bytes()
                        .to_vec(),
                    ObjectRef::Certificate(cert) => cert
                        .public_key()
                        .filter(|info| info.algorithm == Algorithm::Ed25519.id())
                        .map(|info| info.key.clone())
                        .ok_or_else(|| CryptError::new(ErrorCode::Param3))?,
                    ObjectRef::User(_) => return Err(CryptError::new(ErrorCode::Param3)),
                };
                self.check_key = Some(public);
                Ok(())
            }
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }
}

impl AttributeHandler for EnvelopeObject {
    fn get_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        let header = self.header.as_ref().or(self.pending_header.as_ref());
        match id {
            AttributeId::ATTRIBUTE_BUFFERSIZE => Ok(AttributeValue::Int(self.buffer_size as i32)),
            AttributeId::ATTRIBUTE_CURRENT_GROUP | AttributeId::ATTRIBUTE_CURRENT => self
                .required
                .map(|attr| AttributeValue::Int(attr.raw()))
                .ok_or_else(|| CryptError::new(ErrorCode::NotFound)),
            AttributeId::ENVINFO_DATASIZE => {
                let size = match self.direction {
                    Direction::Envelope => self.data_size,
                    Direction::Deenvelope => header.and_then(|h| h.data_size),
                };
                size.map(|s| AttributeValue::Int(i32::try_from(s).unwrap_or(i32::MAX)))
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
            }
            AttributeId::ENVINFO_COMPRESSION => Ok(AttributeValue::Bool(match self.direction {
                Direction::Envelope => self.compression,
                Direction::Deenvelope => header.is_some_and(|h| h.compressed),
            })),
            AttributeId::ENVINFO_CONTENTTYPE => match (self.direction, header) {
                (Direction::Envelope, _) => Ok(AttributeValue::Int(self.content_type)),
                (Direction::Deenvelope, Some(h)) => Ok(AttributeValue::Int(h.content_type)),
                (Direction::Deenvelope, None) => Err(CryptError::new(ErrorCode::NotFound)),
            },
            AttributeId::ENVINFO_SIGNATURE_RESULT => {
                self.ensure_direction(Direction::Deenvelope)?;
                self.signature_status
                    .map(AttributeValue::Int)
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
            }
            AttributeId::ENVINFO_PRIVATEKEY_LABEL => match header.and_then(|h| h.keying.as_ref()) {
                Some(Keying::PublicKey { label: Some(label), .. }) => {
                    Ok(AttributeValue::String(label.as_bytes().to_vec()))
                }
                _ => Err(CryptError::new(ErrorCode::NotFound)),
            },
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn set_attr(&mut self, id: AttributeId, value: AttrInput, _env: &AttrEnv<'_>) -> CryptResult<()> {
        match id {
            AttributeId::ATTRIBUTE_BUFFERSIZE => {
                self.ensure_unstarted()?;
                self.buffer_size = value.int()? as usize;
                Ok(())
            }
            AttributeId::ATTRIBUTE_CURRENT_GROUP | AttributeId::ATTRIBUTE_CURRENT => {
                let movement = CursorMove::from_raw(value.int()?).ok_or_else(|| CryptError::new(ErrorCode::Param3))?;
                let listed = usize::from(self.required.is_some());
                movement
                    .apply(Some(0), listed)
                    .map(|_| ())
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
            }
            _ => match self.direction {
                Direction::Envelope => self.set_envelope_attr(id, value),
                Direction::Deenvelope => self.set_deenvelope_attr(id, value),
            },
        }
    }

    fn delete_attr(&mut self, _id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<()> {
        Err(CryptError::new(ErrorCode::NotAvail))
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.started {
            Lifecycle::Active
        } else {
            Lifecycle::Configured
        }
    }
}
