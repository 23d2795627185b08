//! Key export/import and signature mechanisms.
//!
//! Blobs are `magic | u32 BE length | JSON body`. Exported keys use the
//! magic `CKK1`, signatures `CKS1`. Binary fields are base64 so a blob's
//! length depends only on the algorithms involved.
//!
//! Errors name argument positions as the kernel calls see them: the blob or
//! output buffer is 1, the wrapping/signing/checking key 2 and the session
//! key or hash context 3.

use crate::certificate::PublicKeyInfo;
use crate::context::{KeyMaterial, KeySnapshot};
use crate::types::{ObjectInfo, ObjectType};
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use cryptkit_crypto::{keyex, signing, Algorithm, AlgorithmClass, PublicKeyWrap, RandomPool};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const KEY_MAGIC: &[u8; 4] = b"CKK1";
pub const SIGNATURE_MAGIC: &[u8; 4] = b"CKS1";

const KEK_CONTEXT: &str = "cryptkit key export 2024-01";
const SIGNATURE_CONTEXT: &[u8] = b"cryptkit signature 2024-01\0";
const MAX_BLOB: usize = 64 * 1024;

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KeyBlob {
    Encrypted {
        algorithm: i32,
        kek_id: String,
        #[serde(with = "b64")]
        sealed: Vec<u8>,
    },
    PkcEncrypted {
        algorithm: i32,
        recipient_id: String,
        #[serde(with = "b64")]
        ephemeral: Vec<u8>,
        #[serde(with = "b64")]
        sealed: Vec<u8>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignatureBlob {
    algorithm: i32,
    hash_algorithm: i32,
    key_id: String,
    #[serde(with = "b64")]
    signature: Vec<u8>,
}

fn bad(detail: &str) -> CryptError {
    CryptError::new(ErrorCode::BadData).with_detail(detail.to_string())
}

fn frame<T: Serialize>(magic: &[u8; 4], body: &T) -> CryptResult<Vec<u8>> {
    let json = serde_json::to_vec(body).map_err(|e| CryptError::new(ErrorCode::Failed).with_detail(e.to_string()))?;
    let mut out = Vec::with_capacity(8 + json.len());
    out.extend_from_slice(magic);
    out.extend_from_slice(&(json.len() as u32).to_be_bytes());
    out.extend_from_slice(&json);
    Ok(out)
}

/// Parse a framed blob, returning the body and the total framed length.
fn unframe<'de, T: Deserialize<'de>>(magic: &[u8; 4], data: &'de [u8]) -> CryptResult<(T, usize)> {
    if data.len() < 8 || &data[..4] != magic {
        return Err(bad("unrecognised object"));
    }
    let len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
    if len > MAX_BLOB {
        return Err(bad("object too large"));
    }
    let body = data.get(8..8 + len).ok_or_else(|| CryptError::new(ErrorCode::Underflow))?;
    let value = serde_json::from_slice(body).map_err(|e| bad(&format!("object body: {e}")))?;
    Ok((value, 8 + len))
}

fn kek_for(secret: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(blake3::derive_key(KEK_CONTEXT, secret))
}

fn wrap_aad(algorithm: i32) -> [u8; 8] {
    let mut aad = *b"CKK1\0\0\0\0";
    aad[4..].copy_from_slice(&algorithm.to_be_bytes());
    aad
}

/// Wrap the session key `session` under `wrap`.
pub fn export_key(wrap: &KeySnapshot, session: &KeySnapshot, random: &mut RandomPool) -> CryptResult<Vec<u8>> {
    let secret = match &session.material {
        KeyMaterial::Secret(secret) => secret,
        _ => return Err(CryptError::param(3)),
    };
    if session.non_exportable {
        return Err(CryptError::new(ErrorCode::Permission).with_detail("session key is not exportable"));
    }
    let algorithm = session.algorithm.id();
    let blob = match &wrap.material {
        KeyMaterial::Secret(kek_secret) => {
            let kek = kek_for(kek_secret);
            KeyBlob::Encrypted {
                algorithm,
                kek_id: hex::encode(wrap.key_id()),
                sealed: keyex::seal(&kek, random, secret, &wrap_aad(algorithm))?,
            }
        }
        KeyMaterial::Agreement(pair) => {
            let wrapped = pair.wrap(random, secret, &wrap_aad(algorithm))?;
            KeyBlob::PkcEncrypted {
                algorithm,
                recipient_id: hex::encode(pair.key_id()),
                ephemeral: wrapped.ephemeral_public.to_vec(),
                sealed: wrapped.sealed,
            }
        }
        KeyMaterial::Signature(_) => return Err(CryptError::param(2)),
    };
    frame(KEY_MAGIC, &blob)
}

/// Recover a session key. Returns the session algorithm and raw key.
pub fn import_key(data: &[u8], unwrap: &KeySnapshot) -> CryptResult<(Algorithm, Zeroizing<Vec<u8>>)> {
    let (blob, _) = unframe::<KeyBlob>(KEY_MAGIC, data).map_err(|e| match e.kind() {
        ErrorCode::BadData | ErrorCode::Underflow => CryptError::new(ErrorCode::BadData).with_detail("not an exported key"),
        _ => e,
    })?;
    let expected_id = hex::encode(unwrap.key_id());
    let (algorithm, secret) = match (blob, &unwrap.material) {
        (KeyBlob::Encrypted { algorithm, kek_id, sealed }, KeyMaterial::Secret(kek_secret)) => {
            if kek_id != expected_id {
                return Err(CryptError::new(ErrorCode::WrongKey));
            }
            let kek = kek_for(kek_secret);
            (algorithm, keyex::open(&kek, &sealed, &wrap_aad(algorithm))?)
        }
        (
            KeyBlob::PkcEncrypted {
                algorithm,
                recipient_id,
                ephemeral,
                sealed,
            },
            KeyMaterial::Agreement(pair),
        ) => {
            if recipient_id != expected_id {
                return Err(CryptError::new(ErrorCode::WrongKey));
            }
            if !pair.has_private() {
                return Err(CryptError::new(ErrorCode::NotInited).with_detail("unwrap key has no private half"));
            }
            let wrap = PublicKeyWrap {
                ephemeral_public: ephemeral.try_into().map_err(|_| bad("bad ephemeral key"))?,
                sealed,
            };
            (algorithm, pair.unwrap(&wrap, &wrap_aad(algorithm))?)
        }
        _ => return Err(CryptError::param(2)),
    };
    let algorithm = Algorithm::from_raw(algorithm).ok_or_else(|| bad("unknown session algorithm"))?;
    Ok((algorithm, secret))
}

fn signed_message(hash_algorithm: Algorithm, hash: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNATURE_CONTEXT.len() + 4 + hash.len());
    message.extend_from_slice(SIGNATURE_CONTEXT);
    message.extend_from_slice(&hash_algorithm.id().to_be_bytes());
    message.extend_from_slice(hash);
    message
}

/// Sign a finalised hash value.
pub fn create_signature(signer: &KeySnapshot, hash_algorithm: Algorithm, hash: &[u8]) -> CryptResult<Vec<u8>> {
    let pair = match &signer.material {
        KeyMaterial::Signature(pair) => pair,
        _ => return Err(CryptError::param(2)),
    };
    if !pair.has_private() {
        return Err(CryptError::new(ErrorCode::NotInited).with_detail("signing key has no private half"));
    }
    if hash_algorithm.class() != AlgorithmClass::Hash {
        return Err(CryptError::param(3));
    }
    let signature = pair.sign(&signed_message(hash_algorithm, hash))?;
    frame(
        SIGNATURE_MAGIC,
        &SignatureBlob {
            algorithm: signer.algorithm.id(),
            hash_algorithm: hash_algorithm.id(),
            key_id: hex::encode(pair.key_id()),
            signature: signature.to_vec(),
        },
    )
}

/// Public half used to check a signature.
pub enum Verifier<'a> {
    Key(&'a KeySnapshot),
    Certificate(&'a PublicKeyInfo),
}

impl Verifier<'_> {
    fn public(&self) -> CryptResult<(i32, Vec<u8>, [u8; 8])> {
        match self {
            Verifier::Key(key) => match &key.material {
                KeyMaterial::Signature(pair) => {
                    Ok((key.algorithm.id(), pair.public_bytes().to_vec(), pair.key_id()))
                }
                _ => Err(CryptError::param(2)),
            },
            Verifier::Certificate(info) => Ok((info.algorithm, info.key.clone(), info.key_id())),
        }
    }
}

/// Check `signature` over a hash value. The hash algorithm must match the
/// one recorded in the signature.
pub fn check_signature(
    signature: &[u8],
    verifier: Verifier<'_>,
    hash_algorithm: Algorithm,
    hash: &[u8],
) -> CryptResult<()> {
    let (blob, _) = unframe::<SignatureBlob>(SIGNATURE_MAGIC, signature)?;
    let (algorithm, public, key_id) = verifier.public()?;
    if algorithm != Algorithm::Ed25519.id() {
        return Err(CryptError::param(2));
    }
    if blob.key_id != hex::encode(key_id) {
        return Err(CryptError::new(ErrorCode::WrongKey).with_detail("signature made with a different key"));
    }
    if blob.hash_algorithm != hash_algorithm.id() {
        return Err(CryptError::param(3));
    }
    signing::verify(&public, &signed_message(hash_algorithm, hash), &blob.signature)?;
    Ok(())
}

/// Identify an exported key or signature blob.
pub fn query_object(data: &[u8]) -> CryptResult<ObjectInfo> {
    let key_id = |hex_id: &str| -> CryptResult<[u8; 8]> {
        let raw = hex::decode(hex_id).map_err(|_| bad("bad key identifier"))?;
        raw.try_into().map_err(|_| bad("bad key identifier"))
    };
    if data.starts_with(KEY_MAGIC) {
        let (blob, size) = unframe::<KeyBlob>(KEY_MAGIC, data)?;
        return Ok(match blob {
            KeyBlob::Encrypted { algorithm, kek_id, .. } => ObjectInfo {
                object_type: ObjectType::EncryptedKey,
                algorithm,
                hash_algorithm: 0,
                size,
                key_id: key_id(&kek_id)?,
            },
            KeyBlob::PkcEncrypted { algorithm, recipient_id, .. } => ObjectInfo {
                object_type: ObjectType::PkcEncryptedKey,
                algorithm,
                hash_algorithm: 0,
                size,
                key_id: key_id(&recipient_id)?,
            },
        });
    }
    if data.starts_with(SIGNATURE_MAGIC) {
        let (blob, size) = unframe::<SignatureBlob>(SIGNATURE_MAGIC, data)?;
        return Ok(ObjectInfo {
            object_type: ObjectType::Signature,
            algorithm: blob.algorithm,
            hash_algorithm: blob.hash_algorithm,
            size,
            key_id: key_id(&blob.key_id)?,
        });
    }
    Err(bad("unrecognised object"))
}
