//! Envelope wire format.
//!
//! ```text
//! "CKE1" | u32 BE header length | header (JSON)
//! segment*      u32 BE length (high bit set on the final segment) | sealed record
//! trailer?      "CKES" | u32 BE length | trailer (JSON)
//! ```
//!
//! Segments are [`RecordCipher`] records keyed by the content key, with the
//! BLAKE3 digest of the header bytes as extra associated data. A signed
//! envelope ends with a trailer holding an Ed25519 signature over a BLAKE3
//! hash of the header bytes and all plaintext.
//!
//! [`RecordCipher`]: cryptkit_crypto::RecordCipher

use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use cryptkit_crypto::PublicKeyWrap;
use serde::{Deserialize, Serialize};

pub const ENVELOPE_MAGIC: &[u8; 4] = b"CKE1";
pub const TRAILER_MAGIC: &[u8; 4] = b"CKES";
pub const FORMAT_VERSION: u32 = 1;

/// Plaintext bytes per segment.
pub const SEGMENT_SIZE: usize = 4096;
pub const FINAL_FLAG: u32 = 0x8000_0000;
pub const MAX_HEADER: usize = 16 * 1024;
pub const MAX_SEGMENT: usize = 2 * SEGMENT_SIZE + 1024;

pub const KEYING_AAD: &[u8] = b"cryptkit envelope content key";
pub const SIGNATURE_CONTEXT: &[u8] = b"cryptkit envelope signature\0";
pub const PLAIN_KEY_CONTEXT: &str = "cryptkit envelope unkeyed 2024-01";
pub const SESSION_KEY_CONTEXT: &str = "cryptkit envelope session key 2024-01";

/// How the content key is protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Keying {
    Password {
        salt: Vec<u8>,
        iterations: u32,
        wrapped: Vec<u8>,
    },
    Key {
        key_id: String,
        wrapped: Vec<u8>,
    },
    PublicKey {
        key_id: String,
        label: Option<String>,
        wrap: PublicKeyWrap,
    },
    /// The content key is derived from a shared session key.
    Session {
        key_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u32,
    pub content_type: i32,
    pub compressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<i64>,
    pub nonce_prefix: [u8; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keying: Option<Keying>,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    pub key_id: String,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<u8>>,
}

fn bad(detail: &str) -> CryptError {
    CryptError::new(ErrorCode::BadData).with_detail(detail.to_string())
}

fn framed(magic: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(magic);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Split a framed item off the front of `data`. `Ok(None)` means more
/// input is needed.
fn take_framed<'a>(magic: &[u8; 4], data: &'a [u8], limit: usize) -> CryptResult<Option<(&'a [u8], usize)>> {
    let probe = data.len().min(4);
    if data[..probe] != magic[..probe] {
        return Err(bad("unrecognised envelope data"));
    }
    if data.len() < 8 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
    if len > limit {
        return Err(bad("envelope item too large"));
    }
    Ok(data.get(8..8 + len).map(|body| (body, 8 + len)))
}

/// Encoded header bytes, as framed on the wire and as fed to the hashes.
pub fn encode_header(header: &Header) -> CryptResult<Vec<u8>> {
    serde_json::to_vec(header).map_err(|e| CryptError::new(ErrorCode::Failed).with_detail(e.to_string()))
}

pub fn frame_header(encoded: &[u8]) -> Vec<u8> {
    framed(ENVELOPE_MAGIC, encoded)
}

/// Parse a header from the start of `data`, returning it with its raw
/// bytes and the number of input bytes it spans.
pub fn parse_header(data: &[u8]) -> CryptResult<Option<(Header, Vec<u8>, usize)>> {
    let Some((body, used)) = take_framed(ENVELOPE_MAGIC, data, MAX_HEADER)? else {
        return Ok(None);
    };
    let header: Header = serde_json::from_slice(body).map_err(|e| bad(&format!("envelope header: {e}")))?;
    if header.version != FORMAT_VERSION {
        return Err(bad("unsupported envelope version"));
    }
    Ok(Some((header, body.to_vec(), used)))
}

pub fn frame_segment(sealed: &[u8], final_segment: bool) -> Vec<u8> {
    let mut len = sealed.len() as u32;
    if final_segment {
        len |= FINAL_FLAG;
    }
    let mut out = Vec::with_capacity(4 + sealed.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(sealed);
    out
}

/// Split the next segment off `data`: the sealed body, whether it is final
/// and the bytes consumed.
pub fn parse_segment(data: &[u8]) -> CryptResult<Option<(&[u8], bool, usize)>> {
    if data.len() < 4 {
        return Ok(None);
    }
    let raw = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let len = (raw & !FINAL_FLAG) as usize;
    if len > MAX_SEGMENT {
        return Err(bad("envelope segment too large"));
    }
    Ok(data.get(4..4 + len).map(|body| (body, raw & FINAL_FLAG != 0, 4 + len)))
}

pub fn frame_trailer(trailer: &Trailer) -> CryptResult<Vec<u8>> {
    let body = serde_json::to_vec(trailer).map_err(|e| CryptError::new(ErrorCode::Failed).with_detail(e.to_string()))?;
    Ok(framed(TRAILER_MAGIC, &body))
}

pub fn parse_trailer(data: &[u8]) -> CryptResult<Option<(Trailer, usize)>> {
    let Some((body, used)) = take_framed(TRAILER_MAGIC, data, MAX_HEADER)? else {
        return Ok(None);
    };
    let trailer = serde_json::from_slice(body).map_err(|e| bad(&format!("envelope trailer: {e}")))?;
    Ok(Some((trailer, used)))
}

/// Message signed in a trailer.
pub fn signed_message(content_hash: &[u8; 32]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNATURE_CONTEXT.len() + 32);
    message.extend_from_slice(SIGNATURE_CONTEXT);
    message.extend_from_slice(content_hash);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_header_waits_for_more() {
        let header = Header {
            version: FORMAT_VERSION,
            content_type: 1,
            compressed: false,
            data_size: None,
            nonce_prefix: [1, 2, 3, 4],
            keying: None,
            signed: false,
        };
        let framed = frame_header(&encode_header(&header).unwrap());
        assert!(parse_header(&framed[..3]).unwrap().is_none());
        assert!(parse_header(&framed[..framed.len() - 1]).unwrap().is_none());
        let (parsed, _, used) = parse_header(&framed).unwrap().unwrap();
        assert_eq!(parsed, header);
        assert_eq!(used, framed.len());
    }

    #[test]
    fn test_wrong_magic_is_bad_data() {
        assert_eq!(parse_header(b"XK").unwrap_err().kind(), ErrorCode::BadData);
        assert_eq!(parse_trailer(b"CKE1\0\0\0\0").unwrap_err().kind(), ErrorCode::BadData);
    }

    #[test]
    fn test_segment_final_flag() {
        let framed = frame_segment(&[9u8; 20], true);
        let (body, final_segment, used) = parse_segment(&framed).unwrap().unwrap();
        assert!(final_segment);
        assert_eq!(body.len(), 20);
        assert_eq!(used, 24);
        assert!(parse_segment(&framed[..10]).unwrap().is_none());
    }
}
