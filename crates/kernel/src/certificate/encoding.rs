//! Certificate wire encodings.
//!
//! Binary certificate:
//!
//! ```text
//! "CKC1" | type u8 | tbs_len u32 BE | tbs (JSON) | sig_len u16 BE | signature
//! ```
//!
//! Binary chain: `"CKCC" | count u16 BE | (len u32 BE | certificate)*`, leaf
//! first. The text forms wrap either binary form in base64 armour.

use super::Certificate;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cryptkit_core::{CryptError, CryptResult, ErrorCode};

pub const CERT_MAGIC: &[u8; 4] = b"CKC1";
pub const CHAIN_MAGIC: &[u8; 4] = b"CKCC";

pub const CERT_LABEL: &str = "CERTIFICATE";
pub const CHAIN_LABEL: &str = "CERTIFICATE CHAIN";

const MAX_CHAIN: usize = 16;
const LINE_WIDTH: usize = 64;

fn bad(detail: &str) -> CryptError {
    CryptError::new(ErrorCode::BadData).with_detail(detail.to_string())
}

/// Encode one signed certificate object.
pub fn encode_certificate(cert: &Certificate) -> CryptResult<Vec<u8>> {
    let tbs = cert.tbs_bytes()?;
    let signature = cert
        .signature
        .as_deref()
        .ok_or_else(|| CryptError::new(ErrorCode::NotInited))?;
    let mut out = Vec::with_capacity(4 + 1 + 4 + tbs.len() + 2 + signature.len());
    out.extend_from_slice(CERT_MAGIC);
    out.push(cert.tbs.cert_type as u8);
    out.extend_from_slice(&(tbs.len() as u32).to_be_bytes());
    out.extend_from_slice(&tbs);
    out.extend_from_slice(&(signature.len() as u16).to_be_bytes());
    out.extend_from_slice(signature);
    Ok(out)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> CryptResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| bad("length overflow"))?;
        let slice = self.data.get(self.pos..end).ok_or_else(|| bad("truncated certificate"))?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> CryptResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> CryptResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Decode one certificate, requiring that it spans all of `data`.
pub fn decode_certificate(data: &[u8]) -> CryptResult<Certificate> {
    let mut reader = Reader { data, pos: 0 };
    if reader.take(4)? != CERT_MAGIC {
        return Err(bad("not a certificate"));
    }
    let cert_type = reader.take(1)?[0];
    let tbs_len = reader.u32()? as usize;
    let tbs = reader.take(tbs_len)?.to_vec();
    let sig_len = reader.u16()? as usize;
    let signature = reader.take(sig_len)?.to_vec();
    if reader.pos != data.len() {
        return Err(bad("trailing data after certificate"));
    }
    let cert = Certificate::from_encoded(tbs, signature)?;
    if cert.tbs.cert_type as u8 != cert_type {
        return Err(bad("certificate type mismatch"));
    }
    Ok(cert)
}

pub fn encode_chain(members: &[Certificate]) -> CryptResult<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(CHAIN_MAGIC);
    out.extend_from_slice(&(members.len() as u16).to_be_bytes());
    for cert in members {
        let encoded = encode_certificate(cert)?;
        out.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
        out.extend_from_slice(&encoded);
    }
    Ok(out)
}

pub fn decode_chain(data: &[u8]) -> CryptResult<Vec<Certificate>> {
    let mut reader = Reader { data, pos: 0 };
    if reader.take(4)? != CHAIN_MAGIC {
        return Err(bad("not a certificate chain"));
    }
    let count = reader.u16()? as usize;
    if count == 0 || count > MAX_CHAIN {
        return Err(bad("bad chain length"));
    }
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.u32()? as usize;
        members.push(decode_certificate(reader.take(len)?)?);
    }
    if reader.pos != data.len() {
        return Err(bad("trailing data after chain"));
    }
    Ok(members)
}

/// Wrap binary data in base64 armour.
pub fn armour(label: &str, data: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(data);
    let mut out = format!("-----BEGIN {label}-----\n");
    for line in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out.into_bytes()
}

/// Strip base64 armour, returning the label and the decoded body.
pub fn dearmour(data: &[u8]) -> CryptResult<(String, Vec<u8>)> {
    let text = std::str::from_utf8(data).map_err(|_| bad("armour is not text"))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines.next().ok_or_else(|| bad("empty armour"))?;
    let label = header
        .strip_prefix("-----BEGIN ")
        .and_then(|rest| rest.strip_suffix("-----"))
        .ok_or_else(|| bad("missing armour header"))?
        .to_string();
    let footer = format!("-----END {label}-----");
    let mut body = String::new();
    let mut closed = false;
    for line in lines {
        if line == footer {
            closed = true;
            break;
        }
        body.push_str(line);
    }
    if !closed {
        return Err(bad("missing armour footer"));
    }
    let decoded = STANDARD.decode(body.as_bytes()).map_err(|_| bad("bad base64"))?;
    Ok((label, decoded))
}

/// Decode any supported form: binary or armoured, single or chain.
/// Returns the members leaf first and whether the input was a chain.
pub fn decode_any(data: &[u8]) -> CryptResult<(Vec<Certificate>, bool)> {
    let binary;
    let data = if data.starts_with(b"-----BEGIN ") {
        binary = dearmour(data)?.1;
        binary.as_slice()
    } else {
        data
    };
    if data.starts_with(CHAIN_MAGIC) {
        Ok((decode_chain(data)?, true))
    } else if data.starts_with(CERT_MAGIC) {
        Ok((vec![decode_certificate(data)?], false))
    } else {
        Err(bad("unrecognised certificate encoding"))
    }
}
