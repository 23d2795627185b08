//! Certificates, certificate chains, requests and CRLs.
//!
//! A certificate object is built by setting attributes on an unsigned
//! to-be-signed body, then signed once. Signing freezes the body: the exact
//! bytes that were signed are kept alongside the parsed form, so checking
//! never depends on re-serialising. Chains keep their members leaf first.

mod dn;
pub mod encoding;
mod object;

pub use dn::{DistinguishedName, DnSelector};
pub use object::{CertificateObject, CheckAgainst};

use crate::context::KeySnapshot;
use crate::types::CertType;
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use cryptkit_crypto::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CERT_VERSION: i32 = 3;
pub const SECONDS_PER_DAY: i64 = 86_400;
pub const SERIAL_SIZE: usize = 16;

/// Seconds since the Unix epoch.
pub fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    pub algorithm: i32,
    pub key: Vec<u8>,
}

impl PublicKeyInfo {
    pub fn from_key(key: &KeySnapshot) -> Option<Self> {
        key.material.public_bytes().map(|public| Self {
            algorithm: key.algorithm.id(),
            key: public.to_vec(),
        })
    }

    pub fn key_id(&self) -> [u8; 8] {
        cryptkit_crypto::key_id(&self.key)
    }

    /// Verify an Ed25519 signature made by this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptResult<()> {
        if Algorithm::from_raw(self.algorithm) != Some(Algorithm::Ed25519) {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        cryptkit_crypto::signing::verify(&self.key, message, signature)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomExtension {
    pub critical: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_usage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_len: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Extended key usage attribute ids.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub ext_key_usage: BTreeSet<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_key_id: Option<Vec<u8>>,
    /// Caller-defined extensions keyed by dotted OID.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, CustomExtension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub serial: Vec<u8>,
    pub revoked_at: i64,
    pub reason: i32,
}

/// The signed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TbsCertificate {
    pub cert_type: CertType,
    pub version: i32,
    #[serde(default)]
    pub serial: Vec<u8>,
    #[serde(default)]
    pub subject: DistinguishedName,
    #[serde(default)]
    pub issuer: DistinguishedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKeyInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this_update: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_update: Option<i64>,
    #[serde(default)]
    pub self_signed: bool,
    #[serde(default)]
    pub extensions: Extensions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<RevocationEntry>,
}

impl TbsCertificate {
    pub fn new(cert_type: CertType) -> Self {
        Self {
            cert_type,
            version: CERT_VERSION,
            serial: Vec::new(),
            subject: DistinguishedName::default(),
            issuer: DistinguishedName::default(),
            public_key: None,
            valid_from: None,
            valid_to: None,
            this_update: None,
            next_update: None,
            self_signed: false,
            extensions: Extensions::default(),
            entries: Vec::new(),
        }
    }
}

/// One certificate-like object: a body plus, once signed, its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub tbs: TbsCertificate,
    /// Bytes the signature covers. Present once signed or imported.
    encoded_tbs: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

impl Certificate {
    pub fn blank(cert_type: CertType) -> Self {
        Self {
            tbs: TbsCertificate::new(cert_type),
            encoded_tbs: None,
            signature: None,
        }
    }

    /// Rebuild a certificate from its encoded body and signature.
    pub fn from_encoded(encoded_tbs: Vec<u8>, signature: Vec<u8>) -> CryptResult<Self> {
        let tbs: TbsCertificate = serde_json::from_slice(&encoded_tbs).map_err(|e| {
            CryptError::new(ErrorCode::BadData).with_detail(format!("certificate body: {e}"))
        })?;
        if !tbs.cert_type.is_supported() {
            return Err(CryptError::new(ErrorCode::BadData).with_detail("unsupported certificate type"));
        }
        Ok(Self {
            tbs,
            encoded_tbs: Some(encoded_tbs),
            signature: Some(signature),
        })
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Encoded body: the signed bytes if signed, a fresh encoding otherwise.
    pub fn tbs_bytes(&self) -> CryptResult<Vec<u8>> {
        match &self.encoded_tbs {
            Some(bytes) => Ok(bytes.clone()),
            None => serde_json::to_vec(&self.tbs)
                .map_err(|e| CryptError::new(ErrorCode::Failed).with_detail(e.to_string())),
        }
    }

    /// Encode and sign the body with an Ed25519 key.
    pub(crate) fn sign_with(&mut self, signer: &KeySnapshot) -> CryptResult<()> {
        let encoded = serde_json::to_vec(&self.tbs)
            .map_err(|e| CryptError::new(ErrorCode::Failed).with_detail(e.to_string()))?;
        let signature = signer.signer()?.sign(&encoded)?;
        self.encoded_tbs = Some(encoded);
        self.signature = Some(signature.to_vec());
        Ok(())
    }

    /// Check the signature against an issuer key.
    pub fn verify_with(&self, issuer: &PublicKeyInfo) -> CryptResult<()> {
        let (tbs, signature) = match (&self.encoded_tbs, &self.signature) {
            (Some(tbs), Some(signature)) => (tbs, signature),
            _ => return Err(CryptError::new(ErrorCode::NotInited)),
        };
        issuer.verify(tbs, signature)
    }

    /// Digest of the full encoded certificate.
    pub fn fingerprint(&self, algorithm: Algorithm) -> CryptResult<Vec<u8>> {
        if !self.is_signed() {
            return Err(CryptError::new(ErrorCode::NotInited));
        }
        let encoded = encoding::encode_certificate(self)?;
        Ok(cryptkit_crypto::digest(algorithm, &encoded)?)
    }

    pub fn subject_key_id(&self) -> Option<[u8; 8]> {
        self.tbs.public_key.as_ref().map(PublicKeyInfo::key_id)
    }

    pub fn is_ca(&self) -> bool {
        self.tbs.extensions.ca == Some(true)
    }

    /// Whether `now` lies inside the validity period. Objects without a
    /// validity period (requests, CRLs) are always current.
    pub fn is_current(&self, now: i64) -> bool {
        let after_start = self.tbs.valid_from.map_or(true, |from| now >= from);
        let before_end = self.tbs.valid_to.map_or(true, |to| now <= to);
        after_start && before_end
    }
}

/// Copy of a certificate object, taken so another object can use it
/// without holding the certificate's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSnapshot {
    pub cert_type: CertType,
    /// Leaf first.
    pub members: Vec<Certificate>,
}

impl CertSnapshot {
    pub fn leaf(&self) -> &Certificate {
        &self.members[0]
    }

    pub fn public_key(&self) -> Option<&PublicKeyInfo> {
        self.leaf().tbs.public_key.as_ref()
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.leaf().tbs.subject
    }

    pub fn is_signed(&self) -> bool {
        self.leaf().is_signed()
    }

    /// Binary encoding of the leaf.
    pub fn encode_leaf(&self) -> CryptResult<Vec<u8>> {
        encoding::encode_certificate(self.leaf())
    }

    /// Binary chain encoding of every member.
    pub fn encode_all(&self) -> CryptResult<Vec<u8>> {
        encoding::encode_chain(&self.members)
    }
}

/// Check a dotted-decimal OID such as `1.3.6.1.4.1.3029.1`.
pub fn validate_oid(oid: &str) -> CryptResult<()> {
    let arcs: Vec<&str> = oid.split('.').collect();
    let well_formed = arcs.len() >= 2
        && arcs
            .iter()
            .all(|arc| !arc.is_empty() && arc.len() <= 9 && arc.bytes().all(|b| b.is_ascii_digit()));
    let first_ok = arcs.first().and_then(|a| a.parse::<u32>().ok()).is_some_and(|a| a <= 2);
    if !well_formed || !first_ok {
        return Err(CryptError::param(2).with_detail(format!("bad OID {oid:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::KeyMaterial;

    fn signing_key(seed: u8) -> KeySnapshot {
        KeySnapshot {
            algorithm: Algorithm::Ed25519,
            label: None,
            material: KeyMaterial::from_seed(Algorithm::Ed25519, &[seed; 32]).unwrap(),
            non_exportable: false,
            attached: None,
        }
    }

    #[test]
    fn test_sign_keeps_exact_bytes() {
        let key = signing_key(1);
        let mut cert = Certificate::blank(CertType::Certificate);
        cert.tbs.subject = DistinguishedName::with_common_name("x");
        cert.tbs.public_key = PublicKeyInfo::from_key(&key);
        cert.sign_with(&key).unwrap();

        let public = PublicKeyInfo::from_key(&key).unwrap();
        cert.verify_with(&public).unwrap();

        let encoded = encoding::encode_certificate(&cert).unwrap();
        let decoded = encoding::decode_certificate(&encoded).unwrap();
        assert_eq!(decoded, cert);
        decoded.verify_with(&public).unwrap();
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let mut cert = Certificate::blank(CertType::Certificate);
        cert.sign_with(&signing_key(1)).unwrap();
        let other = PublicKeyInfo::from_key(&signing_key(2)).unwrap();
        assert_eq!(cert.verify_with(&other).unwrap_err().kind(), ErrorCode::Signature);
    }

    #[test]
    fn test_unsigned_has_no_fingerprint() {
        let cert = Certificate::blank(CertType::Certificate);
        assert_eq!(
            cert.fingerprint(Algorithm::Blake3).unwrap_err().kind(),
            ErrorCode::NotInited
        );
    }

    #[test]
    fn test_validity_window() {
        let mut cert = Certificate::blank(CertType::Certificate);
        assert!(cert.is_current(0));
        cert.tbs.valid_from = Some(100);
        cert.tbs.valid_to = Some(200);
        assert!(!cert.is_current(99));
        assert!(cert.is_current(150));
        assert!(!cert.is_current(201));
    }

    #[test]
    fn test_oid_validation() {
        validate_oid("1.3.6.1.4.1.3029.1").unwrap();
        validate_oid("2.5").unwrap();
        for bad in ["", "1", "3.1", "1..2", "1.x", "1.2."] {
            assert_eq!(validate_oid(bad).unwrap_err().kind(), ErrorCode::Param2, "{bad}");
        }
    }
}
