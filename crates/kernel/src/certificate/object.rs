//! Certificate object state and attribute handling.

use super::encoding::{self, CERT_LABEL, CHAIN_LABEL};
use super::{
    unix_time, validate_oid, CertSnapshot, Certificate, CustomExtension, DistinguishedName,
    DnSelector, PublicKeyInfo, RevocationEntry, SECONDS_PER_DAY,
};
use crate::attribute::{AttributeId, AttributeValue, CursorMove};
use crate::context::KeySnapshot;
use crate::object::{AttrEnv, AttrInput, AttributeHandler, Lifecycle, ObjectRef};
use crate::types::{CertFormat, CertType, CrlReason};
use cryptkit_core::{CryptError, CryptResult, ErrorCode, ErrorType, CRYPT_UNUSED};
use cryptkit_crypto::Algorithm;
use tracing::debug;

// Extension group identifiers reported through ATTRIBUTE_CURRENT_GROUP.
const GROUP_SUBJECTALTNAME: i32 = 2107;
const GROUP_SUBJECTKEYIDENTIFIER: i32 = 2241;
const GROUP_KEYUSAGE: i32 = 2242;
const GROUP_BASICCONSTRAINTS: i32 = 2248;
const GROUP_AUTHORITYKEYIDENTIFIER: i32 = 2279;
const GROUP_EXTKEYUSAGE: i32 = 2292;

const EXT_KEY_USAGES: [AttributeId; 6] = [
    AttributeId::CERTINFO_EXTKEY_SERVERAUTH,
    AttributeId::CERTINFO_EXTKEY_CLIENTAUTH,
    AttributeId::CERTINFO_EXTKEY_CODESIGNING,
    AttributeId::CERTINFO_EXTKEY_EMAILPROTECTION,
    AttributeId::CERTINFO_EXTKEY_TIMESTAMPING,
    AttributeId::CERTINFO_EXTKEY_OCSPSIGNING,
];

/// What `check` verifies a certificate object against.
pub enum CheckAgainst<'a> {
    /// Self-signed certificates and complete chains.
    None,
    Key(&'a KeySnapshot),
    /// An issuer certificate, or a CRL.
    Certificate(&'a CertSnapshot),
}

fn absent(id: AttributeId) -> CryptError {
    CryptError::new(ErrorCode::Invalid).with_locus(id.raw(), ErrorType::AttrAbsent)
}

fn time_value(value: Option<i64>) -> CryptResult<AttributeValue> {
    let value = value.ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
    i32::try_from(value)
        .map(AttributeValue::Int)
        .map_err(|_| CryptError::new(ErrorCode::Overflow))
}

fn string_value(value: Option<&str>) -> CryptResult<AttributeValue> {
    value
        .map(|s| AttributeValue::String(s.as_bytes().to_vec()))
        .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
}

fn set_once(slot: &mut Option<String>, id: AttributeId, value: String) -> CryptResult<()> {
    if slot.is_some() {
        return Err(CryptError::new(ErrorCode::Inited).with_locus(id.raw(), ErrorType::AttrPresent));
    }
    *slot = Some(value);
    Ok(())
}

fn take<T>(slot: &mut Option<T>) -> CryptResult<()> {
    slot.take()
        .map(|_| ())
        .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
}

pub struct CertificateObject {
    cert_type: CertType,
    /// Leaf first. Never empty.
    members: Vec<Certificate>,
    member_cursor: usize,
    entry_cursor: Option<usize>,
    dn_selector: DnSelector,
    group_cursor: Option<i32>,
    attr_cursor: Option<i32>,
    validity_days: i32,
}

impl CertificateObject {
    pub fn new(cert_type: CertType, validity_days: i32) -> CryptResult<Self> {
        if !cert_type.is_supported() {
            return Err(CryptError::new(ErrorCode::NotAvail));
        }
        Ok(Self::with_members(cert_type, vec![Certificate::blank(cert_type)], validity_days))
    }

    fn with_members(cert_type: CertType, members: Vec<Certificate>, validity_days: i32) -> Self {
        Self {
            cert_type,
            members,
            member_cursor: 0,
            entry_cursor: None,
            dn_selector: DnSelector::Subject,
            group_cursor: None,
            attr_cursor: None,
            validity_days,
        }
    }

    /// Certificate object from encoded data in any supported format.
    pub fn import(data: &[u8]) -> CryptResult<Self> {
        let (members, chain) = encoding::decode_any(data)?;
        let cert_type = if chain {
            CertType::CertChain
        } else {
            members[0].tbs.cert_type
        };
        let mut object = Self::with_members(cert_type, members, 0);
        if !object.leaf().tbs.entries.is_empty() {
            object.entry_cursor = Some(0);
        }
        Ok(object)
    }

    /// Certificate object holding a copy taken from another object or a
    /// keyset entry.
    pub fn from_snapshot(snapshot: CertSnapshot) -> Self {
        let mut object = Self::with_members(snapshot.cert_type, snapshot.members, 0);
        if !object.leaf().tbs.entries.is_empty() {
            object.entry_cursor = Some(0);
        }
        object
    }

    /// Unsigned certificate carrying the subject, key and extensions of a
    /// verified certification request.
    pub fn from_request(request: &CertSnapshot, validity_days: i32) -> CryptResult<Self> {
        let leaf = request.leaf();
        if request.cert_type != CertType::CertRequest {
            return Err(CryptError::new(ErrorCode::Param3));
        }
        let public = leaf
            .tbs
            .public_key
            .as_ref()
            .ok_or_else(|| absent(AttributeId::CERTINFO_SUBJECTPUBLICKEYINFO))?;
        leaf.verify_with(public)?;

        let mut object = Self::new(CertType::Certificate, validity_days)?;
        let tbs = &mut object.members[0].tbs;
        tbs.subject = leaf.tbs.subject.clone();
        tbs.public_key = Some(public.clone());
        tbs.extensions = leaf.tbs.extensions.clone();
        tbs.extensions.authority_key_id = None;
        Ok(object)
    }

    /// Unsigned CRL listing `entries`.
    pub fn new_crl(entries: Vec<RevocationEntry>, validity_days: i32) -> CryptResult<Self> {
        let mut object = Self::new(CertType::Crl, validity_days)?;
        if !entries.is_empty() {
            object.entry_cursor = Some(0);
        }
        object.members[0].tbs.entries = entries;
        Ok(object)
    }

    pub fn cert_type(&self) -> CertType {
        self.cert_type
    }

    pub fn leaf(&self) -> &Certificate {
        &self.members[0]
    }

    pub fn members(&self) -> &[Certificate] {
        &self.members
    }

    pub fn is_signed(&self) -> bool {
        self.leaf().is_signed()
    }

    pub fn snapshot(&self) -> CertSnapshot {
        CertSnapshot {
            cert_type: self.cert_type,
            members: self.members.clone(),
        }
    }

    fn selected(&self) -> &Certificate {
        &self.members[self.member_cursor]
    }

    /// The leaf body, if it may still be modified.
    fn leaf_mut(&mut self) -> CryptResult<&mut Certificate> {
        if self.leaf().is_signed() {
            return Err(CryptError::new(ErrorCode::Permission).with_detail("certificate is signed"));
        }
        Ok(&mut self.members[0])
    }

    /// Subject DN of the leaf, rejecting writes aimed at the issuer DN.
    fn subject_mut(&mut self) -> CryptResult<&mut DistinguishedName> {
        if self.dn_selector == DnSelector::Issuer {
            return Err(CryptError::new(ErrorCode::Permission)
                .with_locus(AttributeId::CERTINFO_ISSUERNAME.raw(), ErrorType::Constraint));
        }
        Ok(&mut self.leaf_mut()?.tbs.subject)
    }

    fn selected_dn(&self) -> &DistinguishedName {
        match self.dn_selector {
            DnSelector::Subject => &self.selected().tbs.subject,
            DnSelector::Issuer => &self.selected().tbs.issuer,
        }
    }

    fn current_entry(&self) -> CryptResult<&RevocationEntry> {
        self.entry_cursor
            .and_then(|i| self.selected().tbs.entries.get(i))
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
    }

    fn current_entry_mut(&mut self) -> CryptResult<&mut RevocationEntry> {
        let index = self.entry_cursor.ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
        self.leaf_mut()?
            .tbs
            .entries
            .get_mut(index)
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
    }

    /// Sign the object.
    ///
    /// The issuer is taken from the signer's attached CA certificate; failing
    /// that a key matching the subject key makes the certificate self-signed,
    /// and a labelled key names the issuer by its label.
    pub fn sign(&mut self, signer: &KeySnapshot, now: i64, serial: Vec<u8>) -> CryptResult<()> {
        if self.is_signed() {
            return Err(CryptError::new(ErrorCode::Inited));
        }
        signer.signer()?;
        let signer_public = PublicKeyInfo::from_key(signer).ok_or_else(|| CryptError::new(ErrorCode::NotAvail))?;
        let validity = i64::from(self.validity_days.max(1)) * SECONDS_PER_DAY;
        let cert_type = self.cert_type;
        let mut extra_members = Vec::new();

        let leaf = &mut self.members[0];
        let tbs = &mut leaf.tbs;
        match cert_type {
            CertType::Certificate | CertType::CertChain | CertType::CertRequest => {
                if tbs.subject.is_empty() {
                    return Err(absent(AttributeId::CERTINFO_SUBJECTNAME));
                }
                if tbs.public_key.is_none() {
                    return Err(absent(AttributeId::CERTINFO_SUBJECTPUBLICKEYINFO));
                }
            }
            CertType::RequestRevocation => {
                if tbs.entries.is_empty() {
                    return Err(absent(AttributeId::CERTINFO_CERTIFICATE));
                }
            }
            _ => {}
        }
        let self_keyed = tbs.public_key.as_ref() == Some(&signer_public);

        match cert_type {
            CertType::CertRequest => {
                if !self_keyed {
                    return Err(CryptError::new(ErrorCode::WrongKey)
                        .with_detail("requests are signed with their own key"));
                }
                tbs.self_signed = true;
                tbs.issuer = tbs.subject.clone();
            }
            CertType::RequestRevocation => {}
            _ => {
                if tbs.self_signed && !self_keyed {
                    return Err(CryptError::new(ErrorCode::Invalid)
                        .with_locus(AttributeId::CERTINFO_SELFSIGNED.raw(), ErrorType::Constraint));
                }
                if let Some(ca) = signer.attached.as_ref().filter(|_| !tbs.self_signed) {
                    if !ca.leaf().is_ca() {
                        return Err(CryptError::new(ErrorCode::Invalid)
                            .with_locus(AttributeId::CERTINFO_CA.raw(), ErrorType::IssuerConstraint));
                    }
                    tbs.issuer = ca.subject().clone();
                    if cert_type == CertType::CertChain {
                        extra_members = ca.members.clone();
                    }
                } else if self_keyed {
                    tbs.self_signed = true;
                    tbs.issuer = tbs.subject.clone();
                } else if let Some(label) = signer.label.as_deref() {
                    tbs.issuer = DistinguishedName::with_common_name(label);
                } else {
                    return Err(absent(AttributeId::CERTINFO_ISSUERNAME));
                }
            }
        }

        if tbs.serial.is_empty() {
            tbs.serial = serial;
        }
        match cert_type {
            CertType::Crl => {
                let this_update = *tbs.this_update.get_or_insert(now);
                tbs.next_update.get_or_insert(this_update + validity);
            }
            CertType::Certificate | CertType::CertChain => {
                let from = *tbs.valid_from.get_or_insert(now);
                let to = *tbs.valid_to.get_or_insert(from + validity);
                if to <= from {
                    return Err(CryptError::new(ErrorCode::Invalid)
                        .with_locus(AttributeId::CERTINFO_VALIDTO.raw(), ErrorType::AttrValue));
                }
            }
            _ => {}
        }
        if !tbs.self_signed {
            tbs.extensions.authority_key_id = Some(signer.key_id().to_vec());
        }

        leaf.sign_with(signer)?;
        self.members.extend(extra_members);
        debug!(cert_type = ?cert_type, members = self.members.len(), "certificate signed");
        Ok(())
    }

    /// Verify the object's signatures, validity and revocation status.
    pub fn check(&self, against: CheckAgainst<'_>, now: i64) -> CryptResult<()> {
        if !self.is_signed() {
            return Err(CryptError::new(ErrorCode::NotInited));
        }
        match against {
            CheckAgainst::None => self.check_chain(now),
            CheckAgainst::Key(key) => {
                let public = PublicKeyInfo::from_key(key).ok_or_else(|| CryptError::param(2))?;
                self.leaf().verify_with(&public)?;
                self.check_validity(self.leaf(), now)
            }
            CheckAgainst::Certificate(other) if other.cert_type == CertType::Crl => {
                self.check_revocation(other)
            }
            CheckAgainst::Certificate(issuer) => {
                let leaf = self.leaf();
                let public = issuer.public_key().ok_or_else(|| CryptError::param(2))?;
                leaf.verify_with(public)?;
                if &leaf.tbs.issuer != issuer.subject() {
                    return Err(CryptError::new(ErrorCode::Invalid)
                        .with_locus(AttributeId::CERTINFO_ISSUERNAME.raw(), ErrorType::Constraint));
                }
                self.check_validity(leaf, now)
            }
        }
    }

    fn check_chain(&self, now: i64) -> CryptResult<()> {
        for (index, member) in self.members.iter().enumerate() {
            let issuer_key = match self.members.get(index + 1) {
                Some(issuer) => {
                    if member.tbs.issuer != issuer.tbs.subject {
                        return Err(CryptError::new(ErrorCode::Invalid)
                            .with_locus(AttributeId::CERTINFO_ISSUERNAME.raw(), ErrorType::Constraint));
                    }
                    if !issuer.is_ca() {
                        return Err(CryptError::new(ErrorCode::Invalid)
                            .with_locus(AttributeId::CERTINFO_CA.raw(), ErrorType::IssuerConstraint));
                    }
                    issuer.tbs.public_key.as_ref()
                }
                None if member.tbs.self_signed => member.tbs.public_key.as_ref(),
                None => {
                    return Err(CryptError::new(ErrorCode::Invalid)
                        .with_detail("no trusted issuer for certificate"))
                }
            };
            let issuer_key = issuer_key.ok_or_else(|| absent(AttributeId::CERTINFO_SUBJECTPUBLICKEYINFO))?;
            member.verify_with(issuer_key)?;
            self.check_validity(member, now)?;
        }
        Ok(())
    }

    fn check_validity(&self, cert: &Certificate, now: i64) -> CryptResult<()> {
        if cert.is_current(now) {
            return Ok(());
        }
        let locus = match cert.tbs.valid_from {
            Some(from) if now < from => AttributeId::CERTINFO_VALIDFROM,
            _ => AttributeId::CERTINFO_VALIDTO,
        };
        Err(CryptError::new(ErrorCode::Invalid).with_locus(locus.raw(), ErrorType::Constraint))
    }

    fn check_revocation(&self, crl: &CertSnapshot) -> CryptResult<()> {
        if !crl.is_signed() {
            return Err(CryptError::new(ErrorCode::NotInited));
        }
        let leaf = self.leaf();
        let revoked = crl.leaf().tbs.issuer == leaf.tbs.issuer
            && crl.leaf().tbs.entries.iter().any(|e| e.serial == leaf.tbs.serial);
        if revoked {
            return Err(CryptError::new(ErrorCode::Invalid)
                .with_locus(AttributeId::CERTINFO_CERTIFICATE.raw(), ErrorType::Constraint)
                .with_detail("certificate has been revoked"));
        }
        Ok(())
    }

    /// Encode the object. The format argument is the second API argument.
    pub fn export(&self, format: CertFormat) -> CryptResult<Vec<u8>> {
        if !self.is_signed() {
            return Err(CryptError::new(ErrorCode::NotInited));
        }
        let chain_capable = matches!(self.cert_type, CertType::Certificate | CertType::CertChain);
        match format {
            CertFormat::Certificate => encoding::encode_certificate(self.leaf()),
            CertFormat::TextCertificate => Ok(encoding::armour(CERT_LABEL, &encoding::encode_certificate(self.leaf())?)),
            CertFormat::CertChain if chain_capable => encoding::encode_chain(&self.members),
            CertFormat::TextCertChain if chain_capable => {
                Ok(encoding::armour(CHAIN_LABEL, &encoding::encode_chain(&self.members)?))
            }
            _ => Err(CryptError::param(2)),
        }
    }

    pub fn add_extension(&mut self, oid: &str, critical: bool, data: &[u8]) -> CryptResult<()> {
        validate_oid(oid)?;
        if data.is_empty() {
            return Err(CryptError::param(4));
        }
        let custom = &mut self.leaf_mut()?.tbs.extensions.custom;
        if custom.contains_key(oid) {
            return Err(CryptError::new(ErrorCode::Duplicate));
        }
        custom.insert(
            oid.to_string(),
            CustomExtension {
                critical,
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    pub fn get_extension(&self, oid: &str) -> CryptResult<&CustomExtension> {
        validate_oid(oid)?;
        self.selected()
            .tbs
            .extensions
            .custom
            .get(oid)
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
    }

    pub fn delete_extension(&mut self, oid: &str) -> CryptResult<()> {
        validate_oid(oid)?;
        self.leaf_mut()?
            .tbs
            .extensions
            .custom
            .remove(oid)
            .map(|_| ())
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
    }

    /// Present extension groups of the selected certificate with their
    /// present member attributes, in id order.
    fn extension_groups(&self) -> Vec<(i32, Vec<i32>)> {
        let cert = self.selected();
        let ext = &cert.tbs.extensions;
        let mut groups = Vec::new();

        let san: Vec<i32> = [
            (ext.email.is_some(), AttributeId::CERTINFO_EMAIL),
            (ext.dns_name.is_some(), AttributeId::CERTINFO_DNSNAME),
            (ext.uri.is_some(), AttributeId::CERTINFO_UNIFORMRESOURCEIDENTIFIER),
        ]
        .into_iter()
        .filter(|(present, _)| *present)
        .map(|(_, id)| id.raw())
        .collect();
        if !san.is_empty() {
            groups.push((GROUP_SUBJECTALTNAME, san));
        }
        if cert.tbs.public_key.is_some() {
            groups.push((GROUP_SUBJECTKEYIDENTIFIER, vec![AttributeId::CERTINFO_SUBJECTKEYIDENTIFIER.raw()]));
        }
        if ext.key_usage.is_some() {
            groups.push((GROUP_KEYUSAGE, vec![AttributeId::CERTINFO_KEYUSAGE.raw()]));
        }
        let mut basic = Vec::new();
        if ext.ca.is_some() {
            basic.push(AttributeId::CERTINFO_CA.raw());
        }
        if ext.path_len.is_some() {
            basic.push(AttributeId::CERTINFO_PATHLENCONSTRAINT.raw());
        }
        if !basic.is_empty() {
            groups.push((GROUP_BASICCONSTRAINTS, basic));
        }
        if ext.authority_key_id.is_some() {
            groups.push((GROUP_AUTHORITYKEYIDENTIFIER, vec![AttributeId::CERTINFO_AUTHORITYKEYIDENTIFIER.raw()]));
        }
        if !ext.ext_key_usage.is_empty() {
            groups.push((GROUP_EXTKEYUSAGE, ext.ext_key_usage.iter().copied().collect()));
        }
        groups
    }

    /// Current group and its position, falling back to the first group.
    fn current_group(&self, groups: &[(i32, Vec<i32>)]) -> Option<usize> {
        self.group_cursor
            .and_then(|id| groups.iter().position(|(g, _)| *g == id))
            .or(if groups.is_empty() { None } else { Some(0) })
    }

    fn move_group(&mut self, value: i32) -> CryptResult<()> {
        let groups = self.extension_groups();
        let target = match CursorMove::from_raw(value) {
            Some(movement) => {
                let current = self.group_cursor.and_then(|id| groups.iter().position(|(g, _)| *g == id));
                movement.apply(current, groups.len())
            }
            None => groups.iter().position(|(g, _)| *g == value),
        };
        let index = target.ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
        self.group_cursor = Some(groups[index].0);
        self.attr_cursor = groups[index].1.first().copied();
        Ok(())
    }

    fn move_attribute(&mut self, value: i32) -> CryptResult<()> {
        let groups = self.extension_groups();
        let group = self
            .current_group(&groups)
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
        let members = &groups[group].1;
        let target = match CursorMove::from_raw(value) {
            Some(movement) => {
                let current = self.attr_cursor.and_then(|id| members.iter().position(|a| *a == id));
                movement.apply(current, members.len())
            }
            None => members.iter().position(|a| *a == value),
        };
        let index = target.ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
        self.group_cursor = Some(groups[group].0);
        self.attr_cursor = Some(members[index]);
        Ok(())
    }

    fn move_member(&mut self, value: i32) -> CryptResult<()> {
        let movement = CursorMove::from_raw(value).ok_or_else(|| CryptError::new(ErrorCode::Param3))?;
        if self.cert_type == CertType::Crl {
            let len = self.leaf().tbs.entries.len();
            let next = movement
                .apply(self.entry_cursor, len)
                .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
            self.entry_cursor = Some(next);
        } else {
            let next = movement
                .apply(Some(self.member_cursor), self.members.len())
                .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
            self.member_cursor = next;
            self.group_cursor = None;
            self.attr_cursor = None;
        }
        Ok(())
    }

    /// Add a certificate to a chain, a CRL or a revocation request.
    fn add_certificate(&mut self, cert: &CertSnapshot) -> CryptResult<()> {
        if !cert.is_signed() {
            return Err(CryptError::new(ErrorCode::NotInited));
        }
        match self.cert_type {
            CertType::CertChain => {
                let blank = !self.leaf().is_signed()
                    && self.leaf().tbs.subject.is_empty()
                    && self.leaf().tbs.public_key.is_none();
                if blank {
                    self.members = cert.members.clone();
                } else if self.leaf().is_signed() {
                    if self.members.iter().any(|m| m == cert.leaf()) {
                        return Err(CryptError::new(ErrorCode::Duplicate));
                    }
                    self.members.push(cert.leaf().clone());
                } else {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
            }
            CertType::Crl => {
                let serial = cert.leaf().tbs.serial.clone();
                let entries = &mut self.leaf_mut()?.tbs.entries;
                if entries.iter().any(|e| e.serial == serial) {
                    return Err(CryptError::new(ErrorCode::Duplicate));
                }
                entries.push(RevocationEntry {
                    serial,
                    revoked_at: unix_time(),
                    reason: CrlReason::Unspecified.raw(),
                });
                self.entry_cursor = Some(entries.len() - 1);
            }
            CertType::RequestRevocation => {
                let target = cert.leaf();
                let tbs = &mut self.leaf_mut()?.tbs;
                if !tbs.entries.is_empty() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                tbs.issuer = target.tbs.issuer.clone();
                tbs.subject = target.tbs.subject.clone();
                tbs.entries.push(RevocationEntry {
                    serial: target.tbs.serial.clone(),
                    revoked_at: unix_time(),
                    reason: CrlReason::Unspecified.raw(),
                });
                self.entry_cursor = Some(0);
            }
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    fn select_dn(&mut self, value: i32, selector: DnSelector) -> CryptResult<()> {
        if value != CRYPT_UNUSED {
            return Err(CryptError::new(ErrorCode::Param3));
        }
        self.dn_selector = selector;
        Ok(())
    }
}

impl AttributeHandler for CertificateObject {
    fn get_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<AttributeValue> {
        let cert = self.selected();
        let tbs = &cert.tbs;
        let ext = &tbs.extensions;
        let value = match id {
            AttributeId::CERTINFO_SELFSIGNED => AttributeValue::Bool(tbs.self_signed),
            AttributeId::CERTINFO_IMMUTABLE => AttributeValue::Bool(cert.is_signed()),
            AttributeId::CERTINFO_CERTTYPE => AttributeValue::Int(self.cert_type.raw()),
            AttributeId::CERTINFO_FINGERPRINT => AttributeValue::String(cert.fingerprint(Algorithm::Blake3)?),
            AttributeId::CERTINFO_FINGERPRINT_SHA => AttributeValue::String(cert.fingerprint(Algorithm::Sha256)?),
            AttributeId::CERTINFO_CURRENT_CERTIFICATE => match self.cert_type {
                CertType::Crl => AttributeValue::Int(
                    self.entry_cursor.ok_or_else(|| CryptError::new(ErrorCode::NotFound))? as i32,
                ),
                _ => AttributeValue::Int(self.member_cursor as i32),
            },
            AttributeId::CERTINFO_VERSION => AttributeValue::Int(tbs.version),
            AttributeId::CERTINFO_SERIALNUMBER if !tbs.serial.is_empty() => AttributeValue::String(tbs.serial.clone()),
            AttributeId::CERTINFO_SUBJECTNAME => AttributeValue::Int((self.dn_selector == DnSelector::Subject) as i32),
            AttributeId::CERTINFO_ISSUERNAME => AttributeValue::Int((self.dn_selector == DnSelector::Issuer) as i32),
            AttributeId::CERTINFO_VALIDFROM => time_value(tbs.valid_from)?,
            AttributeId::CERTINFO_VALIDTO => time_value(tbs.valid_to)?,
            AttributeId::CERTINFO_THISUPDATE => time_value(tbs.this_update)?,
            AttributeId::CERTINFO_NEXTUPDATE => time_value(tbs.next_update)?,
            AttributeId::CERTINFO_REVOCATIONDATE => time_value(Some(self.current_entry()?.revoked_at))?,
            AttributeId::CERTINFO_CRLREASON => AttributeValue::Int(self.current_entry()?.reason),
            AttributeId::CERTINFO_DN => {
                let dn = self.selected_dn();
                if dn.is_empty() {
                    return Err(CryptError::new(ErrorCode::NotFound));
                }
                AttributeValue::String(dn.to_string().into_bytes())
            }
            id if DistinguishedName::is_component(id) => string_value(self.selected_dn().component(id))?,
            AttributeId::CERTINFO_EMAIL => string_value(ext.email.as_deref())?,
            AttributeId::CERTINFO_DNSNAME => string_value(ext.dns_name.as_deref())?,
            AttributeId::CERTINFO_UNIFORMRESOURCEIDENTIFIER => string_value(ext.uri.as_deref())?,
            AttributeId::CERTINFO_SUBJECTKEYIDENTIFIER => AttributeValue::String(
                cert.subject_key_id()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?
                    .to_vec(),
            ),
            AttributeId::CERTINFO_KEYUSAGE => {
                AttributeValue::Int(ext.key_usage.ok_or_else(|| CryptError::new(ErrorCode::NotFound))?)
            }
            AttributeId::CERTINFO_CA => AttributeValue::Bool(ext.ca.ok_or_else(|| CryptError::new(ErrorCode::NotFound))?),
            AttributeId::CERTINFO_PATHLENCONSTRAINT => {
                AttributeValue::Int(ext.path_len.ok_or_else(|| CryptError::new(ErrorCode::NotFound))?)
            }
            AttributeId::CERTINFO_AUTHORITYKEYIDENTIFIER => AttributeValue::String(
                ext.authority_key_id
                    .clone()
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?,
            ),
            id if EXT_KEY_USAGES.contains(&id) => {
                if !ext.ext_key_usage.contains(&id.raw()) {
                    return Err(CryptError::new(ErrorCode::NotFound));
                }
                AttributeValue::Bool(true)
            }
            AttributeId::ATTRIBUTE_CURRENT_GROUP => {
                let groups = self.extension_groups();
                let index = self
                    .current_group(&groups)
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
                AttributeValue::Int(groups[index].0)
            }
            AttributeId::ATTRIBUTE_CURRENT => {
                let groups = self.extension_groups();
                let index = self
                    .current_group(&groups)
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
                let members = &groups[index].1;
                let attr = self
                    .attr_cursor
                    .filter(|a| members.contains(a) && self.group_cursor == Some(groups[index].0))
                    .or_else(|| members.first().copied())
                    .ok_or_else(|| CryptError::new(ErrorCode::NotFound))?;
                AttributeValue::Int(attr)
            }
            AttributeId::CERTINFO_SERIALNUMBER => return Err(CryptError::new(ErrorCode::NotFound)),
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        };
        Ok(value)
    }

    fn set_attr(&mut self, id: AttributeId, value: AttrInput, _env: &AttrEnv<'_>) -> CryptResult<()> {
        // Selection attributes work on signed objects too.
        match id {
            AttributeId::CERTINFO_CURRENT_CERTIFICATE => return self.move_member(value.int()?),
            AttributeId::ATTRIBUTE_CURRENT_GROUP => return self.move_group(value.int()?),
            AttributeId::ATTRIBUTE_CURRENT => return self.move_attribute(value.int()?),
            AttributeId::CERTINFO_SUBJECTNAME => return self.select_dn(value.int()?, DnSelector::Subject),
            AttributeId::CERTINFO_ISSUERNAME => return self.select_dn(value.int()?, DnSelector::Issuer),
            AttributeId::CERTINFO_CERTIFICATE => {
                return match value.into_object()? {
                    ObjectRef::Certificate(cert) => self.add_certificate(&cert),
                    _ => Err(CryptError::new(ErrorCode::Param3)),
                }
            }
            _ => {}
        }

        match id {
            AttributeId::CERTINFO_SELFSIGNED => self.leaf_mut()?.tbs.self_signed = value.flag()?,
            AttributeId::CERTINFO_SERIALNUMBER => {
                let tbs = &mut self.leaf_mut()?.tbs;
                if !tbs.serial.is_empty() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                tbs.serial = value.bytes()?.to_vec();
            }
            AttributeId::CERTINFO_SUBJECTPUBLICKEYINFO => {
                let public = match value.into_object()? {
                    ObjectRef::Key(key) => PublicKeyInfo::from_key(&key),
                    ObjectRef::Certificate(cert) => cert.public_key().cloned(),
                    ObjectRef::User(_) => None,
                }
                .ok_or_else(|| CryptError::new(ErrorCode::Param3))?;
                let tbs = &mut self.leaf_mut()?.tbs;
                if tbs.public_key.is_some() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                tbs.public_key = Some(public);
            }
            AttributeId::CERTINFO_VALIDFROM => self.leaf_mut()?.tbs.valid_from = Some(i64::from(value.int()?)),
            AttributeId::CERTINFO_VALIDTO => self.leaf_mut()?.tbs.valid_to = Some(i64::from(value.int()?)),
            AttributeId::CERTINFO_THISUPDATE | AttributeId::CERTINFO_NEXTUPDATE => {
                if self.cert_type != CertType::Crl {
                    return Err(CryptError::new(ErrorCode::NotAvail));
                }
                let time = Some(i64::from(value.int()?));
                let tbs = &mut self.leaf_mut()?.tbs;
                if id == AttributeId::CERTINFO_THISUPDATE {
                    tbs.this_update = time;
                } else {
                    tbs.next_update = time;
                }
            }
            AttributeId::CERTINFO_REVOCATIONDATE => {
                let time = i64::from(value.int()?);
                self.current_entry_mut()?.revoked_at = time;
            }
            AttributeId::CERTINFO_CRLREASON => {
                let reason = CrlReason::from_raw(value.int()?).ok_or_else(|| CryptError::new(ErrorCode::Param3))?;
                self.current_entry_mut()?.reason = reason.raw();
            }
            AttributeId::CERTINFO_DN => {
                let parsed: DistinguishedName = value.text()?.parse()?;
                let subject = self.subject_mut()?;
                if !subject.is_empty() {
                    return Err(CryptError::new(ErrorCode::Inited));
                }
                *subject = parsed;
            }
            id if DistinguishedName::is_component(id) => {
                let text = value.text()?;
                self.subject_mut()?.set_component(id, text)?;
            }
            AttributeId::CERTINFO_EMAIL => {
                let text = value.text()?;
                if !text.contains('@') {
                    return Err(CryptError::new(ErrorCode::Param3));
                }
                set_once(&mut self.leaf_mut()?.tbs.extensions.email, id, text)?;
            }
            AttributeId::CERTINFO_DNSNAME => {
                let text = value.text()?;
                set_once(&mut self.leaf_mut()?.tbs.extensions.dns_name, id, text)?;
            }
            AttributeId::CERTINFO_UNIFORMRESOURCEIDENTIFIER => {
                let text = value.text()?;
                set_once(&mut self.leaf_mut()?.tbs.extensions.uri, id, text)?;
            }
            AttributeId::CERTINFO_KEYUSAGE => self.leaf_mut()?.tbs.extensions.key_usage = Some(value.int()?),
            AttributeId::CERTINFO_CA => self.leaf_mut()?.tbs.extensions.ca = Some(value.flag()?),
            AttributeId::CERTINFO_PATHLENCONSTRAINT => {
                let ext = &mut self.leaf_mut()?.tbs.extensions;
                if ext.ca != Some(true) {
                    return Err(CryptError::new(ErrorCode::Invalid)
                        .with_locus(AttributeId::CERTINFO_CA.raw(), ErrorType::AttrAbsent));
                }
                ext.path_len = Some(value.int()?);
            }
            id if EXT_KEY_USAGES.contains(&id) => {
                let flag = value.flag()?;
                let usages = &mut self.leaf_mut()?.tbs.extensions.ext_key_usage;
                if flag {
                    usages.insert(id.raw());
                } else {
                    usages.remove(&id.raw());
                }
            }
            _ => return Err(CryptError::new(ErrorCode::NotAvail)),
        }
        Ok(())
    }

    fn delete_attr(&mut self, id: AttributeId, _env: &AttrEnv<'_>) -> CryptResult<()> {
        match id {
            id if DistinguishedName::is_component(id) => self.subject_mut()?.remove_component(id),
            AttributeId::CERTINFO_EMAIL => take(&mut self.leaf_mut()?.tbs.extensions.email),
            AttributeId::CERTINFO_DNSNAME => take(&mut self.leaf_mut()?.tbs.extensions.dns_name),
            AttributeId::CERTINFO_UNIFORMRESOURCEIDENTIFIER => take(&mut self.leaf_mut()?.tbs.extensions.uri),
            AttributeId::CERTINFO_KEYUSAGE => take(&mut self.leaf_mut()?.tbs.extensions.key_usage),
            AttributeId::CERTINFO_CA => {
                let ext = &mut self.leaf_mut()?.tbs.extensions;
                ext.path_len = None;
                take(&mut ext.ca)
            }
            AttributeId::CERTINFO_PATHLENCONSTRAINT => take(&mut self.leaf_mut()?.tbs.extensions.path_len),
            AttributeId::CERTINFO_CRLREASON => {
                self.current_entry_mut()?.reason = CrlReason::Unspecified.raw();
                Ok(())
            }
            id if EXT_KEY_USAGES.contains(&id) => {
                if self.leaf_mut()?.tbs.extensions.ext_key_usage.remove(&id.raw()) {
                    Ok(())
                } else {
                    Err(CryptError::new(ErrorCode::NotFound))
                }
            }
            _ => Err(CryptError::new(ErrorCode::NotAvail)),
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.is_signed() {
            Lifecycle::Active
        } else {
            Lifecycle::Configured
        }
    }
}
