//! Distinguished names.

use crate::attribute::AttributeId;
use cryptkit_core::{CryptError, CryptResult, ErrorCode, ErrorType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which DN component attributes currently address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DnSelector {
    #[default]
    Subject,
    Issuer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
}

/// Short names in output order.
const COMPONENTS: [(&str, AttributeId); 6] = [
    ("C", AttributeId::CERTINFO_COUNTRYNAME),
    ("ST", AttributeId::CERTINFO_STATEORPROVINCENAME),
    ("L", AttributeId::CERTINFO_LOCALITYNAME),
    ("O", AttributeId::CERTINFO_ORGANIZATIONNAME),
    ("OU", AttributeId::CERTINFO_ORGANIZATIONALUNITNAME),
    ("CN", AttributeId::CERTINFO_COMMONNAME),
];

impl DistinguishedName {
    /// DN holding only a common name.
    pub fn with_common_name(name: impl Into<String>) -> Self {
        Self {
            common_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn is_component(id: AttributeId) -> bool {
        COMPONENTS.iter().any(|(_, c)| *c == id)
    }

    fn slot(&mut self, id: AttributeId) -> Option<&mut Option<String>> {
        match id {
            AttributeId::CERTINFO_COUNTRYNAME => Some(&mut self.country),
            AttributeId::CERTINFO_STATEORPROVINCENAME => Some(&mut self.state),
            AttributeId::CERTINFO_LOCALITYNAME => Some(&mut self.locality),
            AttributeId::CERTINFO_ORGANIZATIONNAME => Some(&mut self.organization),
            AttributeId::CERTINFO_ORGANIZATIONALUNITNAME => Some(&mut self.org_unit),
            AttributeId::CERTINFO_COMMONNAME => Some(&mut self.common_name),
            _ => None,
        }
    }

    pub fn component(&self, id: AttributeId) -> Option<&str> {
        let value = match id {
            AttributeId::CERTINFO_COUNTRYNAME => &self.country,
            AttributeId::CERTINFO_STATEORPROVINCENAME => &self.state,
            AttributeId::CERTINFO_LOCALITYNAME => &self.locality,
            AttributeId::CERTINFO_ORGANIZATIONNAME => &self.organization,
            AttributeId::CERTINFO_ORGANIZATIONALUNITNAME => &self.org_unit,
            AttributeId::CERTINFO_COMMONNAME => &self.common_name,
            _ => return None,
        };
        value.as_deref()
    }

    /// Add a component. Fails with `Inited` if it is already present.
    pub fn set_component(&mut self, id: AttributeId, value: String) -> CryptResult<()> {
        if id == AttributeId::CERTINFO_COUNTRYNAME && !value.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(CryptError::new(ErrorCode::Param3).with_locus(id.raw(), ErrorType::AttrValue));
        }
        let slot = self.slot(id).ok_or_else(|| CryptError::new(ErrorCode::NotAvail))?;
        if slot.is_some() {
            return Err(CryptError::new(ErrorCode::Inited).with_locus(id.raw(), ErrorType::AttrPresent));
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn remove_component(&mut self, id: AttributeId) -> CryptResult<()> {
        let slot = self.slot(id).ok_or_else(|| CryptError::new(ErrorCode::NotAvail))?;
        slot.take()
            .map(|_| ())
            .ok_or_else(|| CryptError::new(ErrorCode::NotFound))
    }

    pub fn is_empty(&self) -> bool {
        COMPONENTS.iter().all(|(_, id)| self.component(*id).is_none())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (short, id) in COMPONENTS {
            if let Some(value) = self.component(id) {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{short}={value}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl FromStr for DistinguishedName {
    type Err = CryptError;

    /// Parse `"C=US, O=Example, CN=Alice"`. Keys are case-insensitive.
    fn from_str(s: &str) -> CryptResult<Self> {
        let invalid = || {
            CryptError::new(ErrorCode::Param3)
                .with_locus(AttributeId::CERTINFO_DN.raw(), ErrorType::AttrValue)
        };
        let mut dn = DistinguishedName::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(invalid)?;
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                return Err(invalid());
            }
            let id = COMPONENTS
                .iter()
                .find(|(short, _)| short.eq_ignore_ascii_case(key))
                .map(|(_, id)| *id)
                .ok_or_else(invalid)?;
            dn.set_component(id, value.to_string())
                .map_err(|_| invalid())?;
        }
        if dn.is_empty() {
            return Err(invalid());
        }
        Ok(dn)
    }
}
