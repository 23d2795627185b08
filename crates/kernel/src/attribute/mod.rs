//! Attribute identifiers, values and descriptors.
//!
//! Every object property is addressed by a numeric [`AttributeId`]. The
//! static descriptor table in [`table`] says, for each id, what kind of
//! value it holds, how it may be accessed and which object kinds carry it.
//! The kernel consults the table before any object-specific code runs, so
//! per-kind handlers only ever see well-typed, applicable requests.

mod table;

use crate::handle::{KindSet, ObjectKind};
use cryptkit_core::{CryptError, CryptResult, ErrorCode, ErrorType};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use table::descriptors;

/// Numeric attribute identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeId(pub i32);

impl AttributeId {
    // Properties
    pub const PROPERTY_HIGHSECURITY: AttributeId = AttributeId(2);
    pub const PROPERTY_OWNER: AttributeId = AttributeId(3);
    pub const PROPERTY_FORWARDCOUNT: AttributeId = AttributeId(4);
    pub const PROPERTY_LOCKED: AttributeId = AttributeId(5);
    pub const PROPERTY_USAGECOUNT: AttributeId = AttributeId(6);
    pub const PROPERTY_NONEXPORTABLE: AttributeId = AttributeId(7);

    // Generic
    pub const ATTRIBUTE_ERRORTYPE: AttributeId = AttributeId(10);
    pub const ATTRIBUTE_ERRORLOCUS: AttributeId = AttributeId(11);
    pub const ATTRIBUTE_INT_ERRORCODE: AttributeId = AttributeId(12);
    pub const ATTRIBUTE_INT_ERRORMESSAGE: AttributeId = AttributeId(13);
    pub const ATTRIBUTE_CURRENT_GROUP: AttributeId = AttributeId(14);
    pub const ATTRIBUTE_CURRENT: AttributeId = AttributeId(15);
    pub const ATTRIBUTE_BUFFERSIZE: AttributeId = AttributeId(17);

    // Options
    pub const OPTION_INFO_DESCRIPTION: AttributeId = AttributeId(101);
    pub const OPTION_INFO_COPYRIGHT: AttributeId = AttributeId(102);
    pub const OPTION_INFO_MAJORVERSION: AttributeId = AttributeId(103);
    pub const OPTION_INFO_MINORVERSION: AttributeId = AttributeId(104);
    pub const OPTION_INFO_STEPPING: AttributeId = AttributeId(105);
    pub const OPTION_ENCR_ALGO: AttributeId = AttributeId(106);
    pub const OPTION_ENCR_HASH: AttributeId = AttributeId(107);
    pub const OPTION_ENCR_MAC: AttributeId = AttributeId(108);
    pub const OPTION_PKC_ALGO: AttributeId = AttributeId(109);
    pub const OPTION_PKC_KEYSIZE: AttributeId = AttributeId(110);
    pub const OPTION_SIG_ALGO: AttributeId = AttributeId(111);
    pub const OPTION_SIG_KEYSIZE: AttributeId = AttributeId(112);
    pub const OPTION_KEYING_ALGO: AttributeId = AttributeId(113);
    pub const OPTION_KEYING_ITERATIONS: AttributeId = AttributeId(114);
    pub const OPTION_CERT_VALIDITY: AttributeId = AttributeId(116);
    pub const OPTION_NET_SOCKS_SERVER: AttributeId = AttributeId(134);
    pub const OPTION_NET_SOCKS_USERNAME: AttributeId = AttributeId(135);
    pub const OPTION_NET_HTTP_PROXY: AttributeId = AttributeId(136);
    pub const OPTION_NET_CONNECTTIMEOUT: AttributeId = AttributeId(137);
    pub const OPTION_NET_READTIMEOUT: AttributeId = AttributeId(138);
    pub const OPTION_NET_WRITETIMEOUT: AttributeId = AttributeId(139);

    // Context
    pub const CTXINFO_ALGO: AttributeId = AttributeId(1001);
    pub const CTXINFO_MODE: AttributeId = AttributeId(1002);
    pub const CTXINFO_NAME_ALGO: AttributeId = AttributeId(1003);
    pub const CTXINFO_NAME_MODE: AttributeId = AttributeId(1004);
    pub const CTXINFO_KEYSIZE: AttributeId = AttributeId(1005);
    pub const CTXINFO_BLOCKSIZE: AttributeId = AttributeId(1006);
    pub const CTXINFO_IVSIZE: AttributeId = AttributeId(1007);
    pub const CTXINFO_KEYING_ALGO: AttributeId = AttributeId(1008);
    pub const CTXINFO_KEYING_ITERATIONS: AttributeId = AttributeId(1009);
    pub const CTXINFO_KEYING_SALT: AttributeId = AttributeId(1010);
    pub const CTXINFO_KEYING_VALUE: AttributeId = AttributeId(1011);
    pub const CTXINFO_KEY: AttributeId = AttributeId(1012);
    pub const CTXINFO_KEY_COMPONENTS: AttributeId = AttributeId(1013);
    pub const CTXINFO_IV: AttributeId = AttributeId(1014);
    pub const CTXINFO_HASHVALUE: AttributeId = AttributeId(1015);
    pub const CTXINFO_LABEL: AttributeId = AttributeId(1016);

    // Certificate
    pub const CERTINFO_SELFSIGNED: AttributeId = AttributeId(2001);
    pub const CERTINFO_IMMUTABLE: AttributeId = AttributeId(2002);
    pub const CERTINFO_CERTTYPE: AttributeId = AttributeId(2004);
    pub const CERTINFO_FINGERPRINT: AttributeId = AttributeId(2005);
    pub const CERTINFO_FINGERPRINT_SHA: AttributeId = AttributeId(2006);
    pub const CERTINFO_CURRENT_CERTIFICATE: AttributeId = AttributeId(2007);
    pub const CERTINFO_VERSION: AttributeId = AttributeId(2014);
    pub const CERTINFO_SERIALNUMBER: AttributeId = AttributeId(2015);
    pub const CERTINFO_SUBJECTPUBLICKEYINFO: AttributeId = AttributeId(2016);
    pub const CERTINFO_CERTIFICATE: AttributeId = AttributeId(2017);
    pub const CERTINFO_ISSUERNAME: AttributeId = AttributeId(2019);
    pub const CERTINFO_VALIDFROM: AttributeId = AttributeId(2020);
    pub const CERTINFO_VALIDTO: AttributeId = AttributeId(2021);
    pub const CERTINFO_SUBJECTNAME: AttributeId = AttributeId(2022);
    pub const CERTINFO_THISUPDATE: AttributeId = AttributeId(2026);
    pub const CERTINFO_NEXTUPDATE: AttributeId = AttributeId(2027);
    pub const CERTINFO_REVOCATIONDATE: AttributeId = AttributeId(2028);
    pub const CERTINFO_DN: AttributeId = AttributeId(2031);
    pub const CERTINFO_COUNTRYNAME: AttributeId = AttributeId(2100);
    pub const CERTINFO_STATEORPROVINCENAME: AttributeId = AttributeId(2101);
    pub const CERTINFO_LOCALITYNAME: AttributeId = AttributeId(2102);
    pub const CERTINFO_ORGANIZATIONNAME: AttributeId = AttributeId(2103);
    pub const CERTINFO_ORGANIZATIONALUNITNAME: AttributeId = AttributeId(2104);
    pub const CERTINFO_COMMONNAME: AttributeId = AttributeId(2105);
    pub const CERTINFO_EMAIL: AttributeId = AttributeId(2108);
    pub const CERTINFO_DNSNAME: AttributeId = AttributeId(2109);
    pub const CERTINFO_UNIFORMRESOURCEIDENTIFIER: AttributeId = AttributeId(2114);
    pub const CERTINFO_SUBJECTKEYIDENTIFIER: AttributeId = AttributeId(2241);
    pub const CERTINFO_KEYUSAGE: AttributeId = AttributeId(2242);
    pub const CERTINFO_CA: AttributeId = AttributeId(2249);
    pub const CERTINFO_PATHLENCONSTRAINT: AttributeId = AttributeId(2250);
    pub const CERTINFO_CRLREASON: AttributeId = AttributeId(2252);
    pub const CERTINFO_AUTHORITYKEYIDENTIFIER: AttributeId = AttributeId(2279);
    pub const CERTINFO_EXTKEY_SERVERAUTH: AttributeId = AttributeId(2293);
    pub const CERTINFO_EXTKEY_CLIENTAUTH: AttributeId = AttributeId(2294);
    pub const CERTINFO_EXTKEY_CODESIGNING: AttributeId = AttributeId(2295);
    pub const CERTINFO_EXTKEY_EMAILPROTECTION: AttributeId = AttributeId(2296);
    pub const CERTINFO_EXTKEY_TIMESTAMPING: AttributeId = AttributeId(2300);
    pub const CERTINFO_EXTKEY_OCSPSIGNING: AttributeId = AttributeId(2301);

    // Keyset
    pub const KEYINFO_QUERY: AttributeId = AttributeId(3001);
    pub const KEYINFO_QUERY_REQUESTS: AttributeId = AttributeId(3002);

    // Device
    pub const DEVINFO_INITIALISE: AttributeId = AttributeId(4001);
    pub const DEVINFO_AUTHENT_USER: AttributeId = AttributeId(4002);
    pub const DEVINFO_AUTHENT_SUPERVISOR: AttributeId = AttributeId(4003);
    pub const DEVINFO_SET_AUTHENT_USER: AttributeId = AttributeId(4004);
    pub const DEVINFO_SET_AUTHENT_SUPERVISOR: AttributeId = AttributeId(4005);
    pub const DEVINFO_ZEROISE: AttributeId = AttributeId(4006);
    pub const DEVINFO_LOGGEDIN: AttributeId = AttributeId(4007);
    pub const DEVINFO_LABEL: AttributeId = AttributeId(4008);

    // Envelope
    pub const ENVINFO_DATASIZE: AttributeId = AttributeId(5001);
    pub const ENVINFO_COMPRESSION: AttributeId = AttributeId(5002);
    pub const ENVINFO_CONTENTTYPE: AttributeId = AttributeId(5003);
    pub const ENVINFO_SIGNATURE_RESULT: AttributeId = AttributeId(5005);
    pub const ENVINFO_PASSWORD: AttributeId = AttributeId(5007);
    pub const ENVINFO_KEY: AttributeId = AttributeId(5008);
    pub const ENVINFO_SIGNATURE: AttributeId = AttributeId(5009);
    pub const ENVINFO_PUBLICKEY: AttributeId = AttributeId(5012);
    pub const ENVINFO_PRIVATEKEY: AttributeId = AttributeId(5013);
    pub const ENVINFO_PRIVATEKEY_LABEL: AttributeId = AttributeId(5014);
    pub const ENVINFO_SESSIONKEY: AttributeId = AttributeId(5016);

    // Session
    pub const SESSINFO_ACTIVE: AttributeId = AttributeId(6001);
    pub const SESSINFO_CONNECTIONACTIVE: AttributeId = AttributeId(6002);
    pub const SESSINFO_USERNAME: AttributeId = AttributeId(6003);
    pub const SESSINFO_PASSWORD: AttributeId = AttributeId(6004);
    pub const SESSINFO_PRIVATEKEY: AttributeId = AttributeId(6005);
    pub const SESSINFO_SERVER_NAME: AttributeId = AttributeId(6008);
    pub const SESSINFO_SERVER_PORT: AttributeId = AttributeId(6009);
    pub const SESSINFO_SERVER_FINGERPRINT: AttributeId = AttributeId(6010);
    pub const SESSINFO_CLIENT_NAME: AttributeId = AttributeId(6011);
    pub const SESSINFO_CLIENT_PORT: AttributeId = AttributeId(6012);
    pub const SESSINFO_VERSION: AttributeId = AttributeId(6015);

    // User
    pub const USERINFO_PASSWORD: AttributeId = AttributeId(7001);
    pub const USERINFO_CAKEY_CERTSIGN: AttributeId = AttributeId(7002);
    pub const USERINFO_CAKEY_CRLSIGN: AttributeId = AttributeId(7003);

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn descriptor(self) -> Option<&'static AttributeDescriptor> {
        lookup(self)
    }
}

impl fmt::Debug for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match lookup(*self) {
            Some(desc) => write!(f, "{}({})", desc.name, self.0),
            None => write!(f, "AttributeId({})", self.0),
        }
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Semantic group an attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Property,
    Generic,
    Option,
    Context,
    Certificate,
    Keyset,
    Device,
    Envelope,
    Session,
    User,
}

/// How an attribute's value is carried through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    /// Set through the integer setter: non-zero is true. Read back as 1 or 0.
    Bool,
    String,
    /// A handle to another object, passed through the integer setter.
    Object,
    /// Seconds since the Unix epoch, passed through the integer setter.
    Time,
}

impl ValueKind {
    /// Whether the value travels through the integer accessors.
    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::String)
    }
}

/// Permitted access modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Access(u8);

impl Access {
    pub const R: Access = Access(0b001);
    pub const W: Access = Access(0b010);
    pub const RW: Access = Access(0b011);
    pub const RD: Access = Access(0b101);
    pub const RWD: Access = Access(0b111);

    pub fn readable(self) -> bool {
        self.0 & 0b001 != 0
    }

    pub fn writable(self) -> bool {
        self.0 & 0b010 != 0
    }

    pub fn deletable(self) -> bool {
        self.0 & 0b100 != 0
    }
}

/// Whether an attribute holds one value or addresses a list via a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Single,
    Cursor,
}

/// Cursor movement codes accepted by cursor attributes.
pub const CURSOR_FIRST: i32 = -20;
pub const CURSOR_PREVIOUS: i32 = -21;
pub const CURSOR_NEXT: i32 = -22;
pub const CURSOR_LAST: i32 = -23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    First,
    Previous,
    Next,
    Last,
}

impl CursorMove {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            CURSOR_FIRST => Some(CursorMove::First),
            CURSOR_PREVIOUS => Some(CursorMove::Previous),
            CURSOR_NEXT => Some(CursorMove::Next),
            CURSOR_LAST => Some(CursorMove::Last),
            _ => None,
        }
    }

    /// New position in a list of `len` entries, or `None` past either end.
    pub fn apply(self, current: Option<usize>, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        match self {
            CursorMove::First => Some(0),
            CursorMove::Last => Some(len - 1),
            CursorMove::Next => match current {
                Some(pos) if pos + 1 < len => Some(pos + 1),
                Some(_) => None,
                None => Some(0),
            },
            CursorMove::Previous => match current {
                Some(pos) if pos > 0 => Some(pos - 1),
                _ => None,
            },
        }
    }
}

/// Accepted range for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    Any,
    /// Inclusive integer bounds.
    Int(i32, i32),
    /// Inclusive string length bounds.
    Len(usize, usize),
}

/// Static description of one attribute.
#[derive(Debug)]
pub struct AttributeDescriptor {
    pub id: AttributeId,
    pub name: &'static str,
    pub group: Group,
    pub kind: ValueKind,
    pub access: Access,
    pub applies: KindSet,
    pub cardinality: Cardinality,
    pub range: Range,
}

impl AttributeDescriptor {
    pub fn applies_to(&self, kind: ObjectKind) -> bool {
        self.applies.contains(kind)
    }

    /// Range check for numeric values.
    pub fn check_int(&self, value: i32) -> CryptResult<()> {
        if self.kind == ValueKind::Bool || self.kind == ValueKind::Object {
            return Ok(());
        }
        if self.cardinality == Cardinality::Cursor && CursorMove::from_raw(value).is_some() {
            return Ok(());
        }
        match self.range {
            Range::Int(lo, hi) if value < lo || value > hi => Err(self.value_error(ErrorType::AttrValue)),
            _ => Ok(()),
        }
    }

    /// Length check for string values.
    pub fn check_len(&self, len: usize) -> CryptResult<()> {
        match self.range {
            Range::Len(lo, hi) if len < lo || len > hi => Err(self.value_error(ErrorType::AttrSize)),
            _ => Ok(()),
        }
    }

    fn value_error(&self, error_type: ErrorType) -> CryptError {
        CryptError::new(ErrorCode::Param3).with_locus(self.id.raw(), error_type)
    }
}

/// Find the descriptor for an id.
pub fn lookup(id: AttributeId) -> Option<&'static AttributeDescriptor> {
    let table = descriptors();
    table
        .binary_search_by_key(&id, |d| d.id)
        .ok()
        .map(|index| &table[index])
}

/// Dynamically typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int(i32),
    Bool(bool),
    String(Vec<u8>),
}

impl AttributeValue {
    /// Numeric form returned by the integer getter.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Bool(b) => Some(*b as i32),
            AttributeValue::String(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Build a value from the integer setter, honouring the descriptor kind.
    pub fn from_int(kind: ValueKind, value: i32) -> Self {
        match kind {
            ValueKind::Bool => AttributeValue::Bool(value != 0),
            _ => AttributeValue::Int(value),
        }
    }
}
