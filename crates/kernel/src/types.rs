//! Selector enumerations and small value types exposed by the kernel API.

use cryptkit_crypto::{Algorithm, Capability};
use serde::{Deserialize, Serialize};

/// Declares a `#[repr(i32)]` selector enum with `from_raw` and `raw`.
macro_rules! selector {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl $name {
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn raw(self) -> i32 {
                self as i32
            }
        }
    };
}

selector! {
    /// Keyset backend selector.
    pub enum KeysetType {
        None = 0,
        File = 1,
        Http = 2,
        Ldap = 3,
        Odbc = 4,
        Database = 5,
        Plugin = 6,
        OdbcStore = 7,
        DatabaseStore = 8,
        PluginStore = 9,
    }
}

selector! {
    pub enum KeysetOption {
        None = 0,
        ReadOnly = 1,
        Create = 2,
    }
}

selector! {
    /// How a key is looked up in a keyset.
    pub enum KeyIdType {
        /// Continue an ongoing query.
        None = 0,
        Name = 1,
        Email = 2,
    }
}

selector! {
    pub enum CertType {
        None = 0,
        Certificate = 1,
        AttributeCert = 2,
        CertChain = 3,
        CertRequest = 4,
        RequestCert = 5,
        RequestRevocation = 6,
        Crl = 7,
        CmsAttributes = 8,
        RtcsRequest = 9,
        RtcsResponse = 10,
        OcspRequest = 11,
        OcspResponse = 12,
        PkiUser = 13,
    }
}

impl CertType {
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            CertType::Certificate
                | CertType::CertChain
                | CertType::CertRequest
                | CertType::RequestRevocation
                | CertType::Crl
        )
    }
}

selector! {
    /// Encoding produced by `export_cert`.
    pub enum CertFormat {
        None = 0,
        Certificate = 1,
        CertChain = 2,
        TextCertificate = 3,
        TextCertChain = 4,
    }
}

selector! {
    pub enum EnvelopeFormat {
        /// De-envelope, detecting the format from the data.
        Auto = 0,
        Cryptlib = 1,
        Cms = 2,
        Smime = 3,
        Pgp = 4,
    }
}

selector! {
    pub enum SessionType {
        None = 0,
        Ssh = 1,
        SshServer = 2,
        Ssl = 3,
        SslServer = 4,
        Rtcs = 5,
        RtcsServer = 6,
        Ocsp = 7,
        OcspServer = 8,
        Tsp = 9,
        TspServer = 10,
        Cmp = 11,
        CmpServer = 12,
        Scep = 13,
        ScepServer = 14,
        Channel = 16,
        ChannelServer = 17,
    }
}

selector! {
    pub enum DeviceType {
        /// Built-in software token.
        None = 0,
        Fortezza = 1,
        Pkcs11 = 2,
        CryptoApi = 3,
    }
}

selector! {
    /// Certificate store management actions.
    pub enum CertAction {
        IssueCert = 16,
        IssueCrl = 17,
        RevokeCert = 18,
        ExpireCert = 19,
        Cleanup = 20,
    }
}

selector! {
    /// `CERTINFO_CRLREASON` values.
    pub enum CrlReason {
        Unspecified = 0,
        KeyCompromise = 1,
        CaCompromise = 2,
        AffiliationChanged = 3,
        Superseded = 4,
        CessationOfOperation = 5,
        CertificateHold = 6,
        RemoveFromCrl = 8,
        PrivilegeWithdrawn = 9,
        AaCompromise = 10,
    }
}

/// `CERTINFO_KEYUSAGE` bits.
pub mod key_usage {
    pub const DIGITAL_SIGNATURE: i32 = 0x001;
    pub const NON_REPUDIATION: i32 = 0x002;
    pub const KEY_ENCIPHERMENT: i32 = 0x004;
    pub const DATA_ENCIPHERMENT: i32 = 0x008;
    pub const KEY_AGREEMENT: i32 = 0x010;
    pub const KEY_CERT_SIGN: i32 = 0x020;
    pub const CRL_SIGN: i32 = 0x040;
    pub const ENCIPHER_ONLY: i32 = 0x080;
    pub const DECIPHER_ONLY: i32 = 0x100;
}

/// `ENVINFO_CONTENTTYPE` values.
pub mod content_type {
    pub const NONE: i32 = 0;
    pub const DATA: i32 = 1;
    pub const SIGNED_DATA: i32 = 2;
    pub const ENVELOPED_DATA: i32 = 3;
    pub const DIGESTED_DATA: i32 = 5;
    pub const ENCRYPTED_DATA: i32 = 6;
    pub const COMPRESSED_DATA: i32 = 7;
}

/// What an exported blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    /// Session key wrapped under a conventional key.
    EncryptedKey,
    /// Session key wrapped for a public key.
    PkcEncryptedKey,
    Signature,
}

/// Result of `query_object`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub object_type: ObjectType,
    pub algorithm: i32,
    /// Hash algorithm for signatures, 0 otherwise.
    pub hash_algorithm: i32,
    /// Total encoded size.
    pub size: usize,
    /// Identifier of the key that can process the blob.
    pub key_id: [u8; 8],
}

/// Result of `query_capability`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    pub algorithm: i32,
    pub name: String,
    pub block_size: usize,
    pub iv_size: usize,
    pub min_key_size: usize,
    pub key_size: usize,
    pub max_key_size: usize,
}

impl From<Capability> for CapabilityInfo {
    fn from(cap: Capability) -> Self {
        Self {
            algorithm: cap.algorithm.id(),
            name: cap.name.to_string(),
            block_size: cap.block_size,
            iv_size: cap.iv_size,
            min_key_size: cap.min_key_size,
            key_size: cap.key_size,
            max_key_size: cap.max_key_size,
        }
    }
}

impl CapabilityInfo {
    pub fn of(algorithm: Algorithm) -> Self {
        algorithm.capability().into()
    }
}
