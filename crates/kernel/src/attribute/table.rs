//! Static attribute descriptor table, sorted by id.

use super::{Access, AttributeDescriptor, AttributeId, Cardinality, Group, Range, ValueKind};
use crate::handle::KindSet;

const CTX: KindSet = KindSet::CONTEXT;
const CERT: KindSet = KindSet::CERTIFICATE;
const KEYSET: KindSet = KindSet::KEYSET;
const DEV: KindSet = KindSet::DEVICE;
const ENV: KindSet = KindSet::ENVELOPE;
const SESS: KindSet = KindSet::SESSION;
const USER: KindSet = KindSet::USER;
const ALL: KindSet = KindSet::ALL;

const TEXT: Range = Range::Len(1, cryptkit_core::MAX_TEXTSIZE);
const ANY_INT: Range = Range::Int(0, i32::MAX);
const TIMEOUT: Range = Range::Int(0, 300);

const fn attr(
    id: AttributeId,
    name: &'static str,
    group: Group,
    kind: ValueKind,
    access: Access,
    applies: KindSet,
    range: Range,
) -> AttributeDescriptor {
    AttributeDescriptor {
        id,
        name,
        group,
        kind,
        access,
        applies,
        cardinality: Cardinality::Single,
        range,
    }
}

const fn cursor(id: AttributeId, name: &'static str, group: Group, applies: KindSet) -> AttributeDescriptor {
    AttributeDescriptor {
        id,
        name,
        group,
        kind: ValueKind::Int,
        access: Access::RW,
        applies,
        cardinality: Cardinality::Cursor,
        range: ANY_INT,
    }
}

use AttributeId as A;
use Group as G;
use ValueKind as V;

static DESCRIPTORS: &[AttributeDescriptor] = &[
    attr(A::PROPERTY_HIGHSECURITY, "PROPERTY_HIGHSECURITY", G::Property, V::Bool, Access::W, ALL, Range::Any),
    attr(A::PROPERTY_OWNER, "PROPERTY_OWNER", G::Property, V::Object, Access::RW, ALL, Range::Any),
    attr(A::PROPERTY_FORWARDCOUNT, "PROPERTY_FORWARDCOUNT", G::Property, V::Int, Access::RW, ALL, Range::Int(0, 1000)),
    attr(A::PROPERTY_LOCKED, "PROPERTY_LOCKED", G::Property, V::Bool, Access::RW, ALL, Range::Any),
    attr(A::PROPERTY_USAGECOUNT, "PROPERTY_USAGECOUNT", G::Property, V::Int, Access::RW, ALL, Range::Int(1, i32::MAX)),
    attr(A::PROPERTY_NONEXPORTABLE, "PROPERTY_NONEXPORTABLE", G::Property, V::Bool, Access::RW, CTX, Range::Any),
    attr(A::ATTRIBUTE_ERRORTYPE, "ATTRIBUTE_ERRORTYPE", G::Generic, V::Int, Access::R, ALL, Range::Any),
    attr(A::ATTRIBUTE_ERRORLOCUS, "ATTRIBUTE_ERRORLOCUS", G::Generic, V::Int, Access::R, ALL, Range::Any),
    attr(A::ATTRIBUTE_INT_ERRORCODE, "ATTRIBUTE_INT_ERRORCODE", G::Generic, V::Int, Access::R, ALL, Range::Any),
    attr(A::ATTRIBUTE_INT_ERRORMESSAGE, "ATTRIBUTE_INT_ERRORMESSAGE", G::Generic, V::String, Access::R, ALL, Range::Any),
    cursor(A::ATTRIBUTE_CURRENT_GROUP, "ATTRIBUTE_CURRENT_GROUP", G::Generic, CERT.union(ENV)),
    cursor(A::ATTRIBUTE_CURRENT, "ATTRIBUTE_CURRENT", G::Generic, CERT.union(ENV)),
    attr(A::ATTRIBUTE_BUFFERSIZE, "ATTRIBUTE_BUFFERSIZE", G::Generic, V::Int, Access::RW, ENV.union(SESS), Range::Int(1024, 16 * 1024 * 1024)),
    attr(A::OPTION_INFO_DESCRIPTION, "OPTION_INFO_DESCRIPTION", G::Option, V::String, Access::R, USER, Range::Any),
    attr(A::OPTION_INFO_COPYRIGHT, "OPTION_INFO_COPYRIGHT", G::Option, V::String, Access::R, USER, Range::Any),
    attr(A::OPTION_INFO_MAJORVERSION, "OPTION_INFO_MAJORVERSION", G::Option, V::Int, Access::R, USER, Range::Any),
    attr(A::OPTION_INFO_MINORVERSION, "OPTION_INFO_MINORVERSION", G::Option, V::Int, Access::R, USER, Range::Any),
    attr(A::OPTION_INFO_STEPPING, "OPTION_INFO_STEPPING", G::Option, V::Int, Access::R, USER, Range::Any),
    attr(A::OPTION_ENCR_ALGO, "OPTION_ENCR_ALGO", G::Option, V::Int, Access::RW, USER, Range::Int(1, 99)),
    attr(A::OPTION_ENCR_HASH, "OPTION_ENCR_HASH", G::Option, V::Int, Access::RW, USER, Range::Int(200, 299)),
    attr(A::OPTION_ENCR_MAC, "OPTION_ENCR_MAC", G::Option, V::Int, Access::RW, USER, Range::Int(300, 399)),
    attr(A::OPTION_PKC_ALGO, "OPTION_PKC_ALGO", G::Option, V::Int, Access::RW, USER, Range::Int(100, 199)),
    attr(A::OPTION_PKC_KEYSIZE, "OPTION_PKC_KEYSIZE", G::Option, V::Int, Access::RW, USER, Range::Int(16, 512)),
    attr(A::OPTION_SIG_ALGO, "OPTION_SIG_ALGO", G::Option, V::Int, Access::RW, USER, Range::Int(100, 199)),
    attr(A::OPTION_SIG_KEYSIZE, "OPTION_SIG_KEYSIZE", G::Option, V::Int, Access::RW, USER, Range::Int(16, 512)),
    attr(A::OPTION_KEYING_ALGO, "OPTION_KEYING_ALGO", G::Option, V::Int, Access::RW, USER, Range::Int(200, 299)),
    attr(A::OPTION_KEYING_ITERATIONS, "OPTION_KEYING_ITERATIONS", G::Option, V::Int, Access::RW, USER, Range::Int(1, 20_000)),
    attr(A::OPTION_CERT_VALIDITY, "OPTION_CERT_VALIDITY", G::Option, V::Int, Access::RW, USER, Range::Int(1, 20 * 365)),
    attr(A::OPTION_NET_SOCKS_SERVER, "OPTION_NET_SOCKS_SERVER", G::Option, V::String, Access::RWD, USER, TEXT),
    attr(A::OPTION_NET_SOCKS_USERNAME, "OPTION_NET_SOCKS_USERNAME", G::Option, V::String, Access::RWD, USER, TEXT),
    attr(A::OPTION_NET_HTTP_PROXY, "OPTION_NET_HTTP_PROXY", G::Option, V::String, Access::RWD, USER, TEXT),
    attr(A::OPTION_NET_CONNECTTIMEOUT, "OPTION_NET_CONNECTTIMEOUT", G::Option, V::Int, Access::RW, USER, TIMEOUT),
    attr(A::OPTION_NET_READTIMEOUT, "OPTION_NET_READTIMEOUT", G::Option, V::Int, Access::RW, USER, TIMEOUT),
    attr(A::OPTION_NET_WRITETIMEOUT, "OPTION_NET_WRITETIMEOUT", G::Option, V::Int, Access::RW, USER, TIMEOUT),
    attr(A::CTXINFO_ALGO, "CTXINFO_ALGO", G::Context, V::Int, Access::R, CTX, Range::Any),
    attr(A::CTXINFO_MODE, "CTXINFO_MODE", G::Context, V::Int, Access::RW, CTX, Range::Int(0, 4)),
    attr(A::CTXINFO_NAME_ALGO, "CTXINFO_NAME_ALGO", G::Context, V::String, Access::R, CTX, Range::Any),
    attr(A::CTXINFO_NAME_MODE, "CTXINFO_NAME_MODE", G::Context, V::String, Access::R, CTX, Range::Any),
    attr(A::CTXINFO_KEYSIZE, "CTXINFO_KEYSIZE", G::Context, V::Int, Access::RW, CTX, Range::Int(1, 512)),
    attr(A::CTXINFO_BLOCKSIZE, "CTXINFO_BLOCKSIZE", G::Context, V::Int, Access::R, CTX, Range::Any),
    attr(A::CTXINFO_IVSIZE, "CTXINFO_IVSIZE", G::Context, V::Int, Access::R, CTX, Range::Any),
    attr(A::CTXINFO_KEYING_ALGO, "CTXINFO_KEYING_ALGO", G::Context, V::Int, Access::RW, CTX, Range::Int(200, 299)),
    attr(A::CTXINFO_KEYING_ITERATIONS, "CTXINFO_KEYING_ITERATIONS", G::Context, V::Int, Access::RW, CTX, Range::Int(1, 20_000)),
    attr(A::CTXINFO_KEYING_SALT, "CTXINFO_KEYING_SALT", G::Context, V::String, Access::RW, CTX, Range::Len(8, 64)),
    attr(A::CTXINFO_KEYING_VALUE, "CTXINFO_KEYING_VALUE", G::Context, V::String, Access::W, CTX, Range::Len(1, 1024)),
    attr(A::CTXINFO_KEY, "CTXINFO_KEY", G::Context, V::String, Access::W, CTX, Range::Len(1, 64)),
    attr(A::CTXINFO_KEY_COMPONENTS, "CTXINFO_KEY_COMPONENTS", G::Context, V::String, Access::RW, CTX, Range::Len(1, 4096)),
    attr(A::CTXINFO_IV, "CTXINFO_IV", G::Context, V::String, Access::RW, CTX, Range::Len(1, 32)),
    attr(A::CTXINFO_HASHVALUE, "CTXINFO_HASHVALUE", G::Context, V::String, Access::RD, CTX, Range::Any),
    attr(A::CTXINFO_LABEL, "CTXINFO_LABEL", G::Context, V::String, Access::RW, CTX, TEXT),
    attr(A::CERTINFO_SELFSIGNED, "CERTINFO_SELFSIGNED", G::Certificate, V::Bool, Access::RW, CERT, Range::Any),
    attr(A::CERTINFO_IMMUTABLE, "CERTINFO_IMMUTABLE", G::Certificate, V::Bool, Access::R, CERT, Range::Any),
    attr(A::CERTINFO_CERTTYPE, "CERTINFO_CERTTYPE", G::Certificate, V::Int, Access::R, CERT, Range::Any),
    attr(A::CERTINFO_FINGERPRINT, "CERTINFO_FINGERPRINT", G::Certificate, V::String, Access::R, CERT, Range::Any),
    attr(A::CERTINFO_FINGERPRINT_SHA, "CERTINFO_FINGERPRINT_SHA", G::Certificate, V::String, Access::R, CERT, Range::Any),
    cursor(A::CERTINFO_CURRENT_CERTIFICATE, "CERTINFO_CURRENT_CERTIFICATE", G::Certificate, CERT),
    attr(A::CERTINFO_VERSION, "CERTINFO_VERSION", G::Certificate, V::Int, Access::R, CERT, Range::Any),
    attr(A::CERTINFO_SERIALNUMBER, "CERTINFO_SERIALNUMBER", G::Certificate, V::String, Access::RW, CERT, Range::Len(1, 32)),
    attr(A::CERTINFO_SUBJECTPUBLICKEYINFO, "CERTINFO_SUBJECTPUBLICKEYINFO", G::Certificate, V::Object, Access::W, CERT, Range::Any),
    attr(A::CERTINFO_CERTIFICATE, "CERTINFO_CERTIFICATE", G::Certificate, V::Object, Access::W, CERT, Range::Any),
    attr(A::CERTINFO_ISSUERNAME, "CERTINFO_ISSUERNAME", G::Certificate, V::Int, Access::RW, CERT, Range::Any),
    attr(A::CERTINFO_VALIDFROM, "CERTINFO_VALIDFROM", G::Certificate, V::Time, Access::RW, CERT, ANY_INT),
    attr(A::CERTINFO_VALIDTO, "CERTINFO_VALIDTO", G::Certificate, V::Time, Access::RW, CERT, ANY_INT),
    attr(A::CERTINFO_SUBJECTNAME, "CERTINFO_SUBJECTNAME", G::Certificate, V::Int, Access::RW, CERT, Range::Any),
    attr(A::CERTINFO_THISUPDATE, "CERTINFO_THISUPDATE", G::Certificate, V::Time, Access::RW, CERT, ANY_INT),
    attr(A::CERTINFO_NEXTUPDATE, "CERTINFO_NEXTUPDATE", G::Certificate, V::Time, Access::RW, CERT, ANY_INT),
    attr(A::CERTINFO_REVOCATIONDATE, "CERTINFO_REVOCATIONDATE", G::Certificate, V::Time, Access::RW, CERT, ANY_INT),
    attr(A::CERTINFO_DN, "CERTINFO_DN", G::Certificate, V::String, Access::RW, CERT, Range::Len(1, 1024)),
    attr(A::CERTINFO_COUNTRYNAME, "CERTINFO_COUNTRYNAME", G::Certificate, V::String, Access::RWD, CERT, Range::Len(2, 2)),
    attr(A::CERTINFO_STATEORPROVINCENAME, "CERTINFO_STATEORPROVINCENAME", G::Certificate, V::String, Access::RWD, CERT, TEXT),
    attr(A::CERTINFO_LOCALITYNAME, "CERTINFO_LOCALITYNAME", G::Certificate, V::String, Access::RWD, CERT, TEXT),
    attr(A::CERTINFO_ORGANIZATIONNAME, "CERTINFO_ORGANIZATIONNAME", G::Certificate, V::String, Access::RWD, CERT, TEXT),
    attr(A::CERTINFO_ORGANIZATIONALUNITNAME, "CERTINFO_ORGANIZATIONALUNITNAME", G::Certificate, V::String, Access::RWD, CERT, TEXT),
    attr(A::CERTINFO_COMMONNAME, "CERTINFO_COMMONNAME", G::Certificate, V::String, Access::RWD, CERT, TEXT),
    attr(A::CERTINFO_EMAIL, "CERTINFO_EMAIL", G::Certificate, V::String, Access::RWD, CERT, Range::Len(3, 128)),
    attr(A::CERTINFO_DNSNAME, "CERTINFO_DNSNAME", G::Certificate, V::String, Access::RWD, CERT, Range::Len(1, 255)),
    attr(A::CERTINFO_UNIFORMRESOURCEIDENTIFIER, "CERTINFO_UNIFORMRESOURCEIDENTIFIER", G::Certificate, V::String, Access::RWD, CERT, Range::Len(1, 1024)),
    attr(A::CERTINFO_SUBJECTKEYIDENTIFIER, "CERTINFO_SUBJECTKEYIDENTIFIER", G::Certificate, V::String, Access::R, CERT, Range::Any),
    attr(A::CERTINFO_KEYUSAGE, "CERTINFO_KEYUSAGE", G::Certificate, V::Int, Access::RWD, CERT, Range::Int(1, 0x1FF)),
    attr(A::CERTINFO_CA, "CERTINFO_CA", G::Certificate, V::Bool, Access::RWD, CERT, Range::Any),
    attr(A::CERTINFO_PATHLENCONSTRAINT, "CERTINFO_PATHLENCONSTRAINT", G::Certificate, V::Int, Access::RWD, CERT, Range::Int(0, 64)),
    attr(A::CERTINFO_CRLREASON, "CERTINFO_CRLREASON", G::Certificate, V::Int, Access::RWD, CERT, Range::Int(0, 10)),
    attr(A::CERTINFO_AUTHORITYKEYIDENTIFIER, "CERTINFO_AUTHORITYKEYIDENTIFIER", G::Certificate, V::String, Access::R, CERT, Range::Any),
    attr(A::CERTINFO_EXTKEY_SERVERAUTH, "CERTINFO_EXTKEY_SERVERAUTH", G::Certificate, V::Bool, Access::RWD, CERT, Range::Any),
    attr(A::CERTINFO_EXTKEY_CLIENTAUTH, "CERTINFO_EXTKEY_CLIENTAUTH", G::Certificate, V::Bool, Access::RWD, CERT, Range::Any),
    attr(A::CERTINFO_EXTKEY_CODESIGNING, "CERTINFO_EXTKEY_CODESIGNING", G::Certificate, V::Bool, Access::RWD, CERT, Range::Any),
    attr(A::CERTINFO_EXTKEY_EMAILPROTECTION, "CERTINFO_EXTKEY_EMAILPROTECTION", G::Certificate, V::Bool, Access::RWD, CERT, Range::Any),
    attr(A::CERTINFO_EXTKEY_TIMESTAMPING, "CERTINFO_EXTKEY_TIMESTAMPING", G::Certificate, V::Bool, Access::RWD, CERT, Range::Any),
    attr(A::CERTINFO_EXTKEY_OCSPSIGNING, "CERTINFO_EXTKEY_OCSPSIGNING", G::Certificate, V::Bool, Access::RWD, CERT, Range::Any),
    attr(A::KEYINFO_QUERY, "KEYINFO_QUERY", G::Keyset, V::String, Access::W, KEYSET, Range::Len(1, 256)),
    attr(A::KEYINFO_QUERY_REQUESTS, "KEYINFO_QUERY_REQUESTS", G::Keyset, V::String, Access::W, KEYSET, Range::Len(1, 256)),
    attr(A::DEVINFO_INITIALISE, "DEVINFO_INITIALISE", G::Device, V::String, Access::W, DEV, TEXT),
    attr(A::DEVINFO_AUTHENT_USER, "DEVINFO_AUTHENT_USER", G::Device, V::String, Access::W, DEV, TEXT),
    attr(A::DEVINFO_AUTHENT_SUPERVISOR, "DEVINFO_AUTHENT_SUPERVISOR", G::Device, V::String, Access::W, DEV, TEXT),
    attr(A::DEVINFO_SET_AUTHENT_USER, "DEVINFO_SET_AUTHENT_USER", G::Device, V::String, Access::W, DEV, TEXT),
    attr(A::DEVINFO_SET_AUTHENT_SUPERVISOR, "DEVINFO_SET_AUTHENT_SUPERVISOR", G::Device, V::String, Access::W, DEV, TEXT),
    attr(A::DEVINFO_ZEROISE, "DEVINFO_ZEROISE", G::Device, V::String, Access::W, DEV, TEXT),
    attr(A::DEVINFO_LOGGEDIN, "DEVINFO_LOGGEDIN", G::Device, V::Bool, Access::R, DEV, Range::Any),
    attr(A::DEVINFO_LABEL, "DEVINFO_LABEL", G::Device, V::String, Access::RW, DEV, TEXT),
    attr(A::ENVINFO_DATASIZE, "ENVINFO_DATASIZE", G::Envelope, V::Int, Access::RW, ENV, ANY_INT),
    attr(A::ENVINFO_COMPRESSION, "ENVINFO_COMPRESSION", G::Envelope, V::Bool, Access::RW, ENV, Range::Any),
    attr(A::ENVINFO_CONTENTTYPE, "ENVINFO_CONTENTTYPE", G::Envelope, V::Int, Access::RW, ENV, Range::Int(0, 10)),
    attr(A::ENVINFO_SIGNATURE_RESULT, "ENVINFO_SIGNATURE_RESULT", G::Envelope, V::Int, Access::R, ENV, Range::Any),
    attr(A::ENVINFO_PASSWORD, "ENVINFO_PASSWORD", G::Envelope, V::String, Access::W, ENV, Range::Len(1, 256)),
    attr(A::ENVINFO_KEY, "ENVINFO_KEY", G::Envelope, V::Object, Access::W, ENV, Range::Any),
    attr(A::ENVINFO_SIGNATURE, "ENVINFO_SIGNATURE", G::Envelope, V::Object, Access::RW, ENV, Range::Any),
    attr(A::ENVINFO_PUBLICKEY, "ENVINFO_PUBLICKEY", G::Envelope, V::Object, Access::W, ENV, Range::Any),
    attr(A::ENVINFO_PRIVATEKEY, "ENVINFO_PRIVATEKEY", G::Envelope, V::Object, Access::W, ENV, Range::Any),
    attr(A::ENVINFO_PRIVATEKEY_LABEL, "ENVINFO_PRIVATEKEY_LABEL", G::Envelope, V::String, Access::R, ENV, Range::Any),
    attr(A::ENVINFO_SESSIONKEY, "ENVINFO_SESSIONKEY", G::Envelope, V::Object, Access::W, ENV, Range::Any),
    attr(A::SESSINFO_ACTIVE, "SESSINFO_ACTIVE", G::Session, V::Bool, Access::RW, SESS, Range::Any),
    attr(A::SESSINFO_CONNECTIONACTIVE, "SESSINFO_CONNECTIONACTIVE", G::Session, V::Bool, Access::R, SESS, Range::Any),
    attr(A::SESSINFO_USERNAME, "SESSINFO_USERNAME", G::Session, V::String, Access::RW, SESS, TEXT),
    attr(A::SESSINFO_PASSWORD, "SESSINFO_PASSWORD", G::Session, V::String, Access::W, SESS, TEXT),
    attr(A::SESSINFO_PRIVATEKEY, "SESSINFO_PRIVATEKEY", G::Session, V::Object, Access::W, SESS, Range::Any),
    attr(A::SESSINFO_SERVER_NAME, "SESSINFO_SERVER_NAME", G::Session, V::String, Access::RW, SESS, Range::Len(1, 255)),
    attr(A::SESSINFO_SERVER_PORT, "SESSINFO_SERVER_PORT", G::Session, V::Int, Access::RW, SESS, Range::Int(1, 65535)),
    attr(A::SESSINFO_SERVER_FINGERPRINT, "SESSINFO_SERVER_FINGERPRINT", G::Session, V::String, Access::RW, SESS, Range::Len(32, 32)),
    attr(A::SESSINFO_CLIENT_NAME, "SESSINFO_CLIENT_NAME", G::Session, V::String, Access::R, SESS, Range::Any),
    attr(A::SESSINFO_CLIENT_PORT, "SESSINFO_CLIENT_PORT", G::Session, V::Int, Access::R, SESS, Range::Any),
    attr(A::SESSINFO_VERSION, "SESSINFO_VERSION", G::Session, V::Int, Access::RW, SESS, Range::Int(1, 1)),
    attr(A::USERINFO_PASSWORD, "USERINFO_PASSWORD", G::User, V::String, Access::W, USER, TEXT),
    attr(A::USERINFO_CAKEY_CERTSIGN, "USERINFO_CAKEY_CERTSIGN", G::User, V::Object, Access::W, USER, Range::Any),
    attr(A::USERINFO_CAKEY_CRLSIGN, "USERINFO_CAKEY_CRLSIGN", G::User, V::Object, Access::W, USER, Range::Any),
];

/// All descriptors, sorted by id.
pub fn descriptors() -> &'static [AttributeDescriptor] {
    DESCRIPTORS
}
