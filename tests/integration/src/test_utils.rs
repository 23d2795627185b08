//! Shared fixtures for the integration tests

use cryptkit_core::{KernelConfig, UserEntry, UserRole};
use cryptkit_crypto::Algorithm;
use cryptkit_kernel::{AttributeId, CertType, Handle, Kernel};

/// Lengths every round trip is exercised with.
pub const ROUND_TRIP_LENGTHS: [usize; 4] = [0, 1, 16, 4096];

pub const CA_USER: &str = "issuer";
pub const CA_PASSWORD: &str = "ca password";

/// Install a test subscriber once; repeated calls are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn kernel() -> Kernel {
    init_tracing();
    Kernel::new(KernelConfig::default()).expect("kernel starts")
}

/// Kernel with a configured CA account.
pub fn kernel_with_ca_user() -> Kernel {
    init_tracing();
    let config = KernelConfig {
        users: vec![UserEntry {
            name: CA_USER.to_string(),
            password: CA_PASSWORD.to_string(),
            user_type: UserRole::Ca,
        }],
        ..KernelConfig::default()
    };
    Kernel::new(config).expect("kernel starts")
}

/// Deterministic test data of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}

/// Keyed context of `algorithm` owned by `owner`.
pub fn keyed(kernel: &Kernel, owner: Option<Handle>, algorithm: Algorithm) -> Handle {
    let ctx = kernel.create_context(owner, algorithm.id()).unwrap();
    kernel.generate_key(ctx).unwrap();
    ctx
}

/// Ed25519 key with a label, used as an issuer or requester.
pub fn labelled_signer(kernel: &Kernel, owner: Option<Handle>, label: &str) -> Handle {
    let key = keyed(kernel, owner, Algorithm::Ed25519);
    kernel
        .set_attribute_string(key, AttributeId::CTXINFO_LABEL, label.as_bytes())
        .unwrap();
    key
}

/// Unsigned certificate object naming `common_name` over `key`.
pub fn subject_cert(kernel: &Kernel, cert_type: CertType, common_name: &str, key: Handle) -> Handle {
    let cert = kernel.create_cert(None, cert_type).unwrap();
    kernel
        .set_attribute_string(cert, AttributeId::CERTINFO_COMMONNAME, common_name.as_bytes())
        .unwrap();
    kernel
        .set_attribute(cert, AttributeId::CERTINFO_SUBJECTPUBLICKEYINFO, key.raw())
        .unwrap();
    cert
}

/// Hash `data` through a kernel hash context, returning the finalised
/// context.
pub fn hashed(kernel: &Kernel, algorithm: Algorithm, data: &[u8]) -> Handle {
    let hash = kernel.create_context(None, algorithm.id()).unwrap();
    let mut buf = data.to_vec();
    if !buf.is_empty() {
        kernel.encrypt(hash, &mut buf).unwrap();
    }
    kernel.encrypt(hash, &mut []).unwrap();
    hash
}

/// Read a string attribute with the two-phase length protocol.
pub fn read_string(kernel: &Kernel, handle: Handle, id: AttributeId) -> Vec<u8> {
    let len = kernel.get_attribute_string(handle, id, None).unwrap();
    let mut buf = vec![0u8; len];
    let written = kernel.get_attribute_string(handle, id, Some(&mut buf)).unwrap();
    assert_eq!(written, len);
    buf
}
