//! Contexts, key export and signatures driven through handles

use crate::test_utils::{hashed, kernel, keyed, pattern, read_string, ROUND_TRIP_LENGTHS};
use cryptkit_core::ErrorCode;
use cryptkit_crypto::{digest, Algorithm};
use cryptkit_kernel::{AttributeId, ObjectType};

#[test]
fn test_cipher_round_trips_for_every_length() {
    let kernel = kernel();
    for algorithm in [Algorithm::ChaCha20, Algorithm::XChaCha20] {
        for len in ROUND_TRIP_LENGTHS {
            let ctx = keyed(&kernel, None, algorithm);
            let plaintext = pattern(len);
            let mut buf = plaintext.clone();
            kernel.encrypt(ctx, &mut buf).unwrap();
            let iv = read_string(&kernel, ctx, AttributeId::CTXINFO_IV);
            assert_eq!(iv.len(), kernel.get_attribute(ctx, AttributeId::CTXINFO_IVSIZE).unwrap() as usize);

            kernel.set_attribute_string(ctx, AttributeId::CTXINFO_IV, &iv).unwrap();
            kernel.decrypt(ctx, &mut buf).unwrap();
            assert_eq!(buf, plaintext, "{algorithm} length {len}");
            kernel.destroy_context(ctx).unwrap();
        }
    }
    kernel.shutdown().unwrap();
}

#[test]
fn test_kernel_hashes_match_engine() {
    let kernel = kernel();
    for algorithm in [Algorithm::Sha256, Algorithm::Blake3] {
        for len in ROUND_TRIP_LENGTHS {
            let data = pattern(len);
            let hash = hashed(&kernel, algorithm, &data);
            let value = read_string(&kernel, hash, AttributeId::CTXINFO_HASHVALUE);
            assert_eq!(value, digest(algorithm, &data).unwrap(), "{algorithm} length {len}");
            kernel.destroy_context(hash).unwrap();
        }
    }
}

#[test]
fn test_busy_context_reports_timeout_until_generation_completes() {
    let kernel = kernel();
    let ctx = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
    kernel.generate_key_async(ctx).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(kernel.encrypt(ctx, &mut buf).unwrap_err().kind(), ErrorCode::Timeout);
    while let Err(e) = kernel.async_query(ctx) {
        assert_eq!(e.kind(), ErrorCode::Incomplete);
    }
    kernel.encrypt(ctx, &mut buf).unwrap();
    assert_eq!(kernel.async_query(ctx).unwrap_err().kind(), ErrorCode::Complete);
}

#[test]
fn test_public_key_wrapped_session_key() {
    let kernel = kernel();
    let recipient = keyed(&kernel, None, Algorithm::X25519);
    let session = keyed(&kernel, None, Algorithm::ChaCha20);

    let len = kernel.export_key(None, recipient, session).unwrap();
    let mut blob = vec![0u8; len];
    kernel.export_key(Some(&mut blob), recipient, session).unwrap();
    let info = kernel.query_object(&blob).unwrap();
    assert_eq!(info.object_type, ObjectType::PkcEncryptedKey);
    assert_eq!(info.algorithm, Algorithm::ChaCha20.id());
    assert_eq!(info.size, len);

    let imported = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
    kernel.import_key(&blob, recipient, imported).unwrap();
    let iv = vec![3u8; 12];
    kernel.set_attribute_string(session, AttributeId::CTXINFO_IV, &iv).unwrap();
    kernel.set_attribute_string(imported, AttributeId::CTXINFO_IV, &iv).unwrap();
    let mut sealed = pattern(64);
    kernel.encrypt(session, &mut sealed).unwrap();
    kernel.decrypt(imported, &mut sealed).unwrap();
    assert_eq!(sealed, pattern(64));

    let stranger = keyed(&kernel, None, Algorithm::X25519);
    let other = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
    assert!(kernel.import_key(&blob, stranger, other).is_err());
}

#[test]
fn test_short_buffer_is_overflow_and_writes_nothing() {
    let kernel = kernel();
    let signer = keyed(&kernel, None, Algorithm::Ed25519);
    let hash = hashed(&kernel, Algorithm::Sha256, b"contract");
    let len = kernel.create_signature(None, signer, hash).unwrap();
    let mut short = vec![0u8; len - 1];
    assert_eq!(
        kernel.create_signature(Some(&mut short), signer, hash).unwrap_err().kind(),
        ErrorCode::Overflow
    );
    assert!(short.iter().all(|b| *b == 0));

    let mut signature = vec![0u8; len];
    kernel.create_signature(Some(&mut signature), signer, hash).unwrap();
    let info = kernel.query_object(&signature).unwrap();
    assert_eq!(info.object_type, ObjectType::Signature);
    assert_eq!(info.hash_algorithm, Algorithm::Sha256.id());
    kernel.check_signature(&signature, signer, hash).unwrap();

    let mut tampered = signature.clone();
    let last = tampered.len() - 2;
    tampered[last] ^= 0x40;
    assert!(kernel.check_signature(&tampered, signer, hash).is_err());
}

#[test]
fn test_mac_context_distinguishes_keys() {
    let kernel = kernel();
    let first = keyed(&kernel, None, Algorithm::Blake3Mac);
    let second = keyed(&kernel, None, Algorithm::Blake3Mac);
    for ctx in [first, second] {
        kernel.encrypt(ctx, &mut pattern(100)).unwrap();
        kernel.encrypt(ctx, &mut []).unwrap();
    }
    let a = read_string(&kernel, first, AttributeId::CTXINFO_HASHVALUE);
    let b = read_string(&kernel, second, AttributeId::CTXINFO_HASHVALUE);
    assert_eq!(a.len(), 32);
    assert_ne!(a, b);
}
