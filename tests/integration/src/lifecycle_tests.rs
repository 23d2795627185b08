//! Handle lifetime, dependencies, locking and concurrent use

use crate::test_utils::{kernel, kernel_with_ca_user, keyed, pattern, CA_PASSWORD, CA_USER};
use cryptkit_core::{status_message, ErrorCode, StatusClass};
use cryptkit_crypto::Algorithm;
use cryptkit_kernel::{AttributeId, DeviceType};
use std::collections::HashSet;
use std::sync::Mutex;
use std::thread;

#[test]
fn test_handles_stay_unique_across_threads() {
    let kernel = kernel();
    let seen = Mutex::new(HashSet::new());
    thread::scope(|scope| {
        for worker in 0..8 {
            let kernel = &kernel;
            let seen = &seen;
            scope.spawn(move || {
                for round in 0..25 {
                    let ctx = keyed(kernel, None, Algorithm::ChaCha20);
                    assert!(seen.lock().unwrap().insert(ctx), "handle reused while live");
                    let mut buf = pattern(worker * 100 + round);
                    kernel.encrypt(ctx, &mut buf).unwrap();
                    kernel.destroy_context(ctx).unwrap();
                    seen.lock().unwrap().remove(&ctx);
                }
            });
        }
    });
    assert_eq!(kernel.object_count(), 1);
    kernel.shutdown().unwrap();
}

#[test]
fn test_shared_context_serialises_callers() {
    let kernel = kernel();
    let hash = kernel.create_context(None, Algorithm::Blake3.id()).unwrap();
    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    kernel.encrypt(hash, &mut [0xAAu8; 32]).unwrap();
                }
            });
        }
    });
    kernel.encrypt(hash, &mut []).unwrap();
    let value = kernel.get_attribute_bytes(hash, AttributeId::CTXINFO_HASHVALUE).unwrap();
    assert_eq!(value, cryptkit_crypto::digest(Algorithm::Blake3, &[0xAAu8; 32 * 200]).unwrap());
}

#[test]
fn test_locked_context_refuses_changes_but_still_works() {
    let kernel = kernel();
    let ctx = keyed(&kernel, None, Algorithm::ChaCha20);
    kernel.set_attribute(ctx, AttributeId::PROPERTY_LOCKED, 1).unwrap();
    assert_eq!(
        kernel.set_attribute(ctx, AttributeId::PROPERTY_USAGECOUNT, 5).unwrap_err().kind(),
        ErrorCode::Permission
    );
    assert_eq!(
        kernel.set_attribute(ctx, AttributeId::PROPERTY_LOCKED, 0).unwrap_err().kind(),
        ErrorCode::Permission
    );
    assert_eq!(kernel.get_attribute(ctx, AttributeId::PROPERTY_LOCKED).unwrap(), 1);
    kernel.encrypt(ctx, &mut pattern(32)).unwrap();
}

#[test]
fn test_logout_signals_dependants_and_they_can_still_be_destroyed() {
    let kernel = kernel_with_ca_user();
    let user = kernel.login(CA_USER, CA_PASSWORD).unwrap();
    let ctx = keyed(&kernel, Some(user), Algorithm::Ed25519);
    assert_eq!(
        kernel.get_attribute(ctx, AttributeId::PROPERTY_OWNER).unwrap(),
        user.raw()
    );
    kernel.logout(user).unwrap();
    let err = kernel.encrypt(ctx, &mut [0u8; 4]).unwrap_err();
    assert_eq!(err.kind(), ErrorCode::Signalled);
    kernel.destroy_context(ctx).unwrap();
    assert_eq!(kernel.destroy_context(ctx).unwrap_err().kind(), ErrorCode::Param1);
}

#[test]
fn test_device_close_signals_its_contexts() {
    let kernel = kernel();
    let device = kernel.device_open(None, DeviceType::None, "software token").unwrap();
    kernel
        .set_attribute_string(device, AttributeId::DEVINFO_INITIALISE, b"so secret")
        .unwrap();
    let ctx = kernel.device_create_context(device, Algorithm::ChaCha20.id()).unwrap();
    kernel.generate_key(ctx).unwrap();
    kernel.device_close(device).unwrap();
    assert_eq!(kernel.generate_key(ctx).unwrap_err().kind(), ErrorCode::Signalled);
    kernel.destroy_object(ctx).unwrap();
    kernel.shutdown().unwrap();
}

#[test]
fn test_user_options_flow_into_new_objects() {
    let kernel = kernel();
    let user = kernel.default_user();
    kernel.set_attribute(user, AttributeId::OPTION_KEYING_ITERATIONS, 20).unwrap();
    let ctx = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
    assert_eq!(kernel.get_attribute(ctx, AttributeId::CTXINFO_KEYING_ITERATIONS).unwrap(), 20);
    kernel
        .set_attribute_string(ctx, AttributeId::CTXINFO_KEYING_SALT, b"0123456789abcdef")
        .unwrap();
    kernel
        .set_attribute_string(ctx, AttributeId::CTXINFO_KEYING_VALUE, b"pass phrase")
        .unwrap();

    let twin = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
    kernel
        .set_attribute_string(twin, AttributeId::CTXINFO_KEYING_SALT, b"0123456789abcdef")
        .unwrap();
    kernel
        .set_attribute_string(twin, AttributeId::CTXINFO_KEYING_VALUE, b"pass phrase")
        .unwrap();
    let iv = [7u8; 12];
    for handle in [ctx, twin] {
        kernel.set_attribute_string(handle, AttributeId::CTXINFO_IV, &iv).unwrap();
    }
    let mut first = pattern(48);
    let mut second = pattern(48);
    kernel.encrypt(ctx, &mut first).unwrap();
    kernel.encrypt(twin, &mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_status_values_describe_failures() {
    let kernel = kernel();
    let err = kernel.create_context(None, 9999).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotAvail as i32);
    assert_eq!(StatusClass::of(err.code()), StatusClass::Security);
    assert_ne!(status_message(err.code()), status_message(ErrorCode::Param1 as i32));
    let ctx = kernel.create_context(None, Algorithm::ChaCha20.id()).unwrap();
    kernel.destroy_context(ctx).unwrap();
    let err = kernel.destroy_object(ctx).unwrap_err();
    assert_eq!(StatusClass::of(err.code()), StatusClass::Parameter);
    assert_eq!(
        kernel.get_attribute(kernel.default_user(), AttributeId::PROPERTY_OWNER).unwrap(),
        kernel.default_user().raw()
    );
}
