//! Envelopes and sessions through push/flush/pop

use crate::test_utils::{kernel, keyed, pattern, read_string, ROUND_TRIP_LENGTHS};
use cryptkit_core::{ErrorCode, ErrorType};
use cryptkit_crypto::Algorithm;
use cryptkit_kernel::{memory_pair, AttributeId, EnvelopeFormat, Handle, Kernel, SessionType};
use std::thread;

/// Push `data` into a de-envelope, supplying `resource` when the
/// envelope asks for `wanted`.
fn open_with(kernel: &Kernel, sealed: &[u8], wanted: AttributeId, resource: Handle) -> Vec<u8> {
    let deenvelope = kernel.create_envelope(None, EnvelopeFormat::Auto).unwrap();
    let err = kernel.push_data(deenvelope, sealed).unwrap_err();
    assert_eq!(err.kind(), ErrorCode::EnvelopeResource);
    assert_eq!(err.locus(), Some(wanted.raw()));
    assert_eq!(err.error_type(), ErrorType::AttrAbsent);
    kernel.set_attribute(deenvelope, wanted, resource.raw()).unwrap();
    let opened = kernel.process_all(deenvelope, sealed).unwrap();
    kernel.destroy_envelope(deenvelope).unwrap();
    opened
}

#[test]
fn test_public_key_envelope_round_trips() {
    let kernel = kernel();
    let recipient = keyed(&kernel, None, Algorithm::X25519);
    kernel
        .set_attribute_string(recipient, AttributeId::CTXINFO_LABEL, b"recipient key")
        .unwrap();
    for len in ROUND_TRIP_LENGTHS {
        let data = pattern(len);
        let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
        kernel
            .set_attribute(envelope, AttributeId::ENVINFO_PUBLICKEY, recipient.raw())
            .unwrap();
        let sealed = kernel.process_all(envelope, &data).unwrap();
        kernel.destroy_envelope(envelope).unwrap();
        assert_eq!(
            open_with(&kernel, &sealed, AttributeId::ENVINFO_PRIVATEKEY, recipient),
            data,
            "length {len}"
        );
    }
}

#[test]
fn test_signed_compressed_envelope() {
    let kernel = kernel();
    let signer = keyed(&kernel, None, Algorithm::Ed25519);
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 5) as u8).collect();
    let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
    kernel.set_attribute(envelope, AttributeId::ENVINFO_COMPRESSION, 1).unwrap();
    kernel.set_attribute(envelope, AttributeId::ENVINFO_SIGNATURE, signer.raw()).unwrap();
    let sealed = kernel.process_all(envelope, &data).unwrap();
    assert!(sealed.len() < data.len());

    let deenvelope = kernel.create_envelope(None, EnvelopeFormat::Auto).unwrap();
    assert_eq!(kernel.process_all(deenvelope, &sealed).unwrap(), data);
    assert_eq!(
        kernel.get_attribute(deenvelope, AttributeId::ENVINFO_SIGNATURE_RESULT).unwrap(),
        0
    );
}

#[test]
fn test_small_pops_drain_everything() {
    let kernel = kernel();
    let envelope = kernel.create_envelope(None, EnvelopeFormat::Cryptlib).unwrap();
    let data = pattern(4096);
    let sealed = kernel.process_all(envelope, &data).unwrap();

    let deenvelope = kernel.create_envelope(None, EnvelopeFormat::Auto).unwrap();
    let mut offset = 0;
    while offset < sealed.len() {
        offset += kernel.push_data(deenvelope, &sealed[offset..]).unwrap();
    }
    kernel.flush_data(deenvelope).unwrap();
    let mut opened = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        let n = kernel.pop_data(deenvelope, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        opened.extend_from_slice(&buf[..n]);
    }
    assert_eq!(opened, data);
}

fn read_all(kernel: &Kernel, session: Handle, len: usize) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = vec![0u8; 1024];
    while received.len() < len {
        let n = kernel.pop_data(session, &mut buf).unwrap();
        received.extend_from_slice(&buf[..n]);
    }
    received
}

#[test]
fn test_authenticated_session_with_pinned_server_key() {
    let kernel = kernel();
    let identity = keyed(&kernel, None, Algorithm::Ed25519);
    let server = kernel.create_session(None, SessionType::ChannelServer).unwrap();
    kernel.set_attribute(server, AttributeId::SESSINFO_PRIVATEKEY, identity.raw()).unwrap();
    kernel.set_attribute_string(server, AttributeId::SESSINFO_USERNAME, b"operator").unwrap();
    kernel.set_attribute_string(server, AttributeId::SESSINFO_PASSWORD, b"hunter2").unwrap();
    let pin = read_string(&kernel, server, AttributeId::SESSINFO_SERVER_FINGERPRINT);

    let client = kernel.create_session(None, SessionType::Channel).unwrap();
    kernel.set_attribute_string(client, AttributeId::SESSINFO_USERNAME, b"operator").unwrap();
    kernel.set_attribute_string(client, AttributeId::SESSINFO_PASSWORD, b"hunter2").unwrap();
    kernel
        .set_attribute_string(client, AttributeId::SESSINFO_SERVER_FINGERPRINT, &pin)
        .unwrap();

    let (client_end, server_end) = memory_pair();
    kernel.attach_transport(server, Box::new(server_end)).unwrap();
    kernel.attach_transport(client, Box::new(client_end)).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| kernel.set_attribute(server, AttributeId::SESSINFO_ACTIVE, 1).unwrap());
        kernel.set_attribute(client, AttributeId::SESSINFO_ACTIVE, 1).unwrap();
    });
    for len in [1usize, 16, 4096] {
        let payload = pattern(len);
        let mut sent = 0;
        while sent < payload.len() {
            sent += kernel.push_data(client, &payload[sent..]).unwrap();
        }
        kernel.flush_data(client).unwrap();
        assert_eq!(read_all(&kernel, server, len), payload, "length {len}");
    }
    assert_eq!(
        kernel.get_attribute_bytes(server, AttributeId::SESSINFO_USERNAME).unwrap(),
        b"operator"
    );
    assert_eq!(
        kernel.get_attribute_bytes(client, AttributeId::SESSINFO_SERVER_FINGERPRINT).unwrap(),
        pin
    );

    kernel.destroy_session(client).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(kernel.pop_data(server, &mut buf).unwrap_err().kind(), ErrorCode::Complete);
}

#[test]
fn test_wrong_session_password_is_refused() {
    let kernel = kernel();
    let server = kernel.create_session(None, SessionType::ChannelServer).unwrap();
    kernel.set_attribute_string(server, AttributeId::SESSINFO_USERNAME, b"operator").unwrap();
    kernel.set_attribute_string(server, AttributeId::SESSINFO_PASSWORD, b"hunter2").unwrap();
    let client = kernel.create_session(None, SessionType::Channel).unwrap();
    kernel.set_attribute_string(client, AttributeId::SESSINFO_USERNAME, b"operator").unwrap();
    kernel.set_attribute_string(client, AttributeId::SESSINFO_PASSWORD, b"guess").unwrap();
    let (client_end, server_end) = memory_pair();
    kernel.attach_transport(server, Box::new(server_end)).unwrap();
    kernel.attach_transport(client, Box::new(client_end)).unwrap();

    thread::scope(|scope| {
        let server_side = scope.spawn(|| kernel.set_attribute(server, AttributeId::SESSINFO_ACTIVE, 1));
        let err = kernel.set_attribute(client, AttributeId::SESSINFO_ACTIVE, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Permission);
        assert!(server_side.join().unwrap().is_err());
    });
    assert_eq!(kernel.get_attribute(client, AttributeId::SESSINFO_ACTIVE).unwrap(), 0);
}
