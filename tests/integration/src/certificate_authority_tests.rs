//! Certificates, keysets and certificate store workflows

use crate::test_utils::{kernel, kernel_with_ca_user, labelled_signer, subject_cert, CA_PASSWORD, CA_USER};
use cryptkit_core::ErrorCode;
use cryptkit_kernel::{
    AttributeId, CertAction, CertFormat, CertType, Handle, KeyIdType, KeysetOption, KeysetType, Kernel,
};
use tempfile::TempDir;

fn export(kernel: &Kernel, cert: Handle, format: CertFormat) -> Vec<u8> {
    let len = kernel.export_cert(None, format, cert).unwrap();
    let mut encoded = vec![0u8; len];
    assert_eq!(kernel.export_cert(Some(&mut encoded), format, cert).unwrap(), len);
    encoded
}

fn self_signed_ca(kernel: &Kernel, owner: Option<Handle>, name: &str) -> (Handle, Handle) {
    let key = labelled_signer(kernel, owner, name);
    let cert = subject_cert(kernel, CertType::Certificate, name, key);
    kernel.set_attribute(cert, AttributeId::CERTINFO_CA, 1).unwrap();
    kernel.sign_cert(cert, key).unwrap();
    (key, cert)
}

#[test]
fn test_tampered_certificate_fails_signature_check() {
    let kernel = kernel();
    let (_, cert) = self_signed_ca(&kernel, None, "Tamper Root");
    for format in [CertFormat::Certificate, CertFormat::TextCertificate] {
        let encoded = export(&kernel, cert, format);
        let imported = kernel.import_cert(&encoded, None).unwrap();
        kernel.check_cert(imported, None).unwrap();
        assert_eq!(
            read_name(&kernel, imported),
            b"Tamper Root".to_vec(),
            "{format:?}"
        );
    }

    let mut encoded = export(&kernel, cert, CertFormat::Certificate);
    let last = encoded.len() - 1;
    encoded[last] ^= 0x80;
    let tampered = kernel.import_cert(&encoded, None).unwrap();
    assert_eq!(kernel.check_cert(tampered, None).unwrap_err().kind(), ErrorCode::Signature);
}

fn read_name(kernel: &Kernel, cert: Handle) -> Vec<u8> {
    kernel.get_attribute_bytes(cert, AttributeId::CERTINFO_COMMONNAME).unwrap()
}

#[test]
fn test_signed_certificate_is_immutable() {
    let kernel = kernel();
    let (_, cert) = self_signed_ca(&kernel, None, "Frozen");
    assert_eq!(kernel.get_attribute(cert, AttributeId::CERTINFO_IMMUTABLE).unwrap(), 1);
    assert!(kernel
        .set_attribute_string(cert, AttributeId::CERTINFO_COMMONNAME, b"Thawed")
        .is_err());
    assert_eq!(read_name(&kernel, cert), b"Frozen".to_vec());
}

#[test]
fn test_ca_user_key_signs_without_explicit_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    let kernel = kernel_with_ca_user();
    assert_eq!(kernel.login(CA_USER, "guess").unwrap_err().kind(), ErrorCode::WrongKey);
    let user = kernel.login(CA_USER, CA_PASSWORD).unwrap();

    let (ca_key, ca_cert) = self_signed_ca(&kernel, Some(user), "Store CA");
    kernel
        .set_attribute(user, AttributeId::USERINFO_CAKEY_CERTSIGN, ca_key.raw())
        .unwrap();
    let store = kernel
        .keyset_open(Some(user), KeysetType::DatabaseStore, path.to_str().unwrap(), KeysetOption::Create)
        .unwrap();

    let requester = labelled_signer(&kernel, None, "bob");
    let request = subject_cert(&kernel, CertType::CertRequest, "Bob", requester);
    kernel.sign_cert(request, requester).unwrap();
    kernel.ca_add_item(store, request).unwrap();

    let issued = kernel
        .ca_cert_management(CertAction::IssueCert, store, None, Some(request))
        .unwrap()
        .expect("issued certificate");
    kernel.check_cert(issued, Some(ca_cert)).unwrap();

    let crl = kernel
        .ca_cert_management(CertAction::IssueCrl, store, None, None)
        .unwrap()
        .expect("CRL");
    assert_eq!(kernel.get_attribute(crl, AttributeId::CERTINFO_CERTTYPE).unwrap(), CertType::Crl.raw());
    kernel.check_cert(issued, Some(crl)).unwrap();

    kernel.logout(user).unwrap();
    assert_eq!(
        kernel
            .ca_cert_management(CertAction::IssueCrl, store, None, None)
            .unwrap_err()
            .kind(),
        ErrorCode::Signalled
    );
}

#[test]
fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("persist.db");
    let path = path.to_str().unwrap();
    let kernel = kernel();
    let (ca_key, ca_cert) = self_signed_ca(&kernel, None, "Persistent CA");
    let store = kernel
        .keyset_open(None, KeysetType::DatabaseStore, path, KeysetOption::Create)
        .unwrap();
    let requester = labelled_signer(&kernel, None, "carol");
    let request = subject_cert(&kernel, CertType::CertRequest, "Carol", requester);
    kernel.sign_cert(request, requester).unwrap();
    kernel.ca_add_item(store, request).unwrap();
    kernel
        .ca_cert_management(CertAction::IssueCert, store, Some(ca_key), Some(request))
        .unwrap();
    kernel.keyset_close(store).unwrap();

    let store = kernel
        .keyset_open(None, KeysetType::DatabaseStore, path, KeysetOption::ReadOnly)
        .unwrap();
    let issued = kernel
        .ca_get_item(store, CertType::Certificate, KeyIdType::Name, "Carol")
        .unwrap();
    kernel.check_cert(issued, Some(ca_cert)).unwrap();
    assert!(kernel
        .ca_cert_management(CertAction::IssueCrl, store, Some(ca_key), None)
        .is_err());
}

#[test]
fn test_private_key_file_keyset_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alice.keys");
    let path = path.to_str().unwrap();
    let kernel = kernel();
    let key = labelled_signer(&kernel, None, "Alice");
    let cert = subject_cert(&kernel, CertType::Certificate, "Alice", key);
    kernel.sign_cert(cert, key).unwrap();

    let keyset = kernel.keyset_open(None, KeysetType::File, path, KeysetOption::Create).unwrap();
    assert_eq!(kernel.add_private_key(keyset, key, "").unwrap_err().kind(), ErrorCode::Param3);
    kernel.add_private_key(keyset, key, "correct horse").unwrap();
    kernel.add_public_key(keyset, cert).unwrap();
    kernel.keyset_close(keyset).unwrap();

    let keyset = kernel.keyset_open(None, KeysetType::File, path, KeysetOption::ReadOnly).unwrap();
    let private = kernel
        .get_private_key(keyset, KeyIdType::Name, "Alice", "correct horse")
        .unwrap();
    let public = kernel.get_public_key(keyset, KeyIdType::Name, "Alice").unwrap();
    kernel.check_cert(public, Some(private)).unwrap();
    assert_eq!(
        kernel.keyset_open(None, KeysetType::File, path, KeysetOption::Create).unwrap_err().kind(),
        ErrorCode::Duplicate
    );
}
