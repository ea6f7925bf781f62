mod common;

use firmador_core::keys::{KeyMaterial, KeyStoreError};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

#[test]
fn extraction_is_idempotent() {
    let container = common::container_bytes("signing.p12");
    let first = KeyMaterial::from_pkcs12(&container, common::PASSPHRASE).expect("first extract");
    let second = KeyMaterial::from_pkcs12(&container, common::PASSPHRASE).expect("second extract");

    assert_eq!(first.private_key_der(), second.private_key_der());
    assert_eq!(first.public_key_der(), second.public_key_der());
    assert_eq!(first.certificate_der(), second.certificate_der());
}

#[test]
fn wrong_passphrase_fails_without_partial_material() {
    let container = common::container_bytes("signing.p12");
    let err = KeyMaterial::from_pkcs12(&container, "definitely-wrong").unwrap_err();
    assert!(matches!(err, KeyStoreError::ExtractionFailed(_)), "got {err}");
}

#[test]
fn garbage_container_fails_extraction() {
    let err = KeyMaterial::from_pkcs12(b"not a container", common::PASSPHRASE).unwrap_err();
    assert!(matches!(err, KeyStoreError::ExtractionFailed(_)), "got {err}");
}

#[test]
fn container_without_key_reports_no_private_key() {
    let container = common::container_bytes("cert-only.p12");
    let err = KeyMaterial::from_pkcs12(&container, common::PASSPHRASE).unwrap_err();
    assert!(matches!(err, KeyStoreError::NoPrivateKey), "got {err}");
}

#[test]
fn container_without_certificate_reports_no_certificate() {
    let container = common::container_bytes("key-only.p12");
    let err = KeyMaterial::from_pkcs12(&container, common::PASSPHRASE).unwrap_err();
    assert!(matches!(err, KeyStoreError::NoCertificate), "got {err}");
}

#[test]
fn shrouded_and_plain_key_bags_yield_the_same_material() {
    let shrouded =
        KeyMaterial::from_pkcs12(&common::container_bytes("signing.p12"), common::PASSPHRASE)
            .expect("extract shrouded container");
    let plain =
        KeyMaterial::from_pkcs12(&common::container_bytes("plain-bags.p12"), common::PASSPHRASE)
            .expect("extract plain container");

    assert_eq!(shrouded.private_key_der(), plain.private_key_der());
    assert_eq!(shrouded.certificate_der(), plain.certificate_der());
}

#[test]
fn certificate_comes_out_byte_identical() {
    let material = common::signing_material();
    assert_eq!(material.certificate_der(), common::expected_certificate_der());
}

#[test]
fn derived_public_key_matches_certificate_spki() {
    let material = common::signing_material();
    let certificate =
        Certificate::from_der(material.certificate_der()).expect("parse certificate");
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .expect("encode SPKI");
    assert_eq!(material.public_key_der(), spki.as_slice());
}

#[test]
fn derived_public_key_verifies_private_key_signatures() {
    let material = common::signing_material();
    let private_key =
        RsaPrivateKey::from_pkcs8_der(material.private_key_der()).expect("parse private key");
    let public_key =
        RsaPublicKey::from_public_key_der(material.public_key_der()).expect("parse public key");

    let message = b"factura 001-001-000000001";
    let signature = SigningKey::<Sha1>::new(private_key).sign(message);
    let signature = Signature::try_from(signature.to_bytes().as_ref()).expect("signature bytes");
    VerifyingKey::<Sha1>::new(public_key)
        .verify(message, &signature)
        .expect("signature must verify with the derived public key");
}

#[test]
fn base64_views_are_compact() {
    let material = common::signing_material();
    let private_b64 = material.private_key_base64();
    let public_b64 = material.public_key_base64();
    let cert_b64 = material.certificate_base64();
    for encoded in [private_b64.as_str(), public_b64.as_str(), cert_b64.as_str()] {
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('\r'));
        assert!(!encoded.contains("-----"));
    }
}
