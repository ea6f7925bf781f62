mod common;

use chrono::Duration;
use firmador_core::certificate::{
    CertificateError, CertificateInfo, MIN_REMAINING_VALIDITY_SECS,
};

fn fixture_info() -> CertificateInfo {
    let material = common::signing_material();
    CertificateInfo::from_der(material.certificate_der()).expect("parse certificate")
}

#[test]
fn rejects_certificate_just_inside_the_margin() {
    let info = fixture_info();
    let now = info.expires_on() - Duration::seconds(MIN_REMAINING_VALIDITY_SECS - 1);

    let err = info.ensure_fit_for_signing(now).unwrap_err();
    match err {
        CertificateError::ExpiringOrExpired { remaining_secs, expires_on } => {
            assert_eq!(remaining_secs, MIN_REMAINING_VALIDITY_SECS - 1);
            assert_eq!(expires_on, info.expires_on());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!info.status_at(now).is_valid);
}

#[test]
fn accepts_certificate_exactly_at_the_margin() {
    let info = fixture_info();
    let now = info.expires_on() - Duration::seconds(MIN_REMAINING_VALIDITY_SECS);
    info.ensure_fit_for_signing(now).expect("margin boundary is inclusive");
    assert!(info.status_at(now).is_valid);
}

#[test]
fn accepts_certificate_just_outside_the_margin() {
    let info = fixture_info();
    let now = info.expires_on() - Duration::seconds(MIN_REMAINING_VALIDITY_SECS + 1);
    info.ensure_fit_for_signing(now).expect("certificate has margin to spare");
    assert!(info.status_at(now).is_valid);
}

#[test]
fn rejects_expired_certificate() {
    let info = fixture_info();
    let now = info.expires_on() + Duration::seconds(1);

    let err = info.ensure_fit_for_signing(now).unwrap_err();
    match err {
        CertificateError::ExpiringOrExpired { remaining_secs, .. } => {
            assert!(remaining_secs < 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn status_reports_the_expiry_instant() {
    let info = fixture_info();
    let now = info.expires_on() - Duration::days(30);
    let status = info.status_at(now);
    assert!(status.is_valid);
    assert_eq!(status.expires_on, info.expires_on());
}

#[test]
fn rejects_bytes_that_are_not_a_certificate() {
    let err = CertificateInfo::from_der(b"\x30\x03\x02\x01\x01").unwrap_err();
    assert!(matches!(err, CertificateError::Decode { .. }));
}
