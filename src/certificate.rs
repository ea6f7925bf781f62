//! Certificate expiry gating.
//!
//! A certificate that is still technically valid but about to lapse is
//! rejected for signing: a signature that turns void within hours is worse
//! than no signature at all. The probe instant is always an explicit
//! parameter, there is no hidden clock or timezone state.

use chrono::{DateTime, Utc};
use thiserror::Error;
use x509_cert::der::Decode;
use x509_cert::Certificate;

/// Certificates with less remaining lifetime than this (roughly 28 hours)
/// are unfit for signing.
pub const MIN_REMAINING_VALIDITY_SECS: i64 = 100_000;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to decode certificate: {source}")]
    Decode {
        #[source]
        source: x509_cert::der::Error,
    },
    #[error("certificate validity end is outside the representable time range")]
    ValidityOutOfRange,
    #[error(
        "certificate expires on {expires_on}, {remaining_secs}s from the probe time, inside the signing safety margin"
    )]
    ExpiringOrExpired {
        expires_on: DateTime<Utc>,
        remaining_secs: i64,
    },
}

/// Answer to a certificate status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateStatus {
    pub is_valid: bool,
    pub expires_on: DateTime<Utc>,
}

/// Read-only expiry view over a DER certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    expires_on: DateTime<Utc>,
    raw: Vec<u8>,
}

impl CertificateInfo {
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let certificate =
            Certificate::from_der(der).map_err(|source| CertificateError::Decode { source })?;
        let not_after = certificate.tbs_certificate.validity.not_after.to_unix_duration();
        let expires_on = DateTime::from_timestamp(not_after.as_secs() as i64, 0)
            .ok_or(CertificateError::ValidityOutOfRange)?;
        Ok(Self {
            expires_on,
            raw: der.to_vec(),
        })
    }

    /// The certificate's notAfter instant.
    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    /// The DER bytes this view was built from.
    pub fn raw_der(&self) -> &[u8] {
        &self.raw
    }

    pub fn seconds_remaining_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_on - now).num_seconds()
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CertificateStatus {
        CertificateStatus {
            is_valid: self.seconds_remaining_at(now) >= MIN_REMAINING_VALIDITY_SECS,
            expires_on: self.expires_on,
        }
    }

    /// Errors unless at least [`MIN_REMAINING_VALIDITY_SECS`] of validity
    /// remain at `now`. notBefore, revocation and trust chains are out of
    /// scope here.
    pub fn ensure_fit_for_signing(&self, now: DateTime<Utc>) -> Result<(), CertificateError> {
        let remaining_secs = self.seconds_remaining_at(now);
        if remaining_secs < MIN_REMAINING_VALIDITY_SECS {
            return Err(CertificateError::ExpiringOrExpired {
                expires_on: self.expires_on,
                remaining_secs,
            });
        }
        Ok(())
    }
}
