//! XAdES-EPES signing for electronic fiscal documents (comprobantes
//! electrónicos).
//!
//! Key material arrives as a passphrase-protected PKCS#12 container; the
//! output is the input document with one enveloped `ds:Signature` appended,
//! base64-encoded for transport. Each call is a self-contained, stateless
//! computation: nothing is cached across requests and decrypted key bytes do
//! not outlive the call that needed them.
//!
//! # Examples
//! ```no_run
//! use chrono::{FixedOffset, TimeZone};
//!
//! let container_b64 = std::fs::read_to_string("certificado.p12.b64").unwrap();
//! let quito = FixedOffset::west_opt(5 * 3600).unwrap();
//! let signed_at = quito.with_ymd_and_hms(2026, 8, 5, 10, 30, 0).unwrap();
//! let signed = firmador_core::sign_comprobante(
//!     r#"<comprobante id="comprobante"><infoTributaria/></comprobante>"#,
//!     &container_b64,
//!     "secreto",
//!     signed_at,
//! )
//! .unwrap();
//! println!("{}", signed.base64());
//! ```

pub mod certificate;
pub mod keys;
pub mod reference;
pub mod sign;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;
use zeroize::Zeroizing;

pub use certificate::{CertificateInfo, CertificateStatus};
pub use keys::KeyMaterial;
pub use reference::ReferenceId;
pub use sign::{ComprobanteSigner, SignedDocument};

/// Message shown to end users when their certificate or container is
/// unusable. Raw library diagnostics stay in the logs.
pub const USER_CERTIFICATE_MESSAGE: &str =
    "Seu certificado não atinge os requisitos mínimos para a assinatura digital.";

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    KeyStore(#[from] keys::KeyStoreError),
    #[error(transparent)]
    Certificate(#[from] certificate::CertificateError),
    #[error(transparent)]
    Signing(#[from] sign::SigningError),
    #[error("PKCS#12 container is not valid base64: {0}")]
    ContainerEncoding(base64ct::Error),
}

impl Error {
    /// Localized message safe to surface to end users, or `None` when the
    /// structured error itself can be shown.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Error::KeyStore(_) | Error::Certificate(_) | Error::ContainerEncoding(_) => {
                Some(USER_CERTIFICATE_MESSAGE)
            }
            Error::Signing(_) => None,
        }
    }
}

/// Signs `document_xml` with the key material in `pkcs12_base64`.
///
/// The certificate is gated on remaining validity at `signed_at` before any
/// signature is produced; `signed_at` also becomes the XAdES SigningTime,
/// carrying its timezone with it. All failures are deterministic for a given
/// input, so there is no point retrying without changing the input.
pub fn sign_comprobante(
    document_xml: &str,
    pkcs12_base64: &str,
    passphrase: &str,
    signed_at: DateTime<FixedOffset>,
) -> Result<sign::SignedDocument, Error> {
    let container = decode_container(pkcs12_base64)?;
    let material = KeyMaterial::from_pkcs12(&container, passphrase).map_err(boundary)?;
    let info = CertificateInfo::from_der(material.certificate_der()).map_err(boundary)?;
    info.ensure_fit_for_signing(signed_at.with_timezone(&Utc))
        .map_err(boundary)?;
    let signer = ComprobanteSigner::from_key_material(&material).map_err(boundary)?;
    signer.sign(document_xml, signed_at).map_err(boundary)
}

/// Reports whether the container's certificate currently satisfies the
/// signing margin, and when it expires.
pub fn certificate_status(
    pkcs12_base64: &str,
    passphrase: &str,
    now: DateTime<Utc>,
) -> Result<CertificateStatus, Error> {
    let container = decode_container(pkcs12_base64)?;
    let material = KeyMaterial::from_pkcs12(&container, passphrase).map_err(boundary)?;
    let info = CertificateInfo::from_der(material.certificate_der()).map_err(boundary)?;
    Ok(info.status_at(now))
}

/// Transport encodings routinely wrap base64 lines, so whitespace is
/// stripped before decoding. The decoded container is zeroed on drop.
fn decode_container(pkcs12_base64: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
    let compact: String = pkcs12_base64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Base64::decode_vec(&compact)
        .map(Zeroizing::new)
        .map_err(|e| boundary(Error::ContainerEncoding(e)))
}

/// Operation boundary: log full detail for operators, pass the structured
/// error on to the caller.
fn boundary<E: Into<Error>>(err: E) -> Error {
    let err = err.into();
    tracing::error!(error = %err, "signing pipeline aborted");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateError;
    use crate::keys::KeyStoreError;
    use crate::sign::SigningError;

    #[test]
    fn error_conversions_cover_variants() {
        let err: Error = KeyStoreError::NoPrivateKey.into();
        assert!(matches!(err, Error::KeyStore(_)));

        let err: Error = CertificateError::ValidityOutOfRange.into();
        assert!(matches!(err, Error::Certificate(_)));

        let err: Error = SigningError::SignableElementNotFound.into();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn user_message_masks_certificate_failures_only() {
        let err: Error = KeyStoreError::NoCertificate.into();
        assert_eq!(err.user_message(), Some(USER_CERTIFICATE_MESSAGE));

        let err: Error = SigningError::SignableElementNotFound.into();
        assert_eq!(err.user_message(), None);
    }
}
