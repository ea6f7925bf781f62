//! PKCS#12 key material extraction.
//!
//! Walks a passphrase-protected PKCS#12 container down to its safe bags and
//! pulls out the private key and signing certificate. The public key is
//! re-derived from the private key rather than read from the container, so
//! the pair is mathematically bound by construction.

use base64ct::{Base64, Encoding};
use cms::content_info::ContentInfo;
use cms::encrypted_data::EncryptedData;
use const_oid::ObjectIdentifier;
use der::asn1::OctetString;
use der::{Decode, Encode};
use hmac::{Hmac, Mac};
use pkcs12::cert_type::CertBag;
use pkcs12::kdf::{derive_key_utf8, Pkcs12KeyType};
use pkcs12::mac_data::MacData;
use pkcs12::pfx::{Pfx, Version};
use pkcs12::safe_bag::{SafeBag, SafeContents};
use pkcs8::EncryptedPrivateKeyInfo;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_ENCRYPTED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.6");
const ID_PBES2: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.5.13");
const KEY_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.1");
const SHROUDED_KEY_BAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.2");
const CERT_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.3");
const X509_CERT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.22.1");
const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// Errors raised while opening a PKCS#12 container.
///
/// A wrong passphrase and a corrupted container are indistinguishable at
/// this layer, so both surface as [`KeyStoreError::ExtractionFailed`].
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("invalid PKCS#12 container: {0}")]
    ExtractionFailed(String),
    #[error("container holds no private key bag")]
    NoPrivateKey,
    #[error("container holds no certificate bag")]
    NoCertificate,
}

/// Key material pulled out of a PKCS#12 container.
///
/// The private key is PKCS#8 DER, the public key SPKI DER, the certificate
/// the exact DER bytes found in the first certificate bag. Containers with a
/// chain are not disambiguated: only the first certificate is used. The type
/// deliberately has no `Debug` impl, and the private key buffer is zeroed on
/// drop.
pub struct KeyMaterial {
    private_key_der: Zeroizing<Vec<u8>>,
    public_key_der: Vec<u8>,
    certificate_der: Vec<u8>,
}

impl KeyMaterial {
    /// Decodes `container` (raw PKCS#12 DER) with `passphrase`.
    ///
    /// Verifies the container MAC when present, decrypts PBES2-protected
    /// content, and accepts both shrouded and plain key bags.
    pub fn from_pkcs12(container: &[u8], passphrase: &str) -> Result<Self, KeyStoreError> {
        let pfx = Pfx::from_der(container).map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("not a PKCS#12 structure: {e}"))
        })?;
        if pfx.version != Version::V3 {
            return Err(KeyStoreError::ExtractionFailed(
                "unsupported PKCS#12 version".into(),
            ));
        }
        if pfx.auth_safe.content_type != ID_DATA {
            return Err(KeyStoreError::ExtractionFailed(format!(
                "authenticated safe has content type {}, expected id-data",
                pfx.auth_safe.content_type
            )));
        }

        let auth_safe_der = pfx.auth_safe.content.to_der().map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("invalid authenticated safe: {e}"))
        })?;
        let auth_safe_os = OctetString::from_der(&auth_safe_der).map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("invalid authenticated safe: {e}"))
        })?;
        let auth_safe_data = auth_safe_os.as_bytes();

        match &pfx.mac_data {
            Some(mac_data) => verify_mac(mac_data, passphrase, auth_safe_data)?,
            None => debug!("container carries no MacData, skipping integrity check"),
        }

        let safes = Vec::<ContentInfo>::from_der(auth_safe_data).map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("invalid authenticated safe: {e}"))
        })?;

        let mut bags: Vec<SafeBag> = Vec::new();
        for safe in &safes {
            let content_der = safe.content.to_der().map_err(|e| {
                KeyStoreError::ExtractionFailed(format!("invalid safe contents: {e}"))
            })?;
            if safe.content_type == ID_DATA {
                let os = OctetString::from_der(&content_der).map_err(|e| {
                    KeyStoreError::ExtractionFailed(format!("invalid safe contents: {e}"))
                })?;
                let contents = SafeContents::from_der(os.as_bytes()).map_err(|e| {
                    KeyStoreError::ExtractionFailed(format!("invalid safe contents: {e}"))
                })?;
                bags.extend(contents);
            } else if safe.content_type == ID_ENCRYPTED_DATA {
                let encrypted = EncryptedData::from_der(&content_der).map_err(|e| {
                    KeyStoreError::ExtractionFailed(format!("invalid encrypted contents: {e}"))
                })?;
                let plaintext = decrypt_content(&encrypted, passphrase)?;
                let contents = SafeContents::from_der(&plaintext).map_err(|e| {
                    KeyStoreError::ExtractionFailed(format!("invalid decrypted contents: {e}"))
                })?;
                bags.extend(contents);
            } else {
                debug!(content_type = %safe.content_type, "skipping unrecognized safe");
            }
        }
        debug!(bags = bags.len(), "collected safe bags from container");

        let certificate_der = first_certificate(&bags)?;
        let pkcs8_der = private_key_pkcs8(&bags, passphrase)?;

        let private_key = RsaPrivateKey::from_pkcs8_der(&pkcs8_der).map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("key bag is not an RSA PKCS#8 key: {e}"))
        })?;
        // Re-encode canonically so repeated extractions are byte-identical,
        // and re-derive the public half from the private key instead of
        // trusting any public key bag.
        let private_key_der = private_key.to_pkcs8_der().map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("private key re-encoding failed: {e}"))
        })?;
        let public_key_der = private_key.to_public_key().to_public_key_der().map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("public key derivation failed: {e}"))
        })?;

        Ok(Self {
            private_key_der: Zeroizing::new(private_key_der.as_bytes().to_vec()),
            public_key_der: public_key_der.into_vec(),
            certificate_der,
        })
    }

    /// PKCS#8 DER bytes of the private key.
    pub fn private_key_der(&self) -> &[u8] {
        &self.private_key_der
    }

    /// SPKI DER bytes of the public key derived from the private key.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// DER bytes of the signing certificate.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// Private key as compact base64 (no PEM framing, no line breaks).
    pub fn private_key_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(Base64::encode_string(&self.private_key_der))
    }

    /// Public key as compact base64.
    pub fn public_key_base64(&self) -> String {
        Base64::encode_string(&self.public_key_der)
    }

    /// Certificate as compact base64.
    pub fn certificate_base64(&self) -> String {
        Base64::encode_string(&self.certificate_der)
    }
}

fn verify_mac(mac_data: &MacData, passphrase: &str, content: &[u8]) -> Result<(), KeyStoreError> {
    let salt = mac_data.mac_salt.as_bytes();
    let digest_oid = mac_data.mac.algorithm.oid;
    if digest_oid == ID_SHA256 {
        let key = derive_key_utf8::<Sha256>(
            passphrase,
            salt,
            Pkcs12KeyType::Mac,
            mac_data.iterations,
            Sha256::output_size(),
        )
        .map_err(|e| KeyStoreError::ExtractionFailed(format!("MAC key derivation failed: {e:?}")))?;
        let mut hmac = Hmac::<Sha256>::new_from_slice(&key)
            .map_err(|e| KeyStoreError::ExtractionFailed(format!("MAC setup failed: {e}")))?;
        hmac.update(content);
        hmac.verify_slice(mac_data.mac.digest.as_bytes()).map_err(|_| {
            KeyStoreError::ExtractionFailed(
                "MAC verification failed: wrong passphrase or corrupted container".into(),
            )
        })
    } else if digest_oid == ID_SHA1 {
        let key = derive_key_utf8::<Sha1>(
            passphrase,
            salt,
            Pkcs12KeyType::Mac,
            mac_data.iterations,
            Sha1::output_size(),
        )
        .map_err(|e| KeyStoreError::ExtractionFailed(format!("MAC key derivation failed: {e:?}")))?;
        let mut hmac = Hmac::<Sha1>::new_from_slice(&key)
            .map_err(|e| KeyStoreError::ExtractionFailed(format!("MAC setup failed: {e}")))?;
        hmac.update(content);
        hmac.verify_slice(mac_data.mac.digest.as_bytes()).map_err(|_| {
            KeyStoreError::ExtractionFailed(
                "MAC verification failed: wrong passphrase or corrupted container".into(),
            )
        })
    } else {
        Err(KeyStoreError::ExtractionFailed(format!(
            "unsupported MAC digest algorithm {digest_oid}"
        )))
    }
}

fn decrypt_content(
    encrypted: &EncryptedData,
    passphrase: &str,
) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
    let info = &encrypted.enc_content_info;
    if info.content_type != ID_DATA {
        return Err(KeyStoreError::ExtractionFailed(format!(
            "encrypted safe wraps content type {}, expected id-data",
            info.content_type
        )));
    }
    if info.content_enc_alg.oid != ID_PBES2 {
        return Err(KeyStoreError::ExtractionFailed(format!(
            "unsupported content encryption {}, only PBES2 containers are handled",
            info.content_enc_alg.oid
        )));
    }
    let params_der = info
        .content_enc_alg
        .parameters
        .as_ref()
        .ok_or_else(|| {
            KeyStoreError::ExtractionFailed("PBES2 parameters are missing".into())
        })?
        .to_der()
        .map_err(|e| KeyStoreError::ExtractionFailed(format!("invalid PBES2 parameters: {e}")))?;
    let params = pkcs5::pbes2::Parameters::from_der(&params_der)
        .map_err(|e| KeyStoreError::ExtractionFailed(format!("invalid PBES2 parameters: {e}")))?;
    let scheme = pkcs5::EncryptionScheme::Pbes2(params);

    let ciphertext = info.encrypted_content.as_ref().ok_or_else(|| {
        KeyStoreError::ExtractionFailed("encrypted safe has no content".into())
    })?;
    let mut buffer = Zeroizing::new(ciphertext.as_bytes().to_vec());
    let plaintext = scheme
        .decrypt_in_place(passphrase, buffer.as_mut_slice())
        .map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("content decryption failed: {e}"))
        })?;
    Ok(Zeroizing::new(plaintext.to_vec()))
}

/// Shrouded bags win over plain key bags when both are present, matching the
/// lookup order of the reference signer.
fn private_key_pkcs8(
    bags: &[SafeBag],
    passphrase: &str,
) -> Result<Zeroizing<Vec<u8>>, KeyStoreError> {
    for bag in bags {
        if bag.bag_id == SHROUDED_KEY_BAG {
            let shrouded = EncryptedPrivateKeyInfo::from_der(&bag.bag_value).map_err(|e| {
                KeyStoreError::ExtractionFailed(format!("invalid shrouded key bag: {e}"))
            })?;
            let document = shrouded.decrypt(passphrase).map_err(|e| {
                KeyStoreError::ExtractionFailed(format!("private key decryption failed: {e}"))
            })?;
            return Ok(Zeroizing::new(document.as_bytes().to_vec()));
        }
    }
    for bag in bags {
        if bag.bag_id == KEY_BAG {
            return Ok(Zeroizing::new(bag.bag_value.clone()));
        }
    }
    Err(KeyStoreError::NoPrivateKey)
}

fn first_certificate(bags: &[SafeBag]) -> Result<Vec<u8>, KeyStoreError> {
    for bag in bags {
        if bag.bag_id != CERT_BAG {
            continue;
        }
        let cert_bag = CertBag::from_der(&bag.bag_value).map_err(|e| {
            KeyStoreError::ExtractionFailed(format!("invalid certificate bag: {e}"))
        })?;
        if cert_bag.cert_id != X509_CERT_TYPE {
            debug!(cert_type = %cert_bag.cert_id, "skipping non-X.509 certificate bag");
            continue;
        }
        return Ok(cert_bag.cert_value.as_bytes().to_vec());
    }
    Err(KeyStoreError::NoCertificate)
}
