//! XAdES-EPES enveloped signature construction.
//!
//! The signature profile is fixed: RSA PKCS#1 v1.5 over SHA-1, inclusive
//! canonicalization (`xml-c14n-20010315`), two references (the XAdES
//! SignedProperties and the `comprobante` element with an
//! enveloped-signature transform), and the signing certificate bound through
//! the qualifying properties. None of it is negotiable per document.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use libxml::{
    parser::Parser,
    tree::Node,
    tree::{c14n, Document},
    xpath,
};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, warn};
use x509_cert::der::Decode;
use x509_cert::Certificate;

use crate::keys::KeyMaterial;
use crate::reference::ReferenceId;

pub(crate) mod constants;

use constants::{
    signature_skeleton, DOCUMENT_DIGEST_XPATH, DS_NS, ETSI_NS, SIGNABLE_ELEMENT_ID,
    SIGNED_PROPERTIES_DIGEST_XPATH,
};

const PROFILE_MODULUS_BITS: usize = 2048;
const PROFILE_PUBLIC_EXPONENT: u32 = 65537;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("malformed XML document: {0}")]
    MalformedDocument(String),
    #[error("document has no element with identifier 'comprobante'")]
    SignableElementNotFound,
    #[error("failed to import signing material: {0}")]
    KeyImport(String),
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
    #[error("signature computation failed: {0}")]
    SigningFailed(String),
    #[error("XML manipulation failed: {0}")]
    Xml(String),
}

/// Signed output: the mutated tree serialized once, plus its base64 form for
/// transport. Immutable once produced.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    xml: String,
    base64: String,
}

impl SignedDocument {
    fn new(xml: String) -> Self {
        let base64 = Base64::encode_string(xml.as_bytes());
        Self { xml, base64 }
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }
}

/// Signs comprobantes with key material injected at construction time.
///
/// Holding the key objects here keeps every signing call self-contained:
/// concurrent calls share nothing mutable, and tests can build a signer from
/// any material without process-wide setup.
pub struct ComprobanteSigner {
    certificate_der: Vec<u8>,
    certificate: Certificate,
    signing_key: SigningKey<Sha1>,
    public_key: RsaPublicKey,
}

impl ComprobanteSigner {
    pub fn from_key_material(material: &KeyMaterial) -> Result<Self, SigningError> {
        let certificate = Certificate::from_der(material.certificate_der())
            .map_err(|e| SigningError::KeyImport(format!("certificate parse error: {e}")))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(material.private_key_der())
            .map_err(|e| SigningError::KeyImport(format!("private key parse error: {e}")))?;
        if private_key.size() * 8 != PROFILE_MODULUS_BITS {
            warn!(
                bits = private_key.size() * 8,
                "signing key modulus is off-profile, expected {PROFILE_MODULUS_BITS} bits"
            );
        }
        if private_key.e() != &BigUint::from(PROFILE_PUBLIC_EXPONENT) {
            warn!("signing key public exponent is off-profile, expected 65537");
        }
        let public_key = private_key.to_public_key();
        Ok(Self {
            certificate_der: material.certificate_der().to_vec(),
            certificate,
            signing_key: SigningKey::new(private_key),
            public_key,
        })
    }

    /// Builds and attaches the signature, returning the re-serialized
    /// document. Linear pipeline: any failing step aborts the whole
    /// operation, there is no partial-signature recovery.
    pub fn sign(
        &self,
        document_xml: &str,
        signed_at: DateTime<FixedOffset>,
    ) -> Result<SignedDocument, SigningError> {
        let reference_id = ReferenceId::generate();
        debug!(reference = %reference_id, "signing document");

        let mut doc = Parser::default()
            .parse_string(document_xml)
            .map_err(|e| SigningError::MalformedDocument(format!("{e:?}")))?;
        find_signable_element(&doc)?;
        let document_digest = document_digest_base64(&doc)?;

        let sig_doc = Parser::default()
            .parse_string(&signature_skeleton(reference_id.as_str()))
            .map_err(|e| SigningError::Xml(format!("signature skeleton failed to parse: {e:?}")))?;
        let ctx = xpath::Context::new(&sig_doc)
            .map_err(|_| SigningError::Xml("XPath context creation failed".into()))?;
        register_namespaces(&ctx)?;

        set_xpath_text(
            &ctx,
            "//etsi:SigningTime",
            &signed_at.to_rfc3339_opts(SecondsFormat::Secs, false),
        )?;
        set_xpath_text(
            &ctx,
            "//etsi:CertDigest/ds:DigestValue",
            &sha1_base64(&self.certificate_der),
        )?;
        set_xpath_text(&ctx, "//ds:X509IssuerName", &self.issuer_name())?;
        set_xpath_text(&ctx, "//ds:X509SerialNumber", &self.serial_decimal())?;
        set_xpath_text(
            &ctx,
            "//ds:X509Certificate",
            &Base64::encode_string(&self.certificate_der),
        )?;
        set_xpath_text(
            &ctx,
            "//ds:Modulus",
            &Base64::encode_string(&self.public_key.n().to_bytes_be()),
        )?;
        set_xpath_text(
            &ctx,
            "//ds:Exponent",
            &Base64::encode_string(&self.public_key.e().to_bytes_be()),
        )?;
        set_xpath_text(&ctx, DOCUMENT_DIGEST_XPATH, &document_digest)?;

        // SignedProperties digest goes in only after every signed property
        // carries its final value.
        let signed_properties = first_matching_node(&ctx, "//etsi:SignedProperties")?
            .ok_or_else(|| SigningError::Xml("skeleton is missing SignedProperties".into()))?;
        let signed_properties_digest = sha1_base64(canonicalize_node(&signed_properties)?.as_bytes());
        set_xpath_text(&ctx, SIGNED_PROPERTIES_DIGEST_XPATH, &signed_properties_digest)?;

        // The signature value covers the canonical SignedInfo bytes and
        // nothing else. Both digests must already be present.
        let signed_info = first_matching_node(&ctx, "/ds:Signature/ds:SignedInfo")?
            .ok_or_else(|| SigningError::Xml("skeleton is missing SignedInfo".into()))?;
        let canonical_signed_info = canonicalize_node(&signed_info)?;
        let signature = self
            .signing_key
            .try_sign(canonical_signed_info.as_bytes())
            .map_err(|e| SigningError::SigningFailed(e.to_string()))?;
        set_xpath_text(
            &ctx,
            "/ds:Signature/ds:SignatureValue",
            &Base64::encode_string(signature.to_bytes().as_ref()),
        )?;

        // Enveloped placement: the signature lands after both reference
        // digests were computed, as the last child of the root.
        let mut sig_root = sig_doc
            .get_root_element()
            .ok_or_else(|| SigningError::Xml("empty signature document".into()))?;
        sig_root.unlink();
        let mut imported = doc
            .import_node(&mut sig_root)
            .map_err(|_| SigningError::Xml("failed to import signature into document".into()))?;
        let mut doc_root = doc
            .get_root_element()
            .ok_or_else(|| SigningError::MalformedDocument("document has no root element".into()))?;
        doc_root
            .add_child(&mut imported)
            .map_err(|e| SigningError::Xml(e.to_string()))?;

        Ok(SignedDocument::new(doc.to_string()))
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    fn issuer_name(&self) -> String {
        let issuer = self.certificate.tbs_certificate.issuer.to_string();
        issuer
            .split(',')
            .map(|part| part.trim())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn serial_decimal(&self) -> String {
        decimal_serial(self.certificate.tbs_certificate.serial_number.as_bytes())
    }
}

fn sha1_base64(data: &[u8]) -> String {
    Base64::encode_string(&Sha1::digest(data))
}

fn find_signable_element(doc: &Document) -> Result<Node, SigningError> {
    let ctx = xpath::Context::new(doc)
        .map_err(|_| SigningError::Xml("XPath context creation failed".into()))?;
    let nodes = ctx
        .evaluate(&format!("//*[@id='{SIGNABLE_ELEMENT_ID}']"))
        .map_err(|_| SigningError::Xml("XPath evaluation failed".into()))?
        .get_nodes_as_vec();
    nodes
        .into_iter()
        .next()
        .ok_or(SigningError::SignableElementNotFound)
}

/// Digest input for the document reference: the signable subtree with any
/// already-present signature removed, canonicalized. Computed on a duplicate
/// so the tree that gets serialized is never touched.
fn document_digest_base64(doc: &Document) -> Result<String, SigningError> {
    let stripped = doc
        .dup()
        .map_err(|e| SigningError::Xml(format!("failed to duplicate document: {e:?}")))?;
    remove_existing_signatures(&stripped)?;
    let target = find_signable_element(&stripped)?;
    let canonical = canonicalize_node(&target)?;
    Ok(sha1_base64(canonical.as_bytes()))
}

fn remove_existing_signatures(doc: &Document) -> Result<(), SigningError> {
    let ctx = xpath::Context::new(doc)
        .map_err(|_| SigningError::Xml("XPath context creation failed".into()))?;
    ctx.register_namespace("ds", DS_NS)
        .map_err(|_| SigningError::Xml("namespace registration failed".into()))?;
    let nodes = ctx
        .evaluate("//ds:Signature")
        .map_err(|_| SigningError::Xml("XPath evaluation failed".into()))?
        .get_nodes_as_vec();
    for mut node in nodes {
        node.unlink();
    }
    Ok(())
}

/// Inclusive c14n of a subtree, via a copy promoted to its own document so
/// libxml reconciles the namespace declarations the subtree depends on.
fn canonicalize_node(node: &Node) -> Result<String, SigningError> {
    let mut shell = Document::new()
        .map_err(|_| SigningError::Canonicalization("failed to allocate document".into()))?;
    let mut source = node.clone();
    let copied = shell
        .import_node(&mut source)
        .map_err(|_| SigningError::Canonicalization("failed to copy subtree".into()))?;
    shell.set_root_element(&copied);

    let canon_opts = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_0,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    shell
        .canonicalize(canon_opts, None)
        .map_err(|e| SigningError::Canonicalization(format!("{e:?}")))
}

fn set_xpath_text(ctx: &xpath::Context, path: &str, value: &str) -> Result<(), SigningError> {
    let nodes = ctx
        .evaluate(path)
        .map_err(|_| SigningError::Xml(format!("XPath evaluation failed: {path}")))?
        .get_nodes_as_vec();
    if nodes.is_empty() {
        return Err(SigningError::Xml(format!("XPath target not found: {path}")));
    }
    for mut node in nodes {
        node.set_content(value)
            .map_err(|e| SigningError::Xml(e.to_string()))?;
    }
    Ok(())
}

fn first_matching_node(
    ctx: &xpath::Context,
    path: &str,
) -> Result<Option<Node>, SigningError> {
    let nodes = ctx
        .evaluate(path)
        .map_err(|_| SigningError::Xml(format!("XPath evaluation failed: {path}")))?
        .get_nodes_as_vec();
    Ok(nodes.into_iter().next())
}

fn register_namespaces(ctx: &xpath::Context) -> Result<(), SigningError> {
    ctx.register_namespace("ds", DS_NS)
        .map_err(|_| SigningError::Xml("namespace registration failed".into()))?;
    ctx.register_namespace("etsi", ETSI_NS)
        .map_err(|_| SigningError::Xml("namespace registration failed".into()))?;
    Ok(())
}

fn decimal_serial(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }

    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 10) as u8;
            carry = value / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    while digits.len() > 1 && matches!(digits.last(), Some(0)) {
        digits.pop();
    }

    digits.iter().rev().map(|d| (b'0' + *d) as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(xml: &str) -> String {
        let doc = Parser::default().parse_string(xml).expect("parse");
        let root = doc.get_root_element().expect("root");
        canonicalize_node(&root).expect("canonicalize")
    }

    #[test]
    fn decimal_serial_handles_large_values() {
        assert_eq!(decimal_serial(&[0x01]), "1");
        assert_eq!(decimal_serial(&[0x01, 0x00]), "256");
        assert_eq!(decimal_serial(&[0x00, 0x01]), "1");
        assert_eq!(decimal_serial(&[0xFF, 0xFF]), "65535");
    }

    #[test]
    fn canonicalization_is_deterministic() {
        let xml = r#"<comprobante id="comprobante"><item cantidad="2">caja</item></comprobante>"#;
        assert_eq!(canonical(xml), canonical(xml));
    }

    #[test]
    fn canonicalization_normalizes_attribute_order() {
        let a = r#"<item cantidad="2" precio="10"></item>"#;
        let b = r#"<item precio="10" cantidad="2"></item>"#;
        assert_eq!(canonical(a), canonical(b));
    }

    #[test]
    fn canonicalization_normalizes_namespace_declaration_order() {
        let a = r#"<r xmlns:a="urn:a" xmlns:b="urn:b"><a:x></a:x><b:y></b:y></r>"#;
        let b = r#"<r xmlns:b="urn:b" xmlns:a="urn:a"><a:x></a:x><b:y></b:y></r>"#;
        assert_eq!(canonical(a), canonical(b));
    }

    #[test]
    fn canonicalization_expands_self_closing_elements() {
        assert_eq!(canonical("<item/>"), canonical("<item></item>"));
    }

    #[test]
    fn skeleton_orders_references_per_profile() {
        let skeleton = signature_skeleton("0b54ad9e-276b-4e9d-8af9-4205c31e8321");
        let doc = Parser::default().parse_string(&skeleton).expect("parse skeleton");
        let ctx = xpath::Context::new(&doc).expect("xpath context");
        register_namespaces(&ctx).expect("register namespaces");

        let references = ctx
            .evaluate("/ds:Signature/ds:SignedInfo/ds:Reference")
            .expect("references xpath")
            .get_nodes_as_vec();
        assert_eq!(references.len(), 2);
        assert_eq!(
            references[0].get_attribute("Type").as_deref(),
            Some(constants::SIGNED_PROPERTIES_TYPE)
        );
        assert_eq!(
            references[1].get_attribute("URI").as_deref(),
            Some("#comprobante")
        );
    }
}
