pub(crate) const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub(crate) const ETSI_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

pub(crate) const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub(crate) const RSA_SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub(crate) const SHA1_DIGEST_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub(crate) const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub(crate) const SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";

/// Identifier of the element the enveloped signature covers.
pub(crate) const SIGNABLE_ELEMENT_ID: &str = "comprobante";

pub(crate) const SIGNED_PROPERTIES_DIGEST_XPATH: &str =
    "/ds:Signature/ds:SignedInfo/ds:Reference[@Type='http://uri.etsi.org/01903#SignedProperties']/ds:DigestValue";
pub(crate) const DOCUMENT_DIGEST_XPATH: &str =
    "/ds:Signature/ds:SignedInfo/ds:Reference[@URI='#comprobante']/ds:DigestValue";

/// Unsigned signature skeleton keyed by a reference id. Emitted without
/// inter-element whitespace: every byte inside SignedInfo and
/// SignedProperties ends up in a digest, and the reference set order
/// (SignedProperties first, document second) is part of the profile.
pub(crate) fn signature_skeleton(reference_id: &str) -> String {
    format!(
        concat!(
            r##"<ds:Signature xmlns:ds="{ds}" xmlns:etsi="{etsi}" Id="Signature-{id}">"##,
            r##"<ds:SignedInfo Id="SignedInfo-{id}">"##,
            r##"<ds:CanonicalizationMethod Algorithm="{c14n}"></ds:CanonicalizationMethod>"##,
            r##"<ds:SignatureMethod Algorithm="{rsa_sha1}"></ds:SignatureMethod>"##,
            r##"<ds:Reference Id="SignedPropertiesID-{id}" Type="{sp_type}" URI="#SignedProperties-{id}">"##,
            r##"<ds:DigestMethod Algorithm="{sha1}"></ds:DigestMethod>"##,
            r##"<ds:DigestValue></ds:DigestValue>"##,
            r##"</ds:Reference>"##,
            r##"<ds:Reference Id="DocumentRef-{id}" URI="#{target}">"##,
            r##"<ds:Transforms>"##,
            r##"<ds:Transform Algorithm="{enveloped}"></ds:Transform>"##,
            r##"</ds:Transforms>"##,
            r##"<ds:DigestMethod Algorithm="{sha1}"></ds:DigestMethod>"##,
            r##"<ds:DigestValue></ds:DigestValue>"##,
            r##"</ds:Reference>"##,
            r##"</ds:SignedInfo>"##,
            r##"<ds:SignatureValue></ds:SignatureValue>"##,
            r##"<ds:KeyInfo Id="Certificate-{id}">"##,
            r##"<ds:X509Data>"##,
            r##"<ds:X509Certificate></ds:X509Certificate>"##,
            r##"</ds:X509Data>"##,
            r##"<ds:KeyValue>"##,
            r##"<ds:RSAKeyValue>"##,
            r##"<ds:Modulus></ds:Modulus>"##,
            r##"<ds:Exponent></ds:Exponent>"##,
            r##"</ds:RSAKeyValue>"##,
            r##"</ds:KeyValue>"##,
            r##"</ds:KeyInfo>"##,
            r##"<ds:Object Id="SignatureObject-{id}">"##,
            r##"<etsi:QualifyingProperties Target="#Signature-{id}">"##,
            r##"<etsi:SignedProperties Id="SignedProperties-{id}">"##,
            r##"<etsi:SignedSignatureProperties>"##,
            r##"<etsi:SigningTime></etsi:SigningTime>"##,
            r##"<etsi:SigningCertificate>"##,
            r##"<etsi:Cert>"##,
            r##"<etsi:CertDigest>"##,
            r##"<ds:DigestMethod Algorithm="{sha1}"></ds:DigestMethod>"##,
            r##"<ds:DigestValue></ds:DigestValue>"##,
            r##"</etsi:CertDigest>"##,
            r##"<etsi:IssuerSerial>"##,
            r##"<ds:X509IssuerName></ds:X509IssuerName>"##,
            r##"<ds:X509SerialNumber></ds:X509SerialNumber>"##,
            r##"</etsi:IssuerSerial>"##,
            r##"</etsi:Cert>"##,
            r##"</etsi:SigningCertificate>"##,
            r##"</etsi:SignedSignatureProperties>"##,
            r##"</etsi:SignedProperties>"##,
            r##"</etsi:QualifyingProperties>"##,
            r##"</ds:Object>"##,
            r##"</ds:Signature>"##,
        ),
        ds = DS_NS,
        etsi = ETSI_NS,
        id = reference_id,
        c14n = C14N_ALGORITHM,
        rsa_sha1 = RSA_SHA1_ALGORITHM,
        sha1 = SHA1_DIGEST_ALGORITHM,
        sp_type = SIGNED_PROPERTIES_TYPE,
        enveloped = ENVELOPED_SIGNATURE_TRANSFORM,
        target = SIGNABLE_ELEMENT_ID,
    )
}
