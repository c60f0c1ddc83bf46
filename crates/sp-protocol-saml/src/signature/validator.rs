//! XML Signature validation.
//!
//! Provides functionality for validating signatures on SAML documents.
//! A digest or signature value that does not match yields `Ok(false)`;
//! anything structurally wrong with the signature is an error. Callers treat
//! both as a rejection.

use std::ptr;

use base64::Engine;
use sp_crypto::{Certificate, PublicKey};
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::types::{KeyInfo, KeyInfoItem, XMLDSIG_NS};
use crate::xml::{canonicalize, Document, Element};

use super::{SignatureAlgorithm, XmlSignature};

/// A candidate verification key taken from `ds:KeyInfo`.
#[derive(Debug, Clone)]
pub enum SignatureKey {
    /// From `ds:X509Certificate`.
    Certificate(Certificate),
    /// From `ds:RSAKeyValue` or `ds:DSAKeyValue`.
    KeyValue(PublicKey),
}

impl SignatureKey {
    /// Returns the public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        match self {
            Self::Certificate(certificate) => certificate.public_key(),
            Self::KeyValue(key) => key,
        }
    }

    /// Returns the certificate, if the key came with one.
    #[must_use]
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            Self::Certificate(certificate) => Some(certificate),
            Self::KeyValue(_) => None,
        }
    }
}

/// XML signature validator.
///
/// Validates signatures on SAML documents using configured trusted keys.
#[derive(Debug, Clone)]
pub struct XmlSignatureValidator {
    keys: Vec<PublicKey>,
    allow_sha1: bool,
}

impl XmlSignatureValidator {
    /// Creates a new validator with the given trusted keys.
    #[must_use]
    pub fn new(keys: Vec<PublicKey>) -> Self {
        Self {
            keys,
            allow_sha1: false,
        }
    }

    /// Creates a validator trusting the keys of `certificates`.
    pub fn from_certificates<'a>(certificates: impl IntoIterator<Item = &'a Certificate>) -> Self {
        Self::new(
            certificates
                .into_iter()
                .map(|certificate| certificate.public_key().clone())
                .collect(),
        )
    }

    /// Allows SHA-1 based signatures and digests.
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Returns true if no key is trusted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Checks the enveloped signature of the document element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::WhitespaceNotPreserved`] for documents parsed
    /// without whitespace, [`SamlError::SignatureMissing`] if the element is
    /// unsigned, and other signature errors for malformed or wrapped
    /// signatures.
    pub fn check_signature(&self, document: &Document) -> SamlResult<bool> {
        self.check_element(document, document.root())
    }

    /// Checks the enveloped signature of `element`, which must belong to
    /// `document`.
    ///
    /// # Errors
    ///
    /// See [`XmlSignatureValidator::check_signature`].
    pub fn check_element(&self, document: &Document, element: &Element) -> SamlResult<bool> {
        verify_element(document, element, &self.keys, self.allow_sha1)
    }

    /// Checks a Redirect-binding signature over the raw query bytes.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or disallowed algorithms and for a
    /// signature that is not base64.
    pub fn check_redirect(
        &self,
        signed_query: &str,
        sig_alg: &str,
        signature_b64: &str,
    ) -> SamlResult<bool> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg)?;
        if algorithm.is_deprecated() && !self.allow_sha1 {
            return Err(SamlError::UnsupportedAlgorithm(format!(
                "SHA-1 signatures are not allowed: {sig_alg}"
            )));
        }
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature_b64.trim())
            .map_err(|e| SamlError::SignatureMalformed(format!("Signature is not base64: {e}")))?;
        let valid = self
            .keys
            .iter()
            .any(|key| sp_crypto::verify(key, algorithm, signed_query.as_bytes(), &signature));
        if !valid {
            debug!(keys = self.keys.len(), "Redirect signature did not verify");
        }
        Ok(valid)
    }
}

/// Checks the document element's signature with keys from its own
/// `ds:KeyInfo`.
///
/// This proves integrity only. The key must still be matched against a
/// trust anchor, see [`extract_signature_keys`].
///
/// # Errors
///
/// As [`XmlSignatureValidator::check_signature`], plus
/// [`SamlError::SignatureMalformed`] if `KeyInfo` holds no usable key.
pub fn check_signature(document: &Document) -> SamlResult<bool> {
    let keys: Vec<PublicKey> = extract_signature_keys(document)?
        .iter()
        .map(|key| key.public_key().clone())
        .collect();
    if keys.is_empty() {
        return Err(SamlError::SignatureMalformed(
            "signature carries no usable key".to_string(),
        ));
    }
    verify_element(document, document.root(), &keys, false)
}

/// Checks the document element's signature with an explicit key.
///
/// # Errors
///
/// See [`XmlSignatureValidator::check_signature`].
pub fn check_signature_with_key(document: &Document, key: &PublicKey) -> SamlResult<bool> {
    verify_element(document, document.root(), std::slice::from_ref(key), false)
}

/// Returns the candidate keys in the document element's signature.
///
/// # Errors
///
/// Returns [`SamlError::SignatureMissing`] if the element is unsigned and
/// [`SamlError::SignatureMalformed`] for undecodable key material.
pub fn extract_signature_keys(document: &Document) -> SamlResult<Vec<SignatureKey>> {
    signature_keys(document.root())
}

/// Returns the candidate keys in `element`'s own signature.
///
/// # Errors
///
/// See [`extract_signature_keys`].
pub fn signature_keys(element: &Element) -> SamlResult<Vec<SignatureKey>> {
    let signature = signature_child(element)?;
    match signature.child(XMLDSIG_NS, "KeyInfo") {
        Some(key_info) => keys_from_key_info(&KeyInfo::from_element(key_info)?),
        None => Ok(Vec::new()),
    }
}

/// Decodes the certificates and RSA or DSA key values of a `KeyInfo`.
///
/// # Errors
///
/// Returns [`SamlError::SignatureMalformed`] for undecodable key material.
pub fn keys_from_key_info(key_info: &KeyInfo) -> SamlResult<Vec<SignatureKey>> {
    let engine = base64::engine::general_purpose::STANDARD;
    let decode = |label: &str, value: &str| {
        engine
            .decode(value)
            .map_err(|e| SamlError::SignatureMalformed(format!("{label}: {e}")))
    };
    let mut keys = Vec::new();
    for item in &key_info.items {
        match item {
            KeyInfoItem::X509Data(data) => {
                for encoded in &data.certificates {
                    let certificate = Certificate::from_base64(encoded)
                        .map_err(|e| SamlError::SignatureMalformed(e.to_string()))?;
                    keys.push(SignatureKey::Certificate(certificate));
                }
            }
            KeyInfoItem::RsaKeyValue { modulus, exponent } => {
                let key = PublicKey::from_components(
                    &decode("RSAKeyValue", modulus)?,
                    &decode("RSAKeyValue", exponent)?,
                )
                .map_err(|e| SamlError::SignatureMalformed(e.to_string()))?;
                keys.push(SignatureKey::KeyValue(key));
            }
            KeyInfoItem::DsaKeyValue { p, q, g, y } => {
                let key = PublicKey::from_dsa_components(
                    &decode("DSAKeyValue", p)?,
                    &decode("DSAKeyValue", q)?,
                    &decode("DSAKeyValue", g)?,
                    &decode("DSAKeyValue", y)?,
                )
                .map_err(|e| SamlError::SignatureMalformed(e.to_string()))?;
                keys.push(SignatureKey::KeyValue(key));
            }
            _ => {}
        }
    }
    Ok(keys)
}

fn signature_child(element: &Element) -> SamlResult<&Element> {
    let mut signatures = element.children_named(XMLDSIG_NS, "Signature");
    let signature = signatures.next().ok_or(SamlError::SignatureMissing)?;
    if signatures.next().is_some() {
        return Err(SamlError::SignatureMalformed(format!(
            "{} carries more than one Signature",
            element.local_name
        )));
    }
    Ok(signature)
}

fn verify_element(
    document: &Document,
    element: &Element,
    keys: &[PublicKey],
    allow_sha1: bool,
) -> SamlResult<bool> {
    if !document.preserves_whitespace() {
        return Err(SamlError::WhitespaceNotPreserved);
    }
    let signature_element = signature_child(element)?;
    let signature = XmlSignature::from_element(signature_element)?;
    if signature.uses_sha1() && !allow_sha1 {
        return Err(SamlError::UnsupportedAlgorithm(
            "SHA-1 signatures are not allowed".to_string(),
        ));
    }

    let id = element.id().ok_or_else(|| {
        SamlError::SignatureMalformed(format!("signed {} has no ID", element.local_name))
    })?;
    if signature.reference_uri.strip_prefix('#') != Some(id) {
        return Err(SamlError::SignatureMalformed(format!(
            "Reference '{}' does not point at the signed element '{id}'",
            signature.reference_uri
        )));
    }
    match document.element_by_id(id)? {
        Some(found) if ptr::eq(found, element) => {}
        _ => {
            return Err(SamlError::SignatureMalformed(format!(
                "ID '{id}' does not resolve to the signed element"
            )))
        }
    }

    let excluded = signature.enveloped.then_some(signature_element);
    let canonical = canonicalize(
        element,
        signature.reference_canonicalization,
        &signature.reference_prefixes,
        excluded,
    );
    let digest = sp_crypto::digest(signature.digest_algorithm, canonical.as_bytes());
    if digest != signature.digest_value {
        debug!(id, "Digest mismatch");
        return Ok(false);
    }

    let signed_info = signature_element
        .child(XMLDSIG_NS, "SignedInfo")
        .ok_or_else(|| SamlError::SignatureMalformed("missing ds:SignedInfo".to_string()))?;
    let canonical_signed_info = canonicalize(
        signed_info,
        signature.canonicalization,
        &signature.signed_info_prefixes,
        None,
    );
    let valid = keys.iter().any(|key| {
        sp_crypto::verify(
            key,
            signature.algorithm,
            canonical_signed_info.as_bytes(),
            &signature.signature_value,
        )
    });
    if !valid {
        debug!(id, keys = keys.len(), "Signature value did not verify");
    }
    Ok(valid)
}
