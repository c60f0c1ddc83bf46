//! XML Signature support for SAML.
//!
//! This module provides XML Digital Signature (XML-DSig) support for
//! signing and validating SAML messages and assertions, plus the detached
//! query-string signature of the HTTP-Redirect binding.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//! - RSA-SHA1 and DSA-SHA1, verified only when explicitly allowed
//!
//! # Accepted signature shape
//!
//! An enveloped signature is accepted for an element only when the
//! `ds:Signature` is a direct child of that element, carries exactly one
//! `ds:Reference` whose URI is `#` followed by the element's ID, that ID is
//! unique in the document, and the transforms are limited to
//! enveloped-signature plus one canonicalization method.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use base64::Engine;
pub use sp_crypto::{HashAlgorithm, SignatureAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::types::{KeyInfo, XMLDSIG_NS};
use crate::xml::{CanonicalizationMethod, Element};

/// Enveloped-signature transform URI.
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Namespace of `InclusiveNamespaces`.
pub const EXC_C14N_NS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Configuration for signature creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureConfig {
    /// The signature algorithm to use.
    pub algorithm: SignatureAlgorithm,
    /// The canonicalization algorithm to use.
    pub canonicalization: CanonicalizationMethod,
    /// Whether to include the X.509 certificate in the signature.
    pub include_certificate: bool,
    /// Whether to include the public key value in the signature.
    pub include_key_value: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            algorithm: SignatureAlgorithm::RsaSha256,
            canonicalization: CanonicalizationMethod::ExclusiveC14N,
            include_certificate: true,
            include_key_value: false,
        }
    }
}

impl SignatureConfig {
    /// Creates a new signature configuration with the given algorithm.
    #[must_use]
    pub const fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            canonicalization: CanonicalizationMethod::ExclusiveC14N,
            include_certificate: true,
            include_key_value: false,
        }
    }
}

/// A parsed `ds:Signature` element.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// `SignedInfo/CanonicalizationMethod`.
    pub canonicalization: CanonicalizationMethod,
    /// PrefixList of the `SignedInfo` canonicalization.
    pub signed_info_prefixes: Vec<String>,
    /// `SignedInfo/SignatureMethod`.
    pub algorithm: SignatureAlgorithm,
    /// The reference URI, including the leading `#`.
    pub reference_uri: String,
    /// Whether the enveloped-signature transform is listed.
    pub enveloped: bool,
    /// Canonicalization applied to the referenced element.
    pub reference_canonicalization: CanonicalizationMethod,
    /// PrefixList of the reference canonicalization.
    pub reference_prefixes: Vec<String>,
    /// `Reference/DigestMethod`.
    pub digest_algorithm: HashAlgorithm,
    /// Decoded `DigestValue`.
    pub digest_value: Vec<u8>,
    /// Decoded `SignatureValue`.
    pub signature_value: Vec<u8>,
    /// `ds:KeyInfo`, if present.
    pub key_info: Option<KeyInfo>,
}

impl XmlSignature {
    /// Reads a `ds:Signature` element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureMalformed`] for structural problems and
    /// [`SamlError::UnsupportedAlgorithm`] for unknown algorithm URIs.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let signed_info = required_child(element, "SignedInfo")?;

        let c14n_el = required_child(signed_info, "CanonicalizationMethod")?;
        let canonicalization = canonicalization_of(c14n_el)?;
        let signature_method = required_child(signed_info, "SignatureMethod")?;
        let algorithm = SignatureAlgorithm::from_uri(algorithm_attribute(signature_method)?)?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references
            .next()
            .ok_or_else(|| SamlError::SignatureMalformed("SignedInfo has no Reference".to_string()))?;
        if references.next().is_some() {
            return Err(SamlError::SignatureMalformed(
                "SignedInfo must contain exactly one Reference".to_string(),
            ));
        }
        let reference_uri = reference
            .attribute("URI")
            .ok_or_else(|| SamlError::SignatureMalformed("Reference has no URI".to_string()))?
            .to_string();

        let mut enveloped = false;
        let mut reference_c14n: Option<(CanonicalizationMethod, Vec<String>)> = None;
        if let Some(transforms) = reference.child(XMLDSIG_NS, "Transforms") {
            for transform in transforms.children_named(XMLDSIG_NS, "Transform") {
                let uri = algorithm_attribute(transform)?;
                if uri == ENVELOPED_SIGNATURE {
                    enveloped = true;
                } else if CanonicalizationMethod::from_uri(uri).is_some() {
                    if reference_c14n.is_some() {
                        return Err(SamlError::SignatureMalformed(
                            "more than one canonicalization transform".to_string(),
                        ));
                    }
                    reference_c14n = Some((canonicalization_of(transform)?, prefix_list(transform)));
                } else {
                    return Err(SamlError::UnsupportedAlgorithm(format!("transform {uri}")));
                }
            }
        }
        let (reference_canonicalization, reference_prefixes) =
            reference_c14n.unwrap_or((CanonicalizationMethod::C14N, Vec::new()));

        let digest_algorithm =
            HashAlgorithm::from_uri(algorithm_attribute(required_child(reference, "DigestMethod")?)?)?;
        let digest_value = decode_value(required_child(reference, "DigestValue")?, "DigestValue")?;
        let signature_value = decode_value(required_child(element, "SignatureValue")?, "SignatureValue")?;

        Ok(Self {
            canonicalization,
            signed_info_prefixes: prefix_list(c14n_el),
            algorithm,
            reference_uri,
            enveloped,
            reference_canonicalization,
            reference_prefixes,
            digest_algorithm,
            digest_value,
            signature_value,
            key_info: element
                .child(XMLDSIG_NS, "KeyInfo")
                .map(KeyInfo::from_element)
                .transpose()?,
        })
    }

    /// Returns true if either algorithm relies on SHA-1.
    #[must_use]
    pub fn uses_sha1(&self) -> bool {
        self.algorithm.is_deprecated() || self.digest_algorithm.is_deprecated()
    }
}

fn required_child<'a>(element: &'a Element, name: &str) -> SamlResult<&'a Element> {
    element
        .child(XMLDSIG_NS, name)
        .ok_or_else(|| SamlError::SignatureMalformed(format!("missing ds:{name}")))
}

fn algorithm_attribute(element: &Element) -> SamlResult<&str> {
    element.attribute("Algorithm").ok_or_else(|| {
        SamlError::SignatureMalformed(format!("ds:{} has no Algorithm", element.local_name))
    })
}

fn canonicalization_of(element: &Element) -> SamlResult<CanonicalizationMethod> {
    let uri = algorithm_attribute(element)?;
    CanonicalizationMethod::from_uri(uri)
        .ok_or_else(|| SamlError::UnsupportedAlgorithm(format!("canonicalization {uri}")))
}

fn prefix_list(element: &Element) -> Vec<String> {
    element
        .child(EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|el| el.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn decode_value(element: &Element, name: &str) -> SamlResult<Vec<u8>> {
    let text: String = element
        .text()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| SamlError::SignatureMalformed(format!("{name} is not base64: {e}")))
}
