//! XML Signature creation.
//!
//! Provides functionality for signing SAML documents using XML-DSig and for
//! producing the detached signature of the HTTP-Redirect binding.

use base64::Engine;
use sp_crypto::{Certificate, KeyValue, PrivateKey};
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::types::{KeyInfo, KeyInfoItem, SAML_NS, XMLDSIG_NS};
use crate::xml::{canonicalize, Document, Element, Node};

use super::{SignatureAlgorithm, SignatureConfig, ENVELOPED_SIGNATURE};

/// XML document signer.
///
/// Signs SAML documents using the configured private key.
#[derive(Clone)]
pub struct XmlSigner {
    key: PrivateKey,
    certificate: Option<Certificate>,
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a new signer. The certificate, when given, is embedded in
    /// `ds:KeyInfo`. RSA keys sign with RSA-SHA256 and DSA keys with
    /// DSA-SHA1 unless [`XmlSigner::with_config`] says otherwise.
    #[must_use]
    pub fn new(key: PrivateKey, certificate: Option<Certificate>) -> Self {
        let algorithm = SignatureAlgorithm::default_for(key.key_type());
        Self {
            key,
            certificate,
            config: SignatureConfig::with_algorithm(algorithm),
        }
    }

    /// Creates a new signer from PEM-encoded key and certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if either PEM block cannot be loaded.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let key = PrivateKey::from_pem(private_key_pem)?;
        let certificate = certificate_pem.map(Certificate::from_pem).transpose()?;
        Ok(Self::new(key, certificate))
    }

    /// Sets the signature configuration.
    #[must_use]
    pub const fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.config.algorithm
    }

    /// Signs the element carrying `element_id`, inserting an enveloped
    /// `ds:Signature` as its child: after `saml:Issuer` when present,
    /// otherwise first.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if the element does not exist
    /// or is already signed, [`SamlError::DuplicateId`] if the ID is not
    /// unique.
    pub fn sign(&self, document: &mut Document, element_id: &str) -> SamlResult<()> {
        let target = document.element_by_id(element_id)?.ok_or_else(|| {
            SamlError::SignatureCreation(format!("no element with ID '{element_id}'"))
        })?;
        if target.child(XMLDSIG_NS, "Signature").is_some() {
            return Err(SamlError::SignatureCreation(format!(
                "element '{element_id}' is already signed"
            )));
        }

        let method = self.config.canonicalization;
        let canonical = canonicalize(target, method, &[], None);
        let digest = sp_crypto::digest(self.config.algorithm.hash(), canonical.as_bytes());
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

        let template = self.signature_template(element_id, &digest_b64);
        let mut signature = Document::parse_fragment(&template, &target.in_scope)?.into_root();

        let signed_info = signature
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or_else(|| SamlError::SignatureCreation("template has no SignedInfo".to_string()))?;
        let canonical_signed_info = canonicalize(signed_info, method, &[], None);
        let value = self.sign_data(canonical_signed_info.as_bytes())?;
        set_signature_value(
            &mut signature,
            base64::engine::general_purpose::STANDARD.encode(value),
        )?;

        let target = document.element_by_id_mut(element_id).ok_or_else(|| {
            SamlError::SignatureCreation(format!("no element with ID '{element_id}'"))
        })?;
        let position = target
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(el) if el.is(SAML_NS, "Issuer")))
            .map_or(0, |index| index + 1);
        target.children.insert(position, Node::Element(signature));

        debug!(
            element_id,
            algorithm = self.config.algorithm.uri(),
            "Signed element"
        );
        Ok(())
    }

    /// Parses `xml`, signs the element carrying `element_id` and serializes
    /// the result.
    ///
    /// # Errors
    ///
    /// See [`XmlSigner::sign`].
    pub fn sign_xml(&self, xml: &str, element_id: &str) -> SamlResult<String> {
        let mut document = Document::parse(xml)?;
        self.sign(&mut document, element_id)?;
        Ok(document.to_xml())
    }

    /// Signs the exact bytes of a Redirect-binding query
    /// (`SAMLRequest=..[&RelayState=..]&SigAlg=..`) and returns the base64
    /// signature.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if signing fails.
    pub fn sign_redirect_query(&self, signed_query: &str) -> SamlResult<String> {
        let signature = self.sign_data(signed_query.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }

    fn sign_data(&self, data: &[u8]) -> SamlResult<Vec<u8>> {
        sp_crypto::sign(&self.key, self.config.algorithm, data)
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))
    }

    fn signature_template(&self, element_id: &str, digest_b64: &str) -> String {
        let c14n = self.config.canonicalization.uri();
        let mut out = format!(
            concat!(
                "<ds:Signature xmlns:ds=\"{ds}\">",
                "<ds:SignedInfo>",
                "<ds:CanonicalizationMethod Algorithm=\"{c14n}\"/>",
                "<ds:SignatureMethod Algorithm=\"{alg}\"/>",
                "<ds:Reference URI=\"#{id}\">",
                "<ds:Transforms>",
                "<ds:Transform Algorithm=\"{enveloped}\"/>",
                "<ds:Transform Algorithm=\"{c14n}\"/>",
                "</ds:Transforms>",
                "<ds:DigestMethod Algorithm=\"{digest_alg}\"/>",
                "<ds:DigestValue>{digest}</ds:DigestValue>",
                "</ds:Reference>",
                "</ds:SignedInfo>",
                "<ds:SignatureValue></ds:SignatureValue>"
            ),
            ds = XMLDSIG_NS,
            c14n = c14n,
            alg = self.config.algorithm.uri(),
            id = crate::types::escape(element_id),
            enveloped = ENVELOPED_SIGNATURE,
            digest_alg = self.config.algorithm.hash().uri(),
            digest = digest_b64,
        );
        let key_info = self.key_info();
        if !key_info.items.is_empty() {
            out.push_str(&key_info.to_xml());
        }
        out.push_str("</ds:Signature>");
        out
    }

    fn key_info(&self) -> KeyInfo {
        let mut key_info = KeyInfo::default();
        if self.config.include_certificate {
            if let Some(certificate) = &self.certificate {
                key_info = KeyInfo::with_certificate(certificate.to_base64());
            }
        }
        if self.config.include_key_value {
            let engine = base64::engine::general_purpose::STANDARD;
            key_info.items.push(match self.key.public_key().key_value() {
                KeyValue::Rsa { modulus, exponent } => KeyInfoItem::RsaKeyValue {
                    modulus: engine.encode(modulus),
                    exponent: engine.encode(exponent),
                },
                KeyValue::Dsa { p, q, g, y } => KeyInfoItem::DsaKeyValue {
                    p: engine.encode(p),
                    q: engine.encode(q),
                    g: engine.encode(g),
                    y: engine.encode(y),
                },
            });
        }
        key_info
    }
}

fn set_signature_value(signature: &mut Element, value: String) -> SamlResult<()> {
    signature
        .children
        .iter_mut()
        .find_map(|node| match node {
            Node::Element(el) if el.is(XMLDSIG_NS, "SignatureValue") => Some(el),
            _ => None,
        })
        .map(|el| el.children = vec![Node::Text(value)])
        .ok_or_else(|| SamlError::SignatureCreation("template has no SignatureValue".to_string()))
}
