//! `ds:KeyInfo` content.

use super::{escape, EncryptedKey, XMLDSIG_NS, XMLENC_NS};
use crate::error::SamlResult;
use crate::xml::Element;

/// A `ds:KeyInfo` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyInfo {
    /// Children in document order.
    pub items: Vec<KeyInfoItem>,
}

/// One child of `ds:KeyInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInfoItem {
    /// `ds:X509Data`.
    X509Data(X509Data),
    /// `ds:KeyValue/ds:RSAKeyValue`, base64 components.
    RsaKeyValue {
        /// Base64 modulus.
        modulus: String,
        /// Base64 public exponent.
        exponent: String,
    },
    /// `ds:KeyValue/ds:DSAKeyValue`, base64 components.
    DsaKeyValue {
        /// Base64 prime modulus `P`.
        p: String,
        /// Base64 subgroup order `Q`.
        q: String,
        /// Base64 generator `G`.
        g: String,
        /// Base64 public value `Y`.
        y: String,
    },
    /// `ds:KeyName`.
    KeyName(String),
    /// `xenc:EncryptedKey`.
    EncryptedKey(Box<EncryptedKey>),
    /// `ds:RetrievalMethod`.
    RetrievalMethod {
        /// `URI` attribute.
        uri: Option<String>,
    },
    /// Any other child, by qualified name. A `ds:KeyValue` holding neither
    /// an RSA nor a DSA key also lands here.
    Other(String),
}

/// `ds:X509Data` content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct X509Data {
    /// Base64 DER certificates.
    pub certificates: Vec<String>,
    /// `ds:X509SubjectName` values.
    pub subject_names: Vec<String>,
    /// `ds:X509IssuerSerial` as (issuer, serial).
    pub issuer_serials: Vec<(String, String)>,
    /// Base64 `ds:X509SKI` values.
    pub subject_key_ids: Vec<String>,
}

impl X509Data {
    /// Returns true if no recognised child was present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
            && self.subject_names.is_empty()
            && self.issuer_serials.is_empty()
            && self.subject_key_ids.is_empty()
    }

    fn from_element(element: &Element) -> Self {
        let texts = |name: &'static str| -> Vec<String> {
            element
                .children_named(XMLDSIG_NS, name)
                .map(|el| el.text().trim().to_string())
                .collect()
        };
        Self {
            certificates: texts("X509Certificate"),
            subject_names: texts("X509SubjectName"),
            issuer_serials: element
                .children_named(XMLDSIG_NS, "X509IssuerSerial")
                .map(|el| {
                    let part = |name: &'static str| {
                        el.child(XMLDSIG_NS, name)
                            .map(|c| c.text().trim().to_string())
                            .unwrap_or_default()
                    };
                    (part("X509IssuerName"), part("X509SerialNumber"))
                })
                .collect(),
            subject_key_ids: texts("X509SKI"),
        }
    }
}

impl KeyInfo {
    /// Creates a `KeyInfo` carrying one certificate.
    #[must_use]
    pub fn with_certificate(certificate_base64: impl Into<String>) -> Self {
        Self {
            items: vec![KeyInfoItem::X509Data(X509Data {
                certificates: vec![certificate_base64.into()],
                ..X509Data::default()
            })],
        }
    }

    /// Iterates over base64 certificates in all `X509Data` children.
    pub fn certificates(&self) -> impl Iterator<Item = &str> {
        self.items.iter().flat_map(|item| match item {
            KeyInfoItem::X509Data(data) => {
                data.certificates.iter().map(String::as_str).collect::<Vec<_>>()
            }
            _ => Vec::new(),
        })
    }

    /// Iterates over `EncryptedKey` children.
    pub fn encrypted_keys(&self) -> impl Iterator<Item = &EncryptedKey> {
        self.items.iter().filter_map(|item| match item {
            KeyInfoItem::EncryptedKey(key) => Some(key.as_ref()),
            _ => None,
        })
    }

    /// Reads a `ds:KeyInfo` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let mut items = Vec::new();
        for child in element.child_elements() {
            let item = if child.is(XMLDSIG_NS, "X509Data") {
                KeyInfoItem::X509Data(X509Data::from_element(child))
            } else if child.is(XMLDSIG_NS, "KeyValue") {
                if let Some(rsa) = child.child(XMLDSIG_NS, "RSAKeyValue") {
                    KeyInfoItem::RsaKeyValue {
                        modulus: component(rsa, "Modulus"),
                        exponent: component(rsa, "Exponent"),
                    }
                } else if let Some(dsa) = child.child(XMLDSIG_NS, "DSAKeyValue") {
                    KeyInfoItem::DsaKeyValue {
                        p: component(dsa, "P"),
                        q: component(dsa, "Q"),
                        g: component(dsa, "G"),
                        y: component(dsa, "Y"),
                    }
                } else {
                    KeyInfoItem::Other(child.qualified_name())
                }
            } else if child.is(XMLDSIG_NS, "KeyName") {
                KeyInfoItem::KeyName(child.text().trim().to_string())
            } else if child.is(XMLENC_NS, "EncryptedKey") {
                KeyInfoItem::EncryptedKey(Box::new(EncryptedKey::from_element(child)?))
            } else if child.is(XMLDSIG_NS, "RetrievalMethod") {
                KeyInfoItem::RetrievalMethod {
                    uri: child.attribute("URI").map(str::to_string),
                }
            } else {
                KeyInfoItem::Other(child.qualified_name())
            };
            items.push(item);
        }
        Ok(Self { items })
    }

    /// Writes `ds:KeyInfo` with its own `ds` namespace declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = format!("<ds:KeyInfo xmlns:ds=\"{XMLDSIG_NS}\">");
        for item in &self.items {
            match item {
                KeyInfoItem::X509Data(data) => {
                    out.push_str("<ds:X509Data>");
                    for name in &data.subject_names {
                        out.push_str(&format!("<ds:X509SubjectName>{}</ds:X509SubjectName>", escape(name)));
                    }
                    for cert in &data.certificates {
                        out.push_str(&format!("<ds:X509Certificate>{cert}</ds:X509Certificate>"));
                    }
                    out.push_str("</ds:X509Data>");
                }
                KeyInfoItem::RsaKeyValue { modulus, exponent } => out.push_str(&format!(
                    "<ds:KeyValue><ds:RSAKeyValue><ds:Modulus>{modulus}</ds:Modulus><ds:Exponent>{exponent}</ds:Exponent></ds:RSAKeyValue></ds:KeyValue>"
                )),
                KeyInfoItem::DsaKeyValue { p, q, g, y } => out.push_str(&format!(
                    "<ds:KeyValue><ds:DSAKeyValue><ds:P>{p}</ds:P><ds:Q>{q}</ds:Q><ds:G>{g}</ds:G><ds:Y>{y}</ds:Y></ds:DSAKeyValue></ds:KeyValue>"
                )),
                KeyInfoItem::KeyName(name) => {
                    out.push_str(&format!("<ds:KeyName>{}</ds:KeyName>", escape(name)));
                }
                KeyInfoItem::EncryptedKey(key) => out.push_str(&key.to_xml()),
                KeyInfoItem::RetrievalMethod { .. } | KeyInfoItem::Other(_) => {}
            }
        }
        out.push_str("</ds:KeyInfo>");
        out
    }
}

fn component(key_value: &Element, name: &'static str) -> String {
    key_value
        .child(XMLDSIG_NS, name)
        .map(|c| strip_whitespace(&c.text()))
        .unwrap_or_default()
}

pub(crate) fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}
