//! XML Encryption structures: `EncryptedAssertion`, `EncryptedID` and
//! `EncryptedAttribute` all share the `EncryptedElementType` shape.

use super::key_info::strip_whitespace;
use super::{push_attribute, KeyInfo, XMLDSIG_NS, XMLENC11_NS, XMLENC_NS};
use crate::error::SamlResult;
use crate::xml::{Element, Namespace};

/// `xenc:EncryptionMethod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionMethod {
    /// Algorithm URI.
    pub algorithm: String,
    /// `ds:DigestMethod/@Algorithm` for OAEP.
    pub digest_method: Option<String>,
    /// `xenc11:MGF/@Algorithm` for xmlenc 1.1 OAEP.
    pub mgf: Option<String>,
}

impl EncryptionMethod {
    /// Creates a method with only an algorithm.
    #[must_use]
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            digest_method: None,
            mgf: None,
        }
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            algorithm: super::required_attribute(element, "Algorithm")?.to_string(),
            digest_method: element
                .child(XMLDSIG_NS, "DigestMethod")
                .and_then(|el| el.attribute("Algorithm"))
                .map(str::to_string),
            mgf: element
                .child(XMLENC11_NS, "MGF")
                .and_then(|el| el.attribute("Algorithm"))
                .map(str::to_string),
        })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<xenc:EncryptionMethod");
        push_attribute(&mut out, "Algorithm", Some(&self.algorithm));
        out.push('>');
        if let Some(digest) = &self.digest_method {
            out.push_str(&format!(
                "<ds:DigestMethod xmlns:ds=\"{XMLDSIG_NS}\" Algorithm=\"{digest}\"/>"
            ));
        }
        if let Some(mgf) = &self.mgf {
            out.push_str(&format!(
                "<xenc11:MGF xmlns:xenc11=\"{XMLENC11_NS}\" Algorithm=\"{mgf}\"/>"
            ));
        }
        out.push_str("</xenc:EncryptionMethod>");
        out
    }
}

fn cipher_value(element: &Element) -> Option<String> {
    element
        .child(XMLENC_NS, "CipherData")
        .and_then(|data| data.child(XMLENC_NS, "CipherValue"))
        .map(|value| strip_whitespace(&value.text()))
}

/// `xenc:EncryptedKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedKey {
    /// `Id` attribute.
    pub id: Option<String>,
    /// `Recipient` attribute.
    pub recipient: Option<String>,
    /// Key transport algorithm.
    pub encryption_method: Option<EncryptionMethod>,
    /// Base64 `CipherValue`; `None` for `CipherReference`.
    pub cipher_value: Option<String>,
}

impl EncryptedKey {
    /// Reads an `xenc:EncryptedKey` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            id: element.attribute("Id").map(str::to_string),
            recipient: element.attribute("Recipient").map(str::to_string),
            encryption_method: element
                .child(XMLENC_NS, "EncryptionMethod")
                .map(EncryptionMethod::from_element)
                .transpose()?,
            cipher_value: cipher_value(element),
        })
    }

    /// Writes `xenc:EncryptedKey` with its own `xenc` declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = format!("<xenc:EncryptedKey xmlns:xenc=\"{XMLENC_NS}\"");
        push_attribute(&mut out, "Id", self.id.as_deref());
        push_attribute(&mut out, "Recipient", self.recipient.as_deref());
        out.push('>');
        if let Some(method) = &self.encryption_method {
            out.push_str(&method.to_xml());
        }
        if let Some(value) = &self.cipher_value {
            out.push_str(&format!(
                "<xenc:CipherData><xenc:CipherValue>{value}</xenc:CipherValue></xenc:CipherData>"
            ));
        }
        out.push_str("</xenc:EncryptedKey>");
        out
    }
}

/// `xenc:EncryptedData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    /// `Id` attribute.
    pub id: Option<String>,
    /// `Type` attribute.
    pub type_uri: Option<String>,
    /// Content encryption algorithm.
    pub encryption_method: Option<EncryptionMethod>,
    /// Key information, possibly carrying the `EncryptedKey`.
    pub key_info: Option<KeyInfo>,
    /// Base64 `CipherValue`; `None` for `CipherReference`.
    pub cipher_value: Option<String>,
}

impl EncryptedData {
    /// Reads an `xenc:EncryptedData` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            id: element.attribute("Id").map(str::to_string),
            type_uri: element.attribute("Type").map(str::to_string),
            encryption_method: element
                .child(XMLENC_NS, "EncryptionMethod")
                .map(EncryptionMethod::from_element)
                .transpose()?,
            key_info: element
                .child(XMLDSIG_NS, "KeyInfo")
                .map(KeyInfo::from_element)
                .transpose()?,
            cipher_value: cipher_value(element),
        })
    }

    /// Writes `xenc:EncryptedData` with its own `xenc` declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = format!("<xenc:EncryptedData xmlns:xenc=\"{XMLENC_NS}\"");
        push_attribute(&mut out, "Id", self.id.as_deref());
        push_attribute(&mut out, "Type", self.type_uri.as_deref());
        out.push('>');
        if let Some(method) = &self.encryption_method {
            out.push_str(&method.to_xml());
        }
        if let Some(key_info) = &self.key_info {
            out.push_str(&key_info.to_xml());
        }
        if let Some(value) = &self.cipher_value {
            out.push_str(&format!(
                "<xenc:CipherData><xenc:CipherValue>{value}</xenc:CipherValue></xenc:CipherData>"
            ));
        }
        out.push_str("</xenc:EncryptedData>");
        out
    }
}

/// An `EncryptedElementType` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedElement {
    /// The `EncryptedData` child; required by the schema.
    pub encrypted_data: Option<EncryptedData>,
    /// Sibling `EncryptedKey` children.
    pub encrypted_keys: Vec<EncryptedKey>,
    /// Namespaces in scope at the wrapper, inherited by the plaintext.
    pub namespaces: Vec<Namespace>,
}

impl EncryptedElement {
    /// Reads an `EncryptedAssertion`, `EncryptedID` or `EncryptedAttribute`.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            encrypted_data: element
                .child(XMLENC_NS, "EncryptedData")
                .map(EncryptedData::from_element)
                .transpose()?,
            encrypted_keys: element
                .children_named(XMLENC_NS, "EncryptedKey")
                .map(EncryptedKey::from_element)
                .collect::<SamlResult<_>>()?,
            namespaces: element.in_scope.clone(),
        })
    }

    /// Writes the wrapper as `saml:<local_name>`, binding the `saml` prefix.
    #[must_use]
    pub fn to_xml(&self, local_name: &str) -> String {
        let mut out = format!("<saml:{local_name} xmlns:saml=\"{}\">", super::SAML_NS);
        if let Some(data) = &self.encrypted_data {
            out.push_str(&data.to_xml());
        }
        for key in &self.encrypted_keys {
            out.push_str(&key.to_xml());
        }
        out.push_str(&format!("</saml:{local_name}>"));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    const ENCRYPTED: &str = r#"<saml:EncryptedAssertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">
  <xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#" Type="http://www.w3.org/2001/04/xmlenc#Element">
    <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>
    <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
      <xenc:EncryptedKey>
        <xenc:EncryptionMethod Algorithm="http://www.w3.org/2009/xmlenc11#rsa-oaep">
          <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
          <xenc11:MGF xmlns:xenc11="http://www.w3.org/2009/xmlenc11#" Algorithm="http://www.w3.org/2009/xmlenc11#mgf1sha256"/>
        </xenc:EncryptionMethod>
        <xenc:CipherData><xenc:CipherValue>AAAA
BBBB</xenc:CipherValue></xenc:CipherData>
      </xenc:EncryptedKey>
    </ds:KeyInfo>
    <xenc:CipherData><xenc:CipherValue>CCCC</xenc:CipherValue></xenc:CipherData>
  </xenc:EncryptedData>
</saml:EncryptedAssertion>"#;

    #[test]
    fn reads_nested_encrypted_key() {
        let doc = Document::parse(ENCRYPTED).unwrap();
        let element = EncryptedElement::from_element(doc.root()).unwrap();
        assert!(element.encrypted_keys.is_empty());
        let data = element.encrypted_data.unwrap();
        assert_eq!(data.type_uri.as_deref(), Some(super::super::ENCRYPTED_ELEMENT_TYPE));
        assert_eq!(data.cipher_value.as_deref(), Some("CCCC"));
        let key_info = data.key_info.unwrap();
        let key = key_info.encrypted_keys().next().unwrap();
        assert_eq!(key.cipher_value.as_deref(), Some("AAAABBBB"));
        let method = key.encryption_method.as_ref().unwrap();
        assert_eq!(
            method.digest_method.as_deref(),
            Some("http://www.w3.org/2001/04/xmlenc#sha256")
        );
        assert_eq!(
            method.mgf.as_deref(),
            Some("http://www.w3.org/2009/xmlenc11#mgf1sha256")
        );
        assert_eq!(element.namespaces.len(), 1);
    }

    #[test]
    fn written_element_reads_back() {
        let doc = Document::parse(ENCRYPTED).unwrap();
        let element = EncryptedElement::from_element(doc.root()).unwrap();
        let again = Document::parse(&element.to_xml("EncryptedAssertion")).unwrap();
        assert_eq!(EncryptedElement::from_element(again.root()).unwrap(), element);
    }
}
