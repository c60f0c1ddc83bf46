//! SAML Name ID types.
//!
//! Name identifiers are used to identify subjects in SAML assertions.

use serde::{Deserialize, Serialize};

use super::{escape, push_attribute, NameIdFormat, SAML_NS};
use crate::error::SamlResult;
use crate::xml::Element;

/// SAML Name ID.
///
/// Represents the identifier of a subject in a SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format of the name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// A provider identifier for the SP that was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_provided_id: Option<String>,
}

/// `Issuer` shares the `NameIDType` schema type.
pub type Issuer = NameId;

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
            sp_provided_id: None,
        }
    }

    /// Creates a new persistent name ID.
    #[must_use]
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Persistent)
    }

    /// Creates a new transient name ID.
    #[must_use]
    pub fn transient(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Transient)
    }

    /// Sets the format for this name ID.
    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    /// Sets the name qualifier.
    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Returns the parsed name ID format, `None` for unknown URIs.
    #[must_use]
    pub fn parsed_format(&self) -> Option<NameIdFormat> {
        match &self.format {
            None => Some(NameIdFormat::Unspecified),
            Some(uri) => NameIdFormat::from_uri(uri),
        }
    }

    /// Reads a `NameIDType` element such as `NameID` or `Issuer`.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let owned = |name: &str| element.attribute(name).map(str::to_string);
        Ok(Self {
            value: element.text(),
            format: owned("Format"),
            name_qualifier: owned("NameQualifier"),
            sp_name_qualifier: owned("SPNameQualifier"),
            sp_provided_id: owned("SPProvidedID"),
        })
    }

    /// Writes this value as `saml:<local_name>`. The `saml` prefix must be
    /// bound by the caller.
    #[must_use]
    pub fn to_xml(&self, local_name: &str) -> String {
        let mut out = format!("<saml:{local_name}");
        push_attribute(&mut out, "NameQualifier", self.name_qualifier.as_deref());
        push_attribute(&mut out, "SPNameQualifier", self.sp_name_qualifier.as_deref());
        push_attribute(&mut out, "Format", self.format.as_deref());
        push_attribute(&mut out, "SPProvidedID", self.sp_provided_id.as_deref());
        out.push('>');
        out.push_str(&escape(&self.value));
        out.push_str(&format!("</saml:{local_name}>"));
        out
    }
}

/// Reads the optional `saml:Issuer` child of a message or assertion.
pub(crate) fn issuer_of(element: &Element) -> SamlResult<Option<Issuer>> {
    element
        .child(SAML_NS, "Issuer")
        .map(NameId::from_element)
        .transpose()
}

/// Name ID policy for authentication requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// The requested name ID format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The SP name qualifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// Whether the IdP may create a new identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_create: Option<bool>,
}

impl NameIdPolicy {
    /// Creates a policy requesting `format`.
    #[must_use]
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::default()
        }
    }

    /// Sets `AllowCreate`.
    #[must_use]
    pub const fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = Some(allow);
        self
    }

    pub(crate) fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            format: element.attribute("Format").map(str::to_string),
            sp_name_qualifier: element.attribute("SPNameQualifier").map(str::to_string),
            allow_create: super::optional_bool(element, "AllowCreate")?,
        })
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut out = String::from("<samlp:NameIDPolicy");
        push_attribute(&mut out, "Format", self.format.as_deref());
        push_attribute(&mut out, "SPNameQualifier", self.sp_name_qualifier.as_deref());
        if let Some(allow) = self.allow_create {
            push_attribute(&mut out, "AllowCreate", Some(if allow { "true" } else { "false" }));
        }
        out.push_str("/>");
        out
    }
}
