//! SAML status-response messages.
//!
//! `Response`, `ArtifactResponse` and `NameIDMappingResponse` all extend
//! `StatusResponseType`: a header, `InResponseTo` and a `Status`.

use super::{
    expect_element, Assertion, EncryptedElement, Identifier, MessageHeader, MessageKind, NameId,
    Status, SAMLP_NS, SAML_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

pub(crate) fn status_of(element: &Element) -> SamlResult<Status> {
    element
        .child(SAMLP_NS, "Status")
        .ok_or_else(|| SamlError::MissingElement(format!("{}/Status", element.local_name)))
        .and_then(Status::from_element)
}

fn in_response_to(element: &Element) -> Option<String> {
    element.attribute("InResponseTo").map(str::to_string)
}

/// SAML Response.
///
/// A response message sent from an identity provider to a service provider
/// containing authentication results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Common message fields.
    pub header: MessageHeader,
    /// The ID of the request this response is for.
    pub in_response_to: Option<String>,
    /// The status of the response.
    pub status: Status,
    /// Plain assertions.
    pub assertions: Vec<Assertion>,
    /// Encrypted assertions.
    pub encrypted_assertions: Vec<EncryptedElement>,
}

impl Response {
    /// Creates a new success response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self {
            header: MessageHeader::new(issuer),
            in_response_to: None,
            status: Status::success(),
            assertions: Vec::new(),
            encrypted_assertions: Vec::new(),
        }
    }

    /// Sets the request ID this response is for.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.header.destination = Some(url.into());
        self
    }

    /// Adds an assertion to this response.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Adds an encrypted assertion to this response.
    #[must_use]
    pub fn with_encrypted_assertion(mut self, assertion: EncryptedElement) -> Self {
        self.encrypted_assertions.push(assertion);
        self
    }

    /// Returns true if this response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Reads a `samlp:Response` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "Response")?;
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            in_response_to: in_response_to(element),
            status: status_of(element)?,
            assertions: element
                .children_named(SAML_NS, "Assertion")
                .map(Assertion::from_element)
                .collect::<SamlResult<_>>()?,
            encrypted_assertions: element
                .children_named(SAML_NS, "EncryptedAssertion")
                .map(EncryptedElement::from_element)
                .collect::<SamlResult<_>>()?,
        })
    }

    /// Serializes the response.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = self
            .header
            .open("Response", &[("InResponseTo", self.in_response_to.as_deref())]);
        out.push_str(&self.status.to_xml());
        for assertion in &self.assertions {
            out.push_str(&assertion.to_xml());
        }
        for encrypted in &self.encrypted_assertions {
            out.push_str(&encrypted.to_xml("EncryptedAssertion"));
        }
        out.push_str("</samlp:Response>");
        out
    }
}

/// Artifact resolution response, carrying the referenced message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactResponse {
    /// Common message fields.
    pub header: MessageHeader,
    /// ID of the `ArtifactResolve` answered.
    pub in_response_to: Option<String>,
    /// Resolution status.
    pub status: Status,
    /// The resolved protocol message; absent if the artifact was unknown.
    pub message: Option<Element>,
}

impl ArtifactResponse {
    /// Creates a success response wrapping `message`.
    #[must_use]
    pub fn new(issuer: impl Into<String>, in_response_to: impl Into<String>, message: Option<Element>) -> Self {
        Self {
            header: MessageHeader::new(issuer),
            in_response_to: Some(in_response_to.into()),
            status: Status::success(),
            message,
        }
    }

    /// Returns the kind of the embedded message.
    #[must_use]
    pub fn message_kind(&self) -> Option<MessageKind> {
        self.message.as_ref().and_then(MessageKind::of)
    }

    /// Reads a `samlp:ArtifactResponse` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "ArtifactResponse")?;
        let message = element
            .child_elements()
            .find(|child| {
                !child.is(SAML_NS, "Issuer")
                    && !child.is(SAMLP_NS, "Status")
                    && !child.is(SAMLP_NS, "Extensions")
                    && !child.is(super::XMLDSIG_NS, "Signature")
            })
            .cloned();
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            in_response_to: in_response_to(element),
            status: status_of(element)?,
            message,
        })
    }

    /// Serializes the response. The embedded message is written with all
    /// its in-scope namespaces so an enveloped signature inside it stays valid.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = self
            .header
            .open("ArtifactResponse", &[("InResponseTo", self.in_response_to.as_deref())]);
        out.push_str(&self.status.to_xml());
        if let Some(message) = &self.message {
            out.push_str(&message.to_standalone_xml());
        }
        out.push_str("</samlp:ArtifactResponse>");
        out
    }
}

/// Name identifier mapping response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameIdMappingResponse {
    /// Common message fields.
    pub header: MessageHeader,
    /// ID of the request answered.
    pub in_response_to: Option<String>,
    /// Mapping status.
    pub status: Status,
    /// The mapped identifier.
    pub identifier: Option<Identifier>,
}

impl NameIdMappingResponse {
    /// Reads a `samlp:NameIDMappingResponse` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "NameIDMappingResponse")?;
        let identifier = if let Some(name_id) = element.child(SAML_NS, "NameID") {
            Some(Identifier::NameId(NameId::from_element(name_id)?))
        } else {
            element
                .child(SAML_NS, "EncryptedID")
                .map(|el| EncryptedElement::from_element(el).map(Identifier::EncryptedId))
                .transpose()?
        };
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            in_response_to: in_response_to(element),
            status: status_of(element)?,
            identifier,
        })
    }
}
