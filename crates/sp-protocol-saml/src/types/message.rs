//! Protocol message envelope shared by every request and response.

use std::fmt;

use chrono::{DateTime, Utc};

use super::{
    format_instant, issuer_of, parse_instant, push_attribute, required_attribute,
    ArtifactResolve, ArtifactResponse, AuthnRequest, Issuer, LogoutRequest, LogoutResponse,
    NameId, NameIdMappingRequest, NameIdMappingResponse, Response, SAMLP_NS, SAML_NS, XMLDSIG_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// Fields common to all protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message ID.
    pub id: String,
    /// Protocol version, always "2.0".
    pub version: String,
    /// When the message was issued.
    pub issue_instant: DateTime<Utc>,
    /// Issuing entity.
    pub issuer: Option<Issuer>,
    /// Intended recipient endpoint.
    pub destination: Option<String>,
    /// Consent URI.
    pub consent: Option<String>,
    /// Whether a `ds:Signature` child is present.
    pub signed: bool,
}

impl MessageHeader {
    /// Creates a header with a fresh ID, issued now.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            version: "2.0".to_string(),
            issue_instant: Utc::now(),
            issuer: Some(NameId::new(issuer)),
            destination: None,
            consent: None,
            signed: false,
        }
    }

    /// Returns the issuer entity ID, if present.
    #[must_use]
    pub fn issuer_value(&self) -> Option<&str> {
        self.issuer.as_ref().map(|issuer| issuer.value.as_str())
    }

    pub(crate) fn from_element(element: &Element) -> SamlResult<Self> {
        let instant = required_attribute(element, "IssueInstant")?;
        Ok(Self {
            id: required_attribute(element, "ID")?.to_string(),
            version: required_attribute(element, "Version")?.to_string(),
            issue_instant: parse_instant(&format!("{}/@IssueInstant", element.local_name), instant)?,
            issuer: issuer_of(element)?,
            destination: element.attribute("Destination").map(str::to_string),
            consent: element.attribute("Consent").map(str::to_string),
            signed: element.child(XMLDSIG_NS, "Signature").is_some(),
        })
    }

    /// Writes the opening tag, namespace declarations and `Issuer`.
    pub(crate) fn open(&self, local_name: &str, extra: &[(&str, Option<&str>)]) -> String {
        let mut out = format!(
            "<samlp:{local_name} xmlns:samlp=\"{SAMLP_NS}\" xmlns:saml=\"{SAML_NS}\""
        );
        push_attribute(&mut out, "ID", Some(&self.id));
        push_attribute(&mut out, "Version", Some(&self.version));
        push_attribute(&mut out, "IssueInstant", Some(&format_instant(&self.issue_instant)));
        push_attribute(&mut out, "Destination", self.destination.as_deref());
        push_attribute(&mut out, "Consent", self.consent.as_deref());
        for (name, value) in extra {
            push_attribute(&mut out, name, *value);
        }
        out.push('>');
        if let Some(issuer) = &self.issuer {
            out.push_str(&issuer.to_xml("Issuer"));
        }
        out
    }
}

/// The concrete kind of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `samlp:AuthnRequest`.
    AuthnRequest,
    /// `samlp:Response`.
    Response,
    /// `samlp:LogoutRequest`.
    LogoutRequest,
    /// `samlp:LogoutResponse`.
    LogoutResponse,
    /// `samlp:ArtifactResolve`.
    ArtifactResolve,
    /// `samlp:ArtifactResponse`.
    ArtifactResponse,
    /// `samlp:NameIDMappingRequest`.
    NameIdMappingRequest,
    /// `samlp:NameIDMappingResponse`.
    NameIdMappingResponse,
}

impl MessageKind {
    const ALL: [Self; 8] = [
        Self::AuthnRequest,
        Self::Response,
        Self::LogoutRequest,
        Self::LogoutResponse,
        Self::ArtifactResolve,
        Self::ArtifactResponse,
        Self::NameIdMappingRequest,
        Self::NameIdMappingResponse,
    ];

    /// Returns the protocol element's local name.
    #[must_use]
    pub const fn element_name(self) -> &'static str {
        match self {
            Self::AuthnRequest => "AuthnRequest",
            Self::Response => "Response",
            Self::LogoutRequest => "LogoutRequest",
            Self::LogoutResponse => "LogoutResponse",
            Self::ArtifactResolve => "ArtifactResolve",
            Self::ArtifactResponse => "ArtifactResponse",
            Self::NameIdMappingRequest => "NameIDMappingRequest",
            Self::NameIdMappingResponse => "NameIDMappingResponse",
        }
    }

    /// Classifies a protocol element.
    #[must_use]
    pub fn of(element: &Element) -> Option<Self> {
        if element.namespace.as_deref() != Some(SAMLP_NS) {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.element_name() == element.local_name)
    }

    /// Returns true for request messages.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::AuthnRequest
                | Self::LogoutRequest
                | Self::ArtifactResolve
                | Self::NameIdMappingRequest
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Any SAML protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// Authentication request.
    AuthnRequest(AuthnRequest),
    /// Authentication response.
    Response(Response),
    /// Logout request.
    LogoutRequest(LogoutRequest),
    /// Logout response.
    LogoutResponse(LogoutResponse),
    /// Artifact resolution request.
    ArtifactResolve(ArtifactResolve),
    /// Artifact resolution response.
    ArtifactResponse(ArtifactResponse),
    /// Name identifier mapping request.
    NameIdMappingRequest(NameIdMappingRequest),
    /// Name identifier mapping response.
    NameIdMappingResponse(NameIdMappingResponse),
}

impl ProtocolMessage {
    /// Reads any protocol message element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnexpectedMessage`] for elements that are not
    /// protocol messages, or the parse error of the concrete type.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let kind = MessageKind::of(element).ok_or_else(|| SamlError::UnexpectedMessage {
            expected: "SAML protocol message",
            actual: element.qualified_name(),
        })?;
        Ok(match kind {
            MessageKind::AuthnRequest => Self::AuthnRequest(AuthnRequest::from_element(element)?),
            MessageKind::Response => Self::Response(Response::from_element(element)?),
            MessageKind::LogoutRequest => {
                Self::LogoutRequest(LogoutRequest::from_element(element)?)
            }
            MessageKind::LogoutResponse => {
                Self::LogoutResponse(LogoutResponse::from_element(element)?)
            }
            MessageKind::ArtifactResolve => {
                Self::ArtifactResolve(ArtifactResolve::from_element(element)?)
            }
            MessageKind::ArtifactResponse => {
                Self::ArtifactResponse(ArtifactResponse::from_element(element)?)
            }
            MessageKind::NameIdMappingRequest => {
                Self::NameIdMappingRequest(NameIdMappingRequest::from_element(element)?)
            }
            MessageKind::NameIdMappingResponse => {
                Self::NameIdMappingResponse(NameIdMappingResponse::from_element(element)?)
            }
        })
    }

    /// Returns the message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::AuthnRequest(_) => MessageKind::AuthnRequest,
            Self::Response(_) => MessageKind::Response,
            Self::LogoutRequest(_) => MessageKind::LogoutRequest,
            Self::LogoutResponse(_) => MessageKind::LogoutResponse,
            Self::ArtifactResolve(_) => MessageKind::ArtifactResolve,
            Self::ArtifactResponse(_) => MessageKind::ArtifactResponse,
            Self::NameIdMappingRequest(_) => MessageKind::NameIdMappingRequest,
            Self::NameIdMappingResponse(_) => MessageKind::NameIdMappingResponse,
        }
    }

    /// Returns the common header.
    #[must_use]
    pub const fn header(&self) -> &MessageHeader {
        match self {
            Self::AuthnRequest(m) => &m.header,
            Self::Response(m) => &m.header,
            Self::LogoutRequest(m) => &m.header,
            Self::LogoutResponse(m) => &m.header,
            Self::ArtifactResolve(m) => &m.header,
            Self::ArtifactResponse(m) => &m.header,
            Self::NameIdMappingRequest(m) => &m.header,
            Self::NameIdMappingResponse(m) => &m.header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    #[test]
    fn dispatches_on_element_name() {
        let doc = Document::parse(&format!(
            r#"<samlp:LogoutResponse xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="_l" Version="2.0" IssueInstant="2024-03-01T12:00:00Z" InResponseTo="_r"><saml:Issuer>idp</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:LogoutResponse>"#
        ))
        .unwrap();
        let message = ProtocolMessage::from_element(doc.root()).unwrap();
        assert_eq!(message.kind(), MessageKind::LogoutResponse);
        assert!(!message.kind().is_request());
        assert_eq!(message.header().id, "_l");
        assert_eq!(message.header().issuer_value(), Some("idp"));
    }

    #[test]
    fn rejects_non_protocol_elements() {
        let doc = Document::parse(&format!(
            r#"<saml:Assertion xmlns:saml="{SAML_NS}"/>"#
        ))
        .unwrap();
        assert!(matches!(
            ProtocolMessage::from_element(doc.root()),
            Err(SamlError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn header_requires_id() {
        let doc = Document::parse(&format!(
            r#"<samlp:LogoutRequest xmlns:samlp="{SAMLP_NS}" Version="2.0" IssueInstant="2024-03-01T12:00:00Z"/>"#
        ))
        .unwrap();
        assert!(matches!(
            MessageHeader::from_element(doc.root()),
            Err(SamlError::MissingAttribute { attribute: "ID", .. })
        ));
    }
}
