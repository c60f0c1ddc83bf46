//! SAML Single Logout types.

use chrono::{DateTime, Utc};

use super::response::status_of;
use super::{
    escape, expect_element, format_instant, optional_instant, EncryptedElement, Identifier,
    MessageHeader, NameId, Status, SAMLP_NS, SAML_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Logout Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRequest {
    /// Common message fields.
    pub header: MessageHeader,
    /// Time after which the request expires.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Reason URI.
    pub reason: Option<String>,
    /// Principal being logged out.
    pub identifier: Option<Identifier>,
    /// Session indexes to terminate.
    pub session_indexes: Vec<String>,
}

impl LogoutRequest {
    /// Creates a new logout request for `name_id`.
    #[must_use]
    pub fn new(issuer: impl Into<String>, name_id: NameId) -> Self {
        Self {
            header: MessageHeader::new(issuer),
            not_on_or_after: None,
            reason: None,
            identifier: Some(Identifier::NameId(name_id)),
            session_indexes: Vec::new(),
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.header.destination = Some(url.into());
        self
    }

    /// Adds a session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Sets the logout reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the expiry of the request.
    #[must_use]
    pub const fn expires_at(mut self, not_on_or_after: DateTime<Utc>) -> Self {
        self.not_on_or_after = Some(not_on_or_after);
        self
    }

    /// Returns the plain `NameID`, if present.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        match &self.identifier {
            Some(Identifier::NameId(name_id)) => Some(name_id),
            _ => None,
        }
    }

    /// Reads a `samlp:LogoutRequest` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "LogoutRequest")?;
        let identifier = if let Some(name_id) = element.child(SAML_NS, "NameID") {
            Some(Identifier::NameId(NameId::from_element(name_id)?))
        } else if let Some(encrypted) = element.child(SAML_NS, "EncryptedID") {
            Some(Identifier::EncryptedId(EncryptedElement::from_element(encrypted)?))
        } else {
            None
        };
        if identifier.is_none() && element.child(SAML_NS, "BaseID").is_none() {
            return Err(SamlError::MissingElement("LogoutRequest/NameID".to_string()));
        }
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
            reason: element.attribute("Reason").map(str::to_string),
            identifier,
            session_indexes: element
                .children_named(SAMLP_NS, "SessionIndex")
                .map(|el| el.text().trim().to_string())
                .collect(),
        })
    }

    /// Serializes the request.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let not_on_or_after = self.not_on_or_after.as_ref().map(format_instant);
        let mut out = self.header.open(
            "LogoutRequest",
            &[
                ("NotOnOrAfter", not_on_or_after.as_deref()),
                ("Reason", self.reason.as_deref()),
            ],
        );
        match &self.identifier {
            Some(Identifier::NameId(name_id)) => out.push_str(&name_id.to_xml("NameID")),
            Some(Identifier::EncryptedId(encrypted)) => {
                out.push_str(&encrypted.to_xml("EncryptedID"));
            }
            None => {}
        }
        for index in &self.session_indexes {
            out.push_str(&format!("<samlp:SessionIndex>{}</samlp:SessionIndex>", escape(index)));
        }
        out.push_str("</samlp:LogoutRequest>");
        out
    }
}

/// SAML Logout Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutResponse {
    /// Common message fields.
    pub header: MessageHeader,
    /// ID of the logout request answered.
    pub in_response_to: Option<String>,
    /// Logout status.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a response to the request with ID `request_id`.
    #[must_use]
    pub fn new(issuer: impl Into<String>, request_id: impl Into<String>, status: Status) -> Self {
        Self {
            header: MessageHeader::new(issuer),
            in_response_to: Some(request_id.into()),
            status,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.header.destination = Some(url.into());
        self
    }

    /// Reads a `samlp:LogoutResponse` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "LogoutResponse")?;
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            in_response_to: element.attribute("InResponseTo").map(str::to_string),
            status: status_of(element)?,
        })
    }

    /// Serializes the response.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = self
            .header
            .open("LogoutResponse", &[("InResponseTo", self.in_response_to.as_deref())]);
        out.push_str(&self.status.to_xml());
        out.push_str("</samlp:LogoutResponse>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    #[test]
    fn logout_request_reads_back() {
        let request = LogoutRequest::new("https://sp.example.org", NameId::transient("_t"))
            .with_destination("https://idp.example.org/slo")
            .with_session_index("s1")
            .with_session_index("s2");
        let doc = Document::parse(&request.to_xml()).unwrap();
        let parsed = LogoutRequest::from_element(doc.root()).unwrap();
        assert_eq!(parsed.name_id().unwrap().value, "_t");
        assert_eq!(parsed.session_indexes, ["s1", "s2"]);
        assert_eq!(parsed.header.destination.as_deref(), Some("https://idp.example.org/slo"));
    }

    #[test]
    fn logout_request_requires_identifier() {
        let doc = Document::parse(&format!(
            r#"<samlp:LogoutRequest xmlns:samlp="{SAMLP_NS}" ID="_l" Version="2.0" IssueInstant="2024-03-01T12:00:00Z"/>"#
        ))
        .unwrap();
        assert!(matches!(
            LogoutRequest::from_element(doc.root()),
            Err(SamlError::MissingElement(_))
        ));
    }

    #[test]
    fn logout_response_reads_back() {
        let response = LogoutResponse::new("https://sp.example.org", "_l", Status::success());
        let doc = Document::parse(&response.to_xml()).unwrap();
        let parsed = LogoutResponse::from_element(doc.root()).unwrap();
        assert_eq!(parsed.in_response_to.as_deref(), Some("_l"));
        assert!(parsed.status.is_success());
    }
}
