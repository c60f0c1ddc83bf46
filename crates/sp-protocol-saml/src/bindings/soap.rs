//! SOAP binding.
//!
//! Back-channel messages travel as the single element child of a SOAP 1.1
//! `Body`. A bare protocol message is accepted too, in which case the
//! document element is the message.

use std::cell::OnceCell;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSignatureValidator;
use crate::types::{MessageKind, ProtocolMessage, SAMLP_NS, SAML_NS, SOAP_ENV_NS};
use crate::xml::{Document, Element};

/// A message received over SOAP, or a bare protocol message.
///
/// Peeking accessors look at the XML only. The typed message is built on
/// first use of [`SoapMessageParser::message`] and kept afterwards.
#[derive(Debug, Clone)]
pub struct SoapMessageParser {
    enveloped: bool,
    document: Document,
    message: OnceCell<ProtocolMessage>,
}

impl SoapMessageParser {
    /// Parses an envelope or a bare message.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed XML and
    /// [`SamlError::InvalidSoapEnvelope`] if the envelope has no `Body` or
    /// the `Body` does not hold exactly one element.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        Self::from_document(Document::parse(xml)?)
    }

    /// Wraps an already parsed document.
    ///
    /// # Errors
    ///
    /// See [`SoapMessageParser::parse`].
    pub fn from_document(document: Document) -> SamlResult<Self> {
        if !document.root().is(SOAP_ENV_NS, "Envelope") {
            return Ok(Self {
                enveloped: false,
                document,
                message: OnceCell::new(),
            });
        }

        let preserve = document.preserves_whitespace();
        let body = document
            .root()
            .child(SOAP_ENV_NS, "Body")
            .ok_or_else(|| SamlError::InvalidSoapEnvelope("Envelope has no Body".to_string()))?;
        let mut children = body.child_elements();
        let message = match (children.next(), children.next()) {
            (Some(message), None) => message.clone(),
            (None, _) => {
                return Err(SamlError::InvalidSoapEnvelope("Body is empty".to_string()))
            }
            (Some(_), Some(_)) => {
                return Err(SamlError::InvalidSoapEnvelope(
                    "Body holds more than one element".to_string(),
                ))
            }
        };

        Ok(Self {
            enveloped: true,
            document: Document::from_root(message, preserve),
            message: OnceCell::new(),
        })
    }

    /// Returns true if the message arrived inside a SOAP envelope.
    #[must_use]
    pub const fn is_enveloped(&self) -> bool {
        self.enveloped
    }

    /// Returns the message as its own document.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Returns the message element.
    #[must_use]
    pub fn message_element(&self) -> &Element {
        self.document.root()
    }

    /// Peeks at the message kind.
    #[must_use]
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::of(self.message_element())
    }

    /// Returns true if the message is a `LogoutRequest`.
    #[must_use]
    pub fn is_logout_request(&self) -> bool {
        self.message_kind() == Some(MessageKind::LogoutRequest)
    }

    /// Peeks at the top-level status code of a response.
    #[must_use]
    pub fn status_code(&self) -> Option<&str> {
        self.message_element()
            .child(SAMLP_NS, "Status")?
            .child(SAMLP_NS, "StatusCode")?
            .attribute("Value")
    }

    /// Peeks at the issuer.
    #[must_use]
    pub fn issuer(&self) -> Option<String> {
        self.message_element()
            .child(SAML_NS, "Issuer")
            .map(|issuer| issuer.text().trim().to_string())
    }

    /// Returns the typed message, parsing it on first call.
    ///
    /// # Errors
    ///
    /// Returns the parse error of the message type. Errors are not cached.
    pub fn message(&self) -> SamlResult<&ProtocolMessage> {
        if let Some(message) = self.message.get() {
            return Ok(message);
        }
        let parsed = ProtocolMessage::from_element(self.message_element())?;
        Ok(self.message.get_or_init(|| parsed))
    }

    /// Verifies the enveloped signature of the message.
    ///
    /// # Errors
    ///
    /// Returns signature errors for a missing or malformed signature.
    pub fn check_signature(&self, validator: &XmlSignatureValidator) -> SamlResult<bool> {
        validator.check_signature(&self.document)
    }
}

/// Wraps a protocol message in a SOAP 1.1 envelope. A leading XML
/// declaration is dropped.
#[must_use]
pub fn soap_envelope(message_xml: &str) -> String {
    let body = strip_declaration(message_xml);
    format!(
        r#"<soap11:Envelope xmlns:soap11="{SOAP_ENV_NS}"><soap11:Body>{body}</soap11:Body></soap11:Envelope>"#
    )
}

fn strip_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    xml
}
