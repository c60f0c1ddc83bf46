//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST.

use base64::Engine;
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::types::ProtocolMessage;
use crate::xml::Document;

use super::{decode_base64, into_utf8, MessageSlot, SamlMessageType, DEFAULT_MAX_MESSAGE_BYTES};

/// Builds the auto-submitting form of the HTTP-POST binding.
#[derive(Debug, Clone, Default)]
pub struct HttpPostBuilder {
    message: MessageSlot,
    relay_state: Option<String>,
}

impl HttpPostBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request to send. Sign it before setting it; the POST binding
    /// carries enveloped signatures only.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConflictingMessage`] if a response is already set.
    pub fn set_request(&mut self, xml: impl Into<String>) -> SamlResult<&mut Self> {
        self.message.set(SamlMessageType::Request, xml.into())?;
        Ok(self)
    }

    /// Sets the response to send.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConflictingMessage`] if a request is already set.
    pub fn set_response(&mut self, xml: impl Into<String>) -> SamlResult<&mut Self> {
        self.message.set(SamlMessageType::Response, xml.into())?;
        Ok(self)
    }

    /// Sets the relay state.
    pub fn set_relay_state(&mut self, relay_state: impl Into<String>) -> &mut Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    /// Returns the form parameter name and its base64 value.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingParameter`] if no message is set.
    pub fn encoded_value(&self) -> SamlResult<(&'static str, String)> {
        let (message_type, xml) = self.message.get()?;
        Ok((
            message_type.form_param(),
            base64::engine::general_purpose::STANDARD.encode(xml),
        ))
    }

    /// Builds an HTML page that posts the message to `destination` on load.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingParameter`] if no message is set.
    pub fn to_form(&self, destination: &str) -> SamlResult<String> {
        let (param_name, encoded) = self.encoded_value()?;

        let relay_state_input = self
            .relay_state
            .as_deref()
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    html_escape::encode_double_quoted_attribute(rs)
                )
            })
            .unwrap_or_default();

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape::encode_double_quoted_attribute(destination),
            param_name,
            encoded,
            relay_state_input
        ))
    }
}

/// A message received over the HTTP-POST binding.
#[derive(Debug, Clone)]
pub struct PostParser {
    message_type: SamlMessageType,
    xml: String,
    relay_state: Option<String>,
}

impl PostParser {
    /// Decodes the form fields of a POST.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingParameter`] if neither message field is
    /// present, [`SamlError::InvalidBinding`] if both are, and decoding errors
    /// for the payload.
    pub fn from_form(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<Self> {
        Self::from_form_with_limit(saml_request, saml_response, relay_state, DEFAULT_MAX_MESSAGE_BYTES)
    }

    /// Decodes the form fields of a POST, accepting at most `max_bytes` of
    /// decoded XML.
    ///
    /// # Errors
    ///
    /// See [`PostParser::from_form`]; also [`SamlError::MessageTooLarge`].
    pub fn from_form_with_limit(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
        max_bytes: usize,
    ) -> SamlResult<Self> {
        let (message_type, encoded) = match (saml_request, saml_response) {
            (Some(request), None) => (SamlMessageType::Request, request),
            (None, Some(response)) => (SamlMessageType::Response, response),
            (Some(_), Some(_)) => {
                return Err(SamlError::InvalidBinding(
                    "SAMLRequest and SAMLResponse are mutually exclusive".to_string(),
                ))
            }
            (None, None) => return Err(SamlError::MissingParameter("SAMLRequest or SAMLResponse")),
        };

        let decoded = decode_base64(encoded)?;
        if decoded.len() > max_bytes {
            return Err(SamlError::MessageTooLarge { limit: max_bytes });
        }
        let xml = into_utf8(decoded)?;

        debug!(message_type = message_type.form_param(), "Decoded POST binding message");

        Ok(Self {
            message_type,
            xml,
            relay_state: relay_state.map(String::from),
        })
    }

    /// Decodes an `application/x-www-form-urlencoded` request body.
    ///
    /// # Errors
    ///
    /// See [`PostParser::from_form`].
    pub fn parse_form_body(body: &str) -> SamlResult<Self> {
        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;
        for (name, value) in url::form_urlencoded::parse(body.as_bytes()) {
            let slot = match name.as_ref() {
                "SAMLRequest" => &mut saml_request,
                "SAMLResponse" => &mut saml_response,
                "RelayState" => &mut relay_state,
                _ => continue,
            };
            if slot.replace(value.into_owned()).is_some() {
                return Err(SamlError::InvalidBinding(format!("field {name} repeated")));
            }
        }
        Self::from_form(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
        )
    }

    /// Returns the decoded XML text.
    #[must_use]
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Returns whether the message was a request or a response.
    #[must_use]
    pub const fn message_type(&self) -> SamlMessageType {
        self.message_type
    }

    /// Returns the relay state.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// Parses the XML, preserving whitespace so enveloped signatures can be
    /// checked.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed XML.
    pub fn document(&self) -> SamlResult<Document> {
        Document::parse(&self.xml)
    }

    /// Parses the typed protocol message.
    ///
    /// # Errors
    ///
    /// Returns parse errors of the XML or the message type.
    pub fn message(&self) -> SamlResult<ProtocolMessage> {
        ProtocolMessage::from_element(self.document()?.root())
    }
}
