//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-Redirect Binding** - messages are deflated, base64-encoded and
//!   URL-encoded; the signature is detached and covers the raw query
//! - **HTTP-POST Binding** - messages are base64-encoded in an HTML form
//! - **SOAP Binding** - messages are the single child of a SOAP 1.1 `Body`
//! - **HTTP-Artifact Binding** - the browser carries a 44-byte artifact and
//!   the message travels over SOAP
//!
//! Each binding has a parser for inbound messages and a builder for outbound
//! ones.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sp_protocol_saml::bindings::{HttpRedirectBuilder, RedirectParser};
//!
//! let mut builder = HttpRedirectBuilder::new();
//! builder.set_request(request.to_xml())?;
//! builder.set_relay_state("/app");
//! let url = builder.to_url("https://idp.example.com/sso")?;
//!
//! let parsed = RedirectParser::parse_url(&url)?;
//! assert!(parsed.is_request());
//! ```

mod artifact;
mod post;
mod redirect;
mod soap;

pub use artifact::*;
pub use post::*;
pub use redirect::*;
pub use soap::*;

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::types::MessageKind;

/// Default upper bound on a decoded or inflated message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// A request, carried in `SAMLRequest`.
    Request,
    /// A response, carried in `SAMLResponse`.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }

    /// Returns the message type a protocol message travels as.
    #[must_use]
    pub const fn of(kind: MessageKind) -> Self {
        if kind.is_request() {
            Self::Request
        } else {
            Self::Response
        }
    }
}

/// The single outbound message of a builder. A builder carries either a
/// request or a response, never both.
#[derive(Debug, Clone, Default)]
struct MessageSlot {
    message: Option<(SamlMessageType, String)>,
}

impl MessageSlot {
    fn set(&mut self, message_type: SamlMessageType, xml: String) -> SamlResult<()> {
        if let Some((existing, _)) = &self.message {
            if *existing != message_type {
                return Err(SamlError::ConflictingMessage {
                    existing: existing.form_param(),
                    attempted: message_type.form_param(),
                });
            }
        }
        self.message = Some((message_type, xml));
        Ok(())
    }

    fn get(&self) -> SamlResult<(SamlMessageType, &str)> {
        self.message
            .as_ref()
            .map(|(message_type, xml)| (*message_type, xml.as_str()))
            .ok_or(SamlError::MissingParameter("SAMLRequest or SAMLResponse"))
    }
}

/// Decodes base64 that may contain line breaks.
fn decode_base64(value: &str) -> SamlResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

fn into_utf8(bytes: Vec<u8>) -> SamlResult<String> {
    String::from_utf8(bytes).map_err(|e| SamlError::InvalidEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_slot_rejects_the_other_kind() {
        let mut slot = MessageSlot::default();
        slot.set(SamlMessageType::Response, "<r/>".to_string()).unwrap();
        let err = slot.set(SamlMessageType::Request, "<q/>".to_string()).unwrap_err();
        assert!(matches!(
            err,
            SamlError::ConflictingMessage {
                existing: "SAMLResponse",
                attempted: "SAMLRequest"
            }
        ));
        slot.set(SamlMessageType::Response, "<r2/>".to_string()).unwrap();
        assert_eq!(slot.get().unwrap(), (SamlMessageType::Response, "<r2/>"));
    }

    #[test]
    fn message_types_follow_kind() {
        assert_eq!(SamlMessageType::of(MessageKind::LogoutRequest), SamlMessageType::Request);
        assert_eq!(SamlMessageType::of(MessageKind::Response), SamlMessageType::Response);
    }

    #[test]
    fn base64_tolerates_line_breaks() {
        assert_eq!(decode_base64("PHI+\r\nPC9y\nPg==").unwrap(), b"<r></r>");
    }
}
