//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.
//!
//! The detached signature covers the query exactly as transmitted:
//! `SAMLRequest=...` or `SAMLResponse=...`, then `&RelayState=...` when
//! present, then `&SigAlg=...`, using the still URL-encoded values. The
//! parser keeps those raw bytes so verification never depends on how a value
//! re-encodes.
//!
//! `RelayState` is URL-encoded for requests only. Response relay state is
//! passed through untouched in both directions, so callers must supply a
//! value that is already safe in a query string.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::signature::{XmlSignatureValidator, XmlSigner};
use crate::types::ProtocolMessage;
use crate::xml::Document;

use super::{decode_base64, into_utf8, MessageSlot, SamlMessageType, DEFAULT_MAX_MESSAGE_BYTES};

/// A message received over the HTTP-Redirect binding.
#[derive(Debug, Clone)]
pub struct RedirectParser {
    message_type: SamlMessageType,
    xml: String,
    relay_state: Option<String>,
    sig_alg: Option<String>,
    signature: Option<String>,
    signed_query: Option<String>,
}

impl RedirectParser {
    /// Parses a full URL.
    ///
    /// # Errors
    ///
    /// Returns a transport-format error for a malformed URL or query, see
    /// [`RedirectParser::parse_query`].
    pub fn parse_url(url: &str) -> SamlResult<Self> {
        url::Url::parse(url).map_err(|e| SamlError::InvalidBinding(format!("invalid URL: {e}")))?;
        let without_fragment = url.split('#').next().unwrap_or(url);
        let query = without_fragment
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or(SamlError::MissingParameter("SAMLRequest or SAMLResponse"))?;
        Self::parse_query(query)
    }

    /// Parses a raw query string (without the leading `?`).
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingParameter`] without a message parameter,
    /// [`SamlError::InvalidBinding`] if both message parameters are present,
    /// a parameter repeats, or only one of `SigAlg`/`Signature` is present,
    /// and decoding errors for the payload.
    pub fn parse_query(query: &str) -> SamlResult<Self> {
        Self::parse_query_with_limit(query, DEFAULT_MAX_MESSAGE_BYTES)
    }

    /// Parses a raw query string, inflating at most `max_bytes`.
    ///
    /// # Errors
    ///
    /// See [`RedirectParser::parse_query`]; also
    /// [`SamlError::MessageTooLarge`] when the payload inflates beyond the
    /// limit.
    pub fn parse_query_with_limit(query: &str, max_bytes: usize) -> SamlResult<Self> {
        let params = RawParams::parse(query)?;

        let (message_type, raw_message) = match (params.saml_request, params.saml_response) {
            (Some(request), None) => (SamlMessageType::Request, request),
            (None, Some(response)) => (SamlMessageType::Response, response),
            (Some(_), Some(_)) => {
                return Err(SamlError::InvalidBinding(
                    "SAMLRequest and SAMLResponse are mutually exclusive".to_string(),
                ))
            }
            (None, None) => return Err(SamlError::MissingParameter("SAMLRequest or SAMLResponse")),
        };

        let (signed_query, sig_alg, signature) = match (params.sig_alg, params.signature) {
            (Some(sig_alg), Some(signature)) => {
                let mut signed = format!("{}={raw_message}", message_type.form_param());
                if let Some(relay_state) = params.relay_state {
                    signed.push_str("&RelayState=");
                    signed.push_str(relay_state);
                }
                signed.push_str("&SigAlg=");
                signed.push_str(sig_alg);
                (
                    Some(signed),
                    Some(percent_decode(sig_alg)?),
                    Some(percent_decode(signature)?),
                )
            }
            (None, None) => (None, None, None),
            _ => {
                return Err(SamlError::InvalidBinding(
                    "SigAlg and Signature must be both present or both absent".to_string(),
                ))
            }
        };

        let relay_state = match (message_type, params.relay_state) {
            (_, None) => None,
            (SamlMessageType::Request, Some(raw)) => Some(percent_decode(raw)?),
            (SamlMessageType::Response, Some(raw)) => Some(raw.to_string()),
        };

        let compressed = decode_base64(&percent_decode(raw_message)?)?;
        let xml = into_utf8(inflate(&compressed, max_bytes)?)?;

        debug!(
            message_type = message_type.form_param(),
            signed = signed_query.is_some(),
            "Decoded redirect binding message"
        );

        Ok(Self {
            message_type,
            xml,
            relay_state,
            sig_alg,
            signature,
            signed_query,
        })
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

    /// Returns true if `SigAlg` and `Signature` were present.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signed_query.is_some()
    }

    /// Returns true for `SAMLRequest`.
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.message_type == SamlMessageType::Request
    }

    /// Returns true for `SAMLResponse`.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.message_type == SamlMessageType::Response
    }

    /// Returns the relay state.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// Returns the decoded `SigAlg`.
    #[must_use]
    pub fn sig_alg(&self) -> Option<&str> {
        self.sig_alg.as_deref()
    }

    /// Returns the exact bytes the signature covers.
    #[must_use]
    pub fn signed_query(&self) -> Option<&str> {
        self.signed_query.as_deref()
    }

    /// Parses the XML, preserving whitespace.
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

    /// Verifies the detached signature.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MessageNotSigned`] if the message carries no
    /// signature, and signature errors for an unknown algorithm or an
    /// undecodable value.
    pub fn check_signature(&self, validator: &XmlSignatureValidator) -> SamlResult<bool> {
        match (&self.signed_query, &self.sig_alg, &self.signature) {
            (Some(query), Some(sig_alg), Some(signature)) => {
                validator.check_redirect(query, sig_alg, signature)
            }
            _ => Err(SamlError::MessageNotSigned),
        }
    }
}

/// Raw, still URL-encoded parameter values.
#[derive(Default)]
struct RawParams<'q> {
    saml_request: Option<&'q str>,
    saml_response: Option<&'q str>,
    relay_state: Option<&'q str>,
    sig_alg: Option<&'q str>,
    signature: Option<&'q str>,
}

impl<'q> RawParams<'q> {
    fn parse(query: &'q str) -> SamlResult<Self> {
        let mut params = Self::default();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match name {
                "SAMLRequest" => &mut params.saml_request,
                "SAMLResponse" => &mut params.saml_response,
                "RelayState" => &mut params.relay_state,
                "SigAlg" => &mut params.sig_alg,
                "Signature" => &mut params.signature,
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return Err(SamlError::InvalidBinding(format!("parameter {name} repeated")));
            }
        }
        Ok(params)
    }
}

fn percent_decode(value: &str) -> SamlResult<String> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| SamlError::InvalidEncoding(format!("URL decode error: {e}")))
}

/// Builds HTTP-Redirect binding URLs.
#[derive(Clone, Default)]
pub struct HttpRedirectBuilder {
    message: MessageSlot,
    relay_state: Option<String>,
    signer: Option<XmlSigner>,
}

impl HttpRedirectBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request to send.
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

    /// Signs the query with `signer`.
    pub fn set_signer(&mut self, signer: XmlSigner) -> &mut Self {
        self.signer = Some(signer);
        self
    }

    /// Builds the query string, without a leading `?`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingParameter`] if no message is set and
    /// signing errors.
    pub fn to_query(&self) -> SamlResult<String> {
        let (message_type, xml) = self.message.get()?;
        let encoded = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            deflate(xml.as_bytes())?,
        );
        let mut query = format!("{}={}", message_type.form_param(), urlencoding::encode(&encoded));
        if let Some(relay_state) = &self.relay_state {
            query.push_str("&RelayState=");
            match message_type {
                SamlMessageType::Request => query.push_str(&urlencoding::encode(relay_state)),
                SamlMessageType::Response => query.push_str(relay_state),
            }
        }
        if let Some(signer) = &self.signer {
            query.push_str("&SigAlg=");
            query.push_str(&urlencoding::encode(signer.algorithm().uri()));
            let signature = signer.sign_redirect_query(&query)?;
            query.push_str("&Signature=");
            query.push_str(&urlencoding::encode(&signature));
        }
        Ok(query)
    }

    /// Builds the full URL.
    ///
    /// # Errors
    ///
    /// See [`HttpRedirectBuilder::to_query`].
    pub fn to_url(&self, destination: &str) -> SamlResult<String> {
        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{}", self.to_query()?))
    }
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Decompresses raw DEFLATE data, reading at most one byte past `limit`.
fn inflate(data: &[u8], limit: usize) -> SamlResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    DeflateDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;
    if decompressed.len() > limit {
        return Err(SamlError::MessageTooLarge { limit });
    }
    Ok(decompressed)
}
