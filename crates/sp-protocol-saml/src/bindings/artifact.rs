//! HTTP-Artifact binding.
//!
//! The sender keeps the signed message and hands the browser a 44-byte
//! artifact in `SAMLart`. The receiver resolves it over SOAP with an
//! `ArtifactResolve`, and the sender answers with an `ArtifactResponse`
//! carrying the message. Each artifact resolves at most once.

use std::sync::Arc;
use std::time::Duration;

use sp_cache::ArtifactStore;
use tracing::{debug, warn};

use crate::artifact::{try_parse_artifact, Artifact};
use crate::error::{SamlError, SamlResult};
use crate::signature::{XmlSignatureValidator, XmlSigner};
use crate::types::{ArtifactResolve, ArtifactResponse, MessageKind, ProtocolMessage};
use crate::xml::Document;

use super::{soap_envelope, SoapMessageParser};

/// How long an issued artifact stays resolvable by default.
pub const DEFAULT_ARTIFACT_TTL: Duration = Duration::from_secs(60);

/// Issues artifacts for outbound messages.
#[derive(Clone)]
pub struct HttpArtifactBuilder {
    entity_id: String,
    endpoint_index: u16,
    ttl: Duration,
    relay_state: Option<String>,
    signer: Option<XmlSigner>,
}

impl HttpArtifactBuilder {
    /// Creates a builder minting artifacts for `entity_id`, naming its
    /// artifact resolution endpoint `endpoint_index`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, endpoint_index: u16) -> Self {
        Self {
            entity_id: entity_id.into(),
            endpoint_index,
            ttl: DEFAULT_ARTIFACT_TTL,
            relay_state: None,
            signer: None,
        }
    }

    /// Sets how long the artifact stays resolvable.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the relay state.
    pub fn set_relay_state(&mut self, relay_state: impl Into<String>) -> &mut Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    /// Signs stored messages with `signer`.
    pub fn set_signer(&mut self, signer: XmlSigner) -> &mut Self {
        self.signer = Some(signer);
        self
    }

    /// Signs the message if a signer is set, stores it and returns the new
    /// artifact.
    ///
    /// # Errors
    ///
    /// Returns XML and signing errors, and [`SamlError::Cache`] if the store
    /// refuses the entry.
    pub fn issue(&self, store: &dyn ArtifactStore, message_xml: &str) -> SamlResult<String> {
        let document = match &self.signer {
            Some(signer) => {
                let mut document = Document::parse(message_xml)?;
                let id = document
                    .root()
                    .id()
                    .ok_or_else(|| SamlError::SignatureCreation("message has no ID".to_string()))?
                    .to_string();
                signer.sign(&mut document, &id)?;
                document.to_xml()
            }
            None => message_xml.to_string(),
        };
        let artifact = Artifact::mint(&self.entity_id, self.endpoint_index).encode();
        store.insert(&artifact, document, self.ttl)?;
        debug!(entity_id = %self.entity_id, ttl_secs = self.ttl.as_secs(), "Issued artifact");
        Ok(artifact)
    }

    /// Issues an artifact and returns the redirect URL carrying it.
    ///
    /// # Errors
    ///
    /// See [`HttpArtifactBuilder::issue`].
    pub fn to_url(
        &self,
        store: &dyn ArtifactStore,
        message_xml: &str,
        destination: &str,
    ) -> SamlResult<String> {
        let artifact = self.issue(store, message_xml)?;
        let separator = if destination.contains('?') { '&' } else { '?' };
        let mut url = format!("{destination}{separator}SAMLart={}", urlencoding::encode(&artifact));
        if let Some(relay_state) = &self.relay_state {
            url.push_str("&RelayState=");
            url.push_str(&urlencoding::encode(relay_state));
        }
        Ok(url)
    }
}

/// Reads `SAMLart` and `RelayState` from a query string or form body.
///
/// # Errors
///
/// Returns [`SamlError::MissingParameter`] without `SAMLart`,
/// [`SamlError::InvalidBinding`] if it repeats and
/// [`SamlError::InvalidArtifact`] if it is not a 44-byte artifact.
pub fn parse_artifact_query(query: &str) -> SamlResult<(Artifact, String, Option<String>)> {
    let mut artifact = None;
    let mut relay_state = None;
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let slot = match name.as_ref() {
            "SAMLart" => &mut artifact,
            "RelayState" => &mut relay_state,
            _ => continue,
        };
        if slot.replace(value.into_owned()).is_some() {
            return Err(SamlError::InvalidBinding(format!("parameter {name} repeated")));
        }
    }
    let encoded: String = artifact.ok_or(SamlError::MissingParameter("SAMLart"))?;
    let decoded = try_parse_artifact(&encoded)
        .ok_or_else(|| SamlError::InvalidArtifact("expected 44 base64-encoded bytes".to_string()))?;
    Ok((decoded, encoded, relay_state))
}

/// Builds the SOAP request resolving `resolve`, signing it if `signer` is
/// given.
///
/// # Errors
///
/// Returns signing errors.
pub fn artifact_resolve_envelope(
    resolve: &ArtifactResolve,
    signer: Option<&XmlSigner>,
) -> SamlResult<String> {
    let xml = match signer {
        Some(signer) => signer.sign_xml(&resolve.to_xml(), &resolve.header.id)?,
        None => resolve.to_xml(),
    };
    Ok(soap_envelope(&xml))
}

/// A SOAP message of the artifact resolution protocol.
#[derive(Debug, Clone)]
pub struct ArtifactMessageParser {
    soap: SoapMessageParser,
    kind: MessageKind,
}

impl ArtifactMessageParser {
    /// Parses an `ArtifactResolve` or `ArtifactResponse`, enveloped or bare.
    ///
    /// # Errors
    ///
    /// Returns SOAP errors, and [`SamlError::UnexpectedMessage`] for any
    /// other message.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        Self::from_soap(SoapMessageParser::parse(xml)?)
    }

    /// Narrows a SOAP parser to the artifact resolution messages.
    ///
    /// # Errors
    ///
    /// See [`ArtifactMessageParser::parse`].
    pub fn from_soap(soap: SoapMessageParser) -> SamlResult<Self> {
        match soap.message_kind() {
            Some(kind @ (MessageKind::ArtifactResolve | MessageKind::ArtifactResponse)) => {
                Ok(Self { soap, kind })
            }
            _ => Err(SamlError::UnexpectedMessage {
                expected: "ArtifactResolve or ArtifactResponse",
                actual: soap.message_element().qualified_name(),
            }),
        }
    }

    /// Returns which of the two messages this is.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the underlying SOAP parser.
    #[must_use]
    pub const fn soap(&self) -> &SoapMessageParser {
        &self.soap
    }

    /// Returns the issuer of either message.
    #[must_use]
    pub fn issuer(&self) -> Option<String> {
        self.soap.issuer()
    }

    /// Returns the typed `ArtifactResolve`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnexpectedMessage`] for an `ArtifactResponse`,
    /// and parse errors.
    pub fn artifact_resolve(&self) -> SamlResult<&ArtifactResolve> {
        match self.soap.message()? {
            ProtocolMessage::ArtifactResolve(resolve) => Ok(resolve),
            other => Err(SamlError::UnexpectedMessage {
                expected: "ArtifactResolve",
                actual: other.kind().to_string(),
            }),
        }
    }

    /// Returns the typed `ArtifactResponse`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnexpectedMessage`] for an `ArtifactResolve`,
    /// and parse errors.
    pub fn artifact_response(&self) -> SamlResult<&ArtifactResponse> {
        match self.soap.message()? {
            ProtocolMessage::ArtifactResponse(response) => Ok(response),
            other => Err(SamlError::UnexpectedMessage {
                expected: "ArtifactResponse",
                actual: other.kind().to_string(),
            }),
        }
    }

    /// Returns the resolved message as its own document, so its signature
    /// can be checked independently of the response.
    ///
    /// # Errors
    ///
    /// See [`ArtifactMessageParser::artifact_response`].
    pub fn resolved_document(&self) -> SamlResult<Option<Document>> {
        let preserve = self.soap.document().preserves_whitespace();
        Ok(self
            .artifact_response()?
            .message
            .clone()
            .map(|message| Document::from_root(message, preserve)))
    }

    /// Verifies the enveloped signature of the artifact message.
    ///
    /// # Errors
    ///
    /// Returns signature errors for a missing or malformed signature.
    pub fn check_signature(&self, validator: &XmlSignatureValidator) -> SamlResult<bool> {
        self.soap.check_signature(validator)
    }
}

/// Answers `ArtifactResolve` requests from an [`ArtifactStore`].
#[derive(Clone)]
pub struct ArtifactResolutionResponder {
    entity_id: String,
    store: Arc<dyn ArtifactStore>,
    signer: Option<XmlSigner>,
    validator: Option<XmlSignatureValidator>,
}

impl ArtifactResolutionResponder {
    /// Creates a responder for artifacts minted by `entity_id`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            entity_id: entity_id.into(),
            store,
            signer: None,
            validator: None,
        }
    }

    /// Signs responses with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: XmlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Requires inbound requests to be signed by one of the validator's keys.
    #[must_use]
    pub fn with_validator(mut self, validator: XmlSignatureValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Resolves the artifact in a SOAP `ArtifactResolve` and returns the SOAP
    /// `ArtifactResponse`. An artifact that is unknown, expired or already
    /// resolved yields a response without a message.
    ///
    /// # Errors
    ///
    /// Returns parse errors, signature errors when a validator is set,
    /// [`SamlError::InvalidArtifact`] for a malformed artifact and
    /// [`SamlError::UnknownArtifactSource`] for an artifact minted by another
    /// entity.
    pub fn respond(&self, soap_xml: &str) -> SamlResult<String> {
        let parser = ArtifactMessageParser::parse(soap_xml)?;
        if let Some(validator) = &self.validator {
            if !parser.check_signature(validator)? {
                warn!(issuer = ?parser.issuer(), "ArtifactResolve signature did not verify");
                return Err(SamlError::SignatureInvalid(
                    "ArtifactResolve signature did not verify".to_string(),
                ));
            }
        }
        let resolve = parser.artifact_resolve()?;
        let artifact = try_parse_artifact(&resolve.artifact)
            .ok_or_else(|| SamlError::InvalidArtifact(resolve.artifact.clone()))?;
        if !artifact.is_from(&self.entity_id) {
            return Err(SamlError::UnknownArtifactSource);
        }

        let message = match self.store.take(&resolve.artifact)? {
            Some(stored) => Some(Document::parse(&stored)?.into_root()),
            None => {
                debug!("Artifact is unknown, expired or already resolved");
                None
            }
        };
        let response = ArtifactResponse::new(&self.entity_id, &resolve.header.id, message);

        let xml = match &self.signer {
            Some(signer) => signer.sign_xml(&response.to_xml(), &response.header.id)?,
            None => response.to_xml(),
        };
        Ok(soap_envelope(&xml))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{IDP_CERT, IDP_KEY, SP_CERT, SP_KEY};
    use crate::types::{LogoutRequest, NameId};
    use sp_cache::InMemoryArtifactStore;
    use sp_crypto::Certificate;

    const SP: &str = "https://sp.example.org";
    const IDP: &str = "https://idp.example.org";

    fn validator(pem: &str) -> XmlSignatureValidator {
        XmlSignatureValidator::from_certificates([&Certificate::from_pem(pem).unwrap()])
    }

    fn logout_request() -> LogoutRequest {
        LogoutRequest::new(SP, NameId::new("alice")).with_session_index("s1")
    }

    #[test]
    fn url_carries_artifact_and_relay_state() {
        let store = InMemoryArtifactStore::new();
        let mut builder = HttpArtifactBuilder::new(SP, 1);
        builder.set_relay_state("/after logout");
        let url = builder
            .to_url(&store, &logout_request().to_xml(), "https://idp.example.org/slo")
            .unwrap();
        let query = url.split_once('?').unwrap().1;
        let (artifact, encoded, relay_state) = parse_artifact_query(query).unwrap();
        assert!(artifact.is_from(SP));
        assert_eq!(artifact.endpoint_index, 1);
        assert_eq!(relay_state.as_deref(), Some("/after logout"));
        assert!(store.get(&encoded, false).unwrap().is_some());
    }

    #[test]
    fn query_without_valid_artifact_is_rejected() {
        assert!(matches!(
            parse_artifact_query("RelayState=x"),
            Err(SamlError::MissingParameter("SAMLart"))
        ));
        assert!(matches!(
            parse_artifact_query("SAMLart=AAQA"),
            Err(SamlError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn resolution_returns_signed_message_once() {
        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let mut builder = HttpArtifactBuilder::new(SP, 0);
        builder.set_signer(XmlSigner::from_pem(SP_KEY, Some(SP_CERT)).unwrap());
        let request = logout_request();
        let artifact = builder.issue(store.as_ref(), &request.to_xml()).unwrap();

        let responder = ArtifactResolutionResponder::new(SP, Arc::clone(&store))
            .with_signer(XmlSigner::from_pem(SP_KEY, Some(SP_CERT)).unwrap())
            .with_validator(validator(IDP_CERT));
        let idp_signer = XmlSigner::from_pem(IDP_KEY, None).unwrap();
        let resolve = ArtifactResolve::new(IDP, &artifact);
        let envelope = artifact_resolve_envelope(&resolve, Some(&idp_signer)).unwrap();

        let answer = ArtifactMessageParser::parse(&responder.respond(&envelope).unwrap()).unwrap();
        assert_eq!(answer.kind(), MessageKind::ArtifactResponse);
        assert_eq!(answer.issuer().as_deref(), Some(SP));
        assert!(answer.check_signature(&validator(SP_CERT)).unwrap());
        let response = answer.artifact_response().unwrap();
        assert_eq!(response.in_response_to.as_deref(), Some(resolve.header.id.as_str()));
        assert_eq!(response.message_kind(), Some(MessageKind::LogoutRequest));
        let resolved = answer.resolved_document().unwrap().unwrap();
        assert_eq!(resolved.root().id(), Some(request.header.id.as_str()));
        assert!(validator(SP_CERT).check_signature(&resolved).unwrap());

        let again = ArtifactMessageParser::parse(&responder.respond(&envelope).unwrap()).unwrap();
        assert!(again.artifact_response().unwrap().message.is_none());
    }

    #[test]
    fn unsigned_resolve_is_refused_when_validator_set() {
        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let artifact = HttpArtifactBuilder::new(SP, 0)
            .issue(store.as_ref(), &logout_request().to_xml())
            .unwrap();
        let responder =
            ArtifactResolutionResponder::new(SP, Arc::clone(&store)).with_validator(validator(IDP_CERT));
        let envelope = artifact_resolve_envelope(&ArtifactResolve::new(IDP, &artifact), None).unwrap();
        assert!(matches!(
            responder.respond(&envelope),
            Err(SamlError::SignatureMissing)
        ));
        assert!(store.get(&artifact, false).unwrap().is_some());
    }

    #[test]
    fn foreign_artifact_is_unknown_source() {
        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let responder = ArtifactResolutionResponder::new(SP, store);
        let foreign = Artifact::mint("https://other.example.org", 0).encode();
        let envelope = artifact_resolve_envelope(&ArtifactResolve::new(IDP, foreign), None).unwrap();
        assert!(matches!(
            responder.respond(&envelope),
            Err(SamlError::UnknownArtifactSource)
        ));
    }

    #[test]
    fn other_messages_are_not_artifact_messages() {
        let err = ArtifactMessageParser::parse(&soap_envelope(&logout_request().to_xml())).unwrap_err();
        assert!(matches!(err, SamlError::UnexpectedMessage { .. }));
    }
}
