//! The trust decision assembler.
//!
//! One call to [`TrustDecisionAssembler::assess`] runs an inbound response
//! through the exchange states:
//!
//! ```text
//! Received -> Extracted -> [Decrypted] -> SignatureVerified -> Validated -> Accepted
//!     \____________\______________\______________\______________\-> Rejected(reason)
//! ```
//!
//! Nothing is retried. The first failing check terminates the exchange and
//! becomes the rejection.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sp_cache::ReplayCache;
use tracing::{debug, warn};

use crate::bindings::{
    artifact_resolve_envelope, parse_artifact_query, ArtifactMessageParser, PostParser,
    RedirectParser, SoapMessageParser,
};
use crate::encryption::AssertionDecryptor;
use crate::error::{ErrorKind, SamlError, SamlResult};
use crate::signature::{XmlSignatureValidator, XmlSigner};
use crate::types::{
    confirmation_methods, ArtifactResolve, Assertion, AttributeItem, Conditions, Identifier,
    LogoutRequest, LogoutResponse, MessageKind, NameId, Response, Statement, SubjectConfirmationData,
    SubjectItem, SAML_NS,
};
use crate::validation::{
    validate_time_window, AssertionValidator, AttributeValidator, NameIdValidator,
    ResponseValidator, Validator,
};
use crate::xml::Document;

use super::{Identity, IdentityProvider, PersistentPseudonymMapper, SubjectId, TrustContext};

/// An inbound message as the transport delivered it.
#[derive(Debug, Clone, Copy)]
pub enum InboundMessage<'a> {
    /// HTTP-Redirect: the raw, still URL-encoded query string.
    Redirect {
        /// Query string without the leading `?`.
        query: &'a str,
    },
    /// HTTP-POST carrying a `SAMLResponse`.
    Post {
        /// Base64 `SAMLResponse` field value.
        saml_response: &'a str,
        /// `RelayState` field value.
        relay_state: Option<&'a str>,
    },
    /// HTTP-POST carrying a `SAMLRequest`.
    PostRequest {
        /// Base64 `SAMLRequest` field value.
        saml_request: &'a str,
        /// `RelayState` field value.
        relay_state: Option<&'a str>,
    },
    /// A SOAP envelope or bare message from a back channel, including the
    /// `ArtifactResponse` answering an artifact resolution.
    Soap {
        /// Envelope text.
        envelope: &'a str,
        /// Relay state that accompanied the artifact, if any.
        relay_state: Option<&'a str>,
    },
}

/// Per-exchange inputs: the clock and what the caller expects.
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    now: DateTime<Utc>,
    expected_request_id: Option<String>,
    artifact_resolve_id: Option<String>,
    endpoint: Option<String>,
}

impl ExchangeContext {
    /// An exchange evaluated at the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// An exchange evaluated at `now`.
    #[must_use]
    pub const fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            expected_request_id: None,
            artifact_resolve_id: None,
            endpoint: None,
        }
    }

    /// Requires `InResponseTo` to equal the outstanding request ID.
    #[must_use]
    pub fn expecting(mut self, request_id: impl Into<String>) -> Self {
        self.expected_request_id = Some(request_id.into());
        self
    }

    /// Requires an `ArtifactResponse` to answer this `ArtifactResolve`.
    #[must_use]
    pub fn resolving(mut self, artifact_resolve_id: impl Into<String>) -> Self {
        self.artifact_resolve_id = Some(artifact_resolve_id.into());
        self
    }

    /// Sets the URL the message was received at. Defaults to the
    /// configured endpoint for the message kind.
    #[must_use]
    pub fn received_at(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Returns the evaluation time.
    #[must_use]
    pub const fn time(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Why an exchange was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Signature missing, malformed or not verifying.
    BadSignature,
    /// The message could not be extracted or breaks a schema rule.
    FormatViolation,
    /// Outside the validity window, after its end.
    Expired,
    /// Outside the validity window, before its start.
    NotYetValid,
    /// The issuer is not a trusted identity provider.
    UnknownIssuer,
    /// An encrypted element could not be decrypted.
    DecryptionFailed,
    /// The service provider is not an allowed audience.
    AudienceMismatch,
    /// Delivered to an endpoint other than the one it names.
    RecipientMismatch,
    /// Answers a different request.
    InResponseToMismatch,
    /// The assertion was already accepted once.
    Replayed,
    /// The identity provider reported a failure.
    UnsuccessfulStatus,
    /// Local configuration or infrastructure failed.
    Internal,
}

impl RejectReason {
    /// Classifies an error.
    #[must_use]
    pub const fn of(error: &SamlError) -> Self {
        match error {
            SamlError::Expired { .. } => Self::Expired,
            SamlError::NotYetValid { .. } => Self::NotYetValid,
            SamlError::UnknownIssuer(_)
            | SamlError::UnknownArtifactSource
            | SamlError::IssuerMismatch { .. }
            | SamlError::UntrustedCertificate(_) => Self::UnknownIssuer,
            SamlError::InvalidAudience { .. } => Self::AudienceMismatch,
            SamlError::InvalidRecipient { .. } => Self::RecipientMismatch,
            SamlError::InResponseToMismatch { .. } => Self::InResponseToMismatch,
            SamlError::Replayed(_) => Self::Replayed,
            SamlError::UnsuccessfulStatus { .. } => Self::UnsuccessfulStatus,
            SamlError::MessageNotSigned => Self::BadSignature,
            SamlError::MissingConfiguration(_) => Self::Internal,
            other => match other.kind() {
                ErrorKind::Signature => Self::BadSignature,
                ErrorKind::Decryption => Self::DecryptionFailed,
                ErrorKind::Internal => Self::Internal,
                ErrorKind::TransportFormat
                | ErrorKind::SchemaFormat
                | ErrorKind::OperationalMisuse
                | ErrorKind::Temporal
                | ErrorKind::Trust => Self::FormatViolation,
            },
        }
    }

    /// Returns the reason code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadSignature => "bad-signature",
            Self::FormatViolation => "format-violation",
            Self::Expired => "expired",
            Self::NotYetValid => "not-yet-valid",
            Self::UnknownIssuer => "unknown-issuer",
            Self::DecryptionFailed => "decryption-failed",
            Self::AudienceMismatch => "audience-mismatch",
            Self::RecipientMismatch => "recipient-mismatch",
            Self::InResponseToMismatch => "in-response-to-mismatch",
            Self::Replayed => "replayed",
            Self::UnsuccessfulStatus => "unsuccessful-status",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected exchange.
#[derive(Debug)]
pub struct Rejection {
    /// Reason code.
    pub reason: RejectReason,
    /// Issuer, if the exchange got far enough to know it.
    pub issuer: Option<String>,
    /// The failing check.
    pub error: SamlError,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.error)
    }
}

/// Outcome of an exchange.
#[derive(Debug)]
pub enum TrustDecision {
    /// The message authenticated a subject.
    Accepted(Identity),
    /// The message was refused.
    Rejected(Rejection),
}

impl TrustDecision {
    /// Returns true if accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Returns the identity of an accepted exchange.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Accepted(identity) => Some(identity),
            Self::Rejected(_) => None,
        }
    }

    /// Returns the rejection of a refused exchange.
    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }

    /// Returns the reason code of a refused exchange.
    #[must_use]
    pub fn reason(&self) -> Option<RejectReason> {
        self.rejection().map(|rejection| rejection.reason)
    }

    /// Converts into a result.
    ///
    /// # Errors
    ///
    /// Returns the rejection's error.
    pub fn into_result(self) -> SamlResult<Identity> {
        match self {
            Self::Accepted(identity) => Ok(identity),
            Self::Rejected(rejection) => Err(rejection.error),
        }
    }
}

/// A verified single-logout message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutMessage {
    /// The identity provider asks to end a session.
    Request {
        /// Identity provider.
        issuer: String,
        /// Request ID, answered by the `LogoutResponse`.
        request_id: String,
        /// Subject whose session ends.
        name_id: NameId,
        /// Sessions to end; empty means all.
        session_indexes: Vec<String>,
        /// Relay state.
        relay_state: Option<String>,
    },
    /// The identity provider answers our `LogoutRequest`.
    Response {
        /// Identity provider.
        issuer: String,
        /// Request this answers.
        in_response_to: Option<String>,
        /// Relay state.
        relay_state: Option<String>,
    },
}

/// An artifact resolution ready to be sent.
#[derive(Debug, Clone)]
pub struct ArtifactResolution<'c> {
    /// The identity provider that minted the artifact.
    pub identity_provider: &'c IdentityProvider,
    /// Its artifact resolution endpoint.
    pub endpoint: String,
    /// ID of the `ArtifactResolve`, to pass to [`ExchangeContext::resolving`].
    pub request_id: String,
    /// The SOAP request.
    pub envelope: String,
    /// `RelayState` that accompanied the artifact.
    pub relay_state: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum ExchangeState {
    Received,
    Extracted,
    Decrypted,
    SignatureVerified,
    Validated,
    Accepted,
}

impl ExchangeState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Decrypted => "decrypted",
            Self::SignatureVerified => "signature-verified",
            Self::Validated => "validated",
            Self::Accepted => "accepted",
        }
    }
}

/// How the binding carried the message, kept for the signature stage.
enum Envelope {
    Plain,
    Redirect(RedirectParser),
    Artifact(ArtifactMessageParser),
}

struct Extracted {
    document: Document,
    relay_state: Option<String>,
    envelope: Envelope,
}

/// Turns inbound messages into trust decisions.
#[derive(Clone)]
pub struct TrustDecisionAssembler<'c> {
    context: &'c TrustContext,
    replay_cache: Option<Arc<dyn ReplayCache>>,
    mapper: Option<Arc<dyn PersistentPseudonymMapper>>,
}

impl<'c> TrustDecisionAssembler<'c> {
    /// Creates an assembler over a trust context snapshot.
    #[must_use]
    pub const fn new(context: &'c TrustContext) -> Self {
        Self {
            context,
            replay_cache: None,
            mapper: None,
        }
    }

    /// Rejects assertion IDs already present in `cache`.
    #[must_use]
    pub fn with_replay_cache(mut self, cache: Arc<dyn ReplayCache>) -> Self {
        self.replay_cache = Some(cache);
        self
    }

    /// Maps persistent name IDs through `mapper`.
    #[must_use]
    pub fn with_pseudonym_mapper(mut self, mapper: Arc<dyn PersistentPseudonymMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Evaluates an inbound `Response`.
    pub fn assess(&self, message: &InboundMessage<'_>, exchange: &ExchangeContext) -> TrustDecision {
        let mut issuer = None;
        match self.evaluate(message, exchange, &mut issuer) {
            Ok(identity) => TrustDecision::Accepted(identity),
            Err(error) => {
                let reason = RejectReason::of(&error);
                warn!(
                    reason = reason.as_str(),
                    issuer = issuer.as_deref().unwrap_or("-"),
                    error = %error,
                    "SAML response rejected"
                );
                TrustDecision::Rejected(Rejection {
                    reason,
                    issuer,
                    error,
                })
            }
        }
    }

    /// Verifies a `LogoutRequest` or `LogoutResponse`. Logout messages must
    /// be signed, by the detached Redirect signature or an enveloped one.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn verify_logout(
        &self,
        message: &InboundMessage<'_>,
        exchange: &ExchangeContext,
    ) -> SamlResult<LogoutMessage> {
        self.evaluate_logout(message, exchange).inspect_err(|error| {
            warn!(
                reason = RejectReason::of(error).as_str(),
                error = %error,
                "SAML logout message rejected"
            );
        })
    }

    /// Prepares the `ArtifactResolve` for an artifact received in a query
    /// string. The caller posts the envelope to the endpoint and passes the
    /// answer to [`TrustDecisionAssembler::assess`] as
    /// [`InboundMessage::Soap`].
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnknownArtifactSource`] if no configured
    /// identity provider minted the artifact, and
    /// [`SamlError::MissingConfiguration`] if it has no resolution endpoint.
    pub fn resolve_artifact(
        &self,
        query: &str,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<ArtifactResolution<'c>> {
        let (artifact, encoded, relay_state) = parse_artifact_query(query)?;
        let provider = self
            .context
            .identity_provider_for_artifact(&artifact)
            .ok_or(SamlError::UnknownArtifactSource)?;
        let endpoint = provider.artifact_resolution_url.clone().ok_or_else(|| {
            SamlError::MissingConfiguration(format!(
                "no artifact resolution endpoint for {}",
                provider.entity_id
            ))
        })?;
        let resolve = ArtifactResolve::new(self.context.entity_id(), encoded).with_destination(&endpoint);
        debug!(
            issuer = %provider.entity_id,
            endpoint_index = artifact.endpoint_index,
            "resolving artifact"
        );
        Ok(ArtifactResolution {
            identity_provider: provider,
            envelope: artifact_resolve_envelope(&resolve, signer)?,
            request_id: resolve.header.id,
            endpoint,
            relay_state,
        })
    }

    fn transition(&self, state: ExchangeState, issuer: Option<&str>) {
        debug!(
            state = state.as_str(),
            issuer = issuer.unwrap_or("-"),
            "trust decision transition"
        );
    }

    fn evaluate(
        &self,
        message: &InboundMessage<'_>,
        exchange: &ExchangeContext,
        issuer_slot: &mut Option<String>,
    ) -> SamlResult<Identity> {
        self.transition(ExchangeState::Received, None);
        let extracted = self.extract(message, exchange)?;
        let root = extracted.document.root();
        if MessageKind::of(root) != Some(MessageKind::Response) {
            return Err(SamlError::UnexpectedMessage {
                expected: "Response",
                actual: root.qualified_name(),
            });
        }
        let response = Response::from_element(root)?;
        let issuer = response_issuer(&response)?;
        *issuer_slot = Some(issuer.clone());
        let provider = self
            .context
            .identity_provider(&issuer)
            .ok_or_else(|| SamlError::UnknownIssuer(issuer.clone()))?;
        self.transition(ExchangeState::Extracted, Some(&issuer));

        response.status.ensure_success()?;

        let mut decrypted = Vec::with_capacity(response.encrypted_assertions.len());
        if !response.encrypted_assertions.is_empty() {
            let decryptor = self.decryptor()?;
            for encrypted in &response.encrypted_assertions {
                decrypted.push(decryptor.decrypt_assertion(encrypted)?);
            }
            self.transition(ExchangeState::Decrypted, Some(&issuer));
        }
        match response.assertions.len() + decrypted.len() {
            0 => return Err(SamlError::MissingElement("Response/Assertion".to_string())),
            1 => {}
            n => {
                return Err(SamlError::SchemaViolation(format!(
                    "Response carries {n} assertions, exactly one is accepted"
                )))
            }
        }

        let validator = provider.signature_validator(exchange.now, self.context.sha1_allowed())?;
        let message_signed = verify_message_signature(&extracted, &response, &issuer, &validator)?;
        let assertion = match response.assertions.first() {
            Some(assertion) => {
                let element = root
                    .children_named(SAML_NS, "Assertion")
                    .next()
                    .ok_or_else(|| SamlError::MissingElement("Response/Assertion".to_string()))?;
                verify_assertion_signature(
                    provider,
                    &validator,
                    &extracted.document,
                    element,
                    assertion.signed,
                    message_signed,
                )?;
                assertion.clone()
            }
            None => {
                let (document, assertion) = decrypted
                    .into_iter()
                    .next()
                    .ok_or_else(|| SamlError::MissingElement("Response/Assertion".to_string()))?;
                verify_assertion_signature(
                    provider,
                    &validator,
                    &document,
                    document.root(),
                    assertion.signed,
                    message_signed,
                )?;
                AssertionValidator.validate(&assertion)?;
                assertion
            }
        };
        if assertion.issuer.value != provider.entity_id {
            return Err(SamlError::IssuerMismatch {
                expected: provider.entity_id.clone(),
                actual: assertion.issuer.value.clone(),
            });
        }
        self.transition(ExchangeState::SignatureVerified, Some(&issuer));

        ResponseValidator.validate(&response)?;
        let endpoint = exchange
            .endpoint
            .as_deref()
            .unwrap_or_else(|| self.context.assertion_consumer_service_url());
        check_destination(response.header.destination.as_deref(), endpoint)?;
        check_in_response_to(response.in_response_to.as_deref(), exchange)?;
        self.check_audience(assertion.conditions.as_ref())?;
        let bearer_expiry = self.check_bearer(&assertion, exchange, endpoint)?;
        self.transition(ExchangeState::Validated, Some(&issuer));

        let conditions = assertion.conditions.as_ref();
        validate_time_window(
            "Conditions",
            conditions.and_then(|c| c.not_before),
            conditions.and_then(|c| c.not_on_or_after),
            exchange.now,
            self.context.clock_skew(),
        )?;
        if let Some(authn) = assertion.authn_statement() {
            validate_time_window(
                "AuthnStatement",
                None,
                authn.session_not_on_or_after,
                exchange.now,
                self.context.clock_skew(),
            )?;
        }

        let identity = self.extract_identity(&assertion, &issuer, extracted.relay_state)?;
        self.check_replay(&assertion, conditions, bearer_expiry)?;
        self.transition(ExchangeState::Accepted, Some(&issuer));
        Ok(identity)
    }

    fn extract(&self, message: &InboundMessage<'_>, exchange: &ExchangeContext) -> SamlResult<Extracted> {
        let limit = self.context.max_message_bytes();
        match *message {
            InboundMessage::Redirect { query } => {
                let parser = RedirectParser::parse_query_with_limit(query, limit)?;
                Ok(Extracted {
                    document: parser.document()?,
                    relay_state: parser.relay_state().map(str::to_string),
                    envelope: Envelope::Redirect(parser),
                })
            }
            InboundMessage::Post {
                saml_response,
                relay_state,
            } => {
                let parser = PostParser::from_form_with_limit(None, Some(saml_response), relay_state, limit)?;
                Ok(Extracted {
                    document: parser.document()?,
                    relay_state: relay_state.map(str::to_string),
                    envelope: Envelope::Plain,
                })
            }
            InboundMessage::PostRequest {
                saml_request,
                relay_state,
            } => {
                let parser = PostParser::from_form_with_limit(Some(saml_request), None, relay_state, limit)?;
                Ok(Extracted {
                    document: parser.document()?,
                    relay_state: relay_state.map(str::to_string),
                    envelope: Envelope::Plain,
                })
            }
            InboundMessage::Soap {
                envelope,
                relay_state,
            } => {
                if envelope.len() > limit {
                    return Err(SamlError::MessageTooLarge { limit });
                }
                let soap = SoapMessageParser::parse(envelope)?;
                if soap.message_kind() != Some(MessageKind::ArtifactResponse) {
                    let preserve = soap.document().preserves_whitespace();
                    return Ok(Extracted {
                        document: Document::from_root(soap.message_element().clone(), preserve),
                        relay_state: relay_state.map(str::to_string),
                        envelope: Envelope::Plain,
                    });
                }
                let artifact = ArtifactMessageParser::from_soap(soap)?;
                let response = artifact.artifact_response()?;
                response.status.ensure_success()?;
                if let Some(expected) = &exchange.artifact_resolve_id {
                    if response.in_response_to.as_deref() != Some(expected.as_str()) {
                        return Err(SamlError::InResponseToMismatch {
                            expected: expected.clone(),
                            actual: response.in_response_to.clone().unwrap_or_default(),
                        });
                    }
                }
                let document = artifact
                    .resolved_document()?
                    .ok_or_else(|| SamlError::MissingElement("ArtifactResponse message".to_string()))?;
                Ok(Extracted {
                    document,
                    relay_state: relay_state.map(str::to_string),
                    envelope: Envelope::Artifact(artifact),
                })
            }
        }
    }

    fn decryptor(&self) -> SamlResult<AssertionDecryptor<'c>> {
        self.context
            .decryption_key()
            .map(AssertionDecryptor::new)
            .ok_or_else(|| SamlError::Decryption("no decryption key configured".to_string()))
    }

    fn check_audience(&self, conditions: Option<&Conditions>) -> SamlResult<()> {
        let entity_id = self.context.entity_id();
        let mut restrictions = conditions
            .into_iter()
            .flat_map(Conditions::audience_restrictions)
            .peekable();
        let restricted = restrictions.peek().is_some();
        let allowed = restricted
            && restrictions.all(|audiences| audiences.iter().any(|audience| audience == entity_id));
        if allowed {
            Ok(())
        } else {
            Err(SamlError::InvalidAudience {
                expected: entity_id.to_string(),
            })
        }
    }

    /// Finds a bearer confirmation that holds and returns its expiry.
    fn check_bearer(
        &self,
        assertion: &Assertion,
        exchange: &ExchangeContext,
        endpoint: &str,
    ) -> SamlResult<DateTime<Utc>> {
        let subject = assertion
            .subject
            .as_ref()
            .ok_or_else(|| SamlError::MissingElement("Assertion/Subject".to_string()))?;
        let mut first_failure = None;
        for confirmation in subject
            .confirmations()
            .filter(|confirmation| confirmation.method == confirmation_methods::BEARER)
        {
            match self.check_bearer_data(confirmation.data.as_ref(), exchange, endpoint) {
                Ok(expiry) => return Ok(expiry),
                Err(error) => {
                    debug!(error = %error, "bearer confirmation did not hold");
                    first_failure.get_or_insert(error);
                }
            }
        }
        Err(first_failure.unwrap_or_else(|| {
            SamlError::SchemaViolation("assertion has no bearer SubjectConfirmation".to_string())
        }))
    }

    fn check_bearer_data(
        &self,
        data: Option<&SubjectConfirmationData>,
        exchange: &ExchangeContext,
        endpoint: &str,
    ) -> SamlResult<DateTime<Utc>> {
        let data = data.ok_or_else(|| {
            SamlError::MissingElement("SubjectConfirmation/SubjectConfirmationData".to_string())
        })?;
        let recipient = data.recipient.as_deref().ok_or_else(|| SamlError::MissingAttribute {
            element: "SubjectConfirmationData".to_string(),
            attribute: "Recipient",
        })?;
        if recipient != endpoint {
            return Err(SamlError::InvalidRecipient {
                expected: endpoint.to_string(),
                actual: recipient.to_string(),
            });
        }
        let not_on_or_after = data.not_on_or_after.ok_or_else(|| SamlError::MissingAttribute {
            element: "SubjectConfirmationData".to_string(),
            attribute: "NotOnOrAfter",
        })?;
        validate_time_window(
            "SubjectConfirmationData",
            data.not_before,
            Some(not_on_or_after),
            exchange.now,
            self.context.clock_skew(),
        )?;
        check_in_response_to(data.in_response_to.as_deref(), exchange)?;
        Ok(not_on_or_after)
    }

    fn check_replay(
        &self,
        assertion: &Assertion,
        conditions: Option<&Conditions>,
        bearer_expiry: DateTime<Utc>,
    ) -> SamlResult<()> {
        if !self.context.replay_detection() {
            return Ok(());
        }
        let Some(cache) = &self.replay_cache else {
            return Ok(());
        };
        let horizon = conditions
            .and_then(|c| c.not_on_or_after)
            .map_or(bearer_expiry, |end| end.max(bearer_expiry))
            + self.context.clock_skew();
        if cache.check_and_insert(&assertion.id, SystemTime::from(horizon))? {
            Ok(())
        } else {
            Err(SamlError::Replayed(assertion.id.clone()))
        }
    }

    fn extract_identity(
        &self,
        assertion: &Assertion,
        issuer: &str,
        relay_state: Option<String>,
    ) -> SamlResult<Identity> {
        let subject = assertion
            .subject
            .as_ref()
            .ok_or_else(|| SamlError::MissingElement("Assertion/Subject".to_string()))?;
        let mut name_id = None;
        for item in &subject.items {
            match item {
                SubjectItem::NameId(plain) => {
                    name_id = Some(plain.clone());
                    break;
                }
                SubjectItem::EncryptedId(encrypted) => {
                    let decrypted = self.decryptor()?.decrypt_name_id(encrypted)?;
                    NameIdValidator.validate(&decrypted)?;
                    name_id = Some(decrypted);
                    break;
                }
                SubjectItem::SubjectConfirmation(_) => {}
            }
        }
        let name_id = name_id.ok_or_else(|| SamlError::MissingElement("Subject/NameID".to_string()))?;

        let mut attributes = std::collections::BTreeMap::<String, Vec<String>>::new();
        for statement in &assertion.statements {
            let Statement::Attribute(statement) = statement else {
                continue;
            };
            for item in &statement.items {
                let attribute = match item {
                    AttributeItem::Attribute(attribute) => attribute.clone(),
                    AttributeItem::EncryptedAttribute(encrypted) => {
                        let attribute = self.decryptor()?.decrypt_attribute(encrypted)?;
                        AttributeValidator.validate(&attribute)?;
                        attribute
                    }
                };
                attributes
                    .entry(attribute.name)
                    .or_default()
                    .extend(attribute.values.into_iter().flatten());
            }
        }

        let subject = SubjectId::from(&name_id);
        let pseudonym = match &self.mapper {
            Some(mapper) if subject.is_persistent() => mapper.map_identity(issuer, &name_id)?,
            _ => None,
        };
        let authn = assertion.authn_statement();
        Ok(Identity {
            issuer: issuer.to_string(),
            subject,
            pseudonym,
            assertion_id: assertion.id.clone(),
            authn_instant: authn.map(|authn| authn.authn_instant),
            session_index: authn.and_then(|authn| authn.session_index.clone()),
            session_not_on_or_after: authn.and_then(|authn| authn.session_not_on_or_after),
            authn_context_class_ref: authn.and_then(|authn| authn.authn_context_class_ref.clone()),
            attributes,
            relay_state,
        })
    }

    fn evaluate_logout(
        &self,
        message: &InboundMessage<'_>,
        exchange: &ExchangeContext,
    ) -> SamlResult<LogoutMessage> {
        let extracted = self.extract(message, exchange)?;
        let root = extracted.document.root();
        let kind = MessageKind::of(root);
        if !matches!(kind, Some(MessageKind::LogoutRequest | MessageKind::LogoutResponse)) {
            return Err(SamlError::UnexpectedMessage {
                expected: "LogoutRequest or LogoutResponse",
                actual: root.qualified_name(),
            });
        }

        let (request, response) = if kind == Some(MessageKind::LogoutRequest) {
            (Some(LogoutRequest::from_element(root)?), None)
        } else {
            (None, Some(LogoutResponse::from_element(root)?))
        };
        let header = request
            .as_ref()
            .map(|request| &request.header)
            .or_else(|| response.as_ref().map(|response| &response.header))
            .ok_or_else(|| SamlError::MissingElement("LogoutRequest".to_string()))?;
        let issuer = header
            .issuer_value()
            .ok_or_else(|| SamlError::MissingElement("Issuer".to_string()))?
            .to_string();
        let provider = self
            .context
            .identity_provider(&issuer)
            .ok_or_else(|| SamlError::UnknownIssuer(issuer.clone()))?;
        let validator = provider.signature_validator(exchange.now, self.context.sha1_allowed())?;

        let signed = match &extracted.envelope {
            Envelope::Redirect(parser) if parser.is_signed() => {
                require_valid(parser.check_signature(&validator)?, "Redirect query")?;
                true
            }
            _ => false,
        };
        if header.signed {
            require_valid(validator.check_signature(&extracted.document)?, "logout message")?;
        } else if !signed {
            return Err(SamlError::SignatureMissing);
        }

        if let Some(endpoint) = exchange
            .endpoint
            .as_deref()
            .or_else(|| self.context.single_logout_service_url())
        {
            check_destination(header.destination.as_deref(), endpoint)?;
        }

        if let Some(request) = request {
            validate_time_window(
                "LogoutRequest",
                None,
                request.not_on_or_after,
                exchange.now,
                self.context.clock_skew(),
            )?;
            let name_id = match request.identifier {
                Some(Identifier::NameId(name_id)) => name_id,
                Some(Identifier::EncryptedId(encrypted)) => self.decryptor()?.decrypt_name_id(&encrypted)?,
                None => return Err(SamlError::MissingElement("LogoutRequest/NameID".to_string())),
            };
            debug!(issuer = %issuer, sessions = request.session_indexes.len(), "logout request verified");
            return Ok(LogoutMessage::Request {
                issuer,
                request_id: request.header.id,
                name_id,
                session_indexes: request.session_indexes,
                relay_state: extracted.relay_state,
            });
        }

        let response = response.ok_or_else(|| SamlError::MissingElement("LogoutResponse".to_string()))?;
        check_in_response_to(response.in_response_to.as_deref(), exchange)?;
        response.status.ensure_success()?;
        debug!(issuer = %issuer, "logout response verified");
        Ok(LogoutMessage::Response {
            issuer,
            in_response_to: response.in_response_to,
            relay_state: extracted.relay_state,
        })
    }
}

/// The response issuer, or the assertion issuer when the response names
/// none.
fn response_issuer(response: &Response) -> SamlResult<String> {
    response
        .header
        .issuer_value()
        .or_else(|| response.assertions.first().map(|assertion| assertion.issuer.value.as_str()))
        .map(str::to_string)
        .ok_or_else(|| SamlError::MissingElement("Response/Issuer".to_string()))
}

fn require_valid(valid: bool, what: &str) -> SamlResult<()> {
    if valid {
        Ok(())
    } else {
        Err(SamlError::SignatureInvalid(format!("{what} signature does not verify")))
    }
}

/// Checks every message-level signature and returns true if at least one
/// covers the whole response.
fn verify_message_signature(
    extracted: &Extracted,
    response: &Response,
    issuer: &str,
    validator: &XmlSignatureValidator,
) -> SamlResult<bool> {
    let mut signed = false;
    match &extracted.envelope {
        Envelope::Plain => {}
        Envelope::Redirect(parser) => {
            if parser.is_signed() {
                require_valid(parser.check_signature(validator)?, "Redirect query")?;
                signed = true;
            }
        }
        Envelope::Artifact(artifact) => {
            if let Some(outer) = artifact.issuer() {
                if outer != issuer {
                    return Err(SamlError::IssuerMismatch {
                        expected: outer,
                        actual: issuer.to_string(),
                    });
                }
            }
            if artifact.artifact_response()?.header.signed {
                require_valid(artifact.check_signature(validator)?, "ArtifactResponse")?;
                signed = true;
            }
        }
    }
    if response.header.signed {
        require_valid(validator.check_signature(&extracted.document)?, "Response")?;
        signed = true;
    }
    Ok(signed)
}

fn verify_assertion_signature(
    provider: &IdentityProvider,
    validator: &XmlSignatureValidator,
    document: &Document,
    element: &crate::xml::Element,
    assertion_signed: bool,
    message_signed: bool,
) -> SamlResult<()> {
    if assertion_signed {
        require_valid(validator.check_element(document, element)?, "Assertion")
    } else if !message_signed || provider.want_assertions_signed {
        Err(SamlError::SignatureMissing)
    } else {
        Ok(())
    }
}

fn check_destination(destination: Option<&str>, endpoint: &str) -> SamlResult<()> {
    match destination {
        Some(destination) if destination != endpoint => Err(SamlError::InvalidRecipient {
            expected: endpoint.to_string(),
            actual: destination.to_string(),
        }),
        _ => Ok(()),
    }
}

fn check_in_response_to(actual: Option<&str>, exchange: &ExchangeContext) -> SamlResult<()> {
    match &exchange.expected_request_id {
        Some(expected) if actual != Some(expected.as_str()) => Err(SamlError::InResponseToMismatch {
            expected: expected.clone(),
            actual: actual.unwrap_or_default().to_string(),
        }),
        _ => Ok(()),
    }
}
