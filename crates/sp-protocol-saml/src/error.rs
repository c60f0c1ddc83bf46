//! SAML error types.
//!
//! Every error maps onto one [`ErrorKind`]. Callers decide on the kind, never
//! on the message text; all kinds other than [`ErrorKind::Internal`] are
//! security relevant and must lead to rejection of the message.

use thiserror::Error;

/// Error classification used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The message could not be extracted from its transport envelope.
    TransportFormat,
    /// A signature is missing, malformed or cryptographically invalid.
    Signature,
    /// A structural SAML rule is violated.
    SchemaFormat,
    /// The message is outside its validity window.
    Temporal,
    /// The issuer or its key material is not trusted.
    Trust,
    /// Encrypted content could not be decrypted.
    Decryption,
    /// The API was used in a way its contract forbids.
    OperationalMisuse,
    /// A local resource failed.
    Internal,
}

/// SAML-specific errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// A binding parameter is missing.
    #[error("missing binding parameter: {0}")]
    MissingParameter(&'static str),

    /// Binding parameters are malformed or inconsistent.
    #[error("invalid binding parameters: {0}")]
    InvalidBinding(String),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// DEFLATE decoding failed.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// The decoded message exceeds the configured size limit.
    #[error("message exceeds {limit} bytes")]
    MessageTooLarge {
        /// Limit in bytes.
        limit: usize,
    },

    /// The message is not valid UTF-8.
    #[error("message is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    /// XML is not well-formed or uses forbidden constructs.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// The SOAP envelope is malformed.
    #[error("invalid SOAP envelope: {0}")]
    InvalidSoapEnvelope(String),

    /// The artifact does not decode to a valid 44-byte artifact.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// A different message was expected.
    #[error("expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message name.
        expected: &'static str,
        /// Actual element name.
        actual: String,
    },

    /// The element carries no signature.
    #[error("signature missing")]
    SignatureMissing,

    /// The signature structure is malformed or does not reference the
    /// element it is attached to.
    #[error("malformed signature: {0}")]
    SignatureMalformed(String),

    /// The signature or digest does not verify.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Two elements share an ID, so a reference is ambiguous.
    #[error("duplicate ID attribute value: {0}")]
    DuplicateId(String),

    /// The algorithm is unknown or not permitted.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Creating a signature failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// The document was loaded without preserving whitespace, so digests
    /// cannot be recomputed faithfully.
    #[error("document was loaded without preserving whitespace; signatures cannot be checked")]
    WhitespaceNotPreserved,

    /// A required element is missing.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// A required attribute is missing.
    #[error("element {element} is missing required attribute {attribute}")]
    MissingAttribute {
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: &'static str,
    },

    /// A value must be a well-formed absolute URI.
    #[error("{field} must be a well-formed absolute URI, got '{value}'")]
    InvalidUri {
        /// Field name.
        field: String,
        /// Rejected value.
        value: String,
    },

    /// A timestamp is not a valid xs:dateTime.
    #[error("invalid timestamp in {field}: '{value}'")]
    InvalidTimestamp {
        /// Field name.
        field: String,
        /// Rejected value.
        value: String,
    },

    /// A normative SAML schema rule is violated.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// The validity window has closed.
    #[error("{element} expired at {not_on_or_after}")]
    Expired {
        /// Element whose window closed.
        element: &'static str,
        /// End of the window.
        not_on_or_after: String,
    },

    /// The validity window has not opened yet.
    #[error("{element} is not valid before {not_before}")]
    NotYetValid {
        /// Element whose window is not open.
        element: &'static str,
        /// Start of the window.
        not_before: String,
    },

    /// No identity provider is configured for the issuer.
    #[error("unknown issuer: {0}")]
    UnknownIssuer(String),

    /// The artifact source ID matches no configured identity provider.
    #[error("artifact source ID matches no configured identity provider")]
    UnknownArtifactSource,

    /// Issuers inside one message disagree.
    #[error("issuer mismatch: expected '{expected}', got '{actual}'")]
    IssuerMismatch {
        /// Outer issuer.
        expected: String,
        /// Inner issuer.
        actual: String,
    },

    /// No configured certificate passes its certificate specifications.
    #[error("no trusted certificate for {0}")]
    UntrustedCertificate(String),

    /// The service provider is not among the allowed audiences.
    #[error("audience restriction does not include {expected}")]
    InvalidAudience {
        /// Entity ID of this service provider.
        expected: String,
    },

    /// The message was addressed to a different endpoint.
    #[error("message addressed to '{actual}', received at '{expected}'")]
    InvalidRecipient {
        /// Endpoint that received the message.
        expected: String,
        /// Destination or Recipient in the message.
        actual: String,
    },

    /// The response does not answer the expected request.
    #[error("InResponseTo '{actual}' does not match request '{expected}'")]
    InResponseToMismatch {
        /// Outstanding request ID.
        expected: String,
        /// Value carried by the response.
        actual: String,
    },

    /// The assertion ID was already accepted.
    #[error("assertion {0} was already used")]
    Replayed(String),

    /// The identity provider reported a failure status.
    #[error("identity provider returned status {code}")]
    UnsuccessfulStatus {
        /// Top-level status code.
        code: String,
        /// Second-level status code, if any.
        sub_code: Option<String>,
    },

    /// Decryption failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The message was never signed.
    #[error("message is not signed")]
    MessageNotSigned,

    /// A builder already holds a message of the other kind.
    #[error("builder already holds a {existing}; cannot set a {attempted}")]
    ConflictingMessage {
        /// Message kind already set.
        existing: &'static str,
        /// Message kind being set.
        attempted: &'static str,
    },

    /// Required local configuration is absent.
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Cache error.
    #[error("cache error: {0}")]
    Cache(String),
}

impl SamlError {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameter(_)
            | Self::InvalidBinding(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::MessageTooLarge { .. }
            | Self::InvalidEncoding(_)
            | Self::XmlParse(_)
            | Self::InvalidSoapEnvelope(_)
            | Self::InvalidArtifact(_)
            | Self::UnexpectedMessage { .. } => ErrorKind::TransportFormat,

            Self::SignatureMissing
            | Self::SignatureMalformed(_)
            | Self::SignatureInvalid(_)
            | Self::DuplicateId(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::SignatureCreation(_) => ErrorKind::Signature,

            Self::WhitespaceNotPreserved
            | Self::MissingElement(_)
            | Self::MissingAttribute { .. }
            | Self::InvalidUri { .. }
            | Self::InvalidTimestamp { .. }
            | Self::SchemaViolation(_) => ErrorKind::SchemaFormat,

            Self::Expired { .. } | Self::NotYetValid { .. } => ErrorKind::Temporal,

            Self::UnknownIssuer(_)
            | Self::UnknownArtifactSource
            | Self::IssuerMismatch { .. }
            | Self::UntrustedCertificate(_)
            | Self::InvalidAudience { .. }
            | Self::InvalidRecipient { .. }
            | Self::InResponseToMismatch { .. }
            | Self::Replayed(_)
            | Self::UnsuccessfulStatus { .. } => ErrorKind::Trust,

            Self::Decryption(_) => ErrorKind::Decryption,

            Self::MessageNotSigned
            | Self::ConflictingMessage { .. }
            | Self::MissingConfiguration(_) => ErrorKind::OperationalMisuse,

            Self::Crypto(_) | Self::Cache(_) => ErrorKind::Internal,
        }
    }

    /// Returns the SAML status code to report back to the peer.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        use crate::types::constants::status_codes;
        match self.kind() {
            ErrorKind::Internal | ErrorKind::OperationalMisuse => status_codes::RESPONDER,
            _ => status_codes::REQUESTER,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<sp_crypto::CryptoError> for SamlError {
    fn from(err: sp_crypto::CryptoError) -> Self {
        match err {
            sp_crypto::CryptoError::DecryptionFailed(msg) => Self::Decryption(msg),
            sp_crypto::CryptoError::UnsupportedAlgorithm(msg) => Self::UnsupportedAlgorithm(msg),
            other => Self::Crypto(other.to_string()),
        }
    }
}

impl From<sp_cache::CacheError> for SamlError {
    fn from(err: sp_cache::CacheError) -> Self {
        Self::Cache(err.to_string())
    }
}

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SamlError::MissingParameter("SAMLRequest");
        assert_eq!(err.to_string(), "missing binding parameter: SAMLRequest");

        let err = SamlError::InvalidAudience {
            expected: "https://sp.example.org".to_string(),
        };
        assert!(err.to_string().contains("https://sp.example.org"));
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(SamlError::Deflate("x".into()).kind(), ErrorKind::TransportFormat);
        assert_eq!(SamlError::SignatureMissing.kind(), ErrorKind::Signature);
        assert_eq!(SamlError::WhitespaceNotPreserved.kind(), ErrorKind::SchemaFormat);
        assert_eq!(
            SamlError::Expired {
                element: "Conditions",
                not_on_or_after: String::new()
            }
            .kind(),
            ErrorKind::Temporal
        );
        assert_eq!(SamlError::UnknownArtifactSource.kind(), ErrorKind::Trust);
        assert_eq!(SamlError::Decryption("x".into()).kind(), ErrorKind::Decryption);
        assert_eq!(SamlError::MessageNotSigned.kind(), ErrorKind::OperationalMisuse);
    }

    #[test]
    fn crypto_errors_keep_their_kind() {
        let err: SamlError = sp_crypto::CryptoError::DecryptionFailed("bad pad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Decryption);

        let err: SamlError = sp_crypto::CryptoError::UnsupportedAlgorithm("dsa".into()).into();
        assert_eq!(err.kind(), ErrorKind::Signature);
    }

    #[test]
    fn status_code_for_requester_errors() {
        assert!(SamlError::SignatureMissing.status_code().ends_with("Requester"));
        assert!(SamlError::MissingConfiguration("key".into())
            .status_code()
            .ends_with("Responder"));
    }
}
