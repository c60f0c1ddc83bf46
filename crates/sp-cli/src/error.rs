//! CLI error types.

use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] sp_core::Error),

    /// SAML processing error.
    #[error("SAML error: {0}")]
    Saml(#[from] sp_protocol_saml::SamlError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] sp_crypto::CryptoError),

    /// The trust decision assembler rejected the message.
    #[error("rejected ({reason}): {message}")]
    Rejected {
        /// Reason code.
        reason: String,
        /// Failing check.
        message: String,
    },

    /// A signature did not verify.
    #[error("signature does not verify")]
    SignatureInvalid,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Process exit status for this error. Rejections and failed
    /// verifications exit with 2, everything else with 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Rejected { .. } | Self::SignatureInvalid => 2,
            _ => 1,
        }
    }
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;
