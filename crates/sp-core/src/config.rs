//! Configuration management for the SAML service provider.
//!
//! Configuration is a TOML document with one `[service_provider]` table and
//! any number of `[[identity_providers]]` entries:
//!
//! ```toml
//! [service_provider]
//! entity_id = "https://sp.example.org/saml"
//! assertion_consumer_service_url = "https://sp.example.org/saml/acs"
//! signing_key = { file = "keys/sp-key.pem" }
//! signing_certificate = { file = "keys/sp-cert.pem" }
//!
//! [validation]
//! clock_skew_secs = 120
//!
//! [[identity_providers]]
//! entity_id = "https://idp.example.org"
//! sso_url = "https://idp.example.org/sso"
//! certificates = [{ file = "keys/idp-cert.pem" }]
//! certificate_specifications = [{ kind = "validity-period" }]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlConfig {
    /// This service provider.
    pub service_provider: ServiceProviderConfig,
    /// Trusted identity providers.
    #[serde(default)]
    pub identity_providers: Vec<IdentityProviderConfig>,
    /// Validation tuning.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Binding tuning.
    #[serde(default)]
    pub bindings: BindingConfig,
}

/// Service-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProviderConfig {
    /// Entity ID, also the expected audience.
    pub entity_id: String,
    /// Assertion consumer service endpoint.
    pub assertion_consumer_service_url: String,
    /// Single logout endpoint.
    #[serde(default)]
    pub single_logout_service_url: Option<String>,
    /// Artifact resolution (SOAP) endpoint.
    #[serde(default)]
    pub artifact_resolution_service_url: Option<String>,
    /// Index of the artifact resolution endpoint advertised in artifacts.
    #[serde(default)]
    pub artifact_endpoint_index: u16,
    /// Private key used to sign outbound messages.
    #[serde(default)]
    pub signing_key: Option<PemSource>,
    /// Certificate matching `signing_key`, embedded in outbound signatures.
    #[serde(default)]
    pub signing_certificate: Option<PemSource>,
    /// Private key for encrypted assertions; defaults to `signing_key`.
    #[serde(default)]
    pub decryption_key: Option<PemSource>,
    /// Signature method URI for outbound messages.
    #[serde(default = "default_signature_algorithm")]
    pub signature_algorithm: String,
    /// Whether outbound AuthnRequests are signed.
    #[serde(default)]
    pub sign_authn_requests: bool,
    /// NameID format requested in AuthnRequests.
    #[serde(default)]
    pub name_id_format: Option<String>,
}

/// Identity-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    /// Entity ID, matched against `Issuer`.
    pub entity_id: String,
    /// Single sign-on endpoint (Redirect binding).
    #[serde(default)]
    pub sso_url: Option<String>,
    /// Single logout endpoint.
    #[serde(default)]
    pub slo_url: Option<String>,
    /// Artifact resolution endpoint (SOAP).
    #[serde(default)]
    pub artifact_resolution_url: Option<String>,
    /// Trusted signing certificates.
    #[serde(default)]
    pub certificates: Vec<PemSource>,
    /// Metadata document supplying additional signing certificates.
    #[serde(default)]
    pub metadata: Option<PathBuf>,
    /// Checks every trust certificate must pass before use.
    #[serde(default)]
    pub certificate_specifications: Vec<CertificateSpecificationConfig>,
    /// Reject responses whose assertions are not individually signed.
    #[serde(default)]
    pub want_assertions_signed: bool,
}

/// Where PEM material comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PemSource {
    /// Path to a PEM file, relative paths resolved against the config file.
    File(PathBuf),
    /// PEM text embedded in the configuration.
    Inline(String),
}

impl PemSource {
    /// Reads the PEM text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub fn load(&self) -> Result<String> {
        match self {
            Self::Inline(pem) => Ok(pem.clone()),
            Self::File(path) => std::fs::read_to_string(path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            }),
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if let Self::File(path) = self {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Certificate validation specifications, selected by `kind`.
///
/// An `advisory` specification only logs a failing certificate; the
/// certificate stays trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CertificateSpecificationConfig {
    /// The certificate must be inside its validity period.
    ValidityPeriod {
        /// Log instead of excluding.
        #[serde(default)]
        advisory: bool,
    },
    /// The certificate's SHA-256 fingerprint must match (hex, colons allowed).
    Fingerprint {
        /// Expected fingerprint.
        sha256: String,
        /// Log instead of excluding.
        #[serde(default)]
        advisory: bool,
    },
}

impl CertificateSpecificationConfig {
    /// Returns true if a failure is only logged.
    #[must_use]
    pub const fn is_advisory(&self) -> bool {
        match self {
            Self::ValidityPeriod { advisory } | Self::Fingerprint { advisory, .. } => *advisory,
        }
    }
}

/// Validation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Tolerated clock difference with identity providers.
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
    /// Accept RSA-SHA1 and DSA-SHA1 signatures and SHA-1 digests.
    #[serde(default)]
    pub allow_sha1: bool,
    /// Reject assertions whose ID was already accepted.
    #[serde(default = "default_true")]
    pub replay_detection: bool,
    /// Upper bound on inflated or decoded message size in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: default_clock_skew_secs(),
            allow_sha1: false,
            replay_detection: true,
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

/// Binding tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// How long an issued artifact may be resolved.
    #[serde(default = "default_artifact_ttl_secs")]
    pub artifact_ttl_secs: u64,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            artifact_ttl_secs: default_artifact_ttl_secs(),
        }
    }
}

fn default_signature_algorithm() -> String {
    "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256".to_string()
}

const fn default_clock_skew_secs() -> u64 {
    180
}

const fn default_true() -> bool {
    true
}

const fn default_max_message_bytes() -> usize {
    256 * 1024
}

const fn default_artifact_ttl_secs() -> u64 {
    60
}

impl SamlConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file; relative key, certificate and metadata paths are
    /// resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        debug!(
            path = %path.display(),
            identity_providers = config.identity_providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let sp = &mut self.service_provider;
        for source in [&mut sp.signing_key, &mut sp.signing_certificate, &mut sp.decryption_key]
            .into_iter()
            .flatten()
        {
            source.resolve_relative_to(base);
        }
        for idp in &mut self.identity_providers {
            for source in &mut idp.certificates {
                source.resolve_relative_to(base);
            }
            if let Some(metadata) = &mut idp.metadata {
                if metadata.is_relative() {
                    *metadata = base.join(&*metadata);
                }
            }
        }
    }

    /// Checks required values and URI well-formedness.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        let sp = &self.service_provider;
        require_absolute_uri("service_provider.entity_id", &sp.entity_id)?;
        require_absolute_uri(
            "service_provider.assertion_consumer_service_url",
            &sp.assertion_consumer_service_url,
        )?;
        for (field, value) in [
            ("service_provider.single_logout_service_url", &sp.single_logout_service_url),
            (
                "service_provider.artifact_resolution_service_url",
                &sp.artifact_resolution_service_url,
            ),
        ] {
            if let Some(value) = value {
                require_absolute_uri(field, value)?;
            }
        }
        if sp.sign_authn_requests && sp.signing_key.is_none() {
            return Err(Error::Config(
                "sign_authn_requests requires service_provider.signing_key".to_string(),
            ));
        }

        for (i, idp) in self.identity_providers.iter().enumerate() {
            require_absolute_uri(&format!("identity_providers[{i}].entity_id"), &idp.entity_id)?;
            for (name, value) in [
                ("sso_url", &idp.sso_url),
                ("slo_url", &idp.slo_url),
                ("artifact_resolution_url", &idp.artifact_resolution_url),
            ] {
                if let Some(value) = value {
                    require_absolute_uri(&format!("identity_providers[{i}].{name}"), value)?;
                }
            }
            if idp.certificates.is_empty() && idp.metadata.is_none() {
                return Err(Error::Config(format!(
                    "identity provider '{}' has no certificates and no metadata",
                    idp.entity_id
                )));
            }
            if self.identity_providers[..i]
                .iter()
                .any(|other| other.entity_id == idp.entity_id)
            {
                return Err(Error::Config(format!(
                    "identity provider '{}' is configured twice",
                    idp.entity_id
                )));
            }
        }

        if self.bindings.artifact_ttl_secs == 0 {
            return Err(Error::Config("bindings.artifact_ttl_secs must be positive".to_string()));
        }
        if self.validation.max_message_bytes == 0 {
            return Err(Error::Config(
                "validation.max_message_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Finds an identity provider by entity ID.
    #[must_use]
    pub fn identity_provider(&self, entity_id: &str) -> Option<&IdentityProviderConfig> {
        self.identity_providers
            .iter()
            .find(|idp| idp.entity_id == entity_id)
    }

    /// Returns the configured clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.validation.clock_skew_secs)
    }

    /// Returns the artifact time-to-live.
    #[must_use]
    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.bindings.artifact_ttl_secs)
    }
}

fn require_absolute_uri(field: &str, value: &str) -> Result<()> {
    // url::Url only parses absolute URIs; entity IDs may also be URNs.
    match url::Url::parse(value) {
        Ok(_) => Ok(()),
        Err(_) => Err(Error::InvalidUri {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}
