//! Read-only trust configuration shared by every exchange.

use std::fmt;

use chrono::Duration;
use sp_core::SamlConfig;
use sp_crypto::PrivateKey;
use tracing::info;

use crate::artifact::{match_source, Artifact};
use crate::bindings::DEFAULT_MAX_MESSAGE_BYTES;
use crate::error::{SamlError, SamlResult};

use super::IdentityProvider;

const DEFAULT_CLOCK_SKEW_SECS: i64 = 180;

/// Service-provider identity, identity providers and validation tuning.
///
/// Built once and never mutated; reloads build a new context and swap it
/// behind an [`sp_core::SnapshotHandle`].
#[derive(Clone)]
pub struct TrustContext {
    entity_id: String,
    assertion_consumer_service_url: String,
    single_logout_service_url: Option<String>,
    identity_providers: Vec<IdentityProvider>,
    decryption_key: Option<PrivateKey>,
    clock_skew: Duration,
    allow_sha1: bool,
    replay_detection: bool,
    max_message_bytes: usize,
}

impl fmt::Debug for TrustContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustContext")
            .field("entity_id", &self.entity_id)
            .field("assertion_consumer_service_url", &self.assertion_consumer_service_url)
            .field("identity_providers", &self.identity_providers.len())
            .field("decryption_key", &self.decryption_key.is_some())
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl TrustContext {
    /// Creates a context for the service provider `entity_id` receiving
    /// responses at `assertion_consumer_service_url`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, assertion_consumer_service_url: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            assertion_consumer_service_url: assertion_consumer_service_url.into(),
            single_logout_service_url: None,
            identity_providers: Vec::new(),
            decryption_key: None,
            clock_skew: Duration::seconds(DEFAULT_CLOCK_SKEW_SECS),
            allow_sha1: false,
            replay_detection: true,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Adds a trusted identity provider.
    #[must_use]
    pub fn with_identity_provider(mut self, provider: IdentityProvider) -> Self {
        self.identity_providers.push(provider);
        self
    }

    /// Sets the key used for encrypted assertions and identifiers.
    #[must_use]
    pub fn with_decryption_key(mut self, key: PrivateKey) -> Self {
        self.decryption_key = Some(key);
        self
    }

    /// Sets the single logout endpoint.
    #[must_use]
    pub fn with_single_logout_service_url(mut self, url: impl Into<String>) -> Self {
        self.single_logout_service_url = Some(url.into());
        self
    }

    /// Sets the tolerated clock difference.
    #[must_use]
    pub const fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Accepts SHA-1 signatures and digests.
    #[must_use]
    pub const fn with_sha1_allowed(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Enables or disables the replay check.
    #[must_use]
    pub const fn with_replay_detection(mut self, enabled: bool) -> Self {
        self.replay_detection = enabled;
        self
    }

    /// Builds the context from configuration, loading every key,
    /// certificate and metadata file it names.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingConfiguration`] for unreadable material
    /// and crypto errors for undecodable keys.
    pub fn from_config(config: &SamlConfig) -> SamlResult<Self> {
        let sp = &config.service_provider;
        let clock_skew = Duration::from_std(config.clock_skew())
            .map_err(|_| SamlError::MissingConfiguration("clock skew out of range".to_string()))?;

        let decryption_key = match sp.decryption_key.as_ref().or(sp.signing_key.as_ref()) {
            Some(source) => {
                let pem = source
                    .load()
                    .map_err(|e| SamlError::MissingConfiguration(e.to_string()))?;
                Some(PrivateKey::from_pem(&pem)?)
            }
            None => None,
        };

        let identity_providers = config
            .identity_providers
            .iter()
            .map(IdentityProvider::from_config)
            .collect::<SamlResult<Vec<_>>>()?;

        info!(
            entity_id = %sp.entity_id,
            identity_providers = identity_providers.len(),
            decryption = decryption_key.is_some(),
            "trust context built"
        );

        Ok(Self {
            entity_id: sp.entity_id.clone(),
            assertion_consumer_service_url: sp.assertion_consumer_service_url.clone(),
            single_logout_service_url: sp.single_logout_service_url.clone(),
            identity_providers,
            decryption_key,
            clock_skew,
            allow_sha1: config.validation.allow_sha1,
            replay_detection: config.validation.replay_detection,
            max_message_bytes: config.validation.max_message_bytes,
        })
    }

    /// Returns the service provider's entity ID, the expected audience.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the assertion consumer service URL.
    #[must_use]
    pub fn assertion_consumer_service_url(&self) -> &str {
        &self.assertion_consumer_service_url
    }

    /// Returns the single logout endpoint.
    #[must_use]
    pub fn single_logout_service_url(&self) -> Option<&str> {
        self.single_logout_service_url.as_deref()
    }

    /// Returns every trusted identity provider.
    #[must_use]
    pub fn identity_providers(&self) -> &[IdentityProvider] {
        &self.identity_providers
    }

    /// Finds an identity provider by entity ID.
    #[must_use]
    pub fn identity_provider(&self, entity_id: &str) -> Option<&IdentityProvider> {
        self.identity_providers
            .iter()
            .find(|provider| provider.entity_id == entity_id)
    }

    /// Finds the identity provider that minted `artifact`.
    #[must_use]
    pub fn identity_provider_for_artifact(&self, artifact: &Artifact) -> Option<&IdentityProvider> {
        match_source(artifact, &self.identity_providers, |provider| provider.entity_id.as_str())
    }

    /// Returns the decryption key.
    #[must_use]
    pub fn decryption_key(&self) -> Option<&PrivateKey> {
        self.decryption_key.as_ref()
    }

    /// Returns the tolerated clock difference.
    #[must_use]
    pub const fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Returns true if SHA-1 signatures are accepted.
    #[must_use]
    pub const fn sha1_allowed(&self) -> bool {
        self.allow_sha1
    }

    /// Returns true if assertion IDs are checked against a replay cache.
    #[must_use]
    pub const fn replay_detection(&self) -> bool {
        self.replay_detection
    }

    /// Returns the upper bound on decoded message size.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::IDP_CERT;

    #[test]
    fn built_from_configuration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("idp.pem"), IDP_CERT).unwrap();
        let config_path = dir.path().join("sp.toml");
        std::fs::write(
            &config_path,
            r#"
[service_provider]
entity_id = "https://sp.example.org"
assertion_consumer_service_url = "https://sp.example.org/acs"

[validation]
clock_skew_secs = 30

[[identity_providers]]
entity_id = "https://idp.example.org"
certificates = [{ file = "idp.pem" }]
certificate_specifications = [{ kind = "validity-period" }]
"#,
        )
        .unwrap();

        let config = SamlConfig::load(&config_path).unwrap();
        let context = TrustContext::from_config(&config).unwrap();
        assert_eq!(context.entity_id(), "https://sp.example.org");
        assert_eq!(context.clock_skew(), Duration::seconds(30));
        assert!(context.decryption_key().is_none());

        let provider = context.identity_provider("https://idp.example.org").unwrap();
        assert_eq!(provider.certificates().len(), 1);
        assert_eq!(provider.specifications().len(), 1);
        assert!(context.identity_provider("https://unknown.example.org").is_none());

        let artifact = Artifact::mint("https://idp.example.org", 0);
        assert_eq!(
            context
                .identity_provider_for_artifact(&artifact)
                .map(|provider| provider.entity_id.as_str()),
            Some("https://idp.example.org")
        );
    }

    #[test]
    fn missing_certificate_file_is_reported() {
        let config = SamlConfig::from_toml_str(
            r#"
[service_provider]
entity_id = "https://sp.example.org"
assertion_consumer_service_url = "https://sp.example.org/acs"

[[identity_providers]]
entity_id = "https://idp.example.org"
certificates = [{ file = "/nonexistent/idp.pem" }]
"#,
        )
        .unwrap();
        assert!(matches!(
            TrustContext::from_config(&config),
            Err(SamlError::MissingConfiguration(_))
        ));
    }
}
