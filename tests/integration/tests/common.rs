//! Common test utilities and fixtures.

use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sp_core::SamlConfig;
use sp_protocol_saml::signature::XmlSigner;
use sp_protocol_saml::trust::{ExchangeContext, TrustContext};
use sp_protocol_saml::types::{
    Assertion, Attribute, AttributeStatement, AuthnStatement, Conditions, NameId, Response,
    Statement, Subject, SubjectConfirmation, SubjectConfirmationData,
};
use tempfile::TempDir;

/// Identity provider entity ID used by the fixtures.
pub const IDP: &str = "https://idp.example.org";
/// A second identity provider, signing with the rogue key.
pub const OTHER_IDP: &str = "https://other-idp.example.org";
/// Service provider entity ID.
pub const SP: &str = "https://sp.example.org/saml";
/// Assertion consumer service URL.
pub const ACS: &str = "https://sp.example.org/saml/acs";
/// Single logout service URL.
pub const SLO: &str = "https://sp.example.org/saml/slo";
/// Artifact resolution endpoint of the identity provider.
pub const IDP_ARTIFACT_URL: &str = "https://idp.example.org/saml/artifact";
/// ID of the AuthnRequest the responses answer.
pub const REQUEST_ID: &str = "_authn-request-1";

/// IdP settings used when a test does not override them.
pub const DEFAULT_IDP_SETTINGS: &str = r#"
artifact_resolution_url = "https://idp.example.org/saml/artifact"
certificates = [{ file = "idp-cert.pem" }]
"#;

const FIXTURES: [&str; 7] = [
    "idp-cert.pem",
    "idp-expired-cert.pem",
    "idp-metadata.xml",
    "rogue-cert.pem",
    "sp-cert.pem",
    "sp-key.pem",
    "idp-key.pem",
];

/// Path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../fixtures").join(name)
}

/// Contents of a file under `tests/fixtures`.
pub fn fixture_text(name: &str) -> anyhow::Result<String> {
    Ok(std::fs::read_to_string(fixture(name))?)
}

/// A configuration directory with the fixtures copied in and a loaded
/// trust context.
pub struct TestEnv {
    /// Temporary directory holding `saml.toml` and the fixtures.
    pub dir: TempDir,
    /// Path of the configuration file.
    pub config_path: PathBuf,
    /// Trust context built from the configuration.
    pub context: TrustContext,
}

impl TestEnv {
    /// Creates an environment trusting [`IDP`] through its certificate.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_idp_settings(DEFAULT_IDP_SETTINGS)
    }

    /// Creates an environment whose `[[identity_providers]]` entry for
    /// [`IDP`] carries `settings`.
    pub fn with_idp_settings(settings: &str) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sp_protocol_saml=debug,sp_core=debug")
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir()?;
        for name in FIXTURES {
            std::fs::copy(fixture(name), dir.path().join(name))?;
        }
        let config_path = dir.path().join("saml.toml");
        std::fs::write(&config_path, config_text(settings))?;
        let context = TrustContext::from_config(&SamlConfig::load(&config_path)?)?;
        Ok(Self {
            dir,
            config_path,
            context,
        })
    }

    /// Rewrites the configuration with `text` and loads a fresh context.
    pub fn reload(&self, text: &str) -> anyhow::Result<TrustContext> {
        std::fs::write(&self.config_path, text)?;
        Ok(TrustContext::from_config(&SamlConfig::load(&self.config_path)?)?)
    }
}

/// The configuration file written by [`TestEnv`].
pub fn config_text(idp_settings: &str) -> String {
    format!(
        r#"
[service_provider]
entity_id = "{SP}"
assertion_consumer_service_url = "{ACS}"
single_logout_service_url = "{SLO}"
signing_key = {{ file = "sp-key.pem" }}
signing_certificate = {{ file = "sp-cert.pem" }}

[validation]
clock_skew_secs = 60

[[identity_providers]]
entity_id = "{IDP}"
{idp_settings}
"#
    )
}

/// Signer holding the identity provider's key.
pub fn idp_signer() -> anyhow::Result<XmlSigner> {
    Ok(XmlSigner::from_pem(
        &fixture_text("idp-key.pem")?,
        Some(&fixture_text("idp-cert.pem")?),
    )?)
}

/// Signer holding the rogue key, trusted only for [`OTHER_IDP`].
pub fn rogue_signer() -> anyhow::Result<XmlSigner> {
    Ok(XmlSigner::from_pem(
        &fixture_text("rogue-key.pem")?,
        Some(&fixture_text("rogue-cert.pem")?),
    )?)
}

/// Signer holding the service provider's key.
pub fn sp_signer() -> anyhow::Result<XmlSigner> {
    Ok(XmlSigner::from_pem(
        &fixture_text("sp-key.pem")?,
        Some(&fixture_text("sp-cert.pem")?),
    )?)
}

/// A bearer assertion from `issuer` for `alice`, valid around `now`.
pub fn assertion_from(issuer: &str, now: DateTime<Utc>) -> Assertion {
    let confirmation = SubjectConfirmationData {
        not_on_or_after: Some(now + Duration::minutes(5)),
        recipient: Some(ACS.to_string()),
        in_response_to: Some(REQUEST_ID.to_string()),
        ..SubjectConfirmationData::default()
    };
    Assertion::new(issuer)
        .with_subject(
            Subject::new(NameId::persistent("8f3a1c")).with_confirmation(SubjectConfirmation::bearer(confirmation)),
        )
        .with_conditions(
            Conditions::new(now - Duration::minutes(1), now + Duration::minutes(5)).with_audience(SP),
        )
        .with_statement(Statement::Authn(AuthnStatement::new(now).with_session_index("_session-1")))
        .with_statement(Statement::Attribute(
            AttributeStatement::new()
                .with_attribute(Attribute::new("mail", ["alice@example.org"]))
                .with_attribute(Attribute::new("groups", ["staff", "admins"])),
        ))
}

/// A bearer assertion from [`IDP`].
pub fn assertion() -> Assertion {
    assertion_from(IDP, Utc::now())
}

/// A successful response from the assertion's issuer, answering
/// [`REQUEST_ID`] at [`ACS`].
pub fn response(assertion: Assertion) -> Response {
    Response::success(assertion.issuer.value.clone())
        .in_response_to(REQUEST_ID)
        .with_destination(ACS)
        .with_assertion(assertion)
}

/// Signs the assertion and then the response.
pub fn signed_response(signer: &XmlSigner, assertion: Assertion) -> anyhow::Result<String> {
    let assertion_id = assertion.id.clone();
    let response = response(assertion);
    let xml = signer.sign_xml(&response.to_xml(), &assertion_id)?;
    Ok(signer.sign_xml(&xml, &response.header.id)?)
}

/// Base64 form value of `xml`.
pub fn post_value(xml: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(xml)
}

/// An exchange answering [`REQUEST_ID`].
pub fn exchange() -> ExchangeContext {
    ExchangeContext::now().expecting(REQUEST_ID)
}
