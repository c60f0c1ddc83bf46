//! Identity provider metadata integration tests.
//!
//! `idp-metadata.xml` is a signed `EntityDescriptor` produced by an
//! independent XML-DSig implementation with the IdP key.

use sp_crypto::Certificate;
use sp_protocol_saml::signature::XmlSignatureValidator;
use sp_protocol_saml::types::{EntityDescriptor, KeyUse, SamlBinding};
use sp_protocol_saml::xml::Document;
use sp_protocol_saml::{ErrorKind, SamlError};

use crate::common::{config_text, fixture_text, TestEnv, IDP};

fn idp_validator() -> anyhow::Result<XmlSignatureValidator> {
    let certificate = Certificate::from_pem(&fixture_text("idp-cert.pem")?)?;
    Ok(XmlSignatureValidator::from_certificates([&certificate]))
}

/// Tests that the metadata fixture parses and its signature verifies.
#[test]
fn test_signed_metadata_verifies() -> anyhow::Result<()> {
    let document = Document::parse(&fixture_text("idp-metadata.xml")?)?;
    assert!(idp_validator()?.check_signature(&document)?, "metadata signature should verify");

    let entities = EntityDescriptor::parse_all(document.root())?;
    assert_eq!(entities.len(), 1);
    let entity = &entities[0];
    assert_eq!(entity.entity_id, IDP);
    assert!(entity.signed);
    assert_eq!(entity.keys(KeyUse::Signing).count(), 1);
    assert_eq!(entity.keys(KeyUse::Encryption).count(), 1);

    let idp = entity
        .idp
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no IDPSSODescriptor"))?;
    assert_eq!(idp.single_sign_on_services.len(), 2);
    let artifact_service = idp
        .artifact_resolution_services
        .first()
        .ok_or_else(|| anyhow::anyhow!("no ArtifactResolutionService"))?;
    assert_eq!(artifact_service.endpoint.parsed_binding(), Some(SamlBinding::Soap));
    assert!(artifact_service.is_default);

    Ok(())
}

/// Tests that editing signed metadata breaks its signature.
#[test]
fn test_tampered_metadata_fails() -> anyhow::Result<()> {
    let tampered = fixture_text("idp-metadata.xml")?
        .replace("https://idp.example.org/saml/slo", "https://evil.example.org/saml/slo");
    let document = Document::parse(&tampered)?;

    let verified = idp_validator()?.check_signature(&document);
    assert!(!matches!(verified, Ok(true)), "tampered metadata verified");

    Ok(())
}

/// Tests that a provider configured with metadata takes its endpoints from
/// it.
#[test]
fn test_metadata_configures_endpoints() -> anyhow::Result<()> {
    let env = TestEnv::with_idp_settings(
        r#"
metadata = "idp-metadata.xml"
certificates = [{ file = "idp-cert.pem" }]
"#,
    )?;
    let provider = env
        .context
        .identity_provider(IDP)
        .ok_or_else(|| anyhow::anyhow!("{IDP} not configured"))?;

    assert_eq!(provider.sso_url.as_deref(), Some("https://idp.example.org/saml/sso"));
    assert_eq!(provider.slo_url.as_deref(), Some("https://idp.example.org/saml/slo"));
    assert_eq!(
        provider.artifact_resolution_url.as_deref(),
        Some("https://idp.example.org/saml/artifact")
    );
    assert_eq!(provider.certificates().len(), 1, "metadata repeats the configured key");

    Ok(())
}

/// Tests that tampered metadata is refused when the configuration is loaded.
#[test]
fn test_tampered_metadata_is_refused_at_load() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let tampered = fixture_text("idp-metadata.xml")?
        .replace("https://idp.example.org/saml/sso", "https://evil.example.org/saml/sso");
    std::fs::write(env.dir.path().join("tampered-metadata.xml"), tampered)?;

    let result = env.reload(&config_text(
        r#"
metadata = "tampered-metadata.xml"
certificates = [{ file = "idp-cert.pem" }]
"#,
    ));
    let error = match result {
        Ok(_) => anyhow::bail!("tampered metadata was accepted"),
        Err(error) => error,
    };
    assert_eq!(
        error.downcast_ref::<SamlError>().map(SamlError::kind),
        Some(ErrorKind::Signature),
        "unexpected error: {error}"
    );

    Ok(())
}

/// Tests that signed metadata must verify with a certificate that passes the
/// provider's specifications.
#[test]
fn test_metadata_requires_trusted_certificate() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let expired_only = r#"
metadata = "idp-metadata.xml"
certificates = [{ file = "idp-expired-cert.pem" }]
"#;
    env.reload(&config_text(expired_only))?;

    let result = env.reload(&config_text(&format!(
        "{expired_only}certificate_specifications = [{{ kind = \"validity-period\" }}]\n"
    )));
    let error = match result {
        Ok(_) => anyhow::bail!("metadata verified with an excluded certificate"),
        Err(error) => error,
    };
    assert!(
        matches!(error.downcast_ref::<SamlError>(), Some(SamlError::UntrustedCertificate(_))),
        "unexpected error: {error}"
    );

    Ok(())
}
