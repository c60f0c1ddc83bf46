//! Configuration loading and reload integration tests.

use chrono::Utc;
use sp_core::{SamlConfig, SnapshotHandle};
use sp_protocol_saml::trust::{InboundMessage, RejectReason, TrustContext, TrustDecisionAssembler};
use sp_protocol_saml::SamlError;

use crate::common::{
    assertion_from, config_text, exchange, post_value, rogue_signer, signed_response, TestEnv,
    DEFAULT_IDP_SETTINGS, OTHER_IDP,
};

/// Tests that a reload adding an identity provider takes effect for new
/// readers while earlier snapshots keep their trust anchors.
#[test]
fn test_reload_adds_identity_provider() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let handle = SnapshotHandle::new(env.reload(&config_text(DEFAULT_IDP_SETTINGS))?);
    let before = handle.load();

    let value = post_value(&signed_response(&rogue_signer()?, assertion_from(OTHER_IDP, Utc::now()))?);
    let message = InboundMessage::Post {
        saml_response: &value,
        relay_state: None,
    };
    assert_eq!(
        TrustDecisionAssembler::new(&before).assess(&message, &exchange()).reason(),
        Some(RejectReason::UnknownIssuer)
    );

    let extended = format!(
        r#"{}
[[identity_providers]]
entity_id = "{OTHER_IDP}"
certificates = [{{ file = "rogue-cert.pem" }}]
"#,
        config_text(DEFAULT_IDP_SETTINGS)
    );
    handle.replace(env.reload(&extended)?);

    let after = handle.load();
    assert_eq!(after.identity_providers().len(), 2);
    assert!(TrustDecisionAssembler::new(&after)
        .assess(&message, &exchange())
        .is_accepted());
    assert_eq!(
        TrustDecisionAssembler::new(&before).assess(&message, &exchange()).reason(),
        Some(RejectReason::UnknownIssuer),
        "the old snapshot is unchanged"
    );

    Ok(())
}

/// Tests that a relative entity ID is refused at load.
#[test]
fn test_relative_entity_id_is_refused() -> anyhow::Result<()> {
    let text = config_text(DEFAULT_IDP_SETTINGS).replace(
        "entity_id = \"https://sp.example.org/saml\"",
        "entity_id = \"sp.example.org\"",
    );

    let result = SamlConfig::from_toml_str(&text);
    assert!(
        matches!(
            &result,
            Err(sp_core::Error::InvalidUri { field, .. }) if field == "service_provider.entity_id"
        ),
        "got {result:?}"
    );

    Ok(())
}

/// Tests that a missing certificate file surfaces when the trust context is
/// built.
#[test]
fn test_missing_certificate_file() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    std::fs::write(
        &env.config_path,
        config_text(r#"certificates = [{ file = "absent.pem" }]"#),
    )?;

    let config = SamlConfig::load(&env.config_path)?;
    let result = TrustContext::from_config(&config);
    assert!(
        matches!(result, Err(SamlError::MissingConfiguration(_))),
        "got {:?}",
        result.err()
    );

    Ok(())
}
