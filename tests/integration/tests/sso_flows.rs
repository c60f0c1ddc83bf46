//! Web browser SSO integration tests.
//!
//! Responses arrive over HTTP-POST or HTTP-Redirect and are evaluated against
//! a configuration loaded from disk.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sp_cache::InMemoryReplayCache;
use sp_crypto::{Certificate, PrivateKey};
use sp_protocol_saml::bindings::HttpRedirectBuilder;
use sp_protocol_saml::encryption::AssertionEncryptor;
use sp_protocol_saml::trust::{InboundMessage, RejectReason, TrustDecisionAssembler};
use sp_protocol_saml::types::{Conditions, Response};

use crate::common::{
    assertion, assertion_from, exchange, fixture_text, idp_signer, post_value, response,
    signed_response, TestEnv, ACS, IDP, REQUEST_ID, SP,
};

/// Tests that a signed POST response yields the asserted identity.
#[test]
fn test_signed_post_response_is_accepted() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let value = post_value(&signed_response(&idp_signer()?, assertion())?);

    let decision = TrustDecisionAssembler::new(&env.context).assess(
        &InboundMessage::Post {
            saml_response: &value,
            relay_state: Some("/reports"),
        },
        &exchange(),
    );

    let identity = decision.into_result()?;
    assert_eq!(identity.issuer, IDP);
    assert_eq!(identity.subject.value, "8f3a1c");
    assert!(identity.subject.is_persistent(), "NameID should be persistent");
    assert_eq!(identity.first_attribute("mail"), Some("alice@example.org"));
    assert_eq!(
        identity.attribute("groups").map(<[String]>::len),
        Some(2),
        "both group values should be kept"
    );
    assert_eq!(identity.session_index.as_deref(), Some("_session-1"));
    assert_eq!(identity.relay_state.as_deref(), Some("/reports"));

    Ok(())
}

/// Tests that the same assertion is accepted only once.
#[test]
fn test_replayed_response_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let assembler =
        TrustDecisionAssembler::new(&env.context).with_replay_cache(Arc::new(InMemoryReplayCache::new()));
    let value = post_value(&signed_response(&idp_signer()?, assertion())?);
    let message = InboundMessage::Post {
        saml_response: &value,
        relay_state: None,
    };

    assert!(assembler.assess(&message, &exchange()).is_accepted());
    assert_eq!(
        assembler.assess(&message, &exchange()).reason(),
        Some(RejectReason::Replayed),
        "second delivery should be a replay"
    );

    Ok(())
}

/// Tests a Redirect response whose only signature is the detached query
/// signature.
#[test]
fn test_redirect_response_with_query_signature() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let mut builder = HttpRedirectBuilder::new();
    builder
        .set_response(response(assertion()).to_xml())?
        .set_relay_state("/inbox")
        .set_signer(idp_signer()?);
    let url = builder.to_url(ACS)?;
    let query = url.split_once('?').map(|(_, query)| query).unwrap_or_default();

    let decision =
        TrustDecisionAssembler::new(&env.context).assess(&InboundMessage::Redirect { query }, &exchange());

    let identity = decision.into_result()?;
    assert_eq!(identity.relay_state.as_deref(), Some("/inbox"));

    let tampered = query.replace("inbox", "admin");
    assert_ne!(tampered, query);
    let decision = TrustDecisionAssembler::new(&env.context)
        .assess(&InboundMessage::Redirect { query: &tampered }, &exchange());
    assert_eq!(decision.reason(), Some(RejectReason::BadSignature));

    Ok(())
}

/// Tests that encrypted assertions are opened with the configured SP key.
#[test]
fn test_encrypted_assertion_is_decrypted() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let signer = idp_signer()?;
    let inner = assertion();
    let signed_assertion = signer.sign_xml(&inner.to_xml(), &inner.id)?;
    let sp_certificate = Certificate::from_pem(&fixture_text("sp-cert.pem")?)?;
    let encrypted = AssertionEncryptor::new(sp_certificate.public_key()).encrypt(&signed_assertion)?;
    let response = Response::success(IDP)
        .in_response_to(REQUEST_ID)
        .with_destination(ACS)
        .with_encrypted_assertion(encrypted);
    let xml = signer.sign_xml(&response.to_xml(), &response.header.id)?;
    let value = post_value(&xml);

    let decision = TrustDecisionAssembler::new(&env.context).assess(
        &InboundMessage::Post {
            saml_response: &value,
            relay_state: None,
        },
        &exchange(),
    );
    assert_eq!(decision.into_result()?.subject.value, "8f3a1c");

    Ok(())
}

/// Tests that an assertion encrypted for another key is a decryption
/// failure.
#[test]
fn test_assertion_for_another_key_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let signer = idp_signer()?;
    let other = PrivateKey::from_pem(&fixture_text("rogue-key.pem")?)?.public_key();
    let encrypted = AssertionEncryptor::new(&other).encrypt(&assertion().to_xml())?;
    let response = Response::success(IDP)
        .in_response_to(REQUEST_ID)
        .with_destination(ACS)
        .with_encrypted_assertion(encrypted);
    let xml = signer.sign_xml(&response.to_xml(), &response.header.id)?;
    let value = post_value(&xml);

    let decision = TrustDecisionAssembler::new(&env.context).assess(
        &InboundMessage::Post {
            saml_response: &value,
            relay_state: None,
        },
        &exchange(),
    );
    assert_eq!(decision.reason(), Some(RejectReason::DecryptionFailed));

    Ok(())
}

/// Tests that a validity-period specification excludes an expired trust
/// certificate, even though the signing key matches.
#[test]
fn test_expired_certificate_is_not_trusted() -> anyhow::Result<()> {
    let lenient = TestEnv::with_idp_settings(r#"certificates = [{ file = "idp-expired-cert.pem" }]"#)?;
    let strict = TestEnv::with_idp_settings(
        r#"
certificates = [{ file = "idp-expired-cert.pem" }]
certificate_specifications = [{ kind = "validity-period" }]
"#,
    )?;
    let value = post_value(&signed_response(&idp_signer()?, assertion())?);
    let message = InboundMessage::Post {
        saml_response: &value,
        relay_state: None,
    };

    assert!(
        TrustDecisionAssembler::new(&lenient.context)
            .assess(&message, &exchange())
            .is_accepted(),
        "without specifications the certificate is used as configured"
    );
    assert_eq!(
        TrustDecisionAssembler::new(&strict.context)
            .assess(&message, &exchange())
            .reason(),
        Some(RejectReason::UnknownIssuer)
    );

    Ok(())
}

/// Tests that an advisory validity-period specification keeps an expired
/// trust certificate usable.
#[test]
fn test_advisory_specification_keeps_expired_certificate() -> anyhow::Result<()> {
    let env = TestEnv::with_idp_settings(
        r#"
certificates = [{ file = "idp-expired-cert.pem" }]
certificate_specifications = [{ kind = "validity-period", advisory = true }]
"#,
    )?;
    let value = post_value(&signed_response(&idp_signer()?, assertion())?);
    let decision = TrustDecisionAssembler::new(&env.context).assess(
        &InboundMessage::Post {
            saml_response: &value,
            relay_state: None,
        },
        &exchange(),
    );
    assert!(decision.is_accepted(), "advisory failures only log: {:?}", decision.reason());

    Ok(())
}

/// Tests fingerprint pinning of trust certificates.
#[test]
fn test_fingerprint_specification() -> anyhow::Result<()> {
    let fingerprint = Certificate::from_pem(&fixture_text("idp-cert.pem")?)?.fingerprint_sha256();
    let pinned = TestEnv::with_idp_settings(&format!(
        r#"
certificates = [{{ file = "idp-cert.pem" }}]
certificate_specifications = [{{ kind = "fingerprint", sha256 = "{}" }}]
"#,
        fingerprint.to_uppercase()
    ))?;
    let mispinned = TestEnv::with_idp_settings(&format!(
        r#"
certificates = [{{ file = "idp-cert.pem" }}]
certificate_specifications = [{{ kind = "fingerprint", sha256 = "{}" }}]
"#,
        "00".repeat(32)
    ))?;
    let value = post_value(&signed_response(&idp_signer()?, assertion())?);
    let message = InboundMessage::Post {
        saml_response: &value,
        relay_state: None,
    };

    assert!(TrustDecisionAssembler::new(&pinned.context)
        .assess(&message, &exchange())
        .is_accepted());
    assert_eq!(
        TrustDecisionAssembler::new(&mispinned.context)
            .assess(&message, &exchange())
            .reason(),
        Some(RejectReason::UnknownIssuer)
    );

    Ok(())
}

/// Tests that a response meant for another service provider is refused.
#[test]
fn test_response_for_another_audience_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let now = Utc::now();
    let mut other = assertion_from(IDP, now);
    other.conditions = Some(
        Conditions::new(now - Duration::minutes(1), now + Duration::minutes(5))
            .with_audience("https://elsewhere.example.org/saml"),
    );
    let value = post_value(&signed_response(&idp_signer()?, other)?);

    let decision = TrustDecisionAssembler::new(&env.context).assess(
        &InboundMessage::Post {
            saml_response: &value,
            relay_state: None,
        },
        &exchange(),
    );
    assert_eq!(decision.reason(), Some(RejectReason::AudienceMismatch));

    Ok(())
}

/// Tests that the configured clock skew tolerates an IdP clock running
/// slightly ahead, and no more.
#[test]
fn test_configured_clock_skew() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    assert_eq!(env.context.clock_skew(), Duration::seconds(60));
    let signer = idp_signer()?;
    let now = Utc::now();

    let ahead = |seconds: i64| {
        let mut assertion = assertion_from(IDP, now);
        assertion.conditions = Some(
            Conditions::new(now + Duration::seconds(seconds), now + Duration::minutes(5)).with_audience(SP),
        );
        assertion
    };

    let within = post_value(&signed_response(&signer, ahead(30))?);
    let beyond = post_value(&signed_response(&signer, ahead(120))?);
    let assembler = TrustDecisionAssembler::new(&env.context);
    let assess = |value: &str| {
        assembler.assess(
            &InboundMessage::Post {
                saml_response: value,
                relay_state: None,
            },
            &exchange(),
        )
    };

    assert!(assess(&within).is_accepted(), "30s ahead is inside the skew");
    assert_eq!(assess(&beyond).reason(), Some(RejectReason::NotYetValid));

    Ok(())
}
