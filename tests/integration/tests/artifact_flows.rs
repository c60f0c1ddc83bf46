//! HTTP-Artifact binding integration tests.
//!
//! The identity provider side is played by [`HttpArtifactBuilder`] and
//! [`ArtifactResolutionResponder`] sharing an in-memory store.

use std::sync::Arc;

use sp_cache::{ArtifactStore, InMemoryArtifactStore};
use sp_crypto::Certificate;
use sp_protocol_saml::artifact::Artifact;
use sp_protocol_saml::bindings::{ArtifactResolutionResponder, HttpArtifactBuilder};
use sp_protocol_saml::signature::XmlSignatureValidator;
use sp_protocol_saml::trust::{InboundMessage, RejectReason, TrustDecisionAssembler};
use sp_protocol_saml::SamlError;

use crate::common::{
    assertion, exchange, fixture_text, idp_signer, signed_response, sp_signer, TestEnv, ACS, IDP,
    IDP_ARTIFACT_URL,
};

fn responder(store: Arc<dyn ArtifactStore>) -> anyhow::Result<ArtifactResolutionResponder> {
    let sp_certificate = Certificate::from_pem(&fixture_text("sp-cert.pem")?)?;
    Ok(ArtifactResolutionResponder::new(IDP, store)
        .with_signer(idp_signer()?)
        .with_validator(XmlSignatureValidator::from_certificates([&sp_certificate])))
}

/// Tests the complete exchange: artifact redirect, signed resolution and
/// assessment of the resolved response.
#[test]
fn test_artifact_resolution_flow() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let mut builder = HttpArtifactBuilder::new(IDP, 0);
    builder.set_relay_state("/inbox");
    let url = builder.to_url(store.as_ref(), &signed_response(&idp_signer()?, assertion())?, ACS)?;
    let (_, query) = url
        .split_once('?')
        .ok_or_else(|| anyhow::anyhow!("artifact URL without query: {url}"))?;

    let assembler = TrustDecisionAssembler::new(&env.context);
    let sp_signer = sp_signer()?;
    let resolution = assembler.resolve_artifact(query, Some(&sp_signer))?;
    assert_eq!(resolution.identity_provider.entity_id, IDP);
    assert_eq!(resolution.endpoint, IDP_ARTIFACT_URL);
    assert_eq!(resolution.relay_state.as_deref(), Some("/inbox"));

    let responder = responder(Arc::clone(&store))?;
    let answer = responder.respond(&resolution.envelope)?;
    let decision = assembler.assess(
        &InboundMessage::Soap {
            envelope: &answer,
            relay_state: resolution.relay_state.as_deref(),
        },
        &exchange().resolving(&resolution.request_id),
    );
    let identity = decision.into_result()?;
    assert_eq!(identity.subject.value, "8f3a1c");
    assert_eq!(identity.relay_state.as_deref(), Some("/inbox"));

    let again = responder.respond(&resolution.envelope)?;
    let decision = assembler.assess(
        &InboundMessage::Soap {
            envelope: &again,
            relay_state: None,
        },
        &exchange().resolving(&resolution.request_id),
    );
    assert_eq!(
        decision.reason(),
        Some(RejectReason::FormatViolation),
        "an artifact resolves only once"
    );

    Ok(())
}

/// Tests that the responder refuses an unsigned resolve when it expects a
/// signature.
#[test]
fn test_unsigned_resolve_is_refused() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let artifact = HttpArtifactBuilder::new(IDP, 0).issue(store.as_ref(), "<Message/>")?;
    let query = format!("SAMLart={}", urlencoding::encode(&artifact));

    let resolution = TrustDecisionAssembler::new(&env.context).resolve_artifact(&query, None)?;
    let result = responder(store)?.respond(&resolution.envelope);
    assert!(result.is_err(), "unsigned ArtifactResolve should be refused");

    Ok(())
}

/// Tests that artifacts minted by unknown entities are not resolved.
#[test]
fn test_artifact_from_unknown_source() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let artifact = Artifact::mint("https://unknown.example.org", 0).encode();
    let query = format!("SAMLart={}&RelayState=x", urlencoding::encode(&artifact));

    let result = TrustDecisionAssembler::new(&env.context).resolve_artifact(&query, None);
    assert!(matches!(result, Err(SamlError::UnknownArtifactSource)), "got {result:?}");

    Ok(())
}
