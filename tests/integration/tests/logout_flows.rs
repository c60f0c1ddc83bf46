//! Single logout integration tests.

use chrono::{Duration, Utc};
use sp_crypto::Certificate;
use sp_protocol_saml::bindings::{HttpPostBuilder, HttpRedirectBuilder, RedirectParser};
use sp_protocol_saml::signature::XmlSignatureValidator;
use sp_protocol_saml::trust::{ExchangeContext, InboundMessage, LogoutMessage, TrustDecisionAssembler};
use sp_protocol_saml::types::{LogoutRequest, LogoutResponse, NameId, Status};
use sp_protocol_saml::SamlError;

use crate::common::{fixture_text, idp_signer, sp_signer, TestEnv, IDP, SLO, SP};

fn signed_redirect(request: &LogoutRequest) -> anyhow::Result<String> {
    let mut builder = HttpRedirectBuilder::new();
    builder
        .set_request(request.to_xml())?
        .set_relay_state("logout-42")
        .set_signer(idp_signer()?);
    Ok(builder.to_query()?)
}

/// Tests an IdP-initiated logout: the request is verified and the signed
/// answer verifies with the SP certificate.
#[test]
fn test_idp_initiated_logout_round_trip() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = LogoutRequest::new(IDP, NameId::persistent("8f3a1c"))
        .with_destination(SLO)
        .with_session_index("_session-1");
    let query = signed_redirect(&request)?;

    let verified = TrustDecisionAssembler::new(&env.context)
        .verify_logout(&InboundMessage::Redirect { query: &query }, &ExchangeContext::now())?;
    let LogoutMessage::Request {
        request_id,
        name_id,
        session_indexes,
        relay_state,
        ..
    } = verified
    else {
        anyhow::bail!("expected a LogoutRequest, got {verified:?}");
    };
    assert_eq!(name_id.value, "8f3a1c");
    assert_eq!(session_indexes, ["_session-1"]);
    assert_eq!(relay_state.as_deref(), Some("logout-42"));

    let answer = LogoutResponse::new(SP, &request_id, Status::success());
    let mut builder = HttpRedirectBuilder::new();
    builder.set_response(answer.to_xml())?.set_signer(sp_signer()?);
    let reply = builder.to_query()?;

    let parser = RedirectParser::parse_query(&reply)?;
    let sp_certificate = Certificate::from_pem(&fixture_text("sp-cert.pem")?)?;
    let validator = XmlSignatureValidator::from_certificates([&sp_certificate]);
    assert!(parser.check_signature(&validator)?, "SP reply should verify");
    assert!(parser.xml().contains(&request_id));

    Ok(())
}

/// Tests that unsigned logout requests are refused.
#[test]
fn test_unsigned_logout_request_is_refused() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = LogoutRequest::new(IDP, NameId::persistent("8f3a1c")).with_destination(SLO);
    let mut builder = HttpRedirectBuilder::new();
    builder.set_request(request.to_xml())?;
    let query = builder.to_query()?;

    let result = TrustDecisionAssembler::new(&env.context)
        .verify_logout(&InboundMessage::Redirect { query: &query }, &ExchangeContext::now());
    assert!(matches!(result, Err(SamlError::SignatureMissing)), "got {result:?}");

    Ok(())
}

/// Tests that an expired logout request is refused.
#[test]
fn test_expired_logout_request_is_refused() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = LogoutRequest::new(IDP, NameId::persistent("8f3a1c"))
        .with_destination(SLO)
        .expires_at(Utc::now() - Duration::minutes(10));
    let query = signed_redirect(&request)?;

    let result = TrustDecisionAssembler::new(&env.context)
        .verify_logout(&InboundMessage::Redirect { query: &query }, &ExchangeContext::now());
    assert!(matches!(result, Err(SamlError::Expired { .. })), "got {result:?}");

    Ok(())
}

/// Tests a POSTed logout response answering an SP-initiated logout.
#[test]
fn test_posted_logout_response() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let ours = LogoutRequest::new(SP, NameId::persistent("8f3a1c"));
    let answer = LogoutResponse::new(IDP, &ours.header.id, Status::success()).with_destination(SLO);
    let signed = idp_signer()?.sign_xml(&answer.to_xml(), &answer.header.id)?;
    let mut builder = HttpPostBuilder::new();
    builder.set_response(signed)?;
    let (_, value) = builder.encoded_value()?;

    let assembler = TrustDecisionAssembler::new(&env.context);
    let message = InboundMessage::Post {
        saml_response: &value,
        relay_state: None,
    };
    let verified = assembler.verify_logout(&message, &ExchangeContext::now().expecting(&ours.header.id))?;
    assert!(matches!(
        verified,
        LogoutMessage::Response { ref issuer, .. } if issuer == IDP
    ));

    let stale = assembler.verify_logout(&message, &ExchangeContext::now().expecting("_another-request"));
    assert!(matches!(stale, Err(SamlError::InResponseToMismatch { .. })));

    Ok(())
}
