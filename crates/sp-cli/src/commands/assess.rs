//! Trust decisions for captured responses.

use std::path::Path;

use base64::Engine;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use sp_protocol_saml::trust::{
    ExchangeContext, Identity, InboundMessage, RejectReason, TrustContext, TrustDecision,
    TrustDecisionAssembler,
};

use super::{load_context, read_input};
use crate::cli::AssessArgs;
use crate::output::{emit, error, field, success, OutputFormat};
use crate::CliError;

/// Outcome of `assess`.
#[derive(Debug, Serialize)]
pub struct AssessReport {
    /// Whether the response was accepted.
    pub accepted: bool,
    /// Authenticated identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    /// Rejection reason code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Issuer, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// The failing check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TrustDecision> for AssessReport {
    fn from(decision: TrustDecision) -> Self {
        match decision {
            TrustDecision::Accepted(identity) => Self {
                accepted: true,
                issuer: Some(identity.issuer.clone()),
                identity: Some(identity),
                reason: None,
                error: None,
            },
            TrustDecision::Rejected(rejection) => Self {
                accepted: false,
                identity: None,
                reason: Some(rejection.reason),
                issuer: rejection.issuer,
                error: Some(rejection.error.to_string()),
            },
        }
    }
}

/// Runs `assess`.
pub fn run_assess(args: AssessArgs, config: Option<&Path>, format: OutputFormat) -> crate::CliResult<()> {
    let context = load_context(config)?;
    let response = read_input(&args.response)?;
    let exchange = exchange(&args)?;
    let report = assess(&context, &response, args.relay_state.as_deref(), &exchange);

    emit(&report, format, print_report)?;
    match (&report.reason, &report.error) {
        (Some(reason), Some(message)) => Err(CliError::Rejected {
            reason: reason.to_string(),
            message: message.clone(),
        }),
        _ => Ok(()),
    }
}

/// Runs the assembler over a base64 `SAMLResponse` or raw XML.
#[must_use]
pub fn assess(
    context: &TrustContext,
    response: &str,
    relay_state: Option<&str>,
    exchange: &ExchangeContext,
) -> AssessReport {
    let encoded = if response.starts_with('<') {
        base64::engine::general_purpose::STANDARD.encode(response)
    } else {
        response.to_string()
    };
    TrustDecisionAssembler::new(context)
        .assess(
            &InboundMessage::Post {
                saml_response: &encoded,
                relay_state,
            },
            exchange,
        )
        .into()
}

fn exchange(args: &AssessArgs) -> crate::CliResult<ExchangeContext> {
    let mut exchange = match &args.at {
        Some(at) => ExchangeContext::at(
            DateTime::parse_from_rfc3339(at)
                .map_err(|e| CliError::InvalidArgument(format!("--at: {e}")))?
                .with_timezone(&Utc),
        ),
        None => ExchangeContext::now(),
    };
    if let Some(request_id) = &args.request_id {
        exchange = exchange.expecting(request_id);
    }
    if let Some(endpoint) = &args.endpoint {
        exchange = exchange.received_at(endpoint);
    }
    Ok(exchange)
}

fn print_report(report: &AssessReport) {
    let Some(identity) = &report.identity else {
        error(&format!(
            "rejected: {}",
            report.reason.map_or("unknown", |reason| reason.as_str()).red().bold()
        ));
        if let Some(issuer) = &report.issuer {
            field("issuer", issuer);
        }
        if let Some(message) = &report.error {
            field("error", message);
        }
        return;
    };
    success("accepted");
    field("issuer", &identity.issuer);
    field("subject", &identity.subject.value);
    if let Some(format) = &identity.subject.format {
        field("format", format);
    }
    if let Some(pseudonym) = &identity.pseudonym {
        field("local account", pseudonym);
    }
    field("assertion", &identity.assertion_id);
    if let Some(session_index) = &identity.session_index {
        field("session index", session_index);
    }
    if let Some(relay_state) = &identity.relay_state {
        field("relay state", relay_state);
    }
    for (name, values) in &identity.attributes {
        field(name, values.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_a_format_violation() {
        let context = TrustContext::new("https://sp.example.org", "https://sp.example.org/acs");
        let report = assess(&context, "%%%", None, &ExchangeContext::now());
        assert!(!report.accepted);
        assert_eq!(report.reason, Some(RejectReason::FormatViolation));
    }

    #[test]
    fn raw_xml_is_encoded_before_assessment() {
        let context = TrustContext::new("https://sp.example.org", "https://sp.example.org/acs");
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"><saml:Issuer>https://idp.example.org</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:Response>"#;
        let report = assess(&context, xml, None, &ExchangeContext::now());
        assert_eq!(report.reason, Some(RejectReason::UnknownIssuer));
        assert_eq!(report.issuer.as_deref(), Some("https://idp.example.org"));
    }

    #[test]
    fn rejects_bad_instant() {
        let args = AssessArgs {
            response: String::new(),
            relay_state: None,
            request_id: None,
            endpoint: None,
            at: Some("yesterday".to_string()),
        };
        assert!(matches!(exchange(&args), Err(CliError::InvalidArgument(_))));
    }
}
