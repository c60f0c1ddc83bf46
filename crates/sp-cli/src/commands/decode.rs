//! Binding payload decoding.

use serde::Serialize;
use sp_protocol_saml::bindings::{PostParser, RedirectParser};
use sp_protocol_saml::types::MessageKind;
use sp_protocol_saml::xml::Document;

use super::read_input;
use crate::cli::DecodeArgs;
use crate::output::{emit, field, OutputFormat};

/// A decoded binding payload.
#[derive(Debug, Serialize)]
pub struct Decoded {
    /// Binding the payload travelled over.
    pub binding: &'static str,
    /// Protocol message name, if recognised.
    pub message: Option<String>,
    /// Relay state.
    pub relay_state: Option<String>,
    /// Whether the query carries a detached signature.
    pub signed: bool,
    /// `SigAlg` of a signed query.
    pub sig_alg: Option<String>,
    /// Decoded XML.
    pub xml: String,
}

/// Runs `decode`.
pub fn run_decode(args: DecodeArgs, format: OutputFormat) -> crate::CliResult<()> {
    let input = read_input(&args.input)?;
    let decoded = decode(&input)?;
    emit(&decoded, format, |decoded| {
        field("binding", decoded.binding);
        field("message", decoded.message.as_deref().unwrap_or("unknown"));
        if let Some(relay_state) = &decoded.relay_state {
            field("relay state", relay_state);
        }
        if let Some(sig_alg) = &decoded.sig_alg {
            field("signature algorithm", sig_alg);
        }
        println!();
        println!("{}", decoded.xml);
    })
}

/// Decodes a Redirect URL or query string, or a base64 POST value.
pub fn decode(input: &str) -> crate::CliResult<Decoded> {
    if input.contains("SAMLRequest=") || input.contains("SAMLResponse=") {
        let parser = if input.contains("://") {
            RedirectParser::parse_url(input)?
        } else {
            RedirectParser::parse_query(input.trim_start_matches('?'))?
        };
        return Ok(Decoded {
            binding: "HTTP-Redirect",
            message: message_name(&parser.document()?),
            relay_state: parser.relay_state().map(str::to_string),
            signed: parser.is_signed(),
            sig_alg: parser.sig_alg().map(str::to_string),
            xml: parser.xml().to_string(),
        });
    }
    let parser = PostParser::from_form(None, Some(input), None)?;
    Ok(Decoded {
        binding: "HTTP-POST",
        message: message_name(&parser.document()?),
        relay_state: None,
        signed: false,
        sig_alg: None,
        xml: parser.xml().to_string(),
    })
}

fn message_name(document: &Document) -> Option<String> {
    MessageKind::of(document.root()).map(|kind| kind.to_string())
}
