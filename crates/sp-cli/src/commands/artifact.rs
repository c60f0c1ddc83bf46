//! Artifact inspection.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use sp_protocol_saml::artifact::{try_parse_artifact, Artifact};
use sp_protocol_saml::bindings::parse_artifact_query;
use sp_protocol_saml::trust::TrustContext;

use super::load_context;
use crate::cli::ArtifactArgs;
use crate::output::{emit, field, warning, OutputFormat};
use crate::CliError;

/// Decoded artifact fields.
#[derive(Debug, Serialize)]
pub struct ArtifactReport {
    /// Type code, as `0x0004`.
    pub type_code: String,
    /// Endpoint index.
    pub endpoint_index: u16,
    /// Hex SHA-1 of the issuer entity ID.
    pub source_id: String,
    /// Hex message handle.
    pub message_handle: String,
    /// Relay state, when parsed from a query string.
    pub relay_state: Option<String>,
    /// Configured IdP whose entity ID hashes to the source ID.
    pub identity_provider: Option<String>,
    /// That IdP's artifact resolution endpoint.
    pub resolution_endpoint: Option<String>,
}

impl ArtifactReport {
    /// Describes `artifact`, matched against `context` when given.
    #[must_use]
    pub fn new(artifact: &Artifact, relay_state: Option<String>, context: Option<&TrustContext>) -> Self {
        let provider = context.and_then(|context| context.identity_provider_for_artifact(artifact));
        Self {
            type_code: format!("0x{:04x}", artifact.type_code),
            endpoint_index: artifact.endpoint_index,
            source_id: hex::encode(artifact.source_id),
            message_handle: hex::encode(artifact.message_handle),
            relay_state,
            identity_provider: provider.map(|provider| provider.entity_id.clone()),
            resolution_endpoint: provider.and_then(|provider| provider.artifact_resolution_url.clone()),
        }
    }
}

/// Runs `artifact`.
pub fn run_artifact(args: ArtifactArgs, config: Option<&Path>, format: OutputFormat) -> crate::CliResult<()> {
    let (artifact, relay_state) = if args.artifact.contains("SAMLart=") {
        let query = args
            .artifact
            .split_once('?')
            .map_or(args.artifact.as_str(), |(_, query)| query);
        let (artifact, _, relay_state) = parse_artifact_query(query.trim())?;
        (artifact, relay_state)
    } else {
        let artifact = try_parse_artifact(args.artifact.trim()).ok_or_else(|| {
            CliError::InvalidArgument("not a 44-byte base64 artifact".to_string())
        })?;
        (artifact, None)
    };
    let context = config.map(|path| load_context(Some(path))).transpose()?;
    let report = ArtifactReport::new(&artifact, relay_state, context.as_ref());

    emit(&report, format, |report| {
        field("type code", &report.type_code);
        field("endpoint index", report.endpoint_index);
        field("source id", &report.source_id);
        field("message handle", &report.message_handle);
        if let Some(relay_state) = &report.relay_state {
            field("relay state", relay_state);
        }
        match (&report.identity_provider, context.is_some()) {
            (Some(provider), _) => {
                field("identity provider", provider.green());
                if let Some(endpoint) = &report.resolution_endpoint {
                    field("resolve at", endpoint);
                }
            }
            (None, true) => warning("no configured identity provider minted this artifact"),
            (None, false) => {}
        }
    })
}
