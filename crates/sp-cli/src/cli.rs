//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

/// saml-sp - diagnostics for a SAML 2.0 service provider.
#[derive(Debug, Parser)]
#[command(name = "saml-sp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Service provider configuration file.
    #[arg(short, long, global = true, env = "SAML_SP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a Redirect URL, query string or POST value to XML.
    Decode(DecodeArgs),

    /// Parse a SAMLart value and match it against configured IdPs.
    Artifact(ArtifactArgs),

    /// Verify the enveloped signature of an XML document.
    Verify(VerifyArgs),

    /// Summarize a metadata document.
    Metadata(MetadataArgs),

    /// Run the trust decision assembler on a SAMLResponse.
    Assess(AssessArgs),
}

/// Arguments of `decode`.
#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Redirect URL or query string, or a base64 POST value. `@file` reads
    /// the value from a file, `-` from stdin.
    pub input: String,
}

/// Arguments of `artifact`.
#[derive(Debug, Args)]
pub struct ArtifactArgs {
    /// Base64 artifact, or a query string carrying `SAMLart`.
    pub artifact: String,
}

/// Arguments of `verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Signed XML document.
    pub file: PathBuf,

    /// PEM certificate of the expected signer.
    #[arg(long)]
    pub cert: PathBuf,

    /// Accept SHA-1 signature and digest algorithms.
    #[arg(long)]
    pub allow_sha1: bool,
}

/// Arguments of `metadata`.
#[derive(Debug, Args)]
pub struct MetadataArgs {
    /// Metadata document (`EntityDescriptor` or `EntitiesDescriptor`).
    pub file: PathBuf,

    /// Verify the metadata signature with this PEM certificate.
    #[arg(long)]
    pub cert: Option<PathBuf>,
}

/// Arguments of `assess`.
#[derive(Debug, Args)]
pub struct AssessArgs {
    /// Base64 `SAMLResponse` or raw XML. `@file` reads the value from a
    /// file, `-` from stdin.
    pub response: String,

    /// Relay state that accompanied the response.
    #[arg(long)]
    pub relay_state: Option<String>,

    /// ID of the AuthnRequest the response must answer.
    #[arg(long)]
    pub request_id: Option<String>,

    /// URL the response was received at. Defaults to the configured ACS URL.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Evaluate at this RFC 3339 instant instead of now.
    #[arg(long)]
    pub at: Option<String>,
}
