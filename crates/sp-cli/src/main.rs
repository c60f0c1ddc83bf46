//! # saml-sp
//!
//! Diagnostic command line for a SAML service provider.

#![forbid(unsafe_code)]

use clap::Parser;
use sp_cli::{
    cli::{Cli, Command},
    commands::{run_artifact, run_assess, run_decode, run_metadata, run_verify},
    output::error,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Command::Decode(args) => run_decode(args, cli.output),
        Command::Artifact(args) => run_artifact(args, config, cli.output),
        Command::Verify(args) => run_verify(args, cli.output),
        Command::Metadata(args) => run_metadata(args, cli.output),
        Command::Assess(args) => run_assess(args, config, cli.output),
    };

    if let Err(e) = result {
        error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}
