//! # sp-cli
//!
//! Diagnostic tools for a SAML service provider deployment.
//!
//! This crate provides command-line utilities for:
//! - Decoding Redirect and POST binding payloads to XML
//! - Inspecting artifacts and matching them against configured IdPs
//! - Verifying enveloped XML signatures
//! - Summarizing metadata documents
//! - Running the trust decision assembler against a captured response

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use error::{CliError, CliResult};
