//! End-to-end tests for the SAML service provider.
//!
//! Each test loads a TOML configuration from a temporary directory, builds
//! IdP-side messages with the workspace signer and runs them through the
//! trust decision assembler.

mod artifact_flows;
mod common;
mod configuration;
mod logout_flows;
mod metadata;
mod sso_flows;
