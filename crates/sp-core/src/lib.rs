//! # sp-core
//!
//! Configuration and shared primitives for the SAML service provider.
//!
//! This crate provides:
//! - Configuration model for the service provider and its trusted identity
//!   providers, loaded from TOML
//! - [`SnapshotHandle`], an atomically swappable configuration snapshot
//! - The core error type

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod snapshot;

pub use config::{
    BindingConfig, CertificateSpecificationConfig, IdentityProviderConfig, PemSource, SamlConfig,
    ServiceProviderConfig, ValidationConfig,
};
pub use error::{Error, Result};
pub use snapshot::SnapshotHandle;
