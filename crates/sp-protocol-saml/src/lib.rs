//! SAML 2.0 Service Provider protocol engine.
//!
//! This crate turns inbound SAML messages into trust decisions and builds the
//! outbound messages a service provider sends:
//!
//! - **Bindings** - HTTP-Redirect, HTTP-POST, SOAP and HTTP-Artifact
//!   extraction and construction
//! - **XML signature** - enveloped XML-DSig signing and verification with
//!   signature-wrapping hardening, plus detached Redirect signatures
//! - **Validation** - the SAML normative rules for subjects, confirmations,
//!   conditions, attributes and encrypted elements
//! - **Decryption** - `EncryptedAssertion`, `EncryptedID` and
//!   `EncryptedAttribute` unwrapping with the SP private key
//! - **Trust decisions** - issuer resolution, signature, decryption,
//!   validation, time window, audience, replay and identity extraction
//!
//! # Architecture
//!
//! - [`xml`] - namespace-aware DOM and canonicalization
//! - [`types`] - SAML protocol, assertion and metadata types
//! - [`signature`] - XML signature signing and validation
//! - [`bindings`] - Redirect, POST, SOAP and Artifact bindings
//! - [`artifact`] - the 44-byte artifact codec
//! - [`validation`] - the validator chain
//! - [`encryption`] - XML Encryption decryptor
//! - [`trust`] - trust anchors and the trust decision assembler
//! - [`error`] - error types for SAML operations
//!
//! # Example
//!
//! ```rust,ignore
//! use sp_protocol_saml::trust::{ExchangeContext, InboundMessage, TrustContext, TrustDecisionAssembler};
//!
//! let context = TrustContext::from_config(&config)?;
//! let assembler = TrustDecisionAssembler::new(&context);
//! let decision = assembler.assess(
//!     &InboundMessage::Post { saml_response: form_value, relay_state: None },
//!     &ExchangeContext::now().expecting(request_id),
//! );
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Profiles](https://docs.oasis-open.org/security/saml/v2.0/saml-profiles-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [XML Encryption](https://www.w3.org/TR/xmlenc-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifact;
pub mod bindings;
pub mod encryption;
pub mod error;
pub mod signature;
pub mod trust;
pub mod types;
pub mod validation;
pub mod xml;

pub use error::{ErrorKind, SamlError, SamlResult};
