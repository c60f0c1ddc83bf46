//! # sp-crypto
//!
//! Cryptographic primitives used by the SAML service provider.
//!
//! XML Signature and XML Encryption interoperate with identity providers that
//! still sign with RSA-SHA1 and transport keys with RSA-OAEP (MGF1/SHA-1), so
//! this crate covers the algorithm identifiers those standards name rather than
//! a reduced modern subset. Weak algorithms are available but must be enabled
//! explicitly by the caller.
//!
//! ## Modules
//!
//! - [`algorithm`] - hash and signature algorithm identifiers
//! - [`hash`] - message digests
//! - [`signature`] - RSA PKCS#1 v1.5 and DSA signing and verification
//! - [`keys`] - PEM/DER private keys, public keys and X.509 certificates
//! - [`cipher`] - AES content encryption and RSA key transport
//! - [`random`] - CSPRNG helpers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod cipher;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signature;

pub use algorithm::{HashAlgorithm, SignatureAlgorithm};
pub use error::{CryptoError, CryptoResult};
pub use hash::{digest, sha1, sha256, sha384, sha512};
pub use keys::{Certificate, KeyType, KeyValue, PrivateKey, PublicKey};
pub use signature::{sign, verify};
