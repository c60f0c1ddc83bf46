//! Algorithm identifiers.
//!
//! XML-DSig names algorithms by URI; these enums are the typed counterpart and
//! carry the URI mapping in both directions.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::keys::KeyType;

/// Message digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1. Accepted for interoperability only.
    #[serde(rename = "SHA1")]
    Sha1,

    /// SHA-256.
    #[serde(rename = "SHA256")]
    Sha256,

    /// SHA-384.
    #[serde(rename = "SHA384")]
    Sha384,

    /// SHA-512.
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the XML-DSig `DigestMethod` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a `DigestMethod` URI.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown URIs.
    pub fn from_uri(uri: &str) -> Result<Self, CryptoError> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#sha1" => Ok(Self::Sha1),
            "http://www.w3.org/2001/04/xmlenc#sha256" => Ok(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Ok(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Ok(Self::Sha512),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Returns true for SHA-1.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        matches!(self, Self::Sha1)
    }
}

/// Signature algorithms used by XML-DSig and the Redirect binding: RSA
/// PKCS#1 v1.5 plus the legacy DSA-SHA1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-1.
    #[serde(rename = "RS1")]
    RsaSha1,

    /// RSA with SHA-256.
    #[default]
    #[serde(rename = "RS256")]
    RsaSha256,

    /// RSA with SHA-384.
    #[serde(rename = "RS384")]
    RsaSha384,

    /// RSA with SHA-512.
    #[serde(rename = "RS512")]
    RsaSha512,

    /// DSA with SHA-1.
    #[serde(rename = "DS1")]
    DsaSha1,
}

impl SignatureAlgorithm {
    /// Returns the `SignatureMethod` / `SigAlg` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
            Self::DsaSha1 => "http://www.w3.org/2000/09/xmldsig#dsa-sha1",
        }
    }

    /// Parses a `SignatureMethod` / `SigAlg` URI.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown URIs, including ECDSA methods.
    pub fn from_uri(uri: &str) -> Result<Self, CryptoError> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#rsa-sha1" => Ok(Self::RsaSha1),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Ok(Self::RsaSha256),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => Ok(Self::RsaSha384),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => Ok(Self::RsaSha512),
            "http://www.w3.org/2000/09/xmldsig#dsa-sha1" => Ok(Self::DsaSha1),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Returns the digest the signature is computed over.
    #[must_use]
    pub const fn hash(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 | Self::DsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 => HashAlgorithm::Sha256,
            Self::RsaSha384 => HashAlgorithm::Sha384,
            Self::RsaSha512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns the key family the algorithm signs with.
    #[must_use]
    pub const fn key_type(self) -> KeyType {
        match self {
            Self::DsaSha1 => KeyType::Dsa,
            _ => KeyType::Rsa,
        }
    }

    /// Returns the default algorithm for keys of `key_type`.
    #[must_use]
    pub const fn default_for(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Rsa => Self::RsaSha256,
            KeyType::Dsa => Self::DsaSha1,
        }
    }

    /// Returns true if the algorithm relies on SHA-1.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        self.hash().is_deprecated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_uri_roundtrip() {
        for alg in [
            SignatureAlgorithm::RsaSha1,
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha384,
            SignatureAlgorithm::RsaSha512,
            SignatureAlgorithm::DsaSha1,
        ] {
            assert_eq!(SignatureAlgorithm::from_uri(alg.uri()).unwrap(), alg);
        }
    }

    #[test]
    fn ecdsa_is_rejected() {
        assert!(SignatureAlgorithm::from_uri("http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256").is_err());
    }

    #[test]
    fn dsa_signs_with_sha1() {
        let alg = SignatureAlgorithm::DsaSha1;
        assert_eq!(alg.key_type(), KeyType::Dsa);
        assert!(alg.is_deprecated());
        assert_eq!(SignatureAlgorithm::default_for(KeyType::Dsa), alg);
        assert_eq!(SignatureAlgorithm::default_for(KeyType::Rsa), SignatureAlgorithm::default());
    }

    #[test]
    fn sha1_is_deprecated() {
        assert!(SignatureAlgorithm::RsaSha1.is_deprecated());
        assert!(!SignatureAlgorithm::default().is_deprecated());
        assert_eq!(HashAlgorithm::Sha1.output_len(), 20);
    }
}
