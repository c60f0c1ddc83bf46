//! Key and certificate loading.
//!
//! Private keys are accepted as PKCS#8 or PKCS#1, PEM or DER. RSA keys sign
//! and transport content keys; DSA keys only sign, for identity providers
//! still publishing `dsa-sha1`. Certificates are parsed once with
//! `x509-parser`; the fields needed later (subject, validity, public key) are
//! copied out so a [`Certificate`] owns its data and can be shared across
//! threads in a configuration snapshot.

use std::fmt;

use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use crate::error::{CryptoError, CryptoResult};

/// Public-key algorithm family of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// RSA.
    Rsa,
    /// DSA.
    Dsa,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rsa => "RSA",
            Self::Dsa => "DSA",
        })
    }
}

/// Big-endian public key components, as carried by `ds:KeyValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    /// `ds:RSAKeyValue`.
    Rsa {
        /// Modulus.
        modulus: Vec<u8>,
        /// Public exponent.
        exponent: Vec<u8>,
    },
    /// `ds:DSAKeyValue`.
    Dsa {
        /// Prime modulus.
        p: Vec<u8>,
        /// Subgroup order.
        q: Vec<u8>,
        /// Generator.
        g: Vec<u8>,
        /// Public value.
        y: Vec<u8>,
    },
}

#[derive(Clone)]
pub(crate) enum PrivateMaterial {
    Rsa(RsaPrivateKey),
    Dsa(dsa::SigningKey),
}

/// Private key used for signing and, for RSA, key-transport decryption.
#[derive(Clone)]
pub struct PrivateKey {
    inner: PrivateMaterial,
}

impl PrivateKey {
    /// Loads a PEM-encoded key (`PRIVATE KEY` or `RSA PRIVATE KEY`).
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM block is neither an RSA nor a DSA key.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let inner = match RsaPrivateKey::from_pkcs8_pem(pem).or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem)) {
            Ok(rsa) => PrivateMaterial::Rsa(rsa),
            Err(rsa_error) => dsa::SigningKey::from_pkcs8_pem(pem)
                .map(PrivateMaterial::Dsa)
                .map_err(|_| CryptoError::InvalidKey(format!("not an RSA or DSA private key: {rsa_error}")))?,
        };
        Ok(Self { inner })
    }

    /// Loads a DER-encoded key (PKCS#8 or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are neither an RSA nor a DSA key.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let inner = match RsaPrivateKey::from_pkcs8_der(der).or_else(|_| RsaPrivateKey::from_pkcs1_der(der)) {
            Ok(rsa) => PrivateMaterial::Rsa(rsa),
            Err(rsa_error) => dsa::SigningKey::from_pkcs8_der(der)
                .map(PrivateMaterial::Dsa)
                .map_err(|_| CryptoError::InvalidKey(format!("not an RSA or DSA private key: {rsa_error}")))?,
        };
        Ok(Self { inner })
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let inner = match &self.inner {
            PrivateMaterial::Rsa(rsa) => PublicMaterial::Rsa(rsa.to_public_key()),
            PrivateMaterial::Dsa(signing) => PublicMaterial::Dsa(signing.verifying_key().clone()),
        };
        PublicKey { inner }
    }

    /// Returns the key family.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self.inner {
            PrivateMaterial::Rsa(_) => KeyType::Rsa,
            PrivateMaterial::Dsa(_) => KeyType::Dsa,
        }
    }

    /// Returns the modulus size in bits (the size of `p` for DSA).
    #[must_use]
    pub fn size_bits(&self) -> usize {
        match &self.inner {
            PrivateMaterial::Rsa(rsa) => rsa.size() * 8,
            PrivateMaterial::Dsa(signing) => signing.verifying_key().components().p().bits(),
        }
    }

    pub(crate) fn material(&self) -> &PrivateMaterial {
        &self.inner
    }

    pub(crate) fn rsa(&self) -> CryptoResult<&RsaPrivateKey> {
        match &self.inner {
            PrivateMaterial::Rsa(rsa) => Ok(rsa),
            PrivateMaterial::Dsa(_) => Err(CryptoError::InvalidKey(
                "key transport requires an RSA key".to_string(),
            )),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("type", &self.key_type())
            .field("bits", &self.size_bits())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub(crate) enum PublicMaterial {
    Rsa(RsaPublicKey),
    Dsa(dsa::VerifyingKey),
}

/// Public key used for signature verification and, for RSA, key transport.
#[derive(Clone)]
pub struct PublicKey {
    inner: PublicMaterial,
}

impl PublicKey {
    /// Builds a key from big-endian modulus and exponent bytes, as carried by
    /// `ds:RSAKeyValue`.
    ///
    /// # Errors
    ///
    /// Returns an error if the components do not form a valid RSA key.
    pub fn from_components(modulus: &[u8], exponent: &[u8]) -> CryptoResult<Self> {
        RsaPublicKey::new(
            BigUint::from_bytes_be(modulus),
            BigUint::from_bytes_be(exponent),
        )
        .map(|rsa| Self {
            inner: PublicMaterial::Rsa(rsa),
        })
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Builds a key from the big-endian `P`, `Q`, `G` and `Y` of a
    /// `ds:DSAKeyValue`.
    ///
    /// # Errors
    ///
    /// Returns an error if the values do not form a valid DSA key.
    pub fn from_dsa_components(p: &[u8], q: &[u8], g: &[u8], y: &[u8]) -> CryptoResult<Self> {
        let invalid = |e: dsa::signature::Error| CryptoError::InvalidKey(format!("DSA key: {e}"));
        let components = dsa::Components::from_components(
            dsa::BigUint::from_bytes_be(p),
            dsa::BigUint::from_bytes_be(q),
            dsa::BigUint::from_bytes_be(g),
        )
        .map_err(invalid)?;
        let verifying = dsa::VerifyingKey::from_components(components, dsa::BigUint::from_bytes_be(y))
            .map_err(invalid)?;
        Ok(Self {
            inner: PublicMaterial::Dsa(verifying),
        })
    }

    /// Loads a DER-encoded SubjectPublicKeyInfo.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure is neither an RSA nor a DSA key.
    pub fn from_spki_der(der: &[u8]) -> CryptoResult<Self> {
        let inner = match RsaPublicKey::from_public_key_der(der) {
            Ok(rsa) => PublicMaterial::Rsa(rsa),
            Err(rsa_error) => dsa::VerifyingKey::from_public_key_der(der)
                .map(PublicMaterial::Dsa)
                .map_err(|_| CryptoError::InvalidKey(format!("not an RSA or DSA public key: {rsa_error}")))?,
        };
        Ok(Self { inner })
    }

    /// Returns the key components for a `ds:KeyValue`.
    #[must_use]
    pub fn key_value(&self) -> KeyValue {
        match &self.inner {
            PublicMaterial::Rsa(rsa) => KeyValue::Rsa {
                modulus: rsa.n().to_bytes_be(),
                exponent: rsa.e().to_bytes_be(),
            },
            PublicMaterial::Dsa(verifying) => {
                let components = verifying.components();
                KeyValue::Dsa {
                    p: components.p().to_bytes_be(),
                    q: components.q().to_bytes_be(),
                    g: components.g().to_bytes_be(),
                    y: verifying.y().to_bytes_be(),
                }
            }
        }
    }

    /// Returns the key family.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self.inner {
            PublicMaterial::Rsa(_) => KeyType::Rsa,
            PublicMaterial::Dsa(_) => KeyType::Dsa,
        }
    }

    /// Returns the modulus size in bits (the size of `p` for DSA).
    #[must_use]
    pub fn size_bits(&self) -> usize {
        match &self.inner {
            PublicMaterial::Rsa(rsa) => rsa.size() * 8,
            PublicMaterial::Dsa(verifying) => verifying.components().p().bits(),
        }
    }

    pub(crate) fn material(&self) -> &PublicMaterial {
        &self.inner
    }

    pub(crate) fn rsa(&self) -> CryptoResult<&RsaPublicKey> {
        match &self.inner {
            PublicMaterial::Rsa(rsa) => Ok(rsa),
            PublicMaterial::Dsa(_) => Err(CryptoError::InvalidKey(
                "key transport requires an RSA key".to_string(),
            )),
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_value() == other.key_value()
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("type", &self.key_type())
            .field("bits", &self.size_bits())
            .finish_non_exhaustive()
    }
}

/// Parsed X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial: String,
    not_before: i64,
    not_after: i64,
    public_key: PublicKey,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a certificate with an RSA or DSA key.
    pub fn from_der(der: Vec<u8>) -> CryptoResult<Self> {
        let (subject, issuer, serial, not_before, not_after, spki) = {
            let (_, cert) = x509_parser::parse_x509_certificate(&der)
                .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
            let validity = cert.validity();
            (
                cert.subject().to_string(),
                cert.issuer().to_string(),
                cert.raw_serial_as_string(),
                validity.not_before.timestamp(),
                validity.not_after.timestamp(),
                cert.public_key().raw.to_vec(),
            )
        };
        let public_key = PublicKey::from_spki_der(&spki)?;

        Ok(Self {
            der,
            subject,
            issuer,
            serial,
            not_before,
            not_after,
            public_key,
        })
    }

    /// Parses the first `CERTIFICATE` block of a PEM string.
    ///
    /// # Errors
    ///
    /// Returns an error if no certificate block is present or it does not parse.
    pub fn from_pem(pem_text: &str) -> CryptoResult<Self> {
        let block = pem::parse_many(pem_text)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?
            .into_iter()
            .find(|p| p.tag() == "CERTIFICATE")
            .ok_or_else(|| CryptoError::InvalidCertificate("no CERTIFICATE block".to_string()))?;
        Self::from_der(block.into_contents())
    }

    /// Parses base64 DER as found in `ds:X509Certificate`, ignoring whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid base64 or an unparsable certificate.
    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| CryptoError::InvalidCertificate(format!("base64: {e}")))?;
        Self::from_der(der)
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the DER encoding as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Returns the subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the issuer distinguished name.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the serial number as colon-separated hex.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Returns the public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns true if `unix_time` lies inside the validity period.
    #[must_use]
    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }

    /// Returns the validity period as unix timestamps.
    #[must_use]
    pub fn validity(&self) -> (i64, i64) {
        (self.not_before, self.not_after)
    }

    /// Returns the lowercase hex SHA-256 fingerprint of the DER encoding.
    #[must_use]
    pub fn fingerprint_sha256(&self) -> String {
        hex::encode(crate::hash::sha256(&self.der))
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}
