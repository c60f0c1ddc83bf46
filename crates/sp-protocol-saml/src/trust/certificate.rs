//! Certificate specifications.
//!
//! Every trust certificate of an identity provider must satisfy all of the
//! provider's enforced specifications before it may verify a signature.
//! Advisory specifications are evaluated the same way but a failure is only
//! logged. The set of checks is closed; configuration selects them by
//! `kind`.

use chrono::{DateTime, Utc};
use sp_core::CertificateSpecificationConfig;
use sp_crypto::Certificate;

/// A check applied to a trust certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSpecification {
    /// The certificate must be inside its validity period.
    ValidityPeriod,
    /// The certificate's SHA-256 fingerprint must equal this lowercase hex
    /// value.
    Fingerprint(String),
}

impl CertificateSpecification {
    /// Creates a fingerprint specification. Colons, whitespace and case in
    /// `sha256` are ignored.
    #[must_use]
    pub fn fingerprint(sha256: &str) -> Self {
        Self::Fingerprint(normalize_fingerprint(sha256))
    }

    /// Returns the configuration name of this specification.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ValidityPeriod => "validity-period",
            Self::Fingerprint(_) => "fingerprint",
        }
    }

    /// Returns true if `certificate` passes this check at `now`.
    #[must_use]
    pub fn is_satisfied_by(&self, certificate: &Certificate, now: DateTime<Utc>) -> bool {
        match self {
            Self::ValidityPeriod => certificate.is_valid_at(now.timestamp()),
            Self::Fingerprint(expected) => certificate.fingerprint_sha256() == *expected,
        }
    }
}

impl From<&CertificateSpecificationConfig> for CertificateSpecification {
    fn from(config: &CertificateSpecificationConfig) -> Self {
        match config {
            CertificateSpecificationConfig::ValidityPeriod { .. } => Self::ValidityPeriod,
            CertificateSpecificationConfig::Fingerprint { sha256, .. } => Self::fingerprint(sha256),
        }
    }
}

fn normalize_fingerprint(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{IDP_CERT, IDP_EXPIRED_CERT};

    #[test]
    fn validity_period_rejects_expired_certificates() {
        let now = Utc::now();
        let current = Certificate::from_pem(IDP_CERT).unwrap();
        let expired = Certificate::from_pem(IDP_EXPIRED_CERT).unwrap();
        assert!(CertificateSpecification::ValidityPeriod.is_satisfied_by(&current, now));
        assert!(!CertificateSpecification::ValidityPeriod.is_satisfied_by(&expired, now));
    }

    #[test]
    fn fingerprint_ignores_formatting() {
        let certificate = Certificate::from_pem(IDP_CERT).unwrap();
        let hex = certificate.fingerprint_sha256();
        let formatted = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).to_uppercase())
            .collect::<Vec<_>>()
            .join(":");

        let spec = CertificateSpecification::fingerprint(&formatted);
        assert_eq!(spec, CertificateSpecification::Fingerprint(hex));
        assert!(spec.is_satisfied_by(&certificate, Utc::now()));

        let other = Certificate::from_pem(IDP_EXPIRED_CERT).unwrap();
        assert!(!spec.is_satisfied_by(&other, Utc::now()));
    }

    #[test]
    fn built_from_configuration() {
        let config = CertificateSpecificationConfig::Fingerprint {
            sha256: "AB:CD".to_string(),
            advisory: false,
        };
        let spec = CertificateSpecification::from(&config);
        assert_eq!(spec, CertificateSpecification::Fingerprint("abcd".to_string()));
        assert_eq!(spec.name(), "fingerprint");
        assert_eq!(
            CertificateSpecification::from(&CertificateSpecificationConfig::ValidityPeriod {
                advisory: true
            })
            .name(),
            "validity-period"
        );
    }
}
