//! Identity providers and their trust anchors.

use std::path::Path;

use chrono::{DateTime, Utc};
use sp_core::IdentityProviderConfig;
use sp_crypto::Certificate;
use tracing::{debug, warn};

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSignatureValidator;
use crate::types::{EntityDescriptor, KeyUse, RoleDescriptor, SamlBinding, XMLDSIG_NS};
use crate::xml::Document;

use super::CertificateSpecification;

/// A trusted identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    /// Entity ID, matched against `Issuer`.
    pub entity_id: String,
    /// Single sign-on endpoint.
    pub sso_url: Option<String>,
    /// Single logout endpoint.
    pub slo_url: Option<String>,
    /// Artifact resolution endpoint.
    pub artifact_resolution_url: Option<String>,
    /// Whether every assertion must carry its own signature.
    pub want_assertions_signed: bool,
    certificates: Vec<Certificate>,
    specifications: Vec<CertificateSpecification>,
    advisory_specifications: Vec<CertificateSpecification>,
}

impl IdentityProvider {
    /// Creates a provider with no trust material.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            sso_url: None,
            slo_url: None,
            artifact_resolution_url: None,
            want_assertions_signed: false,
            certificates: Vec::new(),
            specifications: Vec::new(),
            advisory_specifications: Vec::new(),
        }
    }

    /// Adds a trust certificate.
    #[must_use]
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificates.push(certificate);
        self
    }

    /// Adds a certificate specification.
    #[must_use]
    pub fn with_specification(mut self, specification: CertificateSpecification) -> Self {
        self.specifications.push(specification);
        self
    }

    /// Adds a specification whose failure is logged but does not exclude
    /// the certificate.
    #[must_use]
    pub fn with_advisory_specification(mut self, specification: CertificateSpecification) -> Self {
        self.advisory_specifications.push(specification);
        self
    }

    /// Requires every assertion to be signed.
    #[must_use]
    pub const fn want_assertions_signed(mut self, required: bool) -> Self {
        self.want_assertions_signed = required;
        self
    }

    /// Takes signing certificates and unset endpoints from the provider's
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingConfiguration`] if the entity has no
    /// IdP role, and certificate errors for undecodable key descriptors.
    pub fn with_metadata(mut self, entity: &EntityDescriptor) -> SamlResult<Self> {
        let role = entity.idp.as_ref().ok_or_else(|| {
            SamlError::MissingConfiguration(format!(
                "metadata for {} has no IDPSSODescriptor",
                entity.entity_id
            ))
        })?;
        for encoded in role.certificates(KeyUse::Signing) {
            let certificate = Certificate::from_base64(encoded)?;
            if !self.certificates.contains(&certificate) {
                self.certificates.push(certificate);
            }
        }
        if self.sso_url.is_none() {
            self.sso_url = RoleDescriptor::endpoint(&role.single_sign_on_services, SamlBinding::HttpRedirect)
                .map(|endpoint| endpoint.location.clone());
        }
        if self.slo_url.is_none() {
            self.slo_url = RoleDescriptor::endpoint(&role.single_logout_services, SamlBinding::HttpRedirect)
                .map(|endpoint| endpoint.location.clone());
        }
        if self.artifact_resolution_url.is_none() {
            let soap: Vec<_> = role
                .artifact_resolution_services
                .iter()
                .filter(|indexed| indexed.endpoint.parsed_binding() == Some(SamlBinding::Soap))
                .collect();
            self.artifact_resolution_url = soap
                .iter()
                .find(|indexed| indexed.is_default)
                .or_else(|| soap.first())
                .map(|indexed| indexed.endpoint.location.clone());
        }
        Ok(self)
    }

    /// Builds a provider from configuration, reading certificate files and
    /// the metadata document if one is configured.
    ///
    /// When configured certificates exist and the metadata is signed, the
    /// metadata signature must verify with those that pass the enforced
    /// specifications.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingConfiguration`] for unreadable files,
    /// certificate errors, [`SamlError::UntrustedCertificate`] if signed
    /// metadata meets no certificate passing the specifications, and
    /// signature errors for tampered metadata.
    pub fn from_config(config: &IdentityProviderConfig) -> SamlResult<Self> {
        let mut provider = Self::new(&config.entity_id).want_assertions_signed(config.want_assertions_signed);
        provider.sso_url.clone_from(&config.sso_url);
        provider.slo_url.clone_from(&config.slo_url);
        provider
            .artifact_resolution_url
            .clone_from(&config.artifact_resolution_url);

        for source in &config.certificates {
            let pem = source
                .load()
                .map_err(|e| SamlError::MissingConfiguration(e.to_string()))?;
            provider.certificates.push(Certificate::from_pem(&pem)?);
        }
        for config in &config.certificate_specifications {
            let specification = CertificateSpecification::from(config);
            if config.is_advisory() {
                provider.advisory_specifications.push(specification);
            } else {
                provider.specifications.push(specification);
            }
        }

        if let Some(path) = &config.metadata {
            let entity = provider.load_metadata(path)?;
            provider = provider.with_metadata(&entity)?;
        }

        debug!(
            entity_id = %provider.entity_id,
            certificates = provider.certificates.len(),
            specifications = provider.specifications.len(),
            advisory_specifications = provider.advisory_specifications.len(),
            "identity provider loaded"
        );
        Ok(provider)
    }

    fn load_metadata(&self, path: &Path) -> SamlResult<EntityDescriptor> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SamlError::MissingConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        let document = Document::parse(&text)?;
        let entities = EntityDescriptor::parse_all(document.root())?;
        let signed = document.root().child(XMLDSIG_NS, "Signature").is_some()
            || entities.iter().any(|entity| entity.signed);
        if signed && !self.certificates.is_empty() {
            let validator = self.signature_validator(Utc::now(), false)?;
            if !validator.check_signature(&document)? {
                return Err(SamlError::SignatureInvalid(format!(
                    "metadata {} does not verify",
                    path.display()
                )));
            }
        }
        entities
            .into_iter()
            .find(|entity| entity.entity_id == self.entity_id)
            .ok_or_else(|| {
                SamlError::MissingConfiguration(format!(
                    "metadata {} does not describe {}",
                    path.display(),
                    self.entity_id
                ))
            })
    }

    /// Returns every configured trust certificate.
    #[must_use]
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Returns the enforced certificate specifications.
    #[must_use]
    pub fn specifications(&self) -> &[CertificateSpecification] {
        &self.specifications
    }

    /// Returns the advisory certificate specifications.
    #[must_use]
    pub fn advisory_specifications(&self) -> &[CertificateSpecification] {
        &self.advisory_specifications
    }

    /// Returns the certificates that pass every enforced specification at
    /// `now`. Failed advisory specifications are logged at `warn`.
    #[must_use]
    pub fn trusted_certificates(&self, now: DateTime<Utc>) -> Vec<&Certificate> {
        self.certificates
            .iter()
            .filter(|certificate| {
                for spec in &self.advisory_specifications {
                    if !spec.is_satisfied_by(certificate, now) {
                        warn!(
                            entity_id = %self.entity_id,
                            subject = certificate.subject(),
                            specification = spec.name(),
                            "certificate fails advisory specification, still trusted"
                        );
                    }
                }
                let failed = self
                    .specifications
                    .iter()
                    .find(|spec| !spec.is_satisfied_by(certificate, now));
                if let Some(spec) = failed {
                    debug!(
                        entity_id = %self.entity_id,
                        subject = certificate.subject(),
                        specification = spec.name(),
                        "certificate excluded from trust"
                    );
                }
                failed.is_none()
            })
            .collect()
    }

    /// Builds a signature validator over the trusted certificates.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UntrustedCertificate`] if no certificate passes
    /// the specifications.
    pub fn signature_validator(&self, now: DateTime<Utc>, allow_sha1: bool) -> SamlResult<XmlSignatureValidator> {
        let trusted = self.trusted_certificates(now);
        if trusted.is_empty() {
            return Err(SamlError::UntrustedCertificate(self.entity_id.clone()));
        }
        Ok(XmlSignatureValidator::from_certificates(trusted).allow_sha1(allow_sha1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_core::CertificateSpecificationConfig;

    use crate::signature::XmlSigner;
    use crate::test_support::{IDP_CERT, IDP_EXPIRED_CERT, IDP_KEY};

    const IDP: &str = "https://idp.example.org";

    #[test]
    fn specifications_filter_trust_anchors() {
        let provider = IdentityProvider::new(IDP)
            .with_certificate(Certificate::from_pem(IDP_EXPIRED_CERT).unwrap())
            .with_certificate(Certificate::from_pem(IDP_CERT).unwrap())
            .with_specification(CertificateSpecification::ValidityPeriod);

        let trusted = provider.trusted_certificates(Utc::now());
        assert_eq!(trusted.len(), 1);
        assert_eq!(*trusted[0], Certificate::from_pem(IDP_CERT).unwrap());
    }

    #[test]
    fn no_trusted_certificate_is_an_error() {
        let provider = IdentityProvider::new(IDP)
            .with_certificate(Certificate::from_pem(IDP_EXPIRED_CERT).unwrap())
            .with_specification(CertificateSpecification::ValidityPeriod);
        assert!(matches!(
            provider.signature_validator(Utc::now(), false),
            Err(SamlError::UntrustedCertificate(_))
        ));
    }

    #[test]
    fn metadata_supplies_certificates_and_endpoints() {
        let certificate = Certificate::from_pem(IDP_CERT).unwrap();
        let xml = format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="{IDP}">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    <md:ArtifactResolutionService Binding="urn:oasis:names:tc:SAML:2.0:bindings:SOAP" Location="https://idp.example.org/ars" index="0"/>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.org/slo"/>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.org/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
            certificate.to_base64()
        );
        let document = Document::parse(&xml).unwrap();
        let entity = EntityDescriptor::from_element(document.root()).unwrap();

        let provider = IdentityProvider::new(IDP)
            .with_certificate(certificate.clone())
            .with_metadata(&entity)
            .unwrap();
        assert_eq!(provider.certificates(), &[certificate]);
        assert_eq!(provider.sso_url.as_deref(), Some("https://idp.example.org/sso"));
        assert_eq!(provider.slo_url.as_deref(), Some("https://idp.example.org/slo"));
        assert_eq!(
            provider.artifact_resolution_url.as_deref(),
            Some("https://idp.example.org/ars")
        );
    }

    #[test]
    fn signed_metadata_must_verify() {
        let signer = XmlSigner::from_pem(IDP_KEY, Some(IDP_CERT)).unwrap();
        let xml = format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" ID="_md1" entityID="{IDP}"><md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></md:EntityDescriptor>"#
        );
        let signed = signer.sign_xml(&xml, "_md1").unwrap();
        let tampered = signed.replace(
            "IDPSSODescriptor protocol",
            "IDPSSODescriptor WantAuthnRequestsSigned=\"true\" protocol",
        );

        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.xml");
        let bad = dir.path().join("bad.xml");
        std::fs::write(&good, &signed).unwrap();
        std::fs::write(&bad, &tampered).unwrap();

        let provider =
            IdentityProvider::new(IDP).with_certificate(Certificate::from_pem(IDP_CERT).unwrap());
        assert!(provider.load_metadata(&good).is_ok());
        assert!(matches!(
            provider.load_metadata(&bad),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn advisory_specification_keeps_certificate() {
        let expired = Certificate::from_pem(IDP_EXPIRED_CERT).unwrap();
        let provider = IdentityProvider::new(IDP)
            .with_certificate(expired.clone())
            .with_advisory_specification(CertificateSpecification::ValidityPeriod);

        assert_eq!(provider.trusted_certificates(Utc::now()), [&expired]);
        assert!(provider.signature_validator(Utc::now(), false).is_ok());

        let enforced = provider.with_specification(CertificateSpecification::ValidityPeriod);
        assert!(enforced.trusted_certificates(Utc::now()).is_empty());
    }

    #[test]
    fn configured_advisory_specifications_are_split() {
        let config = IdentityProviderConfig {
            entity_id: IDP.to_string(),
            sso_url: None,
            slo_url: None,
            artifact_resolution_url: None,
            certificates: Vec::new(),
            metadata: None,
            certificate_specifications: vec![
                CertificateSpecificationConfig::ValidityPeriod { advisory: true },
                CertificateSpecificationConfig::Fingerprint {
                    sha256: "00".repeat(32),
                    advisory: false,
                },
            ],
            want_assertions_signed: false,
        };
        let provider = IdentityProvider::from_config(&config).unwrap();
        assert_eq!(provider.advisory_specifications(), [CertificateSpecification::ValidityPeriod]);
        assert_eq!(provider.specifications().len(), 1);
        assert_eq!(provider.specifications()[0].name(), "fingerprint");
    }

    #[test]
    fn metadata_is_checked_against_trusted_certificates_only() {
        let signer = XmlSigner::from_pem(IDP_KEY, Some(IDP_CERT)).unwrap();
        let xml = format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" ID="_md1" entityID="{IDP}"><md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></md:EntityDescriptor>"#
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.xml");
        std::fs::write(&path, signer.sign_xml(&xml, "_md1").unwrap()).unwrap();

        // Same key as IDP_CERT, outside its validity period.
        let expired_only =
            IdentityProvider::new(IDP).with_certificate(Certificate::from_pem(IDP_EXPIRED_CERT).unwrap());
        assert!(expired_only.load_metadata(&path).is_ok());

        let enforced = expired_only.with_specification(CertificateSpecification::ValidityPeriod);
        assert!(matches!(
            enforced.load_metadata(&path),
            Err(SamlError::UntrustedCertificate(_))
        ));
    }
}
