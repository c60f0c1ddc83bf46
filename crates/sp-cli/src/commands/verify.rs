//! Enveloped signature verification.

use colored::Colorize;
use serde::Serialize;
use sp_crypto::Certificate;
use sp_protocol_saml::signature::XmlSignatureValidator;
use sp_protocol_saml::xml::Document;

use crate::cli::VerifyArgs;
use crate::output::{emit, error, field, success, OutputFormat};
use crate::CliError;

/// Verification outcome.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
    /// Signed element.
    pub element: String,
    /// Its ID attribute.
    pub id: Option<String>,
    /// Subject of the certificate used.
    pub signer: String,
    /// SHA-256 fingerprint of that certificate.
    pub fingerprint: String,
    /// Whether the signature verified.
    pub valid: bool,
}

/// Runs `verify`.
pub fn run_verify(args: VerifyArgs, format: OutputFormat) -> crate::CliResult<()> {
    let xml = std::fs::read_to_string(&args.file)?;
    let certificate = Certificate::from_pem(&std::fs::read_to_string(&args.cert)?)?;
    let report = verify(&xml, &certificate, args.allow_sha1)?;

    emit(&report, format, |report| {
        field("element", &report.element);
        field("id", report.id.as_deref().unwrap_or("-"));
        field("signer", &report.signer);
        field("fingerprint", report.fingerprint.dimmed());
        if report.valid {
            success("signature verified");
        } else {
            error("signature does not verify");
        }
    })?;
    if report.valid {
        Ok(())
    } else {
        Err(CliError::SignatureInvalid)
    }
}

/// Checks the enveloped signature of the document element of `xml`.
pub fn verify(xml: &str, certificate: &Certificate, allow_sha1: bool) -> crate::CliResult<VerifyReport> {
    let document = Document::parse(xml)?;
    let valid = XmlSignatureValidator::from_certificates([certificate])
        .allow_sha1(allow_sha1)
        .check_signature(&document)?;
    let root = document.root();
    Ok(VerifyReport {
        element: root.qualified_name(),
        id: root.id().map(str::to_string),
        signer: certificate.subject().to_string(),
        fingerprint: certificate.fingerprint_sha256(),
        valid,
    })
}

#[cfg(test)]
mod tests {
    use sp_protocol_saml::signature::XmlSigner;
    use sp_protocol_saml::types::LogoutRequest;
    use sp_protocol_saml::types::NameId;

    use super::*;

    const IDP_KEY: &str = include_str!("../../../../tests/fixtures/idp-key.pem");
    const IDP_CERT: &str = include_str!("../../../../tests/fixtures/idp-cert.pem");
    const ROGUE_CERT: &str = include_str!("../../../../tests/fixtures/rogue-cert.pem");

    fn signed() -> String {
        let request = LogoutRequest::new("https://idp.example.org", NameId::transient("t-1"));
        XmlSigner::from_pem(IDP_KEY, Some(IDP_CERT))
            .unwrap()
            .sign_xml(&request.to_xml(), &request.header.id)
            .unwrap()
    }

    #[test]
    fn verifies_with_the_signing_certificate() {
        let report = verify(&signed(), &Certificate::from_pem(IDP_CERT).unwrap(), false).unwrap();
        assert!(report.valid);
        assert!(report.element.ends_with("LogoutRequest"));
    }

    #[test]
    fn other_certificate_does_not_verify() {
        let report = verify(&signed(), &Certificate::from_pem(ROGUE_CERT).unwrap(), false).unwrap();
        assert!(!report.valid);
    }

    #[test]
    fn unsigned_document_is_an_error() {
        let request = LogoutRequest::new("https://idp.example.org", NameId::transient("t-1"));
        assert!(verify(&request.to_xml(), &Certificate::from_pem(IDP_CERT).unwrap(), false).is_err());
    }
}
