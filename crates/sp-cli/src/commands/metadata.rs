//! Metadata summaries.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use sp_crypto::Certificate;
use sp_protocol_saml::signature::XmlSignatureValidator;
use sp_protocol_saml::types::{EntityDescriptor, KeyUse, RoleDescriptor};
use sp_protocol_saml::xml::Document;

use crate::cli::MetadataArgs;
use crate::output::{emit, error, field, info, success, OutputFormat};
use crate::CliError;

/// Summary of one role descriptor.
#[derive(Debug, Serialize)]
pub struct RoleSummary {
    /// `idp` or `sp`.
    pub role: &'static str,
    /// Certificates usable for signing.
    pub signing_keys: usize,
    /// Certificates usable for encryption.
    pub encryption_keys: usize,
    /// `binding location` of each SSO endpoint.
    pub single_sign_on: Vec<String>,
    /// `binding location` of each SLO endpoint.
    pub single_logout: Vec<String>,
    /// `index binding location` of each artifact resolution endpoint.
    pub artifact_resolution: Vec<String>,
}

impl RoleSummary {
    fn new(role: &'static str, descriptor: &RoleDescriptor) -> Self {
        Self {
            role,
            signing_keys: descriptor.certificates(KeyUse::Signing).count(),
            encryption_keys: descriptor.certificates(KeyUse::Encryption).count(),
            single_sign_on: descriptor
                .single_sign_on_services
                .iter()
                .map(|endpoint| format!("{} {}", endpoint.binding, endpoint.location))
                .collect(),
            single_logout: descriptor
                .single_logout_services
                .iter()
                .map(|endpoint| format!("{} {}", endpoint.binding, endpoint.location))
                .collect(),
            artifact_resolution: descriptor
                .artifact_resolution_services
                .iter()
                .map(|indexed| {
                    format!(
                        "[{}] {} {}",
                        indexed.index, indexed.endpoint.binding, indexed.endpoint.location
                    )
                })
                .collect(),
        }
    }
}

/// Summary of one entity.
#[derive(Debug, Serialize)]
pub struct EntitySummary {
    /// Entity ID.
    pub entity_id: String,
    /// `validUntil`.
    pub valid_until: Option<DateTime<Utc>>,
    /// Whether the entity carries its own signature.
    pub signed: bool,
    /// Role descriptors.
    pub roles: Vec<RoleSummary>,
}

impl From<&EntityDescriptor> for EntitySummary {
    fn from(entity: &EntityDescriptor) -> Self {
        let roles = [("idp", entity.idp.as_ref()), ("sp", entity.sp.as_ref())]
            .into_iter()
            .filter_map(|(role, descriptor)| descriptor.map(|descriptor| RoleSummary::new(role, descriptor)))
            .collect();
        Self {
            entity_id: entity.entity_id.clone(),
            valid_until: entity.valid_until,
            signed: entity.signed,
            roles,
        }
    }
}

/// Summary of a metadata document.
#[derive(Debug, Serialize)]
pub struct MetadataReport {
    /// Entities in document order.
    pub entities: Vec<EntitySummary>,
    /// Outcome of the document signature check, if a certificate was given.
    pub signature_valid: Option<bool>,
}

/// Runs `metadata`.
pub fn run_metadata(args: MetadataArgs, format: OutputFormat) -> crate::CliResult<()> {
    let xml = std::fs::read_to_string(&args.file)?;
    let certificate = args
        .cert
        .as_ref()
        .map(|path| -> crate::CliResult<Certificate> {
            Ok(Certificate::from_pem(&std::fs::read_to_string(path)?)?)
        })
        .transpose()?;
    let report = summarize(&xml, certificate.as_ref())?;

    emit(&report, format, |report| {
        for entity in &report.entities {
            println!("{}", entity.entity_id.bold());
            if let Some(valid_until) = entity.valid_until {
                field("valid until", valid_until.to_rfc3339());
            }
            field("signed", entity.signed);
            for role in &entity.roles {
                field("role", role.role);
                field("signing keys", role.signing_keys);
                field("encryption keys", role.encryption_keys);
                for endpoint in &role.single_sign_on {
                    field("sso", endpoint);
                }
                for endpoint in &role.single_logout {
                    field("slo", endpoint);
                }
                for endpoint in &role.artifact_resolution {
                    field("artifact resolution", endpoint);
                }
            }
        }
        match report.signature_valid {
            Some(true) => success("metadata signature verified"),
            Some(false) => error("metadata signature does not verify"),
            None => info(&format!("{} entities", report.entities.len())),
        }
    })?;
    if report.signature_valid == Some(false) {
        return Err(CliError::SignatureInvalid);
    }
    Ok(())
}

/// Parses `xml` and summarizes every entity in it, verifying the document
/// signature with `certificate` when given.
pub fn summarize(xml: &str, certificate: Option<&Certificate>) -> crate::CliResult<MetadataReport> {
    let document = Document::parse(xml)?;
    let entities = EntityDescriptor::parse_all(document.root())?;
    let signature_valid = certificate
        .map(|certificate| XmlSignatureValidator::from_certificates([certificate]).check_signature(&document))
        .transpose()?;
    Ok(MetadataReport {
        entities: entities.iter().map(EntitySummary::from).collect(),
        signature_valid,
    })
}
