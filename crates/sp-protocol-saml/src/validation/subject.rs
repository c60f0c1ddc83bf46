//! Validators for subjects, identifiers and key material.

use base64::Engine;

use super::assertion::EncryptedElementValidator;
use super::time::require_ordered;
use super::{require_absolute_uri, require_non_blank, validate_extension_attributes, Validator};
use crate::error::{SamlError, SamlResult};
use crate::types::{
    confirmation_methods, Identifier, KeyInfo, KeyInfoItem, NameId, NameIdFormat, Subject,
    SubjectConfirmation, SubjectConfirmationData, SubjectItem,
};

const MAX_PERSISTENT_ID_LENGTH: usize = 256;
const MAX_ENTITY_ID_LENGTH: usize = 1024;

/// Validates `saml:NameID` and `saml:Issuer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameIdValidator;

impl Validator<NameId> for NameIdValidator {
    fn validate(&self, name_id: &NameId) -> SamlResult<()> {
        require_non_blank("NameID", &name_id.value)?;
        let Some(format) = name_id.format.as_deref() else {
            return Ok(());
        };
        match NameIdFormat::from_uri(format) {
            Some(NameIdFormat::Persistent | NameIdFormat::Transient) => {
                if name_id.value.len() > MAX_PERSISTENT_ID_LENGTH {
                    return Err(SamlError::SchemaViolation(format!(
                        "persistent and transient NameID values are limited to {MAX_PERSISTENT_ID_LENGTH} characters"
                    )));
                }
            }
            Some(NameIdFormat::Entity) => {
                if name_id.value.len() > MAX_ENTITY_ID_LENGTH {
                    return Err(SamlError::SchemaViolation(format!(
                        "entity NameID values are limited to {MAX_ENTITY_ID_LENGTH} characters"
                    )));
                }
                require_absolute_uri("NameID", &name_id.value)?;
                if name_id.name_qualifier.is_some()
                    || name_id.sp_name_qualifier.is_some()
                    || name_id.sp_provided_id.is_some()
                {
                    return Err(SamlError::SchemaViolation(
                        "entity NameID must not carry qualifiers".to_string(),
                    ));
                }
            }
            Some(_) => {}
            None => require_absolute_uri("NameID/@Format", format)?,
        }
        Ok(())
    }
}

/// Validates `ds:KeyInfo` used for confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyInfoValidator;

impl Validator<KeyInfo> for KeyInfoValidator {
    fn validate(&self, key_info: &KeyInfo) -> SamlResult<()> {
        if key_info.items.is_empty() {
            return Err(SamlError::SchemaViolation("KeyInfo must not be empty".to_string()));
        }
        for item in &key_info.items {
            match item {
                KeyInfoItem::X509Data(data) => {
                    if data.is_empty() {
                        return Err(SamlError::SchemaViolation(
                            "X509Data must not be empty".to_string(),
                        ));
                    }
                    for certificate in &data.certificates {
                        let compact: String =
                            certificate.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                        base64::engine::general_purpose::STANDARD
                            .decode(compact)
                            .map_err(|e| {
                                SamlError::SchemaViolation(format!("X509Certificate is not base64: {e}"))
                            })?;
                    }
                }
                KeyInfoItem::RsaKeyValue { modulus, exponent } => {
                    require_non_blank("RSAKeyValue/Modulus", modulus)?;
                    require_non_blank("RSAKeyValue/Exponent", exponent)?;
                }
                KeyInfoItem::DsaKeyValue { p, q, g, y } => {
                    require_non_blank("DSAKeyValue/P", p)?;
                    require_non_blank("DSAKeyValue/Q", q)?;
                    require_non_blank("DSAKeyValue/G", g)?;
                    require_non_blank("DSAKeyValue/Y", y)?;
                }
                KeyInfoItem::KeyName(name) => require_non_blank("KeyName", name)?,
                KeyInfoItem::EncryptedKey(_)
                | KeyInfoItem::RetrievalMethod { .. }
                | KeyInfoItem::Other(_) => {}
            }
        }
        Ok(())
    }
}

/// Validates `saml:Subject`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectValidator;

impl Validator<Subject> for SubjectValidator {
    fn validate(&self, subject: &Subject) -> SamlResult<()> {
        if subject.items.is_empty() {
            return Err(SamlError::SchemaViolation(
                "Subject needs a NameID, an EncryptedID or a SubjectConfirmation".to_string(),
            ));
        }
        for item in &subject.items {
            match item {
                SubjectItem::NameId(name_id) => NameIdValidator.validate(name_id)?,
                SubjectItem::EncryptedId(encrypted) => {
                    EncryptedElementValidator.validate(encrypted)?;
                }
                SubjectItem::SubjectConfirmation(confirmation) => {
                    SubjectConfirmationValidator.validate(confirmation)?;
                }
            }
        }
        Ok(())
    }
}

/// Validates `saml:SubjectConfirmation`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectConfirmationValidator;

impl Validator<SubjectConfirmation> for SubjectConfirmationValidator {
    fn validate(&self, confirmation: &SubjectConfirmation) -> SamlResult<()> {
        require_absolute_uri("SubjectConfirmation/@Method", &confirmation.method)?;

        if confirmation.method == confirmation_methods::HOLDER_OF_KEY {
            let key_infos = confirmation
                .data
                .as_ref()
                .map(|data| data.key_infos.as_slice())
                .unwrap_or_default();
            if key_infos.is_empty() {
                return Err(SamlError::SchemaViolation(
                    "holder-of-key confirmation needs KeyInfo".to_string(),
                ));
            }
            for key_info in key_infos {
                KeyInfoValidator.validate(key_info)?;
            }
        }

        if let Some(data) = &confirmation.data {
            SubjectConfirmationDataValidator.validate(data)?;
        }
        match &confirmation.identifier {
            Some(Identifier::NameId(name_id)) => NameIdValidator.validate(name_id),
            Some(Identifier::EncryptedId(encrypted)) => EncryptedElementValidator.validate(encrypted),
            None => Ok(()),
        }
    }
}

/// Validates `saml:SubjectConfirmationData`, including the
/// `KeyInfoConfirmationDataType` form.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectConfirmationDataValidator;

impl Validator<SubjectConfirmationData> for SubjectConfirmationDataValidator {
    fn validate(&self, data: &SubjectConfirmationData) -> SamlResult<()> {
        if let Some(recipient) = &data.recipient {
            require_absolute_uri("SubjectConfirmationData/@Recipient", recipient)?;
        }
        require_ordered("SubjectConfirmationData", data.not_before, data.not_on_or_after)?;
        validate_extension_attributes("SubjectConfirmationData", &data.extension_attributes)?;
        if data.key_info_confirmation {
            if data.key_infos.is_empty() {
                return Err(SamlError::SchemaViolation(
                    "KeyInfoConfirmationData needs at least one KeyInfo".to_string(),
                ));
            }
            for key_info in &data.key_infos {
                KeyInfoValidator.validate(key_info)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::X509Data;
    use chrono::{Duration, Utc};

    fn bearer() -> SubjectConfirmation {
        SubjectConfirmation::bearer(SubjectConfirmationData {
            recipient: Some("https://sp.example.org/acs".to_string()),
            ..SubjectConfirmationData::default()
        })
    }

    #[test]
    fn empty_subject_is_rejected() {
        let err = SubjectValidator.validate(&Subject::default()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SchemaFormat);
    }

    #[test]
    fn confirmation_alone_is_enough() {
        let subject = Subject {
            items: vec![SubjectItem::SubjectConfirmation(SubjectConfirmation::new(
                confirmation_methods::BEARER,
            ))],
        };
        assert!(SubjectValidator.validate(&subject).is_ok());
    }

    #[test]
    fn method_must_be_absolute_uri() {
        let subject = Subject::default().with_confirmation(SubjectConfirmation::new("bearer"));
        assert!(matches!(
            SubjectValidator.validate(&subject),
            Err(SamlError::InvalidUri { .. })
        ));
        assert!(SubjectConfirmationValidator
            .validate(&SubjectConfirmation::new(""))
            .is_err());
    }

    #[test]
    fn name_id_rules() {
        assert!(NameIdValidator.validate(&NameId::new("alice")).is_ok());
        assert!(NameIdValidator.validate(&NameId::new("  ")).is_err());
        assert!(NameIdValidator
            .validate(&NameId::persistent("x".repeat(257)))
            .is_err());
        assert!(NameIdValidator
            .validate(&NameId::new("not a uri").with_format(NameIdFormat::Entity))
            .is_err());
        assert!(NameIdValidator
            .validate(
                &NameId::new("https://idp.example.org")
                    .with_format(NameIdFormat::Entity)
                    .with_name_qualifier("q")
            )
            .is_err());
        let mut custom = NameId::new("alice");
        custom.format = Some("custom-format".to_string());
        assert!(matches!(
            NameIdValidator.validate(&custom),
            Err(SamlError::InvalidUri { .. })
        ));
    }

    #[test]
    fn recipient_and_window_are_checked() {
        assert!(SubjectConfirmationValidator.validate(&bearer()).is_ok());

        let mut relative = bearer();
        relative.data.as_mut().unwrap().recipient = Some("/acs".to_string());
        assert!(SubjectConfirmationValidator.validate(&relative).is_err());

        let now = Utc::now();
        let mut inverted = bearer();
        let data = inverted.data.as_mut().unwrap();
        data.not_before = Some(now);
        data.not_on_or_after = Some(now - Duration::minutes(1));
        assert!(matches!(
            SubjectConfirmationValidator.validate(&inverted),
            Err(SamlError::SchemaViolation(_))
        ));
    }

    #[test]
    fn holder_of_key_needs_valid_key_info() {
        let mut confirmation = SubjectConfirmation::new(confirmation_methods::HOLDER_OF_KEY);
        assert!(SubjectConfirmationValidator.validate(&confirmation).is_err());

        confirmation.data = Some(SubjectConfirmationData {
            key_infos: vec![KeyInfo {
                items: vec![KeyInfoItem::X509Data(X509Data::default())],
            }],
            key_info_confirmation: true,
            ..SubjectConfirmationData::default()
        });
        assert!(SubjectConfirmationValidator.validate(&confirmation).is_err());

        confirmation.data.as_mut().unwrap().key_infos = vec![KeyInfo::with_certificate("TUlJQw==")];
        assert!(SubjectConfirmationValidator.validate(&confirmation).is_ok());
    }
}
