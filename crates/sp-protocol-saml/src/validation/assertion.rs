//! Validators for assertions, their statements and responses.

use super::subject::{NameIdValidator, SubjectValidator};
use super::time::require_ordered;
use super::{require_absolute_uri, require_non_blank, validate_extension_attributes, Validator};
use crate::error::{SamlError, SamlResult};
use crate::types::{
    Assertion, Attribute, AttributeItem, Condition, Conditions, EncryptedElement, Response,
    Statement, ENCRYPTED_ELEMENT_TYPE,
};

const SAML_VERSION: &str = "2.0";

/// Validates `EncryptedAssertion`, `EncryptedID` and `EncryptedAttribute`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptedElementValidator;

impl Validator<EncryptedElement> for EncryptedElementValidator {
    fn validate(&self, encrypted: &EncryptedElement) -> SamlResult<()> {
        let data = encrypted.encrypted_data.as_ref().ok_or_else(|| {
            SamlError::MissingElement("EncryptedElement/EncryptedData".to_string())
        })?;
        if let Some(type_uri) = &data.type_uri {
            if type_uri != ENCRYPTED_ELEMENT_TYPE {
                return Err(SamlError::SchemaViolation(format!(
                    "EncryptedData/@Type must be {ENCRYPTED_ELEMENT_TYPE}, got '{type_uri}'"
                )));
            }
        }
        Ok(())
    }
}

/// Validates `saml:Conditions`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionsValidator;

impl Validator<Conditions> for ConditionsValidator {
    fn validate(&self, conditions: &Conditions) -> SamlResult<()> {
        require_ordered("Conditions", conditions.not_before, conditions.not_on_or_after)?;
        let mut one_time_use = 0;
        let mut proxy_restrictions = 0;
        for condition in &conditions.items {
            match condition {
                Condition::AudienceRestriction(audiences) => {
                    if audiences.is_empty() {
                        return Err(SamlError::SchemaViolation(
                            "AudienceRestriction needs at least one Audience".to_string(),
                        ));
                    }
                    for audience in audiences {
                        require_absolute_uri("Audience", audience)?;
                    }
                }
                Condition::OneTimeUse => one_time_use += 1,
                Condition::ProxyRestriction { audiences, .. } => {
                    proxy_restrictions += 1;
                    for audience in audiences {
                        require_absolute_uri("ProxyRestriction/Audience", audience)?;
                    }
                }
                Condition::Other(_) => {}
            }
        }
        if one_time_use > 1 || proxy_restrictions > 1 {
            return Err(SamlError::SchemaViolation(
                "OneTimeUse and ProxyRestriction may each appear at most once".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validates `saml:Attribute`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeValidator;

impl Validator<Attribute> for AttributeValidator {
    fn validate(&self, attribute: &Attribute) -> SamlResult<()> {
        require_non_blank("Attribute/@Name", &attribute.name)?;
        if attribute.values.iter().any(Option::is_none) {
            return Err(SamlError::SchemaViolation(format!(
                "attribute '{}' has a nil value",
                attribute.name
            )));
        }
        if let Some(name_format) = &attribute.name_format {
            require_absolute_uri("Attribute/@NameFormat", name_format)?;
        }
        validate_extension_attributes("Attribute", &attribute.extension_attributes)
    }
}

/// Validates the statements of an assertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementValidator;

impl Validator<Statement> for StatementValidator {
    fn validate(&self, statement: &Statement) -> SamlResult<()> {
        match statement {
            Statement::Authn(authn) => {
                if let Some(class_ref) = &authn.authn_context_class_ref {
                    require_absolute_uri("AuthnContextClassRef", class_ref)?;
                }
                Ok(())
            }
            Statement::Attribute(attributes) => {
                if attributes.items.is_empty() {
                    return Err(SamlError::SchemaViolation(
                        "AttributeStatement must not be empty".to_string(),
                    ));
                }
                for item in &attributes.items {
                    match item {
                        AttributeItem::Attribute(attribute) => {
                            AttributeValidator.validate(attribute)?;
                        }
                        AttributeItem::EncryptedAttribute(encrypted) => {
                            EncryptedElementValidator.validate(encrypted)?;
                        }
                    }
                }
                Ok(())
            }
            Statement::Other(_) => Ok(()),
        }
    }
}

/// Validates `saml:Assertion` and everything inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionValidator;

impl Validator<Assertion> for AssertionValidator {
    fn validate(&self, assertion: &Assertion) -> SamlResult<()> {
        if assertion.version != SAML_VERSION {
            return Err(SamlError::SchemaViolation(format!(
                "unsupported assertion version '{}'",
                assertion.version
            )));
        }
        require_non_blank("Assertion/@ID", &assertion.id)?;
        NameIdValidator.validate(&assertion.issuer)?;

        match &assertion.subject {
            Some(subject) => SubjectValidator.validate(subject)?,
            None if assertion.statements.is_empty() => {
                return Err(SamlError::SchemaViolation(
                    "an assertion without statements must have a Subject".to_string(),
                ))
            }
            None if assertion.authn_statement().is_some() => {
                return Err(SamlError::SchemaViolation(
                    "an assertion with an AuthnStatement must have a Subject".to_string(),
                ))
            }
            None => {}
        }
        if let Some(conditions) = &assertion.conditions {
            ConditionsValidator.validate(conditions)?;
        }
        for statement in &assertion.statements {
            StatementValidator.validate(statement)?;
        }
        Ok(())
    }
}

/// Validates `samlp:Response` and every assertion it carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseValidator;

impl Validator<Response> for ResponseValidator {
    fn validate(&self, response: &Response) -> SamlResult<()> {
        let header = &response.header;
        if header.version != SAML_VERSION {
            return Err(SamlError::SchemaViolation(format!(
                "unsupported message version '{}'",
                header.version
            )));
        }
        require_non_blank("Response/@ID", &header.id)?;
        if let Some(destination) = &header.destination {
            require_absolute_uri("Response/@Destination", destination)?;
        }
        if let Some(issuer) = &header.issuer {
            NameIdValidator.validate(issuer)?;
        }
        require_absolute_uri("StatusCode/@Value", &response.status.status_code.value)?;
        for assertion in &response.assertions {
            AssertionValidator.validate(assertion)?;
        }
        for encrypted in &response.encrypted_assertions {
            EncryptedElementValidator.validate(encrypted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AttributeStatement, AuthnStatement, EncryptedData, NameId, Subject, SubjectConfirmation,
        SubjectConfirmationData,
    };
    use chrono::{Duration, Utc};

    fn assertion() -> Assertion {
        let now = Utc::now();
        Assertion::new("https://idp.example.org")
            .with_subject(
                Subject::new(NameId::new("alice")).with_confirmation(SubjectConfirmation::bearer(
                    SubjectConfirmationData::default(),
                )),
            )
            .with_conditions(
                Conditions::new(now, now + Duration::minutes(5)).with_audience("https://sp.example.org"),
            )
            .with_statement(Statement::Authn(AuthnStatement::new(now)))
            .with_statement(Statement::Attribute(
                AttributeStatement::new().with_attribute(Attribute::new("mail", ["a@example.org"])),
            ))
    }

    #[test]
    fn well_formed_assertion_passes() {
        assert!(AssertionValidator.validate(&assertion()).is_ok());
    }

    #[test]
    fn version_must_be_2_0() {
        let mut assertion = assertion();
        assertion.version = "1.1".to_string();
        assert!(AssertionValidator.validate(&assertion).is_err());
    }

    #[test]
    fn authn_statement_requires_subject() {
        let mut assertion = assertion();
        assertion.subject = None;
        assert!(matches!(
            AssertionValidator.validate(&assertion),
            Err(SamlError::SchemaViolation(_))
        ));
    }

    #[test]
    fn inverted_conditions_are_rejected() {
        let now = Utc::now();
        let conditions = Conditions::new(now, now - Duration::seconds(1));
        assert!(ConditionsValidator.validate(&conditions).is_err());
    }

    #[test]
    fn audience_must_be_uri() {
        let now = Utc::now();
        let conditions = Conditions::new(now, now + Duration::minutes(1)).with_audience("sp");
        assert!(matches!(
            ConditionsValidator.validate(&conditions),
            Err(SamlError::InvalidUri { .. })
        ));
        let twice = Conditions {
            items: vec![Condition::OneTimeUse, Condition::OneTimeUse],
            ..Conditions::default()
        };
        assert!(ConditionsValidator.validate(&twice).is_err());
    }

    #[test]
    fn attribute_rules() {
        assert!(AttributeValidator.validate(&Attribute::new(" ", ["x"])).is_err());
        let mut nil = Attribute::new("mail", ["a@example.org"]);
        nil.values.push(None);
        assert!(AttributeValidator.validate(&nil).is_err());
        assert!(StatementValidator
            .validate(&Statement::Attribute(AttributeStatement::new()))
            .is_err());
    }

    #[test]
    fn encrypted_element_rules() {
        let mut encrypted = EncryptedElement {
            encrypted_data: None,
            encrypted_keys: Vec::new(),
            namespaces: Vec::new(),
        };
        assert!(matches!(
            EncryptedElementValidator.validate(&encrypted),
            Err(SamlError::MissingElement(_))
        ));
        encrypted.encrypted_data = Some(EncryptedData {
            id: None,
            type_uri: Some("http://www.w3.org/2001/04/xmlenc#Content".to_string()),
            encryption_method: None,
            key_info: None,
            cipher_value: None,
        });
        assert!(EncryptedElementValidator.validate(&encrypted).is_err());
        encrypted.encrypted_data.as_mut().unwrap().type_uri = None;
        assert!(EncryptedElementValidator.validate(&encrypted).is_ok());
    }

    #[test]
    fn response_validates_nested_assertions() {
        let mut bad = assertion();
        bad.issuer = NameId::new("");
        let response = Response::success("https://idp.example.org").with_assertion(bad);
        assert!(ResponseValidator.validate(&response).is_err());

        let response = Response::success("https://idp.example.org")
            .with_destination("https://sp.example.org/acs")
            .with_assertion(assertion());
        assert!(ResponseValidator.validate(&response).is_ok());
    }
}
