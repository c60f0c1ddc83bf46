//! Structural validation of SAML objects.
//!
//! Each validator checks one schema-level object against the normative
//! rules that parsing alone does not enforce, and delegates to the validators
//! of its children. Validation stops at the first violation; there is no
//! collecting mode.
//!
//! Time windows are not checked here, see [`time`]. The trust decision
//! checks them once the signature and structure are known to be sound.

mod assertion;
mod subject;
pub mod time;

pub use assertion::{
    AssertionValidator, AttributeValidator, ConditionsValidator, EncryptedElementValidator,
    ResponseValidator, StatementValidator,
};
pub use subject::{
    KeyInfoValidator, NameIdValidator, SubjectConfirmationDataValidator,
    SubjectConfirmationValidator, SubjectValidator,
};
pub use time::{not_before_valid, not_on_or_after_valid, validate_time_window};

use crate::error::{SamlError, SamlResult};
use crate::types::RESERVED_NAMESPACES;
use crate::xml::Attribute;

/// Validates one kind of SAML object.
pub trait Validator<T: ?Sized> {
    /// Checks `value`.
    ///
    /// # Errors
    ///
    /// Returns the first rule violation found.
    fn validate(&self, value: &T) -> SamlResult<()>;
}

/// Requires a well-formed absolute URI.
pub(crate) fn require_absolute_uri(field: &str, value: &str) -> SamlResult<()> {
    let invalid = || SamlError::InvalidUri {
        field: field.to_string(),
        value: value.to_string(),
    };
    if value.trim().is_empty() || value.trim() != value {
        return Err(invalid());
    }
    url::Url::parse(value).map(|_| ()).map_err(|_| invalid())
}

/// Requires a string with at least one non-whitespace character.
pub(crate) fn require_non_blank(field: &str, value: &str) -> SamlResult<()> {
    if value.trim().is_empty() {
        return Err(SamlError::SchemaViolation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Extension attributes must be namespace-qualified and outside the SAML
/// assertion and protocol namespaces.
pub(crate) fn validate_extension_attributes(owner: &str, attributes: &[Attribute]) -> SamlResult<()> {
    for attribute in attributes {
        match attribute.namespace.as_deref() {
            None => {
                return Err(SamlError::SchemaViolation(format!(
                    "{owner} carries unqualified attribute '{}'",
                    attribute.local_name
                )))
            }
            Some(namespace) if RESERVED_NAMESPACES.contains(&namespace) => {
                return Err(SamlError::SchemaViolation(format!(
                    "{owner} carries attribute '{}' in reserved namespace {namespace}",
                    attribute.local_name
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}
