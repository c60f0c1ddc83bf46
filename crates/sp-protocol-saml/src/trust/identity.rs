//! The authenticated identity produced by an accepted exchange.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{NameId, NameIdFormat};

/// The subject identifier of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectId {
    /// Identifier value.
    pub value: String,
    /// `Format` URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// `NameQualifier`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,
    /// `SPNameQualifier`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl SubjectId {
    /// Returns true for a persistent identifier.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.format.as_deref() == Some(NameIdFormat::Persistent.uri())
    }
}

impl From<&NameId> for SubjectId {
    fn from(name_id: &NameId) -> Self {
        Self {
            value: name_id.value.clone(),
            format: name_id.format.clone(),
            name_qualifier: name_id.name_qualifier.clone(),
            sp_name_qualifier: name_id.sp_name_qualifier.clone(),
        }
    }
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Entity ID of the identity provider.
    pub issuer: String,
    /// The asserted subject.
    pub subject: SubjectId,
    /// Service-specific identifier from the pseudonym mapper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pseudonym: Option<String>,
    /// ID of the accepted assertion.
    pub assertion_id: String,
    /// When the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_instant: Option<DateTime<Utc>>,
    /// Session index at the identity provider, needed for logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,
    /// End of the identity provider session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    /// Authentication context class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
    /// Attribute name to values. Repeated attributes are merged.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Relay state carried with the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_state: Option<String>,
}

impl Identity {
    /// Returns the values of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Returns the first value of an attribute.
    #[must_use]
    pub fn first_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(<[String]>::first)
            .map(String::as_str)
    }

    /// Returns the pseudonym if one was mapped, otherwise the subject value.
    #[must_use]
    pub fn local_id(&self) -> &str {
        self.pseudonym.as_deref().unwrap_or(&self.subject.value)
    }
}
