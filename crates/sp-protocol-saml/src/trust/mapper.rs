//! Persistent pseudonym mapping.

use std::collections::HashMap;

use crate::error::SamlResult;
use crate::types::NameId;

/// Maps a persistent `NameID` to a service-specific identifier.
///
/// Invoked after a response is accepted, only for persistent name IDs.
/// Returning `None` leaves the identity unmapped.
pub trait PersistentPseudonymMapper: Send + Sync {
    /// Maps `name_id` issued by `issuer`.
    ///
    /// # Errors
    ///
    /// An error rejects the exchange.
    fn map_identity(&self, issuer: &str, name_id: &NameId) -> SamlResult<Option<String>>;
}

/// A fixed table of `(issuer, pseudonym)` to local identifier.
#[derive(Debug, Clone, Default)]
pub struct StaticPseudonymMapper {
    entries: HashMap<(String, String), String>,
}

impl StaticPseudonymMapper {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping.
    #[must_use]
    pub fn with_mapping(
        mut self,
        issuer: impl Into<String>,
        pseudonym: impl Into<String>,
        local: impl Into<String>,
    ) -> Self {
        self.entries
            .insert((issuer.into(), pseudonym.into()), local.into());
        self
    }
}

impl PersistentPseudonymMapper for StaticPseudonymMapper {
    fn map_identity(&self, issuer: &str, name_id: &NameId) -> SamlResult<Option<String>> {
        Ok(self
            .entries
            .get(&(issuer.to_string(), name_id.value.clone()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_scoped_by_issuer() {
        let mapper = StaticPseudonymMapper::new().with_mapping("https://idp.example.org", "p-1", "alice");
        let name_id = NameId::persistent("p-1");
        assert_eq!(
            mapper.map_identity("https://idp.example.org", &name_id).unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(mapper.map_identity("https://other.example.org", &name_id).unwrap(), None);
    }
}
