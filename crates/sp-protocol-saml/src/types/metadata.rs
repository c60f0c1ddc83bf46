//! SAML 2.0 metadata: entity descriptors, roles, endpoints and keys.
//!
//! Only the parts an SP consumes are modelled. Unknown role descriptors and
//! extensions are skipped.

use chrono::{DateTime, Utc};

use super::{expect_element, optional_bool, optional_instant, required_attribute, KeyInfo};
use super::{SamlBinding, METADATA_NS, XMLDSIG_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// What a key descriptor's key may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUse {
    /// `use="signing"`.
    Signing,
    /// `use="encryption"`.
    Encryption,
    /// No `use` attribute; valid for both.
    Unspecified,
}

impl KeyUse {
    fn parse(value: Option<&str>) -> SamlResult<Self> {
        match value {
            None => Ok(Self::Unspecified),
            Some("signing") => Ok(Self::Signing),
            Some("encryption") => Ok(Self::Encryption),
            Some(other) => Err(SamlError::SchemaViolation(format!(
                "KeyDescriptor/@use must be 'signing' or 'encryption', got '{other}'"
            ))),
        }
    }

    /// Returns true if a key declared with `self` serves `requested`.
    #[must_use]
    pub fn serves(self, requested: Self) -> bool {
        self == Self::Unspecified || requested == Self::Unspecified || self == requested
    }
}

/// `md:KeyDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    /// Declared use.
    pub key_use: KeyUse,
    /// Key material.
    pub key_info: KeyInfo,
}

/// An endpoint with a binding and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Binding URI.
    pub binding: String,
    /// Endpoint URL.
    pub location: String,
    /// Optional separate response URL.
    pub response_location: Option<String>,
}

impl Endpoint {
    /// Returns the binding, if it is one this crate knows.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_uri(&self.binding)
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            binding: required_attribute(element, "Binding")?.to_string(),
            location: required_attribute(element, "Location")?.to_string(),
            response_location: element.attribute("ResponseLocation").map(str::to_string),
        })
    }
}

/// An endpoint addressed by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEndpoint {
    /// The endpoint.
    pub endpoint: Endpoint,
    /// Index, referenced from artifacts and AuthnRequests.
    pub index: u16,
    /// Whether this is the default endpoint.
    pub is_default: bool,
}

impl IndexedEndpoint {
    fn from_element(element: &Element) -> SamlResult<Self> {
        let index = required_attribute(element, "index")?;
        Ok(Self {
            endpoint: Endpoint::from_element(element)?,
            index: index.trim().parse().map_err(|_| {
                SamlError::SchemaViolation(format!(
                    "{}/@index is not an unsigned short: '{index}'",
                    element.local_name
                ))
            })?,
            is_default: optional_bool(element, "isDefault")?.unwrap_or(false),
        })
    }
}

/// An `IDPSSODescriptor` or `SPSSODescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDescriptor {
    /// Key descriptors in document order.
    pub key_descriptors: Vec<KeyDescriptor>,
    /// `SingleSignOnService` endpoints (IdP).
    pub single_sign_on_services: Vec<Endpoint>,
    /// `SingleLogoutService` endpoints.
    pub single_logout_services: Vec<Endpoint>,
    /// `ArtifactResolutionService` endpoints.
    pub artifact_resolution_services: Vec<IndexedEndpoint>,
    /// `AssertionConsumerService` endpoints (SP).
    pub assertion_consumer_services: Vec<IndexedEndpoint>,
    /// Supported NameID formats.
    pub name_id_formats: Vec<String>,
    /// `WantAuthnRequestsSigned` (IdP).
    pub want_authn_requests_signed: bool,
    /// `WantAssertionsSigned` (SP).
    pub want_assertions_signed: bool,
}

impl RoleDescriptor {
    fn from_element(element: &Element) -> SamlResult<Self> {
        let endpoints = |name: &'static str| -> SamlResult<Vec<Endpoint>> {
            element
                .children_named(METADATA_NS, name)
                .map(Endpoint::from_element)
                .collect()
        };
        let indexed = |name: &'static str| -> SamlResult<Vec<IndexedEndpoint>> {
            element
                .children_named(METADATA_NS, name)
                .map(IndexedEndpoint::from_element)
                .collect()
        };
        let mut key_descriptors = Vec::new();
        for descriptor in element.children_named(METADATA_NS, "KeyDescriptor") {
            let key_info = descriptor.child(XMLDSIG_NS, "KeyInfo").ok_or_else(|| {
                SamlError::MissingElement("KeyDescriptor/KeyInfo".to_string())
            })?;
            key_descriptors.push(KeyDescriptor {
                key_use: KeyUse::parse(descriptor.attribute("use"))?,
                key_info: KeyInfo::from_element(key_info)?,
            });
        }
        Ok(Self {
            key_descriptors,
            single_sign_on_services: endpoints("SingleSignOnService")?,
            single_logout_services: endpoints("SingleLogoutService")?,
            artifact_resolution_services: indexed("ArtifactResolutionService")?,
            assertion_consumer_services: indexed("AssertionConsumerService")?,
            name_id_formats: element
                .children_named(METADATA_NS, "NameIDFormat")
                .map(|el| el.text().trim().to_string())
                .collect(),
            want_authn_requests_signed: optional_bool(element, "WantAuthnRequestsSigned")?
                .unwrap_or(false),
            want_assertions_signed: optional_bool(element, "WantAssertionsSigned")?
                .unwrap_or(false),
        })
    }

    /// Returns the key descriptors serving `key_use`.
    pub fn keys(&self, key_use: KeyUse) -> impl Iterator<Item = &KeyDescriptor> {
        self.key_descriptors
            .iter()
            .filter(move |descriptor| descriptor.key_use.serves(key_use))
    }

    /// Returns base64 certificates from the key descriptors serving `key_use`.
    pub fn certificates(&self, key_use: KeyUse) -> impl Iterator<Item = &str> {
        self.keys(key_use)
            .flat_map(|descriptor| descriptor.key_info.certificates())
    }

    /// Finds the first endpoint of `list` using `binding`.
    #[must_use]
    pub fn endpoint<'a>(list: &'a [Endpoint], binding: SamlBinding) -> Option<&'a Endpoint> {
        list.iter()
            .find(|endpoint| endpoint.parsed_binding() == Some(binding))
    }
}

/// `md:EntityDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity ID.
    pub entity_id: String,
    /// `validUntil`.
    pub valid_until: Option<DateTime<Utc>>,
    /// IdP role.
    pub idp: Option<RoleDescriptor>,
    /// SP role.
    pub sp: Option<RoleDescriptor>,
    /// Whether a `ds:Signature` child is present.
    pub signed: bool,
}

impl EntityDescriptor {
    /// Reads an `md:EntityDescriptor`.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, METADATA_NS, "EntityDescriptor")?;
        Ok(Self {
            entity_id: required_attribute(element, "entityID")?.to_string(),
            valid_until: optional_instant(element, "validUntil")?,
            idp: element
                .child(METADATA_NS, "IDPSSODescriptor")
                .map(RoleDescriptor::from_element)
                .transpose()?,
            sp: element
                .child(METADATA_NS, "SPSSODescriptor")
                .map(RoleDescriptor::from_element)
                .transpose()?,
            signed: element.child(XMLDSIG_NS, "Signature").is_some(),
        })
    }

    /// Reads every entity in an `md:EntitiesDescriptor` (recursively) or a
    /// single `md:EntityDescriptor`.
    pub fn parse_all(element: &Element) -> SamlResult<Vec<Self>> {
        if element.is(METADATA_NS, "EntitiesDescriptor") {
            let mut entities = Vec::new();
            for child in element.child_elements() {
                if child.is(METADATA_NS, "EntityDescriptor")
                    || child.is(METADATA_NS, "EntitiesDescriptor")
                {
                    entities.extend(Self::parse_all(child)?);
                }
            }
            Ok(entities)
        } else {
            Ok(vec![Self::from_element(element)?])
        }
    }

    /// Returns the key descriptors of every role serving `key_use`.
    pub fn keys(&self, key_use: KeyUse) -> impl Iterator<Item = &KeyDescriptor> {
        self.idp
            .iter()
            .chain(self.sp.iter())
            .flat_map(move |role| role.keys(key_use))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Document;

    const METADATA: &str = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="https://idp.example.org">
  <md:IDPSSODescriptor WantAuthnRequestsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>QUFB</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    <md:KeyDescriptor use="encryption"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>QkJC</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>
    <md:ArtifactResolutionService Binding="urn:oasis:names:tc:SAML:2.0:bindings:SOAP" Location="https://idp.example.org/ars" index="0" isDefault="true"/>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.org/slo"/>
    <md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:persistent</md:NameIDFormat>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.org/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;

    #[test]
    fn keys_filter_by_use() {
        let doc = Document::parse(METADATA).unwrap();
        let entity = EntityDescriptor::from_element(doc.root()).unwrap();
        assert_eq!(entity.entity_id, "https://idp.example.org");
        assert_eq!(entity.keys(KeyUse::Signing).count(), 1);
        assert_eq!(entity.keys(KeyUse::Encryption).count(), 1);
        assert_eq!(entity.keys(KeyUse::Unspecified).count(), 2);
        let idp = entity.idp.as_ref().unwrap();
        assert_eq!(idp.certificates(KeyUse::Signing).collect::<Vec<_>>(), ["QUFB"]);
        assert!(idp.want_authn_requests_signed);
    }

    #[test]
    fn endpoints_are_read() {
        let doc = Document::parse(METADATA).unwrap();
        let idp = EntityDescriptor::from_element(doc.root()).unwrap().idp.unwrap();
        let sso = RoleDescriptor::endpoint(&idp.single_sign_on_services, SamlBinding::HttpRedirect);
        assert_eq!(sso.map(|e| e.location.as_str()), Some("https://idp.example.org/sso"));
        assert_eq!(idp.artifact_resolution_services[0].index, 0);
        assert!(idp.artifact_resolution_services[0].is_default);
        assert_eq!(idp.name_id_formats.len(), 1);
    }

    #[test]
    fn unspecified_use_serves_both() {
        let xml = METADATA.replace(r#" use="encryption""#, "");
        let doc = Document::parse(&xml).unwrap();
        let entity = EntityDescriptor::from_element(doc.root()).unwrap();
        assert_eq!(entity.keys(KeyUse::Signing).count(), 2);
        assert_eq!(entity.keys(KeyUse::Encryption).count(), 1);
    }

    #[test]
    fn entities_descriptor_is_flattened() {
        let inner = METADATA.replacen(
            r#" xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#""#,
            "",
            1,
        );
        let xml = format!(
            r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#">{inner}</md:EntitiesDescriptor>"#
        );
        let doc = Document::parse(&xml).unwrap();
        let entities = EntityDescriptor::parse_all(doc.root()).unwrap();
        assert_eq!(entities.len(), 1);
    }
}
