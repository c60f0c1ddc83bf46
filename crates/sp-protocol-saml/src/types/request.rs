//! SP-originated requests: `AuthnRequest`, `ArtifactResolve` and
//! `NameIDMappingRequest`.

use super::{
    escape, expect_element, optional_bool, AuthnContextClass, EncryptedElement, Identifier,
    MessageHeader, NameId, NameIdPolicy, SamlBinding, SAMLP_NS, SAML_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Authentication Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnRequest {
    /// Common message fields.
    pub header: MessageHeader,
    /// Where the response should be delivered.
    pub assertion_consumer_service_url: Option<String>,
    /// Index of a metadata ACS endpoint, instead of the URL.
    pub assertion_consumer_service_index: Option<u16>,
    /// Binding for the response.
    pub protocol_binding: Option<String>,
    /// Requested identifier policy.
    pub name_id_policy: Option<NameIdPolicy>,
    /// Requested authentication context.
    pub requested_authn_context: Option<RequestedAuthnContext>,
    /// Re-authenticate even with an existing session.
    pub force_authn: bool,
    /// Do not interact with the user.
    pub is_passive: bool,
    /// Human-readable SP name.
    pub provider_name: Option<String>,
}

impl AuthnRequest {
    /// Creates a new authentication request.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            header: MessageHeader::new(issuer),
            assertion_consumer_service_url: None,
            assertion_consumer_service_index: None,
            protocol_binding: None,
            name_id_policy: None,
            requested_authn_context: None,
            force_authn: false,
            is_passive: false,
            provider_name: None,
        }
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.header.destination = Some(url.into());
        self
    }

    /// Sets the response binding.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    /// Sets the requested authentication context.
    #[must_use]
    pub fn with_authn_context(mut self, context: RequestedAuthnContext) -> Self {
        self.requested_authn_context = Some(context);
        self
    }

    /// Sets `ForceAuthn`.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets `IsPassive`.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Returns the parsed response binding.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        self.protocol_binding
            .as_deref()
            .and_then(SamlBinding::from_uri)
    }

    /// Reads a `samlp:AuthnRequest` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "AuthnRequest")?;
        let index = element
            .attribute("AssertionConsumerServiceIndex")
            .map(|value| {
                value.trim().parse::<u16>().map_err(|_| {
                    SamlError::SchemaViolation(format!(
                        "AssertionConsumerServiceIndex is not an unsigned short: '{value}'"
                    ))
                })
            })
            .transpose()?;
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            assertion_consumer_service_url: element
                .attribute("AssertionConsumerServiceURL")
                .map(str::to_string),
            assertion_consumer_service_index: index,
            protocol_binding: element.attribute("ProtocolBinding").map(str::to_string),
            name_id_policy: element
                .child(SAMLP_NS, "NameIDPolicy")
                .map(NameIdPolicy::from_element)
                .transpose()?,
            requested_authn_context: element
                .child(SAMLP_NS, "RequestedAuthnContext")
                .map(RequestedAuthnContext::from_element),
            force_authn: optional_bool(element, "ForceAuthn")?.unwrap_or(false),
            is_passive: optional_bool(element, "IsPassive")?.unwrap_or(false),
            provider_name: element.attribute("ProviderName").map(str::to_string),
        })
    }

    /// Serializes the request.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let index = self.assertion_consumer_service_index.map(|i| i.to_string());
        let mut out = self.header.open(
            "AuthnRequest",
            &[
                (
                    "AssertionConsumerServiceURL",
                    self.assertion_consumer_service_url.as_deref(),
                ),
                ("AssertionConsumerServiceIndex", index.as_deref()),
                ("ProtocolBinding", self.protocol_binding.as_deref()),
                ("ForceAuthn", self.force_authn.then_some("true")),
                ("IsPassive", self.is_passive.then_some("true")),
                ("ProviderName", self.provider_name.as_deref()),
            ],
        );
        if let Some(policy) = &self.name_id_policy {
            out.push_str(&policy.to_xml());
        }
        if let Some(context) = &self.requested_authn_context {
            out.push_str(&context.to_xml());
        }
        out.push_str("</samlp:AuthnRequest>");
        out
    }
}

/// Authentication context comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthnContextComparison {
    /// Exactly one of the listed classes.
    #[default]
    Exact,
    /// At least as strong as one of the listed classes.
    Minimum,
    /// At most as strong as one of the listed classes.
    Maximum,
    /// Stronger than any of the listed classes.
    Better,
}

impl AuthnContextComparison {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Better => "better",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "minimum" => Self::Minimum,
            "maximum" => Self::Maximum,
            "better" => Self::Better,
            _ => Self::Exact,
        }
    }
}

/// Requested authentication context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedAuthnContext {
    /// Requested class references.
    pub class_refs: Vec<String>,
    /// Comparison method.
    pub comparison: AuthnContextComparison,
}

impl RequestedAuthnContext {
    /// Requests exactly `class`.
    #[must_use]
    pub fn exact(class: AuthnContextClass) -> Self {
        Self {
            class_refs: vec![class.uri().to_string()],
            comparison: AuthnContextComparison::Exact,
        }
    }

    fn from_element(element: &Element) -> Self {
        Self {
            class_refs: element
                .children_named(SAML_NS, "AuthnContextClassRef")
                .map(|el| el.text().trim().to_string())
                .collect(),
            comparison: element
                .attribute("Comparison")
                .map(AuthnContextComparison::parse)
                .unwrap_or_default(),
        }
    }

    fn to_xml(&self) -> String {
        let mut out = format!(
            "<samlp:RequestedAuthnContext Comparison=\"{}\">",
            self.comparison.as_str()
        );
        for class in &self.class_refs {
            out.push_str(&format!(
                "<saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef>",
                escape(class)
            ));
        }
        out.push_str("</samlp:RequestedAuthnContext>");
        out
    }
}

/// Artifact resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactResolve {
    /// Common message fields.
    pub header: MessageHeader,
    /// Base64 artifact to resolve.
    pub artifact: String,
}

impl ArtifactResolve {
    /// Creates a request resolving `artifact`.
    #[must_use]
    pub fn new(issuer: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            header: MessageHeader::new(issuer),
            artifact: artifact.into(),
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.header.destination = Some(url.into());
        self
    }

    /// Reads a `samlp:ArtifactResolve` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "ArtifactResolve")?;
        let artifact = element
            .child(SAMLP_NS, "Artifact")
            .ok_or_else(|| SamlError::MissingElement("ArtifactResolve/Artifact".to_string()))?;
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            artifact: artifact.text().trim().to_string(),
        })
    }

    /// Serializes the request.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = self.header.open("ArtifactResolve", &[]);
        out.push_str(&format!(
            "<samlp:Artifact>{}</samlp:Artifact></samlp:ArtifactResolve>",
            escape(&self.artifact)
        ));
        out
    }
}

/// Name identifier mapping request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameIdMappingRequest {
    /// Common message fields.
    pub header: MessageHeader,
    /// Identifier to map.
    pub identifier: Option<Identifier>,
    /// Policy for the mapped identifier.
    pub name_id_policy: Option<NameIdPolicy>,
}

impl NameIdMappingRequest {
    /// Reads a `samlp:NameIDMappingRequest` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAMLP_NS, "NameIDMappingRequest")?;
        let identifier = if let Some(name_id) = element.child(SAML_NS, "NameID") {
            Some(Identifier::NameId(NameId::from_element(name_id)?))
        } else {
            element
                .child(SAML_NS, "EncryptedID")
                .map(|el| EncryptedElement::from_element(el).map(Identifier::EncryptedId))
                .transpose()?
        };
        Ok(Self {
            header: MessageHeader::from_element(element)?,
            identifier,
            name_id_policy: element
                .child(SAMLP_NS, "NameIDPolicy")
                .map(NameIdPolicy::from_element)
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameIdFormat;
    use crate::xml::Document;

    #[test]
    fn authn_request_reads_back() {
        let request = AuthnRequest::new("https://sp.example.org")
            .with_acs_url("https://sp.example.org/acs")
            .with_destination("https://idp.example.org/sso")
            .with_binding(SamlBinding::HttpPost)
            .with_name_id_policy(NameIdPolicy::new(NameIdFormat::Persistent.uri()).allow_create(true))
            .with_authn_context(RequestedAuthnContext::exact(
                AuthnContextClass::PasswordProtectedTransport,
            ))
            .force_authn(true);
        let doc = Document::parse(&request.to_xml()).unwrap();
        let parsed = AuthnRequest::from_element(doc.root()).unwrap();
        assert_eq!(parsed.header.id, request.header.id);
        assert_eq!(parsed.parsed_binding(), Some(SamlBinding::HttpPost));
        assert!(parsed.force_authn);
        assert!(!parsed.is_passive);
        assert_eq!(parsed.name_id_policy, request.name_id_policy);
        assert_eq!(parsed.requested_authn_context, request.requested_authn_context);
    }

    #[test]
    fn artifact_resolve_reads_back() {
        let resolve = ArtifactResolve::new("https://sp.example.org", "AAQAAA==");
        let doc = Document::parse(&resolve.to_xml()).unwrap();
        let parsed = ArtifactResolve::from_element(doc.root()).unwrap();
        assert_eq!(parsed.artifact, "AAQAAA==");
        assert_eq!(parsed.header.issuer_value(), Some("https://sp.example.org"));
    }

    #[test]
    fn artifact_is_required() {
        let doc = Document::parse(&format!(
            r#"<samlp:ArtifactResolve xmlns:samlp="{SAMLP_NS}" ID="_a" Version="2.0" IssueInstant="2024-03-01T12:00:00Z"/>"#
        ))
        .unwrap();
        assert!(ArtifactResolve::from_element(doc.root()).is_err());
    }
}
