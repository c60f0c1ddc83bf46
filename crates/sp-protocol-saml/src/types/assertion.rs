//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use chrono::{DateTime, Utc};

use super::{
    escape, expect_element, format_instant, issuer_of, optional_instant, parse_instant,
    push_attribute, required_attribute, EncryptedElement, Issuer, KeyInfo, NameId, SAML_NS,
    XMLDSIG_NS, XSI_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::{Attribute as XmlAttribute, Element};

/// SAML Assertion.
///
/// A package of information that supplies one or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,
    /// Version of the SAML protocol (always "2.0").
    pub version: String,
    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,
    /// The identity provider that issued this assertion.
    pub issuer: Issuer,
    /// Whether a `ds:Signature` child is present. Says nothing about validity.
    pub signed: bool,
    /// The subject of this assertion.
    pub subject: Option<Subject>,
    /// Conditions that must be evaluated for the assertion to be valid.
    pub conditions: Option<Conditions>,
    /// Statements in document order.
    pub statements: Vec<Statement>,
}

impl Assertion {
    /// Creates a new assertion issued now.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            version: "2.0".to_string(),
            issue_instant: Utc::now(),
            issuer: NameId::new(issuer),
            signed: false,
            subject: None,
            conditions: None,
            statements: Vec::new(),
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Appends a statement.
    #[must_use]
    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Iterates over attributes of all attribute statements, skipping
    /// encrypted ones.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.statements
            .iter()
            .filter_map(|statement| match statement {
                Statement::Attribute(statement) => Some(statement),
                _ => None,
            })
            .flat_map(|statement| statement.items.iter())
            .filter_map(|item| match item {
                AttributeItem::Attribute(attribute) => Some(attribute),
                AttributeItem::EncryptedAttribute(_) => None,
            })
    }

    /// Returns the first authentication statement.
    #[must_use]
    pub fn authn_statement(&self) -> Option<&AuthnStatement> {
        self.statements.iter().find_map(|statement| match statement {
            Statement::Authn(authn) => Some(authn),
            _ => None,
        })
    }

    /// Reads a `saml:Assertion` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        expect_element(element, SAML_NS, "Assertion")?;
        let issue_instant = required_attribute(element, "IssueInstant")?;

        let mut statements = Vec::new();
        for child in element.child_elements() {
            if child.namespace.as_deref() != Some(SAML_NS) {
                continue;
            }
            let statement = match child.local_name.as_str() {
                "AuthnStatement" => Statement::Authn(AuthnStatement::from_element(child)?),
                "AttributeStatement" => {
                    Statement::Attribute(AttributeStatement::from_element(child)?)
                }
                "AuthzDecisionStatement" | "Statement" => {
                    Statement::Other(child.qualified_name())
                }
                _ => continue,
            };
            statements.push(statement);
        }

        Ok(Self {
            id: required_attribute(element, "ID")?.to_string(),
            version: required_attribute(element, "Version")?.to_string(),
            issue_instant: parse_instant("Assertion/@IssueInstant", issue_instant)?,
            issuer: issuer_of(element)?
                .ok_or_else(|| SamlError::MissingElement("Assertion/Issuer".to_string()))?,
            signed: element.child(XMLDSIG_NS, "Signature").is_some(),
            subject: element
                .child(SAML_NS, "Subject")
                .map(Subject::from_element)
                .transpose()?,
            conditions: element
                .child(SAML_NS, "Conditions")
                .map(Conditions::from_element)
                .transpose()?,
            statements,
        })
    }

    /// Writes the assertion with its own `saml` declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = format!("<saml:Assertion xmlns:saml=\"{SAML_NS}\"");
        push_attribute(&mut out, "ID", Some(&self.id));
        push_attribute(&mut out, "Version", Some(&self.version));
        push_attribute(&mut out, "IssueInstant", Some(&format_instant(&self.issue_instant)));
        out.push('>');
        out.push_str(&self.issuer.to_xml("Issuer"));
        if let Some(subject) = &self.subject {
            out.push_str(&subject.to_xml());
        }
        if let Some(conditions) = &self.conditions {
            out.push_str(&conditions.to_xml());
        }
        for statement in &self.statements {
            match statement {
                Statement::Authn(authn) => out.push_str(&authn.to_xml()),
                Statement::Attribute(attributes) => out.push_str(&attributes.to_xml()),
                Statement::Other(_) => {}
            }
        }
        out.push_str("</saml:Assertion>");
        out
    }
}

/// An identifier that may appear in place of a plain `NameID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// `saml:NameID`.
    NameId(NameId),
    /// `saml:EncryptedID`.
    EncryptedId(EncryptedElement),
}

impl Identifier {
    fn from_child(child: &Element) -> SamlResult<Option<Self>> {
        if child.is(SAML_NS, "NameID") {
            Ok(Some(Self::NameId(NameId::from_element(child)?)))
        } else if child.is(SAML_NS, "EncryptedID") {
            Ok(Some(Self::EncryptedId(EncryptedElement::from_element(child)?)))
        } else {
            Ok(None)
        }
    }

    fn to_xml(&self) -> String {
        match self {
            Self::NameId(name_id) => name_id.to_xml("NameID"),
            Self::EncryptedId(encrypted) => encrypted.to_xml("EncryptedID"),
        }
    }
}

/// One child of `saml:Subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectItem {
    /// `saml:NameID`.
    NameId(NameId),
    /// `saml:EncryptedID`.
    EncryptedId(EncryptedElement),
    /// `saml:SubjectConfirmation`.
    SubjectConfirmation(SubjectConfirmation),
}

/// Subject of an assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    /// Children in document order.
    pub items: Vec<SubjectItem>,
}

impl Subject {
    /// Creates a subject identified by `name_id`.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            items: vec![SubjectItem::NameId(name_id)],
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.items.push(SubjectItem::SubjectConfirmation(confirmation));
        self
    }

    /// Returns the plain `NameID`, if any.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        self.items.iter().find_map(|item| match item {
            SubjectItem::NameId(name_id) => Some(name_id),
            _ => None,
        })
    }

    /// Iterates over subject confirmations.
    pub fn confirmations(&self) -> impl Iterator<Item = &SubjectConfirmation> {
        self.items.iter().filter_map(|item| match item {
            SubjectItem::SubjectConfirmation(confirmation) => Some(confirmation),
            _ => None,
        })
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let mut items = Vec::new();
        for child in element.child_elements() {
            if let Some(identifier) = Identifier::from_child(child)? {
                items.push(match identifier {
                    Identifier::NameId(name_id) => SubjectItem::NameId(name_id),
                    Identifier::EncryptedId(encrypted) => SubjectItem::EncryptedId(encrypted),
                });
            } else if child.is(SAML_NS, "SubjectConfirmation") {
                items.push(SubjectItem::SubjectConfirmation(
                    SubjectConfirmation::from_element(child)?,
                ));
            }
        }
        Ok(Self { items })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<saml:Subject>");
        for item in &self.items {
            match item {
                SubjectItem::NameId(name_id) => out.push_str(&name_id.to_xml("NameID")),
                SubjectItem::EncryptedId(encrypted) => {
                    out.push_str(&encrypted.to_xml("EncryptedID"));
                }
                SubjectItem::SubjectConfirmation(confirmation) => {
                    out.push_str(&confirmation.to_xml());
                }
            }
        }
        out.push_str("</saml:Subject>");
        out
    }
}

/// Subject confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectConfirmation {
    /// The confirmation method URI.
    pub method: String,
    /// Identifier of the confirming entity.
    pub identifier: Option<Identifier>,
    /// Additional confirmation data.
    pub data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a confirmation with the given method.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            identifier: None,
            data: None,
        }
    }

    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer(data: SubjectConfirmationData) -> Self {
        Self {
            data: Some(data),
            ..Self::new(super::confirmation_methods::BEARER)
        }
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let mut identifier = None;
        for child in element.child_elements() {
            if let Some(found) = Identifier::from_child(child)? {
                identifier = Some(found);
                break;
            }
        }
        Ok(Self {
            method: element.attribute("Method").unwrap_or_default().to_string(),
            identifier,
            data: element
                .child(SAML_NS, "SubjectConfirmationData")
                .map(SubjectConfirmationData::from_element)
                .transpose()?,
        })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<saml:SubjectConfirmation");
        push_attribute(&mut out, "Method", Some(&self.method));
        out.push('>');
        if let Some(identifier) = &self.identifier {
            out.push_str(&identifier.to_xml());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_xml());
        }
        out.push_str("</saml:SubjectConfirmation>");
        out
    }
}

const CONFIRMATION_DATA_ATTRIBUTES: [&str; 5] =
    ["NotBefore", "NotOnOrAfter", "Recipient", "InResponseTo", "Address"];

/// Subject confirmation data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectConfirmationData {
    /// Start of the confirmation window.
    pub not_before: Option<DateTime<Utc>>,
    /// End of the confirmation window, exclusive.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Endpoint the assertion may be delivered to.
    pub recipient: Option<String>,
    /// ID of the request this confirms.
    pub in_response_to: Option<String>,
    /// Network address of the attesting entity.
    pub address: Option<String>,
    /// `ds:KeyInfo` children.
    pub key_infos: Vec<KeyInfo>,
    /// `xsi:type` is `saml:KeyInfoConfirmationDataType`.
    pub key_info_confirmation: bool,
    /// Attributes outside the schema-defined set.
    pub extension_attributes: Vec<XmlAttribute>,
}

impl SubjectConfirmationData {
    fn from_element(element: &Element) -> SamlResult<Self> {
        let key_info_confirmation = element
            .attribute_ns(XSI_NS, "type")
            .map(|value| element.resolve_qname(value))
            .is_some_and(|(ns, local)| {
                ns == Some(SAML_NS) && local == "KeyInfoConfirmationDataType"
            });
        Ok(Self {
            not_before: optional_instant(element, "NotBefore")?,
            not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
            recipient: element.attribute("Recipient").map(str::to_string),
            in_response_to: element.attribute("InResponseTo").map(str::to_string),
            address: element.attribute("Address").map(str::to_string),
            key_infos: element
                .children_named(XMLDSIG_NS, "KeyInfo")
                .map(KeyInfo::from_element)
                .collect::<SamlResult<_>>()?,
            key_info_confirmation,
            extension_attributes: element
                .attributes
                .iter()
                .filter(|attr| {
                    attr.namespace.is_some()
                        || !CONFIRMATION_DATA_ATTRIBUTES.contains(&attr.local_name.as_str())
                })
                .filter(|attr| {
                    !(attr.namespace.as_deref() == Some(XSI_NS) && attr.local_name == "type")
                })
                .cloned()
                .collect(),
        })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<saml:SubjectConfirmationData");
        if self.key_info_confirmation {
            out.push_str(&format!(
                " xmlns:xsi=\"{XSI_NS}\" xsi:type=\"saml:KeyInfoConfirmationDataType\""
            ));
        }
        push_attribute(&mut out, "NotBefore", self.not_before.as_ref().map(format_instant).as_deref());
        push_attribute(
            &mut out,
            "NotOnOrAfter",
            self.not_on_or_after.as_ref().map(format_instant).as_deref(),
        );
        push_attribute(&mut out, "Recipient", self.recipient.as_deref());
        push_attribute(&mut out, "InResponseTo", self.in_response_to.as_deref());
        push_attribute(&mut out, "Address", self.address.as_deref());
        push_extension_attributes(&mut out, &self.extension_attributes);
        out.push('>');
        for key_info in &self.key_infos {
            out.push_str(&key_info.to_xml());
        }
        out.push_str("</saml:SubjectConfirmationData>");
        out
    }
}

/// Writes extension attributes, declaring a prefix for each namespace.
fn push_extension_attributes(out: &mut String, attributes: &[XmlAttribute]) {
    for (i, attr) in attributes.iter().enumerate() {
        match &attr.namespace {
            Some(namespace) => {
                out.push_str(&format!(" xmlns:ext{i}=\"{}\"", escape(namespace)));
                push_attribute(out, &format!("ext{i}:{}", attr.local_name), Some(&attr.value));
            }
            None => push_attribute(out, &attr.local_name, Some(&attr.value)),
        }
    }
}

/// One condition inside `saml:Conditions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `saml:AudienceRestriction`.
    AudienceRestriction(Vec<String>),
    /// `saml:OneTimeUse`.
    OneTimeUse,
    /// `saml:ProxyRestriction`.
    ProxyRestriction {
        /// Maximum number of indirections.
        count: Option<u32>,
        /// Audiences allowed to receive derived assertions.
        audiences: Vec<String>,
    },
    /// An extension condition, by qualified name.
    Other(String),
}

/// Conditions that must be evaluated for the assertion to be valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions {
    /// Start of the validity window.
    pub not_before: Option<DateTime<Utc>>,
    /// End of the validity window, exclusive.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Conditions in document order.
    pub items: Vec<Condition>,
}

impl Conditions {
    /// Creates conditions with a validity window.
    #[must_use]
    pub fn new(not_before: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> Self {
        Self {
            not_before: Some(not_before),
            not_on_or_after: Some(not_on_or_after),
            items: Vec::new(),
        }
    }

    /// Adds an audience restriction with one audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.items.push(Condition::AudienceRestriction(vec![audience.into()]));
        self
    }

    /// Iterates over audience restrictions.
    pub fn audience_restrictions(&self) -> impl Iterator<Item = &[String]> {
        self.items.iter().filter_map(|item| match item {
            Condition::AudienceRestriction(audiences) => Some(audiences.as_slice()),
            _ => None,
        })
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let audiences = |el: &Element| -> Vec<String> {
            el.children_named(SAML_NS, "Audience")
                .map(|a| a.text().trim().to_string())
                .collect()
        };
        let mut items = Vec::new();
        for child in element.child_elements() {
            let item = if child.is(SAML_NS, "AudienceRestriction") {
                Condition::AudienceRestriction(audiences(child))
            } else if child.is(SAML_NS, "OneTimeUse") {
                Condition::OneTimeUse
            } else if child.is(SAML_NS, "ProxyRestriction") {
                let count = child
                    .attribute("Count")
                    .map(|value| {
                        value.trim().parse::<u32>().map_err(|_| {
                            SamlError::SchemaViolation(format!(
                                "ProxyRestriction/@Count is not a non-negative integer: '{value}'"
                            ))
                        })
                    })
                    .transpose()?;
                Condition::ProxyRestriction {
                    count,
                    audiences: audiences(child),
                }
            } else {
                Condition::Other(child.qualified_name())
            };
            items.push(item);
        }
        Ok(Self {
            not_before: optional_instant(element, "NotBefore")?,
            not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
            items,
        })
    }

    fn to_xml(&self) -> String {
        let audiences = |list: &[String]| -> String {
            list.iter()
                .map(|a| format!("<saml:Audience>{}</saml:Audience>", escape(a)))
                .collect()
        };
        let mut out = String::from("<saml:Conditions");
        push_attribute(&mut out, "NotBefore", self.not_before.as_ref().map(format_instant).as_deref());
        push_attribute(
            &mut out,
            "NotOnOrAfter",
            self.not_on_or_after.as_ref().map(format_instant).as_deref(),
        );
        out.push('>');
        for item in &self.items {
            match item {
                Condition::AudienceRestriction(list) => out.push_str(&format!(
                    "<saml:AudienceRestriction>{}</saml:AudienceRestriction>",
                    audiences(list)
                )),
                Condition::OneTimeUse => out.push_str("<saml:OneTimeUse/>"),
                Condition::ProxyRestriction { count, audiences: list } => {
                    out.push_str("<saml:ProxyRestriction");
                    push_attribute(&mut out, "Count", count.map(|c| c.to_string()).as_deref());
                    out.push('>');
                    out.push_str(&audiences(list));
                    out.push_str("</saml:ProxyRestriction>");
                }
                Condition::Other(_) => {}
            }
        }
        out.push_str("</saml:Conditions>");
        out
    }
}

/// A statement inside an assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `saml:AuthnStatement`.
    Authn(AuthnStatement),
    /// `saml:AttributeStatement`.
    Attribute(AttributeStatement),
    /// Authorization decision or extension statement, by qualified name.
    Other(String),
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    /// When the subject authenticated.
    pub authn_instant: DateTime<Utc>,
    /// Session index at the identity provider.
    pub session_index: Option<String>,
    /// End of the identity provider session.
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    /// `AuthnContext/AuthnContextClassRef`.
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    /// Creates a statement for an authentication at `instant`.
    #[must_use]
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            authn_instant: instant,
            session_index: None,
            session_not_on_or_after: None,
            authn_context_class_ref: None,
        }
    }

    /// Sets the session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_index = Some(index.into());
        self
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let instant = required_attribute(element, "AuthnInstant")?;
        Ok(Self {
            authn_instant: parse_instant("AuthnStatement/@AuthnInstant", instant)?,
            session_index: element.attribute("SessionIndex").map(str::to_string),
            session_not_on_or_after: optional_instant(element, "SessionNotOnOrAfter")?,
            authn_context_class_ref: element
                .child(SAML_NS, "AuthnContext")
                .and_then(|ctx| ctx.child(SAML_NS, "AuthnContextClassRef"))
                .map(|class| class.text().trim().to_string()),
        })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<saml:AuthnStatement");
        push_attribute(&mut out, "AuthnInstant", Some(&format_instant(&self.authn_instant)));
        push_attribute(&mut out, "SessionIndex", self.session_index.as_deref());
        push_attribute(
            &mut out,
            "SessionNotOnOrAfter",
            self.session_not_on_or_after.as_ref().map(format_instant).as_deref(),
        );
        out.push_str("><saml:AuthnContext>");
        if let Some(class) = &self.authn_context_class_ref {
            out.push_str(&format!(
                "<saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef>",
                escape(class)
            ));
        }
        out.push_str("</saml:AuthnContext></saml:AuthnStatement>");
        out
    }
}

/// One child of an attribute statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeItem {
    /// `saml:Attribute`.
    Attribute(Attribute),
    /// `saml:EncryptedAttribute`.
    EncryptedAttribute(EncryptedElement),
}

/// Attribute statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeStatement {
    /// Children in document order.
    pub items: Vec<AttributeItem>,
}

impl AttributeStatement {
    /// Creates an empty statement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.items.push(AttributeItem::Attribute(attribute));
        self
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let mut items = Vec::new();
        for child in element.child_elements() {
            if child.is(SAML_NS, "Attribute") {
                items.push(AttributeItem::Attribute(Attribute::from_element(child)?));
            } else if child.is(SAML_NS, "EncryptedAttribute") {
                items.push(AttributeItem::EncryptedAttribute(
                    EncryptedElement::from_element(child)?,
                ));
            }
        }
        Ok(Self { items })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<saml:AttributeStatement>");
        for item in &self.items {
            match item {
                AttributeItem::Attribute(attribute) => out.push_str(&attribute.to_xml()),
                AttributeItem::EncryptedAttribute(encrypted) => {
                    out.push_str(&encrypted.to_xml("EncryptedAttribute"));
                }
            }
        }
        out.push_str("</saml:AttributeStatement>");
        out
    }
}

const ATTRIBUTE_ATTRIBUTES: [&str; 3] = ["Name", "NameFormat", "FriendlyName"];

/// A SAML attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Name format URI.
    pub name_format: Option<String>,
    /// Human-readable name.
    pub friendly_name: Option<String>,
    /// Values in document order; `None` for `xsi:nil="true"`.
    pub values: Vec<Option<String>>,
    /// Attributes outside the schema-defined set.
    pub extension_attributes: Vec<XmlAttribute>,
}

impl Attribute {
    /// Creates an attribute with string values.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
            values: values.into_iter().map(|v| Some(v.into())).collect(),
            extension_attributes: Vec::new(),
        }
    }

    pub(crate) fn from_element(element: &Element) -> SamlResult<Self> {
        let mut values = Vec::new();
        for value in element.children_named(SAML_NS, "AttributeValue") {
            let nil = matches!(value.attribute_ns(XSI_NS, "nil").map(str::trim), Some("true" | "1"));
            values.push(if nil { None } else { Some(value.text()) });
        }
        Ok(Self {
            name: element.attribute("Name").unwrap_or_default().to_string(),
            name_format: element.attribute("NameFormat").map(str::to_string),
            friendly_name: element.attribute("FriendlyName").map(str::to_string),
            values,
            extension_attributes: element
                .attributes
                .iter()
                .filter(|attr| {
                    attr.namespace.is_some()
                        || !ATTRIBUTE_ATTRIBUTES.contains(&attr.local_name.as_str())
                })
                .cloned()
                .collect(),
        })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<saml:Attribute");
        push_attribute(&mut out, "Name", Some(&self.name));
        push_attribute(&mut out, "NameFormat", self.name_format.as_deref());
        push_attribute(&mut out, "FriendlyName", self.friendly_name.as_deref());
        push_extension_attributes(&mut out, &self.extension_attributes);
        out.push('>');
        for value in &self.values {
            match value {
                Some(value) => out.push_str(&format!(
                    "<saml:AttributeValue>{}</saml:AttributeValue>",
                    escape(value)
                )),
                None => out.push_str(&format!(
                    "<saml:AttributeValue xmlns:xsi=\"{XSI_NS}\" xsi:nil=\"true\"/>"
                )),
            }
        }
        out.push_str("</saml:Attribute>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::confirmation_methods;
    use crate::xml::Document;
    use chrono::TimeZone;

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" ID="_a1" Version="2.0" IssueInstant="2024-03-01T12:00:00Z">
  <saml:Issuer>https://idp.example.org</saml:Issuer>
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:transient">_t1</saml:NameID>
    <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
      <saml:SubjectConfirmationData xmlns:ext="urn:ext" NotOnOrAfter="2024-03-01T12:05:00Z" Recipient="https://sp.example.org/acs" InResponseTo="_req" ext:hint="x"/>
    </saml:SubjectConfirmation>
  </saml:Subject>
  <saml:Conditions NotBefore="2024-03-01T11:59:00Z" NotOnOrAfter="2024-03-01T12:05:00Z">
    <saml:AudienceRestriction><saml:Audience>https://sp.example.org</saml:Audience></saml:AudienceRestriction>
    <saml:OneTimeUse/>
    <saml:ProxyRestriction Count="2"/>
  </saml:Conditions>
  <saml:AuthnStatement AuthnInstant="2024-03-01T11:59:30Z" SessionIndex="s1">
    <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></saml:AuthnContext>
  </saml:AuthnStatement>
  <saml:AttributeStatement>
    <saml:Attribute Name="mail"><saml:AttributeValue>a@example.org</saml:AttributeValue><saml:AttributeValue>b@example.org</saml:AttributeValue></saml:Attribute>
    <saml:Attribute Name="empty"><saml:AttributeValue xsi:nil="true"/></saml:Attribute>
  </saml:AttributeStatement>
</saml:Assertion>"#;

    #[test]
    fn parses_full_assertion() {
        let doc = Document::parse(ASSERTION).unwrap();
        let assertion = Assertion::from_element(doc.root()).unwrap();
        assert_eq!(assertion.id, "_a1");
        assert_eq!(assertion.issuer.value, "https://idp.example.org");
        assert!(!assertion.signed);

        let subject = assertion.subject.as_ref().unwrap();
        assert_eq!(subject.name_id().unwrap().value, "_t1");
        let confirmation = subject.confirmations().next().unwrap();
        assert_eq!(confirmation.method, confirmation_methods::BEARER);
        let data = confirmation.data.as_ref().unwrap();
        assert_eq!(data.recipient.as_deref(), Some("https://sp.example.org/acs"));
        assert_eq!(data.in_response_to.as_deref(), Some("_req"));
        assert_eq!(data.extension_attributes.len(), 1);
        assert_eq!(data.extension_attributes[0].namespace.as_deref(), Some("urn:ext"));

        let conditions = assertion.conditions.as_ref().unwrap();
        assert_eq!(
            conditions.audience_restrictions().next().unwrap(),
            ["https://sp.example.org".to_string()]
        );
        assert!(conditions.items.contains(&Condition::OneTimeUse));
        assert!(conditions.items.contains(&Condition::ProxyRestriction {
            count: Some(2),
            audiences: Vec::new()
        }));

        let authn = assertion.authn_statement().unwrap();
        assert_eq!(authn.session_index.as_deref(), Some("s1"));
        let attributes: Vec<_> = assertion.attributes().collect();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].values.len(), 2);
        assert_eq!(attributes[1].values, vec![None]);
    }

    #[test]
    fn issuer_is_required() {
        let doc = Document::parse(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a" Version="2.0" IssueInstant="2024-03-01T12:00:00Z"/>"#,
        )
        .unwrap();
        assert!(matches!(
            Assertion::from_element(doc.root()),
            Err(SamlError::MissingElement(_))
        ));
    }

    #[test]
    fn bad_timestamp_is_a_schema_error() {
        let doc = Document::parse(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a" Version="2.0" IssueInstant="soon"><saml:Issuer>x</saml:Issuer></saml:Assertion>"#,
        )
        .unwrap();
        assert!(matches!(
            Assertion::from_element(doc.root()),
            Err(SamlError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn built_assertion_reads_back() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut assertion = Assertion::new("https://idp.example.org")
            .with_subject(Subject::new(NameId::persistent("p-1")).with_confirmation(
                SubjectConfirmation::bearer(SubjectConfirmationData {
                    not_on_or_after: Some(now + chrono::Duration::minutes(5)),
                    recipient: Some("https://sp.example.org/acs".to_string()),
                    ..SubjectConfirmationData::default()
                }),
            ))
            .with_conditions(
                Conditions::new(now, now + chrono::Duration::minutes(5))
                    .with_audience("https://sp.example.org"),
            )
            .with_statement(Statement::Authn(AuthnStatement::new(now).with_session_index("s")))
            .with_statement(Statement::Attribute(
                AttributeStatement::new().with_attribute(Attribute::new("role", ["a", "b"])),
            ));
        assertion.issue_instant = now;

        let doc = Document::parse(&assertion.to_xml()).unwrap();
        assert_eq!(Assertion::from_element(doc.root()).unwrap(), assertion);
    }
}
