//! Namespace-aware DOM built from `quick-xml` events.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

/// Namespace bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

const ID_ATTRIBUTES: [&str; 3] = ["ID", "Id", "AssertionID"];

/// Options for [`Document::parse_with`].
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Keep whitespace-only text nodes. Required for signature checks.
    pub preserve_whitespace: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            preserve_whitespace: true,
        }
    }
}

/// A namespace binding; `prefix` is `None` for the default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Bound prefix.
    pub prefix: Option<String>,
    /// Namespace URI; empty only for a default-namespace undeclaration.
    pub uri: String,
}

/// A non-namespace-declaration attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Normalized, unescaped value.
    pub value: String,
}

impl Attribute {
    /// Returns the name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified(self.prefix.as_deref(), &self.local_name)
    }
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Element.
    Element(Element),
    /// Character data, CDATA sections folded in.
    Text(String),
    /// Comment body.
    Comment(String),
    /// Processing instruction.
    ProcessingInstruction {
        /// PI target.
        target: String,
        /// PI data, may be empty.
        data: String,
    },
}

/// An element with its resolved namespace context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Attributes in document order.
    pub attributes: Vec<Attribute>,
    /// Namespace declarations written on this element.
    pub declarations: Vec<Namespace>,
    /// All namespaces in scope at this element.
    pub in_scope: Vec<Namespace>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Returns the name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified(self.prefix.as_deref(), &self.local_name)
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns an unqualified attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns a namespace-qualified attribute value.
    #[must_use]
    pub fn attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns the value of the first ID-typed attribute (`ID`, `Id`, `AssertionID`).
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        ID_ATTRIBUTES.iter().find_map(|name| self.attribute(name))
    }

    /// Iterates over child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.is(namespace, local_name))
    }

    /// Iterates over child elements with the given name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements()
            .filter(move |el| el.is(namespace, local_name))
    }

    /// Returns the concatenated direct text content.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Resolves a prefix against the in-scope namespaces.
    #[must_use]
    pub fn lookup_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        self.in_scope
            .iter()
            .find(|ns| ns.prefix.as_deref() == prefix)
            .map(|ns| ns.uri.as_str())
    }

    /// Resolves a QName-valued attribute or text such as `xsi:type="saml:KeyInfoConfirmationDataType"`.
    #[must_use]
    pub fn resolve_qname<'v>(&self, value: &'v str) -> (Option<&str>, &'v str) {
        let (prefix, local) = split_qname(value.trim());
        (self.lookup_namespace(prefix), local)
    }

    /// Collects this element and all descendant elements in document order.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a Element>) {
        out.push(self);
        for child in self.child_elements() {
            child.collect_descendants(out);
        }
    }

    /// Returns the element with the given ID in this subtree.
    pub(crate) fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.id() == Some(id) {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Element(el) = child {
                if let Some(found) = el.find_by_id_mut(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Serializes the element with its declarations as written.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    /// Serializes the element so it parses on its own: every namespace in
    /// scope is declared on the element itself.
    #[must_use]
    pub fn to_standalone_xml(&self) -> String {
        let mut standalone = self.clone();
        let mut declarations = self.in_scope.clone();
        declarations.extend(
            self.declarations
                .iter()
                .filter(|ns| ns.prefix.is_none() && ns.uri.is_empty())
                .cloned(),
        );
        standalone.declarations = declarations;
        standalone.to_xml()
    }

    fn write_xml(&self, out: &mut String) {
        let name = self.qualified_name();
        out.push('<');
        out.push_str(&name);
        for ns in &self.declarations {
            match &ns.prefix {
                Some(prefix) => out.push_str(&format!(" xmlns:{prefix}=\"")),
                None => out.push_str(" xmlns=\""),
            }
            escape_attribute(&ns.uri, out);
            out.push('"');
        }
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.qualified_name());
            out.push_str("=\"");
            escape_attribute(&attr.value, out);
            out.push('"');
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(el) => el.write_xml(out),
                Node::Text(text) => escape_text(text, out),
                Node::Comment(body) => {
                    out.push_str("<!--");
                    out.push_str(body);
                    out.push_str("-->");
                }
                Node::ProcessingInstruction { target, data } => {
                    out.push_str("<?");
                    out.push_str(target);
                    if !data.is_empty() {
                        out.push(' ');
                        out.push_str(data);
                    }
                    out.push_str("?>");
                }
            }
        }
        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }

    fn strip_whitespace_text(&mut self) {
        self.children.retain(|node| match node {
            Node::Text(text) => !text.chars().all(char::is_whitespace),
            _ => true,
        });
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.strip_whitespace_text();
            }
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
    preserve_whitespace: bool,
}

impl Document {
    /// Parses a document, preserving whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed XML, unbound prefixes or
    /// any DOCTYPE declaration.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        Self::parse_with(xml, ParseOptions::default())
    }

    /// Parses a document with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Document::parse`].
    pub fn parse_with(xml: &str, options: ParseOptions) -> SamlResult<Self> {
        let mut root = parse_tree(xml, &[])?;
        if !options.preserve_whitespace {
            root.strip_whitespace_text();
        }
        Ok(Self {
            root,
            preserve_whitespace: options.preserve_whitespace,
        })
    }

    /// Parses a fragment whose prefixes may be bound by an enclosing context,
    /// such as the plaintext of an `EncryptedAssertion`.
    ///
    /// # Errors
    ///
    /// See [`Document::parse`].
    pub fn parse_fragment(xml: &str, inherited: &[Namespace]) -> SamlResult<Self> {
        Ok(Self {
            root: parse_tree(xml, inherited)?,
            preserve_whitespace: true,
        })
    }

    /// Wraps an element taken out of another document, such as the message
    /// inside a SOAP body. `preserve_whitespace` must describe how the source
    /// document was parsed.
    #[must_use]
    pub fn from_root(root: Element, preserve_whitespace: bool) -> Self {
        Self {
            root,
            preserve_whitespace,
        }
    }

    /// Returns the document element.
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Consumes the document and returns its root element.
    #[must_use]
    pub fn into_root(self) -> Element {
        self.root
    }

    /// Returns true if whitespace-only text was kept during parsing.
    #[must_use]
    pub fn preserves_whitespace(&self) -> bool {
        self.preserve_whitespace
    }

    /// Finds the element carrying `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DuplicateId`] if more than one element carries it.
    pub fn element_by_id(&self, id: &str) -> SamlResult<Option<&Element>> {
        let mut matches = self
            .root
            .descendants()
            .into_iter()
            .filter(|el| ID_ATTRIBUTES.iter().any(|name| el.attribute(name) == Some(id)));
        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            return Err(SamlError::DuplicateId(id.to_string()));
        }
        Ok(first)
    }

    /// Finds the element carrying `id` for modification.
    pub fn element_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.root.find_by_id_mut(id)
    }

    /// Serializes the document without an XML declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.root.to_xml()
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn utf8(bytes: &[u8]) -> SamlResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| SamlError::InvalidEncoding(e.to_string()))
}

/// XML 1.0 end-of-line handling: `\r\n` and lone `\r` become `\n`.
fn normalize_line_endings(xml: &str) -> Cow<'_, str> {
    if xml.contains('\r') {
        Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(xml)
    }
}

/// Attribute-value normalization for CDATA attributes: literal whitespace
/// characters become spaces before references are expanded.
fn attribute_value(raw: &[u8]) -> SamlResult<String> {
    let raw = utf8(raw)?.replace(['\t', '\n'], " ");
    quick_xml::escape::unescape(&raw)
        .map(Cow::into_owned)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn open_element(start: &BytesStart<'_>, parent_scope: &[Namespace]) -> SamlResult<Element> {
    let mut declarations = Vec::new();
    let mut raw_attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = attribute_value(&attr.value)?;
        if key == "xmlns" {
            declarations.push(Namespace { prefix: None, uri: value });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            if value.is_empty() {
                return Err(SamlError::XmlParse(format!("prefix '{prefix}' undeclared")));
            }
            declarations.push(Namespace {
                prefix: Some(prefix.to_string()),
                uri: value,
            });
        } else {
            raw_attributes.push((key, value));
        }
    }

    let mut in_scope: Vec<Namespace> = parent_scope
        .iter()
        .filter(|ns| !declarations.iter().any(|d| d.prefix == ns.prefix))
        .cloned()
        .collect();
    in_scope.extend(
        declarations
            .iter()
            .filter(|d| d.prefix.is_some() || !d.uri.is_empty())
            .cloned(),
    );

    let resolve = |prefix: Option<&str>, element: bool| -> SamlResult<Option<String>> {
        match prefix {
            Some("xml") => Ok(Some(XML_NS.to_string())),
            Some(p) => in_scope
                .iter()
                .find(|ns| ns.prefix.as_deref() == Some(p))
                .map(|ns| Some(ns.uri.clone()))
                .ok_or_else(|| SamlError::XmlParse(format!("unbound namespace prefix '{p}'"))),
            None if element => Ok(in_scope
                .iter()
                .find(|ns| ns.prefix.is_none())
                .map(|ns| ns.uri.clone())),
            None => Ok(None),
        }
    };

    let name = utf8(start.name().as_ref())?.to_string();
    let (prefix, local_name) = split_qname(&name);
    let namespace = resolve(prefix, true)?;

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_local) = split_qname(&key);
        let attr_namespace = resolve(attr_prefix, false)?;
        if attributes.iter().any(|a: &Attribute| {
            a.local_name == attr_local && a.namespace == attr_namespace
        }) {
            return Err(SamlError::XmlParse(format!("duplicate attribute '{key}'")));
        }
        attributes.push(Attribute {
            prefix: attr_prefix.map(str::to_string),
            local_name: attr_local.to_string(),
            namespace: attr_namespace,
            value,
        });
    }

    Ok(Element {
        prefix: prefix.map(str::to_string),
        local_name: local_name.to_string(),
        namespace,
        attributes,
        declarations,
        in_scope,
        children: Vec::new(),
    })
}

fn push_text(parent: &mut Element, text: &str) {
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

fn close_element(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn parse_tree(xml: &str, inherited: &[Namespace]) -> SamlResult<Element> {
    let normalized = normalize_line_endings(xml);
    let mut reader = Reader::from_str(&normalized);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(SamlError::XmlParse("content after document element".to_string()));
                }
                let scope = stack.last().map_or(inherited, |parent| parent.in_scope.as_slice());
                let element = open_element(&start, scope)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(SamlError::XmlParse("content after document element".to_string()));
                }
                let scope = stack.last().map_or(inherited, |parent| parent.in_scope.as_slice());
                let element = open_element(&start, scope)?;
                close_element(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                close_element(element, &mut stack, &mut root);
            }
            Event::Text(text) => {
                let value = text.unescape()?;
                match stack.last_mut() {
                    Some(parent) => push_text(parent, &value),
                    None if value.trim().is_empty() => {}
                    None => {
                        return Err(SamlError::XmlParse("text outside document element".to_string()))
                    }
                }
            }
            Event::CData(cdata) => {
                let value = utf8(&cdata)?.to_string();
                match stack.last_mut() {
                    Some(parent) => push_text(parent, &value),
                    None => {
                        return Err(SamlError::XmlParse("CDATA outside document element".to_string()))
                    }
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(utf8(&comment)?.to_string()));
                }
            }
            Event::PI(pi) => {
                if let Some(parent) = stack.last_mut() {
                    let content = utf8(&pi)?;
                    let (target, data) = content
                        .split_once(|c: char| c.is_ascii_whitespace())
                        .map_or((content, ""), |(t, d)| (t, d.trim_start()));
                    parent.children.push(Node::ProcessingInstruction {
                        target: target.to_string(),
                        data: data.to_string(),
                    });
                }
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DOCTYPE declarations are not allowed".to_string()));
            }
            Event::Decl(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("no document element".to_string()))
}

pub(crate) fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

pub(crate) fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
