//! Canonical XML 1.0 and Exclusive XML Canonicalization 1.0.

use std::collections::BTreeMap;
use std::ptr;

use super::dom::{escape_attribute, escape_text, Element, Node};

/// Supported canonicalization algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalizationMethod {
    /// `http://www.w3.org/2001/10/xml-exc-c14n#`
    #[default]
    ExclusiveC14N,
    /// `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
    ExclusiveC14NWithComments,
    /// `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
    C14N,
    /// `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
    C14NWithComments,
}

impl CanonicalizationMethod {
    /// Returns the algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::ExclusiveC14N => "http://www.w3.org/2001/10/xml-exc-c14n#",
            Self::ExclusiveC14NWithComments => "http://www.w3.org/2001/10/xml-exc-c14n#WithComments",
            Self::C14N => "http://www.w3.org/TR/2001/REC-xml-c14n-20010315",
            Self::C14NWithComments => {
                "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments"
            }
        }
    }

    /// Parses an algorithm URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Self::ExclusiveC14N,
            Self::ExclusiveC14NWithComments,
            Self::C14N,
            Self::C14NWithComments,
        ]
        .into_iter()
        .find(|method| method.uri() == uri)
    }

    /// Returns true for the exclusive variants.
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::ExclusiveC14N | Self::ExclusiveC14NWithComments)
    }

    /// Returns true if comments are kept.
    #[must_use]
    pub const fn with_comments(self) -> bool {
        matches!(self, Self::ExclusiveC14NWithComments | Self::C14NWithComments)
    }
}

/// Canonicalizes the subtree rooted at `element`.
///
/// `inclusive_prefixes` is the exclusive-mode `InclusiveNamespaces PrefixList`
/// (`#default` names the default namespace); it is ignored by inclusive
/// methods. `excluded` names a descendant left out of the output, which is
/// how the enveloped-signature transform is applied.
#[must_use]
pub fn canonicalize(
    element: &Element,
    method: CanonicalizationMethod,
    inclusive_prefixes: &[String],
    excluded: Option<&Element>,
) -> String {
    let prefixes: Vec<&str> = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { "" } else { p.as_str() })
        .collect();
    let mut writer = Canonicalizer {
        method,
        inclusive_prefixes: prefixes,
        excluded,
        out: String::new(),
    };
    writer.element(element, &BTreeMap::new());
    writer.out
}

struct Canonicalizer<'a> {
    method: CanonicalizationMethod,
    inclusive_prefixes: Vec<&'a str>,
    excluded: Option<&'a Element>,
    out: String,
}

impl Canonicalizer<'_> {
    fn element(&mut self, element: &Element, rendered: &BTreeMap<String, String>) {
        if self.excluded.is_some_and(|ex| ptr::eq(ex, element)) {
            return;
        }

        let namespaces = if self.method.is_exclusive() {
            self.exclusive_namespaces(element, rendered)
        } else {
            inclusive_namespaces(element, rendered)
        };
        let mut scope = rendered.clone();
        for (prefix, uri) in &namespaces {
            scope.insert(prefix.clone(), uri.clone());
        }

        let name = element.qualified_name();
        self.out.push('<');
        self.out.push_str(&name);
        for (prefix, uri) in &namespaces {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            escape_attribute(uri, &mut self.out);
            self.out.push('"');
        }

        let mut attributes: Vec<_> = element.attributes.iter().collect();
        attributes.sort_by(|a, b| {
            (a.namespace.as_deref().unwrap_or(""), a.local_name.as_str())
                .cmp(&(b.namespace.as_deref().unwrap_or(""), b.local_name.as_str()))
        });
        for attr in attributes {
            self.out.push(' ');
            self.out.push_str(&attr.qualified_name());
            self.out.push_str("=\"");
            escape_attribute(&attr.value, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');

        for child in &element.children {
            match child {
                Node::Element(el) => self.element(el, &scope),
                Node::Text(text) => escape_text(text, &mut self.out),
                Node::Comment(body) => {
                    if self.method.with_comments() {
                        self.out.push_str("<!--");
                        self.out.push_str(body);
                        self.out.push_str("-->");
                    }
                }
                Node::ProcessingInstruction { target, data } => {
                    self.out.push_str("<?");
                    self.out.push_str(target);
                    if !data.is_empty() {
                        self.out.push(' ');
                        self.out.push_str(data);
                    }
                    self.out.push_str("?>");
                }
            }
        }

        self.out.push_str("</");
        self.out.push_str(&name);
        self.out.push('>');
    }

    /// Namespaces visibly utilized by the element or its attributes, plus
    /// the prefix list, minus those an output ancestor already rendered.
    fn exclusive_namespaces(
        &self,
        element: &Element,
        rendered: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut utilized: Vec<&str> = vec![element.prefix.as_deref().unwrap_or("")];
        utilized.extend(
            element
                .attributes
                .iter()
                .filter_map(|attr| attr.prefix.as_deref())
                .filter(|prefix| *prefix != "xml"),
        );
        utilized.extend(self.inclusive_prefixes.iter().copied());

        let mut out = BTreeMap::new();
        for prefix in utilized {
            let uri = element
                .lookup_namespace((!prefix.is_empty()).then_some(prefix))
                .unwrap_or("");
            if prefix.is_empty() && uri.is_empty() {
                if rendered.get("").is_some_and(|u| !u.is_empty()) {
                    out.insert(String::new(), String::new());
                }
                continue;
            }
            if prefix == "xml" || uri.is_empty() {
                continue;
            }
            if rendered.get(prefix).map(String::as_str) != Some(uri) {
                out.insert(prefix.to_string(), uri.to_string());
            }
        }
        out
    }
}

/// Every in-scope namespace that differs from what an output ancestor
/// rendered.
fn inclusive_namespaces(
    element: &Element,
    rendered: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for ns in &element.in_scope {
        let prefix = ns.prefix.clone().unwrap_or_default();
        if rendered.get(&prefix) != Some(&ns.uri) {
            out.insert(prefix, ns.uri.clone());
        }
    }
    let has_default = element.in_scope.iter().any(|ns| ns.prefix.is_none());
    if !has_default && rendered.get("").is_some_and(|u| !u.is_empty()) {
        out.insert(String::new(), String::new());
    }
    out
}
