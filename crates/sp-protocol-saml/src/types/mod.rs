//! SAML 2.0 types and data structures.
//!
//! Types are read from a parsed [`Document`](crate::xml::Document) with
//! `from_element` and written with `to_xml`. Parsing enforces what the
//! schema makes mandatory; the normative rules on top of that live in
//! [`validation`](crate::validation).

mod assertion;
pub mod constants;
mod encrypted;
mod key_info;
mod logout;
mod message;
mod metadata;
mod name_id;
mod request;
mod response;
mod status;

pub use assertion::*;
pub use constants::*;
pub use encrypted::*;
pub use key_info::*;
pub use logout::*;
pub use message::*;
pub use metadata::*;
pub use name_id::*;
pub use request::*;
pub use response::*;
pub use status::*;

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// Generates a message or assertion ID. IDs must not start with a digit.
pub(crate) fn new_id() -> String {
    format!("_id{}", uuid::Uuid::new_v4().simple())
}

/// Formats an `xs:dateTime` in UTC with a `Z` suffix.
pub(crate) fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an `xs:dateTime`. Values without a zone designator are read as UTC.
pub(crate) fn parse_instant(field: &str, value: &str) -> SamlResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| SamlError::InvalidTimestamp {
            field: field.to_string(),
            value: value.to_string(),
        })
}

pub(crate) fn required_attribute<'a>(
    element: &'a Element,
    name: &'static str,
) -> SamlResult<&'a str> {
    element
        .attribute(name)
        .ok_or_else(|| SamlError::MissingAttribute {
            element: element.local_name.clone(),
            attribute: name,
        })
}

pub(crate) fn optional_instant(
    element: &Element,
    name: &'static str,
) -> SamlResult<Option<DateTime<Utc>>> {
    element
        .attribute(name)
        .map(|value| parse_instant(&format!("{}/@{name}", element.local_name), value))
        .transpose()
}

pub(crate) fn optional_bool(element: &Element, name: &'static str) -> SamlResult<Option<bool>> {
    match element.attribute(name).map(str::trim) {
        None => Ok(None),
        Some("true" | "1") => Ok(Some(true)),
        Some("false" | "0") => Ok(Some(false)),
        Some(other) => Err(SamlError::SchemaViolation(format!(
            "{}/@{name} is not a boolean: '{other}'",
            element.local_name
        ))),
    }
}

pub(crate) fn expect_element(
    element: &Element,
    namespace: &str,
    local_name: &'static str,
) -> SamlResult<()> {
    if element.is(namespace, local_name) {
        Ok(())
    } else {
        Err(SamlError::UnexpectedMessage {
            expected: local_name,
            actual: element.qualified_name(),
        })
    }
}

pub(crate) fn escape(value: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(value)
}

/// Appends ` name="value"` when a value is present.
pub(crate) fn push_attribute(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
}
