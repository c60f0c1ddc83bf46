//! SAML Status types.
//!
//! Status information returned in SAML protocol responses.

use serde::{Deserialize, Serialize};

use super::{escape, push_attribute, status_codes, SAMLP_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// Creates a failure status with a top-level code and optional sub-code.
    #[must_use]
    pub fn failure(code: impl Into<String>, sub_code: Option<&str>) -> Self {
        let mut status_code = StatusCode::new(code);
        status_code.status_code = sub_code.map(|sub| Box::new(StatusCode::new(sub)));
        Self {
            status_code,
            status_message: None,
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Returns [`SamlError::UnsuccessfulStatus`] unless this is success.
    pub fn ensure_success(&self) -> SamlResult<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(SamlError::UnsuccessfulStatus {
            code: self.status_code.value.clone(),
            sub_code: self.status_code.status_code.as_ref().map(|sub| sub.value.clone()),
        })
    }

    /// Reads a `samlp:Status` element.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let code = element
            .child(SAMLP_NS, "StatusCode")
            .ok_or_else(|| SamlError::MissingElement("StatusCode".to_string()))?;
        Ok(Self {
            status_code: StatusCode::from_element(code)?,
            status_message: element
                .child(SAMLP_NS, "StatusMessage")
                .map(Element::text),
        })
    }

    /// Writes `samlp:Status`; the `samlp` prefix must be bound.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<samlp:Status>");
        out.push_str(&self.status_code.to_xml());
        if let Some(message) = &self.status_message {
            out.push_str(&format!("<samlp:StatusMessage>{}</samlp:StatusMessage>", escape(message)));
        }
        out.push_str("</samlp:Status>");
        out
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code.
///
/// Status codes can be nested, with a top-level code and optional sub-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            value: super::required_attribute(element, "Value")?.to_string(),
            status_code: element
                .child(SAMLP_NS, "StatusCode")
                .map(|sub| Self::from_element(sub).map(Box::new))
                .transpose()?,
        })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from("<samlp:StatusCode");
        push_attribute(&mut out, "Value", Some(&self.value));
        match &self.status_code {
            Some(sub) => {
                out.push('>');
                out.push_str(&sub.to_xml());
                out.push_str("</samlp:StatusCode>");
            }
            None => out.push_str("/>"),
        }
        out
    }
}
