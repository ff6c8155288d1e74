//! Native form validity snapshot.

use serde::{Deserialize, Serialize};

/// Script returning a [`FormValidity`] for the first form on the page.
///
/// Throws if the page has no form.
pub const FORM_VALIDITY_JS: &str = r#"(() => {
  const form = document.querySelector('form');
  if (!form) throw new Error('no form on page');
  const valid = form.checkValidity();
  const invalid = valid ? [] : Array.from(document.querySelectorAll(':invalid'))
    .filter(el => el !== form)
    .map(el => ({
      tag: el.tagName,
      id: el.id || '',
      name: el.name || '',
      value: el.value === undefined ? '' : String(el.value),
      validationMessage: el.validationMessage || ''
    }));
  return { valid, invalid };
})()"#;

/// Script submitting the first form through `requestSubmit()`.
///
/// Runs submit handlers and constraint validation like a real submit click.
pub const REQUEST_SUBMIT_JS: &str = r#"(() => {
  const form = document.querySelector('form');
  if (!form) throw new Error('no form on page');
  form.requestSubmit();
  return true;
})()"#;

/// One element failing constraint validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidField {
    /// Upper-case tag name
    pub tag: String,
    /// Element id
    pub id: String,
    /// Element name
    pub name: String,
    /// Current value
    pub value: String,
    /// Browser-provided validation message
    #[serde(rename = "validationMessage")]
    pub validation_message: String,
}

/// Result of `checkValidity()` plus the offending fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormValidity {
    /// `checkValidity()` result
    pub valid: bool,
    /// Every `:invalid` element, empty when valid
    #[serde(rename = "invalid", default)]
    pub invalid_fields: Vec<InvalidField>,
}

impl FormValidity {
    /// A valid form
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            valid: true,
            invalid_fields: Vec::new(),
        }
    }

    /// An invalid form with the given fields
    #[must_use]
    pub fn invalid(fields: Vec<InvalidField>) -> Self {
        Self {
            valid: false,
            invalid_fields: fields,
        }
    }

    /// Parse the value returned by [`FORM_VALIDITY_JS`]
    pub fn from_value(value: serde_json::Value) -> crate::ProbeResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
