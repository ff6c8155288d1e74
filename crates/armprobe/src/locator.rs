//! Selector parsing and element resolution.
//!
//! Supports the selector dialect the probe scenario is written in:
//!
//! - plain CSS: `input[id='is_pickup']`
//! - text: `text=Доступно к заказу` (case-insensitive substring) or
//!   `text="Exact"` (whole normalized text)
//! - ordinal suffix: `select >> nth=5`, zero-based, negative counts from the end
//!
//! A [`Selector`] renders the JavaScript that resolves it inside the page.
//! Resolution always picks a single element: the `nth` match, or the first.

use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};

/// Helper functions prepended to every resolution script
pub const ELEMENT_HELPERS_JS: &str = r#"
const __norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const __isVisible = (el) => {
  if (!el || !el.isConnected) return false;
  const style = window.getComputedStyle(el);
  if (style.visibility === 'hidden' || style.display === 'none') return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0;
};
"#;

/// Elements whose text never counts as rendered text
const TEXT_NODE_TAGS: &str = ":not(script):not(style):not(noscript):not(template)";

/// Elements searched by the text engines
const TEXT_CANDIDATES: &str =
    "body, body *:not(script):not(style):not(noscript):not(template)";

/// How the base of a selector matches elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorKind {
    /// CSS selector
    Css(String),
    /// Case-insensitive substring of the normalized text content
    Text(String),
    /// Whole normalized text content, case-sensitive
    ExactText(String),
}

/// A parsed selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    raw: String,
    kind: SelectorKind,
    nth: Option<i64>,
}

impl Selector {
    /// Parse a selector string
    pub fn parse(raw: &str) -> ProbeResult<Self> {
        let invalid = |message: &str| ProbeError::InvalidSelector {
            selector: raw.to_string(),
            message: message.to_string(),
        };

        let mut parts = raw.split(">>").map(str::trim);
        let base = parts.next().unwrap_or_default();
        if base.is_empty() {
            return Err(invalid("empty selector"));
        }

        let kind = if let Some(text) = base.strip_prefix("text=") {
            let text = text.trim();
            let quoted = text.len() >= 2
                && ((text.starts_with('"') && text.ends_with('"'))
                    || (text.starts_with('\'') && text.ends_with('\'')));
            if quoted {
                SelectorKind::ExactText(text[1..text.len() - 1].to_string())
            } else if text.is_empty() {
                return Err(invalid("empty text"));
            } else {
                SelectorKind::Text(text.to_string())
            }
        } else if let Some(css) = base.strip_prefix("css=") {
            SelectorKind::Css(css.trim().to_string())
        } else {
            SelectorKind::Css(base.to_string())
        };

        let mut nth = None;
        for part in parts {
            let Some(n) = part.strip_prefix("nth=") else {
                return Err(invalid(&format!("unsupported selector part '{part}'")));
            };
            if nth.is_some() {
                return Err(invalid("nth given twice"));
            }
            nth = Some(
                n.trim()
                    .parse::<i64>()
                    .map_err(|_| invalid(&format!("bad nth '{n}'")))?,
            );
        }

        Ok(Self {
            raw: raw.to_string(),
            kind,
            nth,
        })
    }

    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        let css = selector.into();
        Self {
            raw: css.clone(),
            kind: SelectorKind::Css(css),
            nth: None,
        }
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: format!("text={text}"),
            kind: SelectorKind::Text(text),
            nth: None,
        }
    }

    /// Pick the nth match
    #[must_use]
    pub fn nth(mut self, n: i64) -> Self {
        self.raw = format!("{} >> nth={n}", self.raw.split(">>").next().unwrap_or("").trim());
        self.nth = Some(n);
        self
    }

    /// Selector as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Base matcher
    #[must_use]
    pub const fn kind(&self) -> &SelectorKind {
        &self.kind
    }

    /// Ordinal, if any
    #[must_use]
    pub const fn ordinal(&self) -> Option<i64> {
        self.nth
    }

    /// Expression evaluating to the array of all matches
    #[must_use]
    pub fn to_all_query(&self) -> String {
        match &self.kind {
            SelectorKind::Css(css) => format!("Array.from(document.querySelectorAll({css:?}))"),
            SelectorKind::Text(text) => {
                let needle = text.to_lowercase();
                format!(
                    "Array.from(document.querySelectorAll({TEXT_CANDIDATES:?})).filter(el => \
                     __norm(el.textContent).toLowerCase().includes({needle:?}) && \
                     !Array.from(el.children).some(c => c.matches({TEXT_NODE_TAGS:?}) && \
                     __norm(c.textContent).toLowerCase().includes({needle:?})))"
                )
            }
            SelectorKind::ExactText(text) => format!(
                "Array.from(document.querySelectorAll({TEXT_CANDIDATES:?})).filter(el => \
                 __norm(el.textContent) === {text:?} && \
                 !Array.from(el.children).some(c => c.matches({TEXT_NODE_TAGS:?}) && \
                 __norm(c.textContent) === {text:?}))"
            ),
        }
    }

    /// Expression evaluating to the selected element or `null`
    #[must_use]
    pub fn to_query(&self) -> String {
        format!("({}).at({}) ?? null", self.to_all_query(), self.nth.unwrap_or(0))
    }

    /// Expression counting all matches
    #[must_use]
    pub fn to_count_query(&self) -> String {
        format!("({}).length", self.to_all_query())
    }

    /// Script returning whether the selected element is visible right now
    #[must_use]
    pub fn is_visible_script(&self) -> String {
        format!(
            "(() => {{ {ELEMENT_HELPERS_JS} return __isVisible({}); }})()",
            self.to_query()
        )
    }

    /// Script returning an [`ElementProbe`] for the selected element.
    ///
    /// Scrolls the element into view so the reported centre is clickable.
    #[must_use]
    pub fn probe_script(&self) -> String {
        format!(
            r#"(() => {{ {ELEMENT_HELPERS_JS}
  const el = {query};
  if (!el) return {{ found: false, visible: false, enabled: false, x: 0, y: 0 }};
  el.scrollIntoView({{ block: 'center', inline: 'center' }});
  const rect = el.getBoundingClientRect();
  return {{
    found: true,
    visible: __isVisible(el),
    enabled: !el.disabled,
    x: rect.left + rect.width / 2,
    y: rect.top + rect.height / 2
  }};
}})()"#,
            query = self.to_query()
        )
    }

    /// Script running `body` with `el` bound to the selected element.
    ///
    /// Throws inside the page if nothing matches.
    #[must_use]
    pub fn with_element_script(&self, body: &str) -> String {
        format!(
            "(() => {{ {ELEMENT_HELPERS_JS} const el = {query}; \
             if (!el) throw new Error('no element matches ' + {raw:?}); {body} }})()",
            query = self.to_query(),
            raw = self.raw
        )
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Selector {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Element state reported by [`Selector::probe_script`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementProbe {
    /// An element matched
    pub found: bool,
    /// The element has a box and is not hidden
    pub visible: bool,
    /// The element is not disabled
    pub enabled: bool,
    /// Centre x in CSS pixels
    pub x: f64,
    /// Centre y in CSS pixels
    pub y: f64,
}

impl ElementProbe {
    /// Ready to receive a click or input
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        self.found && self.visible && self.enabled
    }
}
