//! Native dialog handling (alert, confirm, prompt, beforeunload).
//!
//! Dialogs are never handed to the scenario: the driver prints them and then
//! answers according to an [`AutoDialogBehavior`] so the page cannot stall.

use serde::{Deserialize, Serialize};

/// Type of browser dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogType {
    /// Alert dialog (OK button only)
    Alert,
    /// Confirm dialog (OK/Cancel buttons)
    Confirm,
    /// Prompt dialog (text input + OK/Cancel)
    Prompt,
    /// Before unload dialog (Leave/Stay buttons)
    BeforeUnload,
}

impl DialogType {
    /// Parse the CDP dialog type name; unknown names are treated as alerts
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "confirm" => Self::Confirm,
            "prompt" => Self::Prompt,
            "beforeunload" => Self::BeforeUnload,
            _ => Self::Alert,
        }
    }
}

impl std::fmt::Display for DialogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alert => write!(f, "alert"),
            Self::Confirm => write!(f, "confirm"),
            Self::Prompt => write!(f, "prompt"),
            Self::BeforeUnload => write!(f, "beforeunload"),
        }
    }
}

/// Answer sent back to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogAction {
    /// Dialog was accepted (OK/Yes/Leave)
    Accept,
    /// Dialog was accepted with input text (for prompts)
    AcceptWith(String),
    /// Dialog was dismissed (Cancel/No/Stay)
    Dismiss,
}

impl DialogAction {
    /// Whether the browser should treat this as acceptance
    #[must_use]
    pub const fn accepts(&self) -> bool {
        !matches!(self, Self::Dismiss)
    }

    /// Text to enter into a prompt
    #[must_use]
    pub fn prompt_text(&self) -> Option<&str> {
        match self {
            Self::AcceptWith(text) => Some(text),
            _ => None,
        }
    }
}

/// A dialog raised by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    /// Type of dialog
    pub dialog_type: DialogType,
    /// Message displayed in the dialog
    pub message: String,
    /// Default value (for prompt dialogs)
    pub default_value: Option<String>,
}

impl Dialog {
    /// Create a new dialog
    #[must_use]
    pub fn new(dialog_type: DialogType, message: impl Into<String>) -> Self {
        Self {
            dialog_type,
            message: message.into(),
            default_value: None,
        }
    }

    /// Set the prompt default
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }
}

/// Configuration for automatic dialog handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoDialogBehavior {
    /// Accept all dialogs automatically
    AcceptAll,
    /// Dismiss all dialogs automatically
    #[default]
    DismissAll,
    /// Accept with empty string (for prompts)
    AcceptEmpty,
    /// Use default value (for prompts)
    UseDefault,
}

impl AutoDialogBehavior {
    /// Decide how to answer a dialog
    #[must_use]
    pub fn resolve(&self, dialog: &Dialog) -> DialogAction {
        match self {
            Self::AcceptAll => DialogAction::Accept,
            Self::DismissAll => DialogAction::Dismiss,
            Self::AcceptEmpty => match dialog.dialog_type {
                DialogType::Prompt => DialogAction::AcceptWith(String::new()),
                _ => DialogAction::Accept,
            },
            Self::UseDefault => match (&dialog.dialog_type, &dialog.default_value) {
                (DialogType::Prompt, Some(default)) => DialogAction::AcceptWith(default.clone()),
                _ => DialogAction::Accept,
            },
        }
    }
}
