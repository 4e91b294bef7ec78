//! Structured diagnostics extracted from engine stderr output.
//!
//! The engine reports font substitutions and other recoverable problems as
//! free-text log lines. The [`parser`] turns the text captured around one
//! conversion into [`Diagnostic`] records that travel back in the
//! `diagnostics` array of every conversion response.

pub mod parser;

pub use parser::{parse_bytes, parse_diagnostics, parse_line, PARSER_VERSION};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Font,
    General,
}

/// One warning emitted by the engine during a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// Font the document asked for but the engine could not provide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    /// Font the engine used instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substituted_with: Option<String>,
}

impl Diagnostic {
    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            message: message.into(),
            font: None,
            substituted_with: None,
        }
    }

    pub fn is_font(&self) -> bool {
        self.category == Category::Font
    }
}
