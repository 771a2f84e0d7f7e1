//! Error types for the BMEcat builder.
//!
//! Library crates use [`BmecatError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::TemplateKind;

/// Top-level error type for all catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum BmecatError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A CSV input had no header line or no data lines.
    #[error("empty input: {what} contains no data")]
    EmptyInput { what: String },

    /// A required column is absent from a CSV header line.
    #[error("required column \"{column}\" not found in CSV header")]
    MissingColumn { column: String },

    /// Source text contains a character that cannot appear in XML 1.0.
    #[error("invalid XML character U+{code:04X} at line {line}, column {column}")]
    InvalidCharacter { line: usize, column: usize, code: u32 },

    /// A templating oracle reply broke the template contract.
    #[error(transparent)]
    TemplateContract(#[from] TemplateContractError),

    /// A supplied XML sample lacks a region the assembler cannot do without.
    #[error("structural error: {message}")]
    Structural { message: String },

    /// The catalog structure contains a parent cycle.
    #[error("catalog group \"{group_id}\" is part of a parent cycle")]
    CyclicGroup { group_id: String },

    /// Transport-level failure talking to the templating oracle.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Parsing error for a structured input (TOML, JSON, etc.).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Reasons an oracle reply (or the input behind it) is unusable.
///
/// Every variant renders a message meant for the end user.
#[derive(Debug, thiserror::Error)]
pub enum TemplateContractError {
    /// The uploaded document could not be read (empty PDF, no pages).
    #[error("the supplied specification document is unreadable or empty; check that it is a valid, text-based PDF")]
    UnreadableDocument,

    /// The model rejected the request because the input exceeded its limit.
    #[error("the supplied specification files are too large for the model; try a smaller template or specification")]
    InputTooLarge,

    /// The reply was empty, not JSON, or lacked the expected string field.
    #[error("the model replied in an unexpected format ({detail}); this may be transient, please try again")]
    MalformedReply { detail: String },

    /// A mandatory marker is missing from the returned template.
    #[error("the generated {kind} template is missing the required marker {marker}")]
    MissingMarker {
        kind: TemplateKind,
        marker: &'static str,
    },

    /// The returned template does not have the required root element.
    #[error("the generated {kind} template is not a valid <{root}> element")]
    InvalidTemplate {
        kind: TemplateKind,
        root: &'static str,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BmecatError>;

impl BmecatError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an empty-input error naming the offending source.
    pub fn empty_input(what: impl Into<String>) -> Self {
        Self::EmptyInput { what: what.into() }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a structural error from any displayable message.
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BmecatError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = BmecatError::MissingColumn {
            column: "PARENT_ID".into(),
        };
        assert!(err.to_string().contains("PARENT_ID"));
    }

    #[test]
    fn contract_errors_are_transparent() {
        let err: BmecatError = TemplateContractError::MissingMarker {
            kind: TemplateKind::Article,
            marker: "<!-- {{PRODUCT_FEATURES}} -->",
        }
        .into();
        let msg = err.to_string();
        assert!(msg.starts_with("the generated article template"));
        assert!(msg.contains("{{PRODUCT_FEATURES}}"));
    }

    #[test]
    fn invalid_character_shows_code_point() {
        let err = BmecatError::InvalidCharacter {
            line: 3,
            column: 7,
            code: 0x0B,
        };
        assert_eq!(
            err.to_string(),
            "invalid XML character U+000B at line 3, column 7"
        );
    }
}
