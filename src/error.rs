//! Error types for section question answering.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, SectionQaError>;

/// Errors that can occur while summarizing or answering over a section tree.
///
/// None of these are recovered inside the crate: a failed summarize or answer
/// call returns the error and no partial result.
#[derive(Error, Debug)]
pub enum SectionQaError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// The model response did not conform to the declared output schema.
    #[error("Model response violates schema '{schema}': {message}")]
    SchemaViolation { schema: String, message: String },

    /// A tool call referenced a section id that is not in the tree or summaries.
    #[error("Unknown section id '{0}'")]
    UnknownSectionId(String),

    /// Projection hit a section with no entry in the summary mapping.
    #[error("No summary entry for section id '{0}'")]
    MissingSummary(String),

    /// A table paragraph could not be parsed as comma-separated rows.
    #[error("Malformed tabular text: {0}")]
    MalformedTable(String),

    /// The model selected a tool that was never registered.
    #[error("Model called unregistered tool '{0}'")]
    UnknownTool(String),

    /// Two sections in one tree share an id.
    #[error("Duplicate section id '{0}' in document tree")]
    DuplicateSectionId(String),

    /// Tree structure error.
    #[error("Invalid document tree: {0}")]
    InvalidTree(String),
}

impl SectionQaError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a schema violation for the named output schema.
    pub fn schema(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            schema: schema.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SectionQaError {
    fn from(err: reqwest::Error) -> Self {
        SectionQaError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for SectionQaError {
    fn from(err: serde_json::Error) -> Self {
        SectionQaError::Serialization(err.to_string())
    }
}
