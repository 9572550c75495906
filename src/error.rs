//! Error types

use thiserror::Error;

/// Failure to build a document tree from XML text
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("XML parse error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

/// Malformed field path text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("empty step in path '{0}'")]
    EmptyStep(String),

    #[error("unterminated '{delimiter}' in path '{path}'")]
    Unterminated { path: String, delimiter: char },

    #[error("invalid position '[{index}]' in path '{path}' (positions start at 1)")]
    InvalidIndex { path: String, index: String },

    #[error("attribute step must be last in path '{0}'")]
    MisplacedAttribute(String),
}

/// Invalid field map declaration
#[derive(Debug, Error)]
pub enum FieldMapError {
    #[error("invalid path for field '{field}': {source}")]
    Path {
        field: String,
        #[source]
        source: PathError,
    },

    #[error("field name '{0}' must be non-empty and free of '.', '[' and ']'")]
    InvalidName(String),

    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("field map is empty")]
    Empty,

    #[error("field map for '{0}' is empty")]
    EmptyNested(String),

    #[error("field '{0}' declares both 'anchor' and 'each'")]
    ConflictingAnchor(String),

    #[error("invalid declaration for field '{field}': {reason}")]
    InvalidSpec { field: String, reason: &'static str },

    #[error("unknown transform '{transform}' for field '{field}'")]
    UnknownTransform { field: String, transform: String },

    #[error("field map JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Conditions that abort an extraction call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("document has no root element")]
    MalformedDocument,

    #[error("field map has no entries")]
    EmptyFieldMap,

    #[error("field '{field}' matched {matches} nodes")]
    AmbiguousField { field: String, matches: usize },
}

/// Failure writing tabular output
#[derive(Debug, Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
