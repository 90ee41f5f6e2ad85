use thiserror::Error;

/// Errors produced by document model operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("expected a document, got {0}")]
    ExpectedDocument(String),

    #[error("invalid field path: {0:?}")]
    InvalidPath(String),

    #[error("cannot traverse {path:?}: element {segment:?} is not a container")]
    PathConflict { path: String, segment: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
