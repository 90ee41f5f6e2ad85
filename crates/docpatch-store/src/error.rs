use docpatch_types::TypeError;

/// Errors from collection operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A document path could not be read or written.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// A `$`-prefixed operator the store does not implement.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// The modifier document is malformed or does not fit the target.
    #[error("invalid modifier: {0}")]
    InvalidModifier(String),

    /// The query document is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A modifier attempted to change an immutable field.
    #[error("field '{0}' is immutable")]
    ImmutableField(String),

    /// The database connection was closed.
    #[error("database '{0}' is closed")]
    Closed(String),

    /// A document with the same `_id` already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The named collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The connection target could not be understood.
    #[error("invalid connection target: {0:?}")]
    InvalidTarget(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
