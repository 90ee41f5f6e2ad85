use docpatch_store::StoreError;

use crate::patch::PatchSnapshot;

/// Errors surfaced by the patch pipeline.
///
/// Per-document failures carry the documents involved; see
/// [`StreamError::patch`].
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The user worker failed while computing a modifier.
    #[error("worker failed")]
    Worker {
        #[source]
        source: anyhow::Error,
        patch: Box<PatchSnapshot>,
    },

    /// A store operation failed. `patch` is absent for failures that are not
    /// tied to one document, such as opening the source cursor.
    #[error("store operation failed")]
    Store {
        #[source]
        source: StoreError,
        patch: Option<Box<PatchSnapshot>>,
    },

    /// The after-update callback rejected a patch.
    #[error("after callback failed")]
    Callback {
        #[source]
        source: anyhow::Error,
        patch: Box<PatchSnapshot>,
    },

    /// A pipeline task panicked or was cancelled.
    #[error("pipeline task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl StreamError {
    /// The documents of the patch that failed, if the failure is tied to one.
    pub fn patch(&self) -> Option<&PatchSnapshot> {
        match self {
            Self::Worker { patch, .. } | Self::Callback { patch, .. } => Some(&**patch),
            Self::Store { patch, .. } => patch.as_deref(),
            Self::Join(_) => None,
        }
    }
}

impl From<StoreError> for StreamError {
    fn from(source: StoreError) -> Self {
        Self::Store {
            source,
            patch: None,
        }
    }
}

/// Result alias for pipeline operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Render an error and its source chain, one cause per line.
///
/// Display strings never repeat their source, so each cause appears once.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
