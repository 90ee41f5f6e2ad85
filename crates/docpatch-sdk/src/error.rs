use thiserror::Error;

use docpatch_store::StoreError;
use docpatch_stream::{PatchSnapshot, StreamError};

/// Errors raised while setting up or driving a patch run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("patch does not declare a version")]
    VersionMissing,

    #[error("specified version {declared} does not match current system version {expected}")]
    VersionMismatch { declared: String, expected: String },

    #[error("invalid version")]
    InvalidVersion(#[from] semver::Error),

    #[error("update missing")]
    UpdateMissing,

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("store error")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("{stage} hook failed")]
    Hook {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl RunError {
    /// The documents of the patch that failed, if the failure is tied to one.
    pub fn patch(&self) -> Option<&PatchSnapshot> {
        match self {
            Self::Stream(err) => err.patch(),
            _ => None,
        }
    }

    /// True for errors raised before any document was read.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::VersionMissing
                | Self::VersionMismatch { .. }
                | Self::InvalidVersion(_)
                | Self::UpdateMissing
                | Self::CollectionNotFound(_)
        )
    }
}

/// Result alias for run setup and driving.
pub type RunResult<T> = Result<T, RunError>;
