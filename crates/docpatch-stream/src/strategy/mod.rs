//! Update strategies: how a patch's modifier reaches storage.
//!
//! - [`DummyStrategy`] -- applies to a scratch copy, never the real collection
//! - [`QueryStrategy`] -- applies if the document still matches the query
//! - [`DocumentStrategy`] -- applies only if the document is unchanged since
//!   it was read, re-running the worker on conflicts

mod document;
mod dummy;
mod query;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docpatch_types::Document;

use crate::error::StreamResult;
use crate::patch::Patch;

pub use document::{DocumentStrategy, DEFAULT_ATTEMPT_LIMIT};
pub use dummy::{DummyStrategy, SCRATCH_COLLECTION};
pub use query::QueryStrategy;

/// Applies one patch's modifier.
///
/// Returns the document as stored afterwards, or `None` when the patch was
/// skipped because its precondition no longer held. Strategies may update
/// the patch's `before`, `modifier`, and `attempts` while retrying.
#[async_trait]
pub trait UpdateStrategy: Send + Sync {
    async fn apply(&self, patch: &mut Patch) -> StreamResult<Option<Document>>;
}

/// Strategy selector used by run options and the CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    Dummy,
    Query,
    #[default]
    Document,
}

impl UpdateMode {
    /// The name used in options and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Query => "query",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dummy" => Ok(Self::Dummy),
            "query" => Ok(Self::Query),
            "document" => Ok(Self::Document),
            other => Err(format!(
                "unknown update mode '{other}' (expected dummy, query, or document)"
            )),
        }
    }
}
