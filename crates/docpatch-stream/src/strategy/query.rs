use async_trait::async_trait;
use tracing::debug;

use docpatch_types::{and_query, document_id, id_query, Document};
use serde_json::Value;

use crate::error::StreamResult;
use crate::patch::Patch;
use crate::strategy::UpdateStrategy;

/// Applies the modifier if the document still matches the patch query.
///
/// No conflict detection beyond the query: concurrent changes to fields the
/// query does not mention are overwritten. A document that no longer
/// matches is skipped without retry.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryStrategy;

#[async_trait]
impl UpdateStrategy for QueryStrategy {
    async fn apply(&self, patch: &mut Patch) -> StreamResult<Option<Document>> {
        let Some(modifier) = patch.modifier.as_ref() else {
            return Ok(None);
        };
        let id = document_id(&patch.before).cloned().unwrap_or(Value::Null);
        let selection = and_query([patch.query.clone(), id_query(&id)]);
        let after = patch
            .collection
            .find_and_modify(&selection, modifier)
            .await
            .map_err(|err| patch.store_error(err))?;
        if after.is_none() {
            debug!(id = %id, "document no longer matches query, skipped");
        }
        Ok(after)
    }
}
