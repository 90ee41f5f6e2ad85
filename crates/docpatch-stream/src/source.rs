use std::sync::Arc;

use futures::TryStreamExt;
use tracing::debug;

use docpatch_store::Collection;
use docpatch_types::Document;

use crate::error::{StreamError, StreamResult};
use crate::ordered::{ordered_map, OrderedStream};
use crate::patch::{Patch, PatchSnapshot};
use crate::worker::PatchWorker;

/// Ordered stream of patches flowing between pipeline stages.
pub type PatchStream = OrderedStream<Patch, StreamError>;

/// Read `query` from `collection` in `_id` order and turn every document the
/// worker wants to change into a [`Patch`].
///
/// Documents for which the worker returns no modifier are dropped. A worker
/// error carries the document and ends the stream.
pub async fn patch_source(
    collection: Arc<dyn Collection>,
    query: Document,
    worker: Arc<dyn PatchWorker>,
    concurrency: usize,
) -> StreamResult<PatchStream> {
    let cursor = collection.find(&query).await?.map_err(StreamError::from);

    Ok(ordered_map(cursor, concurrency, move |document: Document| {
        let collection = Arc::clone(&collection);
        let worker = Arc::clone(&worker);
        let query = query.clone();
        async move {
            // The worker owns its copy; `before` stays as read.
            let before = document.clone();
            match worker.modifier(document).await {
                Ok(Some(modifier)) => Ok(Some(Patch::new(collection, query, before, modifier))),
                Ok(None) => {
                    debug!(collection = %collection.name(), "worker left document unchanged");
                    Ok(None)
                }
                Err(source) => Err(StreamError::Worker {
                    source,
                    patch: Box::new(PatchSnapshot {
                        before,
                        after: None,
                        modifier: None,
                    }),
                }),
            }
        }
    }))
}
