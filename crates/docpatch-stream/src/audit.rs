//! Audit log sidecar.
//!
//! Wraps a [`PatchProcessor`] and records every patch in a log collection:
//! an initial record before the update, completed with the outcome after
//! it, or with the error if it failed. Records are keyed by the patch id, so
//! concurrent processors never write the same record.
//!
//! `before` always holds the document as first read. When the update
//! strategy re-read the document, the version `after` and `diff` were
//! computed against is stored as `refreshed`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use docpatch_store::Collection;
use docpatch_types::{id_query, Document};

use crate::error::{error_chain, StreamError, StreamResult};
use crate::patch::Patch;
use crate::processor::PatchProcessor;

/// Processor decorator writing one audit record per patch.
#[derive(Clone)]
pub struct AuditedProcessor {
    inner: Arc<dyn PatchProcessor>,
    log: Arc<dyn Collection>,
}

impl AuditedProcessor {
    /// Records every patch `inner` produces into `log`.
    pub fn new(inner: Arc<dyn PatchProcessor>, log: Arc<dyn Collection>) -> Self {
        Self { inner, log }
    }
}

fn to_json_string(document: Option<&Document>) -> String {
    match document {
        Some(document) => Value::Object(document.clone()).to_string(),
        None => Value::Null.to_string(),
    }
}

fn set(fields: Map<String, Value>) -> Document {
    let mut modifier = Document::new();
    modifier.insert("$set".to_string(), Value::Object(fields));
    modifier
}

/// The record inserted before the patch is applied.
pub fn initial_record(patch: &Patch) -> Document {
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut record = Document::new();
    record.insert("_id".to_string(), Value::String(patch.id.clone()));
    record.insert("before".to_string(), Value::Object(patch.before.clone()));
    record.insert("collection".to_string(), Value::String(patch.collection.name().to_string()));
    record.insert("query".to_string(), Value::String(to_json_string(Some(&patch.query))));
    record.insert(
        "modifier".to_string(),
        Value::String(to_json_string(patch.modifier.as_ref())),
    );
    record.insert("modified".to_string(), Value::Bool(false));
    record.insert("createdAt".to_string(), json!({ "$date": created_at }));
    record
}

fn refreshed_field(fields: &mut Map<String, Value>, initial: &Document, current: &Document) {
    if current != initial {
        fields.insert("refreshed".to_string(), Value::Object(current.clone()));
    }
}

fn outcome_fields(patch: &Patch, initial: &Document) -> Map<String, Value> {
    let mut fields = Map::new();
    refreshed_field(&mut fields, initial, &patch.before);
    fields.insert("after".to_string(), patch.after.clone().map(Value::Object).unwrap_or(Value::Null));
    fields.insert("modified".to_string(), Value::Bool(patch.modified));
    fields.insert("skipped".to_string(), Value::Bool(patch.skipped));
    fields.insert("diff".to_string(), patch.diff.clone().unwrap_or(Value::Null));
    fields.insert("attempts".to_string(), Value::from(patch.attempts));
    fields
}

fn error_fields(err: &StreamError, initial: &Document) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(snapshot) = err.patch() {
        refreshed_field(&mut fields, initial, &snapshot.before);
    }
    fields.insert(
        "error".to_string(),
        json!({ "message": err.to_string(), "stack": error_chain(err) }),
    );
    if let Some(after) = err.patch().and_then(|snapshot| snapshot.after.clone()) {
        fields.insert("after".to_string(), Value::Object(after));
    }
    fields
}

#[async_trait]
impl PatchProcessor for AuditedProcessor {
    async fn process(&self, patch: Patch) -> StreamResult<Patch> {
        let record_id = Value::String(patch.id.clone());
        let initial = patch.before.clone();
        self.log
            .insert(initial_record(&patch))
            .await
            .map_err(|err| patch.store_error(err))?;

        match self.inner.process(patch).await {
            Ok(patch) => {
                self.log
                    .update(&id_query(&record_id), &set(outcome_fields(&patch, &initial)))
                    .await
                    .map_err(|err| patch.store_error(err))?;
                Ok(patch)
            }
            Err(err) => {
                if let Err(log_err) = self.log.update(&id_query(&record_id), &set(error_fields(&err, &initial))).await {
                    warn!(record = %record_id, error = %log_err, "failed to record patch error in audit log");
                }
                Err(err)
            }
        }
    }
}
