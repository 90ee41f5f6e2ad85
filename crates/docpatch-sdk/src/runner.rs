//! Running a patch definition end to end.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::{Stream, StreamExt};
use semver::Version;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use docpatch_diff::CountedDiff;
use docpatch_store::{Collection, Connector, Database};
use docpatch_stream::{
    patch_source, track_progress, update_stream, AuditedProcessor, DocumentStrategy,
    DummyStrategy, Patch, PatchApplier, PatchProcessor, ProgressSnapshot, ProgressTracker,
    QueryStrategy, UpdateMode, UpdateStrategy,
};

use crate::error::{RunError, RunResult};
use crate::handle::{HandleParts, PatchHandle, TeardownHook, UpdateDefinition};
use crate::options::RunOptions;

/// Version patches must declare.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Totals handed to the teardown hook.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u64,
    pub count: u64,
    pub modified: u64,
    pub skipped: u64,
    /// Seconds the run took.
    pub time: f64,
    /// Average documents per second over the whole run.
    pub speed: f64,
    pub diff: CountedDiff,
}

impl RunSummary {
    fn from_progress(total: u64, progress: Option<ProgressSnapshot>, time: f64) -> Self {
        let progress = progress.unwrap_or_default();
        let speed = if time > 0.0 {
            progress.count as f64 / time
        } else {
            0.0
        };
        Self {
            total,
            count: progress.count,
            modified: progress.modified,
            skipped: progress.skipped,
            time,
            speed,
            diff: progress.diff,
        }
    }
}

/// The stream of patches a run emits, one per document the worker changed
/// or skipped. A failure is emitted as the last item.
pub struct PatchRun {
    id: String,
    total: u64,
    receiver: mpsc::Receiver<RunResult<Patch>>,
}

impl PatchRun {
    /// Identifier of this run; also the default audit collection name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Documents matching the query when the run started.
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Stream for PatchRun {
    type Item = RunResult<Patch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for PatchRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchRun")
            .field("id", &self.id)
            .field("total", &self.total)
            .finish()
    }
}

struct Connections {
    db: Arc<dyn Database>,
    log_db: Option<Arc<dyn Database>>,
}

impl Connections {
    async fn close(&self) {
        for db in std::iter::once(&self.db).chain(self.log_db.as_ref()) {
            if let Err(err) = db.close().await {
                warn!(database = %db.name(), error = %err, "failed to close database");
            }
        }
    }
}

/// Define a patch with `define` and start applying it.
///
/// Preconditions are checked before any document is read: the declared
/// version must equal [`VERSION`], an update must be declared, and its
/// collection must exist. On failure every connection is closed and the
/// error returned. Otherwise the returned [`PatchRun`] yields the patched
/// documents in `_id` order; connections close when it is exhausted.
pub async fn run<F>(define: F, options: RunOptions, connector: &dyn Connector) -> RunResult<PatchRun>
where
    F: FnOnce(&mut PatchHandle),
{
    options.validate()?;

    let db = connector.connect(&options.db).await?;
    let log_db = match &options.log_db {
        Some(target) => match connector.connect(target).await {
            Ok(log_db) => Some(log_db),
            Err(err) => {
                let _ = db.close().await;
                return Err(err.into());
            }
        },
        None => None,
    };
    let connections = Connections { db, log_db };

    let mut handle = PatchHandle::new(Arc::clone(&connections.db));
    define(&mut handle);

    match start(handle.into_parts(), &options, &connections).await {
        Ok(started) => Ok(started.spawn(connections)),
        Err(err) => {
            connections.close().await;
            Err(err)
        }
    }
}

fn check_version(declared: Option<&str>) -> RunResult<()> {
    let declared = declared.ok_or(RunError::VersionMissing)?;
    let parsed = Version::parse(declared.trim())?;
    let expected = Version::parse(VERSION)?;
    // Build metadata does not take part in version equality.
    let same = (parsed.major, parsed.minor, parsed.patch, &parsed.pre)
        == (expected.major, expected.minor, expected.patch, &expected.pre);
    if !same {
        return Err(RunError::VersionMismatch {
            declared: declared.to_string(),
            expected: VERSION.to_string(),
        });
    }
    Ok(())
}

struct Started {
    id: String,
    total: u64,
    stream: Pin<Box<dyn Stream<Item = RunResult<Patch>> + Send>>,
    teardown: Option<Arc<dyn TeardownHook>>,
}

async fn start(parts: HandleParts, options: &RunOptions, connections: &Connections) -> RunResult<Started> {
    check_version(parts.version.as_deref())?;
    let UpdateDefinition {
        collection: name,
        query,
        worker,
    } = parts.update.ok_or(RunError::UpdateMissing)?;
    let id = parts.id.ok_or(RunError::UpdateMissing)?;

    let db = &connections.db;
    if !db.collection_names().await?.iter().any(|existing| *existing == name) {
        return Err(RunError::CollectionNotFound(name));
    }

    if let Some(setup) = &parts.setup {
        setup
            .setup(Arc::clone(db))
            .await
            .map_err(|source| RunError::Hook { stage: "setup", source })?;
    }

    let collection: Arc<dyn Collection> = db.collection(&name);
    let total = collection.count(&query).await?;
    info!(
        id = %id,
        collection = %name,
        total,
        update = %options.update,
        parallel = options.parallel,
        "starting patch run"
    );

    let strategy: Arc<dyn UpdateStrategy> = match options.update {
        UpdateMode::Dummy => Arc::new(DummyStrategy::new(db.as_ref())),
        UpdateMode::Query => Arc::new(QueryStrategy),
        UpdateMode::Document => Arc::new(
            DocumentStrategy::new(Arc::clone(&worker)).with_attempt_limit(options.attempt_limit),
        ),
    };
    let mut applier = PatchApplier::new(strategy);
    if let Some(after) = parts.after {
        applier = applier.with_after_callback(after);
    }
    let processor: Arc<dyn PatchProcessor> = match &connections.log_db {
        Some(log_db) => {
            let log_name = options.log_collection.as_deref().unwrap_or(&id);
            debug!(id = %id, log = %log_name, "auditing to {}", log_db.name());
            Arc::new(AuditedProcessor::new(Arc::new(applier), log_db.collection(log_name)))
        }
        None => Arc::new(applier),
    };

    let source = patch_source(collection, query, worker, options.parallel).await?;
    let updated = update_stream(source, processor, options.parallel);
    let tracked = track_progress(updated, ProgressTracker::new(total, options.diff_object));

    Ok(Started {
        id,
        total,
        stream: tracked.map(|result| result.map_err(RunError::from)).boxed(),
        teardown: parts.teardown,
    })
}

impl Started {
    fn spawn(self, connections: Connections) -> PatchRun {
        let Started {
            id,
            total,
            stream,
            teardown,
        } = self;
        let (sender, receiver) = mpsc::channel(1);
        tokio::spawn(drive(id.clone(), total, stream, teardown, sender, connections));
        PatchRun { id, total, receiver }
    }
}

/// Forward patches to the run's receiver, then finish the run: teardown on
/// success, connections closed either way.
async fn drive(
    id: String,
    total: u64,
    mut stream: Pin<Box<dyn Stream<Item = RunResult<Patch>> + Send>>,
    teardown: Option<Arc<dyn TeardownHook>>,
    sender: mpsc::Sender<RunResult<Patch>>,
    connections: Connections,
) {
    let started = Instant::now();
    let mut progress = None;

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = sender.closed() => {
                debug!(id = %id, "run dropped by consumer");
                connections.close().await;
                return;
            }
        };
        match next {
            Some(Ok(patch)) => {
                progress = patch.progress.clone();
                if sender.send(Ok(patch)).await.is_err() {
                    connections.close().await;
                    return;
                }
            }
            Some(Err(err)) => {
                warn!(id = %id, error = %err, "patch run failed");
                drop(stream);
                connections.close().await;
                let _ = sender.send(Err(err)).await;
                return;
            }
            None => break,
        }
    }

    let summary = RunSummary::from_progress(total, progress, started.elapsed().as_secs_f64());
    info!(
        id = %id,
        count = summary.count,
        modified = summary.modified,
        skipped = summary.skipped,
        time = summary.time,
        "patch run finished"
    );
    if let Some(teardown) = teardown {
        if let Err(source) = teardown.teardown(summary).await {
            connections.close().await;
            let _ = sender
                .send(Err(RunError::Hook {
                    stage: "teardown",
                    source,
                }))
                .await;
            return;
        }
    }
    connections.close().await;
}
