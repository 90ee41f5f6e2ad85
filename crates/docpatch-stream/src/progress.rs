//! Progress aggregation.
//!
//! The tracker is the single ordered consumer at the end of the pipeline.
//! It counts outcomes, measures throughput over a moving window, and folds
//! every document's counted diff into a run-wide accumulator.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use docpatch_diff::{diff_into, CountedDiff, DiffOptions};

use crate::error::StreamResult;
use crate::patch::Patch;

/// Window over which throughput is measured.
pub const SPEED_WINDOW: Duration = Duration::from_secs(5);

/// Run statistics after one patch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub count: u64,
    pub modified: u64,
    pub skipped: u64,
    /// Documents per second over the recent window.
    pub speed: f64,
    pub remaining: u64,
    /// Seconds left, `None` while the speed is unknown.
    pub eta: Option<f64>,
    /// Seconds since the tracker started.
    pub time: f64,
    pub percentage: f64,
    pub diff: CountedDiff,
}

/// Moving-window rate meter.
#[derive(Clone, Debug)]
pub struct SpeedMeter {
    window: Duration,
    started: Instant,
    marks: VecDeque<Instant>,
}

impl SpeedMeter {
    /// Meter averaging over the last `window`.
    pub fn new(window: Duration, started: Instant) -> Self {
        Self {
            window,
            started,
            marks: VecDeque::new(),
        }
    }

    /// Record one event at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.marks.push_back(now);
        self.expire(now);
    }

    /// Events per second over the window ending at `now`.
    pub fn speed(&mut self, now: Instant) -> f64 {
        self.expire(now);
        let span = now.saturating_duration_since(self.started).min(self.window);
        if span.is_zero() {
            return 0.0;
        }
        self.marks.len() as f64 / span.as_secs_f64()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.marks.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                self.marks.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Accumulates statistics over a run.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    total: u64,
    count: u64,
    modified: u64,
    skipped: u64,
    started: Instant,
    meter: SpeedMeter,
    diff: CountedDiff,
    options: DiffOptions,
}

impl ProgressTracker {
    /// A tracker for `total` expected documents.
    ///
    /// Unless `diff_object` is set, array indices in the accumulated diff are
    /// collapsed to `[*]`.
    pub fn new(total: u64, diff_object: bool) -> Self {
        Self::starting_at(total, diff_object, Instant::now())
    }

    /// Tracker for `total` documents, timed from `started`.
    pub fn starting_at(total: u64, diff_object: bool, started: Instant) -> Self {
        Self {
            total,
            count: 0,
            modified: 0,
            skipped: 0,
            started,
            meter: SpeedMeter::new(SPEED_WINDOW, started),
            diff: CountedDiff::new(),
            options: DiffOptions { group: !diff_object },
        }
    }

    /// Account for one emitted patch.
    pub fn record(&mut self, patch: &Patch) -> ProgressSnapshot {
        self.record_at(patch, Instant::now())
    }

    /// Counts one finished patch and returns the progress so far.
    pub fn record_at(&mut self, patch: &Patch, now: Instant) -> ProgressSnapshot {
        debug_assert!(
            patch.skipped || patch.after.is_some(),
            "patch {} reached progress without an outcome",
            patch.id
        );
        self.count += 1;
        if patch.modified {
            self.modified += 1;
        }
        if patch.skipped {
            self.skipped += 1;
        }
        if let Some(after) = &patch.after {
            diff_into(&mut self.diff, &patch.before, after, self.options);
        }
        self.meter.mark(now);
        self.snapshot_at(now)
    }

    /// Current statistics without recording anything.
    pub fn snapshot_at(&mut self, now: Instant) -> ProgressSnapshot {
        let speed = self.meter.speed(now);
        let remaining = self.total.saturating_sub(self.count);
        let eta = (speed > 0.0).then(|| remaining as f64 / speed);
        let percentage = if self.total == 0 {
            100.0
        } else {
            100.0 * self.count as f64 / self.total as f64
        };
        ProgressSnapshot {
            total: self.total,
            count: self.count,
            modified: self.modified,
            skipped: self.skipped,
            speed,
            remaining,
            eta,
            time: now.saturating_duration_since(self.started).as_secs_f64(),
            percentage,
            diff: self.diff.clone(),
        }
    }
}

/// Attach a progress snapshot to every patch passing through.
pub fn track_progress<S>(
    input: S,
    mut tracker: ProgressTracker,
) -> impl Stream<Item = StreamResult<Patch>> + Send
where
    S: Stream<Item = StreamResult<Patch>> + Send,
{
    input.map(move |result| {
        result.map(|mut patch| {
            patch.progress = Some(tracker.record(&patch));
            patch
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use docpatch_store::{Collection, Database, InMemoryDatabase};
    use docpatch_types::{doc, Document};
    use futures::stream;

    fn users() -> Arc<dyn Collection> {
        InMemoryDatabase::new("test").collection("users")
    }

    fn applied(before: Document, after: Option<Document>) -> Patch {
        let mut patch = Patch::new(users(), Document::new(), before, doc! { "$set": {} });
        patch.annotate(after);
        patch
    }

    #[test]
    fn counts_modified_and_skipped() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(4, false, start);
        let patches = [
            applied(doc! { "_id": 1, "name": "a" }, Some(doc! { "_id": 1, "username": "a" })),
            applied(doc! { "_id": 2, "name": "b" }, Some(doc! { "_id": 2, "name": "b" })),
            applied(doc! { "_id": 3, "name": "c" }, None),
            applied(doc! { "_id": 4, "name": "d" }, Some(doc! { "_id": 4, "username": "d" })),
        ];
        let mut last = ProgressSnapshot::default();
        for (i, patch) in patches.iter().enumerate() {
            last = tracker.record_at(patch, start + Duration::from_secs(i as u64 + 1));
        }
        assert_eq!(last.count, 4);
        assert_eq!(last.modified, 2);
        assert_eq!(last.skipped, 1);
        assert_eq!(last.remaining, 0);
        assert_eq!(last.percentage, 100.0);
        assert_eq!(last.eta, Some(0.0));
        assert_eq!(last.time, 4.0);
        assert_eq!(last.speed, 1.0);
        assert_eq!(last.diff.get("name").unwrap().removed, 2);
        assert_eq!(last.diff.get("username").unwrap().added, 2);
    }

    #[test]
    fn zero_total_is_complete() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(0, false, start);
        let snapshot = tracker.snapshot_at(start);
        assert_eq!(snapshot.percentage, 100.0);
        assert_eq!(snapshot.remaining, 0);
        assert_eq!(snapshot.eta, None);
        assert_eq!(snapshot.speed, 0.0);
    }

    #[test]
    fn more_documents_than_expected_saturates_remaining() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(1, false, start);
        let patch = applied(doc! { "_id": 1 }, Some(doc! { "_id": 1 }));
        tracker.record_at(&patch, start + Duration::from_secs(1));
        let snapshot = tracker.record_at(&patch, start + Duration::from_secs(2));
        assert_eq!(snapshot.remaining, 0);
        assert_eq!(snapshot.percentage, 200.0);
    }

    #[test]
    fn grouped_unless_diff_object() {
        let before = doc! { "_id": 1, "tags": [] };
        let after = doc! { "_id": 1, "tags": ["x", "y"] };
        let start = Instant::now();

        let mut grouped = ProgressTracker::starting_at(1, false, start);
        let snapshot = grouped.record_at(&applied(before.clone(), Some(after.clone())), start);
        assert_eq!(snapshot.diff.get("tags.[*]").unwrap().added, 2);

        let mut structural = ProgressTracker::starting_at(1, true, start);
        let snapshot = structural.record_at(&applied(before, Some(after)), start);
        assert_eq!(snapshot.diff.get("tags.0").unwrap().added, 1);
        assert_eq!(snapshot.diff.get("tags.1").unwrap().added, 1);
    }

    #[test]
    fn speed_uses_moving_window() {
        let start = Instant::now();
        let mut meter = SpeedMeter::new(Duration::from_secs(5), start);
        for second in 1..=10 {
            meter.mark(start + Duration::from_secs(second));
        }
        // Marks at 5..=10 are within five seconds of t=10.
        assert_eq!(meter.speed(start + Duration::from_secs(10)), 6.0 / 5.0);
        assert_eq!(meter.speed(start + Duration::from_secs(100)), 0.0);
    }

    #[tokio::test]
    async fn stream_attaches_snapshots() {
        let patches = vec![
            Ok(applied(doc! { "_id": 1, "a": 1 }, Some(doc! { "_id": 1, "a": 2 }))),
            Ok(applied(doc! { "_id": 2, "a": 1 }, None)),
        ];
        let tracked: Vec<_> = track_progress(stream::iter(patches), ProgressTracker::new(2, false))
            .collect()
            .await;
        let counts: Vec<u64> = tracked
            .iter()
            .map(|result| result.as_ref().unwrap().progress.as_ref().unwrap().count)
            .collect();
        assert_eq!(counts, vec![1, 2]);
        let last = tracked[1].as_ref().unwrap().progress.clone().unwrap();
        assert_eq!(last.modified, 1);
        assert_eq!(last.skipped, 1);
        assert_eq!(last.diff.get("a").unwrap().updated, 1);
    }
}
