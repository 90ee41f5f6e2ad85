//! Ordered, concurrency-bounded stream stage.
//!
//! A coordinator task pulls items from the input, spawns one task per item
//! into a `JoinSet`, and re-sequences completed results so the output order
//! equals the input order. At most `concurrency` items are in flight or
//! buffered out of order at any time.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};

/// Concurrency used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Output of an ordered stage.
///
/// Dropping the stream aborts the coordinator, which in turn aborts every
/// in-flight task.
pub struct OrderedStream<O, E> {
    receiver: mpsc::Receiver<Result<O, E>>,
    coordinator: JoinHandle<()>,
}

impl<O, E> Stream for OrderedStream<O, E> {
    type Item = Result<O, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<O, E> Drop for OrderedStream<O, E> {
    fn drop(&mut self) {
        self.coordinator.abort();
    }
}

/// Map every item of `input` through `f` with bounded concurrency,
/// preserving order.
///
/// `f` returning `Ok(None)` drops the item. The first error, from the input,
/// from `f`, or a panic in `f`'s future, is emitted after every earlier item
/// and ends the stream.
/// Must be called from within a tokio runtime.
pub fn ordered_map<S, T, O, E, F, Fut>(input: S, concurrency: usize, f: F) -> OrderedStream<O, E>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    O: Send + 'static,
    E: From<JoinError> + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<O>, E>> + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let (sender, receiver) = mpsc::channel(concurrency);
    let coordinator = tokio::spawn(coordinate(input, concurrency, f, sender));
    OrderedStream {
        receiver,
        coordinator,
    }
}

async fn coordinate<S, T, O, E, F, Fut>(
    input: S,
    concurrency: usize,
    f: F,
    sender: mpsc::Sender<Result<O, E>>,
) where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    O: Send + 'static,
    E: From<JoinError> + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<O>, E>> + Send + 'static,
{
    let mut input = Box::pin(input);
    let mut tasks: JoinSet<Result<Option<O>, E>> = JoinSet::new();
    // A panicked task only reports its id; this recovers its place in line.
    let mut sequences: HashMap<Id, u64> = HashMap::new();
    let mut completed: BTreeMap<u64, Result<Option<O>, E>> = BTreeMap::new();
    let mut submitted: u64 = 0;
    let mut emitted: u64 = 0;
    let mut exhausted = false;
    // An input error waits until everything submitted before it is emitted.
    let mut input_error: Option<E> = None;

    loop {
        while let Some(result) = completed.remove(&emitted) {
            emitted += 1;
            match result {
                Ok(Some(item)) => {
                    if sender.send(Ok(item)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    let _ = sender.send(Err(err)).await;
                    return;
                }
            }
        }

        let draining = exhausted || input_error.is_some();
        if draining && emitted == submitted {
            if let Some(err) = input_error {
                let _ = sender.send(Err(err)).await;
            }
            return;
        }

        let window_open = !draining && submitted - emitted < concurrency as u64;

        tokio::select! {
            next = input.next(), if window_open => match next {
                Some(Ok(item)) => {
                    let sequence = submitted;
                    submitted += 1;
                    let handle = tasks.spawn(f(item));
                    sequences.insert(handle.id(), sequence);
                }
                Some(Err(err)) => input_error = Some(err),
                None => exhausted = true,
            },
            Some(joined) = tasks.join_next_with_id() => match joined {
                Ok((id, result)) => {
                    if let Some(sequence) = sequences.remove(&id) {
                        completed.insert(sequence, result);
                    }
                }
                Err(err) => match sequences.remove(&err.id()) {
                    Some(sequence) => {
                        completed.insert(sequence, Err(E::from(err)));
                    }
                    None => {
                        let _ = sender.send(Err(E::from(err))).await;
                        return;
                    }
                },
            },
            else => return,
        }
    }
}
