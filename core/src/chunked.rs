//! Splitting large address sets into parallel queries and merging the results.
//!
//! # Design
//! The input is cut into contiguous chunks. Each chunk becomes one
//! independent task on the background runtime, and the coordinating task is
//! the only writer of `CoordinatorState`. Completions come in through
//! `JoinSet::join_next`, one at a time, so a chunk's terminal transition and
//! the "publish once" decision happen together.
//!
//! The outcome is published exactly once: the first error as soon as it is
//! seen, or the concatenated results once every chunk has succeeded. Chunk
//! results are concatenated in chunk order. Callers should not depend on
//! cross-chunk ordering.
//!
//! What happens to sibling chunks after an error is the `ErrorPolicy`:
//! `Cancel` aborts their tasks, `Drain` lets them finish in a detached task
//! that records their completions and reports nothing further.

use std::future::Future;

use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::completion::join_failure;
use crate::error::QueryError;

/// A contiguous slice of the caller's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<K> {
    pub index: usize,
    pub items: Vec<K>,
}

/// Split `items` into chunks of at most `chunk_size`, preserving order.
/// A `chunk_size` of zero is treated as one.
pub fn partition<K: Clone>(items: &[K], chunk_size: usize) -> Vec<Chunk<K>> {
    items
        .chunks(chunk_size.max(1))
        .enumerate()
        .map(|(index, items)| Chunk {
            index,
            items: items.to_vec(),
        })
        .collect()
}

/// What to do with in-flight sibling chunks once one has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    #[default]
    Cancel,
    Drain,
}

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Done(Vec<T>),
    Failed,
}

/// Per-query bookkeeping shared by all chunks of that query.
#[derive(Debug)]
pub struct CoordinatorState<T> {
    slots: Vec<Slot<T>>,
    pending: usize,
    error: Option<QueryError>,
    published: bool,
}

impl<T> CoordinatorState<T> {
    pub fn new(chunks: usize) -> Self {
        Self {
            slots: (0..chunks).map(|_| Slot::Pending).collect(),
            pending: chunks,
            error: None,
            published: false,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn latched_error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    /// Record chunk `index`'s terminal result. Returns the query's outcome
    /// the one time it becomes known, `None` otherwise.
    ///
    /// # Panics
    /// If `index` was already completed, or is out of range.
    pub fn complete(
        &mut self,
        index: usize,
        result: Result<Vec<T>, QueryError>,
    ) -> Option<Result<Vec<T>, QueryError>> {
        let slot = &mut self.slots[index];
        assert!(
            matches!(slot, Slot::Pending),
            "chunk {index} completed more than once"
        );
        self.pending -= 1;

        match result {
            Ok(items) => {
                *slot = Slot::Done(items);
                if self.pending > 0 || self.error.is_some() {
                    return None;
                }
                self.published = true;
                let merged = self
                    .slots
                    .iter_mut()
                    .flat_map(|slot| match std::mem::replace(slot, Slot::Failed) {
                        Slot::Done(items) => items,
                        _ => Vec::new(),
                    })
                    .collect();
                Some(Ok(merged))
            }
            Err(error) => {
                *slot = Slot::Failed;
                if self.error.is_some() {
                    return None;
                }
                self.error = Some(error.clone());
                self.published = true;
                Some(Err(error))
            }
        }
    }
}

type ChunkOutcome<R> = (usize, Result<Vec<R>, QueryError>);

/// Runs chunked queries on the background runtime.
#[derive(Debug, Clone)]
pub struct ChunkCoordinator {
    runtime: Handle,
    policy: ErrorPolicy,
}

impl ChunkCoordinator {
    pub fn new(runtime: Handle, policy: ErrorPolicy) -> Self {
        Self { runtime, policy }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Partition `items`, run `fetch` once per chunk concurrently, and merge.
    ///
    /// Empty input resolves to an empty result without calling `fetch`.
    pub async fn run<K, R, F, Fut>(
        &self,
        items: &[K],
        chunk_size: usize,
        fetch: F,
    ) -> Result<Vec<R>, QueryError>
    where
        K: Clone,
        R: Send + 'static,
        F: Fn(Chunk<K>) -> Fut,
        Fut: Future<Output = Result<Vec<R>, QueryError>> + Send + 'static,
    {
        if items.is_empty() {
            tracing::debug!("no items to query");
            return Ok(Vec::new());
        }

        let chunks = partition(items, chunk_size);
        tracing::debug!(items = items.len(), chunks = chunks.len(), "starting chunked query");

        let mut state = CoordinatorState::new(chunks.len());
        let mut tasks: JoinSet<ChunkOutcome<R>> = JoinSet::new();
        for chunk in chunks {
            let index = chunk.index;
            let work = fetch(chunk);
            tasks.spawn_on(async move { (index, work.await) }, &self.runtime);
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((index, result)) => state.complete(index, result),
                // Slot unknown; the whole query fails.
                Err(e) => Some(Err(join_failure(e))),
            };
            let Some(outcome) = outcome else {
                continue;
            };
            if let Err(e) = &outcome {
                tracing::warn!(error = %e, outstanding = tasks.len(), "chunked query failed");
                self.settle(tasks, state);
            }
            return outcome;
        }

        Err(QueryError::Submission(
            "chunked query ended without an outcome".to_string(),
        ))
    }

    fn settle<R: Send + 'static>(
        &self,
        mut tasks: JoinSet<ChunkOutcome<R>>,
        mut state: CoordinatorState<R>,
    ) {
        if tasks.is_empty() {
            return;
        }
        match self.policy {
            ErrorPolicy::Cancel => tasks.abort_all(),
            ErrorPolicy::Drain => {
                self.runtime.spawn(async move {
                    while let Some(joined) = tasks.join_next().await {
                        let Ok((index, result)) = joined else {
                            continue;
                        };
                        if let Err(e) = &result {
                            tracing::warn!(chunk = index, error = %e, "discarding late chunk error");
                        }
                        let _ = state.complete(index, result);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn partition_sizes_and_order() {
        let items: Vec<u32> = (0..120).collect();
        let chunks = partition(&items, 50);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.items.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].items[0], 50);
        let rejoined: Vec<u32> = chunks.into_iter().flat_map(|c| c.items).collect();
        assert_eq!(rejoined, items);
    }

    #[test]
    fn partition_counts_are_ceiling_division() {
        for (n, k) in [(1usize, 1usize), (7, 3), (9, 3), (10, 50), (51, 50)] {
            let items: Vec<usize> = (0..n).collect();
            assert_eq!(partition(&items, k).len(), n.div_ceil(k), "n={n} k={k}");
        }
    }

    #[test]
    fn partition_clamps_zero_chunk_size() {
        assert_eq!(partition(&[1, 2], 0).len(), 2);
        assert!(partition::<u8>(&[], 10).is_empty());
    }

    #[test]
    fn state_publishes_merge_after_last_success() {
        let mut state = CoordinatorState::new(3);
        assert!(state.complete(2, Ok(vec![5])).is_none());
        assert!(state.complete(0, Ok(vec![1, 2])).is_none());
        assert_eq!(state.pending(), 1);
        let outcome = state.complete(1, Ok(vec![3, 4])).unwrap();
        assert_eq!(outcome.unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(state.is_published());
    }

    #[test]
    fn state_publishes_first_error_only() {
        let mut state = CoordinatorState::<u8>::new(3);
        let first = state.complete(1, Err(QueryError::Response { status: 500 }));
        assert_eq!(first, Some(Err(QueryError::Response { status: 500 })));
        assert!(state.complete(0, Err(QueryError::NoData)).is_none());
        assert!(state.complete(2, Ok(vec![1])).is_none());
        assert_eq!(state.pending(), 0);
        assert_eq!(state.latched_error(), Some(&QueryError::Response { status: 500 }));
    }

    #[test]
    #[should_panic(expected = "completed more than once")]
    fn state_rejects_duplicate_completion() {
        let mut state = CoordinatorState::<u8>::new(2);
        let _ = state.complete(0, Ok(vec![]));
        let _ = state.complete(0, Ok(vec![]));
    }

    fn coordinator(policy: ErrorPolicy) -> ChunkCoordinator {
        ChunkCoordinator::new(Handle::current(), policy)
    }

    #[tokio::test]
    async fn empty_input_never_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = coordinator(ErrorPolicy::Cancel)
            .run(&Vec::<String>::new(), 50, move |_chunk| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<Vec<u8>, QueryError>(Vec::new()) }
            })
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn merges_chunks_in_chunk_order() {
        let items: Vec<u32> = (0..10).collect();
        let merged = coordinator(ErrorPolicy::Cancel)
            .run(&items, 3, |chunk| async move {
                // Later chunks finish first.
                tokio::time::sleep(Duration::from_millis(40 - 10 * chunk.index as u64)).await;
                Ok(chunk.items.iter().map(|i| i * 10).collect::<Vec<u32>>())
            })
            .await
            .unwrap();
        assert_eq!(merged, (0..10).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_error_is_delivered_without_waiting() {
        let items: Vec<u32> = (0..4).collect();
        let started = std::time::Instant::now();
        let err = coordinator(ErrorPolicy::Cancel)
            .run(&items, 2, |chunk| async move {
                if chunk.index == 0 {
                    Err(QueryError::Response { status: 500 })
                } else {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(chunk.items)
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::Response { status: 500 });
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn drain_policy_lets_siblings_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (0..3).collect();
        let done = Arc::clone(&finished);
        let err = coordinator(ErrorPolicy::Drain)
            .run(&items, 1, move |chunk| {
                let done = Arc::clone(&done);
                async move {
                    if chunk.index == 0 {
                        return Err(QueryError::NoData);
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(chunk.items)
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::NoData);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancel_policy_aborts_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (0..3).collect();
        let done = Arc::clone(&finished);
        let _ = coordinator(ErrorPolicy::Cancel)
            .run(&items, 1, move |chunk| {
                let done = Arc::clone(&done);
                async move {
                    if chunk.index == 0 {
                        return Err(QueryError::NoData);
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(chunk.items)
                }
            })
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn panicking_chunk_becomes_submission_error() {
        let items: Vec<u32> = (0..2).collect();
        let err = coordinator(ErrorPolicy::Cancel)
            .run(&items, 1, |chunk| async move {
                assert!(chunk.index != 1, "chunk fault");
                Ok(chunk.items)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Submission(_)));
    }
}
