use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::CatalogSource;
use crate::domain::{SourceId, SourceResult};

/// Identifies one logical fetch: a source level under a fixed set of parent keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub source: SourceId,
    pub level: usize,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchHandle(u64);

/// Posted by a worker when its fetch finishes.
#[derive(Debug)]
pub struct FetchCompletion {
    pub key: FetchKey,
    pub handle: FetchHandle,
    pub result: Arc<SourceResult>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("no catalog source registered for {0}")]
    UnknownSource(SourceId),
}

struct FetchSlot<W> {
    running: bool,
    handle: FetchHandle,
    waiters: Vec<W>,
}

/// A finished fetch together with everyone who asked for it, in request order.
pub struct Completed<W> {
    pub key: FetchKey,
    pub result: Arc<SourceResult>,
    pub waiters: Vec<W>,
}

/// Single-flight fetch table.
///
/// Owned by one coordinating task. Workers only ever post a
/// [`FetchCompletion`] back; the slot table is never touched off that task.
pub struct FetchCoordinator<W> {
    sources: HashMap<SourceId, Arc<dyn CatalogSource>>,
    slots: HashMap<FetchKey, FetchSlot<W>>,
    completions: mpsc::UnboundedSender<FetchCompletion>,
    next_handle: u64,
}

impl<W> FetchCoordinator<W> {
    pub fn new(
        sources: Vec<Arc<dyn CatalogSource>>,
        completions: mpsc::UnboundedSender<FetchCompletion>,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id(), s)).collect(),
            slots: HashMap::new(),
            completions,
            next_handle: 0,
        }
    }

    /// Join the running fetch for `key`, or launch one.
    ///
    /// `waiter` is handed back exactly once through [`Self::complete`].
    pub fn request(&mut self, key: FetchKey, waiter: W) -> Result<FetchHandle, FetchError> {
        if let Some(slot) = self.slots.get_mut(&key) {
            if slot.running {
                debug!(source = %key.source, level = key.level, "joining in-flight fetch");
                slot.waiters.push(waiter);
                return Ok(slot.handle);
            }
        }

        let source = self
            .sources
            .get(&key.source)
            .cloned()
            .ok_or(FetchError::UnknownSource(key.source))?;

        self.next_handle += 1;
        let handle = FetchHandle(self.next_handle);

        let completions = self.completions.clone();
        let worker_key = key.clone();
        tokio::spawn(async move {
            let result = source.fetch(worker_key.level, &worker_key.parents).await;
            let done = FetchCompletion {
                key: worker_key,
                handle,
                result: Arc::new(result),
            };
            if completions.send(done).is_err() {
                debug!("fetch finished after the coordinator shut down");
            }
        });

        debug!(source = %key.source, level = key.level, parents = ?key.parents, "fetch started");
        self.slots.insert(
            key,
            FetchSlot {
                running: true,
                handle,
                waiters: vec![waiter],
            },
        );
        Ok(handle)
    }

    /// Mark the slot terminal and release its waiters.
    pub fn complete(&mut self, done: FetchCompletion) -> Option<Completed<W>> {
        let slot = match self.slots.get_mut(&done.key) {
            Some(slot) if slot.running && slot.handle == done.handle => slot,
            _ => {
                warn!(source = %done.key.source, level = done.key.level, "dropping completion for an unknown fetch");
                return None;
            }
        };

        slot.running = false;
        Some(Completed {
            key: done.key,
            result: done.result,
            waiters: std::mem::take(&mut slot.waiters),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::source::testing::StaticSource;
    use crate::domain::CatalogEntry;

    fn key(level: usize, parents: &[&str]) -> FetchKey {
        FetchKey {
            source: SourceId::Akira,
            level,
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn setup() -> (
        Arc<StaticSource>,
        FetchCoordinator<usize>,
        mpsc::UnboundedReceiver<FetchCompletion>,
    ) {
        let source = Arc::new(StaticSource::new(SourceId::Akira));
        let entry = CatalogEntry::new("Paper", "https://example.com/Paper", "Paper", "").unwrap();
        source.respond(0, &[], SourceResult::Ok(vec![entry]));
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = FetchCoordinator::new(vec![source.clone() as Arc<dyn CatalogSource>], tx);
        (source, coordinator, rx)
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let (source, mut coordinator, mut rx) = setup();

        let handles: Vec<FetchHandle> = (0..5)
            .map(|i| coordinator.request(key(0, &[]), i).unwrap())
            .collect();
        assert!(handles.iter().all(|h| *h == handles[0]));

        let done = rx.recv().await.unwrap();
        let completed = coordinator.complete(done).unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(completed.waiters, vec![0, 1, 2, 3, 4]);
        assert_eq!(completed.result.entries()[0].key(), "Paper");
        assert_eq!(completed.key, key(0, &[]));
    }

    #[tokio::test]
    async fn test_finished_slot_starts_a_new_fetch() {
        let (source, mut coordinator, mut rx) = setup();

        let first = coordinator.request(key(0, &[]), 0).unwrap();
        let done = rx.recv().await.unwrap();
        coordinator.complete(done).unwrap();

        let second = coordinator.request(key(0, &[]), 1).unwrap();
        assert_ne!(first, second);
        let done = rx.recv().await.unwrap();
        assert_eq!(coordinator.complete(done).unwrap().waiters, vec![1]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_different_parents_are_different_fetches() {
        let (source, mut coordinator, mut rx) = setup();

        coordinator.request(key(1, &["Paper"]), 0).unwrap();
        coordinator.request(key(1, &["Purpur"]), 1).unwrap();
        for _ in 0..2 {
            let done = rx.recv().await.unwrap();
            // No canned response for level 1.
            assert!(matches!(*done.result, SourceResult::NetworkError(_)));
            assert_eq!(coordinator.complete(done).unwrap().waiters.len(), 1);
        }
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_source_and_stale_completion() {
        let (_source, mut coordinator, _rx) = setup();

        let err = coordinator
            .request(
                FetchKey {
                    source: SourceId::Polars,
                    level: 0,
                    parents: Vec::new(),
                },
                0,
            )
            .unwrap_err();
        assert_eq!(err, FetchError::UnknownSource(SourceId::Polars));

        let stray = FetchCompletion {
            key: key(0, &[]),
            handle: FetchHandle(42),
            result: Arc::new(SourceResult::Empty),
        };
        assert!(coordinator.complete(stray).is_none());
    }
}
