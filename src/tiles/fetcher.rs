//! Single-flight tile fetching.
//!
//! [`TileFetcher`] is a two-state machine. From `Idle` it takes the oldest
//! queued tile and spawns one network request; the request runs under the
//! only permit of a semaphore, so a second fetch cannot start until the first
//! has released it. The spawned task reports back over a channel and the
//! owner of the queue and cache index applies the result through
//! [`TileFetcher::handle_completion`], which also starts the next fetch.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;

use super::index::CacheIndex;
use super::loader::TileLoader;
use super::queue::{DownloadQueue, PendingDownload};
use super::store::DiskStore;
use crate::core::config::FetchConfig;
use crate::core::geo::{TileCoord, TileId};
use crate::runtime::AsyncHandle;
use crate::{MapError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching {
        id: TileId,
        url: String,
        started: Instant,
    },
}

/// What a spawned fetch task reports back
#[derive(Debug)]
pub struct FetchCompletion {
    pub url: String,
    /// Fetcher generation the request was issued under
    pub generation: u64,
    pub result: Result<Vec<u8>>,
}

/// Outcome of applying one completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// Persisted and added to the cache index
    Stored { coord: TileCoord, bytes: usize },
    /// Failed and moved to the back of the queue
    Retrying {
        coord: TileCoord,
        failures: u32,
        error: String,
    },
    /// Failed and given up on
    Dropped { coord: TileCoord, error: String },
    /// The response matched nothing in the queue
    Discarded { url: String },
}

pub struct TileFetcher {
    loader: Arc<dyn TileLoader>,
    config: FetchConfig,
    permits: Arc<Semaphore>,
    state: FetchState,
    in_flight: Option<Box<dyn AsyncHandle>>,
    generation: u64,
    completion_tx: UnboundedSender<FetchCompletion>,
    completion_rx: UnboundedReceiver<FetchCompletion>,
}

impl std::fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetcher")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TileFetcher {
    pub fn new(loader: Arc<dyn TileLoader>, config: FetchConfig) -> Self {
        let (completion_tx, completion_rx) = unbounded_channel();
        Self {
            loader,
            config,
            permits: Arc::new(Semaphore::new(1)),
            state: FetchState::Idle,
            in_flight: None,
            generation: 0,
            completion_tx,
            completion_rx,
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == FetchState::Idle
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Starts fetching the oldest queued tile. Returns false without doing
    /// anything when a fetch is already running or the queue is empty.
    pub fn start_next(&mut self, queue: &DownloadQueue) -> bool {
        if !self.is_idle() {
            return false;
        }
        let Some(next) = queue.peek_next() else {
            return false;
        };
        // A cancelled task may still hold the permit until it is torn down
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            log::debug!("fetch slot still occupied; deferring {}", next.url);
            return false;
        };

        let url = next.url.clone();
        let delay = self.config.retry.backoff(next.failures);
        let timeout = self.config.timeout();
        let timeout_ms = self.config.timeout_ms;
        let loader = Arc::clone(&self.loader);
        let tx = self.completion_tx.clone();
        let generation = self.generation;
        let task_url = url.clone();

        log::debug!("fetching tile {} from {}", next.id(), url);
        let handle = crate::runtime::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = match tokio::time::timeout(timeout, loader.fetch(&task_url)).await {
                Ok(result) => result,
                Err(_) => Err(MapError::Timeout {
                    url: task_url.clone(),
                    timeout_ms,
                }),
            };
            // Free the slot before anyone can observe the completion
            drop(permit);
            let _ = tx.send(FetchCompletion {
                url: task_url,
                generation,
                result,
            });
        });

        self.in_flight = Some(handle);
        self.state = FetchState::Fetching {
            id: next.id(),
            url,
            started: Instant::now(),
        };
        true
    }

    fn accept(&mut self, completion: FetchCompletion) -> Option<FetchCompletion> {
        if completion.generation != self.generation {
            log::debug!("ignoring stale response for {}", completion.url);
            return None;
        }
        if let FetchState::Fetching { started, .. } = &self.state {
            log::trace!("{} finished in {:?}", completion.url, started.elapsed());
        }
        self.state = FetchState::Idle;
        self.in_flight = None;
        Some(completion)
    }

    /// Takes a finished fetch off the channel without blocking
    pub fn try_completion(&mut self) -> Option<FetchCompletion> {
        while let Ok(completion) = self.completion_rx.try_recv() {
            if let Some(completion) = self.accept(completion) {
                return Some(completion);
            }
        }
        None
    }

    /// Waits for the running fetch to finish. Returns `None` straight away
    /// when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<FetchCompletion> {
        while !self.is_idle() {
            let completion = self.completion_rx.recv().await?;
            if let Some(completion) = self.accept(completion) {
                return Some(completion);
            }
        }
        None
    }

    /// Applies a completion to the queue, disk and index, then starts the
    /// next fetch if anything is still queued.
    pub fn handle_completion(
        &mut self,
        completion: FetchCompletion,
        queue: &mut DownloadQueue,
        store: &DiskStore,
        index: &mut CacheIndex,
    ) -> FetchEvent {
        let event = self.apply(completion, queue, store, index);
        self.start_next(queue);
        event
    }

    fn apply(
        &self,
        completion: FetchCompletion,
        queue: &mut DownloadQueue,
        store: &DiskStore,
        index: &mut CacheIndex,
    ) -> FetchEvent {
        let FetchCompletion { url, result, .. } = completion;
        let Some(entry) = queue.find_by_url(&url).cloned() else {
            log::warn!("downloaded tile {} was not in the download queue; data ignored", url);
            return FetchEvent::Discarded { url };
        };

        let stored = result.and_then(|bytes| {
            store.write(entry.coord, &bytes)?;
            Ok(bytes.len())
        });

        match stored {
            Ok(bytes) => {
                let id = entry.id();
                index.insert(id, bytes as u64);
                queue.remove(id);
                log::info!("stored tile {} ({} bytes)", id, bytes);
                FetchEvent::Stored {
                    coord: entry.coord,
                    bytes,
                }
            }
            Err(e) => self.fail(entry, e, queue),
        }
    }

    fn fail(
        &self,
        entry: PendingDownload,
        error: MapError,
        queue: &mut DownloadQueue,
    ) -> FetchEvent {
        let id = entry.id();
        let failures = entry.failures + 1;
        if self.config.retry.allows_retry(failures) {
            queue.requeue(id);
            log::warn!("tile {} failed (attempt {}): {}; retrying", id, failures, error);
            FetchEvent::Retrying {
                coord: entry.coord,
                failures,
                error: error.to_string(),
            }
        } else {
            queue.mark_failed(id);
            log::error!("giving up on tile {} after {} attempt(s): {}", id, failures, error);
            FetchEvent::Dropped {
                coord: entry.coord,
                error: error.to_string(),
            }
        }
    }

    /// Aborts the running fetch. Its completion, should one still arrive, is ignored.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.cancel();
        }
        if !self.is_idle() {
            log::debug!("cancelled in-flight fetch");
        }
        self.generation += 1;
        self.state = FetchState::Idle;
    }
}

impl Drop for TileFetcher {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.cancel();
        }
    }
}
