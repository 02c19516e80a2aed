use std::collections::VecDeque;

use fxhash::FxHashSet;

use crate::core::geo::{TileCoord, TileId};

/// A tile waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub coord: TileCoord,
    pub url: String,
    /// Failed attempts so far
    pub failures: u32,
}

impl PendingDownload {
    pub fn id(&self) -> TileId {
        self.coord.id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    AlreadyQueued,
    /// The tile failed earlier and stays out until the failure is cleared
    PreviouslyFailed,
}

/// De-duplicating FIFO of tiles awaiting download.
///
/// Entries are keyed by [`TileId`]; enqueueing a pending tile again is a no-op.
/// Tiles that were given up on are remembered separately so the viewport does
/// not keep re-requesting them every frame.
#[derive(Debug, Default, Clone)]
pub struct DownloadQueue {
    entries: VecDeque<PendingDownload>,
    queued: FxHashSet<TileId>,
    failed: FxHashSet<TileId>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, coord: TileCoord, url: String) -> EnqueueOutcome {
        let id = coord.id();
        if self.failed.contains(&id) {
            return EnqueueOutcome::PreviouslyFailed;
        }
        if !self.queued.insert(id) {
            return EnqueueOutcome::AlreadyQueued;
        }
        log::debug!("queued tile {} from {}", id, url);
        self.entries.push_back(PendingDownload {
            coord,
            url,
            failures: 0,
        });
        EnqueueOutcome::Queued
    }

    /// Oldest entry still waiting
    pub fn peek_next(&self) -> Option<&PendingDownload> {
        self.entries.front()
    }

    pub fn get(&self, id: TileId) -> Option<&PendingDownload> {
        if !self.queued.contains(&id) {
            return None;
        }
        self.entries.iter().find(|entry| entry.id() == id)
    }

    /// Linear scan; queues stay small
    pub fn find_by_url(&self, url: &str) -> Option<&PendingDownload> {
        self.entries.iter().find(|entry| entry.url == url)
    }

    pub fn remove(&mut self, id: TileId) -> Option<PendingDownload> {
        if !self.queued.remove(&id) {
            return None;
        }
        let position = self.entries.iter().position(|entry| entry.id() == id)?;
        self.entries.remove(position)
    }

    /// Counts a failure against the entry and moves it to the back.
    /// Returns the new failure count.
    pub fn requeue(&mut self, id: TileId) -> Option<u32> {
        let mut entry = self.remove(id)?;
        entry.failures += 1;
        let failures = entry.failures;
        self.queued.insert(id);
        self.entries.push_back(entry);
        Some(failures)
    }

    /// Removes the entry and keeps it out of the queue until [`clear_failed`](Self::clear_failed)
    pub fn mark_failed(&mut self, id: TileId) -> Option<PendingDownload> {
        let entry = self.remove(id)?;
        self.failed.insert(id);
        Some(entry)
    }

    pub fn is_failed(&self, id: TileId) -> bool {
        self.failed.contains(&id)
    }

    /// Makes previously failed tiles eligible again; returns how many there were
    pub fn clear_failed(&mut self) -> usize {
        let count = self.failed.len();
        self.failed.clear();
        count
    }

    /// Drops every pending entry and failure record
    pub fn clear(&mut self) {
        self.entries.clear();
        self.queued.clear();
        self.failed.clear();
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.queued.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingDownload> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(coord: TileCoord) -> String {
        format!("http://tiles.test/{}.png", coord)
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut queue = DownloadQueue::new();
        let coord = TileCoord::new(3, 1, 2);
        assert_eq!(queue.enqueue(coord, url(coord)), EnqueueOutcome::Queued);
        assert_eq!(queue.enqueue(coord, url(coord)), EnqueueOutcome::AlreadyQueued);
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(coord.id()));
    }

    #[test]
    fn test_peek_returns_oldest_first() {
        let mut queue = DownloadQueue::new();
        let a = TileCoord::new(3, 1, 2);
        let b = TileCoord::new(3, 2, 2);
        queue.enqueue(a, url(a));
        queue.enqueue(b, url(b));
        assert_eq!(queue.peek_next().map(|e| e.coord), Some(a));
        queue.remove(a.id());
        assert_eq!(queue.peek_next().map(|e| e.coord), Some(b));
        queue.remove(b.id());
        assert!(queue.is_empty());
        assert!(queue.peek_next().is_none());
    }

    #[test]
    fn test_find_by_url() {
        let mut queue = DownloadQueue::new();
        let a = TileCoord::new(5, 10, 11);
        queue.enqueue(a, url(a));
        assert_eq!(queue.find_by_url(&url(a)).map(|e| e.coord), Some(a));
        assert!(queue.find_by_url("http://elsewhere/1/1/1.png").is_none());
    }

    #[test]
    fn test_requeue_moves_to_back_and_counts() {
        let mut queue = DownloadQueue::new();
        let a = TileCoord::new(2, 0, 0);
        let b = TileCoord::new(2, 1, 0);
        queue.enqueue(a, url(a));
        queue.enqueue(b, url(b));
        assert_eq!(queue.requeue(a.id()), Some(1));
        assert_eq!(queue.requeue(a.id()), Some(2));
        assert_eq!(queue.peek_next().map(|e| e.coord), Some(b));
        assert_eq!(queue.get(a.id()).map(|e| e.failures), Some(2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_failed_tiles_are_not_requeued_until_cleared() {
        let mut queue = DownloadQueue::new();
        let a = TileCoord::new(2, 3, 1);
        queue.enqueue(a, url(a));
        assert!(queue.mark_failed(a.id()).is_some());
        assert!(queue.is_empty());
        assert!(queue.is_failed(a.id()));
        assert_eq!(queue.enqueue(a, url(a)), EnqueueOutcome::PreviouslyFailed);
        assert!(queue.is_empty());

        assert_eq!(queue.clear_failed(), 1);
        assert_eq!(queue.enqueue(a, url(a)), EnqueueOutcome::Queued);
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut queue = DownloadQueue::new();
        assert!(queue.remove(TileCoord::new(1, 0, 0).id()).is_none());
        assert!(queue.requeue(TileCoord::new(1, 0, 0).id()).is_none());
    }
}
