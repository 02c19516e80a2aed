pub mod fetcher;
pub mod index;
pub mod loader;
pub mod queue;
pub mod source;
pub mod store;

pub use fetcher::{FetchCompletion, FetchEvent, FetchState, TileFetcher};
pub use index::CacheIndex;
pub use loader::{HttpTileLoader, TileLoader};
pub use queue::{DownloadQueue, EnqueueOutcome, PendingDownload};
pub use source::{TileProvider, TileSource};
pub use store::DiskStore;

/// Answer to a tile request from the viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileFetch {
    /// Image bytes read from the disk cache
    Hit(Vec<u8>),
    /// Queued or downloading; draw a placeholder for now
    Pending,
    /// Given up on until failures are cleared
    Failed,
}

impl TileFetch {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Hit(bytes) => Some(bytes),
            _ => None,
        }
    }
}
