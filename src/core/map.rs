use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::config::TileViewConfig;
use crate::core::geo::{LatLng, TileCoord};
use crate::core::viewport::{TileRange, Viewport};
use crate::tiles::{
    CacheIndex, DiskStore, DownloadQueue, EnqueueOutcome, FetchEvent, FetchState, HttpTileLoader,
    TileFetch, TileFetcher, TileLoader, TileProvider, TileSource,
};
use crate::{MapError, Result};

/// A tile ready to be drawn at screen position `(x, y)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedTile {
    pub coord: TileCoord,
    pub x: i64,
    pub y: i64,
    pub fetch: TileFetch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Tiles on disk for the active provider
    pub tiles: usize,
    pub bytes: u64,
    /// Tiles waiting in the download queue
    pub pending: usize,
    /// Tiles given up on
    pub failed: usize,
}

/// The viewer core: owns the viewport, the disk cache of the active tile
/// server and the download pipeline that fills it.
///
/// `TileView` is the only writer of the cache index and the download queue.
/// Network requests run on the async runtime and come back through
/// [`poll`](Self::poll), [`next_event`](Self::next_event) or
/// [`drain`](Self::drain), which apply them here.
///
/// ```no_run
/// # async fn run() -> tileview::Result<()> {
/// use tileview::{TileView, TileViewConfig};
///
/// let mut view = TileView::with_http(TileViewConfig::default())?;
/// for tile in view.frame()? {
///     // draw tile.fetch at (tile.x, tile.y), or a placeholder while pending
/// }
/// view.drain().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TileView {
    config: TileViewConfig,
    provider_index: usize,
    viewport: Viewport,
    store: DiskStore,
    index: CacheIndex,
    queue: DownloadQueue,
    fetcher: TileFetcher,
}

impl TileView {
    /// Builds the view and indexes the first provider's cache directory.
    /// Needs a Tokio runtime once tiles start downloading.
    pub fn new(config: TileViewConfig, loader: Arc<dyn TileLoader>) -> Result<Self> {
        config.validate()?;
        let viewport = Viewport::new(
            config.initial_center.wrapped(),
            config.initial_zoom,
            config.viewport.width,
            config.viewport.height,
            config.tile_size,
        );
        let fetcher = TileFetcher::new(loader, config.fetch.clone());

        let provider = &config.providers[0];
        let root = config.cache_root.join(&provider.name);
        let store = DiskStore::new(&root, provider.format.as_str());
        let index = CacheIndex::init_from_disk(&root, &provider.format);
        log::info!(
            "tile view ready: provider {}, zoom {}, center {:?}",
            provider.name,
            viewport.zoom,
            viewport.center
        );

        Ok(Self {
            config,
            provider_index: 0,
            viewport,
            store,
            index,
            queue: DownloadQueue::new(),
            fetcher,
        })
    }

    /// Builds the view with the HTTP loader configured from `config.fetch`
    pub fn with_http(config: TileViewConfig) -> Result<Self> {
        let loader = HttpTileLoader::new(&config.fetch)?;
        Self::new(config, Arc::new(loader))
    }

    pub fn config(&self) -> &TileViewConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn provider(&self) -> &TileProvider {
        &self.config.providers[self.provider_index]
    }

    pub fn fetch_state(&self) -> &FetchState {
        self.fetcher.state()
    }

    pub fn cache_root(&self) -> PathBuf {
        self.store.root().to_path_buf()
    }

    pub fn visible_tiles(&self) -> Result<TileRange> {
        self.viewport.visible_tiles()
    }

    /// Cached bytes for `coord`, or `Pending` after making sure a download
    /// is queued for it.
    pub fn get_tile(&mut self, coord: TileCoord) -> Result<TileFetch> {
        if !coord.is_valid() {
            return Err(MapError::InvalidTile(coord));
        }
        let id = coord.id();

        if self.index.contains(id) {
            match self.store.read(coord) {
                Ok(bytes) => return Ok(TileFetch::Hit(bytes)),
                Err(MapError::NotFound(_)) => {
                    log::warn!("cached tile {} vanished from disk; fetching it again", id);
                    self.index.remove(id);
                }
                Err(e) => {
                    log::warn!("cached tile {} is unreadable ({}); fetching it again", id, e);
                    self.index.remove(id);
                }
            }
        }

        let fetch = if self.queue.contains(id) {
            TileFetch::Pending
        } else {
            let url = self.provider().url(coord);
            match self.queue.enqueue(coord, url) {
                EnqueueOutcome::PreviouslyFailed => TileFetch::Failed,
                EnqueueOutcome::Queued | EnqueueOutcome::AlreadyQueued => TileFetch::Pending,
            }
        };
        self.fetcher.start_next(&self.queue);
        Ok(fetch)
    }

    /// Resolves every tile the viewport needs, in row-major order
    pub fn frame(&mut self) -> Result<Vec<PlacedTile>> {
        let range = self.viewport.visible_tiles()?;
        let mut tiles = Vec::new();
        for placement in range.placements() {
            let fetch = self.get_tile(placement.coord)?;
            tiles.push(PlacedTile {
                coord: placement.coord,
                x: placement.x,
                y: placement.y,
                fetch,
            });
        }
        log::trace!(
            "frame: {} tiles, {} pending downloads",
            tiles.len(),
            self.queue.len()
        );
        Ok(tiles)
    }

    fn apply(&mut self, completion: crate::tiles::FetchCompletion) -> FetchEvent {
        self.fetcher
            .handle_completion(completion, &mut self.queue, &self.store, &mut self.index)
    }

    /// Applies every fetch that has finished, without waiting
    pub fn poll(&mut self) -> Vec<FetchEvent> {
        let mut events = Vec::new();
        while let Some(completion) = self.fetcher.try_completion() {
            events.push(self.apply(completion));
        }
        self.fetcher.start_next(&self.queue);
        events
    }

    /// Waits for the running fetch and applies it. `None` when nothing is
    /// downloading.
    pub async fn next_event(&mut self) -> Option<FetchEvent> {
        self.fetcher.start_next(&self.queue);
        let completion = self.fetcher.next_completion().await?;
        Some(self.apply(completion))
    }

    /// Downloads until the queue is empty
    pub async fn drain(&mut self) -> Vec<FetchEvent> {
        let mut events = Vec::new();
        loop {
            if let Some(event) = self.next_event().await {
                events.push(event);
                continue;
            }
            if self.queue.is_empty() {
                break;
            }
            // A cancelled request still holds the fetch slot
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        events
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(self.viewport.zoom as i32 + 1)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(self.viewport.zoom as i32 - 1)
    }

    /// Returns false and leaves the zoom unchanged when `level` is out of bounds
    pub fn set_zoom(&mut self, level: i32) -> bool {
        self.try_set_zoom(level).is_ok()
    }

    pub fn try_set_zoom(&mut self, level: i32) -> Result<()> {
        let (min, max) = (self.config.min_zoom, self.config.max_zoom);
        if level < min as i32 || level > max as i32 {
            return Err(MapError::InvalidZoom {
                zoom: level,
                min,
                max,
            });
        }
        if self.viewport.zoom as i32 != level {
            log::debug!("zoom {} -> {}", self.viewport.zoom, level);
            self.viewport.zoom = level as u8;
        }
        Ok(())
    }

    pub fn set_center(&mut self, center: LatLng) -> Result<()> {
        self.viewport.set_center(center)
    }

    /// Drags the map by a screen-pixel delta
    pub fn pan_by(&mut self, dx: i64, dy: i64) -> Result<()> {
        self.viewport.pan_by(dx, dy)
    }

    /// Recenters on the screen point and zooms in one level. Returns false,
    /// leaving the view as it was, at the maximum zoom.
    pub fn zoom_in_at(&mut self, x: i64, y: i64) -> Result<bool> {
        if self.viewport.zoom >= self.config.max_zoom {
            return Ok(false);
        }
        let target = self.viewport.screen_to_geo(x, y)?;
        self.viewport.set_center(target)?;
        Ok(self.zoom_in())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.set_size(width, height);
    }

    /// Deletes the active provider's tiles from disk and forgets every
    /// pending and failed download
    pub fn clear_cache(&mut self) -> Result<()> {
        self.fetcher.cancel();
        self.queue.clear();
        self.index.clear()
    }

    /// Lets tiles that were given up on be requested again
    pub fn retry_failed(&mut self) -> usize {
        let cleared = self.queue.clear_failed();
        if cleared > 0 {
            log::info!("{} failed tiles eligible for download again", cleared);
        }
        cleared
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.config
            .providers
            .iter()
            .map(|provider| provider.name.as_str())
            .collect()
    }

    /// Switches to another tile server and its own cache directory
    pub fn set_server(&mut self, index: usize) -> Result<()> {
        let provider = self
            .config
            .providers
            .get(index)
            .ok_or(MapError::UnknownServer(index))?;
        let root = self.config.cache_root.join(&provider.name);

        self.fetcher.cancel();
        self.queue.clear();
        self.store = DiskStore::new(&root, provider.format.as_str());
        self.index = CacheIndex::init_from_disk(&root, &provider.format);
        self.provider_index = index;
        log::info!("switched to tile server {}", provider.name);
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            tiles: self.index.len(),
            bytes: self.index.total_bytes(),
            pending: self.queue.len(),
            failed: self.queue.failed_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Answers with the URL itself, or fails for URLs containing `fail_on`
    struct EchoLoader {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl TileLoader for EchoLoader {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            match self.fail_on {
                Some(pattern) if url.contains(pattern) => {
                    Err(MapError::Network(format!("HTTP 404 Not Found for {}", url)))
                }
                _ => Ok(url.as_bytes().to_vec()),
            }
        }
    }

    fn view_in(dir: &tempfile::TempDir, fail_on: Option<&'static str>) -> TileView {
        let config = TileViewConfig {
            fetch: crate::FetchConfig::for_testing(),
            ..TileViewConfig::default()
        }
        .with_cache_root(dir.path());
        TileView::new(config, Arc::new(EchoLoader { fail_on })).unwrap()
    }

    #[tokio::test]
    async fn test_first_frame_is_all_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        let tiles = view.frame().unwrap();

        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| t.fetch == TileFetch::Pending));
        assert_eq!(view.cache_stats().pending, tiles.len());
        assert!(matches!(view.fetch_state(), FetchState::Fetching { .. }));

        // A second pass queues nothing new
        view.frame().unwrap();
        assert_eq!(view.cache_stats().pending, tiles.len());
    }

    #[tokio::test]
    async fn test_drain_fills_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        let needed = view.frame().unwrap().len();

        let events = view.drain().await;
        assert_eq!(events.len(), needed);
        let stats = view.cache_stats();
        assert_eq!(stats.tiles, needed);
        assert_eq!(stats.pending, 0);
        assert!(stats.bytes > 0);

        let tiles = view.frame().unwrap();
        assert!(tiles.iter().all(|t| t.fetch.is_hit()));
        let first = &tiles[0];
        assert_eq!(
            first.fetch.bytes().unwrap(),
            view.provider().url(first.coord).as_bytes()
        );
        assert!(view.fetch_state() == &FetchState::Idle);
    }

    #[tokio::test]
    async fn test_cache_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let coord = TileCoord::new(7, 72, 35);
        {
            let mut view = view_in(&dir, None);
            assert_eq!(view.get_tile(coord).unwrap(), TileFetch::Pending);
            view.drain().await;
        }
        let mut view = view_in(&dir, None);
        assert_eq!(view.cache_stats().tiles, 1);
        assert!(view.get_tile(coord).unwrap().is_hit());
        assert!(dir.path().join("osm/7/72/35.png").is_file());
    }

    #[tokio::test]
    async fn test_failed_tile_stays_failed_until_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, Some("/3/1/1."));
        let coord = TileCoord::new(3, 1, 1);

        assert_eq!(view.get_tile(coord).unwrap(), TileFetch::Pending);
        let events = view.drain().await;
        assert!(matches!(&events[..], [FetchEvent::Dropped { .. }]));
        assert_eq!(view.get_tile(coord).unwrap(), TileFetch::Failed);
        assert_eq!(view.cache_stats().failed, 1);

        assert_eq!(view.retry_failed(), 1);
        assert_eq!(view.get_tile(coord).unwrap(), TileFetch::Pending);
    }

    #[tokio::test]
    async fn test_vanished_file_is_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        let coord = TileCoord::new(2, 3, 1);
        view.get_tile(coord).unwrap();
        view.drain().await;

        std::fs::remove_file(dir.path().join("osm/2/3/1.png")).unwrap();
        assert_eq!(view.get_tile(coord).unwrap(), TileFetch::Pending);
        assert_eq!(view.cache_stats().tiles, 0);
        view.drain().await;
        assert!(view.get_tile(coord).unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_unreadable_tile_does_not_break_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        let needed = view.frame().unwrap().len();
        view.drain().await;

        let broken = view.frame().unwrap()[0].coord;
        let path = dir
            .path()
            .join(format!("osm/{}/{}/{}.png", broken.z, broken.x, broken.y));
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let tiles = view.frame().unwrap();
        assert_eq!(tiles.len(), needed);
        assert_eq!(tiles[0].fetch, TileFetch::Pending);
        assert!(tiles[1..].iter().all(|t| t.fetch.is_hit()));
        assert_eq!(view.cache_stats().tiles, needed - 1);

        // The replacement cannot be renamed over the directory, so it is dropped
        let events = view.drain().await;
        assert!(matches!(&events[..], [FetchEvent::Dropped { .. }]));
        assert_eq!(view.frame().unwrap()[0].fetch, TileFetch::Failed);
    }

    #[tokio::test]
    async fn test_invalid_tile_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        assert!(matches!(
            view.get_tile(TileCoord::new(1, 2, 0)),
            Err(MapError::InvalidTile(_))
        ));
        assert_eq!(view.cache_stats().pending, 0);
    }

    #[tokio::test]
    async fn test_zoom_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        assert!(view.set_zoom(18));
        assert!(!view.zoom_in());
        assert_eq!(view.viewport().zoom, 18);

        assert!(!view.set_zoom(19));
        assert!(matches!(
            view.try_set_zoom(-1),
            Err(MapError::InvalidZoom { zoom: -1, min: 0, max: 18 })
        ));
        assert_eq!(view.viewport().zoom, 18);

        assert!(view.set_zoom(0));
        assert!(!view.zoom_out());
        assert_eq!(view.viewport().zoom, 0);
    }

    #[tokio::test]
    async fn test_set_center_rejects_poles() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        let before = view.viewport().center;
        assert!(matches!(
            view.set_center(LatLng::new(89.0, 0.0)),
            Err(MapError::OutOfRangeCoordinate(_))
        ));
        assert_eq!(view.viewport().center, before);

        view.set_center(LatLng::new(10.0, 190.0)).unwrap();
        assert!((view.viewport().center.lng + 170.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zoom_in_at_center_keeps_center() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        let before = view.viewport().center;
        assert!(view.zoom_in_at(192, 192).unwrap());
        assert_eq!(view.viewport().zoom, 8);
        assert!((view.viewport().center.lat - before.lat).abs() < 0.02);
        assert!((view.viewport().center.lng - before.lng).abs() < 0.02);

        view.set_zoom(18);
        let before = view.viewport().center;
        assert!(!view.zoom_in_at(0, 0).unwrap());
        assert_eq!(view.viewport().center, before);
    }

    #[tokio::test]
    async fn test_resize_changes_tile_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        let small = view.visible_tiles().unwrap();
        view.resize(1024, 768);
        let large = view.visible_tiles().unwrap();
        assert!(large.columns() * large.rows() > small.columns() * small.rows());
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = view_in(&dir, None);
        view.get_tile(TileCoord::new(1, 0, 0)).unwrap();
        view.drain().await;
        view.get_tile(TileCoord::new(1, 1, 0)).unwrap();

        view.clear_cache().unwrap();
        assert_eq!(view.cache_stats(), CacheStats::default());
        assert!(!dir.path().join("osm").exists());
        assert!(view.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_switching_servers() {
        let dir = tempfile::tempdir().unwrap();
        let config = TileViewConfig {
            providers: vec![
                TileProvider::openstreetmap(),
                TileProvider::new("topo", "http://topo.test/{z}/{x}/{y}.{format}", "jpg"),
            ],
            fetch: crate::FetchConfig::for_testing(),
            ..TileViewConfig::default()
        }
        .with_cache_root(dir.path());
        let mut view = TileView::new(config, Arc::new(EchoLoader { fail_on: None })).unwrap();
        assert_eq!(view.server_names(), vec!["osm", "topo"]);

        view.frame().unwrap();
        assert!(matches!(view.set_server(2), Err(MapError::UnknownServer(2))));
        assert_eq!(view.provider().name, "osm");

        view.set_server(1).unwrap();
        assert_eq!(view.provider().name, "topo");
        assert_eq!(view.cache_stats().pending, 0);
        assert!(view.fetch_state() == &FetchState::Idle);

        let coord = TileCoord::new(0, 0, 0);
        view.get_tile(coord).unwrap();
        view.drain().await;
        assert!(dir.path().join("topo/0/0/0.jpg").is_file());
        assert_eq!(
            view.get_tile(coord).unwrap(),
            TileFetch::Hit(b"http://topo.test/0/0/0.jpg".to_vec())
        );
    }
}
