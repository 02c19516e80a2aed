//! # tileview
//!
//! The engine behind a slippy-map tile viewer: Web Mercator projection,
//! visible-tile computation, a disk-backed tile cache and a single-flight
//! download queue that fills it.
//!
//! Rendering and gesture handling live outside this crate; a renderer drives
//! [`TileView::frame`] once per frame and paints placeholders for tiles that
//! are still pending.

pub mod core;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    config::{FetchConfig, RetryPolicy, TileViewConfig},
    geo::{LatLng, PixelPoint, TileCoord, TileId},
    map::{CacheStats, PlacedTile, TileView},
    projection::{geo_to_pixel, pixel_to_geo},
    viewport::{compute_visible_tiles, TileRange, Viewport},
};

pub use tiles::{
    fetcher::{FetchEvent, TileFetcher},
    index::CacheIndex,
    loader::{HttpTileLoader, TileLoader},
    queue::{DownloadQueue, PendingDownload},
    source::{TileProvider, TileSource},
    store::DiskStore,
    TileFetch,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid zoom {zoom}: allowed range is {min}..={max}")]
    InvalidZoom { zoom: i32, min: u8, max: u8 },

    #[error("Tile {0} does not exist at its zoom level")]
    InvalidTile(TileCoord),

    #[error("Latitude {0} is outside the projectable range")]
    OutOfRangeCoordinate(f64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch of {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Incomplete write for tile {id}: {written} of {expected} bytes")]
    IncompleteWrite {
        id: TileId,
        written: usize,
        expected: usize,
    },

    #[error("Tile {0} not found")]
    NotFound(TileId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown tile server index {0}")]
    UnknownServer(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error type alias for convenience
pub type Error = MapError;
