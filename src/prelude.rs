//! Prelude module for common tileview types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tileview::prelude::*;`

pub use crate::core::{
    config::{FetchConfig, RetryPolicy, TileViewConfig, ViewportSize},
    geo::{LatLng, PixelPoint, TileCoord, TileId},
    map::{CacheStats, PlacedTile, TileView},
    projection::{geo_to_pixel, map_size, pixel_to_geo},
    viewport::{compute_visible_tiles, TilePlacement, TileRange, Viewport},
};

pub use crate::tiles::{
    fetcher::{FetchEvent, FetchState, TileFetcher},
    index::CacheIndex,
    loader::{HttpTileLoader, TileLoader},
    queue::{DownloadQueue, EnqueueOutcome, PendingDownload},
    source::{TileProvider, TileSource},
    store::DiskStore,
    TileFetch,
};

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::future::BoxFuture;
