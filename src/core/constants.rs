//! Core constants shared by the projection, viewport and cache layers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Latitude bound of the square Web Mercator world; beyond it the transform diverges.
pub const MAX_LATITUDE: f64 = 85.0511287798;

/// Panning never moves the center closer to a pole than this.
pub const MAX_PAN_LATITUDE: f64 = 85.0;

/// Highest zoom a [`TileId`](crate::core::geo::TileId) can encode.
pub const MAX_SUPPORTED_ZOOM: u8 = 29;

/// Default zoom bounds of the reference OpenStreetMap provider.
pub const DEFAULT_MIN_ZOOM: u8 = 0;
pub const DEFAULT_MAX_ZOOM: u8 = 18;

/// Suffix for tile files that are still being written.
pub const PARTIAL_SUFFIX: &str = "tmp";

/// User agent sent with tile requests; public tile servers reject anonymous clients.
pub const USER_AGENT: &str = concat!("tileview/", env!("CARGO_PKG_VERSION"));
