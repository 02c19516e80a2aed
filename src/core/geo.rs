use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::constants::{MAX_LATITUDE, MAX_SUPPORTED_ZOOM};

/// Represents a geographical coordinate with latitude and longitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether the latitude lies inside the open interval the Mercator
    /// transform is defined on
    pub fn is_projectable(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat > -MAX_LATITUDE
            && self.lat < MAX_LATITUDE
    }

    /// Wraps longitude to the [-180, 180) range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
        // rem_euclid can round up to exactly 360 for tiny negative inputs
        if wrapped >= 180.0 {
            wrapped - 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the projectable range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Returns a copy with the longitude wrapped
    pub fn wrapped(&self) -> Self {
        Self::new(self.lat, Self::wrap_lng(self.lng))
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Integer position in world pixel space for one zoom level.
///
/// The full map at zoom `z` is `tile_size * 2^z` pixels square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: u64,
    pub y: u64,
}

impl PixelPoint {
    pub fn new(x: u64, y: u64) -> Self {
        Self { x, y }
    }
}

/// Address of one tile in the slippy map tile system.
///
/// `x` (the column) is always normalized into `[0, 2^z)`; build coordinates
/// through [`TileCoord::wrapped`] when the column comes from viewport math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at `zoom`
    pub fn tiles_per_axis(zoom: u8) -> u64 {
        1u64 << zoom
    }

    /// Normalizes a raw column into `[0, 2^zoom)` since the map repeats
    /// horizontally
    pub fn wrap_column(zoom: u8, column: i64) -> u32 {
        column.rem_euclid(Self::tiles_per_axis(zoom) as i64) as u32
    }

    /// Builds a coordinate from raw viewport indices. The column wraps; rows
    /// beyond the poles yield `None`.
    pub fn wrapped(zoom: u8, column: i64, row: i64) -> Option<Self> {
        let n = Self::tiles_per_axis(zoom) as i64;
        if row < 0 || row >= n {
            return None;
        }
        Some(Self::new(zoom, Self::wrap_column(zoom, column), row as u32))
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        let n = Self::tiles_per_axis(self.z);
        self.z <= MAX_SUPPORTED_ZOOM && (self.x as u64) < n && (self.y as u64) < n
    }

    /// Flattened lookup key
    pub fn id(&self) -> TileId {
        TileId::from(*self)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Stable key for cache membership and queue de-duplication.
///
/// Packs zoom, column and row into one integer; renders as `zoom.column.row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(u64);

const ID_AXIS_BITS: u32 = 29;
const ID_AXIS_MASK: u64 = (1 << ID_AXIS_BITS) - 1;

impl TileId {
    pub fn coord(&self) -> TileCoord {
        let z = (self.0 >> (2 * ID_AXIS_BITS)) as u8;
        let x = ((self.0 >> ID_AXIS_BITS) & ID_AXIS_MASK) as u32;
        let y = (self.0 & ID_AXIS_MASK) as u32;
        TileCoord::new(z, x, y)
    }
}

impl From<TileCoord> for TileId {
    fn from(coord: TileCoord) -> Self {
        Self(
            ((coord.z as u64) << (2 * ID_AXIS_BITS))
                | (((coord.x as u64) & ID_AXIS_MASK) << ID_AXIS_BITS)
                | ((coord.y as u64) & ID_AXIS_MASK),
        )
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coord = self.coord();
        write!(f, "{}.{}.{}", coord.z, coord.x, coord.y)
    }
}

/// Error returned when a `zoom.column.row` string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed tile id: {0}")]
pub struct ParseTileIdError(String);

impl FromStr for TileId {
    type Err = ParseTileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTileIdError(s.to_string());
        let mut parts = s.split('.');
        let (Some(z), Some(x), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let z: u8 = z.parse().map_err(|_| err())?;
        let x: u32 = x.parse().map_err(|_| err())?;
        let y: u32 = y.parse().map_err(|_| err())?;
        let coord = TileCoord::new(z, x, y);
        if !coord.is_valid() {
            return Err(err());
        }
        Ok(coord.id())
    }
}
