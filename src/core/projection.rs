//! Web Mercator conversion between geographic coordinates and world pixels.
//!
//! Both directions are pure functions of `(zoom, tile_size)`. Pixel values are
//! truncated to integers, so a round trip loses at most one pixel's worth of
//! degrees.

use crate::core::constants::MAX_SUPPORTED_ZOOM;
use crate::core::geo::{LatLng, PixelPoint};
use crate::{MapError, Result};

/// Width and height of the whole map in pixels at `zoom`
pub fn map_size(zoom: u8, tile_size: u32) -> u64 {
    (tile_size as u64) << zoom
}

fn check_grid(zoom: u8, tile_size: u32) -> Result<()> {
    if tile_size == 0 {
        return Err(MapError::InvalidConfig("tile_size must be positive".into()));
    }
    if zoom > MAX_SUPPORTED_ZOOM {
        return Err(MapError::InvalidZoom {
            zoom: zoom as i32,
            min: 0,
            max: MAX_SUPPORTED_ZOOM,
        });
    }
    Ok(())
}

/// Projects a coordinate into world pixel space.
///
/// Longitude is not normalized here; values left of -180 saturate to column
/// zero, so callers wrap first. Latitude must be inside the projectable range.
pub fn geo_to_pixel(coord: &LatLng, zoom: u8, tile_size: u32) -> Result<PixelPoint> {
    check_grid(zoom, tile_size)?;
    if !coord.is_projectable() {
        return Err(MapError::OutOfRangeCoordinate(coord.lat));
    }

    let size = map_size(zoom, tile_size) as f64;
    let lat_m = coord.lat.to_radians().sin().atanh().to_degrees();

    let x = size * (coord.lng + 180.0) / 360.0;
    let y = size * (180.0 - lat_m) / 360.0;

    Ok(PixelPoint::new(x as u64, y as u64))
}

/// Inverse of [`geo_to_pixel`]
pub fn pixel_to_geo(pixel: &PixelPoint, zoom: u8, tile_size: u32) -> Result<LatLng> {
    check_grid(zoom, tile_size)?;
    let size = map_size(zoom, tile_size) as f64;

    let lng = pixel.x as f64 * 360.0 / size - 180.0;
    let lat_m = 180.0 - pixel.y as f64 * 360.0 / size;
    let lat = lat_m.to_radians().tanh().asin().to_degrees();

    Ok(LatLng::new(lat, lng))
}
