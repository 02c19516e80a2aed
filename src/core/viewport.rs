use crate::core::constants::{MAX_PAN_LATITUDE, TILE_SIZE};
use crate::core::geo::{LatLng, PixelPoint, TileCoord};
use crate::core::projection::{geo_to_pixel, map_size, pixel_to_geo};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Inclusive range of tile indices covering a viewport, plus the pixel
/// offset that aligns the grid with the continuous pan position.
///
/// Column and row bounds are raw indices: columns may run past either side of
/// the antimeridian and rows may run past the poles. Use [`TileRange::placements`]
/// to get wrapped, addressable tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
    /// How far the `(left, top)` tile sticks out past the viewport's left edge
    pub offset_x: u32,
    /// How far the `(left, top)` tile sticks out past the viewport's top edge
    pub offset_y: u32,
    pub zoom: u8,
    pub tile_size: u32,
}

/// One tile of a [`TileRange`] together with where it lands on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub coord: TileCoord,
    pub x: i64,
    pub y: i64,
}

impl TileRange {
    pub fn columns(&self) -> u64 {
        (self.right - self.left + 1).max(0) as u64
    }

    pub fn rows(&self) -> u64 {
        (self.bottom - self.top + 1).max(0) as u64
    }

    pub fn contains(&self, column: i64, row: i64) -> bool {
        (self.left..=self.right).contains(&column) && (self.top..=self.bottom).contains(&row)
    }

    /// Screen position of the top-left corner of the tile at raw `(column, row)`
    pub fn screen_position(&self, column: i64, row: i64) -> (i64, i64) {
        let size = self.tile_size as i64;
        (
            (column - self.left) * size - self.offset_x as i64,
            (row - self.top) * size - self.offset_y as i64,
        )
    }

    /// Addressable tiles in row-major order. Columns are wrapped around the
    /// antimeridian, rows beyond the poles are skipped.
    pub fn placements(&self) -> impl Iterator<Item = TilePlacement> + '_ {
        (self.top..=self.bottom).flat_map(move |row| {
            (self.left..=self.right).filter_map(move |column| {
                let coord = TileCoord::wrapped(self.zoom, column, row)?;
                let (x, y) = self.screen_position(column, row);
                Some(TilePlacement { coord, x, y })
            })
        })
    }
}

/// Ceiling division for a positive divisor
fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1).div_euclid(b)
}

/// Tiles needed along one axis: `(first, last, offset)`
fn axis_span(position: u64, extent: u32, tile_size: u32) -> (i64, i64, u32) {
    let size = tile_size as i64;
    let center_tile = (position / tile_size as u64) as i64;
    let inside = (position % tile_size as u64) as i64;

    // Pixels between the viewport's leading edge and the center tile's leading edge
    let before = (extent / 2) as i64 - inside;
    // Pixels between the center tile's trailing edge and the viewport's trailing edge
    let after = (extent - extent / 2) as i64 + inside - size;

    let offset = (size - before.rem_euclid(size)) % size;
    (
        center_tile - ceil_div(before, size),
        center_tile + ceil_div(after, size),
        offset as u32,
    )
}

/// Computes the tiles a `width` x `height` viewport centered on `center` must
/// draw. Drawing tile `(col, row)` at [`TileRange::screen_position`] covers
/// every viewport pixel with no gaps.
pub fn compute_visible_tiles(
    center: &LatLng,
    zoom: u8,
    tile_size: u32,
    width: u32,
    height: u32,
) -> Result<TileRange> {
    let p = geo_to_pixel(&center.wrapped(), zoom, tile_size)?;
    let (left, right, offset_x) = axis_span(p.x, width, tile_size);
    let (top, bottom, offset_y) = axis_span(p.y, height, tile_size);

    Ok(TileRange {
        left,
        right,
        top,
        bottom,
        offset_x,
        offset_y,
        zoom,
        tile_size,
    })
}

/// The current view of the map: center, integer zoom and screen dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// The current zoom level
    pub zoom: u8,
    /// Width of the viewport in pixels
    pub width: u32,
    /// Height of the viewport in pixels
    pub height: u32,
    /// Edge length of a tile in pixels
    pub tile_size: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: LatLng::default(),
            zoom: 0,
            width: TILE_SIZE,
            height: TILE_SIZE,
            tile_size: TILE_SIZE,
        }
    }
}

impl Viewport {
    /// Creates a new viewport
    pub fn new(center: LatLng, zoom: u8, width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
            tile_size,
        }
    }

    /// Sets the center, wrapping longitude. Unprojectable latitudes are
    /// rejected and leave the viewport unchanged.
    pub fn set_center(&mut self, center: LatLng) -> Result<()> {
        let center = center.wrapped();
        geo_to_pixel(&center, self.zoom, self.tile_size)?;
        self.center = center;
        Ok(())
    }

    /// Sets the viewport size
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Tiles that must be drawn for the current view
    pub fn visible_tiles(&self) -> Result<TileRange> {
        compute_visible_tiles(
            &self.center,
            self.zoom,
            self.tile_size,
            self.width,
            self.height,
        )
    }

    /// Center in world pixels at the current zoom
    pub fn center_pixel(&self) -> Result<PixelPoint> {
        geo_to_pixel(&self.center, self.zoom, self.tile_size)
    }

    /// Geographic coordinate `dx`, `dy` world pixels away from the center.
    /// Longitude wraps around the antimeridian; latitude stays clear of the poles.
    fn offset_from_center(&self, dx: i64, dy: i64) -> Result<LatLng> {
        let p = self.center_pixel()?;
        let size = map_size(self.zoom, self.tile_size) as i64;
        let x = (p.x as i64 + dx).rem_euclid(size);
        let y = (p.y as i64 + dy).clamp(0, size);

        let geo = pixel_to_geo(&PixelPoint::new(x as u64, y as u64), self.zoom, self.tile_size)?;
        Ok(LatLng::new(
            geo.lat.clamp(-MAX_PAN_LATITUDE, MAX_PAN_LATITUDE),
            LatLng::wrap_lng(geo.lng),
        ))
    }

    /// Pans by a screen-pixel drag delta: dragging right moves the center west
    pub fn pan_by(&mut self, dx: i64, dy: i64) -> Result<()> {
        self.center = self.offset_from_center(-dx, -dy)?;
        Ok(())
    }

    /// Geographic coordinate under the screen point `(x, y)`
    pub fn screen_to_geo(&self, x: i64, y: i64) -> Result<LatLng> {
        self.offset_from_center(x - (self.width / 2) as i64, y - (self.height / 2) as i64)
    }
}
