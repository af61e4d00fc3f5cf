//! Region composition from independently stored tiles.

use tracing::trace;

use crate::error::SlideError;
use crate::raster::{scale_rect, Raster, Rect, Size};

/// Anything that stores an image as a set of positioned tiles.
///
/// Tile rectangles live in the same pixel space as the regions passed to
/// [`compose_region`]. Tiles may overlap and need not form a regular grid.
pub trait TileSource {
    /// Number of tiles.
    fn tile_count(&self) -> usize;

    /// Pixel rectangle covered by tile `index`.
    fn tile_rect(&self, index: usize) -> Rect;

    /// Decode tile `index` restricted to `components`.
    ///
    /// An empty component list selects every component. `Ok(None)` means the
    /// tile holds no data for the request and is skipped.
    fn read_tile(&self, index: usize, components: &[usize]) -> Result<Option<Raster>, SlideError>;
}

/// Compose `region` of `source` into a raster scaled to `output`.
///
/// Each tile overlapping `region` is decoded, resized into output space and
/// copied into place. Tile and region rectangles are mapped with
/// [`scale_rect`], so the result is `scale_rect(region)` sized and may be a
/// pixel larger than `output` on either axis. Where tiles overlap the last
/// one written wins.
///
/// The output takes the element type and channel count of the first decoded
/// tile. Returns `Ok(None)` when no tile contributed any pixels.
pub fn compose_region<S: TileSource + ?Sized>(
    source: &S,
    components: &[usize],
    region: Rect,
    output: Size,
) -> Result<Option<Raster>, SlideError> {
    if region.is_empty() || output.is_empty() {
        return Err(SlideError::InvalidRegion {
            rect: region,
            size: output,
        });
    }

    let scale_x = output.width as f64 / region.width as f64;
    let scale_y = output.height as f64 / region.height as f64;
    let scaled_region = scale_rect(&region, scale_x, scale_y);

    let mut composed: Option<Raster> = None;

    for index in 0..source.tile_count() {
        let tile_rect = source.tile_rect(index);
        if !tile_rect.intersects(&region) {
            continue;
        }

        let Some(tile) = source.read_tile(index, components)? else {
            continue;
        };

        let scaled_tile = scale_rect(&tile_rect, scale_x, scale_y);
        let overlap = scaled_region.intersection(&scaled_tile);
        if overlap.is_empty() {
            continue;
        }

        let target = composed.get_or_insert_with(|| {
            Raster::new(
                scaled_region.width as u32,
                scaled_region.height as u32,
                tile.channels(),
                tile.data_type(),
            )
        });

        let resized = tile.resize(scaled_tile.width as u32, scaled_tile.height as u32);
        target.copy_window(
            &resized,
            overlap.relative_to(scaled_tile.x, scaled_tile.y),
            overlap.x - scaled_region.x,
            overlap.y - scaled_region.y,
        )?;

        trace!(
            tile = index,
            tile_rect = %tile_rect,
            placed = %overlap,
            "composed tile"
        );
    }

    Ok(composed)
}
