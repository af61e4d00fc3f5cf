//! Format-independent tile assembly.
//!
//! Every tiled driver reads a region the same way:
//!
//! ```text
//! requested zoom ──► select_zoom_level ──► level tiles (TileSource)
//!                                                 │
//!                    region, output size ──► compose_region ──► Raster
//! ```
//!
//! - [`select_zoom_level`]: picks the pyramid level to read for a zoom factor
//! - [`TileSource`]: a level's tiles, their rectangles and a way to decode them
//! - [`compose_region`]: stitches the overlapping tiles into one output raster

mod composer;
mod zoom;

pub use composer::{compose_region, TileSource};
pub use zoom::select_zoom_level;
