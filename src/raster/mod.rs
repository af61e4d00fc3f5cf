//! Pixel geometry and raster buffers.

mod buffer;
mod geometry;

pub use buffer::{DataType, Raster, Sample};
pub use geometry::{scale_rect, Rect, Size};
