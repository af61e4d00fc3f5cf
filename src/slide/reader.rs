//! The `Scene` capability shared by every driver.
//!
//! A slide holds one or more scenes. A scene is a continuous raster with a
//! fixed set of channels that can be read at any resolution; drivers decide
//! how stored tiles map onto a request.

use crate::error::SlideError;
use crate::raster::{DataType, Raster, Rect, Size};

/// Physical size of one pixel, in metres. Zero when the file does not say.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

impl Resolution {
    /// Build a resolution from microns per pixel.
    pub fn from_microns(x: f64, y: f64) -> Self {
        Self {
            x: x * 1e-6,
            y: y * 1e-6,
        }
    }
}

/// Format-agnostic interface for reading regions of a scene.
///
/// Channel indices are 0-based and must be less than
/// [`num_channels`](Scene::num_channels). Regions are given in base-level
/// pixels relative to the scene origin.
pub trait Scene: Send + Sync {
    /// Human-readable scene name.
    fn name(&self) -> &str;

    /// Path of the file the scene was read from.
    fn file_path(&self) -> &str;

    /// Extent of the scene at full resolution.
    fn rect(&self) -> Rect;

    fn num_channels(&self) -> usize;

    fn channel_name(&self, channel: usize) -> Result<&str, SlideError>;

    fn channel_data_type(&self, channel: usize) -> Result<DataType, SlideError>;

    fn resolution(&self) -> Resolution;

    /// Objective magnification; 0 when unknown.
    fn magnification(&self) -> f64;

    fn num_z_slices(&self) -> usize {
        1
    }

    fn num_t_frames(&self) -> usize {
        1
    }

    /// Read `rect` resampled to `size`.
    ///
    /// An empty `components` list reads every channel in index order.
    ///
    /// # Errors
    /// - `InvalidRegion` if `rect` or `size` has no area
    /// - `OutOfRange` for a channel index past the channel count
    /// - `EmptyRegion` if no stored tile intersects `rect`
    /// - `Format` for I/O or decode failures
    fn read_resampled_region(
        &self,
        rect: Rect,
        size: Size,
        components: &[usize],
    ) -> Result<Raster, SlideError>;

    /// Read `rect` at full resolution.
    fn read_region(&self, rect: Rect, components: &[usize]) -> Result<Raster, SlideError> {
        self.read_resampled_region(rect, rect.size(), components)
    }
}
