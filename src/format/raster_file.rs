//! Single-image raster files (PNG, JPEG).
//!
//! The whole image is decoded when the file is opened and served as one
//! scene backed by a single tile, so region reads go through the same
//! compositor as the tiled formats.

use std::path::Path;

use tracing::debug;

use crate::error::{FormatError, SlideError};
use crate::io::{FileRangeReader, RangeReader};
use crate::raster::{DataType, Raster, Rect, Size};
use crate::slide::{Resolution, Scene};
use crate::tile::{compose_region, TileSource};

/// The only scene of a [`RasterSlide`].
pub struct RasterScene {
    path: String,
    name: String,
    image: Raster,
    channel_names: Vec<String>,
}

impl RasterScene {
    /// The decoded image.
    pub fn image(&self) -> &Raster {
        &self.image
    }

    fn check_channel(&self, channel: usize) -> Result<(), SlideError> {
        if channel >= self.image.channels() {
            return Err(SlideError::OutOfRange {
                what: "channel",
                index: channel,
                count: self.image.channels(),
            });
        }
        Ok(())
    }
}

impl TileSource for RasterScene {
    fn tile_count(&self) -> usize {
        1
    }

    fn tile_rect(&self, _index: usize) -> Rect {
        Rect::from_size(self.image.size())
    }

    fn read_tile(&self, _index: usize, components: &[usize]) -> Result<Option<Raster>, SlideError> {
        Ok(Some(self.image.clone().select_channels(components)?))
    }
}

impl Scene for RasterScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_path(&self) -> &str {
        &self.path
    }

    fn rect(&self) -> Rect {
        Rect::from_size(self.image.size())
    }

    fn num_channels(&self) -> usize {
        self.image.channels()
    }

    fn channel_name(&self, channel: usize) -> Result<&str, SlideError> {
        self.check_channel(channel)?;
        Ok(&self.channel_names[channel])
    }

    fn channel_data_type(&self, channel: usize) -> Result<DataType, SlideError> {
        self.check_channel(channel)?;
        Ok(self.image.data_type())
    }

    fn resolution(&self) -> Resolution {
        Resolution::default()
    }

    fn magnification(&self) -> f64 {
        0.0
    }

    fn read_resampled_region(
        &self,
        rect: Rect,
        size: Size,
        components: &[usize],
    ) -> Result<Raster, SlideError> {
        if rect.is_empty() || size.is_empty() {
            return Err(SlideError::InvalidRegion { rect, size });
        }
        for &component in components {
            self.check_channel(component)?;
        }
        let raster =
            compose_region(self, components, rect, size)?.ok_or(SlideError::EmptyRegion { rect })?;
        if raster.size() != size {
            return Ok(raster.resize(size.width as u32, size.height as u32));
        }
        Ok(raster)
    }
}

/// A PNG or JPEG file opened as a one-scene slide.
pub struct RasterSlide {
    path: String,
    scene: RasterScene,
}

impl RasterSlide {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let reader = FileRangeReader::open(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::open_with_reader(&reader, &path.display().to_string(), &name)
    }

    /// Decode the whole image behind `reader`.
    pub fn open_with_reader(
        reader: &dyn RangeReader,
        path: &str,
        name: &str,
    ) -> Result<Self, SlideError> {
        let bytes = reader.read_exact_at(0, reader.size() as usize)?;
        let image = image::load_from_memory(&bytes).map_err(|e| FormatError::Decode {
            message: format!("{}: {}", path, e),
        })?;
        let image = Raster::from_dynamic_image(image);

        let channel_names = match image.channels() {
            3 | 4 => ["red", "green", "blue", "alpha"][..image.channels()]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            n => (0..n).map(|c| format!("Channel {}", c)).collect(),
        };
        debug!(
            path,
            width = image.width(),
            height = image.height(),
            channels = image.channels(),
            "opened raster image"
        );

        Ok(Self {
            path: path.to_string(),
            scene: RasterScene {
                path: path.to_string(),
                name: name.to_string(),
                image,
                channel_names,
            },
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn scene_count(&self) -> usize {
        1
    }

    pub fn scene(&self, index: usize) -> Result<&RasterScene, SlideError> {
        if index != 0 {
            return Err(SlideError::OutOfRange {
                what: "scene",
                index,
                count: 1,
            });
        }
        Ok(&self.scene)
    }
}
