//! Tiled TIFF and Aperio SVS slides.
//!
//! # File Structure
//!
//! SVS files are TIFF files containing:
//! - **Pyramid levels**: full resolution image and progressively smaller versions
//! - **Thumbnail**: small preview, usually the second IFD
//! - **Label** and **Macro**: images named in their ImageDescription
//!
//! The pyramid becomes the "Image" scene; auxiliary images that can be
//! decoded become single-level scenes of their own. Generic tiled TIFFs are
//! read the same way without the Aperio metadata.
//!
//! # Metadata
//!
//! The first ImageDescription holds pipe-separated `key = value` pairs,
//! including microns per pixel (`MPP`) and objective magnification (`AppMag`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{FormatError, SlideError, TiffError};
use crate::io::{BlockCache, FileRangeReader, RangeReader};
use crate::raster::{scale_rect, DataType, Raster, Rect, Size};
use crate::slide::{ReaderOptions, Resolution, Scene};
use crate::tile::{compose_region, select_zoom_level, TileSource};

use super::jpeg::{decode_jpeg, decode_jpeg2000, prepare_tile_jpeg};
use super::tiff::{
    validate_level, validate_pyramid, ByteOrder, Compression, Ifd, PyramidLevel, TiffHeader,
    TiffPyramid, TiffTag, TileData, ValueReader,
};

// =============================================================================
// SVS Metadata
// =============================================================================

/// Metadata from an Aperio ImageDescription.
#[derive(Debug, Clone, Default)]
pub struct SvsMetadata {
    /// Microns per pixel
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    pub vendor: Option<String>,

    pub image_description: Option<String>,

    /// Every `key = value` pair of the description
    pub properties: HashMap<String, String>,
}

impl SvsMetadata {
    /// Parse an ImageDescription string.
    ///
    /// ```text
    /// Aperio Image Library vXX.X.X
    /// 46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499
    /// ```
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata {
            image_description: Some(description.to_string()),
            ..Default::default()
        };

        if description.contains("Aperio") {
            metadata.vendor = Some("Aperio".to_string());
        }

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            metadata
                .properties
                .insert(key.to_string(), value.to_string());

            match key {
                "MPP" => metadata.mpp = value.parse::<f64>().ok(),
                "AppMag" => metadata.magnification = value.parse::<f64>().ok(),
                _ => {}
            }
        }

        metadata
    }

    pub fn resolution(&self) -> Resolution {
        self.mpp
            .map(|mpp| Resolution::from_microns(mpp, mpp))
            .unwrap_or_default()
    }
}

// =============================================================================
// TiffScene
// =============================================================================

/// One pyramid level with its tile locations loaded.
struct TiffLevel {
    level: PyramidLevel,
    tiles: TileData,
}

/// A tiled image of a TIFF file, read through its pyramid levels.
pub struct TiffScene {
    reader: Arc<dyn RangeReader>,
    path: String,
    name: String,
    byte_order: ByteOrder,
    levels: Vec<TiffLevel>,
    channels: usize,
    data_type: DataType,
    channel_names: Vec<String>,
    resolution: Resolution,
    magnification: f64,
}

impl TiffScene {
    fn new(
        reader: Arc<dyn RangeReader>,
        path: &str,
        name: &str,
        header: &TiffHeader,
        levels: Vec<PyramidLevel>,
        resolution: Resolution,
        magnification: f64,
    ) -> Result<Self, SlideError> {
        let base = levels.first().ok_or(TiffError::NoPyramidLevels)?;
        let (channels, data_type) = sample_layout(reader.as_ref(), header, &base.ifd)?;
        let channel_names = match channels {
            3 => ["red", "green", "blue"].map(String::from).to_vec(),
            n => (0..n).map(|c| format!("Channel {}", c)).collect(),
        };

        let levels = levels
            .into_iter()
            .map(|level| {
                let tiles = TileData::load(reader.as_ref(), &level, header)?;
                Ok(TiffLevel { level, tiles })
            })
            .collect::<Result<Vec<_>, TiffError>>()?;

        debug!(
            path,
            scene = name,
            levels = levels.len(),
            channels,
            data_type = %data_type,
            "built TIFF scene"
        );
        Ok(Self {
            reader,
            path: path.to_string(),
            name: name.to_string(),
            byte_order: header.byte_order,
            levels,
            channels,
            data_type,
            channel_names,
            resolution,
            magnification,
        })
    }

    /// Horizontal zoom factor of each level, finest first.
    pub fn level_zooms(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.level.zoom_x).collect()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn check_channel(&self, channel: usize) -> Result<(), SlideError> {
        if channel >= self.channels {
            return Err(SlideError::OutOfRange {
                what: "channel",
                index: channel,
                count: self.channels,
            });
        }
        Ok(())
    }

    /// Decode tile `index` of `level`; `None` for tiles stored without data.
    fn decode_tile(&self, level: &TiffLevel, index: u32) -> Result<Option<Raster>, SlideError> {
        let (offset, byte_count) =
            level
                .tiles
                .get_tile_location(index)
                .ok_or(SlideError::OutOfRange {
                    what: "tile",
                    index: index as usize,
                    count: level.tiles.offsets.len(),
                })?;
        if byte_count == 0 {
            return Ok(None);
        }
        let data = self.reader.read_exact_at(offset, byte_count as usize)?;

        let (tile_width, tile_height) = (level.level.tile_width, level.level.tile_height);
        let raster = match Compression::from_u16(level.level.compression) {
            Some(Compression::None) => self.decode_uncompressed(&data, tile_width, tile_height)?,
            Some(Compression::Jpeg) => {
                let stream = prepare_tile_jpeg(level.tiles.jpeg_tables.as_deref(), &data);
                decode_jpeg(&stream)?
            }
            Some(Compression::Jpeg2000) => decode_jpeg2000(&data, true)?,
            Some(Compression::Jpeg2000Rgb) => decode_jpeg2000(&data, false)?,
            Some(other) => {
                return Err(TiffError::UnsupportedCompression(other.name().to_string()).into())
            }
            None => {
                return Err(TiffError::UnsupportedCompression(format!(
                    "Unknown ({})",
                    level.level.compression
                ))
                .into())
            }
        };

        if raster.channels() != self.channels {
            return Err(FormatError::Decode {
                message: format!(
                    "{}: tile {} decoded to {} channels, expected {}",
                    self.path,
                    index,
                    raster.channels(),
                    self.channels
                ),
            }
            .into());
        }
        Ok(Some(raster.pad_to(tile_width, tile_height)?))
    }

    /// Raw samples; a short final strip is zero-padded.
    fn decode_uncompressed(
        &self,
        data: &Bytes,
        width: u32,
        height: u32,
    ) -> Result<Raster, FormatError> {
        let sample = self.data_type.size();
        let expected = width as usize * height as usize * self.channels * sample;
        let mut bytes = vec![0u8; expected];
        let available = data.len().min(expected);
        bytes[..available].copy_from_slice(&data[..available]);
        if self.byte_order == ByteOrder::BigEndian && sample > 1 {
            for value in bytes.chunks_exact_mut(sample) {
                value.reverse();
            }
        }
        Raster::from_bytes(width, height, self.channels, self.data_type, bytes)
    }
}

/// Channel count and element type from SamplesPerPixel, BitsPerSample and
/// SampleFormat.
fn sample_layout(
    reader: &dyn RangeReader,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<(usize, DataType), TiffError> {
    let values = ValueReader::new(reader, header);
    let first_value = |tag: TiffTag, default: u64| -> Result<u64, TiffError> {
        match ifd.get_entry_by_tag(tag) {
            Some(entry) => Ok(values
                .read_u64_array(entry)?
                .first()
                .copied()
                .unwrap_or(default)),
            None => Ok(default),
        }
    };

    let channels = ifd.samples_per_pixel(header.byte_order).unwrap_or(1).max(1) as usize;
    let bits = first_value(TiffTag::BitsPerSample, 8)?;
    let format = first_value(TiffTag::SampleFormat, 1)?;
    let data_type = match (bits, format) {
        (8, _) => DataType::Byte,
        (16, 2) => DataType::Int16,
        (16, _) => DataType::UInt16,
        (32, 2) => DataType::Int32,
        (32, 3) => DataType::Float32,
        (64, 3) => DataType::Float64,
        _ => {
            return Err(TiffError::InvalidTagValue {
                tag: "BitsPerSample",
                message: format!("{} bits with sample format {}", bits, format),
            })
        }
    };
    Ok((channels, data_type))
}

/// The tiles of one level in level pixel coordinates.
struct LevelTiles<'a> {
    scene: &'a TiffScene,
    level: &'a TiffLevel,
}

impl TileSource for LevelTiles<'_> {
    fn tile_count(&self) -> usize {
        self.level.level.tile_count() as usize
    }

    fn tile_rect(&self, index: usize) -> Rect {
        let level = &self.level.level;
        let tiles_x = level.tiles_x.max(1) as usize;
        let (tx, ty) = (index % tiles_x, index / tiles_x);
        Rect::new(
            tx as i32 * level.tile_width as i32,
            ty as i32 * level.tile_height as i32,
            level.tile_width as i32,
            level.tile_height as i32,
        )
    }

    fn read_tile(&self, index: usize, components: &[usize]) -> Result<Option<Raster>, SlideError> {
        match self.scene.decode_tile(self.level, index as u32)? {
            Some(raster) => Ok(Some(raster.select_channels(components)?)),
            None => Ok(None),
        }
    }
}

impl Scene for TiffScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_path(&self) -> &str {
        &self.path
    }

    fn rect(&self) -> Rect {
        match self.levels.first() {
            Some(base) => Rect::new(0, 0, base.level.width as i32, base.level.height as i32),
            None => Rect::default(),
        }
    }

    fn num_channels(&self) -> usize {
        self.channels
    }

    fn channel_name(&self, channel: usize) -> Result<&str, SlideError> {
        self.check_channel(channel)?;
        Ok(&self.channel_names[channel])
    }

    fn channel_data_type(&self, channel: usize) -> Result<DataType, SlideError> {
        self.check_channel(channel)?;
        Ok(self.data_type)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn magnification(&self) -> f64 {
        self.magnification
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

        let zoom = f64::max(
            size.width as f64 / rect.width as f64,
            size.height as f64 / rect.height as f64,
        );
        let level_index = select_zoom_level(zoom, &self.level_zooms());
        let level = &self.levels[level_index];
        let level_rect = scale_rect(&rect, level.level.zoom_x, level.level.zoom_y);
        if level_rect.is_empty() {
            return Err(SlideError::InvalidRegion { rect, size });
        }

        debug!(
            scene = %self.name,
            rect = %rect,
            size = %size,
            level = level_index,
            level_rect = %level_rect,
            "reading TIFF region"
        );

        let source = LevelTiles { scene: self, level };
        let raster = compose_region(&source, components, level_rect, size)?
            .ok_or(SlideError::EmptyRegion { rect })?;
        if raster.size() != size {
            return Ok(raster.resize(size.width as u32, size.height as u32));
        }
        Ok(raster)
    }
}

// =============================================================================
// TiffSlide
// =============================================================================

/// Auxiliary image kinds, in scene order.
const AUXILIARY_SCENES: [&str; 3] = ["Thumbnail", "Label", "Macro"];

/// An open TIFF or SVS file.
pub struct TiffSlide {
    path: String,
    metadata: SvsMetadata,
    scenes: Vec<TiffScene>,
}

impl TiffSlide {
    /// Open a file from disk through a block cache.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let reader = FileRangeReader::open(path)?;
        let cached = BlockCache::with_capacity(reader, options.block_size, options.cache_blocks);
        Self::open_with_reader(Arc::new(cached), &path.display().to_string())
    }

    /// Parse the IFD chain and build the scenes.
    ///
    /// # Errors
    /// Fails if the pyramid cannot be decoded (strips only, unsupported
    /// compression or sample layout). Auxiliary images that cannot be decoded
    /// are skipped.
    pub fn open_with_reader(reader: Arc<dyn RangeReader>, path: &str) -> Result<Self, SlideError> {
        let pyramid = TiffPyramid::parse(reader.as_ref())?;
        let validation = validate_pyramid(&pyramid);
        for warning in &validation.warnings {
            warn!(path, "{}", warning);
        }
        validation.into_result()?;

        let header = pyramid.header;
        let description = first_description(reader.as_ref(), &pyramid)?;
        let metadata = SvsMetadata::parse(&description);

        let mut scenes = vec![TiffScene::new(
            reader.clone(),
            path,
            "Image",
            &header,
            pyramid.levels.clone(),
            metadata.resolution(),
            metadata.magnification.unwrap_or(0.0),
        )?];

        let mut auxiliary = Vec::new();
        for (ifd_index, ifd) in &pyramid.other_ifds {
            let text = image_description(reader.as_ref(), &header, ifd)?.to_ascii_lowercase();
            let kind = if text.contains("label") {
                "Label"
            } else if text.contains("macro") {
                "Macro"
            } else if *ifd_index == 1 {
                "Thumbnail"
            } else {
                continue;
            };

            let Some(level) = PyramidLevel::from_ifd(ifd.clone(), *ifd_index, header.byte_order)
                .or_else(|| PyramidLevel::from_strips(ifd.clone(), *ifd_index, header.byte_order))
            else {
                continue;
            };
            if let Err(e) = validate_level(&level, header.byte_order).into_result() {
                debug!(path, image = kind, error = %e, "skipping auxiliary image");
                continue;
            }
            match TiffScene::new(
                reader.clone(),
                path,
                kind,
                &header,
                vec![level],
                Resolution::default(),
                0.0,
            ) {
                Ok(scene) => auxiliary.push(scene),
                Err(e) => warn!(path, image = kind, error = %e, "skipping auxiliary image"),
            }
        }
        auxiliary.sort_by_key(|scene| AUXILIARY_SCENES.iter().position(|k| *k == scene.name));
        scenes.extend(auxiliary);

        debug!(
            path,
            vendor = metadata.vendor.as_deref().unwrap_or("generic"),
            scenes = scenes.len(),
            "opened TIFF slide"
        );
        Ok(Self {
            path: path.to_string(),
            metadata,
            scenes,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &SvsMetadata {
        &self.metadata
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn scene(&self, index: usize) -> Result<&TiffScene, SlideError> {
        self.scenes.get(index).ok_or(SlideError::OutOfRange {
            what: "scene",
            index,
            count: self.scenes.len(),
        })
    }

    pub fn scenes(&self) -> &[TiffScene] {
        &self.scenes
    }
}

/// ImageDescription of the first IFD in the file.
fn first_description(reader: &dyn RangeReader, pyramid: &TiffPyramid) -> Result<String, TiffError> {
    let first = pyramid
        .levels
        .iter()
        .map(|l| (l.ifd_index, &l.ifd))
        .chain(pyramid.other_ifds.iter().map(|(i, ifd)| (*i, ifd)))
        .min_by_key(|(index, _)| *index);
    match first {
        Some((_, ifd)) => image_description(reader, &pyramid.header, ifd),
        None => Ok(String::new()),
    }
}

fn image_description(
    reader: &dyn RangeReader,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<String, TiffError> {
    match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        Some(entry) => ValueReader::new(reader, header).read_string(entry),
        None => Ok(String::new()),
    }
}
