//! Pyramid level discovery in tiled TIFF files.
//!
//! Slide TIFFs hold several images: the resolution pyramid plus label,
//! macro and thumbnail images. Pyramid levels are identified by:
//! 1. Being tiled with TileOffsets/TileByteCounts present
//! 2. Sharing the aspect ratio of the largest tiled image
//! 3. Largest tiled image is level 0
//!
//! Labels and macros are usually stored in strips or have a different
//! aspect ratio, so they end up in [`TiffPyramid::other_ifds`].

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES};
use super::tags::TiffTag;
use super::values::ValueReader;

/// Maximum number of IFDs to parse
const MAX_IFDS: usize = 100;

/// Relative aspect-ratio difference still accepted for a pyramid level.
const ASPECT_TOLERANCE: f64 = 0.02;

// =============================================================================
// PyramidLevel
// =============================================================================

/// A single level in the image pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// 0 = highest resolution
    pub level_index: usize,
    /// Position of the IFD in the file's IFD chain
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Level width over base width (1.0 for level 0)
    pub zoom_x: f64,
    /// Level height over base height
    pub zoom_y: f64,
    /// TIFF compression code
    pub compression: u16,
    pub ifd: Ifd,
    pub tile_offsets_entry: Option<IfdEntry>,
    pub tile_byte_counts_entry: Option<IfdEntry>,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Returns None if the IFD is not tiled.
    pub fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order).filter(|&w| w > 0)?;
        let tile_height = ifd.tile_height(byte_order).filter(|&h| h > 0)?;
        let width = ifd.image_width(byte_order).filter(|&w| w > 0)?;
        let height = ifd.image_height(byte_order).filter(|&h| h > 0)?;
        let compression = ifd.compression(byte_order).unwrap_or(1);

        let tile_offsets_entry = ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned();
        let tile_byte_counts_entry = ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned();
        let jpeg_tables_entry = ifd.get_entry_by_tag(TiffTag::JpegTables).cloned();

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            zoom_x: 1.0,
            zoom_y: 1.0,
            compression,
            ifd,
            tile_offsets_entry,
            tile_byte_counts_entry,
            jpeg_tables_entry,
        })
    }

    /// Treat a stripped image as a single column of full-width tiles.
    ///
    /// Returns None if the IFD has no strips.
    pub fn from_strips(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let width = ifd.image_width(byte_order).filter(|&w| w > 0)?;
        let height = ifd.image_height(byte_order).filter(|&h| h > 0)?;
        let tile_offsets_entry = Some(ifd.get_entry_by_tag(TiffTag::StripOffsets)?.clone());
        let tile_byte_counts_entry = ifd.get_entry_by_tag(TiffTag::StripByteCounts).cloned();
        let rows_per_strip = ifd
            .get_entry_by_tag(TiffTag::RowsPerStrip)
            .and_then(|e| e.inline_u32(byte_order))
            .filter(|&rows| rows > 0)
            .map_or(height, |rows| rows.min(height));
        let compression = ifd.compression(byte_order).unwrap_or(1);
        let jpeg_tables_entry = ifd.get_entry_by_tag(TiffTag::JpegTables).cloned();

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width: width,
            tile_height: rows_per_strip,
            tiles_x: 1,
            tiles_y: height.div_ceil(rows_per_strip),
            zoom_x: 1.0,
            zoom_y: 1.0,
            compression,
            ifd,
            tile_offsets_entry,
            tile_byte_counts_entry,
            jpeg_tables_entry,
        })
    }

    pub fn has_tile_data(&self) -> bool {
        self.tile_offsets_entry.is_some() && self.tile_byte_counts_entry.is_some()
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Row-major tile index; None if out of bounds.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }

    fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// Pyramid levels of a TIFF file, sorted by resolution (level 0 = highest).
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub levels: Vec<PyramidLevel>,
    /// IFDs that are not pyramid levels (label, macro, thumbnail)
    pub other_ifds: Vec<(usize, Ifd)>,
}

impl TiffPyramid {
    /// Read the header and IFD chain and identify pyramid levels.
    ///
    /// # Errors
    /// - `StripOrganization` if the images are stored in strips only
    /// - `NoPyramidLevels` if no IFD is a tiled image
    pub fn parse(reader: &dyn RangeReader) -> Result<Self, TiffError> {
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header)?;
        let pyramid = Self::build_pyramid(header, ifds);
        if pyramid.levels.is_empty() {
            if pyramid.other_ifds.iter().any(|(_, ifd)| ifd.is_stripped()) {
                return Err(TiffError::StripOrganization);
            }
            return Err(TiffError::NoPyramidLevels);
        }

        debug!(
            resource = reader.identifier(),
            levels = pyramid.levels.len(),
            other_images = pyramid.other_ifds.len(),
            "parsed TIFF pyramid"
        );
        Ok(pyramid)
    }

    /// Follow the next-IFD chain.
    fn parse_all_ifds(reader: &dyn RangeReader, header: &TiffHeader) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size())?;
            let entry_count = header.read_entry_count(&count_bytes);
            if entry_count > MAX_IFD_ENTRIES {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    fn build_pyramid(header: TiffHeader, ifds: Vec<Ifd>) -> Self {
        let mut candidates: Vec<PyramidLevel> = Vec::new();
        let mut other_ifds: Vec<(usize, Ifd)> = Vec::new();

        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            match PyramidLevel::from_ifd(ifd.clone(), ifd_index, header.byte_order) {
                Some(level) if level.has_tile_data() => candidates.push(level),
                _ => other_ifds.push((ifd_index, ifd)),
            }
        }

        // Largest first; the sort is stable so equal areas keep file order
        candidates.sort_by_key(|l| std::cmp::Reverse(l.width as u64 * l.height as u64));

        let mut levels: Vec<PyramidLevel> = Vec::new();
        for mut level in candidates {
            let accepted = match levels.first() {
                None => true,
                Some(base) => {
                    let aspect_diff = (level.aspect() - base.aspect()).abs() / base.aspect();
                    aspect_diff <= ASPECT_TOLERANCE
                }
            };
            if !accepted {
                other_ifds.push((level.ifd_index, level.ifd));
                continue;
            }
            if let Some(base) = levels.first() {
                level.zoom_x = level.width as f64 / base.width as f64;
                level.zoom_y = level.height as f64 / base.height as f64;
            }
            level.level_index = levels.len();
            levels.push(level);
        }

        other_ifds.sort_by_key(|(index, _)| *index);
        TiffPyramid {
            header,
            levels,
            other_ifds,
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    /// Horizontal zoom of each level, finest first.
    pub fn zooms(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.zoom_x).collect()
    }
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Tile locations and shared JPEG tables of one level.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    pub fn load(
        reader: &dyn RangeReader,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets = match level.tile_offsets_entry {
            Some(ref entry) => values.read_u64_array(entry)?,
            None => return Err(TiffError::MissingTag("TileOffsets")),
        };
        let byte_counts = match level.tile_byte_counts_entry {
            Some(ref entry) => values.read_u64_array(entry)?,
            None => return Err(TiffError::MissingTag("TileByteCounts")),
        };
        let jpeg_tables = match level.jpeg_tables_entry {
            Some(ref entry) => Some(values.read_bytes(entry)?),
            None => None,
        };

        if offsets.len() < level.tile_count() as usize || byte_counts.len() < offsets.len() {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "{} offsets and {} byte counts for {} tiles",
                    offsets.len(),
                    byte_counts.len(),
                    level.tile_count()
                ),
            });
        }

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// Offset and size of tile `tile_index`.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}
