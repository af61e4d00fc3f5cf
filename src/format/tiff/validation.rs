//! Checks that a discovered pyramid can be decoded by the TIFF driver.
//!
//! # Supported Subset
//!
//! - **Organization**: tiled, chunky (interleaved) samples
//! - **Compression**: none, JPEG, JPEG 2000
//! - **Structure**: TileOffsets and TileByteCounts present, non-zero tile size
//!
//! Anything else is rejected when the slide is opened rather than on the
//! first region read.

use crate::error::TiffError;

use super::parser::ByteOrder;
use super::pyramid::{PyramidLevel, TiffPyramid};
use super::tags::Compression;

/// PlanarConfiguration value for interleaved samples.
const PLANAR_CHUNKY: u16 = 1;

/// Outcome of validating a pyramid.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<TiffError>,
    /// Tolerated oddities
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: TiffError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// The first error, if any.
    pub fn into_result(self) -> Result<(), TiffError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Validate one pyramid level.
pub fn validate_level(level: &PyramidLevel, byte_order: ByteOrder) -> ValidationResult {
    let mut result = ValidationResult::ok();

    match Compression::from_u16(level.compression) {
        Some(compression) if compression.is_supported() => {}
        Some(compression) => result.add_error(TiffError::UnsupportedCompression(
            compression.name().to_string(),
        )),
        None => result.add_error(TiffError::UnsupportedCompression(format!(
            "Unknown ({})",
            level.compression
        ))),
    }

    if !level.has_tile_data() {
        let tag = if level.tile_offsets_entry.is_none() {
            "TileOffsets"
        } else {
            "TileByteCounts"
        };
        result.add_error(TiffError::MissingTag(tag));
    }

    if level.tile_width == 0 || level.tile_height == 0 {
        result.add_error(TiffError::InvalidTagValue {
            tag: "TileWidth/TileLength",
            message: format!(
                "level {}: tile size {}x{}",
                level.level_index, level.tile_width, level.tile_height
            ),
        });
    }

    let planar = level
        .ifd
        .planar_configuration(byte_order)
        .unwrap_or(PLANAR_CHUNKY);
    if planar != PLANAR_CHUNKY {
        result.add_error(TiffError::InvalidTagValue {
            tag: "PlanarConfiguration",
            message: format!("level {}: planar samples are not supported", level.level_index),
        });
    }

    if level.compression == Compression::Jpeg as u16 && level.jpeg_tables_entry.is_none() {
        result.add_warning(format!(
            "level {}: no JPEGTables tag (tiles must carry their own tables)",
            level.level_index
        ));
    }

    result
}

/// Validate every level of `pyramid`.
pub fn validate_pyramid(pyramid: &TiffPyramid) -> ValidationResult {
    let mut result = ValidationResult::ok();
    if pyramid.levels.is_empty() {
        result.add_error(TiffError::NoPyramidLevels);
        return result;
    }
    for level in &pyramid.levels {
        result.merge(validate_level(level, pyramid.header.byte_order));
    }
    result
}
