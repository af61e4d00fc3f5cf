//! Drivers for the supported slide formats.
//!
//! - [`czi`]: Zeiss CZI containers (multi-scene, multi-channel, Z/T stacks)
//! - [`svs`]: Aperio SVS and other tiled TIFF pyramids, built on [`tiff`]
//! - [`raster_file`]: single-image PNG and JPEG files
//!
//! # Format Detection
//!
//! Use [`detect_format`] to identify a file from its leading bytes when the
//! extension is missing or misleading.

pub mod czi;
pub mod detect;
pub mod jpeg;
pub mod raster_file;
pub mod svs;
pub mod tiff;

pub use czi::{CziScene, CziSlide};
pub use detect::{detect_format, is_tiff_header, SlideFormat};
pub use jpeg::{is_abbreviated_stream, is_complete_stream, merge_jpeg_tables, prepare_tile_jpeg};
pub use raster_file::{RasterScene, RasterSlide};
pub use svs::{SvsMetadata, TiffScene, TiffSlide};
