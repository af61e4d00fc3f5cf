//! TIFF and BigTIFF structure parsing.
//!
//! # Key Concepts
//!
//! - **Byte order**: declared in the header (II = little-endian, MM = big-endian);
//!   every multi-byte value in the file follows it.
//!
//! - **Classic TIFF vs BigTIFF**: 32-bit versus 64-bit offsets. Both are handled
//!   transparently.
//!
//! - **IFD (Image File Directory)**: the tags of one image. Slide files chain
//!   several IFDs for pyramid levels, labels and macros.
//!
//! - **Inline vs offset values**: small values live in the IFD entry itself,
//!   larger ones at an offset the entry points to.

mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use parser::{
    ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES, TIFF_HEADER_SIZE,
};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, TiffTag};
pub use validation::{validate_level, validate_pyramid, ValidationResult};
pub use values::{parse_u64_array, ValueReader};
