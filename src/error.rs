use thiserror::Error;

use crate::raster::{Rect, Size};

/// I/O errors that can occur when reading bytes from a slide file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// The underlying read failed
    #[error("Read error on {resource}: {message}")]
    Read { resource: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds in {resource}: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        resource: String,
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// No pyramid level could be identified
    #[error("No tiled pyramid levels found")]
    NoPyramidLevels,
}

/// Errors raised while decoding the structure or content of a slide file.
///
/// These are always fatal: the file is either valid or it is not.
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// A segment header carries an unexpected tag
    #[error("{path}: expected segment {expected:?}, found {found:?}")]
    InvalidSegment {
        path: String,
        expected: &'static str,
        found: String,
    },

    /// A record ended before all of its fields were read
    #[error("{path}: truncated {what}")]
    Truncated { path: String, what: String },

    /// Pixel format code without a raster representation
    #[error("{path}: unsupported data type (pixel format {pixel_type})")]
    UnsupportedPixelType { path: String, pixel_type: i32 },

    /// Sub-block compression code the reader cannot decode
    #[error("{path}: unsupported compression {compression}")]
    UnsupportedCompression { path: String, compression: i32 },

    /// Dimension record that cannot describe a sub-block
    #[error("{path}: invalid dimension {axis}: {message}")]
    InvalidDimension {
        path: String,
        axis: char,
        message: String,
    },

    /// Dimension letter outside of the known axis set
    #[error("{path}: unknown dimension {axis:?}")]
    UnknownDimension { path: String, axis: char },

    /// Malformed metadata document
    #[error("{path}: invalid metadata: {message}")]
    Metadata { path: String, message: String },

    /// Required metadata element is absent
    #[error("{path}: missing metadata element {field}")]
    MissingMetadata { path: String, field: &'static str },

    /// Tile payload could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },
}

/// The file parsed, but violates a structural assumption the reader depends on.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// A non-pixel axis of a stored sub-block spans more than one index
    #[error("{path}: unexpected sub-block configuration: axis {axis} has extent {size}")]
    UnexpectedSubBlockExtent { path: String, axis: char, size: i32 },

    /// The finest pyramid level is not unscaled
    #[error("{path}: unexpected max zoom level {zoom}")]
    UnexpectedMaxZoom { path: String, zoom: f64 },

    /// Z-slices or time-frames do not start at index 0
    #[error("{path}: unexpected 4D configuration (first z-slice {first_z}, first t-frame {first_t})")]
    Unexpected4dConfiguration {
        path: String,
        first_z: i32,
        first_t: i32,
    },
}

/// Top-level error returned by slide and scene operations.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// Structural or content error in the file
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Structural assumption violated
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Scene, channel, slice or frame index out of range
    #[error("{what} index {index} out of range (count {count})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },

    /// Region or output size is degenerate
    #[error("Invalid region {rect:?} with output size {size:?}")]
    InvalidRegion { rect: Rect, size: Size },

    /// No stored tile intersects the requested region
    #[error("Region {rect:?} does not intersect any stored tile")]
    EmptyRegion { rect: Rect },

    /// No driver is registered for the file or id
    #[error("No driver for {0}")]
    UnknownDriver(String),
}

impl From<IoError> for SlideError {
    fn from(error: IoError) -> Self {
        SlideError::Format(FormatError::Io(error))
    }
}

impl From<TiffError> for SlideError {
    fn from(error: TiffError) -> Self {
        SlideError::Format(FormatError::Tiff(error))
    }
}
