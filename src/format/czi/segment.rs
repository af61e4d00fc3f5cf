//! CZI segment framing and fixed-size record headers.
//!
//! # Segment Layout
//!
//! Every structure in a CZI file lives in a segment:
//!
//! ```text
//! Bytes  0-15: ASCII tag, NUL padded ("ZISRAWFILE", "ZISRAWDIRECTORY", ...)
//! Bytes 16-23: Allocated size (u64)
//! Bytes 24-31: Used size (u64)
//! Bytes 32-  : Segment payload
//! ```
//!
//! All integers are little-endian and records are byte-packed.

use crate::error::{FormatError, IoError};
use crate::io::{read_u32_le, read_u64_le, RangeReader};

// =============================================================================
// Constants
// =============================================================================

/// Tag of the file header segment at offset 0
pub const FILE_TAG: &str = "ZISRAWFILE";

/// Tag of the metadata segment
pub const METADATA_TAG: &str = "ZISRAWMETADATA";

/// Tag of the sub-block directory segment
pub const DIRECTORY_TAG: &str = "ZISRAWDIRECTORY";

/// Tag of a stored sub-block
pub const SUBBLOCK_TAG: &str = "ZISRAWSUBBLOCK";

/// Size of a segment header
pub const SEGMENT_HEADER_SIZE: usize = 32;

/// Size of the file header following the file segment header
pub const FILE_HEADER_SIZE: usize = 80;

/// Size of the metadata header (XML size, attachment size, reserved)
pub const METADATA_HEADER_SIZE: usize = 256;

/// Size of the directory header (entry count, reserved)
pub const DIRECTORY_HEADER_SIZE: usize = 128;

/// Fixed part of a directory entry
pub const DIRECTORY_ENTRY_SIZE: usize = 32;

/// One dimension record of a directory entry
pub const DIMENSION_ENTRY_SIZE: usize = 20;

/// Fixed fields at the start of a sub-block segment payload
pub const SUBBLOCK_HEADER_SIZE: usize = 16;

/// A sub-block's header area is padded to at least this many bytes
const SUBBLOCK_MIN_HEADER_AREA: u64 = 256;

/// Directory entries claiming more dimensions than this are treated as corrupt
pub const MAX_DIMENSION_COUNT: i32 = 64;

// =============================================================================
// Little-endian cursor
// =============================================================================

/// Sequential reader over a record whose length was already checked.
pub(crate) struct LeCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LeCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn take(&mut self, len: usize) -> &'a [u8] {
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        out
    }

    pub fn skip(&mut self, len: usize) {
        self.pos += len;
    }

    pub fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    pub fn u32(&mut self) -> u32 {
        read_u32_le(self.take(4))
    }

    pub fn i32(&mut self) -> i32 {
        self.u32() as i32
    }

    pub fn u64(&mut self) -> u64 {
        read_u64_le(self.take(8))
    }

    pub fn i64(&mut self) -> i64 {
        self.u64() as i64
    }

    pub fn f32(&mut self) -> f32 {
        f32::from_bits(self.u32())
    }

    pub fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N));
        out
    }
}

/// Read `len` bytes at `offset`, reporting a short file as a truncated `what`.
pub(crate) fn read_record(
    reader: &dyn RangeReader,
    offset: u64,
    len: usize,
    what: &str,
) -> Result<bytes::Bytes, FormatError> {
    reader.read_exact_at(offset, len).map_err(|e| match e {
        IoError::RangeOutOfBounds { resource, .. } => FormatError::Truncated {
            path: resource,
            what: format!("{} at offset {}", what, offset),
        },
        other => FormatError::Io(other),
    })
}

// =============================================================================
// SegmentHeader
// =============================================================================

/// The 32-byte header in front of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub tag: [u8; 16],
    pub allocated_size: u64,
    pub used_size: u64,
}

impl SegmentHeader {
    /// Parse from at least [`SEGMENT_HEADER_SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut cursor = LeCursor::new(bytes);
        Self {
            tag: cursor.array(),
            allocated_size: cursor.u64(),
            used_size: cursor.u64(),
        }
    }

    /// The tag up to its first NUL byte.
    pub fn tag_bytes(&self) -> &[u8] {
        let end = self.tag.iter().position(|&b| b == 0).unwrap_or(self.tag.len());
        &self.tag[..end]
    }

    /// Printable form of the tag for error messages.
    pub fn tag_lossy(&self) -> String {
        String::from_utf8_lossy(self.tag_bytes()).into_owned()
    }

    pub fn has_tag(&self, expected: &str) -> bool {
        self.tag_bytes() == expected.as_bytes()
    }

    /// Read the header at `offset` and check its tag.
    pub fn read(
        reader: &dyn RangeReader,
        offset: u64,
        expected: &'static str,
    ) -> Result<Self, FormatError> {
        let bytes = read_record(reader, offset, SEGMENT_HEADER_SIZE, expected)?;
        let header = Self::parse(&bytes);
        if !header.has_tag(expected) {
            return Err(FormatError::InvalidSegment {
                path: reader.identifier().to_string(),
                expected,
                found: header.tag_lossy(),
            });
        }
        Ok(header)
    }
}

// =============================================================================
// FileHeader
// =============================================================================

/// Payload of the `ZISRAWFILE` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub primary_file_guid: [u8; 16],
    pub file_guid: [u8; 16],
    pub file_part: u32,
    pub directory_position: u64,
    pub metadata_position: u64,
    pub update_pending: bool,
    pub attachment_directory_position: u64,
}

impl FileHeader {
    /// Parse from at least [`FILE_HEADER_SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut cursor = LeCursor::new(bytes);
        let major_version = cursor.u32();
        let minor_version = cursor.u32();
        cursor.skip(8);
        Self {
            major_version,
            minor_version,
            primary_file_guid: cursor.array(),
            file_guid: cursor.array(),
            file_part: cursor.u32(),
            directory_position: cursor.u64(),
            metadata_position: cursor.u64(),
            update_pending: cursor.u32() != 0,
            attachment_directory_position: cursor.u64(),
        }
    }

    /// Validate the file segment at offset 0 and read the header after it.
    pub fn read(reader: &dyn RangeReader) -> Result<Self, FormatError> {
        SegmentHeader::read(reader, 0, FILE_TAG)?;
        let bytes = read_record(
            reader,
            SEGMENT_HEADER_SIZE as u64,
            FILE_HEADER_SIZE,
            "file header",
        )?;
        Ok(Self::parse(&bytes))
    }
}

// =============================================================================
// MetadataHeader / DirectoryHeader
// =============================================================================

/// Fixed part of the `ZISRAWMETADATA` segment payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataHeader {
    pub xml_size: u32,
    pub attachment_size: u32,
}

impl MetadataHeader {
    pub fn parse(bytes: &[u8]) -> Self {
        let mut cursor = LeCursor::new(bytes);
        Self {
            xml_size: cursor.u32(),
            attachment_size: cursor.u32(),
        }
    }
}

/// Fixed part of the `ZISRAWDIRECTORY` segment payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryHeader {
    pub entry_count: u32,
}

impl DirectoryHeader {
    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            entry_count: LeCursor::new(bytes).u32(),
        }
    }
}

// =============================================================================
// Directory entries
// =============================================================================

/// Fixed part of one directory entry ("DV" schema).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub schema: [u8; 2],
    pub pixel_type: i32,
    pub file_position: i64,
    pub file_part: i32,
    pub compression: i32,
    pub pyramid_type: u8,
    pub dimension_count: i32,
}

impl DirectoryEntry {
    /// Parse from at least [`DIRECTORY_ENTRY_SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut cursor = LeCursor::new(bytes);
        let schema = cursor.array();
        let pixel_type = cursor.i32();
        let file_position = cursor.i64();
        let file_part = cursor.i32();
        let compression = cursor.i32();
        let pyramid_type = cursor.u8();
        cursor.skip(5);
        Self {
            schema,
            pixel_type,
            file_position,
            file_part,
            compression,
            pyramid_type,
            dimension_count: cursor.i32(),
        }
    }

    /// Bytes taken by this entry including its dimension records.
    pub fn size(&self) -> usize {
        DIRECTORY_ENTRY_SIZE + self.dimension_count.max(0) as usize * DIMENSION_ENTRY_SIZE
    }
}

/// One dimension record of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionEntry {
    /// Axis letter; only the first byte of the 4-byte tag is meaningful
    pub axis: u8,
    pub start: i32,
    pub size: i32,
    pub start_coordinate: f32,
    pub stored_size: i32,
}

impl DimensionEntry {
    /// Parse from at least [`DIMENSION_ENTRY_SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut cursor = LeCursor::new(bytes);
        let tag: [u8; 4] = cursor.array();
        Self {
            axis: tag[0],
            start: cursor.i32(),
            size: cursor.i32(),
            start_coordinate: cursor.f32(),
            stored_size: cursor.i32(),
        }
    }

    pub fn axis_char(&self) -> char {
        self.axis as char
    }
}

// =============================================================================
// Sub-block segment
// =============================================================================

/// Fixed fields at the start of a `ZISRAWSUBBLOCK` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubBlockHeader {
    pub metadata_size: i32,
    pub attachment_size: i32,
    pub data_size: i64,
}

impl SubBlockHeader {
    pub fn parse(bytes: &[u8]) -> Self {
        let mut cursor = LeCursor::new(bytes);
        Self {
            metadata_size: cursor.i32(),
            attachment_size: cursor.i32(),
            data_size: cursor.i64(),
        }
    }

    /// Absolute offset of the pixel payload of the sub-block whose segment
    /// starts at `segment_position` and whose entry has `dimension_count`
    /// dimension records.
    pub fn data_position(&self, segment_position: u64, dimension_count: i32) -> u64 {
        let entry_size = (DIRECTORY_ENTRY_SIZE
            + dimension_count.max(0) as usize * DIMENSION_ENTRY_SIZE) as u64;
        let header_area = SUBBLOCK_MIN_HEADER_AREA.max(SUBBLOCK_HEADER_SIZE as u64 + entry_size);
        segment_position
            + SEGMENT_HEADER_SIZE as u64
            + header_area
            + self.metadata_size.max(0) as u64
    }
}
