//! Format detection by file signature.
//!
//! Used when a file's extension does not name a driver. Recognized formats:
//!
//! - **CZI**: file header segment tagged `ZISRAWFILE` at offset 0
//! - **Aperio SVS**: TIFF whose first ImageDescription contains "Aperio"
//! - **Generic TIFF**: any other TIFF or BigTIFF
//! - **Raster**: PNG or JPEG, as recognized by the `image` crate

use image::ImageFormat;

use crate::error::FormatError;
use crate::io::RangeReader;

use super::czi::FILE_TAG;
use super::tiff::{
    ByteOrder, Ifd, TiffHeader, TiffTag, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES, TIFF_HEADER_SIZE,
};

// =============================================================================
// SlideFormat
// =============================================================================

/// Family of a file, as told by its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    /// Zeiss CZI container
    Czi,

    /// Aperio SVS (TIFF with abbreviated JPEG tiles)
    AperioSvs,

    /// Any other tiled TIFF
    GenericTiff,

    /// Single-image PNG or JPEG
    Raster,
}

impl SlideFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::Czi => "Zeiss CZI",
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic TIFF",
            SlideFormat::Raster => "Raster image",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Bytes read from the start of the file for signature checks.
const SIGNATURE_BYTES: usize = 32;

/// Maximum bytes of ImageDescription inspected for vendor markers.
const MAX_DESCRIPTION_BYTES: usize = 1024;

const APERIO_MARKER: &[u8] = b"Aperio";

/// Detect the format of the file behind `reader`.
///
/// # Errors
/// - `UnsupportedFormat` if no signature matches
/// - `Tiff` if the file claims to be a TIFF but its first IFD is unreadable
pub fn detect_format(reader: &dyn RangeReader) -> Result<SlideFormat, FormatError> {
    let len = (SIGNATURE_BYTES as u64).min(reader.size()) as usize;
    if len < TIFF_HEADER_SIZE {
        return Err(FormatError::UnsupportedFormat {
            reason: format!("{}: file too small to identify", reader.identifier()),
        });
    }
    let head = reader.read_exact_at(0, len)?;

    if head.starts_with(FILE_TAG.as_bytes()) {
        return Ok(SlideFormat::Czi);
    }

    if is_tiff_header(&head) {
        let header_len = BIGTIFF_HEADER_SIZE.min(head.len());
        let header = TiffHeader::parse(&head[..header_len], reader.size())?;
        return detect_tiff_flavor(reader, &header);
    }

    match image::guess_format(&head) {
        Ok(ImageFormat::Png) | Ok(ImageFormat::Jpeg) => Ok(SlideFormat::Raster),
        _ => Err(FormatError::UnsupportedFormat {
            reason: format!("{}: unrecognized file signature", reader.identifier()),
        }),
    }
}

/// Tell SVS from generic TIFF by the first IFD's ImageDescription.
fn detect_tiff_flavor(
    reader: &dyn RangeReader,
    header: &TiffHeader,
) -> Result<SlideFormat, FormatError> {
    let count_bytes = reader.read_exact_at(header.first_ifd_offset, header.ifd_count_size())?;
    let entry_count = header.read_entry_count(&count_bytes);
    if entry_count > MAX_IFD_ENTRIES {
        return Ok(SlideFormat::GenericTiff);
    }

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(header.first_ifd_offset, ifd_size)?;
    let ifd = Ifd::parse(&ifd_bytes, header)?;

    match read_image_description(reader, &ifd, header)? {
        Some(description) if contains_aperio_marker(&description) => Ok(SlideFormat::AperioSvs),
        _ => Ok(SlideFormat::GenericTiff),
    }
}

/// Leading bytes of the ImageDescription, if the tag is present.
fn read_image_description(
    reader: &dyn RangeReader,
    ifd: &Ifd,
    header: &TiffHeader,
) -> Result<Option<Vec<u8>>, FormatError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) else {
        return Ok(None);
    };

    let read_len = (entry.count as usize).min(MAX_DESCRIPTION_BYTES);
    if read_len == 0 {
        return Ok(None);
    }

    let bytes = if entry.is_inline {
        entry.value_offset_bytes[..read_len.min(entry.value_offset_bytes.len())].to_vec()
    } else {
        let offset = entry.value_offset(header.byte_order);
        let available = reader.size().saturating_sub(offset) as usize;
        reader
            .read_exact_at(offset, read_len.min(available))?
            .to_vec()
    };

    Ok(Some(bytes))
}

fn contains_aperio_marker(data: &[u8]) -> bool {
    data.windows(APERIO_MARKER.len())
        .any(|window| window == APERIO_MARKER)
}

/// Whether `bytes` start with a TIFF or BigTIFF header.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match &bytes[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == 42 || version == 43
}
