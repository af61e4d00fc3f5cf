//! JPEG and JPEG 2000 tile decoding.
//!
//! # Abbreviated JPEG Streams
//!
//! Aperio files store each tile as an "abbreviated" JPEG stream that lacks
//! the quantization (DQT) and Huffman (DHT) tables. The tables live once in
//! the TIFF `JPEGTables` tag and are spliced into every tile before decoding:
//!
//! ```text
//! tables: SOI DQT DHT ... EOI
//! tile:   SOI SOS <scan> EOI
//! merged: SOI DQT DHT ... SOS <scan> EOI
//! ```

use bytes::{Bytes, BytesMut};
use image::ImageFormat;

use crate::error::FormatError;
use crate::raster::{DataType, Raster};

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// JPEG Stream Analysis
// =============================================================================

/// Whether `data` reaches a scan before defining any DQT or DHT table.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip the marker segment (marker + 2-byte length + payload)
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Whether `data` starts with SOI and defines at least one quantization table.
pub fn is_complete_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }
    data[2..].windows(2).any(|w| w == DQT)
}

// =============================================================================
// JPEG Tables Merging
// =============================================================================

/// Splice shared `tables` in front of an abbreviated tile stream.
///
/// The trailing EOI of the tables and the leading SOI of the tile are
/// dropped, so the result is a single well-formed stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.len() >= 2 && tables[tables.len() - 2..] == EOI {
        tables.len() - 2
    } else {
        tables.len()
    };
    let tile_start = if tile_data.len() >= 2 && tile_data[0..2] == SOI {
        2
    } else {
        0
    };

    let mut result = BytesMut::with_capacity(tables_end + (tile_data.len() - tile_start));
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&tile_data[tile_start..]);
    result.freeze()
}

/// Tile bytes ready for a JPEG decoder, with tables merged in when needed.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    if is_complete_stream(tile_data) {
        return Bytes::copy_from_slice(tile_data);
    }

    if let Some(tables) = tables {
        if is_abbreviated_stream(tile_data) {
            return merge_jpeg_tables(tables, tile_data);
        }
    }

    Bytes::copy_from_slice(tile_data)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a complete JPEG stream into an 8-bit raster.
pub fn decode_jpeg(data: &[u8]) -> Result<Raster, FormatError> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg).map_err(|e| {
        FormatError::Decode {
            message: format!("JPEG: {}", e),
        }
    })?;
    Ok(Raster::from_dynamic_image(image))
}

/// Decode a JPEG 2000 codestream into a raster.
///
/// Components are interleaved in stream order. Samples above 8 bits of
/// precision are kept as 16-bit. With `ycbcr` set, a three-component image
/// is converted to RGB.
pub fn decode_jpeg2000(data: &[u8], ycbcr: bool) -> Result<Raster, FormatError> {
    let image = jpeg2k::Image::from_bytes(data).map_err(|e| FormatError::Decode {
        message: format!("JPEG 2000: {}", e),
    })?;
    let components = image.components();
    let first = components.first().ok_or_else(|| FormatError::Decode {
        message: "JPEG 2000: image has no components".to_string(),
    })?;
    let (width, height) = (first.width(), first.height());
    let pixels = width as usize * height as usize;
    if components
        .iter()
        .any(|c| c.width() != width || c.height() != height || c.data().len() < pixels)
    {
        return Err(FormatError::Decode {
            message: "JPEG 2000: subsampled components are not supported".to_string(),
        });
    }

    let channels = components.len();
    let wide = components.iter().any(|c| c.precision() > 8);
    let mut samples = vec![0i32; pixels * channels];
    for (channel, component) in components.iter().enumerate() {
        for (i, &value) in component.data()[..pixels].iter().enumerate() {
            samples[i * channels + channel] = value;
        }
    }
    if ycbcr && channels == 3 {
        let offset = if wide { 32768.0 } else { 128.0 };
        let max = if wide { 65535.0 } else { 255.0 };
        for px in samples.chunks_exact_mut(3) {
            let (y, cb, cr) = (px[0] as f64, px[1] as f64 - offset, px[2] as f64 - offset);
            px[0] = (y + 1.402 * cr).round().clamp(0.0, max) as i32;
            px[1] = (y - 0.344136 * cb - 0.714136 * cr).round().clamp(0.0, max) as i32;
            px[2] = (y + 1.772 * cb).round().clamp(0.0, max) as i32;
        }
    }

    if wide {
        let data: Vec<u16> = samples.iter().map(|&v| v.clamp(0, 65535) as u16).collect();
        Raster::from_samples(width, height, channels, &data)
    } else {
        let data: Vec<u8> = samples.iter().map(|&v| v.clamp(0, 255) as u8).collect();
        Raster::from_bytes(width, height, channels, DataType::Byte, data)
    }
}
