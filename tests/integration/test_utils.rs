//! Test utilities for integration tests.
//!
//! Builders for small but structurally complete CZI and TIFF files, a
//! request-counting reader and helpers for writing fixtures to disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma};
use parking_lot::Mutex;

use slideio::error::IoError;
use slideio::io::{MemoryRangeReader, RangeReader};

// =============================================================================
// Range Reader with Request Tracking
// =============================================================================

/// An in-memory reader that records every read request.
pub struct TrackingReader {
    inner: MemoryRangeReader,
    request_count: AtomicUsize,
    requests: Mutex<Vec<(u64, usize)>>,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>, identifier: &str) -> Self {
        Self {
            inner: MemoryRangeReader::new(data, identifier),
            request_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(u64, usize)> {
        self.requests.lock().clone()
    }

    pub fn reset_tracking(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.requests.lock().clear();
    }
}

impl RangeReader for TrackingReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((offset, len));
        self.inner.read_exact_at(offset, len)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

/// Write `data` to `name` inside `dir` and return the full path.
pub fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

// =============================================================================
// Test JPEG Creation
// =============================================================================

/// Grayscale JPEG with a horizontal gradient.
pub fn create_test_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, _| Luma([(x * 255 / width.max(1)) as u8]));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&img)
        .unwrap();
    buf
}

/// Grayscale JPEG of a single value.
pub fn create_flat_jpeg(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = GrayImage::from_pixel(width, height, Luma([value]));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 95)
        .encode_image(&img)
        .unwrap();
    buf
}

// =============================================================================
// CZI Builder
// =============================================================================

pub const CZI_GRAY8: i32 = 0;
pub const CZI_GRAY16: i32 = 1;
pub const CZI_BGR24: i32 = 3;

fn czi_pixel_size(pixel_type: i32) -> usize {
    match pixel_type {
        0 => 1,
        1 => 2,
        2 | 9 | 12 => 4,
        3 => 3,
        4 => 6,
        8 => 12,
        13 => 8,
        _ => 1,
    }
}

/// One sub-block of a CZI test file.
#[derive(Debug, Clone)]
pub struct CziBlock {
    pub pixel_type: i32,
    pub compression: i32,
    /// Logical placement in base pixels
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Stored size; smaller than the logical size on pyramid levels
    pub stored_width: i32,
    pub stored_height: i32,
    /// Non-pixel dimensions as (axis letter, start, size)
    pub dims: Vec<(u8, i32, i32)>,
    pub data: Vec<u8>,
}

impl CziBlock {
    /// Unscaled block filled with zeros.
    pub fn new(pixel_type: i32, x: i32, y: i32, width: i32, height: i32) -> Self {
        let mut block = Self {
            pixel_type,
            compression: 0,
            x,
            y,
            width,
            height,
            stored_width: width,
            stored_height: height,
            dims: Vec::new(),
            data: Vec::new(),
        };
        block.data = vec![0; block.data_len()];
        block
    }

    /// Single-index dimension on `axis`.
    pub fn at(mut self, axis: u8, index: i32) -> Self {
        self.dims.push((axis, index, 1));
        self
    }

    /// Channel range `start..start + count`.
    pub fn channels(mut self, start: i32, count: i32) -> Self {
        self.dims.push((b'C', start, count));
        self.data = vec![0; self.data_len()];
        self
    }

    /// Store the block at a reduced size.
    pub fn stored(mut self, width: i32, height: i32) -> Self {
        self.stored_width = width;
        self.stored_height = height;
        self.data = vec![0; self.data_len()];
        self
    }

    pub fn compression(mut self, compression: i32) -> Self {
        self.compression = compression;
        self
    }

    /// Fill every byte of the payload with `value`.
    pub fn filled(mut self, value: u8) -> Self {
        self.data = vec![value; self.data_len()];
        self
    }

    /// Fill plane by plane (one value per channel index).
    pub fn planes(mut self, values: &[u8]) -> Self {
        let plane = self.plane_len();
        self.data = values
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(plane))
            .collect();
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn plane_len(&self) -> usize {
        self.stored_width as usize * self.stored_height as usize * czi_pixel_size(self.pixel_type)
    }

    fn data_len(&self) -> usize {
        let planes: i32 = self.dims.iter().map(|&(_, _, size)| size).product();
        self.plane_len() * planes.max(1) as usize
    }

    fn dimension_count(&self) -> usize {
        2 + self.dims.len()
    }

    /// Directory entry ("DV" schema) pointing at `file_position`.
    fn directory_entry(&self, file_position: u64) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend_from_slice(b"DV");
        entry.extend_from_slice(&self.pixel_type.to_le_bytes());
        entry.extend_from_slice(&(file_position as i64).to_le_bytes());
        entry.extend_from_slice(&0i32.to_le_bytes());
        entry.extend_from_slice(&self.compression.to_le_bytes());
        entry.push(0);
        entry.extend_from_slice(&[0u8; 5]);
        entry.extend_from_slice(&(self.dimension_count() as i32).to_le_bytes());

        write_dimension(&mut entry, b'X', self.x, self.width, self.stored_width);
        write_dimension(&mut entry, b'Y', self.y, self.height, self.stored_height);
        for &(axis, start, size) in &self.dims {
            write_dimension(&mut entry, axis, start, size, size);
        }
        entry
    }

    /// Complete ZISRAWSUBBLOCK segment for a block placed at `file_position`.
    fn segment(&self, file_position: u64) -> Vec<u8> {
        let entry = self.directory_entry(file_position);
        let header_area = 256.max(16 + entry.len());

        let mut payload = Vec::new();
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&(self.data.len() as i64).to_le_bytes());
        payload.extend_from_slice(&entry);
        payload.resize(header_area, 0);
        payload.extend_from_slice(&self.data);

        segment("ZISRAWSUBBLOCK", &payload)
    }
}

fn write_dimension(out: &mut Vec<u8>, axis: u8, start: i32, size: i32, stored_size: i32) {
    out.extend_from_slice(&[axis, 0, 0, 0]);
    out.extend_from_slice(&start.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&0f32.to_le_bytes());
    out.extend_from_slice(&stored_size.to_le_bytes());
}

/// Segment header plus payload.
fn segment(tag: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 16];
    out[..tag.len()].copy_from_slice(tag.as_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Builder for CZI containers.
///
/// Layout: file header, sub-block segments, metadata segment, directory.
pub struct CziBuilder {
    metadata: String,
    blocks: Vec<CziBlock>,
}

impl CziBuilder {
    pub fn new() -> Self {
        Self {
            metadata: czi_metadata("Test slide", &[], None, None),
            blocks: Vec::new(),
        }
    }

    pub fn metadata(mut self, xml: impl Into<String>) -> Self {
        self.metadata = xml.into();
        self
    }

    pub fn block(mut self, block: CziBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn build(self) -> Vec<u8> {
        const FILE_SEGMENT_SIZE: usize = 32 + 80;

        let mut body = Vec::new();
        let mut positions = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let position = (FILE_SEGMENT_SIZE + body.len()) as u64;
            positions.push(position);
            body.extend(block.segment(position));
        }

        let metadata_position = (FILE_SEGMENT_SIZE + body.len()) as u64;
        let mut metadata = vec![0u8; 256];
        metadata[..4].copy_from_slice(&(self.metadata.len() as u32).to_le_bytes());
        metadata.extend_from_slice(self.metadata.as_bytes());
        body.extend(segment("ZISRAWMETADATA", &metadata));

        let directory_position = (FILE_SEGMENT_SIZE + body.len()) as u64;
        let mut directory = vec![0u8; 128];
        directory[..4].copy_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        for (block, &position) in self.blocks.iter().zip(&positions) {
            directory.extend(block.directory_entry(position));
        }
        body.extend(segment("ZISRAWDIRECTORY", &directory));

        let mut header = vec![0u8; 80];
        header[0..4].copy_from_slice(&1u32.to_le_bytes());
        header[52..60].copy_from_slice(&directory_position.to_le_bytes());
        header[60..68].copy_from_slice(&metadata_position.to_le_bytes());

        let mut out = segment("ZISRAWFILE", &header);
        out.extend(body);
        out
    }
}

impl Default for CziBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata document with a title, channel names, an isotropic pixel size in
/// metres and an objective magnification.
pub fn czi_metadata(
    title: &str,
    channels: &[&str],
    pixel_size: Option<f64>,
    magnification: Option<f64>,
) -> String {
    let channels: String = channels
        .iter()
        .enumerate()
        .map(|(i, name)| format!(r#"<Channel Id="Channel:{}" Name="{}"/>"#, i, name))
        .collect();
    let scaling = pixel_size
        .map(|size| {
            format!(
                r#"<Scaling><Items><Distance Id="X"><Value>{size}</Value></Distance><Distance Id="Y"><Value>{size}</Value></Distance></Items></Scaling>"#
            )
        })
        .unwrap_or_default();
    let objective = magnification
        .map(|mag| {
            format!(
                "<Instrument><Objectives><Objective><NominalMagnification>{}</NominalMagnification></Objective></Objectives></Instrument>",
                mag
            )
        })
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<ImageDocument>
  <Metadata>
    <Information>
      <Document><Title>{title}</Title></Document>
      <Image><Dimensions><Channels>{channels}</Channels></Dimensions></Image>
      {objective}
    </Information>
    {scaling}
  </Metadata>
</ImageDocument>"#
    )
}

/// 128x128 scene with three Gray8 channels in 2x2 tiles of 64 pixels, plus a
/// half-resolution level stored as one block per channel.
///
/// Base tile `t` (row-major) of channel `c` holds `(c + 1) * 10 + t`; the
/// half-resolution level of channel `c` holds `200 + c`.
pub fn three_channel_czi() -> Vec<u8> {
    let mut builder = CziBuilder::new().metadata(czi_metadata(
        "Kidney",
        &["DAPI", "FITC", "TRITC"],
        Some(2.5e-7),
        Some(20.0),
    ));
    for c in 0..3 {
        for t in 0..4 {
            let (x, y) = ((t % 2) * 64, (t / 2) * 64);
            builder = builder.block(
                CziBlock::new(CZI_GRAY8, x, y, 64, 64)
                    .at(b'C', c)
                    .filled(((c + 1) * 10 + t) as u8),
            );
        }
        builder = builder.block(
            CziBlock::new(CZI_GRAY8, 0, 0, 128, 128)
                .stored(64, 64)
                .at(b'C', c)
                .filled(200 + c as u8),
        );
    }
    builder.build()
}

// =============================================================================
// TIFF Builder
// =============================================================================

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;

/// One image (IFD) of a little-endian classic TIFF test file.
#[derive(Debug, Clone)]
pub struct TiffImage {
    pub width: u32,
    pub height: u32,
    /// Tile size, or `(width, rows_per_strip)` for stripped images
    pub tile_width: u32,
    pub tile_height: u32,
    pub stripped: bool,
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    pub compression: u16,
    pub description: Option<String>,
    pub jpeg_tables: Option<Vec<u8>>,
    /// Encoded tiles or strips in row-major order
    pub tiles: Vec<Vec<u8>>,
}

impl TiffImage {
    /// Uncompressed 8-bit tiled image whose pixels come from `pixel(x, y)`.
    ///
    /// Edge tiles are padded to the full tile size.
    pub fn uncompressed(
        width: u32,
        height: u32,
        tile: u32,
        samples_per_pixel: u16,
        pixel: impl Fn(u32, u32) -> Vec<u8>,
    ) -> Self {
        let spp = samples_per_pixel as usize;
        let mut tiles = Vec::new();
        for ty in 0..height.div_ceil(tile) {
            for tx in 0..width.div_ceil(tile) {
                let mut data = vec![0u8; (tile * tile) as usize * spp];
                for y in 0..tile {
                    for x in 0..tile {
                        let (gx, gy) = (tx * tile + x, ty * tile + y);
                        if gx < width && gy < height {
                            let at = (y * tile + x) as usize * spp;
                            data[at..at + spp].copy_from_slice(&pixel(gx, gy));
                        }
                    }
                }
                tiles.push(data);
            }
        }
        Self {
            width,
            height,
            tile_width: tile,
            tile_height: tile,
            stripped: false,
            samples_per_pixel,
            bits_per_sample: 8,
            compression: 1,
            description: None,
            jpeg_tables: None,
            tiles,
        }
    }

    /// Uncompressed 8-bit stripped image.
    pub fn stripped(
        width: u32,
        height: u32,
        rows_per_strip: u32,
        samples_per_pixel: u16,
        pixel: impl Fn(u32, u32) -> Vec<u8>,
    ) -> Self {
        let spp = samples_per_pixel as usize;
        let mut tiles = Vec::new();
        for strip in 0..height.div_ceil(rows_per_strip) {
            let first = strip * rows_per_strip;
            let last = (first + rows_per_strip).min(height);
            let mut data = Vec::with_capacity((last - first) as usize * width as usize * spp);
            for y in first..last {
                for x in 0..width {
                    data.extend(pixel(x, y));
                }
            }
            tiles.push(data);
        }
        Self {
            width,
            height,
            tile_width: width,
            tile_height: rows_per_strip,
            stripped: true,
            samples_per_pixel,
            bits_per_sample: 8,
            compression: 1,
            description: None,
            jpeg_tables: None,
            tiles,
        }
    }

    /// Grayscale JPEG tiles, each a complete stream of one value.
    pub fn jpeg(width: u32, height: u32, tile: u32, value: impl Fn(usize) -> u8) -> Self {
        let count = (width.div_ceil(tile) * height.div_ceil(tile)) as usize;
        Self {
            width,
            height,
            tile_width: tile,
            tile_height: tile,
            stripped: false,
            samples_per_pixel: 1,
            bits_per_sample: 8,
            compression: 7,
            description: None,
            jpeg_tables: None,
            tiles: (0..count)
                .map(|i| create_flat_jpeg(tile, tile, value(i)))
                .collect(),
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    pub fn compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }
}

fn u16_values(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn u32_values(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Build a little-endian classic TIFF holding `images` in IFD order.
///
/// Each image is written as its tile data, then out-of-line tag values, then
/// the IFD itself.
pub fn build_tiff(images: &[TiffImage]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    let mut next_pointer = 4usize;

    for image in images {
        let mut offsets = Vec::with_capacity(image.tiles.len());
        let mut counts = Vec::with_capacity(image.tiles.len());
        for tile in &image.tiles {
            offsets.push(out.len() as u32);
            counts.push(tile.len() as u32);
            out.extend_from_slice(tile);
        }

        let spp = image.samples_per_pixel;
        let mut entries: Vec<(u16, u16, u32, Vec<u8>)> = vec![
            (256, TYPE_LONG, 1, u32_values(&[image.width])),
            (257, TYPE_LONG, 1, u32_values(&[image.height])),
            (
                258,
                TYPE_SHORT,
                spp as u32,
                u16_values(&vec![image.bits_per_sample; spp as usize]),
            ),
            (259, TYPE_SHORT, 1, u16_values(&[image.compression])),
            (262, TYPE_SHORT, 1, u16_values(&[if spp >= 3 { 2 } else { 1 }])),
            (277, TYPE_SHORT, 1, u16_values(&[spp])),
            (284, TYPE_SHORT, 1, u16_values(&[1])),
        ];
        if let Some(ref text) = image.description {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(0);
            entries.push((270, TYPE_ASCII, bytes.len() as u32, bytes));
        }
        let count = offsets.len() as u32;
        if image.stripped {
            entries.push((273, TYPE_LONG, count, u32_values(&offsets)));
            entries.push((278, TYPE_LONG, 1, u32_values(&[image.tile_height])));
            entries.push((279, TYPE_LONG, count, u32_values(&counts)));
        } else {
            entries.push((322, TYPE_LONG, 1, u32_values(&[image.tile_width])));
            entries.push((323, TYPE_LONG, 1, u32_values(&[image.tile_height])));
            entries.push((324, TYPE_LONG, count, u32_values(&offsets)));
            entries.push((325, TYPE_LONG, count, u32_values(&counts)));
        }
        if let Some(ref tables) = image.jpeg_tables {
            entries.push((347, TYPE_UNDEFINED, tables.len() as u32, tables.clone()));
        }
        entries.sort_by_key(|e| e.0);

        let mut fields = Vec::with_capacity(entries.len());
        for (tag, field_type, count, value) in entries {
            let mut inline = [0u8; 4];
            if value.len() <= 4 {
                inline[..value.len()].copy_from_slice(&value);
            } else {
                if out.len() % 2 == 1 {
                    out.push(0);
                }
                inline = (out.len() as u32).to_le_bytes();
                out.extend_from_slice(&value);
            }
            fields.push((tag, field_type, count, inline));
        }

        if out.len() % 2 == 1 {
            out.push(0);
        }
        let ifd_offset = out.len() as u32;
        out[next_pointer..next_pointer + 4].copy_from_slice(&ifd_offset.to_le_bytes());

        out.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        for (tag, field_type, count, inline) in fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&inline);
        }
        next_pointer = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    out
}

/// Pixel value of the gray test pattern.
pub fn gray_pattern(x: u32, y: u32) -> Vec<u8> {
    vec![((x + 2 * y) % 251) as u8]
}

/// Two-level uncompressed gray pyramid (200x100 and 100x50, 64 pixel tiles)
/// with an Aperio description.
///
/// The base level follows [`gray_pattern`]; the second level is flat 77.
pub fn aperio_gray_tiff() -> Vec<u8> {
    build_tiff(&[
        TiffImage::uncompressed(200, 100, 64, 1, gray_pattern)
            .description("Aperio Image Library v12.0.5\r\n200x100 (64x64) RAW|AppMag = 20|MPP = 0.5"),
        TiffImage::uncompressed(100, 50, 64, 1, |_, _| vec![77]),
    ])
}
