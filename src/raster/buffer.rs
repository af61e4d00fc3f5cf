//! Owned, interleaved pixel buffers.

use std::fmt;
use std::mem::size_of;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma, Pixel, Primitive};

use super::{Rect, Size};
use crate::error::{FormatError, SlideError};

/// Element type of one channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Byte,
    UInt16,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one sample in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataType::Byte => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DataType::Byte => "uint8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust scalar that can back a raster channel.
pub trait Sample: Primitive + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    /// Decode from the first `size_of::<Self>()` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode into the first `size_of::<Self>()` bytes of `out`.
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_sample {
    ($($t:ty => $dt:expr),* $(,)?) => {
        $(
            impl Sample for $t {
                const DATA_TYPE: DataType = $dt;

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_sample! {
    u8 => DataType::Byte,
    u16 => DataType::UInt16,
    i16 => DataType::Int16,
    i32 => DataType::Int32,
    f32 => DataType::Float32,
    f64 => DataType::Float64,
}

/// A width × height image with `channels` interleaved samples per pixel.
///
/// Samples are stored little-endian regardless of host byte order, the same
/// layout CZI sub-blocks use on disk.
#[derive(Clone, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: usize,
    data_type: DataType,
    data: Vec<u8>,
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

impl Raster {
    /// Zero-filled raster.
    pub fn new(width: u32, height: u32, channels: usize, data_type: DataType) -> Self {
        let len = width as usize * height as usize * channels * data_type.size();
        Self {
            width,
            height,
            channels,
            data_type,
            data: vec![0; len],
        }
    }

    /// Wrap interleaved little-endian sample bytes.
    pub fn from_bytes(
        width: u32,
        height: u32,
        channels: usize,
        data_type: DataType,
        data: Vec<u8>,
    ) -> Result<Self, FormatError> {
        let expected = width as usize * height as usize * channels * data_type.size();
        if data.len() != expected {
            return Err(FormatError::Decode {
                message: format!(
                    "{}x{}x{} {} raster needs {} bytes, got {}",
                    width,
                    height,
                    channels,
                    data_type,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data_type,
            data,
        })
    }

    /// Build a raster from typed samples.
    pub fn from_samples<T: Sample>(
        width: u32,
        height: u32,
        channels: usize,
        samples: &[T],
    ) -> Result<Self, FormatError> {
        let mut data = vec![0u8; samples.len() * size_of::<T>()];
        for (sample, out) in samples.iter().zip(data.chunks_exact_mut(size_of::<T>())) {
            sample.write_le(out);
        }
        Self::from_bytes(width, height, channels, T::DATA_TYPE, data)
    }

    /// Convert a decoded image, keeping 8/16-bit and float samples as they are.
    pub fn from_dynamic_image(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (channels, data_type, data) = match image {
            DynamicImage::ImageLuma8(img) => (1, DataType::Byte, img.into_raw()),
            DynamicImage::ImageLumaA8(img) => (2, DataType::Byte, img.into_raw()),
            DynamicImage::ImageRgb8(img) => (3, DataType::Byte, img.into_raw()),
            DynamicImage::ImageRgba8(img) => (4, DataType::Byte, img.into_raw()),
            DynamicImage::ImageLuma16(img) => (1, DataType::UInt16, le_bytes(img.as_raw())),
            DynamicImage::ImageLumaA16(img) => (2, DataType::UInt16, le_bytes(img.as_raw())),
            DynamicImage::ImageRgb16(img) => (3, DataType::UInt16, le_bytes(img.as_raw())),
            DynamicImage::ImageRgba16(img) => (4, DataType::UInt16, le_bytes(img.as_raw())),
            DynamicImage::ImageRgb32F(img) => (3, DataType::Float32, le_bytes(img.as_raw())),
            DynamicImage::ImageRgba32F(img) => (4, DataType::Float32, le_bytes(img.as_raw())),
            other => (3, DataType::Byte, other.to_rgb8().into_raw()),
        };
        Self {
            width,
            height,
            channels,
            data_type,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Bytes per pixel (all channels).
    pub fn pixel_size(&self) -> usize {
        self.channels * self.data_type.size()
    }

    /// Bytes per row.
    pub fn row_size(&self) -> usize {
        self.width as usize * self.pixel_size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// All samples as `T`, or `None` when `T` is not this raster's element type.
    pub fn samples<T: Sample>(&self) -> Option<Vec<T>> {
        if T::DATA_TYPE != self.data_type {
            return None;
        }
        Some(
            self.data
                .chunks_exact(size_of::<T>())
                .map(T::read_le)
                .collect(),
        )
    }

    /// Copy one channel into a single-channel raster.
    pub fn extract_channel(&self, channel: usize) -> Result<Raster, SlideError> {
        if channel >= self.channels {
            return Err(SlideError::OutOfRange {
                what: "raster channel",
                index: channel,
                count: self.channels,
            });
        }
        let sample = self.data_type.size();
        let pixel = self.pixel_size();
        let offset = channel * sample;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * sample);
        for px in self.data.chunks_exact(pixel) {
            data.extend_from_slice(&px[offset..offset + sample]);
        }
        Ok(Raster {
            width: self.width,
            height: self.height,
            channels: 1,
            data_type: self.data_type,
            data,
        })
    }

    /// Keep `channels` in the given order. An empty list keeps every channel.
    pub fn select_channels(self, channels: &[usize]) -> Result<Raster, SlideError> {
        if channels.is_empty() || channels.iter().copied().eq(0..self.channels) {
            return Ok(self);
        }
        let planes = channels
            .iter()
            .map(|&channel| self.extract_channel(channel))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Raster::merge_channels(&planes)?)
    }

    /// Place this raster at the top-left of a zeroed `width` × `height` raster.
    ///
    /// Pixels beyond the new bounds are dropped.
    pub fn pad_to(self, width: u32, height: u32) -> Result<Raster, FormatError> {
        if self.width == width && self.height == height {
            return Ok(self);
        }
        let mut padded = Raster::new(width, height, self.channels, self.data_type);
        padded.copy_window(&self, Rect::from_size(self.size()), 0, 0)?;
        Ok(padded)
    }

    /// Interleave rasters of identical size and type, channels in argument order.
    pub fn merge_channels(planes: &[Raster]) -> Result<Raster, FormatError> {
        let first = planes.first().ok_or_else(|| FormatError::Decode {
            message: "no channels to merge".to_string(),
        })?;
        if planes.len() == 1 {
            return Ok(first.clone());
        }
        if let Some(bad) = planes.iter().find(|p| {
            p.width != first.width || p.height != first.height || p.data_type != first.data_type
        }) {
            return Err(FormatError::Decode {
                message: format!(
                    "cannot merge {:?} with {:?}: size or type differs",
                    bad, first
                ),
            });
        }

        let channels: usize = planes.iter().map(|p| p.channels).sum();
        let mut merged = Raster::new(first.width, first.height, channels, first.data_type);
        let out_pixel = merged.pixel_size();
        let pixel_count = first.width as usize * first.height as usize;

        let mut channel_offset = 0;
        for plane in planes {
            let plane_pixel = plane.pixel_size();
            for i in 0..pixel_count {
                let dst = i * out_pixel + channel_offset;
                merged.data[dst..dst + plane_pixel]
                    .copy_from_slice(&plane.data[i * plane_pixel..(i + 1) * plane_pixel]);
            }
            channel_offset += plane_pixel;
        }
        Ok(merged)
    }

    /// Resample to `width` × `height` with a bilinear filter, channel by channel.
    pub fn resize(&self, width: u32, height: u32) -> Raster {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if width == 0 || height == 0 || self.is_empty() {
            return Raster::new(width, height, self.channels, self.data_type);
        }
        match self.data_type {
            DataType::Byte => self.resize_as::<u8>(width, height),
            DataType::UInt16 => self.resize_as::<u16>(width, height),
            DataType::Int16 => self.resize_as::<i16>(width, height),
            DataType::Int32 => self.resize_as::<i32>(width, height),
            DataType::Float32 => self.resize_as::<f32>(width, height),
            DataType::Float64 => self.resize_as::<f64>(width, height),
        }
    }

    fn resize_as<T: Sample>(&self, width: u32, height: u32) -> Raster
    where
        Luma<T>: Pixel<Subpixel = T>,
    {
        let mut out = Raster::new(width, height, self.channels, self.data_type);
        let sample = size_of::<T>();
        let src_pixel = self.pixel_size();
        let dst_pixel = out.pixel_size();

        for channel in 0..self.channels {
            let plane: Vec<T> = self
                .data
                .chunks_exact(src_pixel)
                .map(|px| T::read_le(&px[channel * sample..]))
                .collect();
            let Some(img) = ImageBuffer::<Luma<T>, Vec<T>>::from_raw(self.width, self.height, plane)
            else {
                continue;
            };
            let resized = imageops::resize(&img, width, height, FilterType::Triangle);
            for (value, px) in resized.as_raw().iter().zip(out.data.chunks_exact_mut(dst_pixel)) {
                value.write_le(&mut px[channel * sample..]);
            }
        }
        out
    }

    /// Copy `src_rect` of `src` so that its top-left lands at `(dst_x, dst_y)`.
    ///
    /// The window is clipped to both rasters.
    pub fn copy_window(
        &mut self,
        src: &Raster,
        src_rect: Rect,
        dst_x: i32,
        dst_y: i32,
    ) -> Result<(), FormatError> {
        if src.data_type != self.data_type || src.channels != self.channels {
            return Err(FormatError::Decode {
                message: format!(
                    "cannot copy {} x{} samples into {} x{} raster",
                    src.data_type, src.channels, self.data_type, self.channels
                ),
            });
        }

        let src_window = src_rect.intersection(&Rect::from_size(src.size()));
        let dst_window = src_window
            .relative_to(src_rect.x - dst_x, src_rect.y - dst_y)
            .intersection(&Rect::from_size(self.size()));
        if dst_window.is_empty() {
            return Ok(());
        }
        let src_x = dst_window.x + (src_rect.x - dst_x);
        let src_y = dst_window.y + (src_rect.y - dst_y);

        let pixel = self.pixel_size();
        let row_bytes = dst_window.width as usize * pixel;
        let src_row = src.row_size();
        let dst_row = self.row_size();
        for row in 0..dst_window.height as usize {
            let s = (src_y as usize + row) * src_row + src_x as usize * pixel;
            let d = (dst_window.y as usize + row) * dst_row + dst_window.x as usize * pixel;
            self.data[d..d + row_bytes].copy_from_slice(&src.data[s..s + row_bytes]);
        }
        Ok(())
    }

    /// Convert into an `image` type for encoding.
    pub fn to_dynamic_image(&self) -> Result<DynamicImage, FormatError> {
        let unsupported = || FormatError::UnsupportedFormat {
            reason: format!(
                "cannot export a {}-channel {} raster as an image",
                self.channels, self.data_type
            ),
        };
        let (w, h) = (self.width, self.height);
        let image = match (self.data_type, self.channels) {
            (DataType::Byte, 1) => ImageBuffer::from_raw(w, h, self.data.clone()).map(DynamicImage::ImageLuma8),
            (DataType::Byte, 2) => ImageBuffer::from_raw(w, h, self.data.clone()).map(DynamicImage::ImageLumaA8),
            (DataType::Byte, 3) => ImageBuffer::from_raw(w, h, self.data.clone()).map(DynamicImage::ImageRgb8),
            (DataType::Byte, 4) => ImageBuffer::from_raw(w, h, self.data.clone()).map(DynamicImage::ImageRgba8),
            (DataType::UInt16, n) => {
                let samples = self.samples::<u16>().ok_or_else(unsupported)?;
                match n {
                    1 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageLuma16),
                    2 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageLumaA16),
                    3 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgb16),
                    4 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgba16),
                    _ => None,
                }
            }
            (DataType::Float32, n) => {
                let samples = self.samples::<f32>().ok_or_else(unsupported)?;
                match n {
                    3 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgb32F),
                    4 => ImageBuffer::from_raw(w, h, samples).map(DynamicImage::ImageRgba32F),
                    _ => None,
                }
            }
            _ => None,
        };
        image.ok_or_else(unsupported)
    }
}

fn le_bytes<T: Sample>(samples: &[T]) -> Vec<u8> {
    let mut data = vec![0u8; samples.len() * size_of::<T>()];
    for (sample, out) in samples.iter().zip(data.chunks_exact_mut(size_of::<T>())) {
        sample.write_le(out);
    }
    data
}
