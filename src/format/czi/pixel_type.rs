//! CZI pixel formats.

use crate::raster::DataType;

/// Pixel format of a stored sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    Gray8,
    Gray16,
    Gray32Float,
    Bgr24,
    Bgr48,
    Bgr96Float,
    Bgra32,
    Gray32,
    Gray64,
}

impl PixelType {
    /// Map a directory entry's pixel format code.
    ///
    /// Complex-valued formats (10, 11) and unknown codes have no raster
    /// representation and return `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PixelType::Gray8),
            1 => Some(PixelType::Gray16),
            2 => Some(PixelType::Gray32Float),
            3 => Some(PixelType::Bgr24),
            4 => Some(PixelType::Bgr48),
            8 => Some(PixelType::Bgr96Float),
            9 => Some(PixelType::Bgra32),
            12 => Some(PixelType::Gray32),
            13 => Some(PixelType::Gray64),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PixelType::Gray8 => 0,
            PixelType::Gray16 => 1,
            PixelType::Gray32Float => 2,
            PixelType::Bgr24 => 3,
            PixelType::Bgr48 => 4,
            PixelType::Bgr96Float => 8,
            PixelType::Bgra32 => 9,
            PixelType::Gray32 => 12,
            PixelType::Gray64 => 13,
        }
    }

    /// Element type of each component.
    pub fn data_type(self) -> DataType {
        match self {
            PixelType::Gray8 | PixelType::Bgr24 | PixelType::Bgra32 => DataType::Byte,
            PixelType::Gray16 | PixelType::Bgr48 => DataType::UInt16,
            PixelType::Gray32Float | PixelType::Bgr96Float => DataType::Float32,
            PixelType::Gray32 => DataType::Int32,
            PixelType::Gray64 => DataType::Float64,
        }
    }

    /// Components interleaved in one pixel.
    pub fn components(self) -> usize {
        match self {
            PixelType::Bgr24 | PixelType::Bgr48 | PixelType::Bgr96Float => 3,
            PixelType::Bgra32 => 4,
            _ => 1,
        }
    }

    /// Bytes per pixel.
    pub fn pixel_size(self) -> usize {
        self.components() * self.data_type().size()
    }

    /// Position in the stored pixel of logical component `component`.
    ///
    /// Color formats are stored blue first; logical components are ordered
    /// red, green, blue, alpha.
    pub fn stored_component(self, component: usize) -> usize {
        match self.components() {
            3 => 2usize.saturating_sub(component),
            4 if component < 3 => 2 - component,
            _ => component,
        }
    }
}
