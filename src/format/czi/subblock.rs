//! Directory entries resolved into addressable sub-blocks.
//!
//! A sub-block is one stored rectangle of pixels. Besides its X/Y placement it
//! carries one index (or, for channels, a contiguous index range) on each of
//! the other axes it was acquired along. Decoded sub-block data is laid out
//! as consecutive planes, the first listed axis varying fastest.

use super::pixel_type::PixelType;
use super::scene_id::SceneId;
use super::segment::{DimensionEntry, DirectoryEntry};
use crate::error::{ConfigurationError, FormatError, SlideError};
use crate::raster::Rect;

/// Non-pixel axes a sub-block can be addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Channel,
    Z,
    T,
    Rotation,
    Scene,
    Illumination,
    /// "B" axis
    Acquisition,
    /// "H" axis
    Phase,
    View,
}

/// Number of non-pixel axes.
pub const AXIS_COUNT: usize = 9;

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [
        Axis::Channel,
        Axis::Z,
        Axis::T,
        Axis::Rotation,
        Axis::Scene,
        Axis::Illumination,
        Axis::Acquisition,
        Axis::Phase,
        Axis::View,
    ];

    pub fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'C' => Some(Axis::Channel),
            b'Z' => Some(Axis::Z),
            b'T' => Some(Axis::T),
            b'R' => Some(Axis::Rotation),
            b'S' => Some(Axis::Scene),
            b'I' => Some(Axis::Illumination),
            b'B' => Some(Axis::Acquisition),
            b'H' => Some(Axis::Phase),
            b'V' => Some(Axis::View),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::Channel => 'C',
            Axis::Z => 'Z',
            Axis::T => 'T',
            Axis::Rotation => 'R',
            Axis::Scene => 'S',
            Axis::Illumination => 'I',
            Axis::Acquisition => 'B',
            Axis::Phase => 'H',
            Axis::View => 'V',
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A `start..start + size` index range on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub axis: Axis,
    pub start: i32,
    pub size: i32,
}

/// A point on all nine non-pixel axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coordinates {
    pub channel: i32,
    pub z: i32,
    pub t: i32,
    pub rotation: i32,
    pub scene: i32,
    pub illumination: i32,
    pub acquisition: i32,
    pub phase: i32,
    pub view: i32,
}

impl Coordinates {
    /// Plane of `scene` at the given channel, Z-slice and time-frame.
    pub fn in_scene(scene: SceneId, channel: i32, z: i32, t: i32) -> Self {
        let identity = scene.decode();
        Self {
            channel,
            z,
            t,
            rotation: identity.rotation,
            scene: identity.scene,
            illumination: identity.illumination,
            acquisition: identity.acquisition,
            phase: identity.phase,
            view: identity.view,
        }
    }

    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Channel => self.channel,
            Axis::Z => self.z,
            Axis::T => self.t,
            Axis::Rotation => self.rotation,
            Axis::Scene => self.scene,
            Axis::Illumination => self.illumination,
            Axis::Acquisition => self.acquisition,
            Axis::Phase => self.phase,
            Axis::View => self.view,
        }
    }
}

/// One stored sub-image and its coordinates.
#[derive(Debug, Clone)]
pub struct SubBlock {
    pixel_type: PixelType,
    file_position: u64,
    file_part: i32,
    compression: i32,
    entry_dimension_count: i32,
    rect: Rect,
    zoom: f64,
    dimensions: Vec<Dimension>,
    /// Byte stride per axis within decoded data; 0 for absent axes
    strides: [u64; AXIS_COUNT],
    plane_size: u64,
    scene_id: SceneId,
}

impl SubBlock {
    /// Resolve a directory entry and its dimension records.
    ///
    /// # Errors
    /// - `UnsupportedPixelType` for formats without a raster representation
    /// - `InvalidDimension` for a zero logical X size, negative stored sizes
    ///   or extents past `i32::MAX`
    /// - `UnknownDimension` for axis letters outside `XYCZTRSIBHV`
    /// - `UnexpectedSubBlockExtent` when an axis other than X, Y or C spans
    ///   more than one index
    pub fn parse(
        entry: &DirectoryEntry,
        dimension_entries: &[DimensionEntry],
        path: &str,
    ) -> Result<Self, SlideError> {
        let pixel_type =
            PixelType::from_code(entry.pixel_type).ok_or_else(|| FormatError::UnsupportedPixelType {
                path: path.to_string(),
                pixel_type: entry.pixel_type,
            })?;
        let invalid = |axis: char, message: String| FormatError::InvalidDimension {
            path: path.to_string(),
            axis,
            message,
        };

        let mut rect = Rect::default();
        let mut zoom = 1.0;
        let mut dimensions = Vec::with_capacity(dimension_entries.len());

        for dim in dimension_entries {
            match dim.axis {
                b'X' => {
                    if dim.size == 0 {
                        return Err(invalid('X', "logical size is 0".to_string()).into());
                    }
                    if dim.stored_size < 0 {
                        return Err(invalid('X', format!("stored size {}", dim.stored_size)).into());
                    }
                    if dim.start.checked_add(dim.stored_size).is_none() {
                        return Err(invalid(
                            'X',
                            format!("extent {}+{} overflows", dim.start, dim.stored_size),
                        )
                        .into());
                    }
                    rect.x = dim.start;
                    rect.width = dim.stored_size;
                    zoom = dim.stored_size as f64 / dim.size as f64;
                    if zoom <= 0.0 {
                        return Err(invalid(
                            'X',
                            format!("zoom {}/{} is not positive", dim.stored_size, dim.size),
                        )
                        .into());
                    }
                }
                b'Y' => {
                    if dim.stored_size < 0 {
                        return Err(invalid('Y', format!("stored size {}", dim.stored_size)).into());
                    }
                    if dim.start.checked_add(dim.stored_size).is_none() {
                        return Err(invalid(
                            'Y',
                            format!("extent {}+{} overflows", dim.start, dim.stored_size),
                        )
                        .into());
                    }
                    rect.y = dim.start;
                    rect.height = dim.stored_size;
                }
                letter => {
                    let axis = Axis::from_letter(letter).ok_or_else(|| FormatError::UnknownDimension {
                        path: path.to_string(),
                        axis: letter as char,
                    })?;
                    let allowed = if axis == Axis::Channel {
                        dim.size >= 1
                    } else {
                        dim.size == 1
                    };
                    if !allowed {
                        return Err(ConfigurationError::UnexpectedSubBlockExtent {
                            path: path.to_string(),
                            axis: axis.letter(),
                            size: dim.size,
                        }
                        .into());
                    }
                    if dim.start.checked_add(dim.size).is_none() {
                        return Err(invalid(
                            axis.letter(),
                            format!("index range {}+{} overflows", dim.start, dim.size),
                        )
                        .into());
                    }
                    dimensions.push(Dimension {
                        axis,
                        start: dim.start,
                        size: dim.size,
                    });
                }
            }
        }

        let plane_size =
            rect.width as u64 * rect.height as u64 * pixel_type.pixel_size() as u64;
        let mut strides = [0u64; AXIS_COUNT];
        let mut stride = plane_size;
        for dim in &dimensions {
            strides[dim.axis.index()] = stride;
            stride = stride.saturating_mul(dim.size as u64);
        }

        Ok(Self {
            pixel_type,
            file_position: entry.file_position.max(0) as u64,
            file_part: entry.file_part,
            compression: entry.compression,
            entry_dimension_count: entry.dimension_count,
            rect,
            zoom,
            scene_id: SceneId::from_dimensions(&dimensions),
            dimensions,
            strides,
            plane_size,
        })
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Offset of the sub-block segment in the file.
    pub fn file_position(&self) -> u64 {
        self.file_position
    }

    pub fn file_part(&self) -> i32 {
        self.file_part
    }

    pub fn compression(&self) -> i32 {
        self.compression
    }

    /// Dimension record count of the directory entry, X and Y included.
    pub fn entry_dimension_count(&self) -> i32 {
        self.entry_dimension_count
    }

    /// Placement in base-level pixels; width and height are the stored size.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Stored size over logical size.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Bytes in one decoded plane (all components of one channel index).
    pub fn plane_size(&self) -> u64 {
        self.plane_size
    }

    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    fn dimension(&self, axis: Axis) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.axis == axis)
    }

    /// First index on `axis`; 0 when the block has no such axis.
    pub fn first(&self, axis: Axis) -> i32 {
        self.dimension(axis).map_or(0, |d| d.start)
    }

    /// Last index on `axis` (inclusive); 0 when the block has no such axis.
    pub fn last(&self, axis: Axis) -> i32 {
        self.dimension(axis).map_or(0, |d| d.start + d.size - 1)
    }

    /// True when `coords` falls inside the block on every axis.
    pub fn is_in_block(&self, coords: &Coordinates) -> bool {
        Axis::ALL.iter().all(|&axis| {
            let v = coords.get(axis);
            self.first(axis) <= v && v <= self.last(axis)
        })
    }

    /// Byte offset of the plane at `coords` within the decoded data, or
    /// `None` if the block does not cover `coords`.
    pub fn data_offset(&self, coords: &Coordinates) -> Option<u64> {
        if !self.is_in_block(coords) {
            return None;
        }
        let offset = Axis::ALL
            .iter()
            .map(|&axis| (coords.get(axis) - self.first(axis)) as u64 * self.strides[axis.index()])
            .sum();
        Some(offset)
    }
}
