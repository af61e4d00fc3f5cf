//! One CZI scene and its region reads.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::metadata::CziMetadata;
use super::pyramid::{ComponentInfo, ScenePyramid, ZoomLevel};
use super::scene_id::SceneId;
use super::slide::CziFile;
use super::subblock::{Coordinates, SubBlock};
use crate::error::{FormatError, SlideError};
use crate::raster::{scale_rect, DataType, Raster, Rect, Size};
use crate::slide::{Resolution, Scene};
use crate::tile::{compose_region, select_zoom_level, TileSource};

/// An independently addressable image inside a CZI file.
///
/// Regions are addressed in base-level pixels relative to the scene's
/// top-left corner, so `(0, 0)` is the first pixel of [`Scene::rect`].
pub struct CziScene {
    file: Arc<CziFile>,
    id: SceneId,
    name: String,
    blocks: Vec<SubBlock>,
    pyramid: ScenePyramid,
    components: Arc<[ComponentInfo]>,
    resolution: Resolution,
    magnification: f64,
}

impl CziScene {
    pub(crate) fn new(
        file: Arc<CziFile>,
        id: SceneId,
        blocks: Vec<SubBlock>,
        components: Arc<[ComponentInfo]>,
        metadata: &CziMetadata,
    ) -> Result<Self, SlideError> {
        let pyramid = ScenePyramid::build(&blocks, file.path())?;
        let name = format!("{} {}", metadata.title, id.decode());
        debug!(
            path = file.path(),
            scene = %name,
            blocks = blocks.len(),
            "built CZI scene"
        );
        Ok(Self {
            file,
            id,
            name,
            blocks,
            pyramid,
            components,
            resolution: metadata.resolution,
            magnification: metadata.magnification,
        })
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn sub_blocks(&self) -> &[SubBlock] {
        &self.blocks
    }

    pub fn pyramid(&self) -> &ScenePyramid {
        &self.pyramid
    }

    /// Zoom factor of each stored level, finest first.
    pub fn zoom_levels(&self) -> Vec<f64> {
        self.pyramid.zooms()
    }

    fn component(&self, index: usize) -> Result<&ComponentInfo, SlideError> {
        self.components.get(index).ok_or(SlideError::OutOfRange {
            what: "channel",
            index,
            count: self.components.len(),
        })
    }

    /// Read `rect` of Z-slice `z` and time-frame `t`, resampled to `size`.
    ///
    /// An empty `components` list reads every component in index order.
    pub fn read_resampled_plane(
        &self,
        rect: Rect,
        size: Size,
        components: &[usize],
        z: usize,
        t: usize,
    ) -> Result<Raster, SlideError> {
        if rect.is_empty() || size.is_empty() {
            return Err(SlideError::InvalidRegion { rect, size });
        }
        if z >= self.pyramid.z_slices {
            return Err(SlideError::OutOfRange {
                what: "z-slice",
                index: z,
                count: self.pyramid.z_slices,
            });
        }
        if t >= self.pyramid.t_frames {
            return Err(SlideError::OutOfRange {
                what: "t-frame",
                index: t,
                count: self.pyramid.t_frames,
            });
        }
        for &component in components {
            self.component(component)?;
        }

        let zoom = f64::max(
            size.width as f64 / rect.width as f64,
            size.height as f64 / rect.height as f64,
        );
        let zooms = self.pyramid.zooms();
        let level_index = select_zoom_level(zoom, &zooms);
        let level = &self.pyramid.levels[level_index];
        let level_rect = scale_rect(&rect, level.zoom, level.zoom);

        debug!(
            scene = %self.name,
            rect = %rect,
            size = %size,
            zoom,
            level = level_index,
            level_zoom = level.zoom,
            "reading CZI region"
        );

        let source = LevelTiles {
            scene: self,
            level,
            z: z as i32,
            t: t as i32,
        };
        let composed = compose_region(&source, components, level_rect, size)?
            .ok_or(SlideError::EmptyRegion { rect })?;

        if composed.size() == size {
            Ok(composed)
        } else {
            Ok(composed.resize(size.width as u32, size.height as u32))
        }
    }

    /// Decode the sub-blocks of one tile for the given components.
    fn read_tile(
        &self,
        tile_blocks: &[usize],
        components: &[usize],
        z: i32,
        t: i32,
    ) -> Result<Option<Raster>, SlideError> {
        let all: Vec<usize>;
        let components = if components.is_empty() {
            all = (0..self.components.len()).collect();
            &all[..]
        } else {
            components
        };

        let mut decoded: HashMap<usize, Bytes> = HashMap::new();
        let mut planes: Vec<Option<Raster>> = Vec::with_capacity(components.len());

        for &index in components {
            let component = self.component(index)?;
            let coords = Coordinates::in_scene(self.id, component.channel, z, t);

            let hit = tile_blocks.iter().find_map(|&b| {
                self.blocks[b].data_offset(&coords).map(|offset| (b, offset))
            });
            let Some((block_index, offset)) = hit else {
                planes.push(None);
                continue;
            };

            let block = &self.blocks[block_index];
            let data = match decoded.get(&block_index) {
                Some(data) => data.clone(),
                None => {
                    let data = self.file.read_sub_block_data(block)?;
                    decoded.insert(block_index, data.clone());
                    data
                }
            };
            planes.push(Some(extract_plane(block, &data, offset, component, self.file.path())?));
        }

        let Some(reference) = planes.iter().flatten().next() else {
            return Ok(None);
        };
        let (width, height) = (reference.width(), reference.height());

        let planes: Vec<Raster> = planes
            .into_iter()
            .zip(components)
            .map(|(plane, &index)| {
                plane.unwrap_or_else(|| {
                    let data_type = self
                        .components
                        .get(index)
                        .map_or(DataType::Byte, ComponentInfo::data_type);
                    Raster::new(width, height, 1, data_type)
                })
            })
            .collect();

        Ok(Some(Raster::merge_channels(&planes)?))
    }
}

/// Cut one component's plane out of decoded sub-block data.
fn extract_plane(
    block: &SubBlock,
    data: &Bytes,
    offset: u64,
    component: &ComponentInfo,
    path: &str,
) -> Result<Raster, SlideError> {
    let rect = block.rect();
    let pixel_type = block.pixel_type();
    let start = offset as usize;
    let end = start + block.plane_size() as usize;
    let bytes = data.get(start..end).ok_or_else(|| FormatError::Truncated {
        path: path.to_string(),
        what: format!(
            "sub-block data at {} ({} bytes, plane needs {}..{})",
            block.file_position(),
            data.len(),
            start,
            end
        ),
    })?;

    let plane = Raster::from_bytes(
        rect.width as u32,
        rect.height as u32,
        pixel_type.components(),
        pixel_type.data_type(),
        bytes.to_vec(),
    )?;
    if pixel_type.components() == 1 {
        Ok(plane)
    } else {
        plane.extract_channel(pixel_type.stored_component(component.sub_component))
    }
}

/// The tiles of one zoom level at a fixed Z-slice and time-frame.
struct LevelTiles<'a> {
    scene: &'a CziScene,
    level: &'a ZoomLevel,
    z: i32,
    t: i32,
}

impl TileSource for LevelTiles<'_> {
    fn tile_count(&self) -> usize {
        self.level.tiles.len()
    }

    fn tile_rect(&self, index: usize) -> Rect {
        self.level.tiles[index].rect
    }

    fn read_tile(&self, index: usize, components: &[usize]) -> Result<Option<Raster>, SlideError> {
        self.scene
            .read_tile(&self.level.tiles[index].blocks, components, self.z, self.t)
    }
}

impl Scene for CziScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_path(&self) -> &str {
        self.file.path()
    }

    fn rect(&self) -> Rect {
        self.pyramid.rect
    }

    fn num_channels(&self) -> usize {
        self.components.len()
    }

    fn channel_name(&self, channel: usize) -> Result<&str, SlideError> {
        Ok(&self.component(channel)?.name)
    }

    fn channel_data_type(&self, channel: usize) -> Result<DataType, SlideError> {
        Ok(self.component(channel)?.data_type())
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn magnification(&self) -> f64 {
        self.magnification
    }

    fn num_z_slices(&self) -> usize {
        self.pyramid.z_slices
    }

    fn num_t_frames(&self) -> usize {
        self.pyramid.t_frames
    }

    fn read_resampled_region(
        &self,
        rect: Rect,
        size: Size,
        components: &[usize],
    ) -> Result<Raster, SlideError> {
        self.read_resampled_plane(rect, size, components, 0, 0)
    }
}
