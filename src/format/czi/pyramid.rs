//! Organisation of a scene's sub-blocks into zoom levels and tiles.
//!
//! Sub-blocks are grouped by zoom factor into levels (finest first). Inside a
//! level, sub-blocks stored at the same base-level position form one tile;
//! typically each covers a different channel of the same area.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use super::pixel_type::PixelType;
use super::subblock::{Axis, SubBlock};
use crate::error::{ConfigurationError, SlideError};
use crate::raster::{DataType, Rect};

/// Two zoom factors closer than this belong to the same level.
pub const ZOOM_TOLERANCE: f64 = 1e-4;

fn same_zoom(a: f64, b: f64) -> bool {
    (a - b).abs() < ZOOM_TOLERANCE
}

/// Sub-blocks sharing one stored top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Placement in the level's pixel space, relative to the scene origin
    pub rect: Rect,
    /// Indices into the scene's sub-block list, in directory order
    pub blocks: Vec<usize>,
}

/// All tiles stored at one zoom factor.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomLevel {
    pub zoom: f64,
    pub tiles: Vec<Tile>,
}

/// Zoom levels and extents of one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePyramid {
    /// Base-level bounding box of the scene
    pub rect: Rect,
    /// Levels sorted by descending zoom; index 0 is the base level
    pub levels: Vec<ZoomLevel>,
    pub z_slices: usize,
    pub t_frames: usize,
}

/// Pack a base-level position into a tile key.
fn tile_key(rect: &Rect) -> u64 {
    ((rect.x as u32 as u64) << 32) | rect.y as u32 as u64
}

impl ScenePyramid {
    /// Build the pyramid of a scene from its sub-blocks.
    ///
    /// # Errors
    /// - `UnexpectedMaxZoom` if the finest level is not unscaled
    /// - `Unexpected4dConfiguration` if Z-slices or time-frames do not start at 0
    pub fn build(blocks: &[SubBlock], path: &str) -> Result<Self, SlideError> {
        // Group by zoom, first-seen order
        let mut groups: Vec<(f64, Vec<usize>)> = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            match groups.iter_mut().find(|(zoom, _)| same_zoom(*zoom, block.zoom())) {
                Some((_, members)) => members.push(index),
                None => groups.push((block.zoom(), vec![index])),
            }
        }
        groups.sort_by(|(a, _), (b, _)| {
            if same_zoom(*a, *b) {
                std::cmp::Ordering::Equal
            } else {
                b.total_cmp(a)
            }
        });

        let Some((base_zoom, base_members)) = groups.first() else {
            return Ok(Self {
                rect: Rect::default(),
                levels: Vec::new(),
                z_slices: 0,
                t_frames: 0,
            });
        };
        if !same_zoom(*base_zoom, 1.0) {
            return Err(ConfigurationError::UnexpectedMaxZoom {
                path: path.to_string(),
                zoom: *base_zoom,
            }
            .into());
        }

        let base_tiles = group_tiles(blocks, base_members);
        let rect = base_tiles
            .iter()
            .fold(Rect::default(), |acc, (first, _)| acc.union(&blocks[*first].rect()));

        let (z_slices, t_frames) = plane_extents(blocks, base_members, path)?;

        let levels: Vec<ZoomLevel> = groups
            .iter()
            .map(|(zoom, members)| ZoomLevel {
                zoom: *zoom,
                tiles: group_tiles(blocks, members)
                    .into_iter()
                    .map(|(first, members)| Tile {
                        rect: level_rect(&blocks[first].rect(), &rect, *zoom),
                        blocks: members,
                    })
                    .collect(),
            })
            .collect();

        debug!(
            path,
            rect = %rect,
            levels = levels.len(),
            z_slices,
            t_frames,
            "built scene pyramid"
        );

        Ok(Self {
            rect,
            levels,
            z_slices,
            t_frames,
        })
    }

    /// Zoom factor of each level, finest first.
    pub fn zooms(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.zoom).collect()
    }
}

/// Group level members by stored position. Returns (first block, all blocks)
/// per tile in discovery order.
fn group_tiles(blocks: &[SubBlock], members: &[usize]) -> Vec<(usize, Vec<usize>)> {
    let mut by_key: HashMap<u64, usize> = HashMap::new();
    let mut tiles: Vec<(usize, Vec<usize>)> = Vec::new();
    for &index in members {
        let key = tile_key(&blocks[index].rect());
        match by_key.get(&key) {
            Some(&tile) => tiles[tile].1.push(index),
            None => {
                by_key.insert(key, tiles.len());
                tiles.push((index, vec![index]));
            }
        }
    }
    tiles
}

/// Map a block's base-level placement into level pixels relative to the scene.
fn level_rect(block: &Rect, scene: &Rect, zoom: f64) -> Rect {
    Rect::new(
        ((block.x - scene.x) as f64 * zoom).floor() as i32,
        ((block.y - scene.y) as f64 * zoom).floor() as i32,
        block.width,
        block.height,
    )
}

fn plane_extents(
    blocks: &[SubBlock],
    members: &[usize],
    path: &str,
) -> Result<(usize, usize), SlideError> {
    let range = |axis: Axis| {
        members.iter().fold((i32::MAX, i32::MIN), |(lo, hi), &i| {
            (lo.min(blocks[i].first(axis)), hi.max(blocks[i].last(axis)))
        })
    };
    let (first_z, last_z) = range(Axis::Z);
    let (first_t, last_t) = range(Axis::T);
    if first_z != 0 || first_t != 0 {
        return Err(ConfigurationError::Unexpected4dConfiguration {
            path: path.to_string(),
            first_z,
            first_t,
        }
        .into());
    }
    Ok(((last_z + 1) as usize, (last_t + 1) as usize))
}

/// One logical component of a scene: a channel, or one color component of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
    /// Channel index (C coordinate)
    pub channel: i32,
    /// Component within the channel's pixel
    pub sub_component: usize,
    pub name: String,
    pub pixel_type: PixelType,
}

impl ComponentInfo {
    pub fn data_type(&self) -> DataType {
        self.pixel_type.data_type()
    }
}

/// Pixel type of each channel index, in channel order.
///
/// When blocks disagree about a channel's pixel type, the first one wins.
pub fn channel_pixel_types(blocks: &[SubBlock], path: &str) -> BTreeMap<i32, PixelType> {
    let mut channels = BTreeMap::new();
    for block in blocks {
        for channel in block.first(Axis::Channel)..=block.last(Axis::Channel) {
            let existing = *channels.entry(channel).or_insert(block.pixel_type());
            if existing != block.pixel_type() {
                warn!(
                    path,
                    channel,
                    kept = ?existing,
                    ignored = ?block.pixel_type(),
                    "channel stored with conflicting pixel types"
                );
            }
        }
    }
    channels
}

/// Expand channels into components.
///
/// Multi-component channels produce one entry per component named
/// `"<channel name>:<k>"` with `k` counting from 1.
pub fn build_components(
    channels: &BTreeMap<i32, PixelType>,
    channel_name: impl Fn(i32) -> String,
) -> Vec<ComponentInfo> {
    let mut components = Vec::new();
    for (&channel, &pixel_type) in channels {
        let name = channel_name(channel);
        let count = pixel_type.components();
        for sub_component in 0..count {
            components.push(ComponentInfo {
                channel,
                sub_component,
                name: if count > 1 {
                    format!("{}:{}", name, sub_component + 1)
                } else {
                    name.clone()
                },
                pixel_type,
            });
        }
    }
    components
}
