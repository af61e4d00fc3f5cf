//! Zeiss CZI containers.
//!
//! # Reading Pipeline
//!
//! ```text
//! segment     ZISRAWFILE header ──► metadata segment, directory segment
//! subblock    directory entries ──► SubBlock (rect, zoom, axis ranges, strides)
//! scene_id    SubBlock dimensions ──► SceneId, one scene per identity
//! pyramid     scene blocks ──► zoom levels ──► tiles
//! scene       region request ──► level selection ──► tile composition
//! ```
//!
//! Only uncompressed sub-blocks can be decoded.

mod metadata;
mod pixel_type;
mod pyramid;
mod scene;
mod scene_id;
mod segment;
mod slide;
mod subblock;

pub use metadata::CziMetadata;
pub use pixel_type::PixelType;
pub use pyramid::{ComponentInfo, ScenePyramid, Tile, ZoomLevel, ZOOM_TOLERANCE};
pub use scene::CziScene;
pub use scene_id::{
    enumerate_identities, SceneCoordinates, SceneId, MAX_ENUMERATED_IDENTITIES, SCENE_ID_RADIX,
};
pub use segment::{
    DimensionEntry, DirectoryEntry, FileHeader, SegmentHeader, DIRECTORY_TAG, FILE_TAG,
    METADATA_TAG, SUBBLOCK_TAG,
};
pub use slide::{CziFile, CziSlide};
pub use subblock::{Axis, Coordinates, Dimension, SubBlock};
