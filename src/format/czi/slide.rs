//! Opening a CZI container.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::metadata::CziMetadata;
use super::pyramid::{build_components, channel_pixel_types, ComponentInfo};
use super::scene::CziScene;
use super::scene_id::{enumerate_identities, SceneId};
use super::segment::{
    read_record, DimensionEntry, DirectoryEntry, DirectoryHeader, FileHeader, MetadataHeader,
    SegmentHeader, SubBlockHeader, DIMENSION_ENTRY_SIZE, DIRECTORY_ENTRY_SIZE,
    DIRECTORY_HEADER_SIZE, DIRECTORY_TAG, MAX_DIMENSION_COUNT, METADATA_HEADER_SIZE,
    METADATA_TAG, SEGMENT_HEADER_SIZE, SUBBLOCK_HEADER_SIZE, SUBBLOCK_TAG,
};
use super::subblock::SubBlock;
use crate::error::{FormatError, SlideError};
use crate::io::{BlockCache, FileRangeReader, RangeReader};
use crate::slide::ReaderOptions;

/// Compression code of uncompressed sub-blocks.
const COMPRESSION_NONE: i32 = 0;

/// Byte access to an open container, shared by its scenes.
pub struct CziFile {
    reader: Arc<dyn RangeReader>,
    path: String,
}

impl CziFile {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read and decompress the pixel data of `block`.
    ///
    /// # Errors
    /// - `InvalidSegment` if the entry does not point at a sub-block segment
    /// - `UnsupportedCompression` for anything but uncompressed data
    pub fn read_sub_block_data(&self, block: &SubBlock) -> Result<Bytes, FormatError> {
        if block.compression() != COMPRESSION_NONE {
            return Err(FormatError::UnsupportedCompression {
                path: self.path.clone(),
                compression: block.compression(),
            });
        }

        let position = block.file_position();
        SegmentHeader::read(self.reader.as_ref(), position, SUBBLOCK_TAG)?;
        let header_bytes = read_record(
            self.reader.as_ref(),
            position + SEGMENT_HEADER_SIZE as u64,
            SUBBLOCK_HEADER_SIZE,
            "sub-block header",
        )?;
        let header = SubBlockHeader::parse(&header_bytes);
        if header.data_size < 0 {
            return Err(FormatError::Truncated {
                path: self.path.clone(),
                what: format!("sub-block at {} (data size {})", position, header.data_size),
            });
        }

        let data_position = header.data_position(position, block.entry_dimension_count());
        read_record(
            self.reader.as_ref(),
            data_position,
            header.data_size as usize,
            "sub-block data",
        )
    }
}

/// An open CZI file: header, metadata and one [`CziScene`] per scene identity.
pub struct CziSlide {
    file: Arc<CziFile>,
    header: FileHeader,
    metadata: CziMetadata,
    components: Arc<[ComponentInfo]>,
    scenes: Vec<CziScene>,
}

impl CziSlide {
    /// Open a file from disk through a block cache.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let reader = FileRangeReader::open(path)?;
        let cached = BlockCache::with_capacity(reader, options.block_size, options.cache_blocks);
        Self::open_with_reader(Arc::new(cached), &path.display().to_string())
    }

    /// Parse a container from any byte source.
    ///
    /// The header, metadata and directory are read eagerly and every scene is
    /// built before this returns.
    pub fn open_with_reader(reader: Arc<dyn RangeReader>, path: &str) -> Result<Self, SlideError> {
        let header = FileHeader::read(reader.as_ref())?;
        let metadata = read_metadata(reader.as_ref(), header.metadata_position, path)?;
        let blocks = read_directory(reader.as_ref(), header.directory_position, path)?;

        let channels = channel_pixel_types(&blocks, path);
        let components: Arc<[ComponentInfo]> = build_components(&channels, |channel| {
            metadata
                .channel_name(channel.max(0) as usize)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    warn!(path, channel, "no name for channel");
                    format!("Channel {}", channel)
                })
        })
        .into();

        let mut by_scene: BTreeMap<SceneId, Vec<SubBlock>> = BTreeMap::new();
        for block in blocks {
            by_scene.entry(block.scene_id()).or_default().push(block);
        }

        if !metadata.scene_ranges.is_empty() {
            match enumerate_identities(&metadata.scene_ranges) {
                Some(declared) => {
                    for id in declared.into_iter().filter(|id| !by_scene.contains_key(id)) {
                        warn!(path, scene = %id.decode(), "declared scene has no sub-blocks");
                    }
                }
                None => warn!(path, "declared scene sizes too large to check"),
            }
        }

        let file = Arc::new(CziFile {
            reader,
            path: path.to_string(),
        });

        let scenes = by_scene
            .into_iter()
            .map(|(id, blocks)| {
                CziScene::new(file.clone(), id, blocks, components.clone(), &metadata)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            path,
            major_version = header.major_version,
            minor_version = header.minor_version,
            scenes = scenes.len(),
            components = components.len(),
            "opened CZI container"
        );

        Ok(Self {
            file,
            header,
            metadata,
            components,
            scenes,
        })
    }

    pub fn path(&self) -> &str {
        self.file.path()
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.header
    }

    pub fn metadata(&self) -> &CziMetadata {
        &self.metadata
    }

    /// Components shared by all scenes.
    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn scene(&self, index: usize) -> Result<&CziScene, SlideError> {
        self.scenes.get(index).ok_or(SlideError::OutOfRange {
            what: "scene",
            index,
            count: self.scenes.len(),
        })
    }

    pub fn scenes(&self) -> &[CziScene] {
        &self.scenes
    }
}

fn read_metadata(
    reader: &dyn RangeReader,
    position: u64,
    path: &str,
) -> Result<CziMetadata, FormatError> {
    SegmentHeader::read(reader, position, METADATA_TAG)?;
    let header_pos = position + SEGMENT_HEADER_SIZE as u64;
    let header = MetadataHeader::parse(&read_record(
        reader,
        header_pos,
        METADATA_HEADER_SIZE,
        "metadata header",
    )?);
    let xml_bytes = read_record(
        reader,
        header_pos + METADATA_HEADER_SIZE as u64,
        header.xml_size as usize,
        "metadata document",
    )?;
    let xml = std::str::from_utf8(&xml_bytes).map_err(|e| FormatError::Metadata {
        path: path.to_string(),
        message: format!("document is not UTF-8: {}", e),
    })?;
    CziMetadata::parse(xml.trim_end_matches('\0'), path)
}

fn read_directory(
    reader: &dyn RangeReader,
    position: u64,
    path: &str,
) -> Result<Vec<SubBlock>, SlideError> {
    SegmentHeader::read(reader, position, DIRECTORY_TAG)?;
    let header_pos = position + SEGMENT_HEADER_SIZE as u64;
    let header = DirectoryHeader::parse(&read_record(
        reader,
        header_pos,
        DIRECTORY_HEADER_SIZE,
        "directory header",
    )?);

    let mut offset = header_pos + DIRECTORY_HEADER_SIZE as u64;
    // The count is untrusted; entries that cannot fit in the file fail as truncated
    let fitting = reader.size().saturating_sub(offset) / DIRECTORY_ENTRY_SIZE as u64;
    let mut blocks = Vec::with_capacity((header.entry_count as u64).min(fitting) as usize);
    for _ in 0..header.entry_count {
        let entry = DirectoryEntry::parse(&read_record(
            reader,
            offset,
            DIRECTORY_ENTRY_SIZE,
            "directory entry",
        )?);
        if !(0..=MAX_DIMENSION_COUNT).contains(&entry.dimension_count) {
            return Err(FormatError::Truncated {
                path: path.to_string(),
                what: format!(
                    "directory entry at {} (dimension count {})",
                    offset, entry.dimension_count
                ),
            }
            .into());
        }

        let dims_bytes = read_record(
            reader,
            offset + DIRECTORY_ENTRY_SIZE as u64,
            entry.dimension_count as usize * DIMENSION_ENTRY_SIZE,
            "dimension entries",
        )?;
        let dims: Vec<DimensionEntry> = dims_bytes
            .chunks_exact(DIMENSION_ENTRY_SIZE)
            .map(DimensionEntry::parse)
            .collect();

        blocks.push(SubBlock::parse(&entry, &dims, path)?);
        offset += entry.size() as u64;
    }

    debug!(path, entries = blocks.len(), "read CZI directory");
    Ok(blocks)
}
