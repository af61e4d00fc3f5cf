//! CZI driver integration tests.
//!
//! Tests verify:
//! - Container parsing (header, metadata, directory) from in-memory files
//! - Tile composition across sub-blocks and channel selection
//! - Zoom level selection for downscaled reads
//! - Scene identity, Z-slices and time-frames
//! - Structural and configuration errors

use std::sync::Arc;

use slideio::error::{ConfigurationError, FormatError};
use slideio::io::{BlockCache, MemoryRangeReader};
use slideio::{CziSlide, DataType, Rect, Scene, Size, SlideError};

use super::test_utils::{
    czi_metadata, three_channel_czi, CziBlock, CziBuilder, TrackingReader, CZI_BGR24, CZI_GRAY16,
    CZI_GRAY8,
};

fn open(data: Vec<u8>) -> Result<CziSlide, SlideError> {
    let reader = MemoryRangeReader::new(data, "mem://test.czi");
    CziSlide::open_with_reader(Arc::new(reader), "mem://test.czi")
}

/// Interleaved pixel at (x, y).
fn pixel(raster: &slideio::Raster, x: u32, y: u32) -> Vec<u8> {
    let channels = raster.channels();
    let at = (y * raster.width() + x) as usize * channels;
    raster.as_bytes()[at..at + channels].to_vec()
}

// =============================================================================
// Scene Properties
// =============================================================================

#[test]
fn test_scene_properties_from_metadata() {
    let slide = open(three_channel_czi()).unwrap();
    assert_eq!(slide.scene_count(), 1);
    assert_eq!(slide.metadata().title, "Kidney");
    assert_eq!(slide.file_header().major_version, 1);

    let scene = slide.scene(0).unwrap();
    assert!(scene.name().starts_with("Kidney"));
    assert_eq!(scene.file_path(), "mem://test.czi");
    assert_eq!(scene.rect(), Rect::new(0, 0, 128, 128));
    assert_eq!(scene.num_channels(), 3);
    assert_eq!(scene.channel_name(0).unwrap(), "DAPI");
    assert_eq!(scene.channel_name(2).unwrap(), "TRITC");
    assert_eq!(scene.channel_data_type(1).unwrap(), DataType::Byte);
    assert_eq!(scene.resolution().x, 2.5e-7);
    assert_eq!(scene.resolution().y, 2.5e-7);
    assert_eq!(scene.magnification(), 20.0);
    assert_eq!(scene.num_z_slices(), 1);
    assert_eq!(scene.num_t_frames(), 1);
    assert_eq!(scene.zoom_levels(), vec![1.0, 0.5]);

    assert!(matches!(
        scene.channel_name(3),
        Err(SlideError::OutOfRange { what: "channel", index: 3, count: 3 })
    ));
    assert!(matches!(
        slide.scene(1),
        Err(SlideError::OutOfRange { what: "scene", .. })
    ));
}

#[test]
fn test_channels_without_names() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 16, 16).at(b'C', 0))
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 16, 16).at(b'C', 1))
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.channel_name(1).unwrap(), "Channel 1");
    assert_eq!(scene.magnification(), 0.0);
}

// =============================================================================
// Region Reads
// =============================================================================

#[test]
fn test_full_resolution_read_stitches_tiles() {
    let slide = open(three_channel_czi()).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene.read_region(Rect::new(0, 0, 128, 128), &[]).unwrap();
    assert_eq!(raster.size(), Size::new(128, 128));
    assert_eq!(raster.channels(), 3);
    assert_eq!(raster.data_type(), DataType::Byte);

    assert_eq!(pixel(&raster, 10, 10), vec![10, 20, 30]);
    assert_eq!(pixel(&raster, 100, 10), vec![11, 21, 31]);
    assert_eq!(pixel(&raster, 10, 100), vec![12, 22, 32]);
    assert_eq!(pixel(&raster, 100, 100), vec![13, 23, 33]);
}

#[test]
fn test_component_selection_and_order() {
    let slide = open(three_channel_czi()).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene.read_region(Rect::new(60, 0, 10, 10), &[2, 0]).unwrap();
    assert_eq!(raster.size(), Size::new(10, 10));
    assert_eq!(raster.channels(), 2);
    assert_eq!(pixel(&raster, 0, 0), vec![30, 10]);
    assert_eq!(pixel(&raster, 9, 9), vec![31, 11]);
}

#[test]
fn test_downscaled_read_uses_coarser_level() {
    let slide = open(three_channel_czi()).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene
        .read_resampled_region(Rect::new(0, 0, 128, 128), Size::new(64, 64), &[])
        .unwrap();
    assert_eq!(raster.size(), Size::new(64, 64));
    assert!(raster.as_bytes().chunks(3).all(|px| px == [200, 201, 202]));

    let quarter = scene
        .read_resampled_region(Rect::new(64, 64, 64, 64), Size::new(32, 32), &[1])
        .unwrap();
    assert_eq!(quarter.size(), Size::new(32, 32));
    assert!(quarter.as_bytes().iter().all(|&v| v == 201));
}

#[test]
fn test_intermediate_zoom_reads_finer_level() {
    let slide = open(three_channel_czi()).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene
        .read_resampled_region(Rect::new(0, 0, 128, 128), Size::new(96, 96), &[0])
        .unwrap();
    assert_eq!(raster.size(), Size::new(96, 96));
    // Values come from the base level, not the 200+ half-resolution level
    let top_left = pixel(&raster, 5, 5)[0];
    let bottom_right = pixel(&raster, 90, 90)[0];
    assert!((9..=11).contains(&top_left), "{}", top_left);
    assert!((12..=14).contains(&bottom_right), "{}", bottom_right);
}

#[test]
fn test_upscaled_read() {
    let slide = open(three_channel_czi()).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene
        .read_resampled_region(Rect::new(0, 0, 8, 8), Size::new(32, 32), &[2])
        .unwrap();
    assert_eq!(raster.size(), Size::new(32, 32));
    assert!(raster.as_bytes().iter().all(|&v| v == 30));
}

#[test]
fn test_regions_are_scene_local() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 1000, 2000, 64, 64).filled(42))
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.rect(), Rect::new(1000, 2000, 64, 64));

    let raster = scene.read_region(Rect::new(0, 0, 64, 64), &[]).unwrap();
    assert!(raster.as_bytes().iter().all(|&v| v == 42));
}

#[test]
fn test_missing_component_plane_is_zero() {
    // Channel 1 is only stored for the left tile
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 32, 32).at(b'C', 0).filled(10))
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 32, 32).at(b'C', 1).filled(20))
        .block(CziBlock::new(CZI_GRAY8, 32, 0, 32, 32).at(b'C', 0).filled(11))
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene.read_region(Rect::new(0, 0, 64, 32), &[]).unwrap();
    assert_eq!(pixel(&raster, 5, 5), vec![10, 20]);
    assert_eq!(pixel(&raster, 40, 5), vec![11, 0]);
}

#[test]
fn test_channel_range_block() {
    let data = CziBuilder::new()
        .block(
            CziBlock::new(CZI_GRAY8, 0, 0, 16, 16)
                .channels(0, 3)
                .planes(&[7, 8, 9]),
        )
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.num_channels(), 3);

    let raster = scene.read_region(Rect::new(0, 0, 16, 16), &[]).unwrap();
    assert!(raster.as_bytes().chunks(3).all(|px| px == [7, 8, 9]));
}

#[test]
fn test_bgr_channel_is_split_into_rgb_components() {
    let bgr: Vec<u8> = std::iter::repeat([1u8, 2, 3]).take(8 * 8).flatten().collect();
    let data = CziBuilder::new()
        .metadata(czi_metadata("Brightfield", &["Color"], None, None))
        .block(CziBlock::new(CZI_BGR24, 0, 0, 8, 8).at(b'C', 0).with_data(bgr))
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.num_channels(), 3);
    assert_eq!(scene.channel_name(0).unwrap(), "Color:1");
    assert_eq!(scene.channel_name(2).unwrap(), "Color:3");

    let raster = scene.read_region(Rect::new(0, 0, 8, 8), &[]).unwrap();
    assert!(raster.as_bytes().chunks(3).all(|px| px == [3, 2, 1]));

    let blue = scene.read_region(Rect::new(0, 0, 8, 8), &[2]).unwrap();
    assert!(blue.as_bytes().iter().all(|&v| v == 1));
}

#[test]
fn test_gray16_samples() {
    let samples: Vec<u8> = std::iter::repeat(1000u16.to_le_bytes())
        .take(4 * 4)
        .flatten()
        .collect();
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY16, 0, 0, 4, 4).with_data(samples))
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.channel_data_type(0).unwrap(), DataType::UInt16);

    let raster = scene.read_region(Rect::new(0, 0, 4, 4), &[]).unwrap();
    assert_eq!(raster.samples::<u16>().unwrap(), vec![1000u16; 16]);
}

// =============================================================================
// Scenes, Z-Slices and Time-Frames
// =============================================================================

#[test]
fn test_scene_identities_split_scenes() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 32, 32).at(b'S', 0).filled(1))
        .block(CziBlock::new(CZI_GRAY8, 500, 0, 32, 32).at(b'S', 1).filled(2))
        .build();
    let slide = open(data).unwrap();
    assert_eq!(slide.scene_count(), 2);

    let first = slide.scene(0).unwrap();
    let second = slide.scene(1).unwrap();
    assert!(first.name().contains("s:0"));
    assert!(second.name().contains("s:1"));
    assert_eq!(second.rect(), Rect::new(500, 0, 32, 32));

    let raster = second.read_region(Rect::new(0, 0, 32, 32), &[]).unwrap();
    assert!(raster.as_bytes().iter().all(|&v| v == 2));
}

#[test]
fn test_huge_declared_scene_sizes_still_open() {
    let metadata = r#"<?xml version="1.0"?>
<ImageDocument><Metadata><Information><Image>
  <SizeS>100000</SizeS><SizeI>100000</SizeI><SizeV>2147483647</SizeV>
</Image></Information></Metadata></ImageDocument>"#;
    let data = CziBuilder::new()
        .metadata(metadata)
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 16, 16).at(b'S', 0).filled(9))
        .build();
    let slide = open(data).unwrap();
    assert_eq!(slide.scene_count(), 1);
}

#[test]
fn test_z_slices_and_time_frames() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 16, 16).at(b'Z', 0).at(b'T', 0).filled(5))
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 16, 16).at(b'Z', 1).at(b'T', 0).filled(6))
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 16, 16).at(b'Z', 0).at(b'T', 1).filled(7))
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 16, 16).at(b'Z', 1).at(b'T', 1).filled(8))
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.num_z_slices(), 2);
    assert_eq!(scene.num_t_frames(), 2);

    let rect = Rect::new(0, 0, 16, 16);
    let size = Size::new(16, 16);
    for (z, t, expected) in [(0, 0, 5), (1, 0, 6), (0, 1, 7), (1, 1, 8)] {
        let raster = scene.read_resampled_plane(rect, size, &[], z, t).unwrap();
        assert!(
            raster.as_bytes().iter().all(|&v| v == expected),
            "z={} t={}",
            z,
            t
        );
    }

    assert!(matches!(
        scene.read_resampled_plane(rect, size, &[], 2, 0),
        Err(SlideError::OutOfRange { what: "z-slice", index: 2, count: 2 })
    ));
    assert!(matches!(
        scene.read_resampled_plane(rect, size, &[], 0, 5),
        Err(SlideError::OutOfRange { what: "t-frame", .. })
    ));
}

// =============================================================================
// Error Handling
// =============================================================================

#[test]
fn test_bad_magic_is_invalid_segment() {
    let mut data = three_channel_czi();
    data[..10].copy_from_slice(b"NOTACZIFIL");
    assert!(matches!(
        open(data),
        Err(SlideError::Format(FormatError::InvalidSegment { expected: "ZISRAWFILE", .. }))
    ));
}

#[test]
fn test_truncated_file() {
    let mut data = three_channel_czi();
    data.truncate(60);
    assert!(matches!(
        open(data),
        Err(SlideError::Format(FormatError::Truncated { .. }))
    ));
}

#[test]
fn test_oversized_directory_count_is_truncated() {
    let mut data = three_channel_czi();
    let mut position = [0u8; 8];
    position.copy_from_slice(&data[32 + 52..32 + 60]);
    let directory = u64::from_le_bytes(position) as usize;
    data[directory + 32..directory + 36].copy_from_slice(&u32::MAX.to_le_bytes());

    assert!(matches!(
        open(data),
        Err(SlideError::Format(FormatError::Truncated { .. }))
    ));
}

#[test]
fn test_missing_metadata_root() {
    let data = CziBuilder::new()
        .metadata("<?xml version=\"1.0\"?><ImageDocument></ImageDocument>")
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 8, 8))
        .build();
    assert!(matches!(
        open(data),
        Err(SlideError::Format(FormatError::MissingMetadata { .. }))
    ));
}

#[test]
fn test_z_not_starting_at_zero() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 8, 8).at(b'Z', 1))
        .build();
    assert!(matches!(
        open(data),
        Err(SlideError::Configuration(
            ConfigurationError::Unexpected4dConfiguration { first_z: 1, first_t: 0, .. }
        ))
    ));
}

#[test]
fn test_scene_without_unscaled_level() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 64, 64).stored(32, 32))
        .build();
    assert!(matches!(
        open(data),
        Err(SlideError::Configuration(ConfigurationError::UnexpectedMaxZoom { .. }))
    ));
}

#[test]
fn test_multi_index_z_extent() {
    let mut block = CziBlock::new(CZI_GRAY8, 0, 0, 8, 8);
    block.dims.push((b'Z', 0, 2));
    let data = CziBuilder::new().block(block).build();
    assert!(matches!(
        open(data),
        Err(SlideError::Configuration(
            ConfigurationError::UnexpectedSubBlockExtent { axis: 'Z', size: 2, .. }
        ))
    ));
}

#[test]
fn test_unknown_dimension_letter() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 8, 8).at(b'Q', 0))
        .build();
    assert!(matches!(
        open(data),
        Err(SlideError::Format(FormatError::UnknownDimension { axis: 'Q', .. }))
    ));
}

#[test]
fn test_compressed_blocks_fail_on_read() {
    let data = CziBuilder::new()
        .block(CziBlock::new(CZI_GRAY8, 0, 0, 8, 8).compression(1))
        .build();
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert!(matches!(
        scene.read_region(Rect::new(0, 0, 8, 8), &[]),
        Err(SlideError::Format(FormatError::UnsupportedCompression { compression: 1, .. }))
    ));
}

#[test]
fn test_invalid_requests() {
    let slide = open(three_channel_czi()).unwrap();
    let scene = slide.scene(0).unwrap();

    assert!(matches!(
        scene.read_resampled_region(Rect::new(0, 0, 10, 10), Size::new(0, 10), &[]),
        Err(SlideError::InvalidRegion { .. })
    ));
    assert!(matches!(
        scene.read_region(Rect::new(0, 0, 0, 10), &[]),
        Err(SlideError::InvalidRegion { .. })
    ));
    assert!(matches!(
        scene.read_region(Rect::new(0, 0, 10, 10), &[0, 3]),
        Err(SlideError::OutOfRange { what: "channel", index: 3, .. })
    ));
    assert!(matches!(
        scene.read_region(Rect::new(1000, 1000, 10, 10), &[]),
        Err(SlideError::EmptyRegion { .. })
    ));
}

// =============================================================================
// I/O Behavior
// =============================================================================

#[test]
fn test_block_cache_serves_repeated_reads() {
    let tracking = TrackingReader::new(three_channel_czi(), "mem://cached.czi");
    let cache = Arc::new(BlockCache::with_capacity(tracking, 4096, 64));
    let slide = CziSlide::open_with_reader(cache.clone(), "mem://cached.czi").unwrap();
    let scene = slide.scene(0).unwrap();

    scene.read_region(Rect::new(0, 0, 128, 128), &[]).unwrap();
    let after_first = cache.inner().request_count();
    assert!(after_first > 0);

    scene.read_region(Rect::new(0, 0, 128, 128), &[]).unwrap();
    assert_eq!(cache.inner().request_count(), after_first);
}
