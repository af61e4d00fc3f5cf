//! TIFF and SVS driver integration tests.
//!
//! Tests verify:
//! - Pyramid discovery and Aperio metadata
//! - Region reads across tile boundaries and level selection
//! - Uncompressed, RGB and JPEG tiles
//! - Thumbnail, label and macro scenes
//! - Unsupported layouts are rejected when the file is opened

use std::sync::Arc;

use slideio::error::{FormatError, TiffError};
use slideio::io::MemoryRangeReader;
use slideio::{detect_format, DataType, Rect, Scene, Size, SlideError, SlideFormat, TiffSlide};

use super::test_utils::{aperio_gray_tiff, build_tiff, gray_pattern, TiffImage};

fn open(data: Vec<u8>) -> Result<TiffSlide, SlideError> {
    let reader = MemoryRangeReader::new(data, "mem://test.svs");
    TiffSlide::open_with_reader(Arc::new(reader), "mem://test.svs")
}

// =============================================================================
// Pyramid and Metadata
// =============================================================================

#[test]
fn test_aperio_pyramid_properties() {
    let slide = open(aperio_gray_tiff()).unwrap();
    assert_eq!(slide.scene_count(), 1);
    assert_eq!(slide.metadata().vendor.as_deref(), Some("Aperio"));
    assert_eq!(slide.metadata().mpp, Some(0.5));
    assert_eq!(slide.metadata().magnification, Some(20.0));

    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.name(), "Image");
    assert_eq!(scene.rect(), Rect::new(0, 0, 200, 100));
    assert_eq!(scene.num_channels(), 1);
    assert_eq!(scene.channel_name(0).unwrap(), "Channel 0");
    assert_eq!(scene.channel_data_type(0).unwrap(), DataType::Byte);
    assert_eq!(scene.magnification(), 20.0);
    assert!((scene.resolution().x - 5e-7).abs() < 1e-15);
    assert_eq!(scene.level_zooms(), vec![1.0, 0.5]);
    assert_eq!(scene.num_z_slices(), 1);
    assert_eq!(scene.num_t_frames(), 1);
}

#[test]
fn test_detect_tiff_flavors() {
    let aperio = MemoryRangeReader::new(aperio_gray_tiff(), "a.svs");
    assert_eq!(detect_format(&aperio).unwrap(), SlideFormat::AperioSvs);

    let generic = build_tiff(&[TiffImage::uncompressed(64, 64, 64, 1, gray_pattern)]);
    let generic = MemoryRangeReader::new(generic, "b.tif");
    assert_eq!(detect_format(&generic).unwrap(), SlideFormat::GenericTiff);
}

// =============================================================================
// Region Reads
// =============================================================================

#[test]
fn test_read_region_across_tiles() {
    let slide = open(aperio_gray_tiff()).unwrap();
    let scene = slide.scene(0).unwrap();

    let rect = Rect::new(10, 5, 100, 70);
    let raster = scene.read_region(rect, &[]).unwrap();
    assert_eq!(raster.size(), Size::new(100, 70));

    let bytes = raster.as_bytes();
    for y in 0..70u32 {
        for x in 0..100u32 {
            let expected = gray_pattern(10 + x, 5 + y)[0];
            assert_eq!(bytes[(y * 100 + x) as usize], expected, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn test_read_partial_edge_tile() {
    let slide = open(aperio_gray_tiff()).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene.read_region(Rect::new(190, 90, 10, 10), &[]).unwrap();
    assert_eq!(raster.as_bytes()[0], gray_pattern(190, 90)[0]);
    assert_eq!(raster.as_bytes()[99], gray_pattern(199, 99)[0]);
}

#[test]
fn test_downscaled_read_uses_second_level() {
    let slide = open(aperio_gray_tiff()).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene
        .read_resampled_region(Rect::new(0, 0, 200, 100), Size::new(100, 50), &[])
        .unwrap();
    assert_eq!(raster.size(), Size::new(100, 50));
    assert!(raster.as_bytes().iter().all(|&v| v == 77));

    // Below the coarsest level: read it and shrink
    let small = scene
        .read_resampled_region(Rect::new(0, 0, 200, 100), Size::new(20, 10), &[])
        .unwrap();
    assert_eq!(small.size(), Size::new(20, 10));
    assert_eq!(small.as_bytes()[5 * 20 + 5], 77);
}

#[test]
fn test_rgb_tiles_and_component_selection() {
    let data = build_tiff(&[TiffImage::uncompressed(96, 64, 32, 3, |x, y| {
        vec![x as u8, y as u8, 200]
    })]);
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();
    assert_eq!(scene.num_channels(), 3);
    assert_eq!(scene.channel_name(0).unwrap(), "red");
    assert_eq!(scene.channel_name(2).unwrap(), "blue");

    let raster = scene.read_region(Rect::new(30, 30, 4, 4), &[]).unwrap();
    assert_eq!(&raster.as_bytes()[..3], &[30, 30, 200]);

    let blue_green = scene.read_region(Rect::new(40, 10, 2, 2), &[2, 1]).unwrap();
    assert_eq!(blue_green.channels(), 2);
    assert_eq!(&blue_green.as_bytes()[..2], &[200, 10]);

    assert!(matches!(
        scene.read_region(Rect::new(0, 0, 2, 2), &[3]),
        Err(SlideError::OutOfRange { what: "channel", .. })
    ));
}

#[test]
fn test_jpeg_tiles() {
    let data = build_tiff(&[TiffImage::jpeg(128, 128, 64, |i| 50 * (i as u8 + 1))]);
    let slide = open(data).unwrap();
    let scene = slide.scene(0).unwrap();

    let raster = scene.read_region(Rect::new(0, 0, 128, 128), &[]).unwrap();
    assert_eq!(raster.channels(), 1);
    let at = |x: u32, y: u32| raster.as_bytes()[(y * 128 + x) as usize] as i32;
    for (x, y, expected) in [(10, 10, 50), (100, 10, 100), (10, 100, 150), (100, 100, 200)] {
        assert!((at(x, y) - expected).abs() <= 2, "({}, {}) = {}", x, y, at(x, y));
    }
}

#[test]
fn test_region_outside_image() {
    let slide = open(aperio_gray_tiff()).unwrap();
    let scene = slide.scene(0).unwrap();
    assert!(matches!(
        scene.read_region(Rect::new(1000, 0, 10, 10), &[]),
        Err(SlideError::EmptyRegion { .. })
    ));
}

// =============================================================================
// Auxiliary Images
// =============================================================================

#[test]
fn test_thumbnail_label_and_macro_scenes() {
    let data = build_tiff(&[
        TiffImage::uncompressed(200, 100, 64, 1, gray_pattern).description("Aperio Image Library"),
        TiffImage::uncompressed(40, 40, 64, 1, |_, _| vec![11]),
        TiffImage::stripped(50, 20, 8, 1, |_, _| vec![33]).description("Macro image"),
        TiffImage::stripped(30, 20, 8, 1, |x, _| vec![x as u8]).description("label 30x20"),
    ]);
    let slide = open(data).unwrap();
    let names: Vec<&str> = slide.scenes().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["Image", "Thumbnail", "Label", "Macro"]);

    let label = slide.scene(2).unwrap();
    assert_eq!(label.rect(), Rect::new(0, 0, 30, 20));
    let raster = label.read_region(Rect::new(0, 0, 30, 20), &[]).unwrap();
    assert_eq!(raster.as_bytes()[29], 29);
    // Last row lives in the short final strip
    assert_eq!(raster.as_bytes()[19 * 30 + 5], 5);

    let thumbnail = slide.scene(1).unwrap();
    let raster = thumbnail.read_region(Rect::new(0, 0, 40, 40), &[]).unwrap();
    assert!(raster.as_bytes().iter().all(|&v| v == 11));
}

// =============================================================================
// Rejected Layouts
// =============================================================================

#[test]
fn test_strip_only_file_is_rejected() {
    let data = build_tiff(&[TiffImage::stripped(64, 64, 16, 1, gray_pattern)]);
    assert!(matches!(
        open(data),
        Err(SlideError::Format(FormatError::Tiff(TiffError::StripOrganization)))
    ));
}

#[test]
fn test_unsupported_compression_is_rejected() {
    let data = build_tiff(&[TiffImage::uncompressed(64, 64, 64, 1, gray_pattern).compression(5)]);
    assert!(matches!(
        open(data),
        Err(SlideError::Format(FormatError::Tiff(TiffError::UnsupportedCompression(_))))
    ));
}

#[test]
fn test_not_a_tiff() {
    let result = open(b"definitely not a tiff file".to_vec());
    assert!(matches!(result, Err(SlideError::Format(FormatError::Tiff(_)))));
}
