//! Driver and slide registry integration tests.
//!
//! Tests verify:
//! - Files on disk open with the driver picked by extension or signature
//! - Explicit driver selection
//! - Slide-level dispatch to scenes of every driver
//! - Slide caching

use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};

use slideio::{
    DriverRegistry, ReaderOptions, Rect, Size, Slide, SlideError, SlideRegistry, CZI_DRIVER,
    RASTER_DRIVER, TIFF_DRIVER,
};

use super::test_utils::{aperio_gray_tiff, three_channel_czi, write_fixture};

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_fn(16, 8, |x, y| Rgb([x as u8, y as u8, 7]));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn test_open_each_format_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let czi = write_fixture(dir.path(), "kidney.czi", &three_channel_czi());
    let svs = write_fixture(dir.path(), "biopsy.svs", &aperio_gray_tiff());
    let png = write_fixture(dir.path(), "overview.png", &png_bytes());

    let registry = DriverRegistry::new(ReaderOptions::default());

    let slide = registry.open_slide(&czi).unwrap();
    assert_eq!(slide.driver_id(), CZI_DRIVER);
    assert!(matches!(slide, Slide::Czi(_)));
    assert_eq!(slide.file_path(), czi.display().to_string());
    assert_eq!(slide.scene(0).unwrap().num_channels(), 3);

    let slide = registry.open_slide(&svs).unwrap();
    assert_eq!(slide.driver_id(), TIFF_DRIVER);
    assert_eq!(slide.scene(0).unwrap().rect(), Rect::new(0, 0, 200, 100));

    let slide = registry.open_slide(&png).unwrap();
    assert_eq!(slide.driver_id(), RASTER_DRIVER);
    assert_eq!(slide.scene_count(), 1);
    assert_eq!(slide.scene(0).unwrap().name(), "overview");
}

#[test]
fn test_open_by_signature() {
    let dir = tempfile::tempdir().unwrap();
    let czi = write_fixture(dir.path(), "kidney.bin", &three_channel_czi());
    let svs = write_fixture(dir.path(), "biopsy.dat", &aperio_gray_tiff());
    let png = write_fixture(dir.path(), "overview", &png_bytes());

    let registry = DriverRegistry::default();
    assert_eq!(registry.open_slide(&czi).unwrap().driver_id(), CZI_DRIVER);
    assert_eq!(registry.open_slide(&svs).unwrap().driver_id(), TIFF_DRIVER);
    assert_eq!(registry.open_slide(&png).unwrap().driver_id(), RASTER_DRIVER);
}

#[test]
fn test_explicit_driver() {
    let dir = tempfile::tempdir().unwrap();
    let svs = write_fixture(dir.path(), "biopsy.img", &aperio_gray_tiff());

    let registry = DriverRegistry::default();
    let slide = registry.open_slide_with_driver(&svs, "tiff").unwrap();
    assert_eq!(slide.driver_id(), TIFF_DRIVER);

    // The CZI driver rejects a TIFF file by its header
    assert!(matches!(
        registry.open_slide_with_driver(&svs, "CZI"),
        Err(SlideError::Format(_))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let registry = DriverRegistry::default();
    assert!(matches!(
        registry.open_slide(dir.path().join("absent.czi")),
        Err(SlideError::Format(_))
    ));
}

#[test]
fn test_read_through_slide_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [
        write_fixture(dir.path(), "a.czi", &three_channel_czi()),
        write_fixture(dir.path(), "b.svs", &aperio_gray_tiff()),
        write_fixture(dir.path(), "c.png", &png_bytes()),
    ];

    let registry = DriverRegistry::default();
    for path in &paths {
        let slide = registry.open_slide(path).unwrap();
        let scene = slide.scene(0).unwrap();
        let raster = scene
            .read_resampled_region(Rect::new(0, 0, 8, 8), Size::new(4, 4), &[0])
            .unwrap();
        assert_eq!(raster.size(), Size::new(4, 4), "{}", path.display());
        assert_eq!(raster.channels(), 1, "{}", path.display());
    }
}

#[test]
fn test_small_block_cache_options() {
    let dir = tempfile::tempdir().unwrap();
    let czi = write_fixture(dir.path(), "a.czi", &three_channel_czi());

    let registry = DriverRegistry::new(ReaderOptions {
        block_size: 1024,
        cache_blocks: 2,
    });
    let slide = registry.open_slide(&czi).unwrap();
    let raster = slide
        .scene(0)
        .unwrap()
        .read_region(Rect::new(0, 0, 128, 128), &[1])
        .unwrap();
    assert_eq!(raster.as_bytes()[0], 20);
}

#[test]
fn test_slide_registry_shares_opened_slides() {
    let dir = tempfile::tempdir().unwrap();
    let czi = write_fixture(dir.path(), "a.czi", &three_channel_czi());
    let svs = write_fixture(dir.path(), "b.svs", &aperio_gray_tiff());

    let registry = SlideRegistry::new(DriverRegistry::default());
    let first = registry.get_slide(&czi).unwrap();
    let again = registry.get_slide(&czi).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    registry.get_slide(&svs).unwrap();
    assert_eq!(registry.cached_count(), 2);

    registry.invalidate(&czi);
    assert_eq!(registry.cached_count(), 1);
}
