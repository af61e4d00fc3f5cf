//! # slideio
//!
//! Readers for whole-slide microscopy images.
//!
//! A slide file holds one or more scenes. Each scene is a 2D image with any
//! number of channels and, for CZI files, optional Z and T stacks. Large
//! scenes are stored as pyramids of tiles; a region request picks the level
//! that best matches the requested output size and stitches the overlapping
//! tiles together, so reading a thumbnail of a 100k x 100k scene only decodes
//! the coarse level.
//!
//! ## Supported Formats
//!
//! - **Zeiss CZI**: uncompressed sub-blocks, multi-scene, Z/T stacks
//! - **Aperio SVS / tiled TIFF**: JPEG, JPEG 2000 and uncompressed tiles
//! - **PNG / JPEG**: single-scene raster images
//!
//! ## Architecture
//!
//! - [`io`] - Positional readers and the block cache
//! - [`raster`] - Pixel geometry and typed raster buffers
//! - [`tile`] - Zoom level selection and tile composition
//! - [`mod@format`] - CZI, TIFF/SVS and raster drivers
//! - [`slide`] - The [`Scene`] trait, driver and slide registries
//! - [`config`] - CLI types for the `slideio` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use slideio::{DriverRegistry, ReaderOptions, Rect, Size};
//!
//! let registry = DriverRegistry::new(ReaderOptions::default());
//! let slide = registry.open_slide("slide.czi")?;
//! let scene = slide.scene(0)?;
//!
//! // 512x512 overview of the top-left quarter, all channels
//! let rect = scene.rect();
//! let quarter = Rect::new(0, 0, rect.width / 2, rect.height / 2);
//! let raster = scene.read_resampled_region(quarter, Size::new(512, 512), &[])?;
//! println!("{} channels, {}", raster.channels(), raster.data_type());
//! # Ok::<(), slideio::SlideError>(())
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod raster;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command};
pub use error::{ConfigurationError, FormatError, IoError, SlideError, TiffError};
pub use format::{
    detect_format, CziScene, CziSlide, RasterScene, RasterSlide, SlideFormat, SvsMetadata,
    TiffScene, TiffSlide,
};
pub use io::{BlockCache, FileRangeReader, MemoryRangeReader, RangeReader};
pub use raster::{scale_rect, DataType, Raster, Rect, Size};
pub use slide::{
    Driver, DriverRegistry, ReaderOptions, Resolution, Scene, Slide, SlideRegistry, CZI_DRIVER,
    RASTER_DRIVER, TIFF_DRIVER,
};
pub use tile::{compose_region, select_zoom_level, TileSource};
