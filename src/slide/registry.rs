//! Driver lookup and slide caching.
//!
//! [`DriverRegistry`] maps a file to the driver that can open it, first by
//! extension and then by sniffing the leading bytes. [`SlideRegistry`] keeps
//! recently opened slides in an LRU so that repeated reads of the same file
//! do not re-parse its directory.
//!
//! # Example
//!
//! ```ignore
//! use slideio::slide::{DriverRegistry, ReaderOptions, SlideRegistry};
//!
//! let registry = SlideRegistry::new(DriverRegistry::new(ReaderOptions::default()));
//! let slide = registry.get_slide("/data/kidney.czi")?;
//! let scene = slide.scene(0)?;
//! let raster = scene.read_region(scene.rect(), &[])?;
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{FormatError, SlideError};
use crate::format::{detect_format, CziSlide, RasterSlide, SlideFormat, TiffSlide};
use crate::io::{FileRangeReader, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};

use super::reader::Scene;

// =============================================================================
// Configuration
// =============================================================================

/// Default capacity for slide cache (number of slides).
const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 100;

/// I/O settings handed to drivers when they open a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Block size of the per-file read cache, in bytes
    pub block_size: usize,
    /// Number of blocks kept per file
    pub cache_blocks: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_CAPACITY,
        }
    }
}

// =============================================================================
// Slide
// =============================================================================

/// An opened slide, tagged by the driver that produced it.
pub enum Slide {
    Czi(CziSlide),
    Tiff(TiffSlide),
    Raster(RasterSlide),
}

impl Slide {
    /// Id of the driver that opened this slide.
    pub fn driver_id(&self) -> &'static str {
        match self {
            Slide::Czi(_) => CZI_DRIVER,
            Slide::Tiff(_) => TIFF_DRIVER,
            Slide::Raster(_) => RASTER_DRIVER,
        }
    }

    pub fn file_path(&self) -> &str {
        match self {
            Slide::Czi(s) => s.path(),
            Slide::Tiff(s) => s.path(),
            Slide::Raster(s) => s.path(),
        }
    }

    pub fn scene_count(&self) -> usize {
        match self {
            Slide::Czi(s) => s.scene_count(),
            Slide::Tiff(s) => s.scene_count(),
            Slide::Raster(s) => s.scene_count(),
        }
    }

    /// Scene `index`, or `OutOfRange`.
    pub fn scene(&self, index: usize) -> Result<&dyn Scene, SlideError> {
        let scene: &dyn Scene = match self {
            Slide::Czi(s) => s.scene(index)?,
            Slide::Tiff(s) => s.scene(index)?,
            Slide::Raster(s) => s.scene(index)?,
        };
        Ok(scene)
    }
}

// =============================================================================
// DriverRegistry
// =============================================================================

pub const CZI_DRIVER: &str = "CZI";
pub const TIFF_DRIVER: &str = "TIFF";
pub const RASTER_DRIVER: &str = "RASTER";

type OpenFn = fn(&Path, &ReaderOptions) -> Result<Slide, SlideError>;

/// A named constructor for one family of files.
pub struct Driver {
    pub id: &'static str,
    /// Lower-case file extensions claimed by the driver
    pub extensions: &'static [&'static str],
    open: OpenFn,
}

impl Driver {
    pub fn open(&self, path: &Path, options: &ReaderOptions) -> Result<Slide, SlideError> {
        (self.open)(path, options)
    }
}

fn open_czi(path: &Path, options: &ReaderOptions) -> Result<Slide, SlideError> {
    CziSlide::open(path, options).map(Slide::Czi)
}

fn open_tiff(path: &Path, options: &ReaderOptions) -> Result<Slide, SlideError> {
    TiffSlide::open(path, options).map(Slide::Tiff)
}

fn open_raster(path: &Path, _options: &ReaderOptions) -> Result<Slide, SlideError> {
    RasterSlide::open(path).map(Slide::Raster)
}

/// Maps files to drivers.
///
/// Built once and passed to whoever opens slides; there is no global
/// driver table.
pub struct DriverRegistry {
    drivers: Vec<Driver>,
    options: ReaderOptions,
}

impl DriverRegistry {
    /// Registry with the built-in CZI, TIFF and raster drivers.
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            drivers: vec![
                Driver {
                    id: CZI_DRIVER,
                    extensions: &["czi"],
                    open: open_czi,
                },
                Driver {
                    id: TIFF_DRIVER,
                    extensions: &["svs", "tif", "tiff"],
                    open: open_tiff,
                },
                Driver {
                    id: RASTER_DRIVER,
                    extensions: &["png", "jpg", "jpeg"],
                    open: open_raster,
                },
            ],
            options,
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn driver_ids(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|d| d.id).collect()
    }

    /// Driver with the given id (case-insensitive).
    pub fn driver(&self, id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id.eq_ignore_ascii_case(id))
    }

    fn driver_for_extension(&self, path: &Path) -> Option<&Driver> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.drivers
            .iter()
            .find(|d| d.extensions.contains(&extension.as_str()))
    }

    fn driver_for_signature(&self, path: &Path) -> Result<&Driver, SlideError> {
        let reader = FileRangeReader::open(path)?;
        let id = match detect_format(&reader) {
            Ok(SlideFormat::Czi) => CZI_DRIVER,
            Ok(SlideFormat::AperioSvs) | Ok(SlideFormat::GenericTiff) => TIFF_DRIVER,
            Ok(SlideFormat::Raster) => RASTER_DRIVER,
            Err(FormatError::UnsupportedFormat { .. }) => {
                return Err(SlideError::UnknownDriver(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        self.driver(id)
            .ok_or_else(|| SlideError::UnknownDriver(id.to_string()))
    }

    /// Pick the driver for `path`: extension first, file signature second.
    pub fn find_driver(&self, path: &Path) -> Result<&Driver, SlideError> {
        match self.driver_for_extension(path) {
            Some(driver) => Ok(driver),
            None => self.driver_for_signature(path),
        }
    }

    /// Open `path` with the driver [`find_driver`](Self::find_driver) picks.
    pub fn open_slide(&self, path: impl AsRef<Path>) -> Result<Slide, SlideError> {
        let path = path.as_ref();
        let driver = self.find_driver(path)?;
        debug!(path = %path.display(), driver = driver.id, "opening slide");
        driver.open(path, &self.options)
    }

    /// Open `path` with an explicitly named driver.
    pub fn open_slide_with_driver(
        &self,
        path: impl AsRef<Path>,
        driver_id: &str,
    ) -> Result<Slide, SlideError> {
        let path = path.as_ref();
        let driver = self
            .driver(driver_id)
            .ok_or_else(|| SlideError::UnknownDriver(driver_id.to_string()))?;
        debug!(path = %path.display(), driver = driver.id, "opening slide");
        driver.open(path, &self.options)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new(ReaderOptions::default())
    }
}

// =============================================================================
// SlideRegistry
// =============================================================================

/// State for an in-flight slide open operation.
struct InFlightState {
    /// Result of the open operation (set when complete)
    result: Mutex<Option<Result<Arc<Slide>, SlideError>>>,
    /// Signalled when `result` is set
    done: Condvar,
}

/// LRU cache of opened slides keyed by path.
///
/// Concurrent requests for a slide that is not cached yet share one open.
pub struct SlideRegistry {
    drivers: DriverRegistry,
    cache: Mutex<LruCache<PathBuf, Arc<Slide>>>,
    in_flight: Mutex<HashMap<PathBuf, Arc<InFlightState>>>,
}

impl SlideRegistry {
    /// Registry caching up to 100 slides.
    pub fn new(drivers: DriverRegistry) -> Self {
        Self::with_capacity(drivers, DEFAULT_SLIDE_CACHE_CAPACITY)
    }

    /// Zero capacity is clamped to one.
    pub fn with_capacity(drivers: DriverRegistry, capacity: usize) -> Self {
        Self {
            drivers,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Get a slide, opening it if not already cached.
    ///
    /// Failed opens are not cached.
    pub fn get_slide(&self, path: impl AsRef<Path>) -> Result<Arc<Slide>, SlideError> {
        let path = path.as_ref();

        if let Some(slide) = self.cache.lock().get(path) {
            return Ok(slide.clone());
        }

        let (state, leader) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(path) {
                Some(state) => (state.clone(), false),
                None => {
                    let state = Arc::new(InFlightState {
                        result: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    in_flight.insert(path.to_path_buf(), state.clone());
                    (state, true)
                }
            }
        };

        if leader {
            let result = self.drivers.open_slide(path).map(Arc::new);
            if let Ok(ref slide) = result {
                self.cache.lock().put(path.to_path_buf(), slide.clone());
            }
            self.in_flight.lock().remove(path);

            *state.result.lock() = Some(result.clone());
            state.done.notify_all();
            return result;
        }

        let mut guard = state.result.lock();
        loop {
            if let Some(ref result) = *guard {
                return result.clone();
            }
            state.done.wait(&mut guard);
        }
    }

    /// Remove a slide from the cache.
    pub fn invalidate(&self, path: impl AsRef<Path>) {
        self.cache.lock().pop(path.as_ref());
    }

    /// Clear all cached slides.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Get the number of cached slides.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
