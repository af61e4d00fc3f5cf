//! Slide abstraction layer.
//!
//! This module provides a unified interface for working with slides
//! regardless of their underlying format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             SlideRegistry               │
//! │      (caches slides by file path)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            DriverRegistry               │
//! │   (extension, then signature sniffing)  │
//! └────────────────────┬────────────────────┘
//!                      │
//!        ┌─────────────┼──────────────┐
//!        ▼             ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌─────────────┐
//! │  CziSlide  │ │ TiffSlide  │ │ RasterSlide │
//! └─────┬──────┘ └─────┬──────┘ └──────┬──────┘
//!       └──────────────┼───────────────┘
//!                      ▼
//!              Scene trait objects
//! ```

mod reader;
mod registry;

pub use reader::{Resolution, Scene};
pub use registry::{
    Driver, DriverRegistry, ReaderOptions, Slide, SlideRegistry, CZI_DRIVER, RASTER_DRIVER,
    TIFF_DRIVER,
};
