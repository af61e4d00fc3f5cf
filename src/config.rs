//! Command-line configuration for the `slideio` binary.
//!
//! Options come from command-line arguments, with environment variables as
//! fallback for the I/O settings:
//!
//! - `SLIDEIO_BLOCK_SIZE` - Block size of the per-file read cache (default: 256 KiB)
//! - `SLIDEIO_CACHE_BLOCKS` - Blocks kept per open file (default: 100)
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use slideio::config::Cli;
//!
//! let cli = Cli::parse();
//! cli.validate()?;
//! let registry = slideio::DriverRegistry::new(cli.reader_options());
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::io::{DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
use crate::raster::{Rect, Size};
use crate::slide::ReaderOptions;

// =============================================================================
// Default Values
// =============================================================================

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// slideio - read regions from whole-slide images.
///
/// Opens CZI, SVS/TIFF and plain raster files and extracts resampled regions
/// of any scene.
#[derive(Parser, Debug, Clone)]
#[command(name = "slideio")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Block size in bytes for the per-file read cache.
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE, env = "SLIDEIO_BLOCK_SIZE")]
    pub block_size: usize,

    /// Number of blocks cached per open file.
    #[arg(long, global = true, default_value_t = DEFAULT_CACHE_CAPACITY, env = "SLIDEIO_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Open with this driver (CZI, TIFF, RASTER) instead of detecting one.
    #[arg(long, global = true)]
    pub driver: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print slide, scene and channel information.
    Info {
        /// Slide file
        path: PathBuf,
    },

    /// Read a region of a scene and write it as an image.
    Read {
        /// Slide file
        path: PathBuf,

        /// Scene index
        #[arg(long, default_value_t = 0)]
        scene: usize,

        /// Region in scene pixels as x,y,width,height. Defaults to the whole scene.
        #[arg(long)]
        rect: Option<RectArg>,

        /// Output size as width,height. Defaults to the region size.
        #[arg(long)]
        size: Option<SizeArg>,

        /// Channel indices to read (comma-separated). Defaults to all.
        #[arg(long, value_delimiter = ',')]
        channels: Vec<usize>,

        /// Z-slice (CZI only)
        #[arg(long, default_value_t = 0)]
        z: usize,

        /// Time frame (CZI only)
        #[arg(long, default_value_t = 0)]
        t: usize,

        /// Output image file; the format follows the extension.
        #[arg(short, long)]
        output: PathBuf,
    },
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        if let Command::Read { size: Some(size), .. } = &self.command {
            if size.0.is_empty() {
                return Err(format!("output size {} has no area", size.0));
            }
        }
        Ok(())
    }

    /// I/O settings handed to the drivers.
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            block_size: self.block_size,
            cache_blocks: self.cache_blocks,
        }
    }
}

// =============================================================================
// Value Parsers
// =============================================================================

fn parse_integers<const N: usize>(s: &str, what: &str) -> Result<[i32; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {} comma-separated integers for {}, got {:?}", N, what, s));
    }
    let mut values = [0i32; N];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part
            .parse()
            .map_err(|_| format!("invalid integer {:?} in {}", part, what))?;
    }
    Ok(values)
}

/// `x,y,width,height`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectArg(pub Rect);

impl FromStr for RectArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x, y, width, height] = parse_integers::<4>(s, "rect")?;
        Ok(RectArg(Rect::new(x, y, width, height)))
    }
}

/// `width,height`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeArg(pub Size);

impl FromStr for SizeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [width, height] = parse_integers::<2>(s, "size")?;
        Ok(SizeArg(Size::new(width, height)))
    }
}

// =============================================================================
// Tests
// =============================================================================
