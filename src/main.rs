//! slideio - inspect whole-slide images and extract regions from them.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slideio::{
    config::{Cli, Command},
    DriverRegistry, FormatError, Rect, Size, Slide, SlideError,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = DriverRegistry::new(cli.reader_options());
    let result = match &cli.command {
        Command::Info { path } => open(&registry, path, cli.driver.as_deref()).map(|s| print_info(&s)),
        Command::Read {
            path,
            scene,
            rect,
            size,
            channels,
            z,
            t,
            output,
        } => open(&registry, path, cli.driver.as_deref()).and_then(|slide| {
            let request = ReadRequest {
                scene: *scene,
                rect: rect.map(|r| r.0),
                size: size.map(|s| s.0),
                channels,
                z: *z,
                t: *t,
            };
            run_read(&slide, &request, output)
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with tracing-subscriber.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "slideio=debug" } else { "slideio=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open(registry: &DriverRegistry, path: &Path, driver: Option<&str>) -> Result<Slide, SlideError> {
    match driver {
        Some(id) => registry.open_slide_with_driver(path, id),
        None => registry.open_slide(path),
    }
}

// =============================================================================
// Info Command
// =============================================================================

fn print_info(slide: &Slide) {
    println!("File:    {}", slide.file_path());
    println!("Driver:  {}", slide.driver_id());
    println!("Scenes:  {}", slide.scene_count());

    for index in 0..slide.scene_count() {
        let scene = match slide.scene(index) {
            Ok(scene) => scene,
            Err(e) => {
                println!("  [{}] unavailable: {}", index, e);
                continue;
            }
        };
        let rect = scene.rect();
        let resolution = scene.resolution();
        println!();
        println!("  [{}] {}", index, scene.name());
        println!("      Rect:          {}", rect);
        println!(
            "      Resolution:    {:.4} x {:.4} um/px",
            resolution.x * 1e6,
            resolution.y * 1e6
        );
        println!("      Magnification: {}", scene.magnification());
        println!(
            "      Z-slices:      {}   T-frames: {}",
            scene.num_z_slices(),
            scene.num_t_frames()
        );
        if let Some(zooms) = level_zooms(slide, index) {
            let zooms: Vec<String> = zooms.iter().map(|z| format!("{:.4}", z)).collect();
            println!("      Levels:        {}", zooms.join(", "));
        }
        println!("      Channels:      {}", scene.num_channels());
        for channel in 0..scene.num_channels() {
            let name = scene.channel_name(channel).unwrap_or("?");
            let data_type = scene
                .channel_data_type(channel)
                .map(|t| t.to_string())
                .unwrap_or_else(|_| "?".to_string());
            println!("        {:>2}: {} ({})", channel, name, data_type);
        }
    }
}

/// Zoom factors of the stored levels, for drivers that keep a pyramid.
fn level_zooms(slide: &Slide, index: usize) -> Option<Vec<f64>> {
    match slide {
        Slide::Czi(czi) => czi.scene(index).ok().map(|s| s.zoom_levels()),
        Slide::Tiff(tiff) => tiff.scene(index).ok().map(|s| s.level_zooms()),
        Slide::Raster(_) => None,
    }
}

// =============================================================================
// Read Command
// =============================================================================

struct ReadRequest<'a> {
    scene: usize,
    rect: Option<Rect>,
    size: Option<Size>,
    channels: &'a [usize],
    z: usize,
    t: usize,
}

fn run_read(slide: &Slide, request: &ReadRequest<'_>, output: &Path) -> Result<(), SlideError> {
    let scene = slide.scene(request.scene)?;
    let rect = request.rect.unwrap_or_else(|| Rect::from_size(scene.rect().size()));
    let size = request.size.unwrap_or_else(|| rect.size());
    info!(
        scene = scene.name(),
        rect = %rect,
        size = %size,
        "reading region"
    );

    let raster = match slide {
        Slide::Czi(czi) => czi.scene(request.scene)?.read_resampled_plane(
            rect,
            size,
            request.channels,
            request.z,
            request.t,
        )?,
        _ => {
            if request.z != 0 || request.t != 0 {
                debug!("ignoring z/t selection for a 2D driver");
            }
            scene.read_resampled_region(rect, size, request.channels)?
        }
    };

    let image = raster.to_dynamic_image()?;
    image
        .save(output)
        .map_err(|e| FormatError::UnsupportedFormat {
            reason: format!("cannot write {}: {}", output.display(), e),
        })?;
    info!(output = %output.display(), "wrote region");
    Ok(())
}
