//! jp2zarr - Convert JPEG 2000 images into OME-Zarr pyramids.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jp2zarr::{
    config::{Cli, Command, ConvertConfig, InfoConfig},
    convert_file, extract_pixel_size, FileRangeReader, Jp2kReader, LevelReader,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Convert(config) => run_convert(config),
        Command::Info(config) => run_info(config),
    }
}

// =============================================================================
// Convert Command
// =============================================================================

fn run_convert(config: ConvertConfig) -> ExitCode {
    init_logging(config.verbose);

    let job = match config.resolve() {
        Ok(job) => job,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Converting {}", job.input.display());
    info!("  Output: {}", job.output.display());
    info!("  Chunk: {}", job.options.chunk);
    info!("  Compressor: {}", job.options.compressor.kind().name());
    match job.options.max_load {
        Some(max_load) => info!("  Max load: {}", max_load),
        None => info!("  Max load: unbounded"),
    }
    if let Some(ref nifti) = job.options.nifti {
        info!(
            "  NIfTI: orientation {}, {}",
            nifti.orientation,
            if nifti.center { "centered" } else { "corner origin" }
        );
    }

    match convert_file(&job.input, &job.output, &job.options) {
        Ok(summary) => {
            info!(
                "Done: {} level(s), {}{}",
                summary.level_shapes.len(),
                summary.dtype.name(),
                if summary.nifti { ", with NIfTI header" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Conversion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "jp2zarr=debug"
    } else {
        "jp2zarr=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("jp2zarr file check");
    println!("══════════════════");
    println!();

    let reader = match Jp2kReader::open(&config.input) {
        Ok(reader) => {
            println!("✓ File: {}", config.input.display());
            reader
        }
        Err(e) => {
            println!("✗ File: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let info = reader.info();
    println!("✓ Format: {}", reader.format().name());
    println!(
        "✓ Image area: {} x {} (offset {}, {})",
        info.x_end - info.x_offset,
        info.y_end - info.y_offset,
        info.x_offset,
        info.y_offset
    );
    println!("✓ Components: {}", info.components.len());
    println!("✓ Data type: {}", reader.dtype().name());
    println!();

    println!("Resolution levels:");
    println!("──────────────────");
    for level in 0..reader.level_count() {
        if let Some(shape) = reader.level_shape(level) {
            println!("  {}: {:?}", level, shape);
        }
    }
    println!();

    let pixel_size = FileRangeReader::open(&config.input)
        .map_err(|e| e.to_string())
        .and_then(|file| extract_pixel_size(&file).map_err(|e| e.to_string()));
    match pixel_size {
        Ok(size) => {
            println!("✓ Pixel size: {} x {} um", size.width, size.height);
        }
        Err(e) => {
            println!("✗ Pixel size: {}", e);
            println!();
            println!("  The file cannot be converted without resolution metadata.");
            return ExitCode::FAILURE;
        }
    }

    println!();
    println!("══════════════════");
    println!("✓ Ready to convert");

    ExitCode::SUCCESS
}
