//! Command-line configuration for jp2zarr.
//!
//! Two subcommands:
//!
//! - `convert` writes an OME-Zarr pyramid, optionally with a NIfTI header
//! - `info` prints what the converter would see in a file
//!
//! # Example
//!
//! ```text
//! jp2zarr convert slide.jp2                      # -> slide.ome.zarr
//! jp2zarr convert slide.jp2 --nii                # -> slide.nii.zarr
//! jp2zarr convert slide.jp2 out.zarr --compressor zlib --compressor-opt '{"level": 6}'
//! jp2zarr info slide.jp2
//! ```
//!
//! All values are checked by [`ConvertConfig::resolve`] before the output
//! directory is touched.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::convert::{default_output_path, is_nifti_output, ConvertOptions};
use crate::error::ConfigError;
use crate::nifti::{NiftiOptions, Orientation};
use crate::store::{Compressor, CompressorKind};

pub use crate::convert::{DEFAULT_CHUNK, DEFAULT_MAX_LOAD};
pub use crate::nifti::DEFAULT_ORIENTATION;

// =============================================================================
// Default Values
// =============================================================================

/// Default compressor options (compressor defaults).
pub const DEFAULT_COMPRESSOR_OPTIONS: &str = "{}";

// =============================================================================
// CLI Arguments
// =============================================================================

/// jp2zarr - Convert JPEG 2000 images into OME-Zarr pyramids.
#[derive(Parser, Debug, Clone)]
#[command(name = "jp2zarr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a JPEG 2000 file into a Zarr pyramid.
    Convert(ConvertConfig),

    /// Show format, levels and pixel size of a JPEG 2000 file.
    Info(InfoConfig),
}

/// Compressor choices on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorArg {
    Blosc,
    Zlib,
    Raw,
}

impl From<CompressorArg> for CompressorKind {
    fn from(arg: CompressorArg) -> Self {
        match arg {
            CompressorArg::Blosc => CompressorKind::Blosc,
            CompressorArg::Zlib => CompressorKind::Zlib,
            CompressorArg::Raw => CompressorKind::Raw,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConvertConfig {
    /// Input file (.jp2, .j2k or .j2c).
    pub input: PathBuf,

    /// Output Zarr directory.
    ///
    /// Defaults to the input with a `.ome.zarr` extension, or `.nii.zarr`
    /// with `--nii`. An output ending in `.nii.zarr` implies `--nii`.
    pub output: Option<PathBuf>,

    // =========================================================================
    // Layout
    // =========================================================================
    /// Chunk side on the spatial dims.
    #[arg(long, default_value_t = DEFAULT_CHUNK)]
    pub chunk: u64,

    /// Chunk compressor.
    #[arg(long, value_enum, default_value_t = CompressorArg::Blosc)]
    pub compressor: CompressorArg,

    /// Compressor options as a JSON object, e.g. '{"clevel": 9}'.
    #[arg(long, default_value = DEFAULT_COMPRESSOR_OPTIONS)]
    pub compressor_opt: String,

    /// Largest tile side decoded at once; 0 decodes whole planes.
    #[arg(long, default_value_t = DEFAULT_MAX_LOAD)]
    pub max_load: u64,

    // =========================================================================
    // NIfTI header
    // =========================================================================
    /// Also write a NIfTI-2 header under the "nifti" key.
    #[arg(long, default_value_t = false)]
    pub nii: bool,

    /// Orientation: coronal, axial, sagittal or a code such as "LI" or "RAS".
    #[arg(long, default_value = DEFAULT_ORIENTATION)]
    pub orientation: String,

    /// Keep the voxel origin at the corner instead of the field centre.
    #[arg(long, default_value_t = false)]
    pub no_center: bool,

    /// Slice thickness in micrometers (1 when unset).
    #[arg(long)]
    pub thickness: Option<f64>,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Input file (.jp2, .j2k or .j2c).
    pub input: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Resolved job
// =============================================================================

/// A fully checked conversion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub options: ConvertOptions,
}

impl ConvertConfig {
    /// Whether the NIfTI header is written, explicitly or by output name.
    pub fn wants_nifti(&self) -> bool {
        self.nii
            || self
                .output
                .as_deref()
                .map(is_nifti_output)
                .unwrap_or(false)
    }

    /// Check every value and build the conversion job.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for a zero chunk, bad compressor options,
    /// an unknown orientation, a non-positive thickness or an input path
    /// without a file name.
    pub fn resolve(&self) -> Result<ConvertJob, ConfigError> {
        if self.chunk == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk",
                message: "must be greater than 0".to_string(),
            });
        }

        let compressor = Compressor::from_options(self.compressor.into(), &self.compressor_opt)?;

        let nifti = if self.wants_nifti() {
            Some(self.nifti_options()?)
        } else {
            None
        };

        let output = match &self.output {
            Some(output) => output.clone(),
            None => default_output_path(&self.input, nifti.is_some()).ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: "output",
                    message: format!(
                        "cannot derive an output name from '{}'",
                        self.input.display()
                    ),
                }
            })?,
        };

        Ok(ConvertJob {
            input: self.input.clone(),
            output,
            options: ConvertOptions {
                chunk: self.chunk,
                compressor,
                max_load: (self.max_load > 0).then_some(self.max_load),
                nifti,
            },
        })
    }

    fn nifti_options(&self) -> Result<NiftiOptions, ConfigError> {
        let orientation: Orientation = self.orientation.parse()?;
        if let Some(thickness) = self.thickness {
            if !thickness.is_finite() || thickness <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "thickness",
                    message: format!("must be a positive number, got {}", thickness),
                });
            }
        }
        Ok(NiftiOptions {
            orientation,
            center: !self.no_center,
            thickness: self.thickness,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
