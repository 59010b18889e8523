//! The conversion pipeline.
//!
//! ```text
//! input.jp2 ──► pixel size (XMP / resc / resd)      fatal before any write
//!           ──► Jp2kReader ──► LevelWriter ──► "0", "1", ... arrays
//!                                          ──► .zattrs multiscales
//!                                          ──► "nifti" header (optional)
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::array::{DataType, Region};
use crate::error::{CodestreamError, ConvertError, HeaderError};
use crate::format::jp2::{extract_pixel_size, PixelSize};
use crate::io::FileRangeReader;
use crate::nifti::{self, NiftiOptions, HEADER_SIZE};
use crate::pyramid::{LevelWriter, Multiscale};
use crate::source::{Jp2kReader, LevelReader};
use crate::store::{ArraySpec, ArrayStore, Compressor, CompressorKind, DirectoryStore};

// =============================================================================
// Constants
// =============================================================================

/// Default chunk side on the spatial dims.
pub const DEFAULT_CHUNK: u64 = 1024;

/// Default tile side bounding each decode.
pub const DEFAULT_MAX_LOAD: u64 = 16384;

/// Store key of the NIfTI header array.
pub const NIFTI_KEY: &str = "nifti";

/// Extension of plain pyramids.
pub const OME_ZARR_EXTENSION: &str = "ome.zarr";

/// Extension of pyramids carrying a NIfTI header.
pub const NII_ZARR_EXTENSION: &str = "nii.zarr";

// =============================================================================
// Options
// =============================================================================

/// How a pyramid is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Chunk side on the two spatial dims
    pub chunk: u64,

    /// Compressor of every level array
    pub compressor: Compressor,

    /// Tile side bounding each decode; `None` decodes whole planes
    pub max_load: Option<u64>,

    /// Header variant, if requested
    pub nifti: Option<NiftiOptions>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            chunk: DEFAULT_CHUNK,
            compressor: Compressor::with_defaults(CompressorKind::Blosc),
            max_load: Some(DEFAULT_MAX_LOAD),
            nifti: None,
        }
    }
}

/// What a conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    /// Shape of every written level, level 0 first
    pub level_shapes: Vec<Vec<u64>>,

    pub dtype: DataType,

    pub pixel_size: PixelSize,

    /// Whether the `nifti` array was written
    pub nifti: bool,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Convert every level of `reader` into `store`.
///
/// Levels are written first, then the multiscale descriptor, then the
/// optional NIfTI header.
///
/// # Errors
/// Stops at the first failure. Arrays written before it stay in the store.
pub fn convert<L: LevelReader, S: ArrayStore>(
    reader: &L,
    store: &S,
    pixel_size: PixelSize,
    options: &ConvertOptions,
) -> Result<ConversionSummary, ConvertError> {
    let writer = LevelWriter::new(options.chunk, options.compressor.clone(), options.max_load);
    let arrays = writer.write_all(reader, store)?;
    let level_shapes: Vec<Vec<u64>> = arrays.iter().map(|a| a.shape().to_vec()).collect();

    let multiscale = Multiscale::from_level_shapes(&level_shapes, pixel_size);
    store.set_group_attributes(&multiscale.to_attributes())?;
    debug!("Wrote multiscales for {} levels", level_shapes.len());

    if let Some(nifti_options) = &options.nifti {
        let shape0 = level_shapes
            .first()
            .ok_or(CodestreamError::LevelOutOfRange { level: 0, count: 0 })?;
        write_nifti_header(store, nifti_options, shape0, reader.dtype(), pixel_size)?;
    }

    Ok(ConversionSummary {
        level_shapes,
        dtype: reader.dtype(),
        pixel_size,
        nifti: options.nifti.is_some(),
    })
}

/// Store the header bytes as a single uncompressed `|u1` chunk.
fn write_nifti_header<S: ArrayStore>(
    store: &S,
    options: &NiftiOptions,
    shape0: &[u64],
    dtype: DataType,
    pixel_size: PixelSize,
) -> Result<(), ConvertError> {
    let bytes = nifti::header_bytes(options, shape0, dtype, pixel_size)?;
    let len = bytes.len() as u64;
    let region = Region::new(DataType::U8, vec![len], bytes).ok_or_else(|| {
        HeaderError::InvalidHeader(format!("{} bytes, need {}", len, HEADER_SIZE))
    })?;

    let spec = ArraySpec::new(vec![len], vec![len], DataType::U8, Compressor::Raw);
    let array = store.create_array(NIFTI_KEY, spec)?;
    store.write_region(&array, &[0], &region)?;
    debug!(
        "Wrote NIfTI header with orientation {}",
        options.orientation
    );
    Ok(())
}

/// Convert a JPEG 2000 file into a Zarr directory at `output`.
///
/// The pixel size is read before the output is touched, so a file without
/// resolution metadata leaves no partial store behind.
pub fn convert_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<ConversionSummary, ConvertError> {
    let reader = Jp2kReader::open(input)?;
    let file = FileRangeReader::open(input).map_err(CodestreamError::from)?;
    let pixel_size = extract_pixel_size(&file)?;
    info!(
        "Opened {} ({}, {} levels, {}), pixel size {} x {} um",
        input.display(),
        reader.format().name(),
        reader.level_count(),
        reader.dtype().name(),
        pixel_size.width,
        pixel_size.height
    );

    let store = DirectoryStore::create(output)?;
    let summary = convert(&reader, &store, pixel_size, options)?;
    info!("Wrote {}", output.display());
    Ok(summary)
}

/// Output path next to `input`: `slide.jp2` becomes `slide.ome.zarr`, or
/// `slide.nii.zarr` with the header variant.
///
/// Returns `None` if `input` has no file name.
pub fn default_output_path(input: &Path, nifti: bool) -> Option<PathBuf> {
    input.file_stem()?;
    let extension = if nifti {
        NII_ZARR_EXTENSION
    } else {
        OME_ZARR_EXTENSION
    };
    Some(input.with_extension(extension))
}

/// Whether `output` names a NIfTI-wrapped pyramid.
pub fn is_nifti_output(output: &Path) -> bool {
    output
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_ascii_lowercase().ends_with(".nii.zarr"))
        .unwrap_or(false)
}
