//! # jp2zarr
//!
//! Converts multi-resolution JPEG 2000 images (typically whole-slide
//! microscopy) into OME-Zarr pyramids stored as Zarr v2 directories.
//!
//! ## Features
//!
//! - **Native levels**: every wavelet resolution level becomes one array, no resampling
//! - **Bounded memory**: large planes are decoded tile by tile
//! - **Physical units**: pixel size from XMP or the JP2 resolution boxes
//! - **NIfTI-2 header**: optional header with an orientation-derived affine
//!
//! ## Architecture
//!
//! - [`io`] - byte-range readers
//! - [`mod@format`] - JP2 box walker, codestream header and resolution metadata
//! - [`source`] - the [`LevelReader`] capability and its `jpeg2k` implementation
//! - [`store`] - the [`ArrayStore`] capability and the Zarr v2 directory store
//! - [`pyramid`] - level writer and multiscale descriptor
//! - [`nifti`] - orientation affines and the NIfTI-2 header
//! - [`convert`] - the pipeline tying them together
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use jp2zarr::{convert_file, ConvertOptions};
//!
//! let summary = convert_file(
//!     Path::new("slide.jp2"),
//!     Path::new("slide.ome.zarr"),
//!     &ConvertOptions::default(),
//! )?;
//! println!("{} levels", summary.level_shapes.len());
//! # Ok::<(), jp2zarr::ConvertError>(())
//! ```

pub mod array;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod io;
pub mod nifti;
pub mod pyramid;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use array::{DataType, Region};
pub use config::{Cli, Command, CompressorArg, ConvertConfig, ConvertJob, InfoConfig};
pub use convert::{
    convert, convert_file, default_output_path, ConversionSummary, ConvertOptions, NIFTI_KEY,
};
pub use error::{
    CodestreamError, ConfigError, ConvertError, HeaderError, IoError, MetadataError, StoreError,
};
pub use format::jp2::{extract_pixel_size, CodestreamInfo, PixelSize};
pub use format::{detect_format, CodestreamFormat};
pub use io::{FileRangeReader, MemoryRangeReader, RangeReader};
pub use nifti::{build_header, Nifti2Header, NiftiOptions, Orientation};
pub use pyramid::{LevelWriter, Multiscale, TilePlan};
pub use source::{Jp2kReader, LevelReader};
pub use store::{ArrayHandle, ArraySpec, ArrayStore, Compressor, CompressorKind, DirectoryStore};
