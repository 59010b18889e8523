//! NIfTI-2 header variant.
//!
//! The pyramid can carry a NIfTI-2 header under the `nifti` key so that
//! neuroimaging tools see the level-0 array as a volume with a world
//! transform. The header is built from:
//!
//! - the level-0 shape, reversed to `(W, H[, 1, 1, C])`
//! - the level-0 data type
//! - an affine derived from an anatomical orientation and the pixel size

pub mod header;
pub mod orientation;

pub use header::{Nifti2Header, HEADER_SIZE, NIFTI2_MAGIC, UNITS_MICRON, XFORM_ALIGNED};
pub use orientation::{center_affine, orientation_to_affine, Direction, Orientation};

use nalgebra::Matrix4;

use crate::array::DataType;
use crate::error::{ConvertError, HeaderError};
use crate::format::jp2::PixelSize;

/// Default orientation of the header.
pub const DEFAULT_ORIENTATION: &str = "coronal";

/// Default slice thickness when none is given.
pub const DEFAULT_THICKNESS: f64 = 1.0;

/// Options of the header variant.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiOptions {
    pub orientation: Orientation,
    pub center: bool,
    pub thickness: Option<f64>,
}

impl Default for NiftiOptions {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            center: true,
            thickness: None,
        }
    }
}

impl NiftiOptions {
    /// Voxel-to-RAS affine for a level-0 image of the given header shape.
    ///
    /// `header_shape` starts with `(W, H)`.
    pub fn affine(&self, pixel_size: PixelSize, header_shape: &[u64]) -> Matrix4<f64> {
        let affine = self.orientation.to_affine(
            pixel_size.width,
            pixel_size.height,
            self.thickness.unwrap_or(DEFAULT_THICKNESS),
        );
        if self.center {
            let spatial = &header_shape[..header_shape.len().min(2)];
            center_affine(&affine, spatial)
        } else {
            affine
        }
    }
}

/// Header dims for a level-0 array shape.
///
/// `(H, W)` becomes `(W, H)` and `(C, H, W)` becomes `(W, H, 1, 1, C)`.
pub fn header_shape(level0_shape: &[u64]) -> Vec<u64> {
    let mut shape: Vec<u64> = level0_shape.iter().rev().copied().collect();
    if shape.len() > 2 {
        shape.splice(2..2, [1, 1]);
    }
    shape
}

/// Assemble the header of a level-0 array.
///
/// # Errors
/// Fails if the shape has too many dims or the affine is degenerate.
pub fn build_header(
    level0_shape: &[u64],
    dtype: DataType,
    affine: &Matrix4<f64>,
) -> Result<Nifti2Header, HeaderError> {
    let mut header = Nifti2Header::default();
    header.set_data_shape(&header_shape(level0_shape))?;
    header.set_data_dtype(dtype);
    header.set_qform(affine, XFORM_ALIGNED)?;
    header.set_sform(affine, XFORM_ALIGNED);
    header.xyzt_units = UNITS_MICRON;
    Ok(header)
}

/// Build the header bytes for a converted pyramid.
pub fn header_bytes(
    options: &NiftiOptions,
    level0_shape: &[u64],
    dtype: DataType,
    pixel_size: PixelSize,
) -> Result<Vec<u8>, ConvertError> {
    let affine = options.affine(pixel_size, &header_shape(level0_shape));
    let header = build_header(level0_shape, dtype, &affine)?;
    Ok(header.to_bytes())
}
