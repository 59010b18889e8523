//! OME-Zarr 0.4 multiscale descriptor.
//!
//! Each dataset entry relates a pyramid level to level 0:
//!
//! ```text
//! scale[d]       = (shape0[d] / shapeN[d]) * voxel[d]
//! translation[d] = (shape0[d] / shapeN[d] - 1) * voxel[d] / 2
//! ```
//!
//! The translation assumes wavelet decimation keeps the outer voxel edges of
//! every level aligned with level 0, so the centre of the first voxel moves
//! by half the change in voxel size. This holds for the JPEG 2000 reference
//! grid with a zero image offset; other decimation schemes would need their
//! own shift.

use serde::{Deserialize, Serialize};

use crate::format::jp2::PixelSize;

// =============================================================================
// Constants
// =============================================================================

pub const MULTISCALES_VERSION: &str = "0.4";
pub const MULTISCALES_TYPE: &str = "jpeg2000";
pub const SPACE_UNIT: &str = "micrometer";

// =============================================================================
// Descriptor types
// =============================================================================

/// One named axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,

    #[serde(rename = "type")]
    pub axis_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Axis {
    pub fn channel() -> Self {
        Self {
            name: "c".to_string(),
            axis_type: "channel".to_string(),
            unit: None,
        }
    }

    pub fn space(name: &str) -> Self {
        Self {
            name: name.to_string(),
            axis_type: "space".to_string(),
            unit: Some(SPACE_UNIT.to_string()),
        }
    }
}

/// A coordinate transformation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

/// One pyramid level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub path: String,

    #[serde(rename = "coordinateTransformations")]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

/// The multiscale record stored under the group's `multiscales` attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    pub version: String,

    pub name: String,

    #[serde(rename = "type")]
    pub downscaling_type: String,

    pub axes: Vec<Axis>,

    /// Ordered from level 0 (full resolution) down.
    pub datasets: Vec<Dataset>,

    #[serde(rename = "coordinateTransformations")]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

impl Multiscale {
    /// Build the descriptor from the persisted level shapes.
    ///
    /// # Arguments
    /// * `level_shapes` - shape of every level, level 0 first; each ends
    ///   with `(H, W)`, optionally preceded by channel dims
    /// * `pixel_size` - level-0 voxel size in micrometers
    pub fn from_level_shapes(level_shapes: &[Vec<u64>], pixel_size: PixelSize) -> Self {
        let leading = level_shapes
            .first()
            .map(|shape| shape.len().saturating_sub(2))
            .unwrap_or(0);

        let mut axes = Vec::with_capacity(leading + 2);
        if leading > 0 {
            axes.push(Axis::channel());
        }
        axes.push(Axis::space("y"));
        axes.push(Axis::space("x"));

        let datasets = match level_shapes.first() {
            Some(shape0) => level_shapes
                .iter()
                .enumerate()
                .map(|(level, shape)| Dataset {
                    path: level.to_string(),
                    coordinate_transformations: level_transforms(
                        shape0, shape, leading, pixel_size,
                    ),
                })
                .collect(),
            None => Vec::new(),
        };

        Self {
            version: MULTISCALES_VERSION.to_string(),
            name: String::new(),
            downscaling_type: MULTISCALES_TYPE.to_string(),
            coordinate_transformations: vec![CoordinateTransformation::Scale {
                scale: vec![1.0; axes.len()],
            }],
            axes,
            datasets,
        }
    }

    /// The group attributes document: `{"multiscales": [self]}`.
    pub fn to_attributes(&self) -> serde_json::Value {
        serde_json::json!({ "multiscales": [self] })
    }
}

/// Scale and translation of one level relative to level 0.
///
/// Leading (channel) dims get scale `1.0` and translation `0.0`.
pub fn level_transforms(
    shape0: &[u64],
    shape: &[u64],
    leading: usize,
    pixel_size: PixelSize,
) -> Vec<CoordinateTransformation> {
    let spatial = |dims: &[u64]| (dims[dims.len() - 2] as f64, dims[dims.len() - 1] as f64);
    let (h0, w0) = spatial(shape0);
    let (hn, wn) = spatial(shape);

    let ratio_y = h0 / hn;
    let ratio_x = w0 / wn;

    let mut scale = vec![1.0; leading];
    scale.push(ratio_y * pixel_size.height);
    scale.push(ratio_x * pixel_size.width);

    let mut translation = vec![0.0; leading];
    translation.push((ratio_y - 1.0) * pixel_size.height * 0.5);
    translation.push((ratio_x - 1.0) * pixel_size.width * 0.5);

    vec![
        CoordinateTransformation::Scale { scale },
        CoordinateTransformation::Translation { translation },
    ]
}
