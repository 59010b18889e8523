//! Anatomical orientation codes and the affines they imply.
//!
//! An orientation is a sequence of letters from `{L, R, A, P, I, S}`, one
//! per voxel axis, giving the anatomical direction toward which that axis
//! increases:
//!
//! ```text
//! letter 0: direction of the image's right edge   (x, width)
//! letter 1: direction of the image's bottom edge  (y, height)
//! letter 2: direction through the slice            (z, thickness)
//! ```
//!
//! Two-letter codes are completed with the positive direction (`R`, `A` or
//! `S`) of the missing anatomical axis. Aliases: `coronal = LI`,
//! `axial = LP`, `sagittal = PI`.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::error::ConfigError;

// =============================================================================
// Direction
// =============================================================================

/// One anatomical direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Anterior,
    Posterior,
    Inferior,
    Superior,
}

impl Direction {
    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'L' => Some(Direction::Left),
            'R' => Some(Direction::Right),
            'A' => Some(Direction::Anterior),
            'P' => Some(Direction::Posterior),
            'I' => Some(Direction::Inferior),
            'S' => Some(Direction::Superior),
            _ => None,
        }
    }

    pub const fn letter(&self) -> char {
        match self {
            Direction::Left => 'L',
            Direction::Right => 'R',
            Direction::Anterior => 'A',
            Direction::Posterior => 'P',
            Direction::Inferior => 'I',
            Direction::Superior => 'S',
        }
    }

    /// Index of the RAS world axis this direction lies on.
    pub const fn ras_axis(&self) -> usize {
        match self {
            Direction::Left | Direction::Right => 0,
            Direction::Anterior | Direction::Posterior => 1,
            Direction::Inferior | Direction::Superior => 2,
        }
    }

    /// `-1` for L, P and I; `+1` otherwise.
    pub const fn sign(&self) -> f64 {
        match self {
            Direction::Left | Direction::Posterior | Direction::Inferior => -1.0,
            _ => 1.0,
        }
    }

    const fn positive_on(axis: usize) -> Self {
        match axis {
            0 => Direction::Right,
            1 => Direction::Anterior,
            _ => Direction::Superior,
        }
    }
}

// =============================================================================
// Orientation
// =============================================================================

/// A full three-axis orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation {
    axes: [Direction; 3],
}

impl Orientation {
    pub fn axes(&self) -> [Direction; 3] {
        self.axes
    }

    /// Affine mapping voxel indices `(x, y, z)` to RAS world coordinates.
    ///
    /// Column `k` is the unit RAS vector of letter `k`, signed, scaled by the
    /// voxel size of axis `k`. The translation is zero.
    pub fn to_affine(&self, voxel_width: f64, voxel_height: f64, thickness: f64) -> Matrix4<f64> {
        let sizes = [voxel_width, voxel_height, thickness];
        let mut affine = Matrix4::identity();
        for (k, direction) in self.axes.iter().enumerate() {
            for row in 0..3 {
                affine[(row, k)] = 0.0;
            }
            affine[(direction.ras_axis(), k)] = direction.sign() * sizes[k];
        }
        affine
    }
}

impl Default for Orientation {
    /// Coronal (`LIA`).
    fn default() -> Self {
        Self {
            axes: [Direction::Left, Direction::Inferior, Direction::Anterior],
        }
    }
}

impl FromStr for Orientation {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| ConfigError::InvalidOrientation {
            value: value.to_string(),
            message,
        };

        let code = match value.to_ascii_lowercase().as_str() {
            "coronal" => "LI".to_string(),
            "axial" => "LP".to_string(),
            "sagittal" => "PI".to_string(),
            _ => value.to_string(),
        };

        let letters: Vec<char> = code.chars().collect();
        if letters.len() != 2 && letters.len() != 3 {
            return Err(invalid(
                "expected an alias or 2-3 letters from L, R, A, P, I, S".to_string(),
            ));
        }

        let mut axes = Vec::with_capacity(3);
        let mut used = [false; 3];
        for letter in letters {
            let direction = Direction::from_letter(letter)
                .ok_or_else(|| invalid(format!("'{}' is not one of L, R, A, P, I, S", letter)))?;
            if used[direction.ras_axis()] {
                return Err(invalid(format!(
                    "anatomical axis of '{}' is used twice",
                    direction.letter()
                )));
            }
            used[direction.ras_axis()] = true;
            axes.push(direction);
        }

        if let Some(missing) = used.iter().position(|&u| !u) {
            axes.push(Direction::positive_on(missing));
        }

        Ok(Self {
            axes: [axes[0], axes[1], axes[2]],
        })
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for direction in &self.axes {
            write!(f, "{}", direction.letter())?;
        }
        Ok(())
    }
}

// =============================================================================
// Affine helpers
// =============================================================================

/// Parse `orientation` and build its affine.
///
/// # Errors
/// Returns `InvalidOrientation` for unknown aliases or malformed codes.
pub fn orientation_to_affine(
    orientation: &str,
    voxel_width: f64,
    voxel_height: f64,
    thickness: f64,
) -> Result<Matrix4<f64>, ConfigError> {
    let orientation: Orientation = orientation.parse()?;
    Ok(orientation.to_affine(voxel_width, voxel_height, thickness))
}

/// Move the origin to the centre of the field of view.
///
/// `shape` holds the voxel counts of the first axes (typically width and
/// height); missing axes count as 1. The translation becomes
/// `-M * (shape - 1) / 2` where `M` is the linear part, so the central voxel
/// maps to world `(0, 0, 0)`.
pub fn center_affine(affine: &Matrix4<f64>, shape: &[u64]) -> Matrix4<f64> {
    let extent = |i: usize| shape.get(i).copied().unwrap_or(1) as f64;
    let half = Vector3::new(extent(0) - 1.0, extent(1) - 1.0, extent(2) - 1.0) * 0.5;

    let linear: Matrix3<f64> = affine.fixed_view::<3, 3>(0, 0).into_owned();
    let translation = -(linear * half);

    let mut centered = *affine;
    for row in 0..3 {
        centered[(row, 3)] = translation[row];
    }
    centered
}
