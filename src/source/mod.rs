//! Access to the resolution levels of a decoded image.
//!
//! The [`LevelReader`] trait is the seam between the JPEG 2000 decoder and
//! the pyramid writer. The writer only needs shapes, the element type and a
//! way to pull a rectangular region of any level, so synthetic sources can
//! stand in for a real codestream in tests.
//!
//! # Shapes
//!
//! Shapes are channel-first: `[C, H, W]` when the image has more than one
//! component, `[H, W]` otherwise. Level 0 is full resolution and level `n`
//! is reduced by `2^n` (rounded up) in each spatial dimension.

mod decoder;

pub use decoder::Jp2kReader;

use std::ops::Range;

use crate::array::{DataType, Region};
use crate::error::CodestreamError;

// =============================================================================
// LevelReader Trait
// =============================================================================

/// Random access to the resolution levels of an image.
pub trait LevelReader: Send + Sync {
    /// Number of resolution levels. Level 0 is full resolution.
    fn level_count(&self) -> usize;

    /// Channel-first shape of a level, or `None` if out of range.
    fn level_shape(&self, level: usize) -> Option<Vec<u64>>;

    /// Element type of every sample.
    fn dtype(&self) -> DataType;

    /// Whether level shapes carry a leading channel axis.
    fn has_channel(&self) -> bool {
        self.level_shape(0).is_some_and(|shape| shape.len() == 3)
    }

    /// Decode a rectangular region of a level.
    ///
    /// The returned region has shape `[C, rows.len(), cols.len()]` (or
    /// `[rows.len(), cols.len()]` without a channel axis), in C order.
    ///
    /// # Errors
    /// - `LevelOutOfRange` if `level >= level_count()`
    /// - `RegionOutOfBounds` if the ranges exceed the level's extent
    /// - `Decode` if the decoder fails
    fn read_region(
        &self,
        level: usize,
        rows: Range<u64>,
        cols: Range<u64>,
    ) -> Result<Region, CodestreamError>;
}

/// Check a region request against a level shape.
///
/// Returns the level shape on success so callers can size their output.
pub fn check_region(
    level: usize,
    level_count: usize,
    shape: Option<Vec<u64>>,
    rows: &Range<u64>,
    cols: &Range<u64>,
) -> Result<Vec<u64>, CodestreamError> {
    let shape = shape.ok_or(CodestreamError::LevelOutOfRange {
        level,
        count: level_count,
    })?;

    let [.., height, width] = shape[..] else {
        return Err(CodestreamError::Unsupported {
            reason: format!("level {} shape {:?} has no spatial plane", level, shape),
        });
    };
    if rows.start > rows.end || cols.start > cols.end || rows.end > height || cols.end > width {
        return Err(CodestreamError::RegionOutOfBounds {
            level,
            rows: (rows.start, rows.end),
            cols: (cols.start, cols.end),
            shape,
        });
    }

    Ok(shape)
}
