//! Level-streaming pyramid writer.
//!
//! Every native resolution level of the source becomes one array of the
//! store, keyed by its index. Large planes are copied through a grid of
//! `max_load x max_load` tiles so that at most one tile is decoded at a
//! time:
//!
//! ```text
//!            W
//!   ┌──────┬──────┬───┐
//!   │ 0,0  │ 0,1  │0,2│    ceil(H / max_load) x ceil(W / max_load) tiles,
//! H ├──────┼──────┼───┤    the last row and column clipped to the plane
//!   │ 1,0  │ 1,1  │1,2│
//!   └──────┴──────┴───┘
//! ```
//!
//! Channel dims are never sliced. The store merges partial chunks, so the
//! arrays are byte-identical whatever the tile size.

use std::ops::Range;

use tracing::{debug, info};

use crate::error::{CodestreamError, ConvertError};
use crate::source::LevelReader;
use crate::store::{ArrayHandle, ArraySpec, ArrayStore, Compressor};

// =============================================================================
// TilePlan
// =============================================================================

/// The spatial tiles used to copy one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePlan {
    height: u64,
    width: u64,
    tile: Option<u64>,
}

impl TilePlan {
    /// Plan the copy of an `height x width` plane.
    ///
    /// The plane is copied in one pass when `max_load` is `None` or when
    /// both sides fit within it.
    pub fn new(height: u64, width: u64, max_load: Option<u64>) -> Self {
        let tile = max_load.filter(|&m| m > 0 && (height > m || width > m));
        Self {
            height,
            width,
            tile,
        }
    }

    /// Whether the plane is split at all.
    pub fn is_tiled(&self) -> bool {
        self.tile.is_some()
    }

    /// Number of tiles along `(rows, cols)`.
    pub fn grid(&self) -> (u64, u64) {
        match self.tile {
            Some(t) => (self.height.div_ceil(t), self.width.div_ceil(t)),
            None => (1, 1),
        }
    }

    pub fn tile_count(&self) -> u64 {
        let (ni, nj) = self.grid();
        ni * nj
    }

    /// Row and column ranges of every tile, row-major.
    pub fn tiles(&self) -> impl Iterator<Item = (Range<u64>, Range<u64>)> + '_ {
        let (ni, nj) = self.grid();
        let step = self.tile.unwrap_or(self.height.max(self.width).max(1));
        (0..ni).flat_map(move |i| {
            (0..nj).map(move |j| {
                let rows = i * step..((i + 1) * step).min(self.height);
                let cols = j * step..((j + 1) * step).min(self.width);
                (rows, cols)
            })
        })
    }
}

// =============================================================================
// LevelWriter
// =============================================================================

/// Copies every level of a [`LevelReader`] into an [`ArrayStore`].
#[derive(Debug, Clone)]
pub struct LevelWriter {
    chunk: u64,
    compressor: Compressor,
    max_load: Option<u64>,
}

impl LevelWriter {
    /// # Arguments
    /// * `chunk` - chunk side on the two spatial dims
    /// * `compressor` - chunk compressor of every level
    /// * `max_load` - tile side bounding each decode, `None` for whole planes
    pub fn new(chunk: u64, compressor: Compressor, max_load: Option<u64>) -> Self {
        Self {
            chunk,
            compressor,
            max_load,
        }
    }

    /// Array description for a level of the given shape.
    ///
    /// Leading dims form a single chunk; the two spatial dims use `chunk`.
    /// `shape` must end with the two spatial dims.
    pub fn array_spec<L: LevelReader>(&self, reader: &L, shape: &[u64]) -> ArraySpec {
        let ndim = shape.len();
        debug_assert!(ndim >= 2, "level shape {:?} has no spatial plane", shape);
        let mut chunks = shape[..ndim.saturating_sub(2)].to_vec();
        chunks.push(self.chunk);
        chunks.push(self.chunk);
        ArraySpec::new(
            shape.to_vec(),
            chunks,
            reader.dtype(),
            self.compressor.clone(),
        )
    }

    /// Write all levels, level 0 first.
    ///
    /// Returns the handles of the created arrays in level order.
    ///
    /// # Errors
    /// Fails on the first level that cannot be read or written; levels
    /// written before it stay in the store.
    pub fn write_all<L: LevelReader, S: ArrayStore>(
        &self,
        reader: &L,
        store: &S,
    ) -> Result<Vec<ArrayHandle>, ConvertError> {
        (0..reader.level_count())
            .map(|level| self.write_level(reader, store, level))
            .collect()
    }

    /// Create the array of one level and copy its pixels.
    pub fn write_level<L: LevelReader, S: ArrayStore>(
        &self,
        reader: &L,
        store: &S,
        level: usize,
    ) -> Result<ArrayHandle, ConvertError> {
        let shape = reader
            .level_shape(level)
            .ok_or_else(|| ConvertError::ReadLevel {
                level,
                source: CodestreamError::LevelOutOfRange {
                    level,
                    count: reader.level_count(),
                },
            })?;
        if shape.len() < 2 {
            return Err(ConvertError::ReadLevel {
                level,
                source: CodestreamError::Unsupported {
                    reason: format!("level {} shape {:?} has no spatial plane", level, shape),
                },
            });
        }
        info!("Convert level {} with shape {:?}", level, shape);

        let array = store
            .create_array(&level.to_string(), self.array_spec(reader, &shape))
            .map_err(|source| ConvertError::WriteLevel { level, source })?;

        let ndim = shape.len();
        let plan = TilePlan::new(shape[ndim - 2], shape[ndim - 1], self.max_load);
        let (ni, nj) = plan.grid();
        if plan.is_tiled() {
            debug!("Level {} split into {}x{} tiles", level, ni, nj);
        }

        for (index, (rows, cols)) in plan.tiles().enumerate() {
            if plan.is_tiled() {
                debug!(
                    "Level {}: tile {}/{}, {}/{}",
                    level,
                    index as u64 / nj + 1,
                    ni,
                    index as u64 % nj + 1,
                    nj
                );
            }

            let mut offset = vec![0u64; ndim - 2];
            offset.push(rows.start);
            offset.push(cols.start);

            let region = reader
                .read_region(level, rows, cols)
                .map_err(|source| ConvertError::ReadLevel { level, source })?;
            store
                .write_region(&array, &offset, &region)
                .map_err(|source| ConvertError::WriteLevel { level, source })?;
        }

        Ok(array)
    }
}
