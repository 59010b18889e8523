//! Chunked array storage.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐   write_region(offset, Region)   ┌──────────────────┐
//! │  LevelWriter      │ ───────────────────────────────► │  ArrayStore      │
//! │  (pyramid)        │                                  │  (DirectoryStore)│
//! └───────────────────┘                                  └────────┬─────────┘
//!                                                                 │ array subset
//!                                                     ┌───────────▼──────────┐
//!                                                     │ zarrs Array (Zarr v2)│
//!                                                     │ F order, "/" keys    │
//!                                                     ├──────────────────────┤
//!                                                     │ FilesystemStore      │
//!                                                     └──────────────────────┘
//! ```
//!
//! Writes are chunk-exact: `zarrs` reads back a chunk that a region covers
//! only partly and rewrites it whole, so the bytes on disk never depend on
//! how the caller tiles its writes.

pub mod compressor;
mod directory;

pub use compressor::{
    BloscOptions, Compressor, CompressorKind, CompressorMetadata, ZlibOptions, BLOSC_CNAMES,
};
pub use directory::DirectoryStore;

use crate::array::{DataType, Region};
use crate::error::StoreError;

// =============================================================================
// Array description
// =============================================================================

/// Everything needed to create an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySpec {
    /// Array shape
    pub shape: Vec<u64>,

    /// Chunk shape, same rank as `shape`
    pub chunks: Vec<u64>,

    /// Element type
    pub dtype: DataType,

    /// Chunk compressor
    pub compressor: Compressor,
}

impl ArraySpec {
    pub fn new(shape: Vec<u64>, chunks: Vec<u64>, dtype: DataType, compressor: Compressor) -> Self {
        Self {
            shape,
            chunks,
            dtype,
            compressor,
        }
    }

    /// Check ranks agree and chunk sides are positive.
    pub fn validate(&self, key: &str) -> Result<(), StoreError> {
        if self.shape.len() != self.chunks.len() {
            return Err(StoreError::InvalidMetadata {
                key: key.to_string(),
                message: format!(
                    "shape {:?} and chunks {:?} differ in rank",
                    self.shape, self.chunks
                ),
            });
        }
        if self.chunks.iter().any(|&c| c == 0) {
            return Err(StoreError::InvalidMetadata {
                key: key.to_string(),
                message: format!("chunks {:?} contain a zero side", self.chunks),
            });
        }
        Ok(())
    }

    /// Number of elements in one chunk.
    pub fn chunk_len(&self) -> u64 {
        self.chunks.iter().product()
    }
}

/// An array that exists in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayHandle {
    key: String,
    spec: ArraySpec,
}

impl ArrayHandle {
    pub fn new(key: impl Into<String>, spec: ArraySpec) -> Self {
        Self {
            key: key.into(),
            spec,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn spec(&self) -> &ArraySpec {
        &self.spec
    }

    pub fn shape(&self) -> &[u64] {
        &self.spec.shape
    }

    pub fn chunks(&self) -> &[u64] {
        &self.spec.chunks
    }

    pub fn dtype(&self) -> DataType {
        self.spec.dtype
    }

    /// Check that `offset .. offset + shape` lies inside the array.
    pub fn check_bounds(&self, offset: &[u64], shape: &[u64]) -> Result<(), StoreError> {
        let array_shape = self.shape();
        let inside = offset.len() == array_shape.len()
            && shape.len() == array_shape.len()
            && offset
                .iter()
                .zip(shape)
                .zip(array_shape)
                .all(|((&o, &s), &a)| o.checked_add(s).is_some_and(|end| end <= a));

        if !inside {
            return Err(StoreError::RegionOutOfBounds {
                key: self.key.clone(),
                offset: offset.to_vec(),
                shape: shape.to_vec(),
                array_shape: array_shape.to_vec(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// ArrayStore Trait
// =============================================================================

/// Hierarchical store of chunked N-d arrays under one group.
pub trait ArrayStore {
    /// Create (or replace) the array at `key`.
    fn create_array(&self, key: &str, spec: ArraySpec) -> Result<ArrayHandle, StoreError>;

    /// Write `region` at `offset` (element coordinates).
    ///
    /// # Errors
    /// - `RegionOutOfBounds` if the region does not fit in the array
    /// - `DtypeMismatch` if the region's element type differs
    /// - `Io` / `Zarr` on storage failures
    fn write_region(
        &self,
        array: &ArrayHandle,
        offset: &[u64],
        region: &Region,
    ) -> Result<(), StoreError>;

    /// Read a C-order region of `shape` at `offset`.
    fn read_region(
        &self,
        array: &ArrayHandle,
        offset: &[u64],
        shape: &[u64],
    ) -> Result<Region, StoreError>;

    /// Replace the attributes document of the root group.
    fn set_group_attributes(&self, attributes: &serde_json::Value) -> Result<(), StoreError>;
}
