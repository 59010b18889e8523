//! Zarr v2 directory store.
//!
//! On-disk layout:
//!
//! ```text
//! out.ome.zarr/
//! ├── .zgroup          {"zarr_format": 2}
//! ├── .zattrs          group attributes (multiscales)
//! ├── 0/
//! │   ├── .zarray      array metadata
//! │   └── 0/0/0 ...    chunk files, "/" dimension separator
//! └── 1/ ...
//! ```
//!
//! Chunk encoding, partial-chunk merging and the F-order transpose are done
//! by `zarrs` from the `.zarray` document. Elements past the array edge hold
//! the fill value 0. A chunk that holds only the fill value is not stored and
//! reads back as zeros.

use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;
use zarrs::array::{
    Array, ArrayBytes, ArrayMetadata, ArrayMetadataOptions, ArrayMetadataV2, ArraySubset,
};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::{Group, GroupMetadata};

use crate::array::{DataType, Region};
use crate::error::StoreError;

use super::compressor::{Compressor, CompressorMetadata};
use super::{ArrayHandle, ArraySpec, ArrayStore};

// =============================================================================
// Constants
// =============================================================================

const ZARR_FORMAT: u32 = 2;
const GROUP_METADATA: &str = ".zgroup";
const GROUP_ATTRIBUTES: &str = ".zattrs";
const ARRAY_METADATA: &str = ".zarray";
const DIMENSION_SEPARATOR: &str = "/";
const FILL_VALUE: u8 = 0;

// =============================================================================
// Metadata documents
// =============================================================================

/// The `.zarray` fields an [`ArraySpec`] is rebuilt from.
#[derive(Debug, Deserialize)]
struct StoredArray {
    shape: Vec<u64>,
    chunks: Vec<u64>,
    dtype: String,
    compressor: Option<CompressorMetadata>,
}

impl StoredArray {
    fn into_spec(self, key: &str) -> Result<ArraySpec, StoreError> {
        let dtype = DataType::from_zarr_dtype(&self.dtype).ok_or_else(|| {
            StoreError::InvalidMetadata {
                key: key.to_string(),
                message: format!("dtype '{}'", self.dtype),
            }
        })?;
        let spec = ArraySpec::new(
            self.shape,
            self.chunks,
            dtype,
            Compressor::from_metadata(self.compressor),
        );
        spec.validate(key)?;
        Ok(spec)
    }
}

/// Zarr v2 metadata of an array: F order, zero fill, no filters.
fn array_metadata_v2(key: &str, spec: &ArraySpec) -> Result<ArrayMetadataV2, StoreError> {
    let document = serde_json::json!({
        "zarr_format": ZARR_FORMAT,
        "shape": spec.shape,
        "chunks": spec.chunks,
        "dtype": spec.dtype.zarr_dtype(),
        "compressor": spec.compressor.to_metadata(),
        "fill_value": FILL_VALUE,
        "order": "F",
        "filters": null,
        "dimension_separator": DIMENSION_SEPARATOR,
    });
    serde_json::from_value(document).map_err(|e| invalid_metadata(key, e))
}

// =============================================================================
// DirectoryStore
// =============================================================================

/// Zarr v2 store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    storage: Arc<FilesystemStore>,
}

impl DirectoryStore {
    /// Create a store at `path`, replacing whatever is there.
    ///
    /// # Errors
    /// Returns `Io` if the existing entry cannot be removed or the
    /// directory cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();

        match fs::symlink_metadata(&root) {
            Ok(meta) if meta.is_dir() => {
                debug!("Replacing existing store at {}", root.display());
                fs::remove_dir_all(&root).map_err(|e| io_error(&root, e))?;
            }
            Ok(_) => fs::remove_file(&root).map_err(|e| io_error(&root, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&root, e)),
        }
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;

        let store = Self::at(root)?;
        let metadata: GroupMetadata =
            serde_json::from_value(serde_json::json!({ "zarr_format": ZARR_FORMAT }))
                .map_err(|e| invalid_metadata(GROUP_METADATA, e))?;
        Group::new_with_metadata(store.storage.clone(), "/", metadata)
            .map_err(|e| zarr_error("/", e))?
            .store_metadata()
            .map_err(|e| zarr_error("/", e))?;

        Ok(store)
    }

    /// Open an existing store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        if !root.join(GROUP_METADATA).is_file() {
            return Err(StoreError::InvalidMetadata {
                key: GROUP_METADATA.to_string(),
                message: format!("no Zarr v2 group at {}", root.display()),
            });
        }
        let store = Self::at(root)?;
        store.group()?;
        Ok(store)
    }

    fn at(root: PathBuf) -> Result<Self, StoreError> {
        let storage = FilesystemStore::new(&root).map_err(|e| StoreError::Io {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            root,
            storage: Arc::new(storage),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open an array written earlier.
    ///
    /// # Errors
    /// Returns `MissingArray` if `key` has no `.zarray`.
    pub fn open_array(&self, key: &str) -> Result<ArrayHandle, StoreError> {
        let stored: StoredArray = serde_json::from_value(self.array_metadata(key)?)
            .map_err(|e| invalid_metadata(key, e))?;
        Ok(ArrayHandle::new(key, stored.into_spec(key)?))
    }

    /// The `.zarray` document of an array, as parsed by `zarrs`.
    pub fn array_metadata(&self, key: &str) -> Result<serde_json::Value, StoreError> {
        if !self.root.join(key).join(ARRAY_METADATA).is_file() {
            return Err(StoreError::MissingArray(key.to_string()));
        }
        let array =
            Array::open(self.storage.clone(), &node_path(key)).map_err(|e| zarr_error(key, e))?;
        serde_json::to_value(array.metadata()).map_err(|e| invalid_metadata(key, e))
    }

    /// Root group attributes, `{}` if none were written.
    pub fn group_attributes(&self) -> Result<serde_json::Value, StoreError> {
        if !self.root.join(GROUP_ATTRIBUTES).is_file() {
            return Ok(serde_json::json!({}));
        }
        Ok(serde_json::Value::Object(self.group()?.attributes().clone()))
    }

    fn group(&self) -> Result<Group<FilesystemStore>, StoreError> {
        Group::open(self.storage.clone(), "/").map_err(|e| zarr_error("/", e))
    }

    fn array(&self, handle: &ArrayHandle) -> Result<Array<FilesystemStore>, StoreError> {
        let key = handle.key();
        let metadata = ArrayMetadata::V2(array_metadata_v2(key, handle.spec())?);
        Array::new_with_metadata(self.storage.clone(), &node_path(key), metadata)
            .map_err(|e| zarr_error(key, e))
    }
}

impl ArrayStore for DirectoryStore {
    fn create_array(&self, key: &str, spec: ArraySpec) -> Result<ArrayHandle, StoreError> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|p| p == "..") {
            return Err(StoreError::InvalidMetadata {
                key: key.to_string(),
                message: "array keys must be relative paths inside the store".to_string(),
            });
        }
        spec.validate(key)?;

        let dir = self.root.join(key);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        }

        let handle = ArrayHandle::new(key, spec);
        self.array(&handle)?
            .store_metadata_opt(&ArrayMetadataOptions::default().with_include_zarrs_metadata(false))
            .map_err(|e| zarr_error(key, e))?;

        let spec = handle.spec();
        debug!(
            "Created array '{}' shape {:?} chunks {:?} {} ({})",
            key,
            spec.shape,
            spec.chunks,
            spec.dtype.name(),
            spec.compressor.kind().name()
        );
        Ok(handle)
    }

    fn write_region(
        &self,
        array: &ArrayHandle,
        offset: &[u64],
        region: &Region,
    ) -> Result<(), StoreError> {
        if region.dtype() != array.dtype() {
            return Err(StoreError::DtypeMismatch {
                key: array.key().to_string(),
                expected: array.dtype().name(),
                actual: region.dtype().name(),
            });
        }
        array.check_bounds(offset, region.shape())?;
        if region.is_empty() {
            return Ok(());
        }

        let mut data = Cow::Borrowed(region.data());
        if cfg!(target_endian = "big") {
            swap_samples(data.to_mut(), region.dtype());
        }
        let subset = array_subset(offset, region.shape());
        self.array(array)?
            .store_array_subset(&subset, ArrayBytes::new_flen(data))
            .map_err(|e| zarr_error(array.key(), e))?;

        debug!(
            "Wrote region of '{}' at {:?} shape {:?}",
            array.key(),
            offset,
            region.shape()
        );
        Ok(())
    }

    fn read_region(
        &self,
        array: &ArrayHandle,
        offset: &[u64],
        shape: &[u64],
    ) -> Result<Region, StoreError> {
        array.check_bounds(offset, shape)?;
        let dtype = array.dtype();
        if shape.contains(&0) {
            return Ok(Region::zeros(dtype, shape.to_vec()));
        }

        let subset = array_subset(offset, shape);
        let bytes: ArrayBytes = self
            .array(array)?
            .retrieve_array_subset(&subset)
            .map_err(|e| zarr_error(array.key(), e))?;
        let mut data = bytes
            .into_fixed()
            .map_err(|e| zarr_error(array.key(), e))?
            .into_owned();
        if cfg!(target_endian = "big") {
            swap_samples(&mut data, dtype);
        }

        Region::new(dtype, shape.to_vec(), data).ok_or_else(|| StoreError::InvalidMetadata {
            key: array.key().to_string(),
            message: "region size mismatch".to_string(),
        })
    }

    fn set_group_attributes(&self, attributes: &serde_json::Value) -> Result<(), StoreError> {
        let serde_json::Value::Object(map) = attributes else {
            return Err(StoreError::InvalidMetadata {
                key: GROUP_ATTRIBUTES.to_string(),
                message: format!("expected a JSON object, got {}", attributes),
            });
        };
        let mut group = self.group()?;
        *group.attributes_mut() = map.clone();
        group.store_metadata().map_err(|e| zarr_error("/", e))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn node_path(key: &str) -> String {
    format!("/{}", key)
}

/// Toggle samples between little-endian ([`Region`]) and native (`zarrs`) order.
fn swap_samples(data: &mut [u8], dtype: DataType) {
    if dtype.size() > 1 {
        data.chunks_exact_mut(dtype.size()).for_each(<[u8]>::reverse);
    }
}

fn array_subset(offset: &[u64], shape: &[u64]) -> ArraySubset {
    let ranges: Vec<_> = offset.iter().zip(shape).map(|(&o, &s)| o..o + s).collect();
    ArraySubset::new_with_ranges(&ranges)
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn zarr_error(key: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Zarr {
        key: key.to_string(),
        message: e.to_string(),
    }
}

fn invalid_metadata(key: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidMetadata {
        key: key.to_string(),
        message: e.to_string(),
    }
}
