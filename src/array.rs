//! Element types and in-memory N-d regions.
//!
//! A [`Region`] is the unit of data exchanged between a
//! [`LevelReader`](crate::source::LevelReader) and an
//! [`ArrayStore`](crate::store::ArrayStore): raw little-endian element bytes
//! laid out in C order (last dimension fastest), together with the element
//! type and shape.

use crate::error::CodestreamError;

// =============================================================================
// DataType
// =============================================================================

/// Integer element types a JPEG 2000 component can decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl DataType {
    /// Pick the narrowest type holding `precision` bits.
    pub fn from_precision(precision: u32, signed: bool) -> Result<Self, CodestreamError> {
        let dtype = match (precision, signed) {
            (1..=8, false) => DataType::U8,
            (1..=8, true) => DataType::I8,
            (9..=16, false) => DataType::U16,
            (9..=16, true) => DataType::I16,
            (17..=32, false) => DataType::U32,
            (17..=32, true) => DataType::I32,
            _ => {
                return Err(CodestreamError::Unsupported {
                    reason: format!("component precision of {} bits", precision),
                })
            }
        };
        Ok(dtype)
    }

    /// Size of one element in bytes.
    pub const fn size(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 => 4,
        }
    }

    /// Zarr v2 / numpy type string.
    pub const fn zarr_dtype(&self) -> &'static str {
        match self {
            DataType::U8 => "|u1",
            DataType::I8 => "|i1",
            DataType::U16 => "<u2",
            DataType::I16 => "<i2",
            DataType::U32 => "<u4",
            DataType::I32 => "<i4",
        }
    }

    /// Inverse of [`DataType::zarr_dtype`].
    pub fn from_zarr_dtype(value: &str) -> Option<Self> {
        let dtype = match value {
            "|u1" => DataType::U8,
            "|i1" => DataType::I8,
            "<u2" => DataType::U16,
            "<i2" => DataType::I16,
            "<u4" => DataType::U32,
            "<i4" => DataType::I32,
            _ => return None,
        };
        Some(dtype)
    }

    /// NIfTI `datatype` code.
    pub const fn nifti_code(&self) -> i16 {
        match self {
            DataType::U8 => 2,
            DataType::I16 => 4,
            DataType::I32 => 8,
            DataType::I8 => 256,
            DataType::U16 => 512,
            DataType::U32 => 768,
        }
    }

    /// Human-readable name.
    pub const fn name(&self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::I8 => "int8",
            DataType::U16 => "uint16",
            DataType::I16 => "int16",
            DataType::U32 => "uint32",
            DataType::I32 => "int32",
        }
    }

    /// Append one decoded sample to `out` as little-endian bytes.
    ///
    /// Values are truncated to the element width, matching how the decoder
    /// already clamps samples to the component precision.
    #[inline]
    pub fn push_sample(&self, value: i32, out: &mut Vec<u8>) {
        match self {
            DataType::U8 => out.push(value as u8),
            DataType::I8 => out.push(value as i8 as u8),
            DataType::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            DataType::I16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
            DataType::U32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
            DataType::I32 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

// =============================================================================
// Region
// =============================================================================

/// An N-d block of elements in C order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    dtype: DataType,
    shape: Vec<u64>,
    data: Vec<u8>,
}

impl Region {
    /// Wrap existing bytes. Returns `None` if the length does not match the shape.
    pub fn new(dtype: DataType, shape: Vec<u64>, data: Vec<u8>) -> Option<Self> {
        if data.len() as u64 != byte_len(&shape, dtype) {
            return None;
        }
        Some(Self { dtype, shape, data })
    }

    /// A zero-filled region.
    pub fn zeros(dtype: DataType, shape: Vec<u64>) -> Self {
        let len = byte_len(&shape, dtype) as usize;
        Self {
            dtype,
            shape,
            data: vec![0; len],
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of elements.
    pub fn len(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of bytes needed to hold `shape` elements of `dtype`.
pub fn byte_len(shape: &[u64], dtype: DataType) -> u64 {
    shape.iter().product::<u64>() * dtype.size() as u64
}
