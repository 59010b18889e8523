//! NIfTI-2 header serialization.
//!
//! The header is a fixed 540-byte little-endian record:
//!
//! ```text
//! Offset  Size  Field
//! 0       4     sizeof_hdr (540)
//! 4       8     magic "n+2\0\r\n\x1a\n"
//! 12      2     datatype
//! 14      2     bitpix
//! 16      64    dim[8]        (i64)
//! 80      24    intent_p1..3  (f64)
//! 104     64    pixdim[8]     (f64)
//! 168     8     vox_offset    (i64)
//! 176     16    scl_slope, scl_inter
//! 192     16    cal_max, cal_min
//! 208     16    slice_duration, toffset
//! 224     16    slice_start, slice_end (i64)
//! 240     80    descrip
//! 320     24    aux_file
//! 344     8     qform_code, sform_code (i32)
//! 352     48    quatern_b..d, qoffset_x..z (f64)
//! 400     96    srow_x, srow_y, srow_z (f64[4] each)
//! 496     12    slice_code, xyzt_units, intent_code (i32)
//! 508     16    intent_name
//! 524     1     dim_info
//! 525     15    unused
//! ```

use byteorder::{ByteOrder, LittleEndian};
use nalgebra::{Matrix3, Matrix4, SymmetricEigen, Vector3};

use crate::array::DataType;
use crate::error::HeaderError;

// =============================================================================
// Constants
// =============================================================================

/// Size of a NIfTI-2 header in bytes.
pub const HEADER_SIZE: usize = 540;

/// Single-file NIfTI-2 magic.
pub const NIFTI2_MAGIC: &[u8; 8] = b"n+2\0\r\n\x1a\n";

/// Data offset of a single-file NIfTI-2 image (header + 4-byte extension flag).
pub const DEFAULT_VOX_OFFSET: i64 = 544;

/// `xyzt_units` code for micrometers.
pub const UNITS_MICRON: i32 = 3;

/// `qform_code` / `sform_code` for "aligned to something else".
pub const XFORM_ALIGNED: i32 = 2;

/// Maximum number of data dimensions.
pub const MAX_DIMS: usize = 7;

/// Below this, `a^2 = 1 - (b^2 + c^2 + d^2)` is treated as zero.
const QUATERN_MIN_A2: f64 = 1e-7;

mod offsets {
    pub const SIZEOF_HDR: usize = 0;
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const INTENT_P1: usize = 80;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
    pub const CAL_MAX: usize = 192;
    pub const CAL_MIN: usize = 200;
    pub const SLICE_DURATION: usize = 208;
    pub const TOFFSET: usize = 216;
    pub const SLICE_START: usize = 224;
    pub const SLICE_END: usize = 232;
    pub const DESCRIP: usize = 240;
    pub const AUX_FILE: usize = 320;
    pub const QFORM_CODE: usize = 344;
    pub const SFORM_CODE: usize = 348;
    pub const QUATERN_B: usize = 352;
    pub const QOFFSET_X: usize = 376;
    pub const SROW_X: usize = 400;
    pub const SROW_Y: usize = 432;
    pub const SROW_Z: usize = 464;
    pub const SLICE_CODE: usize = 496;
    pub const XYZT_UNITS: usize = 500;
    pub const INTENT_CODE: usize = 504;
    pub const INTENT_NAME: usize = 508;
    pub const DIM_INFO: usize = 524;
}

// =============================================================================
// Nifti2Header
// =============================================================================

/// In-memory NIfTI-2 header.
#[derive(Debug, Clone, PartialEq)]
pub struct Nifti2Header {
    pub datatype: i16,
    pub bitpix: i16,
    pub dim: [i64; 8],
    pub intent_p: [f64; 3],
    pub pixdim: [f64; 8],
    pub vox_offset: i64,
    pub scl_slope: f64,
    pub scl_inter: f64,
    pub cal_max: f64,
    pub cal_min: f64,
    pub slice_duration: f64,
    pub toffset: f64,
    pub slice_start: i64,
    pub slice_end: i64,
    pub descrip: [u8; 80],
    pub aux_file: [u8; 24],
    pub qform_code: i32,
    pub sform_code: i32,
    pub quatern: [f64; 3],
    pub qoffset: [f64; 3],
    pub srow_x: [f64; 4],
    pub srow_y: [f64; 4],
    pub srow_z: [f64; 4],
    pub slice_code: i32,
    pub xyzt_units: i32,
    pub intent_code: i32,
    pub intent_name: [u8; 16],
    pub dim_info: u8,
}

impl Default for Nifti2Header {
    fn default() -> Self {
        Self {
            datatype: 0,
            bitpix: 0,
            dim: [0, 1, 1, 1, 1, 1, 1, 1],
            intent_p: [0.0; 3],
            pixdim: [1.0; 8],
            vox_offset: DEFAULT_VOX_OFFSET,
            scl_slope: f64::NAN,
            scl_inter: f64::NAN,
            cal_max: 0.0,
            cal_min: 0.0,
            slice_duration: 0.0,
            toffset: 0.0,
            slice_start: 0,
            slice_end: 0,
            descrip: [0; 80],
            aux_file: [0; 24],
            qform_code: 0,
            sform_code: 0,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            srow_x: [0.0; 4],
            srow_y: [0.0; 4],
            srow_z: [0.0; 4],
            slice_code: 0,
            xyzt_units: 0,
            intent_code: 0,
            intent_name: [0; 16],
            dim_info: 0,
        }
    }
}

impl Nifti2Header {
    /// Set `dim` from a data shape (x fastest).
    ///
    /// # Errors
    /// Returns `TooManyDimensions` for more than 7 dims.
    pub fn set_data_shape(&mut self, shape: &[u64]) -> Result<(), HeaderError> {
        if shape.len() > MAX_DIMS {
            return Err(HeaderError::TooManyDimensions(shape.len()));
        }
        self.dim = [1; 8];
        self.dim[0] = shape.len() as i64;
        for (i, &extent) in shape.iter().enumerate() {
            self.dim[i + 1] = extent as i64;
        }
        Ok(())
    }

    /// Data shape from `dim`.
    pub fn data_shape(&self) -> Vec<u64> {
        let ndim = self.dim[0].clamp(0, MAX_DIMS as i64) as usize;
        self.dim[1..=ndim].iter().map(|&d| d.max(0) as u64).collect()
    }

    pub fn set_data_dtype(&mut self, dtype: DataType) {
        self.datatype = dtype.nifti_code();
        self.bitpix = (dtype.size() * 8) as i16;
    }

    /// Store `affine` as the quaternion (qform) transform.
    ///
    /// Column norms become `pixdim[1..4]`; a left-handed linear part is
    /// recorded through `qfac = pixdim[0] = -1`.
    ///
    /// # Errors
    /// Returns `DegenerateAffine` if a column of the linear part is zero.
    pub fn set_qform(&mut self, affine: &Matrix4<f64>, code: i32) -> Result<(), HeaderError> {
        let rzs: Matrix3<f64> = affine.fixed_view::<3, 3>(0, 0).into_owned();
        let zooms = Vector3::new(
            rzs.column(0).norm(),
            rzs.column(1).norm(),
            rzs.column(2).norm(),
        );
        if zooms.iter().any(|&z| !z.is_finite() || z == 0.0) {
            return Err(HeaderError::DegenerateAffine(format!(
                "zero or non-finite voxel size {:?}",
                zooms.as_slice()
            )));
        }

        let mut rotation = rzs;
        for k in 0..3 {
            let scaled = rotation.column(k) / zooms[k];
            rotation.set_column(k, &scaled);
        }

        let qfac = if rotation.determinant() > 0.0 {
            1.0
        } else {
            let flipped = -rotation.column(2).into_owned();
            rotation.set_column(2, &flipped);
            -1.0
        };

        let [_, b, c, d] = rotation_to_quaternion(&rotation);
        self.quatern = [b, c, d];
        self.qoffset = [affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]];
        self.pixdim[0] = qfac;
        self.pixdim[1] = zooms[0];
        self.pixdim[2] = zooms[1];
        self.pixdim[3] = zooms[2];
        self.qform_code = code;
        Ok(())
    }

    /// Store `affine` as the sform rows.
    pub fn set_sform(&mut self, affine: &Matrix4<f64>, code: i32) {
        for col in 0..4 {
            self.srow_x[col] = affine[(0, col)];
            self.srow_y[col] = affine[(1, col)];
            self.srow_z[col] = affine[(2, col)];
        }
        self.sform_code = code;
    }

    /// Affine reconstructed from the qform fields.
    pub fn qform_affine(&self) -> Matrix4<f64> {
        let [mut b, mut c, mut d] = self.quatern;
        let norm2 = b * b + c * c + d * d;
        let a = if 1.0 - norm2 < QUATERN_MIN_A2 {
            // 180 degree rotation: renormalize (b, c, d) and pin a to zero
            let inv = 1.0 / norm2.sqrt();
            b *= inv;
            c *= inv;
            d *= inv;
            0.0
        } else {
            (1.0 - norm2).sqrt()
        };
        #[rustfmt::skip]
        let rotation = Matrix3::new(
            a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d),         2.0 * (b * d + a * c),
            2.0 * (b * c + a * d),         a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b),
            2.0 * (b * d - a * c),         2.0 * (c * d + a * b),         a * a + d * d - b * b - c * c,
        );
        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let zooms = Vector3::new(self.pixdim[1], self.pixdim[2], self.pixdim[3] * qfac);

        let mut affine = Matrix4::identity();
        for col in 0..3 {
            for row in 0..3 {
                affine[(row, col)] = rotation[(row, col)] * zooms[col];
            }
        }
        for row in 0..3 {
            affine[(row, 3)] = self.qoffset[row];
        }
        affine
    }

    /// Affine from the sform rows.
    pub fn sform_affine(&self) -> Matrix4<f64> {
        let mut affine = Matrix4::identity();
        for col in 0..4 {
            affine[(0, col)] = self.srow_x[col];
            affine[(1, col)] = self.srow_y[col];
            affine[(2, col)] = self.srow_z[col];
        }
        affine
    }

    /// Serialize to the 540-byte on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        use offsets::*;

        let mut buf = vec![0u8; HEADER_SIZE];

        LittleEndian::write_i32(&mut buf[SIZEOF_HDR..SIZEOF_HDR + 4], HEADER_SIZE as i32);
        buf[MAGIC..MAGIC + 8].copy_from_slice(NIFTI2_MAGIC);
        LittleEndian::write_i16(&mut buf[DATATYPE..DATATYPE + 2], self.datatype);
        LittleEndian::write_i16(&mut buf[BITPIX..BITPIX + 2], self.bitpix);
        LittleEndian::write_i64_into(&self.dim, &mut buf[DIM..DIM + 64]);
        LittleEndian::write_f64_into(&self.intent_p, &mut buf[INTENT_P1..INTENT_P1 + 24]);
        LittleEndian::write_f64_into(&self.pixdim, &mut buf[PIXDIM..PIXDIM + 64]);
        LittleEndian::write_i64(&mut buf[VOX_OFFSET..VOX_OFFSET + 8], self.vox_offset);
        LittleEndian::write_f64(&mut buf[SCL_SLOPE..SCL_SLOPE + 8], self.scl_slope);
        LittleEndian::write_f64(&mut buf[SCL_INTER..SCL_INTER + 8], self.scl_inter);
        LittleEndian::write_f64(&mut buf[CAL_MAX..CAL_MAX + 8], self.cal_max);
        LittleEndian::write_f64(&mut buf[CAL_MIN..CAL_MIN + 8], self.cal_min);
        LittleEndian::write_f64(
            &mut buf[SLICE_DURATION..SLICE_DURATION + 8],
            self.slice_duration,
        );
        LittleEndian::write_f64(&mut buf[TOFFSET..TOFFSET + 8], self.toffset);
        LittleEndian::write_i64(&mut buf[SLICE_START..SLICE_START + 8], self.slice_start);
        LittleEndian::write_i64(&mut buf[SLICE_END..SLICE_END + 8], self.slice_end);
        buf[DESCRIP..DESCRIP + 80].copy_from_slice(&self.descrip);
        buf[AUX_FILE..AUX_FILE + 24].copy_from_slice(&self.aux_file);
        LittleEndian::write_i32(&mut buf[QFORM_CODE..QFORM_CODE + 4], self.qform_code);
        LittleEndian::write_i32(&mut buf[SFORM_CODE..SFORM_CODE + 4], self.sform_code);
        LittleEndian::write_f64_into(&self.quatern, &mut buf[QUATERN_B..QUATERN_B + 24]);
        LittleEndian::write_f64_into(&self.qoffset, &mut buf[QOFFSET_X..QOFFSET_X + 24]);
        LittleEndian::write_f64_into(&self.srow_x, &mut buf[SROW_X..SROW_X + 32]);
        LittleEndian::write_f64_into(&self.srow_y, &mut buf[SROW_Y..SROW_Y + 32]);
        LittleEndian::write_f64_into(&self.srow_z, &mut buf[SROW_Z..SROW_Z + 32]);
        LittleEndian::write_i32(&mut buf[SLICE_CODE..SLICE_CODE + 4], self.slice_code);
        LittleEndian::write_i32(&mut buf[XYZT_UNITS..XYZT_UNITS + 4], self.xyzt_units);
        LittleEndian::write_i32(&mut buf[INTENT_CODE..INTENT_CODE + 4], self.intent_code);
        buf[INTENT_NAME..INTENT_NAME + 16].copy_from_slice(&self.intent_name);
        buf[DIM_INFO] = self.dim_info;

        buf
    }

    /// Parse a little-endian NIfTI-2 header.
    ///
    /// # Errors
    /// Returns `InvalidHeader` on a short buffer, wrong size field or magic.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, HeaderError> {
        use offsets::*;

        if buf.len() < HEADER_SIZE {
            return Err(HeaderError::InvalidHeader(format!(
                "{} bytes, need {}",
                buf.len(),
                HEADER_SIZE
            )));
        }
        let sizeof_hdr = LittleEndian::read_i32(&buf[SIZEOF_HDR..SIZEOF_HDR + 4]);
        if sizeof_hdr != HEADER_SIZE as i32 {
            return Err(HeaderError::InvalidHeader(format!(
                "sizeof_hdr is {}",
                sizeof_hdr
            )));
        }
        if &buf[MAGIC..MAGIC + 4] != b"n+2\0" && &buf[MAGIC..MAGIC + 4] != b"ni2\0" {
            return Err(HeaderError::InvalidHeader("bad magic".to_string()));
        }

        let mut header = Self::default();
        header.datatype = LittleEndian::read_i16(&buf[DATATYPE..DATATYPE + 2]);
        header.bitpix = LittleEndian::read_i16(&buf[BITPIX..BITPIX + 2]);
        LittleEndian::read_i64_into(&buf[DIM..DIM + 64], &mut header.dim);
        LittleEndian::read_f64_into(&buf[INTENT_P1..INTENT_P1 + 24], &mut header.intent_p);
        LittleEndian::read_f64_into(&buf[PIXDIM..PIXDIM + 64], &mut header.pixdim);
        header.vox_offset = LittleEndian::read_i64(&buf[VOX_OFFSET..VOX_OFFSET + 8]);
        header.scl_slope = LittleEndian::read_f64(&buf[SCL_SLOPE..SCL_SLOPE + 8]);
        header.scl_inter = LittleEndian::read_f64(&buf[SCL_INTER..SCL_INTER + 8]);
        header.cal_max = LittleEndian::read_f64(&buf[CAL_MAX..CAL_MAX + 8]);
        header.cal_min = LittleEndian::read_f64(&buf[CAL_MIN..CAL_MIN + 8]);
        header.slice_duration = LittleEndian::read_f64(&buf[SLICE_DURATION..SLICE_DURATION + 8]);
        header.toffset = LittleEndian::read_f64(&buf[TOFFSET..TOFFSET + 8]);
        header.slice_start = LittleEndian::read_i64(&buf[SLICE_START..SLICE_START + 8]);
        header.slice_end = LittleEndian::read_i64(&buf[SLICE_END..SLICE_END + 8]);
        header.descrip.copy_from_slice(&buf[DESCRIP..DESCRIP + 80]);
        header.aux_file.copy_from_slice(&buf[AUX_FILE..AUX_FILE + 24]);
        header.qform_code = LittleEndian::read_i32(&buf[QFORM_CODE..QFORM_CODE + 4]);
        header.sform_code = LittleEndian::read_i32(&buf[SFORM_CODE..SFORM_CODE + 4]);
        LittleEndian::read_f64_into(&buf[QUATERN_B..QUATERN_B + 24], &mut header.quatern);
        LittleEndian::read_f64_into(&buf[QOFFSET_X..QOFFSET_X + 24], &mut header.qoffset);
        LittleEndian::read_f64_into(&buf[SROW_X..SROW_X + 32], &mut header.srow_x);
        LittleEndian::read_f64_into(&buf[SROW_Y..SROW_Y + 32], &mut header.srow_y);
        LittleEndian::read_f64_into(&buf[SROW_Z..SROW_Z + 32], &mut header.srow_z);
        header.slice_code = LittleEndian::read_i32(&buf[SLICE_CODE..SLICE_CODE + 4]);
        header.xyzt_units = LittleEndian::read_i32(&buf[XYZT_UNITS..XYZT_UNITS + 4]);
        header.intent_code = LittleEndian::read_i32(&buf[INTENT_CODE..INTENT_CODE + 4]);
        header.intent_name.copy_from_slice(&buf[INTENT_NAME..INTENT_NAME + 16]);
        header.dim_info = buf[DIM_INFO];

        Ok(header)
    }
}

/// Quaternion `[w, x, y, z]` of a rotation matrix, with `w >= 0`.
///
/// Uses the eigenvector method of Bar-Itzhack (2000), which tolerates small
/// deviations from orthogonality.
pub fn rotation_to_quaternion(rotation: &Matrix3<f64>) -> [f64; 4] {
    let (qxx, qyx, qzx) = (rotation[(0, 0)], rotation[(0, 1)], rotation[(0, 2)]);
    let (qxy, qyy, qzy) = (rotation[(1, 0)], rotation[(1, 1)], rotation[(1, 2)]);
    let (qxz, qyz, qzz) = (rotation[(2, 0)], rotation[(2, 1)], rotation[(2, 2)]);

    #[rustfmt::skip]
    let k = Matrix4::new(
        qxx - qyy - qzz, qyx + qxy,       qzx + qxz,       qyz - qzy,
        qyx + qxy,       qyy - qxx - qzz, qzy + qyz,       qzx - qxz,
        qzx + qxz,       qzy + qyz,       qzz - qxx - qyy, qxy - qyx,
        qyz - qzy,       qzx - qxz,       qxy - qyx,       qxx + qyy + qzz,
    ) / 3.0;

    let SymmetricEigen {
        eigenvalues,
        eigenvectors,
    } = k.symmetric_eigen();

    let mut best = 0;
    for i in 1..4 {
        if eigenvalues[i] > eigenvalues[best] {
            best = i;
        }
    }
    let v = eigenvectors.column(best);
    let quaternion = [v[3], v[0], v[1], v[2]];

    if quaternion[0] < 0.0 {
        quaternion.map(|q| -q)
    } else {
        quaternion
    }
}
