//! JPEG 2000 level reader backed by OpenJPEG.
//!
//! Geometry (level shapes, element type, level count) comes from our own
//! main-header parser so it is known without decoding anything. Pixel data
//! is decoded on demand through the `jpeg2k` bindings, one region at a time:
//!
//! ```text
//! (level, rows, cols) ──► reference-grid area ──► decode(reduce = level)
//!                                                      │
//!            Region [C, rows, cols] (C order) ◄────────┘
//! ```

use std::ops::Range;
use std::path::{Path, PathBuf};

use jpeg2k::{DecodeArea, DecodeParameters, Image};
use tracing::debug;

use crate::array::{DataType, Region};
use crate::error::CodestreamError;
use crate::format::detect::{detect_format, CodestreamFormat};
use crate::format::jp2::{locate_codestream, CodestreamInfo};
use crate::io::FileRangeReader;

use super::{check_region, LevelReader};

// =============================================================================
// Jp2kReader
// =============================================================================

/// Level reader for a JP2 or J2K file on disk.
#[derive(Debug, Clone)]
pub struct Jp2kReader {
    path: PathBuf,
    format: CodestreamFormat,
    info: CodestreamInfo,
    dtype: DataType,
}

impl Jp2kReader {
    /// Open a file and parse its codestream header.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened
    /// - `InvalidSignature` if it is not JPEG 2000
    /// - `Unsupported` if its components cannot share one array
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CodestreamError> {
        let path = path.as_ref().to_path_buf();
        let reader = FileRangeReader::open(&path)?;

        let format = detect_format(&reader)?;
        let (offset, _) = locate_codestream(&reader, format)?;
        let info = CodestreamInfo::read(&reader, offset)?;
        info.validate()?;
        let dtype = info.dtype()?;

        debug!(
            "Opened {} ({}): {} levels, {} components, {}",
            path.display(),
            format.name(),
            info.level_count(),
            info.components.len(),
            dtype.name()
        );

        Ok(Self {
            path,
            format,
            info,
            dtype,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container format.
    pub fn format(&self) -> CodestreamFormat {
        self.format
    }

    /// Parsed main header.
    pub fn info(&self) -> &CodestreamInfo {
        &self.info
    }

    fn decode_error(level: usize, message: impl ToString) -> CodestreamError {
        CodestreamError::Decode {
            level,
            message: message.to_string(),
        }
    }
}

impl LevelReader for Jp2kReader {
    fn level_count(&self) -> usize {
        self.info.level_count()
    }

    fn level_shape(&self, level: usize) -> Option<Vec<u64>> {
        self.info.level_shape(level)
    }

    fn dtype(&self) -> DataType {
        self.dtype
    }

    fn has_channel(&self) -> bool {
        self.info.has_channel()
    }

    fn read_region(
        &self,
        level: usize,
        rows: Range<u64>,
        cols: Range<u64>,
    ) -> Result<Region, CodestreamError> {
        let shape = check_region(
            level,
            self.level_count(),
            self.level_shape(level),
            &rows,
            &cols,
        )?;

        let mut out_shape = shape;
        let ndim = out_shape.len();
        out_shape[ndim - 2] = rows.end - rows.start;
        out_shape[ndim - 1] = cols.end - cols.start;

        if rows.is_empty() || cols.is_empty() {
            return Ok(Region::zeros(self.dtype, out_shape));
        }

        let (x0, y0, x1, y1) = self.info.reference_area(level, &rows, &cols);
        debug!(
            "Decoding level {} rows {:?} cols {:?} (area {},{} - {},{})",
            level, rows, cols, x0, y0, x1, y1
        );

        let params = DecodeParameters::new()
            .reduce(level as u32)
            .decode_area(Some(DecodeArea::new(x0, y0, x1, y1)));
        let image = Image::from_file_with(&self.path, params)
            .map_err(|e| Self::decode_error(level, e))?;

        let height = (rows.end - rows.start) as usize;
        let width = (cols.end - cols.start) as usize;
        let components = image.components();
        if components.len() != self.info.components.len() {
            return Err(Self::decode_error(
                level,
                format!(
                    "decoder returned {} components, header declares {}",
                    components.len(),
                    self.info.components.len()
                ),
            ));
        }

        let mut data = Vec::with_capacity(components.len() * height * width * self.dtype.size());
        for (index, component) in components.iter().enumerate() {
            let (w, h) = (component.width() as usize, component.height() as usize);
            if w != width || h != height {
                return Err(Self::decode_error(
                    level,
                    format!(
                        "component {} decoded as {}x{}, expected {}x{}",
                        index, w, h, width, height
                    ),
                ));
            }
            for &sample in component.data() {
                self.dtype.push_sample(sample, &mut data);
            }
        }

        Region::new(self.dtype, out_shape, data)
            .ok_or_else(|| Self::decode_error(level, "decoded sample count mismatch"))
    }
}
