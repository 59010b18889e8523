//! JPEG 2000 container and codestream structure.
//!
//! - [`boxes`] walks the JP2 box tree
//! - [`codestream`] reads the SIZ / COD marker segments of the main header
//! - [`resolution`] extracts the physical pixel size

pub mod boxes;
pub mod codestream;
pub mod resolution;

pub use boxes::{find_box, read_boxes, read_children, Jp2Box, BOX_CODESTREAM};
pub use codestream::{CodestreamInfo, ComponentInfo};
pub use resolution::{extract_pixel_size, PixelSize, XMP_UUID};

use crate::error::CodestreamError;
use crate::io::RangeReader;

use super::detect::CodestreamFormat;

/// Locate the codestream inside a file, as `(offset, length)`.
///
/// For a raw J2K file this is the whole file; for JP2 it is the payload of
/// the first `jp2c` box.
pub fn locate_codestream<R: RangeReader>(
    reader: &R,
    format: CodestreamFormat,
) -> Result<(u64, u64), CodestreamError> {
    match format {
        CodestreamFormat::J2k => Ok((0, reader.size())),
        CodestreamFormat::Jp2 => {
            let boxes = read_boxes(reader, 0, reader.size())?;
            let jp2c = find_box(&boxes, &BOX_CODESTREAM)
                .ok_or(CodestreamError::MissingBox("jp2c"))?;
            Ok((jp2c.data_offset(), jp2c.data_len()))
        }
    }
}
