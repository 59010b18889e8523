//! JP2 box walking.
//!
//! A JP2 file is a sequence of boxes. Each box starts with an 8-byte header:
//!
//! ```text
//! Bytes 0-3: LBox (total box length, big-endian)
//! Bytes 4-7: TBox (four-character type)
//! Bytes 8-15: XLBox (only when LBox == 1; 64-bit length)
//! ```
//!
//! `LBox == 0` means the box extends to the end of its parent. Superboxes
//! (`jp2h`, `res `) contain further boxes in their payload.

use crate::error::CodestreamError;
use crate::io::{read_u32_be, read_u64_be, RangeReader};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of boxes to walk at one level (safety limit)
const MAX_BOXES: usize = 1024;

pub const BOX_JP2_HEADER: [u8; 4] = *b"jp2h";
pub const BOX_CODESTREAM: [u8; 4] = *b"jp2c";
pub const BOX_RESOLUTION: [u8; 4] = *b"res ";
pub const BOX_CAPTURE_RESOLUTION: [u8; 4] = *b"resc";
pub const BOX_DISPLAY_RESOLUTION: [u8; 4] = *b"resd";
pub const BOX_UUID: [u8; 4] = *b"uuid";

// =============================================================================
// Jp2Box
// =============================================================================

/// Location of one box inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jp2Box {
    /// Four-character box type
    pub box_type: [u8; 4],

    /// Offset of the box header in the file
    pub offset: u64,

    /// Header size (8 or 16 bytes)
    pub header_len: u64,

    /// Total box length including the header
    pub length: u64,
}

impl Jp2Box {
    /// Box type as text, for logs and errors.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.box_type).into_owned()
    }

    /// Offset of the payload.
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_len
    }

    /// Payload length.
    pub fn data_len(&self) -> u64 {
        self.length - self.header_len
    }

    /// Read the whole payload.
    pub fn read_data<R: RangeReader>(&self, reader: &R) -> Result<bytes::Bytes, CodestreamError> {
        Ok(reader.read_exact_at(self.data_offset(), self.data_len() as usize)?)
    }
}

/// Walk the boxes found between `start` and `end`.
pub fn read_boxes<R: RangeReader>(
    reader: &R,
    start: u64,
    end: u64,
) -> Result<Vec<Jp2Box>, CodestreamError> {
    let mut boxes = Vec::new();
    let mut offset = start;

    while offset + 8 <= end {
        if boxes.len() >= MAX_BOXES {
            return Err(CodestreamError::MalformedBox {
                name: "?".to_string(),
                offset,
                message: format!("more than {} boxes", MAX_BOXES),
            });
        }

        let header = reader.read_exact_at(offset, 8)?;
        let lbox = read_u32_be(&header[0..4]) as u64;
        let mut box_type = [0u8; 4];
        box_type.copy_from_slice(&header[4..8]);

        let (header_len, length) = match lbox {
            0 => (8, end - offset),
            1 => {
                let xl = reader.read_exact_at(offset + 8, 8)?;
                (16, read_u64_be(&xl))
            }
            _ => (8, lbox),
        };

        if length < header_len || offset + length > end {
            return Err(CodestreamError::MalformedBox {
                name: String::from_utf8_lossy(&box_type).into_owned(),
                offset,
                message: format!("length {} exceeds parent (ends at {})", length, end),
            });
        }

        boxes.push(Jp2Box {
            box_type,
            offset,
            header_len,
            length,
        });
        offset += length;
    }

    Ok(boxes)
}

/// Walk the children of a superbox.
pub fn read_children<R: RangeReader>(
    reader: &R,
    parent: &Jp2Box,
) -> Result<Vec<Jp2Box>, CodestreamError> {
    read_boxes(reader, parent.data_offset(), parent.offset + parent.length)
}

/// First box of the given type.
pub fn find_box<'a>(boxes: &'a [Jp2Box], box_type: &[u8; 4]) -> Option<&'a Jp2Box> {
    boxes.iter().find(|b| &b.box_type == box_type)
}
