//! Physical pixel size extraction.
//!
//! Pixel size is looked up, in order, in:
//!
//! 1. An XMP `uuid` box carrying `PixelWidth` / `PixelHeight` (micrometers),
//!    as written by MBF Neurolucida
//! 2. The capture resolution box (`jp2h/res /resc`)
//! 3. The display resolution box (`jp2h/res /resd`)
//!
//! Resolution boxes store grid points per meter as `N / D * 10^E`:
//!
//! ```text
//! VR_N(2) VR_D(2) HR_N(2) HR_D(2) VR_E(1, signed) HR_E(1, signed)
//! ```
//!
//! A file with none of these is an error: every derived transform depends on
//! the pixel size, so there is no safe default.

use tracing::{debug, warn};

use crate::error::{CodestreamError, MetadataError};
use crate::format::detect::{detect_format, CodestreamFormat};
use crate::io::{read_u16_be, RangeReader};

use super::boxes::{
    find_box, read_boxes, read_children, Jp2Box, BOX_CAPTURE_RESOLUTION, BOX_DISPLAY_RESOLUTION,
    BOX_JP2_HEADER, BOX_RESOLUTION, BOX_UUID,
};

// =============================================================================
// Constants
// =============================================================================

/// UUID identifying an XMP packet in a `uuid` box.
pub const XMP_UUID: [u8; 16] = [
    0xBE, 0x7A, 0xCF, 0xCB, 0x97, 0xA9, 0x42, 0xE8, 0x9C, 0x71, 0x99, 0x94, 0x91, 0xE3, 0xAF, 0xAC,
];

/// Largest XMP payload we are willing to scan.
const MAX_XMP_BYTES: usize = 1024 * 1024;

/// Size of a `resc` / `resd` payload.
const RESOLUTION_BOX_LEN: usize = 10;

const MICROMETERS_PER_METER: f64 = 1e6;

// =============================================================================
// PixelSize
// =============================================================================

/// Physical size of one pixel in micrometers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSize {
    /// Size along the horizontal (x) image axis
    pub width: f64,

    /// Size along the vertical (y) image axis
    pub height: f64,
}

impl PixelSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Read the physical pixel size of a JPEG 2000 file.
///
/// # Errors
/// - `MissingResolution` if neither XMP nor a resolution box is present
/// - `InvalidResolution` if a present value is unusable
pub fn extract_pixel_size<R: RangeReader>(reader: &R) -> Result<PixelSize, MetadataError> {
    if detect_format(reader)? == CodestreamFormat::J2k {
        return Err(MetadataError::MissingResolution {
            source_path: reader.identifier().to_string(),
        });
    }

    let top = read_boxes(reader, 0, reader.size())?;

    for uuid_box in top.iter().filter(|b| b.box_type == BOX_UUID) {
        if let Some(size) = pixel_size_from_uuid_box(reader, uuid_box)? {
            debug!("Pixel size from XMP: {:?}", size);
            return Ok(size);
        }
    }

    if let Some(header) = find_box(&top, &BOX_JP2_HEADER) {
        let children = read_children(reader, header)?;
        if let Some(res) = find_box(&children, &BOX_RESOLUTION) {
            let res_children = read_children(reader, res)?;
            for (box_type, field) in [
                (BOX_CAPTURE_RESOLUTION, "resc"),
                (BOX_DISPLAY_RESOLUTION, "resd"),
            ] {
                if let Some(res_box) = find_box(&res_children, &box_type) {
                    let data = res_box.read_data(reader)?;
                    let size = pixel_size_from_resolution_box(&data, field)?;
                    debug!("Pixel size from {} box: {:?}", field, size);
                    return Ok(size);
                }
            }
        }
    }

    Err(MetadataError::MissingResolution {
        source_path: reader.identifier().to_string(),
    })
}

/// Inspect one `uuid` box; `None` if it is not XMP or lacks pixel sizes.
fn pixel_size_from_uuid_box<R: RangeReader>(
    reader: &R,
    uuid_box: &Jp2Box,
) -> Result<Option<PixelSize>, MetadataError> {
    if uuid_box.data_len() < XMP_UUID.len() as u64 {
        return Ok(None);
    }
    let uuid = reader
        .read_exact_at(uuid_box.data_offset(), XMP_UUID.len())
        .map_err(CodestreamError::from)?;
    if uuid[..] != XMP_UUID {
        return Ok(None);
    }

    let payload_len = (uuid_box.data_len() as usize - XMP_UUID.len()).min(MAX_XMP_BYTES);
    let payload = reader
        .read_exact_at(uuid_box.data_offset() + XMP_UUID.len() as u64, payload_len)
        .map_err(CodestreamError::from)?;
    let xmp = String::from_utf8_lossy(&payload);

    pixel_size_from_xmp(&xmp)
}

/// Read `PixelWidth` / `PixelHeight` from an XMP packet.
pub fn pixel_size_from_xmp(xmp: &str) -> Result<Option<PixelSize>, MetadataError> {
    let width = xmp_value(xmp, "PixelWidth");
    let height = xmp_value(xmp, "PixelHeight");

    match (width, height) {
        (Some(width), Some(height)) => Ok(Some(PixelSize {
            width: parse_positive("PixelWidth", width)?,
            height: parse_positive("PixelHeight", height)?,
        })),
        (None, None) => Ok(None),
        _ => {
            warn!("XMP packet has only one of PixelWidth/PixelHeight, ignoring it");
            Ok(None)
        }
    }
}

/// Convert a `resc` / `resd` payload to a pixel size.
pub fn pixel_size_from_resolution_box(
    data: &[u8],
    field: &'static str,
) -> Result<PixelSize, MetadataError> {
    if data.len() < RESOLUTION_BOX_LEN {
        return Err(MetadataError::InvalidResolution {
            field,
            message: format!("payload is {} bytes, need {}", data.len(), RESOLUTION_BOX_LEN),
        });
    }

    let vertical = grid_points_per_meter(
        read_u16_be(&data[0..2]),
        read_u16_be(&data[2..4]),
        data[8] as i8,
    );
    let horizontal = grid_points_per_meter(
        read_u16_be(&data[4..6]),
        read_u16_be(&data[6..8]),
        data[9] as i8,
    );

    let to_micrometers = |ppm: Option<f64>, axis: &str| -> Result<f64, MetadataError> {
        match ppm {
            Some(ppm) if ppm.is_finite() && ppm > 0.0 => Ok(MICROMETERS_PER_METER / ppm),
            _ => Err(MetadataError::InvalidResolution {
                field,
                message: format!("{} resolution is zero or undefined", axis),
            }),
        }
    };

    Ok(PixelSize {
        width: to_micrometers(horizontal, "horizontal")?,
        height: to_micrometers(vertical, "vertical")?,
    })
}

#[inline]
fn grid_points_per_meter(numerator: u16, denominator: u16, exponent: i8) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64 * 10f64.powi(exponent as i32))
}

fn parse_positive(field: &'static str, value: &str) -> Result<f64, MetadataError> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| MetadataError::InvalidResolution {
            field,
            message: format!("'{}' is not a number", value),
        })?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(MetadataError::InvalidResolution {
            field,
            message: format!("{} is not a positive size", parsed),
        });
    }
    Ok(parsed)
}

/// Find the value of an XMP property given either as an attribute
/// (`name="value"`) or as an element (`<ns:name>value</ns:name>`).
fn xmp_value<'a>(xmp: &'a str, name: &str) -> Option<&'a str> {
    let mut search = 0;

    while let Some(found) = xmp[search..].find(name) {
        let start = search + found;
        let end = start + name.len();
        search = end;

        let before = xmp[..start].chars().next_back();
        if matches!(before, Some(c) if c.is_alphanumeric() || c == '_') {
            continue;
        }

        let rest = xmp[end..].trim_start();
        if let Some(rest) = rest.strip_prefix('=') {
            let rest = rest.trim_start();
            let quote = match rest.chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => continue,
            };
            let body = &rest[1..];
            if let Some(close) = body.find(quote) {
                return Some(body[..close].trim());
            }
        } else if let Some(rest) = rest.strip_prefix('>') {
            if let Some(close) = rest.find('<') {
                return Some(rest[..close].trim());
            }
        }
    }

    None
}
