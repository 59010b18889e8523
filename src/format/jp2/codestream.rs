//! J2K main-header parsing.
//!
//! Only the two marker segments the converter needs are decoded:
//!
//! ```text
//! SIZ (0xFF51): image and tile extent on the reference grid, components
//!   Lsiz(2) Rsiz(2) Xsiz(4) Ysiz(4) XOsiz(4) YOsiz(4)
//!   XTsiz(4) YTsiz(4) XTOsiz(4) YTOsiz(4) Csiz(2) {Ssiz(1) XRsiz(1) YRsiz(1)}*Csiz
//!
//! COD (0xFF52): default coding style
//!   Lcod(2) Scod(1) Progression(1) Layers(2) MCT(1) Decompositions(1) ...
//! ```
//!
//! Parsing stops at the first SOT (start of tile-part), which ends the main
//! header. Every other marker segment is skipped by its length.

use std::ops::Range;

use crate::array::DataType;
use crate::error::CodestreamError;
use crate::io::{read_u16_be, read_u32_be, RangeReader};

// =============================================================================
// Constants
// =============================================================================

const MARKER_SOC: u16 = 0xFF4F;
const MARKER_SIZ: u16 = 0xFF51;
const MARKER_COD: u16 = 0xFF52;
const MARKER_SOT: u16 = 0xFF90;
const MARKER_SOD: u16 = 0xFF93;
const MARKER_EOC: u16 = 0xFFD9;

/// Fixed part of the SIZ segment, including Lsiz
const SIZ_FIXED_LEN: usize = 38;

/// Minimum COD segment length
const COD_MIN_LEN: usize = 12;

/// Safety limit on main-header marker segments
const MAX_MARKERS: usize = 4096;

// =============================================================================
// ComponentInfo
// =============================================================================

/// Per-component description from the SIZ marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Bit depth (1-38)
    pub precision: u32,

    /// Whether samples are signed
    pub signed: bool,

    /// Horizontal sub-sampling factor
    pub dx: u8,

    /// Vertical sub-sampling factor
    pub dy: u8,
}

// =============================================================================
// CodestreamInfo
// =============================================================================

/// Geometry and layout of a codestream, read from its main header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodestreamInfo {
    /// Xsiz: right edge of the image area on the reference grid
    pub x_end: u32,

    /// Ysiz: bottom edge of the image area on the reference grid
    pub y_end: u32,

    /// XOsiz: horizontal image offset
    pub x_offset: u32,

    /// YOsiz: vertical image offset
    pub y_offset: u32,

    /// Components in codestream order
    pub components: Vec<ComponentInfo>,

    /// Number of wavelet decomposition levels (COD SPcod)
    pub decomposition_levels: u8,
}

impl CodestreamInfo {
    /// Parse the main header of the codestream starting at `offset`.
    ///
    /// # Errors
    /// - `InvalidSignature` if the codestream does not start with SOC
    /// - `MissingMarker` if SIZ or COD is absent from the main header
    /// - `InvalidMarker` if a segment is truncated or inconsistent
    pub fn read<R: RangeReader>(reader: &R, offset: u64) -> Result<Self, CodestreamError> {
        let soc = reader.read_exact_at(offset, 2)?;
        if read_u16_be(&soc) != MARKER_SOC {
            return Err(CodestreamError::InvalidSignature {
                reason: format!("no SOC marker at offset {}", offset),
            });
        }

        let mut siz = None;
        let mut cod = None;
        let mut pos = offset + 2;

        for _ in 0..MAX_MARKERS {
            let head = reader.read_exact_at(pos, 4)?;
            let marker = read_u16_be(&head[0..2]);

            if matches!(marker, MARKER_SOT | MARKER_SOD | MARKER_EOC) {
                break;
            }
            if marker >> 8 != 0xFF {
                return Err(CodestreamError::InvalidMarker {
                    marker: "main header",
                    message: format!("expected a marker at offset {}, got 0x{:04X}", pos, marker),
                });
            }

            let seg_len = read_u16_be(&head[2..4]) as usize;
            if seg_len < 2 {
                return Err(CodestreamError::InvalidMarker {
                    marker: "main header",
                    message: format!("segment 0x{:04X} has length {}", marker, seg_len),
                });
            }

            match marker {
                MARKER_SIZ if siz.is_none() => {
                    siz = Some(reader.read_exact_at(pos + 2, seg_len)?);
                }
                MARKER_COD if cod.is_none() => {
                    cod = Some(reader.read_exact_at(pos + 2, seg_len)?);
                }
                _ => {}
            }

            if siz.is_some() && cod.is_some() {
                break;
            }
            pos += 2 + seg_len as u64;
        }

        let siz = siz.ok_or(CodestreamError::MissingMarker("SIZ"))?;
        let cod = cod.ok_or(CodestreamError::MissingMarker("COD"))?;

        let mut info = Self::parse_siz(&siz)?;
        info.decomposition_levels = Self::parse_cod(&cod)?;
        Ok(info)
    }

    /// Parse a SIZ segment body (starting at Lsiz).
    fn parse_siz(seg: &[u8]) -> Result<Self, CodestreamError> {
        if seg.len() < SIZ_FIXED_LEN {
            return Err(CodestreamError::InvalidMarker {
                marker: "SIZ",
                message: format!("segment is {} bytes, need {}", seg.len(), SIZ_FIXED_LEN),
            });
        }

        let x_end = read_u32_be(&seg[4..8]);
        let y_end = read_u32_be(&seg[8..12]);
        let x_offset = read_u32_be(&seg[12..16]);
        let y_offset = read_u32_be(&seg[16..20]);
        let num_components = read_u16_be(&seg[36..38]) as usize;

        if x_offset >= x_end || y_offset >= y_end {
            return Err(CodestreamError::InvalidMarker {
                marker: "SIZ",
                message: format!(
                    "empty image area ({}, {})..({}, {})",
                    x_offset, y_offset, x_end, y_end
                ),
            });
        }

        let expected = SIZ_FIXED_LEN + 3 * num_components;
        if num_components == 0 || seg.len() < expected {
            return Err(CodestreamError::InvalidMarker {
                marker: "SIZ",
                message: format!(
                    "{} components need {} bytes, segment has {}",
                    num_components,
                    expected,
                    seg.len()
                ),
            });
        }

        let components = seg[SIZ_FIXED_LEN..expected]
            .chunks_exact(3)
            .map(|c| ComponentInfo {
                precision: (c[0] & 0x7F) as u32 + 1,
                signed: c[0] & 0x80 != 0,
                dx: c[1],
                dy: c[2],
            })
            .collect();

        Ok(Self {
            x_end,
            y_end,
            x_offset,
            y_offset,
            components,
            decomposition_levels: 0,
        })
    }

    /// Parse a COD segment body and return the decomposition level count.
    fn parse_cod(seg: &[u8]) -> Result<u8, CodestreamError> {
        if seg.len() < COD_MIN_LEN {
            return Err(CodestreamError::InvalidMarker {
                marker: "COD",
                message: format!("segment is {} bytes, need {}", seg.len(), COD_MIN_LEN),
            });
        }
        let levels = seg[7];
        if levels > 32 {
            return Err(CodestreamError::InvalidMarker {
                marker: "COD",
                message: format!("{} decomposition levels (max 32)", levels),
            });
        }
        Ok(levels)
    }

    /// Check the layout is one the converter can repackage.
    ///
    /// All components must share precision, signedness and full resolution.
    pub fn validate(&self) -> Result<(), CodestreamError> {
        let first = self.components[0];
        for (index, component) in self.components.iter().enumerate() {
            if component.dx != 1 || component.dy != 1 {
                return Err(CodestreamError::Unsupported {
                    reason: format!(
                        "component {} is sub-sampled ({}x{})",
                        index, component.dx, component.dy
                    ),
                });
            }
            if component.precision != first.precision || component.signed != first.signed {
                return Err(CodestreamError::Unsupported {
                    reason: format!("component {} differs in precision or sign", index),
                });
            }
        }
        DataType::from_precision(first.precision, first.signed)?;
        Ok(())
    }

    /// Number of resolution levels (decompositions + 1).
    pub fn level_count(&self) -> usize {
        self.decomposition_levels as usize + 1
    }

    /// Whether the image has more than one component.
    pub fn has_channel(&self) -> bool {
        self.components.len() > 1
    }

    /// Element type of the decoded samples.
    pub fn dtype(&self) -> Result<DataType, CodestreamError> {
        let first = self.components[0];
        DataType::from_precision(first.precision, first.signed)
    }

    /// `(height, width)` of a resolution level.
    ///
    /// Follows the reference-grid rule `ceil(end / 2^r) - ceil(offset / 2^r)`.
    pub fn level_extent(&self, level: usize) -> Option<(u64, u64)> {
        if level >= self.level_count() {
            return None;
        }
        let height = ceil_shift(self.y_end, level) - ceil_shift(self.y_offset, level);
        let width = ceil_shift(self.x_end, level) - ceil_shift(self.x_offset, level);
        Some((height, width))
    }

    /// Channel-first shape of a resolution level.
    pub fn level_shape(&self, level: usize) -> Option<Vec<u64>> {
        let (height, width) = self.level_extent(level)?;
        let mut shape = Vec::with_capacity(3);
        if self.has_channel() {
            shape.push(self.components.len() as u64);
        }
        shape.push(height);
        shape.push(width);
        Some(shape)
    }

    /// Map a level-relative pixel region to the reference-grid area the
    /// decoder expects, as `(x0, y0, x1, y1)`.
    ///
    /// Decoding that area at reduce factor `level` yields exactly
    /// `rows.len() x cols.len()` samples.
    pub fn reference_area(
        &self,
        level: usize,
        rows: &Range<u64>,
        cols: &Range<u64>,
    ) -> (u32, u32, u32, u32) {
        let origin_x = ceil_shift(self.x_offset, level);
        let origin_y = ceil_shift(self.y_offset, level);

        let to_grid = |origin: u64, index: u64, lo: u32, hi: u32| -> u32 {
            let value = (origin + index) << level;
            value.clamp(lo as u64, hi as u64) as u32
        };

        (
            to_grid(origin_x, cols.start, self.x_offset, self.x_end),
            to_grid(origin_y, rows.start, self.y_offset, self.y_end),
            to_grid(origin_x, cols.end, self.x_offset, self.x_end),
            to_grid(origin_y, rows.end, self.y_offset, self.y_end),
        )
    }
}

/// `ceil(value / 2^shift)`
#[inline]
fn ceil_shift(value: u32, shift: usize) -> u64 {
    let value = value as u64;
    (value + (1u64 << shift) - 1) >> shift
}
