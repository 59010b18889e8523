//! Format detection for JPEG 2000 inputs.
//!
//! Two containers are accepted:
//!
//! - **JP2**: box-structured file starting with the 12-byte signature box
//! - **J2K**: a bare codestream starting with the SOC marker followed by SIZ
//!
//! Anything else is rejected before any decoding is attempted.

use crate::error::CodestreamError;
use crate::io::RangeReader;

// =============================================================================
// CodestreamFormat
// =============================================================================

/// Detected container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodestreamFormat {
    /// JP2 file (boxes wrapping a codestream, may carry resolution metadata)
    Jp2,

    /// Raw J2K codestream (no boxes, no resolution metadata)
    J2k,
}

impl CodestreamFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            CodestreamFormat::Jp2 => "JP2",
            CodestreamFormat::J2k => "J2K codestream",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// The JP2 signature box: length 12, type 'jP  ', content <CR><LF><0x87><LF>.
pub const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

/// SOC marker immediately followed by the SIZ marker.
pub const J2K_SOC_SIZ: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

/// Check whether bytes start with the JP2 signature box.
pub fn is_jp2_signature(bytes: &[u8]) -> bool {
    bytes.len() >= JP2_SIGNATURE.len() && bytes[..JP2_SIGNATURE.len()] == JP2_SIGNATURE
}

/// Check whether bytes start with a J2K codestream.
pub fn is_j2k_codestream(bytes: &[u8]) -> bool {
    bytes.len() >= J2K_SOC_SIZ.len() && bytes[..J2K_SOC_SIZ.len()] == J2K_SOC_SIZ
}

/// Detect the container format of a JPEG 2000 file.
///
/// # Errors
/// * `InvalidSignature` - the file is neither JP2 nor a raw codestream
pub fn detect_format<R: RangeReader>(reader: &R) -> Result<CodestreamFormat, CodestreamError> {
    if reader.size() < J2K_SOC_SIZ.len() as u64 {
        return Err(CodestreamError::InvalidSignature {
            reason: format!("file is only {} bytes", reader.size()),
        });
    }

    let head = reader.read_at_most(0, JP2_SIGNATURE.len())?;

    if is_jp2_signature(&head) {
        Ok(CodestreamFormat::Jp2)
    } else if is_j2k_codestream(&head) {
        Ok(CodestreamFormat::J2k)
    } else {
        Err(CodestreamError::InvalidSignature {
            reason: "missing JP2 signature box and J2K SOC marker".to_string(),
        })
    }
}
