//! Parsers for JPEG 2000 inputs.
//!
//! # Format Detection
//!
//! Use [`detect::detect_format`] to identify the container of an input file.
//! Supported containers:
//!
//! - **JP2**: box-structured file; may carry XMP or resolution boxes
//! - **J2K**: bare codestream; has no physical pixel size

pub mod detect;
pub mod jp2;

pub use detect::{detect_format, is_j2k_codestream, is_jp2_signature, CodestreamFormat};
