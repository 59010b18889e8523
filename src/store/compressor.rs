//! Chunk compressors and their numcodecs configuration.
//!
//! User-supplied compressor options arrive as a JSON object and are parsed
//! into a typed record per codec. Unknown keys are rejected, so a typo never
//! silently falls back to a default. Chunks are encoded by `zarrs` from the
//! `.zarray` entry this module produces.
//!
//! | Compressor | `.zarray` `compressor` entry                                        |
//! |------------|---------------------------------------------------------------------|
//! | `blosc`    | `{"id":"blosc","cname":"lz4","clevel":5,"shuffle":1,"blocksize":0}` |
//! | `zlib`     | `{"id":"zlib","level":1}`                                           |
//! | `raw`      | `null`                                                              |

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Options
// =============================================================================

const DEFAULT_BLOSC_CNAME: &str = "lz4";
const DEFAULT_BLOSC_CLEVEL: u32 = 5;
const DEFAULT_BLOSC_SHUFFLE: u8 = 1;
const DEFAULT_ZLIB_LEVEL: u32 = 1;

/// Inner codecs of a Blosc frame.
pub const BLOSC_CNAMES: [&str; 5] = ["blosclz", "lz4", "lz4hc", "zlib", "zstd"];

/// Options of the `blosc` compressor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BloscOptions {
    /// Inner codec, one of [`BLOSC_CNAMES`]
    pub cname: String,

    /// Compression level 0-9
    pub clevel: u32,

    /// 0 = no shuffle, 1 = byte shuffle, 2 = bit shuffle
    pub shuffle: u8,

    /// Block size in bytes, 0 for automatic
    pub blocksize: usize,
}

impl Default for BloscOptions {
    fn default() -> Self {
        Self {
            cname: DEFAULT_BLOSC_CNAME.to_string(),
            clevel: DEFAULT_BLOSC_CLEVEL,
            shuffle: DEFAULT_BLOSC_SHUFFLE,
            blocksize: 0,
        }
    }
}

impl BloscOptions {
    fn validate(&self) -> Result<(), String> {
        if !BLOSC_CNAMES.contains(&self.cname.as_str()) {
            return Err(format!(
                "cname '{}' is not one of {}",
                self.cname,
                BLOSC_CNAMES.join(", ")
            ));
        }
        if self.clevel > 9 {
            return Err(format!("clevel must be 0-9, got {}", self.clevel));
        }
        if self.shuffle > 2 {
            return Err(format!(
                "shuffle must be 0 (none), 1 (byte) or 2 (bit), got {}",
                self.shuffle
            ));
        }
        Ok(())
    }
}

/// Options of the `zlib` compressor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZlibOptions {
    /// Compression level 0-9
    pub level: u32,
}

impl Default for ZlibOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_ZLIB_LEVEL,
        }
    }
}

impl ZlibOptions {
    fn validate(&self) -> Result<(), String> {
        if self.level > 9 {
            return Err(format!("level must be 0-9, got {}", self.level));
        }
        Ok(())
    }
}

// =============================================================================
// Compressor
// =============================================================================

/// Compressor families selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorKind {
    Blosc,
    Zlib,
    Raw,
}

impl CompressorKind {
    pub const fn name(&self) -> &'static str {
        match self {
            CompressorKind::Blosc => "blosc",
            CompressorKind::Zlib => "zlib",
            CompressorKind::Raw => "raw",
        }
    }
}

/// A configured chunk compressor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Compressor {
    Blosc(BloscOptions),
    Zlib(ZlibOptions),
    #[default]
    Raw,
}

/// The numcodecs representation stored in `.zarray`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum CompressorMetadata {
    Blosc(BloscOptions),
    Zlib(ZlibOptions),
}

impl Compressor {
    /// Build a compressor from its kind and a JSON object of options.
    ///
    /// # Errors
    /// Returns `InvalidCompressorOptions` if `options` is not a JSON object,
    /// holds a key the compressor does not know, or a value out of range.
    /// `raw` accepts only an empty object.
    pub fn from_options(kind: CompressorKind, options: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidCompressorOptions {
            compressor: kind.name(),
            message,
        };

        let value: serde_json::Value =
            serde_json::from_str(options).map_err(|e| invalid(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| invalid(format!("expected a JSON object, got {}", value)))?;

        match kind {
            CompressorKind::Blosc => {
                let opts: BloscOptions =
                    serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;
                opts.validate().map_err(invalid)?;
                Ok(Compressor::Blosc(opts))
            }
            CompressorKind::Zlib => {
                let opts: ZlibOptions =
                    serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;
                opts.validate().map_err(invalid)?;
                Ok(Compressor::Zlib(opts))
            }
            CompressorKind::Raw => {
                if let Some(key) = object.keys().next() {
                    return Err(invalid(format!("takes no options, got '{}'", key)));
                }
                Ok(Compressor::Raw)
            }
        }
    }

    /// Default-configured compressor of the given kind.
    pub fn with_defaults(kind: CompressorKind) -> Self {
        match kind {
            CompressorKind::Blosc => Compressor::Blosc(BloscOptions::default()),
            CompressorKind::Zlib => Compressor::Zlib(ZlibOptions::default()),
            CompressorKind::Raw => Compressor::Raw,
        }
    }

    pub fn kind(&self) -> CompressorKind {
        match self {
            Compressor::Blosc(_) => CompressorKind::Blosc,
            Compressor::Zlib(_) => CompressorKind::Zlib,
            Compressor::Raw => CompressorKind::Raw,
        }
    }

    /// The `.zarray` representation; `None` serializes as `null`.
    pub fn to_metadata(&self) -> Option<CompressorMetadata> {
        match self {
            Compressor::Blosc(opts) => Some(CompressorMetadata::Blosc(opts.clone())),
            Compressor::Zlib(opts) => Some(CompressorMetadata::Zlib(opts.clone())),
            Compressor::Raw => None,
        }
    }

    pub fn from_metadata(metadata: Option<CompressorMetadata>) -> Self {
        match metadata {
            Some(CompressorMetadata::Blosc(opts)) => Compressor::Blosc(opts),
            Some(CompressorMetadata::Zlib(opts)) => Compressor::Zlib(opts),
            None => Compressor::Raw,
        }
    }
}
