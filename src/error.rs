use thiserror::Error;

/// I/O errors that can occur when reading byte ranges from an input file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Underlying read failure
    #[error("Read error on {path}: {message}")]
    Read { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found or not openable
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Errors raised while parsing or decoding a JPEG 2000 file
#[derive(Debug, Clone, Error)]
pub enum CodestreamError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Neither a JP2 signature box nor a J2K SOC marker
    #[error("Not a JPEG 2000 file: {reason}")]
    InvalidSignature { reason: String },

    /// A box header points outside its parent or is malformed
    #[error("Malformed box '{name}' at offset {offset}: {message}")]
    MalformedBox {
        name: String,
        offset: u64,
        message: String,
    },

    /// Required box is missing
    #[error("Missing required box: {0}")]
    MissingBox(&'static str),

    /// Required marker segment is missing from the main header
    #[error("Missing required marker: {0}")]
    MissingMarker(&'static str),

    /// Marker segment has an unexpected length or value
    #[error("Invalid {marker} marker: {message}")]
    InvalidMarker {
        marker: &'static str,
        message: String,
    },

    /// Valid codestream that this converter cannot represent
    #[error("Unsupported codestream: {reason}")]
    Unsupported { reason: String },

    /// Level index outside the codestream's resolution levels
    #[error("Level {level} out of range ({count} levels)")]
    LevelOutOfRange { level: usize, count: usize },

    /// Requested region exceeds the level's extent
    #[error("Region rows {rows:?} cols {cols:?} exceeds level {level} shape {shape:?}")]
    RegionOutOfBounds {
        level: usize,
        rows: (u64, u64),
        cols: (u64, u64),
        shape: Vec<u64>,
    },

    /// The decoder rejected the request
    #[error("Decode failed at level {level}: {message}")]
    Decode { level: usize, message: String },
}

/// Errors raised while extracting physical pixel size
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The file parsed but its layout could not be walked
    #[error("Codestream error: {0}")]
    Codestream(#[from] CodestreamError),

    /// No XMP pixel size and no resolution box
    #[error("No resolution metadata found in {source_path}")]
    MissingResolution { source_path: String },

    /// A resolution field exists but holds an unusable value
    #[error("Invalid resolution field {field}: {message}")]
    InvalidResolution {
        field: &'static str,
        message: String,
    },
}

/// Errors raised by the chunked array store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Filesystem failure (unwritable destination, disk full, ...)
    #[error("Store I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Chunk encoding or storage failure reported by `zarrs`
    #[error("Zarr error on '{key}': {message}")]
    Zarr { key: String, message: String },

    /// Region does not fit inside the array
    #[error("Region at {offset:?} with shape {shape:?} exceeds array '{key}' shape {array_shape:?}")]
    RegionOutOfBounds {
        key: String,
        offset: Vec<u64>,
        shape: Vec<u64>,
        array_shape: Vec<u64>,
    },

    /// Region element type differs from the array's
    #[error("Data type mismatch for array '{key}': expected {expected}, got {actual}")]
    DtypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Array key not present in the store
    #[error("Array not found: {0}")]
    MissingArray(String),

    /// Stored metadata could not be parsed or is inconsistent
    #[error("Invalid metadata for '{key}': {message}")]
    InvalidMetadata { key: String, message: String },
}

/// Errors in user-provided configuration, raised before any side effect
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Compressor options are not a JSON object or hold unknown/invalid keys
    #[error("Invalid compressor options for {compressor}: {message}")]
    InvalidCompressorOptions {
        compressor: &'static str,
        message: String,
    },

    /// Orientation is neither a known alias nor a valid axis code
    #[error("Invalid orientation '{value}': {message}")]
    InvalidOrientation { value: String, message: String },

    /// Numeric option out of its accepted range
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Errors raised while assembling the NIfTI header
#[derive(Debug, Clone, Error)]
pub enum HeaderError {
    /// NIfTI supports at most 7 data dimensions
    #[error("Too many dimensions for a NIfTI header: {0} (max 7)")]
    TooManyDimensions(usize),

    /// Affine cannot be expressed as a qform
    #[error("Degenerate affine: {0}")]
    DegenerateAffine(String),

    /// Input bytes are not a NIfTI-2 header
    #[error("Invalid NIfTI-2 header: {0}")]
    InvalidHeader(String),
}

/// Top-level conversion error
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Codestream error: {0}")]
    Codestream(#[from] CodestreamError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    /// Reading a level (or a tile of it) from the decoder failed
    #[error("Failed to read level {level}: {source}")]
    ReadLevel {
        level: usize,
        #[source]
        source: CodestreamError,
    },

    /// Creating or writing a level's array failed
    #[error("Failed to write level {level}: {source}")]
    WriteLevel {
        level: usize,
        #[source]
        source: StoreError,
    },
}
