//! Test utilities for integration tests.
//!
//! This module provides a synthetic [`LevelReader`] with deterministic
//! pixels and helpers for writing minimal JP2 / J2K files whose headers the
//! converter can parse.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use jp2zarr::array::{DataType, Region};
use jp2zarr::error::CodestreamError;
use jp2zarr::format::jp2::XMP_UUID;
use jp2zarr::source::{check_region, LevelReader};

// =============================================================================
// Synthetic Level Reader
// =============================================================================

/// Deterministic sample value of a pixel.
pub fn sample(level: usize, channel: u64, row: u64, col: u64) -> i32 {
    ((level as u64 * 97 + channel * 1009 + row * 31 + col * 7) % 65521) as i32
}

/// A multi-level image computed on the fly.
///
/// Tracks how many reads were made and the largest region requested, so
/// tests can check the writer's tiling.
pub struct SyntheticImage {
    shapes: Vec<Vec<u64>>,
    dtype: DataType,
    reads: AtomicUsize,
    largest_read: AtomicU64,
}

impl SyntheticImage {
    /// Levels halve (rounding up) the spatial dims of `shape0`.
    pub fn new(shape0: &[u64], levels: usize, dtype: DataType) -> Self {
        let ndim = shape0.len();
        let shapes = (0..levels)
            .map(|level| {
                let mut shape = shape0.to_vec();
                for extent in &mut shape[ndim - 2..] {
                    *extent = extent.div_ceil(1 << level);
                }
                shape
            })
            .collect();
        Self::with_shapes(shapes, dtype)
    }

    pub fn with_shapes(shapes: Vec<Vec<u64>>, dtype: DataType) -> Self {
        Self {
            shapes,
            dtype,
            reads: AtomicUsize::new(0),
            largest_read: AtomicU64::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Largest `rows x cols` area requested so far.
    pub fn largest_read(&self) -> u64 {
        self.largest_read.load(Ordering::SeqCst)
    }

    /// The full level, computed without touching the counters.
    pub fn expected_level(&self, level: usize) -> Region {
        let shape = &self.shapes[level];
        let ndim = shape.len();
        self.render(level, shape, 0..shape[ndim - 2], 0..shape[ndim - 1])
    }

    fn render(&self, level: usize, shape: &[u64], rows: Range<u64>, cols: Range<u64>) -> Region {
        let channels = if shape.len() == 3 { shape[0] } else { 1 };
        let mut out_shape = shape[..shape.len() - 2].to_vec();
        out_shape.push(rows.end - rows.start);
        out_shape.push(cols.end - cols.start);

        let mut data = Vec::new();
        for c in 0..channels {
            for row in rows.clone() {
                for col in cols.clone() {
                    self.dtype.push_sample(sample(level, c, row, col), &mut data);
                }
            }
        }
        Region::new(self.dtype, out_shape, data).expect("rendered region size")
    }
}

impl LevelReader for SyntheticImage {
    fn level_count(&self) -> usize {
        self.shapes.len()
    }

    fn level_shape(&self, level: usize) -> Option<Vec<u64>> {
        self.shapes.get(level).cloned()
    }

    fn dtype(&self) -> DataType {
        self.dtype
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
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.largest_read
            .fetch_max((rows.end - rows.start) * (cols.end - cols.start), Ordering::SeqCst);
        Ok(self.render(level, &shape, rows, cols))
    }
}

/// A reader whose given level always fails to decode.
pub struct FailingImage {
    pub inner: SyntheticImage,
    pub failing_level: usize,
}

impl LevelReader for FailingImage {
    fn level_count(&self) -> usize {
        self.inner.level_count()
    }

    fn level_shape(&self, level: usize) -> Option<Vec<u64>> {
        self.inner.level_shape(level)
    }

    fn dtype(&self) -> DataType {
        self.inner.dtype()
    }

    fn read_region(
        &self,
        level: usize,
        rows: Range<u64>,
        cols: Range<u64>,
    ) -> Result<Region, CodestreamError> {
        if level == self.failing_level {
            return Err(CodestreamError::Decode {
                level,
                message: "corrupt tile-part".to_string(),
            });
        }
        self.inner.read_region(level, rows, cols)
    }
}

// =============================================================================
// JPEG 2000 File Builders
// =============================================================================

/// A box with a 4-byte length header.
pub fn jp2_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

/// SOC + SIZ + COD + EOC for a single-tile image.
pub fn main_header(
    width: u32,
    height: u32,
    components: u16,
    precision: u8,
    decompositions: u8,
) -> Vec<u8> {
    let mut out = vec![0xFF, 0x4F];

    // SIZ
    out.extend_from_slice(&[0xFF, 0x51]);
    out.extend_from_slice(&(38 + 3 * components).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    for value in [width, height, 0, 0, width, height, 0, 0] {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.extend_from_slice(&components.to_be_bytes());
    for _ in 0..components {
        out.extend_from_slice(&[precision - 1, 1, 1]);
    }

    // COD
    out.extend_from_slice(&[0xFF, 0x52, 0x00, 0x0C]);
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x00]);
    out.extend_from_slice(&[decompositions, 0x04, 0x04, 0x00, 0x00]);

    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// A `resc` / `resd` box payload: `N / D * 10^E` grid points per meter.
pub fn resolution_box(box_type: &[u8; 4], vertical: (u16, u16, i8), horizontal: (u16, u16, i8)) -> Vec<u8> {
    let mut payload = Vec::with_capacity(10);
    payload.extend_from_slice(&vertical.0.to_be_bytes());
    payload.extend_from_slice(&vertical.1.to_be_bytes());
    payload.extend_from_slice(&horizontal.0.to_be_bytes());
    payload.extend_from_slice(&horizontal.1.to_be_bytes());
    payload.push(vertical.2 as u8);
    payload.push(horizontal.2 as u8);
    jp2_box(box_type, &payload)
}

/// An XMP `uuid` box with `PixelWidth` / `PixelHeight` attributes.
pub fn xmp_box(pixel_width: f64, pixel_height: f64) -> Vec<u8> {
    let xml = format!(
        r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF><rdf:Description PixelWidth="{}" PixelHeight="{}"/></rdf:RDF></x:xmpmeta>"#,
        pixel_width, pixel_height
    );
    let mut payload = XMP_UUID.to_vec();
    payload.extend_from_slice(xml.as_bytes());
    jp2_box(b"uuid", &payload)
}

/// A JP2 file: signature, `ftyp`, `jp2h` (ihdr + `res_boxes`), `extra`
/// top-level boxes, then `jp2c`.
pub fn jp2_file(codestream: &[u8], res_boxes: &[Vec<u8>], extra: &[Vec<u8>]) -> Vec<u8> {
    let mut out = jp2_box(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A]);

    let mut ftyp = b"jp2 ".to_vec();
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(b"jp2 ");
    out.extend(jp2_box(b"ftyp", &ftyp));

    let mut jp2h = jp2_box(b"ihdr", &[0u8; 14]);
    if !res_boxes.is_empty() {
        jp2h.extend(jp2_box(b"res ", &res_boxes.concat()));
    }
    out.extend(jp2_box(b"jp2h", &jp2h));

    for b in extra {
        out.extend_from_slice(b);
    }
    out.extend(jp2_box(b"jp2c", codestream));
    out
}

/// Write `bytes` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write test file");
    path
}
