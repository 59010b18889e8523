//! Decoding tests against a real JPEG 2000 file.
//!
//! `tests/data/pattern_rgb.jp2` is an 80x60 RGB image, 8 bits per sample,
//! coded losslessly (5/3 wavelet, two decomposition levels, one tile, no
//! colour transform). Sample `(x, y)` of component `c` is
//! `(3x + 5y + 40c) mod 256`. Its `resc` box gives 10^6 pixels per meter.
//!
//! Tests verify:
//! - Level 0 decodes to the exact pattern, component-major
//! - Tiled reads at a reduced level match the whole-level decode
//! - A file conversion stores the decoded pixels and the pixel size

use std::ops::Range;
use std::path::Path;

use jp2zarr::array::{DataType, Region};
use jp2zarr::convert::{convert_file, ConvertOptions};
use jp2zarr::source::{Jp2kReader, LevelReader};
use jp2zarr::store::{ArrayStore, DirectoryStore};

const PATTERN_JP2: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/pattern_rgb.jp2");

fn pattern(channel: u64, row: u64, col: u64) -> u8 {
    ((col * 3 + row * 5 + channel * 40) % 256) as u8
}

fn open_pattern() -> Jp2kReader {
    Jp2kReader::open(Path::new(PATTERN_JP2)).unwrap()
}

/// Copy `rows` x `cols` out of a `[C, H, W]` single-byte region.
fn sub_block(region: &Region, rows: &Range<u64>, cols: &Range<u64>) -> Vec<u8> {
    let [channels, height, width] = region.shape()[..] else {
        panic!("expected a [C, H, W] region, got {:?}", region.shape());
    };
    let mut out = Vec::new();
    for c in 0..channels {
        for row in rows.clone() {
            let start = ((c * height + row) * width + cols.start) as usize;
            let end = start + (cols.end - cols.start) as usize;
            out.extend_from_slice(&region.data()[start..end]);
        }
    }
    out
}

fn spans(len: u64, step: u64) -> Vec<Range<u64>> {
    (0..len)
        .step_by(step as usize)
        .map(|start| start..(start + step).min(len))
        .collect()
}

// =============================================================================
// Jp2kReader
// =============================================================================

#[test]
fn test_fixture_levels() {
    let reader = open_pattern();
    assert_eq!(reader.level_count(), 3);
    assert_eq!(reader.dtype(), DataType::U8);
    assert!(reader.has_channel());
    assert_eq!(reader.level_shape(0), Some(vec![3, 60, 80]));
    assert_eq!(reader.level_shape(1), Some(vec![3, 30, 40]));
    assert_eq!(reader.level_shape(2), Some(vec![3, 15, 20]));
}

#[test]
fn test_full_resolution_decodes_exact_pattern() {
    let reader = open_pattern();
    let region = reader.read_region(0, 0..60, 0..80).unwrap();
    assert_eq!(region.shape(), &[3, 60, 80]);

    let expected: Vec<u8> = (0..3)
        .flat_map(|c| (0..60).flat_map(move |row| (0..80).map(move |col| pattern(c, row, col))))
        .collect();
    assert_eq!(region.data(), &expected[..]);
}

#[test]
fn test_full_resolution_window() {
    let reader = open_pattern();
    let region = reader.read_region(0, 13..29, 41..77).unwrap();
    assert_eq!(region.shape(), &[3, 16, 36]);
    assert_eq!(region.data()[0], pattern(0, 13, 41));
    assert_eq!(region.data()[16 * 36], pattern(1, 13, 41));
    assert_eq!(region.data()[3 * 16 * 36 - 1], pattern(2, 28, 76));
}

#[test]
fn test_reduced_level_keeps_even_samples_of_a_linear_ramp() {
    // The top-left of every component is a linear ramp, where the 5/3
    // low-pass band reproduces the even samples.
    let reader = open_pattern();
    let region = reader.read_region(1, 0..30, 0..40).unwrap();
    for c in 0..3u64 {
        for col in 0..6u64 {
            let index = (c * 30 * 40 + col) as usize;
            assert_eq!(region.data()[index], pattern(c, 0, col * 2), "c={} col={}", c, col);
        }
    }
}

#[test]
fn test_tiled_reads_match_whole_level_decode() {
    let reader = open_pattern();
    let whole = reader.read_region(1, 0..30, 0..40).unwrap();
    assert_eq!(whole.shape(), &[3, 30, 40]);

    for rows in spans(30, 16) {
        for cols in spans(40, 16) {
            let tile = reader.read_region(1, rows.clone(), cols.clone()).unwrap();
            assert_eq!(
                tile.shape(),
                &[3, rows.end - rows.start, cols.end - cols.start]
            );
            assert_eq!(
                tile.data(),
                &sub_block(&whole, &rows, &cols)[..],
                "rows {:?} cols {:?}",
                rows,
                cols
            );
        }
    }
}

// =============================================================================
// Conversion
// =============================================================================

#[test]
fn test_convert_fixture_tiled_and_whole_agree() {
    let dir = tempfile::tempdir().unwrap();
    let whole_out = dir.path().join("whole.ome.zarr");
    let tiled_out = dir.path().join("tiled.ome.zarr");

    let summary = convert_file(Path::new(PATTERN_JP2), &whole_out, &ConvertOptions::default())
        .unwrap();
    assert_eq!(
        summary.level_shapes,
        vec![vec![3, 60, 80], vec![3, 30, 40], vec![3, 15, 20]]
    );
    assert!((summary.pixel_size.width - 1.0).abs() < 1e-9);
    assert!((summary.pixel_size.height - 1.0).abs() < 1e-9);

    let tiled = ConvertOptions {
        chunk: 16,
        max_load: Some(16),
        ..ConvertOptions::default()
    };
    convert_file(Path::new(PATTERN_JP2), &tiled_out, &tiled).unwrap();

    let reader = open_pattern();
    let whole_store = DirectoryStore::open(&whole_out).unwrap();
    let tiled_store = DirectoryStore::open(&tiled_out).unwrap();
    for (level, shape) in summary.level_shapes.iter().enumerate() {
        let key = level.to_string();
        let origin = vec![0; shape.len()];
        let decoded = reader
            .read_region(level, 0..shape[1], 0..shape[2])
            .unwrap();

        let array = whole_store.open_array(&key).unwrap();
        let stored = whole_store.read_region(&array, &origin, shape).unwrap();
        assert_eq!(stored, decoded, "level {}", level);

        let array = tiled_store.open_array(&key).unwrap();
        assert_eq!(array.chunks(), &[3, 16, 16]);
        let stored = tiled_store.read_region(&array, &origin, shape).unwrap();
        assert_eq!(stored, decoded, "tiled level {}", level);
    }
}
