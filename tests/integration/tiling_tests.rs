//! Tiling equivalence tests.
//!
//! Tests verify:
//! - Tiled and whole-plane copies produce byte-identical stores
//! - Tiles that cut through chunks are merged correctly with compression
//! - No single decode exceeds `max_load x max_load` pixels

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use jp2zarr::array::DataType;
use jp2zarr::convert::{convert, ConvertOptions};
use jp2zarr::format::jp2::PixelSize;
use jp2zarr::store::{Compressor, CompressorKind, DirectoryStore};

use super::test_utils::SyntheticImage;

/// Every file of a store, keyed by its relative path.
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let key = path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                files.insert(key, fs::read(&path).unwrap());
            }
        }
    }
    files
}

fn convert_into(
    root: &Path,
    image: &SyntheticImage,
    compressor: Compressor,
    chunk: u64,
    max_load: Option<u64>,
) -> BTreeMap<String, Vec<u8>> {
    let store = DirectoryStore::create(root).unwrap();
    let options = ConvertOptions {
        chunk,
        compressor,
        max_load,
        nifti: None,
    };
    convert(image, &store, PixelSize::new(0.5, 0.5), &options).unwrap();
    snapshot(root)
}

// =============================================================================
// Equivalence
// =============================================================================

#[test]
fn test_tiled_output_matches_single_pass() {
    let dir = tempfile::tempdir().unwrap();

    let whole = SyntheticImage::new(&[3, 5000, 7000], 1, DataType::U8);
    let a = convert_into(
        &dir.path().join("a.zarr"),
        &whole,
        Compressor::Raw,
        1024,
        Some(16384),
    );
    assert_eq!(whole.read_count(), 1);

    let tiled = SyntheticImage::new(&[3, 5000, 7000], 1, DataType::U8);
    let b = convert_into(
        &dir.path().join("b.zarr"),
        &tiled,
        Compressor::Raw,
        1024,
        Some(2048),
    );
    assert_eq!(tiled.read_count(), 12);
    assert!(tiled.largest_read() <= 2048 * 2048);

    assert_eq!(a.len(), b.len());
    assert_eq!(a, b);
    assert!(a.contains_key("0/0/4/6"));
}

#[test]
fn test_unaligned_tiles_with_blosc() {
    let dir = tempfile::tempdir().unwrap();
    let blosc = Compressor::with_defaults(CompressorKind::Blosc);

    let whole = SyntheticImage::new(&[3, 500, 700], 3, DataType::U16);
    let a = convert_into(&dir.path().join("a.zarr"), &whole, blosc.clone(), 128, None);

    // 100 is not a multiple of 128: every tile edge cuts through chunks
    let tiled = SyntheticImage::new(&[3, 500, 700], 3, DataType::U16);
    let b = convert_into(&dir.path().join("b.zarr"), &tiled, blosc, 128, Some(100));
    assert!(tiled.largest_read() <= 100 * 100);

    assert_eq!(a, b);
}

#[test]
fn test_max_load_unset_reads_whole_planes() {
    let dir = tempfile::tempdir().unwrap();
    let image = SyntheticImage::new(&[300, 200], 3, DataType::U8);

    convert_into(&dir.path().join("a.zarr"), &image, Compressor::Raw, 64, None);

    assert_eq!(image.read_count(), 3);
    assert_eq!(image.largest_read(), 300 * 200);
}

#[test]
fn test_single_level_plane_exactly_max_load() {
    let dir = tempfile::tempdir().unwrap();
    let image = SyntheticImage::new(&[256, 256], 1, DataType::U8);

    convert_into(
        &dir.path().join("a.zarr"),
        &image,
        Compressor::Raw,
        64,
        Some(256),
    );

    assert_eq!(image.read_count(), 1);
}
