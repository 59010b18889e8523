//! End-to-end conversion tests.
//!
//! Tests verify:
//! - Every level lands in its own array with the reader's exact shape
//! - Array metadata and chunk files follow the Zarr v2 layout
//! - The multiscale descriptor relates each level to level 0
//! - The NIfTI header variant stores a valid 540-byte header
//! - A failing level aborts the conversion and names the level

use jp2zarr::array::DataType;
use jp2zarr::convert::{convert, ConvertOptions, NIFTI_KEY};
use jp2zarr::error::{CodestreamError, ConvertError};
use jp2zarr::format::jp2::PixelSize;
use jp2zarr::nifti::{Nifti2Header, NiftiOptions, HEADER_SIZE, NIFTI2_MAGIC};
use jp2zarr::pyramid::{CoordinateTransformation, Multiscale};
use jp2zarr::source::LevelReader;
use jp2zarr::store::{ArrayStore, Compressor, CompressorKind, DirectoryStore};
use serde_json::json;

use super::test_utils::{FailingImage, SyntheticImage};

fn raw_options(chunk: u64) -> ConvertOptions {
    ConvertOptions {
        chunk,
        compressor: Compressor::Raw,
        max_load: None,
        nifti: None,
    }
}

fn read_back(store: &DirectoryStore, level: usize) -> jp2zarr::array::Region {
    let array = store.open_array(&level.to_string()).unwrap();
    let shape = array.shape().to_vec();
    let offset = vec![0; shape.len()];
    store.read_region(&array, &offset, &shape).unwrap()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-12, "{:?} != {:?}", actual, expected);
    }
}

fn multiscale_of(store: &DirectoryStore) -> Multiscale {
    let attributes = store.group_attributes().unwrap();
    serde_json::from_value(attributes["multiscales"][0].clone()).unwrap()
}

// =============================================================================
// Pyramid Layout
// =============================================================================

#[test]
fn test_two_level_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("slide.ome.zarr");
    let store = DirectoryStore::create(&root).unwrap();
    let image = SyntheticImage::new(&[4096, 4096], 2, DataType::U8);

    let summary = convert(&image, &store, PixelSize::new(0.5, 0.5), &raw_options(1024)).unwrap();
    assert_eq!(summary.level_shapes, vec![vec![4096, 4096], vec![2048, 2048]]);
    assert!(!summary.nifti);

    // Group
    let zgroup: serde_json::Value =
        serde_json::from_slice(&std::fs::read(root.join(".zgroup")).unwrap()).unwrap();
    assert_eq!(zgroup, serde_json::json!({"zarr_format": 2}));

    // Arrays
    for (level, extent) in [(0usize, 4096u64), (1, 2048)] {
        let meta = store.array_metadata(&level.to_string()).unwrap();
        assert_eq!(meta["zarr_format"], 2);
        assert_eq!(meta["shape"], json!([extent, extent]));
        assert_eq!(meta["chunks"], json!([1024, 1024]));
        assert_eq!(meta["dtype"], "|u1");
        assert_eq!(meta["order"], "F");
        assert!(meta["compressor"].is_null());
        assert_eq!(meta["fill_value"], 0);
        assert_eq!(meta["dimension_separator"], "/");

        assert_eq!(read_back(&store, level), image.expected_level(level));
    }
    assert!(root.join("0/3/3").is_file());
    assert!(root.join("1/1/1").is_file());
    assert!(!root.join("1/2").exists());

    // Multiscales
    let ms = multiscale_of(&store);
    assert_eq!(ms.version, "0.4");
    assert_eq!(ms.downscaling_type, "jpeg2000");
    assert_eq!(ms.datasets.len(), 2);
    assert_eq!(ms.datasets[0].path, "0");
    assert_eq!(
        ms.datasets[1].coordinate_transformations,
        vec![
            CoordinateTransformation::Scale {
                scale: vec![1.0, 1.0]
            },
            CoordinateTransformation::Translation {
                translation: vec![0.25, 0.25]
            },
        ]
    );
    assert!(!root.join(NIFTI_KEY).exists());
}

#[test]
fn test_two_level_end_to_end_with_default_options() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("slide.ome.zarr");
    let store = DirectoryStore::create(&root).unwrap();
    let image = SyntheticImage::new(&[3000, 2500], 2, DataType::U8);
    let options = ConvertOptions::default();
    assert_eq!(options.compressor.kind(), CompressorKind::Blosc);

    let summary = convert(&image, &store, PixelSize::new(0.5, 0.5), &options).unwrap();
    assert_eq!(summary.level_shapes, vec![vec![3000, 2500], vec![1500, 1250]]);

    for level in 0..2 {
        let meta = store.array_metadata(&level.to_string()).unwrap();
        assert_eq!(meta["chunks"], json!([1024, 1024]));
        assert_eq!(
            meta["compressor"],
            json!({"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1, "blocksize": 0})
        );
        assert_eq!(read_back(&store, level), image.expected_level(level));
    }
    assert!(root.join("0/2/2").is_file());
    assert!(root.join("1/1/1").is_file());
    assert_eq!(multiscale_of(&store).datasets.len(), 2);
}

#[test]
fn test_shape_fidelity_with_channels() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path().join("rgb.ome.zarr")).unwrap();
    let image = SyntheticImage::new(&[3, 333, 517], 4, DataType::U16);
    let options = ConvertOptions {
        chunk: 128,
        compressor: Compressor::with_defaults(CompressorKind::Blosc),
        max_load: None,
        nifti: None,
    };

    let summary = convert(&image, &store, PixelSize::new(0.25, 0.25), &options).unwrap();

    for level in 0..image.level_count() {
        let expected_shape = image.level_shape(level).unwrap();
        assert_eq!(summary.level_shapes[level], expected_shape);

        let meta = store.array_metadata(&level.to_string()).unwrap();
        assert_eq!(meta["shape"], json!(expected_shape));
        assert_eq!(meta["chunks"], json!([3, 128, 128]));
        assert_eq!(meta["dtype"], "<u2");
        assert_eq!(meta["compressor"]["id"], "blosc");

        assert_eq!(read_back(&store, level), image.expected_level(level));
    }

    let ms = multiscale_of(&store);
    assert_eq!(ms.axes.len(), 3);
    assert_eq!(ms.axes[0].name, "c");
    assert_eq!(ms.axes[0].axis_type, "channel");
    assert_eq!(ms.axes[0].unit, None);
    assert_eq!(ms.axes[1].name, "y");
    assert_eq!(ms.axes[2].name, "x");
}

#[test]
fn test_geometric_invariant_for_odd_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path().join("odd.ome.zarr")).unwrap();
    let image = SyntheticImage::new(&[101, 77], 3, DataType::U8);
    let pixel = PixelSize::new(0.4, 0.8);

    convert(&image, &store, pixel, &raw_options(32)).unwrap();

    let ms = multiscale_of(&store);
    for (level, dataset) in ms.datasets.iter().enumerate() {
        let shape = image.level_shape(level).unwrap();
        let ratio_y = 101.0 / shape[0] as f64;
        let ratio_x = 77.0 / shape[1] as f64;
        match dataset.coordinate_transformations.as_slice() {
            [CoordinateTransformation::Scale { scale }, CoordinateTransformation::Translation { translation }] =>
            {
                assert_close(scale, &[ratio_y * 0.8, ratio_x * 0.4]);
                assert_close(
                    translation,
                    &[(ratio_y - 1.0) * 0.8 * 0.5, (ratio_x - 1.0) * 0.4 * 0.5],
                );
            }
            other => panic!("unexpected transformations {:?}", other),
        }
    }
}

#[test]
fn test_signed_samples_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path().join("signed.ome.zarr")).unwrap();
    let image = SyntheticImage::new(&[50, 70], 2, DataType::I32);
    let options = ConvertOptions {
        chunk: 16,
        compressor: Compressor::with_defaults(CompressorKind::Zlib),
        max_load: Some(20),
        nifti: None,
    };

    convert(&image, &store, PixelSize::new(1.0, 1.0), &options).unwrap();

    assert_eq!(store.array_metadata("0").unwrap()["dtype"], "<i4");
    assert_eq!(read_back(&store, 0), image.expected_level(0));
    assert_eq!(read_back(&store, 1), image.expected_level(1));
}

// =============================================================================
// NIfTI Header Variant
// =============================================================================

#[test]
fn test_nifti_header_array() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("brain.nii.zarr");
    let store = DirectoryStore::create(&root).unwrap();
    let image = SyntheticImage::new(&[3, 40, 60], 2, DataType::U8);
    let options = ConvertOptions {
        nifti: Some(NiftiOptions::default()),
        ..raw_options(16)
    };

    let summary = convert(&image, &store, PixelSize::new(0.5, 0.25), &options).unwrap();
    assert!(summary.nifti);

    let meta = store.array_metadata(NIFTI_KEY).unwrap();
    assert_eq!(meta["shape"], json!([HEADER_SIZE]));
    assert_eq!(meta["chunks"], json!([HEADER_SIZE]));
    assert_eq!(meta["dtype"], "|u1");
    assert!(meta["compressor"].is_null());

    let raw = std::fs::read(root.join("nifti/0")).unwrap();
    assert_eq!(raw.len(), HEADER_SIZE);
    assert_eq!(&raw[4..12], NIFTI2_MAGIC);

    let header = Nifti2Header::from_bytes(&raw).unwrap();
    assert_eq!(header.data_shape(), vec![60, 40, 1, 1, 3]);
    assert_eq!(header.datatype, 2);
    assert_eq!(header.bitpix, 8);
    assert_eq!(header.qform_code, 2);
    assert_eq!(header.sform_code, 2);
    assert_eq!(header.xyzt_units, 3);
    assert_eq!(header.vox_offset, 544);
    assert!(header.scl_slope.is_nan());
    assert_eq!(header.pixdim[1..4], [0.5, 0.25, 1.0]);

    // Coronal: x -> L, y -> I, z -> A
    assert_eq!(header.srow_x[0], -0.5);
    assert_eq!(header.srow_z[1], -0.25);
    assert_eq!(header.srow_y[2], 1.0);

    // Centered on the level-0 field of view
    let centre = header.sform_affine() * nalgebra::Vector4::new(29.5, 19.5, 0.0, 1.0);
    assert!(centre.xyz().norm() < 1e-9);

    // Pyramid is unaffected by the header
    assert_eq!(read_back(&store, 0), image.expected_level(0));
}

#[test]
fn test_nifti_grayscale_shape() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path().join("gray.nii.zarr")).unwrap();
    let image = SyntheticImage::new(&[40, 60], 1, DataType::U16);
    let options = ConvertOptions {
        nifti: Some(NiftiOptions {
            orientation: "axial".parse().unwrap(),
            center: false,
            thickness: Some(10.0),
        }),
        ..raw_options(64)
    };

    convert(&image, &store, PixelSize::new(2.0, 2.0), &options).unwrap();

    let array = store.open_array(NIFTI_KEY).unwrap();
    let region = store.read_region(&array, &[0], &[HEADER_SIZE as u64]).unwrap();
    let header = Nifti2Header::from_bytes(region.data()).unwrap();
    assert_eq!(header.data_shape(), vec![60, 40]);
    assert_eq!(header.datatype, 512);
    assert_eq!(header.pixdim[3], 10.0);
    assert_eq!(header.srow_x[3], 0.0);
    assert_eq!(header.srow_y[3], 0.0);
    assert_eq!(header.srow_z[3], 0.0);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_failed_level_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path().join("broken.ome.zarr")).unwrap();
    let image = FailingImage {
        inner: SyntheticImage::new(&[64, 64], 3, DataType::U8),
        failing_level: 1,
    };

    let err = convert(&image, &store, PixelSize::new(1.0, 1.0), &raw_options(32)).unwrap_err();
    match err {
        ConvertError::ReadLevel { level, source } => {
            assert_eq!(level, 1);
            assert!(matches!(source, CodestreamError::Decode { level: 1, .. }));
        }
        other => panic!("expected ReadLevel, got {:?}", other),
    }

    // Level 0 stays, nothing after the failure is written
    assert!(store.open_array("0").is_ok());
    assert!(store.open_array("2").is_err());
    assert_eq!(store.group_attributes().unwrap(), serde_json::json!({}));
}

#[test]
fn test_rerun_replaces_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("again.zarr");

    let store = DirectoryStore::create(&root).unwrap();
    let image = SyntheticImage::new(&[32, 32], 3, DataType::U8);
    let options = ConvertOptions {
        nifti: Some(NiftiOptions::default()),
        ..raw_options(16)
    };
    convert(&image, &store, PixelSize::new(1.0, 1.0), &options).unwrap();
    assert!(root.join("2").is_dir());

    let store = DirectoryStore::create(&root).unwrap();
    let image = SyntheticImage::new(&[32, 32], 1, DataType::U8);
    convert(&image, &store, PixelSize::new(1.0, 1.0), &raw_options(16)).unwrap();

    assert!(!root.join("2").exists());
    assert!(!root.join(NIFTI_KEY).exists());
    assert_eq!(multiscale_of(&store).datasets.len(), 1);
}
