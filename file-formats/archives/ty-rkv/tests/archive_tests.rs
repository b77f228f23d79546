//! Round-trip and robustness tests for RKV archive reading

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::io::Write;
use ty_rkv::{Archive, Error, FormatVersion, RkvBuilder};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

#[test]
fn rkv1_round_trip_returns_injected_bytes() {
    init_logging();
    let payload = b"segment data for the model".to_vec();
    let file = write_temp(
        &RkvBuilder::new(FormatVersion::Rkv1)
            .add_file_data("boss.mdl", payload.clone())
            .add_file_data("boss.dds", vec![0xAB; 100])
            .build()
            .unwrap(),
    );

    let archive = Archive::open(file.path()).unwrap();
    assert_eq!(archive.version(), FormatVersion::Rkv1);
    assert_eq!(archive.file_count(), 2);
    assert_eq!(archive.read_file("boss.mdl").unwrap(), payload);
}

#[test]
fn rkv2_round_trip_returns_injected_bytes() {
    let payload = vec![7u8; 513];
    let file = write_temp(
        &RkvBuilder::new(FormatVersion::Rkv2)
            .add_file_data("level/props.mdg", payload.clone())
            .build()
            .unwrap(),
    );

    let archive = Archive::open(file.path()).unwrap();
    assert_eq!(archive.version(), FormatVersion::Rkv2);
    assert_eq!(archive.read_file("level/props.mdg").unwrap(), payload);
}

#[test]
fn lookup_is_case_insensitive() {
    for version in [FormatVersion::Rkv1, FormatVersion::Rkv2] {
        let file = write_temp(
            &RkvBuilder::new(version)
                .add_file_data("Model.MDL", vec![1, 2, 3])
                .build()
                .unwrap(),
        );
        let archive = Archive::open(file.path()).unwrap();

        let upper = archive.file("Model.MDL").expect("exact-case lookup");
        let lower = archive.file("model.mdl").expect("lowercase lookup");
        assert_eq!(upper.offset, lower.offset);
        assert_eq!(upper.size, lower.size);
        assert_eq!(
            archive.read_file("MODEL.mdl").unwrap(),
            archive.read_file("model.MDL").unwrap()
        );
    }
}

#[test]
fn files_by_extension_matches_case_insensitively() {
    let file = write_temp(
        &RkvBuilder::new(FormatVersion::Rkv2)
            .add_file_data("a.MDL", vec![0])
            .add_file_data("b.mdl", vec![0])
            .add_file_data("c.mdg", vec![0])
            .build()
            .unwrap(),
    );
    let archive = Archive::open(file.path()).unwrap();

    let mut models = archive.files_by_extension(".mdl");
    models.sort_unstable();
    assert_eq!(models, vec!["a.MDL", "b.mdl"]);
    assert_eq!(archive.files_by_extension("mdg").len(), 1);
    assert!(archive.files_by_extension("wav").is_empty());
}

#[test]
fn missing_file_is_reported() {
    let file = write_temp(
        &RkvBuilder::new(FormatVersion::Rkv1)
            .add_file_data("present.bin", vec![1])
            .build()
            .unwrap(),
    );
    let archive = Archive::open(file.path()).unwrap();
    match archive.read_file("absent.bin") {
        Err(Error::FileNotFound(name)) => assert_eq!(name, "absent.bin"),
        other => panic!("expected FileNotFound, got {other:?}"),
    }
}

#[test]
fn out_of_range_record_is_truncated_data() {
    // Hand-build an RKV1 whose single record claims more data than exists.
    let mut bytes = vec![0u8; 16]; // 16 bytes of "data"
    let mut record = [0u8; 64];
    record[..5].copy_from_slice(b"x.bin");
    record[36..40].copy_from_slice(&1000u32.to_le_bytes()); // size
    record[44..48].copy_from_slice(&0u32.to_le_bytes()); // offset
    bytes.extend_from_slice(&record);
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    let file = write_temp(&bytes);
    let archive = Archive::open(file.path()).unwrap();
    assert!(matches!(
        archive.read_file("x.bin"),
        Err(Error::TruncatedData { .. })
    ));
}

#[test]
fn empty_file_is_io_error() {
    let file = write_temp(&[]);
    assert!(matches!(Archive::open(file.path()), Err(Error::Io(_))));
}

#[test]
fn garbage_without_valid_trailer_is_unknown_format() {
    // Trailer declares more records than could possibly fit.
    let mut bytes = vec![0u8; 32];
    bytes.extend_from_slice(&1_000_000u32.to_le_bytes());
    bytes.extend_from_slice(&1_000u32.to_le_bytes());

    let file = write_temp(&bytes);
    assert!(matches!(
        Archive::open(file.path()),
        Err(Error::UnknownFormat(_))
    ));
}

#[test]
fn rkv2_with_overflowing_table_is_unknown_format() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RKV2");
    bytes.extend_from_slice(&100u32.to_le_bytes()); // file count
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&28u32.to_le_bytes()); // info offset
    bytes.extend_from_slice(&0u32.to_le_bytes());
    // No room for 100 records.

    let file = write_temp(&bytes);
    assert!(matches!(
        Archive::open(file.path()),
        Err(Error::UnknownFormat(_))
    ));
}

proptest! {
    /// Opening arbitrary bytes never panics, only errors.
    #[test]
    fn prop_open_is_bounds_safe(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let file = write_temp(&bytes);
        let _ = Archive::open(file.path());
    }

    /// An arbitrary buffer stamped with the RKV2 magic never panics either.
    #[test]
    fn prop_open_rkv2_magic_is_bounds_safe(tail in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let mut bytes = b"RKV2".to_vec();
        bytes.extend_from_slice(&tail);
        let file = write_temp(&bytes);
        let _ = Archive::open(file.path());
    }
}
