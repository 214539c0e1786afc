//! Container lifecycle and persistence

use bytes::Bytes;
use ndarray::{arr2, ArrayD};
use nixio::io::BackendKind;
use nixio::prelude::*;
use nixio::{
    CompressionMethod, DataInit, DimensionType, ErrorKind, File, FileMode, FileOptions,
    MemoryBackend, NixError, StorageBackend, Value, ValueType,
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn populate(file: &File) {
    let block = file.create_block("session", "recording").unwrap();
    let array = block
        .create_data_array_with_data(
            "voltage",
            "signal",
            DataInit::new().with_data(arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).view()),
        )
        .unwrap();
    array.set_unit(Some("mV")).unwrap();
    array.append_set_dimension().unwrap().set_labels(&["a", "b"]).unwrap();
    array.append_sampled_dimension(0.25).unwrap().set_unit(Some("s")).unwrap();

    let subject = file.create_section("subject", "animal").unwrap();
    subject
        .create_property_with_values("weight", &[Value::new(21.5).with_uncertainty(0.1)])
        .unwrap();
    block.set_metadata(Some(&subject)).unwrap();

    let tag = block.create_simple_tag("stimulus", "event", &[&array]).unwrap();
    tag.set_position(&[0.0, 0.25]).unwrap();
}

#[test]
fn test_content_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.nix");
    {
        let file = File::open(&path, FileMode::Overwrite).unwrap();
        populate(&file);
        file.close().unwrap();
    }

    let file = File::open(&path, FileMode::ReadOnly).unwrap();
    let block = file.get_block("session").unwrap();
    let array = block.get_data_array("voltage").unwrap();
    let data: ArrayD<f64> = array.read_all().unwrap();
    assert_eq!(data.shape(), &[2, 3]);
    assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(array.unit().unwrap().as_deref(), Some("mV"));

    let dims = array.dimensions();
    assert_eq!(dims.len().unwrap(), 2);
    assert_eq!(dims.get(0).unwrap().dimension_type(), DimensionType::Set);
    let time = dims.get(1).unwrap();
    let sampled = time.as_sampled().unwrap();
    assert_eq!(sampled.sampling_interval().unwrap(), 0.25);
    assert_eq!(sampled.unit().unwrap().as_deref(), Some("s"));

    let subject = block.metadata().unwrap().unwrap();
    assert_eq!(subject.name().unwrap(), "subject");
    let weight = subject.get_property("weight").unwrap();
    assert_eq!(weight.data_type().unwrap(), ValueType::Double);
    assert_eq!(weight.values().unwrap()[0].uncertainty, 0.1);

    let tag = block.get_simple_tag("stimulus").unwrap();
    assert_eq!(tag.references().to_vec().unwrap(), vec![array.clone()]);
    let point: ArrayD<f64> = tag.retrieve_data(0).unwrap();
    assert_eq!(point.iter().copied().collect::<Vec<_>>(), vec![2.0]);
}

#[test]
fn test_compressed_payloads_survive_reopen() {
    let dir = TempDir::new().unwrap();
    for method in [CompressionMethod::Deflate, CompressionMethod::Zstd] {
        let path = dir.path().join(format!("{:?}.nix", method));
        let values =
            ArrayD::from_shape_fn(ndarray::IxDyn(&[64, 64]), |ix| (ix[0] * 64 + ix[1]) as i32);
        {
            let options = FileOptions::new().with_compression(method);
            let file = File::open_with_options(&path, FileMode::Overwrite, options).unwrap();
            let block = file.create_block("b", "t").unwrap();
            let array = block
                .create_data_array_with_data(
                    "grid",
                    "image",
                    DataInit::new().with_data(values.view()),
                )
                .unwrap();
            assert_eq!(array.compression().unwrap(), method);
        }

        let file = File::open(&path, FileMode::ReadOnly).unwrap();
        let array = file.get_block(0).unwrap().get_data_array(0).unwrap();
        assert_eq!(array.compression().unwrap(), method);
        let read: ArrayD<i32> = array.read_all().unwrap();
        assert_eq!(read, values);
    }
}

#[test]
fn test_read_only_container() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ro.nix");
    {
        let file = File::open(&path, FileMode::Overwrite).unwrap();
        populate(&file);
    }

    let file = File::open(&path, FileMode::ReadOnly).unwrap();
    let block = file.get_block(0).unwrap();
    let array = block.get_data_array(0).unwrap();
    assert!(matches!(block.set_name("renamed"), Err(NixError::ReadOnly)));
    assert!(matches!(array.write_raw(&[0u8; 48]), Err(NixError::ReadOnly)));
    assert!(matches!(file.delete_section("subject"), Err(NixError::ReadOnly)));
    assert_eq!(array.read_all::<f64>().unwrap().len(), 6);
    assert_eq!(block.name().unwrap(), "session");
}

#[test]
fn test_invalid_container_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.nix");
    std::fs::write(&path, b"this is not a container at all").unwrap();

    let err = File::open(&path, FileMode::ReadWrite).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(matches!(
        File::open(&path, FileMode::ReadOnly),
        Err(NixError::InvalidFormat(_))
    ));

    let file = File::open(&path, FileMode::Overwrite).unwrap();
    assert_eq!(file.block_count().unwrap(), 0);
    file.close().unwrap();
    assert!(File::open(&path, FileMode::ReadOnly).is_ok());
}

#[test]
fn test_corrupted_body() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.nix");
    {
        let file = File::open(&path, FileMode::Overwrite).unwrap();
        populate(&file);
    }
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let err = File::open(&path, FileMode::ReadOnly).unwrap_err();
    assert!(matches!(err, NixError::ChecksumMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Format);

    let truncated = MemoryBackend::with_data(bytes[..bytes.len() - 4].to_vec());
    let err =
        File::open_with_backend(Box::new(truncated), FileMode::ReadOnly, FileOptions::default())
            .unwrap_err();
    assert!(matches!(err, NixError::InvalidFormat(_)));
}

#[test]
fn test_handles_fail_after_close() {
    let file = File::in_memory().unwrap();
    let block = file.create_block("b", "t").unwrap();
    let array = block.create_data_array("a", "signal").unwrap();
    let section = file.create_section("s", "t").unwrap();
    file.close().unwrap();

    assert!(matches!(block.name(), Err(NixError::ClosedHandle)));
    assert!(matches!(array.read_all::<f64>(), Err(NixError::ClosedHandle)));
    assert!(matches!(section.properties(), Err(NixError::ClosedHandle)));
    assert!(matches!(block.create_source("x", "t"), Err(NixError::ClosedHandle)));
    assert_eq!(NixError::ClosedHandle.kind(), ErrorKind::ClosedHandle);
}

#[test]
fn test_handles_fail_after_drop() {
    let block = {
        let file = File::in_memory().unwrap();
        file.create_block("b", "t").unwrap()
    };
    assert!(matches!(block.data_arrays(), Err(NixError::ClosedHandle)));
}

#[test]
fn test_auto_flush_persists_without_close() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("auto.nix");
    let options = FileOptions::new().with_auto_flush(true);
    let file = File::open_with_options(&path, FileMode::Overwrite, options).unwrap();
    file.create_block("b", "t").unwrap();

    let reader = File::open(&path, FileMode::ReadOnly).unwrap();
    assert_eq!(reader.block_count().unwrap(), 1);
    drop(reader);
    drop(file);
}

#[test]
fn test_flush_persists_pending_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flush.nix");
    let file = File::open(&path, FileMode::Overwrite).unwrap();
    file.create_block("b", "t").unwrap();
    assert_eq!(File::open(&path, FileMode::ReadOnly).unwrap().block_count().unwrap(), 0);

    file.flush().unwrap();
    assert_eq!(File::open(&path, FileMode::ReadOnly).unwrap().block_count().unwrap(), 1);
    assert!(file.size_on_disk().unwrap() > 0);
}

#[test]
fn test_options_from_json() {
    let options = FileOptions::from_json(r#"{"compression": "Zstd", "auto_flush": true}"#).unwrap();
    assert_eq!(options.compression, CompressionMethod::Zstd);
    assert!(options.auto_flush);
    assert!(options.verify_checksums);

    assert!(FileOptions::from_json("{ not json").is_err());
}

#[test]
fn test_read_write_reopens_existing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rw.nix");
    {
        let file = File::open(&path, FileMode::ReadWrite).unwrap();
        file.create_block("first", "t").unwrap();
    }
    {
        let file = File::open(&path, FileMode::ReadWrite).unwrap();
        assert!(file.has_block("first").unwrap());
        file.create_block("second", "t").unwrap();
    }
    let file = File::open(&path, FileMode::ReadOnly).unwrap();
    let names: Vec<String> = file.blocks().unwrap().iter().map(|b| b.name().unwrap()).collect();
    assert_eq!(names, vec!["first", "second"]);

    let block = file.get_block("first").unwrap();
    let created = block.created_at().unwrap();
    assert!(created > 0);
    assert!(block.updated_at().unwrap() >= created);
}

#[test]
fn test_recompress_existing_payload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recompress.nix");
    let values = ArrayD::from_elem(ndarray::IxDyn(&[256]), 7u16);
    {
        let file = File::open(&path, FileMode::Overwrite).unwrap();
        let array = file
            .create_block("b", "t")
            .unwrap()
            .create_data_array_with_data("flat", "signal", DataInit::new().with_data(values.view()))
            .unwrap();
        assert_eq!(array.compression().unwrap(), CompressionMethod::None);
        array.set_compression(CompressionMethod::Deflate).unwrap();
    }

    let options = FileOptions::new().with_verify_checksums(false);
    let file = File::open_with_options(&path, FileMode::ReadOnly, options).unwrap();
    let array = file.get_block("b").unwrap().get_data_array("flat").unwrap();
    assert_eq!(array.compression().unwrap(), CompressionMethod::Deflate);
    assert_eq!(array.read_all::<u16>().unwrap(), values);
}

/// Memory backend whose writes fail while `full` is set
struct FullDisk {
    inner: Arc<MemoryBackend>,
    full: Arc<AtomicBool>,
}

impl StorageBackend for FullDisk {
    fn read(&self) -> nixio::Result<Bytes> {
        self.inner.read()
    }

    fn write(&self, data: &[u8]) -> nixio::Result<()> {
        if self.full.load(Ordering::SeqCst) {
            return Err(NixError::Io(io::Error::other("disk full")));
        }
        self.inner.write(data)
    }

    fn exists(&self) -> nixio::Result<bool> {
        self.inner.exists()
    }

    fn size(&self) -> nixio::Result<u64> {
        self.inner.size()
    }

    fn describe(&self) -> String {
        "<full disk>".to_string()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}

fn full_disk(options: FileOptions) -> (File, Arc<MemoryBackend>, Arc<AtomicBool>) {
    let inner = Arc::new(MemoryBackend::new());
    let full = Arc::new(AtomicBool::new(false));
    let backend = FullDisk {
        inner: Arc::clone(&inner),
        full: Arc::clone(&full),
    };
    let file = File::open_with_backend(Box::new(backend), FileMode::Overwrite, options).unwrap();
    (file, inner, full)
}

fn reopen(inner: &MemoryBackend) -> File {
    let bytes = inner.read().unwrap();
    let backend = Box::new(MemoryBackend::with_data(bytes));
    File::open_with_backend(backend, FileMode::ReadOnly, FileOptions::default()).unwrap()
}

#[test]
fn test_auto_flush_failure_keeps_model() {
    let (file, inner, full) = full_disk(FileOptions::new().with_auto_flush(true));
    let block = file.create_block("kept", "t").unwrap();

    full.store(true, Ordering::SeqCst);
    let err = file.create_block("lost", "t").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(file.block_count().unwrap(), 1);
    assert!(!file.has_block("lost").unwrap());

    assert!(block.set_name("renamed").is_err());
    assert_eq!(block.name().unwrap(), "kept");

    full.store(false, Ordering::SeqCst);
    block.set_name("renamed").unwrap();
    file.create_block("second", "t").unwrap();

    let names: Vec<String> = reopen(&inner)
        .blocks()
        .unwrap()
        .iter()
        .map(|b| b.name().unwrap())
        .collect();
    assert_eq!(names, vec!["renamed", "second"]);
}

#[test]
fn test_close_failure_keeps_container_open() {
    let (file, inner, full) = full_disk(FileOptions::default());
    file.create_block("pending", "t").unwrap();

    full.store(true, Ordering::SeqCst);
    assert!(file.close().is_err());
    assert!(file.is_open());
    assert!(file.has_block("pending").unwrap());

    full.store(false, Ordering::SeqCst);
    file.close().unwrap();
    assert!(!file.is_open());
    assert!(reopen(&inner).has_block("pending").unwrap());
}
