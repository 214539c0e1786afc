//! DataArray payload and dimension behaviour through the public API

use ndarray::{arr1, arr2, Array1, ArrayD};
use nixio::prelude::*;
use nixio::{Block, DataInit, DataType, DimensionType, Element, File, NixError};

fn block() -> (File, Block) {
    let file = File::in_memory().unwrap();
    let block = file.create_block("b", "t").unwrap();
    (file, block)
}

#[test]
fn test_resize_preserves_overlap() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    array
        .create_data(DataInit::new().with_shape(&[100]).with_dtype(DataType::F64))
        .unwrap();

    let values = Array1::from_iter((0..100).map(|v| v as f64));
    array.write_direct(&values.view()).unwrap();
    let back: ArrayD<f64> = array.read_all().unwrap();
    assert_eq!(back.iter().copied().collect::<Vec<_>>(), values.to_vec());

    array.set_data_extent(&[200]).unwrap();
    assert_eq!(array.data_extent().unwrap(), Some(vec![200]));
    let grown: ArrayD<f64> = array.read_all().unwrap();
    assert!(grown.iter().skip(100).all(|&v| v == 0.0));

    array.set_data_extent(&[100]).unwrap();
    let shrunk: ArrayD<f64> = array.read_all().unwrap();
    assert_eq!(shrunk.iter().copied().collect::<Vec<_>>(), values.to_vec());
}

fn roundtrip<T: Element>(block: &Block, name: &str, values: [T; 6]) {
    let data = arr2(&[[values[0], values[1], values[2]], [values[3], values[4], values[5]]]);
    let array = block
        .create_data_array_with_data(name, "roundtrip", DataInit::new().with_data(data.view()))
        .unwrap();
    assert_eq!(array.data_type().unwrap(), Some(T::DATA_TYPE));

    let mut out = ArrayD::<T>::from_elem(vec![2, 3], values[0]);
    array.read_direct(&mut out.view_mut()).unwrap();
    assert_eq!(out.into_dimensionality::<ndarray::Ix2>().unwrap(), data);
}

#[test]
fn test_roundtrip_every_element_type() {
    let (_file, block) = block();
    roundtrip(&block, "i8", [i8::MIN, -1, 0, 1, 2, i8::MAX]);
    roundtrip(&block, "i16", [i16::MIN, -1, 0, 1, 2, i16::MAX]);
    roundtrip(&block, "i32", [i32::MIN, -1, 0, 1, 2, i32::MAX]);
    roundtrip(&block, "i64", [i64::MIN, -1, 0, 1, 2, i64::MAX]);
    roundtrip(&block, "u8", [0u8, 1, 2, 3, 4, u8::MAX]);
    roundtrip(&block, "u16", [0u16, 1, 2, 3, 4, u16::MAX]);
    roundtrip(&block, "u32", [0u32, 1, 2, 3, 4, u32::MAX]);
    roundtrip(&block, "u64", [0u64, 1, 2, 3, 4, u64::MAX]);
    roundtrip(&block, "f32", [f32::MIN, -0.5, 0.0, 0.25, 1e-7, f32::MAX]);
    roundtrip(&block, "f64", [f64::MIN, -0.5, 0.0, 0.25, 1e-300, f64::MAX]);
}

#[test]
fn test_direct_io_requires_exact_shape() {
    let (_file, block) = block();
    let array = block
        .create_data_array_with_data(
            "a",
            "signal",
            DataInit::new().with_data(arr1(&[1i32, 2, 3]).view()),
        )
        .unwrap();

    let mut small = ArrayD::<i32>::zeros(vec![2]);
    assert!(matches!(
        array.read_direct(&mut small.view_mut()),
        Err(NixError::Shape { .. })
    ));
    assert!(matches!(
        array.write_direct(&arr1(&[1i32, 2, 3, 4]).view()),
        Err(NixError::Shape { .. })
    ));
    let unchanged: ArrayD<i32> = array.read_all().unwrap();
    assert_eq!(unchanged.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn test_create_data_validation() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    assert!(matches!(array.create_data(DataInit::new()), Err(NixError::Validation(_))));

    let data = arr1(&[1.0, 2.0]);
    let mismatched = DataInit::new().with_shape(&[3]).with_data(data.view());
    assert!(matches!(array.create_data(mismatched), Err(NixError::Validation(_))));
    assert!(!array.has_data().unwrap());

    let converted = DataInit::new().with_dtype(DataType::I16).with_data(data.view());
    array.create_data(converted).unwrap();
    assert_eq!(array.data_type().unwrap(), Some(DataType::I16));
    let again = DataInit::new().with_shape(&[2]);
    assert!(matches!(array.create_data(again), Err(NixError::Validation(_))));
}

#[test]
fn test_region_and_raw_io() {
    let (_file, block) = block();
    let array = block.create_data_array("grid", "image").unwrap();
    array
        .create_data(DataInit::new().with_shape(&[3, 4]).with_dtype(DataType::U16))
        .unwrap();

    array.write_region(&[1, 1], &arr2(&[[7u16, 8], [9, 10]]).view()).unwrap();
    let region: ArrayD<u16> = array.read_region(&[1, 0], &[2, 4]).unwrap();
    assert_eq!(
        region.iter().copied().collect::<Vec<_>>(),
        vec![0, 7, 8, 0, 0, 9, 10, 0]
    );
    assert!(matches!(
        array.read_region::<u16>(&[2, 2], &[2, 2]),
        Err(NixError::OutOfBounds { .. })
    ));

    let raw = array.read_raw().unwrap();
    assert_eq!(raw.len(), 3 * 4 * 2);
    assert_eq!(&raw[10..12], &7u16.to_le_bytes());
    assert!(matches!(array.write_raw(&raw[..4]), Err(NixError::Validation(_))));
    array.write_raw(&vec![0u8; 24]).unwrap();
    let zeros: ArrayD<u16> = array.read_all().unwrap();
    assert!(zeros.iter().all(|&v| v == 0));
}

#[test]
fn test_calibrated_read() {
    let (_file, block) = block();
    let array = block
        .create_data_array_with_data(
            "adc",
            "raw",
            DataInit::new().with_data(arr1(&[0i16, 10, 20]).view()),
        )
        .unwrap();
    array.set_polynom_coefficients(&[1.0, 0.5]).unwrap();
    array.set_expansion_origin(Some(10.0)).unwrap();
    array.set_unit(Some("mV")).unwrap();

    let calibrated = array.read_calibrated().unwrap();
    assert_eq!(calibrated.iter().copied().collect::<Vec<_>>(), vec![-4.0, 1.0, 6.0]);
    assert_eq!(array.unit().unwrap().as_deref(), Some("mV"));
}

#[test]
fn test_dimension_ordinals() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    array.append_set_dimension().unwrap();
    array.append_range_dimension(&[0.0, 1.0, 4.0]).unwrap();
    let sampled = array.append_sampled_dimension(0.25).unwrap();
    assert_eq!(sampled.index(), 3);

    let dims = array.dimensions();
    assert_eq!(dims.len().unwrap(), 3);
    assert_eq!(dims.get(0).unwrap().dimension_type(), DimensionType::Set);
    assert_eq!(dims.get(1).unwrap().dimension_type(), DimensionType::Range);
    assert_eq!(dims.get(2).unwrap().dimension_type(), DimensionType::Sample);
    assert_eq!(dims.get(-1).unwrap(), dims.get(2).unwrap());
    assert_eq!(dims.get(-1).unwrap().index(), 3);

    assert!(matches!(dims.get(3), Err(NixError::OutOfBounds { .. })));
    assert!(matches!(dims.get(-4), Err(NixError::OutOfBounds { .. })));
    assert!(matches!(dims.get("time"), Err(NixError::Type(_))));
}

#[test]
fn test_dimension_deletion() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    array.append_set_dimension().unwrap();
    array.append_range_dimension(&[1.0, 2.0]).unwrap();
    array.append_sampled_dimension(1.0).unwrap();
    let dims = array.dimensions();

    assert!(matches!(dims.delete(5), Err(NixError::OutOfBounds { .. })));
    assert_eq!(dims.len().unwrap(), 3);

    dims.delete(0).unwrap();
    let first = dims.get(0).unwrap();
    assert_eq!(first.dimension_type(), DimensionType::Range);
    assert_eq!(first.index(), 1);

    dims.clear().unwrap();
    assert_eq!(dims.len().unwrap(), 0);
    assert!(dims.is_empty().unwrap());
}

#[test]
fn test_dimension_setters() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    let time = array.append_sampled_dimension(0.5).unwrap();
    time.set_offset(Some(1.0)).unwrap();
    time.set_unit(Some("s")).unwrap();
    time.set_label(Some("time")).unwrap();
    assert_eq!(time.axis(3, 0).unwrap(), vec![1.0, 1.5, 2.0]);
    assert_eq!(time.index_of(2.1).unwrap(), 2);
    assert!(matches!(time.set_sampling_interval(0.0), Err(NixError::Validation(_))));
    assert_eq!(time.sampling_interval().unwrap(), 0.5);

    let channels = array.append_set_dimension().unwrap();
    channels.set_labels(&["left", "right"]).unwrap();
    assert_eq!(channels.labels().unwrap(), vec!["left", "right"]);

    let ticks = array.append_range_dimension(&[0.0, 2.0, 8.0]).unwrap();
    assert!(matches!(ticks.set_ticks(&[3.0, 1.0]), Err(NixError::Validation(_))));
    assert_eq!(ticks.axis(2, 1).unwrap(), vec![2.0, 8.0]);
}

#[test]
fn test_name_and_type_never_empty() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    block.create_data_array("b", "signal").unwrap();

    assert!(matches!(array.set_name(""), Err(NixError::Validation(_))));
    assert!(matches!(array.set_type_name(""), Err(NixError::Validation(_))));
    assert!(matches!(array.set_name("b"), Err(NixError::Validation(_))));
    assert_eq!(array.name().unwrap(), "a");
    assert_eq!(array.type_name().unwrap(), "signal");

    assert!(matches!(block.set_name("  "), Err(NixError::Validation(_))));
    assert_eq!(block.name().unwrap(), "b");

    array.set_name("renamed").unwrap();
    assert_eq!(block.get_data_array("renamed").unwrap(), array);
}

#[test]
fn test_timestamps() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    array.force_created_at(1_000).unwrap();
    array.force_updated_at(1_000).unwrap();
    assert_eq!(array.created_at().unwrap(), 1_000);

    array.set_label(Some("voltage")).unwrap();
    assert!(array.updated_at().unwrap() > 1_000);
    assert_eq!(array.created_at().unwrap(), 1_000);
}

#[test]
fn test_regions_near_usize_max() {
    let (_file, block) = block();
    let array = block
        .create_data_array_with_data(
            "a",
            "signal",
            DataInit::new().with_data(arr1(&[1.0, 2.0, 3.0]).view()),
        )
        .unwrap();

    assert!(matches!(
        array.read_region::<f64>(&[usize::MAX], &[1]),
        Err(NixError::OutOfBounds { len: 3, .. })
    ));
    assert!(matches!(
        array.read_region::<f64>(&[1], &[usize::MAX]),
        Err(NixError::OutOfBounds { len: 3, .. })
    ));
    assert!(matches!(
        array.write_region(&[usize::MAX], &arr1(&[9.0]).view()),
        Err(NixError::OutOfBounds { .. })
    ));
    let back: ArrayD<f64> = array.read_all().unwrap();
    assert_eq!(back.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_oversized_extents_are_rejected() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    assert!(matches!(
        array.create_data(DataInit::new().with_shape(&[usize::MAX, 2])),
        Err(NixError::Validation(_))
    ));
    assert!(!array.has_data().unwrap());

    array
        .create_data(DataInit::new().with_shape(&[4]).with_dtype(DataType::U64))
        .unwrap();
    assert!(matches!(
        array.set_data_extent(&[usize::MAX / 4]),
        Err(NixError::Validation(_))
    ));
    assert_eq!(array.data_extent().unwrap(), Some(vec![4]));
}

#[test]
fn test_dimension_index_of_extremes() {
    let (_file, block) = block();
    let array = block.create_data_array("a", "signal").unwrap();
    let time = array.append_sampled_dimension(0.5).unwrap();
    assert_eq!(time.index_of(1.0).unwrap(), 2);
    assert!(matches!(time.index_of(1e30), Err(NixError::OutOfBounds { .. })));
    assert!(matches!(time.index_of(f64::NAN), Err(NixError::Validation(_))));
    assert!(matches!(time.index_of(-3.0), Err(NixError::Validation(_))));
    assert!(matches!(
        time.axis(usize::MAX, 1),
        Err(NixError::OutOfBounds { .. })
    ));

    let ticks = array.append_range_dimension(&[0.0, 1.0, 2.5]).unwrap();
    assert_eq!(ticks.index_of(2.0).unwrap(), 2);
    assert!(matches!(
        ticks.index_of(1e30),
        Err(NixError::OutOfBounds { index: 3, len: 3 })
    ));
    assert!(matches!(ticks.index_of(f64::NAN), Err(NixError::Validation(_))));
}
