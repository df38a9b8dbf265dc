//! Sorting engine tests


use std::collections::HashMap;

use tabula::prelude::*;
use test_data_gen::{assert_same_contents, generate_table, parallel_config, serial_config};

fn is_sorted_by<T: Element>(values: &[T], order: std::cmp::Ordering) -> bool {
    values.windows(2).all(|w| w[0].cmp_value(&w[1]) != order)
}

#[test]
fn test_rows_stay_aligned_with_keys() {
    let mut t = generate_table(serial_config(), 300, 3, 0.1, 10);
    // Remember each row's payload by its (unique) index value.
    let before: HashMap<u64, (i64, String)> = t
        .index()
        .iter()
        .zip(t.column::<i64>("key").unwrap())
        .zip(t.column::<String>("label").unwrap())
        .map(|((i, k), l)| (*i, (*k, l.clone())))
        .collect();

    t.sort(&[SortKey::asc("label"), SortKey::desc("key")]).unwrap();
    assert!(is_sorted_by(t.column::<String>("label").unwrap(), std::cmp::Ordering::Greater));

    let keys = t.column::<i64>("key").unwrap();
    let labels = t.column::<String>("label").unwrap();
    for (row, idx) in t.index().iter().enumerate() {
        assert_eq!(before[idx], (keys[row], labels[row].clone()));
    }
}

#[test]
fn test_descending_reverses_ascending_on_distinct_keys() {
    let mut asc = Table::<u32>::from_index((0..6).collect());
    asc.load_column("x", vec![4.5f64, -1.0, 3.0, 10.0, 0.0, 7.25], LengthPolicy::Strict)
        .unwrap();
    let mut desc = asc.clone();

    asc.sort(&[SortKey::asc("x")]).unwrap();
    desc.sort(&[SortKey::desc("x")]).unwrap();

    let mut reversed = desc.column::<f64>("x").unwrap().to_vec();
    reversed.reverse();
    assert_eq!(asc.column::<f64>("x").unwrap(), reversed.as_slice());
    let mut reversed_index = desc.index().to_vec();
    reversed_index.reverse();
    assert_eq!(asc.index(), reversed_index.as_slice());
}

#[test]
fn test_missing_values_sort_last_for_floats() {
    let mut t = Table::<u32>::from_index(vec![0, 1, 2, 3]);
    t.load_column("x", vec![f64::NAN, 2.0, f64::NAN, -3.0], LengthPolicy::Strict)
        .unwrap();
    t.sort(&[SortKey::abs_asc("x")]).unwrap();
    let x = t.column::<f64>("x").unwrap();
    assert_eq!(&x[..2], &[2.0, -3.0]);
    assert!(x[2].is_nan() && x[3].is_nan());
    // Stable: the two NaN rows keep their relative order.
    assert_eq!(&t.index()[2..], &[0, 2]);
}

#[test]
fn test_five_keys_and_index_key() {
    let mut t = generate_table(serial_config(), 100, 3, 0.0, 11);
    t.sort(&[
        SortKey::asc("key"),
        SortKey::desc("label"),
        SortKey::abs_desc("v0"),
        SortKey::abs_asc("v1"),
        SortKey::asc(INDEX_NAME),
    ])
    .unwrap();
    assert!(is_sorted_by(t.column::<i64>("key").unwrap(), std::cmp::Ordering::Greater));

    t.sort_with(&[SortKey::asc(INDEX_NAME)], true).unwrap();
    assert!(is_sorted_by(t.index(), std::cmp::Ordering::Greater));
}

#[test]
fn test_serial_and_parallel_sort_agree() {
    let keys = [SortKey::asc("key"), SortKey::abs_desc("v1")];
    let mut serial = generate_table(serial_config(), 2_000, 6, 0.1, 12);
    let mut parallel = generate_table(parallel_config(), 2_000, 6, 0.1, 12);

    serial.sort(&keys).unwrap();
    parallel.sort(&keys).unwrap();
    assert_same_contents(&serial, &parallel, 6);
}

#[test]
fn test_sort_async_returns_the_sorted_table() {
    let t = generate_table(parallel_config(), 500, 4, 0.0, 13);
    let handle = t.sort_async(vec![SortKey::desc("v0")]);
    let sorted = handle.get().unwrap();
    assert!(is_sorted_by(sorted.column::<f64>("v0").unwrap(), std::cmp::Ordering::Less));

    let t = generate_table(parallel_config(), 10, 1, 0.0, 14);
    let err = t.sort_async(vec![SortKey::asc("nope")]).get().unwrap_err();
    assert!(matches!(err, Error::ColumnNotFound(_)));
}

#[test]
fn test_sort_by_index_restores_original_rows() {
    for config in [serial_config(), parallel_config()] {
        let original = generate_table(config.clone(), 1_000, 3, 0.2, 13);
        let mut t = generate_table(config, 1_000, 3, 0.2, 13);
        t.sort(&[SortKey::desc("v1"), SortKey::asc("label"), SortKey::abs_asc("key")])
            .unwrap();
        assert_ne!(t.index(), original.index());

        t.sort(&[SortKey::asc(INDEX_NAME)]).unwrap();
        assert_same_contents(&t, &original, 3);
    }
}

#[test]
fn test_missing_integers_sort_last() {
    let mut t = Table::<u32>::from_index(vec![0, 1, 2, 3]);
    t.load_column("x", vec![3i64, i64::MIN, -7, 1], LengthPolicy::Strict).unwrap();
    t.sort(&[SortKey::asc("x")]).unwrap();
    assert_eq!(t.column::<i64>("x").unwrap(), &[-7, 1, 3, i64::MIN]);
    assert_eq!(t.index(), &[2, 3, 0, 1]);
}
