//! Replace, transpose and shuffle tests


use tabula::prelude::*;
use test_data_gen::{assert_same_contents, generate_table, parallel_config, serial_config, value_names};

#[test]
fn test_replace_with_total_limit() {
    let mut t = Table::<u32>::from_index(vec![0, 1, 2]);
    t.load_column("x", vec![1i32, 1, 1], LengthPolicy::Strict).unwrap();
    assert_eq!(t.replace("x", &[1], &[9], 1).unwrap(), 1);
    assert_eq!(t.column::<i32>("x").unwrap(), &[9, 1, 1]);
}

#[test]
fn test_replace_by_predicate() {
    let mut t = generate_table(serial_config(), 50, 1, 0.0, 40);
    let visited = t
        .replace_with::<String, _>("label", |idx, label| {
            if *idx >= 200 {
                return false;
            }
            label.push_str("-seen");
            true
        })
        .unwrap();
    assert_eq!(visited, 20);
    let labels = t.column::<String>("label").unwrap();
    assert!(labels[..20].iter().all(|l| l.ends_with("-seen")));
    assert!(labels[20..].iter().all(|l| !l.ends_with("-seen")));
}

#[test]
fn test_serial_and_parallel_replace_agree() {
    let mut serial = generate_table(serial_config(), 1_200, 4, 0.3, 41);
    let mut parallel = generate_table(parallel_config(), 1_200, 4, 0.3, 41);
    let names = value_names(4);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let a = serial.replace_columns(&names, &[f64::NAN], &[0.0], 50).unwrap();
    let b = parallel.replace_columns(&names, &[f64::NAN], &[0.0], 50).unwrap();
    assert_eq!(a, b);
    assert_same_contents(&serial, &parallel, 4);

    let a = serial.replace("key", &[0i64, 1], &[10, 11], -1).unwrap();
    let b = parallel.replace("key", &[0i64, 1], &[10, 11], -1).unwrap();
    assert_eq!(a, b);
    assert_same_contents(&serial, &parallel, 4);
}

#[test]
fn test_transpose_round_trip_shape() {
    let mut t = Table::<u32>::from_index(vec![0, 1]);
    t.load_data(vec![0, 1], vec![("a", vec![1i64, 2]), ("b", vec![3, 4]), ("c", vec![5, 6])])
        .unwrap();
    let tt = t.transpose::<i64, u32>(vec![10, 11, 12], &["r0", "r1"]).unwrap();
    assert_eq!(tt.shape(), (3, 2));
    assert_eq!(tt.column::<i64>("r0").unwrap(), &[1, 3, 5]);
    assert_eq!(tt.column::<i64>("r1").unwrap(), &[2, 4, 6]);

    let back = tt.transpose::<i64, u32>(vec![0, 1], &["a", "b", "c"]).unwrap();
    assert_eq!(back.column::<i64>("b").unwrap(), t.column::<i64>("b").unwrap());
}

#[test]
fn test_serial_and_parallel_shuffle_agree() {
    let mut serial = generate_table(serial_config(), 1_000, 4, 0.0, 42);
    let mut parallel = generate_table(parallel_config(), 1_000, 4, 0.0, 42);
    let names = value_names(4);
    let mut names: Vec<&str> = names.iter().map(String::as_str).collect();
    names.push("label");

    serial.shuffle_seeded(&names, true, 99).unwrap();
    parallel.shuffle_seeded(&names, true, 99).unwrap();
    assert_same_contents(&serial, &parallel, 4);

    let untouched = generate_table(serial_config(), 1_000, 4, 0.0, 42);
    assert_eq!(serial.column::<i64>("key").unwrap(), untouched.column::<i64>("key").unwrap());
    assert_ne!(serial.index(), untouched.index());
}

#[test]
fn test_pooled_replace_reports_error_and_finishes_siblings() {
    let mut t = generate_table(parallel_config(), 2_000, 4, 0.3, 43);
    let err = t
        .replace_columns(&["v0", "v1", "label", "v2", "v3"], &[f64::NAN], &[0.0], -1)
        .unwrap_err();
    assert!(matches!(err, Error::ColumnNotFound(_)));
    for name in value_names(4) {
        assert_eq!(t.count_missing(&name).unwrap(), 0, "{name} kept missing values");
    }
}
