use approx::assert_relative_eq;

use crate::error::Error;
use crate::samples::{assign_sequential_ids, SampleCollection};
use crate::split::EmbeddingSource;
use crate::tests::{collection, rows_for};

#[test]
fn test_new_rejects_label_length_mismatch() {
    let err = SampleCollection::new(vec![1, 2, 3], vec![0, 1]).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 3,
            got: 2,
            ..
        }
    ));
}

#[test]
fn test_set_column_wrong_length_leaves_collection_untouched() {
    let mut c = collection(&[1, 2], &[0, 1], rows_for(&[1, 2]));
    let before = c.clone();

    let err = c.set_relative_embeddings(vec![vec![1.0]]).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    assert_eq!(c, before);
    assert!(!c.has_column(EmbeddingSource::Relative));
}

#[test]
fn test_ragged_rows_rejected() {
    let c = SampleCollection::new(vec![1, 2], vec![0, 0]).unwrap();
    let err = c
        .with_embeddings(vec![vec![1.0, 2.0], vec![1.0]])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 2,
            got: 1,
            ..
        }
    ));
}

#[test]
fn test_map_labels_is_atomic() {
    let mut c = collection(&[1, 2, 3], &[0, 1, 2], rows_for(&[1, 2, 3]));
    let res = c.map_labels(|_, l| {
        if l == 2 {
            Err(Error::InvalidConfig("boom".into()))
        } else {
            Ok(l + 10)
        }
    });
    assert!(res.is_err());
    assert_eq!(c.labels(), &[0, 1, 2]);

    c.map_labels(|_, l| Ok(l * 2)).unwrap();
    assert_eq!(c.labels(), &[0, 2, 4]);
}

#[test]
fn test_concatenate_keeps_part_order() {
    let a = collection(&[5, 1], &[0, 0], rows_for(&[5, 1]));
    let b = collection(&[3], &[1], rows_for(&[3]));

    let merged = SampleCollection::concatenate(&[&a, &b]).unwrap();
    assert_eq!(merged.ids(), &[5, 1, 3]);
    assert_eq!(merged.labels(), &[0, 0, 1]);
    assert_eq!(
        merged.column(EmbeddingSource::Absolute).unwrap()[2],
        rows_for(&[3])[0]
    );
}

#[test]
fn test_concatenate_requires_matching_columns() {
    let a = collection(&[1], &[0], rows_for(&[1]));
    let mut b = collection(&[2], &[0], rows_for(&[2]));
    b.set_relative_embeddings(vec![vec![0.5]]).unwrap();

    let err = SampleCollection::concatenate(&[&a, &b]).unwrap_err();
    assert!(matches!(
        err,
        Error::MissingColumn {
            column: "relative_embeddings",
            ..
        }
    ));

    let c = collection(&[3], &[0], vec![vec![1.0, 2.0]]);
    let err = SampleCollection::concatenate(&[&a, &c]).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));

    assert!(SampleCollection::concatenate(&[]).is_err());
}

#[test]
fn test_sorted_by_id_moves_every_column() {
    let ids = [9, 2, 7];
    let mut c = collection(&ids, &[0, 1, 2], rows_for(&ids));
    c.set_relative_embeddings(vec![vec![9.0], vec![2.0], vec![7.0]])
        .unwrap();

    let sorted = c.sorted_by_id();
    assert_eq!(sorted.ids(), &[2, 7, 9]);
    assert_eq!(sorted.labels(), &[1, 2, 0]);
    assert_eq!(
        sorted.column(EmbeddingSource::Relative).unwrap(),
        &[vec![2.0], vec![7.0], vec![9.0]]
    );
    assert_eq!(
        sorted.column(EmbeddingSource::Absolute).unwrap()[0],
        rows_for(&[2])[0]
    );
}

#[test]
fn test_select_bounds() {
    let ids = [1, 2, 3, 4];
    let c = collection(&ids, &[0; 4], rows_for(&ids));
    assert_eq!(c.select(1..3).unwrap().ids(), &[2, 3]);
    assert!(c.select(2..5).is_err());
}

#[test]
fn test_train_test_split_sizes_and_determinism() {
    let ids: Vec<u64> = (0..25).collect();
    let c = collection(&ids, &vec![0; 25], rows_for(&ids));

    let (train, test) = c.train_test_split(0.1, 42).unwrap();
    assert_eq!(test.len(), 3);
    assert_eq!(train.len(), 22);

    let mut all: Vec<u64> = train.ids().iter().chain(test.ids()).copied().collect();
    all.sort_unstable();
    assert_eq!(all, ids);

    let (train2, test2) = c.train_test_split(0.1, 42).unwrap();
    assert_eq!(train, train2);
    assert_eq!(test, test2);

    assert!(c.train_test_split(0.0, 42).is_err());
    assert!(c.train_test_split(1.0, 42).is_err());
}

#[test]
fn test_center_zeroes_the_mean() {
    let mut c = collection(
        &[1, 2, 3],
        &[0, 0, 0],
        vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![6.0, 30.0]],
    );
    assert_eq!(c.column_mean(EmbeddingSource::Absolute).unwrap(), vec![3.0, 20.0]);

    c.center(EmbeddingSource::Absolute).unwrap();
    for m in c.column_mean(EmbeddingSource::Absolute).unwrap() {
        assert_relative_eq!(m, 0.0, epsilon = 1e-12);
    }
    assert_relative_eq!(c.column(EmbeddingSource::Absolute).unwrap()[0][0], -2.0);

    assert!(c.center(EmbeddingSource::Relative).is_err());
}

#[test]
fn test_assign_sequential_ids() {
    let mut train = collection(&[7, 7, 7], &[0, 1, 2], rows_for(&[1, 2, 3]));
    let mut test = collection(&[0, 0], &[0, 1], rows_for(&[4, 5]));
    assign_sequential_ids(&mut train, &mut test);
    assert_eq!(train.ids(), &[0, 1, 2]);
    assert_eq!(test.ids(), &[3, 4]);
}

#[test]
fn test_serde_skips_absent_columns() {
    let c = collection(&[1], &[3], vec![vec![0.5, 0.5]]);
    let json = serde_json::to_string(&c).unwrap();
    assert!(json.contains("\"embedding\""));
    assert!(!json.contains("relative_embeddings"));

    let back: SampleCollection = serde_json::from_str(&json).unwrap();
    assert_eq!(back, c);
}

#[test]
fn test_missing_relative_column() {
    let c = collection(&[1], &[0], rows_for(&[1]));
    assert!(!c.has_column(EmbeddingSource::Relative));
    assert_eq!(c.dim(EmbeddingSource::Absolute), Some(4));
    assert!(matches!(
        c.require_column(EmbeddingSource::Relative, "task_0_test"),
        Err(Error::MissingColumn { .. })
    ));
}
