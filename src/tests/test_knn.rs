use approx::assert_relative_eq;

use crate::error::Error;
use crate::knn::{compute_prototypes, nearest_prototype, run_knn_class_experiment, KnnClassifier};
use crate::split::EmbeddingSource;
use crate::tests::collection;

#[test]
fn test_prototypes_are_class_means() {
    let x = vec![
        vec![0.0, 0.0],
        vec![2.0, 0.0],
        vec![10.0, 10.0],
        vec![10.0, 12.0],
    ];
    let y = vec![0, 0, 2, 2];
    let protos = compute_prototypes(&x, &y, 3).unwrap();
    assert_eq!(protos[0], Some(vec![1.0, 0.0]));
    assert_eq!(protos[1], None);
    assert_eq!(protos[2], Some(vec![10.0, 11.0]));
}

#[test]
fn test_prototypes_reject_out_of_range_labels() {
    let x = vec![vec![0.0], vec![1.0]];
    assert!(compute_prototypes(&x, &[0, 3], 3).is_err());
    assert!(compute_prototypes(&x, &[0, -1], 3).is_err());
    assert!(matches!(
        compute_prototypes(&x, &[0], 3),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn test_empty_class_is_never_predicted() {
    let protos = vec![None, Some(vec![5.0, 5.0]), Some(vec![-5.0, -5.0])];
    assert_eq!(nearest_prototype(&[0.0, 0.0], &protos).map(|p| p.0), Some(1));
    assert_eq!(nearest_prototype(&[-4.0, -6.0], &protos).map(|p| p.0), Some(2));
    assert_eq!(nearest_prototype(&[1.0], &[None, None]), None);
}

#[test]
fn test_knn_on_separable_data() {
    let train = collection(
        &[1, 2, 3, 4],
        &[0, 0, 1, 1],
        vec![
            vec![0.0, 1.0],
            vec![0.2, 0.8],
            vec![5.0, 5.0],
            vec![5.5, 4.5],
        ],
    );
    let test = collection(
        &[5, 6, 7],
        &[0, 1, 1],
        vec![vec![0.1, 0.9], vec![4.0, 4.0], vec![0.0, 0.5]],
    );

    let knn = KnnClassifier::fit(&train, EmbeddingSource::Absolute, 2).unwrap();
    assert_eq!(knn.prototypes().len(), 2);
    assert_eq!(
        knn.predict(test.column(EmbeddingSource::Absolute).unwrap()),
        vec![0, 1, 0]
    );

    let res = run_knn_class_experiment(2, &train, &test, false).unwrap();
    assert_relative_eq!(res.total_acc, 2.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn test_knn_requires_the_selected_column() {
    let train = collection(&[1], &[0], vec![vec![1.0]]);
    assert!(matches!(
        run_knn_class_experiment(1, &train, &train, true),
        Err(Error::MissingColumn {
            column: "relative_embeddings",
            ..
        })
    ));
}
