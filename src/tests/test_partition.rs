use std::collections::HashSet;

use crate::error::Error;
use crate::merge::{merge_tasks, TrainAlignment};
use crate::partition::{gaussian_blobs, Disjointness, TaskPartitioner};
use crate::split::{EmbeddingSource, Split};
use crate::tests::{blob_store, NUM_ANCHORS, NUM_CLASSES, NUM_TASKS};

#[test]
fn test_class_groups_are_disjoint_and_cover_all_classes() {
    let groups = TaskPartitioner::disjoint_classes(3)
        .with_seed(9)
        .class_groups(10)
        .unwrap();
    assert_eq!(groups.len(), 3);

    let mut all: Vec<i64> = groups.iter().flatten().copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..10).collect::<Vec<i64>>());
    assert!(groups.iter().all(|g| g.len() == 3 || g.len() == 4));

    let again = TaskPartitioner::disjoint_classes(3)
        .with_seed(9)
        .class_groups(10)
        .unwrap();
    assert_eq!(groups, again);
}

#[test]
fn test_too_many_tasks_is_rejected() {
    assert!(matches!(
        TaskPartitioner::disjoint_classes(5).class_groups(3),
        Err(Error::InvalidConfig(_))
    ));
    assert!(TaskPartitioner::disjoint_classes(0).class_groups(3).is_err());
}

#[test]
fn test_gaussian_blobs_layout() {
    let (train, test) = gaussian_blobs(3, 8, 4, 0.5, 1).unwrap();
    assert_eq!(train.len(), 24);
    assert_eq!(test.len(), 6);
    assert_eq!(train.ids(), (0..24).collect::<Vec<u64>>().as_slice());
    assert_eq!(test.ids(), (24..30).collect::<Vec<u64>>().as_slice());
    assert_eq!(train.dim(EmbeddingSource::Absolute), Some(4));
    assert_eq!(gaussian_blobs(3, 8, 4, 0.5, 1).unwrap().0, train);
}

#[test]
fn test_partitioned_store_layout() {
    let store = blob_store();
    assert_eq!(store.num_tasks(), NUM_TASKS);

    let anchors: HashSet<u64> = store
        .task(0, Split::Anchors)
        .unwrap()
        .ids()
        .iter()
        .copied()
        .collect();
    assert_eq!(anchors.len(), NUM_ANCHORS);

    let mut seen_test = HashSet::new();
    for task in 1..=NUM_TASKS {
        let g2l = store.metadata().global_to_local(task).unwrap();
        assert_eq!(g2l.len(), NUM_CLASSES / NUM_TASKS);

        let train = store.task(task, Split::Train).unwrap();
        assert!(train.ids().iter().all(|id| !anchors.contains(id)));

        let test = store.task(task, Split::Test).unwrap();
        for id in test.ids() {
            assert!(seen_test.insert(*id), "test id {id} in two tasks");
        }
    }
    assert_eq!(seen_test.len(), store.task(0, Split::Test).unwrap().len());
}

#[test]
fn test_optional_val_split() {
    let (train, test) = gaussian_blobs(4, 20, 4, 0.5, 2).unwrap();
    let store = TaskPartitioner::disjoint_classes(2)
        .with_anchors(4)
        .with_val_fraction(0.2)
        .partition(&train, &test, 4)
        .unwrap();
    for task in 1..=2 {
        let fit = store.task(task, Split::Train).unwrap();
        let val = store.task(task, Split::Val).unwrap();
        assert!(!val.is_empty());
        assert!(fit.ids().iter().all(|id| !val.ids().contains(id)));
    }
    assert!(!store.has_split(0, Split::Val));
}

#[test]
fn test_anchor_count_is_checked() {
    let (train, test) = gaussian_blobs(2, 3, 2, 0.5, 2).unwrap();
    let p = TaskPartitioner::disjoint_classes(2);
    assert!(p.clone().with_anchors(0).partition(&train, &test, 2).is_err());
    assert!(p.with_anchors(7).partition(&train, &test, 2).is_err());
}

fn sample_store(train_on_anchors: bool) -> crate::store::DatasetStore {
    let (train, test) = gaussian_blobs(NUM_CLASSES, 20, 4, 0.5, 5).unwrap();
    TaskPartitioner::disjoint_samples(NUM_TASKS)
        .with_anchors(NUM_ANCHORS)
        .with_train_on_anchors(train_on_anchors)
        .with_seed(5)
        .partition(&train, &test, NUM_CLASSES)
        .unwrap()
}

#[test]
fn test_sample_disjoint_tasks_share_every_class() {
    let store = sample_store(false);
    assert_eq!(
        TaskPartitioner::disjoint_samples(2).disjointness(),
        Disjointness::Samples
    );
    let anchors: HashSet<u64> = store
        .task(0, Split::Anchors)
        .unwrap()
        .ids()
        .iter()
        .copied()
        .collect();

    let mut seen_train = HashSet::new();
    for task in 1..=NUM_TASKS {
        let g2l = store.metadata().global_to_local(task).unwrap();
        assert_eq!(g2l.len(), NUM_CLASSES);
        assert!(g2l.iter().all(|(global, local)| *global == local.to_string()));

        let train = store.task(task, Split::Train).unwrap();
        for id in train.ids() {
            assert!(!anchors.contains(id));
            assert!(seen_train.insert(*id), "train id {id} in two tasks");
        }
    }
    let reference = store.task(0, Split::Train).unwrap().len();
    assert_eq!(seen_train.len(), reference - NUM_ANCHORS);
}

#[test]
fn test_sample_disjoint_merged_test_matches_reference() {
    let store = sample_store(false);
    let merged = merge_tasks(&store, TrainAlignment::Subset).unwrap();
    assert_eq!(merged.merged_test.ids(), merged.original_test.ids());
    assert_eq!(merged.merged_test.labels(), merged.original_test.labels());
    assert_eq!(
        merged.merged_train.len(),
        merged.original_train.len() - NUM_ANCHORS
    );
}

#[test]
fn test_train_on_anchors_adds_anchors_to_every_task() {
    let store = sample_store(true);
    let anchors = store.task(0, Split::Anchors).unwrap();
    for task in 1..=NUM_TASKS {
        let train = store.task(task, Split::Train).unwrap();
        let tail = train.select(train.len() - NUM_ANCHORS..train.len()).unwrap();
        assert_eq!(tail.ids(), anchors.ids());
        assert_eq!(tail.labels(), anchors.labels());
    }

    let merged = merge_tasks(&store, TrainAlignment::Skip).unwrap();
    assert_eq!(merged.merged_test.ids(), merged.original_test.ids());
    assert_eq!(
        merged.merged_train.len(),
        merged.original_train.len() + (NUM_TASKS - 1) * NUM_ANCHORS
    );
    assert!(merge_tasks(&store, TrainAlignment::Exact).is_err());
}

#[test]
fn test_class_disjoint_train_on_anchors_keeps_own_classes() {
    let (train, test) = gaussian_blobs(4, 20, 4, 0.5, 2).unwrap();
    let store = TaskPartitioner::disjoint_classes(2)
        .with_anchors(8)
        .with_train_on_anchors(true)
        .partition(&train, &test, 4)
        .unwrap();
    let anchors = store.task(0, Split::Anchors).unwrap();
    for task in 1..=2 {
        let g2l = store.metadata().global_to_local(task).unwrap();
        let expected = anchors
            .labels()
            .iter()
            .filter(|l| g2l.contains_key(&l.to_string()))
            .count();
        let train = store.task(task, Split::Train).unwrap();
        let in_train = train
            .ids()
            .iter()
            .filter(|id| anchors.ids().contains(id))
            .count();
        assert_eq!(in_train, expected);
        assert!(train.labels().iter().all(|&l| (l as usize) < g2l.len()));
    }
}

#[test]
fn test_more_sample_tasks_than_samples_is_rejected() {
    let (train, test) = gaussian_blobs(2, 3, 2, 0.5, 2).unwrap();
    assert!(matches!(
        TaskPartitioner::disjoint_samples(4)
            .with_anchors(1)
            .partition(&train, &test, 2),
        Err(Error::InvalidConfig(_))
    ));
}
