use std::collections::BTreeMap;
use std::fs;

use crate::error::Error;
use crate::metadata::{RunMetadata, METADATA_FILE};
use crate::split::{task_key, Split};
use crate::store::{DatasetStore, SampleStore};
use crate::tests::{anchor_store, blob_store, NUM_ANCHORS, NUM_TASKS};

#[test]
fn test_metadata_inverts_class_mapping() {
    let mut meta = RunMetadata::new(1);
    meta.set_class_mapping(1, &BTreeMap::from([(4, 0), (9, 1), (2, 2)]));

    let l2g = meta.local_to_global(1).unwrap();
    assert_eq!(l2g.len(), 3);
    assert_eq!(l2g[&0], 4);
    assert_eq!(l2g[&1], 9);
    assert_eq!(l2g[&2], 2);

    assert!(matches!(
        meta.local_to_global(2),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_metadata_rejects_non_bijective_mapping() {
    let mut meta = RunMetadata::new(1);
    meta.set_class_mapping(1, &BTreeMap::from([(4, 0), (9, 0)]));
    assert!(matches!(
        meta.local_to_global(1),
        Err(Error::NonBijectiveMapping { task: 1, local: 0 })
    ));
}

#[test]
fn test_metadata_json_layout() {
    let json = r#"{"num_tasks": 1, "global_to_local_class_mappings": {"task_1": {"3": 0, "7": 1}}}"#;
    let meta: RunMetadata = serde_json::from_str(json).unwrap();
    assert_eq!(meta.num_tasks, 1);
    assert_eq!(meta.local_to_global(1).unwrap()[&1], 7);
}

#[test]
fn test_store_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = blob_store();
    store.save_to_disk(dir.path()).unwrap();

    assert!(dir.path().join(METADATA_FILE).is_file());
    assert!(dir.path().join(task_key(0, Split::Train)).is_dir());

    let loaded = DatasetStore::load_from_disk(dir.path()).unwrap();
    assert_eq!(loaded.samples(), store.samples());
    assert_eq!(loaded.metadata(), store.metadata());
    assert!(loaded.processed_tasks().is_empty());
}

#[test]
fn test_sample_store_ignores_stray_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = anchor_store(&[vec![1, 2], vec![1, 2]]);
    store.samples().save_to_disk(dir.path()).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a split").unwrap();
    fs::create_dir_all(dir.path().join("empty_dir")).unwrap();

    let loaded = SampleStore::load_from_disk(dir.path()).unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(loaded.contains("task_0_anchors"));
    assert!(loaded.contains("task_1_anchors"));
}

#[test]
fn test_missing_split_is_reported_by_key() {
    let store = anchor_store(&[vec![1], vec![1]]);
    match store.task(1, Split::Test) {
        Err(Error::MissingSplit(key)) => assert_eq!(key, "task_1_test"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(store.has_split(1, Split::Anchors));
    assert!(!store.has_split(1, Split::Val));
}

#[test]
fn test_every_task_shares_the_anchors() {
    let store = blob_store();
    assert_eq!(store.tasks(), 0..=NUM_TASKS);
    let reference = store.task(0, Split::Anchors).unwrap();
    assert_eq!(reference.len(), NUM_ANCHORS);
    for task in store.tasks() {
        assert_eq!(store.task(task, Split::Anchors).unwrap(), reference);
    }
}

#[test]
fn test_subsample_anchors_keeps_prefix() {
    let mut store = anchor_store(&[vec![5, 6, 7, 8], vec![5, 6, 7, 8]]);

    assert_eq!(store.subsample_anchors(10).unwrap(), 4);
    assert_eq!(store.task(1, Split::Anchors).unwrap().len(), 4);

    assert_eq!(store.subsample_anchors(2).unwrap(), 2);
    for task in store.tasks() {
        assert_eq!(store.task(task, Split::Anchors).unwrap().ids(), &[5, 6]);
    }
}

#[test]
fn test_processed_tasks_lifecycle() {
    let mut store = anchor_store(&[vec![1], vec![1]]);
    assert!(!store.is_processed(1));
    store.mark_processed(1);
    assert!(store.is_processed(1));
    assert_eq!(store.processed_tasks().len(), 1);

    assert!(!store.is_reconciled(1));
    store.mark_reconciled(1);
    assert!(store.is_reconciled(1));

    let rebuilt = DatasetStore::new(store.samples().clone(), store.metadata().clone());
    assert!(rebuilt.processed_tasks().is_empty());
    assert!(!rebuilt.is_reconciled(1));
}
