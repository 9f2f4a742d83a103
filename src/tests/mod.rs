mod test_knn;
mod test_partition;
mod test_samples;
mod test_store;

use crate::metadata::RunMetadata;
use crate::partition::{gaussian_blobs, TaskPartitioner};
use crate::samples::SampleCollection;
use crate::split::{task_key, Split};
use crate::store::{DatasetStore, SampleStore};

pub const NUM_CLASSES: usize = 6;
pub const NUM_TASKS: usize = 3;
pub const NUM_ANCHORS: usize = 8;
pub const DIM: usize = 12;
pub const SEED: u64 = 42;

/// Collection with an absolute embedding column.
pub fn collection(ids: &[u64], labels: &[i64], rows: Vec<Vec<f64>>) -> SampleCollection {
    SampleCollection::new(ids.to_vec(), labels.to_vec())
        .unwrap()
        .with_embeddings(rows)
        .unwrap()
}

/// One-hot-ish 4-dim rows, distinct per id and never zero.
pub fn rows_for(ids: &[u64]) -> Vec<Vec<f64>> {
    ids.iter()
        .map(|&id| {
            let mut r = vec![0.1; 4];
            r[(id % 4) as usize] += 1.0 + id as f64 * 0.01;
            r
        })
        .collect()
}

/// Well-separated synthetic store with task-local labels.
pub fn blob_store() -> DatasetStore {
    let (train, test) = gaussian_blobs(NUM_CLASSES, 40, DIM, 0.3, SEED).unwrap();
    TaskPartitioner::disjoint_classes(NUM_TASKS)
        .with_anchors(NUM_ANCHORS)
        .with_seed(SEED)
        .partition(&train, &test, NUM_CLASSES)
        .unwrap()
}

/// Hand-built store: one anchor id list per task (index 0 is the reference).
pub fn anchor_store(anchor_ids: &[Vec<u64>]) -> DatasetStore {
    let mut samples = SampleStore::new();
    for (task, ids) in anchor_ids.iter().enumerate() {
        let labels = vec![0; ids.len()];
        samples.insert(
            task_key(task, Split::Anchors),
            collection(ids, &labels, rows_for(ids)),
        );
    }
    DatasetStore::new(samples, RunMetadata::new(anchor_ids.len() - 1))
}
