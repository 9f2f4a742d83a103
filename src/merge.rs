//! Cross-task merge and alignment check.
//!
//! The per-task train/test partitions of tasks `1..=num_tasks` are stacked and
//! sorted by id, then compared against the id-sorted reference task 0. For the
//! test split the merged ids must reproduce the reference ids exactly. For the
//! train split the reference may legitimately hold extra samples (the anchors
//! are drawn from it), so the check is a [`TrainAlignment`] policy.

use std::collections::HashSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::anchors::compare_ids;
use crate::error::{Error, IdMismatch, Result};
use crate::samples::SampleCollection;
use crate::split::Split;
use crate::store::DatasetStore;

/// How the merged train split is checked against the reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainAlignment {
    /// Sort only, no check.
    #[default]
    Skip,
    /// Every merged id must occur in the reference.
    Subset,
    /// Same id sequence as the reference, like the test split.
    Exact,
}

/// Id-sorted merged and reference splits handed to the evaluators.
#[derive(Clone, Debug)]
pub struct MergedSplits {
    pub merged_train: SampleCollection,
    pub merged_test: SampleCollection,
    pub original_train: SampleCollection,
    pub original_test: SampleCollection,
}

/// Exact id-sequence equality between a merged split and its reference.
pub fn check_alignment(
    split: Split,
    merged: &SampleCollection,
    reference: &SampleCollection,
) -> Result<()> {
    match compare_ids(merged.ids(), reference.ids()) {
        Some(detail) => Err(Error::Alignment { split, detail }),
        None => Ok(()),
    }
}

/// Every merged id occurs in the reference.
pub fn check_subset(
    split: Split,
    merged: &SampleCollection,
    reference: &SampleCollection,
) -> Result<()> {
    let known: HashSet<u64> = reference.ids().iter().copied().collect();
    match merged.ids().iter().position(|id| !known.contains(id)) {
        Some(index) => Err(Error::Alignment {
            split,
            detail: IdMismatch::Missing {
                index,
                id: merged.ids()[index],
            },
        }),
        None => Ok(()),
    }
}

fn merge_split(store: &DatasetStore, split: Split) -> Result<SampleCollection> {
    let parts = (1..=store.num_tasks())
        .map(|task| store.task(task, split))
        .collect::<Result<Vec<_>>>()?;
    let merged = SampleCollection::concatenate(&parts)?.sorted_by_id();
    debug!(
        "Merged {} {} partitions into {} samples",
        parts.len(),
        split,
        merged.len()
    );
    Ok(merged)
}

/// Merges tasks `1..=num_tasks` and checks them against task 0.
pub fn merge_tasks(store: &DatasetStore, train_policy: TrainAlignment) -> Result<MergedSplits> {
    if store.num_tasks() == 0 {
        return Err(Error::EmptyCollection(
            "no partitioned tasks to merge".to_string(),
        ));
    }
    info!("Merging {} tasks", store.num_tasks());

    let merged_train = merge_split(store, Split::Train)?;
    let merged_test = merge_split(store, Split::Test)?;
    let original_train = store.task(0, Split::Train)?.sorted_by_id();
    let original_test = store.task(0, Split::Test)?.sorted_by_id();

    check_alignment(Split::Test, &merged_test, &original_test)?;

    match train_policy {
        TrainAlignment::Skip => {
            if merged_train.len() != original_train.len() {
                debug!(
                    "Merged train has {} samples, reference has {} (not checked)",
                    merged_train.len(),
                    original_train.len()
                );
            }
        }
        TrainAlignment::Subset => check_subset(Split::Train, &merged_train, &original_train)?,
        TrainAlignment::Exact => check_alignment(Split::Train, &merged_train, &original_train)?,
    }
    info!(
        "Merged test split aligned with reference ({} samples)",
        merged_test.len()
    );

    Ok(MergedSplits {
        merged_train,
        merged_test,
        original_train,
        original_test,
    })
}
