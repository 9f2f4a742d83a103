//! Dataset store: per-task sample tables plus run metadata.
//!
//! `SampleStore` is pure tabular data with generic persistence (one
//! sub-directory per `task_{i}_{split}` key). `DatasetStore` composes it with
//! the [`RunMetadata`] value, which has its own `metadata.json` file, and with
//! the set of tasks that have already been projected.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::metadata::{RunMetadata, METADATA_FILE};
use crate::samples::SampleCollection;
use crate::split::{task_key, Split};

const SAMPLES_FILE: &str = "samples.json";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleStore {
    collections: BTreeMap<String, SampleCollection>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Result<&SampleCollection> {
        self.collections
            .get(key)
            .ok_or_else(|| Error::MissingSplit(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &str) -> Result<&mut SampleCollection> {
        self.collections
            .get_mut(key)
            .ok_or_else(|| Error::MissingSplit(key.to_string()))
    }

    pub fn insert(&mut self, key: impl Into<String>, collection: SampleCollection) {
        self.collections.insert(key.into(), collection);
    }

    pub fn remove(&mut self, key: &str) -> Option<SampleCollection> {
        self.collections.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.collections.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Writes every collection to `dir/<key>/samples.json`.
    pub fn save_to_disk(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        for (key, collection) in &self.collections {
            let sub = dir.join(key);
            fs::create_dir_all(&sub)?;
            fs::write(sub.join(SAMPLES_FILE), serde_json::to_vec(collection)?)?;
            trace!("Saved {} ({} samples)", key, collection.len());
        }
        debug!("Saved {} collections to {}", self.len(), dir.display());
        Ok(())
    }

    /// Reads every `dir/<key>/samples.json`; other entries are ignored.
    pub fn load_from_disk(dir: &Path) -> Result<Self> {
        let mut store = Self::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file = entry.path().join(SAMPLES_FILE);
            if !entry.file_type()?.is_dir() || !file.is_file() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().into_owned();
            let collection: SampleCollection = serde_json::from_slice(&fs::read(&file)?)?;
            collection.validate()?;
            trace!("Loaded {} ({} samples)", key, collection.len());
            store.insert(key, collection);
        }
        debug!("Loaded {} collections from {}", store.len(), dir.display());
        Ok(store)
    }
}

/// Sample tables, metadata and processing state of one run.
///
/// `processed_tasks` starts empty, gains a task the first time it is projected
/// and is consulted before projecting again. `reconciled_tasks` does the same
/// for label reconciliation. Both are only reset by building a new store.
#[derive(Clone, Debug, Default)]
pub struct DatasetStore {
    samples: SampleStore,
    metadata: RunMetadata,
    processed_tasks: BTreeSet<usize>,
    reconciled_tasks: BTreeSet<usize>,
}

impl DatasetStore {
    pub fn new(samples: SampleStore, metadata: RunMetadata) -> Self {
        Self {
            samples,
            metadata,
            processed_tasks: BTreeSet::new(),
            reconciled_tasks: BTreeSet::new(),
        }
    }

    pub fn load_from_disk(dir: &Path) -> Result<Self> {
        info!("Loading dataset store from {}", dir.display());
        let samples = SampleStore::load_from_disk(dir)?;
        let metadata = RunMetadata::load(&dir.join(METADATA_FILE))?;
        Ok(Self::new(samples, metadata))
    }

    pub fn save_to_disk(&self, dir: &Path) -> Result<()> {
        info!("Saving dataset store to {}", dir.display());
        self.samples.save_to_disk(dir)?;
        self.metadata.save(&dir.join(METADATA_FILE))
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut SampleStore {
        &mut self.samples
    }

    #[inline]
    pub fn num_tasks(&self) -> usize {
        self.metadata.num_tasks
    }

    /// The reference task 0 followed by every partitioned task.
    #[inline]
    pub fn tasks(&self) -> RangeInclusive<usize> {
        0..=self.num_tasks()
    }

    pub fn task(&self, task: usize, split: Split) -> Result<&SampleCollection> {
        self.samples.get(&task_key(task, split))
    }

    pub fn task_mut(&mut self, task: usize, split: Split) -> Result<&mut SampleCollection> {
        self.samples.get_mut(&task_key(task, split))
    }

    pub fn set_task(&mut self, task: usize, split: Split, collection: SampleCollection) {
        self.samples.insert(task_key(task, split), collection);
    }

    pub fn has_split(&self, task: usize, split: Split) -> bool {
        self.samples.contains(&task_key(task, split))
    }

    /// Gives every task its own copy of the same anchor collection.
    pub fn share_anchors(&mut self, anchors: &SampleCollection) {
        for task in self.tasks() {
            self.set_task(task, Split::Anchors, anchors.clone());
        }
        debug!(
            "Shared {} anchors across {} tasks",
            anchors.len(),
            self.num_tasks() + 1
        );
    }

    /// Keeps only the first `num_anchors` anchors of every task.
    ///
    /// Returns the number of anchors in use afterwards; nothing changes when
    /// `num_anchors` is not smaller than the stored count.
    pub fn subsample_anchors(&mut self, num_anchors: usize) -> Result<usize> {
        let available = self.task(0, Split::Anchors)?.len();
        if num_anchors >= available {
            return Ok(available);
        }
        info!("Selecting only {} anchors out of {}", num_anchors, available);
        for task in self.tasks() {
            let anchors = self.task(task, Split::Anchors)?.select(0..num_anchors)?;
            self.set_task(task, Split::Anchors, anchors);
        }
        Ok(num_anchors)
    }

    pub fn mark_processed(&mut self, task: usize) {
        self.processed_tasks.insert(task);
    }

    pub fn is_processed(&self, task: usize) -> bool {
        self.processed_tasks.contains(&task)
    }

    pub fn processed_tasks(&self) -> &BTreeSet<usize> {
        &self.processed_tasks
    }

    pub fn mark_reconciled(&mut self, task: usize) {
        self.reconciled_tasks.insert(task);
    }

    /// Whether the labels of `task` are already global.
    pub fn is_reconciled(&self, task: usize) -> bool {
        self.reconciled_tasks.contains(&task)
    }
}
