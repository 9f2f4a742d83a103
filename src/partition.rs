//! Task partitioning of one labelled, embedded pool.
//!
//! Builds a [`DatasetStore`] in the on-disk layout the pipeline consumes:
//! task 0 holds every train/test sample with global labels and every task
//! carries the same anchors drawn from the train pool. Tasks `1..=num_tasks`
//! are disjoint either in classes (each task sees a group of classes,
//! relabelled to a dense local range) or in samples (every task sees every
//! class through its own shard, with an identity class mapping).
//!
//! Anchor samples stay in the task-0 train split and are left out of the
//! per-task train splits unless `train_on_anchors` is set, in which case each
//! task trains on its shard plus the anchors.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metadata::RunMetadata;
use crate::samples::{assign_sequential_ids, SampleCollection};
use crate::split::{task_key, Split};
use crate::store::{DatasetStore, SampleStore};

/// What the partitioned tasks are disjoint in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disjointness {
    #[default]
    Classes,
    /// Same classes everywhere, disjoint sample shards.
    Samples,
}

#[derive(Clone, Debug)]
pub struct TaskPartitioner {
    num_tasks: usize,
    disjointness: Disjointness,
    num_anchors: usize,
    val_fraction: f64,
    train_on_anchors: bool,
    seed: u64,
}

impl TaskPartitioner {
    pub fn new(num_tasks: usize, disjointness: Disjointness) -> Self {
        Self {
            num_tasks,
            disjointness,
            num_anchors: 16,
            val_fraction: 0.0,
            train_on_anchors: false,
            seed: 0,
        }
    }

    pub fn disjoint_classes(num_tasks: usize) -> Self {
        Self::new(num_tasks, Disjointness::Classes)
    }

    pub fn disjoint_samples(num_tasks: usize) -> Self {
        Self::new(num_tasks, Disjointness::Samples)
    }

    pub fn with_anchors(mut self, num_anchors: usize) -> Self {
        self.num_anchors = num_anchors;
        self
    }

    /// Carves a per-task `val` split out of each task's train split.
    pub fn with_val_fraction(mut self, val_fraction: f64) -> Self {
        self.val_fraction = val_fraction;
        self
    }

    /// Appends the anchors to every task's train split. Class-disjoint tasks
    /// only take the anchors of their own classes.
    pub fn with_train_on_anchors(mut self, train_on_anchors: bool) -> Self {
        self.train_on_anchors = train_on_anchors;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn disjointness(&self) -> Disjointness {
        self.disjointness
    }

    fn check_tasks(&self, available: usize, what: &str) -> Result<()> {
        if self.num_tasks == 0 || available < self.num_tasks {
            return Err(Error::InvalidConfig(format!(
                "cannot split {} {} into {} disjoint tasks",
                available, what, self.num_tasks
            )));
        }
        Ok(())
    }

    /// Global class groups, one per task, sorted within each group.
    pub fn class_groups(&self, num_classes: usize) -> Result<Vec<Vec<i64>>> {
        self.check_tasks(num_classes, "classes")?;
        let mut classes: Vec<i64> = (0..num_classes as i64).collect();
        classes.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));

        let mut groups = vec![Vec::new(); self.num_tasks];
        for (i, c) in classes.into_iter().enumerate() {
            groups[i % self.num_tasks].push(c);
        }
        groups.iter_mut().for_each(|g| g.sort_unstable());
        Ok(groups)
    }

    /// Row shards of `rows`, one per task: seeded shuffle, round-robin deal,
    /// original order restored within each shard.
    fn sample_shards(&self, mut rows: Vec<usize>, seed: u64) -> Result<Vec<Vec<usize>>> {
        self.check_tasks(rows.len(), "samples")?;
        rows.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

        let mut shards = vec![Vec::new(); self.num_tasks];
        for (i, r) in rows.into_iter().enumerate() {
            shards[i % self.num_tasks].push(r);
        }
        shards.iter_mut().for_each(|s| s.sort_unstable());
        Ok(shards)
    }

    /// Partitions an embedded, globally labelled train/test pool.
    pub fn partition(
        &self,
        train: &SampleCollection,
        test: &SampleCollection,
        num_classes: usize,
    ) -> Result<DatasetStore> {
        if self.num_anchors == 0 || self.num_anchors > train.len() {
            return Err(Error::InvalidConfig(format!(
                "cannot draw {} anchors from {} train samples",
                self.num_anchors,
                train.len()
            )));
        }
        info!(
            "Partitioning {} samples of {} classes into {} tasks disjoint in {:?} with {} anchors",
            train.len() + test.len(),
            num_classes,
            self.num_tasks,
            self.disjointness,
            self.num_anchors
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(1));
        let mut pool: Vec<usize> = (0..train.len()).collect();
        pool.shuffle(&mut rng);
        let anchors = train.subset(&pool[..self.num_anchors]);
        let anchor_ids: HashSet<u64> = anchors.ids().iter().copied().collect();

        // (class mapping, train, test) per task
        let tasks: Vec<(BTreeMap<i64, i64>, SampleCollection, SampleCollection)> =
            match self.disjointness {
                Disjointness::Classes => self
                    .class_groups(num_classes)?
                    .iter()
                    .map(|group| {
                        let mapping: BTreeMap<i64, i64> = group
                            .iter()
                            .enumerate()
                            .map(|(local, &global)| (global, local as i64))
                            .collect();
                        let task_train = local_subset(train, &mapping, Some(&anchor_ids))?;
                        let task_test = local_subset(test, &mapping, None)?;
                        Ok((mapping, task_train, task_test))
                    })
                    .collect::<Result<_>>()?,
                Disjointness::Samples => {
                    let identity: BTreeMap<i64, i64> =
                        (0..num_classes as i64).map(|c| (c, c)).collect();
                    let train_rows: Vec<usize> = (0..train.len())
                        .filter(|&i| !anchor_ids.contains(&train.ids()[i]))
                        .collect();
                    let train_shards = self.sample_shards(train_rows, self.seed.wrapping_add(2))?;
                    let test_shards =
                        self.sample_shards((0..test.len()).collect(), self.seed.wrapping_add(3))?;
                    train_shards
                        .iter()
                        .zip(&test_shards)
                        .map(|(tr, te)| (identity.clone(), train.subset(tr), test.subset(te)))
                        .collect()
                }
            };

        let mut metadata = RunMetadata::new(self.num_tasks);
        let mut samples = SampleStore::new();
        samples.insert(task_key(0, Split::Train), train.clone());
        samples.insert(task_key(0, Split::Test), test.clone());

        for (t, (mapping, task_train, task_test)) in tasks.into_iter().enumerate() {
            let task = t + 1;
            metadata.set_class_mapping(task, &mapping);

            let (fit, val) = if self.val_fraction > 0.0 {
                let (fit, val) =
                    task_train.train_test_split(self.val_fraction, self.seed + task as u64)?;
                (fit, Some(val))
            } else {
                (task_train, None)
            };
            let fit = if self.train_on_anchors {
                let local_anchors = local_subset(&anchors, &mapping, None)?;
                SampleCollection::concatenate(&[&fit, &local_anchors])?
            } else {
                fit
            };
            debug!(
                "Task {}: {} train, {} test, classes {:?}",
                task,
                fit.len(),
                task_test.len(),
                mapping.keys().collect::<Vec<_>>()
            );

            samples.insert(task_key(task, Split::Train), fit);
            if let Some(val) = val {
                samples.insert(task_key(task, Split::Val), val);
            }
            samples.insert(task_key(task, Split::Test), task_test);
        }

        let mut store = DatasetStore::new(samples, metadata);
        store.share_anchors(&anchors);
        Ok(store)
    }
}

/// Rows whose global label is in `mapping`, relabelled to local labels.
fn local_subset(
    collection: &SampleCollection,
    mapping: &BTreeMap<i64, i64>,
    exclude: Option<&HashSet<u64>>,
) -> Result<SampleCollection> {
    let rows: Vec<usize> = (0..collection.len())
        .filter(|&i| mapping.contains_key(&collection.labels()[i]))
        .filter(|&i| exclude.map_or(true, |ex| !ex.contains(&collection.ids()[i])))
        .collect();
    let mut subset = collection.subset(&rows);
    subset.map_labels(|_, global| Ok(mapping[&global]))?;
    Ok(subset)
}

/// Isotropic Gaussian clusters, one centre per class, labels `0..num_classes`.
///
/// Returns `(train, test)` with sequential ids, `per_class` train and
/// `per_class / 4` (at least 1) test samples per class.
pub fn gaussian_blobs(
    num_classes: usize,
    per_class: usize,
    dim: usize,
    spread: f64,
    seed: u64,
) -> Result<(SampleCollection, SampleCollection)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let centres: Vec<Vec<f64>> = (0..num_classes)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    let z: f64 = StandardNormal.sample(&mut rng);
                    3.0 * z
                })
                .collect()
        })
        .collect();

    let mut draw = |count: usize| -> Result<SampleCollection> {
        let mut labels = Vec::with_capacity(count * num_classes);
        let mut rows = Vec::with_capacity(count * num_classes);
        for (class, centre) in centres.iter().enumerate() {
            for _ in 0..count {
                labels.push(class as i64);
                rows.push(
                    centre
                        .iter()
                        .map(|c| {
                            let z: f64 = StandardNormal.sample(&mut rng);
                            c + spread * z
                        })
                        .collect(),
                );
            }
        }
        SampleCollection::new(vec![0; labels.len()], labels)?.with_embeddings(rows)
    };

    let mut train = draw(per_class)?;
    let mut test = draw((per_class / 4).max(1))?;
    assign_sequential_ids(&mut train, &mut test);
    Ok((train, test))
}
