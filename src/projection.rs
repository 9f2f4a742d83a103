//! Relative projection: samples expressed as cosine similarities to anchors.
//!
//! For anchors `A` (A×D) and samples `X` (N×D) the relative space is
//! `normalize(X) @ normalize(A)^T`, an N×A matrix whose row `n` belongs to
//! sample `n`. Rows are computed independently (in parallel) with a fixed
//! summation order, so repeated runs are bit-identical.
//!
//! Rows whose norm is exactly zero or not finite are rejected with
//! [`Error::DegenerateVector`], never clamped. Tiny but non-zero rows are
//! normalised like any other.

use log::{debug, info, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::split::{task_key, EmbeddingSource, Split};
use crate::store::DatasetStore;

/// Euclidean norm without allocating.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// L2-normalises every row; `key` names the collection in errors.
pub fn l2_normalize(rows: &[Vec<f64>], key: &str) -> Result<Vec<Vec<f64>>> {
    let norms: Vec<f64> = rows.par_iter().map(|r| norm(r)).collect();

    // report the first bad row, independent of scheduling
    if let Some((row, &n)) = norms
        .iter()
        .enumerate()
        .find(|&(_, &n)| n == 0.0 || !n.is_finite())
    {
        return Err(Error::DegenerateVector {
            key: key.to_string(),
            row,
            norm: n,
        });
    }

    Ok(rows
        .par_iter()
        .zip(norms.par_iter())
        .map(|(r, &n)| r.iter().map(|x| x / n).collect())
        .collect())
}

/// Cosine similarity of every sample to every anchor, N×A.
pub fn relative_projection(
    anchors: &[Vec<f64>],
    samples: &[Vec<f64>],
    key: &str,
) -> Result<Vec<Vec<f64>>> {
    let n_anchors = anchors.len();
    if n_anchors == 0 {
        return Err(Error::EmptyCollection(format!("{key}: no anchors")));
    }
    let dim = anchors[0].len();
    if let Some(bad) = samples.iter().chain(anchors).find(|r| r.len() != dim) {
        return Err(Error::DimensionMismatch {
            context: format!("{key} embedding width"),
            expected: dim,
            got: bad.len(),
        });
    }

    let norm_anchors = l2_normalize(anchors, &format!("{key} anchors"))?;
    let abs_space = l2_normalize(samples, key)?;

    trace!(
        "{}: projecting {}x{} onto {} anchors",
        key,
        abs_space.len(),
        dim,
        n_anchors
    );

    Ok(abs_space
        .par_iter()
        .map(|x| {
            norm_anchors
                .iter()
                .map(|a| x.iter().zip(a).map(|(v, w)| v * w).sum::<f64>())
                .collect()
        })
        .collect())
}

/// Whether embeddings are mean-centred before projecting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Centering {
    #[default]
    Disabled,
    /// Subtract each split's own mean (anchors included).
    PerSplit,
}

/// Attaches `relative_embeddings` to the projected splits of each task.
#[derive(Clone, Debug)]
pub struct RelativeProjector {
    splits: Vec<Split>,
    centering: Centering,
}

impl Default for RelativeProjector {
    fn default() -> Self {
        Self {
            splits: Split::PROJECTED.to_vec(),
            centering: Centering::Disabled,
        }
    }
}

impl RelativeProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_splits(mut self, splits: &[Split]) -> Self {
        self.splits = splits.to_vec();
        self
    }

    pub fn with_centering(mut self, centering: Centering) -> Self {
        info!("Setting centering: {:?}", centering);
        self.centering = centering;
        self
    }

    /// Projects one task. Returns `false` if the task was already processed.
    ///
    /// Nothing is written to the store unless every split projects cleanly.
    pub fn project_task(&self, store: &mut DatasetStore, task: usize) -> Result<bool> {
        if store.is_processed(task) {
            debug!("Task {} already projected, skipping", task);
            return Ok(false);
        }

        let mut anchors = store.task(task, Split::Anchors)?.clone();
        if self.centering == Centering::PerSplit {
            anchors.center(EmbeddingSource::Absolute)?;
        }
        let anchor_rows =
            anchors.require_column(EmbeddingSource::Absolute, &task_key(task, Split::Anchors))?;

        let mut updates = Vec::with_capacity(self.splits.len());
        for &split in &self.splits {
            let key = task_key(task, split);
            let mut collection = store.task(task, split)?.clone();
            if self.centering == Centering::PerSplit {
                collection.center(EmbeddingSource::Absolute)?;
            }
            let rel = relative_projection(
                anchor_rows,
                collection.require_column(EmbeddingSource::Absolute, &key)?,
                &key,
            )?;
            collection.set_relative_embeddings(rel)?;
            debug!(
                "{}: relative embeddings {}x{}",
                key,
                collection.len(),
                anchor_rows.len()
            );
            updates.push((split, collection));
        }

        for (split, collection) in updates {
            store.set_task(task, split, collection);
        }
        if self.centering == Centering::PerSplit {
            store.set_task(task, Split::Anchors, anchors);
        }
        store.mark_processed(task);
        Ok(true)
    }

    /// Projects every task `0..=num_tasks`, returning how many were computed.
    pub fn project_store(&self, store: &mut DatasetStore) -> Result<usize> {
        info!(
            "Projecting {} tasks onto anchors (splits {:?})",
            store.num_tasks() + 1,
            self.splits
        );
        let mut projected = 0;
        for task in store.tasks() {
            if self.project_task(store, task)? {
                projected += 1;
            }
        }
        Ok(projected)
    }
}
