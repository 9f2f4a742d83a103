//! Relative representation analysis of embeddings produced by independently
//! trained tasks that are disjoint in classes or in samples.
//!
//! Every task shares one anchor set. Projecting each sample onto the
//! normalised anchors (cosine similarity) puts all tasks into the same
//! relative space, so their embeddings can be merged and compared against a
//! reference task trained on every class.
//!
//! - [`store`]: on-disk sample collections keyed `task_{i}_{split}` plus run metadata.
//! - [`labels`], [`anchors`]: label reconciliation and anchor consistency.
//! - [`projection`]: relative projection of every split.
//! - [`merge`]: cross-task merge with id alignment checks.
//! - [`cka`], [`knn`], [`classifier`]: the comparative evaluations.
//! - [`pipeline`], [`driver`]: one configuration, and a whole experiment.
//! - [`partition`]: synthetic class- or sample-disjoint task stores.
//!
//! # Examples
//!
//! ```
//! use relspace::partition::{gaussian_blobs, TaskPartitioner};
//! use relspace::pipeline::{prepare, PipelineParams};
//!
//! let (train, test) = gaussian_blobs(4, 20, 8, 0.5, 7).unwrap();
//! let mut store = TaskPartitioner::disjoint_classes(2)
//!     .with_anchors(6)
//!     .partition(&train, &test, 4)
//!     .unwrap();
//!
//! let merged = prepare(&mut store, &PipelineParams::new(4)).unwrap();
//! assert_eq!(merged.merged_test.ids(), merged.original_test.ids());
//! ```

pub mod anchors;
pub mod cka;
pub mod classifier;
pub mod driver;
pub mod error;
pub mod knn;
pub mod labels;
pub mod merge;
pub mod metadata;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod projection;
pub mod samples;
pub mod split;
pub mod store;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
