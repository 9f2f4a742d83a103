use std::fmt;

use crate::split::Split;

/// Where two id sequences first disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdMismatch {
    /// The sequences have different lengths.
    Length { left: usize, right: usize },
    /// Both sequences have the same length but differ at `index`.
    Index { index: usize, left: u64, right: u64 },
    /// An id of the left sequence does not occur in the right one.
    Missing { index: usize, id: u64 },
}

impl fmt::Display for IdMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdMismatch::Length { left, right } => {
                write!(f, "length mismatch ({left} vs {right})")
            }
            IdMismatch::Index { index, left, right } => {
                write!(f, "first difference at index {index} (id {left} vs id {right})")
            }
            IdMismatch::Missing { index, id } => {
                write!(f, "id {id} at index {index} is absent from the reference")
            }
        }
    }
}

/// All errors raised by the relative-representation pipeline.
///
/// The first four variants are invariant violations: they abort the run and
/// carry enough context (task, split, index) to locate the offending data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A task-local label has no entry in the inverted class mapping.
    #[error("task {task} split {split}: local label {label} has no global mapping")]
    MissingLabelMapping { task: usize, split: Split, label: i64 },

    /// Zero-norm (or non-finite) row met while L2-normalising.
    #[error("{key}: row {row} has a degenerate norm ({norm}), cannot normalise")]
    DegenerateVector { key: String, row: usize, norm: f64 },

    /// Anchor id sequences differ between two tasks.
    #[error("anchors of task {task_a} and task {task_b} differ: {detail}")]
    AnchorMismatch {
        task_a: usize,
        task_b: usize,
        detail: IdMismatch,
    },

    /// Merged per-task ids do not reconstruct the reference ids.
    #[error("merged {split} split does not match the reference: {detail}")]
    Alignment { split: Split, detail: IdMismatch },

    /// Two global labels collapse onto the same local label.
    #[error("task {task}: local label {local} is claimed by more than one global label")]
    NonBijectiveMapping { task: usize, local: i64 },

    /// A kernel or centred matrix with zero energy, similarity is undefined.
    #[error("degenerate kernel: {0}")]
    DegenerateKernel(String),

    #[error("missing split `{0}`")]
    MissingSplit(String),

    #[error("`{key}` has no `{column}` column")]
    MissingColumn { key: String, column: &'static str },

    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    #[error("empty collection: {0}")]
    EmptyCollection(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

/// Convenience Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
