//! Split, task-key and embedding-column enumerations.
//!
//! Every pipeline stage resolves these once up front into a concrete key or
//! column selector; nothing downstream dispatches on strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One partition of a task's samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
    Anchors,
}

impl Split {
    pub const ALL: [Split; 4] = [Split::Train, Split::Val, Split::Test, Split::Anchors];

    /// Splits that carry task-local labels.
    pub const LABELLED: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Splits that receive relative embeddings.
    pub const PROJECTED: [Split; 2] = [Split::Train, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
            Split::Anchors => "anchors",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite store key, `task_{i}_{split}`.
#[inline]
pub fn task_key(task: usize, split: Split) -> String {
    format!("task_{}_{}", task, split.as_str())
}

/// Key of a task inside the class-mapping metadata, `task_{i}`.
#[inline]
pub fn task_name(task: usize) -> String {
    format!("task_{}", task)
}

/// Which embedding column an evaluator reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSource {
    /// The encoder output, `embedding`.
    #[default]
    Absolute,
    /// Cosine similarities to the anchors, `relative_embeddings`.
    Relative,
}

impl EmbeddingSource {
    pub fn from_use_relatives(use_relatives: bool) -> Self {
        if use_relatives {
            EmbeddingSource::Relative
        } else {
            EmbeddingSource::Absolute
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            EmbeddingSource::Absolute => "embedding",
            EmbeddingSource::Relative => "relative_embeddings",
        }
    }
}

impl fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}
