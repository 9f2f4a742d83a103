use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Result record of one classification run, serialised into the result files.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub total_acc: f64,
}

/// Fraction of correct predictions; 0.0 for no predictions.
pub fn accuracy(predictions: &[usize], targets: &[usize]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(p, t)| p == t)
        .count();
    correct as f64 / predictions.len() as f64
}

/// Converts stored labels into class indices, checking `0 <= y < num_classes`.
pub fn class_indices(labels: &[i64], num_classes: usize) -> Result<Vec<usize>> {
    labels
        .iter()
        .map(|&y| {
            usize::try_from(y)
                .ok()
                .filter(|&c| c < num_classes)
                .ok_or_else(|| {
                    Error::InvalidConfig(format!("label {y} outside 0..{num_classes}"))
                })
        })
        .collect()
}
