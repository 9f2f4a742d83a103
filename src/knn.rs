//! Nearest-centroid classification.
//!
//! One prototype per class (the mean training embedding of that class), test
//! samples take the class of the closest prototype under Euclidean distance.
//! A class with no training samples has no prototype and is never predicted.

use log::{debug, info};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::metrics::{accuracy, class_indices, ClassificationResult};
use crate::samples::SampleCollection;
use crate::split::EmbeddingSource;

/// Per-class mean of `x`; `None` for classes without samples.
pub fn compute_prototypes(
    x: &[Vec<f64>],
    y: &[i64],
    num_classes: usize,
) -> Result<Vec<Option<Vec<f64>>>> {
    if x.len() != y.len() {
        return Err(Error::DimensionMismatch {
            context: "prototype labels".to_string(),
            expected: x.len(),
            got: y.len(),
        });
    }
    let classes = class_indices(y, num_classes)?;
    let dim = x.first().map(|r| r.len()).unwrap_or(0);

    let prototypes = (0..num_classes)
        .into_par_iter()
        .map(|c| {
            let mut centroid = vec![0.0; dim];
            let mut count = 0usize;
            for (row, _) in x.iter().zip(&classes).filter(|&(_, &k)| k == c) {
                centroid.iter_mut().zip(row).for_each(|(a, b)| *a += b);
                count += 1;
            }
            if count == 0 {
                return None;
            }
            centroid.iter_mut().for_each(|v| *v /= count as f64);
            Some(centroid)
        })
        .collect();
    Ok(prototypes)
}

/// Index and squared distance of the closest present prototype.
pub fn nearest_prototype(row: &[f64], prototypes: &[Option<Vec<f64>>]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in prototypes.iter().enumerate() {
        let Some(p) = p else { continue };
        let d2: f64 = row.iter().zip(p).map(|(a, b)| (a - b).powi(2)).sum();
        if best.map_or(true, |(_, b)| d2 < b) {
            best = Some((i, d2));
        }
    }
    best
}

#[derive(Clone, Debug)]
pub struct KnnClassifier {
    prototypes: Vec<Option<Vec<f64>>>,
    source: EmbeddingSource,
}

impl KnnClassifier {
    pub fn fit(
        train: &SampleCollection,
        source: EmbeddingSource,
        num_classes: usize,
    ) -> Result<Self> {
        let x = train.require_column(source, "knn train")?;
        let prototypes = compute_prototypes(x, train.labels(), num_classes)?;
        if prototypes.iter().all(Option::is_none) {
            return Err(Error::EmptyCollection("knn train has no samples".to_string()));
        }
        debug!(
            "Fitted {} prototypes on {} ({} classes empty)",
            num_classes,
            source,
            prototypes.iter().filter(|p| p.is_none()).count()
        );
        Ok(Self { prototypes, source })
    }

    pub fn prototypes(&self) -> &[Option<Vec<f64>>] {
        &self.prototypes
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<usize> {
        rows.par_iter()
            .map(|r| nearest_prototype(r, &self.prototypes).map_or(0, |(c, _)| c))
            .collect()
    }

    pub fn evaluate(&self, test: &SampleCollection) -> Result<ClassificationResult> {
        let x = test.require_column(self.source, "knn test")?;
        let targets = class_indices(test.labels(), self.prototypes.len())?;
        let predictions = self.predict(x);
        Ok(ClassificationResult {
            total_acc: accuracy(&predictions, &targets),
        })
    }
}

/// Fits prototypes on `train` and reports accuracy on `test`.
pub fn run_knn_class_experiment(
    num_classes: usize,
    train: &SampleCollection,
    test: &SampleCollection,
    use_relatives: bool,
) -> Result<ClassificationResult> {
    let source = EmbeddingSource::from_use_relatives(use_relatives);
    let result = KnnClassifier::fit(train, source, num_classes)?.evaluate(test)?;
    info!("knn on {}: total_acc={:.4}", source, result.total_acc);
    Ok(result)
}
