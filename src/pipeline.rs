//! One configuration of the comparative analysis, end to end.
//!
//! Stages run strictly in order and any invariant violation aborts the
//! configuration:
//!
//! 1. label reconciliation (local -> global)
//! 2. optional anchor subsampling
//! 3. anchor consistency check
//! 4. relative projection (optionally centred)
//! 5. cross-task merge and alignment check
//! 6. CKA, nearest-centroid and trained-classifier evaluations

use log::info;
use serde::{Deserialize, Serialize};

use crate::anchors::check_same_anchor_ids;
use crate::cka::{Cka, CkaKernel};
use crate::classifier::{run_classification_experiment, ClassifierParams};
use crate::error::Result;
use crate::knn::run_knn_class_experiment;
use crate::labels::map_labels_to_global;
use crate::merge::{merge_tasks, MergedSplits, TrainAlignment};
use crate::metrics::ClassificationResult;
use crate::projection::{Centering, RelativeProjector};
use crate::samples::SampleCollection;
use crate::split::EmbeddingSource;
use crate::store::DatasetStore;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub num_classes: usize,
    /// Use only the first `n` anchors when fewer than stored are wanted.
    pub num_anchors: Option<usize>,
    pub centering: Centering,
    pub train_alignment: TrainAlignment,
    pub cka_kernel: CkaKernel,
    pub classifier: ClassifierParams,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            num_classes: 0,
            num_anchors: None,
            centering: Centering::Disabled,
            train_alignment: TrainAlignment::Skip,
            cka_kernel: CkaKernel::Linear,
            classifier: ClassifierParams::default(),
        }
    }
}

impl PipelineParams {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            ..Self::default()
        }
    }

    pub fn with_num_anchors(mut self, num_anchors: usize) -> Self {
        self.num_anchors = Some(num_anchors);
        self
    }

    pub fn with_centering(mut self, centering: Centering) -> Self {
        self.centering = centering;
        self
    }

    pub fn with_train_alignment(mut self, policy: TrainAlignment) -> Self {
        self.train_alignment = policy;
        self
    }

    pub fn with_cka_kernel(mut self, kernel: CkaKernel) -> Self {
        self.cka_kernel = kernel;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierParams) -> Self {
        self.classifier = classifier;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CkaResults {
    /// Merged relative vs merged absolute test embeddings.
    pub cka_rel_abs: f64,
    /// Merged relative vs reference relative test embeddings.
    pub cka_tot: f64,
}

/// The same evaluator on the reference (absolute and relative) and merged data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResults {
    pub original_abs: ClassificationResult,
    pub original_rel: ClassificationResult,
    pub merged: ClassificationResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationResults {
    pub cka: CkaResults,
    pub classification: ComparisonResults,
    pub knn: ComparisonResults,
}

/// Stages 1-5: reconcile, check, project and merge.
///
/// `store` must still carry task-local labels, as loaded from disk.
pub fn prepare(store: &mut DatasetStore, params: &PipelineParams) -> Result<MergedSplits> {
    map_labels_to_global(store)?;
    if let Some(n) = params.num_anchors {
        store.subsample_anchors(n)?;
    }
    check_same_anchor_ids(store)?;
    RelativeProjector::new()
        .with_centering(params.centering)
        .project_store(store)?;
    merge_tasks(store, params.train_alignment)
}

pub fn cka_analysis(merged: &MergedSplits, kernel: CkaKernel) -> Result<CkaResults> {
    let cka = Cka::new(kernel);
    let merged_rel = merged
        .merged_test
        .require_column(EmbeddingSource::Relative, "merged test")?;
    let merged_abs = merged
        .merged_test
        .require_column(EmbeddingSource::Absolute, "merged test")?;
    let original_rel = merged
        .original_test
        .require_column(EmbeddingSource::Relative, "original test")?;

    let results = CkaResults {
        cka_rel_abs: cka.score(merged_rel, merged_abs)?,
        cka_tot: cka.score(merged_rel, original_rel)?,
    };
    info!(
        "CKA: rel_abs={:.4}, tot={:.4}",
        results.cka_rel_abs, results.cka_tot
    );
    Ok(results)
}

pub fn knn_analysis(merged: &MergedSplits, num_classes: usize) -> Result<ComparisonResults> {
    Ok(ComparisonResults {
        original_abs: run_knn_class_experiment(
            num_classes,
            &merged.original_train,
            &merged.original_test,
            false,
        )?,
        original_rel: run_knn_class_experiment(
            num_classes,
            &merged.original_train,
            &merged.original_test,
            true,
        )?,
        merged: run_knn_class_experiment(
            num_classes,
            &merged.merged_train,
            &merged.merged_test,
            true,
        )?,
    })
}

pub fn classification_analysis(
    merged: &MergedSplits,
    num_classes: usize,
    params: &ClassifierParams,
) -> Result<ComparisonResults> {
    let run = |train: &SampleCollection, test: &SampleCollection, use_relatives: bool| {
        run_classification_experiment(num_classes, train, test, use_relatives, params)
    };
    Ok(ComparisonResults {
        original_abs: run(&merged.original_train, &merged.original_test, false)?,
        original_rel: run(&merged.original_train, &merged.original_test, true)?,
        merged: run(&merged.merged_train, &merged.merged_test, true)?,
    })
}

/// Runs every stage on a freshly loaded store.
pub fn analyze(store: &mut DatasetStore, params: &PipelineParams) -> Result<ConfigurationResults> {
    let merged = prepare(store, params)?;
    Ok(ConfigurationResults {
        cka: cka_analysis(&merged, params.cka_kernel)?,
        knn: knn_analysis(&merged, params.num_classes)?,
        classification: classification_analysis(&merged, params.num_classes, &params.classifier)?,
    })
}
