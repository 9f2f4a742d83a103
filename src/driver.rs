//! Experiment driver: iterates dataset/model configurations, runs the
//! pipeline on each and persists the three result tables.
//!
//! Result files are rewritten after every configuration so that partial
//! results survive an aborted run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cka::CkaKernel;
use crate::classifier::ClassifierParams;
use crate::error::{Error, Result};
use crate::merge::TrainAlignment;
use crate::pipeline::{analyze, ConfigurationResults, PipelineParams};
use crate::projection::Centering;
use crate::store::DatasetStore;

pub const DEFAULT_PARTITION: &str = "totally_disjoint/partition-1";

/// `results[dataset][model]` holds one configuration's entry.
pub type ResultTable = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub dataset_name: String,
    pub model_name: String,
}

fn default_partition() -> String {
    DEFAULT_PARTITION.to_string()
}

fn default_embed_dim() -> usize {
    256
}

/// Experiment settings, read from a JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Directory containing one sub-directory per dataset.
    pub data_root: PathBuf,
    #[serde(default = "default_partition")]
    pub partition: String,
    pub dataset_names: Vec<String>,
    pub model_names: Vec<String>,
    pub configurations: Vec<RunConfiguration>,
    pub num_total_classes: BTreeMap<String, usize>,
    #[serde(default)]
    pub num_anchors: Option<usize>,
    #[serde(default = "default_embed_dim")]
    pub classifier_embed_dim: usize,
    pub cka_results_path: PathBuf,
    pub class_results_path: PathBuf,
    pub knn_results_path: PathBuf,
    #[serde(default)]
    pub centering: Centering,
    #[serde(default)]
    pub train_alignment: TrainAlignment,
    #[serde(default)]
    pub cka_kernel: CkaKernel,
    #[serde(default)]
    pub classifier: ClassifierParams,
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn validate(&self) -> Result<()> {
        for run in &self.configurations {
            if !self.dataset_names.contains(&run.dataset_name) {
                return Err(Error::InvalidConfig(format!(
                    "dataset '{}' is not listed in dataset_names",
                    run.dataset_name
                )));
            }
            if !self.model_names.contains(&run.model_name) {
                return Err(Error::InvalidConfig(format!(
                    "model '{}' is not listed in model_names",
                    run.model_name
                )));
            }
            match self.num_total_classes.get(&run.dataset_name) {
                Some(&n) if n > 0 => {}
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "num_total_classes has no positive entry for '{}'",
                        run.dataset_name
                    )))
                }
            }
        }
        if self.num_anchors == Some(0) {
            return Err(Error::InvalidConfig("num_anchors must be positive".into()));
        }
        self.classifier
            .clone()
            .with_hidden_dim(self.classifier_embed_dim)
            .validate()
    }

    /// `{data_root}/{dataset}/{partition}_{model}`
    pub fn dataset_dir(&self, dataset: &str, model: &str) -> PathBuf {
        self.data_root
            .join(dataset)
            .join(format!("{}_{}", self.partition, model))
    }

    pub fn pipeline_params(&self, dataset: &str) -> Result<PipelineParams> {
        let num_classes = *self.num_total_classes.get(dataset).ok_or_else(|| {
            Error::InvalidConfig(format!("num_total_classes has no entry for '{}'", dataset))
        })?;
        let mut params = PipelineParams::new(num_classes)
            .with_centering(self.centering)
            .with_train_alignment(self.train_alignment)
            .with_cka_kernel(self.cka_kernel)
            .with_classifier(
                self.classifier
                    .clone()
                    .with_hidden_dim(self.classifier_embed_dim),
            );
        params.num_anchors = self.num_anchors;
        Ok(params)
    }
}

/// The three result tables of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub cka: ResultTable,
    pub class: ResultTable,
    pub knn: ResultTable,
}

impl ExperimentResults {
    /// Empty objects for every dataset x model pair.
    pub fn empty(cfg: &ExperimentConfig) -> Self {
        let table: ResultTable = cfg
            .dataset_names
            .iter()
            .map(|d| {
                let models = cfg
                    .model_names
                    .iter()
                    .map(|m| (m.clone(), Value::Object(Default::default())))
                    .collect();
                (d.clone(), models)
            })
            .collect();
        Self {
            cka: table.clone(),
            class: table.clone(),
            knn: table,
        }
    }

    pub fn record(&mut self, run: &RunConfiguration, results: &ConfigurationResults) -> Result<()> {
        let entries = [
            (&mut self.cka, serde_json::to_value(results.cka)?),
            (&mut self.class, serde_json::to_value(results.classification)?),
            (&mut self.knn, serde_json::to_value(results.knn)?),
        ];
        for (table, value) in entries {
            table
                .entry(run.dataset_name.clone())
                .or_default()
                .insert(run.model_name.clone(), value);
        }
        Ok(())
    }

    pub fn save(&self, cfg: &ExperimentConfig) -> Result<()> {
        write_json(&cfg.cka_results_path, &self.cka)?;
        write_json(&cfg.class_results_path, &self.class)?;
        write_json(&cfg.knn_results_path, &self.knn)
    }
}

/// Serialises `value` to `path`, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Runs every configuration in order; the first failure aborts the run.
pub fn run(cfg: &ExperimentConfig) -> Result<ExperimentResults> {
    cfg.validate()?;
    let mut results = ExperimentResults::empty(cfg);
    for run in &cfg.configurations {
        let dir = cfg.dataset_dir(&run.dataset_name, &run.model_name);
        info!(
            "Running {} / {} from {}",
            run.dataset_name,
            run.model_name,
            dir.display()
        );
        let mut store = DatasetStore::load_from_disk(&dir)?;
        let params = cfg.pipeline_params(&run.dataset_name)?;
        let outcome = analyze(&mut store, &params)?;
        results.record(run, &outcome)?;
        results.save(cfg)?;
    }
    info!("Finished {} configurations", cfg.configurations.len());
    Ok(results)
}
