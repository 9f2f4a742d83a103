//! Small supervised classifier trained on an embedding column.
//!
//! `Linear(in, hidden) -> ReLU -> Linear(hidden, classes)` built with
//! candle, trained with softmax cross-entropy, mini-batch AdamW (no weight
//! decay) and early stopping on the loss of a validation split carved from
//! the training data. The run is fully seeded: weight init, validation
//! carve-out and per-epoch shuffles all derive from `ClassifierParams::seed`.

use std::collections::BTreeMap;

use candle_core::{DType, Device, Module, Tensor, Var, D};
use candle_nn::{linear, loss, AdamW, Linear, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use log::{debug, info, trace};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics::{accuracy, class_indices, ClassificationResult};
use crate::samples::SampleCollection;
use crate::split::EmbeddingSource;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    pub hidden_dim: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Epochs without validation improvement before stopping.
    pub patience: usize,
    pub val_fraction: f64,
    pub seed: u64,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            hidden_dim: 256,
            learning_rate: 1e-3,
            batch_size: 128,
            max_epochs: 100,
            patience: 10,
            val_fraction: 0.1,
            seed: 42,
        }
    }
}

impl ClassifierParams {
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |what: &str| Err(Error::InvalidConfig(format!("classifier {what}")));
        if self.hidden_dim == 0 {
            return bad("hidden_dim must be > 0");
        }
        if self.batch_size == 0 {
            return bad("batch_size must be > 0");
        }
        if self.max_epochs == 0 {
            return bad("max_epochs must be > 0");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return bad("learning_rate must be > 0");
        }
        Ok(())
    }
}

/// Two-layer perceptron whose parameters live in one [`VarMap`]
/// (`hidden.weight`, `hidden.bias`, `output.weight`, `output.bias`).
struct Mlp {
    varmap: VarMap,
    hidden: Linear,
    output: Linear,
    in_dim: usize,
    classes: usize,
}

impl Mlp {
    fn new(in_dim: usize, hidden: usize, classes: usize, rng: &mut ChaCha8Rng) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, &Device::Cpu);
        let model = Self {
            hidden: linear(in_dim, hidden, vb.pp("hidden"))?,
            output: linear(hidden, classes, vb.pp("output"))?,
            varmap,
            in_dim,
            classes,
        };
        model.seed_weights(rng)?;
        Ok(model)
    }

    /// Name-sorted handles to every parameter.
    fn vars(&self) -> Result<BTreeMap<String, Var>> {
        let data = self.varmap.data().lock().map_err(|_| {
            Error::Candle(candle_core::Error::Msg("parameter map lock poisoned".to_string()))
        })?;
        Ok(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// He init for the ReLU layer, unit gain for the output layer, zero
    /// biases. Overrides candle's unseeded init.
    fn seed_weights(&self, rng: &mut ChaCha8Rng) -> Result<()> {
        for (name, var) in self.vars()? {
            let dims = var.dims().to_vec();
            let values: Vec<f64> = if name.ends_with(".weight") {
                let gain = if name.starts_with("hidden") { 2.0 } else { 1.0 };
                let scale = (gain / dims[1] as f64).sqrt();
                (0..dims.iter().product::<usize>())
                    .map(|_| {
                        let z: f64 = StandardNormal.sample(rng);
                        z * scale
                    })
                    .collect()
            } else {
                vec![0.0; dims.iter().product()]
            };
            var.set(&Tensor::from_vec(values, dims, &Device::Cpu)?)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, Tensor>> {
        self.vars()?
            .into_iter()
            .map(|(name, var)| Ok((name, var.as_tensor().copy()?)))
            .collect()
    }

    fn restore(&self, snapshot: &BTreeMap<String, Tensor>) -> Result<()> {
        for (name, var) in self.vars()? {
            if let Some(t) = snapshot.get(&name) {
                var.set(t)?;
            }
        }
        Ok(())
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let h = self.hidden.forward(xs)?.relu()?;
        Ok(self.output.forward(&h)?)
    }

    /// Mean cross-entropy over `xs`; zero for an empty set.
    fn loss(&self, xs: &Tensor, targets: &Tensor) -> Result<f64> {
        if xs.dim(0)? == 0 {
            return Ok(0.0);
        }
        let logits = self.forward(xs)?;
        Ok(loss::cross_entropy(&logits, targets)?.to_scalar::<f64>()?)
    }
}

fn rows_tensor(rows: &[Vec<f64>], width: usize) -> Result<Tensor> {
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (rows.len(), width), &Device::Cpu)?)
}

fn targets_tensor(targets: &[usize]) -> Result<Tensor> {
    let t: Vec<u32> = targets.iter().map(|&c| c as u32).collect();
    Ok(Tensor::from_vec(t, targets.len(), &Device::Cpu)?)
}

/// What the early-stopped training run did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainSummary {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_loss: f64,
}

pub struct TrainedClassifier {
    model: Mlp,
    source: EmbeddingSource,
}

impl TrainedClassifier {
    /// Trains on `train`, keeping the weights of the best validation epoch.
    pub fn fit(
        train: &SampleCollection,
        source: EmbeddingSource,
        num_classes: usize,
        params: &ClassifierParams,
    ) -> Result<(Self, TrainSummary)> {
        params.validate()?;
        if num_classes == 0 {
            return Err(Error::InvalidConfig("num_classes must be > 0".to_string()));
        }
        let in_dim = train.dim(source).ok_or_else(|| Error::MissingColumn {
            key: "classifier train".to_string(),
            column: source.column(),
        })?;

        let (fit_set, val_set) = train.train_test_split(params.val_fraction, params.seed)?;
        let fit_x = fit_set.require_column(source, "classifier train")?;
        let fit_y = class_indices(fit_set.labels(), num_classes)?;
        let val_x = val_set.require_column(source, "classifier val")?;
        let val_y = class_indices(val_set.labels(), num_classes)?;

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let model = Mlp::new(in_dim, params.hidden_dim, num_classes, &mut rng)?;
        let mut opt = AdamW::new(
            model.varmap.all_vars(),
            ParamsAdamW {
                lr: params.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let fit_xt = rows_tensor(fit_x, in_dim)?;
        let fit_yt = targets_tensor(&fit_y)?;
        let val_xt = rows_tensor(val_x, in_dim)?;
        let val_yt = targets_tensor(&val_y)?;

        info!(
            "Training classifier on {} ({} -> {} -> {}), {} train / {} val samples",
            source,
            in_dim,
            params.hidden_dim,
            num_classes,
            fit_x.len(),
            val_x.len()
        );

        let mut best = (model.snapshot()?, 0usize, f64::INFINITY);
        let mut wait = 0usize;
        let mut epochs_run = 0usize;
        let mut order: Vec<usize> = (0..fit_x.len()).collect();

        for epoch in 0..params.max_epochs {
            epochs_run = epoch + 1;
            order.shuffle(&mut rng);
            let mut train_loss = 0.0;
            let mut n_batches = 0usize;
            for chunk in order.chunks(params.batch_size) {
                let idx: Vec<u32> = chunk.iter().map(|&i| i as u32).collect();
                let idx = Tensor::from_vec(idx, chunk.len(), &Device::Cpu)?;
                let xs = fit_xt.index_select(&idx, 0)?;
                let ys = fit_yt.index_select(&idx, 0)?;
                let batch_loss = loss::cross_entropy(&model.forward(&xs)?, &ys)?;
                opt.backward_step(&batch_loss)?;
                train_loss += batch_loss.to_scalar::<f64>()?;
                n_batches += 1;
            }

            let val_loss = model.loss(&val_xt, &val_yt)?;
            trace!(
                "epoch {}: train_loss={:.6}, val_loss={:.6}",
                epoch,
                train_loss / n_batches.max(1) as f64,
                val_loss
            );

            if val_loss < best.2 {
                best = (model.snapshot()?, epoch, val_loss);
                wait = 0;
            } else {
                wait += 1;
                if wait >= params.patience {
                    debug!("Early stopping at epoch {} (best {})", epoch, best.1);
                    break;
                }
            }
        }

        model.restore(&best.0)?;
        let summary = TrainSummary {
            epochs_run,
            best_epoch: best.1,
            best_val_loss: best.2,
        };
        debug!("Training finished: {:?}", summary);
        Ok((Self { model, source }, summary))
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let logits = self.model.forward(&rows_tensor(rows, self.model.in_dim)?)?;
        let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
        Ok(predicted.into_iter().map(|c| c as usize).collect())
    }

    pub fn evaluate(&self, test: &SampleCollection) -> Result<ClassificationResult> {
        let x = test.require_column(self.source, "classifier test")?;
        if x.first().is_some_and(|r| r.len() != self.model.in_dim) {
            return Err(Error::DimensionMismatch {
                context: "classifier test width".to_string(),
                expected: self.model.in_dim,
                got: x[0].len(),
            });
        }
        let targets = class_indices(test.labels(), self.model.classes)?;
        Ok(ClassificationResult {
            total_acc: accuracy(&self.predict(x)?, &targets),
        })
    }
}

/// Trains on `train` and reports accuracy on `test`.
pub fn run_classification_experiment(
    num_classes: usize,
    train: &SampleCollection,
    test: &SampleCollection,
    use_relatives: bool,
    params: &ClassifierParams,
) -> Result<ClassificationResult> {
    let source = EmbeddingSource::from_use_relatives(use_relatives);
    let (classifier, _) = TrainedClassifier::fit(train, source, num_classes, params)?;
    let result = classifier.evaluate(test)?;
    info!("classifier on {}: total_acc={:.4}", source, result.total_acc);
    Ok(result)
}
