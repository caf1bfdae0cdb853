//! Percentile regressor
//!
//! A small feed-forward network mapping a standardized feature vector to a
//! percentile in `[0, 1]`:
//!
//! ```text
//! Dense(64, ReLU) -> Dropout(0.2) -> Dense(32, ReLU) -> Dense(1, sigmoid)
//! ```
//!
//! Trained with Adam on mean squared error over shuffled mini-batches, with
//! early stopping on the monitored loss and the best weights restored.

use crate::config::TrainingConfig;
use crate::error::RankError;
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

/// Fully connected layer; `weights` is `(inputs, outputs)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl DenseLayer {
    /// Glorot-uniform weights, zero bias
    fn glorot(inputs: usize, outputs: usize, rng: &mut ChaCha8Rng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(outputs),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.bias
    }

    fn is_finite(&self) -> bool {
        self.weights.iter().chain(self.bias.iter()).all(|w| w.is_finite())
    }
}

/// Which loss drove early stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredLoss {
    Validation,
    /// No validation rows were available
    Training,
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    /// 1-based epoch whose weights were kept
    pub best_epoch: usize,
    pub best_loss: f64,
    pub monitored: MonitoredLoss,
    pub train_size: usize,
    pub validation_size: usize,
}

/// Percentile regressor network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileRegressor {
    hidden1: DenseLayer,
    hidden2: DenseLayer,
    output: DenseLayer,
    dropout: f64,
}

/// Intermediate values of one training forward pass
struct ForwardCache {
    z1: Array2<f64>,
    mask: Array2<f64>,
    dropped: Array2<f64>,
    z2: Array2<f64>,
    a2: Array2<f64>,
    out: Array2<f64>,
}

/// Per-layer gradients, or Adam moments, in network layout
#[derive(Clone)]
struct LayerSet {
    hidden1: DenseLayer,
    hidden2: DenseLayer,
    output: DenseLayer,
}

impl LayerSet {
    fn layers_mut(&mut self) -> [&mut DenseLayer; 3] {
        [&mut self.hidden1, &mut self.hidden2, &mut self.output]
    }
}

struct Adam {
    learning_rate: f64,
    step: i32,
    first: LayerSet,
    second: LayerSet,
}

impl Adam {
    fn new(model: &PercentileRegressor, learning_rate: f64) -> Self {
        let zeros = model.zero_grads();
        Self {
            learning_rate,
            step: 0,
            first: zeros.clone(),
            second: zeros,
        }
    }

    fn apply(&mut self, model: &mut PercentileRegressor, grads: &LayerSet) {
        self.step += 1;
        let correction1 = 1.0 - ADAM_BETA1.powi(self.step);
        let correction2 = 1.0 - ADAM_BETA2.powi(self.step);
        let lr = self.learning_rate;

        let params = [&mut model.hidden1, &mut model.hidden2, &mut model.output];
        let grads = [&grads.hidden1, &grads.hidden2, &grads.output];

        for (((param, grad), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(self.first.layers_mut())
            .zip(self.second.layers_mut())
        {
            let corrections = (correction1, correction2);
            adam_update(&mut param.weights, &grad.weights, &mut m.weights, &mut v.weights, lr, corrections);
            adam_update(&mut param.bias, &grad.bias, &mut m.bias, &mut v.bias, lr, corrections);
        }
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr: f64,
    (correction1, correction2): (f64, f64),
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            *p -= lr * (*m / correction1) / ((*v / correction2).sqrt() + ADAM_EPSILON);
        });
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn relu_grad(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn mse(predicted: &Array1<f64>, target: &Array1<f64>) -> f64 {
    if target.is_empty() {
        return f64::NAN;
    }
    predicted
        .iter()
        .zip(target.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / target.len() as f64
}

impl PercentileRegressor {
    /// Freshly initialized network for `inputs` features
    pub fn new(inputs: usize, config: &TrainingConfig, rng: &mut ChaCha8Rng) -> Self {
        let [h1, h2] = config.hidden_units;
        Self {
            hidden1: DenseLayer::glorot(inputs, h1, rng),
            hidden2: DenseLayer::glorot(h1, h2, rng),
            output: DenseLayer::glorot(h2, 1, rng),
            dropout: config.dropout.clamp(0.0, 0.99),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.hidden1.weights.nrows()
    }

    /// Predict one standardized row; dropout is never applied here
    pub fn predict(&self, features: &[f64]) -> Result<f64, RankError> {
        if features.len() != self.input_dim() {
            return Err(RankError::UnknownFeature(format!(
                "expected {} features, got {}",
                self.input_dim(),
                features.len()
            )));
        }
        let row = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| RankError::UnknownFeature(e.to_string()))?;
        Ok(self.predict_batch(&row)[0])
    }

    /// Predict every row of a standardized matrix
    pub fn predict_batch(&self, x: &Array2<f64>) -> Array1<f64> {
        let a1 = self.hidden1.forward(x).mapv(relu);
        let a2 = self.hidden2.forward(&a1).mapv(relu);
        self.output.forward(&a2).mapv(sigmoid).column(0).to_owned()
    }

    /// Mean squared error in inference mode
    pub fn loss(&self, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        mse(&self.predict_batch(x), y)
    }

    pub fn is_finite(&self) -> bool {
        self.hidden1.is_finite() && self.hidden2.is_finite() && self.output.is_finite()
    }

    fn zero_grads(&self) -> LayerSet {
        LayerSet {
            hidden1: self.hidden1.zeros_like(),
            hidden2: self.hidden2.zeros_like(),
            output: self.output.zeros_like(),
        }
    }

    fn forward_train(&self, x: &Array2<f64>, rng: &mut ChaCha8Rng) -> ForwardCache {
        let z1 = self.hidden1.forward(x);
        let keep = 1.0 - self.dropout;
        let mask = Array2::from_shape_fn(z1.raw_dim(), |_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        });
        let dropped = z1.mapv(relu) * &mask;
        let z2 = self.hidden2.forward(&dropped);
        let a2 = z2.mapv(relu);
        let out = self.output.forward(&a2).mapv(sigmoid);

        ForwardCache {
            z1,
            mask,
            dropped,
            z2,
            a2,
            out,
        }
    }

    fn backward(&self, x: &Array2<f64>, y: &Array1<f64>, cache: &ForwardCache) -> LayerSet {
        let batch = x.nrows() as f64;
        let target = y.view().insert_axis(Axis(1));

        let d_out = (&cache.out - &target) * (2.0 / batch);
        let d_z3 = d_out * cache.out.mapv(|o| o * (1.0 - o));
        let output = DenseLayer {
            weights: cache.a2.t().dot(&d_z3),
            bias: d_z3.sum_axis(Axis(0)),
        };

        let d_z2 = d_z3.dot(&self.output.weights.t()) * cache.z2.mapv(relu_grad);
        let hidden2 = DenseLayer {
            weights: cache.dropped.t().dot(&d_z2),
            bias: d_z2.sum_axis(Axis(0)),
        };

        let d_z1 = d_z2.dot(&self.hidden2.weights.t()) * &cache.mask * cache.z1.mapv(relu_grad);
        let hidden1 = DenseLayer {
            weights: x.t().dot(&d_z1),
            bias: d_z1.sum_axis(Axis(0)),
        };

        LayerSet {
            hidden1,
            hidden2,
            output,
        }
    }

    /// Train in place and keep the weights of the best monitored epoch.
    ///
    /// `validation` may be empty, in which case the loss on the training rows
    /// is monitored instead.
    pub fn fit(
        &mut self,
        train: (&Array2<f64>, &Array1<f64>),
        validation: (&Array2<f64>, &Array1<f64>),
        config: &TrainingConfig,
        rng: &mut ChaCha8Rng,
    ) -> Result<TrainingReport, RankError> {
        let (x_train, y_train) = train;
        let (x_val, y_val) = validation;
        let n = x_train.nrows();
        if n == 0 {
            return Err(RankError::InsufficientData(
                "no training rows".to_string(),
            ));
        }

        let monitored = if x_val.nrows() > 0 {
            MonitoredLoss::Validation
        } else {
            MonitoredLoss::Training
        };

        let batch_size = config.batch_size.max(1);
        let mut adam = Adam::new(self, config.learning_rate);
        let mut indices: Vec<usize> = (0..n).collect();

        let mut best: Option<(usize, f64, PercentileRegressor)> = None;
        let mut since_best = 0usize;
        let mut epochs_run = 0usize;

        for epoch in 1..=config.epochs {
            epochs_run = epoch;
            indices.shuffle(rng);

            for chunk in indices.chunks(batch_size) {
                let xb = x_train.select(Axis(0), chunk);
                let yb = y_train.select(Axis(0), chunk);
                let cache = self.forward_train(&xb, rng);
                let grads = self.backward(&xb, &yb, &cache);
                adam.apply(self, &grads);
            }

            let train_loss = self.loss(x_train, y_train);
            let epoch_loss = match monitored {
                MonitoredLoss::Validation => self.loss(x_val, y_val),
                MonitoredLoss::Training => train_loss,
            };
            debug!(epoch, train_loss, monitored_loss = epoch_loss, "epoch complete");

            let improved = epoch_loss.is_finite()
                && best.as_ref().map_or(true, |(_, loss, _)| epoch_loss < *loss);
            if improved {
                best = Some((epoch, epoch_loss, self.clone()));
                since_best = 0;
            } else {
                since_best += 1;
                if since_best >= config.patience.max(1) {
                    debug!(epoch, "early stopping");
                    break;
                }
            }
        }

        let (best_epoch, best_loss, best_model) = best.ok_or_else(|| {
            RankError::Convergence(format!(
                "monitored loss was non-finite for all {epochs_run} epochs"
            ))
        })?;
        *self = best_model;

        info!(
            epochs_run,
            best_epoch,
            best_loss,
            train_size = n,
            validation_size = x_val.nrows(),
            "regressor trained"
        );

        Ok(TrainingReport {
            epochs_run,
            best_epoch,
            best_loss,
            monitored,
            train_size: n,
            validation_size: x_val.nrows(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    fn toy_data(n: usize, rng: &mut ChaCha8Rng) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 5), |_| rng.gen_range(-1.5..1.5));
        let y = x
            .rows()
            .into_iter()
            .map(|row| sigmoid(row.sum() / 2.0))
            .collect::<Array1<f64>>();
        (x, y)
    }

    #[test]
    fn test_output_in_unit_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let model = PercentileRegressor::new(5, &TrainingConfig::default(), &mut rng);
        let (x, _) = toy_data(20, &mut rng);
        for p in model.predict_batch(&x) {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_predict_is_idempotent() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let model = PercentileRegressor::new(5, &TrainingConfig::default(), &mut rng);
        let row = [0.3, -0.2, 1.1, 0.0, -0.7];
        assert_eq!(model.predict(&row).unwrap(), model.predict(&row).unwrap());
    }

    #[test]
    fn test_predict_wrong_width() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let model = PercentileRegressor::new(5, &TrainingConfig::default(), &mut rng);
        assert!(matches!(
            model.predict(&[1.0, 2.0]),
            Err(RankError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let (x_train, y_train) = toy_data(160, &mut rng);
        let (x_val, y_val) = toy_data(40, &mut rng);
        let config = TrainingConfig::default().with_epochs(60).with_patience(60);

        let mut model = PercentileRegressor::new(5, &config, &mut rng);
        let before = model.loss(&x_val, &y_val);
        let report = model
            .fit((&x_train, &y_train), (&x_val, &y_val), &config, &mut rng)
            .unwrap();

        assert_eq!(report.monitored, MonitoredLoss::Validation);
        assert!(report.best_loss < before);
        assert!((model.loss(&x_val, &y_val) - report.best_loss).abs() < 1e-12);
    }

    #[test]
    fn test_early_stopping_respects_patience() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (x, y) = toy_data(32, &mut rng);
        let config = TrainingConfig::default().with_epochs(500).with_patience(2);

        let mut model = PercentileRegressor::new(5, &config, &mut rng);
        let report = model.fit((&x, &y), (&x, &y), &config, &mut rng).unwrap();

        assert!(report.epochs_run <= 500);
        assert!(report.best_epoch <= report.epochs_run);
        if report.epochs_run < 500 {
            assert_eq!(report.epochs_run - report.best_epoch, 2);
        }
    }

    #[test]
    fn test_single_row_monitors_training_loss() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let x = Array2::from_shape_vec((1, 5), vec![0.0; 5]).unwrap();
        let y = Array1::from(vec![1.0]);
        let empty_x = Array2::zeros((0, 5));
        let empty_y = Array1::zeros(0);
        let config = TrainingConfig::default().with_epochs(5);

        let mut model = PercentileRegressor::new(5, &config, &mut rng);
        let report = model
            .fit((&x, &y), (&empty_x, &empty_y), &config, &mut rng)
            .unwrap();

        assert_eq!(report.monitored, MonitoredLoss::Training);
        assert_eq!(report.validation_size, 0);
        assert_eq!(report.train_size, 1);
    }

    #[test]
    fn test_non_finite_targets_fail_to_converge() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let x = Array2::from_shape_vec((2, 5), vec![0.5; 10]).unwrap();
        let y = Array1::from(vec![f64::NAN, f64::NAN]);
        let config = TrainingConfig::default().with_epochs(3);

        let mut model = PercentileRegressor::new(5, &config, &mut rng);
        let result = model.fit((&x, &y), (&x, &y), &config, &mut rng);
        assert!(matches!(result, Err(RankError::Convergence(_))));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let model = PercentileRegressor::new(5, &TrainingConfig::default(), &mut rng);
        let json = serde_json::to_string(&model).unwrap();
        let restored: PercentileRegressor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, model);
    }
}
