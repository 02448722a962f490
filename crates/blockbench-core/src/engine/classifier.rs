//! Linear classifier fitted by stochastic gradient descent on log-loss.
//!
//! L2 penalty `alpha`, "optimal" learning-rate schedule
//! `eta_t = 1 / (alpha * (t0 + t - 1))`, per-epoch shuffling from a seeded
//! generator and early stopping after `N_ITER_NO_CHANGE` epochs without a
//! `TOL` improvement in summed loss. Two classes fit one weight vector; more
//! fit one-vs-rest.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::error::ComputationError;
use crate::engine::matrix::Matrix;

const TOL: f64 = 1e-3;
const N_ITER_NO_CHANGE: usize = 5;
const MAX_DLOSS: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub struct SgdClassifier {
    classes: Vec<i64>,
    /// One row per fitted binary problem.
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
    epochs_run: usize,
}

/// Numerically stable `log(1 + exp(-z))`.
fn log_loss(z: f64) -> f64 {
    if z > 18.0 {
        (-z).exp()
    } else if z < -18.0 {
        -z
    } else {
        (-z).exp().ln_1p()
    }
}

/// d/dp of log-loss at margin `z = y * p`, times `y`.
fn dloss(p: f64, y: f64) -> f64 {
    let z = p * y;
    let g = if z > 18.0 {
        -y * (-z).exp()
    } else if z < -18.0 {
        -y
    } else {
        -y / (z.exp() + 1.0)
    };
    g.clamp(-MAX_DLOSS, MAX_DLOSS)
}

fn dot(w: &[f64], x: &[f64]) -> f64 {
    w.iter().zip(x).map(|(a, b)| a * b).sum()
}

/// Fit one binary problem with targets in {-1, +1}.
fn fit_binary(
    x: &Matrix,
    y: &[f64],
    alpha: f64,
    max_iter: usize,
    seed: u64,
) -> Result<(Vec<f64>, f64, usize), ComputationError> {
    let n = x.rows();
    let mut w = vec![0.0; x.cols()];
    let mut b = 0.0;

    let typw = (1.0 / alpha.sqrt()).sqrt();
    let eta0 = typw / dloss(-typw, 1.0).max(1.0);
    let t0 = 1.0 / (eta0 * alpha);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    let mut best_loss = f64::INFINITY;
    let mut no_improvement = 0;
    let mut t = 1.0;
    let mut epochs = 0;

    for _ in 0..max_iter {
        epochs += 1;
        order.shuffle(&mut rng);
        let mut sum_loss = 0.0;
        for &i in &order {
            let row = x.row(i);
            let p = dot(&w, row) + b;
            sum_loss += log_loss(p * y[i]);

            let eta = 1.0 / (alpha * (t0 + t - 1.0));
            let update = -eta * dloss(p, y[i]);
            let decay = 1.0 - eta * alpha;
            for (wj, xj) in w.iter_mut().zip(row) {
                *wj = *wj * decay + update * xj;
            }
            b += update;
            t += 1.0;
        }

        if !sum_loss.is_finite() || !b.is_finite() {
            return Err(ComputationError::Training(
                "loss diverged to a non-finite value".to_string(),
            ));
        }
        if sum_loss > best_loss - TOL * n as f64 {
            no_improvement += 1;
        } else {
            no_improvement = 0;
        }
        if sum_loss < best_loss {
            best_loss = sum_loss;
        }
        if no_improvement >= N_ITER_NO_CHANGE {
            break;
        }
    }
    Ok((w, b, epochs))
}

impl SgdClassifier {
    pub fn fit(
        x: &Matrix,
        labels: &[i64],
        alpha: f64,
        max_iter: usize,
        seed: u64,
    ) -> Result<Self, ComputationError> {
        if x.rows() != labels.len() {
            return Err(ComputationError::BatchSizeMismatch {
                left: x.rows(),
                right: labels.len(),
            });
        }
        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(ComputationError::Training(format!(
                "the number of classes has to be greater than one; got {} class",
                classes.len()
            )));
        }

        // Binary problems fit the positive (greater) class only.
        let positives: &[i64] = if classes.len() == 2 {
            &classes[1..]
        } else {
            &classes
        };

        let mut coef = Vec::with_capacity(positives.len());
        let mut intercept = Vec::with_capacity(positives.len());
        let mut epochs_run = 0;
        for &class in positives {
            let y: Vec<f64> = labels
                .iter()
                .map(|&l| if l == class { 1.0 } else { -1.0 })
                .collect();
            let (w, b, epochs) = fit_binary(x, &y, alpha, max_iter, seed)?;
            coef.push(w);
            intercept.push(b);
            epochs_run = epochs_run.max(epochs);
        }

        Ok(Self {
            classes,
            coef,
            intercept,
            epochs_run,
        })
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<i64>, ComputationError> {
        let width = self.coef.first().map_or(0, Vec::len);
        if x.cols() != width {
            return Err(ComputationError::Shape(format!(
                "classifier expects {width} features, got {}",
                x.cols()
            )));
        }
        let predictions = (0..x.rows())
            .map(|i| {
                let row = x.row(i);
                if self.coef.len() == 1 {
                    let score = dot(&self.coef[0], row) + self.intercept[0];
                    if score > 0.0 {
                        self.classes[1]
                    } else {
                        self.classes[0]
                    }
                } else {
                    let mut best = 0;
                    let mut best_score = f64::NEG_INFINITY;
                    for (k, (w, b)) in self.coef.iter().zip(&self.intercept).enumerate() {
                        let score = dot(w, row) + b;
                        if score > best_score {
                            best = k;
                            best_score = score;
                        }
                    }
                    self.classes[best]
                }
            })
            .collect();
        Ok(predictions)
    }

    pub fn score(&self, x: &Matrix, labels: &[i64]) -> Result<f64, ComputationError> {
        let predictions = self.predict(x)?;
        if labels.is_empty() {
            return Ok(0.0);
        }
        let correct = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();
        Ok(correct as f64 / labels.len() as f64)
    }

    /// Coefficients plus intercepts.
    pub fn param_count(&self) -> u64 {
        let coefs: usize = self.coef.iter().map(Vec::len).sum();
        (coefs + self.intercept.len()) as u64
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    pub fn coef(&self) -> &[Vec<f64>] {
        &self.coef
    }
}
