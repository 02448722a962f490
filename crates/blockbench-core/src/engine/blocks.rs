//! Closed dispatch over the executable block implementations.
//!
//! Slugs are mapped to a kind once, when the graph is resolved. Anything not
//! listed here fails with `UnsupportedBlock` before execution starts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::domain::error::ComputationError;
use crate::engine::matrix::Matrix;
use crate::engine::params::{f64_or, usize_or, Config};

pub const IDENTITY_ENCODER: &str = "unimodals.identity";
pub const LINEAR_ENCODER: &str = "unimodals.linear";
pub const CONCAT_FUSION: &str = "fusions.concat";
pub const SUM_FUSION: &str = "fusions.sum";
pub const CROSS_ENTROPY_OBJECTIVE: &str = "objective_functions.cross_entropy";
pub const SGD_TRAINER: &str = "training_structures.sgd_classifier";
pub const BASIC_EVALUATOR: &str = "eval_scripts.basic";

const LINEAR_WEIGHT_STD: f64 = 0.2;
const LINEAR_BIAS_STD: f64 = 0.01;

fn unsupported(role: &str, slug: &str) -> ComputationError {
    ComputationError::UnsupportedBlock {
        role: role.to_string(),
        slug: slug.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncoderKind {
    Identity { scale: f64 },
    Linear { out_dim: usize },
}

impl EncoderKind {
    pub fn resolve(slug: &str, config: &Config) -> Result<Self, ComputationError> {
        match slug {
            IDENTITY_ENCODER => Ok(EncoderKind::Identity {
                scale: f64_or(config, "scale", 1.0)?,
            }),
            LINEAR_ENCODER => {
                let out_dim = usize_or(config, "outDim", 16)?;
                if out_dim == 0 {
                    return Err(ComputationError::InvalidParameter {
                        name: "outDim".to_string(),
                        reason: "must be positive".to_string(),
                    });
                }
                Ok(EncoderKind::Linear { out_dim })
            }
            other => Err(unsupported("encoder", other)),
        }
    }

    /// Instantiate the encoder for inputs of width `in_dim`.
    ///
    /// Linear weights are drawn from a generator seeded with `seed + salt`,
    /// weights first, then bias.
    pub fn build(&self, in_dim: usize, seed: u64, salt: u64) -> Encoder {
        match *self {
            EncoderKind::Identity { scale } => Encoder::Identity { scale, in_dim },
            EncoderKind::Linear { out_dim } => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(salt));
                let weights = Matrix::from_fn(in_dim, out_dim, |_, _| {
                    LINEAR_WEIGHT_STD * rng.sample::<f64, _>(StandardNormal)
                });
                let bias = (0..out_dim)
                    .map(|_| LINEAR_BIAS_STD * rng.sample::<f64, _>(StandardNormal))
                    .collect();
                Encoder::Linear { weights, bias }
            }
        }
    }
}

/// An instantiated encoder. Applying it twice to the same input gives the
/// same output.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoder {
    Identity { scale: f64, in_dim: usize },
    Linear { weights: Matrix, bias: Vec<f64> },
}

impl Encoder {
    pub fn encode(&self, x: &Matrix) -> Result<Matrix, ComputationError> {
        match self {
            Encoder::Identity { scale, .. } => Ok(x.scale(*scale)),
            Encoder::Linear { weights, bias } => {
                let mut out = x.matmul(weights)?;
                out.add_row_vector(bias)?;
                Ok(out)
            }
        }
    }

    pub fn param_count(&self) -> u64 {
        match self {
            Encoder::Identity { .. } => 0,
            Encoder::Linear { weights, bias } => (weights.len() + bias.len()) as u64,
        }
    }

    pub fn out_dim(&self) -> usize {
        match self {
            Encoder::Identity { in_dim, .. } => *in_dim,
            Encoder::Linear { weights, .. } => weights.cols(),
        }
    }

    pub fn formula(&self) -> &'static str {
        match self {
            Encoder::Identity { .. } => "embed = x * scale (identity)",
            Encoder::Linear { .. } => "embed = x @ W + b (linear projection)",
        }
    }
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionKind {
    Concat,
    Sum,
}

impl FusionKind {
    pub fn resolve(slug: &str) -> Result<Self, ComputationError> {
        match slug {
            CONCAT_FUSION => Ok(FusionKind::Concat),
            SUM_FUSION => Ok(FusionKind::Sum),
            other => Err(unsupported("fusion", other)),
        }
    }

    pub fn fuse(&self, a: &Matrix, b: &Matrix) -> Result<Matrix, ComputationError> {
        match self {
            FusionKind::Concat => a.hstack(b),
            FusionKind::Sum => {
                if a.cols() != b.cols() {
                    return Err(ComputationError::DimensionMismatch {
                        left: a.cols(),
                        right: b.cols(),
                    });
                }
                if a.rows() != b.rows() {
                    return Err(ComputationError::BatchSizeMismatch {
                        left: a.rows(),
                        right: b.rows(),
                    });
                }
                a.add(b)
            }
        }
    }

    pub fn formula(&self) -> &'static str {
        match self {
            FusionKind::Concat => "concat: fused=[embedA; embedV]",
            FusionKind::Sum => "sum: fused=embedA+embedV",
        }
    }
}

// ---------------------------------------------------------------------------
// Objective, trainer, evaluator
// ---------------------------------------------------------------------------

/// The classifier is always fitted on log-loss; the objective node is
/// informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    CrossEntropy,
}

impl ObjectiveKind {
    pub fn resolve(slug: &str) -> Result<Self, ComputationError> {
        match slug {
            CROSS_ENTROPY_OBJECTIVE => Ok(ObjectiveKind::CrossEntropy),
            other => Err(unsupported("objective", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerParams {
    pub max_iter: usize,
    pub alpha: f64,
}

impl TrainerParams {
    pub fn resolve(slug: &str, config: &Config) -> Result<Self, ComputationError> {
        if slug != SGD_TRAINER {
            return Err(unsupported("trainer", slug));
        }
        let max_iter = usize_or(config, "maxIter", 300)?;
        let alpha = f64_or(config, "alpha", 1e-4)?;
        if max_iter == 0 {
            return Err(ComputationError::InvalidParameter {
                name: "maxIter".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if alpha <= 0.0 {
            return Err(ComputationError::InvalidParameter {
                name: "alpha".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self { max_iter, alpha })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatorParams {
    pub noise_std: f64,
}

impl EvaluatorParams {
    pub fn resolve(slug: &str, config: &Config) -> Result<Self, ComputationError> {
        if slug != BASIC_EVALUATOR {
            return Err(unsupported("evaluator", slug));
        }
        let noise_std = f64_or(config, "noiseStd", 0.2)?;
        if noise_std < 0.0 {
            return Err(ComputationError::InvalidParameter {
                name: "noiseStd".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(Self { noise_std })
    }
}
