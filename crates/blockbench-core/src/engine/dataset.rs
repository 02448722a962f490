//! Dataset loading behind the standardized batch contract.
//!
//! A loader turns `(dataset slug, seed, config)` into a train and a test
//! [`Batch`]. Loaders are pure functions of their inputs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde_json::{json, Map, Value};

use crate::domain::error::ComputationError;
use crate::domain::run::BATCH_CONTRACT;
use crate::engine::matrix::Matrix;
use crate::engine::params::{f64_or, usize_or, Config};

/// One split: named modality arrays (batch-first), optional labels, metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub modalities: BTreeMap<String, Matrix>,
    pub labels: Option<Vec<i64>>,
    pub meta: Map<String, Value>,
}

impl Batch {
    pub fn modality(&self, key: &str) -> Result<&Matrix, ComputationError> {
        self.modalities
            .get(key)
            .ok_or_else(|| ComputationError::UnknownModality {
                key: key.to_string(),
                available: self.modalities.keys().cloned().collect(),
            })
    }

    pub fn require_labels(&self, purpose: &str) -> Result<&[i64], ComputationError> {
        self.labels
            .as_deref()
            .ok_or_else(|| ComputationError::MissingLabels {
                purpose: purpose.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.modalities
            .values()
            .next()
            .map(Matrix::rows)
            .or_else(|| self.labels.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, indices: &[usize]) -> Batch {
        Batch {
            modalities: self
                .modalities
                .iter()
                .map(|(k, m)| (k.clone(), m.select_rows(indices)))
                .collect(),
            labels: self
                .labels
                .as_ref()
                .map(|l| indices.iter().map(|&i| l[i]).collect()),
            meta: self.meta.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Splits {
    pub train: Batch,
    pub test: Batch,
}

/// A dataset block implementation.
pub trait DatasetSource: Send + Sync {
    /// Slug of the dataset block this source serves.
    fn slug(&self) -> &str;

    fn load(&self, seed: u64, config: &Config) -> Result<Splits, ComputationError>;
}

/// Slug-keyed set of dataset sources.
#[derive(Clone)]
pub struct DataLoaderRegistry {
    sources: HashMap<String, Arc<dyn DatasetSource>>,
}

impl DataLoaderRegistry {
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Registry with the built-in reference datasets.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ToyAvSource));
        registry
    }

    pub fn register(&mut self, source: Arc<dyn DatasetSource>) {
        self.sources.insert(source.slug().to_string(), source);
    }

    pub fn load_splits(
        &self,
        dataset_slug: &str,
        seed: u64,
        config: &Config,
    ) -> Result<Splits, ComputationError> {
        let source = self
            .sources
            .get(dataset_slug)
            .ok_or_else(|| ComputationError::UnsupportedDataset {
                slug: dataset_slug.to_string(),
            })?;
        source.load(seed, config)
    }
}

impl Default for DataLoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for DataLoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut slugs: Vec<_> = self.sources.keys().collect();
        slugs.sort();
        f.debug_struct("DataLoaderRegistry")
            .field("sources", &slugs)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// datasets.toy_av
// ---------------------------------------------------------------------------

pub const TOY_AV_SLUG: &str = "datasets.toy_av";

/// Synthetic audio/vision binary classification set.
///
/// Features are standard normal; the label is whether a hidden linear score
/// over both modalities (plus 0.1-scaled noise) exceeds its median.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToyAvSource;

impl ToyAvSource {
    fn generate(
        seed: u64,
        n: usize,
        audio_dim: usize,
        vision_dim: usize,
    ) -> (Matrix, Matrix, Vec<i64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut normal = || -> f64 { rng.sample(StandardNormal) };

        let audio = Matrix::from_fn(n, audio_dim, |_, _| normal());
        let vision = Matrix::from_fn(n, vision_dim, |_, _| normal());
        let wa: Vec<f64> = (0..audio_dim).map(|_| normal()).collect();
        let wv: Vec<f64> = (0..vision_dim).map(|_| normal()).collect();
        let noise: Vec<f64> = (0..n).map(|_| 0.1 * normal()).collect();

        let logits: Vec<f64> = (0..n)
            .map(|i| {
                let a: f64 = audio.row(i).iter().zip(&wa).map(|(x, w)| x * w).sum();
                let v: f64 = vision.row(i).iter().zip(&wv).map(|(x, w)| x * w).sum();
                a + v + noise[i]
            })
            .collect();

        let threshold = median(&logits);
        let labels = logits.iter().map(|&l| i64::from(l > threshold)).collect();
        (audio, vision, labels)
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

impl DatasetSource for ToyAvSource {
    fn slug(&self) -> &str {
        TOY_AV_SLUG
    }

    fn load(&self, seed: u64, config: &Config) -> Result<Splits, ComputationError> {
        let n = usize_or(config, "n", 800)?;
        let audio_dim = usize_or(config, "audioDim", 20)?;
        let vision_dim = usize_or(config, "visionDim", 30)?;
        let train_ratio = f64_or(config, "trainRatio", 0.8)?;

        if n < 2 {
            return Err(ComputationError::InvalidParameter {
                name: "n".to_string(),
                reason: "need at least 2 samples".to_string(),
            });
        }
        if audio_dim == 0 || vision_dim == 0 {
            return Err(ComputationError::InvalidParameter {
                name: "audioDim/visionDim".to_string(),
                reason: "dimensions must be positive".to_string(),
            });
        }
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            return Err(ComputationError::InvalidParameter {
                name: "trainRatio".to_string(),
                reason: "must lie strictly between 0 and 1".to_string(),
            });
        }

        let (audio, vision, labels) = Self::generate(seed, n, audio_dim, vision_dim);

        let mut meta = Map::new();
        meta.insert("batchVersion".to_string(), json!("v1"));
        meta.insert("contract".to_string(), json!(BATCH_CONTRACT));
        meta.insert("dataset".to_string(), json!(TOY_AV_SLUG));

        let full = Batch {
            modalities: BTreeMap::from([
                ("audio".to_string(), audio),
                ("vision".to_string(), vision),
            ]),
            labels: Some(labels),
            meta,
        };

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let cut = ((train_ratio * n as f64) as usize).clamp(1, n - 1);

        Ok(Splits {
            train: full.select(&indices[..cut]),
            test: full.select(&indices[cut..]),
        })
    }
}
