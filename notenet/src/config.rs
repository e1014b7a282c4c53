// Training configuration record.
//
// Every tunable of the pipeline lives in `TrainConfig`, passed explicitly to
// windowing, model construction and the trainer. Nothing reads module-level
// constants for these values. The record deserialises from JSON with every
// field optional, so a config file only needs to name what it changes:
//
//   { "epochs": 10, "learning_rate": 0.2 }
//
// See `trainer.rs` for how each field is consumed and `checkpoint.rs`, which
// stores the config next to the trained parameters.

use crate::encoding::ALPHABET_SIZE;
use crate::error::{NoteNetError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of preceding notes the model sees. Sets the input width
    /// (`context_length * 128`) and the minimum seed length for generation.
    pub context_length: usize,
    /// Width of the single hidden ReLU layer. Larger values can memorise more
    /// but train slower.
    pub hidden_size: usize,
    /// SGD step size. Values from 0.1 to 0.2 work well for one-hot note
    /// windows.
    pub learning_rate: f64,
    /// Examples per minibatch. A trailing partial batch is dropped each epoch.
    pub batch_size: usize,
    /// Full shuffled passes over the training set.
    pub epochs: usize,
    /// Record per-iteration training loss. Costs one extra log/sum per batch.
    pub track_loss: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            context_length: 20,
            hidden_size: 100,
            learning_rate: 0.1,
            batch_size: 100,
            epochs: 30,
            track_loss: true,
        }
    }
}

impl TrainConfig {
    /// Load from a JSON file and validate. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Deserialise a JSON file without validating it, for callers that
    /// adjust fields before calling `validate`.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.context_length == 0 {
            return Err(at_least_one("context_length"));
        }
        if self.hidden_size == 0 {
            return Err(at_least_one("hidden_size"));
        }
        if self.batch_size == 0 {
            return Err(at_least_one("batch_size"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(NoteNetError::InvalidConfig(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Input width of the first layer.
    pub fn num_features(&self) -> usize {
        self.context_length * ALPHABET_SIZE
    }
}

pub(crate) fn at_least_one(field: &str) -> NoteNetError {
    NoteNetError::InvalidConfig(format!("{field} must be at least 1"))
}
