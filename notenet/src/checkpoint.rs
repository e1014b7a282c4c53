// JSON checkpoints: the trained network plus the config that produced it.
//
// The file holds the three layer sizes, the four parameter tensors (as
// ndarray's serde form: shape + flat data) and the `TrainConfig`. Loading
// re-checks every tensor against the recorded sizes and the config's
// context length, since a hand-edited or truncated file would otherwise
// surface later as a confusing shape panic.

use crate::config::TrainConfig;
use crate::error::{NoteNetError, Result};
use crate::model::Mlp;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub config: TrainConfig,
    pub mlp: Mlp,
}

impl Checkpoint {
    pub fn new(config: TrainConfig, mlp: Mlp) -> Self {
        Checkpoint { config, mlp }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let checkpoint: Checkpoint = serde_json::from_str(data)?;
        checkpoint.mlp.validate_shapes()?;
        if checkpoint.mlp.num_features() != checkpoint.config.num_features() {
            return Err(NoteNetError::ShapeMismatch {
                what: "checkpoint input width vs context_length",
                expected: vec![checkpoint.config.num_features()],
                actual: vec![checkpoint.mlp.num_features()],
            });
        }
        Ok(checkpoint)
    }
}
