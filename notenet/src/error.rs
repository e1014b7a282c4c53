// Error type for the NoteNet core.
//
// Precondition violations (short sequences, out-of-order model calls,
// mismatched shapes) surface here immediately. Numerical degeneracy during
// training does not: a non-finite loss is returned as a value so the caller
// can see it. The one exception is generation, where a non-finite probability
// row cannot be turned into a note and becomes `NonFiniteOutput`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoteNetError {
    #[error("sequence of {len} notes is shorter than the context length {context_length}")]
    SequenceTooShort { len: usize, context_length: usize },

    #[error("class index {index} is outside [0, {alphabet_size})")]
    NoteOutOfRange { index: i64, alphabet_size: usize },

    #[error("backward/loss called without a preceding forward pass")]
    MissingForward,

    #[error("update called without a preceding backward pass")]
    MissingBackward,

    #[error("batch size mismatch: forward saw {expected} rows, got {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("dataset part {part} has {actual} features, the first part has {expected}")]
    DatasetWidthMismatch {
        part: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model produced a non-finite probability at generation step {step}")]
    NonFiniteOutput { step: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NoteNetError>;
