// NoteNet: next-note prediction with a two-layer perceptron.
//
// Learns to predict the next pitch from the preceding `context_length`
// pitches of monophonic note sequences, then extends a seed melody one note
// at a time. Timing, velocity and polyphony are deliberately absent: a piece
// is just its sequence of note-on pitches.
//
// Architecture:
// - encoding.rs: one-hot encoding, the `Dataset` design matrix
// - windowing.rs: piece -> (context, next note) examples, plus the end marker
// - model.rs: the perceptron (`Mlp`, pure forward/backward) and the stateful
//   `Model` façade with forward/backward/loss/update/reset
// - trainer.rs: shuffled minibatch SGD with loss curves
// - decode.rs: `DecodePolicy` (greedy arg-max, temperature sampling)
// - generator.rs: autoregressive generation from a seed
// - config.rs: `TrainConfig`, the single record of hyperparameters
// - checkpoint.rs: JSON persistence of a trained network
//
// Reading and writing MIDI files, and assembling datasets from many files,
// live in the `notenet_midi` crate. All randomness comes from a caller-owned
// `notenet_prng::NotePrng`.

pub mod checkpoint;
pub mod config;
pub mod decode;
pub mod encoding;
pub mod error;
pub mod generator;
pub mod model;
pub mod trainer;
pub mod windowing;

pub use error::{NoteNetError, Result};
