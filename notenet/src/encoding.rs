// Feature encoding: note indices to one-hot vectors and design matrices.
//
// A context window of `k` notes becomes a row of width `k * 128`: the one-hot
// vectors of each note laid end to end, oldest note first. Targets stay as
// plain note indices in `Dataset::t` and are expanded to one-hot rows only
// per minibatch (see `trainer.rs`), which keeps a full dataset at one dense
// matrix instead of two.

use crate::error::{NoteNetError, Result};
use crate::windowing::TrainingExample;
use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis, IxDyn};

/// A pitch index. Valid notes are in [0, 127].
pub type Note = u8;

/// Number of distinct notes, and so the width of every one-hot vector.
pub const ALPHABET_SIZE: usize = 128;

/// Target used to mark the end of a piece. Shares its index with the lowest
/// C; see DESIGN.md for why the two are not split.
pub const END_MARKER: Note = 0;

/// One-hot encode an array of class indices of any shape.
///
/// The output has the input's shape with a trailing axis of width
/// `alphabet_size`. Indices are rounded to the nearest integer (ties to even)
/// first, so float noise like `4.9999` still lands on class 5. Anything
/// outside `[0, alphabet_size)` after rounding is an error.
pub fn one_hot(indices: ArrayViewD<'_, f64>, alphabet_size: usize) -> Result<ArrayD<f64>> {
    let mut shape = indices.shape().to_vec();
    shape.push(alphabet_size);

    let mut data = vec![0.0; indices.len() * alphabet_size];
    for (i, &raw) in indices.iter().enumerate() {
        let class = rounded_class(raw, alphabet_size)?;
        data[i * alphabet_size + class] = 1.0;
    }

    let actual = vec![data.len()];
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|_| NoteNetError::ShapeMismatch {
        what: "one-hot buffer",
        expected: shape.clone(),
        actual,
    })
}

fn rounded_class(raw: f64, alphabet_size: usize) -> Result<usize> {
    let rounded = raw.round_ties_even();
    if !rounded.is_finite() || rounded < 0.0 || rounded >= alphabet_size as f64 {
        return Err(NoteNetError::NoteOutOfRange {
            index: rounded as i64,
            alphabet_size,
        });
    }
    Ok(rounded as usize)
}

fn checked_note(note: Note) -> Result<usize> {
    let index = usize::from(note);
    if index >= ALPHABET_SIZE {
        return Err(NoteNetError::NoteOutOfRange {
            index: i64::from(note),
            alphabet_size: ALPHABET_SIZE,
        });
    }
    Ok(index)
}

/// One-hot rows for a list of notes: shape `(notes.len(), 128)`.
pub fn one_hot_notes(notes: &[Note]) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((notes.len(), ALPHABET_SIZE));
    for (mut row, &note) in out.axis_iter_mut(Axis(0)).zip(notes) {
        row[checked_note(note)?] = 1.0;
    }
    Ok(out)
}

/// Flattened one-hot encoding of a single context window.
pub fn encode_context(context: &[Note]) -> Result<Array1<f64>> {
    let mut out = vec![0.0; context.len() * ALPHABET_SIZE];
    fill_context_row(&mut out, context)?;
    Ok(Array1::from_vec(out))
}

fn fill_context_row(row: &mut [f64], context: &[Note]) -> Result<()> {
    for (position, &note) in context.iter().enumerate() {
        row[position * ALPHABET_SIZE + checked_note(note)?] = 1.0;
    }
    Ok(())
}

/// Design matrix `x` (one row per example) and target indices `t`.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub t: Vec<Note>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.x.ncols()
    }

    /// Stack several datasets row-wise, preserving order. All parts must
    /// share a feature width.
    pub fn concat(parts: &[Dataset]) -> Result<Dataset> {
        let Some(first) = parts.first() else {
            return Ok(Dataset {
                x: Array2::zeros((0, 0)),
                t: Vec::new(),
            });
        };
        let width = first.num_features();
        for (part, data) in parts.iter().enumerate() {
            if data.num_features() != width {
                return Err(NoteNetError::DatasetWidthMismatch {
                    part,
                    expected: width,
                    actual: data.num_features(),
                });
            }
        }

        let views: Vec<_> = parts.iter().map(|p| p.x.view()).collect();
        let x = ndarray::concatenate(Axis(0), &views)?;
        let t = parts.iter().flat_map(|p| p.t.iter().copied()).collect();
        Ok(Dataset { x, t })
    }
}

/// Encode windowed examples into `(X, t)`. Row order matches input order.
///
/// Every context must have the same length; the feature width is
/// `context_length * 128`. An empty input gives an empty `0 x 0` dataset.
pub fn encode_examples(examples: &[TrainingExample]) -> Result<Dataset> {
    let context_length = examples.first().map_or(0, |e| e.context.len());
    let width = context_length * ALPHABET_SIZE;

    let mut x = Array2::zeros((examples.len(), width));
    let mut t = Vec::with_capacity(examples.len());
    for (mut row, example) in x.axis_iter_mut(Axis(0)).zip(examples) {
        if example.context.len() != context_length {
            return Err(NoteNetError::ShapeMismatch {
                what: "context window",
                expected: vec![context_length],
                actual: vec![example.context.len()],
            });
        }
        checked_note(example.target)?;
        // Freshly allocated rows are contiguous, so the slice is always there.
        if let Some(slice) = row.as_slice_mut() {
            fill_context_row(slice, &example.context)?;
        }
        t.push(example.target);
    }

    Ok(Dataset { x, t })
}
