// Slicing a piece into (context, next note) training examples.
//
// For a piece of `L` notes and context length `k`, every start index
// `i in 0..L-k` yields `(notes[i..i+k], notes[i+k])`, followed by one
// synthetic example pairing the final `k` notes with `END_MARKER`. That last
// example is what teaches the model where pieces stop; generation halts when
// the model predicts it. Total examples: `L - k + 1`.

use crate::config::at_least_one;
use crate::encoding::{END_MARKER, Note};
use crate::error::{NoteNetError, Result};

/// One supervised example: `context.len()` preceding notes and the note
/// that followed them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingExample {
    pub context: Vec<Note>,
    pub target: Note,
}

/// Window a piece into training examples, terminal example included.
///
/// Fails if the piece is shorter than `context_length` or if
/// `context_length` is zero.
pub fn make_windows(notes: &[Note], context_length: usize) -> Result<Vec<TrainingExample>> {
    if context_length == 0 {
        return Err(at_least_one("context_length"));
    }
    if notes.len() < context_length {
        return Err(NoteNetError::SequenceTooShort {
            len: notes.len(),
            context_length,
        });
    }

    let mut examples: Vec<TrainingExample> = notes
        .windows(context_length + 1)
        .map(|w| TrainingExample {
            context: w[..context_length].to_vec(),
            target: w[context_length],
        })
        .collect();

    examples.push(TrainingExample {
        context: notes[notes.len() - context_length..].to_vec(),
        target: END_MARKER,
    });

    Ok(examples)
}
