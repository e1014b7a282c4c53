// Autoregressive melody generation.
//
// Starting from a seed of at least `context_length` notes, repeatedly feed
// the last `context_length` notes through the network, pick the next note
// with a `DecodePolicy` and append it. Stops when the pick is `END_MARKER`
// (which is not appended) or when the sequence reaches `max_length`.
//
// Each step depends on the previous one, so a single run is strictly
// sequential. Independent runs only need `&Mlp` and can go in parallel.

use crate::decode::{DecodePolicy, Greedy};
use crate::encoding::{ALPHABET_SIZE, END_MARKER, Note, encode_context};
use crate::error::{NoteNetError, Result};
use crate::model::Mlp;
use ndarray::Axis;

/// Greedy generation. See `generate_with`.
pub fn generate(mlp: &Mlp, seed: &[Note], max_length: usize) -> Result<Vec<Note>> {
    generate_with(mlp, seed, max_length, &mut Greedy)
}

/// Extend `seed` one note at a time until `END_MARKER` or `max_length`.
///
/// The context length is read off the network (`num_features / 128`). A
/// seed already at or past `max_length` comes back unchanged.
pub fn generate_with<P: DecodePolicy + ?Sized>(
    mlp: &Mlp,
    seed: &[Note],
    max_length: usize,
    policy: &mut P,
) -> Result<Vec<Note>> {
    let context_length = context_length_of(mlp)?;
    if seed.len() < context_length {
        return Err(NoteNetError::SequenceTooShort {
            len: seed.len(),
            context_length,
        });
    }

    let mut generated = seed.to_vec();
    let mut step = 0;
    while generated.len() < max_length {
        let context = &generated[generated.len() - context_length..];
        let features = encode_context(context)?.insert_axis(Axis(0));
        let probabilities = mlp.predict(features.view())?;
        let row = probabilities.row(0);
        if row.iter().any(|p| !p.is_finite()) {
            return Err(NoteNetError::NonFiniteOutput { step });
        }

        let next = policy.choose(row);
        if next == usize::from(END_MARKER) {
            tracing::debug!(step, length = generated.len(), "end marker generated");
            break;
        }
        // `context_length_of` guarantees 128 classes, so this always fits.
        generated.push(next as Note);
        step += 1;
    }

    Ok(generated)
}

fn context_length_of(mlp: &Mlp) -> Result<usize> {
    if mlp.num_classes() != ALPHABET_SIZE
        || mlp.num_features() == 0
        || mlp.num_features() % ALPHABET_SIZE != 0
    {
        // Nearest feature width that is a whole number of note slots.
        let slots = mlp.num_features().div_ceil(ALPHABET_SIZE).max(1);
        return Err(NoteNetError::ShapeMismatch {
            what: "generator network (features, classes)",
            expected: vec![slots * ALPHABET_SIZE, ALPHABET_SIZE],
            actual: vec![mlp.num_features(), mlp.num_classes()],
        });
    }
    Ok(mlp.num_features() / ALPHABET_SIZE)
}
