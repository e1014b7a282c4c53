// NoteNet MIDI I/O
//
// Turns Standard MIDI Files into the plain pitch sequences the `notenet`
// crate learns from, and turns generated sequences back into playable files.
//
// Architecture:
// - notes.rs: note-on pitch extraction (multi-track merge) and the fixed
//   single-track writer
// - dataset.rs: MIDI file discovery, file-level train/validation split, and
//   parallel dataset assembly that skips unusable files
// - error.rs: `MidiError`, wrapping I/O, parse and core errors with the
//   offending path

pub mod dataset;
pub mod error;
pub mod notes;

pub use dataset::{
    DatasetReport, SkippedFile, collect_midi_files, is_midi_path, load_dataset, split_files,
};
pub use error::{MidiError, Result};
pub use notes::{read_notes, write_notes};
