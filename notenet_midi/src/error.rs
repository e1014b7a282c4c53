use notenet::NoteNetError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not a valid MIDI file: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: midly::Error,
    },

    #[error("note {note} does not fit in a MIDI key (0-127)")]
    NoteOutOfRange { note: u8 },

    #[error(transparent)]
    Core(#[from] NoteNetError),

    #[error("none of the {attempted} files produced training examples")]
    NoUsableFiles { attempted: usize },
}

pub type Result<T> = std::result::Result<T, MidiError>;
