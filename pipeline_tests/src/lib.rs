// Test-only corpus builder for end-to-end pipeline tests.
//
// `TestCorpus` owns a scratch directory of real MIDI files written with
// `notenet_midi::write_notes`, so the integration tests read training data
// through exactly the same path as the `notenet` binary:
// directory -> collect_midi_files -> load_dataset -> train -> checkpoint ->
// generate -> write_notes.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::path::{Path, PathBuf};

use notenet::encoding::Note;
use notenet_midi::write_notes;

/// A five-note figure (C D E G A) used to build predictable pieces.
pub const PENTATONIC: [Note; 5] = [60, 62, 64, 67, 69];

/// Scratch directory of MIDI files, removed on drop.
pub struct TestCorpus {
    dir: PathBuf,
}

impl TestCorpus {
    /// Create an empty corpus directory unique to this process and `tag`.
    pub fn new(tag: &str) -> Self {
        let name = format!("notenet_pipeline_{tag}_{}", std::process::id());
        let dir = std::env::temp_dir().join(name);
        // Leftovers from a crashed run would change the file list.
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create corpus dir");
        TestCorpus { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path inside the corpus directory, for outputs.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write `notes` as `name` and return its path.
    pub fn add_piece(&self, name: &str, notes: &[Note]) -> PathBuf {
        let path = self.path(name);
        write_notes(notes, &path).expect("write test piece");
        path
    }

    /// Write arbitrary bytes as `name` (for unreadable "MIDI" files).
    pub fn add_raw(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, bytes).expect("write raw file");
        path
    }
}

impl Drop for TestCorpus {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// `figure` repeated until `len` notes, transposed by `shift` semitones.
pub fn repeated_figure(figure: &[Note], len: usize, shift: i8) -> Vec<Note> {
    figure
        .iter()
        .cycle()
        .take(len)
        .map(|&n| n.saturating_add_signed(shift))
        .collect()
}
