// Dataset assembly across many MIDI files.
//
// Each file is read, windowed and encoded independently (in parallel via
// rayon), then the per-file matrices are stacked in the order the paths were
// given. A file that cannot be used (unreadable, not MIDI, shorter than one
// context window) is skipped and reported in `DatasetReport::skipped` and
// through a `tracing` warning; only an input with no usable file at all is an
// error.

use crate::error::{MidiError, Result};
use crate::notes::read_notes;
use notenet::encoding::{Dataset, encode_examples};
use notenet::windowing::make_windows;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// A file left out of a dataset, and why.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: MidiError,
}

#[derive(Debug)]
pub struct DatasetReport {
    pub dataset: Dataset,
    /// Files that contributed examples, in input order.
    pub used: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

/// Window and encode a single file.
pub fn load_file(path: &Path, context_length: usize) -> Result<Dataset> {
    let notes = read_notes(path)?;
    let examples = make_windows(&notes, context_length)?;
    Ok(encode_examples(&examples)?)
}

/// Build one dataset from many files, skipping the ones that fail.
pub fn load_dataset(paths: &[PathBuf], context_length: usize) -> Result<DatasetReport> {
    let results: Vec<Result<Dataset>> = paths
        .par_iter()
        .map(|path| load_file(path, context_length))
        .collect();

    let mut parts = Vec::new();
    let mut used = Vec::new();
    let mut skipped = Vec::new();
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(data) => {
                tracing::debug!(path = %path.display(), examples = data.len(), "loaded");
                parts.push(data);
                used.push(path.clone());
            }
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "skipping file");
                skipped.push(SkippedFile {
                    path: path.clone(),
                    reason,
                });
            }
        }
    }

    if parts.is_empty() {
        return Err(MidiError::NoUsableFiles {
            attempted: paths.len(),
        });
    }

    let dataset = Dataset::concat(&parts)?;
    tracing::info!(
        files = used.len(),
        skipped = skipped.len(),
        examples = dataset.len(),
        "dataset assembled"
    );
    Ok(DatasetReport {
        dataset,
        used,
        skipped,
    })
}

/// MIDI files (`.mid` / `.midi`, any case) directly inside `dir`, sorted by
/// path. With `name_filter`, only file names containing that substring.
pub fn collect_midi_files(dir: &Path, name_filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let io_error = |source: std::io::Error| MidiError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if !path.is_file() {
            continue;
        }
        let is_midi = is_midi_path(&path);
        let name_matches = match name_filter {
            Some(filter) => path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(filter)),
            None => true,
        };
        if is_midi && name_matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Whether `path` carries a `.mid` or `.midi` extension, in any case.
pub fn is_midi_path(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi")
}

/// Split a file list into the first `train_count` files and the rest.
pub fn split_files(mut files: Vec<PathBuf>, train_count: usize) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let valid = files.split_off(train_count.min(files.len()));
    (files, valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::write_notes;
    use notenet::NoteNetError;
    use notenet::encoding::Note;

    /// Fresh directory under the system temp dir, removed on drop.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            let name = format!("notenet_midi_{tag}_{}", std::process::id());
            let dir = std::env::temp_dir().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            TempDir(dir)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.0).ok();
        }
    }

    fn melody(len: usize) -> Vec<Note> {
        (0..len).map(|i| 60 + (i % 12) as Note).collect()
    }

    #[test]
    fn concatenates_files_in_order_and_reports_skips() {
        let tmp = TempDir::new("assemble");
        let a = tmp.0.join("a.mid");
        let b = tmp.0.join("b.mid");
        let short = tmp.0.join("short.mid");
        let junk = tmp.0.join("junk.mid");
        write_notes(&melody(10), &a).unwrap();
        write_notes(&melody(7), &b).unwrap();
        write_notes(&melody(2), &short).unwrap();
        std::fs::write(&junk, b"not a midi file").unwrap();

        let paths = vec![a.clone(), short.clone(), b.clone(), junk.clone()];
        let report = load_dataset(&paths, 4).unwrap();

        // 10 - 4 + 1 and 7 - 4 + 1 examples.
        assert_eq!(report.dataset.len(), 7 + 4);
        assert_eq!(report.dataset.num_features(), 4 * 128);
        assert_eq!(report.used, vec![a, b]);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].path, short);
        assert!(matches!(
            report.skipped[0].reason,
            MidiError::Core(NoteNetError::SequenceTooShort { len: 2, .. })
        ));
        assert_eq!(report.skipped[1].path, junk);
        assert!(matches!(report.skipped[1].reason, MidiError::Parse { .. }));

        // First file's terminal example sits at row 6, the second file starts
        // at row 7 with context [60, 61, 62, 63] -> 64.
        assert_eq!(report.dataset.t[6], 0);
        assert_eq!(report.dataset.t[7], 64);
    }

    #[test]
    fn no_usable_files_is_an_error() {
        let tmp = TempDir::new("none");
        let short = tmp.0.join("short.mid");
        write_notes(&melody(3), &short).unwrap();
        assert!(matches!(
            load_dataset(&[short], 20),
            Err(MidiError::NoUsableFiles { attempted: 1 })
        ));
    }

    #[test]
    fn collects_and_filters_midi_files() {
        let tmp = TempDir::new("collect");
        let files = [
            "b_simplified.mid",
            "a_simplified.MID",
            "a.mid",
            "notes.txt",
            "c_simplified.midi",
        ];
        for name in files {
            std::fs::write(tmp.0.join(name), b"").unwrap();
        }
        let all = collect_midi_files(&tmp.0, None).unwrap();
        assert_eq!(all.len(), 4);

        let simplified = collect_midi_files(&tmp.0, Some("_simplified")).unwrap();
        let names: Vec<_> = simplified
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        let expected = ["a_simplified.MID", "b_simplified.mid", "c_simplified.midi"];
        assert_eq!(names, expected);
    }

    #[test]
    fn midi_extensions_match_in_any_case() {
        assert!(is_midi_path(Path::new("dir/piece.mid")));
        assert!(is_midi_path(Path::new("piece.MIDI")));
        assert!(!is_midi_path(Path::new("piece.mid.json")));
        assert!(!is_midi_path(Path::new("mid")));
    }

    #[test]
    fn split_files_handles_short_lists() {
        let files: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("{i}.mid"))).collect();
        let (train, valid) = split_files(files.clone(), 3);
        assert_eq!(train.len(), 3);
        assert_eq!(valid.len(), 2);
        let (train, valid) = split_files(files, 30);
        assert_eq!(train.len(), 5);
        assert!(valid.is_empty());
    }
}
