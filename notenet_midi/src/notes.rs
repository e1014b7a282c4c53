// Note sequences in and out of Standard MIDI Files.
//
// Reading keeps only the key of every NoteOn event. Velocity is ignored, so
// a NoteOn with velocity 0 (a common way of writing note-off) still counts
// as a note. Multi-track files (format 0/1) are merged by absolute tick, ties
// broken by track order then event order; format 2 files hold independent
// sequences and are read one track after another.
//
// Writing produces a format-0 file: one track, 480 ticks per quarter, one
// NoteOn per note at velocity 64, each 128 ticks after the previous, all on
// channel 0. No note-offs are written; players treat each note as sounding
// until the next.
//
// Uses the `midly` crate for parsing and encoding.

use crate::error::{MidiError, Result};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u28},
};
use notenet::encoding::Note;
use std::path::Path;

/// Ticks per quarter note in written files.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Ticks between consecutive written notes.
pub const NOTE_DELTA_TICKS: u32 = 128;

/// Velocity of every written note.
pub const NOTE_VELOCITY: u8 = 64;

/// Read the note-on pitches of a MIDI file in playback order.
pub fn read_notes(path: &Path) -> Result<Vec<Note>> {
    let bytes = std::fs::read(path).map_err(|source| MidiError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    notes_from_bytes(&bytes).map_err(|source| MidiError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse an in-memory SMF and extract its note-on pitches.
pub fn notes_from_bytes(bytes: &[u8]) -> std::result::Result<Vec<Note>, midly::Error> {
    let smf = Smf::parse(bytes)?;
    Ok(notes_from_smf(&smf))
}

pub fn notes_from_smf(smf: &Smf<'_>) -> Vec<Note> {
    let mut events: Vec<(u64, Note)> = Vec::new();
    for track in &smf.tracks {
        collect_note_ons(track, &mut events);
    }
    if smf.header.format != Format::Sequential {
        // Stable, so simultaneous notes keep track-then-event order.
        events.sort_by_key(|&(tick, _)| tick);
    }
    events.into_iter().map(|(_, note)| note).collect()
}

/// Append `(absolute tick, key)` for every NoteOn in `track`.
fn collect_note_ons(track: &[TrackEvent<'_>], out: &mut Vec<(u64, Note)>) {
    let mut tick = 0u64;
    for event in track {
        tick += u64::from(event.delta.as_int());
        if let TrackEventKind::Midi {
            message: MidiMessage::NoteOn { key, .. },
            ..
        } = event.kind
        {
            out.push((tick, key.as_int()));
        }
    }
}

/// Build a single-track SMF playing `notes` in order.
pub fn notes_to_smf(notes: &[Note]) -> Result<Smf<'static>> {
    let mut track: Track<'static> = Vec::with_capacity(notes.len() + 1);
    for &note in notes {
        if note > 127 {
            return Err(MidiError::NoteOutOfRange { note });
        }
        track.push(TrackEvent {
            delta: u28::new(NOTE_DELTA_TICKS),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(note),
                    vel: u7::new(NOTE_VELOCITY),
                },
            },
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));
    smf.tracks.push(track);
    Ok(smf)
}

/// Write `notes` as a playable MIDI file.
pub fn write_notes(notes: &[Note], path: &Path) -> Result<()> {
    let smf = notes_to_smf(notes)?;
    let io_error = |source: std::io::Error| MidiError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(io_error)?;
    std::fs::write(path, &buf).map_err(io_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        }
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    /// An SMF holding `tracks`, each closed with an end-of-track event.
    fn smf_with(format: Format, tracks: Vec<Track<'static>>) -> Smf<'static> {
        let mut smf = Smf::new(Header::new(format, Timing::Metrical(u15::new(480))));
        for mut track in tracks {
            track.push(end_of_track());
            smf.tracks.push(track);
        }
        smf
    }

    #[test]
    fn written_file_reads_back_identically() {
        let notes: Vec<Note> = vec![60, 62, 64, 0, 127, 64];
        let smf = notes_to_smf(&notes).unwrap();
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        assert_eq!(notes_from_bytes(&buf).unwrap(), notes);
    }

    #[test]
    fn written_events_use_fixed_velocity_and_delta() {
        let smf = notes_to_smf(&[60, 61]).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.tracks.len(), 1);
        let track = &smf.tracks[0];
        assert_eq!(track.len(), 3);
        for event in &track[..2] {
            assert_eq!(event.delta.as_int(), NOTE_DELTA_TICKS);
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { vel, .. },
                ..
            } = event.kind
            {
                assert_eq!(vel.as_int(), NOTE_VELOCITY);
            } else {
                panic!("unexpected event {:?}", event.kind);
            }
        }
        let end = &track[2].kind;
        assert!(matches!(end, TrackEventKind::Meta(MetaMessage::EndOfTrack)));
    }

    #[test]
    fn rejects_notes_above_127() {
        let err = notes_to_smf(&[60, 128]).unwrap_err();
        assert!(matches!(err, MidiError::NoteOutOfRange { note: 128 }));
    }

    #[test]
    fn parallel_tracks_merge_by_time() {
        let melody = vec![note_on(0, 0, 72, 90), note_on(480, 0, 74, 90)];
        let bass = vec![note_on(0, 1, 48, 90), note_on(240, 1, 50, 90)];
        let smf = smf_with(Format::Parallel, vec![melody, bass]);
        // Tick 0: 72 (track 0) then 48 (track 1); tick 240: 50; tick 480: 74.
        assert_eq!(notes_from_smf(&smf), vec![72, 48, 50, 74]);
    }

    #[test]
    fn sequential_tracks_concatenate() {
        let first = vec![note_on(480, 0, 60, 90)];
        let second = vec![note_on(0, 0, 67, 90)];
        let smf = smf_with(Format::Sequential, vec![first, second]);
        assert_eq!(notes_from_smf(&smf), vec![60, 67]);
    }

    #[test]
    fn only_note_on_events_are_kept() {
        let track = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::ProgramChange {
                        program: u7::new(52),
                    },
                },
            },
            note_on(0, 0, 60, 80),
            TrackEvent {
                delta: u28::new(100),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::NoteOff {
                        key: u7::new(60),
                        vel: u7::new(0),
                    },
                },
            },
            // Velocity-0 note-on still counts.
            note_on(10, 0, 62, 0),
        ];
        let smf = smf_with(Format::SingleTrack, vec![track]);
        assert_eq!(notes_from_smf(&smf), vec![60, 62]);
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        assert!(notes_from_bytes(b"definitely not midi").is_err());
    }

    #[test]
    fn missing_file_reports_its_path() {
        let path = Path::new("/nonexistent/notenet/piece.mid");
        match read_notes(path) {
            Err(MidiError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected an I/O error, got {other:?}"),
        }
    }
}
