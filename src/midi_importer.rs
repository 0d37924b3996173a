use crate::model::note::{Note, NoteModel, PITCH_COUNT};
use anyhow::{Result, anyhow};
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::Path;

const DEFAULT_TEMPO_BPM: f64 = 120.0;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

pub fn import_midi_file<P: AsRef<Path>>(path: P) -> Result<NoteModel> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    import_midi_bytes(&bytes)
}

/// Parses a Type-0/1 MIDI byte stream into per-pitch note lists with both
/// tick and second timestamps.
///
/// Tempo handling is deliberately single-valued: every Set Tempo event
/// overwrites the scalar BPM and only the last value is applied to the whole
/// file, so multi-tempo files come out with skewed timings. Known limitation.
pub fn import_midi_bytes(bytes: &[u8]) -> Result<NoteModel> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let resolution = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };

    debug!("Ticks per quarter note: {}", resolution);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut tempo_bpm = DEFAULT_TEMPO_BPM;
    let mut track_order: Vec<usize> = Vec::new();
    let mut tracks: Vec<Vec<Vec<Note>>> = Vec::with_capacity(smf.tracks.len());

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut pitch_lists: Vec<Vec<Note>> = vec![Vec::new(); PITCH_COUNT];
        let mut abs_tick: u64 = 0;

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micro)) => {
                    tempo_bpm = MICROSECONDS_PER_MINUTE / micro.as_int() as f64;
                    debug!(
                        "Tempo change at tick {} -> {:.2}bpm (track {})",
                        abs_tick, tempo_bpm, track_idx
                    );
                }
                TrackEventKind::Midi {
                    channel: _,
                    message,
                } => match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        if !track_order.contains(&track_idx) {
                            track_order.push(track_idx);
                        }

                        pitch_lists[key.as_int() as usize].push(Note::open(
                            key.as_int(),
                            vel.as_int(),
                            track_idx,
                            abs_tick,
                        ));
                    }
                    MidiMessage::NoteOn { key, vel: _ } | MidiMessage::NoteOff { key, vel: _ } => {
                        close_note(&mut pitch_lists[key.as_int() as usize], abs_tick, track_idx);
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        // Notes still open at the end of the track would otherwise never
        // render; close them at the final tick seen.
        for list in pitch_lists.iter_mut() {
            for note in list.iter_mut().filter(|n| !n.finished) {
                warn!(
                    "Unclosed NoteOn for {} on track {} at tick {}, auto-closing at {}..!",
                    note.pitch, track_idx, note.start_ticks, abs_tick
                );
                note.close(abs_tick.max(note.start_ticks));
            }
        }

        tracks.push(pitch_lists);
    }

    let mut model = NoteModel {
        tracks,
        track_order,
        tempo_bpm,
        resolution,
    };
    compute_note_times(&mut model);

    debug!(
        "Imported {} notes across {} tracks at {:.2}bpm",
        model.note_count(),
        model.tracks.len(),
        model.tempo_bpm
    );

    Ok(model)
}

/// Closes the most recently opened, still-unfinished note at this pitch.
/// Open notes form a stack, so retriggered pitches close innermost-first.
fn close_note(pitch_list: &mut [Note], abs_tick: u64, track_idx: usize) {
    match pitch_list.iter_mut().rev().find(|n| !n.finished) {
        Some(note) => note.close(abs_tick),
        None => debug!(
            "Orphaned NoteOff on track {} at tick {}..!",
            track_idx, abs_tick
        ),
    }
}

/// Second pass: derive start/end seconds for every note from the (single)
/// effective tempo.
fn compute_note_times(model: &mut NoteModel) {
    let (tempo_bpm, resolution) = (model.tempo_bpm, model.resolution);
    for track in model.tracks.iter_mut() {
        for list in track.iter_mut() {
            for note in list.iter_mut() {
                note.compute_times(tempo_bpm, resolution);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header, TrackEvent};

    fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        }
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        }
    }

    fn tempo(delta: u32, mpqn: u32) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(mpqn))),
        }
    }

    fn to_bytes(resolution: u16, tracks: Vec<Vec<TrackEvent<'_>>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(resolution)),
        ));
        smf.tracks = tracks;

        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn two_track_import_end_to_end() {
        env_logger::try_init().unwrap_or(());

        // Track 0: pitch 60, ticks [0, 480]. Track 1: pitch 64, ticks [480, 960].
        let bytes = to_bytes(
            480,
            vec![
                vec![tempo(0, 500_000), note_on(0, 60, 90), note_off(480, 60)],
                vec![note_on(480, 64, 90), note_off(480, 64)],
            ],
        );

        let model = import_midi_bytes(&bytes).unwrap();
        assert_eq!(model.resolution, 480);
        assert_eq!(model.tempo_bpm, 120.0);

        // One quarter note at 120bpm spans half a second.
        let first = &model.tracks[0][60][0];
        assert_eq!(first.start_time, 0.0);
        assert_eq!(first.end_time, 0.5);

        let second = &model.tracks[1][64][0];
        assert_eq!(second.start_time, 0.5);
        assert_eq!(second.end_time, 1.0);

        assert_eq!(model.end_time(), 1.0);
        assert_eq!(model.pitch_bounds(), Some((60, 64)));
        assert_eq!(model.track_order, vec![0, 1]);
    }

    #[test]
    fn sixty_bpm_doubles_every_timestamp() {
        let bytes = to_bytes(
            480,
            vec![
                vec![tempo(0, 1_000_000), note_on(0, 60, 90), note_off(480, 60)],
                vec![note_on(480, 64, 90), note_off(480, 64)],
            ],
        );

        let model = import_midi_bytes(&bytes).unwrap();
        assert_eq!(model.tempo_bpm, 60.0);
        assert_eq!(model.tracks[0][60][0].end_time, 1.0);
        assert_eq!(model.tracks[1][64][0].start_time, 1.0);
        assert_eq!(model.end_time(), 2.0);
    }

    #[test]
    fn zero_velocity_note_on_closes() {
        let bytes = to_bytes(480, vec![vec![note_on(0, 72, 100), note_on(240, 72, 0)]]);

        let model = import_midi_bytes(&bytes).unwrap();
        let note = &model.tracks[0][72][0];
        assert!(note.finished);
        assert_eq!(note.end_ticks, Some(240));
    }

    #[test]
    fn retriggered_pitch_closes_innermost_first() {
        // Two overlapping note-ons at the same pitch; the first note-off must
        // close the most recently opened one.
        let bytes = to_bytes(
            480,
            vec![vec![
                note_on(0, 60, 90),
                note_on(120, 60, 90),
                note_off(120, 60),
                note_off(240, 60),
            ]],
        );

        let model = import_midi_bytes(&bytes).unwrap();
        let list = &model.tracks[0][60];
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].start_ticks, 0);
        assert_eq!(list[0].end_ticks, Some(480));
        assert_eq!(list[1].start_ticks, 120);
        assert_eq!(list[1].end_ticks, Some(240));
    }

    #[test]
    fn later_tempo_event_wins_for_the_whole_file() {
        let bytes = to_bytes(
            480,
            vec![vec![
                tempo(0, 500_000),
                note_on(0, 60, 90),
                tempo(120, 1_000_000),
                note_off(360, 60),
            ]],
        );

        let model = import_midi_bytes(&bytes).unwrap();
        assert_eq!(model.tempo_bpm, 60.0);
        // The whole file is retimed with the last tempo, start included.
        assert_eq!(model.tracks[0][60][0].end_time, 1.0);
    }

    #[test]
    fn unclosed_notes_are_auto_closed() {
        env_logger::try_init().unwrap_or(());

        let bytes = to_bytes(
            480,
            vec![vec![
                note_on(0, 60, 90),
                note_on(480, 64, 90),
                note_off(480, 64),
            ]],
        );

        let model = import_midi_bytes(&bytes).unwrap();
        let dangling = &model.tracks[0][60][0];
        assert!(dangling.finished);
        assert_eq!(dangling.end_ticks, Some(960));
    }

    #[test]
    fn garbage_bytes_fail_to_import() {
        assert!(import_midi_bytes(b"not a midi file at all").is_err());
    }
}
