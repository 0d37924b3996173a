use serde::{Deserialize, Serialize};

pub const PITCH_COUNT: usize = 128;

/// A single note parsed from a MIDI stream. Tick fields come straight from the
/// file; the time fields are derived once per load from the global tempo.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub track: usize,
    pub start_ticks: u64,
    pub end_ticks: Option<u64>,
    pub start_time: f64,
    pub end_time: f64,
    pub finished: bool,
}

impl Note {
    pub fn open(pitch: u8, velocity: u8, track: usize, start_ticks: u64) -> Self {
        Self {
            pitch,
            velocity,
            track,
            start_ticks,
            end_ticks: None,
            start_time: 0.0,
            end_time: 0.0,
            finished: false,
        }
    }

    pub fn close(&mut self, end_ticks: u64) {
        self.end_ticks = Some(end_ticks);
        self.finished = true;
    }

    /// Converts the tick fields to seconds. Only valid for files without
    /// mid-song tempo changes.
    pub fn compute_times(&mut self, tempo_bpm: f64, resolution: u16) {
        self.start_time = ticks_to_seconds(self.start_ticks, tempo_bpm, resolution);
        self.end_time =
            ticks_to_seconds(self.end_ticks.unwrap_or(self.start_ticks), tempo_bpm, resolution);
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Notes that are currently sounding get recolored. Time 0 is the
    /// startup/reset sentinel and never counts as active.
    pub fn is_active(&self, time: f64) -> bool {
        self.start_time <= time && self.end_time >= time && time != 0.0
    }
}

pub fn ticks_to_seconds(ticks: u64, tempo_bpm: f64, resolution: u16) -> f64 {
    ticks as f64 / resolution as f64 * (60.0 / tempo_bpm)
}

/// One MIDI file's worth of notes: per track, 128 pitch lists ordered by start
/// time (insertion order from a well-formed stream already satisfies this).
#[derive(Debug, Clone)]
pub struct NoteModel {
    pub tracks: Vec<Vec<Vec<Note>>>,
    /// Track indices in order of each track's first note-on, used for cyclic
    /// palette assignment.
    pub track_order: Vec<usize>,
    pub tempo_bpm: f64,
    pub resolution: u16,
}

impl NoteModel {
    /// Extremes across all pitch lists with at least one note, so the pitch
    /// axis doesn't waste space. `None` for a file with no notes.
    pub fn pitch_bounds(&self) -> Option<(u8, u8)> {
        let mut bounds: Option<(u8, u8)> = None;
        for track in &self.tracks {
            for (pitch, list) in track.iter().enumerate() {
                if list.is_empty() {
                    continue;
                }
                let pitch = pitch as u8;
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(pitch), hi.max(pitch)),
                    None => (pitch, pitch),
                });
            }
        }
        bounds
    }

    /// Largest end_time among all notes, i.e. when playback should stop.
    /// Lists are ordered by start time, not end time, so every note is
    /// checked: a long note can outlive later-starting ones.
    pub fn end_time(&self) -> f64 {
        let mut maximum: f64 = 0.0;
        for track in &self.tracks {
            for list in track {
                for note in list {
                    if note.end_time > maximum {
                        maximum = note.end_time;
                    }
                }
            }
        }
        maximum
    }

    pub fn note_count(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| t.iter().map(Vec::len).sum::<usize>())
            .sum()
    }
}
