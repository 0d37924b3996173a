use crate::chords::Chord;
use crate::model::note::{Note, NoteModel, PITCH_COUNT};
use crate::model::settings::{Settings, VisKind};
use crate::model::theme::{Rgb, Theme, assign_track_colors};
use crate::sink::{Frame, FrameSink};
use crate::vis::{ViewParams, Visualisation};
use anyhow::Result;
use log::{debug, info};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// One loaded MIDI file's worth of immutable playback data. Reloading a file
/// replaces the whole session rather than mutating it.
#[derive(Debug, Clone)]
pub struct Session {
    pub notes: NoteModel,
    pub chords: Vec<Chord>,
    pub track_colors: HashMap<usize, Rgb>,
    pub pitch_min: u8,
    pub pitch_max: u8,
    pub end_time: f64,
}

impl Session {
    pub fn new(notes: NoteModel, chords: Vec<Chord>, theme: &Theme) -> Session {
        // No notes leaves min > max; the layout falls back to a single lane.
        let (pitch_min, pitch_max) = notes.pitch_bounds().unwrap_or((128, 0));
        let end_time = notes.end_time();
        let track_colors = assign_track_colors(&notes.track_order, theme);

        info!(
            "Session ready: {} notes, pitches {}..={}, ends at {:.2}s",
            notes.note_count(),
            pitch_min,
            pitch_max,
            end_time
        );

        Session {
            notes,
            chords,
            track_colors,
            pitch_min,
            pitch_max,
            end_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// No file loaded.
    Idle,
    /// Session data computed, cursors reset, ready to play or export.
    Initialized,
    Playing,
    Paused,
    Exporting,
}

/// Drives the time cursor over a session, live or frame-by-frame, and owns
/// the windowing cursors that decide which notes are on screen.
pub struct Runner {
    pub vis: Visualisation,
    pub state: RunnerState,
    /// Current playback time in seconds; negative during pre-roll.
    pub time: f64,
    pub paused: bool,
    /// Seconds for a note to cross the full scroll axis; the zoom level.
    pub travel_time: f64,
    cursors: Vec<[usize; PITCH_COUNT]>,
}

impl Runner {
    pub fn new(settings: &Settings) -> Runner {
        Runner {
            vis: Visualisation::new(settings.visualisation),
            state: RunnerState::Idle,
            time: 0.0,
            paused: true,
            travel_time: settings.default_travel_time,
            cursors: Vec::new(),
        }
    }

    /// Resets all per-session playback state. Called on load, reload, and
    /// whenever the session is replaced.
    pub fn initialize(&mut self, session: &Session, settings: &Settings) {
        self.travel_time = initial_travel_time(settings, session.notes.tempo_bpm);
        self.cursors = vec![[0; PITCH_COUNT]; session.notes.tracks.len()];
        self.time = -settings.seconds_before_start;
        self.paused = true;
        self.vis.reset_marker();
        self.state = RunnerState::Initialized;
    }

    pub fn unload(&mut self) {
        self.cursors.clear();
        self.time = 0.0;
        self.paused = true;
        self.state = RunnerState::Idle;
    }

    /// Seconds a note spends between the "now" marker and the trailing edge.
    fn current_to_exit_time(&self) -> f64 {
        self.travel_time * self.vis.activation_proportion()
    }

    /// Seconds a note spends between the leading edge and the "now" marker.
    fn entry_to_current_time(&self) -> f64 {
        self.travel_time * (1.0 - self.vis.activation_proportion())
    }

    /// Timestamps of the very edges of the screen: trailing (exit) and
    /// leading (entry).
    pub fn window(&self) -> (f64, f64) {
        (
            self.time - self.current_to_exit_time(),
            self.time + self.entry_to_current_time(),
        )
    }

    /// The windowing pass. Per (track, pitch) the cursor advances past notes
    /// that have fully left the trailing edge and never revisits them, which
    /// amortizes each frame to the handful of notes near the window. Only
    /// valid while time moves forward; every seek or zoom resets the cursors.
    pub fn visible_notes<'s>(&mut self, session: &'s Session) -> Vec<&'s Note> {
        let (exit_ts, entry_ts) = self.window();
        let mut visible = Vec::new();

        for (track_idx, track) in session.notes.tracks.iter().enumerate() {
            for (pitch, list) in track.iter().enumerate() {
                let cursor = &mut self.cursors[track_idx][pitch];

                while *cursor < list.len() && list[*cursor].end_time < exit_ts {
                    *cursor += 1;
                }

                for note in &list[*cursor..] {
                    if note.start_time >= entry_ts {
                        break;
                    }
                    // A long note can outlive a later-starting one, so notes
                    // past the cursor are filtered rather than evicted.
                    if note.end_time >= exit_ts {
                        visible.push(note);
                    }
                }
            }
        }

        visible
    }

    /// Chord counts are small, so a plain linear filter does.
    pub fn visible_chords<'s>(&self, session: &'s Session) -> Vec<&'s Chord> {
        let (exit_ts, entry_ts) = self.window();
        session
            .chords
            .iter()
            .filter(|c| c.start_time < entry_ts && c.end_time > exit_ts)
            .collect()
    }

    pub fn clear_cursors(&mut self) {
        for track in self.cursors.iter_mut() {
            track.fill(0);
        }
    }

    pub fn zoom_in(&mut self) {
        self.travel_time /= self.zoom_step();
        self.clear_cursors();
    }

    pub fn zoom_out(&mut self) {
        self.travel_time *= self.zoom_step();
        self.clear_cursors();
    }

    /// Static snaps between beat-aligned travel times; everything else zooms
    /// smoothly.
    fn zoom_step(&self) -> f64 {
        if self.vis.kind == VisKind::Static {
            2.0
        } else {
            1.3
        }
    }

    pub fn play_from_start(&mut self, settings: &Settings) {
        self.time = -settings.seconds_before_start;
        self.clear_cursors();
        self.paused = true;
        self.state = RunnerState::Paused;
        self.vis.reset_marker();
    }

    pub fn play_from_end(&mut self, session: &Session) {
        self.time = session.end_time;
        self.clear_cursors();
        self.paused = true;
        self.state = RunnerState::Paused;
    }

    /// Jumps to the closest visible note start strictly before the current
    /// time. At the timeline origin it falls back to the pre-roll start, so
    /// a recording that begins before the first note can be rewound fully.
    pub fn seek_previous_note(&mut self, session: &Session, settings: &Settings) {
        if self.time == 0.0 {
            self.play_from_start(settings);
            return;
        }

        let mut starts: Vec<f64> = self
            .visible_notes(session)
            .iter()
            .map(|n| n.start_time)
            .collect();
        starts.sort_by(|a, b| b.total_cmp(a));

        if let Some(start) = starts.into_iter().find(|&s| s < self.time) {
            self.time = start;
            self.clear_cursors();
            self.paused = true;
            self.state = RunnerState::Paused;
        }
    }

    /// Jumps to the closest visible note start strictly after the current time.
    pub fn seek_next_note(&mut self, session: &Session) {
        let mut starts: Vec<f64> = self
            .visible_notes(session)
            .iter()
            .map(|n| n.start_time)
            .collect();
        starts.sort_by(|a, b| a.total_cmp(b));

        if let Some(start) = starts.into_iter().find(|&s| s > self.time) {
            self.time = start;
            self.clear_cursors();
            self.paused = true;
            self.state = RunnerState::Paused;
        }
    }

    /// Where playback stops: the last note's end, optionally extended by the
    /// time that note needs to fully clear the visible window.
    pub fn effective_end(&self, session: &Session, settings: &Settings) -> f64 {
        if settings.notes_end_offscreen {
            session.end_time + self.current_to_exit_time()
        } else {
            session.end_time
        }
    }

    /// One interactive step: advance by wall-clock dt unless paused, move the
    /// self-scrolling marker, clamp to the end and auto-pause there.
    pub fn tick_interactive(&mut self, dt: f64, session: &Session, settings: &Settings) {
        if !self.paused {
            self.time += dt;

            if self.vis.kind.is_self_scrolling() {
                // The window anchor moved, so monotonicity is gone.
                self.vis.advance_marker(dt, self.travel_time);
                self.clear_cursors();
            }
        }

        let end = self.effective_end(session, settings);
        if self.time >= end {
            self.time = end;
            self.paused = true;
            self.state = RunnerState::Paused;
        }
    }

    /// Composes one frame's draw commands in paint order: notes, time
    /// marker, chord boundary lines, margins, chord text.
    pub fn compose_frame(
        &mut self,
        session: &Session,
        settings: &Settings,
        theme: &Theme,
    ) -> Frame {
        let view = ViewParams {
            settings,
            theme,
            track_colors: &session.track_colors,
            width: settings.screen_width,
            height: settings.screen_height,
            travel_time: self.travel_time,
        };

        let (exit_ts, entry_ts) = self.window();
        let notes = self.visible_notes(session);
        let chords = self.visible_chords(session);

        let mut frame = Frame::new(view.width, view.height, theme.background);

        self.vis.draw_notes(
            &notes,
            self.time,
            exit_ts,
            entry_ts,
            session.pitch_min,
            session.pitch_max,
            &view,
            &mut frame,
        );

        if settings.time_marker {
            self.vis.draw_time_marker(&view, &mut frame);
        }

        if settings.chord_lines {
            // The falling family measures from the leading edge, the
            // scrolling family from the trailing edge.
            let reference_ts = if self.vis.kind.is_vertical() {
                entry_ts
            } else {
                exit_ts
            };
            self.vis.draw_chord_lines(
                &chords,
                reference_ts,
                session.chords.last(),
                &view,
                &mut frame,
            );
        }

        self.vis
            .draw_margin(settings.draw_margin, &view, &mut frame);

        self.vis
            .draw_chords(&chords, self.time, exit_ts, entry_ts, &view, &mut frame);

        frame
    }

    /// Deterministic frame dump: time advances by exactly 1/frame_rate per
    /// frame regardless of rendering speed, so a given session and settings
    /// always produce identical frame timestamps. Returns the frame count;
    /// a raised stop flag leaves the partial frame directory as-is.
    pub fn export(
        &mut self,
        session: &Session,
        settings: &Settings,
        theme: &Theme,
        sink: &mut dyn FrameSink,
        stop: &Arc<AtomicBool>,
    ) -> Result<usize> {
        self.state = RunnerState::Exporting;
        self.time = -settings.seconds_before_start;
        self.clear_cursors();
        self.vis.reset_marker();

        let dt = 1.0 / settings.frame_rate as f64;
        let mut frames = 0usize;

        // `time - dt` so the last in-range frame isn't skipped.
        while self.time - dt <= self.effective_end(session, settings) {
            if stop.load(Ordering::Relaxed) {
                info!("Export stopped after {} frames..!", frames);
                break;
            }

            debug!(
                "Exporting frame {:04} at {:.2}s (end {:.2}s)",
                frames,
                self.time,
                self.effective_end(session, settings)
            );

            let frame = self.compose_frame(session, settings, theme);
            sink.submit(&frame)?;
            frames += 1;

            if self.vis.kind.is_self_scrolling() {
                self.vis.advance_marker(dt, self.travel_time);
                self.clear_cursors();
            }

            self.time += dt;
        }

        self.initialize(session, settings);
        Ok(frames)
    }

    /// Live playback loop: frames are paced to the configured frame rate and
    /// time advances by measured wall-clock dt, so a slow sink drops ahead
    /// rather than slowing the music down. Runs until the end auto-pause or
    /// the stop flag.
    pub fn run_live(
        &mut self,
        session: &Session,
        settings: &Settings,
        theme: &Theme,
        sink: &mut dyn FrameSink,
        stop: &Arc<AtomicBool>,
    ) -> Result<()> {
        self.paused = false;
        self.state = RunnerState::Playing;

        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let frame_period = Duration::from_secs_f64(1.0 / settings.frame_rate as f64);
        let mut last = Instant::now();

        loop {
            if stop.load(Ordering::Relaxed) {
                self.paused = true;
                self.state = RunnerState::Paused;
                info!("Playback stopped at {:.2}s..!", self.time);
                return Ok(());
            }

            let frame = self.compose_frame(session, settings, theme);
            sink.submit(&frame)?;

            sleeper.sleep(frame_period.saturating_sub(last.elapsed()));

            let now = Instant::now();
            let dt = now.duration_since(last).as_secs_f64();
            last = now;

            self.tick_interactive(dt, session, settings);

            if self.paused {
                info!("Playback reached the end at {:.2}s", self.time);
                return Ok(());
            }
        }
    }
}

/// Static starts out beat-aligned: four crotchets across the screen.
fn initial_travel_time(settings: &Settings, tempo_bpm: f64) -> f64 {
    if settings.visualisation == VisKind::Static {
        60.0 / tempo_bpm * 4.0
    } else {
        settings.default_travel_time
    }
}
