use crate::chords::Chord;
use crate::model::note::Note;
use crate::model::settings::{ChordSide, ChordStyle, Settings, VisKind};
use crate::model::theme::{Rgb, Theme, lighter_shade};
use crate::sink::{Anchor, DrawCmd, Frame, Orientation};
use std::collections::HashMap;

const TIME_MARKER_ALPHA: u8 = 100;
const CHORD_LINE_ALPHA: u8 = 50;
const CHORD_BASE_SHADE: f64 = 0.2;

/// Everything a layout pass needs to turn times and pitches into pixels.
/// Built fresh per frame; no rendering state survives between calls.
pub struct ViewParams<'a> {
    pub settings: &'a Settings,
    pub theme: &'a Theme,
    pub track_colors: &'a HashMap<usize, Rgb>,
    pub width: u32,
    pub height: u32,
    pub travel_time: f64,
}

impl VisKind {
    /// Where the "now" marker sits along the scroll axis at rest, as a
    /// fraction measured from the trailing edge.
    pub fn base_activation(self) -> f64 {
        match self {
            VisKind::Classic => 0.5,
            VisKind::Foresight => 0.125,
            VisKind::Hindsight => 0.875,
            VisKind::Static | VisKind::Drift => 0.0,
            VisKind::Synthesia => 0.1,
        }
    }

    /// Static and Drift move the marker itself each tick instead of
    /// scrolling notes past a fixed marker.
    pub fn is_self_scrolling(self) -> bool {
        matches!(self, VisKind::Static | VisKind::Drift)
    }

    /// Synthesia scrolls vertically (pitch maps to columns); everything else
    /// scrolls horizontally (pitch maps to rows).
    pub fn is_vertical(self) -> bool {
        matches!(self, VisKind::Synthesia)
    }
}

/// One of the closed set of layout algorithms, plus the marker position that
/// the self-scrolling variants animate.
#[derive(Debug, Clone)]
pub struct Visualisation {
    pub kind: VisKind,
    activation: f64,
}

impl Visualisation {
    pub fn new(kind: VisKind) -> Self {
        Self {
            kind,
            activation: kind.base_activation(),
        }
    }

    pub fn activation_proportion(&self) -> f64 {
        self.activation
    }

    pub fn reset_marker(&mut self) {
        self.activation = self.kind.base_activation();
    }

    /// Advances the marker for the self-scrolling variants by
    /// `dt * pixels_per_second / axis length`, which reduces to
    /// `dt / travel_time`. Wraps with a true modulo so pathological dt
    /// values can't push it past 1.
    pub fn advance_marker(&mut self, dt: f64, travel_time: f64) {
        let factor = match self.kind {
            VisKind::Static => 1.0,
            VisKind::Drift => 0.75,
            _ => return,
        };

        self.activation += dt * factor / travel_time;
        self.activation = self.activation.rem_euclid(1.0);
    }

    fn scroll_axis_len(&self, view: &ViewParams) -> u32 {
        if self.kind.is_vertical() {
            view.height
        } else {
            view.width
        }
    }

    pub fn pixels_per_second(&self, view: &ViewParams) -> f64 {
        self.scroll_axis_len(view) as f64 / view.travel_time
    }

    /// Pixels trimmed from a note's extent along the time axis. The same
    /// setting applies to both families; only the screen axis it lands on
    /// swaps with the orientation.
    fn trim_time_axis(&self, view: &ViewParams) -> u32 {
        view.settings.consecutive_note_gap
    }

    /// Pixels trimmed from a note's thickness along the pitch axis.
    fn trim_pitch_axis(&self, view: &ViewParams) -> u32 {
        view.settings.simultaneous_note_gap
    }

    pub fn draw_notes(
        &self,
        notes: &[&Note],
        now: f64,
        exit_ts: f64,
        entry_ts: f64,
        pitch_min: u8,
        pitch_max: u8,
        view: &ViewParams,
        frame: &mut Frame,
    ) {
        let pps = self.pixels_per_second(view);
        let filled = view.settings.notes_filled;
        let corner_radius = view.settings.corner_style.radius();
        let trim_time = self.trim_time_axis(view) as f64;
        let trim_pitch = self.trim_pitch_axis(view) as f64;

        let lanes = lane_count(pitch_min, pitch_max);
        let mult = margin_multiplier(view.settings.draw_margin);

        if self.kind.is_vertical() {
            let margin_x = margin_px(view.width, view.settings.edge_margin_proportion);
            let column_width = lane_size(view.width, margin_x, mult, lanes);
            let note_width = (column_width - trim_pitch).round().max(1.0) as u32;

            for note in notes {
                let col = lane_index(note.pitch, pitch_min);
                let x = (margin_x * mult + col as f64 * column_width).round() as i32;
                let y = (-(note.end_time - entry_ts) * pps).round() as i32;
                let h = (note.duration() * pps - trim_time).round().max(1.0) as u32;

                frame.cmds.push(DrawCmd::Rect {
                    x,
                    y,
                    w: note_width,
                    h,
                    color: self.note_color(note, now, view),
                    filled,
                    corner_radius,
                });
            }
        } else {
            let margin_y = margin_px(view.height, view.settings.edge_margin_proportion);
            let row_height = lane_size(view.height, margin_y, mult, lanes);
            let note_height = (row_height - trim_pitch).round().max(1.0) as u32;

            // Low pitches sit near the bottom edge, so the margin offset is
            // measured from the bottom of the screen to the top of the note.
            for note in notes {
                let row = lane_index(note.pitch, pitch_min);
                let y = (view.height as f64
                    - margin_y * mult
                    - note_height as f64
                    - row as f64 * row_height)
                    .round() as i32;
                let x = ((note.start_time - exit_ts) * pps).round() as i32;
                let w = (note.duration() * pps - trim_time).round().max(1.0) as u32;

                frame.cmds.push(DrawCmd::Rect {
                    x,
                    y,
                    w,
                    h: note_height,
                    color: self.note_color(note, now, view),
                    filled,
                    corner_radius,
                });
            }
        }
    }

    fn note_color(&self, note: &Note, now: f64, view: &ViewParams) -> Rgb {
        let base = view
            .theme
            .note_colors
            .first()
            .copied()
            .unwrap_or(Rgb::WHITE);
        let color = view
            .track_colors
            .get(&note.track)
            .copied()
            .unwrap_or(base);

        if note.is_active(now) {
            lighter_shade(color, view.settings.activation_brightness)
        } else {
            color
        }
    }

    pub fn draw_time_marker(&self, view: &ViewParams, frame: &mut Frame) {
        let cmd = if self.kind.is_vertical() {
            DrawCmd::Line {
                orientation: Orientation::Horizontal,
                position: (view.height as f64 * (1.0 - self.activation)).round() as i32,
                color: Rgb::WHITE,
                alpha: TIME_MARKER_ALPHA,
            }
        } else {
            DrawCmd::Line {
                orientation: Orientation::Vertical,
                position: (view.width as f64 * self.activation).round() as i32,
                color: Rgb::WHITE,
                alpha: TIME_MARKER_ALPHA,
            }
        };
        frame.cmds.push(cmd);
    }

    /// Margins flank the pitch axis. When hidden they still reserve layout
    /// space at the reduced multiplier; nothing is emitted.
    pub fn draw_margin(&self, visible: bool, view: &ViewParams, frame: &mut Frame) {
        if !visible {
            return;
        }

        let color = view.theme.margin_color;
        if self.kind.is_vertical() {
            let margin_w = margin_px(view.width, view.settings.edge_margin_proportion).round()
                as u32;
            for x in [0, (view.width - margin_w.min(view.width)) as i32] {
                frame.cmds.push(DrawCmd::Rect {
                    x,
                    y: 0,
                    w: margin_w,
                    h: view.height,
                    color,
                    filled: true,
                    corner_radius: 0,
                });
            }
        } else {
            let margin_h = margin_px(view.height, view.settings.edge_margin_proportion).round()
                as u32;
            for y in [0, (view.height - margin_h.min(view.height)) as i32] {
                frame.cmds.push(DrawCmd::Rect {
                    x: 0,
                    y,
                    w: view.width,
                    h: margin_h,
                    color,
                    filled: true,
                    corner_radius: 0,
                });
            }
        }
    }

    /// Chord text lives on the margin strip picked by `chord_side`. Returns
    /// the strip's center along the pitch axis.
    fn chord_band_center(&self, view: &ViewParams) -> i32 {
        if self.kind.is_vertical() {
            let margin_w = margin_px(view.width, view.settings.edge_margin_proportion);
            match view.settings.chord_side {
                ChordSide::Top => (view.width as f64 - margin_w / 2.0).round() as i32,
                ChordSide::Bottom => (margin_w / 2.0).round() as i32,
            }
        } else {
            let margin_h = margin_px(view.height, view.settings.edge_margin_proportion);
            match view.settings.chord_side {
                ChordSide::Top => (margin_h / 2.0).round() as i32,
                ChordSide::Bottom => (view.height as f64 - margin_h / 2.0).round() as i32,
            }
        }
    }

    /// Chord font size in proportion to the screen, leaving the configured
    /// breathing room inside the margin strip.
    fn chord_font_px(&self, view: &ViewParams) -> u32 {
        let emp = view.settings.edge_margin_proportion;
        let proportion = emp - emp * view.settings.chord_margin_proportion * 2.0;
        (proportion * view.height as f64).round().max(1.0) as u32
    }

    pub fn draw_chords(
        &self,
        chords: &[&Chord],
        now: f64,
        exit_ts: f64,
        entry_ts: f64,
        view: &ViewParams,
        frame: &mut Frame,
    ) {
        let style = view.settings.chord_style;
        if style == ChordStyle::Disabled {
            return;
        }

        let pps = self.pixels_per_second(view);
        let size_px = self.chord_font_px(view);
        let band = self.chord_band_center(view);
        let bg = view.theme.background.base_color();

        for chord in chords {
            match style {
                ChordStyle::Dynamic | ChordStyle::DynamicInline => {
                    // Dynamic centers the text over the chord's span;
                    // Dynamic Inline anchors it at the chord start.
                    let offset = if style == ChordStyle::Dynamic {
                        chord.duration() / 2.0 * pps
                    } else if self.kind.is_vertical() {
                        chord.duration() * pps
                    } else {
                        0.0
                    };

                    let mut color = lighter_shade(bg, CHORD_BASE_SHADE);
                    if chord.is_active(now) {
                        color = lighter_shade(color, view.settings.activation_brightness);
                    }

                    let (x, y) = if self.kind.is_vertical() {
                        let y = (-(chord.end_time - entry_ts) * pps + offset).round() as i32;
                        (band, y)
                    } else {
                        let x = ((chord.start_time - exit_ts) * pps + offset).round() as i32;
                        (x, band)
                    };

                    frame.cmds.push(DrawCmd::Text {
                        text: chord.text.clone(),
                        x,
                        y,
                        size_px,
                        color,
                        anchor: Anchor::Center,
                    });
                }
                ChordStyle::Static => {
                    // Only the chord sounding right now is shown, parked at a
                    // fixed spot instead of scrolling.
                    if !chord.is_active(now) {
                        continue;
                    }

                    let color = lighter_shade(bg, view.settings.activation_brightness);
                    let (x, y) = if self.kind.is_vertical() {
                        (band, (view.height / 2) as i32)
                    } else {
                        ((view.width / 8) as i32, band)
                    };

                    frame.cmds.push(DrawCmd::Text {
                        text: chord.text.clone(),
                        x,
                        y,
                        size_px,
                        color,
                        anchor: Anchor::Center,
                    });
                }
                ChordStyle::Disabled => unreachable!(),
            }
        }
    }

    /// Boundary lines: one at every chord start, plus one at the very end of
    /// the final chord so its close is delimited too.
    pub fn draw_chord_lines(
        &self,
        chords: &[&Chord],
        reference_ts: f64,
        last_chord: Option<&Chord>,
        view: &ViewParams,
        frame: &mut Frame,
    ) {
        let style = view.settings.chord_style;
        let pps = self.pixels_per_second(view);

        let mut line = |time: f64, frame: &mut Frame| {
            let position = if self.kind.is_vertical() {
                (-(time - reference_ts) * pps).round() as i32
            } else {
                ((time - reference_ts) * pps).round() as i32
            };
            frame.cmds.push(DrawCmd::Line {
                orientation: if self.kind.is_vertical() {
                    Orientation::Horizontal
                } else {
                    Orientation::Vertical
                },
                position,
                color: Rgb::WHITE,
                alpha: CHORD_LINE_ALPHA,
            });
        };

        for chord in chords {
            // Inline labels update continuously, so silent spans get no line.
            if style == ChordStyle::DynamicInline && chord.text.is_empty() {
                continue;
            }

            if style == ChordStyle::Dynamic
                && let Some(last) = last_chord
                && std::ptr::eq(*chord, last)
            {
                line(chord.end_time, frame);
            }

            line(chord.start_time, frame);
        }
    }
}

/// Margin thickness in pixels along one edge of the pitch axis.
pub fn margin_px(dimension: u32, proportion: f64) -> f64 {
    dimension as f64 * proportion
}

/// Drawn margins reserve half a margin of extra spacing between the notes
/// and the strip itself.
pub fn margin_multiplier(draw_margin: bool) -> f64 {
    if draw_margin { 1.5 } else { 1.0 }
}

/// Number of pitch lanes. A degenerate range (no notes) falls back to a
/// single lane so the layout math can't divide by zero.
pub fn lane_count(pitch_min: u8, pitch_max: u8) -> u32 {
    if pitch_min > pitch_max {
        1
    } else {
        (pitch_max - pitch_min) as u32 + 1
    }
}

fn lane_index(pitch: u8, pitch_min: u8) -> u32 {
    pitch.saturating_sub(pitch_min) as u32
}

/// Per-lane thickness after both margins are reserved.
pub fn lane_size(dimension: u32, margin: f64, multiplier: f64, lanes: u32) -> f64 {
    (dimension as f64 - 2.0 * margin * multiplier) / lanes as f64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::note::Note;
    use crate::model::theme::Background;

    fn make_note(pitch: u8, start: f64, end: f64) -> Note {
        let mut n = Note::open(pitch, 90, 0, 0);
        n.close(1);
        n.start_time = start;
        n.end_time = end;
        n
    }

    fn empty_colors() -> &'static HashMap<usize, Rgb> {
        static MAP: std::sync::OnceLock<HashMap<usize, Rgb>> = std::sync::OnceLock::new();
        MAP.get_or_init(HashMap::new)
    }

    fn view<'a>(settings: &'a Settings, theme: &'a Theme) -> ViewParams<'a> {
        ViewParams {
            settings,
            theme,
            track_colors: empty_colors(),
            width: 1000,
            height: 500,
            travel_time: 10.0,
        }
    }

    #[test]
    fn pixels_per_second_follows_scroll_axis() {
        let settings = Settings::default();
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let classic = Visualisation::new(VisKind::Classic);
        assert_eq!(classic.pixels_per_second(&view), 100.0);

        let synthesia = Visualisation::new(VisKind::Synthesia);
        assert_eq!(synthesia.pixels_per_second(&view), 50.0);
    }

    #[test]
    fn base_activations() {
        assert_eq!(VisKind::Classic.base_activation(), 0.5);
        assert_eq!(VisKind::Foresight.base_activation(), 0.125);
        assert_eq!(VisKind::Hindsight.base_activation(), 0.875);
        assert_eq!(VisKind::Static.base_activation(), 0.0);
        assert_eq!(VisKind::Synthesia.base_activation(), 0.1);
    }

    #[test]
    fn self_scrolling_marker_wraps_modulo_one() {
        let mut vis = Visualisation::new(VisKind::Static);
        // With a 10s travel time, 1s of wall time moves the marker by 0.1.
        vis.advance_marker(1.0, 10.0);
        assert!((vis.activation_proportion() - 0.1).abs() < 1e-9);

        // A pathologically large dt still lands inside [0, 1).
        vis.advance_marker(123.4, 10.0);
        let a = vis.activation_proportion();
        assert!((0.0..1.0).contains(&a));

        // Drift moves at three quarters of the Static rate.
        let mut drift = Visualisation::new(VisKind::Drift);
        drift.advance_marker(1.0, 10.0);
        assert!((drift.activation_proportion() - 0.075).abs() < 1e-9);

        // Classic never moves its marker.
        let mut classic = Visualisation::new(VisKind::Classic);
        classic.advance_marker(1.0, 10.0);
        assert_eq!(classic.activation_proportion(), 0.5);

        // The reset used by play-from-start.
        vis.reset_marker();
        assert_eq!(vis.activation_proportion(), 0.0);
    }

    #[test]
    fn degenerate_pitch_range_uses_one_lane() {
        assert_eq!(lane_count(128, 0), 1);
        assert_eq!(lane_count(60, 60), 1);
        assert_eq!(lane_count(60, 64), 5);
    }

    #[test]
    fn classic_note_geometry() {
        let mut settings = Settings::default();
        settings.draw_margin = false;
        settings.edge_margin_proportion = 0.0;
        settings.consecutive_note_gap = 0;
        settings.simultaneous_note_gap = 0;
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let vis = Visualisation::new(VisKind::Classic);
        let note = make_note(60, 5.0, 6.0);
        let notes = vec![&note];

        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        // Window centered on t=5: exit at 0, entry at 10.
        vis.draw_notes(&notes, 5.0, 0.0, 10.0, 60, 64, &view, &mut frame);

        let DrawCmd::Rect { x, y, w, h, .. } = &frame.cmds[0] else {
            panic!("expected a rect");
        };

        // pps = 100; start 5s from the exit edge, 1s long.
        assert_eq!(*x, 500);
        assert_eq!(*w, 100);
        // 5 lanes of 100px; pitch 60 is the bottom row.
        assert_eq!(*h, 100);
        assert_eq!(*y, 400);
    }

    #[test]
    fn synthesia_note_geometry() {
        let mut settings = Settings::default();
        settings.draw_margin = false;
        settings.edge_margin_proportion = 0.0;
        settings.consecutive_note_gap = 0;
        settings.simultaneous_note_gap = 0;
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let vis = Visualisation::new(VisKind::Synthesia);
        let note = make_note(62, 5.0, 6.0);
        let notes = vec![&note];

        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        vis.draw_notes(&notes, 5.0, 0.0, 10.0, 60, 64, &view, &mut frame);

        let DrawCmd::Rect { x, y, w, h, .. } = &frame.cmds[0] else {
            panic!("expected a rect");
        };

        // pps = 50; the note's end trails the entry edge by 4s of fall.
        assert_eq!(*y, 200);
        assert_eq!(*h, 50);
        // 5 columns of 200px; pitch 62 is the middle one.
        assert_eq!(*x, 400);
        assert_eq!(*w, 200);
    }

    #[test]
    fn note_length_is_floored_at_one_pixel() {
        let mut settings = Settings::default();
        settings.draw_margin = false;
        settings.edge_margin_proportion = 0.0;
        settings.consecutive_note_gap = 10;
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let vis = Visualisation::new(VisKind::Classic);
        let note = make_note(60, 5.0, 5.01);
        let notes = vec![&note];

        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        vis.draw_notes(&notes, 0.0, 0.0, 10.0, 60, 64, &view, &mut frame);

        let DrawCmd::Rect { w, .. } = &frame.cmds[0] else {
            panic!("expected a rect");
        };
        assert_eq!(*w, 1);
    }

    #[test]
    fn time_marker_positions() {
        let settings = Settings::default();
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        Visualisation::new(VisKind::Classic).draw_time_marker(&view, &mut frame);
        Visualisation::new(VisKind::Synthesia).draw_time_marker(&view, &mut frame);

        assert_eq!(
            frame.cmds[0],
            DrawCmd::Line {
                orientation: Orientation::Vertical,
                position: 500,
                color: Rgb::WHITE,
                alpha: TIME_MARKER_ALPHA,
            }
        );
        // Synthesia's marker sits 90% of the way down the screen.
        assert_eq!(
            frame.cmds[1],
            DrawCmd::Line {
                orientation: Orientation::Horizontal,
                position: 450,
                color: Rgb::WHITE,
                alpha: TIME_MARKER_ALPHA,
            }
        );
    }

    #[test]
    fn chord_lines_mark_starts_and_final_end() {
        let mut settings = Settings::default();
        settings.chord_style = ChordStyle::Dynamic;
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let chords = vec![
            Chord {
                text: "C".into(),
                start_time: 0.0,
                end_time: 1.0,
            },
            Chord {
                text: "G".into(),
                start_time: 1.0,
                end_time: 2.0,
            },
        ];
        let visible: Vec<&Chord> = chords.iter().collect();

        let vis = Visualisation::new(VisKind::Classic);
        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        vis.draw_chord_lines(&visible, 0.0, chords.last(), &view, &mut frame);

        // Two starts plus the final chord's end.
        assert_eq!(frame.cmds.len(), 3);

        let positions: Vec<i32> = frame
            .cmds
            .iter()
            .map(|cmd| match cmd {
                DrawCmd::Line { position, .. } => *position,
                _ => panic!("expected lines"),
            })
            .collect();
        assert!(positions.contains(&0));
        assert!(positions.contains(&100));
        assert!(positions.contains(&200));
    }

    #[test]
    fn inline_style_suppresses_silent_chord_lines() {
        let mut settings = Settings::default();
        settings.chord_style = ChordStyle::DynamicInline;
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let chords = vec![
            Chord {
                text: String::new(),
                start_time: 0.0,
                end_time: 1.0,
            },
            Chord {
                text: "G".into(),
                start_time: 1.0,
                end_time: 2.0,
            },
        ];
        let visible: Vec<&Chord> = chords.iter().collect();

        let vis = Visualisation::new(VisKind::Classic);
        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        vis.draw_chord_lines(&visible, 0.0, chords.last(), &view, &mut frame);

        assert_eq!(frame.cmds.len(), 1);
    }

    #[test]
    fn static_chord_style_only_renders_the_active_chord() {
        let mut settings = Settings::default();
        settings.chord_style = ChordStyle::Static;
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let chords = vec![
            Chord {
                text: "C".into(),
                start_time: 0.0,
                end_time: 1.0,
            },
            Chord {
                text: "G".into(),
                start_time: 1.0,
                end_time: 2.0,
            },
        ];
        let visible: Vec<&Chord> = chords.iter().collect();

        let vis = Visualisation::new(VisKind::Classic);
        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        vis.draw_chords(&visible, 1.5, 0.0, 10.0, &view, &mut frame);

        assert_eq!(frame.cmds.len(), 1);
        let DrawCmd::Text { text, .. } = &frame.cmds[0] else {
            panic!("expected text");
        };
        assert_eq!(text, "G");
    }

    #[test]
    fn disabled_chord_style_draws_nothing() {
        let settings = Settings::default();
        let theme = Theme::builtin("Classic").unwrap();
        let view = view(&settings, &theme);

        let chord = Chord {
            text: "C".into(),
            start_time: 0.0,
            end_time: 1.0,
        };

        let vis = Visualisation::new(VisKind::Classic);
        let mut frame = Frame::new(1000, 500, Background::Solid(Rgb::WHITE));
        vis.draw_chords(&[&chord], 0.5, 0.0, 10.0, &view, &mut frame);
        assert!(frame.cmds.is_empty());
    }
}
