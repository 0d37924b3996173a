use log::debug;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn from_hex(hex: &str) -> Option<Rgb> {
        let h = hex.strip_prefix('#').unwrap_or(hex);
        if h.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&h[0..2], 16).ok()?;
        let g = u8::from_str_radix(&h[2..4], 16).ok()?;
        let b = u8::from_str_radix(&h[4..6], 16).ok()?;
        Some(Rgb { r, g, b })
    }
}

/// Lightens by moving each channel toward 255 by `proportion`, or darkens by
/// scaling toward black when `proportion` is negative.
pub fn lighter_shade(color: Rgb, proportion: f64) -> Rgb {
    let channel = |c: u8| -> u8 {
        if proportion >= 0.0 {
            let headroom = 255.0 - c as f64;
            (c as f64 + (headroom * proportion).round()) as u8
        } else {
            (c as f64 * (1.0 - proportion.abs())).round() as u8
        }
    };

    Rgb {
        r: channel(color.r),
        g: channel(color.g),
        b: channel(color.b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Solid(Rgb),
    /// Two-color vertical gradient, top then bottom.
    Gradient(Rgb, Rgb),
}

impl Background {
    /// The color chord text contrasts against; gradients use their top color.
    pub fn base_color(&self) -> Rgb {
        match *self {
            Background::Solid(c) => c,
            Background::Gradient(top, _) => top,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,
    pub note_colors: Vec<Rgb>,
    pub background: Background,
    pub margin_color: Rgb,
}

fn palette(csv: &str) -> Vec<Rgb> {
    csv.split(',').filter_map(Rgb::from_hex).collect()
}

fn solid(hex: &str) -> Background {
    Background::Solid(Rgb::from_hex(hex).unwrap_or(Rgb::WHITE))
}

fn gradient(top: &str, bottom: &str) -> Background {
    Background::Gradient(
        Rgb::from_hex(top).unwrap_or(Rgb::WHITE),
        Rgb::from_hex(bottom).unwrap_or(Rgb::WHITE),
    )
}

impl Theme {
    fn new(name: &str, colors: &str, background: Background, margin: &str) -> Theme {
        Theme {
            name: name.to_string(),
            note_colors: palette(colors),
            background,
            margin_color: Rgb::from_hex(margin).unwrap_or(Rgb {
                r: 0,
                g: 0,
                b: 0,
            }),
        }
    }

    pub const NAMES: &'static [&'static str] = &[
        "Default",
        "Classic",
        "Obsidian",
        "Darcula",
        "Monochrome",
        "Discord",
        "veryserioussong",
        "Kirby",
        "Medly",
        "MIDI",
    ];

    pub fn builtin(name: &str) -> Option<Theme> {
        let theme = match name {
            "Default" => Theme::new(
                name,
                "f4743b,E6AF2E,94b0da,f0544f,BC2C1A,f49e4c,2191fb,1c5253,70ae6e,beee62",
                gradient("000048", "000032"),
                "000024",
            ),
            "Classic" => Theme::new(
                name,
                "7a8158,816858,5e8158,587081,5e5881,7a5881,815868,415f53",
                solid("000000"),
                "000000",
            ),
            "Obsidian" => Theme::new(
                name,
                "EC7600,678CB1,FF0000,93C763,E0E2E4,66747B",
                solid("293134"),
                "1f2426",
            ),
            "Darcula" => Theme::new(
                name,
                "A9B7C6,CC7832,8888C6,008080,007E09,BBBBBB,FF6B68",
                solid("2B2B2B"),
                "191919",
            ),
            "Monochrome" => Theme::new(
                name,
                "FFFFFF,BBBBBB,707070,303030",
                solid("000000"),
                "000000",
            ),
            "Discord" => Theme::new(
                name,
                "7289da,43b581,f04747,faa61a",
                solid("36393f"),
                "202225",
            ),
            "veryserioussong" => Theme::new(
                name,
                "7b6c43,2b765e,4f6943,6d524f,724e3a,42504f",
                solid("171d19"),
                "000000",
            ),
            "Kirby" => Theme::new(
                name,
                "d57cab,c6e578,8670e9,919bf2,d77a70,da9761,aee17f,68e8e8",
                solid("1e0561"),
                "000000",
            ),
            "Medly" => Theme::new(
                name,
                "eee721,fd54a3,c579ff,f58700",
                gradient("001634", "013d8b"),
                "001326",
            ),
            "MIDI" => Theme::new(name, "000000,ffffff", solid("000000"), "000000"),
            _ => return None,
        };
        Some(theme)
    }
}

/// Cyclic palette consumption: take from the front, reinsert at the back, so
/// the N-th distinct track gets `palette[N mod len]`.
#[derive(Debug, Clone)]
pub struct ColorRotation {
    queue: VecDeque<Rgb>,
}

impl ColorRotation {
    pub fn new(colors: &[Rgb]) -> Self {
        Self {
            queue: colors.iter().copied().collect(),
        }
    }

    pub fn next_color(&mut self) -> Rgb {
        match self.queue.pop_front() {
            Some(color) => {
                self.queue.push_back(color);
                color
            }
            None => Rgb::WHITE,
        }
    }
}

/// Assigns one palette color per track, in first-note-on order.
pub fn assign_track_colors(track_order: &[usize], theme: &Theme) -> HashMap<usize, Rgb> {
    let mut rotation = ColorRotation::new(&theme.note_colors);
    let mut colors = HashMap::new();

    for &track in track_order {
        let color = rotation.next_color();
        debug!("Track {} assigned color {:?}", track, color);
        colors.insert(track, color);
    }

    colors
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(
            Rgb::from_hex("#ff0080"),
            Some(Rgb {
                r: 255,
                g: 0,
                b: 128
            })
        );
        assert_eq!(Rgb::from_hex("f4743b").map(|c| c.r), Some(0xf4));
        assert_eq!(Rgb::from_hex("xyzxyz"), None);
        assert_eq!(Rgb::from_hex("fff"), None);
    }

    #[test]
    fn lighter_shade_moves_toward_white() {
        let base = Rgb { r: 100, g: 0, b: 200 };
        let lighter = lighter_shade(base, 0.5);
        assert_eq!(lighter, Rgb { r: 178, g: 128, b: 228 });

        // Negative proportions darken instead.
        let darker = lighter_shade(base, -0.5);
        assert_eq!(darker, Rgb { r: 50, g: 0, b: 100 });

        // Full lighten saturates at white.
        assert_eq!(lighter_shade(base, 1.0), Rgb::WHITE);
    }

    #[test]
    fn every_builtin_theme_resolves() {
        for name in Theme::NAMES {
            let theme = Theme::builtin(name).unwrap();
            assert!(!theme.note_colors.is_empty(), "{} has no palette", name);
        }
        assert!(Theme::builtin("NotATheme").is_none());
    }

    #[test]
    fn palette_cycles_modulo_length() {
        let theme = Theme::builtin("Discord").unwrap();
        let len = theme.note_colors.len();
        assert_eq!(len, 4);

        // More tracks than palette entries wraps around in first-seen order.
        let order: Vec<usize> = vec![3, 0, 7, 5, 1, 9];
        let colors = assign_track_colors(&order, &theme);

        for (n, &track) in order.iter().enumerate() {
            assert_eq!(colors[&track], theme.note_colors[n % len]);
        }
    }
}
