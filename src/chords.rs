use anyhow::{Result, anyhow, bail};
use log::debug;
use std::fs;
use std::path::Path;

/// A time-stamped chord span. Immutable once laid out; consecutive chords
/// always touch (`end_time` of one equals `start_time` of the next).
#[derive(Debug, Clone, PartialEq)]
pub struct Chord {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl Chord {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Unlike notes, a chord's end is exclusive so back-to-back chords never
    /// count as simultaneously active. Time 0 is the reset sentinel.
    pub fn is_active(&self, time: f64) -> bool {
        self.start_time <= time && self.end_time > time && time != 0.0
    }
}

/// Symbolic duration codes, in multiples of a crotchet beat.
fn duration_code(code: char, crotchet: f64) -> Option<f64> {
    let duration = match code {
        'a' => crotchet * 0.25,
        'b' => crotchet * 0.5,
        'c' => crotchet,
        'd' => crotchet * 2.0,
        'e' => crotchet * 4.0,
        'f' => crotchet / 6.0,
        'g' => crotchet / 3.0,
        'h' => crotchet / 1.5,
        'i' => crotchet * 0.125,
        _ => return None,
    };
    Some(duration)
}

/// Splits `TEXT[D]` into text and duration parts, taking the last opening
/// bracket so chord names may themselves contain brackets.
fn split_token(token: &str) -> Option<(&str, &str)> {
    let body = token.strip_suffix(']')?;
    let split = body.rfind('[')?;
    let (text, duration) = (&body[..split], &body[split + 1..]);
    if text.is_empty() {
        return None;
    }
    Some((text, duration))
}

/// Reads chord tokens from a plain text file, separated by `, ` or newlines.
pub fn load_chord_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read chord file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let mut tokens = Vec::new();
    for line in raw.lines() {
        for token in line.split(", ") {
            let token = token.replace(',', "");
            if token.is_empty() {
                continue;
            }
            tokens.push(token);
        }
    }

    debug!(
        "Read {} chord tokens from {}",
        tokens.len(),
        path.as_ref().display()
    );
    Ok(tokens)
}

/// Lays the tokens out back-to-back from time 0. Any invalid token fails the
/// whole parse; no partial chord list is ever produced.
pub fn parse_chords<S: AsRef<str>>(tokens: &[S], tempo_bpm: f64) -> Result<Vec<Chord>> {
    let crotchet = 60.0 / tempo_bpm;

    let mut elapsed = 0.0;
    let mut chords = Vec::with_capacity(tokens.len());

    for token in tokens {
        let token = token.as_ref();
        let Some((text, duration)) = split_token(token) else {
            bail!("'{}' is not a valid chord token..!", token);
        };

        let (code, dotted) = match duration.strip_suffix('.') {
            Some(code) => (code, true),
            None => (duration, false),
        };

        let mut code_chars = code.chars();
        let duration = match (code_chars.next(), code_chars.next()) {
            (Some(c), None) => duration_code(c, crotchet),
            _ => None,
        };
        let Some(mut duration) = duration else {
            bail!("'{}' is not a valid chord token..!", token);
        };

        if dotted {
            duration *= 1.5;
        }

        // The literal `!` marks a silent, textless span.
        let text = if text == "!" { String::new() } else { text.to_string() };

        chords.push(Chord {
            text,
            start_time: elapsed,
            end_time: elapsed + duration,
        });
        elapsed += duration;
    }

    Ok(chords)
}
