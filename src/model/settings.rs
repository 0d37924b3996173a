use anyhow::{Result, anyhow, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ALLOWED_FRAME_RATES: &[u32] = &[24, 30, 50, 60];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChordStyle {
    #[default]
    Disabled,
    Static,
    Dynamic,
    #[serde(rename = "Dynamic Inline")]
    DynamicInline,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChordSide {
    Top,
    #[default]
    Bottom,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CornerStyle {
    #[serde(rename = "Not Rounded")]
    #[default]
    NotRounded,
    #[serde(rename = "Slightly Rounded")]
    SlightlyRounded,
    #[serde(rename = "Very Rounded")]
    VeryRounded,
}

impl CornerStyle {
    pub fn radius(self) -> u32 {
        match self {
            CornerStyle::NotRounded => 0,
            CornerStyle::SlightlyRounded => 3,
            CornerStyle::VeryRounded => 8,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisKind {
    #[default]
    Classic,
    Foresight,
    Hindsight,
    Static,
    Drift,
    Synthesia,
}

impl VisKind {
    pub fn parse(name: &str) -> Option<VisKind> {
        let kind = match name {
            "Classic" => VisKind::Classic,
            "Foresight" => VisKind::Foresight,
            "Hindsight" => VisKind::Hindsight,
            "Static" => VisKind::Static,
            "Drift" => VisKind::Drift,
            "Synthesia" => VisKind::Synthesia,
            _ => return None,
        };
        Some(kind)
    }
}

/// The flat configuration record consumed by the whole visualiser. Persisted
/// as a flat key/value file; every load goes through `validate` so the rest of
/// the code can trust the fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub visualisation: VisKind,
    pub chord_style: ChordStyle,
    pub chord_side: ChordSide,
    pub theme: String,

    pub edge_margin_proportion: f64,
    pub chord_margin_proportion: f64,
    /// Pixels trimmed along the time axis, creating gaps between
    /// back-to-back notes at the same pitch.
    pub consecutive_note_gap: u32,
    /// Pixels trimmed along the pitch axis, creating gaps between
    /// notes sounding at the same time.
    pub simultaneous_note_gap: u32,

    pub notes_filled: bool,
    pub draw_margin: bool,
    pub chord_lines: bool,
    pub time_marker: bool,
    pub notes_end_offscreen: bool,
    pub corner_style: CornerStyle,
    pub activation_brightness: f64,

    pub frame_rate: u32,
    pub seconds_before_start: f64,
    pub default_travel_time: f64,
    pub screen_width: u32,
    pub screen_height: u32,

    pub folder_to_save: PathBuf,
    pub file_name: String,
    pub chord_path: Option<PathBuf>,
    pub last_selected_tab: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            visualisation: VisKind::Classic,
            chord_style: ChordStyle::Disabled,
            chord_side: ChordSide::Bottom,
            theme: String::from("Default"),

            edge_margin_proportion: 0.1,
            chord_margin_proportion: 0.25,
            consecutive_note_gap: 2,
            simultaneous_note_gap: 2,

            notes_filled: true,
            draw_margin: true,
            chord_lines: false,
            time_marker: true,
            notes_end_offscreen: false,
            corner_style: CornerStyle::NotRounded,
            activation_brightness: 0.5,

            frame_rate: 60,
            seconds_before_start: 1.0,
            default_travel_time: 6.0,
            screen_width: 1250,
            screen_height: 600,

            folder_to_save: PathBuf::from("."),
            file_name: String::from("output"),
            chord_path: None,
            last_selected_tab: 0,
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!(
                "Failed to read settings file {}: {}",
                path.as_ref().display(),
                e
            )
        })?;

        let settings: Settings =
            toml::from_str(&raw).map_err(|e| anyhow!("Invalid settings file: {}", e))?;

        settings.validate()?;
        debug!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Missing file means defaults; a present-but-broken file is an error the
    /// user should see rather than silently losing their options.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Settings> {
        if path.as_ref().exists() {
            Settings::load(path)
        } else {
            debug!(
                "No settings file at {}, using defaults",
                path.as_ref().display()
            );
            Ok(Settings::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = toml::to_string(self)?;
        fs::write(path.as_ref(), raw).map_err(|e| {
            anyhow!(
                "Failed to write settings file {}: {}",
                path.as_ref().display(),
                e
            )
        })
    }

    /// The validation boundary for replaced configuration records. A record
    /// that fails here must be discarded in favor of the previous one.
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_FRAME_RATES.contains(&self.frame_rate) {
            bail!(
                "Frame rate {} is not one of the allowed rates {:?}..!",
                self.frame_rate,
                ALLOWED_FRAME_RATES
            );
        }

        for (name, value) in [
            ("edge_margin_proportion", self.edge_margin_proportion),
            ("chord_margin_proportion", self.chord_margin_proportion),
        ] {
            if !(0.0..=0.49).contains(&value) {
                bail!("{} must be within 0..=0.49, got {}..!", name, value);
            }
        }

        if !(-1.0..=1.0).contains(&self.activation_brightness) {
            bail!(
                "activation_brightness must be within -1..=1, got {}..!",
                self.activation_brightness
            );
        }

        if self.seconds_before_start < 0.0 {
            bail!("seconds_before_start cannot be negative..!");
        }

        if self.default_travel_time <= 0.0 {
            bail!("default_travel_time must be positive..!");
        }

        if self.screen_width == 0 || self.screen_height == 0 {
            bail!("Screen dimensions must be non-zero..!");
        }

        validate_file_name(&self.file_name)?;

        Ok(())
    }

    pub fn video_path(&self) -> PathBuf {
        self.folder_to_save.join(format!("{}.mp4", self.file_name))
    }
}

/// Export file names are restricted so they survive every filesystem and the
/// encoder command line untouched.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("The export file name cannot be empty..!");
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        bail!(
            "Only alphanumeric characters and underscores are allowed in filenames, got '{}'..!",
            name
        );
    }

    Ok(())
}
