use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "notefall",
    about = "Render a MIDI file as a scrolling note visualisation!"
)]
pub struct Args {
    /// Path to the target MIDI file.
    pub midi: PathBuf,

    /// Path to the settings file. Missing files fall back to defaults.
    #[arg(short, long, default_value = "notefall.toml")]
    pub config: PathBuf,

    /// Path to a chord chart, overriding the one named in the settings file.
    #[arg(long)]
    pub chords: Option<PathBuf>,

    /// Visualisation to use: Classic|Foresight|Hindsight|Static|Drift|Synthesia.
    /// Overrides the one named in the settings file.
    #[arg(short, long)]
    pub visualisation: Option<String>,

    /// Theme to use. Overrides the one named in the settings file.
    #[arg(short, long)]
    pub theme: Option<String>,

    /// Render the whole song to a video file instead of playing it live.
    #[arg(short, long, default_value_t = false)]
    pub export: bool,

    /// Replace the output video if it already exists.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Dry run (print the first dry_run_max frame summaries and exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum frames to summarize in dry run.
    #[arg(long, default_value_t = 80)]
    pub dry_run_max: usize,

    /// Prints extra information to the terminal.
    #[arg(long)]
    pub verbose: bool,
}
