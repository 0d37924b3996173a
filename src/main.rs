use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use notefall::{
    Args, ImageSequenceSink, NullSink, Runner, Session, Settings, Theme, VisKind, encode_video,
    import_midi_file, load_chord_file, parse_chords,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> Result<()> {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let mut settings = Settings::load_or_default(&args.config)?;
    if let Some(name) = &args.visualisation {
        settings.visualisation = match VisKind::parse(name) {
            Some(kind) => kind,
            None => bail!(
                "'{}' is not a visualisation. Expected one of Classic|Foresight|Hindsight|Static|Drift|Synthesia..!",
                name
            ),
        };
    }
    if let Some(name) = &args.theme {
        settings.theme = name.clone();
    }
    settings.validate()?;

    let theme = match Theme::builtin(&settings.theme) {
        Some(theme) => theme,
        None => bail!(
            "'{}' is not a theme. Available themes: {}..!",
            settings.theme,
            Theme::NAMES.join(", ")
        ),
    };

    info!("Importing MIDI file: '{}'...", args.midi.display());
    let notes = import_midi_file(&args.midi)?;
    debug!(
        "Imported {} notes across {} tracks at {:.1}bpm..!",
        notes.note_count(),
        notes.track_order.len(),
        notes.tempo_bpm
    );

    let chord_path = args.chords.clone().or_else(|| settings.chord_path.clone());
    let chords = match chord_path {
        Some(path) => {
            info!("Loading chord chart: '{}'...", path.display());
            let tokens = load_chord_file(&path)?;
            parse_chords(&tokens, notes.tempo_bpm)?
        }
        None => Vec::new(),
    };

    let session = Session::new(notes, chords, &theme);
    let mut runner = Runner::new(&settings);
    runner.initialize(&session, &settings);

    if args.dry_run {
        info!("Previewing at most {} frames..!", args.dry_run_max);
        let dt = 1.0 / settings.frame_rate as f64;
        for i in 0..args.dry_run_max {
            if runner.time > runner.effective_end(&session, &settings) {
                break;
            }
            let frame = runner.compose_frame(&session, &settings, &theme);
            info!(
                "Frame {}: time={:.3} draw_cmds={}",
                i,
                runner.time,
                frame.cmds.len()
            );
            runner.time += dt;
        }
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping..!");
        stop_for_handler.store(true, Ordering::Relaxed);
    })
    .expect("Error setting Ctrl-C handler..!");

    if args.export {
        let video_path = settings.video_path();
        if video_path.exists() && !args.overwrite {
            bail!(
                "'{}' already exists. Pass --overwrite to replace it..!",
                video_path.display()
            );
        }

        let frame_dir = settings.folder_to_save.join("frames");
        let mut sink = ImageSequenceSink::create(&frame_dir)?;

        info!("Exporting to '{}'...", video_path.display());
        let frames = runner.export(&session, &settings, &theme, &mut sink, &stop)?;

        if stop.load(Ordering::Relaxed) {
            warn!("Export interrupted, skipping encode..!");
            return Ok(());
        }

        info!("Encoding {} frames...", frames);
        encode_video(&sink, settings.frame_rate, &video_path)?;
        info!("Export finished: '{}'", video_path.display());
    } else {
        let mut sink = NullSink;
        runner.run_live(&session, &settings, &theme, &mut sink, &stop)?;
        info!("Playback finished, exiting..!");
    }

    Ok(())
}
