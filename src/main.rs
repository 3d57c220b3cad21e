//! Application entry point for the voice recorder CLI.
//!
//! # Startup sequence
//!
//! 1. Parse arguments and initialise logging.
//! 2. Load [`AppConfig`] (returns default on first run).
//! 3. Resolve the recordings directory and open the [`RecordingStore`].
//! 4. For `record` / `play`, build a [`RecorderEngine`] on the `cpal`
//!    backend and follow its watch streams on a current-thread tokio
//!    runtime until the engine finishes or Ctrl-C arrives.

mod cli;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use voice_recorder::audio::CpalBackend;
use voice_recorder::config::{AppConfig, AppPaths};
use voice_recorder::engine::{RecorderEngine, RecordingState};
use voice_recorder::storage::display::{
    format_duration, format_duration_with_tenths, format_file_size, format_timestamp,
};
use voice_recorder::storage::{
    default_recording_name, validate_new_name, validate_rename, RecordingStore,
};

use cli::{Args, Command};

fn main() -> Result<()> {
    let args = Args::parse();
    cli::init_logging(&args);

    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| config.storage.resolve_recordings_dir(&AppPaths::new()));
    let store = RecordingStore::new(dir);
    log::debug!("recordings directory: {}", store.dir().display());

    match args.command {
        Command::Record { name, seconds } => runtime()?.block_on(record(&config, &store, name, seconds)),
        Command::Play {
            name,
            speed,
            repeat,
            from,
        } => runtime()?.block_on(play(&config, &store, &name, speed, repeat, from)),
        Command::List => list(&store),
        Command::Rename { name, new_name } => rename(&store, &name, &new_name),
        Command::Delete { name } => {
            let rec = store.find(&name)?;
            store.delete(&rec)?;
            println!("Deleted {name:?}");
            Ok(())
        }
        Command::Devices => {
            for name in CpalBackend::input_device_names()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")
}

fn engine(config: &AppConfig) -> RecorderEngine {
    let backend = Arc::new(CpalBackend::from_config(&config.audio));
    RecorderEngine::new(config.audio.clone(), backend)
}

// ---------------------------------------------------------------------------
// record
// ---------------------------------------------------------------------------

async fn record(
    config: &AppConfig,
    store: &RecordingStore,
    name: Option<String>,
    seconds: Option<f64>,
) -> Result<()> {
    let name = name.unwrap_or_else(default_recording_name);
    validate_new_name(&name, &store.list()?)?;

    let mut engine = engine(config);
    let mut timestamps = engine.subscribe_timestamp();
    let limit_ms = seconds.map(|s| (s.max(0.0) * 1000.0) as u64);

    engine.start_or_resume()?;
    eprintln!("Recording {name:?}, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = timestamps.changed() => {
                if changed.is_err() {
                    break;
                }
                let ms = *timestamps.borrow_and_update();
                eprint!("\r{}", format_duration_with_tenths(ms));
                let _ = std::io::stderr().flush();
                if limit_ms.is_some_and(|limit| ms >= limit) {
                    break;
                }
            }
        }
    }
    eprintln!();

    engine.pause();
    let format = engine.format();
    let pcm = engine.finalize();
    if pcm.is_empty() {
        log::warn!("nothing was recorded");
        return Ok(());
    }

    let rec = store.save(&name, &pcm, format)?;
    println!(
        "Saved {:?} ({}, {})",
        rec.name,
        format_duration(rec.duration_ms),
        format_file_size(rec.size_kb)
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// play
// ---------------------------------------------------------------------------

async fn play(
    config: &AppConfig,
    store: &RecordingStore,
    name: &str,
    speed: f32,
    repeat: bool,
    from: Option<usize>,
) -> Result<()> {
    let rec = store.find(name)?;
    let mut engine = engine(config);
    engine.load_file(&rec.file_path)?;
    engine.set_speed(speed)?;
    if repeat {
        engine.toggle_repeat();
    }
    if let Some(bar) = from {
        engine.seek(bar)?;
    }

    let total = format_duration_with_tenths(engine.duration_ms());
    let mut state = engine.subscribe_state();
    let mut cursor = engine.subscribe_cursor();
    engine.play()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = state.changed() => {
                if changed.is_err() || *state.borrow_and_update() != RecordingState::Playback {
                    break;
                }
            }
            changed = cursor.changed() => {
                if changed.is_err() {
                    break;
                }
                let position = cursor.borrow_and_update().position_ms;
                eprint!("\r{} / {total}", format_duration_with_tenths(position));
                let _ = std::io::stderr().flush();
            }
        }
    }
    eprintln!();

    engine.pause();
    Ok(())
}

// ---------------------------------------------------------------------------
// list / rename
// ---------------------------------------------------------------------------

fn list(store: &RecordingStore) -> Result<()> {
    let recordings = store.list()?;
    if recordings.is_empty() {
        println!("No recordings in {}", store.dir().display());
        return Ok(());
    }
    for rec in recordings {
        println!(
            "{:<32} {:>8} {:>10}  {}",
            rec.name,
            format_duration(rec.duration_ms),
            format_file_size(rec.size_kb),
            format_timestamp(rec.created_time_ms)
        );
    }
    Ok(())
}

fn rename(store: &RecordingStore, name: &str, new_name: &str) -> Result<()> {
    let rec = store.find(name)?;
    validate_rename(new_name, name, &store.list()?)?;
    let renamed = store.rename(&rec, new_name)?;
    println!("Renamed {name:?} to {:?}", renamed.name);
    Ok(())
}
