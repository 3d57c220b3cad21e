//! Command-line interface for the voice recorder.
//!
//! Handles argument parsing and logging configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

/// Record, play back and manage voice recordings
#[derive(Parser, Debug)]
#[command(name = "voice-recorder")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = also audio backend internals
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Recordings directory (overrides the settings file)
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record from the input device until Ctrl-C (or --seconds) and save
    Record {
        /// Recording name (defaults to "Recording ddMMyyyy_HHmmss")
        #[arg(short, long)]
        name: Option<String>,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        seconds: Option<f64>,
    },

    /// Play a saved recording
    Play {
        /// Recording name
        name: String,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f32,

        /// Loop until Ctrl-C
        #[arg(long)]
        repeat: bool,

        /// Start at this waveform bar
        #[arg(long, value_name = "BAR")]
        from: Option<usize>,
    },

    /// List saved recordings, newest first
    List,

    /// Rename a saved recording
    Rename {
        name: String,
        new_name: String,
    },

    /// Delete a saved recording
    Delete { name: String },

    /// List available input devices
    Devices,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Keep dependencies at warn unless asked for everything.
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("voice_recorder", args.log_level());

    if args.verbose >= 4 {
        builder.filter_module("cpal", args.log_level());
    }

    builder.format_timestamp_millis().init();
}
