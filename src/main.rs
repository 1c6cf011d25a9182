//! # pyramid-rounds CLI
//!
//! Runs the octave pyramid pipeline over synthetic ring-target frames, one
//! round per frame, and reports the edges each octave found.
//!
//! ## Usage
//! ```bash
//! pyramid-rounds run --layers 4 --rounds 10
//! pyramid-rounds run --config rounds.toml --output json
//! pyramid-rounds config > rounds.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam::channel::{self, Receiver};
use pyramid_rounds::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Drive an image pyramid with one worker thread per octave
#[derive(Parser, Debug)]
#[command(name = "pyramid-rounds")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process synthetic frames through the octave pyramid
    Run {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of octaves (worker threads)
        #[arg(short, long)]
        layers: Option<usize>,

        /// Number of frames to process
        #[arg(short, long)]
        rounds: Option<u64>,

        /// Frame width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Frame height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Gradient magnitude that counts as an edge
        #[arg(short, long)]
        threshold: Option<u16>,

        /// Abandon a round after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
    /// Print the default configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable per-round summaries
    Pretty,
    /// JSON document for scripting
    Json,
}

#[derive(Serialize)]
struct FrameOutput {
    report: RoundReport,
    octaves: Vec<OctaveSummary>,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    config: &'a DemoConfig,
    frames: Vec<FrameOutput>,
    stats: RoundStats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            layers,
            rounds,
            width,
            height,
            threshold,
            timeout_ms,
            output,
        } => {
            let mut config = match config {
                Some(path) => DemoConfig::from_file(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => DemoConfig::default(),
            };
            if let Some(layers) = layers {
                config.layers = layers;
            }
            if let Some(rounds) = rounds {
                config.rounds = rounds;
            }
            if let Some(width) = width {
                config.width = width;
            }
            if let Some(height) = height {
                config.height = height;
            }
            if let Some(threshold) = threshold {
                config.edge_threshold = threshold;
            }
            if timeout_ms.is_some() {
                config.round_timeout_ms = timeout_ms;
            }
            config.validate().context("invalid configuration")?;
            run(&config, output)
        }
        Commands::Config => {
            print!("{}", DemoConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn run(config: &DemoConfig, output: OutputFormat) -> Result<()> {
    let (events_tx, events_rx) = channel::unbounded();
    let options = config.workers.clone().with_events(move |event| {
        // The receiver outlives the pool; a failed send only means shutdown.
        let _ = events_tx.send(event);
    });

    let pyramid = Arc::new(OctavePyramid::new(config.layers, config.edge_threshold));
    let mut rounds = RoundOrchestrator::init_with_options(pyramid.clone(), config.layers, options)
        .context("failed to start layer workers")?;

    if let OutputFormat::Pretty = output {
        println!(
            "Pyramid of {} octaves over {}x{} frames, {} rounds",
            config.layers, config.width, config.height, config.rounds
        );
        println!();
    }

    let mut frames = Vec::new();
    for frame in 0..config.rounds {
        pyramid.load_frame(&ring_target(config.width, config.height, frame), frame);

        let report = match config.round_timeout() {
            Some(timeout) => rounds.one_round_timeout(timeout),
            None => rounds.one_round(),
        }
        .with_context(|| format!("round {} failed", frame))?;

        let layer_times = drain_layer_times(&events_rx, config.layers);
        let octaves = pyramid.summaries();
        match output {
            OutputFormat::Pretty => print_round(&report, &octaves, &layer_times),
            OutputFormat::Json => frames.push(FrameOutput { report, octaves }),
        }
    }

    let stats = rounds.stats();
    rounds.shutdown().context("layer worker failed")?;

    match output {
        OutputFormat::Pretty => print_stats(&stats),
        OutputFormat::Json => {
            let document = RunOutput {
                config,
                frames,
                stats,
            };
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }
    Ok(())
}

/// Per-layer processing times reported during the last round.
fn drain_layer_times(events: &Receiver<RoundEvent>, layers: usize) -> Vec<Option<u64>> {
    let mut times = vec![None; layers];
    for event in events.try_iter() {
        if let RoundEvent::LayerCompleted {
            layer, duration_ms, ..
        } = event
        {
            times[layer.index()] = Some(duration_ms);
        }
    }
    times
}

fn print_round(report: &RoundReport, octaves: &[OctaveSummary], layer_times: &[Option<u64>]) {
    println!("Round {} ({:?})", report.round, report.duration);
    for octave in octaves {
        let time = layer_times
            .get(octave.layer.index())
            .copied()
            .flatten()
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  octave {} {:>4}x{:<4} edges {:>7}  mean {:>7.2}  {}",
            octave.layer, octave.width, octave.height, octave.edge_pixels, octave.mean_magnitude, time
        );
    }
}

fn print_stats(stats: &RoundStats) {
    println!();
    println!("Rounds completed: {}", stats.rounds_completed);
    if let Some(average) = stats.average_round_duration() {
        println!("Average round:    {:?}", average);
    }
    println!("Layer invocations: {:?}", stats.layer_invocations);
}
