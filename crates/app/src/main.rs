use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use scene_preview_core::{
    find_track_overlaps, AppConfig, PlaybackSession, SceneDescriptor, SessionOptions,
    SimulatedBackend, SystemClock, TickOutcome,
};
use tracing_subscriber::EnvFilter;

fn main() -> scene_preview_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Preview {
            scene,
            config,
            start,
            loops,
        } => run_preview(&scene, config.as_deref(), start, loops),
        Commands::Inspect { scene, config, at } => run_inspect(&scene, config.as_deref(), at),
        Commands::Check { scene } => run_check(&scene),
    }
}

fn run_preview(
    scene_path: &Path,
    config_path: Option<&Path>,
    start: f64,
    loops: u32,
) -> scene_preview_core::Result<()> {
    let config = load_config(config_path)?;
    let scene = SceneDescriptor::load(scene_path)?;
    let timeline = scene.to_timeline()?;
    tracing::info!(
        scene = scene.name.as_deref().unwrap_or("untitled"),
        duration = timeline.duration,
        visuals = timeline.visual_clips.len(),
        audio = timeline.audio_clips.len(),
        "starting preview"
    );

    let clock = SystemClock::new();
    let backend = SimulatedBackend::new(clock);
    let options = SessionOptions::from_config(&config.playback).with_levels(&scene.levels());
    let mut session = PlaybackSession::new(timeline, backend, clock, options);

    let mut last_segment: Option<String> = None;
    session.on_time_update(move |time, segment| {
        if segment != last_segment.as_deref() {
            tracing::info!(time, segment, "visual segment changed");
            last_segment = segment.map(str::to_string);
        }
        tracing::trace!(time, "tick");
    });
    session.on_playback_end(|| tracing::info!("playback reached the end of the scene"));

    let interval = session.tick_interval();
    let mut passes = loops.max(1);
    session.seek_to(start);
    session.play();

    loop {
        std::thread::sleep(interval);
        match session.tick() {
            TickOutcome::Continue => {}
            TickOutcome::Ended if passes > 1 => {
                passes -= 1;
                tracing::info!(remaining = passes, "looping preview");
                session.play();
            }
            TickOutcome::Ended | TickOutcome::Idle => break,
        }
    }

    let report = session.last_report();
    tracing::info!(
        ticks = session.snapshot().ticks,
        failed_starts = report.failed,
        "preview finished"
    );
    session.shutdown();
    Ok(())
}

fn run_inspect(scene_path: &Path, config_path: Option<&Path>, at: f64) -> scene_preview_core::Result<()> {
    let config = load_config(config_path)?;
    let scene = SceneDescriptor::load(scene_path)?;
    let timeline = scene.to_timeline()?;

    let clock = SystemClock::new();
    let options = SessionOptions::from_config(&config.playback).with_levels(&scene.levels());
    let mut session = PlaybackSession::new(timeline, SimulatedBackend::new(clock), clock, options);
    session.seek_to(at);

    println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
    Ok(())
}

fn run_check(scene_path: &Path) -> scene_preview_core::Result<()> {
    let scene = SceneDescriptor::load(scene_path)?;
    let timeline = scene.to_timeline()?;
    tracing::info!(
        duration = timeline.duration,
        segments = scene.segments.len(),
        visuals = timeline.visual_clips.len(),
        raw_audio = scene.audio.len(),
        audio = timeline.audio_clips.len(),
        "scene normalized"
    );

    let overlaps = find_track_overlaps(&timeline.audio_clips);
    if overlaps.is_empty() {
        tracing::info!("no overlapping clips on any track");
    }
    for overlap in &overlaps {
        tracing::warn!(
            track = %overlap.track_type,
            first = %overlap.first,
            second = %overlap.second,
            seconds = overlap.overlap_seconds,
            "clips overlap on the same track"
        );
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> scene_preview_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::debug!(?path, "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless scene preview player", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a scene in real time against a simulated audio backend.
    Preview {
        /// Path to the scene description (JSON).
        scene: PathBuf,
        /// Optional configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Position to start playback from, in seconds.
        #[arg(short, long, default_value_t = 0.0)]
        start: f64,
        /// Number of passes through the scene.
        #[arg(short, long, default_value_t = 1)]
        loops: u32,
    },
    /// Print the session state at a given time without playing.
    Inspect {
        /// Path to the scene description (JSON).
        scene: PathBuf,
        /// Optional configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Time to seek to, in seconds.
        #[arg(long)]
        at: f64,
    },
    /// Normalize a scene and report same-track overlaps.
    Check {
        /// Path to the scene description (JSON).
        scene: PathBuf,
    },
}
