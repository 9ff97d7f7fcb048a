//! Headless driver for the orbit mixer.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

use orbit_mixer::app::{ConfigManager, DirTrackSource, MixerSession, StageScene, ToneTrackSource, TrackSource};
use orbit_mixer::audio::{create_engine, recording_sink};

/// Orbit mixer - spatial audio driven by instrument positions on a stage
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Config file (defaults to the per-user config)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Directory to load tracks from; synthesised tones are used if omitted
    #[clap(short, long)]
    tracks: Option<PathBuf>,

    /// Number of instruments on stage
    #[clap(short, long, default_value_t = 4)]
    size: usize,

    /// Animation frames to run (60 per second of audio)
    #[clap(long, default_value_t = 600)]
    ticks: u32,

    /// Write the mixed output to this WAV file
    #[clap(short, long)]
    record: Option<PathBuf>,

    /// Print the final session state as JSON
    #[clap(long)]
    snapshot: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

const TICKS_PER_SECOND: u32 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configure logging based on debug flag
    if args.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
        debug!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("Starting orbit-mixer");

    let config = match &args.config {
        Some(path) => ConfigManager::with_file(path)?,
        None => ConfigManager::new()?,
    };
    debug!("Using config at {:?}", config.path());
    let settings = config.settings().clone();
    let sample_rate = settings.sample_rate;

    let (handle, engine) = create_engine(sample_rate);
    let (mut engine, mut recorder) = match &args.record {
        Some(_) => {
            let (tap, recorder) = recording_sink(sample_rate, settings.recorder_capacity_frames());
            (engine.with_recorder(tap), Some(recorder))
        }
        None => (engine, None),
    };

    let source: Arc<dyn TrackSource> = match &args.tracks {
        Some(dir) => Arc::new(DirTrackSource::new(dir)),
        None => Arc::new(ToneTrackSource::new(sample_rate, 2.0)),
    };

    let mut session = MixerSession::new(settings, StageScene::new(), handle, source)?;
    session.set_ensemble_size(args.size)?;
    let loaded = session.wait_for_loads().await;
    info!("Loaded {} of {} tracks", loaded, args.size);

    session.play();
    session.toggle_orbit();

    let mut writer = match (&args.record, &recorder) {
        (Some(path), Some(recorder)) => Some(
            recorder
                .create_wav(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        _ => None,
    };

    let frames_per_tick = (sample_rate / TICKS_PER_SECOND).max(1) as usize;
    let mut block = vec![0.0f32; frames_per_tick * 2];
    let mut peak = 0.0f32;

    for _ in 0..args.ticks {
        session.tick();
        engine.render(&mut block);
        peak = block.iter().fold(peak, |p, s| p.max(s.abs()));

        if let (Some(writer), Some(recorder)) = (writer.as_mut(), recorder.as_mut()) {
            recorder.drain_into(writer)?;
        }
    }

    info!(
        "Rendered {:.2}s of audio, peak level {:.3}",
        engine.clock().current_time(),
        peak
    );

    if let Some(writer) = writer {
        writer.finalize().context("Failed to finalize recording")?;
        if let Some(path) = &args.record {
            info!("Recording written to {}", path.display());
        }
    }

    if args.snapshot {
        println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
    }

    session.shutdown();
    Ok(())
}
