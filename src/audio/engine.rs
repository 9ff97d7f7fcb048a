//! The render side of the mixer.
//!
//! [`AudioEngine`] owns every voice and renders interleaved stereo blocks. It
//! is meant to run on the audio thread; the update thread talks to it only
//! through an [`EngineHandle`] (commands over a channel) and the atomic
//! parameters inside each graph.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::graph::Voice;
use super::recorder::RecordingTap;
use crate::error::{MixerError, Result};

pub type GraphId = u64;

/// Commands sent from the update thread to the engine.
pub enum EngineCommand {
    /// Start rendering a freshly built voice.
    Install(Box<Voice>),
    /// Tear down the voice belonging to a graph.
    Remove(GraphId),
}

/// Monotonic audio clock advanced by the engine.
#[derive(Debug)]
pub struct AudioClock {
    sample_rate: u32,
    frames: AtomicU64,
}

impl AudioClock {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames: AtomicU64::new(0),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Seconds of audio rendered so far.
    pub fn current_time(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

/// Cloneable update-thread side of the engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
    clock: Arc<AudioClock>,
    next_id: Arc<AtomicU64>,
}

impl EngineHandle {
    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    pub(crate) fn allocate_id(&self) -> GraphId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| MixerError::Engine("audio engine has shut down".to_string()))
    }
}

pub struct AudioEngine {
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    voices: Vec<Voice>,
    clock: Arc<AudioClock>,
    recorder: Option<RecordingTap>,
    record_bus: Vec<f32>,
}

/// Create a linked engine and handle.
pub fn create_engine(sample_rate: u32) -> (EngineHandle, AudioEngine) {
    let (tx, rx) = mpsc::unbounded_channel();
    let clock = Arc::new(AudioClock::new(sample_rate));

    let handle = EngineHandle {
        tx,
        clock: Arc::clone(&clock),
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let engine = AudioEngine {
        commands: rx,
        voices: Vec::new(),
        clock,
        recorder: None,
        record_bus: Vec::new(),
    };

    info!("Audio engine created at {} Hz", sample_rate);
    (handle, engine)
}

impl AudioEngine {
    /// Connect the recorder tap.
    pub fn with_recorder(mut self, tap: RecordingTap) -> Self {
        self.recorder = Some(tap);
        self
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    /// Render one block of interleaved stereo into `monitor`.
    ///
    /// The recorder bus is rendered alongside and pushed into the recording
    /// tap, if one is connected.
    pub fn render(&mut self, monitor: &mut [f32]) {
        self.apply_commands();

        monitor.fill(0.0);
        self.record_bus.clear();
        self.record_bus.resize(monitor.len(), 0.0);

        let record_bus = &mut self.record_bus;
        self.voices.retain_mut(|voice| {
            let alive = voice.render(monitor, record_bus);
            if !alive {
                debug!("Voice {} exhausted, releasing it", voice.id());
            }
            alive
        });

        if let Some(tap) = self.recorder.as_mut() {
            let written = tap.push(&self.record_bus);
            if written < self.record_bus.len() {
                warn!(
                    "Recorder overflow, dropped {} samples",
                    self.record_bus.len() - written
                );
            }
        }

        self.clock.advance((monitor.len() / 2) as u64);
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::Install(voice) => {
                    debug!("Installing voice {}", voice.id());
                    self.voices.push(*voice);
                }
                EngineCommand::Remove(id) => {
                    self.voices.retain(|v| v.id() != id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::DecodedTrack;
    use crate::audio::graph::{GraphBuilder, GraphSettings};
    use crate::audio::recorder::recording_sink;
    use std::time::Duration;

    fn builder_and_engine() -> (GraphBuilder, AudioEngine) {
        let (handle, engine) = create_engine(48_000);
        (GraphBuilder::new(handle, GraphSettings::default()), engine)
    }

    fn dc_track() -> Arc<DecodedTrack> {
        Arc::new(DecodedTrack::from_samples(48_000, vec![0.5; 4_800]))
    }

    fn energy(buffer: &[f32]) -> f32 {
        buffer.iter().map(|s| s * s).sum()
    }

    #[test]
    fn armed_voice_is_silent() {
        let (builder, mut engine) = builder_and_engine();
        let _graph = builder.build(0, dc_track()).unwrap();

        let mut block = vec![0.0; 256];
        engine.render(&mut block);
        assert_eq!(engine.voice_count(), 1);
        assert_eq!(energy(&block), 0.0);
    }

    #[test]
    fn playing_voice_produces_audio() {
        let (builder, mut engine) = builder_and_engine();
        let graph = builder.build(0, dc_track()).unwrap();
        graph.start().unwrap();

        let mut block = vec![0.0; 1_024];
        engine.render(&mut block);
        assert!(energy(&block) > 0.0);
        assert_eq!(engine.clock().frames(), 512);
    }

    #[test]
    fn stopped_voice_is_culled() {
        let (builder, mut engine) = builder_and_engine();
        let graph = builder.build(0, dc_track()).unwrap();
        graph.start().unwrap();

        let mut block = vec![0.0; 128];
        engine.render(&mut block);
        graph.stop();
        engine.render(&mut block);
        assert_eq!(engine.voice_count(), 0);
        assert_eq!(energy(&block), 0.0);
    }

    #[test]
    fn dropping_graph_removes_voice() {
        let (builder, mut engine) = builder_and_engine();
        let graph = builder.build(0, dc_track()).unwrap();
        let mut block = vec![0.0; 64];
        engine.render(&mut block);
        assert_eq!(engine.voice_count(), 1);

        drop(graph);
        engine.render(&mut block);
        assert_eq!(engine.voice_count(), 0);
    }

    #[test]
    fn recorder_tap_receives_mix() {
        let (handle, engine) = create_engine(48_000);
        let (tap, mut recorder) = recording_sink(48_000, 4_096);
        let mut engine = engine.with_recorder(tap);
        let builder = GraphBuilder::new(handle, GraphSettings::default());

        let graph = builder.build(0, dc_track()).unwrap();
        graph.start().unwrap();

        let mut block = vec![0.0; 512];
        engine.render(&mut block);
        let recorded = recorder.drain();
        assert_eq!(recorded, block);
    }

    #[test]
    fn panner_position_is_followed() {
        let (builder, mut engine) = builder_and_engine();
        let graph = builder.build(0, dc_track()).unwrap();
        graph.start().unwrap();

        let ramp = Duration::ZERO;
        graph.params().position_x.linear_ramp_to(3.0, ramp);
        graph.params().position_z.linear_ramp_to(0.0, ramp);

        // Let the filters settle on the DC input, then compare ears.
        let mut block = vec![0.0; 4_096];
        engine.render(&mut block);
        engine.render(&mut block);
        let left: f32 = block.iter().step_by(2).map(|s| s.abs()).sum();
        let right: f32 = block.iter().skip(1).step_by(2).map(|s| s.abs()).sum();
        assert!(right > left * 10.0, "left {} right {}", left, right);
    }
}
