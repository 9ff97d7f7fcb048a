//! Per-instrument audio graph.
//!
//! An [`AudioGraph`] is the update-thread handle; the matching [`Voice`] lives
//! inside the [`AudioEngine`](super::engine::AudioEngine) and reads the shared
//! parameters without locking. Playback is single-use: a graph goes
//! `Armed → Playing → Exhausted` and must be rebuilt to play again.

use log::{debug, trace};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::decode::DecodedTrack;
use super::engine::{EngineCommand, EngineHandle, GraphId};
use super::nodes::{LoopingSource, ShelfFilter, ShelfKind, SpatialPanner};
use super::param::{AudioParam, ParamSmoother};
use crate::error::{MixerError, Result};
use crate::geometry::Vec3;

/// Parameters are re-read and coefficients recomputed once per this many frames.
const CONTROL_BLOCK: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PlaybackState {
    Armed,
    Playing,
    Exhausted,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlaybackState::Armed,
            1 => PlaybackState::Playing,
            _ => PlaybackState::Exhausted,
        }
    }
}

/// Output buses a graph is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTaps {
    pub monitor: bool,
    pub recorder: bool,
}

impl Default for OutputTaps {
    fn default() -> Self {
        Self {
            monitor: true,
            recorder: true,
        }
    }
}

/// State shared between a graph handle and its voice.
#[derive(Debug)]
pub struct GraphParams {
    state: AtomicU8,
    pub low_shelf_frequency: AudioParam,
    pub high_shelf_frequency: AudioParam,
    pub playback_rate: AudioParam,
    pub position_x: AudioParam,
    pub position_y: AudioParam,
    pub position_z: AudioParam,
    pub orientation_x: AudioParam,
    pub orientation_y: AudioParam,
    pub orientation_z: AudioParam,
}

impl GraphParams {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Armed as u8),
            low_shelf_frequency: AudioParam::new(20.0),
            high_shelf_frequency: AudioParam::new(2_000.0),
            playback_rate: AudioParam::new(1.0),
            position_x: AudioParam::new(0.0),
            position_y: AudioParam::new(0.0),
            position_z: AudioParam::new(0.0),
            orientation_x: AudioParam::new(1.0),
            orientation_y: AudioParam::new(0.0),
            orientation_z: AudioParam::new(0.0),
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Panner position as last requested.
    pub fn position_target(&self) -> Vec3 {
        Vec3::new(
            self.position_x.target(),
            self.position_y.target(),
            self.position_z.target(),
        )
    }
}

/// Fixed settings applied to every graph the builder makes.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub low_shelf_gain_db: f32,
    pub high_shelf_gain_db: f32,
    pub taps: OutputTaps,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            low_shelf_gain_db: -12.0,
            high_shelf_gain_db: -12.0,
            taps: OutputTaps::default(),
        }
    }
}

/// Builds graphs and registers their voices with the engine.
#[derive(Clone)]
pub struct GraphBuilder {
    engine: EngineHandle,
    settings: GraphSettings,
}

impl GraphBuilder {
    pub fn new(engine: EngineHandle, settings: GraphSettings) -> Self {
        Self { engine, settings }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Wire `source → low shelf → high shelf → panner → taps` for `track` and
    /// hand the voice to the engine. The new graph starts out armed.
    pub fn build(&self, instrument: usize, track: Arc<DecodedTrack>) -> Result<AudioGraph> {
        let id = self.engine.allocate_id();
        let params = Arc::new(GraphParams::new());
        let sample_rate = self.engine.sample_rate();

        let voice = Voice::new(id, Arc::clone(&params), &track, &self.settings, sample_rate);
        self.engine.send(EngineCommand::Install(Box::new(voice)))?;

        debug!(
            "Built graph {} for instrument {} ({:.2}s of audio)",
            id,
            instrument,
            track.duration_seconds()
        );

        Ok(AudioGraph {
            id,
            instrument,
            params,
            taps: self.settings.taps,
            engine: self.engine.clone(),
        })
    }
}

/// Update-thread handle to one live graph.
///
/// Dropping the handle tears the graph down in the engine.
pub struct AudioGraph {
    id: GraphId,
    instrument: usize,
    params: Arc<GraphParams>,
    taps: OutputTaps,
    engine: EngineHandle,
}

impl AudioGraph {
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    pub fn taps(&self) -> OutputTaps {
        self.taps
    }

    pub fn state(&self) -> PlaybackState {
        self.params.state()
    }

    /// Begin playback from the first frame. Only valid once per graph.
    pub fn start(&self) -> Result<()> {
        self.params
            .state
            .compare_exchange(
                PlaybackState::Armed as u8,
                PlaybackState::Playing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| MixerError::AlreadyStarted(self.instrument))
    }

    /// Halt playback. The graph cannot be started again afterwards.
    pub fn stop(&self) {
        self.params
            .state
            .store(PlaybackState::Exhausted as u8, Ordering::Release);
    }

    pub fn set_orientation(&self, orientation: Vec3, ramp: Duration) {
        self.params.orientation_x.linear_ramp_to(orientation.x, ramp);
        self.params.orientation_y.linear_ramp_to(orientation.y, ramp);
        self.params.orientation_z.linear_ramp_to(orientation.z, ramp);
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.stop();
        if self.engine.send(EngineCommand::Remove(self.id)).is_err() {
            trace!("Engine already gone while dropping graph {}", self.id);
        }
    }
}

struct Smoothers {
    low_shelf: ParamSmoother,
    high_shelf: ParamSmoother,
    rate: ParamSmoother,
    x: ParamSmoother,
    y: ParamSmoother,
    z: ParamSmoother,
    orientation: [ParamSmoother; 3],
}

impl Smoothers {
    fn new(params: &GraphParams) -> Self {
        Self {
            low_shelf: ParamSmoother::new(&params.low_shelf_frequency),
            high_shelf: ParamSmoother::new(&params.high_shelf_frequency),
            rate: ParamSmoother::new(&params.playback_rate),
            x: ParamSmoother::new(&params.position_x),
            y: ParamSmoother::new(&params.position_y),
            z: ParamSmoother::new(&params.position_z),
            orientation: [
                ParamSmoother::new(&params.orientation_x),
                ParamSmoother::new(&params.orientation_y),
                ParamSmoother::new(&params.orientation_z),
            ],
        }
    }

    fn sync(&mut self, params: &GraphParams, sample_rate: f32) {
        self.low_shelf.sync(&params.low_shelf_frequency, sample_rate);
        self.high_shelf.sync(&params.high_shelf_frequency, sample_rate);
        self.rate.sync(&params.playback_rate, sample_rate);
        self.x.sync(&params.position_x, sample_rate);
        self.y.sync(&params.position_y, sample_rate);
        self.z.sync(&params.position_z, sample_rate);
        self.orientation[0].sync(&params.orientation_x, sample_rate);
        self.orientation[1].sync(&params.orientation_y, sample_rate);
        self.orientation[2].sync(&params.orientation_z, sample_rate);
    }

    fn advance_controls(&mut self, frames: u32) {
        self.low_shelf.advance(frames);
        self.high_shelf.advance(frames);
        self.x.advance(frames);
        self.y.advance(frames);
        self.z.advance(frames);
        for o in &mut self.orientation {
            o.advance(frames);
        }
    }
}

/// Render-side half of a graph.
pub struct Voice {
    id: GraphId,
    params: Arc<GraphParams>,
    taps: OutputTaps,
    sample_rate: f32,
    source: LoopingSource,
    low_shelf: ShelfFilter,
    high_shelf: ShelfFilter,
    panner: SpatialPanner,
    smoothers: Smoothers,
    was_playing: bool,
}

impl Voice {
    fn new(
        id: GraphId,
        params: Arc<GraphParams>,
        track: &DecodedTrack,
        settings: &GraphSettings,
        sample_rate: u32,
    ) -> Self {
        let rate = sample_rate as f32;
        let smoothers = Smoothers::new(&params);
        Self {
            id,
            taps: settings.taps,
            sample_rate: rate,
            source: LoopingSource::new(Arc::clone(&track.samples), track.sample_rate, sample_rate),
            low_shelf: ShelfFilter::new(
                ShelfKind::Low,
                settings.low_shelf_gain_db,
                smoothers.low_shelf.value(),
                rate,
            ),
            high_shelf: ShelfFilter::new(
                ShelfKind::High,
                settings.high_shelf_gain_db,
                smoothers.high_shelf.value(),
                rate,
            ),
            panner: SpatialPanner::new(rate),
            smoothers,
            params,
            was_playing: false,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Mix this voice into the interleaved stereo buses.
    ///
    /// Returns `false` once the voice is exhausted and can be dropped.
    pub fn render(&mut self, monitor: &mut [f32], recorder: &mut [f32]) -> bool {
        let frames = monitor.len() / 2;
        self.smoothers.sync(&self.params, self.sample_rate);

        match self.params.state() {
            PlaybackState::Exhausted => return false,
            PlaybackState::Armed => {
                // Keep following ramps so a later start begins at the current targets.
                self.smoothers.advance_controls(frames as u32);
                self.smoothers.rate.advance(frames as u32);
                return true;
            }
            PlaybackState::Playing => {}
        }

        if !self.was_playing {
            self.source.reset();
            self.was_playing = true;
        }

        let mut start = 0;
        while start < frames {
            let n = CONTROL_BLOCK.min(frames - start);
            self.smoothers.advance_controls(n as u32);
            self.low_shelf.set_corner(self.smoothers.low_shelf.value());
            self.high_shelf.set_corner(self.smoothers.high_shelf.value());
            self.panner.set_orientation(Vec3::new(
                self.smoothers.orientation[0].value(),
                self.smoothers.orientation[1].value(),
                self.smoothers.orientation[2].value(),
            ));
            let gains = self.panner.gains_for(Vec3::new(
                self.smoothers.x.value(),
                self.smoothers.y.value(),
                self.smoothers.z.value(),
            ));

            for frame in start..start + n {
                let rate = self.smoothers.rate.next();
                let dry = self.source.next(rate);
                let shaped = self.high_shelf.process(self.low_shelf.process(dry));
                let (left, right) = self.panner.process(shaped, &gains);

                let i = frame * 2;
                if self.taps.monitor {
                    monitor[i] += left;
                    monitor[i + 1] += right;
                }
                if self.taps.recorder {
                    recorder[i] += left;
                    recorder[i + 1] += right;
                }
            }
            start += n;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::create_engine;

    fn tone(frames: usize) -> Arc<DecodedTrack> {
        let samples = (0..frames)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect::<Vec<_>>();
        Arc::new(DecodedTrack::from_samples(48_000, samples))
    }

    #[test]
    fn start_is_single_use() {
        let (handle, _engine) = create_engine(48_000);
        let builder = GraphBuilder::new(handle, GraphSettings::default());
        let graph = builder.build(3, tone(512)).unwrap();

        assert_eq!(graph.state(), PlaybackState::Armed);
        graph.start().unwrap();
        assert_eq!(graph.state(), PlaybackState::Playing);
        assert!(matches!(graph.start(), Err(MixerError::AlreadyStarted(3))));

        graph.stop();
        assert_eq!(graph.state(), PlaybackState::Exhausted);
        assert!(graph.start().is_err());
    }

    #[test]
    fn new_graph_is_wired_to_both_taps() {
        let (handle, _engine) = create_engine(48_000);
        let builder = GraphBuilder::new(handle, GraphSettings::default());
        let graph = builder.build(0, tone(64)).unwrap();
        assert_eq!(graph.taps(), OutputTaps::default());
        assert!(graph.taps().monitor && graph.taps().recorder);
    }

    #[test]
    fn orientation_is_ramped() {
        let (handle, _engine) = create_engine(48_000);
        let builder = GraphBuilder::new(handle, GraphSettings::default());
        let graph = builder.build(0, tone(64)).unwrap();

        graph.set_orientation(Vec3::new(0.0, 0.0, -1.0), Duration::from_millis(100));
        assert_eq!(graph.params().orientation_z.target(), -1.0);
        assert_eq!(graph.params().orientation_x.target(), 0.0);
        let ramp = graph.params().orientation_z.ramp_time().as_secs_f32();
        assert!((ramp - 0.1).abs() < 1e-6);
    }
}
