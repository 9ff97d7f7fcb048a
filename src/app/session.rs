//! The mixer session: one context object owning the ensemble, the position
//! driver and every in-flight track load.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::cluster::{ClusterKey, EnsembleId};
use super::config::MixerConfig;
use super::driver::{DragDirection, DriverMode, PositionDriver};
use super::registry::{EnsembleLayout, Registry};
use super::scene::{Rgb, Scene, VisualId};
use super::tracks::TrackSource;
use super::update::{update_cluster, update_parameters, ReferenceFrame};
use crate::audio::{decode_track_async, DecodedTrack, EngineHandle, GraphBuilder, PlaybackState};
use crate::error::{MixerError, Result};
use crate::geometry::{Ray, Vec3};

/// A finished fetch-and-decode, tagged with the cluster it was started for.
struct LoadOutcome {
    key: ClusterKey,
    ticket: u64,
    /// Replacement track name, when it differs from the default.
    name: Option<String>,
    result: Result<(Arc<[u8]>, DecodedTrack)>,
}

/// How often `wait_for_loads` rechecks tasks that never reported.
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(20);

async fn fetch_and_decode(
    tracks: Arc<dyn TrackSource>,
    name: String,
    bytes: Option<Vec<u8>>,
) -> Result<(Arc<[u8]>, DecodedTrack)> {
    let bytes: Arc<[u8]> = match bytes {
        Some(bytes) => bytes.into(),
        None => tracks.fetch(&name).await?.into(),
    };
    let track = decode_track_async(Arc::clone(&bytes)).await?;
    Ok((bytes, track))
}

struct PendingLoad {
    ticket: u64,
    task: JoinHandle<()>,
}

/// Serializable view of one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSnapshot {
    pub index: usize,
    pub visual: VisualId,
    pub track: String,
    pub position: Option<Vec3>,
    pub state: Option<PlaybackState>,
    pub loading: bool,
    pub glowing: bool,
}

/// Serializable view of the whole session, for a GUI to render from.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub ensemble: EnsembleId,
    pub mode: DriverMode,
    pub drag_direction: DragDirection,
    pub orbit_enabled: bool,
    pub camera_locked: bool,
    pub selected: Option<usize>,
    pub instruments: Vec<InstrumentSnapshot>,
}

pub struct MixerSession<S: Scene> {
    config: MixerConfig,
    scene: S,
    registry: Registry,
    driver: PositionDriver,
    builder: GraphBuilder,
    tracks: Arc<dyn TrackSource>,
    runtime: Handle,
    load_tx: UnboundedSender<LoadOutcome>,
    load_rx: UnboundedReceiver<LoadOutcome>,
    pending: HashMap<ClusterKey, PendingLoad>,
    next_ticket: u64,
}

impl<S: Scene> MixerSession<S> {
    /// Creates a session with an empty ensemble.
    ///
    /// Must be called from within a tokio runtime; track loads are spawned
    /// onto it.
    pub fn new(
        config: MixerConfig,
        scene: S,
        engine: EngineHandle,
        tracks: Arc<dyn TrackSource>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| MixerError::Engine(format!("No async runtime available: {}", e)))?;
        let (load_tx, load_rx) = mpsc::unbounded_channel();

        Ok(Self {
            driver: PositionDriver::new(config.orbit_speed, config.drag_intensity_boost),
            builder: GraphBuilder::new(engine, config.graph_settings()),
            config,
            scene,
            registry: Registry::new(),
            tracks,
            runtime,
            load_tx,
            load_rx,
            pending: HashMap::new(),
            next_ticket: 0,
        })
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn driver(&self) -> &PositionDriver {
        &self.driver
    }

    /// Number of track loads still in flight
    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    pub fn reference_frame(&self) -> ReferenceFrame {
        ReferenceFrame {
            stage_width: self.config.stage_width,
            stage_height: self.config.stage_height,
            ramp: self.config.ramp(),
        }
    }

    fn layout(&self) -> EnsembleLayout {
        EnsembleLayout {
            radius: self.config.orbit_radius,
            height: self.config.home_height,
            tracks: self.config.tracks.clone(),
        }
    }

    /// Replace the ensemble with `size` fresh instruments and start loading
    /// their default tracks.
    ///
    /// All playback stops and in-flight loads for the old ensemble are
    /// cancelled first. Returns the new ensemble id.
    pub fn set_ensemble_size(&mut self, size: usize) -> Result<EnsembleId> {
        if size > self.config.max_ensemble_size {
            return Err(MixerError::InvalidEnsembleSize {
                requested: size,
                max: self.config.max_ensemble_size,
            });
        }

        if self.driver.end_drag(&mut self.registry, &mut self.scene).is_some() {
            debug!("Drag released by ensemble resize");
        }
        self.cancel_loads();

        let layout = self.layout();
        let loads = self.registry.rebuild(size, &mut self.scene, &layout);
        for (key, track) in loads {
            self.spawn_load(key, track, None, false);
        }
        Ok(self.registry.ensemble_id())
    }

    /// Fetch `name` from the track source and install it on instrument `index`.
    pub fn load_track(&mut self, index: usize, name: &str) -> Result<()> {
        let key = self.registry.get(index)?.key();
        self.spawn_load(key, name.to_string(), None, true);
        Ok(())
    }

    /// Install raw bytes dropped onto an instrument's visual object.
    ///
    /// Returns the instrument index. A playing instrument keeps playing on the
    /// new track once it is decoded.
    pub fn drop_track(&mut self, visual: VisualId, name: &str, bytes: Vec<u8>) -> Result<usize> {
        let key = self.registry.find_by_visual(visual)?.key();
        self.spawn_load(key, name.to_string(), Some(bytes), true);
        Ok(key.index)
    }

    fn spawn_load(&mut self, key: ClusterKey, name: String, bytes: Option<Vec<u8>>, rename: bool) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let tracks = Arc::clone(&self.tracks);
        let tx = self.load_tx.clone();
        let rename = rename.then(|| name.clone());

        debug!("Loading {} for instrument {}", name, key);
        let runtime = self.runtime.clone();
        let task = self.runtime.spawn(async move {
            // The work runs in its own task so a panic still produces an outcome.
            let work = runtime.spawn(fetch_and_decode(tracks, name, bytes));
            let result = match work.await {
                Ok(result) => result,
                Err(e) => Err(MixerError::TrackUnavailable(format!(
                    "load task for {} failed: {}",
                    key, e
                ))),
            };
            let outcome = LoadOutcome {
                key,
                ticket,
                name: rename,
                result,
            };
            if tx.send(outcome).is_err() {
                debug!("Session gone before load for {} finished", key);
            }
        });

        if let Some(previous) = self.pending.insert(key, PendingLoad { ticket, task }) {
            previous.task.abort();
        }
    }

    fn cancel_loads(&mut self) {
        for (key, load) in self.pending.drain() {
            debug!("Cancelling load for {}", key);
            load.task.abort();
        }
    }

    /// Install every load that has finished. Returns how many graphs were
    /// installed.
    ///
    /// Loads whose task ended without reporting are dropped from the pending
    /// set.
    pub fn poll_loads(&mut self) -> usize {
        // A finished task has already sent its outcome, so anything it sent
        // is drained below before the entry is pruned.
        let finished: Vec<(ClusterKey, u64)> = self
            .pending
            .iter()
            .filter(|(_, load)| load.task.is_finished())
            .map(|(key, load)| (*key, load.ticket))
            .collect();

        let mut installed = 0;
        while let Ok(outcome) = self.load_rx.try_recv() {
            if self.apply_load(outcome) {
                installed += 1;
            }
        }

        for (key, ticket) in finished {
            if self.pending.get(&key).map(|load| load.ticket) == Some(ticket) {
                warn!("Load for instrument {} ended without a result", key);
                self.pending.remove(&key);
            }
        }
        installed
    }

    /// Wait until no loads are in flight, installing each as it lands.
    pub async fn wait_for_loads(&mut self) -> usize {
        let mut installed = self.poll_loads();
        while !self.pending.is_empty() {
            tokio::select! {
                outcome = self.load_rx.recv() => {
                    if let Some(outcome) = outcome {
                        if self.apply_load(outcome) {
                            installed += 1;
                        }
                    }
                }
                _ = tokio::time::sleep(LOAD_POLL_INTERVAL) => {}
            }
            installed += self.poll_loads();
        }
        installed
    }

    fn apply_load(&mut self, outcome: LoadOutcome) -> bool {
        let key = outcome.key;
        let frame = self.reference_frame();
        match self.pending.get(&key) {
            Some(load) if load.ticket == outcome.ticket => {
                self.pending.remove(&key);
            }
            _ => {
                debug!("Discarding superseded load for {}", key);
                return false;
            }
        }

        let Some(cluster) = self.registry.resolve_mut(key) else {
            debug!("Discarding load for removed instrument {}", key);
            return false;
        };

        let (bytes, track) = match outcome.result {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Instrument {} left without new audio: {}", key.index, e);
                return false;
            }
        };

        if let Err(e) = cluster.install_track(outcome.name, bytes, track, &self.builder) {
            warn!("Failed to install track on instrument {}: {}", key.index, e);
            return false;
        }

        update_cluster(cluster, &self.scene, &frame);
        true
    }

    /// Start every armed instrument. Returns how many started.
    pub fn play(&mut self) -> usize {
        let mut started = 0;
        for cluster in self.registry.iter_mut() {
            match cluster.start() {
                Ok(()) => started += 1,
                Err(MixerError::NoAudioLoaded(index)) => {
                    info!("Instrument {} has no audio yet, not starting", index)
                }
                Err(e) => debug!("{}", e),
            }
        }
        info!("Started {} of {} instruments", started, self.registry.len());
        started
    }

    /// Stop every instrument and re-arm those with a saved track.
    ///
    /// All playback is halted before any re-arm is attempted. A failed re-arm
    /// is logged and leaves that instrument without a graph; the first such
    /// error is returned once every instrument has been handled.
    pub fn stop(&mut self) -> Result<()> {
        for cluster in self.registry.iter_mut() {
            cluster.halt();
        }

        let mut first_error = None;
        for cluster in self.registry.iter_mut() {
            if let Err(e) = cluster.rearm(&self.builder) {
                warn!("Failed to re-arm instrument {}: {}", cluster.index(), e);
                first_error.get_or_insert(e);
            }
        }

        update_parameters(&self.registry, &self.scene, &self.reference_frame());
        info!("Stopped all instruments");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn play_cluster(&mut self, index: usize) -> Result<()> {
        self.registry.get_mut(index)?.start()
    }

    /// Stop one instrument; its fresh graph picks up the current position.
    pub fn stop_cluster(&mut self, index: usize) -> Result<()> {
        let frame = self.reference_frame();
        let cluster = self.registry.get_mut(index)?;
        cluster.stop(&self.builder)?;
        update_cluster(cluster, &self.scene, &frame);
        Ok(())
    }

    /// Move every instrument back to its place on the home circle.
    pub fn reset_to_home(&mut self) -> usize {
        for cluster in self.registry.iter() {
            self.scene.set_position(cluster.visual(), cluster.home());
            self.scene.set_light_target(cluster.visual(), cluster.home());
        }
        update_parameters(&self.registry, &self.scene, &self.reference_frame())
    }

    pub fn lock_camera(&mut self, locked: bool) {
        self.driver.lock_camera(locked, &mut self.scene);
    }

    pub fn toggle_orbit(&mut self) -> bool {
        self.driver.toggle_orbit()
    }

    pub fn set_drag_direction(&mut self, direction: DragDirection) {
        self.driver.set_direction(direction, &mut self.scene);
    }

    /// Start dragging the instrument under the pointer.
    pub fn begin_drag(&mut self, visual: VisualId) -> Result<usize> {
        self.driver
            .begin_drag(&mut self.registry, &mut self.scene, visual)
    }

    /// Move the dragged instrument to a point on the stage and refresh audio.
    pub fn drag_to(&mut self, point: Vec3) -> Option<usize> {
        let moved = self.driver.drag_to(&mut self.scene, point)?;
        update_parameters(&self.registry, &self.scene, &self.reference_frame());
        Some(moved)
    }

    pub fn drag_ray(&mut self, ray: Ray) -> Option<usize> {
        let moved = self.driver.drag_ray(&mut self.scene, ray)?;
        update_parameters(&self.registry, &self.scene, &self.reference_frame());
        Some(moved)
    }

    pub fn end_drag(&mut self) -> Option<usize> {
        self.driver.end_drag(&mut self.registry, &mut self.scene)
    }

    pub fn set_instrument_color(&mut self, index: usize, color: Rgb) -> Result<()> {
        let visual = self.registry.get(index)?.visual();
        self.scene.set_light_color(visual, color);
        Ok(())
    }

    /// One animation frame: land finished loads, advance the orbit, then
    /// recompute every instrument's parameters. Returns how many were updated.
    pub fn tick(&mut self) -> usize {
        self.poll_loads();
        self.driver.tick(&self.registry, &mut self.scene);
        update_parameters(&self.registry, &self.scene, &self.reference_frame())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let instruments = self
            .registry
            .iter()
            .map(|cluster| InstrumentSnapshot {
                index: cluster.index(),
                visual: cluster.visual(),
                track: cluster.track_name().to_string(),
                position: self.scene.position(cluster.visual()),
                state: cluster.playback_state(),
                loading: self.pending.contains_key(&cluster.key()),
                glowing: cluster.glowing,
            })
            .collect();

        SessionSnapshot {
            ensemble: self.registry.ensemble_id(),
            mode: self.driver.mode(),
            drag_direction: self.driver.direction(),
            orbit_enabled: self.driver.orbit_enabled(),
            camera_locked: self.driver.camera_locked(),
            selected: self.driver.selected(),
            instruments,
        }
    }

    /// Cancel loads and tear the ensemble down.
    pub fn shutdown(&mut self) {
        self.driver.end_drag(&mut self.registry, &mut self.scene);
        self.cancel_loads();
        self.registry.teardown(&mut self.scene);
        info!("Session shut down");
    }
}
