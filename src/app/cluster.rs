use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::scene::VisualId;
use crate::audio::{AudioGraph, DecodedTrack, GraphBuilder, PlaybackState};
use crate::error::{MixerError, Result};
use crate::geometry::Vec3;

/// Identifies one build of the ensemble. Every resize gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub struct EnsembleId(Uuid);

impl EnsembleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EnsembleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnsembleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display only the first 8 characters for brevity
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Generation-checked reference to a cluster.
///
/// Async work holds a key rather than the cluster itself; the key stops
/// resolving once the ensemble it belongs to has been rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClusterKey {
    pub ensemble: EnsembleId,
    pub index: usize,
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ensemble, self.index)
    }
}

/// One instrument: visual object handle, loaded audio and its live graph.
pub struct InstrumentCluster {
    key: ClusterKey,
    visual: VisualId,
    home: Vec3,
    track_name: String,
    /// Decoded form of `saved_track`; graphs are rebuilt from this.
    asset: Option<Arc<DecodedTrack>>,
    /// Raw bytes of the installed track. Set together with `asset`, and
    /// replaced only by a successful load or drop.
    saved_track: Option<Arc<[u8]>>,
    graph: Option<AudioGraph>,
    pub glowing: bool,
}

impl InstrumentCluster {
    pub(crate) fn new(key: ClusterKey, visual: VisualId, home: Vec3, track_name: String) -> Self {
        Self {
            key,
            visual,
            home,
            track_name,
            asset: None,
            saved_track: None,
            graph: None,
            glowing: false,
        }
    }

    pub fn index(&self) -> usize {
        self.key.index
    }

    pub fn key(&self) -> ClusterKey {
        self.key
    }

    pub fn visual(&self) -> VisualId {
        self.visual
    }

    /// Where the instrument sits after a reset.
    pub fn home(&self) -> Vec3 {
        self.home
    }

    pub fn track_name(&self) -> &str {
        &self.track_name
    }

    pub fn asset(&self) -> Option<&Arc<DecodedTrack>> {
        self.asset.as_ref()
    }

    pub fn saved_track(&self) -> Option<&Arc<[u8]>> {
        self.saved_track.as_ref()
    }

    pub fn graph(&self) -> Option<&AudioGraph> {
        self.graph.as_ref()
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.graph.as_ref().map(|g| g.state())
    }

    pub fn is_playing(&self) -> bool {
        self.playback_state() == Some(PlaybackState::Playing)
    }

    /// Replace the graph with one built from a newly decoded track.
    ///
    /// The previous graph, if any, is torn down. Playback resumes on the new
    /// graph if the old one was playing.
    pub fn install_track(
        &mut self,
        name: Option<String>,
        bytes: Arc<[u8]>,
        track: DecodedTrack,
        builder: &GraphBuilder,
    ) -> Result<()> {
        let track = Arc::new(track);
        let graph = builder.build(self.index(), Arc::clone(&track))?;
        let was_playing = self.is_playing();

        self.graph = Some(graph);
        self.asset = Some(track);
        self.saved_track = Some(bytes);
        if let Some(name) = name {
            self.track_name = name;
        }

        if was_playing {
            self.start()?;
        }
        info!("Instrument {} armed with {}", self.index(), self.track_name);
        Ok(())
    }

    /// Begin playback on the armed graph.
    pub fn start(&mut self) -> Result<()> {
        let graph = self
            .graph
            .as_ref()
            .ok_or(MixerError::NoAudioLoaded(self.index()))?;
        graph.start()
    }

    /// Stop playback and re-arm from the saved track so the next start works.
    ///
    /// Playback is halted even when re-arming fails; the instrument is then
    /// left without a graph.
    pub fn stop(&mut self, builder: &GraphBuilder) -> Result<()> {
        self.halt();
        self.rearm(builder)
    }

    /// Stop playback and release the graph.
    pub(crate) fn halt(&mut self) {
        if let Some(graph) = self.graph.take() {
            graph.stop();
        }
    }

    /// Build a fresh armed graph from the saved track, if there is one and no
    /// graph is live.
    pub(crate) fn rearm(&mut self, builder: &GraphBuilder) -> Result<()> {
        if self.graph.is_some() {
            return Ok(());
        }
        match (&self.saved_track, &self.asset) {
            (Some(_), Some(asset)) => {
                self.graph = Some(builder.build(self.index(), Arc::clone(asset))?);
                debug!("Instrument {} re-armed", self.index());
            }
            _ => debug!("Instrument {} has no saved track to re-arm", self.index()),
        }
        Ok(())
    }

    /// Stop playback and release the graph without re-arming.
    pub(crate) fn teardown(&mut self) {
        self.halt();
    }
}
