//! The set of live instrument clusters.

use log::{debug, info};
use std::collections::HashMap;
use std::f32::consts::TAU;

use super::cluster::{ClusterKey, EnsembleId, InstrumentCluster};
use super::scene::{Scene, VisualId};
use crate::error::{MixerError, Result};
use crate::geometry::Vec3;

/// How a freshly built ensemble is laid out.
#[derive(Debug, Clone)]
pub struct EnsembleLayout {
    pub radius: f32,
    pub height: f32,
    /// Tracks assigned to instruments cyclically by index.
    pub tracks: Vec<String>,
}

impl EnsembleLayout {
    /// Home position of instrument `index` in an ensemble of `size`.
    pub fn home(&self, index: usize, size: usize) -> Vec3 {
        let angle = index as f32 * TAU / size as f32;
        Vec3::on_circle(self.radius, angle, self.height)
    }

    pub fn track_for(&self, index: usize) -> String {
        self.tracks[index % self.tracks.len()].clone()
    }
}

/// Owns every cluster of the current ensemble, in index order.
pub struct Registry {
    ensemble: EnsembleId,
    clusters: Vec<InstrumentCluster>,
    by_visual: HashMap<VisualId, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            ensemble: EnsembleId::new(),
            clusters: Vec::new(),
            by_visual: HashMap::new(),
        }
    }

    pub fn ensemble_id(&self) -> EnsembleId {
        self.ensemble
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Tear down the current ensemble and build `size` fresh clusters.
    ///
    /// Every graph is stopped and every visual object removed before any new
    /// cluster is created. The replacement is swapped in whole, so no cluster
    /// is ever visible with a stale index. Returns the keys and default track
    /// names of the new clusters.
    pub fn rebuild<S: Scene>(
        &mut self,
        size: usize,
        scene: &mut S,
        layout: &EnsembleLayout,
    ) -> Vec<(ClusterKey, String)> {
        self.teardown(scene);

        let ensemble = EnsembleId::new();
        let mut clusters = Vec::with_capacity(size);
        let mut by_visual = HashMap::with_capacity(size);
        let mut loads = Vec::with_capacity(size);

        for index in 0..size {
            let key = ClusterKey { ensemble, index };
            let home = layout.home(index, size);
            let visual = scene.spawn_instrument(index, home);
            let track = layout.track_for(index);

            by_visual.insert(visual, index);
            loads.push((key, track.clone()));
            clusters.push(InstrumentCluster::new(key, visual, home, track));
        }

        self.ensemble = ensemble;
        self.clusters = clusters;
        self.by_visual = by_visual;

        info!("Ensemble {} rebuilt with {} instruments", ensemble, size);
        loads
    }

    /// Stop all playback and drop every cluster and visual object.
    pub fn teardown<S: Scene>(&mut self, scene: &mut S) {
        if self.clusters.is_empty() {
            return;
        }
        debug!(
            "Tearing down ensemble {} ({} instruments)",
            self.ensemble,
            self.clusters.len()
        );
        for cluster in &mut self.clusters {
            cluster.teardown();
            scene.despawn_instrument(cluster.visual());
        }
        self.clusters.clear();
        self.by_visual.clear();
        self.ensemble = EnsembleId::new();
    }

    /// Resolve a picked visual object back to its cluster.
    pub fn find_by_visual(&self, visual: VisualId) -> Result<&InstrumentCluster> {
        self.by_visual
            .get(&visual)
            .and_then(|&i| self.clusters.get(i))
            .ok_or_else(|| MixerError::NotFound(format!("no instrument for {}", visual)))
    }

    pub fn find_by_visual_mut(&mut self, visual: VisualId) -> Result<&mut InstrumentCluster> {
        match self.by_visual.get(&visual) {
            Some(&i) => Ok(&mut self.clusters[i]),
            None => Err(MixerError::NotFound(format!("no instrument for {}", visual))),
        }
    }

    /// Look up a cluster by key; stale keys from earlier ensembles never match.
    pub fn resolve(&self, key: ClusterKey) -> Option<&InstrumentCluster> {
        if key.ensemble != self.ensemble {
            return None;
        }
        self.clusters.get(key.index)
    }

    pub fn resolve_mut(&mut self, key: ClusterKey) -> Option<&mut InstrumentCluster> {
        if key.ensemble != self.ensemble {
            return None;
        }
        self.clusters.get_mut(key.index)
    }

    pub fn get(&self, index: usize) -> Result<&InstrumentCluster> {
        self.clusters
            .get(index)
            .ok_or_else(|| MixerError::NotFound(format!("no instrument {}", index)))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut InstrumentCluster> {
        self.clusters
            .get_mut(index)
            .ok_or_else(|| MixerError::NotFound(format!("no instrument {}", index)))
    }

    /// Visit every cluster in index order.
    pub fn for_each<F: FnMut(&InstrumentCluster)>(&self, visit: F) {
        self.clusters.iter().for_each(visit);
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstrumentCluster> {
        self.clusters.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InstrumentCluster> {
        self.clusters.iter_mut()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::scene::StageScene;
    use crate::audio::{create_engine, DecodedTrack, GraphBuilder, GraphSettings};
    use std::sync::Arc;

    fn layout() -> EnsembleLayout {
        EnsembleLayout {
            radius: 5.0,
            height: 0.5,
            tracks: vec![
                "drums".to_string(),
                "bass".to_string(),
                "guitar".to_string(),
                "vocals".to_string(),
            ],
        }
    }

    #[test]
    fn rebuild_places_instruments_on_circle() {
        let mut scene = StageScene::new();
        let mut registry = Registry::new();

        for n in 1..=4 {
            let loads = registry.rebuild(n, &mut scene, &layout());
            assert_eq!(registry.len(), n);
            assert_eq!(loads.len(), n);
            assert_eq!(scene.object_count(), n);

            for (i, cluster) in registry.iter().enumerate() {
                assert_eq!(cluster.index(), i);
                let angle = i as f32 * TAU / n as f32;
                let p = scene.position(cluster.visual()).unwrap();
                assert!((p.x - 5.0 * angle.cos()).abs() < 1e-5);
                assert!((p.z - 5.0 * angle.sin()).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn tracks_cycle_by_index() {
        let mut scene = StageScene::new();
        let mut registry = Registry::new();
        let loads = registry.rebuild(6, &mut scene, &layout());
        let names: Vec<_> = loads.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(names, ["drums", "bass", "guitar", "vocals", "drums", "bass"]);
    }

    #[test]
    fn lookup_by_visual() {
        let mut scene = StageScene::new();
        let mut registry = Registry::new();
        registry.rebuild(3, &mut scene, &layout());

        let visual = registry.get(1).unwrap().visual();
        assert_eq!(registry.find_by_visual(visual).unwrap().index(), 1);
        assert!(matches!(
            registry.find_by_visual(VisualId(12345)),
            Err(MixerError::NotFound(_))
        ));
    }

    #[test]
    fn rebuild_invalidates_old_keys_and_visuals() {
        let mut scene = StageScene::new();
        let mut registry = Registry::new();
        let old = registry.rebuild(2, &mut scene, &layout());
        let old_visual = registry.get(0).unwrap().visual();

        registry.rebuild(2, &mut scene, &layout());
        assert!(registry.resolve(old[0].0).is_none());
        assert!(registry.find_by_visual(old_visual).is_err());
        assert!(scene.position(old_visual).is_none());
        assert_eq!(scene.object_count(), 2);
    }

    #[test]
    fn rebuild_stops_playback() {
        let (handle, _engine) = create_engine(48_000);
        let builder = GraphBuilder::new(handle, GraphSettings::default());
        let mut scene = StageScene::new();
        let mut registry = Registry::new();
        registry.rebuild(2, &mut scene, &layout());

        for cluster in registry.iter_mut() {
            let track = DecodedTrack::from_samples(48_000, vec![0.0; 16]);
            cluster
                .install_track(None, Arc::from(&[0u8][..]), track, &builder)
                .unwrap();
            cluster.start().unwrap();
        }
        assert!(registry.iter().all(|c| c.is_playing()));

        registry.rebuild(3, &mut scene, &layout());
        assert!(registry.iter().all(|c| !c.is_playing()));
    }

    #[test]
    fn for_each_visits_in_order() {
        let mut scene = StageScene::new();
        let mut registry = Registry::new();
        registry.rebuild(4, &mut scene, &layout());

        let mut seen = Vec::new();
        registry.for_each(|c| seen.push(c.index()));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
