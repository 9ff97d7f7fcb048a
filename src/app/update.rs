//! Position → audio parameter mapping, run every frame and on every drag move.

use log::{debug, warn};
use std::time::Duration;

use super::cluster::InstrumentCluster;
use super::registry::Registry;
use super::scene::Scene;
use crate::audio::AudioGraph;
use crate::geometry::Vec3;
use crate::units::{scale_linear, scale_log};

pub const LOW_SHELF_RANGE_HZ: (f32, f32) = (20.0, 2_000.0);
pub const HIGH_SHELF_RANGE_HZ: (f32, f32) = (2_000.0, 10_000.0);
pub const PLAYBACK_RATE_RANGE: (f32, f32) = (0.0, 2.0);

/// Stage geometry and timing the mapping is computed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceFrame {
    pub stage_width: f32,
    pub stage_height: f32,
    pub ramp: Duration,
}

impl ReferenceFrame {
    /// Half the stage diagonal.
    pub fn max_distance(&self) -> f32 {
        (self.stage_width * self.stage_width + self.stage_height * self.stage_height).sqrt() / 2.0
    }
}

/// Audio parameter targets for one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterTargets {
    pub low_shelf_hz: f32,
    pub high_shelf_hz: f32,
    pub playback_rate: f32,
    pub panner_position: Vec3,
}

/// Map a stage position to parameter targets.
///
/// Distance from the centre opens both shelf corners logarithmically, height
/// sets playback speed, and the panner sees the stage's up axis as forward.
pub fn compute_targets(position: Vec3, frame: &ReferenceFrame) -> ParameterTargets {
    let distance = position.planar_distance();
    let reach = frame.max_distance() / 2.0;

    ParameterTargets {
        low_shelf_hz: scale_log(
            distance,
            0.0,
            reach,
            LOW_SHELF_RANGE_HZ.0,
            LOW_SHELF_RANGE_HZ.1,
        ),
        high_shelf_hz: scale_log(
            distance,
            0.0,
            reach,
            HIGH_SHELF_RANGE_HZ.0,
            HIGH_SHELF_RANGE_HZ.1,
        ),
        playback_rate: scale_linear(
            position.y,
            0.0,
            1.0,
            PLAYBACK_RATE_RANGE.0,
            PLAYBACK_RATE_RANGE.1,
        ),
        panner_position: Vec3::new(position.x, position.z, position.y),
    }
}

/// Schedule ramps on a graph towards `targets`.
pub fn apply_targets(graph: &AudioGraph, targets: &ParameterTargets, ramp: Duration) {
    let params = graph.params();
    params
        .low_shelf_frequency
        .linear_ramp_to(targets.low_shelf_hz, ramp);
    params
        .high_shelf_frequency
        .linear_ramp_to(targets.high_shelf_hz, ramp);
    params.playback_rate.linear_ramp_to(targets.playback_rate, ramp);
    params
        .position_x
        .linear_ramp_to(targets.panner_position.x, ramp);
    params
        .position_y
        .linear_ramp_to(targets.panner_position.y, ramp);
    params
        .position_z
        .linear_ramp_to(targets.panner_position.z, ramp);
}

/// Recompute one cluster's parameters. Returns whether anything was scheduled.
pub fn update_cluster<S: Scene>(
    cluster: &InstrumentCluster,
    scene: &S,
    frame: &ReferenceFrame,
) -> bool {
    let Some(graph) = cluster.graph() else {
        debug!("Instrument {} has no live source, skipping", cluster.index());
        return false;
    };

    let position = match scene.position(cluster.visual()) {
        Some(p) if p.is_finite() => p,
        Some(p) => {
            warn!("Instrument {} has non-finite position {:?}", cluster.index(), p);
            return false;
        }
        None => {
            warn!("Instrument {} has no visual object", cluster.index());
            return false;
        }
    };

    apply_targets(graph, &compute_targets(position, frame), frame.ramp);
    true
}

/// Recompute every cluster's parameters from its current position.
///
/// Repeated calls with unchanged positions schedule identical targets.
/// Returns how many clusters were updated.
pub fn update_parameters<S: Scene>(registry: &Registry, scene: &S, frame: &ReferenceFrame) -> usize {
    let mut updated = 0;
    registry.for_each(|cluster| {
        if update_cluster(cluster, scene, frame) {
            updated += 1;
        }
    });
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::registry::EnsembleLayout;
    use crate::app::scene::StageScene;
    use crate::audio::{create_engine, DecodedTrack, GraphBuilder, GraphSettings};
    use std::sync::Arc;

    fn frame() -> ReferenceFrame {
        // max distance 10, so shelf corners saturate at a distance of 5
        ReferenceFrame {
            stage_width: 12.0,
            stage_height: 16.0,
            ramp: Duration::from_millis(100),
        }
    }

    #[test]
    fn max_distance_is_half_diagonal() {
        assert!((frame().max_distance() - 10.0).abs() < 1e-5);
    }

    #[test]
    fn centre_gives_lowest_corners() {
        let targets = compute_targets(Vec3::new(0.0, 0.5, 0.0), &frame());
        assert!((targets.low_shelf_hz - 20.0).abs() < 1e-3);
        assert!((targets.high_shelf_hz - 2_000.0).abs() < 1e-2);
        assert!((targets.playback_rate - 1.0).abs() < 1e-6);
    }

    #[test]
    fn edge_gives_highest_corners() {
        let targets = compute_targets(Vec3::new(3.0, 0.0, 4.0), &frame());
        assert!((targets.low_shelf_hz - 2_000.0).abs() < 0.5);
        assert!((targets.high_shelf_hz - 10_000.0).abs() < 1.0);
        assert_eq!(targets.playback_rate, 0.0);
    }

    #[test]
    fn panner_axes_are_remapped() {
        let targets = compute_targets(Vec3::new(1.0, 2.0, 3.0), &frame());
        assert_eq!(targets.panner_position, Vec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn updates_are_ramped_and_idempotent() {
        let (handle, _engine) = create_engine(48_000);
        let builder = GraphBuilder::new(handle, GraphSettings::default());
        let mut scene = StageScene::new();
        let mut registry = Registry::new();
        let layout = EnsembleLayout {
            radius: 2.0,
            height: 0.75,
            tracks: vec!["t".to_string()],
        };
        registry.rebuild(2, &mut scene, &layout);
        let track = DecodedTrack::from_samples(48_000, vec![0.0; 32]);
        registry
            .get_mut(0)
            .unwrap()
            .install_track(None, Arc::from(&[0u8][..]), track, &builder)
            .unwrap();

        // Instrument 1 has no graph and is skipped.
        assert_eq!(update_parameters(&registry, &scene, &frame()), 1);
        let params = registry.get(0).unwrap().graph().unwrap().params();
        let first = (
            params.low_shelf_frequency.target(),
            params.high_shelf_frequency.target(),
            params.playback_rate.target(),
            params.position_target(),
        );
        assert!((params.playback_rate.ramp_time().as_secs_f32() - 0.1).abs() < 1e-6);

        assert_eq!(update_parameters(&registry, &scene, &frame()), 1);
        let second = (
            params.low_shelf_frequency.target(),
            params.high_shelf_frequency.target(),
            params.playback_rate.target(),
            params.position_target(),
        );
        assert_eq!(first, second);
        assert_eq!(params.playback_rate.epoch(), 2);
        assert!((params.playback_rate.target() - 1.5).abs() < 1e-6);
    }
}
