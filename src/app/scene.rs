//! The scene collaborator.
//!
//! Rendering, model loading and picking live outside the core. The core only
//! needs the narrow [`Scene`] interface below; [`StageScene`] is an in-memory
//! implementation used headless and in tests.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::geometry::Vec3;

/// Stable handle attached to a visual object when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VisualId(pub u64);

impl fmt::Display for VisualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visual#{}", self.0)
    }
}

pub type Rgb = [f32; 3];

pub trait Scene {
    /// Create the visual object (model plus spotlight) for one instrument.
    fn spawn_instrument(&mut self, index: usize, position: Vec3) -> VisualId;

    /// Detach and drop a visual object.
    fn despawn_instrument(&mut self, id: VisualId);

    fn position(&self, id: VisualId) -> Option<Vec3>;
    fn set_position(&mut self, id: VisualId, position: Vec3);

    fn light_intensity(&self, id: VisualId) -> Option<f32>;
    fn set_light_intensity(&mut self, id: VisualId, intensity: f32);

    /// Point the instrument's spotlight at `target`.
    fn set_light_target(&mut self, id: VisualId, target: Vec3);

    fn set_light_color(&mut self, id: VisualId, color: Rgb);

    /// Show or hide the guide line drawn while dragging vertically.
    fn set_guide_line(&mut self, line: Option<(Vec3, Vec3)>);

    /// Enable or disable interactive camera motion.
    fn set_camera_enabled(&mut self, enabled: bool);
}

/// One instrument as the scene sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageObject {
    pub index: usize,
    pub position: Vec3,
    pub light_intensity: f32,
    pub light_target: Vec3,
    pub light_color: Rgb,
}

pub const DEFAULT_LIGHT_INTENSITY: f32 = 1.0;

/// Headless scene that just stores what it is told.
#[derive(Debug)]
pub struct StageScene {
    objects: HashMap<VisualId, StageObject>,
    next_id: u64,
    guide_line: Option<(Vec3, Vec3)>,
    camera_enabled: bool,
}

impl StageScene {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_id: 1,
            guide_line: None,
            camera_enabled: true,
        }
    }

    pub fn object(&self, id: VisualId) -> Option<&StageObject> {
        self.objects.get(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn guide_line(&self) -> Option<(Vec3, Vec3)> {
        self.guide_line
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }
}

impl Default for StageScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for StageScene {
    fn spawn_instrument(&mut self, index: usize, position: Vec3) -> VisualId {
        let id = VisualId(self.next_id);
        self.next_id += 1;
        self.objects.insert(
            id,
            StageObject {
                index,
                position,
                light_intensity: DEFAULT_LIGHT_INTENSITY,
                light_target: position,
                light_color: [1.0, 1.0, 1.0],
            },
        );
        id
    }

    fn despawn_instrument(&mut self, id: VisualId) {
        self.objects.remove(&id);
    }

    fn position(&self, id: VisualId) -> Option<Vec3> {
        self.objects.get(&id).map(|o| o.position)
    }

    fn set_position(&mut self, id: VisualId, position: Vec3) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.position = position;
        }
    }

    fn light_intensity(&self, id: VisualId) -> Option<f32> {
        self.objects.get(&id).map(|o| o.light_intensity)
    }

    fn set_light_intensity(&mut self, id: VisualId, intensity: f32) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.light_intensity = intensity;
        }
    }

    fn set_light_target(&mut self, id: VisualId, target: Vec3) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.light_target = target;
        }
    }

    fn set_light_color(&mut self, id: VisualId, color: Rgb) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.light_color = color;
        }
    }

    fn set_guide_line(&mut self, line: Option<(Vec3, Vec3)>) {
        self.guide_line = line;
    }

    fn set_camera_enabled(&mut self, enabled: bool) {
        self.camera_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let mut scene = StageScene::new();
        let a = scene.spawn_instrument(0, Vec3::ZERO);
        scene.despawn_instrument(a);
        let b = scene.spawn_instrument(0, Vec3::ZERO);
        assert_ne!(a, b);
        assert_eq!(scene.object_count(), 1);
        assert!(scene.position(a).is_none());
    }

    #[test]
    fn writes_to_missing_objects_are_ignored() {
        let mut scene = StageScene::new();
        scene.set_position(VisualId(99), Vec3::new(1.0, 2.0, 3.0));
        assert!(scene.position(VisualId(99)).is_none());
        assert_eq!(format!("{}", VisualId(99)), "visual#99");
    }
}
