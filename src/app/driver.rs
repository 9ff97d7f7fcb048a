use log::{debug, info};
use serde::Serialize;

use super::registry::Registry;
use super::scene::{Scene, VisualId};
use crate::error::Result;
use crate::geometry::{Ray, Vec3};

/// Height of the surface drag rays are projected onto.
pub const STAGE_PLANE_HEIGHT: f32 = 0.0;

/// What a pointer move does to the selected instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DragDirection {
    /// Move across the stage floor.
    #[default]
    Horizontal,
    /// Planar pointer travel sets the height.
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverMode {
    Idle,
    Orbiting,
    Dragging,
}

#[derive(Debug, Clone, Copy)]
struct DragSelection {
    index: usize,
    visual: VisualId,
    restore_intensity: f32,
}

/// Moves instruments, either around the stage centre or under the pointer.
#[derive(Debug)]
pub struct PositionDriver {
    orbit_enabled: bool,
    orbit_speed: f32,
    intensity_boost: f32,
    direction: DragDirection,
    camera_locked: bool,
    drag: Option<DragSelection>,
}

impl PositionDriver {
    /// Creates an idle driver
    pub fn new(orbit_speed: f32, intensity_boost: f32) -> Self {
        Self {
            orbit_enabled: false,
            orbit_speed,
            intensity_boost,
            direction: DragDirection::default(),
            camera_locked: false,
            drag: None,
        }
    }

    pub fn mode(&self) -> DriverMode {
        if self.drag.is_some() {
            DriverMode::Dragging
        } else if self.orbit_enabled {
            DriverMode::Orbiting
        } else {
            DriverMode::Idle
        }
    }

    pub fn orbit_enabled(&self) -> bool {
        self.orbit_enabled
    }

    pub fn orbit_speed(&self) -> f32 {
        self.orbit_speed
    }

    pub fn direction(&self) -> DragDirection {
        self.direction
    }

    pub fn camera_locked(&self) -> bool {
        self.camera_locked
    }

    /// Index of the instrument being dragged, if any
    pub fn selected(&self) -> Option<usize> {
        self.drag.map(|d| d.index)
    }

    /// Flip orbit mode on or off. Returns the new setting.
    pub fn toggle_orbit(&mut self) -> bool {
        self.orbit_enabled = !self.orbit_enabled;
        info!(
            "Orbit {}",
            if self.orbit_enabled { "enabled" } else { "disabled" }
        );
        self.orbit_enabled
    }

    /// Change the drag direction. Takes effect on the next move, even mid-drag.
    pub fn set_direction<S: Scene>(&mut self, direction: DragDirection, scene: &mut S) {
        self.direction = direction;
        if direction == DragDirection::Horizontal {
            scene.set_guide_line(None);
        }
    }

    /// Lock or unlock camera control.
    pub fn lock_camera<S: Scene>(&mut self, locked: bool, scene: &mut S) {
        self.camera_locked = locked;
        if self.drag.is_none() {
            scene.set_camera_enabled(!locked);
        }
    }

    /// Advance one frame of orbit motion.
    ///
    /// Every instrument turns by `-orbit_speed` radians about the stage centre
    /// at its current radius and height, and its light follows. Returns false
    /// when nothing moved (orbit off or a drag in progress).
    pub fn tick<S: Scene>(&mut self, registry: &Registry, scene: &mut S) -> bool {
        if self.mode() != DriverMode::Orbiting {
            return false;
        }

        for cluster in registry.iter() {
            let Some(position) = scene.position(cluster.visual()) else {
                continue;
            };
            let radius = position.planar_distance();
            let angle = position.planar_angle() - self.orbit_speed;
            let next = Vec3::on_circle(radius, angle, position.y);

            scene.set_position(cluster.visual(), next);
            scene.set_light_target(cluster.visual(), next);
        }
        true
    }

    /// Start dragging the instrument owning `visual`.
    pub fn begin_drag<S: Scene>(
        &mut self,
        registry: &mut Registry,
        scene: &mut S,
        visual: VisualId,
    ) -> Result<usize> {
        if self.drag.is_some() {
            self.end_drag(registry, scene);
        }

        let cluster = registry.find_by_visual_mut(visual)?;
        let index = cluster.index();
        let restore_intensity = scene.light_intensity(visual).unwrap_or(1.0);

        cluster.glowing = true;
        scene.set_light_intensity(visual, restore_intensity * self.intensity_boost);
        scene.set_camera_enabled(false);

        self.drag = Some(DragSelection {
            index,
            visual,
            restore_intensity,
        });
        debug!("Dragging instrument {}", index);
        Ok(index)
    }

    /// Apply a pointer move, given the point where the pointer ray meets the
    /// stage. Returns the index of the instrument moved, or `None` outside a
    /// drag.
    pub fn drag_to<S: Scene>(&mut self, scene: &mut S, point: Vec3) -> Option<usize> {
        let drag = self.drag?;
        let current = scene.position(drag.visual)?;

        let next = match self.direction {
            DragDirection::Horizontal => {
                scene.set_guide_line(None);
                Vec3::new(point.x, current.y, point.z)
            }
            DragDirection::Vertical => {
                let dx = point.x - current.x;
                let dz = point.z - current.z;
                let height = (dx * dx + dz * dz).sqrt();
                let next = Vec3::new(current.x, height, current.z);
                scene.set_guide_line(Some((
                    Vec3::new(current.x, STAGE_PLANE_HEIGHT, current.z),
                    next,
                )));
                next
            }
        };

        scene.set_position(drag.visual, next);
        scene.set_light_target(drag.visual, next);
        Some(drag.index)
    }

    /// Project a pointer ray onto the stage plane and apply it as a move.
    pub fn drag_ray<S: Scene>(&mut self, scene: &mut S, ray: Ray) -> Option<usize> {
        let point = ray.intersect_horizontal_plane(STAGE_PLANE_HEIGHT)?;
        self.drag_to(scene, point)
    }

    /// Release the current drag. Returns the index that was being dragged.
    pub fn end_drag<S: Scene>(&mut self, registry: &mut Registry, scene: &mut S) -> Option<usize> {
        let drag = self.drag.take()?;

        scene.set_light_intensity(drag.visual, drag.restore_intensity);
        scene.set_guide_line(None);
        scene.set_camera_enabled(!self.camera_locked);
        if let Ok(cluster) = registry.find_by_visual_mut(drag.visual) {
            cluster.glowing = false;
        }
        debug!("Released instrument {}", drag.index);
        Some(drag.index)
    }
}
