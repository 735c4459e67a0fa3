//! Orbit camera controls.
//!
//! The camera orbits a target point on a sphere. Rotation input is in
//! surface pixels, so a drag across the full surface height turns the
//! camera by a full revolution times `rotate_speed`.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::camera::PerspectiveCamera;

/// Which surface delivers pointer input to the controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ControlSurface {
    /// The renderer's own drawing surface.
    #[default]
    Primary,
    /// The label overlay stacked above the renderer.
    Overlay,
}

/// Pointer input understood by the controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlInput {
    /// Drag distance in pixels.
    Rotate { dx: f32, dy: f32 },
    /// Multiply the orbit distance by `scale` (> 1 moves away).
    Dolly { scale: f32 },
    /// Drag distance in pixels.
    Pan { dx: f32, dy: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitSettings {
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            rotate_speed: 1.0,
            pan_speed: 1.0,
            min_distance: 0.01,
            max_distance: f32::INFINITY,
        }
    }
}

/// Keeps the polar angle away from the poles.
const POLAR_EPSILON: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enabled: bool,
    pub settings: OrbitSettings,
    surface: ControlSurface,
}

impl OrbitControls {
    pub fn new(surface: ControlSurface, settings: OrbitSettings) -> Self {
        Self {
            target: Vec3::ZERO,
            enabled: true,
            settings,
            surface,
        }
    }

    pub fn surface(&self) -> ControlSurface {
        self.surface
    }

    /// Apply one input event. Input from a surface the controls are not
    /// attached to is ignored. Returns true if the camera moved.
    pub fn handle(
        &mut self,
        camera: &mut PerspectiveCamera,
        surface: ControlSurface,
        input: ControlInput,
        surface_height: f32,
    ) -> bool {
        if !self.enabled || surface != self.surface {
            return false;
        }
        let height = surface_height.max(1.0);

        let offset = camera.position - self.target;
        let mut radius = offset.length();
        if radius < f32::EPSILON {
            return false;
        }
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        match input {
            ControlInput::Rotate { dx, dy } => {
                theta -= TAU * dx / height * self.settings.rotate_speed;
                phi -= TAU * dy / height * self.settings.rotate_speed;
            }
            ControlInput::Dolly { scale } => {
                if scale > 0.0 {
                    radius *= scale;
                }
            }
            ControlInput::Pan { dx, dy } => {
                // Pixels to world units at the target distance.
                let world_per_pixel =
                    2.0 * radius * (camera.fov.to_radians() * 0.5).tan() / height;
                let right = camera.orientation * Vec3::X;
                let up = camera.orientation * Vec3::Y;
                let shift = (right * -dx + up * dy) * world_per_pixel * self.settings.pan_speed;
                self.target += shift;
                camera.position += shift;
                return true;
            }
        }

        phi = phi.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        radius = radius.clamp(self.settings.min_distance, self.settings.max_distance);

        let sin_phi = phi.sin();
        camera.position = self.target
            + Vec3::new(radius * sin_phi * theta.sin(), radius * phi.cos(), radius * sin_phi * theta.cos());
        camera.look_at(self.target);
        true
    }
}
