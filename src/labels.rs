//! Screen-space label overlay.
//!
//! Projects every visible object that carries a label to pixel coordinates
//! of the overlay surface. Labels behind the camera or outside the viewport
//! are dropped.

use glam::Vec3;
use serde::Serialize;

use crate::camera::PerspectiveCamera;
use crate::scene_graph::SceneGraph;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenLabel {
    pub uuid: String,
    pub text: String,
    /// Pixels from the left edge.
    pub x: f32,
    /// Pixels from the top edge.
    pub y: f32,
    /// Normalized depth in [0, 1], smaller is closer.
    pub depth: f32,
}

#[derive(Debug, Default)]
pub struct LabelRenderer {
    width: u32,
    height: u32,
    labels: Vec<ScreenLabel>,
    disposed: bool,
}

impl LabelRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn render(&mut self, scene: &SceneGraph, camera: &PerspectiveCamera) {
        self.labels.clear();
        if self.disposed {
            return;
        }
        let (w, h) = (self.width as f32, self.height as f32);

        for id in scene.traverse() {
            let Some(object) = scene.get(id) else { continue };
            let Some(text) = &object.label else { continue };
            if !scene.is_visible(id) {
                continue;
            }
            let origin = scene.world_matrix(id).transform_point3(Vec3::ZERO);
            let Some(ndc) = camera.project(origin) else { continue };
            if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || !(0.0..=1.0).contains(&ndc.z) {
                continue;
            }
            self.labels.push(ScreenLabel {
                uuid: object.uuid.clone(),
                text: text.clone(),
                x: (ndc.x + 1.0) * 0.5 * w,
                y: (1.0 - ndc.y) * 0.5 * h,
                depth: ndc.z,
            });
        }
    }

    /// Labels produced by the last render.
    pub fn labels(&self) -> &[ScreenLabel] {
        &self.labels
    }

    pub fn dispose(&mut self) {
        self.labels.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
