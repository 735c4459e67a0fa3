//! Renderer seam and the CPU-side draw list shared by all backends.

use glam::{Mat4, Vec3, Vec4};
use serde::Serialize;

use crate::camera::PerspectiveCamera;
use crate::error::PlayerError;
use crate::scene_graph::{MeshShape, ObjectId, SceneGraph};

/// Output settings shared between the player, its renderer and scripts.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub clear_color: [f32; 4],
    pub shadows: bool,
    pub tone_mapping: u32,
    pub exposure: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            pixel_ratio: 1.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shadows: false,
            tone_mapping: 0,
            exposure: 1.0,
        }
    }
}

impl RenderSettings {
    /// Size of the drawing buffer in physical pixels.
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }
}

/// Statistics about the most recent frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderInfo {
    pub frames: u64,
    pub draw_calls: u32,
    pub culled: u32,
    pub triangles: u64,
}

/// RGBA8 pixels read back from a renderer.
#[derive(Debug, Clone)]
pub struct FrameCapture {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// One mesh to draw this frame.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub id: ObjectId,
    pub shape: MeshShape,
    /// World matrix with the mesh extent applied.
    pub model: Mat4,
    pub color: [f32; 4],
}

/// Backend that draws a scene through a camera.
pub trait Renderer {
    fn set_pixel_ratio(&mut self, ratio: f32);

    fn set_size(&mut self, width: u32, height: u32);

    fn render(
        &mut self,
        scene: &SceneGraph,
        camera: &PerspectiveCamera,
        settings: &RenderSettings,
    ) -> Result<(), PlayerError>;

    fn info(&self) -> RenderInfo;

    /// Read back the last frame, if the backend keeps pixels.
    fn capture(&mut self) -> Result<Option<FrameCapture>, PlayerError> {
        Ok(None)
    }

    /// Release backend resources. Rendering afterwards is an error.
    fn dispose(&mut self);
}

/// Triangle count of the built-in geometry for each shape.
pub fn triangle_count(shape: MeshShape) -> u64 {
    match shape {
        MeshShape::Cube => 12,
        MeshShape::Plane => 2,
        MeshShape::Sphere => 16 * 32 * 2,
    }
}

/// Frustum planes (inward-facing normals) extracted from a view-projection
/// matrix with [0, 1] clip depth.
fn frustum_planes(view_proj: &Mat4) -> [Vec4; 6] {
    let r0 = view_proj.row(0);
    let r1 = view_proj.row(1);
    let r2 = view_proj.row(2);
    let r3 = view_proj.row(3);
    let normalize = |p: Vec4| {
        let len = p.truncate().length();
        if len > 0.0 { p / len } else { p }
    };
    [
        normalize(r3 + r0),
        normalize(r3 - r0),
        normalize(r3 + r1),
        normalize(r3 - r1),
        normalize(r2),
        normalize(r3 - r2),
    ]
}

fn sphere_in_frustum(planes: &[Vec4; 6], center: Vec3, radius: f32) -> bool {
    planes
        .iter()
        .all(|p| p.truncate().dot(center) + p.w >= -radius)
}

/// Collect visible meshes, culling those whose bounding sphere lies
/// entirely outside the camera frustum. Returns the items and the cull count.
pub fn collect_draw_list(scene: &SceneGraph, camera: &PerspectiveCamera) -> (Vec<DrawItem>, u32) {
    let planes = frustum_planes(&camera.view_projection());
    let mut culled = 0;
    let mut items = Vec::new();

    for (id, mesh, world) in scene.visible_meshes() {
        let model = world * Mat4::from_scale(mesh.extent);
        let center = model.transform_point3(Vec3::ZERO);
        let (scale, _, _) = model.to_scale_rotation_translation();
        // Unit shapes fit in a sphere of radius sqrt(3)/2.
        let radius = scale.abs().max_element() * 0.866;

        if !sphere_in_frustum(&planes, center, radius) {
            culled += 1;
            continue;
        }
        items.push(DrawItem {
            id,
            shape: mesh.shape,
            model,
            color: mesh.color,
        });
    }

    (items, culled)
}

/// Renderer that builds the draw list without touching a GPU.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    width: u32,
    height: u32,
    pixel_ratio: f32,
    info: RenderInfo,
    last_draw_list: Vec<DrawItem>,
    last_clear_color: [f32; 4],
    disposed: bool,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
            ..Default::default()
        }
    }

    pub fn last_draw_list(&self) -> &[DrawItem] {
        &self.last_draw_list
    }

    pub fn last_clear_color(&self) -> [f32; 4] {
        self.last_clear_color
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Renderer for HeadlessRenderer {
    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio;
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn render(
        &mut self,
        scene: &SceneGraph,
        camera: &PerspectiveCamera,
        settings: &RenderSettings,
    ) -> Result<(), PlayerError> {
        if self.disposed {
            return Err(PlayerError::Render("renderer has been disposed".into()));
        }
        let (items, culled) = collect_draw_list(scene, camera);

        self.info.frames += 1;
        self.info.draw_calls = items.len() as u32;
        self.info.culled = culled;
        self.info.triangles = items.iter().map(|i| triangle_count(i.shape)).sum();
        self.last_clear_color = scene.background.unwrap_or(settings.clear_color);
        self.last_draw_list = items;
        Ok(())
    }

    fn info(&self) -> RenderInfo {
        self.info
    }

    fn dispose(&mut self) {
        self.last_draw_list.clear();
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::{MeshInstance, ObjectKind, SceneObject};

    fn scene_with_cubes(positions: &[Vec3]) -> SceneGraph {
        let mut scene = SceneGraph::new("root");
        for (i, p) in positions.iter().enumerate() {
            let mut obj = SceneObject::new(
                format!("cube-{i}"),
                ObjectKind::Mesh(MeshInstance::new(MeshShape::Cube)),
            );
            obj.transform.position = *p;
            scene.add(scene.root(), obj);
        }
        scene
    }

    fn camera_at_z(z: f32) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(50.0, 1.0, 0.1, 100.0);
        camera.position = Vec3::new(0.0, 0.0, z);
        camera.look_at(Vec3::ZERO);
        camera
    }

    #[test]
    fn test_draw_list_culls_outside_frustum() {
        let scene = scene_with_cubes(&[
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 20.0),  // behind the camera
            Vec3::new(500.0, 0.0, 0.0), // far off to the side
        ]);
        let (items, culled) = collect_draw_list(&scene, &camera_at_z(10.0));
        assert_eq!(items.len(), 1);
        assert_eq!(culled, 2);
    }

    #[test]
    fn test_headless_render_records_info() {
        let scene = scene_with_cubes(&[Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)]);
        let mut renderer = HeadlessRenderer::new(800, 600);
        renderer
            .render(&scene, &camera_at_z(10.0), &RenderSettings::default())
            .unwrap();

        let info = renderer.info();
        assert_eq!(info.frames, 1);
        assert_eq!(info.draw_calls, 2);
        assert_eq!(info.triangles, 24);
        assert_eq!(renderer.last_draw_list().len(), 2);
    }

    #[test]
    fn test_render_after_dispose_fails() {
        let scene = scene_with_cubes(&[]);
        let mut renderer = HeadlessRenderer::new(10, 10);
        renderer.dispose();
        assert!(renderer
            .render(&scene, &camera_at_z(10.0), &RenderSettings::default())
            .is_err());
    }

    #[test]
    fn test_drawing_buffer_size() {
        let settings = RenderSettings {
            width: 400,
            height: 300,
            pixel_ratio: 2.0,
            ..Default::default()
        };
        assert_eq!(settings.drawing_buffer_size(), (800, 600));
    }
}
