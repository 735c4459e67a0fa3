//! Offscreen wgpu renderer for the scene graph.
//!
//! Draws the frustum-culled draw list into an RGBA texture with a depth
//! buffer. One dynamic uniform slot per mesh; frames can be read back with
//! `capture()`.

use std::collections::HashMap;
use std::iter;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::camera::PerspectiveCamera;
use crate::error::PlayerError;
use crate::gpu::mesh;
use crate::gpu::pipeline::{self, DEPTH_FORMAT};
use crate::render::{collect_draw_list, triangle_count, FrameCapture, RenderInfo, RenderSettings, Renderer};
use crate::scene_graph::{LightKind, MeshShape, SceneGraph};

/// Maximum number of meshes that can be rendered per frame.
/// Each mesh needs its own uniform slot in the dynamic uniform buffer.
const MAX_MESHES_PER_FRAME: usize = 256;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    color: [f32; 4],
    light_dir: [f32; 4],
    light_color: [f32; 4],
    ambient: [f32; 4],
    params: [f32; 4],
    // Padding to reach 256-byte alignment (208 bytes of data + 48 bytes padding)
    _padding: [f32; 12],
}

/// Per-frame lighting summary taken from the scene's light objects.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Lighting {
    key_dir: Option<Vec3>,
    key_color: [f32; 3],
    ambient: [f32; 3],
}

impl Lighting {
    fn from_scene(scene: &SceneGraph) -> Self {
        let mut lighting = Lighting {
            key_dir: None,
            key_color: [0.0; 3],
            ambient: [0.0; 3],
        };
        let mut any = false;

        let mut lights: Vec<_> = scene.lights().collect();
        lights.sort_by_key(|(id, _)| id.0);

        for (id, light) in lights {
            if !scene.is_visible(id) {
                continue;
            }
            any = true;
            let scaled = light.color.map(|c| c * light.intensity);
            match light.kind {
                LightKind::Ambient => {
                    for (a, s) in lighting.ambient.iter_mut().zip(scaled) {
                        *a += s;
                    }
                }
                LightKind::Directional | LightKind::Point if lighting.key_dir.is_none() => {
                    // Directional lights shine from their position towards the origin.
                    let origin = scene.world_matrix(id).transform_point3(Vec3::ZERO);
                    lighting.key_dir = Some((-origin).try_normalize().unwrap_or(Vec3::NEG_Y));
                    lighting.key_color = scaled;
                }
                _ => {}
            }
        }

        // Unlit scenes still show their meshes.
        if !any {
            lighting.ambient = [1.0; 3];
        }
        lighting
    }
}

struct MeshGeometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

impl MeshGeometry {
    fn upload(device: &wgpu::Device, name: &str, (vertices, indices): (Vec<mesh::Vertex>, Vec<u16>)) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} Vertex Buffer")),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} Index Buffer")),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            num_indices: indices.len() as u32,
        }
    }

    fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    /// Multisampled colour attachment, resolved into `color` each frame.
    msaa: Option<(wgpu::Texture, wgpu::TextureView)>,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    size: wgpu::Extent3d,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Target Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let msaa = (sample_count > 1).then(|| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("MSAA Texture"),
                size,
                mip_level_count: 1,
                sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: COLOR_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            msaa,
            depth,
            size,
        }
    }

    /// Attachment to draw into and the view it resolves to, if any.
    fn attachment(&self) -> (&wgpu::TextureView, Option<&wgpu::TextureView>) {
        match &self.msaa {
            Some((_, view)) => (view, Some(&self.color_view)),
            None => (&self.color_view, None),
        }
    }

    fn destroy(&self) {
        self.color.destroy();
        if let Some((texture, _)) = &self.msaa {
            texture.destroy();
        }
        self.depth.destroy();
    }
}

pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    geometries: HashMap<MeshShape, MeshGeometry>,
    target: RenderTarget,
    sample_count: u32,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    info: RenderInfo,
    disposed: bool,
}

impl GpuRenderer {
    /// Request a headless adapter and device and build the renderer.
    /// `sample_count` is 1 (no multisampling) or 4.
    pub async fn new(width: u32, height: u32, sample_count: u32) -> Result<Self, PlayerError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| PlayerError::Render("no GPU adapter found".into()))?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(|e| PlayerError::Render(e.to_string()))?;

        Ok(Self::from_device(device, queue, width, height, sample_count))
    }

    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Self {
        let sample_count = sample_count.max(1);
        // Create a large uniform buffer for dynamic uniform binding (one slot per mesh)
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mesh Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_MESHES_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                },
                count: None,
            }],
            label: Some("mesh_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                }),
            }],
            label: Some("mesh_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = pipeline::create_render_pipeline(&device, &pipeline_layout, COLOR_FORMAT, sample_count);

        let mut geometries = HashMap::new();
        geometries.insert(MeshShape::Cube, MeshGeometry::upload(&device, "Cube", mesh::create_cube_geometry()));
        geometries.insert(MeshShape::Plane, MeshGeometry::upload(&device, "Plane", mesh::create_plane_geometry()));
        geometries.insert(MeshShape::Sphere, MeshGeometry::upload(&device, "Sphere", mesh::create_sphere_geometry()));

        let target = RenderTarget::new(&device, width.max(1), height.max(1), sample_count);

        Self {
            device,
            queue,
            pipeline,
            uniform_buffer,
            bind_group,
            geometries,
            target,
            sample_count,
            width,
            height,
            pixel_ratio: 1.0,
            info: RenderInfo::default(),
            disposed: false,
        }
    }

    /// Size of the drawing buffer in physical pixels.
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }

    fn ensure_target(&mut self) {
        let (width, height) = self.drawing_buffer_size();
        if self.target.size.width != width || self.target.size.height != height {
            self.target.destroy();
            self.target = RenderTarget::new(&self.device, width, height, self.sample_count);
            log::debug!("resized render target to {width}x{height}");
        }
    }
}

impl Renderer for GpuRenderer {
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
        self.ensure_target();

        let (mut items, culled) = collect_draw_list(scene, camera);
        if items.len() > MAX_MESHES_PER_FRAME {
            log::warn!(
                "{} meshes visible, only the first {} are drawn",
                items.len(),
                MAX_MESHES_PER_FRAME
            );
            items.truncate(MAX_MESHES_PER_FRAME);
        }

        let lighting = Lighting::from_scene(scene);
        let view_proj: Mat4 = camera.view_projection();
        let key_dir = lighting.key_dir.map_or([0.0; 4], |d| d.extend(1.0).to_array());

        for (slot, item) in items.iter().enumerate() {
            let uniforms = Uniforms {
                view_proj: view_proj.to_cols_array_2d(),
                model: item.model.to_cols_array_2d(),
                color: item.color,
                light_dir: key_dir,
                light_color: [lighting.key_color[0], lighting.key_color[1], lighting.key_color[2], 0.0],
                ambient: [lighting.ambient[0], lighting.ambient[1], lighting.ambient[2], 0.0],
                params: [settings.exposure, 0.0, 0.0, 0.0],
                _padding: [0.0; 12],
            };
            self.queue.write_buffer(
                &self.uniform_buffer,
                (slot * UNIFORM_ALIGNMENT) as wgpu::BufferAddress,
                bytemuck::bytes_of(&uniforms),
            );
        }

        let [r, g, b, a] = scene.background.unwrap_or(settings.clear_color);
        let (view, resolve_target) = self.target.attachment();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mesh Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            for (slot, item) in items.iter().enumerate() {
                let Some(geometry) = self.geometries.get(&item.shape) else {
                    continue;
                };
                let offset = (slot * UNIFORM_ALIGNMENT) as u32;
                pass.set_bind_group(0, &self.bind_group, &[offset]);
                pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                pass.set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..geometry.num_indices, 0, 0..1);
            }
        }
        self.queue.submit(iter::once(encoder.finish()));

        self.info.frames += 1;
        self.info.draw_calls = items.len() as u32;
        self.info.culled = culled;
        self.info.triangles = items.iter().map(|i| triangle_count(i.shape)).sum();
        Ok(())
    }

    fn info(&self) -> RenderInfo {
        self.info
    }

    fn capture(&mut self) -> Result<Option<FrameCapture>, PlayerError> {
        if self.disposed {
            return Ok(None);
        }
        let wgpu::Extent3d { width, height, .. } = self.target.size;

        // Rows must be padded to 256 bytes for texture-to-buffer copies.
        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Capture Encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            self.target.size,
        );
        self.queue.submit(iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| PlayerError::Render(e.to_string()))?
            .map_err(|e| PlayerError::Render(e.to_string()))?;

        let rgba = {
            let data = buffer_slice.get_mapped_range();
            let mut unpadded = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
            for row in 0..height {
                let start = (row * padded_bytes_per_row) as usize;
                unpadded.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
            }
            unpadded
        };
        output_buffer.unmap();

        Ok(Some(FrameCapture { width, height, rgba }))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.target.destroy();
        self.uniform_buffer.destroy();
        for geometry in self.geometries.values() {
            geometry.destroy();
        }
        self.disposed = true;
    }
}
