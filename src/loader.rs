//! Object loader: turns scene and camera documents into live objects.
//!
//! The documents follow the editor's object JSON layout: an `object` tree
//! whose meshes reference entries of shared `geometries` and `materials`
//! arrays by uuid. Transforms are given either as a column-major `matrix` or
//! as separate `position`/`rotation`/`scale` arrays.

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use serde::Deserialize;
use serde_json::Value;

use crate::camera::PerspectiveCamera;
use crate::error::PlayerError;
use crate::scene_graph::{
    Light, LightKind, MeshInstance, MeshShape, ObjectId, ObjectKind, SceneGraph, SceneObject,
    Transform,
};

#[derive(Debug, Deserialize)]
struct SceneDocument {
    #[serde(default)]
    geometries: Vec<GeometryDef>,
    #[serde(default)]
    materials: Vec<MaterialDef>,
    object: ObjectDef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectDef {
    uuid: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    visible: Option<bool>,
    #[serde(default)]
    matrix: Option<[f32; 16]>,
    #[serde(default)]
    position: Option<[f32; 3]>,
    #[serde(default)]
    rotation: Option<[f32; 3]>,
    #[serde(default)]
    scale: Option<[f32; 3]>,
    #[serde(default)]
    geometry: Option<String>,
    #[serde(default)]
    material: Option<String>,
    #[serde(default)]
    color: Option<u32>,
    #[serde(default)]
    intensity: Option<f32>,
    #[serde(default)]
    background: Option<u32>,
    #[serde(default)]
    user_data: Option<UserData>,
    #[serde(default)]
    children: Vec<ObjectDef>,
}

#[derive(Debug, Default, Deserialize)]
struct UserData {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeometryDef {
    uuid: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    depth: Option<f32>,
    #[serde(default)]
    radius: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct MaterialDef {
    uuid: String,
    #[serde(default)]
    color: Option<u32>,
    #[serde(default)]
    opacity: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CameraDocument {
    object: CameraDef,
}

#[derive(Debug, Deserialize)]
struct CameraDef {
    #[serde(default)]
    uuid: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default = "default_fov")]
    fov: f32,
    #[serde(default = "default_aspect")]
    aspect: f32,
    #[serde(default = "default_near")]
    near: f32,
    #[serde(default = "default_far")]
    far: f32,
    #[serde(default = "default_zoom")]
    zoom: f32,
    #[serde(default)]
    matrix: Option<[f32; 16]>,
    #[serde(default)]
    position: Option<[f32; 3]>,
}

fn default_fov() -> f32 {
    50.0
}

fn default_aspect() -> f32 {
    1.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    2000.0
}

fn default_zoom() -> f32 {
    1.0
}

/// Convert a packed 0xRRGGBB colour to linear-ish RGBA floats.
pub fn hex_to_rgba(hex: u32, alpha: f32) -> [f32; 4] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
        alpha,
    ]
}

pub fn rgba_to_hex(color: [f32; 4]) -> u32 {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(color[0]) << 16) | (channel(color[1]) << 8) | channel(color[2])
}

/// Builds scene graphs and cameras from their JSON documents.
#[derive(Debug, Default)]
pub struct ObjectLoader;

impl ObjectLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_scene(&self, document: &Value) -> Result<SceneGraph, PlayerError> {
        let doc = SceneDocument::deserialize(document)
            .map_err(|source| PlayerError::Document { kind: "scene", source })?;

        let geometries: HashMap<&str, &GeometryDef> =
            doc.geometries.iter().map(|g| (g.uuid.as_str(), g)).collect();
        let materials: HashMap<&str, &MaterialDef> =
            doc.materials.iter().map(|m| (m.uuid.as_str(), m)).collect();

        let mut scene = SceneGraph::new(doc.object.uuid.clone());
        let root = scene.root();
        if let Some(root_obj) = scene.get_mut(root) {
            apply_common(root_obj, &doc.object);
        }
        scene.background = doc.object.background.map(|hex| hex_to_rgba(hex, 1.0));

        let tables = Tables { geometries, materials };
        for child in &doc.object.children {
            add_object(&mut scene, root, child, &tables);
        }

        log::debug!(
            "Loaded scene '{}' with {} objects",
            doc.object.name,
            scene.len()
        );
        Ok(scene)
    }

    pub fn parse_camera(&self, document: &Value) -> Result<PerspectiveCamera, PlayerError> {
        let doc = CameraDocument::deserialize(document)
            .map_err(|source| PlayerError::Document { kind: "camera", source })?;
        let def = doc.object;
        if def.kind != "PerspectiveCamera" {
            return Err(PlayerError::UnsupportedCamera(def.kind));
        }

        let mut camera = PerspectiveCamera::new(def.fov, def.aspect, def.near, def.far);
        camera.uuid = def.uuid;
        camera.name = def.name;
        camera.zoom = def.zoom;
        if let Some(matrix) = def.matrix {
            let (_, rotation, translation) =
                Mat4::from_cols_array(&matrix).to_scale_rotation_translation();
            camera.position = translation;
            camera.orientation = rotation;
        } else if let Some(position) = def.position {
            camera.position = Vec3::from_array(position);
            camera.look_at(Vec3::ZERO);
        }
        camera.update_projection_matrix();
        Ok(camera)
    }
}

struct Tables<'a> {
    geometries: HashMap<&'a str, &'a GeometryDef>,
    materials: HashMap<&'a str, &'a MaterialDef>,
}

fn apply_common(object: &mut SceneObject, def: &ObjectDef) {
    object.name = def.name.clone();
    object.visible = def.visible.unwrap_or(true);
    object.transform = transform_of(def);
    object.label = def.user_data.as_ref().and_then(|u| u.label.clone());
}

fn transform_of(def: &ObjectDef) -> Transform {
    if let Some(matrix) = def.matrix {
        return Transform::from_matrix(&Mat4::from_cols_array(&matrix));
    }
    let mut transform = Transform::default();
    if let Some(p) = def.position {
        transform.position = Vec3::from_array(p);
    }
    if let Some(r) = def.rotation {
        transform.rotation = Vec3::from_array(r);
    }
    if let Some(s) = def.scale {
        transform.scale = Vec3::from_array(s);
    }
    transform
}

fn add_object(scene: &mut SceneGraph, parent: ObjectId, def: &ObjectDef, tables: &Tables<'_>) {
    let kind = match def.kind.as_str() {
        "Mesh" => ObjectKind::Mesh(mesh_of(def, tables)),
        "AmbientLight" => ObjectKind::Light(light_of(def, LightKind::Ambient)),
        "DirectionalLight" => ObjectKind::Light(light_of(def, LightKind::Directional)),
        "PointLight" => ObjectKind::Light(light_of(def, LightKind::Point)),
        "Group" | "Object3D" | "Scene" => ObjectKind::Group,
        other => {
            log::debug!("Object type '{}' ({}) loaded as a group", other, def.uuid);
            ObjectKind::Group
        }
    };

    let mut object = SceneObject::new(def.uuid.clone(), kind);
    apply_common(&mut object, def);

    if let Some(id) = scene.add(parent, object) {
        for child in &def.children {
            add_object(scene, id, child, tables);
        }
    }
}

fn mesh_of(def: &ObjectDef, tables: &Tables<'_>) -> MeshInstance {
    let geometry = def
        .geometry
        .as_deref()
        .and_then(|uuid| tables.geometries.get(uuid));

    let mut mesh = match geometry {
        Some(g) => match g.kind.as_str() {
            "PlaneGeometry" => {
                let mut m = MeshInstance::new(MeshShape::Plane);
                m.extent = Vec3::new(g.width.unwrap_or(1.0), 1.0, g.height.unwrap_or(1.0));
                m
            }
            "SphereGeometry" => {
                let mut m = MeshInstance::new(MeshShape::Sphere);
                // Unit sphere geometry has radius 0.5.
                m.extent = Vec3::splat(g.radius.unwrap_or(0.5) * 2.0);
                m
            }
            other => {
                if other != "BoxGeometry" {
                    log::debug!("Geometry type '{}' drawn as a box", other);
                }
                let mut m = MeshInstance::new(MeshShape::Cube);
                m.extent = Vec3::new(
                    g.width.unwrap_or(1.0),
                    g.height.unwrap_or(1.0),
                    g.depth.unwrap_or(1.0),
                );
                m
            }
        },
        None => MeshInstance::new(MeshShape::Cube),
    };

    if let Some(material) = def.material.as_deref().and_then(|uuid| tables.materials.get(uuid)) {
        let color = material.color.unwrap_or(0xffffff);
        mesh.color = hex_to_rgba(color, material.opacity.unwrap_or(1.0));
    }
    mesh
}

fn light_of(def: &ObjectDef, kind: LightKind) -> Light {
    let [r, g, b, _] = hex_to_rgba(def.color.unwrap_or(0xffffff), 1.0);
    Light {
        kind,
        color: [r, g, b],
        intensity: def.intensity.unwrap_or(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_scene() -> Value {
        json!({
            "metadata": { "type": "Object" },
            "geometries": [
                { "uuid": "geo-box", "type": "BoxGeometry", "width": 2.0, "height": 1.0, "depth": 1.0 },
                { "uuid": "geo-ball", "type": "SphereGeometry", "radius": 1.5 }
            ],
            "materials": [
                { "uuid": "mat-red", "type": "MeshStandardMaterial", "color": 0xff0000 }
            ],
            "object": {
                "uuid": "scene-1",
                "type": "Scene",
                "name": "Scene",
                "background": 0x000080,
                "children": [
                    {
                        "uuid": "box-1",
                        "type": "Mesh",
                        "name": "Box",
                        "geometry": "geo-box",
                        "material": "mat-red",
                        "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 3,4,5,1],
                        "userData": { "label": "crate" }
                    },
                    {
                        "uuid": "group-1",
                        "type": "Group",
                        "visible": false,
                        "children": [
                            { "uuid": "ball-1", "type": "Mesh", "geometry": "geo-ball", "position": [1, 0, 0] }
                        ]
                    },
                    { "uuid": "sun", "type": "DirectionalLight", "color": 0xffffff, "intensity": 2.0 }
                ]
            }
        })
    }

    #[test]
    fn test_parse_scene_tree() {
        let scene = ObjectLoader::new().parse_scene(&sample_scene()).unwrap();
        assert_eq!(scene.len(), 5);
        assert_eq!(scene.background, Some(hex_to_rgba(0x000080, 1.0)));

        let box_id = scene.find_by_uuid("box-1").unwrap();
        let object = scene.get(box_id).unwrap();
        assert_eq!(object.name, "Box");
        assert_eq!(object.label.as_deref(), Some("crate"));
        assert_eq!(object.transform.position, Vec3::new(3.0, 4.0, 5.0));
        let mesh = object.mesh().unwrap();
        assert_eq!(mesh.shape, MeshShape::Cube);
        assert_eq!(mesh.extent, Vec3::new(2.0, 1.0, 1.0));
        assert_eq!(mesh.color, [1.0, 0.0, 0.0, 1.0]);

        let ball = scene.find_by_uuid("ball-1").unwrap();
        assert_eq!(scene.get(ball).unwrap().mesh().unwrap().shape, MeshShape::Sphere);
        assert!(!scene.is_visible(ball));
        assert_eq!(scene.lights().count(), 1);
    }

    #[test]
    fn test_scene_without_object_is_error() {
        let err = ObjectLoader::new().parse_scene(&json!({ "geometries": [] })).unwrap_err();
        assert!(matches!(err, PlayerError::Document { kind: "scene", .. }));
    }

    #[test]
    fn test_parse_camera() {
        let doc = json!({
            "object": {
                "uuid": "cam-1",
                "type": "PerspectiveCamera",
                "fov": 60,
                "near": 0.5,
                "far": 500,
                "position": [0, 0, 10]
            }
        });
        let camera = ObjectLoader::new().parse_camera(&doc).unwrap();
        assert_eq!(camera.uuid, "cam-1");
        assert_eq!(camera.fov, 60.0);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 10.0));
        assert!((camera.direction() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_orthographic_camera_is_rejected() {
        let doc = json!({ "object": { "type": "OrthographicCamera" } });
        let err = ObjectLoader::new().parse_camera(&doc).unwrap_err();
        assert!(matches!(err, PlayerError::UnsupportedCamera(kind) if kind == "OrthographicCamera"));
    }

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(rgba_to_hex(hex_to_rgba(0x12ab7f, 1.0)), 0x12ab7f);
    }
}
