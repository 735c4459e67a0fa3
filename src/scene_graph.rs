//! Scene graph for loaded scenes.
//!
//! This module provides the object tree that the loader builds from a scene
//! document. Objects keep the uuid they were authored with so scripts can be
//! attached to them by identity.

use std::collections::HashMap;

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Unique identifier for scene objects within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

/// Shared geometry available to meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshShape {
    Cube,
    /// Unit plane in the XZ plane (Y up).
    Plane,
    Sphere,
}

/// Transform component for scene objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3, // Euler angles in radians, XYZ order
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Decompose a column-major object matrix.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        Self {
            position,
            rotation: Vec3::new(x, y, z),
            scale,
        }
    }

    /// Model = Translation * Rotation * Scale
    pub fn local_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// A mesh instance - references shared geometry with its own size and colour.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    pub shape: MeshShape,
    /// Geometry size relative to the unit shape.
    pub extent: Vec3,
    pub color: [f32; 4], // RGBA color
}

impl MeshInstance {
    pub fn new(shape: MeshShape) -> Self {
        Self {
            shape,
            extent: Vec3::ONE,
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Group,
    Mesh(MeshInstance),
    Light(Light),
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub uuid: String,
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Transform,
    pub visible: bool,
    /// Text shown by the label overlay, if any.
    pub label: Option<String>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
}

impl SceneObject {
    pub fn new(uuid: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            uuid: uuid.into(),
            name: String::new(),
            kind,
            transform: Transform::default(),
            visible: true,
            label: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    pub fn mesh(&self) -> Option<&MeshInstance> {
        match &self.kind {
            ObjectKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn mesh_mut(&mut self) -> Option<&mut MeshInstance> {
        match &mut self.kind {
            ObjectKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// The scene graph - an object tree rooted at the scene object.
#[derive(Debug, Clone)]
pub struct SceneGraph {
    objects: HashMap<ObjectId, SceneObject>,
    root: ObjectId,
    next_id: u64,
    /// Clear colour override, RGBA.
    pub background: Option<[f32; 4]>,
}

impl SceneGraph {
    /// Create a graph containing only a root object with the given uuid.
    pub fn new(root_uuid: impl Into<String>) -> Self {
        let root = ObjectId(1);
        let mut objects = HashMap::new();
        objects.insert(root, SceneObject::new(root_uuid, ObjectKind::Group));
        Self {
            objects,
            root,
            next_id: 2,
            background: None,
        }
    }

    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Attach `object` under `parent` and return its ID.
    /// Returns None if the parent does not exist.
    pub fn add(&mut self, parent: ObjectId, mut object: SceneObject) -> Option<ObjectId> {
        if !self.objects.contains_key(&parent) {
            return None;
        }
        let id = ObjectId(self.next_id);
        self.next_id += 1;

        object.parent = Some(parent);
        object.children.clear();
        self.objects.insert(id, object);
        if let Some(parent_obj) = self.objects.get_mut(&parent) {
            parent_obj.children.push(id);
        }
        Some(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All object IDs in depth-first pre-order, children in insertion order.
    pub fn traverse(&self) -> Vec<ObjectId> {
        let mut order = Vec::with_capacity(self.objects.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(object) = self.objects.get(&id) {
                stack.extend(object.children.iter().rev().copied());
            }
        }
        order
    }

    /// First object (depth-first from the root) with the given uuid.
    pub fn find_by_uuid(&self, uuid: &str) -> Option<ObjectId> {
        self.traverse()
            .into_iter()
            .find(|id| self.objects.get(id).is_some_and(|o| o.uuid == uuid))
    }

    /// First object (depth-first from the root) with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.traverse()
            .into_iter()
            .find(|id| self.objects.get(id).is_some_and(|o| o.name == name))
    }

    /// Compute the world matrix for an object, walking up the parent chain.
    pub fn world_matrix(&self, id: ObjectId) -> Mat4 {
        let object = match self.objects.get(&id) {
            Some(o) => o,
            None => return Mat4::IDENTITY,
        };
        let local = object.transform.local_matrix();
        match object.parent {
            Some(parent) => self.world_matrix(parent) * local,
            None => local,
        }
    }

    /// An object is visible only if it and all of its ancestors are.
    pub fn is_visible(&self, id: ObjectId) -> bool {
        let object = match self.objects.get(&id) {
            Some(o) => o,
            None => return false,
        };
        if !object.visible {
            return false;
        }
        match object.parent {
            Some(parent) => self.is_visible(parent),
            None => true,
        }
    }

    /// Visible meshes with their world matrices, in traversal order.
    pub fn visible_meshes(&self) -> Vec<(ObjectId, &MeshInstance, Mat4)> {
        self.traverse()
            .into_iter()
            .filter(|id| self.is_visible(*id))
            .filter_map(|id| {
                let mesh = self.objects.get(&id)?.mesh()?;
                Some((id, mesh, self.world_matrix(id)))
            })
            .collect()
    }

    /// Lights anywhere in the graph.
    pub fn lights(&self) -> impl Iterator<Item = (ObjectId, &Light)> {
        self.objects.iter().filter_map(|(id, object)| match &object.kind {
            ObjectKind::Light(light) => Some((*id, light)),
            _ => None,
        })
    }
}
