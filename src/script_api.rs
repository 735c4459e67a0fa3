//! Host types exposed to Rhai scripts.
//!
//! Every handle is a cheap clone around shared state, so scripts always see
//! the live scene and camera rather than a snapshot. Chained writes such as
//! `object.position.x += 1.0` go through the property getter, mutate the
//! returned `Vector3`, and are written back by Rhai through the setter.
//!
//! Scope variables visible to every script:
//! - `player`: `width`, `height`, `playing`, `stop()`
//! - `renderer`: `width`, `height`, `pixel_ratio`, `clear_color`
//! - `scene`: `get_object_by_name(name)`, `get_object_by_uuid(uuid)`, `root`,
//!   `object_count`, `background`
//! - `camera`: `position`, `fov`, `near`, `far`, `aspect`, `zoom`, `look_at(v)`
//! - `object`: the scene object that owns the script
//! - `log`: `info(value)`, `warn(value)`, `error(value)`

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use glam::Vec3;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Position, FLOAT, INT};

use crate::camera::PerspectiveCamera;
use crate::loader::{hex_to_rgba, rgba_to_hex};
use crate::render::RenderSettings;
use crate::scene_graph::{ObjectId, SceneGraph, SceneObject, Transform};

pub type SharedScene = Rc<RefCell<SceneGraph>>;
pub type SharedCamera = Rc<RefCell<PerspectiveCamera>>;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

fn number(value: &Dynamic, what: &str) -> ScriptResult<f32> {
    if let Ok(f) = value.as_float() {
        return Ok(f as f32);
    }
    if let Ok(i) = value.as_int() {
        return Ok(i as f32);
    }
    Err(format!("{what} expects a number, got {}", value.type_name()).into())
}

fn hex_color(value: INT) -> ScriptResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v <= 0xff_ff_ff)
        .ok_or_else(|| {
            Box::new(EvalAltResult::ErrorArithmetic(
                format!("colour {value:#x} is outside 0x000000..=0xffffff"),
                Position::NONE,
            ))
        })
}

/// Reference to one object in the live scene graph.
#[derive(Clone)]
pub struct ObjectRef {
    scene: SharedScene,
    id: ObjectId,
}

impl ObjectRef {
    pub fn new(scene: SharedScene, id: ObjectId) -> Self {
        Self { scene, id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    fn read<T: Default>(&self, f: impl FnOnce(&SceneObject) -> T) -> T {
        self.scene.borrow().get(self.id).map(f).unwrap_or_default()
    }

    fn write(&self, f: impl FnOnce(&mut SceneObject)) {
        if let Some(object) = self.scene.borrow_mut().get_mut(self.id) {
            f(object);
        }
    }

    fn transform(&self) -> Transform {
        self.read(|o| o.transform)
    }

    fn related(&self, id: Option<ObjectId>) -> Dynamic {
        match id {
            Some(id) => Dynamic::from(ObjectRef::new(self.scene.clone(), id)),
            None => Dynamic::UNIT,
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.id).finish()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, uuid) = self.read(|o| (o.name.clone(), o.uuid.clone()));
        write!(f, "Object3D({name:?}, {uuid})")
    }
}

/// The loaded scene as seen from scripts.
#[derive(Clone)]
pub struct SceneRef {
    scene: SharedScene,
}

impl SceneRef {
    pub fn new(scene: SharedScene) -> Self {
        Self { scene }
    }

    fn object(&self, id: Option<ObjectId>) -> Dynamic {
        match id {
            Some(id) => Dynamic::from(ObjectRef::new(self.scene.clone(), id)),
            None => Dynamic::UNIT,
        }
    }
}

/// The active camera as seen from scripts.
#[derive(Clone)]
pub struct CameraRef {
    camera: SharedCamera,
}

impl CameraRef {
    pub fn new(camera: SharedCamera) -> Self {
        Self { camera }
    }

    fn set_lens(&self, f: impl FnOnce(&mut PerspectiveCamera)) {
        let mut camera = self.camera.borrow_mut();
        f(&mut camera);
        camera.update_projection_matrix();
    }
}

/// Output surface settings as seen from scripts.
#[derive(Clone)]
pub struct RendererRef {
    settings: Rc<RefCell<RenderSettings>>,
}

impl RendererRef {
    pub fn new(settings: Rc<RefCell<RenderSettings>>) -> Self {
        Self { settings }
    }
}

/// Player state mirrored for scripts.
#[derive(Debug, Clone, Default)]
pub struct PlayerStatus {
    pub width: u32,
    pub height: u32,
    pub playing: bool,
    pub stop_requested: bool,
}

impl PlayerStatus {
    /// Returns whether a script asked to stop since the last call.
    pub fn take_stop_request(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }
}

/// The player as seen from scripts. `stop()` is deferred: the player
/// honours it once the current frame has finished.
#[derive(Clone)]
pub struct PlayerRef {
    status: Rc<RefCell<PlayerStatus>>,
}

impl PlayerRef {
    pub fn new(status: Rc<RefCell<PlayerStatus>>) -> Self {
        Self { status }
    }
}

fn register_vector(engine: &mut Engine) {
    engine
        .register_type_with_name::<Vec3>("Vector3")
        .register_fn("vec3", |x: Dynamic, y: Dynamic, z: Dynamic| -> ScriptResult<Vec3> {
            Ok(Vec3::new(number(&x, "vec3")?, number(&y, "vec3")?, number(&z, "vec3")?))
        })
        .register_get("x", |v: &mut Vec3| v.x as FLOAT)
        .register_get("y", |v: &mut Vec3| v.y as FLOAT)
        .register_get("z", |v: &mut Vec3| v.z as FLOAT)
        .register_set("x", |v: &mut Vec3, x: FLOAT| v.x = x as f32)
        .register_set("y", |v: &mut Vec3, y: FLOAT| v.y = y as f32)
        .register_set("z", |v: &mut Vec3, z: FLOAT| v.z = z as f32)
        .register_set("x", |v: &mut Vec3, x: INT| v.x = x as f32)
        .register_set("y", |v: &mut Vec3, y: INT| v.y = y as f32)
        .register_set("z", |v: &mut Vec3, z: INT| v.z = z as f32)
        .register_fn("set", |v: &mut Vec3, x: Dynamic, y: Dynamic, z: Dynamic| -> ScriptResult<()> {
            *v = Vec3::new(number(&x, "set")?, number(&y, "set")?, number(&z, "set")?);
            Ok(())
        })
        .register_fn("length", |v: &mut Vec3| v.length() as FLOAT)
        .register_fn("normalize", |v: &mut Vec3| v.normalize_or_zero())
        .register_fn("dot", |a: Vec3, b: Vec3| a.dot(b) as FLOAT)
        .register_fn("cross", |a: Vec3, b: Vec3| a.cross(b))
        .register_fn("+", |a: Vec3, b: Vec3| a + b)
        .register_fn("-", |a: Vec3, b: Vec3| a - b)
        .register_fn("*", |a: Vec3, s: FLOAT| a * s as f32)
        .register_fn("*", |a: Vec3, s: INT| a * s as f32)
        .register_fn("==", |a: Vec3, b: Vec3| a == b)
        .register_fn("to_string", |v: &mut Vec3| format!("({}, {}, {})", v.x, v.y, v.z))
        .register_fn("to_debug", |v: &mut Vec3| format!("Vector3({}, {}, {})", v.x, v.y, v.z));
}

fn register_object(engine: &mut Engine) {
    engine
        .register_type_with_name::<ObjectRef>("Object3D")
        .register_get_set(
            "position",
            |o: &mut ObjectRef| o.transform().position,
            |o: &mut ObjectRef, v: Vec3| o.write(|obj| obj.transform.position = v),
        )
        .register_get_set(
            "rotation",
            |o: &mut ObjectRef| o.transform().rotation,
            |o: &mut ObjectRef, v: Vec3| o.write(|obj| obj.transform.rotation = v),
        )
        .register_get_set(
            "scale",
            |o: &mut ObjectRef| o.transform().scale,
            |o: &mut ObjectRef, v: Vec3| o.write(|obj| obj.transform.scale = v),
        )
        .register_get_set(
            "visible",
            |o: &mut ObjectRef| o.read(|obj| obj.visible),
            |o: &mut ObjectRef, v: bool| o.write(|obj| obj.visible = v),
        )
        .register_get("name", |o: &mut ObjectRef| o.read(|obj| obj.name.clone()))
        .register_set("name", |o: &mut ObjectRef, v: ImmutableString| {
            o.write(|obj| obj.name = v.to_string())
        })
        .register_get("uuid", |o: &mut ObjectRef| o.read(|obj| obj.uuid.clone()))
        .register_get("label", |o: &mut ObjectRef| {
            o.read(|obj| obj.label.clone())
                .map(Dynamic::from)
                .unwrap_or(Dynamic::UNIT)
        })
        .register_set("label", |o: &mut ObjectRef, v: ImmutableString| {
            o.write(|obj| obj.label = Some(v.to_string()))
        })
        .register_set("label", |o: &mut ObjectRef, _: ()| o.write(|obj| obj.label = None))
        .register_get("color", |o: &mut ObjectRef| {
            o.read(|obj| obj.mesh().map(|m| rgba_to_hex(m.color) as INT))
                .map(Dynamic::from_int)
                .unwrap_or(Dynamic::UNIT)
        })
        .register_set("color", |o: &mut ObjectRef, v: INT| -> ScriptResult<()> {
            let hex = hex_color(v)?;
            o.write(|obj| {
                if let Some(mesh) = obj.mesh_mut() {
                    mesh.color = hex_to_rgba(hex, mesh.color[3]);
                }
            });
            Ok(())
        })
        .register_get("parent", |o: &mut ObjectRef| {
            let parent = o.read(|obj| obj.parent());
            o.related(parent)
        })
        .register_get("children", |o: &mut ObjectRef| {
            let children = o.read(|obj| obj.children().to_vec());
            children
                .into_iter()
                .map(|id| o.related(Some(id)))
                .collect::<Array>()
        })
        .register_fn("==", |a: ObjectRef, b: ObjectRef| {
            Rc::ptr_eq(&a.scene, &b.scene) && a.id == b.id
        })
        .register_fn("to_string", |o: &mut ObjectRef| o.to_string())
        .register_fn("to_debug", |o: &mut ObjectRef| o.to_string());
}

fn register_scene(engine: &mut Engine) {
    engine
        .register_type_with_name::<SceneRef>("Scene")
        .register_fn("get_object_by_name", |s: &mut SceneRef, name: ImmutableString| {
            let id = s.scene.borrow().find_by_name(&name);
            s.object(id)
        })
        .register_fn("get_object_by_uuid", |s: &mut SceneRef, uuid: ImmutableString| {
            let id = s.scene.borrow().find_by_uuid(&uuid);
            s.object(id)
        })
        .register_get("root", |s: &mut SceneRef| {
            let root = s.scene.borrow().root();
            ObjectRef::new(s.scene.clone(), root)
        })
        .register_get("object_count", |s: &mut SceneRef| s.scene.borrow().len() as INT)
        .register_get("background", |s: &mut SceneRef| {
            s.scene
                .borrow()
                .background
                .map(|c| Dynamic::from_int(rgba_to_hex(c) as INT))
                .unwrap_or(Dynamic::UNIT)
        })
        .register_set("background", |s: &mut SceneRef, v: INT| -> ScriptResult<()> {
            let hex = hex_color(v)?;
            s.scene.borrow_mut().background = Some(hex_to_rgba(hex, 1.0));
            Ok(())
        })
        .register_set("background", |s: &mut SceneRef, _: ()| {
            s.scene.borrow_mut().background = None;
        });
}

fn register_camera(engine: &mut Engine) {
    engine
        .register_type_with_name::<CameraRef>("Camera")
        .register_get_set(
            "position",
            |c: &mut CameraRef| c.camera.borrow().position,
            |c: &mut CameraRef, v: Vec3| c.camera.borrow_mut().position = v,
        )
        .register_get("fov", |c: &mut CameraRef| c.camera.borrow().fov as FLOAT)
        .register_get("near", |c: &mut CameraRef| c.camera.borrow().near as FLOAT)
        .register_get("far", |c: &mut CameraRef| c.camera.borrow().far as FLOAT)
        .register_get("aspect", |c: &mut CameraRef| c.camera.borrow().aspect as FLOAT)
        .register_get("zoom", |c: &mut CameraRef| c.camera.borrow().zoom as FLOAT)
        .register_set("fov", |c: &mut CameraRef, v: Dynamic| -> ScriptResult<()> {
            let v = number(&v, "fov")?;
            c.set_lens(|cam| cam.fov = v);
            Ok(())
        })
        .register_set("near", |c: &mut CameraRef, v: Dynamic| -> ScriptResult<()> {
            let v = number(&v, "near")?;
            c.set_lens(|cam| cam.near = v);
            Ok(())
        })
        .register_set("far", |c: &mut CameraRef, v: Dynamic| -> ScriptResult<()> {
            let v = number(&v, "far")?;
            c.set_lens(|cam| cam.far = v);
            Ok(())
        })
        .register_set("zoom", |c: &mut CameraRef, v: Dynamic| -> ScriptResult<()> {
            let v = number(&v, "zoom")?;
            c.set_lens(|cam| cam.zoom = v);
            Ok(())
        })
        .register_fn("look_at", |c: &mut CameraRef, target: Vec3| {
            c.camera.borrow_mut().look_at(target)
        })
        .register_fn(
            "look_at",
            |c: &mut CameraRef, x: Dynamic, y: Dynamic, z: Dynamic| -> ScriptResult<()> {
                let target = Vec3::new(number(&x, "look_at")?, number(&y, "look_at")?, number(&z, "look_at")?);
                c.camera.borrow_mut().look_at(target);
                Ok(())
            },
        );
}

fn register_renderer(engine: &mut Engine) {
    engine
        .register_type_with_name::<RendererRef>("Renderer")
        .register_get("width", |r: &mut RendererRef| r.settings.borrow().width as INT)
        .register_get("height", |r: &mut RendererRef| r.settings.borrow().height as INT)
        .register_get("pixel_ratio", |r: &mut RendererRef| {
            r.settings.borrow().pixel_ratio as FLOAT
        })
        .register_get_set(
            "clear_color",
            |r: &mut RendererRef| rgba_to_hex(r.settings.borrow().clear_color) as INT,
            |r: &mut RendererRef, v: INT| -> ScriptResult<()> {
                let hex = hex_color(v)?;
                r.settings.borrow_mut().clear_color = hex_to_rgba(hex, 1.0);
                Ok(())
            },
        );
}

fn register_player(engine: &mut Engine) {
    engine
        .register_type_with_name::<PlayerRef>("Player")
        .register_get("width", |p: &mut PlayerRef| p.status.borrow().width as INT)
        .register_get("height", |p: &mut PlayerRef| p.status.borrow().height as INT)
        .register_get("playing", |p: &mut PlayerRef| p.status.borrow().playing)
        .register_fn("stop", |p: &mut PlayerRef| {
            p.status.borrow_mut().stop_requested = true;
        });
}

/// Register every host type scripts can reach through their scope.
pub fn register_script_api(engine: &mut Engine) {
    register_vector(engine);
    register_object(engine);
    register_scene(engine);
    register_camera(engine);
    register_renderer(engine);
    register_player(engine);
}
