//! The player: loads a bundle, binds scripts to lifecycle phases and drives
//! the frame loop.
//!
//! States are Idle and Playing. `play()` fires `start` and installs the frame
//! loop; every `animate()` call while Playing fires `update` and renders;
//! `stop()` fires `stop` and removes the loop. Hosts call `animate()` once
//! per display frame for as long as it returns `true`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bundle::Bundle;
use crate::camera::PerspectiveCamera;
use crate::clock::{Clock, MonotonicClock};
use crate::config::PlayerConfig;
use crate::controls::{ControlInput, ControlSurface, OrbitControls};
use crate::error::PlayerError;
use crate::events::{EventTable, LifecycleEvent, LifecyclePhase};
use crate::labels::{LabelRenderer, ScreenLabel};
use crate::loader::ObjectLoader;
use crate::render::{FrameCapture, HeadlessRenderer, RenderInfo, RenderSettings, Renderer};
use crate::scene_graph::SceneGraph;
use crate::script_api::{
    CameraRef, ObjectRef, PlayerRef, PlayerStatus, RendererRef, SceneRef, SharedCamera, SharedScene,
};
use crate::script_diagnostics::ScriptDiagnostic;
use crate::script_log::reset_frame_log_count;
use crate::scripting::{ScriptContext, ScriptHost};

/// Installed while Playing. Times are clock readings in milliseconds.
#[derive(Debug, Clone, Copy)]
struct FrameLoop {
    start_time: f64,
    prev_time: f64,
}

pub struct Player {
    config: PlayerConfig,
    renderer: Box<dyn Renderer>,
    overlay: Option<LabelRenderer>,
    clock: Box<dyn Clock>,
    scripts: ScriptHost,
    events: EventTable,
    scene: Option<SharedScene>,
    camera: Option<SharedCamera>,
    controls: Option<OrbitControls>,
    settings: Rc<RefCell<RenderSettings>>,
    status: Rc<RefCell<PlayerStatus>>,
    frame_loop: Option<FrameLoop>,
}

impl Player {
    pub fn new(config: PlayerConfig, mut renderer: Box<dyn Renderer>, clock: Box<dyn Clock>) -> Self {
        renderer.set_pixel_ratio(config.pixel_ratio);
        renderer.set_size(config.width, config.height);

        let overlay = config
            .label_overlay
            .then(|| LabelRenderer::new(config.width, config.height));
        let settings = RenderSettings {
            width: config.width,
            height: config.height,
            pixel_ratio: config.pixel_ratio,
            ..Default::default()
        };
        let status = PlayerStatus {
            width: config.width,
            height: config.height,
            ..Default::default()
        };

        Self {
            config,
            renderer,
            overlay,
            clock,
            scripts: ScriptHost::new(),
            events: EventTable::new(),
            scene: None,
            camera: None,
            controls: None,
            settings: Rc::new(RefCell::new(settings)),
            status: Rc::new(RefCell::new(status)),
            frame_loop: None,
        }
    }

    /// Player backed by the draw-list renderer and the wall clock.
    pub fn headless(config: PlayerConfig) -> Self {
        let renderer = HeadlessRenderer::new(config.width, config.height);
        Self::new(config, Box::new(renderer), Box::new(MonotonicClock::new()))
    }

    /// Replace the scene and camera with the bundle's, bind its scripts and
    /// fire `init`.
    ///
    /// If binding or an `init` handler fails, the error is returned and every
    /// handler of the bundle is dropped, leaving the new scene and camera
    /// with no scripts attached.
    pub fn load(&mut self, bundle: &Bundle) -> Result<(), PlayerError> {
        let loader = ObjectLoader::new();
        let scene = loader.parse_scene(&bundle.scene)?;
        let camera = loader.parse_camera(&bundle.camera)?;

        if let Some(project) = &bundle.project {
            let mut settings = self.settings.borrow_mut();
            settings.shadows = project.shadows;
            settings.tone_mapping = project.tone_mapping;
            settings.exposure = project.tone_mapping_exposure.unwrap_or(1.0);
        }

        self.set_scene(scene);
        self.set_camera(camera);
        self.controls = Some(OrbitControls::new(
            self.config.effective_controls_surface(),
            self.config.orbit.clone(),
        ));

        self.clear_scripts();
        if let Err(e) = self.bind_scripts(bundle) {
            self.clear_scripts();
            return Err(e);
        }

        log::info!(
            "loaded bundle: {} objects, {} scripts, handlers init={} start={} stop={} update={}",
            self.scene.as_ref().map_or(0, |s| s.borrow().len()),
            self.scripts.len(),
            self.events.len(LifecyclePhase::Init),
            self.events.len(LifecyclePhase::Start),
            self.events.len(LifecyclePhase::Stop),
            self.events.len(LifecyclePhase::Update),
        );

        if let Err(e) = self.dispatch(&LifecycleEvent::Init) {
            self.clear_scripts();
            return Err(e);
        }
        Ok(())
    }

    fn clear_scripts(&mut self) {
        self.events.clear();
        self.scripts.clear();
    }

    fn bind_scripts(&mut self, bundle: &Bundle) -> Result<(), PlayerError> {
        let (Some(scene), Some(camera)) = (self.scene.clone(), self.camera.clone()) else {
            return Err(PlayerError::NotLoaded);
        };
        let ctx = ScriptContext {
            player: PlayerRef::new(self.status.clone()),
            renderer: RendererRef::new(self.settings.clone()),
            scene: SceneRef::new(scene.clone()),
            camera: CameraRef::new(camera),
        };

        for entry in &bundle.scripts {
            let Some(id) = scene.borrow().find_by_uuid(&entry.object) else {
                self.scripts.warn(
                    &entry.object,
                    format!("target not found in scene; skipping {} script(s)", entry.scripts.len()),
                );
                continue;
            };

            for (index, script) in entry.scripts.iter().enumerate() {
                let label = match &script.name {
                    Some(name) => format!("{}/{}", entry.object, name),
                    None => format!("{}/{}", entry.object, index),
                };
                let object = ObjectRef::new(scene.clone(), id);
                for (phase, handler) in self.scripts.bind(&label, &script.source, object, &ctx)? {
                    self.events.push(phase, handler);
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: &LifecycleEvent) -> Result<(), PlayerError> {
        let scripts = &mut self.scripts;
        self.events
            .dispatch(event.phase(), |handler| scripts.invoke(handler, event))
    }

    pub fn set_scene(&mut self, scene: SceneGraph) {
        self.scene = Some(Rc::new(RefCell::new(scene)));
    }

    pub fn set_camera(&mut self, mut camera: PerspectiveCamera) {
        camera.aspect = self.config.width as f32 / self.config.height.max(1) as f32;
        camera.update_projection_matrix();
        self.camera = Some(Rc::new(RefCell::new(camera)));
    }

    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        self.config.pixel_ratio = ratio;
        self.settings.borrow_mut().pixel_ratio = ratio;
        self.renderer.set_pixel_ratio(ratio);
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;

        if let Some(camera) = &self.camera {
            let mut camera = camera.borrow_mut();
            camera.aspect = width as f32 / height.max(1) as f32;
            camera.update_projection_matrix();
        }

        self.renderer.set_size(width, height);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.set_size(width, height);
        }

        {
            let mut settings = self.settings.borrow_mut();
            settings.width = width;
            settings.height = height;
        }
        let mut status = self.status.borrow_mut();
        status.width = width;
        status.height = height;
    }

    /// Fire `start` and install the frame loop. Calling it while already
    /// playing fires `start` again and restarts the clock.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        let now = self.clock.now();
        self.dispatch(&LifecycleEvent::Start)?;
        self.frame_loop = Some(FrameLoop {
            start_time: now,
            prev_time: now,
        });
        self.status.borrow_mut().playing = true;
        log::debug!("playback started at {now:.1}ms");
        Ok(())
    }

    /// Fire `stop` and remove the frame loop. The loop is removed even if a
    /// `stop` handler fails; that error is still returned.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        let result = self.dispatch(&LifecycleEvent::Stop);
        self.frame_loop = None;
        {
            let mut status = self.status.borrow_mut();
            status.playing = false;
            status.stop_requested = false;
        }
        log::debug!("playback stopped");
        result
    }

    /// Run one frame of the loop. Returns whether the player is still
    /// playing afterwards; does nothing while Idle.
    pub fn animate(&mut self) -> bool {
        let Some(frame) = self.frame_loop else {
            return false;
        };
        let now = self.clock.now();
        reset_frame_log_count();

        let event = LifecycleEvent::Update {
            time: now - frame.start_time,
            delta: now - frame.prev_time,
        };
        if let Err(e) = self.dispatch(&event) {
            log::error!("{e}\n{}", e.trace());
        }
        if let Err(e) = self.render_frame() {
            log::error!("{e}");
        }
        if let Some(frame) = self.frame_loop.as_mut() {
            frame.prev_time = now;
        }

        self.honour_stop_request();
        self.frame_loop.is_some()
    }

    /// Step render outside the loop: fire `update` for `time` seconds with a
    /// zero delta, then render once.
    pub fn render(&mut self, time: f64) -> Result<(), PlayerError> {
        reset_frame_log_count();
        self.dispatch(&LifecycleEvent::Update {
            time: time * 1000.0,
            delta: 0.0,
        })?;
        self.render_frame()?;
        self.honour_stop_request();
        Ok(())
    }

    fn honour_stop_request(&mut self) {
        if !self.status.borrow_mut().take_stop_request() || self.frame_loop.is_none() {
            return;
        }
        log::debug!("stop requested by script");
        if let Err(e) = self.stop() {
            log::error!("{e}\n{}", e.trace());
        }
    }

    fn render_frame(&mut self) -> Result<(), PlayerError> {
        let (Some(scene), Some(camera)) = (&self.scene, &self.camera) else {
            return Err(PlayerError::NotLoaded);
        };
        let scene = scene.borrow();
        let camera = camera.borrow();
        self.renderer.render(&scene, &camera, &self.settings.borrow())?;
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.render(&scene, &camera);
        }
        Ok(())
    }

    /// Release renderer resources and drop the scene, camera and handlers.
    pub fn dispose(&mut self) {
        self.frame_loop = None;
        self.status.borrow_mut().playing = false;
        self.renderer.dispose();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.dispose();
        }
        self.clear_scripts();
        self.controls = None;
        self.scene = None;
        self.camera = None;
    }

    pub fn is_playing(&self) -> bool {
        self.frame_loop.is_some()
    }

    /// Feed pointer input to the orbit controls. Returns whether the camera
    /// moved.
    pub fn handle_pointer(&mut self, surface: ControlSurface, input: ControlInput) -> bool {
        let (Some(controls), Some(camera)) = (self.controls.as_mut(), &self.camera) else {
            return false;
        };
        let height = self.settings.borrow().height as f32;
        controls.handle(&mut camera.borrow_mut(), surface, input, height)
    }

    /// Labels projected during the last render; empty without an overlay.
    pub fn labels(&self) -> &[ScreenLabel] {
        match &self.overlay {
            Some(overlay) => overlay.labels(),
            None => &[],
        }
    }

    pub fn take_diagnostics(&mut self) -> Vec<ScriptDiagnostic> {
        self.scripts.take_diagnostics()
    }

    pub fn render_info(&self) -> RenderInfo {
        self.renderer.info()
    }

    pub fn handler_count(&self, phase: LifecyclePhase) -> usize {
        self.events.len(phase)
    }

    /// Pixels of the last rendered frame, if the renderer keeps them.
    pub fn capture_frame(&mut self) -> Result<Option<FrameCapture>, PlayerError> {
        self.renderer.capture()
    }

    pub fn scene(&self) -> Option<SharedScene> {
        self.scene.clone()
    }

    pub fn camera(&self) -> Option<SharedCamera> {
        self.camera.clone()
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings.borrow().clone()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}
