//! Rhai scripting integration for the player.
//!
//! Each script attached to a scene object is compiled into its own AST and
//! evaluated once, with `player`, `renderer`, `scene`, `camera`, `object`
//! and `log` in scope. A script provides lifecycle handlers in one of two
//! ways:
//!
//! - its final expression is a map from phase name to function pointer,
//!   e.g. `#{ update: |event| this.position.x += event.delta }`
//! - otherwise, top-level functions named `init`, `start`, `stop` or
//!   `update` are bound.
//!
//! Handlers run with `this` bound to the owning object and the script's own
//! scope, so top-level `let` variables persist between calls. Arguments
//! depend on the declared parameter count: none, `(event)`, or
//! `(object, event)`.

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Scope, AST};

use crate::error::PlayerError;
use crate::events::{Handler, LifecycleEvent, LifecyclePhase};
use crate::script_api::{register_script_api, CameraRef, ObjectRef, PlayerRef, RendererRef, SceneRef};
use crate::script_diagnostics::{bind_warning, from_eval_error, from_parse_error, ScriptDiagnostic, ScriptPhase};
use crate::script_log::{register_log_api, ScriptLogger, SCRIPT_LOG_TARGET};

/// Arity assumed when a function pointer's definition cannot be found.
const DEFAULT_ARITY: usize = 2;

const MAX_DIAGNOSTICS: usize = 32;

/// Handles shared by every script bound during one load.
#[derive(Clone)]
pub struct ScriptContext {
    pub player: PlayerRef,
    pub renderer: RendererRef,
    pub scene: SceneRef,
    pub camera: CameraRef,
}

struct CompiledScript {
    label: String,
    ast: AST,
    scope: Scope<'static>,
}

/// Owns the Rhai engine and every compiled script of the current load.
pub struct ScriptHost {
    engine: Engine,
    scripts: Vec<CompiledScript>,
    diagnostics: Vec<ScriptDiagnostic>,
}

impl ScriptHost {
    /// Create a new script host with sandboxed settings.
    pub fn new() -> Self {
        let mut engine = Engine::new();

        // Sandbox settings
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(64);
        engine.set_max_operations(100_000); // Prevent infinite loops
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(1_000);
        engine.set_max_map_size(500);

        engine.on_print(|text| log::info!(target: SCRIPT_LOG_TARGET, "{text}"));
        engine.on_debug(|text, source, pos| {
            log::debug!(target: SCRIPT_LOG_TARGET, "{} @ {pos}: {text}", source.unwrap_or("script"))
        });

        register_log_api(&mut engine);
        register_script_api(&mut engine);

        Self {
            engine,
            scripts: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Number of compiled scripts currently held.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Drop every compiled script. Handlers bound earlier become invalid.
    pub fn clear(&mut self) {
        self.scripts.clear();
    }

    /// Drain diagnostics collected since the last call.
    pub fn take_diagnostics(&mut self) -> Vec<ScriptDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn push_diagnostic(&mut self, diag: ScriptDiagnostic) {
        // Keep a bounded queue so repeated runtime errors don't grow without limit.
        self.diagnostics.push(diag);
        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() - MAX_DIAGNOSTICS;
            self.diagnostics.drain(0..excess);
        }
    }

    /// Log a binding warning and keep it as a diagnostic.
    pub(crate) fn warn(&mut self, label: &str, message: String) {
        log::warn!("script `{label}`: {message}");
        self.push_diagnostic(bind_warning(label, message));
    }

    /// Compile and evaluate `source`, returning the handlers it provides in
    /// the order they should be registered.
    pub fn bind(
        &mut self,
        label: &str,
        source: &str,
        object: ObjectRef,
        ctx: &ScriptContext,
    ) -> Result<Vec<(LifecyclePhase, Handler)>, PlayerError> {
        let mut ast = match self.engine.compile(source) {
            Ok(ast) => ast,
            Err(e) => {
                self.push_diagnostic(from_parse_error(label, &e));
                return Err(PlayerError::ScriptCompile {
                    script: label.to_string(),
                    message: e.to_string(),
                });
            }
        };
        ast.set_source(label);

        let mut scope = Scope::new();
        scope.push("player", ctx.player.clone());
        scope.push("renderer", ctx.renderer.clone());
        scope.push("scene", ctx.scene.clone());
        scope.push("camera", ctx.camera.clone());
        scope.push("object", object.clone());
        scope.push("log", ScriptLogger::new());

        let value = match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
            Ok(value) => value,
            Err(e) => {
                self.push_diagnostic(from_eval_error(label, ScriptPhase::Bind, &e));
                return Err(PlayerError::ScriptEval {
                    script: label.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let callbacks = self.collect_callbacks(label, &ast, value);
        let index = self.scripts.len();
        let handlers = callbacks
            .into_iter()
            .map(|(phase, callback)| {
                let arity = callback_arity(&ast, &callback);
                let handler = Handler {
                    callback,
                    object: object.clone(),
                    script: index,
                    arity,
                };
                (phase, handler)
            })
            .collect();

        self.scripts.push(CompiledScript {
            label: label.to_string(),
            ast,
            scope,
        });
        Ok(handlers)
    }

    fn collect_callbacks(&mut self, label: &str, ast: &AST, value: Dynamic) -> Vec<(LifecyclePhase, FnPtr)> {
        if let Some(map) = value.clone().try_cast::<rhai::Map>() {
            let mut callbacks = Vec::new();
            for (key, entry) in map {
                let phase = match key.parse::<LifecyclePhase>() {
                    Ok(phase) => phase,
                    Err(e) => {
                        self.warn(label, format!("{e}; entry ignored"));
                        continue;
                    }
                };
                if entry.is_unit() {
                    continue;
                }
                match entry.try_cast::<FnPtr>() {
                    Some(fn_ptr) => callbacks.push((phase, fn_ptr)),
                    None => self.warn(label, format!("`{phase}` is not a function; entry ignored")),
                }
            }
            return callbacks;
        }

        if !value.is_unit() {
            self.warn(
                label,
                format!("script evaluated to a {}, expected a handler map", value.type_name()),
            );
        }

        let mut callbacks = Vec::new();
        for phase in LifecyclePhase::ALL {
            if ast.iter_functions().any(|f| f.name == phase.as_str()) {
                match FnPtr::new(phase.as_str()) {
                    Ok(fn_ptr) => callbacks.push((phase, fn_ptr)),
                    Err(e) => self.warn(label, e.to_string()),
                }
            }
        }
        callbacks
    }

    /// Run one handler with `event`.
    pub fn invoke(&mut self, handler: &Handler, event: &LifecycleEvent) -> Result<(), PlayerError> {
        let phase = event.phase();
        let Some(script) = self.scripts.get_mut(handler.script) else {
            return Err(PlayerError::Handler {
                phase,
                script: format!("#{}", handler.script),
                message: "handler outlived its script".to_string(),
                trace: String::new(),
            });
        };

        let mut args: Vec<Dynamic> = handler.callback.curry().to_vec();
        match handler.arity {
            0 => {}
            1 => args.push(event.to_dynamic()),
            _ => {
                args.push(Dynamic::from(handler.object.clone()));
                args.push(event.to_dynamic());
            }
        }

        let mut this = Dynamic::from(handler.object.clone());
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut this);

        let result = self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut script.scope,
            &script.ast,
            handler.callback.fn_name(),
            args,
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let label = script.label.clone();
                self.push_diagnostic(from_eval_error(&label, phase.into(), &e));
                Err(PlayerError::Handler {
                    phase,
                    script: label,
                    message: e.to_string(),
                    trace: script_trace(&e),
                })
            }
        }
    }
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Declared parameter count of the function behind `fn_ptr`, excluding
/// values it has already captured.
fn callback_arity(ast: &AST, fn_ptr: &FnPtr) -> usize {
    ast.iter_functions()
        .filter(|f| f.name == fn_ptr.fn_name())
        .map(|f| f.params.len())
        .max()
        .map(|params| params.saturating_sub(fn_ptr.curry().len()))
        .unwrap_or(DEFAULT_ARITY)
}

/// Render the chain of script function calls that led to `err`, outermost
/// first, followed by the error itself.
fn script_trace(err: &EvalAltResult) -> String {
    let mut lines = Vec::new();
    let mut current = err;
    while let EvalAltResult::ErrorInFunctionCall(name, _, inner, pos) = current {
        lines.push(format!("in {name} ({pos})"));
        current = inner;
    }
    lines.push(current.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec3;

    use crate::camera::PerspectiveCamera;
    use crate::render::RenderSettings;
    use crate::scene_graph::{MeshInstance, MeshShape, ObjectId, ObjectKind, SceneGraph, SceneObject};
    use crate::script_api::{PlayerStatus, SharedScene};

    fn fixture() -> (ScriptHost, ScriptContext, SharedScene, ObjectId) {
        let mut graph = SceneGraph::new("scene");
        let root = graph.root();
        let id = graph
            .add(root, SceneObject::new("cube", ObjectKind::Mesh(MeshInstance::new(MeshShape::Cube))))
            .unwrap();
        let scene = Rc::new(RefCell::new(graph));
        let ctx = ScriptContext {
            player: PlayerRef::new(Rc::new(RefCell::new(PlayerStatus::default()))),
            renderer: RendererRef::new(Rc::new(RefCell::new(RenderSettings::default()))),
            scene: SceneRef::new(scene.clone()),
            camera: CameraRef::new(Rc::new(RefCell::new(PerspectiveCamera::default()))),
        };
        (ScriptHost::new(), ctx, scene, id)
    }

    fn update(delta: f64) -> LifecycleEvent {
        LifecycleEvent::Update { time: 0.0, delta }
    }

    #[test]
    fn test_binds_top_level_functions() {
        let (mut host, ctx, scene, id) = fixture();
        let object = ObjectRef::new(scene.clone(), id);
        let handlers = host
            .bind("cube/a", "fn init() {} fn update(object, event) { object.position.x += event.delta; }", object, &ctx)
            .unwrap();
        let phases: Vec<_> = handlers.iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, vec![LifecyclePhase::Init, LifecyclePhase::Update]);
        assert_eq!(handlers[0].1.arity, 0);
        assert_eq!(handlers[1].1.arity, 2);

        host.invoke(&handlers[1].1, &update(16.0)).unwrap();
        assert_eq!(scene.borrow().get(id).unwrap().transform.position.x, 16.0);
    }

    #[test]
    fn test_map_form_with_closure_and_this() {
        let (mut host, ctx, scene, id) = fixture();
        let object = ObjectRef::new(scene.clone(), id);
        let handlers = host
            .bind(
                "cube/b",
                r#"
                    let step = 2.0;
                    #{
                        start: (),
                        update: |event| this.position.y += step * event.delta,
                    }
                "#,
                object,
                &ctx,
            )
            .unwrap();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].0, LifecyclePhase::Update);
        assert_eq!(handlers[0].1.arity, 1);

        host.invoke(&handlers[0].1, &update(5.0)).unwrap();
        assert_eq!(scene.borrow().get(id).unwrap().transform.position, Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn test_unknown_keys_and_non_functions_are_ignored() {
        let (mut host, ctx, scene, id) = fixture();
        let handlers = host
            .bind(
                "cube/c",
                r#"#{ tick: || 1, update: 42, stop: || () }"#,
                ObjectRef::new(scene, id),
                &ctx,
            )
            .unwrap();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].0, LifecyclePhase::Stop);

        let diags = host.take_diagnostics();
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.phase == ScriptPhase::Bind));
    }

    #[test]
    fn test_compile_error_is_reported() {
        let (mut host, ctx, scene, id) = fixture();
        let err = host
            .bind("cube/d", "fn update( {", ObjectRef::new(scene, id), &ctx)
            .unwrap_err();
        assert!(matches!(err, PlayerError::ScriptCompile { .. }));
        assert!(host.is_empty());
        assert_eq!(host.take_diagnostics()[0].phase, ScriptPhase::Compile);
    }

    #[test]
    fn test_handler_error_carries_trace() {
        let (mut host, ctx, scene, id) = fixture();
        let handlers = host
            .bind(
                "cube/e",
                "fn helper() { throw \"boom\"; } fn update(event) { helper(); }",
                ObjectRef::new(scene, id),
                &ctx,
            )
            .unwrap();
        let err = host.invoke(&handlers[0].1, &update(1.0)).unwrap_err();
        match err {
            PlayerError::Handler { phase, script, trace, .. } => {
                assert_eq!(phase, LifecyclePhase::Update);
                assert_eq!(script, "cube/e");
                assert!(trace.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_script_scope_persists_between_calls() {
        let (mut host, ctx, scene, id) = fixture();
        let handlers = host
            .bind(
                "cube/f",
                "let frames = 0; #{ update: |event| { frames += 1; this.name = `frame ${frames}`; } }",
                ObjectRef::new(scene.clone(), id),
                &ctx,
            )
            .unwrap();
        host.invoke(&handlers[0].1, &update(1.0)).unwrap();
        host.invoke(&handlers[0].1, &update(1.0)).unwrap();
        assert_eq!(scene.borrow().get(id).unwrap().name, "frame 2");
    }
}
