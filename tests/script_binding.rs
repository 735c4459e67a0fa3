//! Binding bundle scripts to scene objects and the host API they see.

use scene_player::script_diagnostics::ScriptDiagnosticKind;
use scene_player::{Bundle, HeadlessRenderer, LifecyclePhase, ManualClock, Player, PlayerConfig, PlayerError};

const SCENE: &str = r#"
    "scene": {
        "object": {
            "uuid": "scene", "type": "Scene",
            "children": [
                { "uuid": "a", "type": "Mesh", "name": "Alpha" },
                { "uuid": "b", "type": "Mesh", "name": "Beta", "position": [0, 1, 0] }
            ]
        }
    },
    "camera": {
        "object": { "uuid": "cam", "type": "PerspectiveCamera", "fov": 50, "aspect": 1, "near": 0.1, "far": 100,
                    "position": [0, 0, 10] }
    }
"#;

fn bundle(scripts: &str) -> Bundle {
    Bundle::from_json(&format!("{{ {SCENE}, \"scripts\": {scripts} }}")).unwrap()
}

fn player() -> (Player, ManualClock) {
    let clock = ManualClock::new();
    let player = Player::new(
        PlayerConfig::default(),
        Box::new(HeadlessRenderer::new(800, 800)),
        Box::new(clock.clone()),
    );
    (player, clock)
}

fn position_of(player: &Player, uuid: &str) -> glam::Vec3 {
    let scene = player.scene().unwrap();
    let scene = scene.borrow();
    let id = scene.find_by_uuid(uuid).unwrap();
    scene.get(id).unwrap().transform.position
}

#[test]
fn test_handlers_run_in_bundle_order() {
    // Both scripts fold into the scene root, so the result depends on order.
    let (mut player, _clock) = player();
    player
        .load(&bundle(
            r#"{
                "b": [{ "source": "fn update(e) { let p = this.parent; p.position.x = p.position.x * 10.0 + 1.0; }" }],
                "a": [{ "source": "fn update(e) { let p = this.parent; p.position.x = p.position.x * 10.0 + 2.0; }" }]
            }"#,
        ))
        .unwrap();

    player.render(0.0).unwrap();
    assert_eq!(position_of(&player, "scene").x, 12.0);
}

#[test]
fn test_scripts_for_missing_objects_are_skipped() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(
            r#"{
                "ghost": [
                    { "source": "fn init() {} fn update(e) {}" },
                    { "source": "fn update(e) {}" }
                ],
                "a": [{ "source": "fn update(e) {}" }]
            }"#,
        ))
        .unwrap();

    assert_eq!(player.handler_count(LifecyclePhase::Update), 1);
    assert_eq!(player.handler_count(LifecyclePhase::Init), 0);

    // One warning per missing object, not one per script.
    let warnings: Vec<_> = player
        .take_diagnostics()
        .into_iter()
        .filter(|d| d.kind == ScriptDiagnosticKind::BindWarning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].script, "ghost");
    assert!(warnings[0].message.contains("2 script(s)"));
}

#[test]
fn test_null_scripts_bind_nothing() {
    let (mut player, _clock) = player();
    player.load(&bundle("null")).unwrap();
    for phase in LifecyclePhase::ALL {
        assert_eq!(player.handler_count(phase), 0);
    }
}

#[test]
fn test_returned_map_binds_closures_and_reports_bad_entries() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(
            r##"{
                "a": [{
                    "name": "mover",
                    "source": "#{ start: || { this.position.y = 5.0; }, update: (), resize: |e| {}, stop: 42 }"
                }]
            }"##,
        ))
        .unwrap();

    assert_eq!(player.handler_count(LifecyclePhase::Start), 1);
    assert_eq!(player.handler_count(LifecyclePhase::Update), 0);
    assert_eq!(player.handler_count(LifecyclePhase::Stop), 0);

    let diagnostics = player.take_diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics.iter().all(|d| d.kind == ScriptDiagnosticKind::BindWarning));
    assert!(diagnostics.iter().all(|d| d.script == "a/mover"));

    player.play().unwrap();
    assert_eq!(position_of(&player, "a").y, 5.0);
}

#[test]
fn test_compile_error_fails_load_and_clears_handlers() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(r#"{ "a": [{ "source": "fn update(e) {}" }] }"#))
        .unwrap();
    assert_eq!(player.handler_count(LifecyclePhase::Update), 1);

    let err = player
        .load(&bundle(
            r#"{
                "a": [{ "source": "fn update(e) {}" }],
                "b": [{ "source": "fn update(e) { let = ; }" }]
            }"#,
        ))
        .unwrap_err();
    assert!(matches!(err, PlayerError::ScriptCompile { .. }));
    assert_eq!(player.handler_count(LifecyclePhase::Update), 0);

    let diagnostics = player.take_diagnostics();
    assert!(diagnostics.iter().any(|d| d.kind == ScriptDiagnosticKind::ParseError));
}

#[test]
fn test_scripts_see_camera_renderer_and_player() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(
            r#"{
                "a": [{
                    "source": "let w = player.width; let ratio = renderer.pixel_ratio; camera.fov = 75.0; camera.position.z = 20.0; object.position.x = w * ratio;"
                }]
            }"#,
        ))
        .unwrap();

    let camera = player.camera().unwrap();
    assert_eq!(camera.borrow().fov, 75.0);
    assert_eq!(camera.borrow().position.z, 20.0);
    assert_eq!(position_of(&player, "a").x, 800.0);
}

#[test]
fn test_scene_lookup_by_name_is_shared_between_scripts() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(
            r#"{
                "a": [{ "source": "let beta = scene.get_object_by_name(\"Beta\"); beta.position.y += 2.0;" }]
            }"#,
        ))
        .unwrap();

    assert_eq!(position_of(&player, "b").y, 3.0);
}

#[test]
fn test_stop_handler_can_read_final_state() {
    let (mut player, clock) = player();
    player
        .load(&bundle(
            r#"{
                "a": [{
                    "source": "fn update(e) { this.position.x = e.time; } fn stop() { this.position.y = this.position.x; }"
                }]
            }"#,
        ))
        .unwrap();

    player.play().unwrap();
    clock.advance(40.0);
    player.animate();
    player.stop().unwrap();

    assert_eq!(position_of(&player, "a").y, 40.0);
}
