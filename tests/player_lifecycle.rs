//! Playback lifecycle: init/start/update/stop ordering, timing and error
//! isolation, driven by a manual clock and the draw-list renderer.

use scene_player::controls::{ControlInput, ControlSurface};
use scene_player::{Bundle, HeadlessRenderer, LifecyclePhase, ManualClock, Player, PlayerConfig, PlayerError};
use serde_json::json;

fn bundle(scripts: serde_json::Value) -> Bundle {
    Bundle::from_value(json!({
        "scene": {
            "object": {
                "uuid": "scene", "type": "Scene",
                "children": [
                    { "uuid": "cube", "type": "Mesh", "name": "Cube", "userData": { "label": "hello" } }
                ]
            }
        },
        "camera": {
            "object": { "uuid": "cam", "type": "PerspectiveCamera", "fov": 50, "aspect": 1, "near": 0.1, "far": 100,
                        "position": [0, 0, 10] }
        },
        "scripts": scripts
    }))
    .unwrap()
}

fn player_with(config: PlayerConfig) -> (Player, ManualClock) {
    let clock = ManualClock::new();
    let renderer = HeadlessRenderer::new(config.width, config.height);
    let player = Player::new(config, Box::new(renderer), Box::new(clock.clone()));
    (player, clock)
}

fn player() -> (Player, ManualClock) {
    player_with(PlayerConfig::default())
}

fn cube_position(player: &Player) -> glam::Vec3 {
    let scene = player.scene().unwrap();
    let scene = scene.borrow();
    let id = scene.find_by_uuid("cube").unwrap();
    scene.get(id).unwrap().transform.position
}

#[test]
fn test_update_receives_elapsed_and_delta() {
    let (mut player, clock) = player();
    player
        .load(&bundle(json!({
            "cube": [{ "source": "#{ update: |object, event| { object.position.x += event.delta; } }" }]
        })))
        .unwrap();

    player.play().unwrap();
    clock.advance(16.0);
    assert!(player.animate());
    clock.advance(20.0);
    assert!(player.animate());

    assert_eq!(cube_position(&player).x, 36.0);
    assert_eq!(player.render_info().frames, 2);
}

#[test]
fn test_update_time_is_measured_from_play() {
    let (mut player, clock) = player();
    clock.set(1000.0);
    player
        .load(&bundle(json!({
            "cube": [{ "source": "fn update(event) { this.position.y = event.time; }" }]
        })))
        .unwrap();

    clock.set(1500.0);
    player.play().unwrap();
    clock.set(1532.0);
    player.animate();

    assert_eq!(cube_position(&player).y, 32.0);
}

#[test]
fn test_init_fires_once_on_load() {
    let (mut player, clock) = player();
    player
        .load(&bundle(json!({
            "cube": [{ "source": "fn init() { this.position.x += 1.0; }" }]
        })))
        .unwrap();
    assert_eq!(cube_position(&player).x, 1.0);

    player.play().unwrap();
    clock.advance(16.0);
    player.animate();
    player.stop().unwrap();
    assert_eq!(cube_position(&player).x, 1.0);
}

#[test]
fn test_play_and_stop_fire_once_and_stop_ends_updates() {
    let (mut player, clock) = player();
    player
        .load(&bundle(json!({
            "cube": [{
                "source": r#"
                    fn start() { this.position.x += 1.0; }
                    fn stop() { this.position.y += 1.0; }
                    fn update(event) { this.position.z += 1.0; }
                "#
            }]
        })))
        .unwrap();

    player.play().unwrap();
    assert!(player.is_playing());
    clock.advance(16.0);
    assert!(player.animate());
    player.stop().unwrap();
    assert!(!player.is_playing());

    clock.advance(16.0);
    assert!(!player.animate());

    let p = cube_position(&player);
    assert_eq!((p.x, p.y, p.z), (1.0, 1.0, 1.0));
    assert_eq!(player.render_info().frames, 1);
}

#[test]
fn test_failing_update_skips_later_handlers_for_that_frame_only() {
    let (mut player, clock) = player();
    player
        .load(&bundle(json!({
            "cube": [
                { "name": "first", "source": "fn update(event) { this.position.x += 1.0; }" },
                { "name": "broken", "source": "fn update(event) { throw \"boom\"; }" },
                { "name": "last", "source": "fn update(event) { this.position.y += 1.0; }" }
            ]
        })))
        .unwrap();
    assert_eq!(player.handler_count(LifecyclePhase::Update), 3);

    player.play().unwrap();
    clock.advance(16.0);
    assert!(player.animate());
    clock.advance(16.0);
    assert!(player.animate());

    let p = cube_position(&player);
    assert_eq!(p.x, 2.0);
    assert_eq!(p.y, 0.0);
    // The frame still renders after a script error.
    assert_eq!(player.render_info().frames, 2);
}

#[test]
fn test_failing_start_propagates_and_leaves_player_idle() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(json!({ "cube": [{ "source": "fn start() { throw \"nope\"; }" }] })))
        .unwrap();

    let err = player.play().unwrap_err();
    assert!(matches!(err, PlayerError::Handler { phase: LifecyclePhase::Start, .. }));
    assert!(err.trace().contains("nope"));
    assert!(!player.is_playing());
}

#[test]
fn test_failing_init_fails_load_and_drops_handlers() {
    let (mut player, _clock) = player();
    let err = player
        .load(&bundle(json!({
            "cube": [
                { "source": "fn update(event) { this.position.x += 1.0; }" },
                { "source": "fn init() { throw \"not ready\"; }" }
            ]
        })))
        .unwrap_err();

    assert!(matches!(err, PlayerError::Handler { phase: LifecyclePhase::Init, .. }));
    for phase in LifecyclePhase::ALL {
        assert_eq!(player.handler_count(phase), 0);
    }

    // The scene is still installed and renders without scripts.
    player.render(0.5).unwrap();
    assert_eq!(cube_position(&player).x, 0.0);
    assert_eq!(player.render_info().frames, 1);
}

#[test]
fn test_step_render_uses_seconds_and_zero_delta() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(json!({
            "cube": [{ "source": "fn update(event) { this.position.x = event.time; this.position.y = event.delta + 7.0; }" }]
        })))
        .unwrap();

    player.render(0.5).unwrap();
    let p = cube_position(&player);
    assert_eq!(p.x, 500.0);
    assert_eq!(p.y, 7.0);
    assert!(!player.is_playing());
}

#[test]
fn test_step_render_propagates_handler_errors() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(json!({ "cube": [{ "source": "fn update(event) { throw \"bad frame\"; }" }] })))
        .unwrap();

    let err = player.render(1.0).unwrap_err();
    assert!(matches!(err, PlayerError::Handler { phase: LifecyclePhase::Update, .. }));
    assert_eq!(player.render_info().frames, 0);
}

#[test]
fn test_animate_while_idle_does_nothing() {
    let (mut player, clock) = player();
    player
        .load(&bundle(json!({ "cube": [{ "source": "fn update(event) { this.position.x += 1.0; }" }] })))
        .unwrap();

    clock.advance(16.0);
    assert!(!player.animate());
    assert_eq!(cube_position(&player).x, 0.0);
    assert_eq!(player.render_info().frames, 0);
}

#[test]
fn test_reload_replaces_handlers() {
    let (mut player, _clock) = player();
    player
        .load(&bundle(json!({ "cube": [{ "source": "fn update(e) {} fn start() {}" }] })))
        .unwrap();
    assert_eq!(player.handler_count(LifecyclePhase::Update), 1);

    player.load(&bundle(json!({}))).unwrap();
    assert_eq!(player.handler_count(LifecyclePhase::Update), 0);
    assert_eq!(player.handler_count(LifecyclePhase::Start), 0);
}

#[test]
fn test_label_overlay_projects_labelled_objects() {
    let config = PlayerConfig {
        label_overlay: true,
        ..Default::default()
    };
    let (mut player, _clock) = player_with(config);
    player.load(&bundle(json!({}))).unwrap();
    assert!(player.labels().is_empty());

    player.render(0.0).unwrap();
    let labels = player.labels();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].text, "hello");
    assert!((labels[0].x - 400.0).abs() < 1e-3);
    assert!((labels[0].y - 400.0).abs() < 1e-3);
}

#[test]
fn test_controls_only_listen_on_their_surface() {
    let (mut player, _clock) = player();
    player.load(&bundle(json!({}))).unwrap();
    let before = player.camera().unwrap().borrow().position;

    let rotate = ControlInput::Rotate { dx: 100.0, dy: 0.0 };
    assert!(!player.handle_pointer(ControlSurface::Overlay, rotate));
    assert_eq!(player.camera().unwrap().borrow().position, before);

    assert!(player.handle_pointer(ControlSurface::Primary, rotate));
    let after = player.camera().unwrap().borrow().position;
    assert_ne!(after, before);
    assert!((after.length() - before.length()).abs() < 1e-3);
}

#[test]
fn test_overlay_controls_fall_back_without_overlay() {
    let config = PlayerConfig {
        controls_surface: ControlSurface::Overlay,
        ..Default::default()
    };
    let (mut player, _clock) = player_with(config);
    player.load(&bundle(json!({}))).unwrap();

    let rotate = ControlInput::Rotate { dx: 50.0, dy: 0.0 };
    assert!(player.handle_pointer(ControlSurface::Primary, rotate));
}
