pub mod bundle;
pub mod camera;
pub mod clock;
pub mod config;
pub mod controls;
pub mod error;
pub mod events;
pub mod gpu;
pub mod labels;
pub mod loader;
pub mod player;
pub mod render;
pub mod scene_graph;

// Scripting modules
pub mod scripting;
pub mod script_api;
pub mod script_log;
pub mod script_diagnostics;

pub mod cli;

pub use bundle::Bundle;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::PlayerConfig;
pub use error::PlayerError;
pub use events::{LifecycleEvent, LifecyclePhase};
pub use player::Player;
pub use render::{HeadlessRenderer, Renderer};
