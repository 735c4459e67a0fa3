//! Error type shared by the loader, the script binder and the render loop.

use thiserror::Error;

use crate::events::LifecyclePhase;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// The bundle itself is not valid JSON or misses a required key.
    #[error("malformed bundle: {0}")]
    Bundle(#[from] serde_json::Error),

    /// A scene or camera sub-document could not be deserialized.
    #[error("invalid {kind} document: {source}")]
    Document {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported camera type `{0}`")]
    UnsupportedCamera(String),

    #[error("failed to compile script `{script}`: {message}")]
    ScriptCompile { script: String, message: String },

    #[error("script `{script}` failed while binding handlers: {message}")]
    ScriptEval { script: String, message: String },

    /// A lifecycle handler raised an error while being dispatched.
    #[error("{phase} handler from script `{script}` failed: {message}")]
    Handler {
        phase: LifecyclePhase,
        script: String,
        message: String,
        trace: String,
    },

    #[error("player has no scene or camera")]
    NotLoaded,

    #[error("render failed: {0}")]
    Render(String),
}

impl PlayerError {
    /// Trace text attached to handler failures, empty for other errors.
    pub fn trace(&self) -> &str {
        match self {
            PlayerError::Handler { trace, .. } => trace,
            _ => "",
        }
    }
}
