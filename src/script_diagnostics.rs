//! Structured script diagnostics.
//!
//! Rhai errors (parse and runtime) carry positions. They are wrapped into a
//! stable, JSON-serializable record that hosts can surface without reading
//! the process log.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// Syntax/parse errors (compile time).
    ParseError,
    /// Runtime errors in user code.
    RuntimeError,
    /// Script used the host API incorrectly (missing members, wrong types, etc).
    HostApiMisuse,
    /// Handler table entry that was ignored (unknown phase, non-function value).
    BindWarning,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Compile,
    Bind,
    Init,
    Start,
    Stop,
    Update,
}

impl From<crate::events::LifecyclePhase> for ScriptPhase {
    fn from(phase: crate::events::LifecyclePhase) -> Self {
        use crate::events::LifecyclePhase;
        match phase {
            LifecyclePhase::Init => ScriptPhase::Init,
            LifecyclePhase::Start => ScriptPhase::Start,
            LifecyclePhase::Stop => ScriptPhase::Stop,
            LifecyclePhase::Update => ScriptPhase::Update,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number in the script source.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub phase: ScriptPhase,
    /// Script label, `<object uuid>/<script name>`.
    pub script: String,
    pub message: String,
    pub location: Option<ScriptLocation>,
    /// Raw engine error string (useful for bug reports).
    #[serde(default)]
    pub raw: Option<String>,
}

fn classify_message(message: &str) -> ScriptDiagnosticKind {
    // Rhai error strings are fairly stable; this avoids depending on
    // Rhai's internal enum variants.
    let lower = message.to_ascii_lowercase();

    if lower.contains("property not found")
        || lower.contains("variable not found")
        || lower.contains("function not found")
        || lower.contains("array index")
        || lower.contains("map key")
        || lower.contains("mismatched types")
    {
        return ScriptDiagnosticKind::HostApiMisuse;
    }

    ScriptDiagnosticKind::RuntimeError
}

fn location(pos: rhai::Position) -> Option<ScriptLocation> {
    let line = pos.line()? as u32;
    let column = pos.position().unwrap_or(1) as u32;
    Some(ScriptLocation {
        line,
        column: column.max(1),
    })
}

pub fn from_parse_error(script: &str, err: &rhai::ParseError) -> ScriptDiagnostic {
    let raw = err.to_string();
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::ParseError,
        phase: ScriptPhase::Compile,
        script: script.to_string(),
        message: raw.clone(),
        location: location(err.position()),
        raw: Some(raw),
    }
}

pub fn from_eval_error(script: &str, phase: ScriptPhase, err: &rhai::EvalAltResult) -> ScriptDiagnostic {
    let raw = err.to_string();
    ScriptDiagnostic {
        kind: classify_message(&raw),
        phase,
        script: script.to_string(),
        message: raw.clone(),
        location: location(err.position()),
        raw: Some(raw),
    }
}

pub fn bind_warning(script: &str, message: impl Into<String>) -> ScriptDiagnostic {
    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::BindWarning,
        phase: ScriptPhase::Bind,
        script: script.to_string(),
        message: message.into(),
        location: None,
        raw: None,
    }
}
