//! Script logging module for Rhai scripts.
//!
//! Provides a `log` object to Rhai scripts with `info`, `warn`, and `error`
//! methods. Messages are forwarded to the `log` crate under the `script`
//! target, so `RUST_LOG=script=warn` filters them like any other module.

use std::cell::Cell;

/// Maximum number of log messages allowed per frame to prevent spam.
const MAX_LOGS_PER_FRAME: u32 = 100;

/// Target used for every record emitted on behalf of a script.
pub const SCRIPT_LOG_TARGET: &str = "script";

thread_local! {
    /// Messages logged since the last frame reset.
    static LOG_COUNT: Cell<u32> = const { Cell::new(0) };
    /// Whether the limit warning was already emitted this frame.
    static WARNED_LIMIT: Cell<bool> = const { Cell::new(false) };
}

/// Log level for script messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Reset the per-frame log counter. Call this at the start of each frame.
pub fn reset_frame_log_count() {
    LOG_COUNT.with(|c| c.set(0));
    WARNED_LIMIT.with(|w| w.set(false));
}

/// Check if we can log another message this frame.
fn can_log() -> bool {
    let count = LOG_COUNT.with(|c| {
        let n = c.get();
        c.set(n.saturating_add(1));
        n
    });
    if count < MAX_LOGS_PER_FRAME {
        return true;
    }
    if !WARNED_LIMIT.with(|w| w.replace(true)) {
        emit_log(
            LogLevel::Warn,
            &format!("Script log limit exceeded ({MAX_LOGS_PER_FRAME} messages/frame). Further logs dropped."),
        );
    }
    false
}

/// Emit a log message at the given level.
pub fn emit_log(level: LogLevel, message: &str) {
    log::log!(target: SCRIPT_LOG_TARGET, level.into(), "{message}");
}

/// Log a message from a script, respecting the per-frame limit.
pub fn script_log(level: LogLevel, message: &str) {
    if can_log() {
        emit_log(level, message);
    }
}

/// Convert a Rhai Dynamic value to a string safely.
/// Never panics, handles all types gracefully.
pub fn stringify_dynamic(value: &rhai::Dynamic) -> String {
    if value.is_string() {
        if let Ok(s) = value.clone().into_string() {
            return s;
        }
    }

    if let Some(arr) = value.read_lock::<rhai::Array>() {
        let parts: Vec<String> = arr.iter().map(stringify_dynamic).collect();
        return parts.join(" ");
    }

    if let Some(map) = value.read_lock::<rhai::Map>() {
        let parts: Vec<String> = map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, stringify_dynamic(v)))
            .collect();
        return format!("{{{}}}", parts.join(", "));
    }

    if let Ok(i) = value.as_int() {
        return i.to_string();
    }
    if let Ok(f) = value.as_float() {
        return f.to_string();
    }
    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }
    if value.is_unit() {
        return "()".to_string();
    }

    // Host types print through their Display/Debug registrations.
    value.to_string()
}

/// Logger type registered with Rhai as `Log` and pushed into every script
/// scope as `log`.
#[derive(Debug, Clone, Default)]
pub struct ScriptLogger;

impl ScriptLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn info(&mut self, value: rhai::Dynamic) {
        script_log(LogLevel::Info, &stringify_dynamic(&value));
    }

    pub fn warn(&mut self, value: rhai::Dynamic) {
        script_log(LogLevel::Warn, &stringify_dynamic(&value));
    }

    pub fn error(&mut self, value: rhai::Dynamic) {
        script_log(LogLevel::Error, &stringify_dynamic(&value));
    }
}

/// Register the `Log` type and its methods.
pub fn register_log_api(engine: &mut rhai::Engine) {
    engine
        .register_type_with_name::<ScriptLogger>("Log")
        .register_fn("info", ScriptLogger::info)
        .register_fn("warn", ScriptLogger::warn)
        .register_fn("error", ScriptLogger::error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_string() {
        let value = rhai::Dynamic::from("hello");
        assert_eq!(stringify_dynamic(&value), "hello");
    }

    #[test]
    fn test_stringify_int() {
        let value = rhai::Dynamic::from(42_i64);
        assert_eq!(stringify_dynamic(&value), "42");
    }

    #[test]
    fn test_stringify_float() {
        let value = rhai::Dynamic::from_float(3.5);
        assert_eq!(stringify_dynamic(&value), "3.5");
    }

    #[test]
    fn test_stringify_array() {
        let mut arr = rhai::Array::new();
        arr.push(rhai::Dynamic::from("delta"));
        arr.push(rhai::Dynamic::from_float(0.5));
        let value = rhai::Dynamic::from(arr);
        assert_eq!(stringify_dynamic(&value), "delta 0.5");
    }

    #[test]
    fn test_log_level_maps_to_log_crate() {
        assert_eq!(log::Level::from(LogLevel::Info), log::Level::Info);
        assert_eq!(log::Level::from(LogLevel::Warn), log::Level::Warn);
        assert_eq!(log::Level::from(LogLevel::Error), log::Level::Error);
    }

    #[test]
    fn test_frame_log_limit() {
        reset_frame_log_count();

        for _ in 0..MAX_LOGS_PER_FRAME {
            assert!(can_log());
        }
        assert!(!can_log());

        reset_frame_log_count();
        assert!(can_log());
    }
}
