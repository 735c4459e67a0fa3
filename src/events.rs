//! Lifecycle phases and the ordered handler table they dispatch to.
//!
//! Handlers are appended while scripts are bound and then only read. A
//! dispatch walks the list for one phase in registration order and stops at
//! the first handler that fails.

use std::fmt;
use std::str::FromStr;

use rhai::{Dynamic, FnPtr, Map};
use serde::Serialize;

use crate::script_api::ObjectRef;

/// A named point at which registered handlers fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Init,
    Start,
    Stop,
    Update,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 4] = [
        LifecyclePhase::Init,
        LifecyclePhase::Start,
        LifecyclePhase::Stop,
        LifecyclePhase::Update,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Init => "init",
            LifecyclePhase::Start => "start",
            LifecyclePhase::Stop => "stop",
            LifecyclePhase::Update => "update",
        }
    }

    fn index(self) -> usize {
        match self {
            LifecyclePhase::Init => 0,
            LifecyclePhase::Start => 1,
            LifecyclePhase::Stop => 2,
            LifecyclePhase::Update => 3,
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPhase(pub String);

impl fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown lifecycle phase `{}`", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

impl FromStr for LifecyclePhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(LifecyclePhase::Init),
            "start" => Ok(LifecyclePhase::Start),
            "stop" => Ok(LifecyclePhase::Stop),
            "update" => Ok(LifecyclePhase::Update),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Payload passed to every handler of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LifecycleEvent {
    Init,
    Start,
    Stop,
    /// Times are in milliseconds. `time` is relative to the start of play.
    Update { time: f64, delta: f64 },
}

impl LifecycleEvent {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            LifecycleEvent::Init => LifecyclePhase::Init,
            LifecycleEvent::Start => LifecyclePhase::Start,
            LifecycleEvent::Stop => LifecyclePhase::Stop,
            LifecycleEvent::Update { .. } => LifecyclePhase::Update,
        }
    }

    /// Script-side representation: `#{ phase, time, delta }`.
    pub fn to_dynamic(&self) -> Dynamic {
        let mut map = Map::new();
        map.insert("phase".into(), Dynamic::from(self.phase().as_str().to_string()));
        if let LifecycleEvent::Update { time, delta } = *self {
            map.insert("time".into(), Dynamic::from_float(time as rhai::FLOAT));
            map.insert("delta".into(), Dynamic::from_float(delta as rhai::FLOAT));
        }
        Dynamic::from_map(map)
    }
}

/// A script callback bound to the scene object that owns the script.
#[derive(Clone)]
pub struct Handler {
    pub(crate) callback: FnPtr,
    pub(crate) object: ObjectRef,
    /// Index of the compiled script whose AST holds the callback.
    pub(crate) script: usize,
    /// Declared parameter count, excluding captured variables.
    pub(crate) arity: usize,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("callback", &self.callback.fn_name())
            .field("object", &self.object.id())
            .field("script", &self.script)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Ordered handler lists, one per lifecycle phase.
#[derive(Debug)]
pub struct EventTable<H = Handler> {
    lists: [Vec<H>; 4],
}

impl<H> EventTable<H> {
    pub fn new() -> Self {
        Self {
            lists: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
        }
    }

    pub fn push(&mut self, phase: LifecyclePhase, handler: H) {
        self.lists[phase.index()].push(handler);
    }

    pub fn handlers(&self, phase: LifecyclePhase) -> &[H] {
        &self.lists[phase.index()]
    }

    pub fn len(&self, phase: LifecyclePhase) -> usize {
        self.lists[phase.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    /// Invoke `call` on every handler of `phase` in registration order.
    /// Handlers after a failing one are skipped for this pass.
    pub fn dispatch<E, F>(&self, phase: LifecyclePhase, mut call: F) -> Result<(), E>
    where
        F: FnMut(&H) -> Result<(), E>,
    {
        for handler in self.handlers(phase) {
            call(handler)?;
        }
        Ok(())
    }
}

impl<H> Default for EventTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trip_names() {
        for phase in LifecyclePhase::ALL {
            assert_eq!(phase.as_str().parse::<LifecyclePhase>(), Ok(phase));
        }
        assert_eq!(
            "render".parse::<LifecyclePhase>(),
            Err(UnknownPhase("render".to_string()))
        );
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let mut table: EventTable<u32> = EventTable::new();
        table.push(LifecyclePhase::Update, 1);
        table.push(LifecyclePhase::Start, 10);
        table.push(LifecyclePhase::Update, 2);
        table.push(LifecyclePhase::Update, 3);

        let mut seen = Vec::new();
        table
            .dispatch::<(), _>(LifecyclePhase::Update, |h| {
                seen.push(*h);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(table.len(LifecyclePhase::Start), 1);
        assert_eq!(table.len(LifecyclePhase::Stop), 0);
    }

    #[test]
    fn test_dispatch_stops_at_first_error() {
        let mut table: EventTable<u32> = EventTable::new();
        for h in 1..=4 {
            table.push(LifecyclePhase::Update, h);
        }

        let mut seen = Vec::new();
        let result = table.dispatch(LifecyclePhase::Update, |h| {
            seen.push(*h);
            if *h == 2 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_clear() {
        let mut table: EventTable<u32> = EventTable::default();
        table.push(LifecyclePhase::Init, 1);
        assert!(!table.is_empty());
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_update_payload_fields() {
        let payload = LifecycleEvent::Update { time: 32.0, delta: 16.0 }.to_dynamic();
        let map = payload.try_cast::<Map>().unwrap();
        assert_eq!(map.get("delta").unwrap().as_float().unwrap(), 16.0);
        assert_eq!(map.get("time").unwrap().as_float().unwrap(), 32.0);
        assert_eq!(
            map.get("phase").unwrap().clone().into_string().unwrap(),
            "update"
        );

        let start = LifecycleEvent::Start.to_dynamic().try_cast::<Map>().unwrap();
        assert!(start.get("delta").is_none());
    }
}
