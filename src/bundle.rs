//! The serialized scene/camera/scripts payload consumed by `Player::load`.

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use crate::error::PlayerError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectSettings {
    pub shadows: bool,
    pub tone_mapping: u32,
    pub tone_mapping_exposure: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptSource {
    #[serde(default)]
    pub name: Option<String>,
    pub source: String,
}

/// Scripts attached to one scene object, addressed by uuid.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEntry {
    pub object: String,
    pub scripts: Vec<ScriptSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub project: Option<ProjectSettings>,
    pub scene: Value,
    pub camera: Value,
    #[serde(default, deserialize_with = "ordered_scripts")]
    pub scripts: Vec<ScriptEntry>,
}

impl Bundle {
    pub fn from_json(text: &str) -> Result<Self, PlayerError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self, PlayerError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bundle {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to parse bundle {}", path.display()))
    }

    /// Total number of script sources across all objects.
    pub fn script_count(&self) -> usize {
        self.scripts.iter().map(|e| e.scripts.len()).sum()
    }
}

/// Reads the `scripts` object into a list, keeping the key order of the
/// JSON text. `null` reads as no scripts.
fn ordered_scripts<'de, D>(deserializer: D) -> Result<Vec<ScriptEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScriptsVisitor;

    impl<'de> Visitor<'de> for ScriptsVisitor {
        type Value = Vec<ScriptEntry>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map from object uuid to a list of scripts")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::new();
            while let Some((object, scripts)) = map.next_entry::<String, Vec<ScriptSource>>()? {
                entries.push(ScriptEntry { object, scripts });
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(ScriptsVisitor)
}
