//! Free-form `data` payload carried by tracker shots and assets.
//!
//! The tracker stores an arbitrary JSON object per entity. This crate owns
//! three parts of it: the frame range (`frame_in`/`frame_out`), and under
//! `metadata` the review media history (`RVMedia`) and pipeline publish data
//! (`prism`). Everything else is preserved untouched in `extra`/`other`.
//!
//! Older clients wrote `RVMedia[step]` as a list of single-key objects
//! (`[{"0": a}, {"1": b}, {"last": c}]`). Reading accepts that shape and
//! writing always produces the versioned form
//! (`{"last": c, "previous": [a, b]}`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Version written into `metadata.version`.
pub const METADATA_VERSION: u64 = 1;

const RV_MEDIA_KEY: &str = "RVMedia";
const PRISM_KEY: &str = "prism";
const VERSION_KEY: &str = "version";

/// Review media published for one pipeline step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(default)]
    pub previous: Vec<String>,
}

impl MediaHistory {
    /// Make `path` the latest media, moving the current latest into history.
    pub fn push(&mut self, path: impl Into<String>) {
        if let Some(last) = self.last.take() {
            self.previous.push(last);
        }
        self.last = Some(path.into());
    }

    fn from_legacy(entries: &[Value]) -> Self {
        let mut history = MediaHistory::default();
        for entry in entries {
            let Some(object) = entry.as_object() else {
                continue;
            };
            for (key, value) in object {
                let Some(path) = value.as_str() else {
                    continue;
                };
                if key == "last" {
                    history.last = Some(path.to_string());
                } else {
                    history.previous.push(path.to_string());
                }
            }
        }
        history
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMetadata {
    pub rv_media: BTreeMap<String, MediaHistory>,
    pub prism: BTreeMap<String, Map<String, Value>>,
    /// Keys written by other tools.
    pub other: Map<String, Value>,
}

impl EntityMetadata {
    pub fn is_empty(&self) -> bool {
        self.rv_media.is_empty() && self.prism.is_empty() && self.other.is_empty()
    }

    /// Parse a stored `metadata` object, upgrading legacy layouts.
    ///
    /// Anything that is not an object yields empty metadata.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let mut metadata = Self::default();
        for (key, value) in object {
            match key.as_str() {
                VERSION_KEY => {}
                RV_MEDIA_KEY => {
                    if let Some(steps) = value.as_object() {
                        for (step, media) in steps {
                            let history = match media {
                                Value::Array(entries) => MediaHistory::from_legacy(entries),
                                Value::Object(_) => {
                                    serde_json::from_value(media.clone()).unwrap_or_default()
                                }
                                _ => MediaHistory::default(),
                            };
                            metadata.rv_media.insert(step.clone(), history);
                        }
                    }
                }
                PRISM_KEY => {
                    if let Some(steps) = value.as_object() {
                        for (step, data) in steps {
                            if let Some(data) = data.as_object() {
                                metadata.prism.insert(step.clone(), data.clone());
                            }
                        }
                    }
                }
                _ => {
                    metadata.other.insert(key.clone(), value.clone());
                }
            }
        }
        metadata
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.other.clone();
        object.insert(VERSION_KEY.to_string(), Value::from(METADATA_VERSION));
        if !self.rv_media.is_empty() {
            let media = self
                .rv_media
                .iter()
                .map(|(step, history)| {
                    (
                        step.clone(),
                        serde_json::to_value(history).unwrap_or(Value::Null),
                    )
                })
                .collect::<Map<_, _>>();
            object.insert(RV_MEDIA_KEY.to_string(), Value::Object(media));
        }
        if !self.prism.is_empty() {
            let prism = self
                .prism
                .iter()
                .map(|(step, data)| (step.clone(), Value::Object(data.clone())))
                .collect::<Map<_, _>>();
            object.insert(PRISM_KEY.to_string(), Value::Object(prism));
        }
        Value::Object(object)
    }

    pub fn record_media(&mut self, step: &str, path: impl Into<String>) {
        self.rv_media.entry(step.to_string()).or_default().push(path);
    }

    /// Shallow-merge `data` into the pipeline data for `step`.
    pub fn merge_pipeline_data(&mut self, step: &str, data: &Map<String, Value>) {
        let target = self.prism.entry(step.to_string()).or_default();
        for (key, value) in data {
            target.insert(key.clone(), value.clone());
        }
    }
}

impl Serialize for EntityMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EntityMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// The tracker's per-entity `data` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEntityData")]
pub struct EntityData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_out: Option<i64>,
    #[serde(skip_serializing_if = "EntityMetadata::is_empty")]
    pub metadata: EntityMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawEntityData {
    #[serde(default, deserialize_with = "lenient_frame")]
    frame_in: Option<i64>,
    #[serde(default, deserialize_with = "lenient_frame")]
    frame_out: Option<i64>,
    #[serde(default)]
    metadata: Option<EntityMetadata>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawEntityData> for EntityData {
    fn from(raw: RawEntityData) -> Self {
        Self {
            frame_in: raw.frame_in,
            frame_out: raw.frame_out,
            metadata: raw.metadata.unwrap_or_default(),
            extra: raw.extra,
        }
    }
}

/// Frames come back as numbers, numeric strings, or garbage typed by hand
/// into the web UI. Garbage reads as absent.
fn lenient_frame<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_frame))
}

pub fn parse_frame(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Deserialize `null` as the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
