//! The structured plan payload.
//!
//! These types double as the parser for chat-completion output. Parsing is
//! per entry: every list defaults to empty when its key is missing or is not
//! an array, entry fields take defaults where a sensible one exists, counts
//! accept any JSON number and are rounded, and an entry that still does not
//! fit (a task or resource tag outside the vocabularies, say) is dropped on
//! its own. Only a body that is not a JSON object fails as a whole.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use studyplan_db::models::{FocusArea, ResourceType};

/// Where a plan's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    External,
    Mock,
}

/// Why chat output could not be read as plan content at all.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("top level is not a JSON object")]
    NotAnObject,
}

/// The five lists that make up a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanContent {
    #[serde(deserialize_with = "lenient_list")]
    pub weekly_roadmap: Vec<WeekEntry>,
    #[serde(deserialize_with = "lenient_list")]
    pub daily_tasks: Vec<DayEntry>,
    #[serde(deserialize_with = "lenient_list")]
    pub topics: Vec<Topic>,
    #[serde(deserialize_with = "lenient_list")]
    pub resources: Vec<Resource>,
    #[serde(deserialize_with = "lenient_list")]
    pub checkpoints: Vec<Checkpoint>,
}

impl PlanContent {
    /// Read a chat-completion body, keeping every entry that fits.
    pub fn from_completion(body: &str) -> Result<Self, ContentError> {
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(ContentError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// A plan as stored in a version's `content_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    #[serde(flatten)]
    pub content: PlanContent,
    pub model_used: String,
    pub prompt_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekEntry {
    #[serde(default = "first", deserialize_with = "rounded")]
    pub week: u32,
    #[serde(default)]
    pub focus: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub topics: Vec<String>,
    #[serde(default)]
    pub estimated_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayEntry {
    /// Absolute day index across the whole plan.
    #[serde(default = "first", deserialize_with = "rounded")]
    pub day: u32,
    #[serde(default = "first", deserialize_with = "rounded")]
    pub week: u32,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "first", deserialize_with = "rounded")]
    pub estimated_minutes: u32,
    #[serde(rename = "type")]
    pub kind: FocusArea,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "first", deserialize_with = "rounded")]
    pub week: u32,
    #[serde(rename = "type", default = "assessment")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics_covered: Vec<String>,
}

fn first() -> u32 {
    1
}

fn assessment() -> String {
    "assessment".to_owned()
}

/// A list whose unreadable entries are skipped. Anything but an array reads
/// as empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// A count given as any JSON number, rounded and clamped to `u32`.
fn rounded<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value.round().clamp(0.0, f64::from(u32::MAX)) as u32)
}
