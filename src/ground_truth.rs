//! Ground-truth annotations used to score practice tasks.
//!
//! The source is a JSON object mapping a task name to its known markers,
//! either as an array or as an object keyed by index:
//!
//! ```json
//! { "P.Oxy.1234": [{ "x": 10, "y": 12, "label": "tau" }],
//!   "P.Oxy.5678": { "0": { "x": 3, "y": 4, "label": "tau" } } }
//! ```
//!
//! Task names carry a suffix after the first `-` (`P.Oxy.1234-practice`)
//! which is ignored when looking up.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::geometry::Point;

#[derive(Debug, Error)]
pub enum GroundTruthError {
    #[error("Failed to parse ground truth: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to read ground truth: {0}")]
    IoError(#[from] std::io::Error),
}

/// One known marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownAnnotation {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub label: String,
}

impl KnownAnnotation {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTaskAnnotations {
    List(Vec<KnownAnnotation>),
    Keyed(BTreeMap<String, KnownAnnotation>),
}

impl RawTaskAnnotations {
    fn into_ordered(self) -> Vec<KnownAnnotation> {
        match self {
            RawTaskAnnotations::List(list) => list,
            RawTaskAnnotations::Keyed(map) => {
                let mut entries: Vec<(String, KnownAnnotation)> = map.into_iter().collect();
                // Integer keys first in numeric order, then the rest by name.
                entries.sort_by_key(|(key, _)| match key.parse::<u64>() {
                    Ok(n) => (0, n, String::new()),
                    Err(_) => (1, 0, key.clone()),
                });
                entries.into_iter().map(|(_, a)| a).collect()
            }
        }
    }
}

/// Known markers for every task, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    tasks: HashMap<String, Vec<KnownAnnotation>>,
}

/// Accepts both the list and the index-keyed form of each task.
impl<'de> Deserialize<'de> for GroundTruth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, RawTaskAnnotations>::deserialize(deserializer)?;
        let tasks = raw
            .into_iter()
            .map(|(name, annotations)| (name, annotations.into_ordered()))
            .collect();
        Ok(Self { tasks })
    }
}

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, GroundTruthError> {
        let truth: Self = serde_json::from_str(json)?;
        log::info!("📚 Loaded ground truth for {} tasks", truth.len());
        Ok(truth)
    }

    pub fn load(path: &Path) -> Result<Self, GroundTruthError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn insert(&mut self, task_name: impl Into<String>, annotations: Vec<KnownAnnotation>) {
        self.tasks.insert(task_name.into(), annotations);
    }

    /// Known markers for a task, looked up by the name's base part.
    pub fn for_task(&self, task_name: &str) -> Option<&[KnownAnnotation]> {
        self.tasks.get(base_name(task_name)).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// The part of a task name before the first `-`.
pub fn base_name(task_name: &str) -> &str {
    task_name.split('-').next().unwrap_or(task_name)
}
