//! Headless replay of recorded input.
//!
//! A script is a JSON document listing input events in order. Each event is
//! fed to a fresh [`AnnotationSurface`] backed by an [`InMemoryClient`];
//! remote completions are polled after every event. Event failures are
//! recorded in the summary and replay carries on, the same way the surface
//! degrades on invalid input. Inputs the surface ignores (a click inside the
//! drag guard, an image that was not awaited) are reported as failures too.
//!
//! Replay runs on its own clock. An event may carry `at_ms`, its time since
//! the start of the script; events without one happen a second after the
//! previous event.
//!
//! ```json
//! {
//!   "ground_truth": {"oxy1": [{"x": 10, "y": 10, "label": "tau"}]},
//!   "queues": {"required": [{"id": 1, "name": "oxy1", "url": "oxy1.jpg"}]},
//!   "events": [
//!     {"type": "request_task", "workspace": "required"},
//!     {"type": "image_loaded", "url": "oxy1.jpg", "width": 800, "height": 600},
//!     {"type": "mode", "mode": "counting"},
//!     {"type": "label", "label": "tau"},
//!     {"type": "click", "x": 12, "y": 11, "at_ms": 4000},
//!     {"type": "submit"}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use web_time::Instant;

use crate::collab::CollabEvent;
use crate::config::AnnotatorConfig;
use crate::error::Result;
use crate::geometry::{Point, Rotation};
use crate::ground_truth::GroundTruth;
use crate::mode::Mode;
use crate::model::{Marker, MarkerId, MeasurementId, Region};
use crate::remote::{EntityType, InMemoryClient, Task};
use crate::scoring::ScoreTally;
use crate::session::AnnotationSurface;
use crate::workspace::WorkspaceName;

/// Errors that stop a replay before it starts.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to parse replay script: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// One recorded input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    LoadTask { workspace: WorkspaceName, task: Task },
    RequestTask { workspace: WorkspaceName },
    ImageLoaded { url: String, width: u32, height: u32 },
    Mode { mode: String },
    Label { label: Option<String> },
    Click { x: f32, y: f32 },
    DragEnd { marker: MarkerId, x: f32, y: f32 },
    Relabel { marker: MarkerId, label: String },
    LabelSelected { label: String },
    Delete { marker: MarkerId },
    DeleteLabel { label: String },
    SelectNext,
    ZoomIn,
    ZoomOut,
    Rotate,
    Pan { dx: f32, dy: f32 },
    BeginMeasurement { region: Region, x: f32, y: f32 },
    UpdateMeasurement { x: f32, y: f32 },
    FinishMeasurement { x: f32, y: f32 },
    RemoveMeasurement { measurement: MeasurementId },
    Page { page: usize },
    Switch { workspace: String },
    Validate,
    Submit,
    Collab { event: CollabEvent },
    Reset,
}

/// Gap between consecutive events that carry no timestamp.
const EVENT_SPACING: Duration = Duration::from_secs(1);

/// An event with its optional timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Milliseconds since the start of the replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
    #[serde(flatten)]
    pub event: ReplayEvent,
}

impl From<ReplayEvent> for TimedEvent {
    fn from(event: ReplayEvent) -> Self {
        Self { at_ms: None, event }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayScript {
    /// Ground truth in the same shape as the ground-truth file.
    #[serde(default)]
    pub ground_truth: GroundTruth,
    /// Tasks waiting in each queue.
    #[serde(default)]
    pub queues: BTreeMap<String, Vec<Task>>,
    pub events: Vec<TimedEvent>,
}

impl ReplayScript {
    pub fn from_json(json: &str) -> std::result::Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> std::result::Result<Self, ReplayError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// An event that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayFailure {
    /// Index into the script's events.
    pub event: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementSummary {
    pub id: MeasurementId,
    pub region: Region,
    pub length: u32,
}

/// State of the surface after a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub applied: usize,
    pub failures: Vec<ReplayFailure>,
    pub workspace: WorkspaceName,
    pub mode: Mode,
    pub zoom: f32,
    pub rotation: Rotation,
    pub markers: Vec<Marker>,
    pub measurements: Vec<MeasurementSummary>,
    pub scores: Vec<ScoreTally>,
    pub responses: usize,
    pub remote_calls: usize,
    pub remote_failures: usize,
    pub render_commands: usize,
}

/// Whether the surface acted on an event.
enum Outcome {
    Applied,
    Ignored(&'static str),
}

/// Drives a surface through a script.
pub struct Replayer {
    surface: AnnotationSurface,
    client: InMemoryClient,
    start: Instant,
    /// Time of the event being applied.
    now: Instant,
    /// Last measurement begun, the target of update/finish events.
    measurement: Option<MeasurementId>,
    scores: Vec<ScoreTally>,
    render_commands: usize,
}

impl Replayer {
    pub fn new(config: AnnotatorConfig, script: &ReplayScript) -> Self {
        let client = InMemoryClient::new();
        for (queue, tasks) in &script.queues {
            for task in tasks {
                client.enqueue_task(queue, task.clone());
            }
        }
        let start = Instant::now();

        Self {
            surface: AnnotationSurface::new(config, Box::new(client.clone()), script.ground_truth.clone()),
            client,
            start,
            now: start,
            measurement: None,
            scores: Vec::new(),
            render_commands: 0,
        }
    }

    pub fn surface(&self) -> &AnnotationSurface {
        &self.surface
    }

    pub fn run(mut self, events: &[TimedEvent]) -> ReplaySummary {
        let mut applied = 0;
        let mut failures = Vec::new();
        for (index, timed) in events.iter().enumerate() {
            self.advance_clock(timed.at_ms, index);
            match self.apply(&timed.event) {
                Ok(Outcome::Applied) => applied += 1,
                Ok(Outcome::Ignored(reason)) => {
                    log::warn!("Replay event {} ignored: {}", index, reason);
                    failures.push(ReplayFailure {
                        event: index,
                        error: reason.to_string(),
                    });
                }
                Err(e) => {
                    log::warn!("Replay event {} failed: {}", index, e);
                    failures.push(ReplayFailure {
                        event: index,
                        error: e.to_string(),
                    });
                }
            }
            self.surface.poll_remote();
            self.render_commands += self.surface.drain_render().len();
        }
        self.summary(applied, failures)
    }

    /// Move the clock to the event's timestamp, or one spacing past the
    /// previous event. Timestamps never move the clock backwards.
    fn advance_clock(&mut self, at_ms: Option<u64>, index: usize) {
        let next = match at_ms {
            Some(ms) => self.start + Duration::from_millis(ms),
            None if index == 0 => self.start,
            None => self.now + EVENT_SPACING,
        };
        self.now = next.max(self.now);
    }

    fn apply(&mut self, event: &ReplayEvent) -> Result<Outcome> {
        let surface = &mut self.surface;
        let now = self.now;
        match event {
            ReplayEvent::LoadTask { workspace, task } => surface.load_task(*workspace, task.clone()),
            ReplayEvent::RequestTask { workspace } => surface.request_task(*workspace),
            ReplayEvent::ImageLoaded { url, width, height } => {
                if !surface.image_loaded(url, *width, *height) {
                    return Ok(Outcome::Ignored("image was not awaited"));
                }
            }
            ReplayEvent::Mode { mode } => {
                surface.change_mode_named(mode);
            }
            ReplayEvent::Label { label } => surface.set_active_label(label.as_deref()),
            ReplayEvent::Click { x, y } => {
                if surface.click_at(Point::new(*x, *y), now)?.is_none() {
                    return Ok(Outcome::Ignored("click too soon after a drag"));
                }
            }
            ReplayEvent::DragEnd { marker, x, y } => surface.drag_end_at(*marker, Point::new(*x, *y), now)?,
            ReplayEvent::Relabel { marker, label } => surface.relabel(*marker, label)?,
            ReplayEvent::LabelSelected { label } => {
                surface.label_selected(label)?;
            }
            ReplayEvent::Delete { marker } => {
                surface.delete_marker(*marker);
            }
            ReplayEvent::DeleteLabel { label } => {
                surface.delete_by_label(label);
            }
            ReplayEvent::SelectNext => {
                surface.select_next(true);
            }
            ReplayEvent::ZoomIn => {
                surface.zoom_in();
            }
            ReplayEvent::ZoomOut => {
                surface.zoom_out();
            }
            ReplayEvent::Rotate => {
                surface.rotate_clockwise();
            }
            ReplayEvent::Pan { dx, dy } => surface.pan_by(*dx, *dy),
            ReplayEvent::BeginMeasurement { region, x, y } => {
                self.measurement = Some(surface.begin_measurement(*region, Point::new(*x, *y))?);
            }
            ReplayEvent::UpdateMeasurement { x, y } => {
                if let Some(id) = self.measurement {
                    surface.update_measurement(id, Point::new(*x, *y))?;
                }
            }
            ReplayEvent::FinishMeasurement { x, y } => {
                if let Some(id) = self.measurement.take() {
                    surface.finish_measurement(id, Point::new(*x, *y))?;
                }
            }
            ReplayEvent::RemoveMeasurement { measurement } => {
                surface.remove_measurement(*measurement);
            }
            ReplayEvent::Page { page } => surface.go_to_page(*page)?,
            ReplayEvent::Switch { workspace } => {
                surface.switch_workspace_named(workspace)?;
            }
            ReplayEvent::Validate => self.scores.push(surface.validate_practice()),
            ReplayEvent::Submit => {
                if let Some(tally) = surface.submit()? {
                    self.scores.push(tally);
                }
            }
            ReplayEvent::Collab { event } => {
                surface.handle_collab(event);
            }
            ReplayEvent::Reset => surface.reset_surface(),
        }
        Ok(Outcome::Applied)
    }

    fn summary(self, applied: usize, failures: Vec<ReplayFailure>) -> ReplaySummary {
        let surface = &self.surface;
        ReplaySummary {
            applied,
            failures,
            workspace: surface.active_workspace(),
            mode: surface.mode(),
            zoom: surface.viewport().zoom,
            rotation: surface.viewport().rotation,
            markers: surface.markers().iter().cloned().collect(),
            measurements: surface
                .measurements()
                .iter()
                .map(|m| MeasurementSummary {
                    id: m.id,
                    region: m.region,
                    length: m.length(),
                })
                .collect(),
            scores: self.scores,
            responses: self.client.records(EntityType::Response).len(),
            remote_calls: self.client.calls().len(),
            remote_failures: surface.remote_failures(),
            render_commands: self.render_commands,
        }
    }
}

/// Replay a script with `config` and summarise the result.
pub fn replay(config: AnnotatorConfig, script: &ReplayScript) -> ReplaySummary {
    Replayer::new(config, script).run(&script.events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnotatorError;

    const SCRIPT: &str = r#"{
        "ground_truth": {"oxy1": [{"x": 10, "y": 10, "label": "tau"}, {"x": 50, "y": 50, "label": "tau"}]},
        "queues": {"required": [{"id": 1, "name": "oxy1-required", "url": "oxy1.jpg"}]},
        "events": [
            {"type": "click", "x": 1, "y": 1},
            {"type": "request_task", "workspace": "required"},
            {"type": "image_loaded", "url": "oxy1.jpg", "width": 800, "height": 600},
            {"type": "mode", "mode": "counting"},
            {"type": "label", "label": "tau"},
            {"type": "click", "x": 12, "y": 11},
            {"type": "click", "x": 90, "y": 90},
            {"type": "switch", "workspace": "archive"},
            {"type": "submit"}
        ]
    }"#;

    #[test]
    fn test_replay_script() {
        let script = ReplayScript::from_json(SCRIPT).unwrap();
        let summary = replay(AnnotatorConfig::default(), &script);

        assert_eq!(summary.applied, 7);
        let failed: Vec<usize> = summary.failures.iter().map(|f| f.event).collect();
        assert_eq!(failed, vec![0, 7]);
        assert_eq!(summary.failures[0].error, AnnotatorError::ImageNotReady.to_string());

        assert_eq!(
            summary.scores,
            vec![ScoreTally {
                true_positive: 1,
                false_positive: 1,
                false_negative: 1
            }]
        );
        assert_eq!(summary.responses, 1);
        assert!(summary.markers.is_empty());
        assert_eq!(summary.mode, Mode::Uninitialized);
        assert!(summary.render_commands > 0);
    }

    #[test]
    fn test_measurements_in_summary() {
        let script = ReplayScript::from_json(
            r#"{"events": [
                {"type": "load_task", "workspace": "required", "task": {"id": 3, "name": "t", "url": "t.jpg"}},
                {"type": "image_loaded", "url": "t.jpg", "width": 100, "height": 100},
                {"type": "mode", "mode": "measure"},
                {"type": "begin_measurement", "region": "column", "x": 0, "y": 0},
                {"type": "update_measurement", "x": 3, "y": 4},
                {"type": "finish_measurement", "x": 6, "y": 8}
            ]}"#,
        )
        .unwrap();
        let summary = replay(AnnotatorConfig::default(), &script);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.measurements.len(), 1);
        assert_eq!(summary.measurements[0].length, 10);
        assert_eq!(summary.measurements[0].region, Region::Column);
    }

    #[test]
    fn test_clicks_follow_script_clock() {
        let script = ReplayScript::from_json(
            r#"{"events": [
                {"type": "load_task", "workspace": "required", "task": {"id": 3, "name": "t", "url": "t.jpg"}},
                {"type": "image_loaded", "url": "t.jpg", "width": 100, "height": 100},
                {"type": "mode", "mode": "transcription"},
                {"type": "click", "x": 10, "y": 10},
                {"type": "drag_end", "marker": 1, "x": 20, "y": 20},
                {"type": "click", "x": 40, "y": 40},
                {"type": "drag_end", "marker": 2, "x": 45, "y": 45, "at_ms": 10000},
                {"type": "click", "x": 60, "y": 60, "at_ms": 10050},
                {"type": "click", "x": 70, "y": 70},
                {"type": "image_loaded", "url": "old.jpg", "width": 5, "height": 5}
            ]}"#,
        )
        .unwrap();
        let summary = replay(AnnotatorConfig::default(), &script);

        assert_eq!(summary.markers.len(), 3);
        let failed: Vec<usize> = summary.failures.iter().map(|f| f.event).collect();
        assert_eq!(failed, vec![7, 9]);
        assert_eq!(summary.failures[0].error, "click too soon after a drag");
        assert_eq!(summary.applied, 8);
    }

    #[test]
    fn test_index_keyed_ground_truth() {
        let script = ReplayScript::from_json(
            r#"{
                "ground_truth": {"oxy1": {"1": {"x": 50, "y": 50, "label": "tau"}, "0": {"x": 10, "y": 10, "label": "tau"}}},
                "events": [
                    {"type": "load_task", "workspace": "required", "task": {"id": 1, "name": "oxy1-required", "url": "oxy1.jpg"}},
                    {"type": "image_loaded", "url": "oxy1.jpg", "width": 800, "height": 600},
                    {"type": "mode", "mode": "transcription"},
                    {"type": "click", "x": 11, "y": 10},
                    {"type": "click", "x": 49, "y": 52},
                    {"type": "submit"}
                ]
            }"#,
        )
        .unwrap();
        let known = script.ground_truth.for_task("oxy1").unwrap();
        assert_eq!(known[0].x, 10.0);

        let summary = replay(AnnotatorConfig::default(), &script);
        assert!(summary.failures.is_empty());
        assert_eq!(
            summary.scores,
            vec![ScoreTally {
                true_positive: 2,
                false_positive: 0,
                false_negative: 0
            }]
        );
    }

    #[test]
    fn test_bad_script() {
        assert!(matches!(
            ReplayScript::from_json(r#"{"events": [{"type": "teleport"}]}"#),
            Err(ReplayError::ParseError(_))
        ));
    }
}
