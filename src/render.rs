//! Declarative instructions for the rendering layer.
//!
//! The surface never touches a view. It queues [`RenderCommand`]s which the
//! host drains after each input event and applies in order.

use serde::Serialize;

use crate::geometry::Point;
use crate::model::{MarkerId, MatchStatus, MeasurementId};
use crate::workspace::WorkspaceName;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RenderCommand {
    LoadImage {
        url: String,
    },
    /// Draw or move a marker, centred on `screen`.
    PlaceMarker {
        id: MarkerId,
        screen: Point,
        size: f32,
        label: String,
        unfinished: bool,
        status: MatchStatus,
    },
    RemoveMarker {
        id: MarkerId,
    },
    ClearMarkers,
    Select {
        id: Option<MarkerId>,
    },
    /// Ground-truth ring shown after practice validation.
    ShowOverlay {
        screen: Point,
        size: f32,
        status: MatchStatus,
    },
    ClearOverlays,
    /// Measurement line in canvas space.
    DrawMeasurement {
        id: MeasurementId,
        start: Point,
        end: Point,
        label_position: Point,
        length: u32,
    },
    RemoveMeasurement {
        id: MeasurementId,
    },
    SetMarkersVisible {
        visible: bool,
    },
    SetMeasurementsVisible {
        visible: bool,
    },
    SetLabelCount {
        label: String,
        text: String,
    },
    ShowPage {
        page: usize,
        total: usize,
    },
    /// Image transform after zoom or rotation.
    SetTransform {
        zoom: f32,
        degrees: u16,
        width: f32,
        height: f32,
        margin: Point,
    },
    SetZoomControls {
        can_zoom_in: bool,
        can_zoom_out: bool,
    },
    /// Mini-map dot for a marker saved by someone else.
    FlashMapMarker {
        position: Point,
    },
    /// Scroll the viewer so a point is visible.
    PanTo {
        pan: Point,
    },
    Notify {
        message: String,
    },
    /// A task queue is empty; the host tells the participant they are done.
    QueueExhausted {
        workspace: WorkspaceName,
    },
}

/// Commands accumulated since the last drain.
#[derive(Debug, Clone, Default)]
pub struct RenderQueue {
    commands: Vec<RenderCommand>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    pub fn drain(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn pending(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
