//! The two parallel annotation workspaces and switching between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnnotatorError;
use crate::geometry::{PanOffset, Viewport};
use crate::model::{MarkerId, RemoteId};
use crate::remote::Task;
use crate::store::MarkerStore;

/// Workspace names. The wire form is lowercase (`"required"`, `"practice"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceName {
    #[default]
    Required,
    Practice,
}

impl WorkspaceName {
    pub fn name(&self) -> &'static str {
        match self {
            WorkspaceName::Required => "required",
            WorkspaceName::Practice => "practice",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            WorkspaceName::Required => WorkspaceName::Practice,
            WorkspaceName::Practice => WorkspaceName::Required,
        }
    }
}

impl fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkspaceName {
    type Err = AnnotatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(WorkspaceName::Required),
            "practice" => Ok(WorkspaceName::Practice),
            other => Err(AnnotatorError::UnknownWorkspace(other.to_string())),
        }
    }
}

/// What a workspace remembers while it is not active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceSnapshot {
    pub task: Option<Task>,
    pub markers: MarkerStore,
    pub pan: PanOffset,
}

/// Whether the task image has finished loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageGate {
    /// No image requested yet
    Closed,
    /// Waiting for the image at this url
    Loading(String),
    /// The image at this url is showing
    Open(String),
}

/// Result of a workspace switch.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchOutcome {
    pub from: WorkspaceName,
    pub to: WorkspaceName,
    /// Task whose image must now be loaded.
    pub task: Option<Task>,
}

/// Holder of both workspaces. The active one's markers live outside, in the
/// surface's marker store; its slot here is empty until it is switched out.
#[derive(Debug, Clone)]
pub struct Workspaces {
    active: WorkspaceName,
    required: WorkspaceSnapshot,
    practice: WorkspaceSnapshot,
    gate: ImageGate,
}

impl Workspaces {
    pub fn new() -> Self {
        Self {
            active: WorkspaceName::Required,
            required: WorkspaceSnapshot::default(),
            practice: WorkspaceSnapshot::default(),
            gate: ImageGate::Closed,
        }
    }

    pub fn active(&self) -> WorkspaceName {
        self.active
    }

    fn slot(&self, name: WorkspaceName) -> &WorkspaceSnapshot {
        match name {
            WorkspaceName::Required => &self.required,
            WorkspaceName::Practice => &self.practice,
        }
    }

    fn slot_mut(&mut self, name: WorkspaceName) -> &mut WorkspaceSnapshot {
        match name {
            WorkspaceName::Required => &mut self.required,
            WorkspaceName::Practice => &mut self.practice,
        }
    }

    /// Stored snapshot of a workspace. For the active workspace only the
    /// task is meaningful.
    pub fn snapshot(&self, name: WorkspaceName) -> &WorkspaceSnapshot {
        self.slot(name)
    }

    /// Task of the active workspace.
    pub fn task(&self) -> Option<&Task> {
        self.slot(self.active).task.as_ref()
    }

    /// Assign a task to a workspace. Assigning to the active workspace
    /// closes the image gate until its image loads.
    pub fn set_task(&mut self, name: WorkspaceName, task: Task) {
        if name == self.active {
            self.gate = ImageGate::Loading(task.url.clone());
        }
        log::debug!("📋 Task '{}' assigned to {}", task.name, name);
        self.slot_mut(name).task = Some(task);
    }

    /// Swap the live marker store and viewport with the target workspace.
    ///
    /// The outgoing markers and pan are snapshotted, the viewport resets to
    /// zoom 1 and no rotation, and the incoming snapshot becomes live. The
    /// image gate closes until the incoming task's image reports loaded.
    pub fn switch_to(
        &mut self,
        target: WorkspaceName,
        live: &mut MarkerStore,
        viewport: &mut Viewport,
    ) -> SwitchOutcome {
        let from = self.active;
        let outgoing = self.slot_mut(from);
        outgoing.markers = std::mem::take(live);
        outgoing.pan = viewport.pan();

        viewport.reset();

        let incoming = self.slot_mut(target);
        *live = std::mem::take(&mut incoming.markers);
        viewport.set_pan(std::mem::take(&mut incoming.pan));
        let task = incoming.task.clone();

        self.active = target;
        self.gate = match &task {
            Some(t) => ImageGate::Loading(t.url.clone()),
            None => ImageGate::Closed,
        };
        log::info!("🔁 Switched workspace {} -> {} ({} markers restored)", from, target, live.len());

        SwitchOutcome { from, to: target, task }
    }

    /// [`Workspaces::switch_to`] by name.
    pub fn switch_named(
        &mut self,
        name: &str,
        live: &mut MarkerStore,
        viewport: &mut Viewport,
    ) -> Result<SwitchOutcome, AnnotatorError> {
        let target = name.parse::<WorkspaceName>()?;
        Ok(self.switch_to(target, live, viewport))
    }

    /// Record a remote id on a marker held in an inactive workspace's
    /// snapshot. Returns false when no snapshot holds the marker.
    pub fn set_remote_id(&mut self, marker: MarkerId, remote: RemoteId) -> bool {
        let other = self.active.other();
        self.slot_mut(other).markers.set_remote_id(marker, remote)
    }

    pub fn gate(&self) -> &ImageGate {
        &self.gate
    }

    /// Whether edits are accepted.
    pub fn is_ready(&self) -> bool {
        matches!(self.gate, ImageGate::Open(_))
    }

    /// Record that an image finished loading. Loads for any url other than
    /// the awaited (or already showing) one are stale and ignored. Returns
    /// whether `url` is the image now showing.
    pub fn image_loaded(&mut self, url: &str) -> bool {
        match &self.gate {
            ImageGate::Loading(awaited) if awaited == url => {
                self.gate = ImageGate::Open(url.to_string());
                true
            }
            ImageGate::Open(showing) if showing == url => true,
            _ => {
                log::debug!("Ignoring stale image load for {}", url);
                false
            }
        }
    }
}

impl Default for Workspaces {
    fn default() -> Self {
        Self::new()
    }
}
