//! Marker records.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rotation};
use crate::model::{MarkerId, RemoteId};

/// Lifecycle state of a placed marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerState {
    /// Placed but not yet given a label
    Unfinished,
    /// Carries a non-empty label
    Labeled,
}

/// Outcome of comparing a marker with the ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    /// Not yet scored
    #[default]
    Unmatched,
    /// Ground-truth marker matched by a user marker
    TruePositive,
    /// User marker that matched nothing
    FalsePositive,
    /// Ground-truth marker nobody found
    FalseNegative,
}

/// A point marker on the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    /// Logical (zoom 1, unrotated, unpanned) position.
    pub position: Point,
    pub label: String,
    /// Viewport rotation in effect when the marker was last placed or moved.
    pub rotation: Rotation,
    pub state: MarkerState,
    /// Server-side id, once the create call has been acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    /// Overlay generated from ground truth rather than placed by the user.
    #[serde(default)]
    pub is_known_annotation: bool,
    #[serde(default)]
    pub match_status: MatchStatus,
}

impl Marker {
    /// Create a marker. An empty label leaves it unfinished.
    pub fn new(id: MarkerId, position: Point, label: impl Into<String>, rotation: Rotation) -> Self {
        let label = label.into();
        let state = state_for(&label);
        Self {
            id,
            position,
            label,
            rotation,
            state,
            remote_id: None,
            is_known_annotation: false,
            match_status: MatchStatus::Unmatched,
        }
    }

    /// Build a ground-truth overlay marker with its match status.
    pub fn known_annotation(id: MarkerId, position: Point, label: impl Into<String>, status: MatchStatus) -> Self {
        let mut marker = Self::new(id, position, label, Rotation::Deg0);
        marker.is_known_annotation = true;
        marker.match_status = status;
        marker
    }

    pub fn with_remote_id(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    pub fn is_unfinished(&self) -> bool {
        self.state == MarkerState::Unfinished
    }

    /// Replace the label. A non-empty label finishes the marker; clearing it
    /// makes it unfinished again.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
        self.state = state_for(&self.label);
    }
}

fn state_for(label: &str) -> MarkerState {
    if label.is_empty() {
        MarkerState::Unfinished
    } else {
        MarkerState::Labeled
    }
}
