//! Identifier types and the id generator service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local identity of a marker. Allocated by an [`IdGenerator`]; ordering
/// follows allocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(u64);

impl MarkerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m-{}", self.0)
    }
}

/// Local identity of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(u64);

impl MeasurementId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mm-{}", self.0)
    }
}

/// Identity assigned by the remote annotation server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub u64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant in a collaborative session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

/// Source of fresh local identifiers.
///
/// Injected into the surface so tests get deterministic ids.
pub trait IdGenerator {
    fn next_marker_id(&mut self) -> MarkerId;
    fn next_measurement_id(&mut self) -> MeasurementId;
}

/// Monotonic counter shared by markers and measurements.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Start counting from `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    fn bump(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_marker_id(&mut self) -> MarkerId {
        MarkerId(self.bump())
    }

    fn next_measurement_id(&mut self) -> MeasurementId {
        MeasurementId(self.bump())
    }
}
