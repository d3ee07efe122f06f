//! Data models for the annotation surface.

mod ids;
mod marker;
mod measurement;

pub use ids::{ActorId, IdGenerator, MarkerId, MeasurementId, RemoteId, SequentialIds};
pub use marker::{MatchStatus, Marker, MarkerState};
pub use measurement::{Measurement, Region};
