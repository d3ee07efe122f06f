//! Authoritative in-memory stores for markers and measurements.

mod markers;
mod measurements;

pub use markers::{LabelCounters, MarkerStore, reading_order};
pub use measurements::{MeasurementProgress, MeasurementStore};
