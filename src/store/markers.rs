//! Marker store: id → marker, per-label counters and traversal order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::constants::COUNT_PLACEHOLDER;
use crate::error::{AnnotatorError, Result};
use crate::geometry::{Point, Viewport};
use crate::mode::Mode;
use crate::model::{IdGenerator, MatchStatus, Marker, MarkerId, RemoteId};

// ============================================================================
// Label counters
// ============================================================================

/// Counting-mode tallies per label.
///
/// A label that has never been counted displays the placeholder; once counted
/// it shows a plain integer that can fall back to zero but never below.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCounters {
    counts: BTreeMap<String, u32>,
}

impl LabelCounters {
    pub fn increment(&mut self, label: &str) -> u32 {
        let count = self.counts.entry(label.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrement a counted label. Uncounted labels stay on the placeholder.
    pub fn decrement(&mut self, label: &str) -> Option<u32> {
        let count = self.counts.get_mut(label)?;
        *count = count.saturating_sub(1);
        Some(*count)
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.counts.get(label).copied()
    }

    /// Text shown next to the label in the counter panel.
    pub fn display(&self, label: &str) -> String {
        self.get(label)
            .map_or_else(|| COUNT_PLACEHOLDER.to_string(), |c| c.to_string())
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(label, count)| (label.as_str(), *count))
    }
}

// ============================================================================
// Traversal order
// ============================================================================

/// Reading-order comparison of two screen positions.
///
/// Points whose vertical distance is below `line_height` share a line and
/// order left to right; otherwise the higher one comes first. This is not a
/// total order, so it must only be used with an insertion sort.
pub fn reading_order(a: Point, b: Point, line_height: f32) -> Ordering {
    if a == b {
        Ordering::Equal
    } else if (a.y - b.y).abs() < line_height {
        a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
    } else {
        a.y.total_cmp(&b.y)
    }
}

/// Insertion sort. Tolerates comparators that are not transitive, which
/// `slice::sort_by` may panic on.
fn stable_sort_by<T>(items: &mut [T], mut compare: impl FnMut(&T, &T) -> Ordering) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && compare(&items[j - 1], &items[j]) == Ordering::Greater {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}

// ============================================================================
// Marker store
// ============================================================================

/// The live set of markers for the active workspace.
///
/// Cloning the store is how workspaces snapshot it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerStore {
    markers: BTreeMap<MarkerId, Marker>,
    counters: LabelCounters,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a marker at a screen position.
    ///
    /// Counting mode requires `label`; transcription places an unfinished
    /// marker when no label is given. Any other mode rejects the click.
    pub fn create(
        &mut self,
        mode: Mode,
        screen: Point,
        label: Option<&str>,
        viewport: &Viewport,
        ids: &mut dyn IdGenerator,
    ) -> Result<MarkerId> {
        if !mode.accepts_markers() {
            return Err(AnnotatorError::invalid_mode(mode.name()));
        }
        let label = label.unwrap_or_default();
        if mode.requires_label() && label.is_empty() {
            return Err(AnnotatorError::NoLabelSelected);
        }

        let id = ids.next_marker_id();
        let marker = Marker::new(id, viewport.to_logical(screen), label, viewport.rotation);
        if mode == Mode::Counting {
            let count = self.counters.increment(label);
            log::debug!("🔢 {} count: {}", label, count);
        }
        log::debug!("📍 Marker {} at ({:.1}, {:.1})", id, marker.position.x, marker.position.y);
        self.markers.insert(id, marker);
        Ok(id)
    }

    /// Insert a fully formed marker (state load, collaboration).
    pub fn insert(&mut self, marker: Marker) {
        self.markers.insert(marker.id, marker);
    }

    pub fn relabel(&mut self, id: MarkerId, label: &str) -> Result<&Marker> {
        let marker = self
            .markers
            .get_mut(&id)
            .ok_or(AnnotatorError::UnknownMarker(id))?;
        marker.set_label(label);
        Ok(marker)
    }

    /// Commit a drag: recompute the logical position from a screen point.
    pub fn move_to(&mut self, id: MarkerId, screen: Point, viewport: &Viewport) -> Result<&Marker> {
        let marker = self
            .markers
            .get_mut(&id)
            .ok_or(AnnotatorError::UnknownMarker(id))?;
        marker.position = viewport.to_logical(screen);
        marker.rotation = viewport.rotation;
        Ok(marker)
    }

    /// Overwrite a logical position directly.
    pub fn set_position(&mut self, id: MarkerId, logical: Point) -> Result<&Marker> {
        let marker = self
            .markers
            .get_mut(&id)
            .ok_or(AnnotatorError::UnknownMarker(id))?;
        marker.position = logical;
        Ok(marker)
    }

    pub fn set_remote_id(&mut self, id: MarkerId, remote_id: RemoteId) -> bool {
        match self.markers.get_mut(&id) {
            Some(marker) => {
                marker.remote_id = Some(remote_id);
                true
            }
            None => false,
        }
    }

    /// Record how a marker fared in validation.
    pub fn set_match_status(&mut self, id: MarkerId, status: MatchStatus) -> bool {
        match self.markers.get_mut(&id) {
            Some(marker) => {
                marker.match_status = status;
                true
            }
            None => false,
        }
    }

    /// Remove a marker. Deleting an absent id is a no-op.
    ///
    /// In counting mode the label's counter drops by one.
    pub fn delete(&mut self, id: MarkerId, mode: Mode) -> Option<Marker> {
        let removed = self.markers.remove(&id)?;
        if mode == Mode::Counting {
            self.counters.decrement(&removed.label);
        }
        log::debug!("🗑 Marker {} deleted", id);
        Some(removed)
    }

    /// Remove every marker carrying `label`.
    ///
    /// In counting mode the label's counter drops once per removed marker;
    /// other labels keep their counts.
    pub fn delete_by_label(&mut self, label: &str, mode: Mode) -> Vec<Marker> {
        let ids: Vec<MarkerId> = self
            .markers
            .values()
            .filter(|m| m.label == label)
            .map(|m| m.id)
            .collect();
        let removed: Vec<Marker> = ids.iter().filter_map(|id| self.markers.remove(id)).collect();
        if mode == Mode::Counting {
            for _ in &removed {
                self.counters.decrement(label);
            }
        }
        if !removed.is_empty() {
            log::debug!("🗑 Deleted {} markers labelled '{}'", removed.len(), label);
        }
        removed
    }

    /// Markers in reading order as they appear on screen.
    ///
    /// `line_height` is the line band at zoom 1; it scales with the zoom.
    pub fn sorted_for_traversal(&self, viewport: &Viewport, line_height: f32) -> Vec<&Marker> {
        let band = line_height * viewport.zoom;
        let mut keyed: Vec<(Point, &Marker)> = self
            .markers
            .values()
            .map(|m| (viewport.to_screen(m.position), m))
            .collect();
        stable_sort_by(&mut keyed, |a, b| reading_order(a.0, b.0, band));
        keyed.into_iter().map(|(_, m)| m).collect()
    }

    /// The marker after `current` in traversal order.
    ///
    /// With no current marker (or one that no longer exists) the first
    /// marker is returned. At the end of the order the current marker stays.
    pub fn next_in_traversal(
        &self,
        current: Option<MarkerId>,
        viewport: &Viewport,
        line_height: f32,
    ) -> Option<MarkerId> {
        let order = self.sorted_for_traversal(viewport, line_height);
        let first = order.first().map(|m| m.id);
        let Some(current) = current else {
            return first;
        };
        match order.iter().position(|m| m.id == current) {
            Some(idx) => order.get(idx + 1).map_or(Some(current), |m| Some(m.id)),
            None => first,
        }
    }

    pub fn count_by_label(&self, label: &str) -> usize {
        self.markers.values().filter(|m| m.label == label).count()
    }

    /// Rebuild the counters from the markers currently held.
    pub fn recount(&mut self) {
        self.counters.clear();
        for marker in self.markers.values() {
            if !marker.label.is_empty() {
                self.counters.increment(&marker.label);
            }
        }
    }

    pub fn counters(&self) -> &LabelCounters {
        &self.counters
    }

    pub fn find_by_remote_id(&self, remote_id: RemoteId) -> Option<MarkerId> {
        self.markers
            .values()
            .find(|m| m.remote_id == Some(remote_id))
            .map(|m| m.id)
    }

    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.markers.contains_key(&id)
    }

    /// Markers in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Drop all markers and reset counters to the placeholder.
    pub fn clear(&mut self) {
        self.markers.clear();
        self.counters.clear();
    }
}
