//! Measurement store: one pending measurement plus committed results.
//!
//! Committed measurements keep logical endpoints. Their drawn (canvas)
//! projection is batch-updated by [`MeasurementStore::rescale`] and
//! [`MeasurementStore::rotate`]; the pending measurement is never touched by
//! either and is reprojected from its logical endpoints on the next update.

use std::collections::BTreeMap;

use crate::error::{AnnotatorError, Result};
use crate::geometry::{Point, Rotation, Viewport, rotate};
use crate::model::{IdGenerator, Measurement, MeasurementId, Region};
use crate::pagination::{PageLimits, Paginator};

/// Live feedback while a measurement is being dragged out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementProgress {
    pub id: MeasurementId,
    /// Rounded logical length.
    pub length: u32,
    /// Canvas anchor of the length label.
    pub label_position: Point,
}

impl MeasurementProgress {
    fn of(measurement: &Measurement) -> Self {
        Self {
            id: measurement.id,
            length: measurement.length(),
            label_position: measurement.label_position(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementStore {
    pending: Option<Measurement>,
    committed: BTreeMap<MeasurementId, Measurement>,
    /// Column results, paginated.
    strip: Paginator<MeasurementId>,
    /// Margin results, one per region.
    margins: BTreeMap<Region, MeasurementId>,
}

impl MeasurementStore {
    pub fn new(limits: PageLimits, show_last: bool) -> Self {
        Self {
            pending: None,
            committed: BTreeMap::new(),
            strip: Paginator::new(limits).with_show_last(show_last),
            margins: BTreeMap::new(),
        }
    }

    /// Open a pending measurement anchored at a screen point.
    pub fn begin(
        &mut self,
        region: Region,
        screen: Point,
        viewport: &Viewport,
        ids: &mut dyn IdGenerator,
    ) -> Result<MeasurementId> {
        if let Some(pending) = &self.pending {
            return Err(AnnotatorError::MeasurementInProgress(pending.id));
        }
        self.check_capacity(region)?;

        let id = ids.next_measurement_id();
        let anchor = viewport.to_logical(screen);
        self.pending = Some(Measurement::new(id, region, anchor, anchor, viewport));
        log::debug!("📏 Measurement {} started in {}", id, region);
        Ok(id)
    }

    fn check_capacity(&self, region: Region) -> Result<()> {
        if region.is_paginated() {
            if !self.strip.has_space() {
                let limits = self.strip.limits();
                return Err(AnnotatorError::PaginationFull {
                    max_pages: limits.max_pages,
                    page_size: limits.page_size,
                });
            }
        } else if self.margins.contains_key(&region) {
            return Err(AnnotatorError::RegionOccupied(region));
        }
        Ok(())
    }

    fn pending_mut(&mut self, id: MeasurementId) -> Result<&mut Measurement> {
        self.pending
            .as_mut()
            .filter(|m| m.id == id)
            .ok_or(AnnotatorError::UnknownMeasurement(id))
    }

    /// Move the free endpoint of the pending measurement.
    pub fn update(&mut self, id: MeasurementId, screen: Point, viewport: &Viewport) -> Result<MeasurementProgress> {
        let pending = self.pending_mut(id)?;
        pending.end = viewport.to_logical(screen);
        pending.canvas_start = viewport.to_canvas(pending.start);
        pending.canvas_end = viewport.to_canvas(pending.end);
        Ok(MeasurementProgress::of(pending))
    }

    /// Commit the pending measurement and file its result.
    pub fn finish(&mut self, id: MeasurementId, screen: Point, viewport: &Viewport) -> Result<MeasurementProgress> {
        let progress = self.update(id, screen, viewport)?;
        let Some(measurement) = self.pending.take() else {
            return Err(AnnotatorError::UnknownMeasurement(id));
        };

        if measurement.region.is_paginated() {
            self.strip.insert(id)?;
        } else {
            self.margins.insert(measurement.region, id);
        }
        log::debug!("📏 Measurement {} committed: {}px", id, progress.length);
        self.committed.insert(id, measurement);
        Ok(progress)
    }

    /// Drop the pending measurement, if any.
    pub fn cancel(&mut self) -> Option<MeasurementId> {
        let cancelled = self.pending.take().map(|m| m.id);
        if let Some(id) = cancelled {
            log::debug!("📏 Measurement {} cancelled", id);
        }
        cancelled
    }

    /// Delete a committed measurement and its result entry. Absent ids are a
    /// no-op.
    pub fn remove(&mut self, id: MeasurementId) -> Option<Measurement> {
        let removed = self.committed.remove(&id)?;
        if removed.region.is_paginated() {
            self.strip.remove(&id);
        } else {
            self.margins.retain(|_, held| *held != id);
        }
        Some(removed)
    }

    /// Rescale committed projections from one zoom factor to another.
    pub fn rescale(&mut self, zoom_from: f32, zoom_to: f32) {
        if zoom_from <= 0.0 {
            return;
        }
        let factor = zoom_to / zoom_from;
        for m in self.committed.values_mut() {
            m.canvas_start = m.canvas_start.scaled(factor);
            m.canvas_end = m.canvas_end.scaled(factor);
        }
    }

    /// Rotate committed projections by `step` clockwise.
    ///
    /// `before` is the viewport as it was prior to the rotation; its
    /// displayed size fixes where the rotated image lands.
    pub fn rotate(&mut self, step: Rotation, before: &Viewport) {
        let (w, h) = before.displayed_size();
        let offset = match step {
            Rotation::Deg0 => return,
            Rotation::Deg90 => Point::new(h, 0.0),
            Rotation::Deg180 => Point::new(w, h),
            Rotation::Deg270 => Point::new(0.0, w),
        };
        let angle = f32::from(step.degrees());
        for m in self.committed.values_mut() {
            m.canvas_start = rotate(m.canvas_start, angle, offset);
            m.canvas_end = rotate(m.canvas_end, angle, offset);
        }
    }

    /// Rounded logical length of a committed measurement.
    pub fn length(&self, id: MeasurementId) -> Option<u32> {
        self.committed.get(&id).map(Measurement::length)
    }

    pub fn get(&self, id: MeasurementId) -> Option<&Measurement> {
        self.committed.get(&id)
    }

    pub fn pending(&self) -> Option<&Measurement> {
        self.pending.as_ref()
    }

    /// Committed measurements in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.committed.values()
    }

    /// The result held by a margin region.
    pub fn margin(&self, region: Region) -> Option<&Measurement> {
        self.margins.get(&region).and_then(|id| self.committed.get(id))
    }

    pub fn strip(&self) -> &Paginator<MeasurementId> {
        &self.strip
    }

    pub fn go_to_page(&mut self, page: usize) -> Result<()> {
        self.strip.go_to(page)
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// Drop everything, including the pending measurement.
    pub fn clear(&mut self) {
        self.pending = None;
        self.committed.clear();
        self.margins.clear();
        self.strip.reset();
    }
}

impl Default for MeasurementStore {
    fn default() -> Self {
        Self::new(PageLimits::default(), true)
    }
}
