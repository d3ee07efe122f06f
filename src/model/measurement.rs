//! Two-point distance measurements.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::MEASUREMENT_LABEL_BIAS;
use crate::geometry::{Point, Viewport, distance_rounded};
use crate::model::MeasurementId;

/// Where on the page a measurement's result is reported.
///
/// The four margins hold a single result each; the column region feeds the
/// paginated result strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Top,
    Bottom,
    Left,
    Right,
    Column,
}

impl Region {
    pub fn name(&self) -> &'static str {
        match self {
            Region::Top => "top",
            Region::Bottom => "bottom",
            Region::Left => "left",
            Region::Right => "right",
            Region::Column => "column",
        }
    }

    /// Whether results for this region go to the paginated strip.
    pub fn is_paginated(&self) -> bool {
        matches!(self, Region::Column)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A line measurement between two logical points.
///
/// `start`/`end` never change with the viewport. `canvas_start`/`canvas_end`
/// hold the drawn projection and are batch-updated on zoom and rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    pub region: Region,
    pub start: Point,
    pub end: Point,
    #[serde(skip)]
    pub canvas_start: Point,
    #[serde(skip)]
    pub canvas_end: Point,
}

impl Measurement {
    /// Create a measurement from logical endpoints, projected through `viewport`.
    pub fn new(id: MeasurementId, region: Region, start: Point, end: Point, viewport: &Viewport) -> Self {
        Self {
            id,
            region,
            start,
            end,
            canvas_start: viewport.to_canvas(start),
            canvas_end: viewport.to_canvas(end),
        }
    }

    /// Length in whole logical pixels.
    pub fn length(&self) -> u32 {
        distance_rounded(self.start, self.end)
    }

    /// Canvas position of the length label.
    pub fn label_position(&self) -> Point {
        label_position(self.canvas_start, self.canvas_end)
    }
}

/// Label anchor for a segment: its midpoint shifted by the fixed visual bias.
pub(crate) fn label_position(a: Point, b: Point) -> Point {
    a.midpoint(&b)
        .offset(MEASUREMENT_LABEL_BIAS.0, MEASUREMENT_LABEL_BIAS.1)
}
