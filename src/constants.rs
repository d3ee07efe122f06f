//! Global constants for the annotation surface

/// Smallest zoom factor reachable by stepping.
pub const DEFAULT_MIN_ZOOM: f32 = 0.5;

/// Largest zoom factor reachable by stepping.
pub const DEFAULT_MAX_ZOOM: f32 = 1.5;

/// Zoom increment per zoom-in/zoom-out step.
pub const DEFAULT_ZOOM_STEP: f32 = 0.25;

/// Marker diameter in logical pixels at zoom 1.
pub const DEFAULT_MARKER_SIZE: f32 = 20.0;

/// Height of a reading line at zoom 1. Markers closer than this vertically
/// share a line for traversal ordering.
pub const TRAVERSAL_LINE_HEIGHT: f32 = 30.0;

/// Maximum truncated distance (logical pixels) at which a marker still
/// matches a ground-truth marker.
pub const MATCH_THRESHOLD: u32 = 30;

/// Offset from a measurement's midpoint to the top-left of its length label.
pub const MEASUREMENT_LABEL_BIAS: (f32, f32) = (-20.0, -10.0);

/// Result-strip items per page.
pub const DEFAULT_PAGE_SIZE: usize = 1;

/// Maximum number of result-strip pages.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// Clicks arriving this soon after a drag ends are treated as part of the drag.
pub const DRAG_CLICK_GUARD_MS: u64 = 100;

/// Text shown for a label counter that has never been incremented.
pub const COUNT_PLACEHOLDER: &str = "?";

/// Mini-map thumbnail bounding box.
pub const THUMBNAIL_MAX_WIDTH: u32 = 180;
pub const THUMBNAIL_MAX_HEIGHT: u32 = 240;

/// Padding kept between a revealed point and the viewer edge (screen pixels).
pub const REVEAL_PADDING: f32 = 100.0;
