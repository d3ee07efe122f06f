//! Mini-map coordinate mapping.
//!
//! The mini-map shows a thumbnail of the task image with the viewer's
//! visible region outlined. Only the mappings live here; drawing is the
//! host's business.

use crate::constants::{REVEAL_PADDING, THUMBNAIL_MAX_HEIGHT, THUMBNAIL_MAX_WIDTH};
use crate::geometry::Point;

/// Shrink an image size to fit the thumbnail box, keeping the aspect ratio.
/// Fractional pixels are floored. Images already inside the box keep their
/// size.
pub fn fit_thumbnail(width: u32, height: u32) -> (u32, u32) {
    let (mut w, mut h) = (u64::from(width), u64::from(height));
    let (max_w, max_h) = (u64::from(THUMBNAIL_MAX_WIDTH), u64::from(THUMBNAIL_MAX_HEIGHT));
    if w > max_w {
        h = max_w * h / w;
        w = max_w;
    }
    if h > max_h {
        w = max_h * w / h;
        h = max_h;
    }
    (narrow(w), narrow(h))
}

fn narrow(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// An axis-aligned rectangle in map pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Thumbnail of one task image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiniMap {
    pub thumb_width: u32,
    pub thumb_height: u32,
    /// Natural image size.
    pub image_width: u32,
    pub image_height: u32,
}

impl MiniMap {
    pub fn new(image_width: u32, image_height: u32) -> Self {
        let (thumb_width, thumb_height) = fit_thumbnail(image_width, image_height);
        Self {
            thumb_width,
            thumb_height,
            image_width,
            image_height,
        }
    }

    /// Map position of a logical image point.
    pub fn image_to_map(&self, logical: Point) -> Point {
        if self.image_width == 0 || self.image_height == 0 {
            return Point::ORIGIN;
        }
        Point::new(
            logical.x / self.image_width as f32 * self.thumb_width as f32,
            logical.y / self.image_height as f32 * self.thumb_height as f32,
        )
    }

    /// Map pixels → displayed image pixels, for an image shown
    /// `displayed_width` wide.
    pub fn map_to_display_factor(&self, displayed_width: f32) -> f32 {
        if self.thumb_width == 0 {
            return 0.0;
        }
        displayed_width / self.thumb_width as f32
    }

    /// Canvas point under a click on the map.
    pub fn map_to_canvas(&self, map: Point, displayed_width: f32) -> Point {
        map.scaled(self.map_to_display_factor(displayed_width))
    }

    /// The visible region outline: the viewer rectangle at `pan`, scaled
    /// into map pixels.
    pub fn location(&self, pan: Point, viewer: (f32, f32), displayed_width: f32) -> MapRect {
        let factor = self.map_to_display_factor(displayed_width);
        if factor == 0.0 {
            return MapRect {
                left: 0.0,
                top: 0.0,
                width: 0.0,
                height: 0.0,
            };
        }
        MapRect {
            left: -pan.x / factor,
            top: -pan.y / factor,
            width: viewer.0 / factor,
            height: viewer.1 / factor,
        }
    }
}

/// Pan delta that brings a canvas point at least `REVEAL_PADDING` inside the
/// viewer. `None` if it is already comfortably visible.
///
/// `pan` is the canvas offset within the viewer; `viewer` its size.
pub fn reveal(target: Point, pan: Point, viewer: (f32, f32)) -> Option<Point> {
    let left = -pan.x + REVEAL_PADDING;
    let right = -pan.x + viewer.0 - REVEAL_PADDING;
    let top = -pan.y + REVEAL_PADDING;
    let bottom = -pan.y + viewer.1 - REVEAL_PADDING;

    let mut delta = Point::ORIGIN;
    if target.y < top {
        delta.y = top - target.y;
    }
    if target.y > bottom {
        delta.y = bottom - target.y;
    }
    if target.x < left {
        delta.x = left - target.x;
    }
    if target.x > right {
        delta.x = right - target.x;
    }

    (delta != Point::ORIGIN).then_some(delta)
}
