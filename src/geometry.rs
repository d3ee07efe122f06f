//! Coordinate mathematics for the annotation surface.
//!
//! Markers and measurements are stored in *logical* coordinates: image pixels at
//! zoom 1 with no rotation and no pan. Everything drawn on screen is a projection
//! of those coordinates through the current [`Viewport`]:
//!
//! 1. scale by the zoom factor,
//! 2. rotate clockwise about the image so it stays in the positive quadrant,
//! 3. translate by the pan offset.
//!
//! The intermediate space after step 2 (zoomed and rotated, but not panned) is
//! called the *canvas* space; measurement overlays are drawn there.

use serde::{Deserialize, Serialize};

/// A 2D point. Whether it is logical, canvas or screen space depends on context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f32 {
        distance(*self, *other)
    }

    /// Point halfway between `self` and `other`.
    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new(
            self.x + (other.x - self.x) / 2.0,
            self.y + (other.y - self.y) / 2.0,
        )
    }

    /// Translate by a delta.
    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Multiply both components by `factor`.
    pub fn scaled(&self, factor: f32) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Rotate `point` clockwise about the origin by `angle_degrees`, then translate
/// by `origin_offset`.
///
/// Clockwise is with respect to a y-down screen, which is the usual
/// counter-clockwise rotation matrix applied to y-down coordinates.
pub fn rotate(point: Point, angle_degrees: f32, origin_offset: Point) -> Point {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    Point::new(
        point.x * cos - point.y * sin + origin_offset.x,
        point.x * sin + point.y * cos + origin_offset.y,
    )
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Distance rounded to the nearest whole pixel (measurement lengths).
pub fn distance_rounded(a: Point, b: Point) -> u32 {
    distance(a, b).round() as u32
}

/// Distance with the fractional part discarded (accuracy scoring).
pub fn distance_truncated(a: Point, b: Point) -> u32 {
    distance(a, b).trunc() as u32
}

// ============================================================================
// Rotation
// ============================================================================

/// Image rotation. Only the four cardinal angles are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotation in degrees, clockwise.
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Parse an angle in degrees. Negative angles and multiples of 360 are
    /// normalised; anything off the cardinal grid returns `None`.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// The next rotation in 90° clockwise steps, wrapping at 360.
    pub fn next_clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    /// Whether width and height trade places on screen.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        Rotation::from_degrees(i32::from(degrees))
            .ok_or_else(|| format!("rotation must be 0, 90, 180 or 270 (got {degrees})"))
    }
}

/// Rotate a zoomed, unrotated point (`w`×`h` image) into the rotated canvas.
fn project_rotation(point: Point, rotation: Rotation, w: f32, h: f32) -> Point {
    match rotation {
        Rotation::Deg0 => point,
        Rotation::Deg90 => rotate(point, 90.0, Point::new(h, 0.0)),
        Rotation::Deg180 => rotate(point, 180.0, Point::new(w, h)),
        Rotation::Deg270 => rotate(point, 270.0, Point::new(0.0, w)),
    }
}

/// Inverse of [`project_rotation`].
fn unproject_rotation(point: Point, rotation: Rotation, w: f32, h: f32) -> Point {
    match rotation {
        Rotation::Deg0 => point,
        Rotation::Deg90 => rotate(point, 270.0, Point::new(0.0, h)),
        Rotation::Deg180 => rotate(point, 180.0, Point::new(w, h)),
        Rotation::Deg270 => rotate(point, 90.0, Point::new(w, 0.0)),
    }
}

// ============================================================================
// Viewport
// ============================================================================

/// Zoom bounds and step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl ZoomLimits {
    /// Clamp into `[min, max]`. Never panics; with inverted limits the
    /// result is `max`, and a NaN zoom becomes `min`.
    pub fn clamp(&self, zoom: f32) -> f32 {
        zoom.max(self.min).min(self.max)
    }

    /// Finite, positive bounds with `min <= max` and a positive step.
    pub fn is_valid(&self) -> bool {
        [self.min, self.max, self.step].iter().all(|v| v.is_finite())
            && self.min > 0.0
            && self.min <= self.max
            && self.step > 0.0
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: crate::constants::DEFAULT_MIN_ZOOM,
            max: crate::constants::DEFAULT_MAX_ZOOM,
            step: crate::constants::DEFAULT_ZOOM_STEP,
        }
    }
}

/// Pan offset, the part of the viewport a workspace remembers across switches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PanOffset {
    pub x: f32,
    pub y: f32,
}

/// The current zoom/rotation/pan transform over an image of known size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f32,
    pub rotation: Rotation,
    pub pan_x: f32,
    pub pan_y: f32,
    /// Natural image width in logical pixels.
    pub image_width: f32,
    /// Natural image height in logical pixels.
    pub image_height: f32,
}

impl Viewport {
    /// Identity viewport over an image of the given natural size.
    pub fn new(image_width: f32, image_height: f32) -> Self {
        Self {
            zoom: 1.0,
            rotation: Rotation::Deg0,
            pan_x: 0.0,
            pan_y: 0.0,
            image_width,
            image_height,
        }
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_pan(mut self, pan_x: f32, pan_y: f32) -> Self {
        self.pan_x = pan_x;
        self.pan_y = pan_y;
        self
    }

    /// Image size after zoom, before rotation.
    pub fn scaled_size(&self) -> (f32, f32) {
        (self.image_width * self.zoom, self.image_height * self.zoom)
    }

    /// Image extent on screen, with width and height swapped at 90°/270°.
    pub fn displayed_size(&self) -> (f32, f32) {
        let (w, h) = self.scaled_size();
        if self.rotation.swaps_axes() { (h, w) } else { (w, h) }
    }

    /// Margin correction for an image element rotated in place about its
    /// centre, so that its top-left lands at the canvas origin.
    pub fn rotation_margin(&self) -> Point {
        if !self.rotation.swaps_axes() {
            return Point::ORIGIN;
        }
        let (w, h) = self.scaled_size();
        let d = w - h;
        Point::new(-d / 2.0, d / 2.0)
    }

    /// Logical → canvas (zoomed and rotated, not panned).
    pub fn to_canvas(&self, logical: Point) -> Point {
        let (w, h) = self.scaled_size();
        project_rotation(logical.scaled(self.zoom), self.rotation, w, h)
    }

    /// Canvas → logical.
    pub fn from_canvas(&self, canvas: Point) -> Point {
        let (w, h) = self.scaled_size();
        unproject_rotation(canvas, self.rotation, w, h).scaled(1.0 / self.zoom)
    }

    /// Logical → screen.
    pub fn to_screen(&self, logical: Point) -> Point {
        self.to_canvas(logical).offset(self.pan_x, self.pan_y)
    }

    /// Screen → logical. Exact inverse of [`Viewport::to_screen`].
    pub fn to_logical(&self, screen: Point) -> Point {
        self.from_canvas(screen.offset(-self.pan_x, -self.pan_y))
    }

    /// Apply a pan delta.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    pub fn pan(&self) -> PanOffset {
        PanOffset {
            x: self.pan_x,
            y: self.pan_y,
        }
    }

    pub fn set_pan(&mut self, pan: PanOffset) {
        self.pan_x = pan.x;
        self.pan_y = pan.y;
    }

    /// Step the zoom up, clamped to the limits. Returns the previous zoom.
    pub fn zoom_in(&mut self, limits: &ZoomLimits) -> f32 {
        let previous = self.zoom;
        self.zoom = limits.clamp(self.zoom + limits.step);
        previous
    }

    /// Step the zoom down, clamped to the limits. Returns the previous zoom.
    pub fn zoom_out(&mut self, limits: &ZoomLimits) -> f32 {
        let previous = self.zoom;
        self.zoom = limits.clamp(self.zoom - limits.step);
        previous
    }

    /// Advance rotation by 90° clockwise. Returns the previous rotation.
    pub fn rotate_clockwise(&mut self) -> Rotation {
        let previous = self.rotation;
        self.rotation = self.rotation.next_clockwise();
        previous
    }

    /// Zoom, rotation and pan back to identity. Image size is kept.
    pub fn reset(&mut self) {
        *self = Viewport::new(self.image_width, self.image_height);
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}
