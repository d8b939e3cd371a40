use serde::{Deserialize, Serialize};

/// Angle between the shaft and each arrowhead wing.
pub const ARROW_HEAD_ANGLE: f32 = std::f32::consts::FRAC_PI_6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn delta(self, other: Point) -> Vec2 {
        Vec2::new(other.x - self.x, other.y - self.y)
    }

    pub fn offset(self, delta: Vec2) -> Point {
        Point::new(self.x + delta.x, self.y + delta.y)
    }

    /// Clamps both components into the unit square. Handle-driven edits clamp
    /// at commit; initial creation never does.
    pub fn clamp_unit(self) -> Point {
        Point::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn min_side(self) -> f32 {
        self.width.min(self.height)
    }
}

/// Converts a position in `display`-space pixels into the unit square.
/// No clamping; callers clamp where the model requires it.
pub fn normalize(point: Point, display: Size) -> Point {
    Point::new(point.x / display.width, point.y / display.height)
}

/// Converts a unit-square position back into `size`-space pixels.
pub fn denormalize(point: Point, size: Size) -> Point {
    Point::new(point.x * size.width, point.y * size.height)
}

/// An origin plus a signed size. The sign encodes the drag direction; only
/// `standardized` folds it into a positive rect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectData {
    pub origin: Point,
    pub size: Vec2,
}

impl RectData {
    pub fn new(origin: Point, size: Vec2) -> Self {
        Self { origin, size }
    }

    pub fn from_points(anchor: Point, corner: Point) -> Self {
        Self {
            origin: anchor,
            size: anchor.delta(corner),
        }
    }

    pub fn standardized(self) -> RectData {
        let min_x = self.origin.x.min(self.origin.x + self.size.x);
        let min_y = self.origin.y.min(self.origin.y + self.size.y);
        RectData {
            origin: Point::new(min_x, min_y),
            size: Vec2::new(self.size.x.abs(), self.size.y.abs()),
        }
    }

    pub fn min(self) -> Point {
        self.standardized().origin
    }

    pub fn max(self) -> Point {
        let std = self.standardized();
        std.origin.offset(std.size)
    }

    pub fn center(self) -> Point {
        Point::new(
            self.origin.x + self.size.x * 0.5,
            self.origin.y + self.size.y * 0.5,
        )
    }

    pub fn expand(self, by: f32) -> RectData {
        let std = self.standardized();
        RectData {
            origin: Point::new(std.origin.x - by, std.origin.y - by),
            size: Vec2::new(std.size.x + by * 2.0, std.size.y + by * 2.0),
        }
    }

    pub fn contains(self, point: Point) -> bool {
        let min = self.min();
        let max = self.max();
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }
}

/// The two arrowhead wing points, each `length` away from `end`, rotated
/// `ARROW_HEAD_ANGLE` off the shaft direction. A zero-length arrow falls back
/// to a fixed direction instead of producing NaN.
pub fn arrow_head_wings(start: Point, end: Point, length: f32) -> (Point, Point) {
    let dir = start.delta(end);
    let len = dir.length();
    let (ux, uy) = if len <= f32::EPSILON {
        (1.0, 0.0)
    } else {
        (dir.x / len, dir.y / len)
    };

    let (sin, cos) = ARROW_HEAD_ANGLE.sin_cos();
    let left = Point::new(
        end.x - length * (ux * cos - uy * sin),
        end.y - length * (ux * sin + uy * cos),
    );
    let right = Point::new(
        end.x - length * (ux * cos + uy * sin),
        end.y - length * (uy * cos - ux * sin),
    );
    (left, right)
}

pub fn distance_to_segment(point: Point, a: Point, b: Point) -> f32 {
    let ab = a.delta(b);
    let ap = a.delta(point);
    let ab_len_sq = ab.length_sq();
    if ab_len_sq <= f32::EPSILON {
        return ap.length();
    }
    let t = ((ap.x * ab.x + ap.y * ab.y) / ab_len_sq).clamp(0.0, 1.0);
    let projection = a.offset(Vec2::new(ab.x * t, ab.y * t));
    projection.delta(point).length()
}

#[cfg(test)]
mod tests {
    use super::{arrow_head_wings, denormalize, distance_to_segment, normalize, Point, RectData, Size, Vec2};

    #[test]
    fn normalize_round_trip() {
        let display = Size::new(1280.0, 840.0);
        let point = Point::new(311.5, 702.25);
        let back = denormalize(normalize(point, display), display);
        assert!((back.x - point.x).abs() < 1e-3);
        assert!((back.y - point.y).abs() < 1e-3);
    }

    #[test]
    fn normalize_does_not_clamp() {
        let display = Size::new(100.0, 100.0);
        let outside = normalize(Point::new(150.0, -20.0), display);
        assert_eq!(outside, Point::new(1.5, -0.2));
        assert_eq!(outside.clamp_unit(), Point::new(1.0, 0.0));
    }

    #[test]
    fn standardized_folds_negative_size() {
        let rect = RectData::new(Point::new(0.6, 0.7), Vec2::new(-0.4, -0.5));
        let std = rect.standardized();
        assert_eq!(std.origin, Point::new(0.2, 0.2));
        assert_eq!(std.size, Vec2::new(0.4, 0.5));
        assert_eq!(rect.min(), Point::new(0.2, 0.2));
        assert_eq!(rect.max().x, 0.6);
    }

    #[test]
    fn wings_sit_at_fixed_distance_from_tip() {
        let start = Point::new(100.0, 100.0);
        let end = Point::new(500.0, 500.0);
        let (left, right) = arrow_head_wings(start, end, 25.0);
        assert!((end.delta(left).length() - 25.0).abs() < 1e-3);
        assert!((end.delta(right).length() - 25.0).abs() < 1e-3);
        // Wings are mirrored across the shaft.
        let mid = Point::new((left.x + right.x) * 0.5, (left.y + right.y) * 0.5);
        let shaft = start.delta(end);
        let off_axis = (mid.x - end.x) * shaft.y - (mid.y - end.y) * shaft.x;
        assert!(off_axis.abs() < 1e-2);
    }

    #[test]
    fn degenerate_arrow_head_has_no_nan() {
        let p = Point::new(0.5, 0.5);
        let (left, right) = arrow_head_wings(p, p, 10.0);
        assert!(left.x.is_finite() && left.y.is_finite());
        assert!(right.x.is_finite() && right.y.is_finite());
    }

    #[test]
    fn segment_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(100.0, 0.0);
        assert!((distance_to_segment(Point::new(50.0, 4.0), a, b) - 4.0).abs() < 1e-4);
        assert!((distance_to_segment(Point::new(-3.0, 0.0), a, b) - 3.0).abs() < 1e-4);
    }
}
