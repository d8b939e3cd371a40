use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::geometry::{self, Point, RectData, Vec2};

pub type AnnotationId = u64;

/// Width all preview-space font sizes are defined against; export rescales by
/// `export_width / REFERENCE_WIDTH`.
pub const REFERENCE_WIDTH: f32 = 400.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Tool {
    Draw,
    Arrow,
    Rectangle,
    Circle,
    Text,
    Magnifier,
    Eraser,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShapeKind {
    Circle,
    Rectangle,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrokeWidth {
    Thin,
    Medium,
    Thick,
}

impl StrokeWidth {
    /// Preview-space width in points; export derives widths from the image
    /// dimensions instead.
    pub fn px(self) -> f32 {
        match self {
            Self::Thin => 1.5,
            Self::Medium => 3.0,
            Self::Thick => 5.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextSize(u8);

impl TextSize {
    pub const MIN: u8 = 8;
    pub const MAX: u8 = 32;
    pub const S: Self = Self(14);
    pub const M: Self = Self(18);
    pub const L: Self = Self(24);

    pub fn from_points(points: u8) -> Self {
        Self(points.clamp(Self::MIN, Self::MAX))
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn points(self) -> f32 {
        self.0 as f32
    }
}

/// Handle identities exposed to the UI layer for drag-handle hit testing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Handle {
    ArrowStart,
    ArrowEnd,
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    MagnifierSource,
    MagnifierDisplay,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ArrowAnnotation {
    pub id: AnnotationId,
    pub start: Point,
    pub end: Point,
    pub color: [u8; 4],
    pub stroke_width: StrokeWidth,
}

impl ArrowAnnotation {
    pub fn bounds(&self) -> RectData {
        RectData::from_points(self.start, self.end).expand(0.01)
    }

    pub fn contains(&self, point: Point, tolerance: f32) -> bool {
        geometry::distance_to_segment(point, self.start, self.end) <= tolerance
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.start = self.start.offset(delta);
        self.end = self.end.offset(delta);
    }

    pub fn handles(&self) -> Vec<(Handle, Point)> {
        vec![(Handle::ArrowStart, self.start), (Handle::ArrowEnd, self.end)]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ShapeAnnotation {
    pub id: AnnotationId,
    pub kind: ShapeKind,
    pub rect: RectData,
    pub color: [u8; 4],
    pub stroke_width: StrokeWidth,
    pub filled: bool,
}

impl ShapeAnnotation {
    pub fn bounds(&self) -> RectData {
        self.rect.standardized()
    }

    pub fn contains(&self, point: Point, tolerance: f32) -> bool {
        let rect = self.rect.standardized();
        match self.kind {
            ShapeKind::Rectangle => {
                if !rect.expand(tolerance).contains(point) {
                    return false;
                }
                // Outline-only shapes hit on the ring, not the interior.
                if rect.size.x <= tolerance * 2.0 || rect.size.y <= tolerance * 2.0 {
                    return true;
                }
                !rect.expand(-tolerance).contains(point)
            }
            ShapeKind::Circle => {
                let center = rect.center();
                let rx = rect.size.x.abs() * 0.5;
                let ry = rect.size.y.abs() * 0.5;
                if rx <= f32::EPSILON || ry <= f32::EPSILON {
                    return false;
                }
                let nx = (point.x - center.x) / rx;
                let ny = (point.y - center.y) / ry;
                let d = nx * nx + ny * ny;
                let ring = tolerance / rx.min(ry).max(f32::EPSILON);
                (1.0 - ring).powi(2) <= d && d <= (1.0 + ring).powi(2)
            }
        }
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.rect.origin = self.rect.origin.offset(delta);
    }

    pub fn handles(&self) -> Vec<(Handle, Point)> {
        let rect = self.rect.standardized();
        let min = rect.origin;
        let max = rect.origin.offset(rect.size);
        vec![
            (Handle::TopLeft, min),
            (Handle::TopRight, Point::new(max.x, min.y)),
            (Handle::BottomRight, max),
            (Handle::BottomLeft, Point::new(min.x, max.y)),
        ]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub text: String,
    /// Anchor is the geometric center of the rendered text.
    pub position: Point,
    pub color: [u8; 4],
    pub size: TextSize,
    /// Reserved; rendering currently ignores it.
    pub rotation: f32,
}

impl TextAnnotation {
    /// Conservative estimate for hit-testing and selection boxes; the same
    /// estimate centers the text at export so the two agree.
    pub fn bounds(&self) -> RectData {
        let width =
            (self.text.chars().count().max(1) as f32 * self.size.points() * 0.6) / REFERENCE_WIDTH;
        let height = self.size.points() * 1.4 / REFERENCE_WIDTH;
        RectData::new(
            Point::new(self.position.x - width * 0.5, self.position.y - height * 0.5),
            Vec2::new(width, height),
        )
    }

    pub fn contains(&self, point: Point, tolerance: f32) -> bool {
        self.bounds().expand(tolerance).contains(point)
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.position = self.position.offset(delta);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MagnifierAnnotation {
    pub id: AnnotationId,
    /// Where content is sampled from.
    pub source_center: Point,
    /// Where the magnified circle is shown.
    pub display_center: Point,
    pub radius: f32,
    pub scale: f32,
}

impl MagnifierAnnotation {
    pub const MIN_RADIUS: f32 = 0.05;
    pub const MAX_RADIUS: f32 = 0.3;
    pub const MIN_SCALE: f32 = 1.0;
    pub const MAX_SCALE: f32 = 4.0;
    pub const DEFAULT_RADIUS: f32 = 0.15;
    pub const DEFAULT_SCALE: f32 = 2.0;

    pub fn clamped_radius(radius: f32) -> f32 {
        radius.clamp(Self::MIN_RADIUS, Self::MAX_RADIUS)
    }

    pub fn clamped_scale(scale: f32) -> f32 {
        scale.clamp(Self::MIN_SCALE, Self::MAX_SCALE)
    }

    pub fn bounds(&self) -> RectData {
        RectData::new(
            Point::new(
                self.display_center.x - self.radius,
                self.display_center.y - self.radius,
            ),
            Vec2::new(self.radius * 2.0, self.radius * 2.0),
        )
    }

    pub fn contains(&self, point: Point, tolerance: f32) -> bool {
        self.display_center.delta(point).length() <= self.radius + tolerance
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.display_center = self.display_center.offset(delta);
    }

    pub fn handles(&self) -> Vec<(Handle, Point)> {
        vec![
            (Handle::MagnifierSource, self.source_center),
            (Handle::MagnifierDisplay, self.display_center),
        ]
    }
}

/// Tagged union over the four annotation variants, used for identity-keyed
/// updates and outbound enumeration. The store keeps one homogeneous ordered
/// collection per variant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Annotation {
    Arrow(ArrowAnnotation),
    Shape(ShapeAnnotation),
    Text(TextAnnotation),
    Magnifier(MagnifierAnnotation),
}

impl Annotation {
    pub fn id(&self) -> AnnotationId {
        match self {
            Annotation::Arrow(arrow) => arrow.id,
            Annotation::Shape(shape) => shape.id,
            Annotation::Text(text) => text.id,
            Annotation::Magnifier(magnifier) => magnifier.id,
        }
    }

}

/// An externally produced freehand drawing. The engine only ever asks it to
/// rasterize at the source image's dimensions and composites the result.
pub trait InkLayer: Send + Sync {
    fn rasterize(&self, width: u32, height: u32) -> RgbaImage;
}

#[cfg(test)]
mod tests {
    use super::{
        ArrowAnnotation, Handle, MagnifierAnnotation, ShapeAnnotation, ShapeKind, StrokeWidth,
        TextAnnotation, TextSize,
    };
    use crate::geometry::{Point, RectData, Vec2};

    #[test]
    fn hit_test_arrow_line() {
        let arrow = ArrowAnnotation {
            id: 1,
            start: Point::new(0.0, 0.0),
            end: Point::new(0.8, 0.0),
            color: [0, 0, 0, 255],
            stroke_width: StrokeWidth::Medium,
        };

        assert!(arrow.contains(Point::new(0.4, 0.005), 0.01));
        assert!(!arrow.contains(Point::new(0.4, 0.2), 0.01));
    }

    #[test]
    fn rectangle_hits_on_ring_only() {
        let shape = ShapeAnnotation {
            id: 2,
            kind: ShapeKind::Rectangle,
            rect: RectData::new(Point::new(0.2, 0.2), Vec2::new(0.4, 0.4)),
            color: [0, 0, 0, 255],
            stroke_width: StrokeWidth::Medium,
            filled: false,
        };

        assert!(shape.contains(Point::new(0.2, 0.4), 0.02));
        assert!(!shape.contains(Point::new(0.4, 0.4), 0.02));
    }

    #[test]
    fn move_shape_keeps_size() {
        let mut shape = ShapeAnnotation {
            id: 3,
            kind: ShapeKind::Circle,
            rect: RectData::new(Point::new(0.1, 0.1), Vec2::new(0.2, 0.3)),
            color: [0, 0, 0, 255],
            stroke_width: StrokeWidth::Thin,
            filled: false,
        };

        shape.move_by(Vec2::new(0.05, -0.03));
        assert!((shape.rect.origin.x - 0.15).abs() < 1e-6);
        assert!((shape.rect.origin.y - 0.07).abs() < 1e-6);
        assert_eq!(shape.rect.size, Vec2::new(0.2, 0.3));
    }

    #[test]
    fn magnifier_clamps_to_model_bounds() {
        assert_eq!(MagnifierAnnotation::clamped_radius(0.01), 0.05);
        assert_eq!(MagnifierAnnotation::clamped_radius(0.9), 0.3);
        assert_eq!(MagnifierAnnotation::clamped_scale(0.5), 1.0);
        assert_eq!(MagnifierAnnotation::clamped_scale(10.0), 4.0);
    }

    #[test]
    fn text_size_clamps() {
        assert_eq!(TextSize::from_points(2).as_u8(), TextSize::MIN);
        assert_eq!(TextSize::from_points(200).as_u8(), TextSize::MAX);
        assert_eq!(TextSize::M.points(), 18.0);
        assert_eq!(StrokeWidth::Medium.px(), 3.0);
    }

    #[test]
    fn bounds_track_movement() {
        let mut arrow = ArrowAnnotation {
            id: 1,
            start: Point::new(0.1, 0.1),
            end: Point::new(0.5, 0.5),
            color: [0, 0, 0, 255],
            stroke_width: StrokeWidth::Medium,
        };
        arrow.move_by(Vec2::new(0.2, 0.0));
        let bounds = arrow.bounds();
        assert!((bounds.min().x - 0.29).abs() < 1e-6);
        assert!((bounds.max().x - 0.71).abs() < 1e-6);

        let mut magnifier = MagnifierAnnotation {
            id: 2,
            source_center: Point::new(0.5, 0.5),
            display_center: Point::new(0.5, 0.2),
            radius: 0.1,
            scale: 2.0,
        };
        magnifier.move_by(Vec2::new(0.0, 0.3));
        // Moving the call-out moves the circle, never the sampled region.
        assert_eq!(magnifier.source_center, Point::new(0.5, 0.5));
        assert_eq!(magnifier.display_center, Point::new(0.5, 0.5));
        assert!((magnifier.bounds().min().x - 0.4).abs() < 1e-6);
    }

    #[test]
    fn text_contains_centers_on_position() {
        let mut text = TextAnnotation {
            id: 4,
            text: "hello".to_string(),
            position: Point::new(0.5, 0.5),
            color: [0, 0, 0, 255],
            size: TextSize::M,
            rotation: 0.0,
        };
        assert!(text.contains(Point::new(0.5, 0.5), 0.0));
        assert!(!text.contains(Point::new(0.8, 0.8), 0.01));

        text.move_by(Vec2::new(0.3, 0.3));
        assert!(text.contains(Point::new(0.8, 0.8), 0.01));
    }

    #[test]
    fn handles_expose_drag_points() {
        let arrow = ArrowAnnotation {
            id: 1,
            start: Point::new(0.1, 0.2),
            end: Point::new(0.6, 0.7),
            color: [0, 0, 0, 255],
            stroke_width: StrokeWidth::Thin,
        };
        let handles = arrow.handles();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0], (Handle::ArrowStart, Point::new(0.1, 0.2)));
        assert_eq!(handles[1], (Handle::ArrowEnd, Point::new(0.6, 0.7)));

        let magnifier = MagnifierAnnotation {
            id: 2,
            source_center: Point::new(0.3, 0.3),
            display_center: Point::new(0.7, 0.2),
            radius: 0.1,
            scale: 2.0,
        };
        let handles = magnifier.handles();
        assert_eq!(handles[0], (Handle::MagnifierSource, Point::new(0.3, 0.3)));
        assert_eq!(handles[1], (Handle::MagnifierDisplay, Point::new(0.7, 0.2)));
    }
}
