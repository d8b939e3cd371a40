use ab_glyph::FontArc;
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use log::{debug, warn};
use tiny_skia::{
    FillRule, FilterQuality, Mask, Paint, PathBuilder, Pattern, Pixmap, Rect, SpreadMode, Stroke,
    Transform,
};

use crate::annotation::{
    ArrowAnnotation, MagnifierAnnotation, ShapeAnnotation, ShapeKind, TextAnnotation,
    REFERENCE_WIDTH,
};
use crate::geometry::{self, Point, Size};
use crate::state::Snapshot;

/// Stroke width of shape outlines and arrow shafts as a fraction of the
/// smaller image dimension.
const LINE_WIDTH_FRAC: f32 = 0.005;
/// Arrowhead wing length as a fraction of the smaller image dimension.
const ARROW_HEAD_FRAC: f32 = 0.025;

/// Flattens the snapshot over the source image into one raster of the same
/// pixel dimensions. Paint order is fixed, back to front: source, shapes,
/// arrows, magnifiers, ink, texts. `display_size` is the on-screen size that
/// was live while the user edited; the magnifier sampling depends on it.
///
/// Malformed annotations degrade by skipping their own content; the render
/// itself never aborts over a single annotation.
pub fn flatten(
    image: &DynamicImage,
    snapshot: &Snapshot,
    display_size: Size,
) -> Result<DynamicImage> {
    let source = image.to_rgba8();
    let (width, height) = source.dimensions();
    let image_size = Size::new(width as f32, height as f32);
    let line_width = (LINE_WIDTH_FRAC * image_size.min_side()).max(1.0);

    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("cannot allocate pixmap"))?;
    copy_image_to_pixmap(&source, &mut pixmap)?;

    for shape in &snapshot.shapes {
        if let Err(err) = draw_shape(&mut pixmap, shape, image_size, line_width) {
            debug!("skipping shape {}: {err}", shape.id);
        }
    }
    for arrow in &snapshot.arrows {
        if let Err(err) = draw_arrow(&mut pixmap, arrow, image_size, line_width) {
            debug!("skipping arrow {}: {err}", arrow.id);
        }
    }
    for magnifier in &snapshot.magnifiers {
        if let Err(err) = draw_magnifier(&mut pixmap, &source, magnifier, image_size, display_size)
        {
            debug!("skipping magnifier {}: {err}", magnifier.id);
        }
    }

    let mut output = RgbaImage::from_raw(width, height, pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("cannot construct output image"))?;

    if let Some(ink) = &snapshot.ink {
        let layer = ink.rasterize(width, height);
        image::imageops::overlay(&mut output, &layer, 0, 0);
    }

    draw_text_annotations(&mut output, &snapshot.texts, image_size);

    Ok(DynamicImage::ImageRgba8(output))
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("cannot encode PNG")?;
    Ok(buffer.into_inner())
}

fn copy_image_to_pixmap(image: &RgbaImage, pixmap: &mut Pixmap) -> Result<()> {
    let data = pixmap.data_mut();
    if data.len() != image.as_raw().len() {
        return Err(anyhow!("source image and pixmap size mismatch"));
    }
    data.copy_from_slice(image.as_raw());
    Ok(())
}

fn solid_paint(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

fn draw_shape(
    pixmap: &mut Pixmap,
    shape: &ShapeAnnotation,
    image_size: Size,
    line_width: f32,
) -> Result<()> {
    let paint = solid_paint(shape.color);
    let stroke = Stroke {
        width: line_width,
        ..Default::default()
    };

    let rect = shape.rect.standardized();
    let min = geometry::denormalize(rect.origin, image_size);
    let bounds = Rect::from_xywh(
        min.x,
        min.y,
        (rect.size.x * image_size.width).max(1.0),
        (rect.size.y * image_size.height).max(1.0),
    )
    .ok_or_else(|| anyhow!("invalid shape rect"))?;

    let path = match shape.kind {
        ShapeKind::Rectangle => PathBuilder::from_rect(bounds),
        ShapeKind::Circle => {
            PathBuilder::from_oval(bounds).ok_or_else(|| anyhow!("cannot build oval"))?
        }
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    Ok(())
}

fn draw_arrow(
    pixmap: &mut Pixmap,
    arrow: &ArrowAnnotation,
    image_size: Size,
    line_width: f32,
) -> Result<()> {
    let paint = solid_paint(arrow.color);
    let from = geometry::denormalize(arrow.start, image_size);
    let to = geometry::denormalize(arrow.end, image_size);

    if from != to {
        let mut pb = PathBuilder::new();
        pb.move_to(from.x, from.y);
        pb.line_to(to.x, to.y);
        let path = pb
            .finish()
            .ok_or_else(|| anyhow!("cannot build arrow shaft"))?;
        let stroke = Stroke {
            width: line_width,
            ..Default::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    let head_len = ARROW_HEAD_FRAC * image_size.min_side();
    let (left, right) = geometry::arrow_head_wings(from, to, head_len);
    let mut pb = PathBuilder::new();
    pb.move_to(to.x, to.y);
    pb.line_to(left.x, left.y);
    pb.line_to(right.x, right.y);
    pb.close();
    let head = pb
        .finish()
        .ok_or_else(|| anyhow!("cannot build arrow head"))?;
    pixmap.fill_path(&head, &paint, FillRule::Winding, Transform::identity(), None);
    Ok(())
}

/// Re-samples a region of the source image into the magnifier circle.
///
/// The sampling radius is `radius * display_width / scale` in source pixels,
/// using the *interactive* display width so the exported circle shows exactly
/// what the user saw while placing it, independent of export resolution. The
/// clamped crop is drawn through the unclamped mapping, which turns an
/// edge-clamped capture into a partial circle of content.
fn draw_magnifier(
    pixmap: &mut Pixmap,
    source: &RgbaImage,
    magnifier: &MagnifierAnnotation,
    image_size: Size,
    display_size: Size,
) -> Result<()> {
    let sc = geometry::denormalize(magnifier.source_center, image_size);
    let dc = geometry::denormalize(magnifier.display_center, image_size);
    let radius_px = magnifier.radius * image_size.width;
    if radius_px < 1.0 {
        return Err(anyhow!("magnifier radius below one pixel"));
    }
    let border_width = (radius_px * 0.04).max(1.5);

    // Connecting line and source dot for visual traceability; both sit under
    // the circle content.
    let trace = solid_paint([255, 255, 255, 220]);
    if sc != dc {
        let mut pb = PathBuilder::new();
        pb.move_to(sc.x, sc.y);
        pb.line_to(dc.x, dc.y);
        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width: (border_width * 0.75).max(1.0),
                ..Default::default()
            };
            pixmap.stroke_path(&path, &trace, &stroke, Transform::identity(), None);
        }
    }
    if let Some(dot) = PathBuilder::from_circle(sc.x, sc.y, (border_width * 1.5).max(2.0)) {
        pixmap.fill_path(&dot, &trace, FillRule::Winding, Transform::identity(), None);
    }

    let capture_radius = magnifier.radius * display_size.width / magnifier.scale;
    if capture_radius >= 0.5 {
        draw_magnifier_content(pixmap, source, magnifier, sc, dc, radius_px, capture_radius)?;
    } else {
        debug!("magnifier {}: capture radius degenerate", magnifier.id);
    }

    // Soft outer glow, then the border on top.
    if let Some(glow) = PathBuilder::from_circle(dc.x, dc.y, radius_px + border_width) {
        let paint = solid_paint([255, 255, 255, 70]);
        let stroke = Stroke {
            width: border_width * 2.5,
            ..Default::default()
        };
        pixmap.stroke_path(&glow, &paint, &stroke, Transform::identity(), None);
    }
    if let Some(border) = PathBuilder::from_circle(dc.x, dc.y, radius_px) {
        let paint = solid_paint([255, 255, 255, 255]);
        let stroke = Stroke {
            width: border_width,
            ..Default::default()
        };
        pixmap.stroke_path(&border, &paint, &stroke, Transform::identity(), None);
    }

    Ok(())
}

fn draw_magnifier_content(
    pixmap: &mut Pixmap,
    source: &RgbaImage,
    magnifier: &MagnifierAnnotation,
    sc: Point,
    dc: Point,
    radius_px: f32,
    capture_radius: f32,
) -> Result<()> {
    let image_width = source.width() as f32;
    let image_height = source.height() as f32;

    let ideal_left = sc.x - capture_radius;
    let ideal_top = sc.y - capture_radius;
    let left = ideal_left.max(0.0).floor();
    let top = ideal_top.max(0.0).floor();
    let right = (sc.x + capture_radius).min(image_width).ceil();
    let bottom = (sc.y + capture_radius).min(image_height).ceil();

    // An empty intersection after clamping paints nothing but border/line.
    if right - left < 1.0 || bottom - top < 1.0 {
        debug!("magnifier {}: capture region is empty after clamping", magnifier.id);
        return Ok(());
    }

    let crop = image::imageops::crop_imm(
        source,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    )
    .to_image();
    let mut crop_pixmap = Pixmap::new(crop.width(), crop.height())
        .ok_or_else(|| anyhow!("cannot allocate capture pixmap"))?;
    copy_image_to_pixmap(&crop, &mut crop_pixmap)?;

    // Stretching the capture square onto the circle is exactly the
    // magnification.
    let stretch = radius_px / capture_radius;
    let origin_x = (dc.x - radius_px) + (left - ideal_left) * stretch;
    let origin_y = (dc.y - radius_px) + (top - ideal_top) * stretch;

    let mut mask = Mask::new(pixmap.width(), pixmap.height())
        .ok_or_else(|| anyhow!("cannot allocate clip mask"))?;
    let circle = PathBuilder::from_circle(dc.x, dc.y, radius_px)
        .ok_or_else(|| anyhow!("cannot build clip circle"))?;
    mask.fill_path(&circle, FillRule::Winding, true, Transform::identity());

    let dest = Rect::from_xywh(
        origin_x,
        origin_y,
        crop.width() as f32 * stretch,
        crop.height() as f32 * stretch,
    )
    .ok_or_else(|| anyhow!("invalid capture destination"))?;
    let dest_path = PathBuilder::from_rect(dest);

    let mut paint = Paint::default();
    paint.anti_alias = true;
    paint.shader = Pattern::new(
        crop_pixmap.as_ref(),
        SpreadMode::Pad,
        FilterQuality::Bilinear,
        1.0,
        Transform::from_scale(stretch, stretch).post_translate(origin_x, origin_y),
    );
    pixmap.fill_path(
        &dest_path,
        &paint,
        FillRule::Winding,
        Transform::identity(),
        Some(&mask),
    );

    Ok(())
}

fn draw_text_annotations(image: &mut RgbaImage, texts: &[TextAnnotation], image_size: Size) {
    if texts.is_empty() {
        return;
    }
    let Some(font) = load_system_font() else {
        warn!("no system font found, skipping text annotations");
        return;
    };

    // Preview-space points scale with the export width relative to the fixed
    // reference width.
    let font_scale = image_size.width / REFERENCE_WIDTH;
    for text in texts {
        let center = geometry::denormalize(text.position, image_size);
        let px = text.size.points() * font_scale;
        let est_width = text.text.chars().count().max(1) as f32 * px * 0.6;
        let est_height = px * 1.4;
        draw_text_mut(
            image,
            Rgba(text.color),
            (center.x - est_width * 0.5) as i32,
            (center.y - est_height * 0.5) as i32,
            px,
            &font,
            &text.text,
        );
    }
}

fn load_system_font() -> Option<FontArc> {
    let candidates = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans-Bold.ttf",
        "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
        "C:\\Windows\\Fonts\\arialbd.ttf",
    ];

    for path in candidates {
        if let Ok(bytes) = std::fs::read(path) {
            if let Ok(font) = FontArc::try_from_vec(bytes) {
                return Some(font);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{DynamicImage, Rgba, RgbaImage};

    use super::{encode_png, flatten};
    use crate::annotation::{
        ArrowAnnotation, InkLayer, MagnifierAnnotation, ShapeAnnotation, ShapeKind, StrokeWidth,
        TextAnnotation, TextSize,
    };
    use crate::geometry::{Point, RectData, Size, Vec2};
    use crate::state::Snapshot;

    const RED: [u8; 4] = [229, 30, 30, 255];

    fn white_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ))
    }

    fn pixel(image: &DynamicImage, x: u32, y: u32) -> Rgba<u8> {
        *image.as_rgba8().expect("rgba output").get_pixel(x, y)
    }

    fn assert_reddish(px: Rgba<u8>) {
        assert!(px[0] > 180 && px[1] < 90 && px[2] < 90, "expected red, got {px:?}");
    }

    fn assert_bluish(px: Rgba<u8>) {
        assert!(px[2] > 180 && px[0] < 90, "expected blue, got {px:?}");
    }

    fn assert_whitish(px: Rgba<u8>) {
        assert!(px[0] > 180 && px[1] > 180 && px[2] > 180, "expected white, got {px:?}");
    }

    #[test]
    fn flatten_keeps_image_size() {
        let image = white_image(800, 600);
        let snapshot = Snapshot {
            shapes: vec![ShapeAnnotation {
                id: 1,
                kind: ShapeKind::Rectangle,
                rect: RectData::new(Point::new(0.1, 0.1), Vec2::new(0.5, 0.4)),
                color: RED,
                stroke_width: StrokeWidth::Medium,
                filled: false,
            }],
            ..Default::default()
        };

        let result = flatten(&image, &snapshot, Size::new(400.0, 300.0)).expect("flatten succeeds");
        assert_eq!(result.width(), 800);
        assert_eq!(result.height(), 600);
        // Top edge of the outline runs through y = 60; the outline is
        // stroked, not filled.
        assert_reddish(pixel(&result, 200, 60));
        assert_whitish(pixel(&result, 200, 150));
    }

    #[test]
    fn arrow_renders_shaft_and_filled_head() {
        let image = white_image(1000, 1000);
        let snapshot = Snapshot {
            arrows: vec![ArrowAnnotation {
                id: 1,
                start: Point::new(0.1, 0.1),
                end: Point::new(0.5, 0.5),
                color: RED,
                stroke_width: StrokeWidth::Medium,
            }],
            ..Default::default()
        };

        let result =
            flatten(&image, &snapshot, Size::new(500.0, 500.0)).expect("flatten succeeds");

        // Shaft midpoint.
        assert_reddish(pixel(&result, 300, 300));
        // Head centroid: the wings sit 25 px (2.5 % of 1000) behind the tip
        // at (500, 500), so the filled triangle covers ~(490, 490).
        assert_reddish(pixel(&result, 490, 490));
        // Just past the tip stays clean.
        assert_whitish(pixel(&result, 520, 520));
    }

    #[test]
    fn magnifier_stretches_capture_by_display_ratio() {
        // 800x600 source edited on a 400x300 display: capture radius is
        // (0.1 * 400) / 2 = 20 source px, stretched into an 80 px circle.
        let mut source = RgbaImage::from_pixel(800, 600, Rgba([255, 255, 255, 255]));
        for y in 290..310 {
            for x in 390..410 {
                source.put_pixel(x, y, Rgba([20, 20, 230, 255]));
            }
        }
        let image = DynamicImage::ImageRgba8(source);

        let snapshot = Snapshot {
            magnifiers: vec![MagnifierAnnotation {
                id: 1,
                source_center: Point::new(0.5, 0.5),
                display_center: Point::new(0.5, 0.2),
                radius: 0.1,
                scale: 2.0,
            }],
            ..Default::default()
        };

        let result =
            flatten(&image, &snapshot, Size::new(400.0, 300.0)).expect("flatten succeeds");

        // The 20 px marker appears 4x wider in export space (2x relative to
        // the half-resolution display), centered on the display center.
        assert_bluish(pixel(&result, 400, 120));
        assert_bluish(pixel(&result, 435, 120));
        assert_whitish(pixel(&result, 455, 120));
    }

    #[test]
    fn corner_magnifier_paints_partial_circle() {
        let mut source = RgbaImage::from_pixel(200, 200, Rgba([255, 255, 255, 255]));
        for y in 0..40 {
            for x in 0..40 {
                source.put_pixel(x, y, Rgba([20, 20, 230, 255]));
            }
        }
        let image = DynamicImage::ImageRgba8(source);

        let snapshot = Snapshot {
            magnifiers: vec![MagnifierAnnotation {
                id: 1,
                source_center: Point::new(0.0, 0.0),
                display_center: Point::new(0.5, 0.5),
                radius: 0.3,
                scale: 1.0,
            }],
            ..Default::default()
        };

        let result =
            flatten(&image, &snapshot, Size::new(200.0, 200.0)).expect("flatten succeeds");

        // Content exists only where the clamped capture landed: the
        // bottom-right quadrant of the circle.
        assert_bluish(pixel(&result, 110, 110));
        // The top-left quadrant of the circle stays source-colored.
        assert_whitish(pixel(&result, 70, 70));
    }

    #[test]
    fn magnifier_sampling_fully_outside_is_skipped() {
        let image = white_image(200, 200);
        let snapshot = Snapshot {
            magnifiers: vec![MagnifierAnnotation {
                id: 1,
                source_center: Point::new(1.5, 1.5),
                display_center: Point::new(0.5, 0.5),
                radius: 0.1,
                scale: 2.0,
            }],
            ..Default::default()
        };

        let result =
            flatten(&image, &snapshot, Size::new(200.0, 200.0)).expect("flatten succeeds");
        // No content, but the render completed and the circle interior kept
        // the source underneath.
        assert_whitish(pixel(&result, 100, 100));
    }

    #[test]
    fn ink_layer_composites_over_annotations() {
        struct DotInk;

        impl InkLayer for DotInk {
            fn rasterize(&self, width: u32, height: u32) -> RgbaImage {
                let mut layer = RgbaImage::new(width, height);
                for y in 5..15 {
                    for x in 5..15 {
                        layer.put_pixel(x, y, Rgba([229, 30, 30, 255]));
                    }
                }
                layer
            }
        }

        let image = white_image(50, 50);
        let snapshot = Snapshot {
            ink: Some(Arc::new(DotInk)),
            ..Default::default()
        };

        let result = flatten(&image, &snapshot, Size::new(50.0, 50.0)).expect("flatten succeeds");
        assert_reddish(pixel(&result, 10, 10));
        assert_whitish(pixel(&result, 30, 30));
    }

    #[test]
    fn text_annotations_do_not_fail_without_assertions_on_glyphs() {
        let image = white_image(400, 300);
        let snapshot = Snapshot {
            texts: vec![TextAnnotation {
                id: 1,
                text: "Look here".to_string(),
                position: Point::new(0.5, 0.5),
                color: RED,
                size: TextSize::M,
                rotation: 0.0,
            }],
            ..Default::default()
        };

        // Font availability depends on the host; the render must succeed
        // either way and keep its dimensions.
        let result = flatten(&image, &snapshot, Size::new(400.0, 300.0)).expect("flatten succeeds");
        assert_eq!(result.width(), 400);
        assert_eq!(result.height(), 300);
    }

    #[test]
    fn encode_png_emits_signature() {
        let image = white_image(16, 16);
        let bytes = encode_png(&image).expect("png encodes");
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }
}
