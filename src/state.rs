use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::{
    Annotation, AnnotationId, ArrowAnnotation, InkLayer, MagnifierAnnotation, ShapeAnnotation,
    ShapeKind, StrokeWidth, TextAnnotation, TextSize, Tool,
};
use crate::flatten;
use crate::geometry::{Point, RectData, Size, Vec2};
use crate::history::UndoHistory;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The identity is not present in the variant's collection; callers treat
    /// this as recoverable.
    #[error("annotation {0} not found")]
    NotFound(AnnotationId),
}

/// An annotation under active construction by a pointer gesture. At most one
/// exists at a time; it joins its permanent collection only on commit.
#[derive(Clone, Debug, PartialEq)]
pub enum DragAnnotation {
    Arrow {
        start: Point,
        end: Point,
    },
    Shape {
        kind: ShapeKind,
        rect: RectData,
    },
    /// Drag-to-place: both centers anchor at the gesture start and the drag
    /// neither moves nor resizes it.
    Magnifier {
        source_center: Point,
        display_center: Point,
    },
}

/// Value copy of the annotation collections plus the ink handle, taken so
/// export can run on a worker while the store keeps mutating.
#[derive(Clone, Default)]
pub struct Snapshot {
    pub arrows: Vec<ArrowAnnotation>,
    pub shapes: Vec<ShapeAnnotation>,
    pub texts: Vec<TextAnnotation>,
    pub magnifiers: Vec<MagnifierAnnotation>,
    pub ink: Option<Arc<dyn InkLayer>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub last_color: [u8; 4],
    pub last_stroke: StrokeWidth,
    pub last_text_size: TextSize,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            last_color: [229, 62, 62, 255],
            last_stroke: StrokeWidth::Medium,
            last_text_size: TextSize::M,
        }
    }
}

impl UserSettings {
    fn file_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("com", "photomark", "photomark")?;
        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir).ok()?;
        Some(config_dir.join("settings.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::file_path().context("cannot resolve settings path")?;
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Aggregate root of the editor: the four ordered annotation collections
/// (insertion order is paint order within a variant), the transient drag, the
/// selection, the source image and ink layer, and the undo history.
///
/// The collections are deliberately not public: removal is reachable only
/// through history inversion, so every destructive mutation stays undoable.
pub struct EditorState {
    pub image: Option<DynamicImage>,
    pub active_tool: Tool,
    pub active_color: [u8; 4],
    pub active_stroke: StrokeWidth,
    pub active_text_size: TextSize,
    pub history: UndoHistory,
    pub settings: UserSettings,
    arrows: Vec<ArrowAnnotation>,
    shapes: Vec<ShapeAnnotation>,
    texts: Vec<TextAnnotation>,
    magnifiers: Vec<MagnifierAnnotation>,
    ink: Option<Arc<dyn InkLayer>>,
    selection: Option<AnnotationId>,
    drag: Option<DragAnnotation>,
    next_id: AnnotationId,
}

impl Default for EditorState {
    fn default() -> Self {
        let settings = UserSettings::load().unwrap_or_default();
        Self {
            image: None,
            active_tool: Tool::Draw,
            active_color: settings.last_color,
            active_stroke: settings.last_stroke,
            active_text_size: settings.last_text_size,
            history: UndoHistory::new(),
            settings,
            arrows: Vec::new(),
            shapes: Vec::new(),
            texts: Vec::new(),
            magnifiers: Vec::new(),
            ink: None,
            selection: None,
            drag: None,
            next_id: 1,
        }
    }
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a freshly decoded source image and resets all per-image state.
    pub fn set_image(&mut self, image: DynamicImage) {
        self.image = Some(image);
        self.arrows.clear();
        self.shapes.clear();
        self.texts.clear();
        self.magnifiers.clear();
        self.ink = None;
        self.selection = None;
        self.drag = None;
        self.history.clear();
    }

    pub fn arrows(&self) -> &[ArrowAnnotation] {
        &self.arrows
    }

    pub fn shapes(&self) -> &[ShapeAnnotation] {
        &self.shapes
    }

    pub fn texts(&self) -> &[TextAnnotation] {
        &self.texts
    }

    pub fn magnifiers(&self) -> &[MagnifierAnnotation] {
        &self.magnifiers
    }

    pub fn drag(&self) -> Option<&DragAnnotation> {
        self.drag.as_ref()
    }

    pub fn current_selection(&self) -> Option<AnnotationId> {
        self.selection
    }

    /// Selecting an identity that is no longer present is absorbed as a
    /// no-op; `None` always clears.
    pub fn select(&mut self, id: Option<AnnotationId>) {
        match id {
            None => self.selection = None,
            Some(id) if self.contains_id(id) => self.selection = Some(id),
            Some(_) => {}
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) {
        let Some(entry) = self.history.pop_undo() else {
            return;
        };
        entry.inverted().apply(self);
        self.history.push_redo(entry);
    }

    pub fn redo(&mut self) {
        let Some(entry) = self.history.pop_redo() else {
            return;
        };
        entry.apply(self);
        self.history.push_undo(entry);
    }

    fn next_annotation_id(&mut self) -> AnnotationId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Starts the transient annotation for the active tool. No-op while a
    /// drag is live. The magnifier tool additionally refuses to begin while
    /// anything is selected: the user must deselect first.
    pub fn begin_drag(&mut self, point: Point) {
        if self.drag.is_some() {
            return;
        }
        self.drag = match self.active_tool {
            Tool::Arrow => Some(DragAnnotation::Arrow {
                start: point,
                end: point,
            }),
            Tool::Rectangle => Some(DragAnnotation::Shape {
                kind: ShapeKind::Rectangle,
                rect: RectData::new(point, Vec2::ZERO),
            }),
            Tool::Circle => Some(DragAnnotation::Shape {
                kind: ShapeKind::Circle,
                rect: RectData::new(point, Vec2::ZERO),
            }),
            Tool::Magnifier if self.selection.is_some() => None,
            Tool::Magnifier => Some(DragAnnotation::Magnifier {
                source_center: point,
                display_center: point,
            }),
            Tool::Draw | Tool::Eraser | Tool::Text => None,
        };
    }

    pub fn update_drag(&mut self, point: Point) {
        match &mut self.drag {
            Some(DragAnnotation::Arrow { end, .. }) => *end = point,
            Some(DragAnnotation::Shape { rect, .. }) => {
                // Signed delta from the anchor; standardized only at render.
                rect.size = rect.origin.delta(point);
            }
            Some(DragAnnotation::Magnifier { .. }) | None => {}
        }
    }

    /// Moves the transient into its permanent collection, selects it and
    /// returns the fresh identity. No-op without a live drag.
    pub fn commit_drag(&mut self) -> Option<AnnotationId> {
        let drag = self.drag.take()?;
        let id = self.next_annotation_id();
        match drag {
            DragAnnotation::Arrow { start, end } => self.arrows.push(ArrowAnnotation {
                id,
                start,
                end,
                color: self.active_color,
                stroke_width: self.active_stroke,
            }),
            DragAnnotation::Shape { kind, rect } => self.shapes.push(ShapeAnnotation {
                id,
                kind,
                rect,
                color: self.active_color,
                stroke_width: self.active_stroke,
                filled: false,
            }),
            DragAnnotation::Magnifier {
                source_center,
                display_center,
            } => self.magnifiers.push(MagnifierAnnotation {
                id,
                source_center,
                display_center,
                radius: MagnifierAnnotation::DEFAULT_RADIUS,
                scale: MagnifierAnnotation::DEFAULT_SCALE,
            }),
        }
        self.selection = Some(id);
        Some(id)
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// Appends a committed text annotation outside the drag machine (the text
    /// tool goes through an external input collaborator instead of gestures).
    pub fn add_text(&mut self, position: Point, text: String, size: TextSize) -> AnnotationId {
        let id = self.next_annotation_id();
        self.texts.push(TextAnnotation {
            id,
            text,
            position,
            color: self.active_color,
            size,
            rotation: 0.0,
        });
        self.selection = Some(id);
        id
    }

    /// Replaces an annotation in place by identity; fails if the identity is
    /// not present in the variant's own collection.
    pub fn update_existing(&mut self, value: Annotation) -> Result<(), StoreError> {
        let id = value.id();
        match value {
            Annotation::Arrow(arrow) => replace_by_id(&mut self.arrows, arrow.id, arrow, |a| a.id),
            Annotation::Shape(shape) => replace_by_id(&mut self.shapes, shape.id, shape, |s| s.id),
            Annotation::Text(text) => replace_by_id(&mut self.texts, text.id, text, |t| t.id),
            Annotation::Magnifier(magnifier) => {
                replace_by_id(&mut self.magnifiers, magnifier.id, magnifier, |m| m.id)
            }
        }
        .ok_or(StoreError::NotFound(id))
    }

    /// Interactive radius/scale adjustment, clamped to the model bounds.
    pub fn adjust_magnifier(
        &mut self,
        id: AnnotationId,
        radius: f32,
        scale: f32,
    ) -> Result<(), StoreError> {
        let magnifier = self
            .magnifiers
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;
        magnifier.radius = MagnifierAnnotation::clamped_radius(radius);
        magnifier.scale = MagnifierAnnotation::clamped_scale(scale);
        Ok(())
    }

    pub fn find_annotation(&self, id: AnnotationId) -> Option<Annotation> {
        if let Some(arrow) = self.arrows.iter().find(|a| a.id == id) {
            return Some(Annotation::Arrow(arrow.clone()));
        }
        if let Some(shape) = self.shapes.iter().find(|s| s.id == id) {
            return Some(Annotation::Shape(shape.clone()));
        }
        if let Some(text) = self.texts.iter().find(|t| t.id == id) {
            return Some(Annotation::Text(text.clone()));
        }
        if let Some(magnifier) = self.magnifiers.iter().find(|m| m.id == id) {
            return Some(Annotation::Magnifier(magnifier.clone()));
        }
        None
    }

    /// Topmost hit in reverse paint order: texts, magnifiers, arrows, shapes.
    pub fn annotation_at(&self, point: Point, tolerance: f32) -> Option<AnnotationId> {
        if let Some(text) = self
            .texts
            .iter()
            .rev()
            .find(|t| t.contains(point, tolerance))
        {
            return Some(text.id);
        }
        if let Some(magnifier) = self
            .magnifiers
            .iter()
            .rev()
            .find(|m| m.contains(point, tolerance))
        {
            return Some(magnifier.id);
        }
        if let Some(arrow) = self
            .arrows
            .iter()
            .rev()
            .find(|a| a.contains(point, tolerance))
        {
            return Some(arrow.id);
        }
        if let Some(shape) = self
            .shapes
            .iter()
            .rev()
            .find(|s| s.contains(point, tolerance))
        {
            return Some(shape.id);
        }
        None
    }

    /// Applies the active color to future annotations and to the current
    /// selection in place. In-place edits are not recorded in history.
    pub fn set_color(&mut self, rgba: [u8; 4]) {
        self.active_color = rgba;
        self.settings.last_color = rgba;
        let _ = self.settings.save();

        let Some(id) = self.selection else {
            return;
        };
        if let Some(arrow) = self.arrows.iter_mut().find(|a| a.id == id) {
            arrow.color = rgba;
        } else if let Some(shape) = self.shapes.iter_mut().find(|s| s.id == id) {
            shape.color = rgba;
        } else if let Some(text) = self.texts.iter_mut().find(|t| t.id == id) {
            text.color = rgba;
        }
    }

    pub fn set_stroke(&mut self, stroke: StrokeWidth) {
        self.active_stroke = stroke;
        self.settings.last_stroke = stroke;
        let _ = self.settings.save();

        let Some(id) = self.selection else {
            return;
        };
        if let Some(arrow) = self.arrows.iter_mut().find(|a| a.id == id) {
            arrow.stroke_width = stroke;
        } else if let Some(shape) = self.shapes.iter_mut().find(|s| s.id == id) {
            shape.stroke_width = stroke;
        }
    }

    pub fn set_text_size(&mut self, size: TextSize) {
        self.active_text_size = size;
        self.settings.last_text_size = size;
        let _ = self.settings.save();
    }

    /// Changing tools discards any half-built transient.
    pub fn set_tool(&mut self, tool: Tool) {
        self.active_tool = tool;
        self.drag = None;
    }

    /// The ink collaborator replaces the whole layer on every stroke change.
    pub fn set_ink_layer(&mut self, ink: Arc<dyn InkLayer>) {
        self.ink = Some(ink);
    }

    pub fn clear_ink_layer(&mut self) {
        self.ink = None;
    }

    pub fn ink_layer(&self) -> Option<&Arc<dyn InkLayer>> {
        self.ink.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            arrows: self.arrows.clone(),
            shapes: self.shapes.clone(),
            texts: self.texts.clone(),
            magnifiers: self.magnifiers.clone(),
            ink: self.ink.clone(),
        }
    }

    /// Flattens the current snapshot at source resolution. With no source
    /// image loaded this returns the defined 1x1 transparent placeholder
    /// rather than failing the caller.
    pub fn export(&self, display_size: Size) -> Result<DynamicImage> {
        match &self.image {
            Some(image) => flatten::flatten(image, &self.snapshot(), display_size),
            None => Ok(DynamicImage::ImageRgba8(RgbaImage::new(1, 1))),
        }
    }

    fn contains_id(&self, id: AnnotationId) -> bool {
        self.arrows.iter().any(|a| a.id == id)
            || self.shapes.iter().any(|s| s.id == id)
            || self.texts.iter().any(|t| t.id == id)
            || self.magnifiers.iter().any(|m| m.id == id)
    }

    fn prune_selection(&mut self) {
        if let Some(id) = self.selection {
            if !self.contains_id(id) {
                self.selection = None;
            }
        }
    }

    pub(crate) fn insert_arrow(&mut self, arrow: ArrowAnnotation) {
        self.arrows.push(arrow);
    }

    pub(crate) fn remove_arrow(&mut self, id: AnnotationId) {
        self.arrows.retain(|a| a.id != id);
        self.prune_selection();
    }

    pub(crate) fn insert_shape(&mut self, shape: ShapeAnnotation) {
        self.shapes.push(shape);
    }

    pub(crate) fn remove_shape(&mut self, id: AnnotationId) {
        self.shapes.retain(|s| s.id != id);
        self.prune_selection();
    }

    pub(crate) fn insert_text(&mut self, text: TextAnnotation) {
        self.texts.push(text);
    }

    pub(crate) fn remove_text(&mut self, id: AnnotationId) {
        self.texts.retain(|t| t.id != id);
        self.prune_selection();
    }

    pub(crate) fn insert_magnifier(&mut self, magnifier: MagnifierAnnotation) {
        self.magnifiers.push(magnifier);
    }

    pub(crate) fn remove_magnifier(&mut self, id: AnnotationId) {
        self.magnifiers.retain(|m| m.id != id);
        self.prune_selection();
    }
}

fn replace_by_id<T>(
    items: &mut [T],
    id: AnnotationId,
    value: T,
    key: impl Fn(&T) -> AnnotationId,
) -> Option<()> {
    let slot = items.iter_mut().find(|item| key(item) == id)?;
    *slot = value;
    Some(())
}
