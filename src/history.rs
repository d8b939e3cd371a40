use crate::annotation::{
    Annotation, ArrowAnnotation, MagnifierAnnotation, ShapeAnnotation, TextAnnotation,
};
use crate::state::EditorState;

/// A reversible whole-annotation action. Each entry carries the full value so
/// it can be replayed or inverted without consulting the store.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoryEntry {
    AddArrow(ArrowAnnotation),
    RemoveArrow(ArrowAnnotation),
    AddShape(ShapeAnnotation),
    RemoveShape(ShapeAnnotation),
    AddText(TextAnnotation),
    RemoveText(TextAnnotation),
    AddMagnifier(MagnifierAnnotation),
    RemoveMagnifier(MagnifierAnnotation),
}

impl HistoryEntry {
    pub fn added(annotation: Annotation) -> Self {
        match annotation {
            Annotation::Arrow(arrow) => Self::AddArrow(arrow),
            Annotation::Shape(shape) => Self::AddShape(shape),
            Annotation::Text(text) => Self::AddText(text),
            Annotation::Magnifier(magnifier) => Self::AddMagnifier(magnifier),
        }
    }

    /// Add and Remove are exact inverses of each other.
    pub fn inverted(&self) -> HistoryEntry {
        match self {
            Self::AddArrow(arrow) => Self::RemoveArrow(arrow.clone()),
            Self::RemoveArrow(arrow) => Self::AddArrow(arrow.clone()),
            Self::AddShape(shape) => Self::RemoveShape(shape.clone()),
            Self::RemoveShape(shape) => Self::AddShape(shape.clone()),
            Self::AddText(text) => Self::RemoveText(text.clone()),
            Self::RemoveText(text) => Self::AddText(text.clone()),
            Self::AddMagnifier(magnifier) => Self::RemoveMagnifier(magnifier.clone()),
            Self::RemoveMagnifier(magnifier) => Self::AddMagnifier(magnifier.clone()),
        }
    }

    pub(crate) fn apply(&self, state: &mut EditorState) {
        match self {
            Self::AddArrow(arrow) => state.insert_arrow(arrow.clone()),
            Self::RemoveArrow(arrow) => state.remove_arrow(arrow.id),
            Self::AddShape(shape) => state.insert_shape(shape.clone()),
            Self::RemoveShape(shape) => state.remove_shape(shape.id),
            Self::AddText(text) => state.insert_text(text.clone()),
            Self::RemoveText(text) => state.remove_text(text.id),
            Self::AddMagnifier(magnifier) => state.insert_magnifier(magnifier.clone()),
            Self::RemoveMagnifier(magnifier) => state.remove_magnifier(magnifier.id),
        }
    }
}

/// Linear undo/redo over whole-annotation actions. A new edit drops any redo
/// tail; empty-stack calls are absorbed by the store as no-ops.
#[derive(Clone, Debug, Default)]
pub struct UndoHistory {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub(crate) fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo_stack.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo_stack.pop()
    }

    pub(crate) fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo_stack.push(entry);
    }

    /// Re-arms an undone entry after redo without touching the redo tail.
    pub(crate) fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
    }
}
