#![warn(clippy::all, rust_2018_idioms)]

pub mod annotation;
pub mod flatten;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod state;

pub use annotation::{
    Annotation, AnnotationId, ArrowAnnotation, Handle, InkLayer, MagnifierAnnotation,
    ShapeAnnotation, ShapeKind, StrokeWidth, TextAnnotation, TextSize, Tool,
};
pub use flatten::{encode_png, flatten};
pub use geometry::{denormalize, normalize, Point, RectData, Size, Vec2};
pub use history::{HistoryEntry, UndoHistory};
pub use interaction::{commit_text, handle_pointer, GesturePhase, PointerInput};
pub use state::{DragAnnotation, EditorState, Snapshot, StoreError, UserSettings};
