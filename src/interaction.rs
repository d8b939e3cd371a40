use log::debug;

use crate::annotation::{Annotation, AnnotationId, TextSize, Tool};
use crate::geometry::{self, Point, Size};
use crate::history::HistoryEntry;
use crate::state::EditorState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GesturePhase {
    Began,
    Changed,
    Ended,
    Cancelled,
}

/// One pointer event of a three-phase drag gesture. Locations arrive in the
/// current on-screen display's pixel space and are normalized on entry.
#[derive(Clone, Copy, Debug)]
pub struct PointerInput {
    pub phase: GesturePhase,
    pub position: Point,
    pub display_size: Size,
}

impl PointerInput {
    pub fn new(phase: GesturePhase, position: Point, display_size: Size) -> Self {
        Self {
            phase,
            position,
            display_size,
        }
    }
}

/// Drives the store from one pointer event, scoped to the active tool.
pub fn handle_pointer(state: &mut EditorState, input: PointerInput) {
    let point = geometry::normalize(input.position, input.display_size);
    match input.phase {
        GesturePhase::Began => begin(state, point),
        GesturePhase::Changed => changed(state, point),
        GesturePhase::Ended => ended(state),
        GesturePhase::Cancelled => state.cancel_drag(),
    }
}

fn begin(state: &mut EditorState, point: Point) {
    match state.active_tool {
        // Ink capture and erasing happen entirely in the external
        // collaborator; the eraser never touches the annotation collections.
        Tool::Draw | Tool::Eraser => {}
        // Text goes through the input collaborator, not the drag machine.
        Tool::Text => {}
        Tool::Arrow | Tool::Rectangle | Tool::Circle | Tool::Magnifier => {
            state.begin_drag(point);
        }
    }
}

fn changed(state: &mut EditorState, point: Point) {
    if state.drag().is_none() {
        // Tapping blank canvas deselects before a new annotation begins; a
        // magnifier refused at Began may start now that nothing is selected.
        state.select(None);
        begin(state, point);
        return;
    }
    state.update_drag(point);
}

fn ended(state: &mut EditorState) {
    let Some(id) = state.commit_drag() else {
        return;
    };
    let Some(annotation) = state.find_annotation(id) else {
        return;
    };
    debug!("committed annotation {id}");
    state.history.record(HistoryEntry::added(annotation));
}

/// Completion callback of the external text-input collaborator: mutates the
/// currently selected text annotation in place, or appends a new one anchored
/// at `position`. Empty input is discarded. Neither path records history.
pub fn commit_text(
    state: &mut EditorState,
    position: Point,
    display_size: Size,
    text: &str,
    size: TextSize,
) -> Option<AnnotationId> {
    let content = text.trim();
    if content.is_empty() {
        return None;
    }

    state.set_text_size(size);
    if let Some(id) = state.current_selection() {
        if let Some(Annotation::Text(mut existing)) = state.find_annotation(id) {
            existing.text = content.to_string();
            existing.size = size;
            let _ = state.update_existing(Annotation::Text(existing));
            return Some(id);
        }
    }

    let point = geometry::normalize(position, display_size);
    Some(state.add_text(point, content.to_string(), size))
}
