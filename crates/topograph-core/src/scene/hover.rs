//! Transient state drawn above the diagram while the pointer moves.

use crate::geometry::{Point, Rect};
use crate::pen::Line;

/// Hover feedback: the node under the pointer, the line being drawn,
/// snap guides and the rubber-band rectangle.
#[derive(Debug, Clone, Default)]
pub struct HoverState {
    /// Node whose anchors are shown.
    pub node: Option<String>,
    /// Line whose end is being dragged or drawn.
    pub line: Option<String>,
    /// Anchor or line end the dragged end last snapped to.
    pub dock_anchor: Option<Point>,
    /// Vertical snap guide at this x.
    pub dock_line_x: Option<f64>,
    /// Horizontal snap guide at this y.
    pub dock_line_y: Option<f64>,
    /// Rubber-band selection rectangle, in drag order (may be negative).
    pub drag_rect: Option<Rect>,
    /// Control point of `line` under the pointer.
    pub line_control_point: Option<usize>,
    /// Pen whose tooltip is showing.
    pub tip: Option<String>,
    /// The line as it was when a whole-line drag began.
    pub(crate) init_line: Option<Line>,
}

impl HoverState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn clear_dock(&mut self) {
        self.dock_anchor = None;
        self.dock_line_x = None;
        self.dock_line_y = None;
    }
}
