//! Recorded drawing commands.
//!
//! A [`DisplayList`] is the painter every layer draws into. Lists are cheap
//! to rebuild each frame and can be replayed into any other [`Painter`],
//! which is how layers are composited and how backends consume them.

use kurbo::{Affine, BezPath, Shape as _, Stroke};
use topograph_core::draw::{Paint, Painter, TextRun};
use topograph_core::geometry::Rect;

/// One recorded painter call.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    Save,
    Restore,
    Transform(Affine),
    Alpha(f64),
    Fill { path: BezPath, paint: Paint },
    Stroke { path: BezPath, style: Stroke, paint: Paint },
    Text(TextRun),
    Image { source: String, rect: Rect },
}

#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing visible was recorded.
    pub fn is_empty(&self) -> bool {
        !self.commands.iter().any(DrawCommand::is_visible)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Play every command into `painter`.
    pub fn replay(&self, painter: &mut dyn Painter) {
        for command in &self.commands {
            match command {
                DrawCommand::Save => painter.save(),
                DrawCommand::Restore => painter.restore(),
                DrawCommand::Transform(affine) => painter.transform(*affine),
                DrawCommand::Alpha(alpha) => painter.set_alpha(*alpha),
                DrawCommand::Fill { path, paint } => painter.fill(path, paint),
                DrawCommand::Stroke { path, style, paint } => painter.stroke(path, style, paint),
                DrawCommand::Text(run) => painter.text(run),
                DrawCommand::Image { source, rect } => painter.image(source, *rect),
            }
        }
    }

    /// Image sources referenced by the list, in first-use order.
    pub fn image_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for command in &self.commands {
            if let DrawCommand::Image { source, .. } = command {
                if !out.contains(&source.as_str()) {
                    out.push(source);
                }
            }
        }
        out
    }

    /// Device-space bounds of everything drawn, ignoring stroke width.
    pub fn bounds(&self) -> Option<kurbo::Rect> {
        let mut stack = Vec::new();
        let mut transform = Affine::IDENTITY;
        let mut out: Option<kurbo::Rect> = None;
        let mut add = |rect: kurbo::Rect| {
            out = Some(match out {
                Some(acc) => acc.union(rect),
                None => rect,
            });
        };
        for command in &self.commands {
            match command {
                DrawCommand::Save => stack.push(transform),
                DrawCommand::Restore => transform = stack.pop().unwrap_or(Affine::IDENTITY),
                DrawCommand::Transform(affine) => transform *= *affine,
                DrawCommand::Alpha(_) => {}
                DrawCommand::Fill { path, .. } | DrawCommand::Stroke { path, .. } => {
                    add((transform * path.clone()).bounding_box());
                }
                DrawCommand::Text(TextRun { rect, .. }) | DrawCommand::Image { rect, .. } => {
                    add(transform.transform_rect_bbox(rect.to_kurbo()));
                }
            }
        }
        out
    }
}

impl DrawCommand {
    fn is_visible(&self) -> bool {
        matches!(
            self,
            DrawCommand::Fill { .. } | DrawCommand::Stroke { .. } | DrawCommand::Text(_) | DrawCommand::Image { .. }
        )
    }
}

impl Painter for DisplayList {
    fn save(&mut self) {
        self.commands.push(DrawCommand::Save);
    }

    fn restore(&mut self) {
        self.commands.push(DrawCommand::Restore);
    }

    fn transform(&mut self, affine: Affine) {
        self.commands.push(DrawCommand::Transform(affine));
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.commands.push(DrawCommand::Alpha(alpha));
    }

    fn fill(&mut self, path: &BezPath, paint: &Paint) {
        self.commands.push(DrawCommand::Fill {
            path: path.clone(),
            paint: paint.clone(),
        });
    }

    fn stroke(&mut self, path: &BezPath, style: &Stroke, paint: &Paint) {
        self.commands.push(DrawCommand::Stroke {
            path: path.clone(),
            style: style.clone(),
            paint: paint.clone(),
        });
    }

    fn text(&mut self, run: &TextRun) {
        self.commands.push(DrawCommand::Text(run.clone()));
    }

    fn image(&mut self, source: &str, rect: Rect) {
        self.commands.push(DrawCommand::Image {
            source: source.to_string(),
            rect,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::Color;

    fn square(x: f64, y: f64, size: f64) -> BezPath {
        kurbo::Rect::new(x, y, x + size, y + size).to_path(0.1)
    }

    #[test]
    fn test_records_and_replays() {
        let mut list = DisplayList::new();
        assert!(list.is_empty());
        list.save();
        list.set_alpha(0.5);
        list.fill(&square(0.0, 0.0, 10.0), &Paint::Solid(Color::BLACK));
        list.restore();
        assert_eq!(list.len(), 4);
        assert!(!list.is_empty());

        let mut copy = DisplayList::new();
        list.replay(&mut copy);
        assert_eq!(copy.len(), 4);
        assert!(matches!(copy.commands()[1], DrawCommand::Alpha(a) if a == 0.5));
    }

    #[test]
    fn test_bounds_follow_transforms() {
        let mut list = DisplayList::new();
        assert!(list.bounds().is_none());
        list.save();
        list.transform(Affine::translate((100.0, 0.0)));
        list.fill(&square(0.0, 0.0, 10.0), &Paint::Solid(Color::BLACK));
        list.restore();
        list.image("a.png", Rect::new(-5.0, -5.0, 5.0, 5.0));
        let bounds = list.bounds().unwrap();
        assert_eq!((bounds.x0, bounds.y0, bounds.x1, bounds.y1), (-5.0, -5.0, 110.0, 10.0));
    }

    #[test]
    fn test_image_sources_deduplicated() {
        let mut list = DisplayList::new();
        list.image("a.png", Rect::new(0.0, 0.0, 1.0, 1.0));
        list.image("b.png", Rect::new(0.0, 0.0, 1.0, 1.0));
        list.image("a.png", Rect::new(5.0, 0.0, 1.0, 1.0));
        assert_eq!(list.image_sources(), vec!["a.png", "b.png"]);
    }
}
