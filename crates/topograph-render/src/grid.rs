//! Background grid and rulers.

use kurbo::{BezPath, Point, Rect, Stroke};
use peniko::Color;
use topograph_core::draw::{Paint, Painter, TextRun};
use topograph_core::geometry;
use topograph_core::pen::Font;

/// Thickness of the ruler bands along the top and left edges.
pub const RULE_SIZE: f64 = 20.0;
const RULE_TICK: f64 = 10.0;

/// Draw grid lines every `size` pixels across `viewport`.
pub fn draw_grid(painter: &mut dyn Painter, viewport: Rect, size: f64, color: Color) {
    if size <= 1.0 || viewport.is_zero_area() {
        return;
    }
    let mut path = BezPath::new();
    let mut x = (viewport.x0 / size).ceil() * size;
    while x <= viewport.x1 {
        path.move_to(Point::new(x, viewport.y0));
        path.line_to(Point::new(x, viewport.y1));
        x += size;
    }
    let mut y = (viewport.y0 / size).ceil() * size;
    while y <= viewport.y1 {
        path.move_to(Point::new(viewport.x0, y));
        path.line_to(Point::new(viewport.x1, y));
        y += size;
    }
    painter.stroke(&path, &Stroke::new(1.0), &Paint::Solid(color));
}

/// Draw rulers along the top and left edges of `viewport`. Labels show
/// view coordinates divided by `scale`, so they read in diagram units.
pub fn draw_rule(painter: &mut dyn Painter, viewport: Rect, scale: f64, color: Color) {
    if viewport.is_zero_area() {
        return;
    }
    let scale = if scale > 0.0 { scale } else { 1.0 };
    let paint = Paint::Solid(color);
    let mut ticks = BezPath::new();

    ticks.move_to(Point::new(viewport.x0, viewport.y0 + RULE_SIZE));
    ticks.line_to(Point::new(viewport.x1, viewport.y0 + RULE_SIZE));
    ticks.move_to(Point::new(viewport.x0 + RULE_SIZE, viewport.y0));
    ticks.line_to(Point::new(viewport.x0 + RULE_SIZE, viewport.y1));

    let mut labels = Vec::new();
    let mut i = 0usize;
    let mut x = viewport.x0 + RULE_SIZE;
    while x <= viewport.x1 {
        let len = tick_len(i);
        ticks.move_to(Point::new(x, viewport.y0 + RULE_SIZE - len));
        ticks.line_to(Point::new(x, viewport.y0 + RULE_SIZE));
        if i % 10 == 0 {
            labels.push((label(x, scale), geometry::Rect::new(x + 2.0, viewport.y0, 40.0, RULE_SIZE / 2.0)));
        }
        x += RULE_TICK;
        i += 1;
    }
    i = 0;
    let mut y = viewport.y0 + RULE_SIZE;
    while y <= viewport.y1 {
        let len = tick_len(i);
        ticks.move_to(Point::new(viewport.x0 + RULE_SIZE - len, y));
        ticks.line_to(Point::new(viewport.x0 + RULE_SIZE, y));
        if i % 10 == 0 && i > 0 {
            labels.push((label(y, scale), geometry::Rect::new(viewport.x0, y + 2.0, RULE_SIZE, RULE_SIZE / 2.0)));
        }
        y += RULE_TICK;
        i += 1;
    }
    painter.stroke(&ticks, &Stroke::new(1.0), &paint);

    let font = Font {
        font_size: 8.0,
        text_align: "left".to_string(),
        ..Font::default()
    };
    for (text, rect) in labels {
        painter.text(&TextRun {
            text,
            rect,
            font: font.clone(),
            color,
            background: None,
            max_lines: 1,
            wrap: false,
        });
    }
}

fn tick_len(i: usize) -> f64 {
    if i % 10 == 0 {
        RULE_SIZE / 2.0
    } else if i % 5 == 0 {
        RULE_SIZE / 3.0
    } else {
        RULE_SIZE / 5.0
    }
}

fn label(pos: f64, scale: f64) -> String {
    format!("{}", (pos / scale).round() as i64)
}
