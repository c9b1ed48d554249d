//! Panning, zooming and fitting the view.
//!
//! The diagram has no camera: panning and zooming move and scale the pens
//! themselves, and `data.scale` records the accumulated zoom.

use kurbo::Vec2;

use super::Scene;
use super::active::outline;
use crate::events::SceneEvent;
use crate::geometry::{Rect, bbox_of_points};

impl Scene {
    /// Tell the scene the size of its view.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.emit(SceneEvent::Resize { width, height });
        self.request_render();
    }

    /// Move every pen by `(x, y)`.
    pub fn translate(&mut self, x: f64, y: f64) {
        self.shift_view(Vec2::new(x, y));
        self.cache();
    }

    /// Move every pen without recording history. Used by drag panning,
    /// which records once on release.
    pub(crate) fn shift_view(&mut self, offset: Vec2) {
        if offset == Vec2::ZERO {
            return;
        }
        for pen in self.data.pens.iter_mut() {
            pen.translate(offset);
        }
        self.refresh_selection();
        self.emit(SceneEvent::Translate { x: offset.x, y: offset.y });
        self.request_render();
    }

    /// Zoom by `factor` about `center` (the diagram centre by default).
    /// Ignored when the result would leave the zoom range.
    pub fn scale(&mut self, factor: f64, center: Option<kurbo::Point>) {
        let target = self.data.scale * factor;
        if factor <= 0.0 || target < self.options.min_scale || target > self.options.max_scale {
            log::debug!("Ignoring zoom to {:.2}", target);
            return;
        }
        let center = center.or_else(|| self.get_rect().map(|r| r.center())).unwrap_or_default();
        self.data.scale = (target * 100.0).round() / 100.0;
        let registry = &self.registry;
        for pen in self.data.pens.iter_mut() {
            pen.scale(factor, center, registry);
        }
        self.refresh_selection();
        self.cache();
        self.emit(SceneEvent::Scale(self.data.scale));
        self.request_render();
    }

    /// Zoom to the absolute `scale`.
    pub fn scale_to(&mut self, scale: f64, center: Option<kurbo::Point>) {
        if self.data.scale > 0.0 {
            self.scale(scale / self.data.scale, center);
        }
    }

    /// Bounding box of the visible pens, or `None` for an empty diagram.
    pub fn get_rect(&self) -> Option<Rect> {
        let points: Vec<_> = self
            .data
            .pens
            .iter()
            .filter(|pen| pen.visible())
            .flat_map(|pen| outline(pen, &self.registry))
            .collect();
        (!points.is_empty()).then(|| bbox_of_points(&points))
    }

    pub fn has_view(&self) -> bool {
        self.get_rect().is_some()
    }

    /// Centre of the view inside `padding` (top, right, bottom, left).
    fn view_center(&self, padding: [f64; 4]) -> kurbo::Point {
        let [top, right, bottom, left] = padding;
        kurbo::Point::new(
            (self.width - right - left) / 2.0 + left,
            (self.height - top - bottom) / 2.0 + top,
        )
    }

    /// Move the diagram to the middle of the view. Returns false when there
    /// is nothing to centre.
    pub fn center_view(&mut self, padding: Option<[f64; 4]>) -> bool {
        let Some(rect) = self.get_rect() else {
            return false;
        };
        let target = self.view_center(padding.unwrap_or(self.options.view_padding));
        let offset = target - rect.center();
        self.translate(offset.x, offset.y);
        true
    }

    /// Centre the diagram and zoom it to fill the view inside `padding`,
    /// within the zoom range. Needs a known view size.
    pub fn fit_view(&mut self, padding: Option<[f64; 4]>) -> bool {
        if self.width <= 0.0 || self.height <= 0.0 || !self.center_view(padding) {
            return false;
        }
        let [top, right, bottom, left] = padding.unwrap_or(self.options.view_padding);
        let Some(rect) = self.get_rect() else {
            return false;
        };
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return true;
        }
        let ratio = ((self.width - left - right) / rect.width).min((self.height - top - bottom) / rect.height);
        let scale = self.data.scale * ratio;
        let center = Some(rect.center());
        if scale < self.options.min_scale {
            self.scale_to(self.options.min_scale, center);
        } else if scale > self.options.max_scale {
            self.scale_to(self.options.max_scale, center);
        } else {
            self.scale(ratio, center);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::tests::{add_rect, scene_with_log};

    fn rect_of(scene: &Scene, id: &str) -> Rect {
        scene.find_pen(id).unwrap().props().rect
    }

    #[test]
    fn test_translate_moves_everything() {
        let (mut scene, log) = scene_with_log();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        scene.translate(5.0, -5.0);
        assert_eq!(rect_of(&scene, "a"), Rect::new(5.0, -5.0, 10.0, 10.0));
        assert!(log.borrow().contains(&"translate".to_string()));
        assert!(scene.can_undo());
    }

    #[test]
    fn test_scale_respects_range() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        scene.scale(2.0, Some(kurbo::Point::ZERO));
        assert_eq!(scene.data().scale, 2.0);
        assert_eq!(rect_of(&scene, "a"), Rect::new(0.0, 0.0, 200.0, 200.0));

        scene.scale(10.0, None);
        assert_eq!(scene.data().scale, 2.0);

        scene.scale_to(1.0, Some(kurbo::Point::ZERO));
        assert_eq!(scene.data().scale, 1.0);
        assert_eq!(rect_of(&scene, "a"), Rect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_get_rect_of_empty_diagram() {
        let mut scene = Scene::default();
        assert!(scene.get_rect().is_none());
        assert!(!scene.has_view());
        assert!(!scene.center_view(None));
        add_rect(&mut scene, "a", Rect::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(scene.get_rect(), Some(Rect::new(10.0, 20.0, 30.0, 40.0)));
    }

    #[test]
    fn test_center_and_fit_view() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 50.0));
        scene.resize(400.0, 300.0);
        assert!(scene.center_view(Some([0.0; 4])));
        assert_eq!(rect_of(&scene, "a"), Rect::new(150.0, 125.0, 100.0, 50.0));

        assert!(scene.fit_view(Some([0.0; 4])));
        assert_eq!(scene.data().scale, 4.0);
        let rect = rect_of(&scene, "a");
        assert!((rect.width - 400.0).abs() < 1e-9);
        assert!((rect.center().y - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_view_clamps_to_max_scale() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        scene.resize(1000.0, 1000.0);
        assert!(scene.fit_view(Some([0.0; 4])));
        assert_eq!(scene.data().scale, scene.options().max_scale);
    }
}
