//! Keyframe and line-flow playback, driven from [`Scene::animation_frame`].

use std::collections::HashMap;

use super::Scene;
use crate::events::SceneEvent;
use crate::pen::{AnimateStatus, Line, MediaState, Pen, tree};

/// A pen that was paused mid-run.
#[derive(Debug, Clone)]
struct Paused {
    elapsed: f64,
    line: Option<Line>,
}

/// Pens currently playing.
///
/// Nodes animate in place. Lines animate through clones so the persisted
/// line (and the undo history) never sees dash offsets or dot positions.
#[derive(Debug, Default)]
pub struct Animator {
    nodes: Vec<String>,
    lines: Vec<Line>,
    /// Queued by `start_animate`; their clock starts on the next frame.
    starting: Vec<String>,
    paused: HashMap<String, Paused>,
    now: f64,
}

impl Animator {
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_active(&self) -> bool {
        !self.nodes.is_empty() || !self.lines.is_empty() || !self.starting.is_empty()
    }

    pub fn is_playing(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n == id) || self.lines.iter().any(|l| l.props.id == id)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.lines.clear();
        self.starting.clear();
        self.paused.clear();
    }

    fn playing_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .cloned()
            .chain(self.lines.iter().map(|l| l.props.id.clone()))
            .chain(self.starting.iter().cloned())
            .collect()
    }

    fn forget(&mut self, id: &str) {
        self.nodes.retain(|n| n != id);
        self.lines.retain(|l| l.props.id != id);
        self.starting.retain(|n| n != id);
    }
}

impl Scene {
    /// Play the pens tagged (or with id) `tag`, or every pen marked
    /// `animatePlay` when `tag` is `None`. Paused pens resume where they
    /// stopped.
    pub fn start_animate(&mut self, tag: Option<&str>) {
        let ids: Vec<String> = tree::flatten(&self.data.pens)
            .into_iter()
            .filter(|pen| match tag {
                Some(tag) => pen.props().matches(tag),
                None => pen.props().animate_play,
            })
            .map(|pen| pen.id().to_string())
            .collect();

        for id in ids {
            if self.animator.is_playing(&id) || self.animator.starting.contains(&id) {
                continue;
            }
            let resuming = self.animator.paused.contains_key(&id);
            let Some(pen) = tree::find_by_id_mut(&mut self.data.pens, &id) else {
                continue;
            };
            match pen {
                Pen::Node(node) => {
                    if node.animate_frames.is_empty() {
                        continue;
                    }
                    if !resuming {
                        node.init_animate();
                    }
                    self.animator.nodes.push(id.clone());
                }
                Pen::Line(line) => {
                    let clone = match self.animator.paused.get_mut(&id).and_then(|p| p.line.take()) {
                        Some(clone) => clone,
                        None => {
                            let mut clone = line.clone();
                            clone.props.animate_pos = 0.0;
                            clone.props.animate_cycle_index = 0;
                            clone
                        }
                    };
                    self.animator.lines.push(clone);
                }
            }
            log::debug!("Animation queued for {}", id);
            self.animator.starting.push(id);
        }
        self.request_render();
    }

    /// Pause playing pens matching `tag`, or all of them.
    pub fn pause_animate(&mut self, tag: Option<&str>) {
        let now = self.animator.now;
        for id in self.matching_playing(tag) {
            let started = !self.animator.starting.contains(&id);
            let line = self.animator.lines.iter().find(|l| l.props.id == id).cloned();
            let elapsed = match &line {
                Some(line) if started => now - line.props.animate_start,
                Some(_) => 0.0,
                None if started => self.find_pen(&id).map_or(0.0, |p| now - p.props().animate_start),
                None => 0.0,
            };
            if line.is_none() {
                if let Some(pen) = tree::find_by_id_mut(&mut self.data.pens, &id) {
                    pen.props_mut().animate_start = 0.0;
                }
            }
            self.animator.forget(&id);
            self.animator.paused.insert(id, Paused { elapsed, line });
        }
        self.request_render();
    }

    /// Stop pens matching `tag` (or all) and return nodes to their state
    /// before playback.
    pub fn stop_animate(&mut self, tag: Option<&str>) {
        let mut ids = self.matching_playing(tag);
        ids.extend(
            self.animator
                .paused
                .keys()
                .filter(|id| tag.is_none_or(|t| self.find_pen(id).is_some_and(|p| p.props().matches(t))))
                .cloned(),
        );

        let mut moved = Vec::new();
        for id in ids {
            self.animator.forget(&id);
            self.animator.paused.remove(&id);
            let registry = &self.registry;
            if let Some(Pen::Node(node)) = tree::find_by_id_mut(&mut self.data.pens, &id) {
                let before = node.props.rect;
                node.restore(None, registry);
                node.animate_ready = None;
                node.props.animate_start = 0.0;
                node.props.animate_cycle_index = 0;
                node.calc_children_rect(registry);
                if node.props.rect != before {
                    moved.push(id);
                }
            }
        }
        if !moved.is_empty() {
            self.update_lines(&moved);
        }
        self.request_render();
    }

    fn matching_playing(&self, tag: Option<&str>) -> Vec<String> {
        self.animator
            .playing_ids()
            .into_iter()
            .filter(|id| match tag {
                None => true,
                Some(tag) => self.find_pen(id).is_some_and(|p| p.props().matches(tag)),
            })
            .collect()
    }

    /// Advance every playing pen to `now`. Returns whether a repaint is due.
    pub(crate) fn tick_animations(&mut self, now: f64) -> bool {
        self.animator.now = now;
        if !self.animator.is_active() {
            return false;
        }

        for id in std::mem::take(&mut self.animator.starting) {
            let elapsed = self.animator.paused.remove(&id).map_or(0.0, |p| p.elapsed);
            let start = (now - elapsed).max(f64::EPSILON);
            if let Some(line) = self.animator.lines.iter_mut().find(|l| l.props.id == id) {
                line.props.animate_start = start;
            } else if let Some(pen) = tree::find_by_id_mut(&mut self.data.pens, &id) {
                pen.props_mut().animate_start = start;
            }
        }

        let mut moved = Vec::new();
        let mut finished = Vec::new();
        let registry = &self.registry;

        let mut still_playing = Vec::with_capacity(self.animator.nodes.len());
        for id in std::mem::take(&mut self.animator.nodes) {
            let Some(Pen::Node(node)) = tree::find_by_id_mut(&mut self.data.pens, &id) else {
                continue;
            };
            match node.animate(now, registry) {
                AnimateStatus::Running { rect_changed } => {
                    if rect_changed {
                        node.calc_children_rect(registry);
                        if !node.animate_alone {
                            moved.push(id.clone());
                        }
                    }
                    still_playing.push(id);
                }
                AnimateStatus::Finished => {
                    node.calc_children_rect(registry);
                    if !node.animate_alone {
                        moved.push(id.clone());
                    }
                    finished.push(Pen::Node(node.clone()));
                }
                AnimateStatus::Idle => {}
            }
        }
        self.animator.nodes = still_playing;

        let pens = &self.data.pens;
        self.animator.lines.retain_mut(|clone| {
            let Some(Pen::Line(line)) = tree::find_by_id(pens, &clone.props.id) else {
                return false;
            };
            if clone.from != line.from || clone.to != line.to || clone.control_points != line.control_points {
                clone.from = line.from.clone();
                clone.to = line.to.clone();
                clone.control_points = line.control_points.clone();
                clone.length = 0.0;
                clone.invalidate();
            }
            match clone.animate(now, registry) {
                AnimateStatus::Running { .. } => true,
                AnimateStatus::Finished => {
                    finished.push(Pen::Line(clone.clone()));
                    false
                }
                AnimateStatus::Idle => false,
            }
        });

        if !moved.is_empty() {
            self.update_lines(&moved);
        }
        let any_finished = !finished.is_empty();
        for pen in finished {
            log::debug!("Animation finished for {}", pen.id());
            let next = pen.props().next_animate.clone();
            self.emit(SceneEvent::AnimateEnd(pen));
            if let Some(next) = next.filter(|n| !n.is_empty()) {
                self.start_animate(Some(&next));
            }
        }
        any_finished || self.animator.is_active()
    }

    /// A node's image finished loading (`Some(size)`) or failed (`None`).
    /// The repaint is requested, not forced, so several loads coalesce.
    pub fn media_loaded(&mut self, id: &str, size: Option<(f64, f64)>) {
        let registry = &self.registry;
        let Some(Pen::Node(node)) = tree::find_by_id_mut(&mut self.data.pens, id) else {
            return;
        };
        node.media = match size {
            Some((width, height)) => MediaState::Ready { width, height },
            None => MediaState::Failed,
        };
        node.init(registry);
        let pen = Pen::Node(node.clone());
        self.cache_replace(std::slice::from_ref(&pen));
        self.request_render();
    }

    /// A node's audio or video reached its end; play its `nextPlay` tag.
    pub fn media_ended(&mut self, id: &str) {
        let Some(pen) = self.clone_pen(id) else {
            return;
        };
        let next = pen.as_node().and_then(|n| n.next_play.clone());
        if let Some(next) = next.filter(|n| !n.is_empty()) {
            self.start_animate(Some(&next));
        }
        self.emit(SceneEvent::MediaEnd(pen));
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{add_rect, scene_with_log};
    use crate::geometry::{Point, Rect};
    use crate::pen::{AnimateFrame, Line, Pen, tree};

    fn keyframed(scene: &mut super::Scene, id: &str, next: Option<&str>) {
        let Some(Pen::Node(node)) = tree::find_by_id_mut(&mut scene.data.pens, id) else {
            panic!("missing {id}");
        };
        let mut target = node.state_snapshot();
        target.props.rect = Rect::new(100.0, 0.0, 100.0, 100.0);
        node.animate_frames.push(AnimateFrame {
            duration: 1000.0,
            linear: true,
            state: Box::new(target),
            ..Default::default()
        });
        node.props.animate_cycle = 1;
        node.props.tags.push("run".into());
        node.props.next_animate = next.map(str::to_string);
    }

    #[test]
    fn test_keyframes_play_finish_and_chain() {
        let (mut scene, log) = scene_with_log();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "b", Rect::new(0.0, 200.0, 100.0, 100.0));
        keyframed(&mut scene, "a", Some("b"));
        keyframed(&mut scene, "b", None);

        scene.start_animate(Some("a"));
        assert!(scene.tick_animations(1_000.0));
        assert!(scene.tick_animations(1_500.0));
        assert!((scene.find_pen("a").unwrap().props().rect.x - 50.0).abs() < 1e-6);

        assert!(scene.tick_animations(2_100.0));
        assert_eq!(scene.find_pen("a").unwrap().props().rect.x, 100.0);
        assert!(log.borrow().contains(&"animateEnd".to_string()));
        assert!(scene.animator.starting.contains(&"b".to_string()));
    }

    #[test]
    fn test_pens_without_frames_are_skipped() {
        let mut scene = super::Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        scene.start_animate(Some("a"));
        assert!(!scene.animator.is_active());
        assert!(!scene.tick_animations(16.0));
    }

    #[test]
    fn test_line_animates_through_clone() {
        let mut scene = super::Scene::default();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(200.0, 0.0));
        line.props.id = "l".into();
        scene.add_line(line, false);
        scene.start_animate(Some("l"));
        scene.tick_animations(100.0);
        scene.tick_animations(120.0);
        assert_eq!(scene.animating_lines().len(), 1);
        assert!(scene.animating_lines()[0].props.line_dash.is_some());
        let persisted = scene.find_pen("l").unwrap().as_line().unwrap();
        assert!(persisted.props.line_dash.is_none());
        assert!(!persisted.props.is_playing());
    }

    #[test]
    fn test_pause_resumes_and_stop_restores() {
        let mut scene = super::Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        keyframed(&mut scene, "a", None);

        scene.start_animate(Some("run"));
        scene.tick_animations(1_000.0);
        scene.tick_animations(1_400.0);
        scene.pause_animate(Some("run"));
        assert!(!scene.find_pen("a").unwrap().props().is_playing());

        // Resume later: elapsed 400ms carries over.
        scene.start_animate(Some("run"));
        scene.tick_animations(5_000.0);
        scene.tick_animations(5_100.0);
        assert!((scene.find_pen("a").unwrap().props().rect.x - 50.0).abs() < 1e-6);

        scene.stop_animate(None);
        let a = scene.find_pen("a").unwrap();
        assert_eq!(a.props().rect.x, 0.0);
        assert!(!a.props().is_playing());
        assert!(!scene.animator.is_active());
    }

    #[test]
    fn test_open_autoplays() {
        let mut scene = super::Scene::default();
        scene
            .open_json(
                r#"{"pens": [{"id": "a", "name": "rectangle", "animatePlay": true,
                    "rect": {"x": 0, "y": 0, "width": 10, "height": 10},
                    "animateFrames": [{"duration": 100, "state": {"rect": {"x": 50, "y": 0, "width": 10, "height": 10}}}]}]}"#,
            )
            .unwrap();
        assert!(scene.animator.is_active());
    }

    #[test]
    fn test_media_loaded_marks_ready() {
        let mut scene = super::Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        scene.take_render_request();
        scene.media_loaded("a", Some((64.0, 32.0)));
        let node = scene.find_pen("a").unwrap().as_node().unwrap();
        assert_eq!(node.media, crate::pen::MediaState::Ready { width: 64.0, height: 32.0 });
        assert!(scene.take_render_request());
    }
}
