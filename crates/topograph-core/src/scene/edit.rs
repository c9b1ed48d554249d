//! Document edits: adding and removing pens, the clipboard, z-order,
//! grouping, property access and undo.

use std::collections::{HashMap, HashSet};

use kurbo::Vec2;
use serde_json::Value;

use super::Scene;
use super::active::outline;
use crate::error::{Error, Result};
use crate::events::SceneEvent;
use crate::geometry::{Point, bbox_of_points};
use crate::pen::{Line, Lock, Node, Pen, new_id, tree};
use crate::realtime::props;

/// Offset of pasted pens from their originals.
const PASTE_OFFSET: f64 = 20.0;

/// Sibling list holding `id`, and its index there.
fn siblings_of<'a>(pens: &'a mut Vec<Pen>, id: &str) -> Option<(&'a mut Vec<Pen>, usize)> {
    if let Some(index) = pens.iter().position(|pen| pen.id() == id) {
        return Some((pens, index));
    }
    for pen in pens.iter_mut() {
        if let Pen::Node(node) = pen {
            if let Some(found) = siblings_of(&mut node.children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Give `pen` and its descendants fresh ids, recording old to new.
fn renew_ids(pen: &mut Pen, parent: Option<&str>, map: &mut HashMap<String, String>) {
    let id = new_id();
    map.insert(pen.id().to_string(), id.clone());
    let props = pen.props_mut();
    props.id = id.clone();
    props.parent_id = parent.map(str::to_string);
    if parent.is_none() {
        props.rect_in_parent = None;
    }
    if let Pen::Node(node) = pen {
        for child in node.children.iter_mut() {
            renew_ids(child, Some(&id), map);
        }
    }
}

impl Scene {
    /// Select the pens with these ids. Unknown ids are ignored.
    pub fn select<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| self.find_pen(id).is_some())
            .collect();
        self.selection.set(ids);
        self.refresh_selection();
        self.request_render();
    }

    pub fn select_all(&mut self) {
        let ids = self
            .data
            .pens
            .iter()
            .filter(|pen| pen.visible() && pen.locked() != Lock::NoEvent)
            .map(|pen| pen.id().to_string())
            .collect();
        self.selection.set(ids);
        self.refresh_selection();
        self.emit_selection();
        self.request_render();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.hover.clear();
        self.request_render();
    }

    /// Add a node. Returns `None` when its shape is not registered. With
    /// `focus` the node is selected, recorded in history and announced.
    pub fn add_node(&mut self, mut node: Node, focus: bool) -> Option<String> {
        if !self.registry.has_shape(&node.props.name) {
            log::warn!("Not adding node {}: no shape {:?}", node.props.id, node.props.name);
            return None;
        }
        if node.props.stroke_style.is_empty() {
            node.props.stroke_style = self.options.color.clone();
        }
        if node.props.font.color.is_empty() {
            node.props.font.color = self.options.font.color.clone();
        }
        if self.data.scale != 1.0 {
            let center = node.props.rect.center();
            node.scale(self.data.scale, center, &self.registry);
        }
        let mut pen = Pen::Node(node);
        pen.init(&self.registry);
        let id = pen.id().to_string();
        let autoplay = pen.props().animate_play;
        self.data.pens.push(pen);

        if focus {
            self.select([id.clone()]);
            if autoplay {
                self.start_animate(Some(&id));
            }
            self.cache();
            if let Some(pen) = self.clone_pen(&id) {
                self.emit(SceneEvent::AddNode(pen));
            }
        }
        self.request_render();
        Some(id)
    }

    /// Add a line. Refused while the diagram is locked.
    pub fn add_line(&mut self, mut line: Line, focus: bool) -> Option<String> {
        if !self.data.locked.is_none() {
            return None;
        }
        if line.control_points.is_empty() {
            line.calc_control_points(&self.registry, true);
        } else {
            line.invalidate();
        }
        if self.data.scale != 1.0 {
            line.props.font.font_size *= self.data.scale;
        }
        let id = line.props.id.clone();
        self.data.pens.push(Pen::Line(line));

        if focus {
            self.select([id.clone()]);
            self.cache();
            if let Some(pen) = self.clone_pen(&id) {
                self.emit(SceneEvent::AddLine(pen));
            }
        }
        self.request_render();
        Some(id)
    }

    /// Drop pens described as JSON, centring the first at `(x, y)` and
    /// keeping the others where they sit relative to it.
    pub fn drop_nodes(&mut self, items: &[Value], x: f64, y: f64) -> Result<Vec<String>> {
        let mut pens = items
            .iter()
            .map(|item| serde_json::from_value::<Pen>(item.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let Some(first) = pens.first() else {
            return Ok(Vec::new());
        };
        let rect = first.props().rect;
        let offset = Vec2::new(x - rect.width / 2.0 - rect.x, y - rect.height / 2.0 - rect.y);

        let mut ids = Vec::new();
        for pen in pens.iter_mut() {
            if self.find_pen(pen.id()).is_some() {
                *pen = pen.clone_fresh();
            }
            if let Pen::Line(line) = pen {
                if line.from.is_same_as(&line.to) {
                    let r = line.props.rect;
                    line.from = Point::new(r.x, r.y + r.height / 2.0);
                    line.to = Point::new(r.ex(), r.y + r.height / 2.0);
                }
            }
            pen.translate(offset);
            let added = match pen.clone() {
                Pen::Node(node) => self.add_node(node, false),
                Pen::Line(line) => self.add_line(line, false),
            };
            ids.extend(added);
        }

        self.select(ids.clone());
        self.cache();
        for pen in self.clone_pens(&ids) {
            let event = if pen.is_line() { SceneEvent::AddLine(pen) } else { SceneEvent::AddNode(pen) };
            self.emit(event);
        }
        Ok(ids)
    }

    /// Delete the selected pens that are not locked.
    pub fn delete(&mut self) {
        if !self.data.locked.is_none() {
            return;
        }
        let ids = self
            .selection
            .pens(&self.data.pens)
            .into_iter()
            .filter(|pen| pen.locked().is_none())
            .map(|pen| pen.id().to_string())
            .collect();
        self.delete_ids(ids);
    }

    /// Delete every pen whose id or tag is `id_or_tag`.
    pub fn delete_by(&mut self, id_or_tag: &str) {
        let ids = tree::ids_matching(&self.data.pens, id_or_tag);
        self.delete_ids(ids);
    }

    fn delete_ids(&mut self, ids: Vec<String>) {
        let mut removed: Vec<Pen> = ids.iter().filter_map(|id| tree::remove(&mut self.data.pens, id)).collect();
        if removed.is_empty() {
            return;
        }
        if self.options.disable_empty_line {
            let gone: HashSet<String> = tree::flatten(&removed).iter().map(|pen| pen.id().to_string()).collect();
            let dangling = |p: &Point| p.id.as_ref().is_some_and(|id| gone.contains(id));
            let orphans: Vec<String> = tree::flatten(&self.data.pens)
                .into_iter()
                .filter_map(Pen::as_line)
                .filter(|line| dangling(&line.from) || dangling(&line.to))
                .map(|line| line.props.id.clone())
                .collect();
            removed.extend(orphans.iter().filter_map(|id| tree::remove(&mut self.data.pens, id)));
        }
        log::debug!("Deleted {} pens", removed.len());
        self.selection.clear();
        self.hover.clear();
        self.cache();
        self.emit(SceneEvent::Delete(removed));
        self.request_render();
    }

    pub fn cut(&mut self) {
        if !self.data.locked.is_none() {
            return;
        }
        self.copy();
        self.delete();
    }

    pub fn copy(&mut self) {
        self.clipboard = self.selection.pens(&self.data.pens).into_iter().cloned().collect();
        if !self.clipboard.is_empty() {
            self.emit(SceneEvent::Copy(self.clipboard.clone()));
        }
    }

    /// Paste the clipboard with fresh ids, shifted from the copied pens.
    /// Line ends bound to copied nodes follow the copies; ends bound to
    /// anything else are released.
    pub fn paste(&mut self) {
        if !self.data.locked.is_none() || self.clipboard.is_empty() {
            return;
        }
        let mut map = HashMap::new();
        let mut pasted = self.clipboard.clone();
        for pen in pasted.iter_mut() {
            renew_ids(pen, None, &mut map);
        }
        tree::walk_mut(&mut pasted, &mut |pen| {
            if let Pen::Line(line) = pen {
                for end in [&mut line.from, &mut line.to] {
                    match end.id.as_ref().and_then(|id| map.get(id)) {
                        Some(id) => end.id = Some(id.clone()),
                        None => end.unbind(),
                    }
                }
                line.invalidate();
            }
        });

        let offset = Vec2::new(PASTE_OFFSET, PASTE_OFFSET);
        let mut ids = Vec::new();
        for pen in pasted.iter_mut() {
            pen.translate(offset);
            pen.init(&self.registry);
            ids.push(pen.id().to_string());
        }
        self.data.pens.extend(pasted.iter().cloned());
        self.clipboard = pasted.clone();
        self.select(ids);
        self.cache();
        self.emit(SceneEvent::Paste(pasted));
    }

    /// Lock or unlock the whole diagram.
    pub fn lock(&mut self, lock: Lock) {
        self.data.locked = lock;
        if !lock.is_none() {
            self.hover.clear();
        }
        self.refresh_selection();
        self.emit(SceneEvent::Locked(lock));
        self.request_render();
    }

    pub fn lock_pens(&mut self, ids: &[String], lock: Lock) {
        for id in ids {
            if let Some(pen) = tree::find_by_id_mut(&mut self.data.pens, id) {
                pen.props_mut().locked = lock;
            }
        }
        self.refresh_selection();
        self.cache();
        self.emit(SceneEvent::LockPens { ids: ids.to_vec(), lock });
        self.request_render();
    }

    /// Bring `id` one step forward among its siblings.
    pub fn up(&mut self, id: &str) {
        self.reorder(id, |list, i| {
            if i + 1 < list.len() {
                list.swap(i, i + 1);
            }
        });
    }

    pub fn down(&mut self, id: &str) {
        self.reorder(id, |list, i| {
            if i > 0 {
                list.swap(i, i - 1);
            }
        });
    }

    pub fn top(&mut self, id: &str) {
        self.reorder(id, |list, i| {
            let pen = list.remove(i);
            list.push(pen);
        });
    }

    pub fn bottom(&mut self, id: &str) {
        self.reorder(id, |list, i| {
            let pen = list.remove(i);
            list.insert(0, pen);
        });
    }

    fn reorder(&mut self, id: &str, f: impl FnOnce(&mut Vec<Pen>, usize)) {
        let Some((list, index)) = siblings_of(&mut self.data.pens, id) else {
            return;
        };
        f(list, index);
        self.cache();
        self.request_render();
    }

    /// Group the selected pens. A selected node covering the whole group
    /// becomes the parent; otherwise a new `combine` node is created.
    /// Children marked `stand` stay selectable on their own.
    pub fn combine(&mut self, stand: bool) -> Option<String> {
        let selected: Vec<Pen> = self.selection.pens(&self.data.pens).into_iter().cloned().collect();
        if selected.len() < 2 {
            return None;
        }
        let points: Vec<Point> = selected.iter().flat_map(|pen| outline(pen, &self.registry)).collect();
        let rect = bbox_of_points(&points);

        let parent_id = match selected.iter().find(|pen| !pen.is_line() && pen.props().rect == rect) {
            Some(pen) => pen.id().to_string(),
            None => {
                let mut parent = Node::new("combine", rect);
                parent.props.stroke_style = "transparent".to_string();
                let id = parent.props.id.clone();
                let mut pen = Pen::Node(parent);
                pen.init(&self.registry);
                let index = tree::root_index(&self.data.pens, selected[0].id()).unwrap_or(self.data.pens.len());
                self.data.pens.insert(index, pen);
                id
            }
        };

        let frame = match tree::find_by_id(&self.data.pens, &parent_id).and_then(Pen::as_node) {
            Some(parent) => parent.frame(),
            None => return None,
        };
        let mut children = Vec::new();
        for pen in &selected {
            if pen.id() == parent_id {
                continue;
            }
            let Some(mut child) = tree::remove(&mut self.data.pens, pen.id()) else {
                continue;
            };
            let props = child.props_mut();
            props.stand = stand;
            props.parent_id = Some(parent_id.clone());
            child.calc_rect_in_parent(&frame);
            children.push(child);
        }
        if let Some(Pen::Node(parent)) = tree::find_by_id_mut(&mut self.data.pens, &parent_id) {
            parent.children.extend(children);
        }

        self.select([parent_id.clone()]);
        if let Some(pen) = self.clone_pen(&parent_id) {
            self.emit(SceneEvent::Node(pen));
        }
        self.cache();
        Some(parent_id)
    }

    /// Release the children of `id` to the top level. A `combine` parent
    /// is removed with them.
    pub fn uncombine(&mut self, id: &str) {
        let Some(Pen::Node(parent)) = tree::find_by_id_mut(&mut self.data.pens, id) else {
            return;
        };
        if parent.children.is_empty() {
            return;
        }
        let mut children = std::mem::take(&mut parent.children);
        let remove_parent = parent.props.name == "combine";
        for child in children.iter_mut() {
            let props = child.props_mut();
            props.parent_id = None;
            props.rect_in_parent = None;
            props.locked = Lock::None;
            props.stand = false;
        }
        let index = tree::root_index(&self.data.pens, id).map_or(self.data.pens.len(), |i| i + 1);
        let index = index.min(self.data.pens.len());
        self.data.pens.splice(index..index, children);
        if remove_parent {
            tree::remove(&mut self.data.pens, id);
        }

        self.selection.clear();
        self.hover.clear();
        self.emit(SceneEvent::Space(None));
        self.cache();
        self.request_render();
    }

    /// Every pen whose id or tag is `id_or_tag`.
    pub fn find(&self, id_or_tag: &str) -> Vec<&Pen> {
        tree::find(&self.data.pens, id_or_tag)
    }

    /// The JSON value at a dotted path of pen `id`, such as `rect.x` or
    /// `data.temperature`.
    pub fn get_value(&self, id: &str, path: &str) -> Option<Value> {
        self.find_pen(id).and_then(|pen| props::get_path(pen, path))
    }

    /// Set the JSON value at a dotted path of pen `id` and record the edit.
    pub fn set_value(&mut self, id: &str, path: &str, value: Value) -> Result<()> {
        if self.data.locked > Lock::Readonly {
            return Err(Error::Locked);
        }
        self.apply_value(id, path, value)?;
        self.cache();
        Ok(())
    }

    /// Set a property without recording history. Live updates use this
    /// and are allowed on locked diagrams.
    pub(crate) fn apply_value(&mut self, id: &str, path: &str, value: Value) -> Result<()> {
        let pen = tree::find_by_id_mut(&mut self.data.pens, id).ok_or_else(|| Error::PenNotFound(id.to_string()))?;
        props::set_path(pen, path, value)?;
        pen.init(&self.registry);
        self.update_lines(&[id.to_string()]);
        self.refresh_selection();
        self.request_render();
        Ok(())
    }

    /// Switch the route of the selected lines, and of lines drawn from now
    /// on.
    pub fn set_line_name(&mut self, name: &str) {
        self.data.line_name = name.to_string();
        let ids = self.selection.ids.clone();
        let mut changed = false;
        for id in &ids {
            if let Some(Pen::Line(line)) = tree::find_by_id_mut(&mut self.data.pens, id) {
                line.set_route(name, &self.registry);
                changed = true;
            }
        }
        if changed {
            self.refresh_selection();
            self.cache();
            self.request_render();
        }
    }

    /// Re-lay out every pen after edits made through [`Scene::data_mut`]
    /// or registry changes, and record the result.
    pub fn update_props(&mut self) {
        self.data.init(&self.registry);
        let ids: Vec<String> = self.data.pens.iter().map(|pen| pen.id().to_string()).collect();
        self.update_lines(&ids);
        self.refresh_selection();
        self.cache();
        self.request_render();
    }

    /// Commit edited text of `id`.
    pub fn set_text(&mut self, id: &str, text: &str) {
        self.editing = None;
        let Some(pen) = tree::find_by_id_mut(&mut self.data.pens, id) else {
            return;
        };
        pen.props_mut().text = Some(text.to_string());
        if let Pen::Node(node) = pen {
            node.init(&self.registry);
        }
        self.cache();
        self.emit(SceneEvent::SetText {
            id: id.to_string(),
            text: text.to_string(),
        });
        self.request_render();
    }

    pub fn undo(&mut self) -> bool {
        if !self.data.locked.is_none() {
            return false;
        }
        let Some(pens) = self.history.undo() else {
            return false;
        };
        self.restore_pens(pens);
        self.emit(SceneEvent::Undo);
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.data.locked.is_none() {
            return false;
        }
        let Some(pens) = self.history.redo() else {
            return false;
        };
        self.restore_pens(pens);
        self.emit(SceneEvent::Redo);
        true
    }

    fn restore_pens(&mut self, pens: Vec<Pen>) {
        self.data.pens = pens;
        self.selection.clear();
        self.hover.clear();
        self.request_render();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::geometry::Rect;
    use crate::scene::tests::{add_rect, scene_with_log};

    fn bound_line(scene: &mut Scene, id: &str, from: &str, to: &str) {
        let anchor = |scene: &Scene, node: &str, i: usize| {
            let node = scene.find_pen(node).and_then(Pen::as_node).unwrap();
            let mut p = node.rotated_anchors[i].clone();
            p.bind(&node.props.id, i, node.rotated_anchors[i].direction);
            p
        };
        let mut line = Line::new("line", anchor(scene, from, 2), anchor(scene, to, 0));
        line.props.id = id.to_string();
        scene.add_line(line, false);
    }

    #[test]
    fn test_add_node_requires_registered_shape() {
        let mut scene = Scene::default();
        assert!(scene.add_node(Node::new("nope", Rect::new(0.0, 0.0, 10.0, 10.0)), true).is_none());
        assert!(scene.pens().is_empty());
    }

    #[test]
    fn test_add_node_focus_selects_and_caches() {
        let (mut scene, log) = scene_with_log();
        let id = scene.add_node(Node::new("rectangle", Rect::new(0.0, 0.0, 10.0, 10.0)), true).unwrap();
        assert_eq!(scene.selection().ids, vec![id.clone()]);
        assert!(scene.can_undo());
        assert!(log.borrow().contains(&"addNode".to_string()));
        let pen = scene.find_pen(&id).unwrap();
        assert_eq!(pen.props().stroke_style, scene.options().color);
    }

    #[test]
    fn test_add_line_refused_when_locked() {
        let mut scene = Scene::default();
        scene.lock(Lock::Readonly);
        let line = Line::new("line", Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!(scene.add_line(line, true).is_none());
    }

    #[test]
    fn test_undo_redo_inverse() {
        let mut scene = Scene::default();
        scene.add_node(Node::new("rectangle", Rect::new(0.0, 0.0, 10.0, 10.0)), true);
        scene.add_node(Node::new("rectangle", Rect::new(20.0, 0.0, 10.0, 10.0)), true);
        scene.add_node(Node::new("rectangle", Rect::new(40.0, 0.0, 10.0, 10.0)), true);
        let full: Vec<String> = scene.pens().iter().map(|p| p.id().to_string()).collect();

        assert!(scene.undo());
        assert!(scene.undo());
        assert!(scene.undo());
        assert!(scene.pens().is_empty());
        assert!(!scene.undo());

        assert!(scene.redo());
        assert!(scene.redo());
        assert!(scene.redo());
        let restored: Vec<String> = scene.pens().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(restored, full);

        scene.undo();
        scene.add_node(Node::new("rectangle", Rect::new(60.0, 0.0, 10.0, 10.0)), true);
        assert!(!scene.can_redo());
    }

    #[test]
    fn test_undo_refused_when_locked() {
        let mut scene = Scene::default();
        scene.add_node(Node::new("rectangle", Rect::new(0.0, 0.0, 10.0, 10.0)), true);
        scene.lock(Lock::Readonly);
        assert!(!scene.undo());
        assert_eq!(scene.pens().len(), 1);
    }

    #[test]
    fn test_delete_with_dangling_lines_removed() {
        let mut scene = Scene::default();
        scene.options.disable_empty_line = true;
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "b", Rect::new(300.0, 0.0, 100.0, 100.0));
        bound_line(&mut scene, "l", "a", "b");
        scene.select(["a"]);
        scene.delete();
        assert!(scene.find_pen("a").is_none());
        assert!(scene.find_pen("l").is_none());
        assert!(scene.find_pen("b").is_some());
    }

    #[test]
    fn test_delete_keeps_lines_by_default() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "b", Rect::new(300.0, 0.0, 100.0, 100.0));
        bound_line(&mut scene, "l", "a", "b");
        scene.delete_by("a");
        assert!(scene.find_pen("l").is_some());
    }

    #[test]
    fn test_paste_remaps_line_ends() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "b", Rect::new(300.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "c", Rect::new(0.0, 300.0, 100.0, 100.0));
        bound_line(&mut scene, "ab", "a", "b");
        bound_line(&mut scene, "ac", "a", "c");
        scene.select(["a", "b", "ab", "ac"]);
        scene.copy();
        scene.paste();

        assert_eq!(scene.pens().len(), 9);
        let ids = scene.selection().ids.clone();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| !["a", "b", "ab", "ac"].contains(&id.as_str())));

        let new_a = scene.find_pen(&ids[0]).unwrap();
        assert_eq!(new_a.props().rect, Rect::new(20.0, 20.0, 100.0, 100.0));
        let ab = scene.find_pen(&ids[2]).and_then(Pen::as_line).unwrap();
        assert_eq!(ab.from.id.as_deref(), Some(ids[0].as_str()));
        assert_eq!(ab.to.id.as_deref(), Some(ids[1].as_str()));
        let ac = scene.find_pen(&ids[3]).and_then(Pen::as_line).unwrap();
        assert_eq!(ac.from.id.as_deref(), Some(ids[0].as_str()));
        assert!(!ac.to.is_bound());
    }

    #[test]
    fn test_z_order_within_siblings() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        add_rect(&mut scene, "b", Rect::new(0.0, 0.0, 10.0, 10.0));
        add_rect(&mut scene, "c", Rect::new(0.0, 0.0, 10.0, 10.0));
        let order = |scene: &Scene| scene.pens().iter().map(|p| p.id().to_string()).collect::<Vec<_>>();
        scene.top("a");
        assert_eq!(order(&scene), ["b", "c", "a"]);
        scene.bottom("c");
        assert_eq!(order(&scene), ["c", "b", "a"]);
        scene.up("c");
        assert_eq!(order(&scene), ["b", "c", "a"]);
        scene.down("a");
        assert_eq!(order(&scene), ["b", "a", "c"]);
    }

    #[test]
    fn test_combine_uncombine_round_trip() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        add_rect(&mut scene, "b", Rect::new(200.0, 50.0, 100.0, 50.0));
        scene.select(["a", "b"]);
        let parent = scene.combine(false).unwrap();

        assert_eq!(scene.pens().len(), 1);
        let group = scene.find_pen(&parent).and_then(Pen::as_node).unwrap();
        assert_eq!(group.props.name, "combine");
        assert_eq!(group.props.rect, Rect::new(0.0, 0.0, 300.0, 100.0));
        assert_eq!(group.children.len(), 2);
        let rip = group.children[1].props().rect_in_parent.clone().unwrap();
        assert!((rip.x.resolve(300.0) - 200.0).abs() < 1e-6);
        assert!((rip.width.resolve(300.0) - 100.0).abs() < 1e-6);
        assert_eq!(group.children[1].props().parent_id.as_deref(), Some(parent.as_str()));

        scene.uncombine(&parent);
        assert_eq!(scene.pens().len(), 2);
        assert!(scene.find_pen(&parent).is_none());
        let b = scene.find_pen("b").unwrap();
        let r = b.props().rect;
        assert!((r.x - 200.0).abs() < 1e-6 && (r.y - 50.0).abs() < 1e-6);
        assert!((r.width - 100.0).abs() < 1e-6 && (r.height - 50.0).abs() < 1e-6);
        assert!(b.props().parent_id.is_none());
        assert!(b.props().rect_in_parent.is_none());
    }

    #[test]
    fn test_combine_reuses_covering_node() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "frame", Rect::new(0.0, 0.0, 200.0, 200.0));
        add_rect(&mut scene, "inner", Rect::new(50.0, 50.0, 20.0, 20.0));
        scene.select(["frame", "inner"]);
        assert_eq!(scene.combine(true).as_deref(), Some("frame"));
        let inner = scene.find_pen("inner").unwrap();
        assert!(inner.props().stand);
        scene.uncombine("frame");
        assert!(scene.find_pen("frame").is_some());
        assert_eq!(scene.pens().len(), 2);
    }

    #[test]
    fn test_set_and_get_value() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        scene.set_value("a", "rect.x", json!(40.0)).unwrap();
        assert_eq!(scene.find_pen("a").unwrap().props().rect.x, 40.0);
        assert_eq!(scene.get_value("a", "rect.x"), Some(json!(40.0)));
        scene.set_value("a", "data.temperature", json!(21)).unwrap();
        assert_eq!(scene.get_value("a", "data.temperature"), Some(json!(21)));
        assert!(matches!(
            scene.set_value("a", "noSuchField", json!(3)),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(scene.set_value("zzz", "text", json!("x")), Err(Error::PenNotFound(_))));
    }

    #[test]
    fn test_set_line_name_reroutes_selected_lines() {
        let mut scene = Scene::default();
        let mut line = Line::new("line", Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        line.props.id = "l".into();
        scene.add_line(line, false);
        scene.select(["l"]);
        scene.set_line_name("polyline");
        assert_eq!(scene.find_pen("l").unwrap().name(), "polyline");
        assert_eq!(scene.data().line_name, "polyline");
    }

    #[test]
    fn test_drop_nodes_centres_first_item() {
        let mut scene = Scene::default();
        let items = vec![
            json!({"name": "rectangle", "rect": {"x": 0, "y": 0, "width": 40, "height": 20}}),
            json!({"name": "circle", "rect": {"x": 50, "y": 0, "width": 20, "height": 20}}),
        ];
        let ids = scene.drop_nodes(&items, 200.0, 100.0).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(scene.find_pen(&ids[0]).unwrap().props().rect, Rect::new(180.0, 90.0, 40.0, 20.0));
        assert_eq!(scene.find_pen(&ids[1]).unwrap().props().rect, Rect::new(230.0, 90.0, 20.0, 20.0));
        assert_eq!(scene.selection().len(), 2);
    }

    #[test]
    fn test_set_text_emits() {
        let (mut scene, log) = scene_with_log();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 100.0, 100.0));
        scene.set_text("a", "hello");
        assert_eq!(scene.find_pen("a").unwrap().props().text.as_deref(), Some("hello"));
        assert!(log.borrow().contains(&"setText".to_string()));
    }
}
