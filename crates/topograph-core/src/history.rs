//! Snapshot-based undo/redo.

use crate::pen::Pen;

/// A copy of the pen list taken after a committed change.
#[derive(Debug, Clone)]
struct Snapshot {
    pens: Vec<Pen>,
}

/// Linear undo history over full pen-list snapshots.
///
/// `push` is called after every committed mutation, so the entry at
/// `index` always mirrors the live diagram.
#[derive(Debug, Clone)]
pub struct History {
    list: Vec<Snapshot>,
    index: usize,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(30)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            list: Vec::new(),
            index: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict();
    }

    /// Record the current state, dropping any redo states.
    pub fn push(&mut self, pens: &[Pen]) {
        if !self.list.is_empty() {
            self.list.truncate(self.index + 1);
        }
        self.list.push(Snapshot { pens: pens.to_vec() });
        self.evict();
        self.index = self.list.len() - 1;
    }

    fn evict(&mut self) {
        if self.list.len() > self.capacity {
            let excess = self.list.len() - self.capacity;
            self.list.drain(..excess);
            self.index = self.index.saturating_sub(excess);
        }
    }

    /// Forget everything and start from `pens`.
    pub fn reset(&mut self, pens: &[Pen]) {
        self.list.clear();
        self.index = 0;
        self.push(pens);
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.index = 0;
    }

    /// Patch pens in the oldest snapshot by id, so state loaded later
    /// (such as media sizes) survives undoing back to the start.
    pub fn replace_in_base(&mut self, pens: &[Pen]) {
        let Some(base) = self.list.first_mut() else {
            return;
        };
        for slot in base.pens.iter_mut() {
            if let Some(pen) = pens.iter().find(|p| p.id() == slot.id()) {
                *slot = pen.clone();
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.index >= 1 && !self.list.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.list.len()
    }

    /// Step back; returns the pens to restore.
    pub fn undo(&mut self) -> Option<Vec<Pen>> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        Some(self.list[self.index].pens.clone())
    }

    /// Step back and drop the undone state for good.
    pub fn undo_discard(&mut self) -> Option<Vec<Pen>> {
        let pens = self.undo()?;
        self.list.truncate(self.index + 1);
        Some(pens)
    }

    pub fn redo(&mut self) -> Option<Vec<Pen>> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        Some(self.list[self.index].pens.clone())
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::pen::Node;

    fn pens(ids: &[&str]) -> Vec<Pen> {
        ids.iter()
            .map(|id| {
                let mut node = Node::new("rectangle", Rect::new(0.0, 0.0, 10.0, 10.0));
                node.props.id = id.to_string();
                Pen::Node(node)
            })
            .collect()
    }

    fn ids(pens: &[Pen]) -> Vec<String> {
        pens.iter().map(|p| p.id().to_string()).collect()
    }

    #[test]
    fn test_undo_n_times_returns_to_start() {
        let mut history = History::new(30);
        history.reset(&pens(&[]));
        history.push(&pens(&["a"]));
        history.push(&pens(&["a", "b"]));
        history.push(&pens(&["a", "b", "c"]));
        assert_eq!(ids(&history.undo().unwrap()), vec!["a", "b"]);
        assert_eq!(ids(&history.undo().unwrap()), vec!["a"]);
        assert!(history.undo().unwrap().is_empty());
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_redo_after_undo() {
        let mut history = History::new(30);
        history.reset(&pens(&[]));
        history.push(&pens(&["a"]));
        history.undo();
        assert_eq!(ids(&history.redo().unwrap()), vec!["a"]);
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_push_after_undo_drops_redo() {
        let mut history = History::new(30);
        history.reset(&pens(&[]));
        history.push(&pens(&["a"]));
        history.push(&pens(&["a", "b"]));
        history.undo();
        history.push(&pens(&["x"]));
        assert!(!history.can_redo());
        assert_eq!(ids(&history.undo().unwrap()), vec!["a"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = History::new(2);
        history.reset(&pens(&[]));
        history.push(&pens(&["a"]));
        history.push(&pens(&["b"]));
        assert_eq!(history.len(), 2);
        assert_eq!(ids(&history.undo().unwrap()), vec!["a"]);
        assert!(history.undo().is_none());
    }

    #[test]
    fn test_replace_in_base() {
        let mut history = History::new(5);
        history.reset(&pens(&["a"]));
        let mut changed = pens(&["a"]);
        changed[0].props_mut().text = Some("loaded".into());
        history.push(&changed);
        history.replace_in_base(&changed);
        let base = history.undo().unwrap();
        assert_eq!(base[0].props().text.as_deref(), Some("loaded"));
    }

    #[test]
    fn test_undo_discard() {
        let mut history = History::new(5);
        history.reset(&pens(&[]));
        history.push(&pens(&["a"]));
        history.undo_discard();
        assert!(!history.can_redo());
    }
}
