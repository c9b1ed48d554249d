//! Keyboard shortcuts.

use kurbo::Vec2;

use super::Scene;
use crate::input::{Key, KeyInput};

/// Arrow-key nudge, and the fine step used with Ctrl.
const NUDGE: f64 = 5.0;
const NUDGE_FINE: f64 = 1.0;

impl Scene {
    /// Handle a key press. Returns whether the scene used it, in which case
    /// the host should suppress the default action.
    pub fn key_down(&mut self, input: &KeyInput) -> bool {
        if self.options.disable_keyboard || self.editing.is_some() || !self.data.locked.is_none() {
            return false;
        }
        let ctrl = input.modifiers.ctrl_or_meta();
        let step = if ctrl { NUDGE_FINE } else { NUDGE };

        match (&input.key, ctrl) {
            (Key::Char(' '), _) => {
                self.space_down = true;
                false
            }
            (Key::ArrowLeft, _) => self.nudge(Vec2::new(-step, 0.0)),
            (Key::ArrowUp, _) => self.nudge(Vec2::new(0.0, -step)),
            (Key::ArrowRight, _) => self.nudge(Vec2::new(step, 0.0)),
            (Key::ArrowDown, _) => self.nudge(Vec2::new(0.0, step)),
            (Key::Delete | Key::Backspace, _) => {
                self.delete();
                true
            }
            (Key::Escape, _) => {
                self.clear_selection();
                true
            }
            (Key::Char('a'), true) => {
                self.select_all();
                true
            }
            (Key::Char('x'), true) => {
                self.cut();
                true
            }
            (Key::Char('c'), true) => {
                self.copy();
                true
            }
            (Key::Char('v'), true) => {
                self.paste();
                true
            }
            (Key::Char('y'), true) => {
                self.redo();
                true
            }
            (Key::Char('z'), true) => {
                if input.modifiers.shift {
                    self.redo();
                } else {
                    self.undo();
                }
                true
            }
            _ => false,
        }
    }

    pub fn key_up(&mut self, input: &KeyInput) {
        if input.key == Key::Char(' ') {
            self.space_down = false;
        }
    }

    fn nudge(&mut self, delta: Vec2) -> bool {
        if self.selection.is_empty() || self.selection_locked() {
            return false;
        }
        self.save_node_rects();
        self.move_selection(delta);
        self.cache();
        self.request_render();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::pen::Lock;
    use crate::scene::tests::add_rect;

    fn key(name: &str) -> KeyInput {
        KeyInput::new(Key::from_name(name))
    }

    #[test]
    fn test_arrow_nudges_selection() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(!scene.key_down(&key("ArrowRight")));

        scene.select(["a"]);
        assert!(scene.key_down(&key("ArrowRight")));
        assert!(scene.key_down(&key("ArrowDown").ctrl()));
        assert_eq!(scene.find_pen("a").unwrap().props().rect, Rect::new(5.0, 1.0, 10.0, 10.0));
        assert!(scene.can_undo());
    }

    #[test]
    fn test_meta_arrow_nudges_finely() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        scene.select(["a"]);
        assert!(scene.key_down(&key("ArrowLeft").meta()));
        assert!(scene.key_down(&key("ArrowUp").meta()));
        assert_eq!(scene.find_pen("a").unwrap().props().rect, Rect::new(-1.0, -1.0, 10.0, 10.0));
    }

    #[test]
    fn test_clipboard_and_history_shortcuts() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        scene.cache();
        assert!(scene.key_down(&key("a").ctrl()));
        assert!(scene.key_down(&key("c").ctrl()));
        assert!(scene.key_down(&key("v").ctrl()));
        assert_eq!(scene.pens().len(), 2);

        assert!(scene.key_down(&key("z").ctrl()));
        assert_eq!(scene.pens().len(), 1);
        assert!(scene.key_down(&key("z").ctrl().shift()));
        assert_eq!(scene.pens().len(), 2);

        // Without Ctrl, letters are left to the host.
        assert!(!scene.key_down(&key("v")));
        assert_eq!(scene.pens().len(), 2);
    }

    #[test]
    fn test_delete_key() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        scene.select(["a"]);
        assert!(scene.key_down(&key("Delete")));
        assert!(scene.pens().is_empty());
    }

    #[test]
    fn test_keyboard_disabled() {
        let mut scene = Scene::default();
        add_rect(&mut scene, "a", Rect::new(0.0, 0.0, 10.0, 10.0));
        scene.select(["a"]);
        scene.lock(Lock::Readonly);
        assert!(!scene.key_down(&key("Delete")));
        scene.lock(Lock::None);

        let mut options = scene.options().clone();
        options.disable_keyboard = true;
        scene.set_options(options);
        assert!(!scene.key_down(&key("Delete")));
        assert_eq!(scene.pens().len(), 1);
    }

    #[test]
    fn test_space_toggles_pan_mode() {
        let mut scene = Scene::default();
        scene.key_down(&key(" "));
        assert!(scene.space_down);
        scene.key_up(&key(" "));
        assert!(!scene.space_down);
    }
}
