//! Review shortcuts and their process-wide registration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crossbeam::channel::{self, Receiver, Sender};

use crate::config::{KeyConfig, ReviewConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    ArrowLeft,
    ArrowRight,
    Other,
}

/// What currently has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    None,
    TextInput,
    TextArea,
    Select,
    Other,
}

impl Focus {
    /// Text entry widgets keep every key for themselves.
    pub fn captures_typing(self) -> bool {
        matches!(self, Focus::TextInput | Focus::TextArea | Focus::Select)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShortcutAction {
    TogglePlay,
    Skip(f64),
    CommentAtPlayhead,
    ChangeRate(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keymap {
    keys: KeyConfig,
    skip_seconds: f64,
    rate_step: f64,
}

impl Keymap {
    pub fn from_config(config: &ReviewConfig) -> Self {
        Self {
            keys: config.keys.clone(),
            skip_seconds: config.skip_seconds,
            rate_step: config.rate_step,
        }
    }

    pub fn resolve(&self, key: Key, focus: Focus) -> Option<ShortcutAction> {
        if focus.captures_typing() {
            return None;
        }

        match key {
            Key::ArrowLeft => Some(ShortcutAction::Skip(-self.skip_seconds)),
            Key::ArrowRight => Some(ShortcutAction::Skip(self.skip_seconds)),
            Key::Char(c) if c == self.keys.toggle_play => Some(ShortcutAction::TogglePlay),
            Key::Char(c) if c.to_lowercase().eq(self.keys.comment.to_lowercase()) => {
                Some(ShortcutAction::CommentAtPlayhead)
            }
            Key::Char(c) if c == self.keys.slower => {
                Some(ShortcutAction::ChangeRate(-self.rate_step))
            }
            Key::Char(c) if c == self.keys.faster => {
                Some(ShortcutAction::ChangeRate(self.rate_step))
            }
            Key::Char(_) | Key::Other => None,
        }
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::from_config(&ReviewConfig::default())
    }
}

/// Process-wide keyboard dispatch. Each mounted review session holds one
/// [`ShortcutRegistration`]; dropping it removes the handler.
#[derive(Debug, Clone, Default)]
pub struct ShortcutHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Debug, Default)]
struct HubState {
    next_id: u64,
    handlers: Vec<Handler>,
}

#[derive(Debug)]
struct Handler {
    id: u64,
    keymap: Keymap,
    actions: Sender<ShortcutAction>,
}

impl ShortcutHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, keymap: Keymap) -> ShortcutRegistration {
        let (sender, receiver) = channel::unbounded();
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.handlers.push(Handler {
            id,
            keymap,
            actions: sender,
        });

        ShortcutRegistration {
            id,
            hub: Arc::downgrade(&self.inner),
            actions: receiver,
        }
    }

    /// Route a key press to every registered handler. Returns how many handled it.
    pub fn dispatch(&self, key: Key, focus: Focus) -> usize {
        let state = self.state();
        state
            .handlers
            .iter()
            .filter_map(|h| h.keymap.resolve(key, focus).map(|action| (h, action)))
            .filter(|(h, action)| h.actions.send(*action).is_ok())
            .count()
    }

    pub fn handler_count(&self) -> usize {
        self.state().handlers.len()
    }
}

#[derive(Debug)]
pub struct ShortcutRegistration {
    id: u64,
    hub: Weak<Mutex<HubState>>,
    actions: Receiver<ShortcutAction>,
}

impl ShortcutRegistration {
    /// Actions dispatched since the last call.
    pub fn drain(&self) -> Vec<ShortcutAction> {
        self.actions.try_iter().collect()
    }
}

impl Drop for ShortcutRegistration {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut state = hub.lock().unwrap_or_else(PoisonError::into_inner);
            state.handlers.retain(|h| h.id != self.id);
            log::debug!("shortcut handler {} deregistered", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let keymap = Keymap::default();
        let resolve = |key| keymap.resolve(key, Focus::None);

        assert_eq!(resolve(Key::Char(' ')), Some(ShortcutAction::TogglePlay));
        assert_eq!(resolve(Key::ArrowLeft), Some(ShortcutAction::Skip(-5.0)));
        assert_eq!(resolve(Key::ArrowRight), Some(ShortcutAction::Skip(5.0)));
        assert_eq!(
            resolve(Key::Char('c')),
            Some(ShortcutAction::CommentAtPlayhead)
        );
        assert_eq!(
            resolve(Key::Char('C')),
            Some(ShortcutAction::CommentAtPlayhead)
        );
        assert_eq!(resolve(Key::Char(';')), Some(ShortcutAction::ChangeRate(-0.1)));
        assert_eq!(resolve(Key::Char('\'')), Some(ShortcutAction::ChangeRate(0.1)));
        assert_eq!(resolve(Key::Char('x')), None);
    }

    #[test]
    fn test_suppressed_while_typing() {
        let keymap = Keymap::default();
        for focus in [Focus::TextInput, Focus::TextArea, Focus::Select] {
            assert_eq!(keymap.resolve(Key::Char(' '), focus), None);
            assert_eq!(keymap.resolve(Key::ArrowLeft, focus), None);
        }
        assert_eq!(
            keymap.resolve(Key::Char(' '), Focus::Other),
            Some(ShortcutAction::TogglePlay)
        );
    }

    #[test]
    fn test_registration_receives_dispatched_actions() {
        let hub = ShortcutHub::new();
        let registration = hub.register(Keymap::default());

        assert_eq!(hub.dispatch(Key::ArrowRight, Focus::None), 1);
        assert_eq!(hub.dispatch(Key::Char('q'), Focus::None), 0);

        assert_eq!(registration.drain(), vec![ShortcutAction::Skip(5.0)]);
    }

    #[test]
    fn test_drop_deregisters() {
        let hub = ShortcutHub::new();
        let first = hub.register(Keymap::default());
        let second = hub.register(Keymap::default());
        assert_eq!(hub.handler_count(), 2);

        drop(first);
        assert_eq!(hub.handler_count(), 1);
        assert_eq!(hub.dispatch(Key::Char(' '), Focus::None), 1);

        drop(second);
        assert_eq!(hub.handler_count(), 0);
    }
}
