//! Global keyboard shortcuts
//!
//! `Keymap` holds at most one action per key combination; binding a combo
//! again replaces the previous action instead of stacking a second one.
//! Bindings are removed when their `BindingGuard` is dropped.
//!
//! `ShortcutDispatcher` is the "run" action. It reads the session from a
//! `watch` receiver at the moment the key is pressed, so a binding that
//! lives across many edits never runs stale code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::{ExecutionController, ExecutionResult};
use crate::session::Session;

/// Modifier + key, compared exactly against incoming key events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub modifiers: KeyModifiers,
    pub code: KeyCode,
}

impl KeyCombo {
    pub const fn new(modifiers: KeyModifiers, code: KeyCode) -> Self {
        Self { modifiers, code }
    }

    /// Primary modifier + Enter: Cmd on macOS, Ctrl elsewhere
    pub fn primary_enter() -> Self {
        Self::new(primary_modifier(), KeyCode::Enter)
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        event.kind == KeyEventKind::Press && KeyCombo::from(event) == *self
    }
}

impl From<&KeyEvent> for KeyCombo {
    fn from(event: &KeyEvent) -> Self {
        Self::new(event.modifiers, event.code)
    }
}

pub fn primary_modifier() -> KeyModifiers {
    if cfg!(target_os = "macos") {
        KeyModifiers::SUPER
    } else {
        KeyModifiers::CONTROL
    }
}

type Action = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct KeymapInner {
    next_id: u64,
    bindings: HashMap<KeyCombo, (u64, Action)>,
}

/// Registry of key combinations to actions
#[derive(Clone, Default)]
pub struct Keymap {
    inner: Arc<Mutex<KeymapInner>>,
}

fn lock(inner: &Mutex<KeymapInner>) -> MutexGuard<'_, KeymapInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Keymap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `action` to `combo`, replacing any existing binding for it
    pub fn bind(&self, combo: KeyCombo, action: impl Fn() + Send + Sync + 'static) -> BindingGuard {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        if inner
            .bindings
            .insert(combo, (id, Arc::new(action)))
            .is_some()
        {
            debug!("Replaced existing binding for {:?}", combo);
        }

        BindingGuard {
            keymap: Arc::downgrade(&self.inner),
            combo,
            id,
        }
    }

    /// Invoke the action bound to this key press, if any
    pub fn dispatch(&self, event: &KeyEvent) -> bool {
        if event.kind != KeyEventKind::Press {
            return false;
        }

        let action = lock(&self.inner)
            .bindings
            .get(&KeyCombo::from(event))
            .map(|(_, action)| action.clone());

        // Run outside the lock so actions may rebind
        match action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    #[allow(dead_code)]
    pub fn is_bound(&self, combo: &KeyCombo) -> bool {
        lock(&self.inner).bindings.contains_key(combo)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        lock(&self.inner).bindings.len()
    }
}

/// Removes its binding on drop, unless the combo was rebound since
pub struct BindingGuard {
    keymap: Weak<Mutex<KeymapInner>>,
    combo: KeyCombo,
    id: u64,
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let Some(inner) = self.keymap.upgrade() else {
            return;
        };
        let mut inner = lock(&inner);
        if matches!(inner.bindings.get(&self.combo), Some((id, _)) if *id == self.id) {
            inner.bindings.remove(&self.combo);
            debug!("Removed binding for {:?}", self.combo);
        }
    }
}

/// Runs the latest session when its shortcut is pressed
pub struct ShortcutDispatcher {
    session: watch::Receiver<Session>,
    controller: Arc<ExecutionController>,
}

impl ShortcutDispatcher {
    pub fn new(session: watch::Receiver<Session>, controller: Arc<ExecutionController>) -> Self {
        Self {
            session,
            controller,
        }
    }

    /// Snapshot the current session and start a run in the background
    pub fn trigger(&self) -> JoinHandle<Option<ExecutionResult>> {
        let session = self.session.borrow().clone();
        let controller = self.controller.clone();
        debug!("Run shortcut triggered for language={}", session.language);
        tokio::spawn(async move { controller.run(&session).await })
    }

    /// Bind this dispatcher to `combo` in `keymap`
    pub fn install(self, keymap: &Keymap, combo: KeyCombo) -> BindingGuard {
        keymap.bind(combo, move || {
            let _ = self.trigger();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transport::{RawResponse, RunRequest, Transport, TransportError};
    use crate::engine::RunState;
    use crate::languages::{init_languages, Language};
    use crate::session::{SessionPatch, SessionStore};
    use async_trait::async_trait;
    use crossterm::event::KeyEventState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<RunRequest>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn endpoint(&self) -> &str {
            "http://backend.test/api/run"
        }

        async fn send(&self, request: &RunRequest) -> Result<RawResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(RawResponse::new(200, "ok"))
        }
    }

    fn press(modifiers: KeyModifiers, code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn release(modifiers: KeyModifiers, code: KeyCode) -> KeyEvent {
        KeyEvent::new_with_kind_and_state(code, modifiers, KeyEventKind::Release, KeyEventState::NONE)
    }

    async fn wait_settled(controller: &ExecutionController) {
        let mut states = controller.subscribe();
        while !matches!(*states.borrow_and_update(), RunState::Settled(_)) {
            states.changed().await.unwrap();
        }
    }

    #[test]
    fn test_combo_matching() {
        let combo = KeyCombo::new(KeyModifiers::CONTROL, KeyCode::Enter);
        assert!(combo.matches(&press(KeyModifiers::CONTROL, KeyCode::Enter)));
        assert!(!combo.matches(&press(KeyModifiers::NONE, KeyCode::Enter)));
        assert!(!combo.matches(&press(
            KeyModifiers::CONTROL | KeyModifiers::SHIFT,
            KeyCode::Enter
        )));
        assert!(!combo.matches(&release(KeyModifiers::CONTROL, KeyCode::Enter)));
    }

    #[test]
    fn test_primary_enter_uses_platform_modifier() {
        let combo = KeyCombo::primary_enter();
        assert_eq!(combo.code, KeyCode::Enter);
        assert_eq!(combo.modifiers, primary_modifier());
    }

    #[test]
    fn test_rebinding_replaces_instead_of_stacking() {
        let keymap = Keymap::new();
        let combo = KeyCombo::primary_enter();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let _old = {
            let first = first.clone();
            keymap.bind(combo, move || {
                first.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _new = {
            let second = second.clone();
            keymap.bind(combo, move || {
                second.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(keymap.dispatch(&press(combo.modifiers, combo.code)));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(keymap.len(), 1);
    }

    #[test]
    fn test_dropping_stale_guard_keeps_newer_binding() {
        let keymap = Keymap::new();
        let combo = KeyCombo::primary_enter();

        let old = keymap.bind(combo, || {});
        let _new = keymap.bind(combo, || {});
        drop(old);

        assert!(keymap.is_bound(&combo));
    }

    #[test]
    fn test_guard_removes_binding() {
        let keymap = Keymap::new();
        let combo = KeyCombo::primary_enter();
        let hits = Arc::new(AtomicUsize::new(0));

        let guard = {
            let hits = hits.clone();
            keymap.bind(combo, move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        drop(guard);

        assert!(!keymap.dispatch(&press(combo.modifiers, combo.code)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(keymap.len(), 0);
    }

    #[test]
    fn test_release_events_ignored() {
        let keymap = Keymap::new();
        let combo = KeyCombo::primary_enter();
        let _guard = keymap.bind(combo, || {});

        assert!(!keymap.dispatch(&release(combo.modifiers, combo.code)));
    }

    #[tokio::test]
    async fn test_shortcut_runs_latest_session() {
        init_languages().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::open(dir.path()).unwrap();
        store
            .save(
                SessionPatch::new()
                    .with_language(Language::Cpp)
                    .with_code("int main() {}"),
            )
            .unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let controller = Arc::new(ExecutionController::new(transport.clone()));
        let keymap = Keymap::new();
        let combo = KeyCombo::primary_enter();
        let _guard = ShortcutDispatcher::new(store.subscribe(), controller.clone())
            .install(&keymap, combo);

        store
            .save(
                SessionPatch::new()
                    .with_language(Language::Python)
                    .with_code("print('latest')")
                    .with_input("7"),
            )
            .unwrap();

        assert!(keymap.dispatch(&press(combo.modifiers, combo.code)));
        wait_settled(&controller).await;

        let requests = transport.requests.lock().unwrap();
        assert_eq!(
            *requests,
            vec![RunRequest {
                language: Language::Python,
                code: "print('latest')".to_string(),
                input: "7".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_trigger_returns_run_handle() {
        let (_tx, rx) = watch::channel(Session {
            language: Language::Java,
            code: "class Main {}".to_string(),
            input: String::new(),
            font_size: 14,
        });
        let transport = Arc::new(RecordingTransport::default());
        let controller = Arc::new(ExecutionController::new(transport));

        let result = ShortcutDispatcher::new(rx, controller)
            .trigger()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.output, "ok");
    }
}
