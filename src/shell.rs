//! Interactive terminal session
//!
//! The user edits code and stdin in their own editor; the shell polls those
//! files and saves changes into the session. Key presses are read in raw
//! mode: the run shortcut goes through the `Keymap`, everything else is a
//! `ShellCommand`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use crossterm::ExecutableCommand;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::engine::{ExecutionController, ExecutionStatus, HttpTransport, RunState};
use crate::export::{export_solution, write_solution};
use crate::metrics::{present_metrics, present_output};
use crate::session::store::StoreError;
use crate::session::{Session, SessionPatch, SessionStore};
use crate::shortcut::{KeyCombo, Keymap, ShortcutDispatcher};

const FILE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    pub code_file: Option<PathBuf>,
    pub input_file: Option<PathBuf>,
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    NextLanguage,
    FontUp,
    FontDown,
    Export,
    ResetCode,
    Reload,
    Quit,
}

/// Map a key press to a shell command
pub fn shell_command(event: &KeyEvent) -> Option<ShellCommand> {
    if event.kind != KeyEventKind::Press {
        return None;
    }

    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    match (event.code, ctrl) {
        (KeyCode::Esc, _) => Some(ShellCommand::Quit),
        (KeyCode::Char('q'), true) | (KeyCode::Char('c'), true) => Some(ShellCommand::Quit),
        (KeyCode::Char('l'), true) => Some(ShellCommand::NextLanguage),
        (KeyCode::Up, true) | (KeyCode::Char('='), true) => Some(ShellCommand::FontUp),
        (KeyCode::Down, true) | (KeyCode::Char('-'), true) => Some(ShellCommand::FontDown),
        (KeyCode::Char('s'), true) => Some(ShellCommand::Export),
        (KeyCode::Char('n'), true) => Some(ShellCommand::ResetCode),
        (KeyCode::Char('r'), true) => Some(ShellCommand::Reload),
        _ => None,
    }
}

/// Watches one file and reports its contents when they change
struct WatchedFile {
    path: PathBuf,
    last: Option<String>,
}

impl WatchedFile {
    fn new(path: PathBuf) -> Self {
        Self { path, last: None }
    }

    async fn poll(&mut self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                if self.last.as_deref() == Some(content.as_str()) {
                    return None;
                }
                self.last = Some(content.clone());
                Some(content)
            }
            Err(e) => {
                if self.last.is_some() {
                    warn!("Failed to read {}: {}", self.path.display(), e);
                    self.last = None;
                }
                None
            }
        }
    }

    fn forget(&mut self) {
        self.last = None;
    }
}

/// Raw mode for the lifetime of the guard
struct TerminalGuard {
    enhanced: bool,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;

        // Ctrl+Enter is only distinguishable from Enter with the kitty protocol
        let enhanced = supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            io::stdout().execute(PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
            ))?;
        } else {
            warn!("Terminal does not report modifier+Enter; the run shortcut may not fire");
        }

        Ok(Self { enhanced })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = io::stdout().execute(PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
    }
}

/// Print text in raw mode, where `\n` does not return the cursor
fn emit(text: &str) {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "{}\r\n", text.replace('\n', "\r\n"));
    let _ = stdout.flush();
}

fn describe(session: &Session) -> String {
    format!(
        "[{}] font {} | {} lines of code | {} bytes of input",
        session.language.label(),
        session.font_size,
        session.code.lines().count(),
        session.input.len()
    )
}

fn state_lines(state: &RunState) -> Vec<String> {
    match state {
        RunState::Idle => Vec::new(),
        RunState::Running => vec![present_output(state).dim().to_string()],
        RunState::Settled(result) => {
            let mut lines = vec![present_output(state)];
            if let Some(metrics) = present_metrics(state) {
                let status = match result.status {
                    ExecutionStatus::Accepted => metrics.status.green(),
                    ExecutionStatus::Error => metrics.status.red(),
                    ExecutionStatus::ConnectionError => metrics.status.yellow(),
                };
                lines.push(format!(
                    "{}  time: {}  memory: {}",
                    status, metrics.elapsed, metrics.memory
                ));
            }
            lines
        }
    }
}

/// Run area of the shell.
///
/// `watch` keeps only the latest state, so a fast run can go from `Running`
/// to `Settled` between two reads. The placeholder is still printed first.
#[derive(Debug, Default)]
struct RunView {
    running_shown: bool,
}

impl RunView {
    fn update(&mut self, state: &RunState) -> Vec<String> {
        let mut lines = Vec::new();
        match state {
            RunState::Running if self.running_shown => return lines,
            RunState::Running => self.running_shown = true,
            RunState::Settled(_) => {
                if !self.running_shown {
                    lines.extend(state_lines(&RunState::Running));
                }
                self.running_shown = false;
            }
            RunState::Idle => self.running_shown = false,
        }
        lines.extend(state_lines(state));
        lines
    }
}

/// Save watched file changes into the session.
///
/// On a store failure the files are forgotten so the next poll offers the
/// same contents again.
async fn sync_files(
    store: &mut SessionStore,
    code_file: &mut Option<WatchedFile>,
    input_file: &mut Option<WatchedFile>,
) -> Result<Option<Session>, StoreError> {
    let mut patch = SessionPatch::new();
    if let Some(file) = code_file.as_mut() {
        if let Some(code) = file.poll().await {
            patch = patch.with_code(code);
        }
    }
    if let Some(file) = input_file.as_mut() {
        if let Some(input) = file.poll().await {
            patch = patch.with_input(input);
        }
    }
    if patch.is_empty() {
        return Ok(None);
    }

    match store.save(patch) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            code_file.iter_mut().for_each(WatchedFile::forget);
            input_file.iter_mut().for_each(WatchedFile::forget);
            Err(e)
        }
    }
}

fn print_help(combo: KeyCombo) {
    let primary = if combo.modifiers.contains(KeyModifiers::SUPER) {
        "Cmd"
    } else {
        "Ctrl"
    };
    emit(&format!(
        "{}+Enter run | Ctrl+L language | Ctrl+Up/Down font | Ctrl+S export | Ctrl+N reset code | Ctrl+R reload | Esc quit",
        primary
    ));
}

fn apply_command(
    command: ShellCommand,
    store: &mut SessionStore,
    export_dir: &Path,
) -> Result<()> {
    let session = store.current();
    match command {
        ShellCommand::NextLanguage => {
            let session = store.save(SessionPatch::new().with_language(session.language.next()))?;
            emit(&describe(&session));
        }
        ShellCommand::FontUp | ShellCommand::FontDown => {
            let delta = if command == ShellCommand::FontUp { 1 } else { -1 };
            let session =
                store.save(SessionPatch::new().with_font_size(session.font_size as i64 + delta))?;
            emit(&describe(&session));
        }
        ShellCommand::Export => {
            let file = export_solution(session.language, &session.code);
            let path = write_solution(export_dir, &file)?;
            emit(&format!("Exported {}", path.display()));
        }
        ShellCommand::ResetCode => {
            let session = store.reset_code()?;
            emit(&describe(&session));
        }
        ShellCommand::Reload | ShellCommand::Quit => {}
    }
    Ok(())
}

pub async fn run_shell(
    config: &ClientConfig,
    mut store: SessionStore,
    options: ShellOptions,
) -> Result<()> {
    let transport = HttpTransport::new(&config.api_url)?;
    let controller =
        Arc::new(ExecutionController::new(Arc::new(transport)).with_timeout(config.run_timeout));

    let keymap = Keymap::new();
    let run_combo = KeyCombo::primary_enter();
    let _run_binding =
        ShortcutDispatcher::new(store.subscribe(), controller.clone()).install(&keymap, run_combo);

    let mut code_file = options.code_file.clone().map(WatchedFile::new);
    let mut input_file = options.input_file.clone().map(WatchedFile::new);

    info!("Shell started against {}", config.api_url);

    let _terminal = TerminalGuard::enter()?;
    emit(&describe(&store.current()));
    print_help(run_combo);

    let mut events = EventStream::new();
    let mut states = controller.subscribe();
    let mut run_view = RunView::default();
    let mut ticker = tokio::time::interval(FILE_POLL_INTERVAL);

    loop {
        tokio::select! {
            event = events.next() => {
                let key = match event {
                    Some(Ok(Event::Key(key))) => key,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e).context("Failed to read terminal event"),
                    None => break,
                };

                if keymap.dispatch(&key) {
                    continue;
                }

                match shell_command(&key) {
                    Some(ShellCommand::Quit) => break,
                    Some(ShellCommand::Reload) => {
                        code_file.iter_mut().for_each(WatchedFile::forget);
                        input_file.iter_mut().for_each(WatchedFile::forget);
                        ticker.reset_immediately();
                    }
                    Some(command) => {
                        if let Err(e) = apply_command(command, &mut store, &options.export_dir) {
                            warn!("Shell command {:?} failed: {:#}", command, e);
                            emit(&format!("{:#}", e).red().to_string());
                        }
                    }
                    None => debug!("Unbound key {:?}", key),
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                run_view.update(&state).iter().for_each(|line| emit(line));
            }
            _ = ticker.tick() => {
                match sync_files(&mut store, &mut code_file, &mut input_file).await {
                    Ok(Some(session)) => emit(&describe(&session)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Failed to save edited files: {}", e);
                        emit(&e.to_string().red().to_string());
                    }
                }
            }
        }
    }

    info!("Shell closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionResult;
    use crate::languages::{init_languages, Language};

    fn ctrl(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::CONTROL)
    }

    #[test]
    fn test_shell_commands() {
        assert_eq!(
            shell_command(&ctrl(KeyCode::Char('l'))),
            Some(ShellCommand::NextLanguage)
        );
        assert_eq!(shell_command(&ctrl(KeyCode::Up)), Some(ShellCommand::FontUp));
        assert_eq!(
            shell_command(&ctrl(KeyCode::Char('-'))),
            Some(ShellCommand::FontDown)
        );
        assert_eq!(
            shell_command(&KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)),
            Some(ShellCommand::Quit)
        );
        assert_eq!(
            shell_command(&KeyEvent::new(KeyCode::Char('l'), KeyModifiers::NONE)),
            None
        );
    }

    #[test]
    fn test_run_combo_is_not_a_shell_command() {
        let combo = KeyCombo::primary_enter();
        assert_eq!(shell_command(&KeyEvent::new(combo.code, combo.modifiers)), None);
    }

    #[tokio::test]
    async fn test_watched_file_reports_changes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.py");
        std::fs::write(&path, "print(1)").unwrap();

        let mut file = WatchedFile::new(path.clone());
        assert_eq!(file.poll().await.as_deref(), Some("print(1)"));
        assert_eq!(file.poll().await, None);

        std::fs::write(&path, "print(2)").unwrap();
        assert_eq!(file.poll().await.as_deref(), Some("print(2)"));

        file.forget();
        assert_eq!(file.poll().await.as_deref(), Some("print(2)"));
    }

    #[test]
    fn test_apply_commands() {
        init_languages().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::open(dir.path()).unwrap();

        apply_command(ShellCommand::NextLanguage, &mut store, dir.path()).unwrap();
        assert_eq!(store.current().language, Language::Java);

        apply_command(ShellCommand::FontUp, &mut store, dir.path()).unwrap();
        assert_eq!(store.current().font_size, 15);

        apply_command(ShellCommand::Export, &mut store, dir.path()).unwrap();
        let exported = std::fs::read_to_string(dir.path().join("Solution.java")).unwrap();
        assert_eq!(exported, Language::Java.boilerplate());
    }

    #[test]
    fn test_run_view_shows_placeholder_for_coalesced_run() {
        let mut view = RunView::default();
        let settled = RunState::Settled(ExecutionResult::accepted("42"));

        let lines = view.update(&settled);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Running..."));
        assert_eq!(lines[1], "42");

        assert_eq!(view.update(&RunState::Running).len(), 1);
        assert!(view.update(&RunState::Running).is_empty());
        let lines = view.update(&settled);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "42");
    }

    #[tokio::test]
    async fn test_failed_file_save_is_retried() {
        init_languages().unwrap();
        let state_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let code_path = work_dir.path().join("main.cpp");
        std::fs::write(&code_path, "int main() { return 0; }").unwrap();

        let mut store = SessionStore::open(state_dir.path()).unwrap();
        let mut code_file = Some(WatchedFile::new(code_path));
        let mut input_file = None;

        std::fs::remove_dir_all(state_dir.path()).unwrap();
        assert!(sync_files(&mut store, &mut code_file, &mut input_file)
            .await
            .is_err());
        assert_ne!(store.current().code, "int main() { return 0; }");

        std::fs::create_dir_all(state_dir.path()).unwrap();
        let session = sync_files(&mut store, &mut code_file, &mut input_file)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.code, "int main() { return 0; }");
    }
}
