//! Overlay Presenter (spec.md §2, §4.2): the user-visible surface bound
//! 1:1 to a live controller. Requests a render on a fixed tick, forwards
//! every raw keystroke through the controller so takeover detection and
//! the double-escape dialog stay authoritative there, and wires the
//! `DetachDialog`'s Background/Minimize outcomes into the registry since
//! the controller itself has no registry handle (spec.md §9: the
//! registry, not the controller, owns the background/minimized maps).

use std::time::Duration;

use interactive_shell_engine::config::Config;
use interactive_shell_engine::controller::{ControllerHandle, DetachOutcome};
use interactive_shell_engine::registry::SessionRegistry;
use interactive_shell_engine::types::{ControllerState, DetachChoice, InteractiveShellResult};

use crate::renderer::{DetachDialogFrame, Frame, InputEvent, TuiRenderer};

/// Render-tick cadence. Spec.md leaves the render-trigger policy to the
/// out-of-scope rendering collaborator; absent a real terminal event
/// source this crate just polls the viewport on a fixed interval.
const RENDER_TICK: Duration = Duration::from_millis(33);

/// How the overlay session ended.
pub enum PresenterOutcome {
    /// The controller reached `Exited` (natural exit, kill, or timeout).
    Finished(InteractiveShellResult),
    /// The user detached via the dialog; the session lives on in the
    /// registry's background or minimized map.
    Detached { minimized: bool, id: String },
}

/// Identity fields the presenter needs to register a detached session
/// with the registry (spec.md §3, `SessionIdentity`).
pub struct SessionIdentity {
    pub command: String,
    pub name: Option<String>,
    pub reason: Option<String>,
}

pub struct OverlayPresenter<R: TuiRenderer> {
    controller: ControllerHandle,
    registry: SessionRegistry,
    identity: SessionIdentity,
    ansi_reemit: bool,
    renderer: R,
}

impl<R: TuiRenderer> OverlayPresenter<R> {
    pub fn new(controller: ControllerHandle, registry: SessionRegistry, identity: SessionIdentity, config: &Config, renderer: R) -> Self {
        Self { controller, registry, identity, ansi_reemit: config.ansi_reemit, renderer }
    }

    /// Run until the session finishes or the user detaches. The caller
    /// is responsible for the registry's overlay mutex
    /// (`try_open_overlay`/`close_overlay`) around this call, matching
    /// the Driver API's own handling of interactive `start`.
    pub async fn run(mut self) -> PresenterOutcome {
        let mut completion = self.controller.subscribe_completion();
        loop {
            self.render().await;
            tokio::select! {
                result = completion.recv() => {
                    if let Ok(result) = result {
                        return PresenterOutcome::Finished(result);
                    }
                }
                _ = tokio::time::sleep(RENDER_TICK) => {
                    if let Some(outcome) = self.drain_input().await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn render(&mut self) {
        let state = self.controller.state().await;
        let pty = self.controller.pty();
        let (cols, rows) = pty.dims();
        let lines = pty.get_viewport_lines(self.ansi_reemit);
        let dialog = (state == Some(ControllerState::DetachDialog)).then(DetachDialogFrame::new);
        self.renderer.render(&Frame { lines, cols, rows, scrolled: pty.is_scrolled_up(), dialog });
    }

    /// Drain every input event ready this tick. Returns `Some` only when
    /// the session actually finished or detached; a cancelled dialog
    /// selection keeps draining within the same tick.
    async fn drain_input(&mut self) -> Option<PresenterOutcome> {
        while let Some(event) = self.renderer.try_recv_input() {
            match event {
                InputEvent::Closed => {
                    if let Some(outcome) = self.detach(DetachChoice::Background).await {
                        return Some(outcome);
                    }
                }
                InputEvent::Resize(cols, rows) => {
                    self.controller.resize(cols, rows);
                }
                InputEvent::Key(text) => {
                    if let Some(outcome) = self.handle_key(text).await {
                        return Some(outcome);
                    }
                }
            }
        }
        None
    }

    async fn handle_key(&mut self, text: String) -> Option<PresenterOutcome> {
        if self.controller.state().await == Some(ControllerState::DetachDialog) {
            let choice = match text.as_str() {
                "k" | "K" => Some(DetachChoice::Kill),
                "b" | "B" => Some(DetachChoice::Background),
                "m" | "M" => Some(DetachChoice::Minimize),
                "\x1b" | "c" | "C" => Some(DetachChoice::Cancel),
                _ => None,
            };
            return match choice {
                Some(choice) => self.detach(choice).await,
                None => None,
            };
        }

        self.controller.user_input(text.into_bytes());
        None
    }

    /// Select a detach option and, if the controller finalized the
    /// session as backgrounded or minimized, adopt its PTY into the
    /// registry (spec.md §4.2 table rows for `DetachDialog`). `None`
    /// means the dialog was cancelled and the overlay keeps running.
    async fn detach(&mut self, choice: DetachChoice) -> Option<PresenterOutcome> {
        match self.controller.detach_select(choice).await? {
            DetachOutcome::Cancelled => None,
            DetachOutcome::Finalized { result, pty: None } => Some(PresenterOutcome::Finished(result)),
            DetachOutcome::Finalized { result, pty: Some(pty) } => {
                let id = result.background_id.clone().unwrap_or_else(|| self.controller.id.clone());
                if choice == DetachChoice::Minimize {
                    self.registry.minimize(id.clone(), self.identity.command.clone(), pty, self.identity.name.clone(), self.identity.reason.clone());
                    Some(PresenterOutcome::Detached { minimized: true, id })
                } else {
                    self.registry.add_background_with_id(id.clone(), self.identity.command.clone(), pty, self.identity.name.clone(), self.identity.reason.clone());
                    Some(PresenterOutcome::Detached { minimized: false, id })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interactive_shell_engine::controller::{self, ControllerOptions};
    use interactive_shell_engine::types::SessionMode;
    use crate::renderer::{HeadlessRenderer, InputEvent};

    fn spawn_controller(command: &str, mode: SessionMode) -> (ControllerHandle, Config) {
        let config = Config::default();
        let opts = ControllerOptions {
            id: "test-session".to_string(),
            command: command.to_string(),
            cwd: std::env::temp_dir(),
            mode,
            cols: 80,
            rows: 24,
            config: config.clone(),
            timeout_ms: None,
            auto_exit_on_quiet: false,
            handoff_preview_enabled: false,
            handoff_snapshot_enabled: false,
        };
        let (handle, _updates) = controller::spawn(opts).unwrap();
        (handle, config)
    }

    #[tokio::test]
    async fn natural_exit_reports_finished() {
        let (handle, config) = spawn_controller("echo hi", SessionMode::Interactive);
        let registry = SessionRegistry::new();
        let identity = SessionIdentity { command: "echo hi".to_string(), name: None, reason: None };
        let renderer = HeadlessRenderer::new(Vec::new());
        let presenter = OverlayPresenter::new(handle, registry, identity, &config, renderer);

        match presenter.run().await {
            PresenterOutcome::Finished(result) => assert_eq!(result.status, "exited"),
            PresenterOutcome::Detached { .. } => panic!("expected Finished"),
        }
    }

    #[tokio::test]
    async fn double_escape_background_registers_session() {
        let (handle, config) = spawn_controller("cat", SessionMode::Interactive);
        let registry = SessionRegistry::new();
        let identity = SessionIdentity { command: "cat".to_string(), name: Some("bg".to_string()), reason: None };
        let script = vec![
            InputEvent::Key("\x1b".to_string()),
            InputEvent::Key("\x1b".to_string()),
            InputEvent::Key("b".to_string()),
        ];
        let renderer = HeadlessRenderer::new(script);
        let presenter = OverlayPresenter::new(handle, registry.clone(), identity, &config, renderer);

        match presenter.run().await {
            PresenterOutcome::Detached { minimized, id } => {
                assert!(!minimized);
                assert_eq!(registry.list_background().len(), 1);
                assert_eq!(registry.list_background()[0].id, id);
            }
            PresenterOutcome::Finished(_) => panic!("expected Detached"),
        }

        registry.remove_background(&registry.list_background()[0].id.clone());
    }
}
