//! Smoke test for the interactive-mode suspension contract described in
//! spec.md §4.4 ("start in interactive mode suspends until the overlay
//! completes"): the driver's `start` call blocks on the controller's
//! completion channel, which only fires once something outside the
//! driver (here, an `OverlayPresenter` bound to the same session) drives
//! the session to a finish. Exercises `interactive-shell-driver`,
//! `interactive-shell-engine`, and `interactive-shell-overlay` together.

use std::time::Duration;

use interactive_shell_engine::driver_api::DriverApi;
use interactive_shell_engine::registry::SessionRegistry;
use interactive_shell_engine::types::{SessionMode, StartRequest};
use interactive_shell_engine::Config;
use interactive_shell_overlay::renderer::{HeadlessRenderer, InputEvent};
use interactive_shell_overlay::{OverlayPresenter, SessionIdentity};

#[tokio::test]
async fn interactive_start_unblocks_when_overlay_detaches_to_background() {
    let registry = SessionRegistry::new();
    let config = Config::default();
    let driver = DriverApi::new(registry.clone(), config.clone());

    let start = tokio::spawn({
        let driver = driver.clone();
        async move {
            driver
                .start(StartRequest {
                    command: "cat".to_string(),
                    cwd: None,
                    name: None,
                    reason: None,
                    mode: SessionMode::Interactive,
                    timeout_ms: None,
                    handoff_preview: None,
                    handoff_snapshot: None,
                    auto_exit_on_quiet: false,
                })
                .await
        }
    });

    let session_id = loop {
        if let Some(id) = registry.list_active_ids().into_iter().next() {
            break id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let handle = registry.get_active(&session_id).unwrap();

    let script = vec![
        InputEvent::Key("\x1b".to_string()),
        InputEvent::Key("\x1b".to_string()),
        InputEvent::Key("b".to_string()),
    ];
    let identity = SessionIdentity { command: "cat".to_string(), name: None, reason: None };
    let presenter = OverlayPresenter::new(handle, registry.clone(), identity, &config, HeadlessRenderer::new(script));
    presenter.run().await;

    let result = tokio::time::timeout(Duration::from_secs(2), start).await.unwrap().unwrap().unwrap();
    assert!(result.backgrounded);
    assert_eq!(registry.list_background().len(), 1);

    registry.remove_background(&registry.list_background()[0].id.clone());
}
