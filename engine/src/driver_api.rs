//! Driver API: the stateless façade consumed by the automated driver
//! (spec.md §4.4) — `start`, `query`, `kill`. Each call is a single
//! request/response resolved against the `SessionRegistry`.

use std::time::Duration;

use crate::config::Config;
use crate::controller::{ControllerHandle, QueryCmd, QueryOutcome};
use crate::error::{EngineError, EngineResult};
use crate::key_encoding::{self, InputRequest as KeyInputRequest};
use crate::registry::SessionRegistry;
use crate::types::{InteractiveShellResult, QueryRequest, QueryResult, SessionMode, StartRequest};

#[derive(Clone)]
pub struct DriverApi {
    registry: SessionRegistry,
    config: Config,
}

impl DriverApi {
    pub fn new(registry: SessionRegistry, config: Config) -> Self {
        Self { registry, config }
    }

    /// `start`: launches a session. In hands-free mode, returns as soon
    /// as the session is registered. In interactive mode, blocks until
    /// the session finishes (spec.md §4.4).
    pub async fn start(&self, req: StartRequest) -> EngineResult<InteractiveShellResult> {
        if req.command.trim().is_empty() {
            return Err(EngineError::invalid_arguments("start requires a non-empty command"));
        }
        if req.mode == SessionMode::Interactive && self.registry.overlay_open() {
            return Err(EngineError::overlay_already_open());
        }

        let cwd = req.cwd.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
        let handoff_preview_enabled = req.handoff_preview.unwrap_or(self.config.handoff_preview_enabled);
        let handoff_snapshot_enabled = req.handoff_snapshot.unwrap_or(self.config.handoff_snapshot_enabled);

        if req.mode == SessionMode::Interactive && !self.registry.try_open_overlay() {
            return Err(EngineError::overlay_already_open());
        }

        let started = self.registry.start_active(
            req.command,
            cwd,
            req.mode,
            80,
            24,
            self.config.clone(),
            req.timeout_ms,
            req.auto_exit_on_quiet,
            handoff_preview_enabled,
            handoff_snapshot_enabled,
        );

        let started = match started {
            Ok(s) => s,
            Err(e) => {
                if req.mode == SessionMode::Interactive {
                    self.registry.close_overlay();
                }
                return Err(e);
            }
        };

        if req.mode == SessionMode::HandsFree {
            return Ok(InteractiveShellResult {
                session_id: started.id,
                status: "running",
                exit_code: None,
                signal: None,
                timed_out: false,
                cancelled: false,
                backgrounded: false,
                background_id: None,
                handoff_preview: None,
            });
        }

        let mut completion = started.handle.subscribe_completion();
        let result = completion.recv().await;
        self.registry.close_overlay();
        result.map_err(|_| EngineError::spawn_failed("session ended without producing a result"))
    }

    /// `query`: apply settings, send input, then return status/output,
    /// honoring the rate limit by sleeping up to `wait_seconds` and
    /// racing the session's completion (spec.md §4.2, §5).
    pub async fn query(&self, req: QueryRequest) -> EngineResult<QueryResult> {
        let handle = self
            .registry
            .get_active(&req.session_id)
            .ok_or_else(|| EngineError::session_not_found(&req.session_id))?;

        if req.settings.is_none() && req.read.incremental && req.read.drain {
            return Err(EngineError::invalid_arguments("incremental and drain may not be combined"));
        }

        if req.kill {
            let result = handle
                .kill()
                .await
                .ok_or_else(|| EngineError::session_not_found(&req.session_id))?;
            return Ok(QueryResult {
                session_id: result.session_id.clone(),
                state: crate::types::ControllerState::Exited,
                runtime_ms: 0,
                output: None,
            });
        }

        let encoded_input = encode_driver_input(&req)?;

        let mut cmd = QueryCmd {
            read: req.read.clone(),
            encoded_input,
            settings: req.settings.clone(),
            skip_rate_limit: false,
        };

        loop {
            let outcome = handle
                .query(cmd.clone())
                .await
                .ok_or_else(|| EngineError::session_not_found(&req.session_id))?;
            match outcome {
                QueryOutcome::Ready(result) => return Ok(result),
                QueryOutcome::RateLimited { wait_seconds } => {
                    if wait_a_bit_or_complete(&handle, wait_seconds).await {
                        // Completion fired mid-wait: skip the rate limit
                        // entirely on the retry (spec.md §4.2).
                        cmd.skip_rate_limit = true;
                    }
                    // Subsequent attempts should not re-apply settings/input.
                    cmd.settings = None;
                    cmd.encoded_input = None;
                }
            }
        }
    }

    pub async fn kill(&self, session_id: &str) -> EngineResult<InteractiveShellResult> {
        let handle = self.registry.get_active(session_id).ok_or_else(|| EngineError::session_not_found(session_id))?;
        handle.kill().await.ok_or_else(|| EngineError::session_not_found(session_id))
    }
}

/// Sleep up to `wait_seconds`, but return early (`true`) if the session
/// completes first (spec.md §4.2, §5: "the canonical cancellation
/// pattern").
async fn wait_a_bit_or_complete(handle: &ControllerHandle, wait_seconds: u32) -> bool {
    let mut completion = handle.subscribe_completion();
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(wait_seconds as u64)) => false,
        _ = completion.recv() => true,
    }
}

fn encode_driver_input(req: &QueryRequest) -> EngineResult<Option<Vec<u8>>> {
    if req.input.is_none() && req.input_keys.is_empty() && req.input_hex.is_empty() && req.input_paste.is_none() {
        return Ok(None);
    }
    if let Some(raw) = &req.input {
        if req.input_keys.is_empty() && req.input_hex.is_empty() && req.input_paste.is_none() {
            return Ok(Some(key_encoding::encode_raw(raw)));
        }
    }
    let structured = KeyInputRequest {
        text: req.input.clone(),
        keys: req.input_keys.clone(),
        hex: req.input_hex.clone(),
        paste: req.input_paste.clone(),
    };
    Ok(Some(key_encoding::encode_request(&structured)))
}
