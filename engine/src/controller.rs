//! `SessionController`: the driver/user protocol layered on top of a
//! [`PtySession`] (spec.md §4.2). Modeled as a single cooperative task
//! (spec.md §5: "single-threaded, event-loop, cooperative") that owns
//! all controller state and communicates only through channels — no
//! shared mutable state, no locks beyond what `PtySession` itself needs
//! for its background threads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::config::{Config, UpdateMode};
use crate::handoff;
use crate::pty_session::{PtyEvent, PtySession};
use crate::types::{
    ControllerState, DetachChoice, HandoffPreview, HandoffWhen, HandsFreeUpdate,
    HandsFreeUpdateKind, InteractiveShellResult, OutputResult, QueryResult, ReadOptions,
    SessionMode, SettingsUpdate,
};

/// Input the registry/driver-api hands to a running controller in one
/// `query` turn: settings are applied, then input is sent, before the
/// status/output read (spec.md §4.4 ordering).
#[derive(Debug, Default, Clone)]
pub struct QueryCmd {
    pub read: ReadOptions,
    pub encoded_input: Option<Vec<u8>>,
    pub settings: Option<SettingsUpdate>,
    pub skip_rate_limit: bool,
}

pub enum QueryOutcome {
    RateLimited { wait_seconds: u32 },
    Ready(QueryResult),
}

pub enum DetachOutcome {
    Cancelled,
    Finalized { result: InteractiveShellResult, pty: Option<Arc<PtySession>> },
}

enum Command {
    Write(Vec<u8>),
    Resize(u16, u16),
    UserInput(Vec<u8>),
    DoubleEscape,
    DetachSelect { choice: DetachChoice, reply: oneshot::Sender<DetachOutcome> },
    Query { req: QueryCmd, reply: oneshot::Sender<QueryOutcome> },
    Kill { reply: oneshot::Sender<InteractiveShellResult> },
    GetState { reply: oneshot::Sender<ControllerState> },
}

/// Construction parameters for a new controller (spec.md §4.2 table,
/// "init" row).
pub struct ControllerOptions {
    pub id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub mode: SessionMode,
    pub cols: u16,
    pub rows: u16,
    pub config: Config,
    pub timeout_ms: Option<u64>,
    pub auto_exit_on_quiet: bool,
    pub handoff_preview_enabled: bool,
    pub handoff_snapshot_enabled: bool,
}

/// Cheaply-cloneable remote control for a running `SessionController`
/// actor. This is the "controller handle" spec.md §4.3 says
/// `register_active` accepts: `write`, `kill`, `get_output`/`query`,
/// `set_update_interval`, `set_quiet_threshold`, `on_complete`.
#[derive(Clone)]
pub struct ControllerHandle {
    pub id: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    completion_tx: broadcast::Sender<InteractiveShellResult>,
    started_at: Instant,
    /// Read-only access to the session's PTY for a bound presenter
    /// (viewport/tail reads, scroll, dims). Writes and keystrokes still
    /// go through the actor (`write`/`user_input`) so takeover detection
    /// and FIFO write ordering stay centralized.
    pty: Arc<PtySession>,
}

impl ControllerHandle {
    pub fn pty(&self) -> &Arc<PtySession> {
        &self.pty
    }

    pub fn write(&self, bytes: Vec<u8>) -> bool {
        self.cmd_tx.send(Command::Write(bytes)).is_ok()
    }

    pub fn resize(&self, cols: u16, rows: u16) -> bool {
        self.cmd_tx.send(Command::Resize(cols, rows)).is_ok()
    }

    /// Forward a raw keystroke from the overlay. Goes through takeover
    /// detection inside the actor; never mistaken for `write` (spec.md
    /// §4.2: "never treat a programmatic send_input as user input").
    pub fn user_input(&self, bytes: Vec<u8>) -> bool {
        self.cmd_tx.send(Command::UserInput(bytes)).is_ok()
    }

    pub fn double_escape(&self) -> bool {
        self.cmd_tx.send(Command::DoubleEscape).is_ok()
    }

    pub async fn detach_select(&self, choice: DetachChoice) -> Option<DetachOutcome> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::DetachSelect { choice, reply: tx }).ok()?;
        rx.await.ok()
    }

    pub async fn query(&self, req: QueryCmd) -> Option<QueryOutcome> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::Query { req, reply: tx }).ok()?;
        rx.await.ok()
    }

    pub async fn kill(&self) -> Option<InteractiveShellResult> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::Kill { reply: tx }).ok()?;
        rx.await.ok()
    }

    /// Current lifecycle state, for a presenter deciding whether to
    /// render the detach dialog (spec.md §4.2 state table).
    pub async fn state(&self) -> Option<ControllerState> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::GetState { reply: tx }).ok()?;
        rx.await.ok()
    }

    pub fn subscribe_completion(&self) -> broadcast::Receiver<InteractiveShellResult> {
        self.completion_tx.subscribe()
    }

    pub fn runtime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

struct Actor {
    id: String,
    command: String,
    cwd: PathBuf,
    pty: Arc<PtySession>,
    pty_events: mpsc::UnboundedReceiver<PtyEvent>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    updates_tx: mpsc::UnboundedSender<HandsFreeUpdate>,
    completion_tx: broadcast::Sender<InteractiveShellResult>,

    state: ControllerState,
    prior_state: ControllerState,
    user_took_over: bool,
    finished: bool,

    config: Config,
    update_mode: UpdateMode,
    update_interval_ms: u64,
    quiet_threshold_ms: u64,
    auto_exit_on_quiet: bool,
    handoff_preview_enabled: bool,
    handoff_snapshot_enabled: bool,

    started_at: Instant,
    last_data_time: Instant,
    last_query_time: Option<Instant>,
    emitted_offset: usize,
    total_chars_sent: usize,
    budget_exhausted: bool,

    quiet_deadline: Option<Instant>,
    interval_deadline: Option<Instant>,
    timeout_deadline: Option<Instant>,
    exit_countdown_deadline: Option<Instant>,

    double_escape_armed: Option<Instant>,
}

/// Spawn a new controller actor task; returns the handle and the channel
/// of hands-free updates (the façade forwards these to the driver's
/// `notify`/wake primitive).
pub fn spawn(
    opts: ControllerOptions,
) -> Result<(ControllerHandle, mpsc::UnboundedReceiver<HandsFreeUpdate>), crate::error::EngineError> {
    let (pty, pty_events) = PtySession::spawn(
        &opts.command,
        Some(opts.cwd.clone()),
        opts.cols,
        opts.rows,
        opts.config.scrollback_lines,
    )?;
    let pty = Arc::new(pty);

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let (completion_tx, _) = broadcast::channel(4);

    let now = Instant::now();
    let initial_state = match opts.mode {
        SessionMode::Interactive => ControllerState::Running,
        SessionMode::HandsFree => ControllerState::HandsFree,
    };
    let interval_deadline = match opts.mode {
        SessionMode::HandsFree => Some(now + Duration::from_millis(opts.config.hands_free_update_interval_ms)),
        SessionMode::Interactive => None,
    };
    let timeout_deadline = opts.timeout_ms.map(|ms| now + Duration::from_millis(ms));

    let actor = Actor {
        id: opts.id.clone(),
        command: opts.command,
        cwd: opts.cwd,
        pty,
        pty_events,
        cmd_rx,
        updates_tx,
        completion_tx: completion_tx.clone(),
        state: initial_state,
        prior_state: initial_state,
        user_took_over: false,
        finished: false,
        update_mode: opts.config.hands_free_update_mode,
        update_interval_ms: opts.config.hands_free_update_interval_ms,
        quiet_threshold_ms: opts.config.quiet_threshold_ms,
        auto_exit_on_quiet: opts.auto_exit_on_quiet,
        handoff_preview_enabled: opts.handoff_preview_enabled,
        handoff_snapshot_enabled: opts.handoff_snapshot_enabled,
        config: opts.config,
        started_at: now,
        last_data_time: now,
        last_query_time: None,
        emitted_offset: 0,
        total_chars_sent: 0,
        budget_exhausted: false,
        quiet_deadline: None,
        interval_deadline,
        timeout_deadline,
        exit_countdown_deadline: None,
        double_escape_armed: None,
    };

    let handle = ControllerHandle { id: opts.id, cmd_tx, completion_tx, started_at: now, pty: Arc::clone(&actor.pty) };

    tokio::spawn(actor.run());

    Ok((handle, updates_rx))
}

impl Actor {
    async fn run(mut self) {
        loop {
            if self.finished && self.exit_countdown_deadline.is_none() {
                break;
            }
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                evt = self.pty_events.recv() => {
                    if let Some(evt) = evt {
                        self.handle_pty_event(evt).await
                    }
                }
                _ = sleep_until_opt(self.quiet_deadline) => self.handle_quiet_elapsed().await,
                _ = sleep_until_opt(self.interval_deadline) => self.handle_interval_tick().await,
                _ = sleep_until_opt(self.timeout_deadline) => self.handle_timeout().await,
                _ = sleep_until_opt(self.exit_countdown_deadline) => break,
            }
        }
    }

    fn has_unsent_data(&self) -> bool {
        self.pty.raw_log_len() > self.emitted_offset
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Write(bytes) => {
                let _ = self.pty.write(bytes);
            }
            Command::Resize(c, r) => {
                let _ = self.pty.resize(c, r);
            }
            Command::UserInput(bytes) => self.handle_user_input(bytes).await,
            Command::DoubleEscape => self.handle_double_escape().await,
            Command::DetachSelect { choice, reply } => {
                let outcome = self.handle_detach_select(choice).await;
                let _ = reply.send(outcome);
            }
            Command::Query { req, reply } => {
                let outcome = self.handle_query(req).await;
                let _ = reply.send(outcome);
            }
            Command::Kill { reply } => {
                let result = self.finalize(false, true, false, None).await;
                let _ = reply.send(result);
            }
            Command::GetState { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    async fn handle_pty_event(&mut self, evt: PtyEvent) {
        match evt {
            PtyEvent::Data => {
                self.last_data_time = Instant::now();
                if self.state == ControllerState::HandsFree
                    && self.update_mode == UpdateMode::OnQuiet
                {
                    self.quiet_deadline = Some(self.last_data_time + Duration::from_millis(self.quiet_threshold_ms));
                }
            }
            PtyEvent::Exited { exit_code, signal } => {
                if self.finished {
                    return;
                }
                let _ = (exit_code, signal);
                let result = self.finalize(false, false, false, None).await;
                let _ = result;
            }
        }
    }

    /// Scroll keys recognized by the overlay's key grammar (spec.md §4.2:
    /// "a recognized scroll key" never triggers takeover).
    fn is_scroll_key(bytes: &[u8]) -> bool {
        matches!(bytes, b"\x1b[5~" | b"\x1b[6~" | b"\x1bOA" | b"\x1bOB" | b"\x1b[1;5A" | b"\x1b[1;5B")
    }

    async fn handle_user_input(&mut self, bytes: Vec<u8>) {
        if self.state == ControllerState::DetachDialog {
            let choice = match bytes.as_slice() {
                b"k" | b"K" => Some(DetachChoice::Kill),
                b"b" | b"B" => Some(DetachChoice::Background),
                b"m" | b"M" => Some(DetachChoice::Minimize),
                b"\x1b" | b"c" | b"C" => Some(DetachChoice::Cancel),
                _ => None,
            };
            if let Some(choice) = choice {
                let _ = self.handle_detach_select(choice).await;
            }
            return;
        }

        if bytes == b"\x1b" {
            self.handle_double_escape().await;
            return;
        }

        if Self::is_scroll_key(&bytes) {
            if bytes == b"\x1b[5~" || bytes == b"\x1bOA" || bytes == b"\x1b[1;5A" {
                self.pty.scroll_up(1);
            } else {
                self.pty.scroll_down(1);
            }
            return;
        }

        if self.state == ControllerState::HandsFree && !self.user_took_over {
            self.emit_takeover().await;
        }
        let _ = self.pty.write(bytes);
    }

    async fn handle_double_escape(&mut self) {
        if self.state == ControllerState::DetachDialog {
            return;
        }
        let now = Instant::now();
        let threshold = Duration::from_millis(self.config.double_escape_threshold_ms as u64);
        let armed_recently = self.double_escape_armed.map(|t| now.duration_since(t) <= threshold).unwrap_or(false);
        if armed_recently {
            self.double_escape_armed = None;
            if self.state == ControllerState::HandsFree && !self.user_took_over {
                self.emit_takeover().await;
            }
            self.prior_state = self.state;
            self.state = ControllerState::DetachDialog;
        } else {
            self.double_escape_armed = Some(now);
        }
    }

    async fn emit_takeover(&mut self) {
        self.flush_pending_update().await;
        self.user_took_over = true;
        self.state = ControllerState::Running;
        let update = HandsFreeUpdate {
            session_id: self.id.clone(),
            runtime_ms: self.runtime_ms(),
            total_chars_sent: self.total_chars_sent,
            budget_exhausted: self.budget_exhausted,
            kind: HandsFreeUpdateKind::UserTakeover,
        };
        let _ = self.updates_tx.send(update);
    }

    fn runtime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Build and send one `Running` update if there is unsent data (or
    /// unconditionally, for `Interval` mode's caller). Advances
    /// `emitted_offset` and `total_chars_sent`/`budget_exhausted`
    /// (spec.md §4.2, invariants 4-5).
    async fn flush_pending_update(&mut self) {
        if !self.has_unsent_data() {
            return;
        }
        self.emit_running_update().await;
    }

    async fn emit_running_update(&mut self) {
        let new_bytes = self.pty.raw_bytes_since(self.emitted_offset);
        self.emitted_offset = self.pty.raw_log_len();
        let stripped = strip_ansi_escapes::strip(&new_bytes);
        let text = String::from_utf8_lossy(&stripped).into_owned();
        let mut lines: Vec<String> = text.split('\n').map(|s| s.to_string()).collect();

        let remaining_budget = self.config.total_budget_max_chars.saturating_sub(self.total_chars_sent);
        let per_update_cap = self.config.update_max_chars.min(remaining_budget);

        let mut truncated = false;
        let mut total: usize = lines.iter().map(|l| l.chars().count()).sum();
        while total > per_update_cap && lines.len() > 1 {
            let removed = lines.remove(0);
            total -= removed.chars().count();
            truncated = true;
        }
        // One line left and it alone still exceeds the cap: keep as many of
        // its leading characters as fit, the way `cap_chars` truncates,
        // instead of dropping the line (and the whole update) entirely.
        if total > per_update_cap {
            if let Some(line) = lines.first_mut() {
                let kept: String = line.chars().take(per_update_cap).collect();
                total -= line.chars().count() - kept.chars().count();
                *line = kept;
                truncated = true;
            }
        }
        if remaining_budget == 0 {
            lines.clear();
            truncated = true;
        }

        self.total_chars_sent += total;
        if self.total_chars_sent >= self.config.total_budget_max_chars {
            self.budget_exhausted = true;
        }

        let update = HandsFreeUpdate {
            session_id: self.id.clone(),
            runtime_ms: self.runtime_ms(),
            total_chars_sent: self.total_chars_sent,
            budget_exhausted: self.budget_exhausted,
            kind: HandsFreeUpdateKind::Running { tail: lines, truncated },
        };
        let _ = self.updates_tx.send(update);
    }

    async fn handle_quiet_elapsed(&mut self) {
        self.quiet_deadline = None;
        if self.state != ControllerState::HandsFree {
            return;
        }
        if self.auto_exit_on_quiet {
            let _ = self.finalize(false, true, false, None).await;
            return;
        }
        if self.has_unsent_data() {
            self.emit_running_update().await;
        }
    }

    async fn handle_interval_tick(&mut self) {
        self.interval_deadline = Some(Instant::now() + Duration::from_millis(self.update_interval_ms));
        if self.state != ControllerState::HandsFree {
            return;
        }
        match self.update_mode {
            UpdateMode::Interval => self.emit_running_update().await,
            UpdateMode::OnQuiet => {
                if self.has_unsent_data() {
                    self.emit_running_update().await;
                }
            }
        }
    }

    async fn handle_timeout(&mut self) {
        if self.finished {
            return;
        }
        let _ = self.finalize(true, false, false, None).await;
    }

    async fn handle_detach_select(&mut self, choice: DetachChoice) -> DetachOutcome {
        if self.state != ControllerState::DetachDialog {
            return DetachOutcome::Cancelled;
        }
        match choice {
            DetachChoice::Cancel => {
                self.state = self.prior_state;
                DetachOutcome::Cancelled
            }
            DetachChoice::Kill => {
                let result = self.finalize(false, true, false, None).await;
                DetachOutcome::Finalized { result, pty: None }
            }
            DetachChoice::Background => {
                let result = self.finalize(false, false, true, None).await;
                DetachOutcome::Finalized { result, pty: Some(Arc::clone(&self.pty)) }
            }
            DetachChoice::Minimize => {
                let result = self.finalize(false, false, true, None).await;
                DetachOutcome::Finalized { result, pty: Some(Arc::clone(&self.pty)) }
            }
        }
    }

    async fn handle_query(&mut self, req: QueryCmd) -> QueryOutcome {
        if let Some(settings) = &req.settings {
            if let Some(ms) = settings.update_interval_ms {
                self.update_interval_ms = ms;
            }
            if let Some(ms) = settings.quiet_threshold_ms {
                self.quiet_threshold_ms = ms;
            }
        }
        let had_input = req.encoded_input.is_some();
        if let Some(bytes) = req.encoded_input {
            let _ = self.pty.write(bytes);
        }

        let settings_only = req.settings.is_some() && !had_input && !req.read.incremental
            && !req.read.drain
            && req.read.offset.is_none()
            && req.read.lines.is_none();
        if settings_only {
            return QueryOutcome::Ready(QueryResult {
                session_id: self.id.clone(),
                state: self.state,
                runtime_ms: self.runtime_ms(),
                output: None,
            });
        }

        let bypass = self.state == ControllerState::Exited || req.skip_rate_limit;
        if !bypass {
            let now = Instant::now();
            let interval = Duration::from_secs(self.config.min_query_interval_secs);
            if let Some(last) = self.last_query_time {
                let elapsed = now.duration_since(last);
                if elapsed < interval {
                    let wait = (interval - elapsed).as_secs_f64().ceil() as u32;
                    return QueryOutcome::RateLimited { wait_seconds: wait.max(1) };
                }
            }
            self.last_query_time = Some(now);
        }

        let output = self.perform_read(&req.read);
        QueryOutcome::Ready(QueryResult {
            session_id: self.id.clone(),
            state: self.state,
            runtime_ms: self.runtime_ms(),
            output: Some(output),
        })
    }

    fn perform_read(&self, opts: &ReadOptions) -> OutputResult {
        let lines_cap = opts.lines.unwrap_or(20).clamp(1, 200) as usize;
        let max_chars_cap = opts.max_chars.unwrap_or(5 * 1024).clamp(1, 50 * 1024) as usize;
        let total_bytes = self.pty.raw_log_len() as u64;

        if opts.drain {
            let (text, more) = self.pty.drain_stream_stripped_capped(max_chars_cap);
            return OutputResult {
                truncated: more,
                output: text,
                total_bytes,
                total_lines: None,
                has_more: Some(more),
                rate_limited: false,
                wait_seconds: None,
            };
        }

        if opts.incremental {
            let (lines, more) = self.pty.read_incremental_lines_capped(lines_cap);
            let output = cap_chars(&lines, max_chars_cap);
            return OutputResult {
                total_lines: Some(lines.len() as u64),
                has_more: Some(more),
                truncated: more,
                output,
                total_bytes,
                rate_limited: false,
                wait_seconds: None,
            };
        }

        if let Some(offset) = opts.offset {
            let all = self.pty.all_stripped_lines();
            let start = (offset as usize).min(all.len());
            let end = (start + lines_cap).min(all.len());
            let slice = &all[start..end];
            let output = cap_chars(slice, max_chars_cap);
            return OutputResult {
                total_lines: Some(all.len() as u64),
                has_more: Some(end < all.len()),
                truncated: end < all.len(),
                output,
                total_bytes,
                rate_limited: false,
                wait_seconds: None,
            };
        }

        let tail = self.pty.get_tail_lines(lines_cap, false, max_chars_cap);
        let output = tail.join("\n");
        OutputResult {
            total_lines: Some(tail.len() as u64),
            has_more: Some(false),
            truncated: false,
            output,
            total_bytes,
            rate_limited: false,
            wait_seconds: None,
        }
    }

    /// Transition to `Exited` exactly once (spec.md invariant 1). Stops
    /// all timers, flushes any pending update, emits the final
    /// notification, computes handoff artifacts, and broadcasts
    /// completion. `backgrounded` skips `kill()` and leaves the PTY
    /// alive for the registry to adopt.
    async fn finalize(
        &mut self,
        timed_out: bool,
        kill_child: bool,
        backgrounded: bool,
        background_id: Option<String>,
    ) -> InteractiveShellResult {
        if self.finished {
            return self.build_result(timed_out, kill_child, backgrounded, background_id);
        }
        self.finished = true;
        self.quiet_deadline = None;
        self.interval_deadline = None;
        self.timeout_deadline = None;
        self.state = ControllerState::Exited;

        self.flush_pending_update().await;

        if kill_child {
            let _ = self.pty.kill().await;
        }

        let exit_kind = HandsFreeUpdateKind::Exited {
            exit_code: self.pty.exit_code(),
            signal: self.pty.exit_signal(),
            timed_out,
        };
        let update = HandsFreeUpdate {
            session_id: self.id.clone(),
            runtime_ms: self.runtime_ms(),
            total_chars_sent: self.total_chars_sent,
            budget_exhausted: self.budget_exhausted,
            kind: exit_kind,
        };
        let _ = self.updates_tx.send(update);

        let result = self.build_result(timed_out, kill_child, backgrounded, background_id);
        let _ = self.completion_tx.send(result.clone());

        if !backgrounded {
            self.exit_countdown_deadline =
                Some(Instant::now() + Duration::from_secs(self.config.exit_auto_close_delay_secs as u64));
        }

        result
    }

    fn build_result(
        &self,
        timed_out: bool,
        kill_child: bool,
        backgrounded: bool,
        background_id: Option<String>,
    ) -> InteractiveShellResult {
        let background_id = background_id.or_else(|| backgrounded.then(|| self.id.clone()));
        let when = if backgrounded {
            HandoffWhen::Detach
        } else if timed_out {
            HandoffWhen::Timeout
        } else if kill_child {
            HandoffWhen::Kill
        } else {
            HandoffWhen::Exit
        };
        let handoff_preview = if self.handoff_preview_enabled {
            let raw = self.pty.raw_bytes_since(0);
            let stripped = strip_ansi_escapes::strip(&raw);
            let text = String::from_utf8_lossy(&stripped);
            Some(handoff::build_preview(
                &text,
                self.config.handoff_preview_lines,
                self.config.handoff_preview_max_chars,
                when,
            ))
        } else {
            None::<HandoffPreview>
        };

        if self.handoff_snapshot_enabled {
            if let Some(home) = dirs::home_dir() {
                let raw = self.pty.raw_bytes_since(0);
                let stripped = strip_ansi_escapes::strip(&raw);
                let text = String::from_utf8_lossy(&stripped).into_owned();
                let _ = handoff::write_snapshot(
                    &home,
                    &self.command,
                    &self.cwd,
                    self.pty.pid(),
                    self.pty.exit_code(),
                    self.pty.exit_signal(),
                    when,
                    self.config.handoff_snapshot_lines,
                    self.config.handoff_snapshot_max_chars,
                    &text,
                );
            }
        }

        InteractiveShellResult {
            session_id: self.id.clone(),
            status: "exited",
            exit_code: self.pty.exit_code(),
            signal: self.pty.exit_signal(),
            timed_out,
            cancelled: false,
            backgrounded,
            background_id,
            handoff_preview,
        }
    }
}

fn cap_chars(lines: &[String], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
            used += 1;
        }
        let remaining = max_chars.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        let take: String = line.chars().take(remaining).collect();
        used += take.chars().count();
        out.push_str(&take);
    }
    out
}
