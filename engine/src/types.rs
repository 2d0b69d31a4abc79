//! Shared data types exchanged between `SessionController`, the
//! `SessionRegistry` and the Driver API (spec.md §3, §4.4).

use serde::{Deserialize, Serialize};

/// Controller lifecycle state (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Running,
    HandsFree,
    DetachDialog,
    Exited,
}

/// Supervision mode requested at `start` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Interactive,
    HandsFree,
}

/// The user's choice in the double-escape detach dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachChoice {
    Kill,
    Background,
    Minimize,
    Cancel,
}

/// When a handoff artifact was produced (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffWhen {
    Exit,
    Detach,
    Kill,
    Timeout,
}

impl HandoffWhen {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffWhen::Exit => "exit",
            HandoffWhen::Detach => "detach",
            HandoffWhen::Kill => "kill",
            HandoffWhen::Timeout => "timeout",
        }
    }
}

/// In-memory handoff preview: last N strip-ANSI lines of the raw log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffPreview {
    pub lines: Vec<String>,
    pub truncated: bool,
    pub when: HandoffWhen,
}

/// One hands-free driver notification (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandsFreeUpdate {
    pub session_id: String,
    pub runtime_ms: u64,
    pub total_chars_sent: usize,
    pub budget_exhausted: bool,
    #[serde(flatten)]
    pub kind: HandsFreeUpdateKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandsFreeUpdateKind {
    Running { tail: Vec<String>, truncated: bool },
    UserTakeover,
    Exited { exit_code: Option<u32>, signal: Option<i32>, timed_out: bool },
}

/// A single bounded read of either the viewport/tail or the raw stream
/// (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResult {
    pub output: String,
    pub truncated: bool,
    pub total_bytes: u64,
    pub total_lines: Option<u64>,
    pub has_more: Option<bool>,
    pub rate_limited: bool,
    pub wait_seconds: Option<u32>,
}

/// Read-shape selector for a `query`; at most one of `offset`,
/// `incremental`, `drain` is meaningful (spec.md §4.2).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadOptions {
    pub lines: Option<u32>,
    pub max_chars: Option<u32>,
    pub offset: Option<u64>,
    pub incremental: bool,
    pub drain: bool,
}

/// Structured driver input (spec.md §4.5).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputRequest {
    pub text: Option<String>,
    pub keys: Vec<String>,
    pub hex: Vec<String>,
    pub paste: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub update_interval_ms: Option<u64>,
    pub quiet_threshold_ms: Option<u64>,
}

/// The full `query` request shape from spec.md §4.4.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub read: ReadOptions,
    pub input: Option<String>,
    pub input_keys: Vec<String>,
    pub input_hex: Vec<String>,
    pub input_paste: Option<String>,
    pub settings: Option<SettingsUpdate>,
    pub kill: bool,
}

/// `start` request shape (spec.md §4.4).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub command: String,
    pub cwd: Option<std::path::PathBuf>,
    pub name: Option<String>,
    pub reason: Option<String>,
    #[serde(default = "default_mode")]
    pub mode: SessionMode,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub handoff_preview: Option<bool>,
    #[serde(default)]
    pub handoff_snapshot: Option<bool>,
    #[serde(default)]
    pub auto_exit_on_quiet: bool,
}

fn default_mode() -> SessionMode {
    SessionMode::Interactive
}

/// Final result of a session, returned from `start` (interactive mode),
/// from `kill`, or surfaced via `on_complete`/`get_result`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveShellResult {
    pub session_id: String,
    pub status: &'static str,
    pub exit_code: Option<u32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub backgrounded: bool,
    pub background_id: Option<String>,
    pub handoff_preview: Option<HandoffPreview>,
}

/// Response to a `query` call: current status plus bounded output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub session_id: String,
    pub state: ControllerState,
    pub runtime_ms: u64,
    #[serde(flatten)]
    pub output: Option<OutputResult>,
}
