//! Structured error types for the session engine.
//!
//! Mirrors the teacher's split between a machine-readable discriminant and
//! a human-readable message: every fallible engine operation returns an
//! `EngineError` whose `code()` is stable across versions and whose
//! `Display` carries the detail a log line wants.

use serde::Serialize;
use thiserror::Error;

/// Discriminant for engine errors, serialized to the Driver API as
/// `error: "<code>"` so callers can branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorCode {
    SpawnFailed,
    SessionNotFound,
    WriteFailed,
    ResizeFailed,
    KillFailed,
    InvalidArguments,
    OverlayAlreadyOpen,
    IdPoolExhausted,
}

/// A structured engine error with a stable code and a detail message.
///
/// Implements `std::error::Error` via `thiserror` so it composes with `?`
/// throughout the engine. `PtyRuntimeError` from spec.md §7 is not a
/// variant here: per spec, PTY-level runtime errors are not surfaced as
/// `EngineError` — they are folded into a synthetic child-exit record
/// (`exit_code = None`, `signal = None`) and observed via `on_exit`.
#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct EngineError {
    pub code: EngineErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self { code: EngineErrorCode::SpawnFailed, message: msg.into() }
    }

    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        Self {
            code: EngineErrorCode::SessionNotFound,
            message: format!("session not found: {id}"),
        }
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self { code: EngineErrorCode::WriteFailed, message: msg.into() }
    }

    pub fn resize_failed(msg: impl Into<String>) -> Self {
        Self { code: EngineErrorCode::ResizeFailed, message: msg.into() }
    }

    pub fn kill_failed(msg: impl Into<String>) -> Self {
        Self { code: EngineErrorCode::KillFailed, message: msg.into() }
    }

    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self { code: EngineErrorCode::InvalidArguments, message: msg.into() }
    }

    pub fn overlay_already_open() -> Self {
        Self {
            code: EngineErrorCode::OverlayAlreadyOpen,
            message: "an overlay is already rendering".to_string(),
        }
    }

    pub fn id_pool_exhausted() -> Self {
        Self {
            code: EngineErrorCode::IdPoolExhausted,
            message: "exhausted slug attempts generating a session id".to_string(),
        }
    }

    /// The stable string the Driver API puts in `error: "..."`.
    pub fn as_code_str(&self) -> &'static str {
        match self.code {
            EngineErrorCode::SpawnFailed => "spawn_failed",
            EngineErrorCode::SessionNotFound => "session_not_found",
            EngineErrorCode::WriteFailed => "write_failed",
            EngineErrorCode::ResizeFailed => "resize_failed",
            EngineErrorCode::KillFailed => "kill_failed",
            EngineErrorCode::InvalidArguments => "invalid_arguments",
            EngineErrorCode::OverlayAlreadyOpen => "overlay_already_open",
            EngineErrorCode::IdPoolExhausted => "id_pool_exhausted",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
