//! Session engine: PTY supervision, scrollback terminal emulation,
//! driver/user lifecycle arbitration, and the process-wide session
//! registry behind the `interactive_shell` driver tool.

pub mod config;
pub mod controller;
pub mod driver_api;
pub mod error;
pub mod handoff;
pub mod id_pool;
pub mod key_encoding;
pub mod process_tree;
pub mod pty_session;
pub mod raw_log;
pub mod registry;
pub mod types;

pub use config::Config;
pub use driver_api::DriverApi;
pub use error::{EngineError, EngineErrorCode, EngineResult};
pub use registry::SessionRegistry;
