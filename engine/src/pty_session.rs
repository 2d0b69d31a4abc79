//! `PtySession`: safe, resizable full-duplex byte transport to a child
//! process, plus the two read projections spec.md §4.1 demands — a
//! scrollback-capable emulator viewport and the raw byte stream.
//!
//! Grounded in the teacher's `process_manager.rs` (reader/writer thread
//! split, UTF-8-safe chunk decoding, process-group kill with SIGTERM then
//! SIGKILL escalation) and, for the emulator itself, `vt100::Parser` as
//! used by `other_examples/48211cc1_brs98-claudatui__src-session.rs` —
//! the teacher's own `vte_backend.rs` only tracks a cursor, not a
//! scrollback grid, so it cannot serve `get_viewport_lines`/`get_tail_lines`.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::mpsc;

use crate::error::{EngineError, EngineResult};
use crate::raw_log::RawLog;

/// One event pushed out of a `PtySession`'s background plumbing. Consumed
/// serially by the owning `SessionController` actor — this is the
/// engine's analogue of spec.md's "at most one of each handler is active;
/// each invocation is serialized" `on_data`/`on_exit` contract, expressed
/// as a channel instead of callbacks.
#[derive(Debug, Clone)]
pub enum PtyEvent {
    /// New bytes were appended to the raw log (already appended by the
    /// time this is observed — ordering guarantee in spec.md §5).
    Data,
    /// The child exited (or the PTY hit a fatal I/O error, synthesized as
    /// `exit_code: None, signal: None` per spec.md §7).
    Exited { exit_code: Option<u32>, signal: Option<i32> },
}

enum WriteCmd {
    Write(Vec<u8>),
    Resize(u16, u16),
}

struct Utf8Decoder {
    incomplete: Vec<u8>,
}

impl Utf8Decoder {
    fn new() -> Self {
        Self { incomplete: Vec::with_capacity(4) }
    }

    fn decode(&mut self, input: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.incomplete);
        data.extend_from_slice(input);
        let valid_up_to = match std::str::from_utf8(&data) {
            Ok(_) => data.len(),
            Err(e) => {
                if e.error_len().is_none() {
                    e.valid_up_to()
                } else {
                    e.valid_up_to() + e.error_len().unwrap_or(1)
                }
            }
        };
        if valid_up_to < data.len() {
            self.incomplete = data[valid_up_to..].to_vec();
        }
        String::from_utf8_lossy(&data[..valid_up_to]).into_owned()
    }
}

struct Shared {
    emulator: Mutex<vt100::Parser>,
    raw_log: Mutex<RawLog>,
    cols: Mutex<u16>,
    rows: Mutex<u16>,
    exited: AtomicBool,
    exit_code: Mutex<Option<u32>>,
    exit_signal: Mutex<Option<i32>>,
    scroll_offset: Mutex<usize>,
}

/// Owns one child process attached to a PTY, its headless terminal
/// emulator (screen + scrollback), and the append-only raw byte log.
pub struct PtySession {
    shared: Arc<Shared>,
    write_tx: std::sync::mpsc::Sender<WriteCmd>,
    pid: u32,
    #[cfg(unix)]
    pgid: i32,
    _writer_thread: Option<JoinHandle<()>>,
}

impl PtySession {
    /// Spawn `command` (a single shell-compatible string — the engine
    /// does not parse flags, per spec.md §4.1) in a new PTY of the given
    /// size. Returns the session plus a receiver of `PtyEvent`s.
    pub fn spawn(
        command: &str,
        cwd: Option<PathBuf>,
        cols: u16,
        rows: u16,
        scrollback: usize,
    ) -> EngineResult<(Self, mpsc::UnboundedReceiver<PtyEvent>)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| EngineError::spawn_failed(format!("failed to open pty: {e}")))?;

        #[cfg(unix)]
        let mut cmd = {
            let mut c = CommandBuilder::new("bash");
            c.arg("-c");
            c.arg(command);
            c
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut c = CommandBuilder::new("cmd");
            c.arg("/C");
            c.arg(command);
            c
        };
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        if let Some(dir) = &cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| EngineError::spawn_failed(format!("failed to spawn child: {e}")))?;
        let pid = child
            .process_id()
            .ok_or_else(|| EngineError::spawn_failed("could not obtain child pid"))?;

        #[cfg(unix)]
        let pgid = pair.master.process_group_leader().unwrap_or(pid as i32);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| EngineError::spawn_failed(format!("failed to take pty writer: {e}")))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| EngineError::spawn_failed(format!("failed to clone pty reader: {e}")))?;

        let shared = Arc::new(Shared {
            emulator: Mutex::new(vt100::Parser::new(rows, cols, scrollback)),
            raw_log: Mutex::new(RawLog::new()),
            cols: Mutex::new(cols),
            rows: Mutex::new(rows),
            exited: AtomicBool::new(false),
            exit_code: Mutex::new(None),
            exit_signal: Mutex::new(None),
            scroll_offset: Mutex::new(0),
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel::<PtyEvent>();

        // Writer thread: serializes Write and Resize so a resize can never
        // reorder with respect to surrounding writes (spec.md §4.1).
        let (write_tx, write_rx) = std::sync::mpsc::channel::<WriteCmd>();
        let master_for_writer = Arc::new(Mutex::new(pair.master));
        let shared_for_writer = Arc::clone(&shared);
        let writer_thread = std::thread::Builder::new()
            .name(format!("pty-writer-{pid}"))
            .spawn(move || {
                let mut writer = writer;
                while let Ok(cmd) = write_rx.recv() {
                    match cmd {
                        WriteCmd::Write(bytes) => {
                            if writer.write_all(&bytes).and_then(|_| writer.flush()).is_err() {
                                log::warn!("pty {pid}: write failed, dropping further writes");
                                break;
                            }
                        }
                        WriteCmd::Resize(c, r) => {
                            let master = master_for_writer.lock().unwrap();
                            if master
                                .resize(PtySize { cols: c, rows: r, pixel_width: 0, pixel_height: 0 })
                                .is_ok()
                            {
                                shared_for_writer.emulator.lock().unwrap().set_size(r, c);
                                *shared_for_writer.cols.lock().unwrap() = c;
                                *shared_for_writer.rows.lock().unwrap() = r;
                            }
                        }
                    }
                }
            })
            .map_err(|e| EngineError::spawn_failed(format!("failed to spawn writer thread: {e}")))?;

        // DSR autoreply needs to write back into the child; route it
        // through the same serialized write channel.
        let dsr_write_tx = write_tx.clone();

        // Reader thread: blocking PTY reads feed a tokio channel.
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        std::thread::Builder::new()
            .name(format!("pty-reader-{pid}"))
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if raw_tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
            .map_err(|e| EngineError::spawn_failed(format!("failed to spawn reader thread: {e}")))?;

        // Async pump: append to raw log, feed emulator, answer DSR, signal Data.
        let shared_for_pump = Arc::clone(&shared);
        let event_tx_for_pump = event_tx.clone();
        tokio::spawn(async move {
            let mut decoder = Utf8Decoder::new();
            while let Some(chunk) = raw_rx.recv().await {
                {
                    let mut log = shared_for_pump.raw_log.lock().unwrap();
                    log.append(&chunk);
                }
                {
                    let mut emu = shared_for_pump.emulator.lock().unwrap();
                    emu.process(&chunk);
                }
                let _ = decoder.decode(&chunk); // keep decoder warm; UTF-8 text itself is derived on demand from the raw log
                if let Some(reply) = dsr_reply_for_chunk(&chunk, &shared_for_pump) {
                    let _ = dsr_write_tx.send(WriteCmd::Write(reply));
                }
                let _ = event_tx_for_pump.send(PtyEvent::Data);
            }
        });

        // Exit watcher thread: polls try_wait(), like the teacher's
        // process_manager.rs, then appends a terminal status line and
        // signals Exited exactly once.
        let child_for_watch = Arc::new(Mutex::new(child));
        let shared_for_watch = Arc::clone(&shared);
        let event_tx_for_watch = event_tx;
        std::thread::Builder::new()
            .name(format!("pty-exit-watch-{pid}"))
            .spawn(move || loop {
                let status = {
                    let mut guard = match child_for_watch.lock() {
                        Ok(g) => g,
                        Err(_) => break,
                    };
                    match guard.try_wait() {
                        Ok(v) => v,
                        Err(_) => break,
                    }
                };
                if let Some(status) = status {
                    let exit_code = Some(status.exit_code());
                    let signal: Option<i32> = None;
                    {
                        let mut log = shared_for_watch.raw_log.lock().unwrap();
                        log.append(
                            format!("\n[process exited with code {}]\n", status.exit_code())
                                .as_bytes(),
                        );
                    }
                    *shared_for_watch.exit_code.lock().unwrap() = exit_code;
                    *shared_for_watch.exit_signal.lock().unwrap() = signal;
                    shared_for_watch.exited.store(true, Ordering::SeqCst);
                    let _ = event_tx_for_watch.send(PtyEvent::Exited { exit_code, signal });
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(200));
            })
            .ok();

        Ok((
            Self {
                shared,
                write_tx,
                pid,
                #[cfg(unix)]
                pgid,
                _writer_thread: Some(writer_thread),
            },
            event_rx,
        ))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn exited(&self) -> bool {
        self.shared.exited.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> Option<u32> {
        *self.shared.exit_code.lock().unwrap()
    }

    pub fn exit_signal(&self) -> Option<i32> {
        *self.shared.exit_signal.lock().unwrap()
    }

    pub fn dims(&self) -> (u16, u16) {
        (*self.shared.cols.lock().unwrap(), *self.shared.rows.lock().unwrap())
    }

    /// Queue bytes for the PTY stdin, FIFO with respect to other writes
    /// and resizes (spec.md §4.1).
    pub fn write(&self, bytes: Vec<u8>) -> EngineResult<()> {
        self.write_tx
            .send(WriteCmd::Write(bytes))
            .map_err(|_| EngineError::write_failed("pty writer thread is gone"))
    }

    /// Idempotent resize; no-op if unchanged. Queued in order with writes.
    pub fn resize(&self, cols: u16, rows: u16) -> EngineResult<()> {
        let (cur_cols, cur_rows) = self.dims();
        if cur_cols == cols && cur_rows == rows {
            return Ok(());
        }
        self.write_tx
            .send(WriteCmd::Resize(cols, rows))
            .map_err(|_| EngineError::resize_failed("pty writer thread is gone"))
    }

    pub fn scroll_up(&self, n: usize) {
        let mut off = self.shared.scroll_offset.lock().unwrap();
        *off += n;
        let mut emu = self.shared.emulator.lock().unwrap();
        emu.set_scrollback(*off);
        *off = emu.screen().scrollback();
    }

    pub fn scroll_down(&self, n: usize) {
        let mut off = self.shared.scroll_offset.lock().unwrap();
        *off = off.saturating_sub(n);
        self.shared.emulator.lock().unwrap().set_scrollback(*off);
    }

    pub fn scroll_to_bottom(&self) {
        *self.shared.scroll_offset.lock().unwrap() = 0;
        self.shared.emulator.lock().unwrap().set_scrollback(0);
    }

    pub fn is_scrolled_up(&self) -> bool {
        *self.shared.scroll_offset.lock().unwrap() > 0
    }

    /// Exactly `rows` screen lines, optionally with re-emitted color codes.
    pub fn get_viewport_lines(&self, ansi: bool) -> Vec<String> {
        let emu = self.shared.emulator.lock().unwrap();
        let screen = emu.screen();
        let (_, cols) = screen.size();
        if ansi {
            screen.rows_formatted(0, cols).map(|bytes| String::from_utf8_lossy(&bytes).into_owned()).collect()
        } else {
            screen.rows(0, cols).collect()
        }
    }

    /// Last `lines` rendered lines, character-budget-bounded (spec.md
    /// §4.1). Reads from the raw log's strip-ANSI projection so
    /// alt-screen TUI children still produce a sensible tail
    /// (spec.md §9).
    pub fn get_tail_lines(&self, lines: usize, ansi: bool, max_chars: usize) -> Vec<String> {
        if ansi {
            let emu = self.shared.emulator.lock().unwrap();
            let screen = emu.screen();
            let (rows, cols) = screen.size();
            let all: Vec<String> = screen
                .rows_formatted(0, cols)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .collect();
            let take = lines.min(rows as usize).min(all.len());
            let start = all.len() - take;
            let mut out: Vec<String> = all[start..].to_vec();
            cap_lines_chars(&mut out, max_chars);
            return out;
        }
        let log = self.shared.raw_log.lock().unwrap();
        let stripped = strip_ansi_escapes::strip(log.all());
        let text = String::from_utf8_lossy(&stripped);
        let all: Vec<&str> = text.split('\n').collect();
        let take = lines.min(all.len());
        let start = all.len() - take;
        let mut out: Vec<String> = all[start..].iter().map(|s| s.to_string()).collect();
        cap_lines_chars(&mut out, max_chars);
        out
    }

    /// Raw byte stream read. `since_last` advances the internal stream
    /// cursor; `strip_ansi` strips CSI/OSC/escape sequences.
    pub fn get_raw_stream(&self, since_last: bool, strip_ansi: bool) -> Vec<u8> {
        let mut log = self.shared.raw_log.lock().unwrap();
        if strip_ansi {
            if since_last {
                log.drain_stream_stripped().into_bytes()
            } else {
                strip_ansi_escapes::strip(log.all())
            }
        } else {
            log.read_stream(since_last)
        }
    }

    pub fn read_incremental_lines(&self) -> Vec<String> {
        self.shared.raw_log.lock().unwrap().read_incremental_lines()
    }

    pub fn read_incremental_lines_capped(&self, max_lines: usize) -> (Vec<String>, bool) {
        self.shared.raw_log.lock().unwrap().read_incremental_lines_capped(max_lines)
    }

    pub fn drain_stream_stripped_capped(&self, max_chars: usize) -> (String, bool) {
        self.shared.raw_log.lock().unwrap().drain_stream_stripped_capped(max_chars)
    }

    pub fn raw_log_len(&self) -> usize {
        self.shared.raw_log.lock().unwrap().len()
    }

    /// Bytes from `offset` to the current end, without mutating any
    /// cursor — used for the hands-free update's own "since last
    /// emission" tracking, which is independent of the driver-facing
    /// drain/incremental cursors (spec.md §4.2, §9).
    pub fn raw_bytes_since(&self, offset: usize) -> Vec<u8> {
        let log = self.shared.raw_log.lock().unwrap();
        let all = log.all();
        let start = offset.min(all.len());
        all[start..].to_vec()
    }

    /// All rendered (strip-ANSI) lines, for absolute-offset pagination.
    pub fn all_stripped_lines(&self) -> Vec<String> {
        let log = self.shared.raw_log.lock().unwrap();
        let stripped = strip_ansi_escapes::strip(log.all());
        String::from_utf8_lossy(&stripped).split('\n').map(|s| s.to_string()).collect()
    }

    /// Terminate the whole process tree rooted at the child (spec.md
    /// §4.1): SIGTERM the process group, wait briefly, escalate to
    /// SIGKILL, plus a `sysinfo` sweep for any descendants that escaped
    /// the group. Idempotent (spec.md §5, §8).
    pub async fn kill(&self) -> EngineResult<()> {
        if self.exited() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let pgid = self.pgid;
            unsafe {
                libc::kill(-pgid, libc::SIGTERM);
            }
            let pid = self.pid as i32;
            let exited = tokio::time::timeout(std::time::Duration::from_secs(3), async move {
                loop {
                    if unsafe { libc::kill(pid, 0) } != 0 {
                        return;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            })
            .await;
            if exited.is_err() {
                unsafe {
                    libc::kill(-pgid, libc::SIGKILL);
                }
            }
            crate::process_tree::kill_descendants(self.pid);
        }
        #[cfg(windows)]
        {
            let _ = std::process::Command::new("taskkill")
                .args(["/PID", &self.pid.to_string(), "/T", "/F"])
                .output();
        }
        Ok(())
    }
}

fn cap_lines_chars(lines: &mut Vec<String>, max_chars: usize) {
    let mut total: usize = lines.iter().map(|l| l.chars().count()).sum();
    while total > max_chars && !lines.is_empty() {
        let removed = lines.remove(0);
        total -= removed.chars().count();
    }
}

/// Detects `ESC[6n` / `ESC[?6n` (Device Status Report / cursor position
/// query) in a chunk and, if present, returns the `ESC[<row>;<col>R`
/// reply built from the emulator's current cursor position. The query is
/// never surfaced to consumers (spec.md §4.1) — this only ever feeds the
/// writer channel, never the event channel.
fn dsr_reply_for_chunk(chunk: &[u8], shared: &Shared) -> Option<Vec<u8>> {
    const Q1: &[u8] = b"\x1b[6n";
    const Q2: &[u8] = b"\x1b[?6n";
    if !contains(chunk, Q1) && !contains(chunk, Q2) {
        return None;
    }
    let emu = shared.emulator.lock().unwrap();
    let (row, col) = emu.screen().cursor_position();
    Some(format!("\x1b[{};{}R", row + 1, col + 1).into_bytes())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_write_read_tail_and_exit() {
        let (session, mut events) = PtySession::spawn("echo hello-world", None, 80, 24, 500).unwrap();
        let mut saw_exit = false;
        for _ in 0..100 {
            match tokio::time::timeout(std::time::Duration::from_millis(500), events.recv()).await {
                Ok(Some(PtyEvent::Exited { .. })) => {
                    saw_exit = true;
                    break;
                }
                Ok(Some(PtyEvent::Data)) => continue,
                _ => break,
            }
        }
        assert!(saw_exit, "expected child to exit");
        let tail = session.get_tail_lines(20, false, 4096);
        assert!(tail.iter().any(|l| l.contains("hello-world")), "{tail:?}");
    }

    #[tokio::test]
    async fn resize_changes_viewport_row_count() {
        let (session, _events) = PtySession::spawn("cat", None, 80, 24, 500).unwrap();
        session.resize(100, 10).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(session.dims(), (100, 10));
        let viewport = session.get_viewport_lines(false);
        assert_eq!(viewport.len(), 10);
        let _ = session.kill().await;
    }

    #[tokio::test]
    async fn kill_is_idempotent() {
        let (session, _events) = PtySession::spawn("sleep 5", None, 80, 24, 500).unwrap();
        session.kill().await.unwrap();
        session.kill().await.unwrap();
    }

    #[test]
    fn dsr_query_is_detected() {
        let shared = Shared {
            emulator: Mutex::new(vt100::Parser::new(24, 80, 100)),
            raw_log: Mutex::new(RawLog::new()),
            cols: Mutex::new(80),
            rows: Mutex::new(24),
            exited: AtomicBool::new(false),
            exit_code: Mutex::new(None),
            exit_signal: Mutex::new(None),
            scroll_offset: Mutex::new(0),
        };
        let reply = dsr_reply_for_chunk(b"hello\x1b[6nworld", &shared);
        assert!(reply.is_some());
        assert!(reply.unwrap().ends_with(b"R"));
        assert!(dsr_reply_for_chunk(b"no query here", &shared).is_none());
    }
}
