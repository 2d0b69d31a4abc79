//! `SessionRegistry`: process-wide directory of controllers, background
//! sessions, and minimized sessions (spec.md §4.3). `DashMap` gives us
//! concurrent access to the three maps without a single global lock,
//! mirroring the teacher's `DashMap`-backed session directory; the
//! `IdPool` (the one piece of truly shared mutable state) sits behind
//! its own mutex since only the registry ever touches it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use dashmap::DashMap;
use serde::Serialize;

use crate::config::Config;
use crate::controller::{self, ControllerHandle, ControllerOptions, QueryCmd};
use crate::error::{EngineError, EngineResult};
use crate::id_pool::IdPool;
use crate::pty_session::PtySession;
use crate::types::{HandsFreeUpdate, InteractiveShellResult, SessionMode};

/// Identity shared by background and minimized sessions (spec.md §3).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub id: String,
    pub name: Option<String>,
    pub command: String,
    pub reason: Option<String>,
    #[serde(skip)]
    pub started_at: SystemTime,
}

struct BackgroundEntry {
    identity: SessionIdentity,
    pty: Arc<PtySession>,
    auto_dispose: Arc<AtomicBool>,
}

struct MinimizedEntry {
    identity: SessionIdentity,
    pty: Arc<PtySession>,
    minimized_at: SystemTime,
}

/// A minimized session's identity plus the moment it was hidden
/// (spec.md §3: "a PtySession plus identity (..., minimized_at)").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimizedIdentity {
    #[serde(flatten)]
    pub identity: SessionIdentity,
    #[serde(skip)]
    pub minimized_at: SystemTime,
}

pub struct StartedSession {
    pub id: String,
    pub handle: ControllerHandle,
    pub updates: tokio::sync::mpsc::UnboundedReceiver<HandsFreeUpdate>,
}

/// Process-wide directory and lifecycle arbiter. One instance per host
/// process; cheaply cloneable (everything behind `Arc`/`DashMap`).
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    id_pool: Mutex<IdPool>,
    active: DashMap<String, ControllerHandle>,
    background: DashMap<String, BackgroundEntry>,
    minimized: DashMap<String, MinimizedEntry>,
    overlay_open: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id_pool: Mutex::new(IdPool::new()),
                active: DashMap::new(),
                background: DashMap::new(),
                minimized: DashMap::new(),
                overlay_open: AtomicBool::new(false),
            }),
        }
    }

    pub fn try_open_overlay(&self) -> bool {
        self.inner
            .overlay_open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn close_overlay(&self) {
        self.inner.overlay_open.store(false, Ordering::SeqCst);
    }

    pub fn overlay_open(&self) -> bool {
        self.inner.overlay_open.load(Ordering::SeqCst)
    }

    /// Spawn a new controller, register it active, and arm the
    /// completion watcher that auto-unregisters it when it finishes
    /// (spec.md §4.2: "unregisters from the active map, releasing the
    /// SessionId unless transferred to background/minimized").
    pub fn start_active(
        &self,
        command: String,
        cwd: PathBuf,
        mode: SessionMode,
        cols: u16,
        rows: u16,
        config: Config,
        timeout_ms: Option<u64>,
        auto_exit_on_quiet: bool,
        handoff_preview_enabled: bool,
        handoff_snapshot_enabled: bool,
    ) -> EngineResult<StartedSession> {
        let id = {
            let mut pool = self.inner.id_pool.lock().unwrap();
            pool.generate()
        };

        let opts = ControllerOptions {
            id: id.clone(),
            command,
            cwd,
            mode,
            cols,
            rows,
            config,
            timeout_ms,
            auto_exit_on_quiet,
            handoff_preview_enabled,
            handoff_snapshot_enabled,
        };
        let (handle, updates) = match controller::spawn(opts) {
            Ok(v) => v,
            Err(e) => {
                let mut pool = self.inner.id_pool.lock().unwrap();
                pool.release(&id);
                return Err(e);
            }
        };

        self.inner.active.insert(id.clone(), handle.clone());
        self.spawn_completion_watcher(id.clone(), handle.clone());

        Ok(StartedSession { id, handle, updates })
    }

    fn spawn_completion_watcher(&self, id: String, handle: ControllerHandle) {
        let registry = self.clone();
        let mut rx = handle.subscribe_completion();
        tokio::spawn(async move {
            if let Ok(result) = rx.recv().await {
                registry.finish_active(&id, &result);
            }
        });
    }

    fn finish_active(&self, id: &str, result: &InteractiveShellResult) {
        self.inner.active.remove(id);
        if !result.backgrounded {
            let mut pool = self.inner.id_pool.lock().unwrap();
            pool.release(id);
        }
    }

    pub fn register_active(&self, id: String, handle: ControllerHandle) {
        self.spawn_completion_watcher(id.clone(), handle.clone());
        self.inner.active.insert(id, handle);
    }

    pub fn unregister_active(&self, id: &str, release_id: bool) {
        self.inner.active.remove(id);
        if release_id {
            let mut pool = self.inner.id_pool.lock().unwrap();
            pool.release(id);
        }
    }

    pub fn get_active(&self, id: &str) -> Option<ControllerHandle> {
        self.inner.active.get(id).map(|h| h.clone())
    }

    /// IDs of every currently active session, for callers that need to
    /// discover a session started elsewhere (e.g. an overlay binding to
    /// whatever `start` just registered).
    pub fn list_active_ids(&self) -> Vec<String> {
        self.inner.active.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn write_to_active(&self, id: &str, bytes: Vec<u8>) -> EngineResult<()> {
        self.get_active(id)
            .ok_or_else(|| EngineError::session_not_found(id))?
            .write(bytes);
        Ok(())
    }

    pub async fn set_active_update_interval(&self, id: &str, ms: u64) -> EngineResult<()> {
        let handle = self.get_active(id).ok_or_else(|| EngineError::session_not_found(id))?;
        handle
            .query(QueryCmd {
                settings: Some(crate::types::SettingsUpdate { update_interval_ms: Some(ms), quiet_threshold_ms: None }),
                skip_rate_limit: true,
                ..Default::default()
            })
            .await;
        Ok(())
    }

    pub async fn set_active_quiet_threshold(&self, id: &str, ms: u64) -> EngineResult<()> {
        let handle = self.get_active(id).ok_or_else(|| EngineError::session_not_found(id))?;
        handle
            .query(QueryCmd {
                settings: Some(crate::types::SettingsUpdate { update_interval_ms: None, quiet_threshold_ms: Some(ms) }),
                skip_rate_limit: true,
                ..Default::default()
            })
            .await;
        Ok(())
    }

    /// Register a fresh background session (driver-initiated, not via
    /// detach), generating a new ID.
    pub fn add_background(&self, command: String, pty: Arc<PtySession>, name: Option<String>, reason: Option<String>) -> String {
        let id = {
            let mut pool = self.inner.id_pool.lock().unwrap();
            pool.generate()
        };
        self.add_background_with_id(id.clone(), command, pty, name, reason);
        id
    }

    /// Register a background session under an already-reserved ID (the
    /// detach-to-background path, spec.md §4.2 table).
    pub fn add_background_with_id(
        &self,
        id: String,
        command: String,
        pty: Arc<PtySession>,
        name: Option<String>,
        reason: Option<String>,
    ) {
        let auto_dispose = Arc::new(AtomicBool::new(true));
        let identity = SessionIdentity { id: id.clone(), name, command, reason, started_at: SystemTime::now() };
        self.inner.background.insert(
            id.clone(),
            BackgroundEntry { identity, pty: Arc::clone(&pty), auto_dispose: Arc::clone(&auto_dispose) },
        );
        self.spawn_exit_watcher(id, pty, auto_dispose, Watched::Background);
    }

    pub fn remove_background(&self, id: &str) -> bool {
        if let Some((_, entry)) = self.inner.background.remove(id) {
            let pty = entry.pty;
            tokio::spawn(async move {
                let _ = pty.kill().await;
            });
            let mut pool = self.inner.id_pool.lock().unwrap();
            pool.release(id);
            true
        } else {
            false
        }
    }

    pub fn list_background(&self) -> Vec<SessionIdentity> {
        self.inner.background.iter().map(|e| e.identity.clone()).collect()
    }

    /// Look up a background session, pausing its automatic cleanup
    /// (spec.md §4.3, §9 open question d).
    pub fn get_background(&self, id: &str) -> Option<Arc<PtySession>> {
        let entry = self.inner.background.get(id)?;
        entry.auto_dispose.store(false, Ordering::SeqCst);
        Some(Arc::clone(&entry.pty))
    }

    pub fn minimize(&self, id: String, command: String, pty: Arc<PtySession>, name: Option<String>, reason: Option<String>) {
        let auto_dispose = Arc::new(AtomicBool::new(true));
        let identity = SessionIdentity { id: id.clone(), name, command, reason, started_at: SystemTime::now() };
        self.inner.minimized.insert(
            id.clone(),
            MinimizedEntry { identity, pty: Arc::clone(&pty), minimized_at: SystemTime::now() },
        );
        self.spawn_exit_watcher(id, pty, auto_dispose, Watched::Minimized);
    }

    pub fn restore(&self, id: &str) -> Option<Arc<PtySession>> {
        self.inner.minimized.remove(id).map(|(_, e)| e.pty)
    }

    pub fn remove_minimized(&self, id: &str) -> bool {
        if let Some((_, entry)) = self.inner.minimized.remove(id) {
            let pty = entry.pty;
            tokio::spawn(async move {
                let _ = pty.kill().await;
            });
            let mut pool = self.inner.id_pool.lock().unwrap();
            pool.release(id);
            true
        } else {
            false
        }
    }

    pub fn list_minimized(&self) -> Vec<MinimizedIdentity> {
        self.inner.minimized.iter().map(|e| MinimizedIdentity { identity: e.identity.clone(), minimized_at: e.minimized_at }).collect()
    }

    pub fn transfer_background_to_minimized(&self, id: &str) -> bool {
        if let Some((_, entry)) = self.inner.background.remove(id) {
            let auto_dispose = Arc::new(AtomicBool::new(true));
            self.inner.minimized.insert(
                id.to_string(),
                MinimizedEntry { identity: entry.identity, pty: Arc::clone(&entry.pty), minimized_at: SystemTime::now() },
            );
            self.spawn_exit_watcher(id.to_string(), entry.pty, auto_dispose, Watched::Minimized);
            true
        } else {
            false
        }
    }

    /// Poll `pty.exited()` every ~1s; on first observed exit, arm a 30s
    /// cleanup timer that disposes and releases the ID unless
    /// `auto_dispose` was cleared by `get_background`/`restore`-adjacent
    /// activity, or the entry was removed/transferred out from under us
    /// in the meantime.
    fn spawn_exit_watcher(&self, id: String, pty: Arc<PtySession>, auto_dispose: Arc<AtomicBool>, which: Watched) {
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                if !registry.still_present(&id, which) {
                    return;
                }
                if pty.exited() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            if !registry.still_present(&id, which) {
                return;
            }
            if !auto_dispose.load(Ordering::SeqCst) {
                return;
            }
            match which {
                Watched::Background => {
                    registry.inner.background.remove(&id);
                }
                Watched::Minimized => {
                    registry.inner.minimized.remove(&id);
                }
            }
            let mut pool = registry.inner.id_pool.lock().unwrap();
            pool.release(&id);
        });
    }

    fn still_present(&self, id: &str, which: Watched) -> bool {
        match which {
            Watched::Background => self.inner.background.contains_key(id),
            Watched::Minimized => self.inner.minimized.contains_key(id),
        }
    }

    /// Global shutdown: kill every active controller, dispose every
    /// background/minimized session. Snapshots each map first so the
    /// completion watchers mutating `active` concurrently can't race
    /// iteration (spec.md §4.3).
    pub async fn kill_all(&self) {
        let active_handles: Vec<ControllerHandle> = self.inner.active.iter().map(|e| e.clone()).collect();
        for handle in active_handles {
            let _ = handle.kill().await;
        }
        let background_ptys: Vec<Arc<PtySession>> = self.inner.background.iter().map(|e| Arc::clone(&e.pty)).collect();
        let minimized_ptys: Vec<Arc<PtySession>> = self.inner.minimized.iter().map(|e| Arc::clone(&e.pty)).collect();
        for pty in background_ptys.into_iter().chain(minimized_ptys) {
            let _ = pty.kill().await;
        }
        self.inner.background.clear();
        self.inner.minimized.clear();
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
enum Watched {
    Background,
    Minimized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn start_active_then_natural_exit_releases_id() {
        let registry = SessionRegistry::new();
        let started = registry
            .start_active(
                "echo hi".to_string(),
                std::env::temp_dir(),
                SessionMode::Interactive,
                80,
                24,
                Config::default(),
                None,
                false,
                true,
                false,
            )
            .unwrap();
        let id = started.id.clone();
        let mut completion = started.handle.subscribe_completion();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), completion.recv()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(registry.get_active(&id).is_none());
    }

    #[tokio::test]
    async fn overlay_mutex_allows_only_one_open_overlay() {
        let registry = SessionRegistry::new();
        assert!(registry.try_open_overlay());
        assert!(!registry.try_open_overlay());
        registry.close_overlay();
        assert!(registry.try_open_overlay());
    }

    #[tokio::test]
    async fn background_roundtrip_list_and_remove() {
        let registry = SessionRegistry::new();
        let (pty, _events) = PtySession::spawn("sleep 5", None, 80, 24, 200).unwrap();
        let id = registry.add_background("sleep 5".to_string(), Arc::new(pty), Some("bg".to_string()), None);
        assert_eq!(registry.list_background().len(), 1);
        assert!(registry.get_background(&id).is_some());
        assert!(registry.remove_background(&id));
        assert_eq!(registry.list_background().len(), 0);
    }
}
