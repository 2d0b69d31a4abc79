//! Validated, clamped engine configuration.
//!
//! Discovery and parsing of the on-disk JSON file is an external
//! collaborator's job per spec.md §1, but `Config::clamp` and the
//! `<cwd>/.pi/interactive-shell.json` / `<home>/.pi/agent/interactive-shell.json`
//! search order (spec.md §6) live here since they are part of the engine's
//! contract with its caller, not the TUI or tool-schema layers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Hands-free driver update emission policy (spec.md §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateMode {
    OnQuiet,
    Interval,
}

/// Validated, clamped configuration. Immutable per session once built
/// (spec.md §3: "The engine treats Config as immutable per session").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub overlay_width_pct: u32,
    pub overlay_height_pct: u32,
    pub scrollback_lines: usize,
    pub exit_auto_close_delay_secs: u32,
    pub double_escape_threshold_ms: u32,
    pub ansi_reemit: bool,
    pub handoff_preview_enabled: bool,
    pub handoff_preview_lines: usize,
    pub handoff_preview_max_chars: usize,
    pub handoff_snapshot_enabled: bool,
    pub handoff_snapshot_lines: usize,
    pub handoff_snapshot_max_chars: usize,
    pub hands_free_update_mode: UpdateMode,
    pub hands_free_update_interval_ms: u64,
    pub quiet_threshold_ms: u64,
    pub update_max_chars: usize,
    pub total_budget_max_chars: usize,
    pub min_query_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            overlay_width_pct: 60,
            overlay_height_pct: 60,
            scrollback_lines: 2000,
            exit_auto_close_delay_secs: 5,
            double_escape_threshold_ms: 500,
            ansi_reemit: false,
            handoff_preview_enabled: true,
            handoff_preview_lines: 40,
            handoff_preview_max_chars: 4000,
            handoff_snapshot_enabled: false,
            handoff_snapshot_lines: 200,
            handoff_snapshot_max_chars: 20000,
            hands_free_update_mode: UpdateMode::OnQuiet,
            hands_free_update_interval_ms: 30_000,
            quiet_threshold_ms: 3_000,
            update_max_chars: 2000,
            total_budget_max_chars: 50_000,
            min_query_interval_secs: 10,
        }
    }
}

impl Config {
    /// Clamp every numeric field to the documented range (spec.md §3).
    /// Called unconditionally after deserialization so an out-of-range
    /// value in the config file is silently corrected rather than
    /// rejected (spec.md §7: "All clamp violations in Config silently
    /// clamp").
    pub fn clamp(mut self) -> Self {
        self.overlay_width_pct = self.overlay_width_pct.clamp(10, 100);
        self.overlay_height_pct = self.overlay_height_pct.clamp(20, 90);
        self.scrollback_lines = self.scrollback_lines.clamp(200, 50_000);
        self.hands_free_update_interval_ms = self.hands_free_update_interval_ms.clamp(5_000, 300_000);
        self.quiet_threshold_ms = self.quiet_threshold_ms.clamp(1_000, 30_000);
        self.total_budget_max_chars = self.total_budget_max_chars.clamp(10_000, 1_000_000);
        self.min_query_interval_secs = self.min_query_interval_secs.clamp(5, 300);
        self
    }

    /// Load from the preferred-order config paths (spec.md §6), falling
    /// back to `Config::default()` when neither file exists or parsing
    /// fails. JSON parse errors are logged as a warning and swallowed
    /// (spec.md §7), never propagated to the caller.
    pub fn discover(cwd: &Path) -> Self {
        for path in Self::search_paths(cwd) {
            match std::fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str::<Config>(&text) {
                    Ok(cfg) => {
                        log::info!("loaded config from {}", path.display());
                        return cfg.clamp();
                    }
                    Err(e) => {
                        log::warn!("failed to parse config {}: {e}; using defaults", path.display());
                        return Config::default();
                    }
                },
                Err(_) => continue,
            }
        }
        Config::default()
    }

    fn search_paths(cwd: &Path) -> Vec<PathBuf> {
        let mut paths = vec![cwd.join(".pi").join("interactive-shell.json")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".pi").join("agent").join("interactive-shell.json"));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_fields() {
        let cfg = Config {
            overlay_width_pct: 5,
            scrollback_lines: 50,
            quiet_threshold_ms: 99_999,
            min_query_interval_secs: 1,
            ..Config::default()
        }
        .clamp();
        assert_eq!(cfg.overlay_width_pct, 10);
        assert_eq!(cfg.scrollback_lines, 200);
        assert_eq!(cfg.quiet_threshold_ms, 30_000);
        assert_eq!(cfg.min_query_interval_secs, 5);
    }

    #[test]
    fn discover_falls_back_to_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::discover(dir.path());
        assert_eq!(cfg.scrollback_lines, Config::default().scrollback_lines);
    }

    #[test]
    fn discover_reads_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".pi")).unwrap();
        std::fs::write(
            dir.path().join(".pi").join("interactive-shell.json"),
            r#"{"scrollbackLines": 500, "unknownField": 1}"#,
        )
        .unwrap();
        let cfg = Config::discover(dir.path());
        assert_eq!(cfg.scrollback_lines, 500);
    }
}
