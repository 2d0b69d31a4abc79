//! The `attach` command (spec.md §6): reattach the user to a background
//! session. No arguments opens an interactive selector over the
//! background list; one argument reattaches directly by ID.

use interactive_shell_engine::registry::{SessionIdentity, SessionRegistry};

/// Outcome of an `attach` invocation, before any presenter is run. A
/// caller with a real terminal takes the returned `pty`/`id` pair and
/// drives an `OverlayPresenter`; this module only resolves the target.
pub enum AttachOutcome {
    /// Nothing to attach to.
    NoBackgroundSessions,
    /// Selector mode (no argument) with candidates to choose among.
    Candidates(Vec<SessionIdentity>),
    /// A specific session was found and removed from the background map
    /// (the caller now owns reattaching its PTY to a presenter).
    Resolved(SessionIdentity),
    /// The requested ID does not exist in the background list.
    NotFound(String),
}

impl AttachOutcome {
    /// The exact response strings spec.md §6 names for the miss cases.
    pub fn message(&self) -> Option<String> {
        match self {
            AttachOutcome::NoBackgroundSessions => Some("No background sessions".to_string()),
            AttachOutcome::NotFound(id) => Some(format!("Session not found: {id}")),
            AttachOutcome::Candidates(_) | AttachOutcome::Resolved(_) => None,
        }
    }
}

/// Resolve an `attach` request against the registry's background list.
/// `target` is the optional single argument from the command line.
pub fn attach(registry: &SessionRegistry, target: Option<&str>) -> AttachOutcome {
    let candidates = registry.list_background();

    match target {
        None => {
            if candidates.is_empty() {
                AttachOutcome::NoBackgroundSessions
            } else {
                AttachOutcome::Candidates(candidates)
            }
        }
        Some(id) => match candidates.into_iter().find(|s| s.id == id) {
            Some(identity) => AttachOutcome::Resolved(identity),
            None => AttachOutcome::NotFound(id.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interactive_shell_engine::pty_session::PtySession;
    use std::sync::Arc;

    #[test]
    fn no_args_with_empty_background_reports_none() {
        let registry = SessionRegistry::new();
        assert!(matches!(attach(&registry, None), AttachOutcome::NoBackgroundSessions));
    }

    #[test]
    fn missing_id_reports_not_found() {
        let registry = SessionRegistry::new();
        let outcome = attach(&registry, Some("missing-session"));
        assert_eq!(outcome.message().as_deref(), Some("Session not found: missing-session"));
    }

    #[tokio::test]
    async fn direct_reattach_resolves_by_id() {
        let registry = SessionRegistry::new();
        let (pty, _events) = PtySession::spawn("sleep 5", None, 80, 24, 200).unwrap();
        let id = registry.add_background("sleep 5".to_string(), Arc::new(pty), Some("bg".to_string()), None);

        let outcome = attach(&registry, Some(&id));
        match outcome {
            AttachOutcome::Resolved(identity) => assert_eq!(identity.id, id),
            _ => panic!("expected Resolved"),
        }
    }

    #[tokio::test]
    async fn no_args_lists_all_background_candidates() {
        let registry = SessionRegistry::new();
        let (pty, _events) = PtySession::spawn("sleep 5", None, 80, 24, 200).unwrap();
        registry.add_background("sleep 5".to_string(), Arc::new(pty), Some("bg".to_string()), None);

        let outcome = attach(&registry, None);
        match outcome {
            AttachOutcome::Candidates(list) => assert_eq!(list.len(), 1),
            _ => panic!("expected Candidates"),
        }
    }
}
