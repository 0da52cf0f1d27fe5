//! The dispatcher-side half of the code flow's handoff with the Callback Receiver.
//!
//! The receiver itself — the embedded HTTP server that catches the browser redirect — is an
//! out-of-process collaborator specified only by the interface it drives (§1): `code_exchange`
//! once it has `code`+`state`, or `term_http` if it's torn down without ever seeing a redirect.
//! This module is what those two requests act on: a small table of finalized-but-undelivered
//! code flow outcomes, keyed by `state`, that `state_lookup` drains exactly once.

use std::collections::HashMap;

use parking_lot::Mutex;

/// What `state_lookup` hands back once the code flow tied to `state` has resolved.
#[derive(Clone)]
pub enum PendingOutcome {
    Exchanged { account_config: String },
    TimedOut,
}

#[derive(Default)]
pub struct CallbackCoordinator {
    pending: Mutex<HashMap<String, PendingOutcome>>,
}

impl CallbackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded by the `code_exchange` handler once tokens have been obtained for `state`.
    pub fn record_exchanged(&self, state: &str, account_config: String) {
        self.pending.lock().insert(state.to_string(), PendingOutcome::Exchanged { account_config });
    }

    /// Recorded by the `term_http` handler when the receiver is torn down without a matching
    /// exchange — e.g. the user closed the browser tab.
    pub fn record_timed_out(&self, state: &str) {
        self.pending.lock().insert(state.to_string(), PendingOutcome::TimedOut);
    }

    /// `state_lookup`: removes and returns the outcome for `state`, if any. The removal is what
    /// makes a second lookup for the same `state` come back empty (§8).
    pub fn drain(&self, state: &str) -> Option<PendingOutcome> {
        self.pending.lock().remove(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_single_use() {
        let coordinator = CallbackCoordinator::new();
        coordinator.record_exchanged("state-1", "{}".to_string());

        assert!(matches!(coordinator.drain("state-1"), Some(PendingOutcome::Exchanged { .. })));
        assert!(coordinator.drain("state-1").is_none());
    }

    #[test]
    fn unknown_state_is_none() {
        let coordinator = CallbackCoordinator::new();
        assert!(coordinator.drain("never-seen").is_none());
    }

    #[test]
    fn timed_out_outcome_is_recorded_and_drained_once() {
        let coordinator = CallbackCoordinator::new();
        coordinator.record_timed_out("state-2");
        assert!(matches!(coordinator.drain("state-2"), Some(PendingOutcome::TimedOut)));
        assert!(coordinator.drain("state-2").is_none());
    }
}
