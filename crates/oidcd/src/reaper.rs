//! Lifetime Reaper (§2 item 9): a cooperative background tick that evicts accounts whose `death`
//! has passed. Runs as its own task rather than inline in the accept loop so a burst of client
//! requests never delays an eviction past its nominal tick.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::agent_state::{
    AgentState,
    now,
};

const TICK_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(state: Arc<AgentState>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = state.registry.reap(now());
                if evicted > 0 {
                    debug!(evicted, "reaper evicted expired accounts");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
