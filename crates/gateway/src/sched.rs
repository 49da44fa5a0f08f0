//! Alarm registry: the process-wide timer behind every agent's think
//! loop.
//!
//! A min-heap of `(next_alarm_at, agent)` drives one background task that
//! sleeps until the earliest deadline and enqueues a `Fire` into the
//! owning actor's mailbox.  The `armed` map is authoritative: heap entries
//! that no longer match it (re-arms, disarms) are skipped on pop, so
//! `disarm` is O(1) and never races the sleeper.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::relay::AgentHost;

#[derive(Default)]
struct Inner {
    heap: Mutex<BinaryHeap<Reverse<(i64, String)>>>,
    /// Authoritative `agent → next_alarm_at`.
    armed: Mutex<HashMap<String, i64>>,
    notify: Notify,
}

/// Cheap-to-clone handle to the registry.
#[derive(Clone, Default)]
pub struct AlarmRegistry {
    inner: Arc<Inner>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the alarm for `agent` at unix-ms `at`.
    pub fn arm(&self, agent: &str, at: i64) {
        self.inner.armed.lock().insert(agent.to_string(), at);
        self.inner.heap.lock().push(Reverse((at, agent.to_string())));
        self.inner.notify.notify_one();
    }

    /// Cancel any pending alarm for `agent`.
    pub fn disarm(&self, agent: &str) {
        self.inner.armed.lock().remove(agent);
        self.inner.notify.notify_one();
    }

    /// The agent's scheduled alarm, if armed.
    pub fn next_for(&self, agent: &str) -> Option<i64> {
        self.inner.armed.lock().get(agent).copied()
    }

    /// Pop the next due entry at `now`, skipping stale heap entries.
    /// A due pop also consumes the armed entry, so a concurrent re-arm
    /// cannot be lost between pop and fire.
    fn pop_due(&self, now: i64) -> PopResult {
        let mut heap = self.inner.heap.lock();
        let mut armed = self.inner.armed.lock();
        loop {
            let (at, agent) = match heap.peek() {
                None => return PopResult::Empty,
                Some(Reverse((at, agent))) => (*at, agent.clone()),
            };
            if armed.get(&agent) != Some(&at) {
                // Stale: re-armed later or disarmed.
                heap.pop();
                continue;
            }
            if at > now {
                return PopResult::NotYet(at);
            }
            heap.pop();
            armed.remove(&agent);
            return PopResult::Due(agent);
        }
    }

    /// Run the dispatch loop until the process shuts down.
    pub async fn run(self, host: AgentHost) {
        loop {
            let now = mesh_store::now_ms();
            match self.pop_due(now) {
                PopResult::Due(agent) => {
                    tracing::debug!(agent = %agent, "alarm fired");
                    host.fire(&agent).await;
                }
                PopResult::NotYet(at) => {
                    let wait = (at - now).max(1) as u64;
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_millis(wait)) => {}
                        _ = self.inner.notify.notified() => {}
                    }
                }
                PopResult::Empty => {
                    self.inner.notify.notified().await;
                }
            }
        }
    }
}

enum PopResult {
    Due(String),
    NotYet(i64),
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_entry_pops_in_deadline_order() {
        let registry = AlarmRegistry::new();
        registry.arm("late", 200);
        registry.arm("early", 100);

        match registry.pop_due(150) {
            PopResult::Due(agent) => assert_eq!(agent, "early"),
            _ => panic!("early should be due"),
        }
        match registry.pop_due(150) {
            PopResult::NotYet(at) => assert_eq!(at, 200),
            _ => panic!("late is in the future"),
        }
    }

    #[test]
    fn disarm_skips_stale_heap_entry() {
        let registry = AlarmRegistry::new();
        registry.arm("a", 100);
        registry.disarm("a");
        assert!(matches!(registry.pop_due(500), PopResult::Empty));
        assert!(registry.next_for("a").is_none());
    }

    #[test]
    fn rearm_invalidates_previous_deadline() {
        let registry = AlarmRegistry::new();
        registry.arm("a", 100);
        registry.arm("a", 300);

        // The stale 100 entry must not fire at t=150.
        assert!(matches!(registry.pop_due(150), PopResult::NotYet(300)));
        match registry.pop_due(350) {
            PopResult::Due(agent) => assert_eq!(agent, "a"),
            _ => panic!("rearmed alarm should fire"),
        }
    }
}
