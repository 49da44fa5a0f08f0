//! Relay: name → actor routing plus the process-wide event sink.
//!
//! Routing is stateless: the actor instance id is derived from the
//! lowercased name, so lookups are a map read and cold starts are
//! deterministic.  Broadcasts fan out through one `tokio::sync::broadcast`
//! channel to every websocket subscriber.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use mesh_domain::config::AgentConfig;
use mesh_domain::event::AgentEvent;
use mesh_domain::{Error, Result};

use crate::actor::{self, ActorDeps, ActorHandle};

/// Capacity of the process-wide event channel.  Slow subscribers lag and
/// lose old events rather than blocking emitters.
const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AgentHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    actors: RwLock<HashMap<String, ActorHandle>>,
    events: broadcast::Sender<AgentEvent>,
}

impl Default for AgentHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentHost {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(HostInner {
                actors: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    /// The shared event sink actors publish into.
    pub fn events_sender(&self) -> broadcast::Sender<AgentEvent> {
        self.inner.events.clone()
    }

    /// Subscribe to every agent's events (websocket fan-out).
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.inner.events.subscribe()
    }

    /// Boot and register an actor.  Used at process start (reload from the
    /// registry) and by `POST /agents`.
    pub async fn spawn_agent(
        &self,
        deps: ActorDeps,
        name: &str,
        created_at: i64,
        initial_config: Option<AgentConfig>,
    ) -> Result<ActorHandle> {
        let key = name.to_ascii_lowercase();
        if self.inner.actors.read().contains_key(&key) {
            return Err(Error::Conflict(format!("agent {key:?} already running")));
        }
        let handle = actor::spawn(deps, &key, created_at, initial_config).await?;
        self.inner.actors.write().insert(key, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<ActorHandle> {
        self.inner
            .actors
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Detach an actor from routing (admin deletion).  The caller drives
    /// shutdown on the returned handle.
    pub fn remove(&self, name: &str) -> Option<ActorHandle> {
        self.inner.actors.write().remove(&name.to_ascii_lowercase())
    }

    /// Registered handles, sorted by name.
    pub fn list(&self) -> Vec<ActorHandle> {
        let mut handles: Vec<_> = self.inner.actors.read().values().cloned().collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        handles
    }

    /// Deliver an alarm fire to the named actor.  Unknown names are logged
    /// and dropped; the agent may have been deleted since scheduling.
    pub async fn fire(&self, name: &str) {
        match self.get(name) {
            Some(handle) => handle.fire().await,
            None => tracing::warn!(agent = %name, "alarm fired for unknown agent"),
        }
    }
}
