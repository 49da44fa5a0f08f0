//! Shared application state passed to all API handlers.

use std::sync::Arc;

use mesh_memory::Memory;
use mesh_runtime::AgentFactory;
use mesh_store::Store;

use crate::actor::ActorDeps;
use crate::bindings::Bindings;
use crate::directory::KeyDirectory;
use crate::relay::AgentHost;
use crate::sched::AlarmRegistry;

#[derive(Clone)]
pub struct AppState {
    // ── Core services ────────────────────────────────────────────────
    pub bindings: Arc<Bindings>,
    pub store: Store,
    pub memory: Memory,
    pub factory: Arc<dyn AgentFactory>,

    // ── Relay & scheduling ───────────────────────────────────────────
    pub host: AgentHost,
    pub alarms: AlarmRegistry,
    pub directory: Arc<dyn KeyDirectory>,

    // ── Security (startup-computed) ──────────────────────────────────
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = no token configured; protected routes refuse access.
    pub admin_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Bundle the services an actor needs at spawn.
    pub fn actor_deps(&self) -> ActorDeps {
        ActorDeps {
            store: self.store.clone(),
            memory: self.memory.clone(),
            factory: self.factory.clone(),
            alarms: self.alarms.clone(),
            directory: self.directory.clone(),
            events: self.host.events_sender(),
        }
    }
}
