//! AgentMesh gateway: the HTTP/WS surface, the per-agent actors, the alarm
//! scheduler, and the relay that routes requests by agent name.

pub mod actor;
pub mod api;
pub mod bindings;
pub mod directory;
pub mod relay;
pub mod sched;
pub mod state;
pub mod tools;
