//! The per-agent actor: one logical writer owning identity, config,
//! session, loop state, and websocket attachments.
//!
//! Every mutation funnels through the actor's mailbox and is processed one
//! command at a time; HTTP handlers, websocket messages, and alarm fires
//! all queue here.  Suspension happens only at record-store I/O, directory
//! calls, broadcasts, and runtime `prompt()` invocations.

pub mod boot;
pub mod handlers;
pub mod tick;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use mesh_crypto::identity::{Identity, PublicKeys};
use mesh_domain::config::AgentConfig;
use mesh_domain::event::AgentEvent;
use mesh_domain::session::Session;
use mesh_domain::{Error, Result};
use mesh_memory::{Memory, OwnerKeys, RecordEntry, RecordListing};
use mesh_runtime::{AgentFactory, PromptOptions, PromptResult};
use mesh_store::{ListQuery, Store};

use crate::directory::KeyDirectory;
use crate::sched::AlarmRegistry;

/// Mailbox depth per actor.  Excess requests apply backpressure upstream.
const MAILBOX_DEPTH: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Durable loop state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    pub loop_running: bool,
    pub loop_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_alarm_at: Option<i64>,
}

/// Snapshot returned by the loop endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStatus {
    pub loop_running: bool,
    pub loop_count: u64,
    pub next_alarm: Option<i64>,
    pub interval_ms: u64,
}

/// Public identity view (`GET /identity`, agent listings).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub did: String,
    pub created_at: i64,
    pub public_keys: PublicKeys,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub enum ActorCommand {
    Identity {
        reply: oneshot::Sender<IdentityView>,
    },
    Prompt {
        prompt: String,
        options: PromptOptions,
        reply: oneshot::Sender<Result<PromptResult>>,
    },
    StoreMemory {
        record: Value,
        public: bool,
        reply: oneshot::Sender<Result<String>>,
    },
    GetMemory {
        id: String,
        reply: oneshot::Sender<Result<RecordEntry>>,
    },
    ListMemory {
        query: ListQuery,
        reply: oneshot::Sender<Result<RecordListing>>,
    },
    UpdateMemory {
        id: String,
        record: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteMemory {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Share {
        id: String,
        recipient_did: String,
        recipient_public_key: String,
        reply: oneshot::Sender<Result<()>>,
    },
    GetShared {
        id: String,
        reply: oneshot::Sender<Result<RecordEntry>>,
    },
    ListShared {
        reply: oneshot::Sender<Result<Vec<RecordEntry>>>,
    },
    Inbox {
        record: Value,
        reply: oneshot::Sender<Result<String>>,
    },
    ListInbox {
        reply: oneshot::Sender<Result<RecordListing>>,
    },
    GetConfig {
        reply: oneshot::Sender<AgentConfig>,
    },
    PatchConfig {
        patch: Value,
        reply: oneshot::Sender<Result<AgentConfig>>,
    },
    LoopStart {
        reply: oneshot::Sender<Result<LoopStatus>>,
    },
    LoopStop {
        reply: oneshot::Sender<Result<LoopStatus>>,
    },
    LoopStatus {
        reply: oneshot::Sender<LoopStatus>,
    },
    /// Alarm fire from the scheduler; no reply channel.
    Fire,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cheap-to-clone address of one actor's mailbox.
#[derive(Clone)]
pub struct ActorHandle {
    pub name: String,
    pub did: String,
    pub created_at: i64,
    tx: mpsc::Sender<ActorCommand>,
}

impl ActorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ActorCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| Error::Other(format!("agent {:?} unavailable", self.name)))?;
        rx.await
            .map_err(|_| Error::Other(format!("agent {:?} dropped the request", self.name)))
    }

    pub async fn identity(&self) -> Result<IdentityView> {
        self.request(|reply| ActorCommand::Identity { reply }).await
    }

    pub async fn prompt(&self, prompt: String, options: PromptOptions) -> Result<PromptResult> {
        self.request(|reply| ActorCommand::Prompt {
            prompt,
            options,
            reply,
        })
        .await?
    }

    pub async fn store_memory(&self, record: Value, public: bool) -> Result<String> {
        self.request(|reply| ActorCommand::StoreMemory {
            record,
            public,
            reply,
        })
        .await?
    }

    pub async fn get_memory(&self, id: String) -> Result<RecordEntry> {
        self.request(|reply| ActorCommand::GetMemory { id, reply })
            .await?
    }

    pub async fn list_memory(&self, query: ListQuery) -> Result<RecordListing> {
        self.request(|reply| ActorCommand::ListMemory { query, reply })
            .await?
    }

    pub async fn update_memory(&self, id: String, record: Value) -> Result<()> {
        self.request(|reply| ActorCommand::UpdateMemory { id, record, reply })
            .await?
    }

    pub async fn delete_memory(&self, id: String) -> Result<()> {
        self.request(|reply| ActorCommand::DeleteMemory { id, reply })
            .await?
    }

    pub async fn share(
        &self,
        id: String,
        recipient_did: String,
        recipient_public_key: String,
    ) -> Result<()> {
        self.request(|reply| ActorCommand::Share {
            id,
            recipient_did,
            recipient_public_key,
            reply,
        })
        .await?
    }

    pub async fn get_shared(&self, id: String) -> Result<RecordEntry> {
        self.request(|reply| ActorCommand::GetShared { id, reply })
            .await?
    }

    pub async fn list_shared(&self) -> Result<Vec<RecordEntry>> {
        self.request(|reply| ActorCommand::ListShared { reply })
            .await?
    }

    pub async fn inbox(&self, record: Value) -> Result<String> {
        self.request(|reply| ActorCommand::Inbox { record, reply })
            .await?
    }

    pub async fn list_inbox(&self) -> Result<RecordListing> {
        self.request(|reply| ActorCommand::ListInbox { reply })
            .await?
    }

    pub async fn get_config(&self) -> Result<AgentConfig> {
        self.request(|reply| ActorCommand::GetConfig { reply }).await
    }

    pub async fn patch_config(&self, patch: Value) -> Result<AgentConfig> {
        self.request(|reply| ActorCommand::PatchConfig { patch, reply })
            .await?
    }

    pub async fn loop_start(&self) -> Result<LoopStatus> {
        self.request(|reply| ActorCommand::LoopStart { reply })
            .await?
    }

    pub async fn loop_stop(&self) -> Result<LoopStatus> {
        self.request(|reply| ActorCommand::LoopStop { reply }).await?
    }

    pub async fn loop_status(&self) -> Result<LoopStatus> {
        self.request(|reply| ActorCommand::LoopStatus { reply })
            .await
    }

    /// Enqueue an alarm fire.  Dropped silently when the mailbox is gone.
    pub async fn fire(&self) {
        let _ = self.tx.send(ActorCommand::Fire).await;
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(ActorCommand::Shutdown { reply: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Actor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared services handed to every actor at spawn.
#[derive(Clone)]
pub struct ActorDeps {
    pub store: Store,
    pub memory: Memory,
    pub factory: std::sync::Arc<dyn AgentFactory>,
    pub alarms: AlarmRegistry,
    pub directory: std::sync::Arc<dyn KeyDirectory>,
    pub events: broadcast::Sender<AgentEvent>,
}

pub struct Actor {
    pub(crate) name: String,
    pub(crate) did: String,
    pub(crate) created_at: i64,
    pub(crate) identity: Identity,
    pub(crate) config: AgentConfig,
    pub(crate) session: Session,
    pub(crate) loop_state: LoopState,
    pub(crate) owner: OwnerKeys,
    pub(crate) deps: ActorDeps,
    rx: mpsc::Receiver<ActorCommand>,
}

/// Spawn a booted actor onto its own task and return its handle.
pub async fn spawn(
    deps: ActorDeps,
    name: &str,
    created_at: i64,
    initial_config: Option<AgentConfig>,
) -> Result<ActorHandle> {
    let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
    let actor = boot::boot(deps, name, created_at, initial_config, rx).await?;
    let handle = ActorHandle {
        name: actor.name.clone(),
        did: actor.did.clone(),
        created_at: actor.created_at,
        tx,
    };
    tokio::spawn(actor.run());
    Ok(handle)
}

impl Actor {
    /// The single-writer loop: commands are processed strictly in arrival
    /// order; while one is in flight the rest queue in the mailbox.
    pub async fn run(mut self) {
        tracing::info!(agent = %self.name, did = %self.did, "actor running");
        while let Some(command) = self.rx.recv().await {
            if let ActorCommand::Shutdown { reply } = command {
                self.deps.alarms.disarm(&self.name);
                tracing::info!(agent = %self.name, "actor shut down");
                let _ = reply.send(());
                return;
            }
            self.handle(command).await;
        }
        tracing::debug!(agent = %self.name, "mailbox closed, actor exiting");
    }

    async fn handle(&mut self, command: ActorCommand) {
        match command {
            ActorCommand::Identity { reply } => {
                let _ = reply.send(self.identity_view());
            }
            ActorCommand::Prompt {
                prompt,
                options,
                reply,
            } => {
                let result = self.handle_prompt(&prompt, &options).await;
                let _ = reply.send(result);
            }
            ActorCommand::StoreMemory {
                record,
                public,
                reply,
            } => {
                let _ = reply.send(self.handle_store_memory(&record, public));
            }
            ActorCommand::GetMemory { id, reply } => {
                let _ = reply.send(self.handle_get_memory(&id));
            }
            ActorCommand::ListMemory { query, reply } => {
                let _ = reply.send(self.handle_list_memory(&query));
            }
            ActorCommand::UpdateMemory { id, record, reply } => {
                let _ = reply.send(self.handle_update_memory(&id, &record));
            }
            ActorCommand::DeleteMemory { id, reply } => {
                let _ = reply.send(self.handle_delete_memory(&id));
            }
            ActorCommand::Share {
                id,
                recipient_did,
                recipient_public_key,
                reply,
            } => {
                let _ = reply.send(self.handle_share(&id, &recipient_did, &recipient_public_key));
            }
            ActorCommand::GetShared { id, reply } => {
                let _ = reply.send(self.handle_get_shared(&id));
            }
            ActorCommand::ListShared { reply } => {
                let _ = reply.send(self.handle_list_shared());
            }
            ActorCommand::Inbox { record, reply } => {
                let _ = reply.send(self.handle_inbox(&record));
            }
            ActorCommand::ListInbox { reply } => {
                let _ = reply.send(self.handle_list_inbox());
            }
            ActorCommand::GetConfig { reply } => {
                let _ = reply.send(self.config.clone());
            }
            ActorCommand::PatchConfig { patch, reply } => {
                let _ = reply.send(self.handle_patch_config(&patch));
            }
            ActorCommand::LoopStart { reply } => {
                let _ = reply.send(self.handle_loop_start());
            }
            ActorCommand::LoopStop { reply } => {
                let _ = reply.send(self.handle_loop_stop());
            }
            ActorCommand::LoopStatus { reply } => {
                let _ = reply.send(self.loop_status());
            }
            ActorCommand::Fire => {
                self.run_tick().await;
            }
            ActorCommand::Shutdown { .. } => unreachable!("handled in run()"),
        }
    }

    pub(crate) fn identity_view(&self) -> IdentityView {
        IdentityView {
            did: self.did.clone(),
            created_at: self.created_at,
            public_keys: self.identity.public_keys(),
        }
    }

    pub(crate) fn loop_status(&self) -> LoopStatus {
        LoopStatus {
            loop_running: self.loop_state.loop_running,
            loop_count: self.loop_state.loop_count,
            next_alarm: self.loop_state.next_alarm_at,
            interval_ms: self.config.loop_interval_ms,
        }
    }
}
