//! Actor cold start: reload (or mint) durable state, then best-effort
//! directory registration.

use tokio::sync::mpsc;

use mesh_crypto::did;
use mesh_crypto::identity::{Identity, IdentityBlob};
use mesh_domain::config::AgentConfig;
use mesh_domain::session::Session;
use mesh_domain::{Error, Result};
use mesh_memory::OwnerKeys;
use mesh_store::state::{STATE_CONFIG, STATE_IDENTITY, STATE_LOOP, STATE_SESSION};

use super::{Actor, ActorCommand, ActorDeps, LoopState};

pub(super) async fn boot(
    deps: ActorDeps,
    name: &str,
    created_at: i64,
    initial_config: Option<AgentConfig>,
    rx: mpsc::Receiver<ActorCommand>,
) -> Result<Actor> {
    let name = name.to_ascii_lowercase();
    let agent_did = did::did_from_name(&name);

    // ── Identity: load or mint ───────────────────────────────────────
    let identity = match deps
        .store
        .state_get::<IdentityBlob>(&agent_did, STATE_IDENTITY)
        .map_err(|e| Error::Other(e.to_string()))?
    {
        Some(blob) => {
            Identity::from_blob(&blob).map_err(|e| Error::Other(e.to_string()))?
        }
        None => {
            let identity = Identity::generate(agent_did.clone());
            deps.store
                .state_put(&agent_did, STATE_IDENTITY, &identity.to_blob())
                .map_err(|e| Error::Other(e.to_string()))?;
            tracing::info!(agent = %name, did = %agent_did, "identity generated");

            // Registration is best-effort: a directory outage must not
            // block identity creation.
            let keys = serde_json::to_value(identity.public_keys())?;
            if let Err(e) = deps.directory.register(&agent_did, &keys).await {
                tracing::warn!(
                    agent = %name,
                    did = %agent_did,
                    error = %e,
                    "directory registration failed, identity remains local"
                );
            }
            identity
        }
    };

    // ── Config ───────────────────────────────────────────────────────
    let config = match deps
        .store
        .state_get::<AgentConfig>(&agent_did, STATE_CONFIG)
        .map_err(|e| Error::Other(e.to_string()))?
    {
        Some(mut config) => {
            config.clamp();
            config
        }
        None => {
            let mut config = initial_config.unwrap_or_else(|| AgentConfig::new(&name));
            config.name = name.clone();
            config.clamp();
            deps.store
                .state_put(&agent_did, STATE_CONFIG, &config)
                .map_err(|e| Error::Other(e.to_string()))?;
            config
        }
    };

    // ── Session + loop state ─────────────────────────────────────────
    let session = deps
        .store
        .state_get::<Session>(&agent_did, STATE_SESSION)
        .map_err(|e| Error::Other(e.to_string()))?
        .unwrap_or_default();
    let loop_state = deps
        .store
        .state_get::<LoopState>(&agent_did, STATE_LOOP)
        .map_err(|e| Error::Other(e.to_string()))?
        .unwrap_or_default();

    // Re-arm a loop that was running when the process went down.  A
    // deadline in the past fires on the next scheduler pass.
    if loop_state.loop_running {
        let at = loop_state
            .next_alarm_at
            .unwrap_or_else(|| mesh_store::now_ms() + config.loop_interval_ms as i64);
        deps.alarms.arm(&name, at);
        tracing::info!(agent = %name, next_alarm = at, "loop re-armed after cold start");
    }

    let owner = OwnerKeys {
        did: agent_did.clone(),
        encryption: identity.encryption.clone(),
    };

    Ok(Actor {
        name,
        did: agent_did,
        created_at,
        identity,
        config,
        session,
        loop_state,
        owner,
        deps,
        rx,
    })
}
