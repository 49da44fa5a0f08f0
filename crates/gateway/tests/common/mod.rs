//! Shared harness for gateway integration tests: a real server bound to a
//! loopback port, a scripted runtime, and a handle on the backing store.

use std::sync::Arc;

use serde_json::{json, Value};

use mesh_gateway::api;
use mesh_gateway::bindings::Bindings;
use mesh_gateway::directory::LocalDirectory;
use mesh_gateway::relay::AgentHost;
use mesh_gateway::sched::AlarmRegistry;
use mesh_gateway::state::AppState;
use mesh_memory::Memory;
use mesh_runtime::scripted::ScriptedFactory;
use mesh_store::Store;

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub store: Store,
    pub factory: ScriptedFactory,
    pub state: AppState,
    _tmp: Option<tempfile::TempDir>,
}

/// Build the state for a given store without binding a listener.
pub fn build_state(store: Store, factory: ScriptedFactory) -> AppState {
    use sha2::Digest;

    let bindings = Bindings {
        admin_token: Some(ADMIN_TOKEN.into()),
        store_path: Some("unused-in-tests.db".into()),
        model_api_key: Some("scripted".into()),
        ..Default::default()
    };
    AppState {
        bindings: Arc::new(bindings),
        store: store.clone(),
        memory: Memory::new(store.clone()),
        factory: Arc::new(factory),
        host: AgentHost::new(),
        alarms: AlarmRegistry::new(),
        directory: Arc::new(LocalDirectory::new(store)),
        admin_token_hash: Some(sha2::Sha256::digest(ADMIN_TOKEN.as_bytes()).to_vec()),
    }
}

/// Spawn a full server over `store`.
pub async fn spawn_with_store(store: Store, tmp: Option<tempfile::TempDir>) -> TestServer {
    let factory = ScriptedFactory::new();
    let state = build_state(store.clone(), factory.clone());

    // Reload any agents already registered in this store (cold start).
    for row in store.registry_list().unwrap() {
        state
            .host
            .spawn_agent(state.actor_deps(), &row.name, row.created_at, None)
            .await
            .unwrap();
    }

    tokio::spawn(state.alarms.clone().run(state.host.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        store,
        factory,
        state,
        _tmp: tmp,
    }
}

/// Spawn a server backed by a fresh on-disk store.
pub async fn spawn_server() -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&tmp.path().join("mesh.db")).unwrap();
    spawn_with_store(store, Some(tmp)).await
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn create_agent(&self, name: &str) -> Value {
        let response = self
            .client
            .post(self.url("/agents"))
            .bearer_auth(ADMIN_TOKEN)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "agent create should succeed");
        response.json().await.unwrap()
    }

    pub async fn get_json(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn admin_get_json(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(ADMIN_TOKEN)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn admin_send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> (u16, Value) {
        let response = self
            .client
            .request(method, self.url(path))
            .bearer_auth(ADMIN_TOKEN)
            .json(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }
}
