//! Scheduler and session-bound scenarios: the alarm invariant, error
//! containment during ticks, session trimming with archival, and the
//! websocket prompt protocol.

mod common;

use serde_json::json;

use mesh_crypto::identity::{Identity, IdentityBlob};
use mesh_domain::session::{Session, SessionMessage, MAX_SESSION_MESSAGES};
use mesh_memory::OwnerKeys;
use mesh_runtime::scripted::ScriptedTurn;
use mesh_store::state::{STATE_IDENTITY, STATE_LOOP, STATE_SESSION};

use common::{spawn_server, ADMIN_TOKEN};

/// Rebuild the agent's owner keys from its persisted identity blob.
fn owner_keys(server: &common::TestServer, did: &str) -> OwnerKeys {
    let blob: IdentityBlob = server.store.state_get(did, STATE_IDENTITY).unwrap().unwrap();
    let identity = Identity::from_blob(&blob).unwrap();
    OwnerKeys {
        did: did.to_string(),
        encryption: identity.encryption,
    }
}

#[tokio::test]
async fn loop_chain_survives_failing_ticks() {
    let server = spawn_server().await;
    let alice = server.create_agent("alice").await;
    let did = alice["did"].as_str().unwrap().to_string();
    let handle = server.state.host.get("alice").unwrap();

    // Start: Armed, nextAlarm set, durable state updated.
    let status = handle.loop_start().await.unwrap();
    assert!(status.loop_running);
    let next_alarm = status.next_alarm.expect("alarm scheduled");
    assert!(next_alarm > mesh_store::now_ms());
    assert_eq!(server.state.alarms.next_for("alice"), Some(next_alarm));

    // Inject a fire whose prompt raises inside the runtime.  The tick must
    // swallow the error, bump the counter, and re-arm.
    server.factory.push(ScriptedTurn::Fail("tool exploded".into()));
    handle.fire().await;

    let status = handle.loop_status().await.unwrap();
    assert_eq!(status.loop_count, 1);
    assert!(status.loop_running);
    let rearmed = status.next_alarm.expect("loop must stay armed after a failing tick");
    assert_eq!(server.state.alarms.next_for("alice"), Some(rearmed));

    // A healthy tick also re-arms and counts.
    server.factory.push(ScriptedTurn::Reply("thought about goals".into()));
    handle.fire().await;
    let status = handle.loop_status().await.unwrap();
    assert_eq!(status.loop_count, 2);
    assert!(status.loop_running);

    // Stop: Idle, alarm cancelled, durably recorded.
    let status = handle.loop_stop().await.unwrap();
    assert!(!status.loop_running);
    assert!(status.next_alarm.is_none());
    assert!(server.state.alarms.next_for("alice").is_none());

    let persisted: serde_json::Value =
        server.store.state_get(&did, STATE_LOOP).unwrap().unwrap();
    assert_eq!(persisted["loopRunning"], false);
    assert_eq!(persisted["loopCount"], 2);
}

#[tokio::test]
async fn loop_endpoints_drive_the_alarm() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    let (status, body) = server
        .admin_send_json(
            reqwest::Method::POST,
            "/agents/alice/loop/start",
            &json!({}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["loopRunning"], true);
    assert!(body["nextAlarm"].is_i64());
    assert_eq!(body["intervalMs"], 60000);

    let (status, body) = server.admin_get_json("/agents/alice/loop/status").await;
    assert_eq!(status, 200);
    assert_eq!(body["loopRunning"], true);

    let (status, body) = server
        .admin_send_json(
            reqwest::Method::POST,
            "/agents/alice/loop/stop",
            &json!({}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["loopRunning"], false);
    assert!(body["nextAlarm"].is_null());

    // Loop status is an admin read.
    let (status, _) = server.get_json("/agents/alice/loop/status").await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn session_trims_to_fifty_and_archives_overflow() {
    let server = spawn_server().await;
    let alice = server.create_agent("alice").await;
    let did = alice["did"].as_str().unwrap().to_string();

    // Seed 60 messages behind the actor's back, then restart the gateway
    // over the same store so the actor cold-starts with them.
    let mut session = Session::default();
    session.messages = (0..60)
        .map(|i| SessionMessage::new("user", json!(format!("m{i}"))))
        .collect();
    server.store.state_put(&did, STATE_SESSION, &session).unwrap();

    let server = common::spawn_with_store(server.store.clone(), None).await;
    server.factory.push(ScriptedTurn::Reply("ok".into()));

    let (status, result) = server
        .admin_send_json(
            reqwest::Method::POST,
            "/agents/alice/prompt",
            &json!({ "prompt": "hello" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(result["text"], "ok");

    // Stored session: exactly 50 messages, newest retained.
    let stored: Session = server.store.state_get(&did, STATE_SESSION).unwrap().unwrap();
    assert_eq!(stored.messages.len(), MAX_SESSION_MESSAGES);
    assert_eq!(stored.messages.last().unwrap().content, json!("ok"));

    // Exactly one archive record holding the 12 oldest pre-existing
    // entries (60 seeded + 2 appended - 50 retained).
    let page = server
        .store
        .list_records(
            &did,
            &mesh_store::ListQuery {
                collection: Some("agent.session.archive".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(page.rows.len(), 1);

    let owner = owner_keys(&server, &did);
    let archive = server.state.memory.load(&owner, &page.rows[0].id).unwrap();
    let archived = archive["messages"].as_array().unwrap();
    assert_eq!(archived.len(), 12);
    assert_eq!(archived[0]["content"], "m0");
    assert_eq!(archived[11]["content"], "m11");
}

#[tokio::test]
async fn prompt_path_updates_session_in_order() {
    let server = spawn_server().await;
    let alice = server.create_agent("alice").await;
    let did = alice["did"].as_str().unwrap().to_string();

    server.factory.push(ScriptedTurn::Reply("first answer".into()));
    server.factory.push(ScriptedTurn::Reply("second answer".into()));

    for prompt in ["first question", "second question"] {
        let (status, _) = server
            .admin_send_json(
                reqwest::Method::POST,
                "/agents/alice/prompt",
                &json!({ "prompt": prompt }),
            )
            .await;
        assert_eq!(status, 200);
    }

    let stored: Session = server.store.state_get(&did, STATE_SESSION).unwrap().unwrap();
    let contents: Vec<_> = stored
        .messages
        .iter()
        .map(|m| m.content.as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        contents,
        vec![
            "first question",
            "first answer",
            "second question",
            "second answer"
        ]
    );
}

#[tokio::test]
async fn websocket_prompt_protocol() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let server = spawn_server().await;
    server.create_agent("alice").await;
    server.factory.push(ScriptedTurn::Reply("over the wire".into()));

    let ws_url = format!(
        "{}/agents/alice/ws?token={ADMIN_TOKEN}",
        server.base.replace("http://", "ws://")
    );
    let (mut socket, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();

    socket
        .send(Message::Text(
            json!({ "type": "prompt", "id": "req-1", "prompt": "hi" }).to_string(),
        ))
        .await
        .unwrap();

    // Skip any unsolicited event frames until the prompt result arrives.
    let result = loop {
        let frame = socket.next().await.unwrap().unwrap();
        if let Message::Text(text) = frame {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            if value["type"] == "prompt.result" {
                break value;
            }
        }
    };
    assert_eq!(result["id"], "req-1");
    assert_eq!(result["result"]["text"], "over the wire");

    // A failing turn answers prompt.error instead of dropping the frame.
    server.factory.push(ScriptedTurn::Fail("runtime down".into()));
    socket
        .send(Message::Text(
            json!({ "type": "prompt", "id": "req-2", "prompt": "hi" }).to_string(),
        ))
        .await
        .unwrap();
    let error = loop {
        let frame = socket.next().await.unwrap().unwrap();
        if let Message::Text(text) = frame {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            if value["type"] == "prompt.error" {
                break value;
            }
        }
    };
    assert_eq!(error["id"], "req-2");
}

#[tokio::test]
async fn websocket_requires_admin_token() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    let ws_url = format!(
        "{}/agents/alice/ws?token=wrong",
        server.base.replace("http://", "ws://")
    );
    assert!(tokio_tungstenite::connect_async(&ws_url).await.is_err());
}
