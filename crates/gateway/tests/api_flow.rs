//! End-to-end API scenarios against a live gateway: identity, encrypted
//! memory, sharing, inbox isolation, auth, CORS, and create races.

mod common;

use reqwest::Method;
use serde_json::json;

use common::{spawn_server, spawn_with_store, ADMIN_TOKEN};

#[tokio::test]
async fn identity_creation_is_stable_across_cold_starts() {
    let server = spawn_server().await;
    let created = server.create_agent("alice").await;

    let did = created["did"].as_str().unwrap().to_string();
    assert!(did.starts_with("did:mesh:"));
    assert!(created["publicKeys"]["encryption"]
        .as_str()
        .unwrap()
        .starts_with('z'));
    assert!(created["publicKeys"]["signing"]
        .as_str()
        .unwrap()
        .starts_with('z'));

    let (status, identity) = server.get_json("/agents/alice/identity").await;
    assert_eq!(status, 200);
    assert_eq!(identity["did"], did.as_str());

    // Persisted blob carries the advertised algorithms and private JWKs.
    let blob: serde_json::Value = server
        .store
        .state_get(&did, mesh_store::state::STATE_IDENTITY)
        .unwrap()
        .unwrap();
    assert_eq!(blob["version"], 1);
    assert_eq!(blob["signingKey"]["algorithm"], "Ed25519");
    assert_eq!(blob["encryptionKey"]["algorithm"], "X25519");
    assert!(blob["signingKey"]["privateJwk"]["d"].is_string());

    // A second gateway instance over the same store resolves the same
    // identity.
    let second = spawn_with_store(server.store.clone(), None).await;
    let (status, identity2) = second.get_json("/agents/alice/identity").await;
    assert_eq!(status, 200);
    assert_eq!(identity2["did"], identity["did"]);
    assert_eq!(identity2["publicKeys"], identity["publicKeys"]);
}

#[tokio::test]
async fn encrypted_memory_round_trip() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    let record = json!({
        "$type": "agent.memory.note",
        "summary": "s",
        "text": "secret",
        "createdAt": "2026-02-07T00:00:00Z",
    });
    let (status, stored) = server
        .admin_send_json(Method::POST, "/agents/alice/memory", &record)
        .await;
    assert_eq!(status, 200);
    let id = stored["id"].as_str().unwrap().to_string();
    assert!(id.contains("/agent.memory.note/"));

    // At rest: private, sealed DEK present, ciphertext differs from the
    // canonical plaintext bytes.
    let row = server.store.get_record(&id).unwrap().unwrap();
    assert!(!row.public);
    assert!(row.encrypted_dek.as_ref().is_some_and(|d| !d.is_empty()));
    assert_ne!(row.ciphertext, serde_json::to_vec(&record).unwrap());

    // Public read returns exactly the input record.
    let (status, loaded) = server
        .get_json(&format!("/agents/alice/memory?id={id}"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(loaded["id"], id.as_str());
    assert_eq!(loaded["record"], record);

    // Unknown id → 404.
    let (status, _) = server
        .get_json("/agents/alice/memory?id=did:mesh:00/agent.memory.note/zzz")
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn memory_update_and_delete() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    let (_, stored) = server
        .admin_send_json(
            Method::POST,
            "/agents/alice/memory",
            &json!({
                "$type": "agent.memory.note",
                "summary": "v1",
                "createdAt": "2026-02-07T00:00:00Z",
            }),
        )
        .await;
    let id = stored["id"].as_str().unwrap().to_string();
    let before = server.store.get_record(&id).unwrap().unwrap();

    let (status, _) = server
        .admin_send_json(
            Method::PUT,
            &format!("/agents/alice/memory?id={id}"),
            &json!({
                "$type": "agent.memory.note",
                "summary": "v2",
                "createdAt": "2026-02-07T00:00:00Z",
            }),
        )
        .await;
    assert_eq!(status, 200);

    // Fresh DEK and nonce on every update.
    let after = server.store.get_record(&id).unwrap().unwrap();
    assert_ne!(before.nonce, after.nonce);
    assert_ne!(before.encrypted_dek, after.encrypted_dek);

    let (_, loaded) = server
        .get_json(&format!("/agents/alice/memory?id={id}"))
        .await;
    assert_eq!(loaded["record"]["summary"], "v2");

    let response = server
        .client
        .delete(server.url(&format!("/agents/alice/memory?id={id}")))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let (status, _) = server
        .get_json(&format!("/agents/alice/memory?id={id}"))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn sharing_gates_access() {
    let server = spawn_server().await;
    server.create_agent("alice").await;
    let bob = server.create_agent("bob").await;
    server.create_agent("carol").await;

    let record = json!({
        "$type": "agent.memory.note",
        "summary": "for bob",
        "createdAt": "2026-02-07T00:00:00Z",
    });
    let (_, stored) = server
        .admin_send_json(Method::POST, "/agents/alice/memory", &record)
        .await;
    let id = stored["id"].as_str().unwrap().to_string();

    // Before sharing: 404 for bob.
    let (status, _) = server
        .get_json(&format!("/agents/bob/shared?id={id}"))
        .await;
    assert_eq!(status, 404);

    let (status, _) = server
        .admin_send_json(
            Method::POST,
            "/agents/alice/share",
            &json!({
                "id": id,
                "recipientDid": bob["did"],
                "recipientPublicKey": bob["publicKeys"]["encryption"],
            }),
        )
        .await;
    assert_eq!(status, 200);

    // Bob reads the exact record; the listing shows it too.
    let (status, shared) = server
        .get_json(&format!("/agents/bob/shared?id={id}"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(shared["record"], record);

    let (_, listing) = server.get_json("/agents/bob/shared").await;
    assert_eq!(listing["entries"].as_array().unwrap().len(), 1);

    // Carol was never granted access.
    let (status, _) = server
        .get_json(&format!("/agents/carol/shared?id={id}"))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn inbox_rejects_recipient_mismatch() {
    let server = spawn_server().await;
    let alice = server.create_agent("alice").await;

    let stranger = json!({
        "$type": "agent.comms.message",
        "sender": "did:mesh:someone",
        "recipient": "did:mesh:someone-else",
        "content": { "kind": "text", "text": "hi" },
        "createdAt": "2026-02-07T00:00:00Z",
    });
    let (status, body) = server
        .admin_send_json(Method::POST, "/agents/alice/inbox", &stranger)
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "Recipient mismatch");

    // Nothing was inserted.
    let (_, listing) = server.get_json("/agents/alice/inbox").await;
    assert!(listing["entries"].as_array().unwrap().is_empty());

    // A correctly addressed message lands, with the default priority.
    let addressed = json!({
        "$type": "agent.comms.message",
        "sender": "did:mesh:someone",
        "recipient": alice["did"],
        "content": { "kind": "text", "text": "hello alice" },
        "createdAt": "2026-02-07T00:00:00Z",
    });
    let (status, _) = server
        .admin_send_json(Method::POST, "/agents/alice/inbox", &addressed)
        .await;
    assert_eq!(status, 200);

    let (_, listing) = server.get_json("/agents/alice/inbox").await;
    let entries = listing["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["record"]["priority"], 3);
}

#[tokio::test]
async fn config_patch_merges_and_clamps() {
    let server = spawn_server().await;
    let response = server
        .client
        .post(server.url("/agents"))
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "name": "alice", "personality": "curious" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let (status, patched) = server
        .admin_send_json(
            Method::PATCH,
            "/agents/alice/config",
            &json!({ "specialty": "maps", "loopIntervalMs": 10 }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(patched["personality"], "curious");
    assert_eq!(patched["specialty"], "maps");
    assert_eq!(patched["loopIntervalMs"], 5000);

    // Public read reflects the merge.
    let (status, config) = server.get_json("/agents/alice/config").await;
    assert_eq!(status, 200);
    assert_eq!(config["specialty"], "maps");
}

#[tokio::test]
async fn unauthenticated_mutations_rejected() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    // No token.
    let response = server
        .client
        .post(server.url("/agents/alice/memory"))
        .json(&json!({ "$type": "agent.memory.note", "summary": "s", "createdAt": "2026-02-07T00:00:00Z" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");

    // Wrong token.
    let response = server
        .client
        .post(server.url("/agents"))
        .bearer_auth("nope")
        .json(&json!({ "name": "mallory" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // The rejected create never reached the registry.
    assert!(server.store.registry_get("mallory").unwrap().is_none());

    // Public reads stay open.
    let (status, _) = server.get_json("/agents/alice/identity").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn cors_headers_on_every_response() {
    let server = spawn_server().await;

    // Preflight: 204, no auth.
    let response = server
        .client
        .request(Method::OPTIONS, server.url("/agents"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    assert!(response
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("Authorization"));

    // Success response.
    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));

    // Error responses carry the header too.
    let response = server
        .client
        .post(server.url("/agents"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));

    let response = server
        .client
        .get(server.url("/agents/ghost/identity"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn health_reports_ok_with_bindings() {
    let server = spawn_server().await;
    let (status, body) = server.get_json("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert!(body["missing"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_bodies_rejected() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    // Malformed JSON.
    let response = server
        .client
        .post(server.url("/agents/alice/memory"))
        .bearer_auth(ADMIN_TOKEN)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid JSON");

    // Lexicon failure with issues.
    let (status, body) = server
        .admin_send_json(
            Method::POST,
            "/agents/alice/memory",
            &json!({ "$type": "agent.memory.note", "createdAt": "2026-02-07T00:00:00Z" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid record");
    assert!(body["issues"]
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i["path"] == "summary"));
}

#[tokio::test]
async fn duplicate_agent_names_conflict() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    let response = server
        .client
        .post(server.url("/agents"))
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn concurrent_creates_yield_one_winner() {
    let server = spawn_server().await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let client = server.client.clone();
        let url = server.url("/agents");
        handles.push(tokio::spawn(async move {
            client
                .post(url)
                .bearer_auth(ADMIN_TOKEN)
                .json(&json!({ "name": "raced" }))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }));
    }
    let mut statuses: Vec<u16> = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    statuses.sort();
    assert_eq!(statuses, vec![200, 409]);
}

#[tokio::test]
async fn directory_serves_registered_keys() {
    let server = spawn_server().await;
    let alice = server.create_agent("alice").await;
    let did = alice["did"].as_str().unwrap();

    let (status, entry) = server.get_json(&format!("/directory/{did}")).await;
    assert_eq!(status, 200);
    assert_eq!(entry["publicKeys"]["encryption"], alice["publicKeys"]["encryption"]);

    let (status, _) = server.get_json("/directory/did:mesh:nobody").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn deleted_agent_disappears() {
    let server = spawn_server().await;
    server.create_agent("alice").await;

    let response = server
        .client
        .delete(server.url("/agents/alice"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let (status, _) = server.get_json("/agents/alice/identity").await;
    assert_eq!(status, 404);
    assert!(server.store.registry_get("alice").unwrap().is_none());
}
