//! Integration tests for the VeriCite HTTP endpoints
//!
//! Drives the router in-process against an in-memory ledger at low difficulty.

use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use vericite::api::build_api_router;
use vericite::config::LedgerConfig;
use vericite::persistence::InMemoryPersistence;
use vericite::{Ledger, Node};

fn test_server() -> TestServer {
    let config = LedgerConfig {
        difficulty: 1,
        ..LedgerConfig::default()
    };
    let ledger = Ledger::open(&config, Box::new(InMemoryPersistence::new()))
        .expect("Failed to open ledger");
    let node = Arc::new(Node::new(ledger));
    TestServer::new(build_api_router(node)).expect("Failed to create test server")
}

fn source() -> Value {
    json!({
        "url": "http://x",
        "hash_summary": "abc",
        "author": "alice",
        "validator": "bob",
        "tags": ["t1"]
    })
}

#[tokio::test]
async fn test_submit_mine_and_read_chain() {
    let server = test_server();

    let response = server.get("/api/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");

    // Fresh chain holds only genesis
    let chain: Vec<Value> = server.get("/chain").await.json();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0]["index"], 0);
    assert_eq!(chain[0]["previous_hash"], "0");

    let response = server.post("/submit").json(&source()).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["message"], "Source queued");
    assert_eq!(json["status"], "queued");
    assert!(json["id"].is_string());

    // Submitting does not mine
    let chain: Vec<Value> = server.get("/chain").await.json();
    assert_eq!(chain.len(), 1);

    let response = server.get("/mine").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["message"], "Block #1 mined");
    assert_eq!(json["index"], 1);

    let response = server.post("/mine").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["message"], "No sources to mine");
    assert!(json["index"].is_null());

    let chain: Vec<Value> = server.get("/chain").await.json();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1]["previous_hash"], chain[0]["hash"]);
    assert_eq!(chain[1]["url"], "http://x");
    assert_eq!(chain[1]["tags"], json!(["t1"]));
    assert!(chain[1]["hash"].as_str().unwrap().starts_with('0'));
    assert!(chain[1]["nonce"].is_u64());
    assert!(chain[1]["timestamp"].is_u64());
}

#[tokio::test]
async fn test_submit_with_missing_field_is_rejected() {
    let server = test_server();

    let response = server
        .post("/submit")
        .json(&json!({ "url": "http://x", "author": "alice" }))
        .await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().starts_with("Missing fields"));

    // Nothing was queued
    let response = server.get("/mine").await;
    let json: Value = response.json();
    assert_eq!(json["message"], "No sources to mine");
}

#[tokio::test]
async fn test_submission_status() {
    let server = test_server();

    let first: Value = server.post("/submit").json(&source()).await.json();
    let second: Value = server.post("/submit").json(&source()).await.json();
    assert_ne!(first["id"], second["id"]);

    let path = format!("/api/submissions/{}", second["id"].as_str().unwrap());
    let response = server.get(&path).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "queued");
    assert_eq!(json["position"], 1);

    server.get("/mine").await;
    let json: Value = server.get(&path).await.json();
    assert_eq!(json["position"], 0);

    let mined = format!("/api/submissions/{}", first["id"].as_str().unwrap());
    assert_eq!(server.get(&mined).await.status_code(), 404);

    let response = server.get("/api/submissions/not-a-uuid").await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_explorer_and_stats() {
    let server = test_server();

    server.post("/submit").json(&source()).await;
    server.get("/mine").await;

    let response = server.get("/").await;
    assert_eq!(response.status_code(), 200);
    let html = response.text();
    assert!(html.contains("Block #0"));
    assert!(html.contains("Block #1"));
    assert!(html.contains("http://x"));

    let response = server.get("/api/stats").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["submissions"], 1);
    assert_eq!(json["mine_requests"], 1);
    assert_eq!(json["blocks_mined"], 1);
    assert_eq!(json["chain_length"], 2);
    assert_eq!(json["queue_length"], 0);
    assert_eq!(json["difficulty"], 1);
    assert!(json["total_requests"].as_u64().unwrap() >= 3);
}
