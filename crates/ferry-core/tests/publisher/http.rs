//! Operational endpoints over a real socket.

use std::sync::Arc;

use ferry_core::app::Operations;
use ferry_core::domain::{DeliveryError, EntryId, OutboxStatus};
use ferry_core::ports::OutboxStore;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::support::{World, config};

struct Server {
    base: String,
    world: World,
}

async fn start() -> Server {
    let world = World::new();
    let ops = Operations::new(Arc::new(world.publisher(config())));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, ferry_core::http::router(ops)).await.unwrap();
    });

    Server {
        base: format!("http://{addr}/outbox"),
        world,
    }
}

async fn get_json(url: String) -> (StatusCode, Value) {
    let res = reqwest::get(url).await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn post_json(url: String) -> (StatusCode, Value) {
    let res = reqwest::Client::new().post(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn stats_counts_unpublished_and_stuck() {
    let server = start().await;
    server.world.insert("orders", 5).await;
    server.world.insert("orders", 5).await;

    let (status, body) = get_json(format!("{}/stats", server.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "unpublished": 2, "stuck": 0 }));
}

#[tokio::test]
async fn publish_runs_one_cycle() {
    let server = start().await;
    server.world.insert("orders", 5).await;
    server.world.insert("orders", 5).await;
    server
        .world
        .sink
        .push_failure(DeliveryError::permanent("no such queue"));

    let (status, body) = post_json(format!("{}/publish", server.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "published": 1, "failed": 1 }));

    let (_, stats) = get_json(format!("{}/stats", server.base)).await;
    assert_eq!(stats, json!({ "unpublished": 0, "stuck": 1 }));
}

#[tokio::test]
async fn health_reports_up_and_idle() {
    let server = start().await;

    let (status, body) = get_json(format!("{}/health", server.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "UP", "state": "IDLE" }));
}

#[tokio::test]
async fn stuck_lists_last_error_without_payload() {
    let server = start().await;
    let id = server.world.insert("orders", 1).await;
    server
        .world
        .sink
        .push_failure(DeliveryError::transient("broker restarting"));
    post_json(format!("{}/publish", server.base)).await;

    let (status, body) = get_json(format!("{}/stuck?limit=10", server.base)).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!(id.to_storage()));
    assert_eq!(rows[0]["retry_count"], json!(1));
    assert!(
        rows[0]["last_error"]
            .as_str()
            .unwrap()
            .contains("broker restarting")
    );
    assert!(rows[0].get("payload").is_none());
}

#[tokio::test]
async fn fail_then_reset_is_a_conflict() {
    let server = start().await;
    let id = server.world.insert("orders", 5).await;

    let (status, body) = post_json(format!("{}/entries/{id}/fail", server.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("FAILED"));
    let entry = server.world.store.get(id).await.unwrap().unwrap();
    assert_eq!(entry.status, OutboxStatus::Failed);

    let (status, _) = post_json(format!("{}/entries/{id}/reset", server.base)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn reset_makes_stuck_entry_eligible() {
    let server = start().await;
    let id = server.world.insert("orders", 1).await;
    server
        .world
        .sink
        .push_failure(DeliveryError::permanent("rejected"));
    post_json(format!("{}/publish", server.base)).await;

    let (status, body) = post_json(format!("{}/entries/{id}/reset", server.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["retry_count"], json!(0));

    let (_, summary) = post_json(format!("{}/publish", server.base)).await;
    assert_eq!(summary, json!({ "published": 1, "failed": 0 }));
}

#[tokio::test]
async fn published_entry_cannot_be_failed() {
    let server = start().await;
    let id = server.world.insert("orders", 5).await;
    post_json(format!("{}/publish", server.base)).await;

    let (status, body) = post_json(format!("{}/entries/{id}/fail", server.base)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let server = start().await;

    let unknown = EntryId::generate();
    let (status, _) = post_json(format!("{}/entries/{unknown}/fail", server.base)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(format!("{}/entries/not-an-id/reset", server.base)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
