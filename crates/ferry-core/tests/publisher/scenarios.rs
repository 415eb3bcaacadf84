//! End-to-end scenarios for single entries.

use std::time::Duration;

use ferry_core::domain::{DeliveryError, OutboxStats, OutboxStatus};
use ferry_core::impls::InMemorySink;
use ferry_core::ports::OutboxStore;

use crate::support::{World, config};

#[tokio::test]
async fn published_on_first_cycle_with_healthy_sink() {
    let world = World::new();
    let publisher = world.publisher(config());
    let id = world.insert_payload("orders", br#"{"a":1}"#, 5).await;

    let report = publisher.run_cycle().await.unwrap();
    assert_eq!(report.published, 1);

    let entry = world.store.get(id).await.unwrap().unwrap();
    assert_eq!(entry.status, OutboxStatus::Published);
    assert!(entry.published_at.is_some());
    assert_eq!(entry.last_error, None);
    assert_eq!(world.store.stats().await.unwrap().unpublished, 0);
    assert_eq!(world.sink.delivered("orders"), vec![br#"{"a":1}"#.to_vec()]);
}

#[tokio::test]
async fn exhausted_entry_is_not_attempted_again() {
    let world = World::new();
    let publisher = world.publisher(config());
    let id = world.insert("orders", 2).await;

    // two transient failures, then the sink would succeed
    world.sink.push_failure(DeliveryError::transient("throttled"));
    world.sink.push_failure(DeliveryError::transient("throttled"));

    publisher.run_cycle().await.unwrap();
    publisher.run_cycle().await.unwrap();

    let entry = world.store.get(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 2);
    assert_eq!(entry.status, OutboxStatus::Pending);

    // retry_count < max_retries no longer holds: third cycle skips it
    let third = publisher.run_cycle().await.unwrap();
    assert_eq!(third.fetched, 0);
    assert_eq!(world.sink.send_count(), 2);
    assert_eq!(
        world.store.stats().await.unwrap(),
        OutboxStats { unpublished: 0, stuck: 1 }
    );

    let entry = world.store.get(id).await.unwrap().unwrap();
    assert_eq!(entry.status, OutboxStatus::Pending);
    assert!(entry.last_error.as_deref().unwrap().contains("throttled"));
}

#[tokio::test]
async fn reset_after_exhaustion_delivers() {
    let world = World::new();
    let publisher = world.publisher(config());
    let id = world.insert("orders", 1).await;

    world.sink.push_failure(DeliveryError::transient("down"));
    publisher.run_cycle().await.unwrap();
    assert!(world.store.get(id).await.unwrap().unwrap().is_stuck());

    world.store.reset_retries(id).await.unwrap();
    assert_eq!(publisher.run_cycle().await.unwrap().published, 1);
    assert_eq!(
        world.store.get(id).await.unwrap().unwrap().status,
        OutboxStatus::Published
    );
}

#[tokio::test(start_paused = true)]
async fn send_timeout_counts_as_transient() {
    let world = World::with_sink(InMemorySink::new().with_latency(Duration::from_secs(20)));
    let publisher = world.publisher(config());
    let id = world.insert("orders", 3).await;

    let report = publisher.run_cycle().await.unwrap();
    assert_eq!(report.retried, 1);

    let entry = world.store.get(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 1);
    assert_eq!(entry.status, OutboxStatus::Pending);
    assert!(entry.last_error.unwrap().contains("timed out"));
    assert_eq!(world.sink.delivered_total(), 0);
}

#[tokio::test]
async fn failed_by_operator_is_never_fetched() {
    let world = World::new();
    let publisher = world.publisher(config());
    let id = world.insert("orders", 3).await;

    world.store.mark_failed(id).await.unwrap();
    assert_eq!(publisher.run_cycle().await.unwrap().fetched, 0);
    assert_eq!(world.store.stats().await.unwrap(), OutboxStats::default());
}

#[tokio::test]
async fn backoff_delays_the_next_attempt() {
    let mut cfg = config();
    cfg.backoff = Some(ferry_core::app::Backoff::with_base(Duration::from_secs(60)));
    let world = World::new();
    let publisher = world.publisher(cfg);
    let id = world.insert("orders", 5).await;

    world.sink.push_failure(DeliveryError::transient("throttled"));
    publisher.run_cycle().await.unwrap();

    // not due yet
    assert_eq!(publisher.run_cycle().await.unwrap().fetched, 0);

    world.clock.advance(chrono::Duration::seconds(61));
    assert_eq!(publisher.run_cycle().await.unwrap().published, 1);
    assert_eq!(
        world.store.get(id).await.unwrap().unwrap().status,
        OutboxStatus::Published
    );
}
