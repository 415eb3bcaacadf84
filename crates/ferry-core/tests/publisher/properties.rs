//! Whole-system properties: liveness, monotonicity, bounded retries, and
//! cycle aborts on storage failure.

use std::sync::Arc;

use ferry_core::OutboxError;
use ferry_core::app::{Operations, PublisherConfig};
use ferry_core::domain::{DeliveryError, EntryId, NewOutboxEntry, OutboxStatus, StoreError};
use ferry_core::ports::OutboxStore;
use rstest::rstest;

use crate::support::{World, config};

#[tokio::test]
async fn every_entry_is_eventually_published() {
    let world = World::new();
    let publisher = world.publisher(PublisherConfig {
        batch_size: 7,
        ..config()
    });
    for i in 0..40 {
        let destination = if i % 2 == 0 { "orders" } else { "billing" };
        world.insert(destination, 5).await;
    }
    for _ in 0..6 {
        world.sink.push_failure(DeliveryError::transient("throttled"));
    }

    let mut cycles = 0;
    while world.store.stats().await.unwrap().unpublished > 0 {
        publisher.run_cycle().await.unwrap();
        cycles += 1;
        assert!(cycles < 20, "outbox did not drain");
    }

    assert!(
        world
            .store
            .entries()
            .iter()
            .all(|e| e.status == OutboxStatus::Published)
    );
    assert_eq!(world.sink.delivered_total(), 40);
}

#[tokio::test]
async fn published_entries_never_change_status() {
    let world = World::new();
    let publisher = world.publisher(config());
    let ids = [
        world.insert("orders", 2).await,
        world.insert("orders", 2).await,
        world.insert("orders", 2).await,
    ];

    world.sink.push_failure(DeliveryError::transient("throttled"));
    world.sink.push_failure(DeliveryError::permanent("rejected"));
    for _ in 0..4 {
        publisher.run_cycle().await.unwrap();
    }
    // operator attempts on every entry, including published ones
    for id in ids {
        let _ = world.store.mark_failed(id).await;
        let _ = world.store.reset_retries(id).await;
    }
    publisher.run_cycle().await.unwrap();

    let history = world.store.history();
    assert!(history.iter().any(|c| c.to == OutboxStatus::Published));
    assert!(history.iter().all(|c| c.from != OutboxStatus::Published));
}

#[rstest]
#[case::one(1)]
#[case::three(3)]
#[case::five(5)]
#[tokio::test]
async fn always_transient_exhausts_after_max_retries_cycles(#[case] max_retries: u32) {
    let world = World::new();
    let publisher = world.publisher(config());
    let id = world.insert("orders", max_retries).await;
    world.sink.fail_always(DeliveryError::transient("unavailable"));

    for cycle in 1..=max_retries {
        assert_eq!(publisher.run_cycle().await.unwrap().fetched, 1);
        let entry = world.store.get(id).await.unwrap().unwrap();
        assert_eq!(entry.retry_count, cycle);
    }

    assert_eq!(publisher.run_cycle().await.unwrap().fetched, 0);
    assert_eq!(world.sink.send_count(), max_retries as u64);
    assert_eq!(world.store.stats().await.unwrap().stuck, 1);
}

#[tokio::test]
async fn configured_max_retries_bounds_entries_without_their_own() {
    let world = World::new();
    let publisher = Arc::new(world.publisher(PublisherConfig {
        max_retries: 2,
        ..config()
    }));
    let ops = Operations::new(Arc::clone(&publisher));
    let row = ops
        .enqueue(NewOutboxEntry::new(EntryId::generate(), "orders", b"{}".to_vec()))
        .await
        .unwrap();
    world.sink.fail_always(DeliveryError::transient("unavailable"));

    for _ in 0..2 {
        assert_eq!(publisher.run_cycle().await.unwrap().fetched, 1);
    }
    let entry = world.store.get(row.id).await.unwrap().unwrap();
    assert_eq!((entry.retry_count, entry.max_retries), (2, 2));
    assert!(entry.is_stuck());
    assert_eq!(publisher.run_cycle().await.unwrap().fetched, 0);
}

#[tokio::test]
async fn permanent_failure_is_excluded_after_one_cycle() {
    let world = World::new();
    let publisher = world.publisher(config());
    let id = world.insert("orders", 5).await;
    world.sink.fail_always(DeliveryError::permanent("queue does not exist"));

    let report = publisher.run_cycle().await.unwrap();
    assert_eq!(report.stuck, 1);

    let entry = world.store.get(id).await.unwrap().unwrap();
    assert_eq!(entry.retry_count, 5);
    assert_eq!(entry.status, OutboxStatus::Pending);

    assert_eq!(publisher.run_cycle().await.unwrap().fetched, 0);
    assert_eq!(world.sink.send_count(), 1);
}

#[tokio::test]
async fn storage_failure_aborts_cycle_and_next_tick_starts_over() {
    let world = World::new();
    let publisher = world.publisher(config());
    let id = world.insert("orders", 3).await;

    world.store.set_writes_available(false);
    let err = publisher.run_cycle().await.unwrap_err();
    assert!(matches!(err, OutboxError::Store(StoreError::Unavailable(_))));

    // no partial credit: the send happened but nothing was recorded
    let entry = world.store.get(id).await.unwrap().unwrap();
    assert_eq!(entry.status, OutboxStatus::Pending);
    assert_eq!(entry.retry_count, 0);

    world.store.set_writes_available(true);
    assert_eq!(publisher.run_cycle().await.unwrap().published, 1);

    // at-least-once: the lost acknowledgement caused a second delivery
    assert_eq!(world.sink.delivered("orders").len(), 2);
}

#[tokio::test]
async fn fetch_failure_aborts_before_any_send() {
    let world = World::new();
    let publisher = world.publisher(config());
    world.insert("orders", 3).await;

    world.store.set_available(false);
    assert!(publisher.run_cycle().await.is_err());
    assert_eq!(world.sink.send_count(), 0);

    world.store.set_available(true);
    assert_eq!(publisher.run_cycle().await.unwrap().published, 1);
}

#[tokio::test]
async fn lock_store_outage_aborts_cycle() {
    let world = World::new();
    let publisher = world.publisher(config());
    world.insert("orders", 3).await;

    world.locks.set_available(false);
    assert!(matches!(
        publisher.run_cycle().await,
        Err(OutboxError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(world.sink.send_count(), 0);
}
