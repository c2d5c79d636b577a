//! Integration tests for scheduled retrieval
//!
//! These tests verify:
//! - One long poll per tick, with the tick's wait time
//! - Zero-wait drain receives until a receive comes back empty
//! - The stream ends when the schedule does

mod common;

use common::{scripted_builder, Harness, Tracker};
use futures::{stream, StreamExt};
use std::time::Duration;

#[tokio::test]
async fn test_single_tick_drains_until_empty() {
    let tracker = Tracker::new();
    let stream = scripted_builder("orders", &[2, 1, 0], &tracker)
        .with_wait_times(|| stream::iter(vec![Duration::ZERO]))
        .open()
        .await
        .unwrap();

    let messages: Vec<_> = stream.into_stream().collect().await;

    let payloads: Vec<String> = messages
        .into_iter()
        .map(|m| m.unwrap().payload_str().unwrap().to_string())
        .collect();
    assert_eq!(payloads, vec!["m-0", "m-1", "m-2"]);
    assert_eq!(tracker.receive_waits(), vec![0, 0, 0]);
    assert_eq!(tracker.shutdowns(), vec!["queue"]);
}

#[tokio::test]
async fn test_each_tick_uses_its_wait_time() {
    let tracker = Tracker::new();
    let stream = scripted_builder("orders", &[1, 0, 0, 2, 0], &tracker)
        .with_wait_times(|| {
            stream::iter(vec![
                Duration::from_secs(5),
                Duration::from_secs(7),
                Duration::from_secs(3),
            ])
        })
        .open()
        .await
        .unwrap();

    let count = stream.into_stream().count().await;

    assert_eq!(count, 3);
    // Tick 1 drains once; tick 2 is empty, so no drain; tick 3 drains once.
    assert_eq!(tracker.receive_waits(), vec![5, 0, 7, 3, 0]);
}

#[tokio::test]
async fn test_empty_schedule_ends_without_receiving() {
    let tracker = Tracker::new();
    let mut stream = scripted_builder("orders", &[3], &tracker)
        .with_wait_times(|| stream::iter(Vec::<Duration>::new()))
        .open()
        .await
        .unwrap();

    assert!(stream.next().await.is_none());
    assert!(tracker.receive_waits().is_empty());
    assert!(!stream.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_interval_polls_memory_queue_without_waiting() {
    let harness = Harness::new();
    harness.send_inline("orders", &["a", "b"]).await;
    let mut stream = harness
        .builder("orders")
        .with_interval(Duration::from_secs(60))
        .open()
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    let second = stream.next().await.unwrap().unwrap();

    assert_eq!(first.payload_str().unwrap(), "a");
    assert_eq!(second.payload_str().unwrap(), "b");
    assert!(harness.tracker.receive_waits().iter().all(|wait| *wait == 0));
}
