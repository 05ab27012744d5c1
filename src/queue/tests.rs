use super::{BoundedQueue, PopOutcome};
use crate::persistence::MemoryConnector;
use crate::relay::message::Message;
use crate::test_support::{QUEUE, ScriptedConnector, connected_queue, queue_config};
use crate::utils::error::QueueError;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

fn serialized(content: &str) -> String {
    serde_json::to_string(&Message::new("test", content)).unwrap()
}

#[tokio::test]
async fn test_bounded_eviction_keeps_newest_in_order() {
    let (queue, store) = connected_queue(3, 5).await;

    for i in 1..=7 {
        assert!(queue.push(&serialized(&format!("m{i}"))).await);
    }

    assert_eq!(queue.size().await, 5);
    let expected: Vec<String> = (3..=7).map(|i| serialized(&format!("m{i}"))).collect();
    assert_eq!(store.entries(), expected);
}

#[tokio::test]
async fn test_push_under_capacity_evicts_nothing() {
    let (queue, _store) = connected_queue(3, 5).await;
    for i in 0..5 {
        assert!(queue.push(&serialized(&i.to_string())).await);
    }
    assert_eq!(queue.size().await, 5);
}

#[tokio::test]
async fn test_push_retry_exhaustion() {
    let (queue, store) = connected_queue(3, 5).await;
    store.failing_pushes.store(usize::MAX, Ordering::SeqCst);

    let started = Instant::now();
    assert!(!queue.push(&serialized("lost")).await);

    assert_eq!(store.pushes(), 3);
    // Two pauses of 20ms between three attempts.
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert!(store.entries().is_empty());
}

#[tokio::test]
async fn test_push_recovers_on_last_attempt() {
    let (queue, store) = connected_queue(3, 5).await;
    store.failing_pushes.store(2, Ordering::SeqCst);

    assert!(queue.push(&serialized("eventually")).await);
    assert_eq!(store.pushes(), 3);
    assert_eq!(store.entries(), vec![serialized("eventually")]);
}

#[tokio::test]
async fn test_trim_failure_retries_trim_only() {
    let (queue, store) = connected_queue(3, 5).await;
    store.failing_trims.store(1, Ordering::SeqCst);

    assert!(queue.push(&serialized("once")).await);
    assert_eq!(store.pushes(), 1);
    assert_eq!(store.trim_calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.entries(), vec![serialized("once")]);
}

#[tokio::test]
async fn test_trim_never_succeeding_reports_failure_without_duplicates() {
    let (queue, store) = connected_queue(3, 5).await;
    store.failing_trims.store(usize::MAX, Ordering::SeqCst);

    assert!(!queue.push(&serialized("kept")).await);
    assert_eq!(store.pushes(), 1);
    assert_eq!(store.entries().len(), 1);
}

#[tokio::test]
async fn test_pop_round_trip() {
    let (queue, _store) = connected_queue(3, 5).await;
    let mut message = Message::new("serviceB", "hello");
    message.extra.insert("priority".to_string(), json!(2));

    assert!(queue.push(&serde_json::to_string(&message).unwrap()).await);
    let popped = queue.pop(Duration::from_millis(50)).await.unwrap();
    assert_eq!(popped, Some(message));
}

#[tokio::test]
async fn test_pop_is_fifo() {
    let (queue, _store) = connected_queue(3, 5).await;
    for content in ["first", "second"] {
        assert!(queue.push(&serialized(content)).await);
    }
    let timeout = Duration::from_millis(20);
    assert_eq!(queue.pop(timeout).await.unwrap().unwrap().content, "first");
    assert_eq!(queue.pop(timeout).await.unwrap().unwrap().content, "second");
}

#[tokio::test]
async fn test_pop_empty_and_failure_look_the_same() {
    let (queue, store) = connected_queue(3, 5).await;
    let timeout = Duration::from_millis(20);

    assert_eq!(queue.pop(timeout).await, Ok(None));

    store.failing_pops.store(1, Ordering::SeqCst);
    assert!(queue.push(&serialized("still there")).await);
    assert_eq!(queue.pop(timeout).await, Ok(None));
    // No retry happened inside pop; the entry is still queued.
    assert_eq!(store.pops(), 2);
    assert_eq!(queue.size().await, 1);
}

#[tokio::test]
async fn test_pop_outcome_keeps_causes_apart() {
    let (queue, store) = connected_queue(3, 5).await;
    let timeout = Duration::from_millis(20);

    assert!(matches!(queue.pop_outcome(timeout).await, PopOutcome::Empty));

    store.failing_pops.store(1, Ordering::SeqCst);
    assert!(matches!(queue.pop_outcome(timeout).await, PopOutcome::Failed(_)));

    assert!(queue.push("not json").await);
    assert!(matches!(queue.pop_outcome(timeout).await, PopOutcome::Failed(_)));
}

#[tokio::test]
async fn test_pop_deadline_overrun_propagates() {
    let (queue, store) = connected_queue(3, 5).await;
    store.hang_pops.store(true, Ordering::SeqCst);

    assert_eq!(
        queue.pop(Duration::from_millis(20)).await,
        Err(QueueError::TimedOut)
    );
}

#[tokio::test]
async fn test_size_is_zero_on_failure() {
    let (queue, store) = connected_queue(3, 5).await;
    assert!(queue.push(&serialized("x")).await);
    store.fail_llen.store(true, Ordering::SeqCst);
    assert_eq!(queue.size().await, 0);
}

#[tokio::test]
async fn test_connect_retries_then_succeeds() {
    let connector = Arc::new(ScriptedConnector::new(2));
    let queue = BoundedQueue::new(queue_config(3, 5), connector.clone());

    assert!(queue.connect().await);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    assert!(queue.is_connected().await);
}

#[tokio::test]
async fn test_connect_gives_up() {
    let connector = Arc::new(ScriptedConnector::new(usize::MAX));
    let queue = BoundedQueue::new(queue_config(2, 5), connector.clone());

    assert!(!queue.connect().await);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    assert!(!queue.is_connected().await);

    // Operations on a disconnected queue fail quietly.
    assert!(!queue.push(&serialized("nowhere")).await);
    assert_eq!(queue.pop(Duration::from_millis(10)).await, Ok(None));
    assert_eq!(queue.size().await, 0);
}

#[tokio::test]
async fn test_disconnect() {
    let queue = BoundedQueue::new(queue_config(1, 5), Arc::new(MemoryConnector::default()));
    assert!(!queue.disconnect().await);

    assert!(queue.connect().await);
    assert!(queue.disconnect().await);
    assert!(!queue.is_connected().await);
    assert!(!queue.disconnect().await);
}

#[tokio::test]
async fn test_disconnect_reports_close_failure() {
    let (queue, store) = connected_queue(1, 5).await;
    store.fail_close.store(true, Ordering::SeqCst);
    assert!(!queue.disconnect().await);
}

#[tokio::test]
async fn test_memory_queue_survives_reconnect() {
    let queue = BoundedQueue::new(queue_config(1, 5), Arc::new(MemoryConnector::default()));
    assert!(queue.connect().await);
    assert!(queue.push(&serialized("kept")).await);
    assert!(queue.disconnect().await);

    assert!(queue.connect().await);
    assert_eq!(queue.size().await, 1);
    assert_eq!(queue.name(), QUEUE);
}
