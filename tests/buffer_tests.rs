//! Per-strategy contract tests: delivery order, deletion, and the
//! empty-batch callback behavior each strategy commits to.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use pgqbuf::{
    CursorSkipLockedBuffer, Event, ForUpdateBuffer, PartitionedBuffer, QueueBuffer,
    RelaxedCommitBuffer, SkipLockedBuffer, TxManager,
};

/// Run one poll and return everything the consumer received.
async fn collect_poll(buffer: &dyn QueueBuffer, count: i64) -> Vec<Event> {
    let collected: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    let mut consumer = move |events: Vec<Event>| -> BoxFuture<'static, ()> {
        sink.lock().unwrap().extend(events);
        Box::pin(async {})
    };
    buffer.poll(count, &mut consumer).await;
    let events = collected.lock().unwrap().clone();
    events
}

/// Poll an empty queue and count how often the consumer ran.
async fn poll_empty_counting_calls(buffer: &dyn QueueBuffer) -> usize {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut consumer = move |events: Vec<Event>| -> BoxFuture<'static, ()> {
        assert!(events.is_empty());
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    };
    buffer.poll(10, &mut consumer).await;
    calls.load(Ordering::SeqCst)
}

fn payloads(events: &[Event]) -> Vec<&str> {
    events.iter().map(|event| event.payload.as_str()).collect()
}

/// Offer five events, drain them in two polls, and verify order and
/// deletion. Works for every strategy because a single poller sees the
/// same ascending-id scan in all of them.
async fn exercise_roundtrip(buffer: &dyn QueueBuffer) -> Result<(), Box<dyn std::error::Error>> {
    for i in 0..5 {
        buffer.offer(&format!("event_{}", i)).await?;
    }
    assert_eq!(buffer.size().await?, 5);

    let first = collect_poll(buffer, 3).await;
    assert_eq!(payloads(&first), ["event_0", "event_1", "event_2"]);

    let second = collect_poll(buffer, 3).await;
    assert_eq!(payloads(&second), ["event_3", "event_4"]);

    assert_eq!(buffer.size().await?, 0);
    Ok(())
}

#[tokio::test]
async fn for_update_delivers_and_deletes_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = ForUpdateBuffer::new();
    buffer.init(TxManager::new(db.pool.clone()))?;
    exercise_roundtrip(&buffer).await
}

#[tokio::test]
async fn skip_locked_delivers_and_deletes_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = SkipLockedBuffer::new();
    buffer.init(TxManager::new(db.pool.clone()))?;
    exercise_roundtrip(&buffer).await
}

#[tokio::test]
async fn cursor_delivers_and_deletes_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = CursorSkipLockedBuffer::new(100)?;
    buffer.init(TxManager::new(db.pool.clone()))?;
    exercise_roundtrip(&buffer).await
}

#[tokio::test]
async fn cursor_relaxed_delivers_and_deletes_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = RelaxedCommitBuffer::new(100)?;
    buffer.init(TxManager::new(db.pool.clone()))?;
    exercise_roundtrip(&buffer).await
}

#[tokio::test]
async fn partitioned_delivers_and_deletes_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    // one partition keeps every offer and poll on the same table, so the
    // single-poller ordering guarantee holds
    let buffer = PartitionedBuffer::new(1, 100, Duration::from_secs(3600))?;
    buffer.init(TxManager::new(db.pool.clone()))?;
    exercise_roundtrip(&buffer).await
}

#[tokio::test]
async fn for_update_invokes_consumer_on_empty_batch() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = ForUpdateBuffer::new();
    buffer.init(TxManager::new(db.pool.clone()))?;
    assert_eq!(poll_empty_counting_calls(&buffer).await, 1);
    Ok(())
}

#[tokio::test]
async fn skip_locked_skips_consumer_on_empty_batch() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = SkipLockedBuffer::new();
    buffer.init(TxManager::new(db.pool.clone()))?;
    assert_eq!(poll_empty_counting_calls(&buffer).await, 0);
    Ok(())
}

#[tokio::test]
async fn cursor_invokes_consumer_on_empty_batch() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = CursorSkipLockedBuffer::new(100)?;
    buffer.init(TxManager::new(db.pool.clone()))?;
    assert_eq!(poll_empty_counting_calls(&buffer).await, 1);
    Ok(())
}

#[tokio::test]
async fn cursor_relaxed_skips_consumer_on_empty_batch() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = RelaxedCommitBuffer::new(100)?;
    buffer.init(TxManager::new(db.pool.clone()))?;
    assert_eq!(poll_empty_counting_calls(&buffer).await, 0);
    Ok(())
}

#[tokio::test]
async fn partitioned_skips_consumer_on_empty_batch() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = PartitionedBuffer::new(3, 100, Duration::from_secs(3600))?;
    buffer.init(TxManager::new(db.pool.clone()))?;
    assert_eq!(poll_empty_counting_calls(&buffer).await, 0);
    Ok(())
}

#[tokio::test]
async fn cursor_reset_recovers_rows_skipped_while_locked() -> Result<(), Box<dyn std::error::Error>>
{
    let db = common::setup().await?;
    let buffer = CursorSkipLockedBuffer::new(3)?;
    buffer.init(TxManager::new(db.pool.clone()))?;

    buffer.offer("first").await?;
    buffer.offer("second").await?;

    // an open transaction holds a row lock on the oldest event, so the
    // skip-locked scan passes over it
    let mut blocker = db.pool.begin().await?;
    sqlx::query("SELECT id FROM queue_buffer ORDER BY id ASC LIMIT 1 FOR UPDATE")
        .fetch_one(&mut *blocker)
        .await?;

    let first_poll = collect_poll(&buffer, 10).await;
    assert_eq!(payloads(&first_poll), ["second"]);

    // the cursor now sits past the locked row, hiding it from this scan
    let second_poll = collect_poll(&buffer, 10).await;
    assert!(second_poll.is_empty());

    blocker.rollback().await?;

    // the third poll hits the reset cadence and scans from the start again
    let third_poll = collect_poll(&buffer, 10).await;
    assert_eq!(payloads(&third_poll), ["first"]);

    assert_eq!(buffer.size().await?, 0);
    Ok(())
}

#[tokio::test]
async fn double_init_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer = SkipLockedBuffer::new();
    buffer.init(TxManager::new(db.pool.clone()))?;
    assert!(buffer.init(TxManager::new(db.pool.clone())).is_err());
    Ok(())
}
