//! Multi-poller delivery guarantees: concurrent polls never hand the same
//! event to two consumers, and concurrent traffic loses nothing.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use pgqbuf::{Event, QueueBuffer, SkipLockedBuffer, TxManager};

#[tokio::test]
async fn concurrent_polls_deliver_disjoint_batches() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer: Arc<dyn QueueBuffer> = Arc::new(SkipLockedBuffer::new());
    buffer.init(TxManager::new(db.pool.clone()))?;

    for i in 0..20 {
        buffer.offer(&format!("event_{}", i)).await?;
    }

    let mut handles = Vec::new();
    for _ in 0..2 {
        let buffer = Arc::clone(&buffer);
        handles.push(tokio::spawn(async move {
            let collected: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&collected);
            let mut consumer = move |events: Vec<Event>| -> BoxFuture<'static, ()> {
                sink.lock().unwrap().extend(events.iter().map(|event| event.id));
                // keep the poll transaction open long enough for the
                // other poller to run its select against held locks
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                })
            };
            buffer.poll(10, &mut consumer).await;
            let ids = collected.lock().unwrap().clone();
            ids
        }));
    }

    let first = handles.remove(0).await?;
    let second = handles.remove(0).await?;

    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
    let overlap = first.iter().filter(|id| second.contains(id)).count();
    assert_eq!(overlap, 0);
    Ok(())
}

#[tokio::test]
async fn no_events_lost_or_duplicated_under_concurrent_traffic(
) -> Result<(), Box<dyn std::error::Error>> {
    let db = common::setup().await?;
    let buffer: Arc<dyn QueueBuffer> = Arc::new(SkipLockedBuffer::new());
    buffer.init(TxManager::new(db.pool.clone()))?;

    let mut writers = Vec::new();
    for writer in 0..4 {
        let buffer = Arc::clone(&buffer);
        writers.push(tokio::spawn(async move {
            for n in 0..25 {
                let payload = format!("writer_{}_event_{}", writer, n);
                buffer.offer(&payload).await.unwrap();
            }
        }));
    }

    let collected: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let mut readers = Vec::new();
    for _ in 0..3 {
        let buffer = Arc::clone(&buffer);
        let collected = Arc::clone(&collected);
        readers.push(tokio::spawn(async move {
            for _ in 0..300 {
                let sink = Arc::clone(&collected);
                let mut consumer = move |events: Vec<Event>| -> BoxFuture<'static, ()> {
                    sink.lock()
                        .unwrap()
                        .extend(events.into_iter().map(|event| event.payload));
                    Box::pin(async {})
                };
                buffer.poll(7, &mut consumer).await;
                if collected.lock().unwrap().len() >= 100 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }));
    }

    for writer in writers {
        writer.await?;
    }
    for reader in readers {
        reader.await?;
    }

    let mut delivered = collected.lock().unwrap().clone();
    delivered.sort();
    let mut expected: Vec<String> = (0..4)
        .flat_map(|writer| (0..25).map(move |n| format!("writer_{}_event_{}", writer, n)))
        .collect();
    expected.sort();
    assert_eq!(delivered, expected);
    assert_eq!(buffer.size().await?, 0);
    Ok(())
}
