//! Benchmark workers: producers, consumers, and their shared statistics.
//!
//! ## What
//!
//! - [`Writer`] offers one payload per iteration, then sleeps its inner
//!   delay.
//! - [`Reader`] polls one batch per iteration; its consumer callback sleeps
//!   the inner delay inside the poll transaction, modeling slow downstream
//!   processing while rows are held.
//! - [`WorkerStat`] accumulates per-interval throughput and overhead
//!   numbers for the reporting loop.
//! - [`LongTransactionKeeper`] pins an open transaction for the duration of
//!   the run, holding back the xmin horizon the way a straggler client
//!   would.
//!
//! ## How
//!
//! Workers are spawned by the runner with an explicit id, a shared start
//! barrier, and a shared stop flag. Overhead is measured as wall time per
//! iteration minus the configured inner delay and the sync-replica
//! allowance, so the reported number isolates queue cost from intentional
//! sleeps.
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::{Barrier, Mutex};
use uuid::Uuid;

use crate::buffer::QueueBuffer;
use crate::error::Result;
use crate::tx::TxManager;
use crate::types::Event;

#[derive(Debug, Default)]
struct StatCell {
    delta_ns: i64,
    count: i64,
    ops: i64,
}

/// Snapshot of one reporting interval, returned by [`WorkerStat::take`].
#[derive(Debug, Clone, Copy)]
pub struct StatSnapshot {
    /// Accumulated overhead nanoseconds across recorded operations
    pub delta_ns: i64,
    /// Events offered or consumed
    pub count: i64,
    /// Operations recorded
    pub ops: i64,
}

impl StatSnapshot {
    /// Average overhead per recorded operation, in milliseconds.
    pub fn avg_overhead_ms(&self) -> f64 {
        if self.ops == 0 {
            return 0.0;
        }
        self.delta_ns as f64 / self.ops as f64 / 1_000_000.0
    }
}

/// Shared accumulator for one worker group.
#[derive(Debug, Default)]
pub struct WorkerStat {
    cell: Mutex<StatCell>,
}

impl WorkerStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one operation's overhead and event count.
    pub async fn record(&self, delta_ns: i64, count: i64) {
        let mut cell = self.cell.lock().await;
        cell.delta_ns += delta_ns;
        cell.count += count;
        cell.ops += 1;
    }

    /// Return the accumulated interval and reset the accumulator.
    pub async fn take(&self) -> StatSnapshot {
        let mut cell = self.cell.lock().await;
        let snapshot = StatSnapshot {
            delta_ns: cell.delta_ns,
            count: cell.count,
            ops: cell.ops,
        };
        *cell = StatCell::default();
        snapshot
    }
}

/// Producer worker: offer, sleep, repeat until stopped.
pub struct Writer {
    id: usize,
    buffer: Arc<dyn QueueBuffer>,
    stat: Arc<WorkerStat>,
    delay: Duration,
    allowance: Duration,
}

impl Writer {
    pub fn new(
        id: usize,
        buffer: Arc<dyn QueueBuffer>,
        stat: Arc<WorkerStat>,
        delay: Duration,
        allowance: Duration,
    ) -> Self {
        Self {
            id,
            buffer,
            stat,
            delay,
            allowance,
        }
    }

    pub async fn run(self, start: Arc<Barrier>, stop: Arc<AtomicBool>) {
        start.wait().await;
        tracing::debug!("Writer {} started", self.id);
        while !stop.load(Ordering::Relaxed) {
            let payload = format!("payload_{}", Uuid::new_v4());
            let began = Instant::now();
            if let Err(e) = self.buffer.offer(&payload).await {
                tracing::error!("Writer {} failed to offer: {}", self.id, e);
            }
            tokio::time::sleep(self.delay).await;
            let overhead_ns = began.elapsed().as_nanos() as i64
                - self.delay.as_nanos() as i64
                - self.allowance.as_nanos() as i64;
            self.stat.record(overhead_ns, 1).await;
        }
        tracing::debug!("Writer {} stopped", self.id);
    }
}

/// Consumer worker: poll one batch per iteration until stopped.
pub struct Reader {
    id: usize,
    buffer: Arc<dyn QueueBuffer>,
    stat: Arc<WorkerStat>,
    batch_size: i64,
    delay: Duration,
    allowance: Duration,
}

impl Reader {
    pub fn new(
        id: usize,
        buffer: Arc<dyn QueueBuffer>,
        stat: Arc<WorkerStat>,
        batch_size: i64,
        delay: Duration,
        allowance: Duration,
    ) -> Self {
        Self {
            id,
            buffer,
            stat,
            batch_size,
            delay,
            allowance,
        }
    }

    pub async fn run(self, start: Arc<Barrier>, stop: Arc<AtomicBool>) {
        start.wait().await;
        tracing::debug!("Reader {} started", self.id);
        while !stop.load(Ordering::Relaxed) {
            let delivered = Arc::new(AtomicI64::new(0));
            let delay = self.delay;
            let delivered_ref = delivered.clone();
            let mut consumer = move |events: Vec<Event>| -> BoxFuture<'static, ()> {
                let delivered = delivered_ref.clone();
                Box::pin(async move {
                    delivered.fetch_add(events.len() as i64, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                })
            };
            let began = Instant::now();
            self.buffer.poll(self.batch_size, &mut consumer).await;
            let count = delivered.load(Ordering::Relaxed);
            // strategies that skip the callback on empty batches record nothing
            if count > 0 {
                let overhead_ns = began.elapsed().as_nanos() as i64
                    - self.delay.as_nanos() as i64
                    - self.allowance.as_nanos() as i64;
                self.stat.record(overhead_ns, count).await;
            }
        }
        tracing::debug!("Reader {} stopped", self.id);
    }
}

/// Holds one transaction open for the whole run.
///
/// The open snapshot keeps the store from reclaiming deleted rows, which
/// is exactly the adversarial condition the partitioned strategy's
/// compaction exists to fight.
pub struct LongTransactionKeeper {
    manager: TxManager,
}

impl LongTransactionKeeper {
    pub fn new(manager: TxManager) -> Self {
        Self { manager }
    }

    /// Open a transaction and hold it until `active` clears.
    pub async fn run(self, active: Arc<AtomicBool>) -> Result<()> {
        let mut session = self.manager.begin().await?;
        let txid: i64 = sqlx::query_scalar("SELECT txid_current();")
            .fetch_one(session.tx())
            .await?;
        tracing::info!("Long transaction {} opened", txid);
        while active.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        session.commit().await?;
        tracing::info!("Long transaction {} committed", txid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stat_accumulates_and_resets() {
        let stat = WorkerStat::new();
        stat.record(1_000_000, 3).await;
        stat.record(3_000_000, 2).await;

        let snapshot = stat.take().await;
        assert_eq!(snapshot.count, 5);
        assert_eq!(snapshot.ops, 2);
        assert_eq!(snapshot.delta_ns, 4_000_000);
        assert!((snapshot.avg_overhead_ms() - 2.0).abs() < f64::EPSILON);

        let drained = stat.take().await;
        assert_eq!(drained.count, 0);
        assert_eq!(drained.ops, 0);
        assert_eq!(drained.avg_overhead_ms(), 0.0);
    }
}
