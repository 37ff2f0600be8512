//! Benchmark orchestration: pool setup, worker spawn, reporting, shutdown.
//!
//! ## What
//!
//! - [`run`] drives one complete benchmark: install and truncate the
//!   schema, construct the selected strategy, start writer and reader
//!   groups behind barriers, report throughput about once per second, and
//!   shut everything down at the deadline.
//!
//! ## How
//!
//! Each worker group waits on its own barrier so all members start
//! together. Worker ids come from a single explicit sequence owned by the
//! runner. The partitioned strategy additionally gets a background vacuum
//! task and, when enabled, a long-lived transaction runs alongside to
//! exercise compaction under a pinned snapshot.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::postgres::PgPoolOptions;
use tokio::sync::{Barrier, Notify};
use tokio::task::JoinHandle;

use crate::admin::Admin;
use crate::buffer::{
    CursorSkipLockedBuffer, ForUpdateBuffer, PartitionedBuffer, QueueBuffer, RelaxedCommitBuffer,
    SkipLockedBuffer,
};
use crate::config::BenchConfig;
use crate::error::Result;
use crate::tx::TxManager;

use super::worker::{LongTransactionKeeper, Reader, WorkerStat, Writer};
use super::Strategy;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn build_buffer(
    config: &BenchConfig,
    strategy: Strategy,
) -> Result<(Arc<dyn QueueBuffer>, Option<Arc<PartitionedBuffer>>)> {
    let buffer = match strategy {
        Strategy::ForUpdate => (Arc::new(ForUpdateBuffer::new()) as Arc<dyn QueueBuffer>, None),
        Strategy::SkipLocked => (
            Arc::new(SkipLockedBuffer::new()) as Arc<dyn QueueBuffer>,
            None,
        ),
        Strategy::Cursor => (
            Arc::new(CursorSkipLockedBuffer::new(config.reset_every)?) as Arc<dyn QueueBuffer>,
            None,
        ),
        Strategy::CursorRelaxed => (
            Arc::new(RelaxedCommitBuffer::new(config.reset_every)?) as Arc<dyn QueueBuffer>,
            None,
        ),
        Strategy::Partitioned => {
            let partitioned = Arc::new(PartitionedBuffer::new(
                config.partition_count,
                config.reset_every,
                Duration::from_secs(config.vacuum_delay_secs),
            )?);
            (
                partitioned.clone() as Arc<dyn QueueBuffer>,
                Some(partitioned),
            )
        }
    };
    Ok(buffer)
}

/// Run one benchmark to completion.
pub async fn run(config: BenchConfig, strategy: Strategy) -> Result<()> {
    config.validate()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.dsn)
        .await?;
    let admin = Admin::new(pool.clone());
    admin.install().await?;
    admin.truncate_all().await?;

    let manager = TxManager::new(pool);
    let (buffer, partitioned) = build_buffer(&config, strategy)?;
    buffer.init(manager.clone())?;
    tracing::info!(
        "Starting {} benchmark: {} writers ({} ms delay), {} readers ({} ms delay, batch {}), {} s, sync commit {}",
        buffer.name(),
        config.writer_count,
        config.writer_delay_ms,
        config.reader_count,
        config.reader_delay_ms,
        config.reader_batch_size,
        config.duration_secs,
        buffer.is_sync_commit_enabled()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let write_stat = Arc::new(WorkerStat::new());
    let read_stat = Arc::new(WorkerStat::new());
    let writer_barrier = Arc::new(Barrier::new(config.writer_count));
    let reader_barrier = Arc::new(Barrier::new(config.reader_count));
    let allowance = Duration::from_millis(config.sync_replica_delay_ms);

    let mut next_worker_id = 0usize;
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    for _ in 0..config.writer_count {
        let writer = Writer::new(
            next_worker_id,
            buffer.clone(),
            write_stat.clone(),
            Duration::from_millis(config.writer_delay_ms),
            allowance,
        );
        next_worker_id += 1;
        workers.push(tokio::spawn(
            writer.run(writer_barrier.clone(), stop.clone()),
        ));
    }
    for _ in 0..config.reader_count {
        let reader = Reader::new(
            next_worker_id,
            buffer.clone(),
            read_stat.clone(),
            config.reader_batch_size,
            Duration::from_millis(config.reader_delay_ms),
            allowance,
        );
        next_worker_id += 1;
        workers.push(tokio::spawn(
            reader.run(reader_barrier.clone(), stop.clone()),
        ));
    }

    let vacuum_interrupt = Arc::new(Notify::new());
    let vacuum_task: Option<JoinHandle<()>> = partitioned.as_ref().map(|partitioned| {
        let partitioned = partitioned.clone();
        let interrupt = vacuum_interrupt.clone();
        tokio::spawn(async move { partitioned.run_vacuum_loop(interrupt).await })
    });

    let long_tx_active = Arc::new(AtomicBool::new(true));
    let long_tx_task: Option<JoinHandle<()>> = if config.long_tx_enabled {
        let keeper = LongTransactionKeeper::new(manager.clone());
        let active = long_tx_active.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = keeper.run(active).await {
                tracing::error!("Long transaction failed: {}", e);
            }
        }))
    } else {
        None
    };

    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);
    let mut last_report = Instant::now();
    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let interval = last_report.elapsed().as_secs_f64();
        last_report = Instant::now();
        let write = write_stat.take().await;
        let read = read_stat.take().await;
        let size = match buffer.size().await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!("Failed to read queue size: {}", e);
                -1
            }
        };
        tracing::info!(
            "write throughput {:.0}, read throughput {:.0}, size {} (avg overhead: write {:.2} ms, read {:.2} ms; log rate: write {}, read {})",
            write.count as f64 / interval,
            read.count as f64 / interval,
            size,
            write.avg_overhead_ms(),
            read.avg_overhead_ms(),
            write.ops,
            read.ops
        );
    }

    stop.store(true, Ordering::Relaxed);
    long_tx_active.store(false, Ordering::Relaxed);
    if let Some(partitioned) = &partitioned {
        partitioned.stop_vacuum();
    }
    vacuum_interrupt.notify_waiters();

    for worker in workers {
        await_task(worker, "worker").await;
    }
    if let Some(task) = vacuum_task {
        await_task(task, "vacuum task").await;
    }
    if let Some(task) = long_tx_task {
        await_task(task, "long transaction").await;
    }
    tracing::info!("Benchmark complete");
    Ok(())
}

async fn await_task(task: JoinHandle<()>, label: &str) {
    match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("A {} panicked: {}", label, e),
        Err(_) => tracing::warn!("A {} did not stop within the grace period", label),
    }
}
