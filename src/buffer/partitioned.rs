//! Horizontally partitioned strategy with background compaction.
//!
//! The queue is split across up to three identical tables. Every producer
//! or consumer call first takes a shared advisory lock on one partition,
//! chosen by shuffling the partition list and trying each in turn under a
//! wall-clock deadline. The background pseudo-vacuum takes the same lock in
//! exclusive mode, so compaction never overlaps live traffic on the
//! partition it is rewriting while other partitions keep serving.
//!
//! ## What
//!
//! - [`PartitionedBuffer`] implements the queue contract over the partition
//!   set, with one cursor and reset counter per partition.
//! - The pseudo-vacuum copies a partition's live rows aside, truncates the
//!   table, and reinserts them, reclaiming bloat left by delete traffic.
//!
//! ## How
//!
//! Construct with the partition count (validated eagerly), `init` like any
//! other strategy, and optionally spawn [`PartitionedBuffer::run_vacuum_loop`]
//! as a background task. Stop it with [`PartitionedBuffer::stop_vacuum`] or
//! by notifying the interrupt handle.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::Notify;

use crate::constants::{
    partition_lock_key, partition_table, COUNT_EVENTS, DELETE_EVENT_BATCH,
    EXCLUSIVE_PARTITION_LOCK, INSERT_EVENT, LOCK_TABLE_EXCLUSIVE, MAX_PARTITION_COUNT,
    PARTITION_LOCK_TIMEOUT_SECS, RESTORE_FROM_TEMP, SELECT_AFTER_CURSOR, SET_LOCK_TIMEOUT,
    SET_STATEMENT_TIMEOUT, SYNC_COMMIT_OFF, COPY_TO_TEMP, TRUNCATE_QUEUE_STATEMENT,
    TRY_SHARED_PARTITION_LOCK, VACUUM_ANALYZE, VACUUM_STATEMENT_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::tx::{Session, TxManager};
use crate::types::Event;

use super::{BatchConsumer, BufferCore, PollCursor, QueueBuffer};

/// One shard of the partitioned queue with its pre-rendered statements.
struct Partition {
    index: usize,
    table: String,
    lock_key: i64,
    cursor: PollCursor,
    insert_sql: String,
    select_sql: String,
    delete_sql: String,
    count_sql: String,
    truncate_sql: String,
    vacuum_sql: String,
    lock_table_sql: String,
    copy_sql: String,
    restore_sql: String,
}

impl Partition {
    fn new(index: usize, reset_every: u64) -> Result<Self> {
        let table = partition_table(index);
        Ok(Self {
            index,
            lock_key: partition_lock_key(index),
            cursor: PollCursor::new(reset_every)?,
            insert_sql: INSERT_EVENT.replace("{table}", &table),
            select_sql: SELECT_AFTER_CURSOR.replace("{table}", &table),
            delete_sql: DELETE_EVENT_BATCH.replace("{table}", &table),
            count_sql: COUNT_EVENTS.replace("{table}", &table),
            truncate_sql: TRUNCATE_QUEUE_STATEMENT.replace("{table}", &table),
            vacuum_sql: VACUUM_ANALYZE.replace("{table}", &table),
            lock_table_sql: LOCK_TABLE_EXCLUSIVE.replace("{table}", &table),
            copy_sql: COPY_TO_TEMP.replace("{table}", &table),
            restore_sql: RESTORE_FROM_TEMP.replace("{table}", &table),
            table,
        })
    }
}

/// Strategy 5: advisory-sharded partitions with relaxed-durability polls
/// and background compaction. Consumer skipped on empty batches.
pub struct PartitionedBuffer {
    core: BufferCore,
    partitions: Vec<Partition>,
    vacuum_delay: Duration,
    vacuum_stopped: AtomicBool,
    set_lock_timeout_sql: String,
    set_statement_timeout_sql: String,
}

impl PartitionedBuffer {
    /// Build a buffer over `partition_count` tables.
    ///
    /// Counts outside `1..=3` are rejected before any store interaction.
    pub fn new(partition_count: usize, reset_every: u64, vacuum_delay: Duration) -> Result<Self> {
        if partition_count == 0 || partition_count > MAX_PARTITION_COUNT {
            return Err(Error::InvalidConfig {
                field: "partition_count".to_string(),
                message: format!(
                    "partition count must be between 1 and {}",
                    MAX_PARTITION_COUNT
                ),
            });
        }
        let partitions = (0..partition_count)
            .map(|index| Partition::new(index, reset_every))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            core: BufferCore::new(false),
            partitions,
            vacuum_delay,
            vacuum_stopped: AtomicBool::new(false),
            set_lock_timeout_sql: SET_LOCK_TIMEOUT.replace("{timeout}", VACUUM_STATEMENT_TIMEOUT),
            set_statement_timeout_sql: SET_STATEMENT_TIMEOUT
                .replace("{timeout}", VACUUM_STATEMENT_TIMEOUT),
        })
    }

    /// Take a shared advisory lock on any partition, trying them in random
    /// order until one succeeds or the deadline expires.
    ///
    /// The lock is transaction-scoped: it is released when `session`
    /// commits or rolls back.
    async fn acquire_partition(&self, session: &mut Session) -> Result<&Partition> {
        let deadline = Instant::now() + Duration::from_secs(PARTITION_LOCK_TIMEOUT_SECS);
        let mut order: Vec<usize> = (0..self.partitions.len()).collect();
        loop {
            {
                let mut rng = rand::thread_rng();
                order.shuffle(&mut rng);
            }
            for &index in &order {
                let partition = &self.partitions[index];
                let locked: bool = sqlx::query_scalar(TRY_SHARED_PARTITION_LOCK)
                    .bind(partition.lock_key)
                    .fetch_one(session.tx())
                    .await?;
                if locked {
                    tracing::trace!("Acquired shared lock on partition {}", partition.index);
                    return Ok(partition);
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    operation: "acquire shared partition lock".to_string(),
                });
            }
        }
    }

    /// Ask the vacuum loop to exit at its next wakeup.
    pub fn stop_vacuum(&self) {
        self.vacuum_stopped.store(true, Ordering::Relaxed);
    }

    /// Periodic compaction driver.
    ///
    /// Sleeps `vacuum_delay` between cycles. The stop flag is checked once
    /// per sleep; notifying `interrupt` exits immediately without running a
    /// pending cycle.
    pub async fn run_vacuum_loop(&self, interrupt: Arc<Notify>) {
        loop {
            tokio::select! {
                _ = interrupt.notified() => {
                    tracing::info!("Pseudo vacuum task interrupted");
                    return;
                }
                _ = tokio::time::sleep(self.vacuum_delay) => {}
            }
            if self.vacuum_stopped.load(Ordering::Relaxed) {
                tracing::info!("Pseudo vacuum task stopped");
                return;
            }
            if let Err(e) = self.run_pseudo_vacuum().await {
                tracing::error!("Pseudo vacuum cycle failed: {}", e);
            }
        }
    }

    /// Run one compaction cycle over all partitions in ascending order.
    ///
    /// A single partition's failure is logged and the cycle proceeds to
    /// the next partition.
    pub async fn run_pseudo_vacuum(&self) -> Result<()> {
        let manager = self.core.manager()?;
        let started = Instant::now();
        for partition in &self.partitions {
            if let Err(e) = self.vacuum_partition(manager, partition).await {
                tracing::error!("Pseudo vacuum failed for {}: {}", partition.table, e);
            }
        }
        tracing::info!(
            "Pseudo vacuum cycle over {} partitions finished in {} ms",
            self.partitions.len(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    async fn vacuum_partition(&self, manager: &TxManager, partition: &Partition) -> Result<()> {
        // VACUUM cannot run inside a transaction block
        sqlx::raw_sql(&partition.vacuum_sql)
            .execute(manager.pool())
            .await?;
        let mut session = manager.begin().await?;
        match self.compact(&mut session, partition).await {
            Ok(()) => session.commit().await,
            Err(e) => {
                session.rollback_safely().await;
                Err(e)
            }
        }
    }

    async fn compact(&self, session: &mut Session, partition: &Partition) -> Result<()> {
        sqlx::query(&self.set_lock_timeout_sql)
            .execute(session.tx())
            .await?;
        sqlx::query(&self.set_statement_timeout_sql)
            .execute(session.tx())
            .await?;
        sqlx::query(EXCLUSIVE_PARTITION_LOCK)
            .bind(partition.lock_key)
            .execute(session.tx())
            .await?;
        sqlx::query(&partition.lock_table_sql)
            .execute(session.tx())
            .await?;
        sqlx::query(&partition.copy_sql)
            .execute(session.tx())
            .await?;
        sqlx::query(&partition.truncate_sql)
            .execute(session.tx())
            .await?;
        sqlx::query(&partition.restore_sql)
            .execute(session.tx())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl QueueBuffer for PartitionedBuffer {
    fn core(&self) -> &BufferCore {
        &self.core
    }

    fn name(&self) -> &'static str {
        "partitioned"
    }

    /// Insert into whichever partition the caller can lock first.
    ///
    /// A lock-acquisition timeout is propagated to the caller.
    async fn offer(&self, payload: &str) -> Result<()> {
        let mut session = self.core.manager()?.begin().await?;
        let partition = match self.acquire_partition(&mut session).await {
            Ok(partition) => partition,
            Err(e) => {
                session.rollback_safely().await;
                return Err(e);
            }
        };
        let inserted = sqlx::query_scalar::<_, i64>(&partition.insert_sql)
            .bind(payload)
            .fetch_one(session.tx())
            .await;
        match inserted {
            Ok(_) => session.commit().await,
            Err(e) => {
                session.rollback_safely().await;
                Err(e.into())
            }
        }
    }

    async fn poll_batch(
        &self,
        session: &mut Session,
        count: i64,
        consumer: BatchConsumer<'_>,
    ) -> Result<()> {
        let partition = self.acquire_partition(session).await?;
        let lower_bound = partition.cursor.next_lower_bound();
        let events: Vec<Event> = sqlx::query_as(&partition.select_sql)
            .bind(lower_bound)
            .bind(count)
            .fetch_all(session.tx())
            .await?;
        let max_id = match events.last() {
            Some(event) => event.id,
            None => return Ok(()),
        };
        let ids: Vec<i64> = events.iter().map(|event| event.id).collect();
        consumer(events).await;
        sqlx::query(&partition.delete_sql)
            .bind(&ids)
            .execute(session.tx())
            .await?;
        sqlx::query(SYNC_COMMIT_OFF).execute(session.tx()).await?;
        partition.cursor.advance(max_id);
        Ok(())
    }

    /// Sum of the partitions' non-transactional counts.
    async fn size(&self) -> Result<i64> {
        let manager = self.core.manager()?;
        let mut total = 0i64;
        for partition in &self.partitions {
            let count: i64 = sqlx::query_scalar(&partition.count_sql)
                .fetch_one(manager.pool())
                .await?;
            total += count;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_partitions() {
        let result = PartitionedBuffer::new(0, 100, Duration::from_secs(30));
        assert!(matches!(
            result,
            Err(Error::InvalidConfig { ref field, .. }) if field == "partition_count"
        ));
    }

    #[test]
    fn rejects_more_than_three_partitions() {
        assert!(PartitionedBuffer::new(4, 100, Duration::from_secs(30)).is_err());
    }

    #[test]
    fn builds_one_partition_per_index() {
        let buffer = PartitionedBuffer::new(3, 100, Duration::from_secs(30)).unwrap();
        let tables: Vec<&str> = buffer
            .partitions
            .iter()
            .map(|p| p.table.as_str())
            .collect();
        assert_eq!(tables, ["queue_buffer_0", "queue_buffer_1", "queue_buffer_2"]);
        assert_eq!(buffer.partitions[1].lock_key, 1_000_000_001);
    }
}
