//! Queue buffer contract and shared strategy state.
//!
//! This module defines the [`QueueBuffer`] trait implemented by the five
//! concurrency strategies, plus the pieces they share: [`BufferCore`] for
//! facade binding and single-table SQL, and [`PollCursor`] for the
//! cursor-bounded strategies.
//!
//! ## What
//!
//! - [`QueueBuffer`] is the contract the load generator drives: `init`,
//!   `offer`, `poll`, `size`, `is_sync_commit_enabled`.
//! - [`BufferCore`] carries the bound [`TxManager`] and the default
//!   insert/count statements over the shared queue table.
//! - [`PollCursor`] tracks the `lastId` high-water mark with a periodic
//!   forced reset.
//!
//! ## How
//!
//! Construct a strategy, call `init` once with a [`TxManager`], then drive
//! it with `offer` and `poll` from any number of concurrent tasks. A failed
//! poll rolls back, logs, and returns normally; it is never raised to the
//! caller.
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::constants::{COUNT_EVENTS, INSERT_EVENT, QUEUE_TABLE};
use crate::error::{Error, Result};
use crate::tx::{Session, TxManager};
use crate::types::Event;

mod cursor;
mod for_update;
mod partitioned;
mod relaxed;
mod skip_locked;

pub use cursor::CursorSkipLockedBuffer;
pub use for_update::ForUpdateBuffer;
pub use partitioned::PartitionedBuffer;
pub use relaxed::RelaxedCommitBuffer;
pub use skip_locked::SkipLockedBuffer;

/// Callback receiving one delivered batch, invoked inside the poll
/// transaction.
pub type BatchConsumer<'a> = &'a mut (dyn FnMut(Vec<Event>) -> BoxFuture<'static, ()> + Send);

/// Queue contract shared by all strategies.
///
/// Implementations provide [`QueueBuffer::poll_batch`] with their own
/// select/deliver/delete policy; the provided methods supply the common
/// transaction handling around it.
#[async_trait]
pub trait QueueBuffer: Send + Sync {
    /// Shared state backing the provided contract methods.
    fn core(&self) -> &BufferCore;

    /// Short strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Select up to `count` events, hand them to `consumer`, and delete
    /// them, all inside the governing transaction owned by `session`.
    async fn poll_batch(
        &self,
        session: &mut Session,
        count: i64,
        consumer: BatchConsumer<'_>,
    ) -> Result<()>;

    /// Bind the strategy to a transactional execution facade.
    ///
    /// Must be called exactly once before any other operation.
    fn init(&self, manager: TxManager) -> Result<()> {
        self.core().bind(manager)
    }

    /// Insert one event in its own transaction. Failures propagate.
    async fn offer(&self, payload: &str) -> Result<()> {
        let mut session = self.core().manager()?.begin().await?;
        self.core().insert(&mut session, payload).await?;
        session.commit().await
    }

    /// Deliver and delete at most `count` events.
    ///
    /// Any failure is contained: the governing transaction is rolled back,
    /// the error is logged, and the call returns normally. A caller must
    /// treat a poll as "may silently do nothing".
    async fn poll(&self, count: i64, consumer: BatchConsumer<'_>) {
        let manager = match self.core().manager() {
            Ok(manager) => manager,
            Err(e) => {
                tracing::error!("Unexpected error while polling {}: {}", self.name(), e);
                return;
            }
        };
        let mut session = match manager.begin().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Unexpected error while polling {}: {}", self.name(), e);
                return;
            }
        };
        match self.poll_batch(&mut session, count, consumer).await {
            Ok(()) => {
                if let Err(e) = session.commit().await {
                    tracing::error!("Unexpected error while polling {}: {}", self.name(), e);
                }
            }
            Err(e) => {
                tracing::error!("Unexpected error while polling {}: {}", self.name(), e);
                session.rollback_safely().await;
            }
        }
    }

    /// Approximate pending count, read without a transaction.
    async fn size(&self) -> Result<i64> {
        self.core().count().await
    }

    /// Whether this strategy leaves the store's durable-commit wait in
    /// place. Static per strategy, used for reporting only.
    fn is_sync_commit_enabled(&self) -> bool {
        self.core().sync_commit_enabled()
    }
}

/// State shared by every strategy: the bound facade, the durability flag,
/// and pre-rendered statements over the shared queue table.
pub struct BufferCore {
    manager: OnceLock<TxManager>,
    sync_commit: bool,
    insert_sql: String,
    count_sql: String,
}

impl BufferCore {
    pub fn new(sync_commit: bool) -> Self {
        Self {
            manager: OnceLock::new(),
            sync_commit,
            insert_sql: INSERT_EVENT.replace("{table}", QUEUE_TABLE),
            count_sql: COUNT_EVENTS.replace("{table}", QUEUE_TABLE),
        }
    }

    /// Bind the facade; a second call is an error.
    pub fn bind(&self, manager: TxManager) -> Result<()> {
        self.manager.set(manager).map_err(|_| Error::Internal {
            message: "buffer is already initialized".to_string(),
        })
    }

    /// The bound facade, or an error if `init` has not run.
    pub fn manager(&self) -> Result<&TxManager> {
        self.manager.get().ok_or_else(|| Error::Internal {
            message: "buffer is not initialized; call init first".to_string(),
        })
    }

    pub fn sync_commit_enabled(&self) -> bool {
        self.sync_commit
    }

    /// Insert one event into the shared queue table.
    pub async fn insert(&self, session: &mut Session, payload: &str) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(&self.insert_sql)
            .bind(payload)
            .fetch_one(session.tx())
            .await?;
        Ok(id)
    }

    /// Count rows in the shared queue table outside any transaction.
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&self.count_sql)
            .fetch_one(self.manager()?.pool())
            .await?;
        Ok(count)
    }
}

/// `lastId` high-water mark with a forced periodic reset.
///
/// Every `reset_every`-th poll the cursor drops back to -1 before the
/// select runs, so ids that were skipped while locked by a concurrent
/// poller become visible again. Advancement is last-writer-wins across
/// concurrent pollers; the cursor is an optimization, not a correctness
/// boundary.
pub struct PollCursor {
    reset_every: u64,
    polls: AtomicU64,
    last_id: AtomicI64,
}

impl PollCursor {
    pub fn new(reset_every: u64) -> Result<Self> {
        if reset_every == 0 {
            return Err(Error::InvalidConfig {
                field: "reset_every".to_string(),
                message: "cursor reset cadence must be at least 1".to_string(),
            });
        }
        Ok(Self {
            reset_every,
            polls: AtomicU64::new(0),
            last_id: AtomicI64::new(-1),
        })
    }

    /// Lower bound for the next select, applying the periodic reset.
    pub fn next_lower_bound(&self) -> i64 {
        let polls = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if polls % self.reset_every == 0 {
            self.last_id.store(-1, Ordering::Relaxed);
        }
        self.last_id.load(Ordering::Relaxed)
    }

    /// Advance past a delivered batch's highest id.
    pub fn advance(&self, id: i64) {
        self.last_id.store(id, Ordering::Relaxed);
    }
}
