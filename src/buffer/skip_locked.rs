//! Lock-skipping strategy.
//!
//! Same head-of-queue select as the exclusive strategy, but rows locked by
//! a concurrent poller are excluded instead of waited for. Removes blocking
//! between pollers at the cost of weaker global ordering.
use async_trait::async_trait;

use crate::constants::{DELETE_EVENT_BATCH, QUEUE_TABLE, SELECT_SKIP_LOCKED};
use crate::error::Result;
use crate::tx::Session;
use crate::types::Event;

use super::{BatchConsumer, BufferCore, QueueBuffer};

/// Strategy 2: `FOR UPDATE SKIP LOCKED`, consumer skipped on empty
/// batches.
pub struct SkipLockedBuffer {
    core: BufferCore,
    select_sql: String,
    delete_sql: String,
}

impl SkipLockedBuffer {
    pub fn new() -> Self {
        Self {
            core: BufferCore::new(true),
            select_sql: SELECT_SKIP_LOCKED.replace("{table}", QUEUE_TABLE),
            delete_sql: DELETE_EVENT_BATCH.replace("{table}", QUEUE_TABLE),
        }
    }
}

impl Default for SkipLockedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBuffer for SkipLockedBuffer {
    fn core(&self) -> &BufferCore {
        &self.core
    }

    fn name(&self) -> &'static str {
        "skip_locked"
    }

    async fn poll_batch(
        &self,
        session: &mut Session,
        count: i64,
        consumer: BatchConsumer<'_>,
    ) -> Result<()> {
        let events: Vec<Event> = sqlx::query_as(&self.select_sql)
            .bind(count)
            .fetch_all(session.tx())
            .await?;
        if events.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = events.iter().map(|event| event.id).collect();
        consumer(events).await;
        sqlx::query(&self.delete_sql)
            .bind(&ids)
            .execute(session.tx())
            .await?;
        Ok(())
    }
}
