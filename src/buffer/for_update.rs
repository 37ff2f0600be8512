//! Exclusive row-locking strategy.
//!
//! Selects the head of the queue under `FOR UPDATE`, so concurrent pollers
//! serialize on overlapping rows. The only strategy with a total delivery
//! order by id across all consumers.
use async_trait::async_trait;

use crate::constants::{DELETE_EVENT_BATCH, QUEUE_TABLE, SELECT_FOR_UPDATE};
use crate::error::Result;
use crate::tx::Session;
use crate::types::Event;

use super::{BatchConsumer, BufferCore, QueueBuffer};

/// Strategy 1: exclusive row locks, consumer invoked even for empty
/// batches.
pub struct ForUpdateBuffer {
    core: BufferCore,
    select_sql: String,
    delete_sql: String,
}

impl ForUpdateBuffer {
    pub fn new() -> Self {
        Self {
            core: BufferCore::new(true),
            select_sql: SELECT_FOR_UPDATE.replace("{table}", QUEUE_TABLE),
            delete_sql: DELETE_EVENT_BATCH.replace("{table}", QUEUE_TABLE),
        }
    }
}

impl Default for ForUpdateBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBuffer for ForUpdateBuffer {
    fn core(&self) -> &BufferCore {
        &self.core
    }

    fn name(&self) -> &'static str {
        "for_update"
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
        let ids: Vec<i64> = events.iter().map(|event| event.id).collect();
        consumer(events).await;
        if !ids.is_empty() {
            sqlx::query(&self.delete_sql)
                .bind(&ids)
                .execute(session.tx())
                .await?;
        }
        Ok(())
    }
}
