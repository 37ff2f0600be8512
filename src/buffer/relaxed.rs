//! Cursor-bounded strategy with relaxed commit durability.
//!
//! Same polling algorithm as the cursor strategy, but after deleting a
//! batch the transaction's `synchronous_commit` is switched off, so the
//! commit does not wait for a synchronous replica or log flush. A crash in
//! that window can undo an acknowledged dequeue.
use async_trait::async_trait;

use crate::constants::{DELETE_EVENT_BATCH, QUEUE_TABLE, SELECT_AFTER_CURSOR, SYNC_COMMIT_OFF};
use crate::error::Result;
use crate::tx::Session;
use crate::types::Event;

use super::{BatchConsumer, BufferCore, PollCursor, QueueBuffer};

/// Strategy 4: cursor-bounded skip-locked select with relaxed durability,
/// consumer skipped on empty batches.
pub struct RelaxedCommitBuffer {
    core: BufferCore,
    cursor: PollCursor,
    select_sql: String,
    delete_sql: String,
}

impl RelaxedCommitBuffer {
    pub fn new(reset_every: u64) -> Result<Self> {
        Ok(Self {
            core: BufferCore::new(false),
            cursor: PollCursor::new(reset_every)?,
            select_sql: SELECT_AFTER_CURSOR.replace("{table}", QUEUE_TABLE),
            delete_sql: DELETE_EVENT_BATCH.replace("{table}", QUEUE_TABLE),
        })
    }
}

#[async_trait]
impl QueueBuffer for RelaxedCommitBuffer {
    fn core(&self) -> &BufferCore {
        &self.core
    }

    fn name(&self) -> &'static str {
        "cursor_relaxed_commit"
    }

    async fn poll_batch(
        &self,
        session: &mut Session,
        count: i64,
        consumer: BatchConsumer<'_>,
    ) -> Result<()> {
        let lower_bound = self.cursor.next_lower_bound();
        let events: Vec<Event> = sqlx::query_as(&self.select_sql)
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
        sqlx::query(&self.delete_sql)
            .bind(&ids)
            .execute(session.tx())
            .await?;
        sqlx::query(SYNC_COMMIT_OFF).execute(session.tx()).await?;
        self.cursor.advance(max_id);
        Ok(())
    }
}
