//! Cursor-bounded lock-skipping strategy.
//!
//! Restricts the select to `id > lastId` so repeated polls stop re-scanning
//! id ranges that are already exhausted. The cursor periodically drops back
//! to -1 to recover rows that were skipped while locked and would otherwise
//! stay invisible to this strategy.
use async_trait::async_trait;

use crate::constants::{DELETE_EVENT_BATCH, QUEUE_TABLE, SELECT_AFTER_CURSOR};
use crate::error::Result;
use crate::tx::Session;
use crate::types::Event;

use super::{BatchConsumer, BufferCore, PollCursor, QueueBuffer};

/// Strategy 3: cursor-bounded skip-locked select, consumer invoked even
/// for empty batches.
pub struct CursorSkipLockedBuffer {
    core: BufferCore,
    cursor: PollCursor,
    select_sql: String,
    delete_sql: String,
}

impl CursorSkipLockedBuffer {
    pub fn new(reset_every: u64) -> Result<Self> {
        Ok(Self {
            core: BufferCore::new(true),
            cursor: PollCursor::new(reset_every)?,
            select_sql: SELECT_AFTER_CURSOR.replace("{table}", QUEUE_TABLE),
            delete_sql: DELETE_EVENT_BATCH.replace("{table}", QUEUE_TABLE),
        })
    }
}

#[async_trait]
impl QueueBuffer for CursorSkipLockedBuffer {
    fn core(&self) -> &BufferCore {
        &self.core
    }

    fn name(&self) -> &'static str {
        "cursor_skip_locked"
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
        let ids: Vec<i64> = events.iter().map(|event| event.id).collect();
        let max_id = events.last().map(|event| event.id);
        consumer(events).await;
        if let Some(max_id) = max_id {
            sqlx::query(&self.delete_sql)
                .bind(&ids)
                .execute(session.tx())
                .await?;
            self.cursor.advance(max_id);
        }
        Ok(())
    }
}
