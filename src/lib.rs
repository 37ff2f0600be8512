/**
 # pgqbuf

A PostgreSQL-backed work queue with five interchangeable concurrency
strategies, plus a load generator for comparing them under
multi-producer/multi-consumer traffic.

## Strategies

- **for-update**: exclusive row locks, total delivery order
- **skip-locked**: `FOR UPDATE SKIP LOCKED`, no poller blocking
- **cursor**: skip-locked scans bounded by a periodically-reset cursor
- **cursor-relaxed**: cursor scans committing with `synchronous_commit` off
- **partitioned**: up to three advisory-sharded tables with background
  pseudo-vacuum compaction

All strategies share one contract: `offer` an event, `poll` a batch into a
consumer callback, read the approximate `size`. Polls never raise; failures
roll back, get logged, and the call degrades to a no-op.
*/

pub mod admin;
pub mod bench;
pub mod buffer;
pub mod config;
pub mod error;
pub mod tx;
pub mod types;

mod constants;

pub use crate::admin::Admin;
pub use crate::bench::Strategy;
pub use crate::buffer::{
    BatchConsumer, BufferCore, CursorSkipLockedBuffer, ForUpdateBuffer, PartitionedBuffer,
    PollCursor, QueueBuffer, RelaxedCommitBuffer, SkipLockedBuffer,
};
pub use crate::config::BenchConfig;
pub use crate::error::{Error, Result};
pub use crate::tx::{Session, TxManager};
pub use crate::types::Event;
