//! Synthetic load generator for the queue buffer strategies.
//!
//! Barrier-synchronized producer and consumer pools drive one strategy
//! through the common queue contract, with throughput and overhead
//! reported about once per second.
mod runner;
mod worker;

pub use runner::run;
pub use worker::{LongTransactionKeeper, Reader, StatSnapshot, WorkerStat, Writer};

/// Which queue buffer strategy to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    /// Exclusive row locks
    ForUpdate,
    /// Skip rows locked by concurrent pollers
    SkipLocked,
    /// Cursor-bounded skip-locked scans
    Cursor,
    /// Cursor-bounded scans with relaxed commit durability
    CursorRelaxed,
    /// Advisory-sharded partitions with background compaction
    Partitioned,
}
