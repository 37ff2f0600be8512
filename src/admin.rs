//! Administrative interface for managing pgqbuf infrastructure.
//!
//! This module provides the [`Admin`] struct for installing, uninstalling,
//! and purging the queue buffer tables.
//!
//! ## What
//!
//! - [`Admin`] creates and drops the `queue_buffer` table and its partition
//!   siblings, and truncates them between runs.
//!
//! ## How
//!
//! Use [`Admin`] once at setup time, before constructing a buffer strategy.
//! All DDL for one operation runs inside a single transaction.
use crate::constants::{
    partition_table, CREATE_QUEUE_STATEMENT, DROP_QUEUE_STATEMENT, MAX_PARTITION_COUNT,
    QUEUE_TABLE, TRUNCATE_QUEUE_STATEMENT,
};
use crate::error::Result;
use sqlx::PgPool;

/// Admin interface for managing pgqbuf infrastructure.
#[derive(Debug, Clone)]
pub struct Admin {
    pub pool: PgPool,
}

impl Admin {
    /// Create a new admin interface over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the queue table and all partition tables.
    ///
    /// Partition tables are always created up to the maximum supported
    /// count so that any strategy can run against the same installation.
    pub async fn install(&self) -> Result<()> {
        let statements: Vec<String> = Self::all_tables()
            .map(|table| CREATE_QUEUE_STATEMENT.replace("{table}", &table))
            .collect();
        self.run_in_transaction(&statements).await?;
        tracing::info!("Installed queue buffer tables");
        Ok(())
    }

    /// Drop the queue table and all partition tables.
    pub async fn uninstall(&self) -> Result<()> {
        let statements: Vec<String> = Self::all_tables()
            .map(|table| DROP_QUEUE_STATEMENT.replace("{table}", &table))
            .collect();
        self.run_in_transaction(&statements).await?;
        tracing::info!("Dropped queue buffer tables");
        Ok(())
    }

    /// Remove all pending events from every table.
    pub async fn truncate_all(&self) -> Result<()> {
        let statements: Vec<String> = Self::all_tables()
            .map(|table| TRUNCATE_QUEUE_STATEMENT.replace("{table}", &table))
            .collect();
        self.run_in_transaction(&statements).await?;
        tracing::debug!("Truncated queue buffer tables");
        Ok(())
    }

    fn all_tables() -> impl Iterator<Item = String> {
        std::iter::once(QUEUE_TABLE.to_string())
            .chain((0..MAX_PARTITION_COUNT).map(partition_table))
    }

    async fn run_in_transaction(&self, statements: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
