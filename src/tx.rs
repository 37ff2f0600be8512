//! Transactional execution facade for pgqbuf.
//!
//! This module defines [`TxManager`], the entry point for starting units of
//! work, and [`Session`], an owned handle over one open transaction.
//!
//! ## What
//!
//! - [`TxManager`] wraps the connection pool and hands out sessions.
//! - [`Session`] owns a single open transaction until it is committed or
//!   rolled back.
//!
//! ## How
//!
//! Call [`TxManager::begin`] to open a session, run statements against
//! [`Session::tx`], then consume the session with [`Session::commit`] or
//! [`Session::rollback_safely`]. The session travels down the call chain as
//! an explicit argument, so the active transaction is never ambient state.
use crate::error::Result;
use sqlx::postgres::PgPool;
use sqlx::{PgConnection, Postgres, Transaction};

/// Hands out transactional sessions over a shared connection pool.
#[derive(Clone)]
pub struct TxManager {
    pool: PgPool,
}

impl TxManager {
    /// Create a manager over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a new transaction and return the owning session.
    pub async fn begin(&self) -> Result<Session> {
        let tx = self.pool.begin().await?;
        Ok(Session { tx })
    }

    /// The underlying pool, for non-transactional reads.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One open transaction.
///
/// Dropping a session without committing rolls the transaction back through
/// the driver, but callers should prefer [`Session::rollback_safely`] so the
/// outcome is logged.
pub struct Session {
    tx: Transaction<'static, Postgres>,
}

impl Session {
    /// The transaction's connection, for binding statements.
    pub fn tx(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Commit the transaction, consuming the session.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Roll back the transaction, consuming the session.
    ///
    /// A failed rollback is logged and swallowed so it never masks the
    /// error that triggered it.
    pub async fn rollback_safely(self) {
        if let Err(e) = self.tx.rollback().await {
            tracing::error!("Failed to roll back transaction: {}", e);
        }
    }
}
