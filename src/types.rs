//! Core types for pgqbuf.
//!
//! This module defines the row types shared by the queue buffer strategies.
//!
//! ## What
//!
//! - [`Event`] represents one logical queue entry backed by a table row.
//!
//! ## How
//!
//! Events are created by producers through `offer` (the store assigns the id)
//! and handed to consumers in batches by `poll`. An event is never updated in
//! place, only inserted and later deleted.
use serde::{Deserialize, Serialize};

/// One pending entry in a queue buffer table.
///
/// The `id` is assigned by PostgreSQL on insertion and increases
/// monotonically within a table. The payload is an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    /// Store-assigned identity, unique within its table
    pub id: i64,
    /// Opaque payload supplied by the producer
    pub payload: String,
}
