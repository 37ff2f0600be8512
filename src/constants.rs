//! SQL constants and configuration values for pgqbuf.
//!
//! This module contains all SQL statement templates, table-name constants, and
//! tuning values used throughout the crate.
//!
//! ## What
//!
//! - Queue table names and the partition naming scheme
//! - SQL statement templates for buffer operations and the pseudo-vacuum
//! - Advisory-lock key derivation and timeout values
//!
//! ## How
//!
//! Statement templates carry `{table}` placeholders that the buffer
//! constructors render once with `.replace()`. Data values always travel as
//! `$n` bind parameters, never through string substitution.

/// Table backing the single-table strategies
pub const QUEUE_TABLE: &str = "queue_buffer";
/// Maximum number of partitions for the partitioned strategy
pub const MAX_PARTITION_COUNT: usize = 3;
/// Base offset for partition advisory-lock keys
pub const PARTITION_LOCK_KEY_BASE: i64 = 1_000_000_000;
/// Wall-clock budget for acquiring a shared partition lock
pub const PARTITION_LOCK_TIMEOUT_SECS: u64 = 10;
/// lock_timeout / statement_timeout applied inside a pseudo-vacuum transaction
pub const VACUUM_STATEMENT_TIMEOUT: &str = "30s";

/// Name of the table backing one partition.
pub fn partition_table(index: usize) -> String {
    format!("{}_{}", QUEUE_TABLE, index)
}

/// Advisory-lock key for one partition.
pub fn partition_lock_key(index: usize) -> i64 {
    PARTITION_LOCK_KEY_BASE + index as i64
}

pub const CREATE_QUEUE_STATEMENT: &str = r#"
    CREATE TABLE IF NOT EXISTS {table} (
        id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
        payload TEXT NOT NULL
    );
"#;

pub const DROP_QUEUE_STATEMENT: &str = r#"
    DROP TABLE IF EXISTS {table} CASCADE;
"#;

pub const TRUNCATE_QUEUE_STATEMENT: &str = r#"
    TRUNCATE {table};
"#;

pub const INSERT_EVENT: &str = r#"
    INSERT INTO {table} (payload)
    VALUES ($1)
    RETURNING id;
"#;

pub const SELECT_FOR_UPDATE: &str = r#"
    SELECT id, payload
    FROM {table}
    ORDER BY id ASC
    LIMIT $1
    FOR UPDATE;
"#;

pub const SELECT_SKIP_LOCKED: &str = r#"
    SELECT id, payload
    FROM {table}
    ORDER BY id ASC
    LIMIT $1
    FOR UPDATE SKIP LOCKED;
"#;

pub const SELECT_AFTER_CURSOR: &str = r#"
    SELECT id, payload
    FROM {table}
    WHERE id > $1
    ORDER BY id ASC
    LIMIT $2
    FOR UPDATE SKIP LOCKED;
"#;

pub const DELETE_EVENT_BATCH: &str = r#"
    DELETE FROM {table}
    WHERE id = ANY($1)
    RETURNING id;
"#;

pub const COUNT_EVENTS: &str = r#"
    SELECT COUNT(*) AS count
    FROM {table};
"#;

/// Relaxes commit durability for the current transaction only.
pub const SYNC_COMMIT_OFF: &str = r#"
    SET LOCAL synchronous_commit TO OFF;
"#;

pub const TRY_SHARED_PARTITION_LOCK: &str = r#"
    SELECT pg_try_advisory_xact_lock_shared($1);
"#;

pub const EXCLUSIVE_PARTITION_LOCK: &str = r#"
    SELECT pg_advisory_xact_lock($1);
"#;

pub const VACUUM_ANALYZE: &str = r#"
    VACUUM ANALYZE {table};
"#;

pub const SET_LOCK_TIMEOUT: &str = r#"
    SET LOCAL lock_timeout TO '{timeout}';
"#;

pub const SET_STATEMENT_TIMEOUT: &str = r#"
    SET LOCAL statement_timeout TO '{timeout}';
"#;

pub const LOCK_TABLE_EXCLUSIVE: &str = r#"
    LOCK TABLE {table} IN ACCESS EXCLUSIVE MODE;
"#;

pub const COPY_TO_TEMP: &str = r#"
    CREATE TEMPORARY TABLE {table}_copy ON COMMIT DROP AS
    SELECT * FROM {table} WITH DATA;
"#;

pub const RESTORE_FROM_TEMP: &str = r#"
    INSERT INTO {table}
    OVERRIDING SYSTEM VALUE
    SELECT * FROM {table}_copy;
"#;
