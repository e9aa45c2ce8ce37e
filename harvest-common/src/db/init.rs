//! Database initialization
//!
//! Opens (or creates) the SQLite file backing the keyed store and creates
//! the namespaces it needs. Every statement is idempotent, so opening an
//! existing store is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new store: {}", db_path.display());
    } else {
        info!("Opened existing store: {}", db_path.display());
    }

    // WAL lets the post-processing reader run alongside merge writers
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 250")
        .execute(&pool)
        .await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database (tests, dry runs)
///
/// An in-memory SQLite database lives and dies with its connection, so the
/// pool is pinned to exactly one connection that never expires.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Create every store namespace
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_runtime_kv_table(pool).await?;
    create_records_table(pool).await?;
    create_persons_tables(pool).await?;
    create_companies_table(pool).await?;
    Ok(())
}

/// Scalar keys: cursors, indices, flags
pub async fn create_runtime_kv_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runtime_kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Canonical records keyed `<kind>:<identity>`
pub async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            record_key TEXT PRIMARY KEY,
            record_type TEXT NOT NULL,
            primary_key TEXT NOT NULL,
            date INTEGER NOT NULL DEFAULT 0,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_primary_key ON records(primary_key)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_persons_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS persons (
            user_id TEXT PRIMARY KEY,
            external_id TEXT UNIQUE,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Email → person index; one email belongs to exactly one person
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS person_emails (
            email TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES persons(user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_companies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            company_name TEXT PRIMARY KEY,
            domains TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
