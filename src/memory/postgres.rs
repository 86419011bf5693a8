//! Postgres-backed memory store.
//!
//! One row per `(namespace, key)`. Writes are upserts; a TTL becomes an
//! absolute `expires_at`, and a write without TTL clears it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{MemoryEntry, MemoryStore};
use crate::error::{Error, Result};

/// A row read back from `memory_entries`. Expired rows are never returned.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredMemory {
    pub namespace: String,
    pub key: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Memory store handle. Owns the connection pool.
pub struct PgMemoryStore {
    pool: PgPool,
}

impl PgMemoryStore {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Run a trivial query to check the connection.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Read a live entry.
    pub async fn fetch(&self, namespace: &str, key: &str) -> Result<Option<StoredMemory>> {
        let row: Option<StoredMemory> = sqlx::query_as(
            "SELECT namespace, key, value, expires_at, updated_at
             FROM memory_entries
             WHERE namespace = $1 AND key = $2
             AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Delete rows whose TTL has elapsed. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM memory_entries WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    async fn store(&self, entry: MemoryEntry) -> Result<()> {
        let now = Utc::now();
        let expires_at = match entry.ttl_secs {
            Some(secs) => {
                let expires = i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .ok_or_else(|| Error::Memory(format!("ttl out of range: {secs}")))?;
                Some(expires)
            }
            None => None,
        };

        sqlx::query(
            "INSERT INTO memory_entries (namespace, key, value, expires_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             ON CONFLICT (namespace, key) DO UPDATE
             SET value = EXCLUDED.value,
                 expires_at = EXCLUDED.expires_at,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&entry.namespace)
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
