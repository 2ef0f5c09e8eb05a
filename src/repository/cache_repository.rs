use crate::cache::Cache;
use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::time::Duration;

/// [`Cache`] backed by the `cache_entries` table, shared by every process
/// using the same database file.
pub struct CacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> CacheRepository<'a> {
    const SELECT_VALUE: &'static str =
        "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2";
    const UPSERT_VALUE: &'static str = "INSERT INTO cache_entries (key, value, expires_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at";
    const UPSERT_MAX: &'static str = "INSERT INTO cache_entries (key, value, expires_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
        WHERE cache_entries.expires_at <= ?4
           OR CAST(cache_entries.value AS INTEGER) < CAST(excluded.value AS INTEGER)";
    const UPDATE_VALUE: &'static str = "UPDATE cache_entries SET value = ?2 WHERE key = ?1";
    const DELETE_KEY: &'static str = "DELETE FROM cache_entries WHERE key = ?1";

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn expiry(ttl: Duration) -> i64 {
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self::now_millis().saturating_add(ttl)
    }

    fn select_raw(conn: &Connection, key: &str) -> Result<Option<String>> {
        let raw = conn
            .query_row(
                Self::SELECT_VALUE,
                params![key, Self::now_millis()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }
}

impl Cache for CacheRepository<'_> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        match Self::select_raw(self.conn, key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_VALUE,
            params![key, value.to_string(), Self::expiry(ttl)],
        )?;
        Ok(())
    }

    fn incr(&self, key: &str) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let raw = Self::select_raw(&tx, key)?
            .ok_or_else(|| anyhow!("cache key {} not found", key))?;
        let current: i64 = serde_json::from_str(&raw)
            .map_err(|_| anyhow!("cache key {} is not an integer", key))?;
        let next = current + 1;
        tx.execute(Self::UPDATE_VALUE, params![key, next.to_string()])?;
        tx.commit()?;
        Ok(next)
    }

    fn set_max(&self, key: &str, value: i64, ttl: Duration) -> Result<bool> {
        let changed = self.conn.execute(
            Self::UPSERT_MAX,
            params![key, value.to_string(), Self::expiry(ttl), Self::now_millis()],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn.execute(Self::DELETE_KEY, params![key])?;
        Ok(())
    }
}
