use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::ReadableTable;
use std::time::Duration;

use super::db::{expiry_key, expiry_key_ms, Database, DatabaseError};
use super::models::KvEntry;
use super::tables::*;
use crate::error::AuthError;
use crate::traits::KvStore;

impl Database {
    // ========================================================================
    // Short-lived entries
    // ========================================================================

    /// Store a value, replacing any previous entry and its expiry.
    pub fn put_kv(
        &self,
        key: &str,
        value: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        debug_assert!(!key.is_empty(), "kv key must not be empty");

        let entry = KvEntry {
            expires_at,
            value: value.to_string(),
        };

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(KV)?;
            let previous: Option<KvEntry> = table
                .get(key)?
                .map(|v| rmp_serde::from_slice(v.value()))
                .transpose()?;

            let data = rmp_serde::to_vec_named(&entry)?;
            table.insert(key, data.as_slice())?;

            let mut expiry_table = write_txn.open_table(KV_EXPIRY)?;
            if let Some(old_expiry) = previous.and_then(|p| p.expires_at) {
                expiry_table.remove(expiry_key(&old_expiry, key).as_str())?;
            }
            if let Some(expires_at) = entry.expires_at {
                expiry_table.insert(expiry_key(&expires_at, key).as_str(), key)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Read a value as of `now`; expired entries read as absent.
    pub fn get_kv_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(KV)?;

        match table.get(key)? {
            Some(data) => {
                let entry: KvEntry = rmp_serde::from_slice(data.value())?;
                Ok(entry.is_live_at(now).then_some(entry.value))
            }
            None => Ok(None),
        }
    }

    pub fn delete_kv(&self, key: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(KV)?;
            let previous: Option<KvEntry> = table
                .remove(key)?
                .map(|v| rmp_serde::from_slice(v.value()))
                .transpose()?;

            if let Some(expires_at) = previous.as_ref().and_then(|p| p.expires_at) {
                let mut expiry_table = write_txn.open_table(KV_EXPIRY)?;
                expiry_table.remove(expiry_key(&expires_at, key).as_str())?;
            }
            previous.is_some()
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Remove every entry whose expiry is at or before `now`.
    pub fn cleanup_expired_kv(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let now_ms = now.timestamp_millis();

        let expired: Vec<(String, String)> = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(KV_EXPIRY)?;
            let mut result = Vec::new();
            for entry in table.iter()? {
                let (ek, key) = entry?;
                match expiry_key_ms(ek.value()) {
                    Some(ms) if ms <= now_ms => {
                        result.push((ek.value().to_string(), key.value().to_string()))
                    }
                    // Index is ordered by expiry; nothing later can be due.
                    Some(_) => break,
                    None => {}
                }
            }
            result
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let write_txn = self.begin_write()?;
        let mut cleaned = 0;
        {
            let mut table = write_txn.open_table(KV)?;
            let mut expiry_table = write_txn.open_table(KV_EXPIRY)?;
            for (ek, key) in &expired {
                let current: Option<KvEntry> = table
                    .get(key.as_str())?
                    .map(|v| rmp_serde::from_slice(v.value()))
                    .transpose()?;

                match current {
                    Some(entry) if !entry.is_live_at(now) => {
                        table.remove(key.as_str())?;
                        expiry_table.remove(ek.as_str())?;
                        cleaned += 1;
                    }
                    // Still live within the same millisecond: keep its index row
                    // so a later sweep finds it.
                    Some(entry)
                        if entry.expires_at.map(|t| expiry_key(&t, key)).as_deref()
                            == Some(ek.as_str()) => {}
                    _ => {
                        expiry_table.remove(ek.as_str())?;
                    }
                }
            }
        }
        write_txn.commit()?;

        if cleaned > 0 {
            tracing::info!(count = cleaned, "Cleaned up expired entries");
        }
        Ok(cleaned)
    }
}

fn expiry_from_ttl(ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|_| AuthError::internal("ttl out of range"))?;
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AuthError::internal("ttl out of range"))
}

#[async_trait]
impl KvStore for Database {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AuthError> {
        let expires_at = ttl.map(expiry_from_ttl).transpose()?;
        Ok(self.put_kv(key, value, expires_at)?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.get_kv_at(key, Utc::now())?)
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        self.delete_kv(key)?;
        Ok(())
    }
}
