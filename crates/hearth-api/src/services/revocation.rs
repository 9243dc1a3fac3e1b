//! Revoked bearer tokens.
//!
//! Tokens are stored as SHA-256 digests under `hearth:blacklist:`, each
//! with the token's remaining lifetime as TTL. Entries are written once
//! and expire on their own.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" to keep the list in process memory (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use hearth_core::{Error, Result, RevocationStore};

/// Key prefix for revoked tokens.
pub const BLACKLIST_PREFIX: &str = "hearth:blacklist:";

/// Storage key for a token. The raw token is never stored.
pub fn blacklist_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{}{}", BLACKLIST_PREFIX, hex::encode(digest))
}

/// Revocation list backed by Redis `SET EX` / `EXISTS`.
#[derive(Clone)]
pub struct RedisRevocationStore {
    connection: ConnectionManager,
}

impl RedisRevocationStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Internal(format!("Redis connection failed: {e}")))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn is_blacklisted(&self, token: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        conn.exists::<_, bool>(blacklist_key(token))
            .await
            .map_err(|e| Error::Internal(format!("Redis EXISTS failed: {e}")))
    }

    async fn add_to_blacklist(&self, token: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(blacklist_key(token), 1, seconds)
            .await
            .map_err(|e| Error::Internal(format!("Redis SET EX failed: {e}")))?;
        debug!(
            subsystem = "auth",
            component = "revocation",
            op = "add",
            ttl_secs = seconds,
            "Token revoked"
        );
        Ok(())
    }
}

/// In-process revocation list for single-node mode and tests.
#[derive(Default)]
pub struct MemoryRevocationStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn is_blacklisted(&self, token: &str) -> Result<bool> {
        let key = blacklist_key(token);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Internal("revocation list lock poisoned".to_string()))?;
        let now = Instant::now();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok(entries.contains_key(&key))
    }

    async fn add_to_blacklist(&self, token: &str, ttl: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Internal("revocation list lock poisoned".to_string()))?;
        entries
            .entry(blacklist_key(token))
            .or_insert_with(|| Instant::now() + ttl);
        Ok(())
    }
}

/// Choose the revocation backend from the environment.
///
/// Falls back to the in-memory list when Redis is disabled or unreachable;
/// revocations then only apply on this instance.
pub async fn revocation_store_from_env() -> Arc<dyn RevocationStore> {
    let enabled = std::env::var("REDIS_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);
    if !enabled {
        info!("Redis disabled via REDIS_ENABLED=false, revocation list is in-memory");
        return Arc::new(MemoryRevocationStore::new());
    }

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    match RedisRevocationStore::connect(&redis_url).await {
        Ok(store) => {
            info!("Redis revocation list enabled");
            Arc::new(store)
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis, revocation list is in-memory");
            Arc::new(MemoryRevocationStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_hashed() {
        let key = blacklist_key("secret-token");
        assert!(key.starts_with(BLACKLIST_PREFIX));
        assert!(!key.contains("secret-token"));
        assert_eq!(key.len(), BLACKLIST_PREFIX.len() + 64);
        assert_eq!(key, blacklist_key("secret-token"));
        assert_ne!(key, blacklist_key("other-token"));
    }

    #[tokio::test]
    async fn test_memory_store_revokes() {
        let store = MemoryRevocationStore::new();
        assert!(!store.is_blacklisted("t1").await.unwrap());
        store.add_to_blacklist("t1", Duration::from_secs(60)).await.unwrap();
        assert!(store.is_blacklisted("t1").await.unwrap());
        assert!(!store.is_blacklisted("t2").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_entries_expire() {
        let store = MemoryRevocationStore::new();
        store.add_to_blacklist("t1", Duration::ZERO).await.unwrap();
        assert!(!store.is_blacklisted("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_entries_are_write_once() {
        let store = MemoryRevocationStore::new();
        store.add_to_blacklist("t1", Duration::from_secs(60)).await.unwrap();
        store.add_to_blacklist("t1", Duration::ZERO).await.unwrap();
        assert!(store.is_blacklisted("t1").await.unwrap());
    }
}
