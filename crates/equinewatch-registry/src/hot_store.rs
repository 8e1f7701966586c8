//! Hot tier: a TTL'd key-value cache fronting the warm registry (§4.3).
//!
//! Key format is `horse:<stream_id>:<track_id>:state`; the value is the JSON
//! serialization of [`RegistryEntry`]. Entries expire after `ttl_secs`
//! (default 300s) so a crashed or idle stream falls back to the warm tier on
//! its next chunk.

use chrono::Utc;
use equinewatch_models::{RegistryEntry, StreamId, TrackId};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::RegistryResult;

const DEFAULT_TTL_SECS: u64 = 300;

/// Hot-tier configuration.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub redis_url: String,
    pub ttl_secs: u64,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl HotConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ttl_secs: std::env::var("REGISTRY_HOT_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TTL_SECS),
        }
    }
}

/// Redis-backed hot tier.
pub struct HotStore {
    client: redis::Client,
    config: HotConfig,
}

impl HotStore {
    pub fn new(config: HotConfig) -> RegistryResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> RegistryResult<Self> {
        Self::new(HotConfig::from_env())
    }

    /// Write (or TTL-refresh) one entry to the hot tier (§4.3 `SaveBarn` step 1).
    pub async fn put(&self, stream_id: &StreamId, entry: &RegistryEntry) -> RegistryResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = RegistryEntry::hot_key(stream_id, &entry.id);
        let payload = serde_json::to_string(entry)?;
        conn.set_ex::<_, _, ()>(&key, payload, self.config.ttl_secs).await?;
        Ok(())
    }

    /// Read one entry by stream + track id.
    pub async fn get(&self, stream_id: &StreamId, track_id: &TrackId) -> RegistryResult<Option<RegistryEntry>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = RegistryEntry::hot_key(stream_id, track_id);
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Scan every live (non-expired) entry for a stream (§4.3 `LoadBarn` step 2).
    pub async fn scan_stream(&self, stream_id: &StreamId) -> RegistryResult<Vec<RegistryEntry>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("horse:{}:*:state", stream_id.as_str());

        let mut entries = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        drop(iter);

        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(json) = raw {
                match serde_json::from_str::<RegistryEntry>(&json) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(key = %key, error = %e, "dropping corrupt hot entry"),
                }
            }
        }
        Ok(entries)
    }

    /// Explicitly drop an entry (used when a track is merged away by a
    /// correction, §4.7).
    pub async fn delete(&self, stream_id: &StreamId, track_id: &TrackId) -> RegistryResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = RegistryEntry::hot_key(stream_id, track_id);
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }

    /// `ExpireHot(stream_id)` (§4.3): Redis TTLs expire entries on their own;
    /// this purges any that are somehow still present past their horizon
    /// (e.g. written with a stale TTL before a config change).
    pub async fn expire_hot(&self, stream_id: &StreamId) -> RegistryResult<u32> {
        self.sweep_stale(Some(stream_id)).await
    }

    /// `Cleanup(hot_stale_cutoff)` (§4.3): sweep every stream's hot entries
    /// and delete any whose `last_updated_time` predates the TTL horizon.
    pub async fn cleanup(&self) -> RegistryResult<u32> {
        self.sweep_stale(None).await
    }

    async fn sweep_stale(&self, stream_id: Option<&StreamId>) -> RegistryResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = match stream_id {
            Some(s) => format!("horse:{}:*:state", s.as_str()),
            None => "horse:*:state".to_string(),
        };

        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        drop(iter);

        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.ttl_secs as i64);
        let mut deleted = 0u32;
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            let stale = match raw.as_deref().map(serde_json::from_str::<RegistryEntry>) {
                Some(Ok(entry)) => entry.last_updated_time < cutoff,
                Some(Err(_)) => true,
                None => false,
            };
            if stale {
                conn.del::<_, ()>(&key).await?;
                deleted += 1;
                debug!(key = %key, "swept stale hot entry");
            }
        }
        Ok(deleted)
    }
}
