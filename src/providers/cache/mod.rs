use crate::providers::base::{LLMResponse, Message, ToolDefinition};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};


/// One stored cache record: the reply plus its write timestamp for TTL checks.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    written_at: chrono::DateTime<chrono::Utc>,
    reply: LLMResponse,
}

/// Counts reported by [`ResponseCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
}

/// Content-addressed, on-disk cache of model replies.
///
/// Keyed by a stable hash over the ordered message list and the tool schema
/// list; one file per entry named by the hex key. TTL is checked at read
/// time; expired entries are left on disk for a later `clear`. The cache
/// never participates in cost accounting: a cached reply bills zero tokens.
pub struct ResponseCache {
    dir: PathBuf,
    ttl: chrono::Duration,
}

impl ResponseCache {
    pub fn new(dir: PathBuf, ttl_hours: u64) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache dir {}", dir.display()))?;
        Ok(Self {
            dir,
            ttl: chrono::Duration::hours(ttl_hours as i64),
        })
    }

    /// Stable hex key over `(messages, tools)`.
    ///
    /// Object keys inside tool schemas are sorted recursively so the key does
    /// not depend on map insertion order.
    pub fn cache_key(messages: &[Message], tools: &[ToolDefinition]) -> String {
        let mut hasher = Sha256::new();
        for msg in messages {
            let serialized = serde_json::to_value(msg)
                .map(|v| canonical_json(&v))
                .unwrap_or_default();
            hasher.update(serialized.as_bytes());
            hasher.update(b"\x1e");
        }
        hasher.update(b"tools\x1e");
        for tool in tools {
            let serialized = serde_json::to_value(tool)
                .map(|v| canonical_json(&v))
                .unwrap_or_default();
            hasher.update(serialized.as_bytes());
            hasher.update(b"\x1e");
        }
        hex::encode(hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Look up a reply. Returns `None` on miss or TTL expiry.
    pub fn get(&self, messages: &[Message], tools: &[ToolDefinition]) -> Option<LLMResponse> {
        let key = Self::cache_key(messages, tools);
        let path = self.entry_path(&key);
        let raw = std::fs::read_to_string(&path).ok()?;
        let record: CacheRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("discarding corrupt cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        let age = chrono::Utc::now() - record.written_at;
        if age > self.ttl {
            debug!("cache entry {} expired (age {})", key, age);
            return None;
        }
        debug!("cache hit for key {}", &key[..12]);
        Some(record.reply)
    }

    /// Store a reply. Overwrites any existing entry for the same key.
    pub fn set(&self, messages: &[Message], tools: &[ToolDefinition], reply: &LLMResponse) {
        let key = Self::cache_key(messages, tools);
        let record = CacheRecord {
            written_at: chrono::Utc::now(),
            reply: reply.clone(),
        };
        match serde_json::to_string(&record) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(self.entry_path(&key), serialized) {
                    warn!("failed to write cache entry {}: {}", key, e);
                }
            }
            Err(e) => warn!("failed to serialize cache entry {}: {}", key, e),
        }
    }

    /// Count live and expired entries.
    pub fn stats(&self) -> CacheStats {
        let mut entries = 0;
        let mut expired = 0;
        let now = chrono::Utc::now();
        if let Ok(read_dir) = std::fs::read_dir(&self.dir) {
            for entry in read_dir.flatten() {
                let Ok(raw) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                let Ok(record) = serde_json::from_str::<CacheRecord>(&raw) else {
                    continue;
                };
                if now - record.written_at > self.ttl {
                    expired += 1;
                } else {
                    entries += 1;
                }
            }
        }
        CacheStats { entries, expired }
    }

    /// Delete all entries. Returns the number removed.
    pub fn clear(&self) -> usize {
        let mut cleared = 0;
        if let Ok(read_dir) = std::fs::read_dir(&self.dir) {
            for entry in read_dir.flatten() {
                if entry.path().extension().is_some_and(|e| e == "json")
                    && std::fs::remove_file(entry.path()).is_ok()
                {
                    cleared += 1;
                }
            }
        }
        cleared
    }
}

/// Produce a canonical JSON string with object keys sorted recursively.
/// This ensures cache keys are stable regardless of key insertion order.
fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonical_value(value)).unwrap_or_default()
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical_value(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}
