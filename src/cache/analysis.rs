use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::agents::AgentOutput;
use super::store::{BoundedCache, CacheEntryInfo, CacheStats};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    /// 0 disables expiry for entries stored without an explicit TTL.
    pub default_ttl_secs: u64,
    pub analysis_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 2000,
            default_ttl_secs: 3600,
            analysis_ttl_secs: 7200,
        }
    }
}

/// Order-independent digest of `data` under a namespace prefix.
///
/// `serde_json::Map` keeps keys sorted, so two objects with the same members
/// serialize identically regardless of insertion order.
pub fn fingerprint(prefix: &str, data: &Value) -> String {
    let canonical = serde_json::to_string(data).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{}:{:x}", prefix, hasher.finalize())
}

/// Agent outputs keyed by (input fingerprint, agent config version).
pub struct AnalysisCache {
    store: BoundedCache<AgentOutput>,
    ttl: Option<Duration>,
}

impl AnalysisCache {
    pub fn new(config: &CacheConfig) -> Self {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        Self {
            store: BoundedCache::new(config.max_size, secs(config.default_ttl_secs)),
            ttl: secs(config.analysis_ttl_secs),
        }
    }

    pub fn analysis_key(payload: &Value, producer_version: &str) -> String {
        fingerprint(
            "commit_analysis",
            &json!({ "input": fingerprint("payload", payload), "config_version": producer_version }),
        )
    }

    pub fn review_key(analysis: &Value, reviewer_version: &str) -> String {
        fingerprint(
            "quality_review",
            &json!({ "analysis": fingerprint("analysis", analysis), "config_version": reviewer_version }),
        )
    }

    pub fn get(&self, key: &str) -> Option<AgentOutput> {
        let hit = self.store.get(key);
        debug!(key, hit = hit.is_some(), "Analysis cache lookup");
        hit
    }

    pub fn put(&self, key: &str, output: &AgentOutput) {
        self.store.set_with_ttl(key, output.clone(), self.ttl);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.store.delete(key)
    }

    pub fn invalidate_all(&self) {
        self.store.clear();
    }

    pub fn cleanup_expired(&self) -> usize {
        self.store.cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        self.store.entries()
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache").field("store", &self.store).finish()
    }
}
