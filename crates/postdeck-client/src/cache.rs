//! Short-lived cache of token validation results.
//!
//! Entries expire a fixed time after they were inserted; reading never
//! extends them. Storage is a `moka` cache whose per-entry expiry is set on
//! insert only. Liveness is also checked against the tokio clock, so an
//! expired entry is evicted on the read that finds it, and every insert
//! sweeps out the others.

use moka::Expiry;
use moka::sync::Cache;
use postdeck_core::ValidationResult;
use std::time::Duration;
use tokio::time::Instant;

/// How long a backend verdict is trusted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
/// How long a failed validation request blocks retries.
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ValidationResult,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) <= self.ttl
    }
}

/// Expire each entry after its own TTL, counted from the last write.
struct EntryTtl;

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _token: &String,
        entry: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _token: &String,
        entry: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Token validation cache, one per session.
#[derive(Debug)]
pub struct TokenValidationCache {
    entries: Cache<String, CacheEntry>,
    ttl: Duration,
    failure_ttl: Duration,
}

impl Default for TokenValidationCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_FAILURE_TTL)
    }
}

impl TokenValidationCache {
    pub fn new(ttl: Duration, failure_ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().expire_after(EntryTtl).build(),
            ttl,
            failure_ttl,
        }
    }

    /// The cached result for `token`, if it has not expired.
    pub fn get(&self, token: &str) -> Option<ValidationResult> {
        let entry = self.entries.get(token)?;
        if entry.is_live(Instant::now()) {
            return Some(entry.result);
        }
        self.entries.invalidate(token);
        None
    }

    /// Cache a verdict returned by the backend, valid or not.
    pub fn insert(&self, token: &str, result: ValidationResult) {
        self.insert_for(token, result, self.ttl);
    }

    /// Cache the outcome of a validation request that did not complete.
    pub fn insert_failure(&self, token: &str, result: ValidationResult) {
        self.insert_for(token, result, self.failure_ttl);
    }

    fn insert_for(&self, token: &str, result: ValidationResult, ttl: Duration) {
        let now = Instant::now();
        self.entries.insert(
            token.to_string(),
            CacheEntry {
                result,
                inserted_at: now,
                ttl,
            },
        );
        self.sweep(now);
    }

    fn sweep(&self, now: Instant) {
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(token, _)| token)
            .collect();
        for token in expired {
            self.entries.invalidate(token.as_str());
        }
    }

    /// Forget everything, e.g. on logout.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postdeck_core::{RoleFlags, UserDescriptor};
    use tokio::time::advance;

    fn moderator() -> ValidationResult {
        ValidationResult::valid(UserDescriptor {
            id: Some(1),
            username: Some("mo".into()),
            email: None,
            roles: RoleFlags {
                is_moderator: true,
                ..Default::default()
            },
        })
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl() {
        let cache = TokenValidationCache::default();
        cache.insert("tok", moderator());
        advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("tok"), Some(moderator()));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_at_exactly_ttl_is_still_live() {
        let cache = TokenValidationCache::default();
        cache.insert("tok", moderator());
        advance(DEFAULT_TTL).await;
        assert!(cache.get("tok").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_evicted_and_stays_gone() {
        let cache = TokenValidationCache::default();
        cache.insert("tok", moderator());
        advance(DEFAULT_TTL + Duration::from_millis(1)).await;

        assert_eq!(cache.get("tok"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("tok"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_life() {
        let cache = TokenValidationCache::default();
        cache.insert("tok", moderator());
        for _ in 0..4 {
            advance(Duration::from_secs(60)).await;
            assert!(cache.get("tok").is_some());
        }
        advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("tok"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_restarts_the_clock() {
        let cache = TokenValidationCache::default();
        cache.insert("tok", moderator());
        advance(Duration::from_secs(200)).await;
        cache.insert("tok", moderator());
        advance(Duration::from_secs(200)).await;
        assert!(cache.get("tok").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn negative_results_are_cached() {
        let cache = TokenValidationCache::default();
        cache.insert("bad", ValidationResult::invalid("Invalid token"));
        advance(Duration::from_secs(120)).await;
        assert_eq!(cache.get("bad"), Some(ValidationResult::invalid("Invalid token")));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_use_the_short_ttl() {
        let cache = TokenValidationCache::default();
        cache.insert_failure("tok", ValidationResult::invalid("connection refused"));
        advance(DEFAULT_FAILURE_TTL).await;
        assert!(cache.get("tok").is_some());
        advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("tok"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_sweeps_expired_entries() {
        let cache = TokenValidationCache::default();
        cache.insert("old-1", moderator());
        cache.insert("old-2", moderator());
        advance(DEFAULT_TTL + Duration::from_secs(1)).await;

        cache.insert("fresh", moderator());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_everything() {
        let cache = TokenValidationCache::default();
        for token in ["a", "b", "c"] {
            cache.insert(token, moderator());
        }
        cache.clear();
        for token in ["a", "b", "c"] {
            assert_eq!(cache.get(token), None);
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn storage_expires_on_the_wall_clock_too() {
        let cache = TokenValidationCache::new(Duration::from_millis(20), Duration::from_millis(20));
        cache.insert("tok", moderator());
        std::thread::sleep(Duration::from_millis(100));
        assert!(cache.is_empty());
    }
}
