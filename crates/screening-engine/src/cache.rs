// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Multi-tier caching layer for caller evaluation
//!
//! Four independent tiers (whitelist entries, spam profiles, per-user
//! interaction records, extracted features) share one lazy-expiry
//! implementation: entries are validated against the tier TTL on read and
//! evicted on the spot when stale. Tiers evict oldest-first when full and
//! proactively clean up expired entries at 90% utilization. A cache failure
//! is never allowed to fail an evaluation; the degraded flag only redirects
//! reads and writes to the backing stores.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::{PhoneHash, PhoneNumber};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    config::CacheConfig,
    features::PhoneFeatures,
    metrics,
};
use screening_store::{SpamProfile, UserSpamInteraction, WhitelistEntry};

/// Cache tier identifiers used in statistics and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Whitelist entries keyed by (user, phone)
    Whitelist,
    /// Spam profiles keyed by phone hash
    SpamProfile,
    /// Per-user interaction records keyed by (user, phone hash)
    UserConfig,
    /// Extracted feature vectors keyed by (phone, context fingerprint)
    MlFeatures,
}

impl CacheTier {
    /// Returns the snake_case tier name used in metrics labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist",
            Self::SpamProfile => "spam_profile",
            Self::UserConfig => "user_config",
            Self::MlFeatures => "ml_features",
        }
    }

    /// All tiers, in evaluation order
    pub const fn all() -> [Self; 4] {
        [
            Self::Whitelist,
            Self::SpamProfile,
            Self::UserConfig,
            Self::MlFeatures,
        ]
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cache key for the whitelist tier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WhitelistCacheKey {
    /// Owning user
    pub user_id: Uuid,
    /// Canonical phone digits
    pub phone: String,
}

impl WhitelistCacheKey {
    /// Create a key from the owning user and canonical phone
    pub fn new(user_id: Uuid, phone: &PhoneNumber) -> Self {
        Self {
            user_id,
            phone: phone.as_str().to_string(),
        }
    }
}

/// Cache key for the user interaction tier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserConfigCacheKey {
    /// Owning user
    pub user_id: Uuid,
    /// Phone hash, hex
    pub phone_hash: String,
}

impl UserConfigCacheKey {
    /// Create a key from the owning user and phone hash
    pub fn new(user_id: Uuid, phone_hash: &PhoneHash) -> Self {
        Self {
            user_id,
            phone_hash: phone_hash.as_str().to_string(),
        }
    }
}

/// Cache key for the extracted feature tier
///
/// Includes the feature schema version so a schema bump invalidates every
/// previously cached vector without an explicit flush.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureCacheKey {
    /// Canonical phone digits
    pub phone: String,
    /// Fingerprint of the call context the vector was extracted from
    pub context_fingerprint: u64,
    /// Feature schema version
    pub schema_version: u32,
}

impl FeatureCacheKey {
    /// Create a key from the phone, context fingerprint and schema version
    pub fn new(phone: &PhoneNumber, context_fingerprint: u64, schema_version: u32) -> Self {
        Self {
            phone: phone.as_str().to_string(),
            context_fingerprint,
            schema_version,
        }
    }
}

/// Cached value with timestamp and access count
#[derive(Debug, Clone)]
struct CacheItem<T> {
    /// The cached value
    value: T,
    /// When this value was cached
    cached_at: Instant,
    /// How many times this entry has been read
    access_count: u64,
}

impl<T> CacheItem<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
            access_count: 0,
        }
    }

    /// Check if this cached value is still valid for the tier TTL
    fn is_valid(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }

    /// Mark this entry as accessed (best-effort hit counting)
    fn accessed(&mut self) {
        self.access_count += 1;
    }

    /// Approximate last access time for oldest-first eviction
    fn last_access_time(&self) -> Instant {
        let access_aging = Duration::from_millis(self.access_count.min(1000));
        self.cached_at + access_aging
    }
}

/// Multi-tier in-memory cache for the evaluation cycle
#[derive(Debug)]
pub struct ScreeningCache {
    whitelist: DashMap<WhitelistCacheKey, CacheItem<WhitelistEntry>>,
    spam_profiles: DashMap<String, CacheItem<SpamProfile>>,
    user_config: DashMap<UserConfigCacheKey, CacheItem<UserSpamInteraction>>,
    ml_features: DashMap<FeatureCacheKey, CacheItem<PhoneFeatures>>,
    whitelist_ttl: Duration,
    spam_profile_ttl: Duration,
    user_config_ttl: Duration,
    ml_features_ttl: Duration,
    /// Maximum entries per tier
    max_entries: usize,
    /// Operational flag: when set, callers bypass the cache entirely
    degraded: AtomicBool,
    /// Cache statistics
    stats: DashMap<String, u64>,
}

impl ScreeningCache {
    /// Create a cache with tier TTLs taken from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_ttls(
            config.whitelist_ttl(),
            config.spam_profile_ttl(),
            config.user_config_ttl(),
            config.ml_features_ttl(),
            config.max_entries_per_tier,
        )
    }

    /// Create a cache with explicit tier TTLs
    pub fn with_ttls(
        whitelist_ttl: Duration,
        spam_profile_ttl: Duration,
        user_config_ttl: Duration,
        ml_features_ttl: Duration,
        max_entries: usize,
    ) -> Self {
        Self {
            whitelist: DashMap::new(),
            spam_profiles: DashMap::new(),
            user_config: DashMap::new(),
            ml_features: DashMap::new(),
            whitelist_ttl,
            spam_profile_ttl,
            user_config_ttl,
            ml_features_ttl,
            max_entries,
            degraded: AtomicBool::new(false),
            stats: DashMap::new(),
        }
    }

    /// Get a cached whitelist entry
    pub fn get_whitelist(&self, user_id: Uuid, phone: &PhoneNumber) -> Option<WhitelistEntry> {
        let key = WhitelistCacheKey::new(user_id, phone);
        Self::get_item(
            &self.whitelist,
            &key,
            self.whitelist_ttl,
            CacheTier::Whitelist,
            &self.stats,
        )
    }

    /// Store a whitelist entry, keyed by its owning user and phone
    pub fn store_whitelist(&self, entry: WhitelistEntry) {
        let key = WhitelistCacheKey::new(entry.user_id, &entry.phone);
        self.store_item(&self.whitelist, key, entry, self.whitelist_ttl, CacheTier::Whitelist);
    }

    /// Drop a whitelist entry, if cached
    pub fn invalidate_whitelist(&self, user_id: Uuid, phone: &PhoneNumber) {
        let key = WhitelistCacheKey::new(user_id, phone);
        if self.whitelist.remove(&key).is_some() {
            Self::increment_stat(&self.stats, "cache_invalidations");
            trace!(tier = %CacheTier::Whitelist, "invalidated cache entry");
        }
    }

    /// Get a cached spam profile
    pub fn get_spam_profile(&self, phone_hash: &PhoneHash) -> Option<SpamProfile> {
        let key = phone_hash.as_str().to_string();
        Self::get_item(
            &self.spam_profiles,
            &key,
            self.spam_profile_ttl,
            CacheTier::SpamProfile,
            &self.stats,
        )
    }

    /// Store a spam profile, keyed by its phone hash
    pub fn store_spam_profile(&self, profile: SpamProfile) {
        let key = profile.phone_hash.as_str().to_string();
        self.store_item(
            &self.spam_profiles,
            key,
            profile,
            self.spam_profile_ttl,
            CacheTier::SpamProfile,
        );
    }

    /// Get a cached user interaction record
    pub fn get_user_interaction(
        &self,
        user_id: Uuid,
        phone_hash: &PhoneHash,
    ) -> Option<UserSpamInteraction> {
        let key = UserConfigCacheKey::new(user_id, phone_hash);
        Self::get_item(
            &self.user_config,
            &key,
            self.user_config_ttl,
            CacheTier::UserConfig,
            &self.stats,
        )
    }

    /// Store a user interaction record
    pub fn store_user_interaction(&self, interaction: UserSpamInteraction) {
        let key = UserConfigCacheKey::new(interaction.user_id, &interaction.phone_hash);
        self.store_item(
            &self.user_config,
            key,
            interaction,
            self.user_config_ttl,
            CacheTier::UserConfig,
        );
    }

    /// Get a cached feature vector
    pub fn get_features(&self, key: &FeatureCacheKey) -> Option<PhoneFeatures> {
        Self::get_item(
            &self.ml_features,
            key,
            self.ml_features_ttl,
            CacheTier::MlFeatures,
            &self.stats,
        )
    }

    /// Store a feature vector
    pub fn store_features(&self, key: FeatureCacheKey, features: PhoneFeatures) {
        self.store_item(
            &self.ml_features,
            key,
            features,
            self.ml_features_ttl,
            CacheTier::MlFeatures,
        );
    }

    /// Whether the cache is in degraded mode
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Put the cache into degraded mode
    ///
    /// Callers bypass every tier until [`Self::clear_degraded`]; evaluations
    /// keep working against the backing stores.
    pub fn mark_degraded(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(reason, "cache entering degraded mode");
            metrics::set_cache_degraded(true);
        }
    }

    /// Leave degraded mode
    pub fn clear_degraded(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("cache leaving degraded mode");
            metrics::set_cache_degraded(false);
        }
    }

    /// Generic lazy-expiry read shared by all tiers
    fn get_item<K, V>(
        map: &DashMap<K, CacheItem<V>>,
        key: &K,
        ttl: Duration,
        tier: CacheTier,
        stats: &DashMap<String, u64>,
    ) -> Option<V>
    where
        K: std::hash::Hash + Eq + Clone,
        V: Clone,
    {
        if let Some(mut cached) = map.get_mut(key) {
            if cached.is_valid(ttl) {
                cached.accessed();
                Self::increment_stat(stats, "cache_hits");
                metrics::record_cache_op(tier, "hit");
                trace!(tier = %tier, "cache hit");
                return Some(cached.value.clone());
            }
            // Expired: evict on the spot and fall through to a miss
            drop(cached);
            map.remove(key);
            Self::increment_stat(stats, "cache_expired");
            metrics::record_cache_op(tier, "expired");
            debug!(tier = %tier, "expired cache entry removed");
        }

        Self::increment_stat(stats, "cache_misses");
        metrics::record_cache_op(tier, "miss");
        None
    }

    /// Generic capacity-managed write shared by all tiers
    fn store_item<K, V>(
        &self,
        map: &DashMap<K, CacheItem<V>>,
        key: K,
        value: V,
        ttl: Duration,
        tier: CacheTier,
    ) where
        K: std::hash::Hash + Eq + Clone,
        V: Clone,
    {
        let current_size = map.len();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capacity_threshold = (self.max_entries as f64 * 0.9) as usize;

        if current_size >= self.max_entries {
            Self::evict_oldest(map, tier, &self.stats);
        } else if current_size >= capacity_threshold {
            Self::cleanup_tier(map, ttl, tier, &self.stats);
        }

        map.insert(key, CacheItem::new(value));
        Self::increment_stat(&self.stats, "cache_stores");
        metrics::record_cache_op(tier, "store");
        trace!(
            tier = %tier,
            size = map.len(),
            max = self.max_entries,
            "stored cache entry"
        );
    }

    /// Evict the least recently used entry of one tier
    fn evict_oldest<K, V>(map: &DashMap<K, CacheItem<V>>, tier: CacheTier, stats: &DashMap<String, u64>)
    where
        K: std::hash::Hash + Eq + Clone,
    {
        let mut lru_key: Option<K> = None;
        let mut lru_time: Option<Instant> = None;
        let mut lru_access_count = u64::MAX;

        for item in map.iter() {
            let entry = item.value();
            let effective_time = entry.last_access_time();

            let should_evict = match lru_time {
                None => true,
                Some(current_lru_time) => {
                    effective_time < current_lru_time
                        || (effective_time == current_lru_time
                            && entry.access_count < lru_access_count)
                }
            };

            if should_evict {
                lru_time = Some(effective_time);
                lru_access_count = entry.access_count;
                lru_key = Some(item.key().clone());
            }
        }

        if let Some(key) = lru_key
            && let Some((_, entry)) = map.remove(&key)
        {
            Self::increment_stat(stats, "cache_evictions");
            metrics::record_cache_op(tier, "eviction");
            info!(
                tier = %tier,
                access_count = entry.access_count,
                age_ms = entry.cached_at.elapsed().as_millis(),
                remaining = map.len(),
                "evicted oldest cache entry due to capacity limit"
            );
        }
    }

    /// Remove every expired entry of one tier
    fn cleanup_tier<K, V>(
        map: &DashMap<K, CacheItem<V>>,
        ttl: Duration,
        tier: CacheTier,
        stats: &DashMap<String, u64>,
    ) -> usize
    where
        K: std::hash::Hash + Eq + Clone,
    {
        let mut keys_to_remove = Vec::new();
        for item in map.iter() {
            if !item.value().is_valid(ttl) {
                keys_to_remove.push(item.key().clone());
            }
        }

        let mut removed_count = 0;
        for key in keys_to_remove {
            if map.remove(&key).is_some() {
                removed_count += 1;
            }
        }

        if removed_count > 0 {
            for _ in 0..removed_count {
                Self::increment_stat(stats, "cache_expired");
            }
            metrics::record_cache_op(tier, "expired");
            info!(
                tier = %tier,
                removed_entries = removed_count,
                remaining = map.len(),
                "cleaned up expired cache entries"
            );
        }

        removed_count
    }

    /// Clean up expired entries across all tiers (maintenance operation)
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        removed += Self::cleanup_tier(
            &self.whitelist,
            self.whitelist_ttl,
            CacheTier::Whitelist,
            &self.stats,
        );
        removed += Self::cleanup_tier(
            &self.spam_profiles,
            self.spam_profile_ttl,
            CacheTier::SpamProfile,
            &self.stats,
        );
        removed += Self::cleanup_tier(
            &self.user_config,
            self.user_config_ttl,
            CacheTier::UserConfig,
            &self.stats,
        );
        removed += Self::cleanup_tier(
            &self.ml_features,
            self.ml_features_ttl,
            CacheTier::MlFeatures,
            &self.stats,
        );
        removed
    }

    /// Clear all tiers and statistics
    pub fn clear_all(&self) {
        self.whitelist.clear();
        self.spam_profiles.clear();
        self.user_config.clear();
        self.ml_features.clear();
        self.stats.clear();
        debug!("cleared all cache tiers and statistics");
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let cache_hits = self.get_stat("cache_hits");
        let cache_misses = self.get_stat("cache_misses");
        let total_requests = cache_hits + cache_misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total_requests > 0 {
            cache_hits as f64 / total_requests as f64
        } else {
            0.0
        };

        let total_entries = self.whitelist.len()
            + self.spam_profiles.len()
            + self.user_config.len()
            + self.ml_features.len();
        #[allow(clippy::cast_precision_loss)]
        let utilization_rate = if self.max_entries > 0 {
            total_entries as f64 / (self.max_entries * 4) as f64
        } else {
            0.0
        };

        CacheStats {
            whitelist_count: self.whitelist.len(),
            spam_profile_count: self.spam_profiles.len(),
            user_config_count: self.user_config.len(),
            ml_features_count: self.ml_features.len(),
            cache_hits,
            cache_misses,
            cache_stores: self.get_stat("cache_stores"),
            cache_evictions: self.get_stat("cache_evictions"),
            cache_expired: self.get_stat("cache_expired"),
            hit_rate,
            utilization_rate,
            max_entries_per_tier: self.max_entries,
            degraded: self.is_degraded(),
        }
    }

    fn increment_stat(stats: &DashMap<String, u64>, key: &str) {
        stats
            .entry(key.to_string())
            .and_modify(|v| *v += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> u64 {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Cached whitelist entries
    pub whitelist_count: usize,
    /// Cached spam profiles
    pub spam_profile_count: usize,
    /// Cached user interaction records
    pub user_config_count: usize,
    /// Cached feature vectors
    pub ml_features_count: usize,
    /// Cache hit count across tiers
    pub cache_hits: u64,
    /// Cache miss count across tiers
    pub cache_misses: u64,
    /// Number of stored entries across tiers
    pub cache_stores: u64,
    /// Number of capacity evictions
    pub cache_evictions: u64,
    /// Number of lazily expired entries
    pub cache_expired: u64,
    /// Cache hit rate (0.0 to 1.0)
    pub hit_rate: f64,
    /// Utilization across all tiers (0.0 to 1.0)
    pub utilization_rate: f64,
    /// Configured per-tier capacity
    pub max_entries_per_tier: usize,
    /// Whether the cache is in degraded mode
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use std::thread;

    use shared_types::{ConfidenceScore, RiskScore, SpamCategory};

    use super::*;
    use crate::features::PhoneFeatures;

    fn test_cache(ttl: Duration) -> ScreeningCache {
        ScreeningCache::with_ttls(ttl, ttl, ttl, ttl, 1000)
    }

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("+8613800000001").unwrap()
    }

    fn profile_for(phone: &PhoneNumber) -> SpamProfile {
        SpamProfile::from_observation(
            phone.hash(),
            SpamCategory::Loan,
            RiskScore::new(0.8).unwrap(),
            ConfidenceScore::new(0.92).unwrap(),
            chrono::Utc::now(),
        )
    }

    #[test]
    fn round_trip_within_ttl() {
        let cache = test_cache(Duration::from_secs(60));
        let phone = phone();
        let profile = profile_for(&phone);

        assert!(cache.get_spam_profile(&phone.hash()).is_none());
        cache.store_spam_profile(profile.clone());
        let cached = cache.get_spam_profile(&phone.hash()).unwrap();
        assert_eq!(cached.category, SpamCategory::Loan);
        assert_eq!(cached.risk_score, profile.risk_score);
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_evicted() {
        let cache = test_cache(Duration::from_millis(10));
        let phone = phone();
        cache.store_spam_profile(profile_for(&phone));

        thread::sleep(Duration::from_millis(15));

        assert!(cache.get_spam_profile(&phone.hash()).is_none());
        assert_eq!(cache.stats().spam_profile_count, 0);
        assert_eq!(cache.stats().cache_expired, 1);
    }

    #[test]
    fn whitelist_tier_keys_by_user_and_phone() {
        let cache = test_cache(Duration::from_secs(60));
        let phone = phone();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        cache.store_whitelist(WhitelistEntry::manual(user_a, phone.clone()));
        assert!(cache.get_whitelist(user_a, &phone).is_some());
        assert!(cache.get_whitelist(user_b, &phone).is_none());

        cache.invalidate_whitelist(user_a, &phone);
        assert!(cache.get_whitelist(user_a, &phone).is_none());
    }

    #[test]
    fn user_interaction_round_trip() {
        let cache = test_cache(Duration::from_secs(60));
        let phone = phone();
        let user = Uuid::new_v4();
        let interaction = UserSpamInteraction::new(user, phone.hash());

        cache.store_user_interaction(interaction);
        assert!(cache.get_user_interaction(user, &phone.hash()).is_some());
    }

    #[test]
    fn feature_tier_keys_include_schema_version() {
        let cache = test_cache(Duration::from_secs(60));
        let phone = phone();
        let features = PhoneFeatures::empty(&phone);

        let key_v1 = FeatureCacheKey::new(&phone, 42, 1);
        cache.store_features(key_v1.clone(), features);

        assert!(cache.get_features(&key_v1).is_some());
        // Different fingerprint or schema never aliases
        assert!(cache.get_features(&FeatureCacheKey::new(&phone, 43, 1)).is_none());
        assert!(cache.get_features(&FeatureCacheKey::new(&phone, 42, 2)).is_none());
    }

    #[test]
    fn capacity_eviction_drops_oldest() {
        let cache = ScreeningCache::with_ttls(
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            2,
        );

        let phone_a = PhoneNumber::parse("8613800000001").unwrap();
        let phone_b = PhoneNumber::parse("8613800000002").unwrap();
        let phone_c = PhoneNumber::parse("8613800000003").unwrap();

        cache.store_spam_profile(profile_for(&phone_a));
        // Touch A so it ages past B in the eviction heuristic
        cache.get_spam_profile(&phone_a.hash());
        cache.get_spam_profile(&phone_a.hash());
        cache.store_spam_profile(profile_for(&phone_b));

        cache.store_spam_profile(profile_for(&phone_c));

        assert_eq!(cache.stats().spam_profile_count, 2);
        assert_eq!(cache.stats().cache_evictions, 1);
        assert!(cache.get_spam_profile(&phone_a.hash()).is_some());
        assert!(cache.get_spam_profile(&phone_b.hash()).is_none());
        assert!(cache.get_spam_profile(&phone_c.hash()).is_some());
    }

    #[test]
    fn hit_rate_reflects_traffic() {
        let cache = test_cache(Duration::from_secs(60));
        let phone = phone();

        cache.get_spam_profile(&phone.hash()); // miss
        cache.store_spam_profile(profile_for(&phone));
        cache.get_spam_profile(&phone.hash()); // hit

        let stats = cache.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn degraded_flag_round_trip() {
        let cache = test_cache(Duration::from_secs(60));
        assert!(!cache.is_degraded());

        cache.mark_degraded("operator request");
        assert!(cache.is_degraded());
        assert!(cache.stats().degraded);

        cache.clear_degraded();
        assert!(!cache.is_degraded());
    }

    #[test]
    fn cleanup_sweeps_all_tiers() {
        let cache = test_cache(Duration::from_millis(10));
        let phone = phone();
        let user = Uuid::new_v4();

        cache.store_spam_profile(profile_for(&phone));
        cache.store_whitelist(WhitelistEntry::manual(user, phone.clone()));
        cache.store_user_interaction(UserSpamInteraction::new(user, phone.hash()));
        cache.store_features(FeatureCacheKey::new(&phone, 1, 1), PhoneFeatures::empty(&phone));

        thread::sleep(Duration::from_millis(15));

        let removed = cache.cleanup_expired();
        assert_eq!(removed, 4);
        assert_eq!(cache.stats().spam_profile_count, 0);
        assert_eq!(cache.stats().whitelist_count, 0);
    }
}
