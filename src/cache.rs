// Response cache for catalogue reads
// Property listings, property details and reviews are read far more often than they change,
// so they are kept for a short TTL. Bookings and auth calls are never cached.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::api::{ApiError, RentalApi};
use crate::models::{
    AuthUser, Booking, BookingStatus, Credentials, NewBooking, NewReview, ProfileUpdate, Property,
    PropertyInput, PropertyPage, Registration, Review, SearchParams,
};

#[derive(Debug, Default)]
pub struct CacheStats {
    pub items_count: AtomicUsize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub eviction_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub invalidated_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
    pub invalidated_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            default_ttl_seconds: 300,
        }
    }
}

// Cache key for a resource and its identifying parameters
pub fn create_cache_key(resource: &str, id: &str) -> String {
    format!("{}:{}", resource, id)
}

struct CacheEntry {
    data: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    stats: CacheStats,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    pub fn store(&self, key: &str, data: Vec<u8>, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| Duration::from_secs(self.config.default_ttl_seconds));

        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_entries {
            self.remove_oldest_entry();
        }

        let entry = CacheEntry {
            data,
            created_at: Instant::now(),
            ttl,
        };
        if self.entries.insert(key.to_string(), entry).is_none() {
            self.stats.items_count.fetch_add(1, Ordering::SeqCst);
        }
        trace!(key, "cached response");
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                return Some(entry.data.clone());
            }
            Some(_) => true,
            None => false,
        };

        // The read guard is released before removing
        if expired && self.remove_entry(key) {
            self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
        }
        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
        None
    }

    /// Drops every entry whose key starts with `prefix`; returns how many were dropped.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let count = keys.iter().filter(|key| self.remove_entry(key)).count();
        if count > 0 {
            self.stats
                .invalidated_count
                .fetch_add(count, Ordering::SeqCst);
            debug!(prefix, count, "invalidated cached responses");
        }
        count
    }

    // Drops exactly `key`, leaving keys that merely share its prefix
    pub fn invalidate_key(&self, key: &str) -> bool {
        let removed = self.remove_entry(key);
        if removed {
            self.stats.invalidated_count.fetch_add(1, Ordering::SeqCst);
            debug!(key, "invalidated cached response");
        }
        removed
    }

    pub fn clear(&self) -> usize {
        self.invalidate("")
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.stats.items_count.load(Ordering::SeqCst),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            eviction_count: self.stats.eviction_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            invalidated_count: self.stats.invalidated_count.load(Ordering::SeqCst),
        }
    }

    fn remove_entry(&self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.stats.items_count.fetch_sub(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    fn remove_oldest_entry(&self) {
        let oldest_key = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest_key {
            if self.remove_entry(&key) {
                self.stats.eviction_count.fetch_add(1, Ordering::SeqCst);
                debug!(key = %key, "evicted oldest cached response");
            }
        }
    }
}

/// Caching decorator over any [`RentalApi`].
pub struct CachedApi<A> {
    inner: A,
    cache: QueryCache,
}

impl<A: RentalApi> CachedApi<A> {
    pub fn new(inner: A, config: CacheConfig) -> Self {
        Self {
            inner,
            cache: QueryCache::new(config),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.cache.get(key)?;
        serde_json::from_slice(&data).ok()
    }

    fn remember<T: Serialize>(&self, key: &str, value: &T) {
        if let Ok(data) = serde_json::to_vec(value) {
            self.cache.store(key, data, None);
        }
    }

    fn forget_property(&self, id: &str) {
        self.cache.invalidate_key(&create_cache_key("property", id));
        self.cache.invalidate_key(&create_cache_key("reviews", id));
        self.cache.invalidate("properties:");
    }
}

#[async_trait]
impl<A: RentalApi> RentalApi for CachedApi<A> {
    async fn register(&self, registration: &Registration) -> Result<AuthUser, ApiError> {
        self.inner.register(registration).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthUser, ApiError> {
        self.inner.login(credentials).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<AuthUser, ApiError> {
        self.inner.update_profile(update).await
    }

    async fn list_properties(&self, page: u32, keyword: &str) -> Result<PropertyPage, ApiError> {
        let key = create_cache_key("properties:list", &format!("{}:{}", page, keyword));
        if let Some(page) = self.lookup(&key) {
            return Ok(page);
        }
        let result = self.inner.list_properties(page, keyword).await?;
        self.remember(&key, &result);
        Ok(result)
    }

    async fn get_property(&self, id: &str) -> Result<Property, ApiError> {
        let key = create_cache_key("property", id);
        if let Some(property) = self.lookup(&key) {
            return Ok(property);
        }
        let property = self.inner.get_property(id).await?;
        self.remember(&key, &property);
        Ok(property)
    }

    async fn search_properties(&self, params: &SearchParams) -> Result<PropertyPage, ApiError> {
        let key = create_cache_key("properties:search", &params.cache_fragment());
        if let Some(page) = self.lookup(&key) {
            return Ok(page);
        }
        let result = self.inner.search_properties(params).await?;
        self.remember(&key, &result);
        Ok(result)
    }

    async fn create_property(&self, input: &PropertyInput) -> Result<Property, ApiError> {
        let property = self.inner.create_property(input).await?;
        self.cache.invalidate("properties:");
        Ok(property)
    }

    async fn update_property(
        &self,
        id: &str,
        input: &PropertyInput,
    ) -> Result<Property, ApiError> {
        let property = self.inner.update_property(id, input).await?;
        self.forget_property(id);
        Ok(property)
    }

    async fn delete_property(&self, id: &str) -> Result<(), ApiError> {
        self.inner.delete_property(id).await?;
        self.forget_property(id);
        Ok(())
    }

    async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ApiError> {
        self.inner.create_booking(booking).await
    }

    async fn my_bookings(&self) -> Result<Vec<Booking>, ApiError> {
        self.inner.my_bookings().await
    }

    async fn get_booking(&self, id: &str) -> Result<Booking, ApiError> {
        self.inner.get_booking(id).await
    }

    async fn update_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
    ) -> Result<Booking, ApiError> {
        self.inner.update_booking_status(id, status).await
    }

    async fn pay_booking(&self, id: &str) -> Result<Booking, ApiError> {
        self.inner.pay_booking(id).await
    }

    async fn create_review(
        &self,
        property_id: &str,
        review: &NewReview,
    ) -> Result<Review, ApiError> {
        let review = self.inner.create_review(property_id, review).await?;
        // Rating and review count of the property change too
        self.cache
            .invalidate_key(&create_cache_key("reviews", property_id));
        self.cache
            .invalidate_key(&create_cache_key("property", property_id));
        Ok(review)
    }

    async fn property_reviews(&self, property_id: &str) -> Result<Vec<Review>, ApiError> {
        let key = create_cache_key("reviews", property_id);
        if let Some(reviews) = self.lookup(&key) {
            return Ok(reviews);
        }
        let reviews = self.inner.property_reviews(property_id).await?;
        self.remember(&key, &reviews);
        Ok(reviews)
    }

    async fn delete_review(&self, id: &str) -> Result<(), ApiError> {
        self.inner.delete_review(id).await?;
        // The owning property is unknown here
        self.cache.invalidate("reviews:");
        self.cache.invalidate("property:");
        Ok(())
    }
}
