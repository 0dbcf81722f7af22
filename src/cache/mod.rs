//! Resolution result cache.
//!
//! Bounded `(normalized_name, type) → ResolutionResult` mapping with TTL.
//! REVIEW results are never written: a pending adjudication must not pin an
//! unresolved answer. The orchestrator performs the double-checked lookup
//! (miss → lock → re-check → resolve → populate); the cache itself only has
//! to be safe under concurrent access.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{EntityType, MatchOutcome};
use crate::resolve::ResolutionResult;

/// Cache key: the normalized name plus the entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub normalized_name: String,
	pub entity_type: EntityType,
}

impl CacheKey {
	pub fn new(normalized_name: impl Into<String>, entity_type: EntityType) -> Self {
		Self {
			normalized_name: normalized_name.into(),
			entity_type,
		}
	}
}

/// Cache capability. Async so distributed implementations (e.g. Redis) can
/// suspend; the in-process implementation never does.
#[async_trait]
pub trait ResolutionCache: Send + Sync {
	async fn get(&self, key: &CacheKey) -> Option<ResolutionResult>;

	/// Store a result. Implementations must refuse REVIEW results.
	async fn put(&self, key: CacheKey, result: ResolutionResult);

	async fn invalidate(&self, key: &CacheKey);

	async fn len(&self) -> usize;
}

/// In-process cache with TTL and a capacity bound. At capacity, expired
/// entries are evicted first, then an arbitrary entry.
pub struct InMemoryResolutionCache {
	entries: DashMap<CacheKey, (ResolutionResult, Instant)>,
	ttl: Duration,
	capacity: usize,
}

impl InMemoryResolutionCache {
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		Self {
			entries: DashMap::new(),
			ttl,
			capacity,
		}
	}

	fn evict_for_insert(&self) {
		if self.entries.len() < self.capacity {
			return;
		}
		let now = Instant::now();
		let expired: Vec<CacheKey> = self
			.entries
			.iter()
			.filter(|e| now.duration_since(e.value().1) >= self.ttl)
			.map(|e| e.key().clone())
			.collect();
		for key in expired {
			self.entries.remove(&key);
		}
		while self.entries.len() >= self.capacity {
			let Some(victim) = self.entries.iter().next().map(|e| e.key().clone()) else {
				break;
			};
			self.entries.remove(&victim);
		}
	}
}

#[async_trait]
impl ResolutionCache for InMemoryResolutionCache {
	async fn get(&self, key: &CacheKey) -> Option<ResolutionResult> {
		let hit = self.entries.get(key)?;
		let (result, inserted) = hit.value();
		if inserted.elapsed() >= self.ttl {
			drop(hit);
			self.entries.remove(key);
			return None;
		}
		Some(result.clone())
	}

	async fn put(&self, key: CacheKey, result: ResolutionResult) {
		if result.decision == MatchOutcome::Review {
			return;
		}
		self.evict_for_insert();
		self.entries.insert(key, (result, Instant::now()));
	}

	async fn invalidate(&self, key: &CacheKey) {
		self.entries.remove(key);
	}

	async fn len(&self) -> usize {
		self.entries.len()
	}
}

/// Cache that stores nothing; the default when no cache is configured.
pub struct NoopResolutionCache;

#[async_trait]
impl ResolutionCache for NoopResolutionCache {
	async fn get(&self, _key: &CacheKey) -> Option<ResolutionResult> {
		None
	}

	async fn put(&self, _key: CacheKey, _result: ResolutionResult) {}

	async fn invalidate(&self, _key: &CacheKey) {}

	async fn len(&self) -> usize {
		0
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use crate::model::MatchOutcome;
	use crate::resolve::ResolutionResult;

	fn result(decision: MatchOutcome) -> ResolutionResult {
		ResolutionResult::test_fixture("e-1", EntityType::Company, decision)
	}

	#[tokio::test]
	async fn get_put_round_trip() {
		let cache = InMemoryResolutionCache::new(8, Duration::from_secs(60));
		let key = CacheKey::new("acme", EntityType::Company);
		assert!(cache.get(&key).await.is_none());
		cache.put(key.clone(), result(MatchOutcome::AutoMerge)).await;
		let hit = cache.get(&key).await.unwrap();
		assert_eq!(hit.entity.id, "e-1");
	}

	#[tokio::test]
	async fn review_results_are_never_written() {
		let cache = InMemoryResolutionCache::new(8, Duration::from_secs(60));
		let key = CacheKey::new("acme", EntityType::Company);
		cache.put(key.clone(), result(MatchOutcome::Review)).await;
		assert!(cache.get(&key).await.is_none());
		assert_eq!(cache.len().await, 0);
	}

	#[tokio::test]
	async fn expired_entries_miss() {
		let cache = InMemoryResolutionCache::new(8, Duration::from_millis(10));
		let key = CacheKey::new("acme", EntityType::Company);
		cache.put(key.clone(), result(MatchOutcome::AutoMerge)).await;
		tokio::time::sleep(Duration::from_millis(25)).await;
		assert!(cache.get(&key).await.is_none());
	}

	#[tokio::test]
	async fn capacity_is_bounded() {
		let cache = InMemoryResolutionCache::new(4, Duration::from_secs(60));
		for i in 0..16 {
			let key = CacheKey::new(format!("name-{i}"), EntityType::Company);
			cache.put(key, result(MatchOutcome::AutoMerge)).await;
		}
		assert!(cache.len().await <= 4);
	}

	#[tokio::test]
	async fn type_disambiguates_keys() {
		let cache = InMemoryResolutionCache::new(8, Duration::from_secs(60));
		cache
			.put(
				CacheKey::new("mercury", EntityType::Company),
				result(MatchOutcome::AutoMerge),
			)
			.await;
		assert!(
			cache
				.get(&CacheKey::new("mercury", EntityType::Product))
				.await
				.is_none()
		);
	}
}
