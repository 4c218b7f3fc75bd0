//! Time-bounded cache for ledger reads.
//!
//! Entries are kept in memory and served only while younger than the
//! configured maximum age. Every insert sweeps the entries that have expired.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Whether a read may be answered from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
	/// Serve a fresh enough cached value, otherwise fetch and store.
	Cached,
	/// Always fetch, then store the result.
	Bypass,
}

/// In-memory cache whose entries expire after `max_age`.
pub struct TtlCache<K, V> {
	max_age: Duration,
	entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
	K: Eq + Hash,
	V: Clone,
{
	pub fn new(max_age: Duration) -> Self {
		Self {
			max_age,
			entries: RwLock::new(HashMap::new()),
		}
	}

	/// Returns the cached value if it was stored less than `max_age` ago.
	pub async fn get(&self, key: &K) -> Option<V> {
		let entries = self.entries.read().await;
		entries
			.get(key)
			.filter(|(stored_at, _)| stored_at.elapsed() < self.max_age)
			.map(|(_, value)| value.clone())
	}

	/// Stores `value` and drops every expired entry.
	pub async fn insert(&self, key: K, value: V) {
		let mut entries = self.entries.write().await;
		let max_age = self.max_age;
		let before = entries.len();
		entries.retain(|_, (stored_at, _)| stored_at.elapsed() < max_age);
		let removed = before - entries.len();
		if removed > 0 {
			tracing::trace!(removed, "Dropped expired cache entries");
		}
		entries.insert(key, (Instant::now(), value));
	}

	/// Number of stored entries, expired or not.
	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn clear(&self) {
		self.entries.write().await.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn test_entries_expire() {
		let cache = TtlCache::new(Duration::from_secs(60));
		cache.insert("key", 1u64).await;
		assert_eq!(cache.get(&"key").await, Some(1));

		tokio::time::advance(Duration::from_secs(59)).await;
		assert_eq!(cache.get(&"key").await, Some(1));

		tokio::time::advance(Duration::from_secs(1)).await;
		assert_eq!(cache.get(&"key").await, None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_zero_max_age_never_serves() {
		let cache = TtlCache::new(Duration::ZERO);
		cache.insert("key", 1u64).await;
		assert_eq!(cache.get(&"key").await, None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_insert_drops_expired_entries() {
		let cache = TtlCache::new(Duration::from_secs(60));
		for cid in 0..1000u32 {
			cache.insert(format!("Qm{cid}"), cid).await;
		}
		assert_eq!(cache.len().await, 1000);

		tokio::time::advance(Duration::from_secs(30)).await;
		cache.insert("QmFresh".to_string(), 1000).await;
		assert_eq!(cache.len().await, 1001);

		tokio::time::advance(Duration::from_secs(3600)).await;
		cache.insert("QmLast".to_string(), 1001).await;
		assert_eq!(cache.len().await, 1);
		assert_eq!(cache.get(&"QmLast".to_string()).await, Some(1001));
	}

	#[tokio::test]
	async fn test_clear() {
		let cache = TtlCache::new(Duration::from_secs(60));
		cache.insert(1u8, "a".to_string()).await;
		cache.insert(2u8, "b".to_string()).await;
		cache.clear().await;
		assert_eq!(cache.get(&1).await, None);
		assert_eq!(cache.get(&2).await, None);
	}
}
