//! Aggregate readers for tip totals, wallet balance and activity history.
//!
//! All four readers share [`AggregateReader`] and only differ in their
//! [`ReadSource`]: what the key is, how the value is fetched and which cache
//! mode the periodic refresh uses.
//!
//! A reader is driven by [`AggregateReader::set_key`]. A non-empty key loads
//! the value (cache allowed) and schedules the periodic refresh; an empty key
//! resets the value and schedules nothing. Results that arrive for a key that
//! has since been replaced are dropped.

mod sources;

pub use sources::{ActivitySource, BalanceSource, CommentTipsSource, SenderTipsSource};

use crate::client::LedgerHandle;
use crate::poller::{self, PollHandle, PollSchedule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tipping_ledger::{CacheMode, LedgerError, LedgerService};
use tipping_types::{ActivityEntry, ActivityTotals, Amount};
use tokio::sync::watch;

/// What a reader reads.
#[async_trait]
pub trait ReadSource: Send + Sync + 'static {
	type Key: Clone + Debug + Send + Sync + 'static;
	type Value: Clone + Default + PartialEq + Send + Sync + 'static;

	/// Name used in logs and poller names.
	const NAME: &'static str;

	/// Keys for which nothing can be fetched.
	fn is_empty_key(&self, key: &Self::Key) -> bool;

	/// Cache mode of the periodic refresh.
	fn refresh_mode(&self) -> CacheMode;

	async fn fetch(
		&self,
		client: &LedgerService,
		key: &Self::Key,
		mode: CacheMode,
	) -> Result<Self::Value, LedgerError>;
}

/// Current value of a reader and the outcome of its last load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderSnapshot<V> {
	pub value: V,
	pub is_loading: bool,
	pub error: Option<String>,
	pub last_updated: Option<DateTime<Utc>>,
}

impl ReaderSnapshot<Amount> {
	/// The amount in ether, formatted for display.
	pub fn display(&self) -> String {
		self.value.to_display_string()
	}
}

impl ReaderSnapshot<Vec<ActivityEntry>> {
	/// Sums and counts over the current list.
	pub fn totals(&self) -> ActivityTotals {
		ActivityTotals::from_entries(&self.value)
	}
}

struct KeyState<K> {
	generation: u64,
	key: Option<K>,
}

struct ReaderInner<S: ReadSource> {
	source: S,
	ledger: Arc<LedgerHandle>,
	interval: Duration,
	max_consecutive_failures: u32,
	current: Mutex<KeyState<S::Key>>,
	state: watch::Sender<ReaderSnapshot<S::Value>>,
	poller: Mutex<Option<PollHandle>>,
}

/// Keeps one aggregate value fresh for the current key.
pub struct AggregateReader<S: ReadSource> {
	inner: Arc<ReaderInner<S>>,
}

pub type CommentTipsReader = AggregateReader<CommentTipsSource>;
pub type SenderTipsReader = AggregateReader<SenderTipsSource>;
pub type BalanceReader = AggregateReader<BalanceSource>;
pub type ActivityReader = AggregateReader<ActivitySource>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: ReadSource> AggregateReader<S> {
	pub fn new(
		source: S,
		ledger: Arc<LedgerHandle>,
		interval: Duration,
		max_consecutive_failures: u32,
	) -> Self {
		let (state, _) = watch::channel(ReaderSnapshot::default());
		Self {
			inner: Arc::new(ReaderInner {
				source,
				ledger,
				interval,
				max_consecutive_failures,
				current: Mutex::new(KeyState {
					generation: 0,
					key: None,
				}),
				state,
				poller: Mutex::new(None),
			}),
		}
	}

	/// Switches the reader to `key`.
	///
	/// Stops the refresh of the previous key, then either resets the value
	/// (empty key) or loads it and schedules the periodic refresh.
	pub async fn set_key(&self, key: S::Key) {
		let inner = &self.inner;
		let empty = inner.source.is_empty_key(&key);
		let generation = {
			let mut current = lock(&inner.current);
			current.generation += 1;
			current.key = (!empty).then(|| key.clone());
			if empty {
				inner.state.send_modify(|s| *s = ReaderSnapshot::default());
			}
			current.generation
		};
		inner.replace_poller(None);

		if empty {
			tracing::debug!(reader = S::NAME, "Reader key cleared");
			return;
		}

		tracing::debug!(reader = S::NAME, key = ?key, "Reader key set");
		if let Err(e) = inner.load(generation, &key, CacheMode::Cached).await {
			tracing::debug!(reader = S::NAME, error = %e, "Initial load failed, refresh scheduled anyway");
		}
		ReaderInner::schedule_refresh(inner, generation, key);
	}

	/// Reloads the current key, bypassing the ledger client's cache.
	///
	/// On failure the previous value is kept and the error is published. On
	/// success a periodic refresh that gave up or was stopped is restarted.
	pub async fn refresh(&self) -> Result<S::Value, LedgerError> {
		let (generation, key) = {
			let current = lock(&self.inner.current);
			match &current.key {
				Some(key) => (current.generation, key.clone()),
				None => return Ok(S::Value::default()),
			}
		};
		let value = self.inner.load(generation, &key, CacheMode::Bypass).await?;
		let idle = lock(&self.inner.poller)
			.as_ref()
			.map_or(true, PollHandle::is_cancelled);
		if idle {
			tracing::info!(reader = S::NAME, key = ?key, "Restarting periodic refresh");
			ReaderInner::schedule_refresh(&self.inner, generation, key);
		}
		Ok(value)
	}

	/// Stops the periodic refresh. The value stays as it is.
	pub fn stop(&self) {
		self.inner.replace_poller(None);
	}

	pub fn key(&self) -> Option<S::Key> {
		lock(&self.inner.current).key.clone()
	}

	pub fn snapshot(&self) -> ReaderSnapshot<S::Value> {
		self.inner.state.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<ReaderSnapshot<S::Value>> {
		self.inner.state.subscribe()
	}
}

impl<S: ReadSource> Drop for AggregateReader<S> {
	fn drop(&mut self) {
		self.inner.replace_poller(None);
	}
}

impl<S: ReadSource> ReaderInner<S> {
	/// Fetches the value for `key` and publishes the outcome if `generation`
	/// is still current.
	///
	/// A failed cached load resets the value; a failed bypassing load keeps
	/// the previous one.
	async fn load(
		&self,
		generation: u64,
		key: &S::Key,
		mode: CacheMode,
	) -> Result<S::Value, LedgerError> {
		self.update(generation, |s| {
			s.is_loading = true;
			s.error = None;
		});

		let result = match self.ledger.get_client().await {
			Ok(client) => self.source.fetch(&client, key, mode).await,
			Err(e) => Err(e),
		};

		match &result {
			Ok(value) => self.update(generation, |s| {
				s.value = value.clone();
				s.is_loading = false;
				s.last_updated = Some(Utc::now());
			}),
			Err(e) => {
				tracing::warn!(reader = S::NAME, key = ?key, error = %e, "Failed to load");
				self.update(generation, |s| {
					if mode == CacheMode::Cached {
						s.value = S::Value::default();
					}
					s.is_loading = false;
					s.error = Some(e.to_string());
				});
			},
		}
		result
	}

	fn update(&self, generation: u64, f: impl FnOnce(&mut ReaderSnapshot<S::Value>)) {
		let current = lock(&self.current);
		if current.generation == generation {
			self.state.send_modify(f);
		}
	}

	/// Starts the periodic refresh of `key`. The poller is only installed if
	/// `generation` is still current.
	fn schedule_refresh(this: &Arc<Self>, generation: u64, key: S::Key) {
		let weak = Arc::downgrade(this);
		let schedule = PollSchedule::every(this.interval)
			.delayed()
			.with_failure_cap(this.max_consecutive_failures);
		let handle = poller::schedule(S::NAME, schedule, move || {
			let weak = weak.clone();
			let key = key.clone();
			async move {
				match weak.upgrade() {
					Some(inner) => {
						let mode = inner.source.refresh_mode();
						inner.load(generation, &key, mode).await.map(|_| ())
					},
					None => Ok(()),
				}
			}
		});

		let current = lock(&this.current);
		if current.generation == generation {
			this.replace_poller(Some(handle));
		}
	}

	fn replace_poller(&self, handle: Option<PollHandle>) {
		let previous = std::mem::replace(&mut *lock(&self.poller), handle);
		if let Some(previous) = previous {
			previous.cancel();
		}
	}
}
