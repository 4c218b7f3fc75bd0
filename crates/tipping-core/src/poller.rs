//! Fixed-interval polling with cancellation.
//!
//! [`schedule`] spawns a ticker task that starts a new invocation of the
//! action on every tick. Invocations run as their own tasks, so a slow one
//! never delays the next tick and several may overlap. Cancelling the
//! returned [`PollHandle`] stops the ticker but leaves invocations that are
//! already running alone.
//!
//! Consecutive failures are counted across invocations and reset by any
//! success. Once the configured cap is reached the poller cancels itself and
//! runs the give-up callback passed to [`schedule_with_give_up`], once.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// When and how long a poller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
	pub interval: Duration,
	/// Run the first invocation right away instead of after one interval.
	pub immediate: bool,
	/// Give up after this many failures in a row. `None` polls forever.
	pub max_consecutive_failures: Option<u32>,
}

impl PollSchedule {
	/// Runs immediately, then every `interval`.
	pub fn every(interval: Duration) -> Self {
		Self {
			interval,
			immediate: true,
			max_consecutive_failures: None,
		}
	}

	/// Waits one interval before the first run.
	pub fn delayed(mut self) -> Self {
		self.immediate = false;
		self
	}

	pub fn with_failure_cap(mut self, max_consecutive_failures: u32) -> Self {
		self.max_consecutive_failures = Some(max_consecutive_failures);
		self
	}
}

/// Owner of a running poller. Dropping it cancels the poller.
#[derive(Debug)]
pub struct PollHandle {
	name: String,
	token: CancellationToken,
}

impl PollHandle {
	/// Stops all future invocations. Calling it again has no effect.
	pub fn cancel(&self) {
		if !self.token.is_cancelled() {
			tracing::debug!(poller = %self.name, "Poller cancelled");
			self.token.cancel();
		}
	}

	/// True once cancelled, either explicitly or after too many failures.
	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}
}

impl Drop for PollHandle {
	fn drop(&mut self) {
		self.cancel();
	}
}

/// Starts polling `action` on `schedule`.
///
/// Must be called from within a tokio runtime.
pub fn schedule<F, Fut, E>(name: impl Into<String>, schedule: PollSchedule, action: F) -> PollHandle
where
	F: Fn() -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<(), E>> + Send + 'static,
	E: Display + Send + 'static,
{
	schedule_with_give_up(name, schedule, action, || {})
}

/// Like [`schedule`], and calls `on_give_up` when the failure cap stops the
/// poller. An explicit cancel never calls it.
pub fn schedule_with_give_up<F, Fut, E, G>(
	name: impl Into<String>,
	schedule: PollSchedule,
	action: F,
	on_give_up: G,
) -> PollHandle
where
	F: Fn() -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<(), E>> + Send + 'static,
	E: Display + Send + 'static,
	G: Fn() + Send + Sync + 'static,
{
	let name = name.into();
	let token = CancellationToken::new();
	let failures = Arc::new(AtomicU32::new(0));
	let on_give_up = Arc::new(on_give_up);

	let ticker_name = name.clone();
	let ticker_token = token.clone();
	tokio::spawn(async move {
		let start = if schedule.immediate {
			Instant::now()
		} else {
			Instant::now() + schedule.interval
		};
		let mut ticker = time::interval_at(start, schedule.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				biased;
				_ = ticker_token.cancelled() => break,
				_ = ticker.tick() => {
					let invocation = action();
					let name = ticker_name.clone();
					let token = ticker_token.clone();
					let failures = Arc::clone(&failures);
					let on_give_up = Arc::clone(&on_give_up);
					tokio::spawn(async move {
						match invocation.await {
							Ok(()) => failures.store(0, Ordering::SeqCst),
							Err(e) => {
								let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
								tracing::warn!(
									poller = %name,
									error = %e,
									consecutive_failures = count,
									"Poll failed"
								);
								if schedule
									.max_consecutive_failures
									.is_some_and(|cap| count >= cap)
									&& !token.is_cancelled()
								{
									tracing::warn!(
										poller = %name,
										consecutive_failures = count,
										"Giving up after repeated poll failures"
									);
									token.cancel();
									on_give_up();
								}
							},
						}
					});
				}
			}
		}
		tracing::trace!(poller = %ticker_name, "Poller stopped");
	});

	tracing::debug!(
		poller = %name,
		interval_ms = schedule.interval.as_millis() as u64,
		immediate = schedule.immediate,
		"Poller scheduled"
	);
	PollHandle { name, token }
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicUsize;

	fn counting(counter: &Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<Result<(), String>> {
		let counter = Arc::clone(counter);
		move || {
			counter.fetch_add(1, Ordering::SeqCst);
			futures::future::ready(Ok(()))
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_runs_immediately_then_every_interval() {
		let counter = Arc::new(AtomicUsize::new(0));
		let handle = schedule(
			"test",
			PollSchedule::every(Duration::from_secs(5)),
			counting(&counter),
		);

		time::sleep(Duration::from_millis(1)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);

		time::sleep(Duration::from_secs(11)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 3);

		handle.cancel();
		handle.cancel();
		assert!(handle.is_cancelled());
		time::sleep(Duration::from_secs(60)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_delayed_start() {
		let counter = Arc::new(AtomicUsize::new(0));
		let _handle = schedule(
			"delayed",
			PollSchedule::every(Duration::from_secs(15)).delayed(),
			counting(&counter),
		);

		time::sleep(Duration::from_secs(14)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 0);
		time::sleep(Duration::from_secs(2)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_drop_cancels() {
		let counter = Arc::new(AtomicUsize::new(0));
		let handle = schedule(
			"dropped",
			PollSchedule::every(Duration::from_secs(5)),
			counting(&counter),
		);
		time::sleep(Duration::from_millis(1)).await;
		drop(handle);

		time::sleep(Duration::from_secs(30)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_gives_up_after_consecutive_failures() {
		let counter = Arc::new(AtomicUsize::new(0));
		let calls = Arc::clone(&counter);
		let handle = schedule(
			"failing",
			PollSchedule::every(Duration::from_secs(5)).with_failure_cap(3),
			move || {
				calls.fetch_add(1, Ordering::SeqCst);
				futures::future::ready(Err::<(), _>("endpoint unreachable"))
			},
		);

		time::sleep(Duration::from_secs(60)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 3);
		assert!(handle.is_cancelled());
	}

	#[tokio::test(start_paused = true)]
	async fn test_give_up_callback_runs_once() {
		let gave_up = Arc::new(AtomicUsize::new(0));
		let notified = Arc::clone(&gave_up);
		let handle = schedule_with_give_up(
			"unreachable",
			PollSchedule::every(Duration::from_secs(5)).with_failure_cap(2),
			|| futures::future::ready(Err::<(), _>("connection refused")),
			move || {
				notified.fetch_add(1, Ordering::SeqCst);
			},
		);

		time::sleep(Duration::from_secs(60)).await;
		assert!(handle.is_cancelled());
		assert_eq!(gave_up.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_explicit_cancel_skips_give_up_callback() {
		let gave_up = Arc::new(AtomicUsize::new(0));
		let notified = Arc::clone(&gave_up);
		let handle = schedule_with_give_up(
			"cancelled",
			PollSchedule::every(Duration::from_secs(5)).with_failure_cap(2),
			|| futures::future::ready(Err::<(), _>("connection refused")),
			move || {
				notified.fetch_add(1, Ordering::SeqCst);
			},
		);
		time::sleep(Duration::from_millis(1)).await;
		handle.cancel();

		time::sleep(Duration::from_secs(60)).await;
		assert_eq!(gave_up.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_success_resets_failure_count() {
		let counter = Arc::new(AtomicUsize::new(0));
		let calls = Arc::clone(&counter);
		let handle = schedule(
			"flaky",
			PollSchedule::every(Duration::from_secs(5)).with_failure_cap(2),
			move || {
				let n = calls.fetch_add(1, Ordering::SeqCst);
				// Fails on every other call, never twice in a row
				futures::future::ready(if n % 2 == 0 { Err("timeout") } else { Ok(()) })
			},
		);

		time::sleep(Duration::from_secs(31)).await;
		assert_eq!(counter.load(Ordering::SeqCst), 7);
		assert!(!handle.is_cancelled());
	}

	#[tokio::test(start_paused = true)]
	async fn test_overlapping_invocations() {
		let started = Arc::new(AtomicUsize::new(0));
		let finished = Arc::new(AtomicUsize::new(0));
		let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
		let _handle = schedule(
			"slow",
			PollSchedule::every(Duration::from_secs(5)),
			move || {
				s.fetch_add(1, Ordering::SeqCst);
				let f = Arc::clone(&f);
				async move {
					time::sleep(Duration::from_secs(12)).await;
					f.fetch_add(1, Ordering::SeqCst);
					Ok::<(), String>(())
				}
			},
		);

		time::sleep(Duration::from_secs(11)).await;
		assert_eq!(started.load(Ordering::SeqCst), 3);
		assert_eq!(finished.load(Ordering::SeqCst), 0);
	}
}
