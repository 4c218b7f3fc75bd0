//! Lazily constructed ledger client handle.
//!
//! The ledger client is expensive to build and must exist only once per
//! process, but every reader and tip sender needs it. [`LedgerHandle`] is
//! created up front and shared as an `Arc`; the client itself is built on
//! the first [`LedgerHandle::get_client`] call. Concurrent first callers wait
//! on the same construction, and a failed construction is not remembered so
//! the next caller tries again.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tipping_config::LedgerConfig;
use tipping_ledger::{create_ledger, LedgerError, LedgerService};
use tokio::sync::OnceCell;

type Constructor =
	Arc<dyn Fn() -> BoxFuture<'static, Result<LedgerService, LedgerError>> + Send + Sync>;

/// Shared handle to the single ledger client instance.
pub struct LedgerHandle {
	client: OnceCell<Arc<LedgerService>>,
	constructor: Option<Constructor>,
	constructions: AtomicUsize,
}

impl LedgerHandle {
	/// Builds the client from the ledger section of the configuration.
	pub fn from_config(config: LedgerConfig) -> Self {
		Self::with_constructor(move || {
			let config = config.clone();
			async move { create_ledger(&config) }
		})
	}

	/// Builds the client with `constructor` on first use.
	pub fn with_constructor<F, Fut>(constructor: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<LedgerService, LedgerError>> + Send + 'static,
	{
		Self {
			client: OnceCell::new(),
			constructor: Some(Arc::new(
				move || -> BoxFuture<'static, Result<LedgerService, LedgerError>> {
					Box::pin(constructor())
				},
			)),
			constructions: AtomicUsize::new(0),
		}
	}

	/// Wraps an already built client.
	pub fn initialized(service: LedgerService) -> Self {
		Self {
			client: OnceCell::new_with(Some(Arc::new(service))),
			constructor: None,
			constructions: AtomicUsize::new(0),
		}
	}

	/// Returns the client, building it if this is the first call.
	pub async fn get_client(&self) -> Result<Arc<LedgerService>, LedgerError> {
		self.client
			.get_or_try_init(|| async {
				let constructor = self.constructor.as_ref().ok_or_else(|| {
					LedgerError::Configuration("Ledger client has no constructor".to_string())
				})?;

				let attempt = self.constructions.fetch_add(1, Ordering::SeqCst) + 1;
				tracing::debug!(attempt, "Initializing ledger client");
				match constructor().await {
					Ok(service) => {
						tracing::info!("Ledger client initialized");
						Ok(Arc::new(service))
					},
					Err(e) => {
						tracing::error!(attempt, error = %e, "Failed to initialize ledger client");
						Err(e)
					},
				}
			})
			.await
			.cloned()
	}

	pub fn is_initialized(&self) -> bool {
		self.client.initialized()
	}

	/// Number of construction attempts made so far, failed ones included.
	pub fn constructions(&self) -> usize {
		self.constructions.load(Ordering::SeqCst)
	}
}
