//! Ledger client module for the tipping engine.
//!
//! This module defines the interfaces of the two external collaborators the
//! engine talks to: the tipping client, which submits tips and answers tip
//! totals and activity queries, and the chain provider, which answers block
//! height, receipt and balance queries. [`LedgerService`] combines both behind
//! a read cache and is the handle the rest of the engine works with.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tipping_config::LedgerConfig;
use tipping_types::{
	truncate_id, ActivityEntry, Amount, ConfigSchema, ImplementationRegistry, TipRequest,
	TipSubmission, TransactionHash, TransactionReceipt,
};

pub mod cache;

pub use cache::{CacheMode, TtlCache};

/// Re-export implementations
pub mod implementations {
	pub mod mock;
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The ledger refused the tip transaction.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	/// The request was malformed before reaching the ledger.
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	/// Neither a chain provider nor a tipping client with a bundled provider
	/// is configured.
	#[error("No provider available")]
	NoProviderAvailable,
	/// Error that occurs when an implementation cannot be built.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Which tips a total is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TipsQuery {
	pub recipient_comment_cid: String,
	/// Restricts the total to tips attached to this sender comment.
	pub sender_comment_cid: Option<String>,
	/// Restricts the total to tips from this wallet.
	pub sender: Option<String>,
	pub fee_recipients: Vec<String>,
}

impl TipsQuery {
	/// All tips received by a comment.
	pub fn comment(recipient_comment_cid: impl Into<String>, fee_recipients: Vec<String>) -> Self {
		Self {
			recipient_comment_cid: recipient_comment_cid.into(),
			sender_comment_cid: None,
			sender: None,
			fee_recipients,
		}
	}

	/// Tips one wallet sent to a comment.
	pub fn sender(
		recipient_comment_cid: impl Into<String>,
		sender: impl Into<String>,
		fee_recipients: Vec<String>,
	) -> Self {
		Self {
			recipient_comment_cid: recipient_comment_cid.into(),
			sender_comment_cid: None,
			sender: Some(sender.into()),
			fee_recipients,
		}
	}

	pub fn with_sender_comment(mut self, sender_comment_cid: impl Into<String>) -> Self {
		self.sender_comment_cid = Some(sender_comment_cid.into());
		self
	}
}

/// Trait defining the interface to the external tipping client.
#[async_trait]
pub trait TippingInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Submits a tip and returns once the ledger has accepted the transaction.
	///
	/// The returned hash is available before the transaction is included in
	/// a block.
	async fn send_tip(&self, request: &TipRequest) -> Result<TipSubmission, LedgerError>;

	/// Sum of tips matching the query, in wei.
	async fn tips_total(&self, query: &TipsQuery) -> Result<Amount, LedgerError>;

	/// Smallest tip the contract accepts.
	async fn minimum_tip_amount(&self) -> Result<Amount, LedgerError>;

	/// Protocol fee taken from each tip, in percent.
	async fn fee_percent(&self) -> Result<u32, LedgerError>;

	/// Most recent tips sent or received by `address`, newest first.
	async fn tips_activity(
		&self,
		address: &str,
		limit: usize,
	) -> Result<Vec<ActivityEntry>, LedgerError>;

	/// The chain provider the client was built with, if it exposes one.
	fn provider(&self) -> Option<Arc<dyn ChainInterface>>;
}

/// Trait defining the chain queries used to follow a transaction.
#[async_trait]
pub trait ChainInterface: Send + Sync {
	/// Latest block height.
	async fn block_number(&self) -> Result<u64, LedgerError>;

	/// Receipt of a transaction, `None` while it is not yet mined.
	async fn transaction_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, LedgerError>;

	/// Native balance of an address, in wei.
	async fn balance(&self, address: &str) -> Result<Amount, LedgerError>;
}

/// Type alias for tipping client factory functions.
///
/// Factories receive their implementation table and the ordered RPC URLs.
pub type TippingFactory =
	fn(&toml::Value, &[String]) -> Result<Box<dyn TippingInterface>, LedgerError>;

/// Type alias for chain provider factory functions.
pub type ChainFactory =
	fn(&toml::Value, &[String]) -> Result<Box<dyn ChainInterface>, LedgerError>;

/// Registry trait for tipping client implementations.
pub trait TippingRegistry: ImplementationRegistry<Factory = TippingFactory> {}

/// Registry trait for chain provider implementations.
pub trait ChainRegistry: ImplementationRegistry<Factory = ChainFactory> {}

/// Get all registered tipping client implementations.
pub fn get_all_tipping_implementations() -> Vec<(&'static str, TippingFactory)> {
	use implementations::mock;

	vec![(mock::Registry::NAME, mock::Registry::factory())]
}

/// Get all registered chain provider implementations.
pub fn get_all_chain_implementations() -> Vec<(&'static str, ChainFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// The ledger client handle.
///
/// Wraps the tipping client and chain provider, and caches totals, balances
/// and activity for the configured maximum age.
pub struct LedgerService {
	tipping: Box<dyn TippingInterface>,
	chain: Arc<dyn ChainInterface>,
	totals: TtlCache<TipsQuery, Amount>,
	balances: TtlCache<String, Amount>,
	activity: TtlCache<(String, usize), Vec<ActivityEntry>>,
}

impl LedgerService {
	pub fn new(
		tipping: Box<dyn TippingInterface>,
		chain: Arc<dyn ChainInterface>,
		max_age: Duration,
	) -> Self {
		Self {
			tipping,
			chain,
			totals: TtlCache::new(max_age),
			balances: TtlCache::new(max_age),
			activity: TtlCache::new(max_age),
		}
	}

	/// Builds the service on the chain provider bundled with the tipping
	/// client.
	pub fn with_bundled_provider(
		tipping: Box<dyn TippingInterface>,
		max_age: Duration,
	) -> Result<Self, LedgerError> {
		let chain = tipping.provider().ok_or(LedgerError::NoProviderAvailable)?;
		Ok(Self::new(tipping, chain, max_age))
	}

	pub fn chain(&self) -> &Arc<dyn ChainInterface> {
		&self.chain
	}

	/// Submits a tip. Cached totals are dropped once the ledger accepts it.
	pub async fn send_tip(&self, request: &TipRequest) -> Result<TipSubmission, LedgerError> {
		let submission = self.tipping.send_tip(request).await?;
		tracing::info!(
			tx_hash = %truncate_id(submission.transaction_hash.as_str()),
			comment_cid = %request.recipient_comment_cid,
			"Tip accepted by ledger"
		);
		self.totals.clear().await;
		Ok(submission)
	}

	pub async fn tips_total(&self, query: &TipsQuery, mode: CacheMode) -> Result<Amount, LedgerError> {
		read_through(&self.totals, query.clone(), mode, || {
			self.tipping.tips_total(query)
		})
		.await
	}

	pub async fn balance(&self, address: &str, mode: CacheMode) -> Result<Amount, LedgerError> {
		read_through(&self.balances, address.to_string(), mode, || {
			self.chain.balance(address)
		})
		.await
	}

	pub async fn tips_activity(
		&self,
		address: &str,
		limit: usize,
		mode: CacheMode,
	) -> Result<Vec<ActivityEntry>, LedgerError> {
		read_through(&self.activity, (address.to_string(), limit), mode, || {
			self.tipping.tips_activity(address, limit)
		})
		.await
	}

	pub async fn minimum_tip_amount(&self) -> Result<Amount, LedgerError> {
		self.tipping.minimum_tip_amount().await
	}

	pub async fn fee_percent(&self) -> Result<u32, LedgerError> {
		self.tipping.fee_percent().await
	}

	pub async fn block_number(&self) -> Result<u64, LedgerError> {
		self.chain.block_number().await
	}

	pub async fn transaction_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, LedgerError> {
		self.chain.transaction_receipt(hash).await
	}
}

async fn read_through<K, V, F, Fut>(
	cache: &TtlCache<K, V>,
	key: K,
	mode: CacheMode,
	fetch: F,
) -> Result<V, LedgerError>
where
	K: Eq + std::hash::Hash,
	V: Clone,
	F: FnOnce() -> Fut,
	Fut: Future<Output = Result<V, LedgerError>>,
{
	if mode == CacheMode::Cached {
		if let Some(value) = cache.get(&key).await {
			return Ok(value);
		}
	}
	let value = fetch().await?;
	cache.insert(key, value.clone()).await;
	Ok(value)
}

/// Builds the ledger client from configuration.
///
/// The tipping client is looked up by `ledger.tipping`. The chain provider
/// is `ledger.provider` when set, otherwise the tipping client's own.
pub fn create_ledger(config: &LedgerConfig) -> Result<LedgerService, LedgerError> {
	let tipping_factory = get_all_tipping_implementations()
		.into_iter()
		.find(|(name, _)| *name == config.tipping)
		.map(|(_, factory)| factory)
		.ok_or_else(|| {
			LedgerError::Configuration(format!(
				"Unknown tipping implementation '{}'",
				config.tipping
			))
		})?;

	tracing::debug!(
		implementation = %config.tipping,
		rpc_urls = config.rpc_urls.len(),
		"Creating tipping client"
	);
	let tipping = tipping_factory(
		&config.implementation_config(&config.tipping),
		&config.rpc_urls,
	)?;

	let max_age = config.cache.max_age();
	match &config.provider {
		Some(provider) => {
			let chain_factory = get_all_chain_implementations()
				.into_iter()
				.find(|(name, _)| name == provider)
				.map(|(_, factory)| factory)
				.ok_or_else(|| {
					LedgerError::Configuration(format!(
						"Unknown provider implementation '{}'",
						provider
					))
				})?;

			tracing::debug!(implementation = %provider, "Creating chain provider");
			let chain = chain_factory(&config.implementation_config(provider), &config.rpc_urls)?;
			Ok(LedgerService::new(tipping, Arc::from(chain), max_age))
		},
		None => LedgerService::with_bundled_provider(tipping, max_age),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::mock::{MockConfig, MockTipping};
	use std::collections::HashMap;
	use tipping_config::CacheConfig;
	use tipping_types::SecretString;

	fn service(mock: &MockTipping, max_age: Duration) -> LedgerService {
		LedgerService::new(Box::new(mock.clone()), mock.chain(), max_age)
	}

	fn request(amount: u128) -> TipRequest {
		TipRequest {
			recipient_comment_cid: "QmComment".to_string(),
			sender_comment_cid: None,
			recipient_address: "0xrecipient".to_string(),
			fee_recipients: vec!["0xfee".to_string()],
			sender: "0xsender".to_string(),
			private_key: SecretString::from("0xkey"),
			amount: Some(Amount::from_wei(amount)),
		}
	}

	fn config(provider: Option<&str>) -> LedgerConfig {
		LedgerConfig {
			rpc_urls: vec!["http://localhost:8545".to_string()],
			tipping: "mock".to_string(),
			provider: provider.map(str::to_string),
			cache: CacheConfig::default(),
			implementations: HashMap::new(),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_cached_reads_skip_the_client() {
		let mock = MockTipping::new(MockConfig::default());
		let service = service(&mock, Duration::from_secs(60));
		let query = TipsQuery::comment("QmComment", vec!["0xfee".to_string()]);

		service.tips_total(&query, CacheMode::Cached).await.unwrap();
		service.tips_total(&query, CacheMode::Cached).await.unwrap();
		assert_eq!(mock.calls().tips_total, 1);

		service.tips_total(&query, CacheMode::Bypass).await.unwrap();
		assert_eq!(mock.calls().tips_total, 2);

		tokio::time::advance(Duration::from_secs(61)).await;
		service.tips_total(&query, CacheMode::Cached).await.unwrap();
		assert_eq!(mock.calls().tips_total, 3);
	}

	#[tokio::test]
	async fn test_send_invalidates_cached_totals() {
		let mock = MockTipping::new(MockConfig::default());
		let service = service(&mock, Duration::from_secs(60));
		let query = TipsQuery::comment("QmComment", vec!["0xfee".to_string()]);

		let before = service.tips_total(&query, CacheMode::Cached).await.unwrap();
		assert_eq!(before, Amount::ZERO);

		let tip = 2_000_000_000_000_000;
		service.send_tip(&request(tip)).await.unwrap();

		let after = service.tips_total(&query, CacheMode::Cached).await.unwrap();
		assert_eq!(after, Amount::from_wei(tip));
	}

	#[tokio::test]
	async fn test_failed_fetch_is_not_cached() {
		let mock = MockTipping::new(MockConfig::default());
		let service = service(&mock, Duration::from_secs(60));

		mock.chain().set_failure(Some("rpc down"));
		assert!(service.balance("0xsender", CacheMode::Cached).await.is_err());

		mock.chain().set_failure(None);
		assert!(service.balance("0xsender", CacheMode::Cached).await.is_ok());
		assert_eq!(mock.chain().calls().balance, 2);
	}

	#[tokio::test]
	async fn test_create_ledger_uses_bundled_provider() {
		let service = create_ledger(&config(None)).unwrap();
		assert!(service.block_number().await.is_ok());
		assert_eq!(service.minimum_tip_amount().await.unwrap(), Amount::from_wei(1_000_000_000_000_000));
		assert_eq!(service.fee_percent().await.unwrap(), 5);
	}

	#[tokio::test]
	async fn test_create_ledger_with_explicit_provider() {
		assert!(create_ledger(&config(Some("evm_alloy"))).is_ok());
	}

	#[test]
	fn test_create_ledger_unknown_implementations() {
		let mut cfg = config(None);
		cfg.tipping = "contract".to_string();
		assert!(matches!(create_ledger(&cfg), Err(LedgerError::Configuration(_))));

		let cfg = config(Some("ipc"));
		assert!(matches!(create_ledger(&cfg), Err(LedgerError::Configuration(_))));
	}
}
