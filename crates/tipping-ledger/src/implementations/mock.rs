//! Simulated tipping ledger.
//!
//! `MockTipping` keeps every tip in memory and answers totals and activity
//! from that record. It ships with a [`MockChain`] whose block height
//! advances either on demand or, with `auto_mine`, every time the height is
//! read. A submitted tip is mined `inclusion_delay_blocks` after the height
//! at which it was sent. Failures can be injected per client and every call
//! is counted, which makes the mock the backing ledger of the engine's tests.

use crate::{
	ChainInterface, LedgerError, TippingFactory, TippingInterface, TippingRegistry, TipsQuery,
};
use alloy_primitives::U256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tipping_types::{
	truncate_id, ActivityEntry, Amount, ConfigSchema, Field, FieldType, ImplementationRegistry,
	Schema, TipRequest, TipSubmission, TransactionHash, TransactionReceipt, ValidationError,
};

/// Minimum tip of the deployed contract, 0.001 ETH.
pub const DEFAULT_MINIMUM_TIP_WEI: u128 = 1_000_000_000_000_000;

/// Settings of the simulated ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
	pub minimum_tip: Amount,
	pub fee_percent: u32,
	pub start_block: u64,
	/// Blocks between submission and inclusion.
	pub inclusion_delay_blocks: u64,
	/// Mine one block on every height read.
	pub auto_mine: bool,
	/// Simulated latency of a send.
	pub send_delay: Duration,
	/// Balance reported for addresses without an explicit one.
	pub default_balance: Amount,
}

impl Default for MockConfig {
	fn default() -> Self {
		Self {
			minimum_tip: Amount::from_wei(DEFAULT_MINIMUM_TIP_WEI),
			fee_percent: 5,
			start_block: 1,
			inclusion_delay_blocks: 1,
			auto_mine: false,
			send_delay: Duration::ZERO,
			default_balance: Amount::ZERO,
		}
	}
}

/// Number of calls made to each ledger method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
	pub send_tip: usize,
	pub tips_total: usize,
	pub minimum_tip_amount: usize,
	pub fee_percent: usize,
	pub tips_activity: usize,
	pub block_number: usize,
	pub transaction_receipt: usize,
	pub balance: usize,
}

impl MockCalls {
	/// Sum over every method.
	pub fn total(&self) -> usize {
		self.send_tip
			+ self.tips_total
			+ self.minimum_tip_amount
			+ self.fee_percent
			+ self.tips_activity
			+ self.block_number
			+ self.transaction_receipt
			+ self.balance
	}
}

#[derive(Default)]
struct Counter(AtomicUsize);

impl Counter {
	fn hit(&self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}

	fn get(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MinedTransaction {
	block_number: u64,
	success: bool,
}

#[derive(Default)]
struct ChainState {
	height: u64,
	transactions: HashMap<TransactionHash, MinedTransaction>,
	balances: HashMap<String, Amount>,
	failure: Option<String>,
}

#[derive(Default)]
struct ChainCounters {
	block_number: Counter,
	transaction_receipt: Counter,
	balance: Counter,
}

/// Simulated chain bundled with [`MockTipping`].
pub struct MockChain {
	auto_mine: bool,
	default_balance: Amount,
	state: Mutex<ChainState>,
	calls: ChainCounters,
}

impl MockChain {
	pub fn new(start_block: u64, auto_mine: bool, default_balance: Amount) -> Self {
		Self {
			auto_mine,
			default_balance,
			state: Mutex::new(ChainState {
				height: start_block,
				..Default::default()
			}),
			calls: ChainCounters::default(),
		}
	}

	/// Advances the chain by `blocks` and returns the new height.
	pub fn mine(&self, blocks: u64) -> u64 {
		let mut state = lock(&self.state);
		state.height += blocks;
		state.height
	}

	/// Current height, without mining or counting a call.
	pub fn height(&self) -> u64 {
		lock(&self.state).height
	}

	pub fn set_balance(&self, address: &str, balance: Amount) {
		lock(&self.state)
			.balances
			.insert(address.to_lowercase(), balance);
	}

	/// Makes every chain query fail with `message` until cleared.
	pub fn set_failure(&self, message: Option<&str>) {
		lock(&self.state).failure = message.map(str::to_string);
	}

	pub fn calls(&self) -> MockCalls {
		MockCalls {
			block_number: self.calls.block_number.get(),
			transaction_receipt: self.calls.transaction_receipt.get(),
			balance: self.calls.balance.get(),
			..Default::default()
		}
	}

	/// Registers a transaction to be mined at `block_number`.
	fn include(&self, hash: TransactionHash, block_number: u64, success: bool) {
		lock(&self.state).transactions.insert(
			hash,
			MinedTransaction {
				block_number,
				success,
			},
		);
	}

	fn transfer(&self, from: &str, credits: &[(&str, Amount)], total: Amount) {
		let mut state = lock(&self.state);
		let sender = from.to_lowercase();
		let balance = state
			.balances
			.get(&sender)
			.copied()
			.unwrap_or(self.default_balance);
		state.balances.insert(sender, balance.saturating_sub(total));
		for (to, amount) in credits {
			let to = to.to_lowercase();
			let balance = state
				.balances
				.get(&to)
				.copied()
				.unwrap_or(self.default_balance);
			state.balances.insert(to, balance.saturating_add(*amount));
		}
	}

	fn check_failure(state: &ChainState) -> Result<(), LedgerError> {
		match &state.failure {
			Some(message) => Err(LedgerError::Network(message.clone())),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl ChainInterface for MockChain {
	async fn block_number(&self) -> Result<u64, LedgerError> {
		self.calls.block_number.hit();
		let mut state = lock(&self.state);
		Self::check_failure(&state)?;
		if self.auto_mine {
			state.height += 1;
		}
		Ok(state.height)
	}

	async fn transaction_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, LedgerError> {
		self.calls.transaction_receipt.hit();
		let state = lock(&self.state);
		Self::check_failure(&state)?;
		Ok(state
			.transactions
			.get(hash)
			.filter(|tx| tx.block_number <= state.height)
			.map(|tx| TransactionReceipt {
				hash: hash.clone(),
				block_number: tx.block_number,
				success: tx.success,
			}))
	}

	async fn balance(&self, address: &str) -> Result<Amount, LedgerError> {
		self.calls.balance.hit();
		let state = lock(&self.state);
		Self::check_failure(&state)?;
		Ok(state
			.balances
			.get(&address.to_lowercase())
			.copied()
			.unwrap_or(self.default_balance))
	}
}

struct RecordedTip {
	recipient_comment_cid: String,
	sender_comment_cid: Option<String>,
	recipient_address: String,
	sender: String,
	amount: Amount,
	hash: TransactionHash,
	timestamp: u64,
}

#[derive(Default)]
struct TippingState {
	tips: Vec<RecordedTip>,
	nonce: u64,
	send_failure: Option<String>,
	read_failure: Option<String>,
	revert_next: bool,
}

#[derive(Default)]
struct TippingCounters {
	send_tip: Counter,
	tips_total: Counter,
	minimum_tip_amount: Counter,
	fee_percent: Counter,
	tips_activity: Counter,
}

struct MockInner {
	config: MockConfig,
	chain: Arc<MockChain>,
	state: Mutex<TippingState>,
	calls: TippingCounters,
}

/// In-memory tipping client. Clones share the same ledger.
#[derive(Clone)]
pub struct MockTipping {
	inner: Arc<MockInner>,
}

impl MockTipping {
	pub fn new(config: MockConfig) -> Self {
		let chain = Arc::new(MockChain::new(
			config.start_block,
			config.auto_mine,
			config.default_balance,
		));
		Self {
			inner: Arc::new(MockInner {
				config,
				chain,
				state: Mutex::new(TippingState::default()),
				calls: TippingCounters::default(),
			}),
		}
	}

	/// The bundled chain, for driving block production in tests.
	pub fn chain(&self) -> Arc<MockChain> {
		Arc::clone(&self.inner.chain)
	}

	/// Makes every send fail with `message` until cleared.
	pub fn set_send_failure(&self, message: Option<&str>) {
		lock(&self.inner.state).send_failure = message.map(str::to_string);
	}

	/// Makes totals, minimum and activity reads fail with `message` until
	/// cleared.
	pub fn set_read_failure(&self, message: Option<&str>) {
		lock(&self.inner.state).read_failure = message.map(str::to_string);
	}

	/// Mines the next accepted tip with a failed execution status.
	pub fn revert_next_tip(&self) {
		lock(&self.inner.state).revert_next = true;
	}

	/// Call counts of the tipping client and its chain combined.
	pub fn calls(&self) -> MockCalls {
		let chain = self.inner.chain.calls();
		let calls = &self.inner.calls;
		MockCalls {
			send_tip: calls.send_tip.get(),
			tips_total: calls.tips_total.get(),
			minimum_tip_amount: calls.minimum_tip_amount.get(),
			fee_percent: calls.fee_percent.get(),
			tips_activity: calls.tips_activity.get(),
			..chain
		}
	}

	fn check_read_failure(&self) -> Result<(), LedgerError> {
		match &lock(&self.inner.state).read_failure {
			Some(message) => Err(LedgerError::Network(message.clone())),
			None => Ok(()),
		}
	}

	fn fee_of(&self, amount: Amount) -> Amount {
		Amount(amount.0 * U256::from(self.inner.config.fee_percent) / U256::from(100u64))
	}
}

#[async_trait]
impl TippingInterface for MockTipping {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockTippingSchema)
	}

	async fn send_tip(&self, request: &TipRequest) -> Result<TipSubmission, LedgerError> {
		self.inner.calls.send_tip.hit();

		if !self.inner.config.send_delay.is_zero() {
			tokio::time::sleep(self.inner.config.send_delay).await;
		}

		if request.fee_recipients.is_empty() {
			return Err(LedgerError::InvalidRequest(
				"At least one fee recipient is required".to_string(),
			));
		}
		if !request.private_key.with_exposed(|key| key.starts_with("0x")) {
			return Err(LedgerError::InvalidRequest(
				"Private key must be hex encoded".to_string(),
			));
		}

		let amount = request.amount.unwrap_or(self.inner.config.minimum_tip);
		if amount < self.inner.config.minimum_tip {
			return Err(LedgerError::Rejected(format!(
				"Tip amount {} is below the minimum of {}",
				amount, self.inner.config.minimum_tip
			)));
		}

		let (hash, success) = {
			let mut state = lock(&self.inner.state);
			if let Some(message) = &state.send_failure {
				return Err(LedgerError::Rejected(message.clone()));
			}
			state.nonce += 1;
			let hash = TransactionHash::new(format!("{:064x}", state.nonce));
			let success = !std::mem::take(&mut state.revert_next);
			if success {
				state.tips.push(RecordedTip {
					recipient_comment_cid: request.recipient_comment_cid.clone(),
					sender_comment_cid: request.sender_comment_cid.clone(),
					recipient_address: request.recipient_address.clone(),
					sender: request.sender.clone(),
					amount,
					hash: hash.clone(),
					timestamp: chrono::Utc::now().timestamp().max(0) as u64,
				});
			}
			(hash, success)
		};

		let chain = &self.inner.chain;
		let inclusion_block = chain.height() + self.inner.config.inclusion_delay_blocks;
		chain.include(hash.clone(), inclusion_block, success);
		if success {
			let fee = self.fee_of(amount);
			chain.transfer(
				&request.sender,
				&[
					(request.recipient_address.as_str(), amount.saturating_sub(fee)),
					(request.fee_recipients[0].as_str(), fee),
				],
				amount,
			);
		}

		tracing::debug!(
			tx_hash = %truncate_id(hash.as_str()),
			inclusion_block,
			"Mock tip accepted"
		);

		Ok(TipSubmission {
			transaction_hash: hash,
			receipt: None,
		})
	}

	async fn tips_total(&self, query: &TipsQuery) -> Result<Amount, LedgerError> {
		self.inner.calls.tips_total.hit();
		self.check_read_failure()?;

		let state = lock(&self.inner.state);
		Ok(state
			.tips
			.iter()
			.filter(|tip| tip.recipient_comment_cid == query.recipient_comment_cid)
			.filter(|tip| {
				query
					.sender
					.as_ref()
					.map_or(true, |sender| tip.sender.eq_ignore_ascii_case(sender))
			})
			.filter(|tip| {
				query
					.sender_comment_cid
					.as_ref()
					.map_or(true, |cid| tip.sender_comment_cid.as_ref() == Some(cid))
			})
			.map(|tip| tip.amount)
			.sum())
	}

	async fn minimum_tip_amount(&self) -> Result<Amount, LedgerError> {
		self.inner.calls.minimum_tip_amount.hit();
		self.check_read_failure()?;
		Ok(self.inner.config.minimum_tip)
	}

	async fn fee_percent(&self) -> Result<u32, LedgerError> {
		self.inner.calls.fee_percent.hit();
		Ok(self.inner.config.fee_percent)
	}

	async fn tips_activity(
		&self,
		address: &str,
		limit: usize,
	) -> Result<Vec<ActivityEntry>, LedgerError> {
		self.inner.calls.tips_activity.hit();
		self.check_read_failure()?;

		let state = lock(&self.inner.state);
		let mut entries = Vec::new();
		for tip in state.tips.iter().rev() {
			if tip.sender.eq_ignore_ascii_case(address) {
				entries.push(ActivityEntry::Sent {
					amount: tip.amount,
					recipient: tip.recipient_address.clone(),
					transaction_hash: tip.hash.clone(),
					timestamp: tip.timestamp,
				});
			}
			if tip.recipient_address.eq_ignore_ascii_case(address) {
				entries.push(ActivityEntry::Received {
					amount: tip.amount,
					sender: tip.sender.clone(),
					transaction_hash: tip.hash.clone(),
					timestamp: tip.timestamp,
				});
			}
		}
		entries.truncate(limit);
		Ok(entries)
	}

	fn provider(&self) -> Option<Arc<dyn ChainInterface>> {
		Some(self.inner.chain.clone() as Arc<dyn ChainInterface>)
	}
}

/// Configuration schema for MockTipping.
pub struct MockTippingSchema;

impl ConfigSchema for MockTippingSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let wei = |value: &toml::Value| match value.as_str() {
			Some(s) => s
				.parse::<Amount>()
				.map(|_| ())
				.map_err(|e| e.to_string()),
			None => Err("Expected a wei amount as a string".to_string()),
		};

		let schema = Schema::new(
			vec![],
			vec![
				Field::new("minimum_tip_wei", FieldType::String).with_validator(wei),
				Field::new(
					"fee_percent",
					FieldType::Integer {
						min: Some(0),
						max: Some(100),
					},
				),
				Field::new(
					"start_block",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new(
					"inclusion_delay_blocks",
					FieldType::Integer {
						min: Some(0),
						max: Some(1000),
					},
				),
				Field::new("auto_mine", FieldType::Boolean),
				Field::new(
					"send_delay_ms",
					FieldType::Integer {
						min: Some(0),
						max: Some(60_000),
					},
				),
				Field::new("default_balance_wei", FieldType::String).with_validator(wei),
			],
		);
		schema.validate(config)
	}
}

impl MockConfig {
	/// Reads the settings from an already validated implementation table.
	fn from_toml(config: &toml::Value) -> Result<Self, LedgerError> {
		let defaults = Self::default();
		let int = |name: &str| config.get(name).and_then(|v| v.as_integer());
		let wei = |name: &str, default: Amount| -> Result<Amount, LedgerError> {
			match config.get(name).and_then(|v| v.as_str()) {
				Some(s) => s
					.parse()
					.map_err(|e| LedgerError::Configuration(format!("{}: {}", name, e))),
				None => Ok(default),
			}
		};

		Ok(Self {
			minimum_tip: wei("minimum_tip_wei", defaults.minimum_tip)?,
			fee_percent: int("fee_percent").map_or(defaults.fee_percent, |v| v as u32),
			start_block: int("start_block").map_or(defaults.start_block, |v| v as u64),
			inclusion_delay_blocks: int("inclusion_delay_blocks")
				.map_or(defaults.inclusion_delay_blocks, |v| v as u64),
			// A standalone mock has no block producer, so it mines as it is read
			auto_mine: config
				.get("auto_mine")
				.and_then(|v| v.as_bool())
				.unwrap_or(true),
			send_delay: int("send_delay_ms")
				.map_or(defaults.send_delay, |v| Duration::from_millis(v as u64)),
			default_balance: wei("default_balance_wei", defaults.default_balance)?,
		})
	}
}

/// Factory function to create the simulated tipping client from configuration.
///
/// Configuration parameters (all optional):
/// - `minimum_tip_wei`: minimum tip, default 0.001 ETH
/// - `fee_percent`: protocol fee, default 5
/// - `start_block`: initial chain height, default 1
/// - `inclusion_delay_blocks`: blocks until a tip is mined, default 1
/// - `auto_mine`: mine a block on every height read, default true
/// - `send_delay_ms`: simulated send latency, default 0
/// - `default_balance_wei`: balance of unknown addresses, default 0
pub fn create_tipping(
	config: &toml::Value,
	rpc_urls: &[String],
) -> Result<Box<dyn TippingInterface>, LedgerError> {
	MockTippingSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(format!("Invalid configuration: {}", e)))?;

	let mock_config = MockConfig::from_toml(config)?;
	tracing::info!(
		rpc_urls = rpc_urls.len(),
		start_block = mock_config.start_block,
		"Using simulated tipping ledger"
	);
	Ok(Box::new(MockTipping::new(mock_config)))
}

/// Registry for the simulated tipping implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = TippingFactory;

	fn factory() -> Self::Factory {
		create_tipping
	}
}

impl TippingRegistry for Registry {}
