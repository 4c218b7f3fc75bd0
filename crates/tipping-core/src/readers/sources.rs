use super::ReadSource;
use async_trait::async_trait;
use tipping_ledger::{CacheMode, LedgerError, LedgerService, TipsQuery};
use tipping_types::{ActivityEntry, Amount};

/// Total of all tips received by a comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentTipsSource;

#[async_trait]
impl ReadSource for CommentTipsSource {
	type Key = TipsQuery;
	type Value = Amount;

	const NAME: &'static str = "comment-tips";

	fn is_empty_key(&self, key: &TipsQuery) -> bool {
		key.recipient_comment_cid.trim().is_empty()
	}

	fn refresh_mode(&self) -> CacheMode {
		CacheMode::Bypass
	}

	async fn fetch(
		&self,
		client: &LedgerService,
		key: &TipsQuery,
		mode: CacheMode,
	) -> Result<Amount, LedgerError> {
		client.tips_total(key, mode).await
	}
}

/// Total one wallet has tipped a comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderTipsSource;

#[async_trait]
impl ReadSource for SenderTipsSource {
	type Key = TipsQuery;
	type Value = Amount;

	const NAME: &'static str = "sender-tips";

	fn is_empty_key(&self, key: &TipsQuery) -> bool {
		key.recipient_comment_cid.trim().is_empty()
			|| key.sender.as_deref().is_none_or(|s| s.trim().is_empty())
	}

	fn refresh_mode(&self) -> CacheMode {
		CacheMode::Bypass
	}

	async fn fetch(
		&self,
		client: &LedgerService,
		key: &TipsQuery,
		mode: CacheMode,
	) -> Result<Amount, LedgerError> {
		client.tips_total(key, mode).await
	}
}

/// Native balance of a wallet.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceSource;

#[async_trait]
impl ReadSource for BalanceSource {
	type Key = String;
	type Value = Amount;

	const NAME: &'static str = "wallet-balance";

	fn is_empty_key(&self, key: &String) -> bool {
		key.trim().is_empty()
	}

	fn refresh_mode(&self) -> CacheMode {
		CacheMode::Bypass
	}

	async fn fetch(
		&self,
		client: &LedgerService,
		address: &String,
		mode: CacheMode,
	) -> Result<Amount, LedgerError> {
		client.balance(address, mode).await
	}
}

/// Most recent tips sent or received by a wallet.
#[derive(Debug, Clone, Copy)]
pub struct ActivitySource {
	limit: usize,
}

impl ActivitySource {
	pub fn new(limit: usize) -> Self {
		Self { limit }
	}

	pub fn limit(&self) -> usize {
		self.limit
	}
}

#[async_trait]
impl ReadSource for ActivitySource {
	type Key = String;
	type Value = Vec<ActivityEntry>;

	const NAME: &'static str = "tipping-activity";

	fn is_empty_key(&self, key: &String) -> bool {
		key.trim().is_empty()
	}

	fn refresh_mode(&self) -> CacheMode {
		CacheMode::Cached
	}

	async fn fetch(
		&self,
		client: &LedgerService,
		address: &String,
		mode: CacheMode,
	) -> Result<Vec<ActivityEntry>, LedgerError> {
		let entries = client.tips_activity(address, self.limit, mode).await?;
		tracing::debug!(
			address = %tipping_types::format_address(address),
			entries = entries.len(),
			"Loaded tipping activity"
		);
		Ok(entries)
	}
}
