//! Session context that wires the engine together.
//!
//! [`TippingContext`] owns the configuration, the shared ledger handle and
//! the account service, and hands out tip senders and readers configured
//! with the session's intervals and retry cap.

use crate::client::LedgerHandle;
use crate::readers::{
	ActivityReader, ActivitySource, BalanceReader, BalanceSource, CommentTipsReader,
	CommentTipsSource, SenderTipsReader, SenderTipsSource,
};
use crate::tip::TipSender;
use std::sync::Arc;
use thiserror::Error;
use tipping_account::{create_account_service, AccountError, AccountService};
use tipping_config::Config;
use tipping_ledger::TipsQuery;
use tipping_types::{Explorer, TipTarget};

/// Errors that can occur while building the context.
#[derive(Debug, Error)]
pub enum ContextError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Account error: {0}")]
	Account(#[from] AccountError),
}

pub struct TippingContext {
	config: Config,
	ledger: Arc<LedgerHandle>,
	account: Arc<AccountService>,
	explorer: Explorer,
}

impl TippingContext {
	pub fn new(config: Config, ledger: Arc<LedgerHandle>, account: Arc<AccountService>) -> Self {
		let explorer = Explorer::new(config.explorer.base_url.clone());
		Self {
			config,
			ledger,
			account,
			explorer,
		}
	}

	/// Builds the account service now and the ledger client on first use.
	pub fn from_config(config: Config) -> Result<Self, ContextError> {
		config
			.validate()
			.map_err(|e| ContextError::Config(e.to_string()))?;
		let account = create_account_service(&config.account)?;
		let ledger = LedgerHandle::from_config(config.ledger.clone());
		Ok(Self::new(config, Arc::new(ledger), Arc::new(account)))
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn ledger(&self) -> &Arc<LedgerHandle> {
		&self.ledger
	}

	pub fn account(&self) -> &Arc<AccountService> {
		&self.account
	}

	pub fn explorer(&self) -> &Explorer {
		&self.explorer
	}

	/// The session wallet, if one is configured.
	pub async fn wallet_address(&self) -> Option<String> {
		self.account.address().await.ok()
	}

	pub fn tip_sender(&self, target: TipTarget) -> TipSender {
		TipSender::new(
			Arc::clone(&self.ledger),
			Arc::clone(&self.account),
			target,
			&self.config.tipping.default_fee_recipient,
			&self.config.polling,
		)
	}

	/// Key for a comment's total. An absent CID yields an empty key.
	pub fn comment_query(&self, target: &TipTarget) -> TipsQuery {
		TipsQuery::comment(
			target.comment_cid().unwrap_or_default(),
			target.fee_recipients(&self.config.tipping.default_fee_recipient),
		)
	}

	/// Key for what `sender` tipped a comment.
	pub fn sender_query(&self, target: &TipTarget, sender: &str) -> TipsQuery {
		TipsQuery::sender(
			target.comment_cid().unwrap_or_default(),
			sender,
			target.fee_recipients(&self.config.tipping.default_fee_recipient),
		)
	}

	pub fn comment_tips_reader(&self) -> CommentTipsReader {
		CommentTipsReader::new(
			CommentTipsSource,
			Arc::clone(&self.ledger),
			self.config.polling.tips_refresh(),
			self.config.polling.max_consecutive_failures,
		)
	}

	pub fn sender_tips_reader(&self) -> SenderTipsReader {
		SenderTipsReader::new(
			SenderTipsSource,
			Arc::clone(&self.ledger),
			self.config.polling.tips_refresh(),
			self.config.polling.max_consecutive_failures,
		)
	}

	pub fn balance_reader(&self) -> BalanceReader {
		BalanceReader::new(
			BalanceSource,
			Arc::clone(&self.ledger),
			self.config.polling.balance_refresh(),
			self.config.polling.max_consecutive_failures,
		)
	}

	pub fn activity_reader(&self) -> ActivityReader {
		ActivityReader::new(
			ActivitySource::new(self.config.tipping.activity_limit),
			Arc::clone(&self.ledger),
			self.config.polling.activity_refresh(),
			self.config.polling.max_consecutive_failures,
		)
	}
}
