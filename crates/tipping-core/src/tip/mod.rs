//! Tip submission state machine.
//!
//! A [`TipSender`] is bound to one comment. `submit` validates the input,
//! sends the tip through the ledger client and, once the ledger has accepted
//! the transaction, follows it with a receipt poller until it is mined and
//! then with a slower poller that keeps the confirmation count fresh.
//!
//! Every submission and every cancel bumps a submission counter held in the
//! published state. Updates carry the counter value they were started with
//! and are dropped when it no longer matches, so a slow send or poll from an
//! abandoned submission can never overwrite a newer one.

mod state;

pub use state::TipSnapshot;

use crate::client::LedgerHandle;
use crate::poller::{self, PollHandle, PollSchedule};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tipping_account::{AccountError, AccountService};
use tipping_config::PollingConfig;
use tipping_ledger::LedgerError;
use tipping_types::{
	parse_display_amount, truncate_id, Amount, TipRequest, TipStatus, TipTarget, TransactionHash,
	TransactionRecord,
};
use tokio::sync::watch;
use tracing::instrument;

/// Errors returned by [`TipSender`] operations.
#[derive(Debug, Error)]
pub enum TipError {
	/// Input or session data is missing or malformed. Nothing was sent.
	#[error("{0}")]
	Validation(String),
	/// A submission is still waiting for the ledger to accept it.
	#[error("A tip is already being sent")]
	InProgress,
	/// The ledger refused the tip or could not be reached while sending.
	#[error("Failed to send tip: {0}")]
	Submission(String),
	#[error(transparent)]
	Ledger(#[from] LedgerError),
}

/// Poll cadence of a tip sender.
#[derive(Debug, Clone, Copy)]
struct PollSettings {
	pending_interval: Duration,
	confirmed_interval: Duration,
	max_consecutive_failures: u32,
}

impl From<&PollingConfig> for PollSettings {
	fn from(config: &PollingConfig) -> Self {
		Self {
			pending_interval: config.pending_interval(),
			confirmed_interval: config.confirmed_interval(),
			max_consecutive_failures: config.max_consecutive_failures,
		}
	}
}

struct SenderInner {
	ledger: Arc<LedgerHandle>,
	account: Arc<AccountService>,
	target: TipTarget,
	fee_recipients: Vec<String>,
	settings: PollSettings,
	state: watch::Sender<TipSnapshot>,
	poller: Mutex<Option<PollHandle>>,
}

/// Sends tips to one comment and tracks the latest submission.
///
/// Dropping the sender stops its pollers. A transaction that was already
/// handed to the ledger is not affected.
pub struct TipSender {
	inner: Arc<SenderInner>,
}

impl TipSender {
	pub fn new(
		ledger: Arc<LedgerHandle>,
		account: Arc<AccountService>,
		target: TipTarget,
		default_fee_recipient: &str,
		polling: &PollingConfig,
	) -> Self {
		let fee_recipients = target.fee_recipients(default_fee_recipient);
		let (state, _) = watch::channel(TipSnapshot::default());
		Self {
			inner: Arc::new(SenderInner {
				ledger,
				account,
				target,
				fee_recipients,
				settings: PollSettings::from(polling),
				state,
				poller: Mutex::new(None),
			}),
		}
	}

	/// Sends a tip of `amount` ether, or the ledger's minimum when `amount`
	/// is `None` or blank.
	///
	/// Returns the transaction hash once the ledger has accepted the tip;
	/// inclusion is tracked in the background. Validation failures only set
	/// the error field and leave the status unchanged.
	#[instrument(skip_all, fields(comment_cid = self.inner.target.comment_cid().unwrap_or("")))]
	pub async fn submit(&self, amount: Option<&str>) -> Result<TransactionHash, TipError> {
		let inner = &self.inner;

		let custom_amount = match amount.map(str::trim).filter(|a| !a.is_empty()) {
			Some(input) => Some(
				parse_display_amount(input)
					.map_err(|e| inner.reject(TipError::Validation(e.to_string())))?,
			),
			None => None,
		};
		let mut request = inner.prepare_request().await.map_err(|e| inner.reject(e))?;
		request.amount = custom_amount;

		let submission = inner.begin(&request)?;
		inner.stop_polling();

		let client = match inner.ledger.get_client().await {
			Ok(client) => client,
			Err(e) => return Err(inner.fail(submission, e)),
		};

		let tip_amount = match custom_amount {
			Some(amount) => Some(amount),
			None => match client.minimum_tip_amount().await {
				Ok(minimum) => {
					inner.state.send_modify(|s| s.minimum_tip_amount = Some(minimum));
					Some(minimum)
				},
				Err(e) => {
					tracing::warn!(error = %e, "Failed to get minimum tip amount");
					None
				},
			},
		};
		inner.update(submission, |s| {
			s.current_tip_amount = tip_amount;
			if let Some(tx) = s.transaction.as_mut() {
				tx.amount = tip_amount;
			}
			true
		});

		match client.block_number().await {
			Ok(height) => {
				inner.update(submission, |s| {
					s.current_block = Some(height);
					true
				});
			},
			Err(e) => tracing::debug!(error = %e, "Failed to get current block"),
		}

		match client.send_tip(&request).await {
			Ok(accepted) => {
				let hash = accepted.transaction_hash;
				let current = inner.update(submission, |s| {
					if !s.transition(TipStatus::Pending) {
						return false;
					}
					s.is_loading = false;
					if let Some(tx) = s.transaction.as_mut() {
						tx.hash = Some(hash.clone());
					}
					true
				});

				if current {
					tracing::info!(tx_hash = %truncate_id(hash.as_str()), "Tip sent, waiting for receipt");
					SenderInner::start_pending_poller(inner, submission);
				} else {
					tracing::debug!(
						tx_hash = %truncate_id(hash.as_str()),
						"Tip accepted after the submission was abandoned"
					);
				}
				Ok(hash)
			},
			Err(e) => Err(inner.fail(submission, e)),
		}
	}

	/// Abandons local tracking of the current submission and returns to idle.
	///
	/// The transaction record and its hash are kept. A transaction already
	/// handed to the ledger is not cancelled.
	pub fn cancel(&self) {
		self.inner.stop_polling();
		self.inner.state.send_if_modified(|s| {
			if !s.transition(TipStatus::Idle) {
				return false;
			}
			s.submission += 1;
			s.is_loading = false;
			true
		});
	}

	/// Restarts the poller matching the current status, e.g. after it gave
	/// up on an unreachable endpoint. Returns whether a poller was started.
	pub fn resume_polling(&self) -> bool {
		let snapshot = self.snapshot();
		if matches!(snapshot.status, TipStatus::Pending | TipStatus::Confirmed) {
			self.inner.update(snapshot.submission, |s| {
				std::mem::replace(&mut s.polling_stopped, false)
			});
		}
		match snapshot.status {
			TipStatus::Pending => {
				SenderInner::start_pending_poller(&self.inner, snapshot.submission);
				true
			},
			TipStatus::Confirmed => {
				SenderInner::start_confirmed_poller(&self.inner, snapshot.submission, true);
				true
			},
			_ => false,
		}
	}

	/// Whether the comment, its author's wallet and the user's wallet are
	/// all known. The private key is checked only when sending.
	pub async fn can_tip(&self) -> bool {
		self.inner.target.comment_cid().is_some()
			&& self.inner.target.recipient_address().is_some()
			&& self.inner.account.address().await.is_ok()
	}

	pub fn recipient_address(&self) -> Option<&str> {
		self.inner.target.recipient_address()
	}

	pub fn fee_recipients(&self) -> &[String] {
		&self.inner.fee_recipients
	}

	/// Reads the chain height and publishes it. Errors are logged.
	pub async fn get_current_block(&self) -> Option<u64> {
		let result = match self.inner.ledger.get_client().await {
			Ok(client) => client.block_number().await,
			Err(e) => Err(e),
		};
		match result {
			Ok(height) => {
				self.inner.state.send_modify(|s| s.current_block = Some(height));
				Some(height)
			},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to get current block");
				None
			},
		}
	}

	/// Reads the ledger's minimum tip and publishes it. Errors are logged.
	pub async fn get_minimum_tip_amount(&self) -> Option<Amount> {
		let result = match self.inner.ledger.get_client().await {
			Ok(client) => client.minimum_tip_amount().await,
			Err(e) => Err(e),
		};
		match result {
			Ok(minimum) => {
				self.inner
					.state
					.send_modify(|s| s.minimum_tip_amount = Some(minimum));
				Some(minimum)
			},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to get minimum tip amount");
				None
			},
		}
	}

	pub fn snapshot(&self) -> TipSnapshot {
		self.inner.state.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<TipSnapshot> {
		self.inner.state.subscribe()
	}
}

impl Drop for TipSender {
	fn drop(&mut self) {
		self.inner.stop_polling();
	}
}

impl SenderInner {
	/// Checks everything a send needs and builds the request.
	async fn prepare_request(&self) -> Result<TipRequest, TipError> {
		let comment_cid = self
			.target
			.comment_cid()
			.ok_or_else(|| TipError::Validation("Comment CID is required".to_string()))?;
		let recipient = self.target.recipient_address().ok_or_else(|| {
			TipError::Validation("Recipient wallet address not found".to_string())
		})?;
		let sender = self.account.address().await.map_err(|e| match e {
			AccountError::MissingAddress => {
				TipError::Validation("Your wallet address not found".to_string())
			},
			other => TipError::Validation(other.to_string()),
		})?;
		let private_key = self.account.signing_key().map_err(|e| match e {
			AccountError::MissingKey => {
				TipError::Validation("Private key is required to send tips".to_string())
			},
			other => TipError::Validation(other.to_string()),
		})?;

		Ok(TipRequest {
			recipient_comment_cid: comment_cid.to_string(),
			sender_comment_cid: None,
			recipient_address: recipient.to_string(),
			fee_recipients: self.fee_recipients.clone(),
			sender,
			private_key,
			amount: None,
		})
	}

	/// Publishes a validation error without touching the status.
	fn reject(&self, error: TipError) -> TipError {
		tracing::debug!(error = %error, "Tip rejected before sending");
		self.state.send_modify(|s| s.error = Some(error.to_string()));
		error
	}

	/// Starts a new submission and returns its number.
	fn begin(&self, request: &TipRequest) -> Result<u64, TipError> {
		let mut started = None;
		self.state.send_if_modified(|s| {
			if !s.transition(TipStatus::Sending) {
				return false;
			}
			s.submission += 1;
			s.is_loading = true;
			s.error = None;
			s.confirmations = 0;
			s.polling_stopped = false;
			s.current_tip_amount = request.amount;
			s.transaction = Some(TransactionRecord::new(
				request.recipient_address.clone(),
				request.fee_recipients.clone(),
			));
			started = Some(s.submission);
			true
		});
		started.ok_or(TipError::InProgress)
	}

	/// Marks the submission failed and converts the ledger error.
	fn fail(&self, submission: u64, error: LedgerError) -> TipError {
		tracing::error!(error = %error, "Failed to send tip");
		let message = error.to_string();
		self.update(submission, |s| {
			if !s.transition(TipStatus::Failed) {
				return false;
			}
			s.is_loading = false;
			s.error = Some(message.clone());
			true
		});
		TipError::Submission(message)
	}

	/// Applies `f` if `submission` is still the current one. `f` returns
	/// whether it changed anything.
	fn update(&self, submission: u64, f: impl FnOnce(&mut TipSnapshot) -> bool) -> bool {
		self.state.send_if_modified(|s| s.submission == submission && f(s))
	}

	fn replace_poller(&self, handle: Option<PollHandle>) {
		let previous = {
			let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
			std::mem::replace(&mut *poller, handle)
		};
		if let Some(previous) = previous {
			previous.cancel();
		}
	}

	fn stop_polling(&self) {
		self.replace_poller(None);
	}

	fn start_pending_poller(this: &Arc<Self>, submission: u64) {
		let weak = Arc::downgrade(this);
		let schedule = PollSchedule::every(this.settings.pending_interval)
			.with_failure_cap(this.settings.max_consecutive_failures);
		let action = {
			let weak = weak.clone();
			move || {
				let weak: Weak<Self> = weak.clone();
				async move {
					match weak.upgrade() {
						Some(inner) => inner.poll_pending(submission).await,
						None => Ok(()),
					}
				}
			}
		};
		let handle = poller::schedule_with_give_up(
			"tip-pending",
			schedule,
			action,
			Self::on_give_up(weak, submission),
		);
		this.replace_poller(Some(handle));
	}

	fn start_confirmed_poller(this: &Arc<Self>, submission: u64, immediate: bool) {
		let weak = Arc::downgrade(this);
		let mut schedule = PollSchedule::every(this.settings.confirmed_interval)
			.with_failure_cap(this.settings.max_consecutive_failures);
		if !immediate {
			schedule = schedule.delayed();
		}
		let action = {
			let weak = weak.clone();
			move || {
				let weak: Weak<Self> = weak.clone();
				async move {
					match weak.upgrade() {
						Some(inner) => inner.poll_confirmed(submission).await,
						None => Ok(()),
					}
				}
			}
		};
		let handle = poller::schedule_with_give_up(
			"tip-confirmed",
			schedule,
			action,
			Self::on_give_up(weak, submission),
		);
		this.replace_poller(Some(handle));
	}

	/// Publishes that polling for `submission` stopped on its own.
	fn on_give_up(weak: Weak<Self>, submission: u64) -> impl Fn() + Send + Sync + 'static {
		move || {
			if let Some(inner) = weak.upgrade() {
				inner.update(submission, |s| !std::mem::replace(&mut s.polling_stopped, true));
			}
		}
	}

	/// Looks for the receipt of the pending transaction.
	async fn poll_pending(self: Arc<Self>, submission: u64) -> Result<(), TipError> {
		let hash = {
			let state = self.state.borrow();
			if state.submission != submission || state.status != TipStatus::Pending {
				return Ok(());
			}
			match state.transaction_hash() {
				Some(hash) => hash.clone(),
				None => return Ok(()),
			}
		};

		let client = self.ledger.get_client().await?;
		let receipt = client.transaction_receipt(&hash).await?;
		let height = client.block_number().await?;

		match receipt {
			None => {
				tracing::debug!(tx_hash = %truncate_id(hash.as_str()), height, "Tip not mined yet");
				self.update(submission, |s| {
					s.current_block = Some(height);
					true
				});
			},
			Some(receipt) => {
				if self.update(submission, |s| s.confirm(&receipt, height)) {
					tracing::info!(
						tx_hash = %truncate_id(hash.as_str()),
						block_number = receipt.block_number,
						success = receipt.success,
						"Tip confirmed"
					);
					Self::start_confirmed_poller(&self, submission, false);
				}
			},
		}
		Ok(())
	}

	/// Refreshes the height and the confirmation count.
	async fn poll_confirmed(self: Arc<Self>, submission: u64) -> Result<(), TipError> {
		let client = self.ledger.get_client().await?;
		let height = client.block_number().await?;
		self.update(submission, |s| {
			s.refresh_confirmations(height);
			true
		});
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tipping_account::implementations::local::LocalWallet;
	use tipping_ledger::implementations::mock::{MockConfig, MockTipping};
	use tipping_ledger::LedgerService;
	use tokio::time::sleep;

	const SENDER: &str = "0x1111111111111111111111111111111111111111";
	const AUTHOR: &str = "0x2222222222222222222222222222222222222222";
	const MINIMUM: u128 = 1_000_000_000_000_000;

	fn target() -> TipTarget {
		TipTarget::new("QmComment").with_author_address(AUTHOR)
	}

	fn account() -> Arc<AccountService> {
		// base64 of 0xdeadbeef
		Arc::new(AccountService::new(Box::new(LocalWallet::new(
			Some(SENDER),
			Some("3q2+7w=="),
		))))
	}

	fn sender_for(mock: &MockTipping, target: TipTarget, account: Arc<AccountService>) -> TipSender {
		let ledger = LedgerHandle::initialized(LedgerService::new(
			Box::new(mock.clone()),
			mock.chain(),
			Duration::from_secs(60),
		));
		TipSender::new(
			Arc::new(ledger),
			account,
			target,
			tipping_types::DEFAULT_FEE_RECIPIENT,
			&PollingConfig::default(),
		)
	}

	fn setup(config: MockConfig) -> (MockTipping, TipSender) {
		let mock = MockTipping::new(config);
		let sender = sender_for(&mock, target(), account());
		(mock, sender)
	}

	#[tokio::test]
	async fn test_missing_recipient_makes_no_ledger_call() {
		let mock = MockTipping::new(MockConfig::default());
		let sender = sender_for(&mock, TipTarget::new("QmComment"), account());

		let result = sender.submit(None).await;
		assert!(matches!(result, Err(TipError::Validation(ref m)) if m == "Recipient wallet address not found"));

		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Idle);
		assert_eq!(snapshot.error.as_deref(), Some("Recipient wallet address not found"));
		assert!(snapshot.transaction.is_none());
		assert_eq!(mock.calls().total(), 0);
	}

	#[tokio::test]
	async fn test_validation_messages() {
		let mock = MockTipping::new(MockConfig::default());

		let sender = sender_for(&mock, TipTarget::default(), account());
		let err = sender.submit(None).await.unwrap_err();
		assert_eq!(err.to_string(), "Comment CID is required");

		let no_wallet = Arc::new(AccountService::new(Box::new(LocalWallet::new(None, None))));
		let sender = sender_for(&mock, target(), no_wallet);
		assert!(!sender.can_tip().await);
		let err = sender.submit(None).await.unwrap_err();
		assert_eq!(err.to_string(), "Your wallet address not found");

		let no_key = Arc::new(AccountService::new(Box::new(LocalWallet::new(Some(SENDER), None))));
		let sender = sender_for(&mock, target(), no_key);
		assert!(sender.can_tip().await);
		let err = sender.submit(None).await.unwrap_err();
		assert_eq!(err.to_string(), "Private key is required to send tips");

		let sender = sender_for(&mock, target(), account());
		for input in ["abc", "0", "-1"] {
			assert!(matches!(
				sender.submit(Some(input)).await,
				Err(TipError::Validation(_))
			));
			assert_eq!(sender.snapshot().status, TipStatus::Idle);
		}
		assert_eq!(
			sender.snapshot().error.as_deref(),
			Some("Please enter a valid tip amount greater than 0")
		);

		assert_eq!(mock.calls().total(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_lifecycle_to_confirmed() {
		let (mock, sender) = setup(MockConfig {
			start_block: 100,
			inclusion_delay_blocks: 2,
			..Default::default()
		});
		let chain = mock.chain();
		let mut updates = sender.subscribe();

		let hash = sender.submit(None).await.unwrap();
		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Pending);
		assert!(!snapshot.is_loading);
		assert_eq!(snapshot.transaction_hash(), Some(&hash));
		assert_eq!(snapshot.current_tip_amount, Some(Amount::from_wei(MINIMUM)));
		assert_eq!(snapshot.minimum_tip_amount, Some(Amount::from_wei(MINIMUM)));
		assert_eq!(snapshot.current_block, Some(100));
		assert!(updates.has_changed().unwrap());
		updates.mark_unchanged();

		// Not mined yet: only the height is refreshed
		chain.mine(1);
		sleep(Duration::from_secs(1)).await;
		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Pending);
		assert_eq!(snapshot.current_block, Some(101));

		chain.mine(3);
		sleep(Duration::from_secs(5)).await;
		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Confirmed);
		let tx = snapshot.transaction.as_ref().unwrap();
		assert_eq!(tx.block_number, Some(102));
		assert_eq!(tx.succeeded, Some(true));
		assert_eq!(snapshot.confirmations, 3);

		chain.mine(5);
		sleep(Duration::from_secs(16)).await;
		assert_eq!(sender.snapshot().confirmations, 8);
		assert_eq!(sender.snapshot().current_block, Some(109));
	}

	#[tokio::test(start_paused = true)]
	async fn test_custom_amount_is_sent() {
		let (mock, sender) = setup(MockConfig::default());
		sender.submit(Some("0.01")).await.unwrap();

		let snapshot = sender.snapshot();
		let amount = Amount::from_wei(10_000_000_000_000_000);
		assert_eq!(snapshot.current_tip_amount, Some(amount));
		assert_eq!(snapshot.transaction.unwrap().amount, Some(amount));
		assert_eq!(mock.calls().minimum_tip_amount, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_pending_stops_polls_and_keeps_hash() {
		let (mock, sender) = setup(MockConfig {
			inclusion_delay_blocks: 1000,
			..Default::default()
		});

		let hash = sender.submit(None).await.unwrap();
		sleep(Duration::from_secs(6)).await;
		let polls = mock.calls().transaction_receipt;
		assert!(polls >= 2);

		sender.cancel();
		sender.cancel();
		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Idle);
		assert_eq!(snapshot.transaction_hash(), Some(&hash));

		sleep(Duration::from_secs(60)).await;
		assert_eq!(mock.calls().transaction_receipt, polls);
	}

	#[tokio::test(start_paused = true)]
	async fn test_send_failure() {
		let (mock, sender) = setup(MockConfig::default());
		mock.set_send_failure(Some("insufficient funds"));

		let result = sender.submit(None).await;
		assert!(matches!(result, Err(TipError::Submission(_))));

		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Failed);
		assert!(!snapshot.is_loading);
		assert!(snapshot.error.unwrap().contains("insufficient funds"));
		assert_eq!(snapshot.transaction.unwrap().status, TipStatus::Failed);

		// A failed submission can be retried
		mock.set_send_failure(None);
		sender.submit(None).await.unwrap();
		assert_eq!(sender.snapshot().status, TipStatus::Pending);
		assert!(sender.snapshot().error.is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn test_second_submit_while_sending_is_refused() {
		let (mock, sender) = setup(MockConfig {
			send_delay: Duration::from_secs(10),
			..Default::default()
		});

		let (first, second) = tokio::join!(sender.submit(None), async {
			sleep(Duration::from_secs(1)).await;
			sender.submit(None).await
		});
		assert!(first.is_ok());
		assert!(matches!(second, Err(TipError::InProgress)));
		assert_eq!(mock.calls().send_tip, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_while_sending_discards_late_result() {
		let (mock, sender) = setup(MockConfig {
			send_delay: Duration::from_secs(10),
			..Default::default()
		});

		let (result, _) = tokio::join!(sender.submit(None), async {
			sleep(Duration::from_secs(1)).await;
			sender.cancel();
		});
		assert!(result.is_ok());

		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Idle);
		assert!(snapshot.transaction_hash().is_none());

		sleep(Duration::from_secs(30)).await;
		assert_eq!(mock.calls().transaction_receipt, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_new_submission_supersedes_previous() {
		let (mock, sender) = setup(MockConfig {
			inclusion_delay_blocks: 1000,
			..Default::default()
		});

		let first = sender.submit(None).await.unwrap();
		sleep(Duration::from_secs(1)).await;
		let second = sender.submit(None).await.unwrap();
		assert_ne!(first, second);

		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Pending);
		assert_eq!(snapshot.transaction_hash(), Some(&second));
		assert_eq!(snapshot.submission, 2);

		// Only the second submission's poller is left
		let before = mock.calls().transaction_receipt;
		sleep(Duration::from_secs(3)).await;
		assert_eq!(mock.calls().transaction_receipt, before + 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_reverted_tip_is_confirmed_as_failed_execution() {
		let (mock, sender) = setup(MockConfig::default());
		mock.revert_next_tip();

		sender.submit(None).await.unwrap();
		mock.chain().mine(1);
		sleep(Duration::from_secs(6)).await;

		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Confirmed);
		assert_eq!(snapshot.transaction.unwrap().succeeded, Some(false));
	}

	#[tokio::test(start_paused = true)]
	async fn test_poll_errors_leave_state_and_resume() {
		let (mock, sender) = setup(MockConfig::default());
		let chain = mock.chain();

		sender.submit(None).await.unwrap();
		chain.set_failure(Some("rpc down"));
		chain.mine(1);

		// Default cap is 120 failures at 5 s
		sleep(Duration::from_secs(500)).await;
		assert!(!sender.snapshot().polling_stopped);
		sleep(Duration::from_secs(200)).await;
		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Pending);
		assert!(snapshot.polling_stopped);
		let attempts = chain.calls().transaction_receipt;
		sleep(Duration::from_secs(60)).await;
		assert_eq!(chain.calls().transaction_receipt, attempts);

		chain.set_failure(None);
		assert!(sender.resume_polling());
		assert!(!sender.snapshot().polling_stopped);
		sleep(Duration::from_secs(1)).await;
		assert_eq!(sender.snapshot().status, TipStatus::Confirmed);
	}

	#[tokio::test(start_paused = true)]
	async fn test_give_up_is_published_and_cleared_by_next_submission() {
		let mock = MockTipping::new(MockConfig::default());
		let ledger = LedgerHandle::initialized(LedgerService::new(
			Box::new(mock.clone()),
			mock.chain(),
			Duration::from_secs(60),
		));
		let polling = PollingConfig {
			max_consecutive_failures: 3,
			..Default::default()
		};
		let sender = TipSender::new(
			Arc::new(ledger),
			account(),
			target(),
			tipping_types::DEFAULT_FEE_RECIPIENT,
			&polling,
		);
		let mut updates = sender.subscribe();

		sender.submit(None).await.unwrap();
		mock.chain().set_failure(Some("rpc down"));
		updates.mark_unchanged();

		sleep(Duration::from_secs(30)).await;
		assert!(updates.has_changed().unwrap());
		let snapshot = sender.snapshot();
		assert_eq!(snapshot.status, TipStatus::Pending);
		assert!(snapshot.polling_stopped);

		mock.chain().set_failure(None);
		sender.submit(None).await.unwrap();
		assert!(!sender.snapshot().polling_stopped);
	}

	#[tokio::test(start_paused = true)]
	async fn test_drop_stops_polling() {
		let (mock, sender) = setup(MockConfig {
			inclusion_delay_blocks: 1000,
			..Default::default()
		});
		sender.submit(None).await.unwrap();
		sleep(Duration::from_secs(1)).await;
		let polls = mock.calls().transaction_receipt;

		drop(sender);
		sleep(Duration::from_secs(60)).await;
		assert_eq!(mock.calls().transaction_receipt, polls);
	}

	#[tokio::test]
	async fn test_accessors() {
		let mock = MockTipping::new(MockConfig {
			start_block: 7,
			..Default::default()
		});
		let target = target().with_community_fee_recipient("0xcommunity");
		let sender = sender_for(&mock, target, account());

		assert_eq!(sender.recipient_address(), Some(AUTHOR));
		assert_eq!(sender.fee_recipients().to_vec(), vec!["0xcommunity".to_string()]);
		assert_eq!(sender.get_current_block().await, Some(7));
		assert_eq!(
			sender.get_minimum_tip_amount().await,
			Some(Amount::from_wei(MINIMUM))
		);
		assert_eq!(sender.snapshot().current_block, Some(7));
		assert!(!sender.resume_polling());
	}
}
