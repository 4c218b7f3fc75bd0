//! Observable state of a tip sender.

use tipping_types::{Amount, TipStatus, TransactionHash, TransactionRecord, TransactionReceipt};

/// Everything a view needs to render a tip submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TipSnapshot {
	pub status: TipStatus,
	/// True from the start of a submission until the ledger answers.
	pub is_loading: bool,
	/// Last validation or submission error.
	pub error: Option<String>,
	/// The most recent submission. Kept after cancel and replaced by the
	/// next submission.
	pub transaction: Option<TransactionRecord>,
	pub current_block: Option<u64>,
	pub confirmations: u64,
	/// Amount of the most recent submission, custom or the minimum.
	pub current_tip_amount: Option<Amount>,
	pub minimum_tip_amount: Option<Amount>,
	/// Set when the receipt or confirmation poller gave up after repeated
	/// failures. Cleared by a new submission or by resuming.
	pub polling_stopped: bool,
	/// Incremented whenever a submission starts or is cancelled. Results
	/// belonging to an older value are discarded.
	pub submission: u64,
}

impl TipSnapshot {
	pub fn transaction_hash(&self) -> Option<&TransactionHash> {
		self.transaction.as_ref().and_then(|tx| tx.hash.as_ref())
	}

	/// Moves to `to` if the lifecycle allows it.
	pub(crate) fn transition(&mut self, to: TipStatus) -> bool {
		if !self.status.can_transition_to(to) {
			tracing::debug!(from = %self.status, to = %to, "Ignoring tip status transition");
			return false;
		}
		self.status = to;
		if let Some(tx) = self.transaction.as_mut() {
			if to != TipStatus::Idle {
				tx.status = to;
			}
		}
		true
	}

	/// Records the receipt and the height it was observed at.
	pub(crate) fn confirm(&mut self, receipt: &TransactionReceipt, current_block: u64) -> bool {
		if !self.transition(TipStatus::Confirmed) {
			return false;
		}
		self.current_block = Some(current_block);
		if let Some(tx) = self.transaction.as_mut() {
			tx.block_number = Some(receipt.block_number);
			tx.succeeded = Some(receipt.success);
		}
		self.refresh_confirmations(current_block);
		true
	}

	pub(crate) fn refresh_confirmations(&mut self, current_block: u64) {
		self.current_block = Some(current_block);
		if let Some(tx) = self.transaction.as_mut() {
			if let Some(block_number) = tx.block_number {
				tx.confirmations = tipping_types::confirmations(current_block, block_number);
				self.confirmations = tx.confirmations;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn receipt(block_number: u64, success: bool) -> TransactionReceipt {
		TransactionReceipt {
			hash: TransactionHash::new("0xabc"),
			block_number,
			success,
		}
	}

	fn pending() -> TipSnapshot {
		let mut tx = TransactionRecord::new("0xrecipient".to_string(), vec!["0xfee".to_string()]);
		tx.hash = Some(TransactionHash::new("0xabc"));
		tx.status = TipStatus::Pending;
		TipSnapshot {
			status: TipStatus::Pending,
			transaction: Some(tx),
			..Default::default()
		}
	}

	#[test]
	fn test_confirm_computes_confirmations() {
		let mut snapshot = pending();
		assert!(snapshot.confirm(&receipt(100, true), 104));
		assert_eq!(snapshot.status, TipStatus::Confirmed);
		assert_eq!(snapshot.confirmations, 5);
		let tx = snapshot.transaction.as_ref().unwrap();
		assert_eq!(tx.block_number, Some(100));
		assert_eq!(tx.status, TipStatus::Confirmed);
		assert_eq!(tx.succeeded, Some(true));

		// A second receipt does not confirm twice
		assert!(!snapshot.confirm(&receipt(100, true), 110));
		assert_eq!(snapshot.confirmations, 5);

		snapshot.refresh_confirmations(110);
		assert_eq!(snapshot.confirmations, 11);
		assert_eq!(snapshot.current_block, Some(110));
	}

	#[test]
	fn test_lagging_height_still_counts_one_confirmation() {
		let mut snapshot = pending();
		snapshot.confirm(&receipt(100, false), 98);
		assert_eq!(snapshot.confirmations, 1);
		assert_eq!(snapshot.transaction.unwrap().succeeded, Some(false));
	}

	#[test]
	fn test_reset_keeps_record_status() {
		let mut snapshot = pending();
		assert!(snapshot.transition(TipStatus::Idle));
		assert_eq!(snapshot.status, TipStatus::Idle);
		assert_eq!(snapshot.transaction.unwrap().status, TipStatus::Pending);

		let mut idle = TipSnapshot::default();
		assert!(!idle.transition(TipStatus::Confirmed));
		assert_eq!(idle.status, TipStatus::Idle);
	}
}
