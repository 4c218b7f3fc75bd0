//! Tipping activity history.

use crate::{Amount, TransactionHash};
use serde::{Deserialize, Serialize};

/// Direction of a tip relative to the wallet whose history is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
	Sent,
	Received,
}

/// One tip in a wallet's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityEntry {
	/// A tip this wallet sent to `recipient`.
	Sent {
		amount: Amount,
		recipient: String,
		transaction_hash: TransactionHash,
		/// Unix timestamp in seconds.
		timestamp: u64,
	},
	/// A tip this wallet received from `sender`.
	Received {
		amount: Amount,
		sender: String,
		transaction_hash: TransactionHash,
		/// Unix timestamp in seconds.
		timestamp: u64,
	},
}

impl ActivityEntry {
	pub fn kind(&self) -> ActivityKind {
		match self {
			ActivityEntry::Sent { .. } => ActivityKind::Sent,
			ActivityEntry::Received { .. } => ActivityKind::Received,
		}
	}

	pub fn amount(&self) -> Amount {
		match self {
			ActivityEntry::Sent { amount, .. } | ActivityEntry::Received { amount, .. } => *amount,
		}
	}

	/// The other side of the transfer.
	pub fn counterparty(&self) -> &str {
		match self {
			ActivityEntry::Sent { recipient, .. } => recipient,
			ActivityEntry::Received { sender, .. } => sender,
		}
	}

	pub fn transaction_hash(&self) -> &TransactionHash {
		match self {
			ActivityEntry::Sent {
				transaction_hash, ..
			}
			| ActivityEntry::Received {
				transaction_hash, ..
			} => transaction_hash,
		}
	}

	pub fn timestamp(&self) -> u64 {
		match self {
			ActivityEntry::Sent { timestamp, .. } | ActivityEntry::Received { timestamp, .. } => {
				*timestamp
			},
		}
	}
}

/// Sums and counts over an activity list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTotals {
	pub total_sent: Amount,
	pub total_received: Amount,
	pub sent_count: usize,
	pub received_count: usize,
}

impl ActivityTotals {
	pub fn from_entries(entries: &[ActivityEntry]) -> Self {
		entries
			.iter()
			.fold(Self::default(), |mut totals, entry| {
				match entry.kind() {
					ActivityKind::Sent => {
						totals.total_sent = totals.total_sent.saturating_add(entry.amount());
						totals.sent_count += 1;
					},
					ActivityKind::Received => {
						totals.total_received =
							totals.total_received.saturating_add(entry.amount());
						totals.received_count += 1;
					},
				}
				totals
			})
	}
}
