//! Transaction types for tip submissions.
//!
//! This module defines transaction hashes and receipts as reported by the
//! ledger, the lifecycle status of a tip submission, and the record the
//! engine keeps for the most recent submission.

use crate::utils::with_0x_prefix;
use crate::Amount;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Transaction hash as a `0x` prefixed hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub String);

impl TransactionHash {
	pub fn new(hash: impl AsRef<str>) -> Self {
		Self(with_0x_prefix(hash.as_ref()))
	}

	pub fn from_bytes(bytes: &[u8]) -> Self {
		Self(with_0x_prefix(&hex::encode(bytes)))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Receipt of a transaction included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	/// Whether execution succeeded.
	pub success: bool,
}

/// What the ledger returns once it has accepted a tip transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipSubmission {
	pub transaction_hash: TransactionHash,
	/// Present when the ledger waited for inclusion before answering.
	pub receipt: Option<TransactionReceipt>,
}

/// Lifecycle of a tip submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipStatus {
	#[default]
	Idle,
	Sending,
	Pending,
	Confirmed,
	Failed,
}

impl TipStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			TipStatus::Idle => "idle",
			TipStatus::Sending => "sending",
			TipStatus::Pending => "pending",
			TipStatus::Confirmed => "confirmed",
			TipStatus::Failed => "failed",
		}
	}

	/// Checks a transition against the submission lifecycle.
	///
	/// Any state may be reset to idle except idle itself, a new submission
	/// may start from anything but an in-flight send, and the remaining
	/// moves follow sending -> pending -> confirmed with sending -> failed.
	pub fn can_transition_to(&self, to: TipStatus) -> bool {
		static TRANSITIONS: Lazy<HashMap<TipStatus, HashSet<TipStatus>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(TipStatus::Idle, HashSet::from([TipStatus::Sending]));
			m.insert(
				TipStatus::Sending,
				HashSet::from([TipStatus::Pending, TipStatus::Failed, TipStatus::Idle]),
			);
			m.insert(
				TipStatus::Pending,
				HashSet::from([TipStatus::Confirmed, TipStatus::Sending, TipStatus::Idle]),
			);
			m.insert(
				TipStatus::Confirmed,
				HashSet::from([TipStatus::Sending, TipStatus::Idle]),
			);
			m.insert(
				TipStatus::Failed,
				HashSet::from([TipStatus::Sending, TipStatus::Idle]),
			);
			m
		});

		TRANSITIONS
			.get(self)
			.is_some_and(|allowed| allowed.contains(&to))
	}
}

impl fmt::Display for TipStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The engine's view of one tip submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
	/// Set as soon as the ledger accepts the transaction.
	pub hash: Option<TransactionHash>,
	pub status: TipStatus,
	/// Block the transaction was included in, once confirmed.
	pub block_number: Option<u64>,
	pub confirmations: u64,
	pub amount: Option<Amount>,
	pub recipient_address: String,
	pub fee_recipients: Vec<String>,
	pub created_at: DateTime<Utc>,
	/// Execution result from the receipt, once confirmed.
	pub succeeded: Option<bool>,
}

impl TransactionRecord {
	pub fn new(recipient_address: String, fee_recipients: Vec<String>) -> Self {
		Self {
			hash: None,
			status: TipStatus::Sending,
			block_number: None,
			confirmations: 0,
			amount: None,
			recipient_address,
			fee_recipients,
			created_at: Utc::now(),
			succeeded: None,
		}
	}
}

/// Confirmation count for a transaction mined in `block_number` when the
/// chain is at `current_block`. A lagging endpoint can report a height below
/// the receipt's block, so the count never drops under one.
pub fn confirmations(current_block: u64, block_number: u64) -> u64 {
	current_block.saturating_sub(block_number) + 1
}
