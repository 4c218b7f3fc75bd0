//! Content targets and tip requests.
//!
//! A [`TipTarget`] describes the comment a tip is attached to, as seen by the
//! forum client: its content identifier, the author's wallet and any fee
//! recipient configured by the comment or its community.

use crate::{Amount, SecretString};
use serde::{Deserialize, Serialize};

/// Fee recipient used when neither the comment nor its community set one.
pub const DEFAULT_FEE_RECIPIENT: &str = "0x7CC17990FE944919Aa6b91AA576CEBf1E9454749";

fn non_empty(value: &Option<String>) -> Option<&str> {
	value.as_deref().filter(|v| !v.trim().is_empty())
}

/// The comment a tip is sent to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipTarget {
	/// Content identifier of the comment.
	pub comment_cid: Option<String>,
	/// ETH wallet address of the comment author.
	pub author_address: Option<String>,
	/// Fee recipient set on the comment itself.
	pub comment_fee_recipient: Option<String>,
	/// Fee recipient set by the community the comment was posted in.
	pub community_fee_recipient: Option<String>,
}

impl TipTarget {
	pub fn new(comment_cid: impl Into<String>) -> Self {
		Self {
			comment_cid: Some(comment_cid.into()),
			..Default::default()
		}
	}

	pub fn with_author_address(mut self, address: impl Into<String>) -> Self {
		self.author_address = Some(address.into());
		self
	}

	pub fn with_comment_fee_recipient(mut self, address: impl Into<String>) -> Self {
		self.comment_fee_recipient = Some(address.into());
		self
	}

	pub fn with_community_fee_recipient(mut self, address: impl Into<String>) -> Self {
		self.community_fee_recipient = Some(address.into());
		self
	}

	pub fn comment_cid(&self) -> Option<&str> {
		non_empty(&self.comment_cid)
	}

	pub fn recipient_address(&self) -> Option<&str> {
		non_empty(&self.author_address)
	}

	/// Resolves who receives the protocol fee for tips on this comment.
	///
	/// The comment's own setting wins over the community's, and `default`
	/// is used when neither is present. The result is never empty.
	pub fn fee_recipients(&self, default: &str) -> Vec<String> {
		let recipient = non_empty(&self.comment_fee_recipient)
			.or_else(|| non_empty(&self.community_fee_recipient))
			.unwrap_or(default);
		vec![recipient.to_string()]
	}
}

/// Everything the ledger client needs to build and send one tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipRequest {
	pub recipient_comment_cid: String,
	pub sender_comment_cid: Option<String>,
	pub recipient_address: String,
	pub fee_recipients: Vec<String>,
	pub sender: String,
	/// Hex encoded, `0x` prefixed.
	pub private_key: SecretString,
	/// `None` lets the ledger apply its minimum tip amount.
	pub amount: Option<Amount>,
}
