//! Block explorer links.

use serde::{Deserialize, Serialize};

/// Explorer used when none is configured.
pub const DEFAULT_EXPLORER_URL: &str = "https://sepolia.etherscan.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explorer {
	pub base_url: String,
}

impl Explorer {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into().trim_end_matches('/').to_string(),
		}
	}

	pub fn address_url(&self, address: &str) -> String {
		format!("{}/address/{}", self.base_url, address)
	}

	pub fn transaction_url(&self, hash: &str) -> String {
		format!("{}/tx/{}", self.base_url, hash)
	}
}

impl Default for Explorer {
	fn default() -> Self {
		Self::new(DEFAULT_EXPLORER_URL)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_explorer_urls() {
		let explorer = Explorer::new("https://etherscan.io/");
		assert_eq!(explorer.address_url("0xabc"), "https://etherscan.io/address/0xabc");
		assert_eq!(explorer.transaction_url("0x123"), "https://etherscan.io/tx/0x123");
		assert_eq!(
			Explorer::default().transaction_url("0x1"),
			"https://sepolia.etherscan.io/tx/0x1"
		);
	}
}
