//! String formatting utilities.
//!
//! Provides functions for formatting strings for display, including
//! hex string prefix management, address shortening, relative timestamps and
//! truncation for log output.

use chrono::{DateTime, Utc};

/// Utility function to truncate a hex string for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.get(..8) {
		Some(prefix) if id.len() > 8 => format!("{}..", prefix),
		_ => id.to_string(),
	}
}

/// Adds "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes "0x" or "0X" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Shortens a wallet address to its first 10 and last 8 characters.
///
/// Addresses too short to benefit are returned unchanged.
///
/// # Example
///
/// `0x7CC17990FE944919Aa6b91AA576CEBf1E9454749` becomes `0x7CC17990...E9454749`.
pub fn format_address(address: &str) -> String {
	let len = address.len();
	if len <= 18 {
		return address.to_string();
	}
	match (address.get(..10), address.get(len - 8..)) {
		(Some(head), Some(tail)) => format!("{}...{}", head, tail),
		_ => address.to_string(),
	}
}

/// Describes how long ago `timestamp` was, relative to `now`.
///
/// Under a minute is "just now", under an hour is counted in minutes, under
/// a day in hours, and anything older prints the date itself.
pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
	let minutes = (now - timestamp).num_minutes();
	if minutes < 1 {
		"just now".to_string()
	} else if minutes < 60 {
		format!("{} minutes ago", minutes)
	} else if minutes < 1440 {
		format!("{} hours ago", minutes / 60)
	} else {
		timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
	}
}
