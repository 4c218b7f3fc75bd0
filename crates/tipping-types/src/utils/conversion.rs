//! Conversion of stored key material.
//!
//! Wallets created by the forum client store the private key base64 encoded,
//! while the ledger client signs with a `0x` prefixed hex key.

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
	#[error("Private key is empty")]
	EmptyKey,
	#[error("Invalid private key encoding: {0}")]
	InvalidEncoding(String),
}

/// Converts a stored private key into `0x` prefixed hex.
///
/// Keys already carrying a `0x` prefix are returned as they are. Anything
/// else is decoded as standard base64 and re-encoded as hex.
pub fn private_key_to_hex(key: &str) -> Result<String, ConversionError> {
	let key = key.trim();
	if key.is_empty() {
		return Err(ConversionError::EmptyKey);
	}
	if key.starts_with("0x") {
		return Ok(key.to_string());
	}

	let bytes = general_purpose::STANDARD
		.decode(key)
		.map_err(|e| ConversionError::InvalidEncoding(e.to_string()))?;
	if bytes.is_empty() {
		return Err(ConversionError::EmptyKey);
	}
	Ok(format!("0x{}", hex::encode(bytes)))
}
