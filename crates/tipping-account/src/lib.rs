//! Account management for the tipping engine.
//!
//! This module defines the interface to the wallet provider that owns the
//! user's ETH address and key material. The engine never signs anything
//! itself: it only reads the address and hands the key, converted to the hex
//! form the ledger client expects, to the ledger client.

use async_trait::async_trait;
use tipping_config::AccountConfig;
use tipping_types::{private_key_to_hex, ConfigSchema, ImplementationRegistry, SecretString};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// The wallet has no ETH address.
	#[error("Wallet address not found")]
	MissingAddress,
	/// The wallet has no private key.
	#[error("Private key not found")]
	MissingKey,
	/// Error that occurs when a key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when the implementation cannot be built or queried.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for wallet providers.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the ETH address of the wallet.
	async fn address(&self) -> Result<String, AccountError>;

	/// Returns the stored private key, in whatever encoding the provider
	/// keeps it (hex or base64).
	fn private_key(&self) -> Result<SecretString, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages account operations.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the wallet address.
	pub async fn address(&self) -> Result<String, AccountError> {
		self.implementation.address().await
	}

	/// Returns the private key in the `0x` prefixed hex form used for signing.
	///
	/// Base64 stored keys are converted; hex keys pass through unchanged.
	pub fn signing_key(&self) -> Result<SecretString, AccountError> {
		let stored = self.implementation.private_key()?;
		if stored.is_empty() {
			return Err(AccountError::MissingKey);
		}
		stored
			.with_exposed(private_key_to_hex)
			.map(SecretString::from)
			.map_err(|e| AccountError::InvalidKey(e.to_string()))
	}
}

/// Builds the account service for the configured primary implementation.
pub fn create_account_service(config: &AccountConfig) -> Result<AccountService, AccountError> {
	let factory = get_all_implementations()
		.into_iter()
		.find(|(name, _)| *name == config.primary)
		.map(|(_, factory)| factory)
		.ok_or_else(|| {
			AccountError::Implementation(format!(
				"Unknown account implementation '{}'",
				config.primary
			))
		})?;

	let implementation_config = config.implementations.get(&config.primary).ok_or_else(|| {
		AccountError::Implementation(format!(
			"Account implementation '{}' is not configured",
			config.primary
		))
	})?;

	tracing::debug!(implementation = %config.primary, "Creating account service");
	let implementation = factory(implementation_config)?;
	Ok(AccountService::new(implementation))
}
