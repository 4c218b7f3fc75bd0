//! Wallet read from local configuration.
//!
//! Both fields are optional: a fresh profile may not have generated an ETH
//! wallet yet, in which case the engine reports the missing address or key
//! when a tip is attempted.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy_primitives::Address;
use async_trait::async_trait;
use std::str::FromStr;
use tipping_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, ValidationError,
};

/// Wallet whose address and key come straight from configuration.
pub struct LocalWallet {
	address: Option<String>,
	private_key: Option<SecretString>,
}

impl LocalWallet {
	/// Empty strings count as absent.
	pub fn new(address: Option<&str>, private_key: Option<&str>) -> Self {
		fn present(v: Option<&str>) -> Option<&str> {
			v.map(str::trim).filter(|v| !v.is_empty())
		}
		Self {
			address: present(address).map(str::to_string),
			private_key: present(private_key).map(SecretString::from),
		}
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<String, AccountError> {
		self.address.clone().ok_or(AccountError::MissingAddress)
	}

	fn private_key(&self) -> Result<SecretString, AccountError> {
		self.private_key.clone().ok_or(AccountError::MissingKey)
	}
}

/// Configuration schema for LocalWallet.
pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("address", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("") => Ok(()),
						Some(address) => Address::from_str(address)
							.map(|_| ())
							.map_err(|e| format!("Invalid address: {}", e)),
						None => Err("Expected string value for address".to_string()),
					}
				}),
				Field::new("private_key", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a local wallet from configuration.
///
/// Configuration parameters:
/// - `address`: ETH address of the wallet (optional)
/// - `private_key`: hex or base64 encoded private key (optional)
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::Implementation(format!("Invalid configuration: {}", e)))?;

	let address = config.get("address").and_then(|v| v.as_str());
	let private_key = config.get("private_key").and_then(|v| v.as_str());
	Ok(Box::new(LocalWallet::new(address, private_key)))
}

/// Registry for the local wallet implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(src: &str) -> toml::Value {
		toml::Value::Table(toml::from_str(src).unwrap())
	}

	#[tokio::test]
	async fn test_create_from_config() {
		let wallet = create_account(&config(
			r#"
address = "0x7CC17990FE944919Aa6b91AA576CEBf1E9454749"
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
"#,
		))
		.unwrap();

		assert_eq!(
			wallet.address().await.unwrap(),
			"0x7CC17990FE944919Aa6b91AA576CEBf1E9454749"
		);
		assert!(wallet.private_key().is_ok());
	}

	#[tokio::test]
	async fn test_empty_values_are_missing() {
		let wallet = create_account(&config("address = \"\"\nprivate_key = \"\"")).unwrap();
		assert!(matches!(wallet.address().await, Err(AccountError::MissingAddress)));
		assert!(matches!(wallet.private_key(), Err(AccountError::MissingKey)));
	}

	#[test]
	fn test_invalid_address_rejected() {
		let result = create_account(&config("address = \"0x1234\""));
		assert!(matches!(result, Err(AccountError::Implementation(_))));
	}
}
