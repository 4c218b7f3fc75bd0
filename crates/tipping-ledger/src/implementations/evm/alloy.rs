//! Chain provider backed by Alloy HTTP providers.
//!
//! One provider is built per configured RPC URL. Every query tries them in
//! order and returns the first answer, so a later URL only serves as a
//! fallback when the earlier ones fail.

use crate::{ChainFactory, ChainInterface, ChainRegistry, LedgerError};
use alloy_primitives::{Address, B256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_transport_http::Http;
use async_trait::async_trait;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tipping_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, TransactionHash,
	TransactionReceipt, ValidationError,
};

type HttpProvider = Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>;

/// Alloy-based chain provider with ordered RPC fallback.
pub struct AlloyChain {
	/// Providers in fallback order, keyed by their RPC URL for logging.
	providers: Vec<(String, HttpProvider)>,
}

impl AlloyChain {
	/// Builds one HTTP provider per URL. No connection is made until the
	/// first query.
	pub fn new(rpc_urls: &[String]) -> Result<Self, LedgerError> {
		if rpc_urls.is_empty() {
			return Err(LedgerError::Configuration(
				"At least one RPC URL must be specified".to_string(),
			));
		}

		let mut providers = Vec::with_capacity(rpc_urls.len());
		for rpc_url in rpc_urls {
			let url = rpc_url.parse().map_err(|e| {
				LedgerError::Configuration(format!("Invalid RPC URL '{}': {}", rpc_url, e))
			})?;
			let provider = ProviderBuilder::new().on_http(url);
			providers.push((rpc_url.clone(), Arc::new(provider) as HttpProvider));
		}

		Ok(Self { providers })
	}

	/// Runs `query` against each provider in order until one succeeds.
	async fn with_fallback<T, F, Fut>(&self, operation: &str, query: F) -> Result<T, LedgerError>
	where
		F: Fn(HttpProvider) -> Fut,
		Fut: Future<Output = Result<T, String>>,
	{
		let mut last_error = None;
		for (rpc_url, provider) in &self.providers {
			match query(Arc::clone(provider)).await {
				Ok(value) => return Ok(value),
				Err(e) => {
					tracing::warn!(rpc_url = %rpc_url, error = %e, "Failed to {}", operation);
					last_error = Some(e);
				},
			}
		}
		Err(match last_error {
			Some(e) => LedgerError::Network(format!("Failed to {}: {}", operation, e)),
			None => LedgerError::NoProviderAvailable,
		})
	}
}

#[async_trait]
impl ChainInterface for AlloyChain {
	async fn block_number(&self) -> Result<u64, LedgerError> {
		self.with_fallback("get block number", |provider| async move {
			provider.get_block_number().await.map_err(|e| e.to_string())
		})
		.await
	}

	async fn transaction_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, LedgerError> {
		let tx_hash = B256::from_str(hash.as_str()).map_err(|e| {
			LedgerError::InvalidRequest(format!("Invalid transaction hash: {}", e))
		})?;

		self.with_fallback("get receipt", |provider| async move {
			let receipt = provider
				.get_transaction_receipt(tx_hash)
				.await
				.map_err(|e| e.to_string())?;
			Ok(receipt.and_then(|receipt| {
				// Pending receipts carry no block yet
				receipt.block_number.map(|block_number| TransactionReceipt {
					hash: TransactionHash::from_bytes(receipt.transaction_hash.as_slice()),
					block_number,
					success: receipt.status(),
				})
			}))
		})
		.await
	}

	async fn balance(&self, address: &str) -> Result<tipping_types::Amount, LedgerError> {
		let address = Address::from_str(address)
			.map_err(|e| LedgerError::InvalidRequest(format!("Invalid address: {}", e)))?;

		self.with_fallback("get balance", |provider| async move {
			provider
				.get_balance(address)
				.await
				.map(tipping_types::Amount)
				.map_err(|e| e.to_string())
		})
		.await
	}
}

/// Configuration schema for AlloyChain.
pub struct AlloyChainSchema;

impl ConfigSchema for AlloyChainSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("rpc_urls", FieldType::Array(Box::new(FieldType::String)))
					.with_validator(|value| {
						let urls = value.as_array().map(Vec::as_slice).unwrap_or_default();
						if urls.is_empty() {
							return Err("rpc_urls cannot be empty".to_string());
						}
						match urls.iter().filter_map(|v| v.as_str()).find(|url| {
							!url.starts_with("http://") && !url.starts_with("https://")
						}) {
							Some(url) => Err(format!("RPC URL must use http or https: {}", url)),
							None => Ok(()),
						}
					}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create the Alloy chain provider from configuration.
///
/// Configuration parameters:
/// - `rpc_urls` (optional): replaces the ledger-wide RPC URLs for chain queries
pub fn create_chain(
	config: &toml::Value,
	rpc_urls: &[String],
) -> Result<Box<dyn ChainInterface>, LedgerError> {
	AlloyChainSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(format!("Invalid configuration: {}", e)))?;

	let overrides: Option<Vec<String>> =
		config
			.get("rpc_urls")
			.and_then(|v| v.as_array())
			.map(|arr| {
				arr.iter()
					.filter_map(|v| v.as_str().map(str::to_string))
					.collect()
			});

	let chain = AlloyChain::new(overrides.as_deref().unwrap_or(rpc_urls))?;
	Ok(Box::new(chain))
}

/// Registry for the Alloy chain provider implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = ChainFactory;

	fn factory() -> Self::Factory {
		create_chain
	}
}

impl ChainRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(src: &str) -> toml::Value {
		toml::Value::Table(toml::from_str(src).unwrap())
	}

	#[test]
	fn test_builds_one_provider_per_url() {
		let urls = vec![
			"http://localhost:8545".to_string(),
			"https://rpc.sepolia.org".to_string(),
		];
		let chain = AlloyChain::new(&urls).unwrap();
		assert_eq!(chain.providers.len(), 2);
		assert_eq!(chain.providers[0].0, "http://localhost:8545");
	}

	#[test]
	fn test_rejects_missing_or_invalid_urls() {
		assert!(matches!(
			AlloyChain::new(&[]),
			Err(LedgerError::Configuration(_))
		));
		assert!(matches!(
			AlloyChain::new(&["not a url".to_string()]),
			Err(LedgerError::Configuration(_))
		));
	}

	#[test]
	fn test_schema() {
		let schema = AlloyChainSchema;
		assert!(schema.validate(&table("")).is_ok());
		assert!(schema
			.validate(&table("rpc_urls = [\"https://rpc.sepolia.org\"]"))
			.is_ok());
		assert!(schema.validate(&table("rpc_urls = []")).is_err());
		assert!(schema
			.validate(&table("rpc_urls = [\"ws://localhost:8546\"]"))
			.is_err());
	}

	#[test]
	fn test_factory_prefers_table_urls() {
		let config = table("rpc_urls = [\"http://localhost:9545\"]");
		assert!(create_chain(&config, &[]).is_ok());
		assert!(create_chain(&table(""), &[]).is_err());
	}

	#[tokio::test]
	async fn test_invalid_inputs_fail_before_any_request() {
		let chain = AlloyChain::new(&["http://localhost:8545".to_string()]).unwrap();
		assert!(matches!(
			chain.balance("0x1234").await,
			Err(LedgerError::InvalidRequest(_))
		));
		assert!(matches!(
			chain
				.transaction_receipt(&TransactionHash::new("0xnothex"))
				.await,
			Err(LedgerError::InvalidRequest(_))
		));
	}
}
