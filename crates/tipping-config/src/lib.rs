//! Configuration module for the tipping engine.
//!
//! This module provides structures and utilities for managing engine
//! configuration. It supports loading configuration from TOML files with
//! `${VAR}` and `${VAR:-default}` environment variable substitution, and
//! validates every section before handing the configuration out.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tipping_types::{without_0x_prefix, DEFAULT_EXPLORER_URL, DEFAULT_FEE_RECIPIENT};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the tipping engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Ledger client, chain provider and cache settings.
	pub ledger: LedgerConfig,
	/// Poll intervals and the retry cap.
	#[serde(default)]
	pub polling: PollingConfig,
	/// Tipping defaults.
	#[serde(default)]
	pub tipping: TippingConfig,
	/// Block explorer used for links.
	#[serde(default)]
	pub explorer: ExplorerConfig,
	/// Configuration for the wallet account provider.
	pub account: AccountConfig,
}

/// Configuration for the ledger client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// RPC endpoints in priority order. The first is the primary, the rest
	/// are fallbacks.
	pub rpc_urls: Vec<String>,
	/// Which tipping client implementation to use.
	pub tipping: String,
	/// Optional chain provider implementation. When absent the tipping
	/// client's own provider is used.
	#[serde(default)]
	pub provider: Option<String>,
	/// Read cache policy.
	#[serde(default)]
	pub cache: CacheConfig,
	/// Map of implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl LedgerConfig {
	/// Returns the raw configuration table for an implementation, or an
	/// empty table when the implementation needs no settings.
	pub fn implementation_config(&self, name: &str) -> toml::Value {
		self.implementations
			.get(name)
			.cloned()
			.unwrap_or_else(|| toml::Value::Table(toml::Table::new()))
	}
}

/// Cache policy for ledger reads.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
	/// How long a cached read may be served, in milliseconds.
	#[serde(default = "default_cache_max_age_ms")]
	pub max_age_ms: u64,
}

impl CacheConfig {
	pub fn max_age(&self) -> Duration {
		Duration::from_millis(self.max_age_ms)
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			max_age_ms: default_cache_max_age_ms(),
		}
	}
}

fn default_cache_max_age_ms() -> u64 {
	60_000
}

/// Poll intervals and the consecutive failure cap shared by every poller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
	/// Receipt polling interval while a tip is pending.
	#[serde(default = "default_pending_interval")]
	pub pending_interval_seconds: u64,
	/// Confirmation count refresh interval once a tip is mined.
	#[serde(default = "default_confirmed_interval")]
	pub confirmed_interval_seconds: u64,
	/// Refresh interval for comment and sender tip totals.
	#[serde(default = "default_tips_refresh")]
	pub tips_refresh_seconds: u64,
	/// Refresh interval for the wallet balance.
	#[serde(default = "default_balance_refresh")]
	pub balance_refresh_seconds: u64,
	/// Refresh interval for the activity history.
	#[serde(default = "default_activity_refresh")]
	pub activity_refresh_seconds: u64,
	/// Consecutive failed polls after which a poller gives up.
	#[serde(default = "default_max_consecutive_failures")]
	pub max_consecutive_failures: u32,
}

impl PollingConfig {
	pub fn pending_interval(&self) -> Duration {
		Duration::from_secs(self.pending_interval_seconds)
	}

	pub fn confirmed_interval(&self) -> Duration {
		Duration::from_secs(self.confirmed_interval_seconds)
	}

	pub fn tips_refresh(&self) -> Duration {
		Duration::from_secs(self.tips_refresh_seconds)
	}

	pub fn balance_refresh(&self) -> Duration {
		Duration::from_secs(self.balance_refresh_seconds)
	}

	pub fn activity_refresh(&self) -> Duration {
		Duration::from_secs(self.activity_refresh_seconds)
	}
}

impl Default for PollingConfig {
	fn default() -> Self {
		Self {
			pending_interval_seconds: default_pending_interval(),
			confirmed_interval_seconds: default_confirmed_interval(),
			tips_refresh_seconds: default_tips_refresh(),
			balance_refresh_seconds: default_balance_refresh(),
			activity_refresh_seconds: default_activity_refresh(),
			max_consecutive_failures: default_max_consecutive_failures(),
		}
	}
}

fn default_pending_interval() -> u64 {
	5
}

fn default_confirmed_interval() -> u64 {
	15
}

fn default_tips_refresh() -> u64 {
	60
}

fn default_balance_refresh() -> u64 {
	30
}

fn default_activity_refresh() -> u64 {
	60
}

/// Returns the default failure cap: ten minutes of pending polls.
fn default_max_consecutive_failures() -> u32 {
	120
}

/// Tipping defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TippingConfig {
	/// Fee recipient used when neither the comment nor the community set one.
	#[serde(default = "default_fee_recipient")]
	pub default_fee_recipient: String,
	/// Number of entries fetched for the activity history.
	#[serde(default = "default_activity_limit")]
	pub activity_limit: usize,
}

impl Default for TippingConfig {
	fn default() -> Self {
		Self {
			default_fee_recipient: default_fee_recipient(),
			activity_limit: default_activity_limit(),
		}
	}
}

fn default_fee_recipient() -> String {
	DEFAULT_FEE_RECIPIENT.to_string()
}

fn default_activity_limit() -> usize {
	50
}

/// Block explorer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExplorerConfig {
	#[serde(default = "default_explorer_url")]
	pub base_url: String,
}

impl Default for ExplorerConfig {
	fn default() -> Self {
		Self {
			base_url: default_explorer_url(),
		}
	}
}

fn default_explorer_url() -> String {
	DEFAULT_EXPLORER_URL.to_string()
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

fn is_http_url(url: &str) -> bool {
	url.starts_with("http://") || url.starts_with("https://")
}

fn is_address(value: &str) -> bool {
	let hex = without_0x_prefix(value);
	value.len() == hex.len() + 2 && hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
	/// Loads configuration from a file, resolving environment variables and
	/// validating the result.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.as_ref().display(), e),
			))
		})?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - At least one RPC URL, each http(s)
	/// - A tipping implementation is named
	/// - Cache max age does not exceed 24 hours
	/// - Poll intervals and the failure cap are positive
	/// - Activity limit is between 1 and 1000
	/// - The default fee recipient is an address
	/// - The explorer URL is http(s)
	/// - The primary account implementation is configured
	pub fn validate(&self) -> Result<(), ConfigError> {
		// Validate ledger config
		if self.ledger.rpc_urls.is_empty() {
			return Err(ConfigError::Validation(
				"At least one RPC URL must be configured".into(),
			));
		}
		if let Some(url) = self.ledger.rpc_urls.iter().find(|url| !is_http_url(url)) {
			return Err(ConfigError::Validation(format!(
				"RPC URL '{}' must start with http:// or https://",
				url
			)));
		}
		if self.ledger.tipping.is_empty() {
			return Err(ConfigError::Validation(
				"Ledger tipping implementation cannot be empty".into(),
			));
		}
		if matches!(self.ledger.provider.as_deref(), Some("")) {
			return Err(ConfigError::Validation(
				"Ledger provider implementation cannot be empty when set".into(),
			));
		}
		if self.ledger.cache.max_age_ms > 86_400_000 {
			return Err(ConfigError::Validation(
				"Ledger cache max_age_ms cannot exceed 86400000 (24 hours)".into(),
			));
		}

		// Validate polling config
		let intervals = [
			("pending_interval_seconds", self.polling.pending_interval_seconds),
			(
				"confirmed_interval_seconds",
				self.polling.confirmed_interval_seconds,
			),
			("tips_refresh_seconds", self.polling.tips_refresh_seconds),
			("balance_refresh_seconds", self.polling.balance_refresh_seconds),
			("activity_refresh_seconds", self.polling.activity_refresh_seconds),
		];
		for (name, value) in intervals {
			if value == 0 {
				return Err(ConfigError::Validation(format!(
					"Polling {} must be greater than 0",
					name
				)));
			}
		}
		if self.polling.max_consecutive_failures == 0 {
			return Err(ConfigError::Validation(
				"Polling max_consecutive_failures must be greater than 0".into(),
			));
		}

		// Validate tipping config
		if self.tipping.activity_limit == 0 || self.tipping.activity_limit > 1000 {
			return Err(ConfigError::Validation(
				"Tipping activity_limit must be between 1 and 1000".into(),
			));
		}
		if !is_address(&self.tipping.default_fee_recipient) {
			return Err(ConfigError::Validation(format!(
				"Default fee recipient '{}' is not a valid address",
				self.tipping.default_fee_recipient
			)));
		}

		// Validate explorer config
		if !is_http_url(&self.explorer.base_url) {
			return Err(ConfigError::Validation(format!(
				"Explorer base_url '{}' must start with http:// or https://",
				self.explorer.base_url
			)));
		}

		// Validate account config
		if self.account.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"Account implementation cannot be empty".into(),
			));
		}
		if !self
			.account
			.implementations
			.contains_key(&self.account.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary account '{}' not found in implementations",
				self.account.primary
			)));
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
