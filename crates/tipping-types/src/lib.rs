//! Common types for the tipping engine.
//!
//! This crate defines the data types shared by every tipping component:
//! wei amounts and their display form, tip targets and requests, transaction
//! records, activity history entries, and a handful of string utilities used
//! for display and logging.

/// Activity history entries and derived totals.
pub mod activity;
/// Wei amounts and display conversion.
pub mod amount;
/// Content being tipped and fee recipient resolution.
pub mod content;
/// Registry trait for named implementations.
pub mod registry;
/// Secret string wrapper for private key material.
pub mod secret_string;
/// Transaction hashes, receipts, records and statuses.
pub mod transaction;
/// Formatting, conversion and explorer helpers.
pub mod utils;
/// Schema checks for implementation configuration tables.
pub mod validation;

pub use activity::*;
pub use amount::*;
pub use content::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use transaction::*;
pub use utils::{
	format_address, format_relative_time, private_key_to_hex, truncate_id, with_0x_prefix,
	without_0x_prefix, ConversionError, Explorer, DEFAULT_EXPLORER_URL,
};
pub use validation::{ConfigSchema, Field, FieldType, Schema, ValidationError};
