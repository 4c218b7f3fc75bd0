//! Utility functions for display, logging and key conversion.
//!
//! This module provides helpers for formatting addresses, hashes and
//! timestamps for display, converting stored key material into the form the
//! ledger expects, and building block explorer links.

pub mod conversion;
pub mod explorer;
pub mod formatting;

pub use conversion::{private_key_to_hex, ConversionError};
pub use explorer::{Explorer, DEFAULT_EXPLORER_URL};
pub use formatting::{
	format_address, format_relative_time, truncate_id, with_0x_prefix, without_0x_prefix,
};
