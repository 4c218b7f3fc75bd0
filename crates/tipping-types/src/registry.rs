//! Registry trait for named implementations.
//!
//! Ledger clients, chain providers and account providers are selected by name
//! in the configuration. Each implementation module exposes a `Registry` type
//! tying that name to its factory function.

pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. `"mock"` for
	/// `ledger.tipping = "mock"` or `"local"` for `[account.implementations.local]`.
	const NAME: &'static str;

	/// Factory function type for this kind of implementation.
	type Factory;

	fn factory() -> Self::Factory;
}
