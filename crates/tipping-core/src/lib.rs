//! Tip lifecycle and polling engine.
//!
//! This crate ties the ledger client, the account provider and the
//! configuration together. It provides the lazily built ledger handle, the
//! cancellable poller, the tip submission state machine and the aggregate
//! readers for tip totals, wallet balance and activity history. State is
//! published through watch channels so any presentation layer can bind to it.

pub mod client;
pub mod context;
pub mod poller;
pub mod readers;
pub mod tip;

pub use client::LedgerHandle;
pub use context::{ContextError, TippingContext};
pub use poller::{schedule, PollHandle, PollSchedule};
pub use readers::{
	ActivityReader, ActivitySource, AggregateReader, BalanceReader, BalanceSource,
	CommentTipsReader, CommentTipsSource, ReadSource, ReaderSnapshot, SenderTipsReader,
	SenderTipsSource,
};
pub use tip::{TipError, TipSender, TipSnapshot};
