//! Command handlers.

use crate::Command;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tipping_core::{ReaderSnapshot, TipError, TipSender, TippingContext};
use tipping_types::{
	format_address, format_relative_time, ActivityEntry, Explorer, TipStatus, TipTarget,
};
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum CommandError {
	#[error("No wallet address given and no account configured")]
	NoWallet,
	#[error("Failed to read {0}: {1}")]
	Read(&'static str, String),
	#[error(transparent)]
	Tip(#[from] TipError),
	#[error("Tip failed: {0}")]
	Failed(String),
	#[error("Tip {0} was included but reverted")]
	Reverted(String),
	#[error("Stopped polling the {0} tip after repeated ledger failures")]
	PollingStopped(TipStatus),
}

pub async fn run(context: &TippingContext, command: Command) -> Result<(), CommandError> {
	match command {
		Command::Balance { address } => {
			let address = resolve_address(context, address).await?;
			let balance = context.balance_reader();
			balance.set_key(address.clone()).await;
			let snapshot = checked(balance.snapshot(), "balance")?;
			println!("{}: {} ETH", address, snapshot.display());
			println!("{}", context.explorer().address_url(&address));
		},
		Command::Activity { address } => {
			let address = resolve_address(context, address).await?;
			let activity = context.activity_reader();
			activity.set_key(address).await;
			let snapshot = checked(activity.snapshot(), "activity")?;
			let now = Utc::now();
			for entry in &snapshot.value {
				println!("{}", activity_line(entry, now));
			}
			let totals = snapshot.totals();
			println!(
				"sent {} tips ({} ETH), received {} tips ({} ETH)",
				totals.sent_count,
				totals.total_sent.to_display_string(),
				totals.received_count,
				totals.total_received.to_display_string()
			);
		},
		Command::Tips { comment, sender } => {
			let target = TipTarget::new(comment);
			let totals = context.comment_tips_reader();
			totals.set_key(context.comment_query(&target)).await;
			let snapshot = checked(totals.snapshot(), "comment tips")?;
			println!("total: {} ETH", snapshot.display());

			if let Some(sender) = sender {
				let mine = context.sender_tips_reader();
				mine.set_key(context.sender_query(&target, &sender)).await;
				let snapshot = checked(mine.snapshot(), "sender tips")?;
				println!("from {}: {} ETH", format_address(&sender), snapshot.display());
			}
		},
		Command::Send {
			comment,
			author,
			amount,
			comment_fee_recipient,
			community_fee_recipient,
			watch,
			confirmations,
		} => {
			let mut target = TipTarget::new(comment).with_author_address(author);
			if let Some(address) = comment_fee_recipient {
				target = target.with_comment_fee_recipient(address);
			}
			if let Some(address) = community_fee_recipient {
				target = target.with_community_fee_recipient(address);
			}

			let sender = context.tip_sender(target);
			let hash = sender.submit(amount.as_deref()).await?;
			let tipped = sender
				.snapshot()
				.current_tip_amount
				.map(|a| a.to_display_string())
				.unwrap_or_else(|| "?".to_string());
			println!(
				"sent {} ETH: {}",
				tipped,
				context.explorer().transaction_url(hash.as_str())
			);

			if watch {
				watch_tip(&sender, context.explorer(), confirmations.max(1)).await?;
			}
		},
	}
	Ok(())
}

async fn resolve_address(
	context: &TippingContext,
	address: Option<String>,
) -> Result<String, CommandError> {
	match address {
		Some(address) => Ok(address),
		None => context.wallet_address().await.ok_or(CommandError::NoWallet),
	}
}

fn checked<V>(
	snapshot: ReaderSnapshot<V>,
	what: &'static str,
) -> Result<ReaderSnapshot<V>, CommandError> {
	match snapshot.error {
		Some(error) => Err(CommandError::Read(what, error)),
		None => Ok(snapshot),
	}
}

fn activity_line(entry: &ActivityEntry, now: DateTime<Utc>) -> String {
	let when = i64::try_from(entry.timestamp())
		.ok()
		.and_then(|secs| DateTime::from_timestamp(secs, 0))
		.map(|t| format_relative_time(t, now))
		.unwrap_or_else(|| "-".to_string());
	let (direction, preposition) = match entry {
		ActivityEntry::Sent { .. } => ("sent", "to"),
		ActivityEntry::Received { .. } => ("received", "from"),
	};
	format!(
		"{}: {} {} ETH {} {}",
		when,
		direction,
		entry.amount().to_display_string(),
		preposition,
		format_address(entry.counterparty())
	)
}

/// Follows the tip until it has `confirmations` confirmations, fails, or
/// the user interrupts.
async fn watch_tip(
	sender: &TipSender,
	explorer: &Explorer,
	confirmations: u64,
) -> Result<(), CommandError> {
	let mut updates = sender.subscribe();
	let interrupt = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::warn!(error = %e, "Cannot listen for interrupts");
			std::future::pending::<()>().await;
		}
	};
	match follow(&mut updates, explorer, confirmations, interrupt).await {
		Ok(true) => {
			sender.cancel();
			println!("stopped watching");
			Ok(())
		},
		Ok(false) => Ok(()),
		Err(e) => {
			sender.cancel();
			Err(e)
		},
	}
}

/// Returns `Ok(true)` when `interrupt` resolved first.
async fn follow<F>(
	updates: &mut watch::Receiver<tipping_core::TipSnapshot>,
	explorer: &Explorer,
	confirmations: u64,
	interrupt: F,
) -> Result<bool, CommandError>
where
	F: std::future::Future<Output = ()>,
{
	tokio::pin!(interrupt);
	let mut last_status = None;
	let mut last_confirmations = 0;

	loop {
		{
			let snapshot = updates.borrow_and_update();
			if last_status != Some(snapshot.status) {
				last_status = Some(snapshot.status);
				println!("status: {}", snapshot.status);
			}
			match snapshot.status {
				TipStatus::Failed => {
					return Err(CommandError::Failed(
						snapshot.error.clone().unwrap_or_else(|| "unknown error".to_string()),
					));
				},
				TipStatus::Confirmed => {
					if snapshot.confirmations != last_confirmations {
						last_confirmations = snapshot.confirmations;
						println!("confirmations: {}", last_confirmations);
					}
					let tx = snapshot.transaction.as_ref();
					if tx.and_then(|tx| tx.succeeded) == Some(false) {
						let hash = snapshot
							.transaction_hash()
							.map(|h| h.to_string())
							.unwrap_or_default();
						return Err(CommandError::Reverted(hash));
					}
					if snapshot.confirmations >= confirmations {
						if let Some(block) = tx.and_then(|tx| tx.block_number) {
							println!("included in block {}", block);
						}
						if let Some(hash) = snapshot.transaction_hash() {
							println!("{}", explorer.transaction_url(hash.as_str()));
						}
						return Ok(false);
					}
				},
				_ => {},
			}
			if snapshot.polling_stopped {
				return Err(CommandError::PollingStopped(snapshot.status));
			}
		}

		tokio::select! {
			changed = updates.changed() => {
				if changed.is_err() {
					return Err(CommandError::Failed("tip sender closed".to_string()));
				}
			}
			_ = &mut interrupt => return Ok(true),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::future::pending;
	use std::io::Write;
	use tipping_config::Config;
	use tipping_types::{Amount, TransactionHash};

	const CONFIG: &str = r#"
[ledger]
rpc_urls = ["http://localhost:8545"]
tipping = "mock"
[ledger.implementations.mock]
start_block = 10
default_balance_wei = "5000000000000000000"

[explorer]
base_url = "https://explorer.example"

[account]
primary = "local"
[account.implementations.local]
address = "0x1234567890123456789012345678901234567890"
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
"#;

	const AUTHOR: &str = "0x2222222222222222222222222222222222222222";

	async fn context() -> TippingContext {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(CONFIG.as_bytes()).unwrap();
		let config = Config::from_file(file.path()).await.unwrap();
		TippingContext::from_config(config).unwrap()
	}

	fn send(amount: Option<&str>, watch: bool) -> Command {
		Command::Send {
			comment: "QmComment".to_string(),
			author: AUTHOR.to_string(),
			amount: amount.map(str::to_string),
			comment_fee_recipient: None,
			community_fee_recipient: None,
			watch,
			confirmations: 1,
		}
	}

	#[tokio::test]
	async fn test_read_commands() {
		let ctx = context().await;
		run(&ctx, Command::Balance { address: None }).await.unwrap();
		run(&ctx, Command::Activity { address: None }).await.unwrap();
		run(
			&ctx,
			Command::Tips {
				comment: "QmComment".to_string(),
				sender: Some("0x1234567890123456789012345678901234567890".to_string()),
			},
		)
		.await
		.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_send_and_watch() {
		let ctx = context().await;
		run(&ctx, send(Some("0.25"), true)).await.unwrap();

		let activity = ctx.activity_reader();
		activity.set_key(ctx.wallet_address().await.unwrap()).await;
		assert_eq!(activity.snapshot().totals().sent_count, 1);
	}

	#[tokio::test]
	async fn test_send_validation_error() {
		let ctx = context().await;
		let err = run(&ctx, send(Some("abc"), false)).await.unwrap_err();
		assert!(matches!(err, CommandError::Tip(TipError::Validation(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn test_follow_stops_on_interrupt() {
		let ctx = context().await;
		let sender = ctx.tip_sender(TipTarget::new("QmComment").with_author_address(AUTHOR));
		let mut updates = sender.subscribe();
		let interrupted = follow(&mut updates, ctx.explorer(), 1, async {}).await.unwrap();
		assert!(interrupted);
	}

	#[tokio::test(start_paused = true)]
	async fn test_follow_waits_for_confirmations() {
		let ctx = context().await;
		let sender = ctx.tip_sender(TipTarget::new("QmComment").with_author_address(AUTHOR));
		sender.submit(None).await.unwrap();

		let mut updates = sender.subscribe();
		let interrupted = follow(&mut updates, ctx.explorer(), 2, pending()).await.unwrap();
		assert!(!interrupted);
		assert!(sender.snapshot().confirmations >= 2);
	}

	fn pending_tip() -> tipping_core::TipSnapshot {
		tipping_core::TipSnapshot {
			status: TipStatus::Pending,
			..Default::default()
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_follow_fails_once_polling_stopped() {
		let ctx = context().await;
		let (state, mut updates) = watch::channel(pending_tip());

		let stop = async {
			tokio::time::sleep(std::time::Duration::from_secs(600)).await;
			state.send_modify(|s| s.polling_stopped = true);
			pending::<()>().await
		};
		let err = tokio::select! {
			result = follow(&mut updates, ctx.explorer(), 1, pending()) => result.unwrap_err(),
			_ = stop => unreachable!(),
		};
		assert!(matches!(err, CommandError::PollingStopped(TipStatus::Pending)));
	}

	#[tokio::test]
	async fn test_follow_fails_on_already_stopped_polling() {
		let ctx = context().await;
		let (_state, mut updates) = watch::channel(tipping_core::TipSnapshot {
			polling_stopped: true,
			..pending_tip()
		});
		let err = follow(&mut updates, ctx.explorer(), 1, pending()).await.unwrap_err();
		assert_eq!(
			err.to_string(),
			"Stopped polling the pending tip after repeated ledger failures"
		);
	}

	#[test]
	fn test_activity_line() {
		let entry = ActivityEntry::Received {
			amount: Amount::from_wei(1_230_000_000_000_000),
			sender: AUTHOR.to_string(),
			transaction_hash: TransactionHash::new("0xabc"),
			timestamp: 1_700_000_000,
		};
		let sent_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

		let line = activity_line(&entry, sent_at + chrono::Duration::minutes(30));
		assert!(line.starts_with("30 minutes ago: received 0.00123 ETH from "));
		assert!(line.ends_with(&format_address(AUTHOR)));

		let line = activity_line(&entry, sent_at + chrono::Duration::days(3));
		assert!(line.starts_with("2023-11-14 22:13:20 UTC: received"));
	}
}
