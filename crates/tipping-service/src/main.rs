//! Command-line front end for the tipping engine.
//!
//! Loads a configuration file, builds the tipping context and runs one
//! command against it: reading a wallet's balance or activity, reading a
//! comment's tip totals, or sending a tip and following it until it is
//! confirmed.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tipping_config::Config;
use tipping_core::TippingContext;

mod commands;

/// Command-line arguments for the tipping client.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
	/// Show the native balance of a wallet
	Balance {
		/// Wallet address, defaults to the configured account
		#[arg(short, long)]
		address: Option<String>,
	},
	/// List recent tips sent and received by a wallet
	Activity {
		/// Wallet address, defaults to the configured account
		#[arg(short, long)]
		address: Option<String>,
	},
	/// Show how much a comment has been tipped
	Tips {
		/// Content identifier of the comment
		#[arg(long)]
		comment: String,
		/// Also show what this wallet tipped the comment
		#[arg(short, long)]
		sender: Option<String>,
	},
	/// Tip the author of a comment
	Send {
		/// Content identifier of the comment
		#[arg(long)]
		comment: String,
		/// Address of the comment author
		#[arg(long)]
		author: String,
		/// Amount in ETH, defaults to the minimum tip
		#[arg(long)]
		amount: Option<String>,
		/// Fee recipient set on the comment
		#[arg(long)]
		comment_fee_recipient: Option<String>,
		/// Fee recipient of the community
		#[arg(long)]
		community_fee_recipient: Option<String>,
		/// Wait for the tip to be confirmed
		#[arg(short, long)]
		watch: bool,
		/// Confirmations to wait for when watching
		#[arg(long, default_value_t = 1)]
		confirmations: u64,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		tipping = %config.ledger.tipping,
		rpc_urls = config.ledger.rpc_urls.len(),
		"Loaded configuration"
	);

	let context = TippingContext::from_config(config)?;
	commands::run(&context, args.command).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let args = Args::try_parse_from(["tipping", "balance"]).unwrap();
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
		assert_eq!(args.command, Command::Balance { address: None });
	}

	#[test]
	fn test_send_arguments() {
		let args = Args::try_parse_from([
			"tipping",
			"--config",
			"sepolia.toml",
			"send",
			"--comment",
			"QmComment",
			"--author",
			"0x2222222222222222222222222222222222222222",
			"--amount",
			"0.01",
			"--watch",
		])
		.unwrap();
		assert_eq!(args.config, PathBuf::from("sepolia.toml"));
		match args.command {
			Command::Send {
				comment,
				amount,
				watch,
				confirmations,
				comment_fee_recipient,
				..
			} => {
				assert_eq!(comment, "QmComment");
				assert_eq!(amount.as_deref(), Some("0.01"));
				assert!(watch);
				assert_eq!(confirmations, 1);
				assert!(comment_fee_recipient.is_none());
			},
			other => panic!("unexpected command {:?}", other),
		}
	}

	#[test]
	fn test_tips_requires_comment() {
		assert!(Args::try_parse_from(["tipping", "tips"]).is_err());
		let args =
			Args::try_parse_from(["tipping", "tips", "--comment", "QmComment", "-s", "0xabc"])
				.unwrap();
		assert_eq!(
			args.command,
			Command::Tips {
				comment: "QmComment".to_string(),
				sender: Some("0xabc".to_string()),
			}
		);
	}

	#[test]
	fn test_command_is_required() {
		assert!(Args::try_parse_from(["tipping"]).is_err());
	}
}
