//! Terminal rendering of blocks and transactions.

use chrono::DateTime;
use colored::Colorize;
use minicoin_core::{Address, Block, Transaction};

/// Render a unix timestamp as UTC wall-clock time.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// One-line description of a transaction, with `name` resolving addresses
/// to participant names where known.
pub fn describe_transaction(tx: &Transaction, name: impl Fn(&Address) -> String) -> String {
    match tx {
        Transaction::Reward(reward) => format!(
            "reward of {} to {}",
            reward.output.amount,
            name(&reward.output.recipient)
        ),
        Transaction::Transfer(transfer) => {
            let payees: Vec<String> = transfer
                .outputs
                .iter()
                .map(|output| format!("{} to {}", output.amount, name(&output.recipient)))
                .collect();
            format!(
                "{} input(s), pays {}",
                transfer.inputs.len(),
                payees.join(", ")
            )
        }
    }
}

pub fn print_block(block: &Block, name: impl Fn(&Address) -> String) {
    println!(
        "  {} {} {} {}",
        format!("#{}", block.height()).bright_black(),
        block.hash().short().bright_yellow(),
        format!("({} txs)", block.tx_count()).bright_black(),
        format_timestamp(block.header.timestamp).bright_black()
    );
    for tx in &block.transactions {
        println!(
            "      {} {}",
            tx.digest().short().bright_black(),
            describe_transaction(tx, &name)
        );
    }
}
