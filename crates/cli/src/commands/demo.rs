//! Scripted walkthrough: three wallets, two transfers, a few mined blocks.

use super::display::print_block;
use super::LedgerArgs;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use minicoin_chain::{Blockchain, Wallet};
use minicoin_consensus::CancelToken;
use minicoin_core::{Address, Amount, UNITS_PER_COIN};

#[derive(Args)]
pub struct DemoArgs {
    #[command(flatten)]
    ledger: LedgerArgs,
}

pub fn run(args: DemoArgs) -> Result<()> {
    let difficulty = args.ledger.difficulty;
    let blockchain = Blockchain::new(args.ledger.config()?);
    let cancel = CancelToken::new();

    let participants = [
        ("Alice", Wallet::generate().context("Failed to create wallet")?),
        ("Bob", Wallet::generate().context("Failed to create wallet")?),
        ("Charlie", Wallet::generate().context("Failed to create wallet")?),
    ];
    let name = |address: &Address| {
        participants
            .iter()
            .find(|(_, wallet)| wallet.address() == *address)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| address.short())
    };
    let [(_, alice), (_, bob), (_, charlie)] = &participants;

    println!();
    println!("{}", "Wallets:".bold().cyan());
    for (label, wallet) in &participants {
        println!("  {:<8} {}", label, wallet.address().to_hex().bright_yellow());
    }

    println!();
    println!("{}", "Alice and Bob mine a block each...".bold());
    for wallet in [alice, bob] {
        let block = blockchain
            .mine_next_block(wallet.address(), difficulty, &cancel)?
            .context("Mining was cancelled")?;
        println!(
            "  {}  Block #{} mined by {}",
            "✓".green().bold(),
            block.height(),
            name(&wallet.address())
        );
    }

    println!();
    println!("{}", "Transfers:".bold());
    let transfers = [
        (alice, bob, Amount::from_coins(1)),
        (bob, alice, Amount::from_units(UNITS_PER_COIN / 2)),
    ];
    for (from, to, amount) in transfers {
        let tx = from
            .create_transfer(&blockchain, to.address(), amount)
            .context("Failed to build transfer")?;
        let digest = blockchain
            .submit_transaction(tx.into())
            .context("Transfer rejected")?;
        println!(
            "  {} {} sends {} to {}",
            digest.short().bright_black(),
            name(&from.address()),
            amount,
            name(&to.address())
        );
    }

    println!();
    println!("{}", "Charlie mines a block...".bold());
    let block = blockchain
        .mine_next_block(charlie.address(), difficulty, &cancel)?
        .context("Mining was cancelled")?;
    println!(
        "  {}  Block #{} holds {} transactions",
        "✓".green().bold(),
        block.height(),
        block.tx_count()
    );

    println!();
    println!("{}", "Blocks:".bold().cyan());
    for block in blockchain.blocks() {
        print_block(&block, &name);
    }

    println!();
    println!("{}", "Balances:".bold().cyan());
    for (label, wallet) in &participants {
        println!("  {:<8} {}", label, wallet.balance(&blockchain));
    }

    let valid = blockchain.is_chain_valid();
    println!();
    println!(
        "  Chain valid: {}",
        if valid { "yes".green() } else { "no".red() }
    );
    println!("  Total supply: {}", blockchain.total_supply());
    println!();

    Ok(())
}
