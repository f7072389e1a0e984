//! CLI commands module.

use anyhow::{ensure, Result};
use clap::{Args, Subcommand};
use minicoin_chain::BlockchainConfig;
use minicoin_consensus::{RewardSchedule, MAX_DIFFICULTY};
use minicoin_core::Amount;

mod demo;
mod display;
mod simulate;

#[derive(Subcommand)]
pub enum Commands {
    /// Scripted walkthrough with three wallets
    Demo(demo::DemoArgs),
    /// Live multi-threaded network simulation
    Simulate(simulate::SimulateArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Demo(args) => demo::run(args),
        Commands::Simulate(args) => simulate::run(args),
    }
}

/// Ledger parameters shared by every command.
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Leading zero hex digits required in block hashes
    #[arg(short, long, default_value_t = 2)]
    pub difficulty: u32,

    /// Reward of the first blocks, in whole coins
    #[arg(long, default_value_t = 50)]
    pub initial_reward: u64,

    /// Blocks between reward halvings (0 disables halving)
    #[arg(long, default_value_t = 210_000)]
    pub halving_interval: u64,

    /// Maximum transfers per block
    #[arg(long, default_value_t = 10)]
    pub max_block_transactions: usize,
}

impl LedgerArgs {
    /// Check the arguments and build the ledger configuration.
    pub fn config(&self) -> Result<BlockchainConfig> {
        ensure!(
            self.difficulty <= MAX_DIFFICULTY,
            "difficulty {} is above the maximum of {}",
            self.difficulty,
            MAX_DIFFICULTY
        );
        ensure!(
            self.initial_reward <= u64::MAX / minicoin_core::UNITS_PER_COIN,
            "initial reward of {} coins is too large",
            self.initial_reward
        );
        ensure!(
            self.max_block_transactions > 0,
            "blocks must hold at least one transfer"
        );

        Ok(BlockchainConfig {
            rewards: RewardSchedule::new(
                Amount::from_coins(self.initial_reward),
                self.halving_interval,
            ),
            max_block_transactions: self.max_block_transactions,
            ..BlockchainConfig::default()
        })
    }
}
