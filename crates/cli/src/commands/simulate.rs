//! Live network simulation.
//!
//! Worker threads mine, transfer and onboard users against one shared
//! ledger while a controller reads commands from stdin: `p` pauses or
//! resumes, `q` quits. Pausing cancels the block being mined so the miner
//! stops within one hash attempt.

use super::display::{describe_transaction, format_timestamp};
use super::LedgerArgs;
use anyhow::{anyhow, ensure, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use minicoin_chain::{Blockchain, Wallet};
use minicoin_consensus::CancelToken;
use minicoin_core::{Address, Amount, Transaction};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const FOUNDERS: [&str; 10] = [
    "Alice", "Bob", "Charlie", "Dave", "Eve", "Frank", "Grace", "Heidi", "Ivan", "Judy",
];

const NEWCOMERS: [&str; 14] = [
    "Michael", "Nina", "Oscar", "Patricia", "Quinn", "Robert", "Sarah", "Thomas", "Uma",
    "Vincent", "Wendy", "Xander", "Yvonne", "Zach",
];

/// Blocks mined unconditionally before miners start waiting for transfers.
const BOOTSTRAP_BLOCKS: u64 = 3;

/// Slowest pace accepted, keeping every scaled pause within `Duration`.
const MAX_PACE: f64 = 1_000.0;

#[derive(Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    /// Users present at start
    #[arg(short, long, default_value_t = 5)]
    users: usize,

    /// Maximum number of users, newcomers included
    #[arg(long, default_value_t = 15)]
    max_users: usize,

    /// Seconds between network status reports
    #[arg(long, default_value_t = 10)]
    report_interval: u64,

    /// Scale applied to every pause between actions (0.1 runs ten times faster)
    #[arg(long, default_value_t = 1.0)]
    pace: f64,

    /// Stop after this many seconds instead of waiting for `q`
    #[arg(long)]
    duration: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

impl SimulateArgs {
    fn check(&self) -> Result<()> {
        ensure!(
            self.pace.is_finite() && self.pace > 0.0 && self.pace <= MAX_PACE,
            "pace must be positive and at most {}",
            MAX_PACE
        );
        ensure!(self.users <= FOUNDERS.len(), "at most {} initial users", FOUNDERS.len());
        ensure!(self.users <= self.max_users, "initial users exceed --max-users");
        Ok(())
    }
}

pub fn run(args: SimulateArgs) -> Result<()> {
    args.check()?;

    let settings = Settings {
        difficulty: args.ledger.difficulty,
        max_users: args.max_users,
        pace: args.pace,
        report_interval: Duration::from_secs(args.report_interval.max(1)),
    };
    let simulation = Arc::new(Simulation::new(
        Blockchain::new(args.ledger.config()?),
        settings,
    ));
    for name in FOUNDERS.iter().take(args.users) {
        simulation.add_user(name)?;
    }

    println!("{}", "Starting simulation".bold().cyan());
    println!("  Type {} + Enter to pause or resume", "p".bold());
    println!("  Type {} + Enter to stop", "q".bold());
    println!();

    let workers = vec![
        spawn("miner", &simulation, Simulation::mining_loop)?,
        spawn("transfers", &simulation, Simulation::transaction_loop)?,
        spawn("onboarding", &simulation, Simulation::user_loop)?,
        spawn("reports", &simulation, Simulation::report_loop)?,
    ];
    // Blocked on stdin; never joined.
    spawn("controller", &simulation, Simulation::controller_loop)?;

    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    while simulation.control.is_running() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            simulation.control.stop();
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow!("simulation worker panicked"))?;
    }

    let report = simulation.final_report();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}

fn spawn(
    name: &str,
    simulation: &Arc<Simulation>,
    body: fn(&Simulation),
) -> Result<JoinHandle<()>> {
    let simulation = Arc::clone(simulation);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(&simulation))
        .with_context(|| format!("Failed to spawn {} thread", name))
}

/// Run state shared by every thread.
struct Control {
    running: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    /// Cancels the block being mined on pause and on stop.
    cancel: CancelToken,
}

impl Control {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            cancel: CancelToken::new(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn paused(&self) -> MutexGuard<'_, bool> {
        self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block the calling thread while paused.
    fn wait_while_paused(&self) {
        let mut paused = self.paused();
        while *paused && self.is_running() {
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Flip the pause state. Returns true if now paused.
    fn toggle_pause(&self) -> bool {
        let mut paused = self.paused();
        *paused = !*paused;
        if *paused {
            self.cancel.cancel();
        } else {
            self.cancel.reset();
            self.resumed.notify_all();
        }
        *paused
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        let _paused = self.paused();
        self.resumed.notify_all();
    }

    /// Sleep for `duration` in short slices, honouring pause and stop.
    fn idle(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            self.wait_while_paused();
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
    }
}

struct Settings {
    difficulty: u32,
    max_users: usize,
    pace: f64,
    report_interval: Duration,
}

/// A simulated participant.
struct User {
    name: String,
    wallet: Wallet,
    transactions_sent: AtomicU64,
    blocks_mined: AtomicU64,
    mined_units: AtomicU64,
}

impl User {
    fn new(name: &str, wallet: Wallet) -> Self {
        Self {
            name: name.to_string(),
            wallet,
            transactions_sent: AtomicU64::new(0),
            blocks_mined: AtomicU64::new(0),
            mined_units: AtomicU64::new(0),
        }
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }
}

struct MiningStats {
    block_times: Vec<Duration>,
    last_block: Instant,
}

struct Simulation {
    ledger: Blockchain,
    settings: Settings,
    control: Control,
    users: Mutex<Vec<Arc<User>>>,
    newcomers: AtomicUsize,
    stats: Mutex<MiningStats>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Simulation {
    fn new(ledger: Blockchain, settings: Settings) -> Self {
        Self {
            ledger,
            settings,
            control: Control::new(),
            users: Mutex::new(Vec::new()),
            newcomers: AtomicUsize::new(0),
            stats: Mutex::new(MiningStats {
                block_times: Vec::new(),
                last_block: Instant::now(),
            }),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    fn users(&self) -> MutexGuard<'_, Vec<Arc<User>>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_user(&self, name: &str) -> Result<Arc<User>> {
        let wallet = Wallet::generate().context("Failed to create wallet")?;
        let user = Arc::new(User::new(name, wallet));
        self.users().push(Arc::clone(&user));
        println!(
            "{} New user: {} ({})",
            "+".green().bold(),
            user.name.bold(),
            user.address().short().bright_black()
        );
        Ok(user)
    }

    fn random_user(&self) -> Option<Arc<User>> {
        self.users().choose(&mut rand::thread_rng()).cloned()
    }

    /// Two distinct users, if there are at least two.
    fn random_pair(&self) -> Option<(Arc<User>, Arc<User>)> {
        let users = self.users();
        let mut pair = users.choose_multiple(&mut rand::thread_rng(), 2);
        Some((Arc::clone(pair.next()?), Arc::clone(pair.next()?)))
    }

    fn name_of(&self, address: &Address) -> String {
        self.users()
            .iter()
            .find(|user| user.address() == *address)
            .map(|user| user.name.clone())
            .unwrap_or_else(|| address.short())
    }

    /// Random pause in `[low, high)` seconds, scaled by the pace setting.
    fn pause_between(&self, low: f64, high: f64) -> Duration {
        let secs = rand::thread_rng().gen_range(low..high);
        Duration::from_secs_f64(secs * self.settings.pace)
    }

    fn mining_loop(&self) {
        while self.control.is_running() {
            self.control.wait_while_paused();
            if let Some(miner) = self.random_user() {
                self.mine_as(&miner);
            }
            self.control.idle(self.pause_between(3.0, 8.0));
        }
    }

    fn mine_as(&self, miner: &User) {
        if self.ledger.mempool_len() == 0 && self.ledger.chain_height() >= BOOTSTRAP_BLOCKS {
            println!(
                "{} {} waits for transactions to mine",
                "…".bright_black(),
                miner.name
            );
            return;
        }

        println!(
            "{} {} starts mining block #{}",
            "⛏".yellow(),
            miner.name,
            self.ledger.chain_height() + 1
        );
        let started = Instant::now();
        let mined = self.ledger.mine_next_block(
            miner.address(),
            self.settings.difficulty,
            &self.control.cancel,
        );

        match mined {
            Ok(Some(block)) => {
                let reward = block.reward().map_or(Amount::ZERO, |r| r.output.amount);
                miner.blocks_mined.fetch_add(1, Ordering::Relaxed);
                miner.mined_units.fetch_add(reward.units(), Ordering::Relaxed);
                self.record_block();
                println!(
                    "{} {} mined block #{} in {:.2}s and earned {}",
                    "✓".green().bold(),
                    miner.name,
                    block.height(),
                    started.elapsed().as_secs_f64(),
                    reward
                );
            }
            Ok(None) => debug!("{} stopped mining", miner.name),
            Err(err) => {
                warn!("Block from {} rejected: {}", miner.name, err);
                println!("{} {}'s block was rejected: {}", "✗".red(), miner.name, err);
            }
        }
    }

    fn record_block(&self) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now - stats.last_block;
        stats.block_times.push(elapsed);
        stats.last_block = now;
    }

    fn transaction_loop(&self) {
        while self.control.is_running() {
            self.control.wait_while_paused();
            if let Some((sender, receiver)) = self.random_pair() {
                self.send_random(&sender, &receiver);
            }
            self.control.idle(self.pause_between(1.0, 5.0));
        }
    }

    /// Send between 1% and 20% of the sender's spendable balance.
    fn send_random(&self, sender: &User, receiver: &User) {
        let spendable = sender.wallet.spendable(&self.ledger);
        if spendable.is_zero() {
            return;
        }
        let share = rand::thread_rng().gen_range(0.01..=0.2);
        let amount = Amount::from_units(((spendable.units() as f64 * share) as u64).max(1));

        let submitted = sender
            .wallet
            .create_transfer(&self.ledger, receiver.address(), amount)
            .map_err(anyhow::Error::from)
            .and_then(|tx| {
                self.ledger
                    .submit_transaction(tx.into())
                    .map_err(anyhow::Error::from)
            });

        match submitted {
            Ok(_) => {
                sender.transactions_sent.fetch_add(1, Ordering::Relaxed);
                println!(
                    "{} {} sent {} to {}",
                    "→".cyan(),
                    sender.name,
                    amount,
                    receiver.name
                );
            }
            Err(err) => println!(
                "{} Transfer from {} failed: {}",
                "✗".red(),
                sender.name,
                err
            ),
        }
    }

    fn user_loop(&self) {
        while self.control.is_running() {
            self.control.wait_while_paused();
            let room = self.users().len() < self.settings.max_users;
            if room && rand::thread_rng().gen_bool(0.2) {
                let name = self.next_newcomer();
                if let Err(err) = self.add_user(&name) {
                    warn!("Could not add {}: {:#}", name, err);
                }
            }
            self.control.idle(self.pause_between(15.0, 30.0));
        }
    }

    fn next_newcomer(&self) -> String {
        let index = self.newcomers.fetch_add(1, Ordering::Relaxed);
        NEWCOMERS
            .get(index)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("User{}", rand::thread_rng().gen_range(1000..=9999)))
    }

    fn report_loop(&self) {
        loop {
            self.control.idle(self.settings.report_interval);
            if !self.control.is_running() {
                break;
            }
            self.print_network_status();
        }
    }

    fn controller_loop(&self) {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "p" => {
                    if self.control.toggle_pause() {
                        println!("{}", "Simulation paused (p to resume)".yellow());
                    } else {
                        println!("{}", "Simulation resumed".green());
                    }
                }
                "q" => {
                    println!("{}", "Stopping simulation...".bold());
                    self.control.stop();
                    break;
                }
                "" => {}
                other => println!("Unknown command '{}' (p: pause/resume, q: quit)", other),
            }
        }
    }

    fn print_network_status(&self) {
        let stats = self.ledger.stats();
        let rule = "=".repeat(80);

        println!();
        println!("{}", rule);
        println!(
            "{}",
            format!(
                "NETWORK STATUS (height: {}, mempool: {}, utxos: {})",
                stats.height, stats.pending_transactions, stats.utxo_count
            )
            .bold()
        );
        println!("{}", rule);

        println!();
        println!("{}", "Recent blocks:".bold().cyan());
        for height in stats.height.saturating_sub(2)..=stats.height {
            if let Some(block) = self.ledger.block_at(height) {
                println!(
                    "  {} {} {} {}",
                    format!("#{}", height).bright_black(),
                    block.hash().short().bright_yellow(),
                    format!("({} txs)", block.tx_count()).bright_black(),
                    format_timestamp(block.header.timestamp).bright_black()
                );
            }
        }

        let pending = self.ledger.pending_transactions();
        println!();
        println!(
            "{}",
            format!("Mempool ({} transactions):", pending.len())
                .bold()
                .cyan()
        );
        for tx in pending.iter().take(5) {
            let tx = Transaction::Transfer(tx.clone());
            println!(
                "  {} {}",
                tx.digest().short().bright_black(),
                describe_transaction(&tx, |a| self.name_of(a))
            );
        }
        if pending.len() > 5 {
            println!("  ... and {} more", pending.len() - 5);
        }

        println!();
        println!("{}", "Users:".bold().cyan());
        for user in self.ranked_users() {
            println!(
                "  {:<10} {} | mined {} blocks ({}) | sent {} transactions",
                user.name,
                user.balance,
                user.blocks_mined,
                user.mined,
                user.transactions_sent
            );
        }

        if !self.ledger.is_chain_valid() {
            println!();
            println!("{}", "ALERT: the chain failed its integrity check".red().bold());
        }
        println!("{}", rule);
        println!();
    }

    /// Users by descending balance.
    fn ranked_users(&self) -> Vec<UserReport> {
        let users: Vec<Arc<User>> = self.users().clone();
        let mut ranked: Vec<(Amount, Arc<User>)> = users
            .into_iter()
            .map(|user| (user.wallet.balance(&self.ledger), user))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        ranked
            .into_iter()
            .enumerate()
            .map(|(i, (balance, user))| UserReport {
                rank: i + 1,
                name: user.name.clone(),
                address: user.address().to_hex(),
                balance: balance.to_string(),
                blocks_mined: user.blocks_mined.load(Ordering::Relaxed),
                mined: Amount::from_units(user.mined_units.load(Ordering::Relaxed)).to_string(),
                transactions_sent: user.transactions_sent.load(Ordering::Relaxed),
            })
            .collect()
    }

    fn final_report(&self) -> FinalReport {
        let blocks = self.ledger.blocks();
        let block_times = {
            let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.block_times.clone()
        };
        let average_block_time_secs = if block_times.is_empty() {
            0.0
        } else {
            block_times.iter().map(Duration::as_secs_f64).sum::<f64>() / block_times.len() as f64
        };

        FinalReport {
            started_at: self.started_at.to_rfc3339(),
            duration_secs: self.started.elapsed().as_secs_f64(),
            blocks_mined: blocks.len().saturating_sub(1),
            transactions: blocks.iter().map(|b| b.tx_count()).sum(),
            average_block_time_secs,
            chain_valid: self.ledger.is_chain_valid(),
            total_supply: self.ledger.total_supply().to_string(),
            users: self.ranked_users(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UserReport {
    rank: usize,
    name: String,
    address: String,
    balance: String,
    blocks_mined: u64,
    mined: String,
    transactions_sent: u64,
}

#[derive(Debug, Serialize)]
struct FinalReport {
    started_at: String,
    duration_secs: f64,
    blocks_mined: usize,
    transactions: usize,
    average_block_time_secs: f64,
    chain_valid: bool,
    total_supply: String,
    users: Vec<UserReport>,
}

impl FinalReport {
    fn print(&self) {
        let rule = "=".repeat(80);
        println!();
        println!("{}", rule);
        println!("{}", "FINAL SIMULATION REPORT".bold());
        println!("{}", rule);
        println!();
        println!("  Started:            {}", self.started_at);
        println!("  Duration:           {:.0}s", self.duration_secs);
        println!("  Blocks mined:       {}", self.blocks_mined);
        println!("  Transactions:       {}", self.transactions);
        println!("  Average block time: {:.2}s", self.average_block_time_secs);
        println!("  Total supply:       {}", self.total_supply);
        println!(
            "  Chain valid:        {}",
            if self.chain_valid { "yes".green() } else { "no".red() }
        );
        println!();
        println!("{}", "Ranking:".bold().cyan());
        for user in &self.users {
            println!(
                "  {}. {}: {} | {} blocks mined | {} transactions",
                user.rank, user.name, user.balance, user.blocks_mined, user.transactions_sent
            );
        }
        println!();
        println!("{}", rule);
    }
}
