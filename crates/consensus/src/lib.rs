//! Proof-of-work consensus for minicoin.
//!
//! This crate provides the rules a block must satisfy to join the chain:
//! - Proof-of-work search with cooperative cancellation
//! - Block reward and halving schedule
//! - Transaction validation (ownership signatures, double spends, value conservation)
//! - Block validation (linkage, work, merkle commitment, reward placement)
//!
//! # Example
//!
//! ```rust,no_run
//! use minicoin_consensus::{mine, BlockValidator, CancelToken, RewardSchedule};
//! use minicoin_core::{Block, Keypair, Transaction, UtxoSet};
//!
//! let schedule = RewardSchedule::default();
//! let genesis = Block::genesis();
//! let miner = Keypair::generate().unwrap();
//!
//! // Assemble and mine the first block
//! let reward = Transaction::reward(1, miner.address(), schedule.reward_at(1));
//! let candidate = Block::candidate(1, genesis.hash(), vec![reward], 2);
//! let block = mine(candidate, &CancelToken::new()).unwrap();
//!
//! // Validate it against the empty UTXO set
//! let delta = BlockValidator::validate_full(&block, &genesis, &UtxoSet::new(), &schedule).unwrap();
//! assert_eq!(delta.created.len(), 1);
//! ```

pub mod pow;
pub mod reward;
pub mod validator;

// Re-export commonly used types
pub use pow::{meets_difficulty, mine, CancelToken, MAX_DIFFICULTY};
pub use reward::RewardSchedule;
pub use validator::{BlockError, BlockValidator, TransactionValidator, ValidationError};
