//! Ledger orchestration for minicoin.
//!
//! This crate brings together all components to run a single-node ledger:
//! - **Blockchain**: the chain, UTXO set and mempool behind one lock
//! - **Mempool**: pending transfers in submission order
//! - **Assembler**: selection of pending transfers into candidate blocks
//! - **Wallet**: coin selection, change and signing for one keypair
//!
//! # Example
//!
//! ```rust,no_run
//! use minicoin_chain::{Blockchain, BlockchainConfig, Wallet};
//! use minicoin_consensus::CancelToken;
//! use minicoin_core::Amount;
//! use std::sync::Arc;
//!
//! let blockchain = Arc::new(Blockchain::new(BlockchainConfig::default()));
//! let alice = Wallet::generate().unwrap();
//! let bob = Wallet::generate().unwrap();
//!
//! // Mine a block to give Alice her first coins
//! let cancel = CancelToken::new();
//! blockchain.mine_next_block(alice.address(), 2, &cancel).unwrap();
//!
//! // Pay Bob and mine the transfer
//! let tx = alice.create_transfer(&blockchain, bob.address(), Amount::from_coins(10)).unwrap();
//! blockchain.submit_transaction(tx.into()).unwrap();
//! blockchain.mine_next_block(bob.address(), 2, &cancel).unwrap();
//!
//! assert!(blockchain.is_chain_valid());
//! ```

pub mod assembler;
pub mod blockchain;
pub mod mempool;
pub mod wallet;

// Re-export commonly used types
pub use assembler::{BlockAssembler, BlockTemplate};
pub use blockchain::{
    Blockchain, BlockchainConfig, BlockchainError, BlockchainStats, ChainFault, FaultKind,
    MiningError,
};
pub use mempool::{Mempool, MempoolConfig, MempoolError};
pub use wallet::{Wallet, WalletError};
