//! Core ledger primitives for minicoin.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Cryptographic primitives (hashing, signing, addresses)
//! - Fixed-precision amounts
//! - Transactions (transfers and block rewards)
//! - The unspent-output set and batch overlays
//! - Blocks, block headers and the merkle commitment

pub mod amount;
pub mod block;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod transaction;
pub mod utxo;

// Re-export commonly used types at the crate root
pub use amount::{Amount, UNITS_PER_COIN};
pub use block::{transactions_root, Block, BlockHeader};
pub use crypto::{verify, Address, CryptoError, Keypair, PublicKey, Signature};
pub use hash::{hash, hash_concat, hash_encoded, Hash, H256};
pub use merkle::{merkle_root, EMPTY_MERKLE_ROOT};
pub use transaction::{
    OutPoint, RewardTransaction, Transaction, TransferTransaction, TxOutput, Witness,
};
pub use utxo::{Lookup, Utxo, UtxoDelta, UtxoSet, UtxoView};
