//! Block and block header structures.

use crate::hash::{hash_encoded, Hash};
use crate::merkle::merkle_root;
use crate::transaction::{RewardTransaction, Transaction, TransferTransaction};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The header of a block. Its hash is the block's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height (0 for genesis).
    pub height: u64,
    /// Hash of the previous block.
    pub previous_hash: Hash,
    /// Merkle root of transaction digests.
    pub merkle_root: Hash,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Required number of leading zero hex digits in the block hash.
    pub difficulty: u32,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Calculate the hash of this block header.
    pub fn hash(&self) -> Hash {
        hash_encoded(self)
    }

    /// Get the current Unix timestamp.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A block: header, ordered transactions, and the header hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Hash of `header` as of the last [`Block::seal`].
    pub hash: Hash,
}

/// Merkle root over the digests of `transactions`.
pub fn transactions_root(transactions: &[Transaction]) -> Hash {
    let digests: Vec<Hash> = transactions.iter().map(Transaction::digest).collect();
    merkle_root(&digests)
}

impl Block {
    /// Create an unmined block with nonce zero.
    ///
    /// The merkle root is computed here, once; mining only varies the nonce.
    pub fn candidate(
        height: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Self {
        let header = BlockHeader {
            height,
            previous_hash,
            merkle_root: transactions_root(&transactions),
            timestamp: BlockHeader::current_timestamp(),
            difficulty,
            nonce: 0,
        };
        let hash = header.hash();
        Self {
            header,
            transactions,
            hash,
        }
    }

    /// Create the genesis block: no transactions, no work required.
    pub fn genesis() -> Self {
        Self::candidate(0, Hash::ZERO, Vec::new(), 0)
    }

    /// Recompute the stored hash after the header changed.
    pub fn seal(&mut self) {
        self.hash = self.header.hash();
    }

    /// Get the block hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Get the block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.height == 0 && self.header.previous_hash == Hash::ZERO
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the stored hash matches the header.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.header.hash()
    }

    /// Verify the merkle root matches the transactions.
    pub fn verify_merkle_root(&self) -> bool {
        transactions_root(&self.transactions) == self.header.merkle_root
    }

    /// The reward transaction, which closes every mined block.
    pub fn reward(&self) -> Option<&RewardTransaction> {
        match self.transactions.last() {
            Some(Transaction::Reward(reward)) => Some(reward),
            _ => None,
        }
    }

    /// Transfers included in this block, in order.
    pub fn transfers(&self) -> impl Iterator<Item = &TransferTransaction> {
        self.transactions.iter().filter_map(Transaction::as_transfer)
    }
}
