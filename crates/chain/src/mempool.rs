//! Transaction mempool for pending transfers.
//!
//! The mempool stores transfers that were valid against the UTXO set when
//! they were submitted, in submission order, until a block includes them or
//! a committed block makes them unspendable.

use minicoin_core::{Hash, OutPoint, TransferTransaction, UtxoSet};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Errors that can occur during mempool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("transaction already in mempool")]
    DuplicateTransaction,

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// Transaction mempool.
#[derive(Debug)]
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Transfers indexed by digest.
    transactions: HashMap<Hash, TransferTransaction>,
    /// Digests in submission order.
    order: VecDeque<Hash>,
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            transactions: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Get the number of transactions in the mempool.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Check if a transaction is in the mempool.
    pub fn contains(&self, digest: &Hash) -> bool {
        self.transactions.contains_key(digest)
    }

    /// Add a transfer to the mempool. Returns its digest.
    pub fn add(&mut self, tx: TransferTransaction) -> Result<Hash> {
        let digest = tx.digest();

        if self.contains(&digest) {
            return Err(MempoolError::DuplicateTransaction);
        }

        if self.transactions.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }

        self.order.push_back(digest);
        self.transactions.insert(digest, tx);

        Ok(digest)
    }

    /// Remove multiple transactions from the mempool. Unknown digests are
    /// ignored.
    pub fn remove_batch(&mut self, digests: &[Hash]) {
        let mut removed = false;
        for digest in digests {
            removed |= self.transactions.remove(digest).is_some();
        }
        if removed {
            let transactions = &self.transactions;
            self.order.retain(|d| transactions.contains_key(d));
        }
    }

    /// Drop every transfer referencing an output no longer in `utxos`.
    ///
    /// Returns the digests evicted.
    pub fn retain_spendable(&mut self, utxos: &UtxoSet) -> Vec<Hash> {
        let evicted: Vec<Hash> = self
            .iter()
            .filter(|(_, tx)| !tx.inputs.iter().all(|input| utxos.contains(input)))
            .map(|(digest, _)| *digest)
            .collect();
        self.remove_batch(&evicted);
        evicted
    }

    /// Iterate over pending transfers in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &TransferTransaction)> {
        self.order
            .iter()
            .filter_map(|digest| self.transactions.get_key_value(digest))
    }

    /// Pending transfers in submission order.
    pub fn pending(&self) -> Vec<TransferTransaction> {
        self.iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Out-points spent by some pending transfer.
    pub fn reserved_outpoints(&self) -> HashSet<OutPoint> {
        self.transactions
            .values()
            .flat_map(|tx| tx.inputs.iter().copied())
            .collect()
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minicoin_core::{Address, Amount, Keypair, Transaction, TxOutput};

    fn outpoint(byte: u8) -> OutPoint {
        OutPoint::new(Hash::from_bytes([byte; 32]), 0)
    }

    fn transfer(input: OutPoint, coins: u64) -> TransferTransaction {
        let keypair = Keypair::generate().unwrap();
        TransferTransaction::new(
            vec![input],
            vec![TxOutput::new(
                Amount::from_coins(coins),
                Address::from_bytes([2u8; 20]),
            )],
        )
        .signed(&keypair)
    }

    #[test]
    fn test_mempool_add() {
        let mut mempool = Mempool::new();
        let tx = transfer(outpoint(1), 10);

        let digest = mempool.add(tx.clone()).unwrap();
        assert_eq!(digest, tx.digest());
        assert_eq!(mempool.len(), 1);
        assert!(mempool.contains(&digest));
        assert_eq!(mempool.pending(), vec![tx]);
    }

    #[test]
    fn test_mempool_duplicate_rejected() {
        let mut mempool = Mempool::new();
        let tx = transfer(outpoint(1), 10);

        assert!(mempool.add(tx.clone()).is_ok());
        assert!(matches!(
            mempool.add(tx),
            Err(MempoolError::DuplicateTransaction)
        ));
    }

    #[test]
    fn test_mempool_keeps_submission_order() {
        let mut mempool = Mempool::new();
        let txs: Vec<_> = (1..=5).map(|i| transfer(outpoint(i), i as u64)).collect();
        for tx in &txs {
            mempool.add(tx.clone()).unwrap();
        }

        mempool.remove_batch(&[txs[1].digest(), txs[3].digest()]);
        assert_eq!(mempool.pending(), vec![txs[0].clone(), txs[2].clone(), txs[4].clone()]);
    }

    #[test]
    fn test_mempool_conflicting_entries_allowed() {
        let mut mempool = Mempool::new();
        mempool.add(transfer(outpoint(1), 10)).unwrap();
        mempool.add(transfer(outpoint(1), 20)).unwrap();

        assert_eq!(mempool.len(), 2);
        assert_eq!(mempool.reserved_outpoints().len(), 1);
    }

    #[test]
    fn test_retain_spendable() {
        let owner = Address::from_bytes([1u8; 20]);
        let reward = Transaction::reward(1, owner, Amount::from_coins(50));
        let mut utxos = UtxoSet::new();
        utxos.apply_transaction(&reward);
        let live = OutPoint::new(reward.digest(), 0);

        let mut mempool = Mempool::new();
        let keep = transfer(live, 50);
        let stale = transfer(outpoint(9), 50);
        mempool.add(keep.clone()).unwrap();
        mempool.add(stale.clone()).unwrap();

        let evicted = mempool.retain_spendable(&utxos);
        assert_eq!(evicted, vec![stale.digest()]);
        assert_eq!(mempool.pending(), vec![keep]);
    }

    #[test]
    fn test_mempool_capacity_limit() {
        let config = MempoolConfig {
            max_transactions: 2,
        };
        let mut mempool = Mempool::with_config(config);

        assert!(mempool.add(transfer(outpoint(1), 1)).is_ok());
        assert!(mempool.add(transfer(outpoint(2), 1)).is_ok());
        assert!(matches!(
            mempool.add(transfer(outpoint(3), 1)),
            Err(MempoolError::MempoolFull(2))
        ));
    }
}
