//! The unspent-output set.
//!
//! [`UtxoSet`] holds exactly the outputs spendable at the chain tip.
//! [`UtxoView`] layers the effects of a batch of not-yet-committed
//! transactions over a set without touching it; the accumulated changes come
//! out as a [`UtxoDelta`] that the owner of the set applies on commit.

use crate::amount::Amount;
use crate::crypto::Address;
use crate::transaction::{OutPoint, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A spendable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub owner: Address,
}

/// Changes produced by applying a batch of transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoDelta {
    /// Out-points removed from the base set.
    pub spent: Vec<OutPoint>,
    /// Outputs added to the base set.
    pub created: Vec<Utxo>,
}

/// Mapping from out-point to unspent output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, Utxo>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.entries.values()
    }

    /// Sum of the outputs owned by `owner`.
    pub fn balance(&self, owner: &Address) -> Amount {
        self.entries
            .values()
            .filter(|u| u.owner == *owner)
            .fold(Amount::ZERO, |acc, u| acc.saturating_add(u.amount))
    }

    /// Outputs owned by `owner`, ordered by out-point.
    pub fn owned_by(&self, owner: &Address) -> Vec<Utxo> {
        let mut owned: Vec<Utxo> = self
            .entries
            .values()
            .filter(|u| u.owner == *owner)
            .copied()
            .collect();
        owned.sort_by_key(|u| u.outpoint);
        owned
    }

    /// Sum of every unspent output.
    pub fn total_supply(&self) -> Amount {
        self.entries
            .values()
            .fold(Amount::ZERO, |acc, u| acc.saturating_add(u.amount))
    }

    /// Apply a delta previously computed against this set.
    pub fn apply(&mut self, delta: UtxoDelta) {
        for outpoint in &delta.spent {
            self.entries.remove(outpoint);
        }
        for utxo in delta.created {
            self.entries.insert(utxo.outpoint, utxo);
        }
    }

    /// Apply a single, already validated transaction.
    pub fn apply_transaction(&mut self, tx: &Transaction) {
        let mut view = UtxoView::new(self);
        view.apply(tx);
        let delta = view.into_delta();
        self.apply(delta);
    }
}

/// Result of looking an out-point up through a [`UtxoView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Available(Utxo),
    /// Spent by a transaction already applied to the view.
    Spent,
    Missing,
}

/// A copy-on-write overlay over a [`UtxoSet`].
#[derive(Debug)]
pub struct UtxoView<'a> {
    base: &'a UtxoSet,
    spent: HashSet<OutPoint>,
    created: HashMap<OutPoint, Utxo>,
}

impl<'a> UtxoView<'a> {
    pub fn new(base: &'a UtxoSet) -> Self {
        Self {
            base,
            spent: HashSet::new(),
            created: HashMap::new(),
        }
    }

    pub fn lookup(&self, outpoint: &OutPoint) -> Lookup {
        if self.spent.contains(outpoint) {
            return Lookup::Spent;
        }
        self.created
            .get(outpoint)
            .or_else(|| self.base.get(outpoint))
            .map_or(Lookup::Missing, |utxo| Lookup::Available(*utxo))
    }

    /// Spend the inputs of `tx` and add its outputs.
    ///
    /// The transaction must already have been validated against this view.
    pub fn apply(&mut self, tx: &Transaction) {
        for input in tx.inputs() {
            self.created.remove(input);
            self.spent.insert(*input);
        }
        for (outpoint, output) in tx.created_outpoints() {
            self.created.insert(
                outpoint,
                Utxo {
                    outpoint,
                    amount: output.amount,
                    owner: output.recipient,
                },
            );
        }
    }

    /// Changes to apply to the base set.
    ///
    /// Outputs created and spent within the view cancel out.
    pub fn into_delta(self) -> UtxoDelta {
        let base = self.base;
        let mut spent: Vec<OutPoint> = self
            .spent
            .into_iter()
            .filter(|op| base.contains(op))
            .collect();
        spent.sort();
        let mut created: Vec<Utxo> = self.created.into_values().collect();
        created.sort_by_key(|u| u.outpoint);
        UtxoDelta { spent, created }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransferTransaction, TxOutput};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn funded(owner: Address, coins: u64) -> (UtxoSet, Transaction) {
        let reward = Transaction::reward(1, owner, Amount::from_coins(coins));
        let mut set = UtxoSet::new();
        set.apply_transaction(&reward);
        (set, reward)
    }

    #[test]
    fn test_reward_creates_utxo() {
        let (set, reward) = funded(addr(1), 50);
        let outpoint = OutPoint::new(reward.digest(), 0);

        assert_eq!(set.len(), 1);
        assert!(set.contains(&outpoint));
        assert_eq!(set.balance(&addr(1)), Amount::from_coins(50));
        assert_eq!(set.balance(&addr(2)), Amount::ZERO);
        assert_eq!(set.total_supply(), Amount::from_coins(50));
    }

    #[test]
    fn test_transfer_consumes_and_creates() {
        let (mut set, reward) = funded(addr(1), 50);
        let spend: Transaction = TransferTransaction::new(
            vec![OutPoint::new(reward.digest(), 0)],
            vec![
                TxOutput::new(Amount::from_coins(20), addr(2)),
                TxOutput::new(Amount::from_coins(30), addr(1)),
            ],
        )
        .into();

        set.apply_transaction(&spend);

        assert_eq!(set.len(), 2);
        assert!(!set.contains(&OutPoint::new(reward.digest(), 0)));
        assert_eq!(set.balance(&addr(1)), Amount::from_coins(30));
        assert_eq!(set.balance(&addr(2)), Amount::from_coins(20));
        assert_eq!(set.total_supply(), Amount::from_coins(50));
    }

    #[test]
    fn test_view_does_not_touch_base() {
        let (set, reward) = funded(addr(1), 50);
        let outpoint = OutPoint::new(reward.digest(), 0);
        let spend: Transaction = TransferTransaction::new(
            vec![outpoint],
            vec![TxOutput::new(Amount::from_coins(50), addr(2))],
        )
        .into();

        let mut view = UtxoView::new(&set);
        view.apply(&spend);

        assert_eq!(view.lookup(&outpoint), Lookup::Spent);
        assert!(set.contains(&outpoint));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_view_chained_spend_cancels_out() {
        let (set, reward) = funded(addr(1), 50);
        let first: Transaction = TransferTransaction::new(
            vec![OutPoint::new(reward.digest(), 0)],
            vec![TxOutput::new(Amount::from_coins(50), addr(2))],
        )
        .into();
        let intermediate = OutPoint::new(first.digest(), 0);
        let second: Transaction = TransferTransaction::new(
            vec![intermediate],
            vec![TxOutput::new(Amount::from_coins(50), addr(3))],
        )
        .into();

        let mut view = UtxoView::new(&set);
        view.apply(&first);
        assert!(matches!(view.lookup(&intermediate), Lookup::Available(_)));
        view.apply(&second);
        assert_eq!(view.lookup(&intermediate), Lookup::Spent);

        let delta = view.into_delta();
        assert_eq!(delta.spent, vec![OutPoint::new(reward.digest(), 0)]);
        assert_eq!(delta.created.len(), 1);
        assert_eq!(delta.created[0].owner, addr(3));
    }

    #[test]
    fn test_lookup_missing() {
        let set = UtxoSet::new();
        let view = UtxoView::new(&set);
        let outpoint = OutPoint::new(crate::hash::hash(b"nothing"), 0);
        assert_eq!(view.lookup(&outpoint), Lookup::Missing);
    }

    #[test]
    fn test_owned_by_is_sorted() {
        let mut set = UtxoSet::new();
        for height in 1..=5 {
            set.apply_transaction(&Transaction::reward(height, addr(1), Amount::from_coins(1)));
        }
        let owned = set.owned_by(&addr(1));
        assert_eq!(owned.len(), 5);
        assert!(owned.windows(2).all(|w| w[0].outpoint < w[1].outpoint));
    }
}
