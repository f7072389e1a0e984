//! Transaction types and signing.
//!
//! A transaction is either a [`TransferTransaction`], which spends existing
//! outputs and must be authorized by every owner it spends from, or a
//! [`RewardTransaction`], which has no inputs and mints the block reward.

use crate::amount::Amount;
use crate::crypto::{Address, Keypair, PublicKey, Signature};
use crate::hash::{hash_encoded, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to one output of a committed transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Digest of the transaction that created the output.
    pub tx_digest: Hash,
    /// Position of the output in that transaction.
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_digest: Hash, index: u32) -> Self {
        Self { tx_digest, index }
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({}:{})", self.tx_digest.short(), self.index)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_digest.short(), self.index)
    }
}

/// An output: value bound to a recipient address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: Amount,
    pub recipient: Address,
}

impl TxOutput {
    pub fn new(amount: Amount, recipient: Address) -> Self {
        Self { amount, recipient }
    }
}

/// A signature together with the key that produced it.
///
/// Owners are identified by address, so the public key travels with the
/// signature and is checked against the address of the spent outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl Witness {
    /// Address of the key that signed.
    pub fn signer(&self) -> Address {
        self.public_key.to_address()
    }

    /// Check the signature over a transaction digest.
    pub fn verifies(&self, digest: &Hash) -> bool {
        self.public_key.verify(digest, &self.signature)
    }
}

/// A signed value transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTransaction {
    /// Outputs being spent, in order.
    pub inputs: Vec<OutPoint>,
    /// New outputs, in order.
    pub outputs: Vec<TxOutput>,
    /// One witness per distinct owner of the inputs.
    pub witnesses: Vec<Witness>,
}

/// Reward paid to the miner of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTransaction {
    /// Height of the block paying the reward.
    pub height: u64,
    pub output: TxOutput,
}

/// Encoding hashed into a transaction digest. Witnesses are not part of it.
#[derive(Serialize)]
enum DigestPreimage<'a> {
    Reward {
        height: u64,
        output: &'a TxOutput,
    },
    Transfer {
        inputs: &'a [OutPoint],
        outputs: &'a [TxOutput],
    },
}

impl TransferTransaction {
    /// Create an unsigned transfer.
    pub fn new(inputs: Vec<OutPoint>, outputs: Vec<TxOutput>) -> Self {
        Self {
            inputs,
            outputs,
            witnesses: Vec::new(),
        }
    }

    /// Digest over inputs and outputs, the message every witness signs.
    pub fn digest(&self) -> Hash {
        hash_encoded(&DigestPreimage::Transfer {
            inputs: &self.inputs,
            outputs: &self.outputs,
        })
    }

    /// Add (or replace) the witness for `keypair`.
    pub fn sign(&mut self, keypair: &Keypair) {
        let digest = self.digest();
        let witness = Witness {
            public_key: keypair.public_key.clone(),
            signature: keypair.sign(&digest),
        };
        match self
            .witnesses
            .iter_mut()
            .find(|w| w.public_key == witness.public_key)
        {
            Some(existing) => *existing = witness,
            None => self.witnesses.push(witness),
        }
    }

    /// Create a signed transfer.
    pub fn signed(mut self, keypair: &Keypair) -> Self {
        self.sign(keypair);
        self
    }

    /// Witness whose key hashes to `owner`, if any.
    pub fn witness_for(&self, owner: &Address) -> Option<&Witness> {
        self.witnesses.iter().find(|w| w.signer() == *owner)
    }
}

impl RewardTransaction {
    pub fn new(height: u64, recipient: Address, amount: Amount) -> Self {
        Self {
            height,
            output: TxOutput::new(amount, recipient),
        }
    }

    pub fn digest(&self) -> Hash {
        hash_encoded(&DigestPreimage::Reward {
            height: self.height,
            output: &self.output,
        })
    }
}

/// A transaction on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Reward(RewardTransaction),
    Transfer(TransferTransaction),
}

impl Transaction {
    /// Create a reward transaction for the block at `height`.
    pub fn reward(height: u64, recipient: Address, amount: Amount) -> Self {
        Self::Reward(RewardTransaction::new(height, recipient, amount))
    }

    /// Digest identifying this transaction (signatures excluded).
    pub fn digest(&self) -> Hash {
        match self {
            Self::Reward(tx) => tx.digest(),
            Self::Transfer(tx) => tx.digest(),
        }
    }

    pub fn is_reward(&self) -> bool {
        matches!(self, Self::Reward(_))
    }

    /// Outputs spent by this transaction. Empty for a reward.
    pub fn inputs(&self) -> &[OutPoint] {
        match self {
            Self::Reward(_) => &[],
            Self::Transfer(tx) => &tx.inputs,
        }
    }

    /// Outputs created by this transaction.
    pub fn outputs(&self) -> &[TxOutput] {
        match self {
            Self::Reward(tx) => std::slice::from_ref(&tx.output),
            Self::Transfer(tx) => &tx.outputs,
        }
    }

    /// Total value of the outputs, `None` on overflow.
    pub fn output_total(&self) -> Option<Amount> {
        Amount::checked_sum(self.outputs().iter().map(|o| o.amount))
    }

    /// Out-points of the outputs this transaction creates.
    pub fn created_outpoints(&self) -> impl Iterator<Item = (OutPoint, &TxOutput)> + '_ {
        let digest = self.digest();
        self.outputs()
            .iter()
            .enumerate()
            .map(move |(index, output)| (OutPoint::new(digest, index as u32), output))
    }

    pub fn as_transfer(&self) -> Option<&TransferTransaction> {
        match self {
            Self::Transfer(tx) => Some(tx),
            Self::Reward(_) => None,
        }
    }
}

impl From<TransferTransaction> for Transaction {
    fn from(tx: TransferTransaction) -> Self {
        Self::Transfer(tx)
    }
}

impl From<RewardTransaction> for Transaction {
    fn from(tx: RewardTransaction) -> Self {
        Self::Reward(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn outpoint(tag: &[u8], index: u32) -> OutPoint {
        OutPoint::new(hash(tag), index)
    }

    fn sample_transfer() -> TransferTransaction {
        let to = Address::from_bytes([2u8; 20]);
        TransferTransaction::new(
            vec![outpoint(b"funding", 0)],
            vec![TxOutput::new(Amount::from_coins(1), to)],
        )
    }

    #[test]
    fn test_digest_excludes_witnesses() {
        let keypair = Keypair::generate().unwrap();
        let unsigned = sample_transfer();
        let signed = unsigned.clone().signed(&keypair);

        assert_eq!(unsigned.digest(), signed.digest());
        assert_eq!(signed.witnesses.len(), 1);
    }

    #[test]
    fn test_digest_covers_outputs() {
        let tx = sample_transfer();
        let mut changed = tx.clone();
        changed.outputs[0].amount = Amount::from_coins(2);
        assert_ne!(tx.digest(), changed.digest());
    }

    #[test]
    fn test_digest_covers_inputs() {
        let tx = sample_transfer();
        let mut changed = tx.clone();
        changed.inputs[0].index = 1;
        assert_ne!(tx.digest(), changed.digest());
    }

    #[test]
    fn test_sign_and_verify_witness() {
        let keypair = Keypair::generate().unwrap();
        let tx = sample_transfer().signed(&keypair);

        let witness = tx.witness_for(&keypair.address()).unwrap();
        assert!(witness.verifies(&tx.digest()));
        assert_eq!(witness.signer(), keypair.address());
    }

    #[test]
    fn test_resigning_replaces_witness() {
        let keypair = Keypair::generate().unwrap();
        let tx = sample_transfer().signed(&keypair).signed(&keypair);
        assert_eq!(tx.witnesses.len(), 1);
    }

    #[test]
    fn test_multiple_signers() {
        let alice = Keypair::generate().unwrap();
        let bob = Keypair::generate().unwrap();
        let tx = sample_transfer().signed(&alice).signed(&bob);

        assert_eq!(tx.witnesses.len(), 2);
        assert!(tx.witness_for(&alice.address()).is_some());
        assert!(tx.witness_for(&bob.address()).is_some());
    }

    #[test]
    fn test_reward_transaction() {
        let miner = Address::from_bytes([9u8; 20]);
        let tx = Transaction::reward(3, miner, Amount::from_coins(50));

        assert!(tx.is_reward());
        assert!(tx.inputs().is_empty());
        assert_eq!(tx.outputs().len(), 1);
        assert_eq!(tx.output_total(), Some(Amount::from_coins(50)));
        assert!(tx.as_transfer().is_none());
    }

    #[test]
    fn test_reward_digest_unique_per_height() {
        let miner = Address::from_bytes([9u8; 20]);
        let r1 = Transaction::reward(1, miner, Amount::from_coins(50));
        let r2 = Transaction::reward(2, miner, Amount::from_coins(50));
        assert_ne!(r1.digest(), r2.digest());
    }

    #[test]
    fn test_created_outpoints() {
        let to = Address::from_bytes([2u8; 20]);
        let tx: Transaction = TransferTransaction::new(
            vec![outpoint(b"funding", 0)],
            vec![
                TxOutput::new(Amount::from_coins(1), to),
                TxOutput::new(Amount::from_coins(2), to),
            ],
        )
        .into();

        let created: Vec<_> = tx.created_outpoints().collect();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].0, OutPoint::new(tx.digest(), 0));
        assert_eq!(created[1].0, OutPoint::new(tx.digest(), 1));
        assert_eq!(created[1].1.amount, Amount::from_coins(2));
    }

    #[test]
    fn test_transaction_bincode_roundtrip() {
        let keypair = Keypair::generate().unwrap();
        let tx: Transaction = sample_transfer().signed(&keypair).into();

        let encoded = bincode::serialize(&tx).unwrap();
        let decoded: Transaction = bincode::deserialize(&encoded).unwrap();
        assert_eq!(tx, decoded);
    }
}
