//! Transaction and block validation rules.
//!
//! Validation is pure: it reads a UTXO set (through a [`UtxoView`] when a
//! batch is involved) and never mutates it. Block validation returns the
//! [`UtxoDelta`] the caller applies if, and only if, it decides to commit.

use crate::pow::meets_difficulty;
use crate::reward::RewardSchedule;
use minicoin_core::{
    Address, Amount, Block, Hash, Lookup, OutPoint, Transaction, TransferTransaction, UtxoDelta,
    UtxoSet, UtxoView,
};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Reasons a transaction is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transfer has no inputs")]
    MissingInputs,

    #[error("transfer has no outputs")]
    MissingOutputs,

    #[error("reward transactions cannot be submitted")]
    UnexpectedReward,

    #[error("unknown input {0}")]
    UnknownInput(OutPoint),

    #[error("input {0} is already spent")]
    DoubleSpend(OutPoint),

    #[error("missing or invalid signature for {0}")]
    InvalidSignature(Address),

    #[error("value mismatch (inputs {inputs}, outputs {outputs})")]
    ValueMismatch { inputs: Amount, outputs: Amount },

    #[error("output {index} has a zero amount")]
    InvalidAmount { index: usize },

    #[error("amount overflow")]
    AmountOverflow,
}

/// Reasons a block is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block height mismatch (expected {expected}, got {got})")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("previous hash {got} does not match chain tip {expected}")]
    ChainMismatch { expected: Hash, got: Hash },

    #[error("stored block hash does not match its header")]
    HashMismatch,

    #[error("block hash does not meet difficulty {difficulty}")]
    InvalidProofOfWork { difficulty: u32 },

    #[error("block merkle root verification failed")]
    MerkleMismatch,

    #[error("genesis block is malformed")]
    InvalidGenesis,

    #[error("block does not end with a reward transaction")]
    MissingReward,

    #[error("reward transaction at position {index} is not last")]
    MisplacedReward { index: usize },

    #[error("invalid reward (expected {expected} for height {height}, got {got} for height {got_height})")]
    InvalidReward {
        expected: Amount,
        height: u64,
        got: Amount,
        got_height: u64,
    },

    #[error("transaction {index} invalid: {source}")]
    Transaction {
        index: usize,
        source: ValidationError,
    },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Transaction validator.
pub struct TransactionValidator;

impl TransactionValidator {
    /// Validate a transaction submitted on its own against the UTXO set.
    ///
    /// Rewards are only created by block assembly and are refused here.
    pub fn validate(tx: &Transaction, utxos: &UtxoSet) -> Result<()> {
        match tx {
            Transaction::Reward(_) => Err(ValidationError::UnexpectedReward),
            Transaction::Transfer(transfer) => {
                Self::validate_transfer(transfer, &UtxoView::new(utxos)).map(|_| ())
            }
        }
    }

    /// Validate a transfer against a view that may already hold other
    /// transactions of the same batch. Returns the value moved.
    pub fn validate_transfer(tx: &TransferTransaction, view: &UtxoView<'_>) -> Result<Amount> {
        if tx.inputs.is_empty() {
            return Err(ValidationError::MissingInputs);
        }
        if tx.outputs.is_empty() {
            return Err(ValidationError::MissingOutputs);
        }

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        let mut owners = BTreeSet::new();
        let mut input_total = Amount::ZERO;
        for input in &tx.inputs {
            if !seen.insert(*input) {
                return Err(ValidationError::DoubleSpend(*input));
            }
            let utxo = match view.lookup(input) {
                Lookup::Available(utxo) => utxo,
                Lookup::Spent => return Err(ValidationError::DoubleSpend(*input)),
                Lookup::Missing => return Err(ValidationError::UnknownInput(*input)),
            };
            owners.insert(utxo.owner);
            input_total = input_total
                .checked_add(utxo.amount)
                .ok_or(ValidationError::AmountOverflow)?;
        }

        Self::validate_witnesses(tx, &owners)?;

        let output_total = Amount::checked_sum(tx.outputs.iter().map(|o| o.amount))
            .ok_or(ValidationError::AmountOverflow)?;
        if output_total != input_total {
            return Err(ValidationError::ValueMismatch {
                inputs: input_total,
                outputs: output_total,
            });
        }

        if let Some(index) = tx.outputs.iter().position(|o| o.amount.is_zero()) {
            return Err(ValidationError::InvalidAmount { index });
        }

        Ok(input_total)
    }

    /// Every owner must have signed, and nobody else may have.
    fn validate_witnesses(tx: &TransferTransaction, owners: &BTreeSet<Address>) -> Result<()> {
        let digest = tx.digest();
        for owner in owners {
            match tx.witness_for(owner) {
                Some(witness) if witness.verifies(&digest) => {}
                _ => return Err(ValidationError::InvalidSignature(*owner)),
            }
        }
        if let Some(stray) = tx.witnesses.iter().find(|w| !owners.contains(&w.signer())) {
            return Err(ValidationError::InvalidSignature(stray.signer()));
        }
        Ok(())
    }
}

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Validate the shape of the genesis block.
    pub fn validate_genesis(block: &Block) -> std::result::Result<(), BlockError> {
        if !block.is_genesis() || !block.transactions.is_empty() {
            return Err(BlockError::InvalidGenesis);
        }
        Self::validate_header(block)?;
        Self::validate_structure(block)
    }

    /// Validate block extends the parent correctly.
    pub fn validate_extends_parent(
        block: &Block,
        parent: &Block,
    ) -> std::result::Result<(), BlockError> {
        if block.header.previous_hash != parent.hash() {
            return Err(BlockError::ChainMismatch {
                expected: parent.hash(),
                got: block.header.previous_hash,
            });
        }
        let expected = parent.height() + 1;
        if block.height() != expected {
            return Err(BlockError::InvalidHeight {
                expected,
                got: block.height(),
            });
        }
        Ok(())
    }

    /// Stored hash and proof of work.
    pub fn validate_header(block: &Block) -> std::result::Result<(), BlockError> {
        if !block.verify_hash() {
            return Err(BlockError::HashMismatch);
        }
        if !meets_difficulty(&block.hash(), block.header.difficulty) {
            return Err(BlockError::InvalidProofOfWork {
                difficulty: block.header.difficulty,
            });
        }
        Ok(())
    }

    /// Merkle commitment.
    pub fn validate_structure(block: &Block) -> std::result::Result<(), BlockError> {
        if !block.verify_merkle_root() {
            return Err(BlockError::MerkleMismatch);
        }
        Ok(())
    }

    /// Exactly one reward, in last position, paying the scheduled amount.
    pub fn validate_reward(
        block: &Block,
        schedule: &RewardSchedule,
    ) -> std::result::Result<(), BlockError> {
        let last = block.transactions.len().saturating_sub(1);
        if let Some(index) = block
            .transactions
            .iter()
            .position(Transaction::is_reward)
            .filter(|index| *index != last)
        {
            return Err(BlockError::MisplacedReward { index });
        }

        let reward = block.reward().ok_or(BlockError::MissingReward)?;
        let expected = schedule.reward_at(block.height());
        if reward.height != block.height() || reward.output.amount != expected {
            return Err(BlockError::InvalidReward {
                expected,
                height: block.height(),
                got: reward.output.amount,
                got_height: reward.height,
            });
        }
        Ok(())
    }

    /// Validate every transfer in order against `utxos`, each seeing the
    /// effects of those before it. Returns the delta of the whole block.
    pub fn validate_transactions(
        block: &Block,
        utxos: &UtxoSet,
    ) -> std::result::Result<UtxoDelta, BlockError> {
        let mut view = UtxoView::new(utxos);
        for (index, tx) in block.transactions.iter().enumerate() {
            if let Transaction::Transfer(transfer) = tx {
                TransactionValidator::validate_transfer(transfer, &view)
                    .map_err(|source| BlockError::Transaction { index, source })?;
            }
            view.apply(tx);
        }
        Ok(view.into_delta())
    }

    /// Full validation of a block on top of `parent` and the UTXO set at
    /// `parent`.
    pub fn validate_full(
        block: &Block,
        parent: &Block,
        utxos: &UtxoSet,
        schedule: &RewardSchedule,
    ) -> std::result::Result<UtxoDelta, BlockError> {
        Self::validate_extends_parent(block, parent)?;
        Self::validate_header(block)?;
        Self::validate_structure(block)?;
        Self::validate_reward(block, schedule)?;
        Self::validate_transactions(block, utxos)
    }
}
