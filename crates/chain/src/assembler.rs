//! Block assembly.
//!
//! Selects pending transfers that are valid together on top of the current
//! UTXO set and closes the candidate block with the miner's reward.

use minicoin_consensus::{RewardSchedule, TransactionValidator, ValidationError};
use minicoin_core::{Address, Block, Hash, Transaction, TransferTransaction, UtxoSet, UtxoView};

/// An unmined block together with what was left out of it.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Candidate block, nonce zero.
    pub block: Block,
    /// Pending transfers that failed validation during selection.
    pub skipped: Vec<(Hash, ValidationError)>,
}

/// Block assembler.
pub struct BlockAssembler<'a> {
    /// UTXO set at the parent block.
    utxos: &'a UtxoSet,
    rewards: &'a RewardSchedule,
    max_transactions: usize,
}

impl<'a> BlockAssembler<'a> {
    /// Create a new assembler over the UTXO set at the parent.
    pub fn new(utxos: &'a UtxoSet, rewards: &'a RewardSchedule, max_transactions: usize) -> Self {
        Self {
            utxos,
            rewards,
            max_transactions,
        }
    }

    /// Build the candidate block extending `parent`.
    ///
    /// `pending` is walked in order; each transfer is validated against the
    /// effects of those already selected, so at most one of a conflicting
    /// pair makes it in. At most `max_transactions` transfers are selected.
    pub fn assemble<'t, I>(
        &self,
        parent: &Block,
        pending: I,
        miner: Address,
        difficulty: u32,
    ) -> BlockTemplate
    where
        I: IntoIterator<Item = (&'t Hash, &'t TransferTransaction)>,
    {
        let height = parent.height() + 1;
        let mut view = UtxoView::new(self.utxos);
        let mut transactions = Vec::new();
        let mut skipped = Vec::new();

        for (digest, transfer) in pending {
            if transactions.len() >= self.max_transactions {
                break;
            }
            match TransactionValidator::validate_transfer(transfer, &view) {
                Ok(_) => {
                    let tx = Transaction::Transfer(transfer.clone());
                    view.apply(&tx);
                    transactions.push(tx);
                }
                Err(err) => skipped.push((*digest, err)),
            }
        }

        transactions.push(Transaction::reward(
            height,
            miner,
            self.rewards.reward_at(height),
        ));

        BlockTemplate {
            block: Block::candidate(height, parent.hash(), transactions, difficulty),
            skipped,
        }
    }
}
