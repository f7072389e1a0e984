//! Main blockchain orchestration.
//!
//! The chain, the UTXO set and the mempool form one consistency domain held
//! behind a single lock. Mining assembles a candidate under the lock, drops
//! it for the nonce search, and re-validates the sealed block under the lock
//! before committing.

use crate::assembler::BlockAssembler;
use crate::mempool::{Mempool, MempoolConfig};
use minicoin_consensus::{
    mine, BlockError, BlockValidator, CancelToken, RewardSchedule, TransactionValidator,
    ValidationError, MAX_DIFFICULTY,
};
use minicoin_core::{
    Address, Amount, Block, CryptoError, Hash, Keypair, Transaction, TransferTransaction, Utxo,
    UtxoSet,
};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur when submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockchainError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("mempool error: {0}")]
    Mempool(#[from] crate::mempool::MempoolError),
}

pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Errors that can occur while mining.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("difficulty {0} exceeds the maximum of 64")]
    DifficultyOutOfRange(u32),

    #[error("mined block rejected: {0}")]
    Rejected(#[from] BlockError),
}

/// What [`Blockchain::verify_chain`] found wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultKind {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("replayed UTXO set differs from the live set")]
    UtxoDivergence,
}

/// First fault found while replaying the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chain fault at height {height}: {kind}")]
pub struct ChainFault {
    pub height: u64,
    pub kind: FaultKind,
}

/// Blockchain configuration.
#[derive(Debug, Clone)]
pub struct BlockchainConfig {
    /// Block reward policy.
    pub rewards: RewardSchedule,
    /// Maximum transfers per block, reward excluded.
    pub max_block_transactions: usize,
    /// Mempool configuration.
    pub mempool: MempoolConfig,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rewards: RewardSchedule::default(),
            max_block_transactions: 10,
            mempool: MempoolConfig::default(),
        }
    }
}

/// Everything guarded by the ledger lock.
#[derive(Debug)]
struct ChainState {
    /// Committed blocks, genesis first. Never empty.
    blocks: Vec<Block>,
    utxos: UtxoSet,
    mempool: Mempool,
}

impl ChainState {
    fn tip(&self) -> &Block {
        // `blocks` starts with genesis and only grows
        &self.blocks[self.blocks.len() - 1]
    }
}

/// The ledger. Share it between threads through an `Arc`.
#[derive(Debug)]
pub struct Blockchain {
    config: BlockchainConfig,
    state: Mutex<ChainState>,
}

impl Blockchain {
    /// Create a new blockchain holding only the genesis block.
    pub fn new(config: BlockchainConfig) -> Self {
        let genesis = Block::genesis();
        info!("Genesis block created: {}", genesis.hash());

        let state = ChainState {
            blocks: vec![genesis],
            utxos: UtxoSet::new(),
            mempool: Mempool::with_config(config.mempool.clone()),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Every mutation is applied only after validation succeeds, so a
    /// poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// Generate a fresh keypair for a new participant.
    pub fn create_wallet(&self) -> std::result::Result<Keypair, CryptoError> {
        Keypair::generate()
    }

    /// Sum of the unspent outputs owned by `address`.
    pub fn balance(&self, address: &Address) -> Amount {
        self.lock().utxos.balance(address)
    }

    /// Outputs owned by `address` that no pending transfer already spends.
    pub fn spendable_outputs(&self, address: &Address) -> Vec<Utxo> {
        let state = self.lock();
        let reserved = state.mempool.reserved_outpoints();
        state
            .utxos
            .owned_by(address)
            .into_iter()
            .filter(|utxo| !reserved.contains(&utxo.outpoint))
            .collect()
    }

    /// Validate a transfer against the UTXO set and queue it for mining.
    ///
    /// Pending transfers are not consulted, so two transfers spending the
    /// same output may both be queued; block assembly keeps only one.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash> {
        let mut state = self.lock();
        TransactionValidator::validate(&tx, &state.utxos)?;

        let digest = match tx {
            Transaction::Transfer(transfer) => state.mempool.add(transfer)?,
            Transaction::Reward(_) => return Err(ValidationError::UnexpectedReward.into()),
        };
        debug!("Transaction {} queued ({} pending)", digest.short(), state.mempool.len());
        Ok(digest)
    }

    /// Assemble, mine and commit the next block, paying the reward to
    /// `miner`.
    ///
    /// Returns `Ok(None)` if `cancel` fired before a nonce was found. The
    /// nonce search runs without the ledger lock; if the chain moved in the
    /// meantime the sealed block fails re-validation and is discarded.
    pub fn mine_next_block(
        &self,
        miner: Address,
        difficulty: u32,
        cancel: &CancelToken,
    ) -> std::result::Result<Option<Block>, MiningError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(MiningError::DifficultyOutOfRange(difficulty));
        }

        let state = self.lock();
        let template = BlockAssembler::new(
            &state.utxos,
            &self.config.rewards,
            self.config.max_block_transactions,
        )
        .assemble(state.tip(), state.mempool.iter(), miner, difficulty);
        drop(state);
        for (digest, err) in &template.skipped {
            debug!("Skipping pending transaction {}: {}", digest.short(), err);
        }

        let height = template.block.height();
        let Some(block) = mine(template.block, cancel) else {
            info!("Mining of block {} cancelled", height);
            return Ok(None);
        };

        if let Err(err) = self.accept_block(block.clone()) {
            warn!("Mined block {} discarded: {}", height, err);
            return Err(err.into());
        }
        Ok(Some(block))
    }

    /// Validate `block` against the tip and commit it.
    ///
    /// On success the UTXO set, the mempool and the chain advance together;
    /// on failure nothing changes.
    pub fn accept_block(&self, block: Block) -> std::result::Result<(), BlockError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let delta =
            BlockValidator::validate_full(&block, state.tip(), &state.utxos, &self.config.rewards)?;

        state.utxos.apply(delta);
        let included: Vec<Hash> = block.transfers().map(TransferTransaction::digest).collect();
        state.mempool.remove_batch(&included);
        let evicted = state.mempool.retain_spendable(&state.utxos);
        if !evicted.is_empty() {
            debug!("Evicted {} conflicting transactions from mempool", evicted.len());
        }

        info!(
            "Block {} committed: {} ({} transfers, {} pending)",
            block.height(),
            block.hash().short(),
            included.len(),
            state.mempool.len()
        );
        state.blocks.push(block);
        Ok(())
    }

    /// Height of the tip.
    pub fn chain_height(&self) -> u64 {
        self.lock().tip().height()
    }

    pub fn utxo_count(&self) -> usize {
        self.lock().utxos.len()
    }

    pub fn tip(&self) -> Block {
        self.lock().tip().clone()
    }

    pub fn block_at(&self, height: u64) -> Option<Block> {
        let index = usize::try_from(height).ok()?;
        self.lock().blocks.get(index).cloned()
    }

    /// Snapshot of every committed block, genesis first.
    pub fn blocks(&self) -> Vec<Block> {
        self.lock().blocks.clone()
    }

    /// Pending transfers in submission order.
    pub fn pending_transactions(&self) -> Vec<TransferTransaction> {
        self.lock().mempool.pending()
    }

    pub fn mempool_len(&self) -> usize {
        self.lock().mempool.len()
    }

    /// Value held in the UTXO set.
    pub fn total_supply(&self) -> Amount {
        self.lock().utxos.total_supply()
    }

    /// Reward paid by the block at `height`.
    pub fn reward_at(&self, height: u64) -> Amount {
        self.config.rewards.reward_at(height)
    }

    /// Replay the chain from genesis and report the first fault.
    ///
    /// Works on a snapshot; the lock is not held while replaying.
    pub fn verify_chain(&self) -> std::result::Result<(), ChainFault> {
        let (blocks, live) = {
            let state = self.lock();
            (state.blocks.clone(), state.utxos.clone())
        };
        replay(&blocks, &live, &self.config.rewards)
    }

    pub fn is_chain_valid(&self) -> bool {
        match self.verify_chain() {
            Ok(()) => true,
            Err(fault) => {
                warn!("Chain integrity check failed: {}", fault);
                false
            }
        }
    }

    /// Get blockchain statistics.
    pub fn stats(&self) -> BlockchainStats {
        let state = self.lock();
        let tip = state.tip();
        BlockchainStats {
            height: tip.height(),
            latest_block_hash: tip.hash(),
            latest_timestamp: tip.header.timestamp,
            pending_transactions: state.mempool.len(),
            utxo_count: state.utxos.len(),
            total_supply: state.utxos.total_supply(),
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new(BlockchainConfig::default())
    }
}

/// Rebuild the UTXO set from `blocks` and compare it with `live`.
fn replay(
    blocks: &[Block],
    live: &UtxoSet,
    rewards: &RewardSchedule,
) -> std::result::Result<(), ChainFault> {
    let fault = |height: u64| move |kind: BlockError| ChainFault {
        height,
        kind: kind.into(),
    };

    let Some(genesis) = blocks.first() else {
        return Err(fault(0)(BlockError::InvalidGenesis));
    };
    BlockValidator::validate_genesis(genesis).map_err(fault(0))?;

    let mut utxos = UtxoSet::new();
    for pair in blocks.windows(2) {
        let (parent, block) = (&pair[0], &pair[1]);
        let delta = BlockValidator::validate_full(block, parent, &utxos, rewards)
            .map_err(fault(block.height()))?;
        utxos.apply(delta);
    }

    if &utxos != live {
        let height = blocks.last().map_or(0, Block::height);
        return Err(ChainFault {
            height,
            kind: FaultKind::UtxoDivergence,
        });
    }
    Ok(())
}

/// Blockchain statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockchainStats {
    /// Current chain height.
    pub height: u64,
    /// Hash of the latest block.
    pub latest_block_hash: Hash,
    /// Timestamp of the latest block.
    pub latest_timestamp: u64,
    /// Number of pending transactions.
    pub pending_transactions: usize,
    /// Number of unspent outputs.
    pub utxo_count: usize,
    /// Value held in the UTXO set.
    pub total_supply: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use minicoin_core::TxOutput;

    fn setup_blockchain() -> (Blockchain, Keypair) {
        let config = BlockchainConfig {
            rewards: RewardSchedule::new(Amount::from_coins(50), 10),
            ..BlockchainConfig::default()
        };
        let blockchain = Blockchain::new(config);
        let miner = blockchain.create_wallet().unwrap();
        blockchain
            .mine_next_block(miner.address(), 1, &CancelToken::new())
            .unwrap()
            .unwrap();
        (blockchain, miner)
    }

    fn pay_all(blockchain: &Blockchain, from: &Keypair, to: Address) -> TransferTransaction {
        let utxo = blockchain.spendable_outputs(&from.address())[0];
        TransferTransaction::new(vec![utxo.outpoint], vec![TxOutput::new(utxo.amount, to)])
            .signed(from)
    }

    #[test]
    fn test_blockchain_init() {
        let blockchain = Blockchain::default();

        assert_eq!(blockchain.chain_height(), 0);
        assert!(blockchain.tip().is_genesis());
        assert_eq!(blockchain.utxo_count(), 0);
        assert!(blockchain.is_chain_valid());
    }

    #[test]
    fn test_mine_pays_reward() {
        let (blockchain, miner) = setup_blockchain();

        assert_eq!(blockchain.chain_height(), 1);
        assert_eq!(blockchain.balance(&miner.address()), Amount::from_coins(50));
        assert_eq!(blockchain.utxo_count(), 1);
        assert!(blockchain.is_chain_valid());
    }

    #[test]
    fn test_submit_transaction() {
        let (blockchain, miner) = setup_blockchain();
        let tx = pay_all(&blockchain, &miner, Address::from_bytes([2u8; 20]));

        let digest = blockchain.submit_transaction(tx.clone().into()).unwrap();
        assert_eq!(digest, tx.digest());
        assert_eq!(blockchain.mempool_len(), 1);
        assert_eq!(blockchain.pending_transactions(), vec![tx.clone()]);
        assert!(blockchain.spendable_outputs(&miner.address()).is_empty());

        assert!(matches!(
            blockchain.submit_transaction(tx.into()),
            Err(BlockchainError::Mempool(
                crate::mempool::MempoolError::DuplicateTransaction
            ))
        ));
    }

    #[test]
    fn test_submit_reward_rejected() {
        let (blockchain, miner) = setup_blockchain();
        let reward = Transaction::reward(2, miner.address(), Amount::from_coins(50));

        assert_eq!(
            blockchain.submit_transaction(reward),
            Err(BlockchainError::Validation(ValidationError::UnexpectedReward))
        );
        assert_eq!(blockchain.mempool_len(), 0);
    }

    #[test]
    fn test_mined_block_clears_mempool() {
        let (blockchain, miner) = setup_blockchain();
        let to = Address::from_bytes([2u8; 20]);
        let tx = pay_all(&blockchain, &miner, to);
        blockchain.submit_transaction(tx.into()).unwrap();

        let block = blockchain
            .mine_next_block(miner.address(), 1, &CancelToken::new())
            .unwrap()
            .unwrap();

        assert_eq!(block.tx_count(), 2);
        assert_eq!(blockchain.mempool_len(), 0);
        assert_eq!(blockchain.balance(&to), Amount::from_coins(50));
        assert_eq!(blockchain.balance(&miner.address()), Amount::from_coins(50));
        assert!(blockchain.is_chain_valid());
    }

    #[test]
    fn test_difficulty_out_of_range() {
        let blockchain = Blockchain::default();
        let miner = Address::from_bytes([1u8; 20]);

        assert_eq!(
            blockchain.mine_next_block(miner, MAX_DIFFICULTY + 1, &CancelToken::new()),
            Err(MiningError::DifficultyOutOfRange(MAX_DIFFICULTY + 1))
        );
    }

    #[test]
    fn test_cancelled_mining_commits_nothing() {
        let (blockchain, miner) = setup_blockchain();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mined = blockchain.mine_next_block(miner.address(), MAX_DIFFICULTY, &cancel);
        assert_eq!(mined, Ok(None));
        assert_eq!(blockchain.chain_height(), 1);
    }

    #[test]
    fn test_stale_block_rejected() {
        let (blockchain, _) = setup_blockchain();
        let stale = blockchain.tip();

        assert!(matches!(
            blockchain.accept_block(stale),
            Err(BlockError::ChainMismatch { .. })
        ));
        assert_eq!(blockchain.chain_height(), 1);
        assert!(blockchain.is_chain_valid());
    }

    #[test]
    fn test_rejected_block_leaves_state_untouched() {
        let (blockchain, miner) = setup_blockchain();
        let tx = pay_all(&blockchain, &miner, Address::from_bytes([2u8; 20]));
        blockchain.submit_transaction(tx.clone().into()).unwrap();
        let before = blockchain.stats();

        let tip = blockchain.tip();
        let reward = Transaction::reward(2, miner.address(), Amount::from_coins(500));
        let greedy = mine(
            Block::candidate(2, tip.hash(), vec![tx.into(), reward], 1),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(matches!(
            blockchain.accept_block(greedy),
            Err(BlockError::InvalidReward { .. })
        ));
        assert_eq!(blockchain.stats(), before);
    }

    #[test]
    fn test_tampered_amount_detected() {
        let (blockchain, miner) = setup_blockchain();
        let tx = pay_all(&blockchain, &miner, Address::from_bytes([2u8; 20]));
        blockchain.submit_transaction(tx.into()).unwrap();
        blockchain
            .mine_next_block(miner.address(), 1, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert!(blockchain.is_chain_valid());

        {
            let mut state = blockchain.lock();
            if let Transaction::Transfer(transfer) = &mut state.blocks[2].transactions[0] {
                transfer.outputs[0].amount = Amount::from_coins(49);
            }
        }

        assert_eq!(
            blockchain.verify_chain(),
            Err(ChainFault {
                height: 2,
                kind: FaultKind::Block(BlockError::MerkleMismatch),
            })
        );
        assert!(!blockchain.is_chain_valid());
    }

    #[test]
    fn test_broken_link_detected() {
        let (blockchain, miner) = setup_blockchain();
        blockchain
            .mine_next_block(miner.address(), 1, &CancelToken::new())
            .unwrap()
            .unwrap();

        {
            let mut state = blockchain.lock();
            state.blocks[2].header.previous_hash = Hash::from_bytes([1u8; 32]);
        }

        let fault = blockchain.verify_chain().unwrap_err();
        assert_eq!(fault.height, 2);
        assert!(matches!(
            fault.kind,
            FaultKind::Block(BlockError::ChainMismatch { .. })
        ));
    }

    #[test]
    fn test_utxo_divergence_detected() {
        let (blockchain, _) = setup_blockchain();
        {
            let mut state = blockchain.lock();
            let forged = Transaction::reward(99, Address::from_bytes([9u8; 20]), Amount::from_coins(1));
            state.utxos.apply_transaction(&forged);
        }

        assert_eq!(
            blockchain.verify_chain(),
            Err(ChainFault {
                height: 1,
                kind: FaultKind::UtxoDivergence,
            })
        );
    }

    #[test]
    fn test_conflicting_pending_evicted_after_commit() {
        let (blockchain, miner) = setup_blockchain();
        let utxo = blockchain.spendable_outputs(&miner.address())[0];
        let spend = |to: u8| {
            TransferTransaction::new(
                vec![utxo.outpoint],
                vec![TxOutput::new(utxo.amount, Address::from_bytes([to; 20]))],
            )
            .signed(&miner)
        };
        let first = spend(2);
        let second = spend(3);
        blockchain.submit_transaction(first.into()).unwrap();
        blockchain.submit_transaction(second.clone().into()).unwrap();
        assert_eq!(blockchain.mempool_len(), 2);

        let block = blockchain
            .mine_next_block(miner.address(), 1, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(block.transfers().count(), 1);
        assert_eq!(blockchain.mempool_len(), 0);

        assert_eq!(
            blockchain.submit_transaction(second.into()),
            Err(BlockchainError::Validation(ValidationError::UnknownInput(
                utxo.outpoint
            )))
        );
    }

    #[test]
    fn test_blockchain_stats() {
        let (blockchain, _) = setup_blockchain();

        let stats = blockchain.stats();
        assert_eq!(stats.height, 1);
        assert_eq!(stats.latest_block_hash, blockchain.tip().hash());
        assert_eq!(stats.pending_transactions, 0);
        assert_eq!(stats.utxo_count, 1);
        assert_eq!(stats.total_supply, Amount::from_coins(50));
    }

    #[test]
    fn test_block_at() {
        let (blockchain, _) = setup_blockchain();

        assert!(blockchain.block_at(0).unwrap().is_genesis());
        assert_eq!(blockchain.block_at(1).unwrap(), blockchain.tip());
        assert!(blockchain.block_at(2).is_none());
        assert_eq!(blockchain.blocks().len(), 2);
    }
}
