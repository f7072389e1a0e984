//! Proof-of-work search and predicate.
//!
//! A block hash meets difficulty `d` when its hex rendering starts with `d`
//! zeros, i.e. its value is below `2^(256 - 4d)`. The nonce search holds no
//! locks and polls a [`CancelToken`] before every attempt, so a caller can
//! stop it between two hashes without leaving anything half-written.

use minicoin_core::{Block, BlockHeader, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Highest difficulty a 256-bit hash can satisfy.
pub const MAX_DIFFICULTY: u32 = 64;

/// Check if a hash meets the difficulty target.
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    hash.leading_zero_nibbles() >= difficulty
}

/// Shared flag used to stop a nonce search.
///
/// Clones observe the same flag. Once cancelled it stays cancelled until
/// [`CancelToken::reset`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every search polling this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the flag so the token can be used for the next search.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Search nonces from zero upward until the header hash meets the block's
/// difficulty.
///
/// Returns the sealed block, or `None` if `cancel` fired first. If the whole
/// nonce space is exhausted the timestamp moves forward and the search
/// starts over.
pub fn mine(mut block: Block, cancel: &CancelToken) -> Option<Block> {
    block.header.nonce = 0;
    loop {
        if cancel.is_cancelled() {
            return None;
        }

        let hash = block.header.hash();
        if meets_difficulty(&hash, block.header.difficulty) {
            block.hash = hash;
            return Some(block);
        }

        match block.header.nonce.checked_add(1) {
            Some(next) => block.header.nonce = next,
            None => {
                block.header.timestamp =
                    BlockHeader::current_timestamp().max(block.header.timestamp + 1);
                block.header.nonce = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minicoin_core::{Address, Amount, Transaction};

    fn candidate(difficulty: u32) -> Block {
        let reward = Transaction::reward(1, Address::from_bytes([1u8; 20]), Amount::from_coins(50));
        Block::candidate(1, Hash::ZERO, vec![reward], difficulty)
    }

    #[test]
    fn test_meets_difficulty_zero() {
        assert!(meets_difficulty(&Hash::from_bytes([0xFF; 32]), 0));
    }

    #[test]
    fn test_meets_difficulty_nibbles() {
        let mut bytes = [0xFF; 32];
        bytes[0] = 0x0F;
        let hash = Hash::from_bytes(bytes);
        assert!(meets_difficulty(&hash, 1));
        assert!(!meets_difficulty(&hash, 2));

        bytes[0] = 0x00;
        let hash = Hash::from_bytes(bytes);
        assert!(meets_difficulty(&hash, 2));
        assert!(!meets_difficulty(&hash, 3));
    }

    #[test]
    fn test_max_difficulty_only_zero_hash() {
        assert!(meets_difficulty(&Hash::ZERO, MAX_DIFFICULTY));
        assert!(!meets_difficulty(&Hash::ZERO, MAX_DIFFICULTY + 1));
    }

    #[test]
    fn test_mine_finds_valid_nonce() {
        for difficulty in 0..=2 {
            let block = mine(candidate(difficulty), &CancelToken::new()).unwrap();
            assert!(block.verify_hash());
            assert!(block.hash().to_hex().starts_with(&"0".repeat(difficulty as usize)));
        }
    }

    #[test]
    fn test_mine_keeps_merkle_root() {
        let template = candidate(1);
        let root = template.header.merkle_root;
        let block = mine(template, &CancelToken::new()).unwrap();
        assert_eq!(block.header.merkle_root, root);
        assert!(block.verify_merkle_root());
    }

    #[test]
    fn test_cancelled_search_yields_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(mine(candidate(MAX_DIFFICULTY), &cancel).is_none());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = std::thread::spawn(move || mine(candidate(MAX_DIFFICULTY), &remote));

        std::thread::sleep(std::time::Duration::from_millis(20));
        cancel.cancel();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn test_token_reset() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(cancel.is_cancelled());
        cancel.reset();
        assert!(!cancel.is_cancelled());
        assert!(mine(candidate(1), &cancel).is_some());
    }
}
