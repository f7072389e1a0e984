//! Merkle commitment over transaction digests.

use crate::hash::{hash_concat, Hash};

/// Root committed by a block with no transactions.
pub const EMPTY_MERKLE_ROOT: Hash = Hash::ZERO;

/// Compute the merkle root of an ordered list of digests.
///
/// Adjacent pairs are hashed level by level. On a level of odd length the
/// last digest is paired with itself. A single digest is its own root.
pub fn merkle_root(digests: &[Hash]) -> Hash {
    let Some(first) = digests.first() else {
        return EMPTY_MERKLE_ROOT;
    };
    if digests.len() == 1 {
        return *first;
    }

    let mut level: Vec<Hash> = digests.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                hash_concat(&[pair[0].as_ref(), right.as_ref()])
            })
            .collect();
    }
    level[0]
}
