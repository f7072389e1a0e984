//! Block reward and halving schedule.

use minicoin_core::Amount;
use serde::{Deserialize, Serialize};

/// Reward policy: `initial_reward / 2^floor(height / halving_interval)`.
///
/// The reward is always derived from the height; nothing stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    /// Reward paid by blocks before the first halving.
    pub initial_reward: Amount,
    /// Blocks between halvings. Zero disables halving.
    pub halving_interval: u64,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            initial_reward: Amount::from_coins(50),
            halving_interval: 210_000,
        }
    }
}

impl RewardSchedule {
    pub fn new(initial_reward: Amount, halving_interval: u64) -> Self {
        Self {
            initial_reward,
            halving_interval,
        }
    }

    /// Number of halvings applied at `height`.
    pub fn halvings(&self, height: u64) -> u64 {
        height.checked_div(self.halving_interval).unwrap_or(0)
    }

    /// Reward paid by the block at `height`.
    pub fn reward_at(&self, height: u64) -> Amount {
        self.initial_reward.halved(self.halvings(height))
    }

    /// Total issued by blocks `1..=height` (genesis pays nothing).
    pub fn issued_through(&self, height: u64) -> Amount {
        (1..=height).fold(Amount::ZERO, |acc, h| acc.saturating_add(self.reward_at(h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halving_every_ten_blocks() {
        let schedule = RewardSchedule::new(Amount::from_coins(50), 10);

        for height in 0..10 {
            assert_eq!(schedule.reward_at(height), Amount::from_coins(50));
        }
        for height in 10..20 {
            assert_eq!(schedule.reward_at(height), Amount::from_coins(25));
        }
        for height in 20..30 {
            assert_eq!(schedule.reward_at(height).to_string(), "12.50000000");
        }
    }

    #[test]
    fn test_reward_non_increasing() {
        let schedule = RewardSchedule::new(Amount::from_coins(50), 3);
        let rewards: Vec<_> = (0..300).map(|h| schedule.reward_at(h)).collect();
        assert!(rewards.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(*rewards.last().unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_exact_halving_at_boundaries() {
        let schedule = RewardSchedule::new(Amount::from_coins(64), 5);
        for k in 1..6 {
            let before = schedule.reward_at(k * 5 - 1);
            let after = schedule.reward_at(k * 5);
            assert_eq!(after.units() * 2, before.units());
        }
    }

    #[test]
    fn test_zero_interval_disables_halving() {
        let schedule = RewardSchedule::new(Amount::from_coins(50), 0);
        assert_eq!(schedule.reward_at(1_000_000), Amount::from_coins(50));
    }

    #[test]
    fn test_default_schedule() {
        let schedule = RewardSchedule::default();
        assert_eq!(schedule.reward_at(209_999), Amount::from_coins(50));
        assert_eq!(schedule.reward_at(210_000), Amount::from_coins(25));
    }

    #[test]
    fn test_issued_through() {
        let schedule = RewardSchedule::new(Amount::from_coins(50), 2);
        assert_eq!(schedule.issued_through(0), Amount::ZERO);
        // heights 1 (50), 2 (25), 3 (25)
        assert_eq!(schedule.issued_through(3), Amount::from_coins(100));
    }
}
