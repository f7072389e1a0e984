//! Fixed-precision coin amounts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Base units per whole coin (8 decimal places).
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// A non-negative amount of value, counted in base units.
///
/// Ledger arithmetic is checked and never wraps. `saturating_add` exists
/// for reporting totals only.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    /// Create an amount from base units.
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Create an amount from whole coins.
    pub const fn from_coins(coins: u64) -> Self {
        Self(coins * UNITS_PER_COIN)
    }

    /// Get the amount in base units.
    pub const fn units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Divide by `2^times`, flooring to the base unit. Zero past 63 halvings.
    pub fn halved(self, times: u64) -> Self {
        if times >= u64::BITS as u64 {
            return Self::ZERO;
        }
        Self(self.0 >> times)
    }

    /// Sum a sequence of amounts, `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:08}",
            self.0 / UNITS_PER_COIN,
            self.0 % UNITS_PER_COIN
        )
    }
}
