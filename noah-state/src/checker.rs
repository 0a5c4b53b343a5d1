// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Block level conservation check.
//!
//! Every module reports the coin it takes in or hands out (`add_coin`) and every change of a
//! coin supply (`add_coin_volume`). At the end of a block, for every custom coin, the amount
//! that moved between holders must match the change of its volume.

use crate::error::{StateError, StateResult};
use noah_models::{Amount, CoinId};
use num::{BigInt, Zero};
use std::collections::{BTreeMap, BTreeSet};

/// Signed delta of a positive amount
pub fn plus(value: &Amount) -> BigInt {
    BigInt::from(value.as_biguint().clone())
}

/// Signed delta of a negative amount
pub fn minus(value: &Amount) -> BigInt {
    -plus(value)
}

/// Signed deltas accumulated since the last reset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checker {
    delta: BTreeMap<CoinId, BigInt>,
    volume_delta: BTreeMap<CoinId, BigInt>,
}

impl Checker {
    /// Creates an empty checker
    pub fn new() -> Self {
        Self::default()
    }

    /// Records coins entering (positive) or leaving (negative) a holder
    pub fn add_coin(&mut self, coin: CoinId, delta: BigInt) {
        if delta.is_zero() {
            return;
        }
        *self.delta.entry(coin).or_default() += delta;
    }

    /// Records a change of a coin volume
    pub fn add_coin_volume(&mut self, coin: CoinId, delta: BigInt) {
        if delta.is_zero() {
            return;
        }
        *self.volume_delta.entry(coin).or_default() += delta;
    }

    /// Folds the deltas of another checker into this one
    pub fn merge(&mut self, other: &Checker) {
        for (coin, delta) in &other.delta {
            self.add_coin(*coin, delta.clone());
        }
        for (coin, delta) in &other.volume_delta {
            self.add_coin_volume(*coin, delta.clone());
        }
    }

    /// Forgets every delta
    pub fn reset(&mut self) {
        self.delta.clear();
        self.volume_delta.clear();
    }

    /// Forgets the base coin deltas, its issuance is not tracked
    pub fn remove_base_coin(&mut self) {
        self.delta.remove(&CoinId::BASE);
        self.volume_delta.remove(&CoinId::BASE);
    }

    /// Net movement of a coin between holders
    pub fn get_delta(&self, coin: CoinId) -> BigInt {
        self.delta.get(&coin).cloned().unwrap_or_default()
    }

    /// Net change of a coin volume
    pub fn get_volume_delta(&self, coin: CoinId) -> BigInt {
        self.volume_delta.get(&coin).cloned().unwrap_or_default()
    }

    /// Fails on the first custom coin whose holdings moved differently from its volume
    pub fn check(&self) -> StateResult<()> {
        let coins: BTreeSet<CoinId> = self
            .delta
            .keys()
            .chain(self.volume_delta.keys())
            .copied()
            .filter(|coin| !coin.is_base())
            .collect();
        for coin in coins {
            let delta = self.get_delta(coin);
            let volume_delta = self.get_volume_delta(coin);
            if delta != volume_delta {
                return Err(StateError::CheckerError(format!(
                    "coin {} moved {} but its volume changed by {}",
                    coin, delta, volume_delta
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_balanced_deltas_pass() {
        let mut checker = Checker::new();
        let coin = CoinId(1);
        checker.add_coin_volume(coin, plus(&Amount::from_u64(100)));
        checker.add_coin(coin, plus(&Amount::from_u64(60)));
        checker.add_coin(coin, plus(&Amount::from_u64(40)));
        // base coin is never checked
        checker.add_coin(CoinId::BASE, plus(&Amount::from_u64(5)));
        assert!(checker.check().is_ok());
    }

    #[test]
    fn test_mismatch_names_the_coin() {
        let mut checker = Checker::new();
        checker.add_coin_volume(CoinId(3), plus(&Amount::from_u64(10)));
        let mut other = Checker::new();
        other.add_coin(CoinId(3), minus(&Amount::from_u64(10)));
        checker.merge(&other);
        assert_matches!(checker.check(), Err(StateError::CheckerError(msg)) if msg.contains("coin 3"));
        checker.reset();
        assert!(checker.check().is_ok());
    }
}
