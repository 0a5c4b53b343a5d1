// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Pricing of a transaction before it touches the state.
//!
//! Curve moves are computed on working copies of the coins: the commission conversion first,
//! then the moves of the handler, each on the curve left by the previous one. `Spends` sums
//! what the sender pays per coin. Nothing is written until both are known to be valid, so a
//! rejected transaction leaves the state untouched.

use crate::error::{ExecutionError, ExecutionResult};
use noah_models::config::constants::MIN_COIN_RESERVE;
use noah_models::transaction::Transaction;
use noah_models::{Address, Amount, CoinId};
use noah_state::bus::{AccountsBus, CoinsBus};
use noah_state::coins::Coin;
use noah_state::formula::{
    calculate_purchase_amount, calculate_purchase_return, calculate_sale_amount,
    calculate_sale_return,
};
use noah_state::StateResult;
use std::collections::BTreeMap;

/// Working copies of the coins a transaction converts through
#[derive(Default)]
pub(crate) struct Exchange {
    /// (state at load, working copy)
    touched: BTreeMap<CoinId, (Coin, Coin)>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn coin(&mut self, coins: &dyn CoinsBus, id: CoinId) -> ExecutionResult<&mut Coin> {
        if !self.touched.contains_key(&id) {
            let coin = coins.get_coin(id).ok_or(ExecutionError::CoinNotExists(id))?;
            self.touched.insert(id, (coin.clone(), coin));
        }
        match self.touched.get_mut(&id) {
            Some((_, working)) => Ok(working),
            None => Err(ExecutionError::CoinNotExists(id)),
        }
    }

    /// Burns `amount` of a custom coin, returns the base coin taken from the reserve
    pub fn sell(
        &mut self,
        coins: &dyn CoinsBus,
        id: CoinId,
        amount: &Amount,
    ) -> ExecutionResult<Amount> {
        let coin = self.coin(coins, id)?;
        let ret = calculate_sale_return(&coin.volume, &coin.reserve, coin.crr, amount);
        take_from_reserve(coin, amount, &ret)?;
        Ok(ret)
    }

    /// Burns what it takes of a custom coin to free exactly `base` from the reserve, returns
    /// the burnt amount
    pub fn sell_for_exact(
        &mut self,
        coins: &dyn CoinsBus,
        id: CoinId,
        base: &Amount,
    ) -> ExecutionResult<Amount> {
        let coin = self.coin(coins, id)?;
        let amount = calculate_sale_amount(&coin.volume, &coin.reserve, coin.crr, base).ok_or_else(
            || ExecutionError::CoinReserveNotSufficient {
                coin: id,
                has: coin.reserve.clone(),
                required: base.clone(),
            },
        )?;
        take_from_reserve(coin, &amount, base)?;
        Ok(amount)
    }

    /// Mints a custom coin against `base` added to the reserve, returns the minted amount
    pub fn buy(
        &mut self,
        coins: &dyn CoinsBus,
        id: CoinId,
        base: &Amount,
    ) -> ExecutionResult<Amount> {
        let coin = self.coin(coins, id)?;
        let amount = calculate_purchase_return(&coin.volume, &coin.reserve, coin.crr, base);
        add_to_reserve(coin, &amount, base)?;
        Ok(amount)
    }

    /// Mints exactly `amount` of a custom coin, returns the base coin it costs
    pub fn buy_exact(
        &mut self,
        coins: &dyn CoinsBus,
        id: CoinId,
        amount: &Amount,
    ) -> ExecutionResult<Amount> {
        let coin = self.coin(coins, id)?;
        let base = calculate_purchase_amount(&coin.volume, &coin.reserve, coin.crr, amount);
        add_to_reserve(coin, amount, &base)?;
        Ok(base)
    }

    /// Writes the net move of every touched curve
    pub fn apply(self, coins: &mut dyn CoinsBus) -> StateResult<()> {
        for (id, (loaded, working)) in self.touched {
            if working.volume > loaded.volume {
                coins.add_volume(id, &working.volume.saturating_sub(&loaded.volume))?;
            } else if working.volume < loaded.volume {
                coins.sub_volume(id, &loaded.volume.saturating_sub(&working.volume))?;
            }
            if working.reserve > loaded.reserve {
                coins.add_reserve(id, &working.reserve.saturating_sub(&loaded.reserve))?;
            } else if working.reserve < loaded.reserve {
                coins.sub_reserve(id, &loaded.reserve.saturating_sub(&working.reserve))?;
            }
        }
        Ok(())
    }
}

fn take_from_reserve(coin: &mut Coin, amount: &Amount, base: &Amount) -> ExecutionResult<()> {
    let reserve = coin.reserve.checked_sub(base).ok_or_else(|| {
        ExecutionError::CoinReserveNotSufficient {
            coin: coin.id,
            has: coin.reserve.clone(),
            required: base.clone(),
        }
    })?;
    if reserve < *MIN_COIN_RESERVE {
        return Err(ExecutionError::CoinReserveUnderflow(coin.id));
    }
    let volume = coin
        .volume
        .checked_sub(amount)
        .ok_or(ExecutionError::CoinReserveUnderflow(coin.id))?;
    coin.reserve = reserve;
    coin.volume = volume;
    Ok(())
}

fn add_to_reserve(coin: &mut Coin, amount: &Amount, base: &Amount) -> ExecutionResult<()> {
    let volume = &coin.volume + amount;
    if volume > coin.max_supply {
        return Err(ExecutionError::CoinSupplyOverflow(coin.id));
    }
    coin.volume = volume;
    coin.reserve += base;
    Ok(())
}

/// Commission of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Commission {
    pub coin: CoinId,
    /// paid by the sender, in `coin`
    pub value: Amount,
    /// credited to the reward pool
    pub base_value: Amount,
}

impl Commission {
    /// Prices the commission of `tx`. A custom gas coin is sold into its curve for the exact
    /// base amount.
    pub fn compute(
        exchange: &mut Exchange,
        coins: &dyn CoinsBus,
        tx: &Transaction,
    ) -> ExecutionResult<Self> {
        let base_value = tx.commission_in_base_coin();
        let value = if tx.gas_coin.is_base() {
            base_value.clone()
        } else {
            exchange.sell_for_exact(coins, tx.gas_coin, &base_value)?
        };
        Ok(Commission {
            coin: tx.gas_coin,
            value,
            base_value,
        })
    }
}

/// Amounts a sender pays, per coin
#[derive(Debug, Default)]
pub(crate) struct Spends(BTreeMap<CoinId, Amount>);

impl Spends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, coin: CoinId, value: &Amount) {
        *self.0.entry(coin).or_default() += value;
    }

    /// Fails on the first coin the sender cannot cover
    pub fn check(&self, accounts: &dyn AccountsBus, sender: &Address) -> ExecutionResult<()> {
        for (coin, needed) in &self.0 {
            if accounts.get_balance(sender, *coin) < *needed {
                return Err(ExecutionError::InsufficientFunds {
                    address: *sender,
                    coin: *coin,
                    needed: needed.clone(),
                });
            }
        }
        Ok(())
    }

    /// Debits the sender
    pub fn apply(self, accounts: &mut dyn AccountsBus, sender: &Address) -> StateResult<()> {
        for (coin, value) in self.0 {
            if !value.is_zero() {
                accounts.sub_balance(sender, coin, &value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use noah_models::CoinSymbol;
    use noah_state::bus::MockCoinsBus;

    fn coin(id: u32, volume: u64, reserve: u64, crr: u32) -> Coin {
        Coin {
            id: CoinId(id),
            name: "Test".to_string(),
            symbol: CoinSymbol::new("TEST").unwrap(),
            crr,
            volume: Amount::from_noah(volume),
            reserve: Amount::from_noah(reserve),
            max_supply: Amount::from_noah(10_000_000),
            version: 0,
        }
    }

    fn coins_mock(coin: Coin) -> MockCoinsBus {
        let mut coins = MockCoinsBus::new();
        coins
            .expect_get_coin()
            .returning(move |id| (id == coin.id).then(|| coin.clone()));
        coins
    }

    #[test]
    fn test_moves_are_chained_and_netted() {
        let mut coins = coins_mock(coin(1, 1_000_000, 1_000_000, 100));
        let mut exchange = Exchange::new();
        let minted = exchange
            .buy(&coins, CoinId(1), &Amount::from_noah(1000))
            .unwrap();
        assert_eq!(minted, Amount::from_noah(1000));
        let burnt = exchange
            .sell_for_exact(&coins, CoinId(1), &Amount::from_noah(400))
            .unwrap();
        assert_eq!(burnt, Amount::from_noah(400));

        // only the net move of 600 reaches the state
        coins
            .expect_add_volume()
            .withf(|id, value| *id == CoinId(1) && *value == Amount::from_noah(600))
            .times(1)
            .returning(|_, _| Ok(()));
        coins
            .expect_add_reserve()
            .withf(|id, value| *id == CoinId(1) && *value == Amount::from_noah(600))
            .times(1)
            .returning(|_, _| Ok(()));
        exchange.apply(&mut coins).unwrap();
    }

    #[test]
    fn test_reserve_guards() {
        let coins = coins_mock(coin(1, 1_000_000, 300_000, 100));
        let mut exchange = Exchange::new();
        assert_matches!(
            exchange.sell_for_exact(&coins, CoinId(1), &Amount::from_noah(400_000)),
            Err(ExecutionError::CoinReserveNotSufficient { .. })
        );
        assert_matches!(
            exchange.sell(&coins, CoinId(1), &Amount::from_noah(500_000)),
            Err(ExecutionError::CoinReserveUnderflow(_))
        );
        assert_matches!(
            exchange.buy_exact(&coins, CoinId(1), &Amount::from_noah(9_500_000)),
            Err(ExecutionError::CoinSupplyOverflow(_))
        );
        assert_matches!(
            exchange.buy(&coins, CoinId(2), &Amount::from_noah(1)),
            Err(ExecutionError::CoinNotExists(_))
        );
    }
}
