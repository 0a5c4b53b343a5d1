// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Conversions between coins through their bonding curves. A conversion between two custom
//! coins goes through the base coin: the first coin is sold into its reserve, the proceeds buy
//! the second one.

use super::{ensure_coin, price_commission, settle, StateAccess, Tag, TxContext};
use crate::error::{ExecutionError, ExecutionResult};
use crate::spend::{Exchange, Spends};
use noah_models::transaction::TxType;
use noah_models::{Amount, CoinId};
use noah_state::bus::AccountsBus;
use noah_state::State;

fn check_pair(state: &State, coin_to_sell: CoinId, coin_to_buy: CoinId) -> ExecutionResult<()> {
    if coin_to_sell == coin_to_buy {
        return Err(ExecutionError::CrossConvert(coin_to_sell));
    }
    ensure_coin(state, coin_to_sell)?;
    ensure_coin(state, coin_to_buy)
}

fn conversion_tags(
    ctx: &TxContext<'_>,
    tx_type: TxType,
    coin_to_sell: CoinId,
    coin_to_buy: CoinId,
    value: &Amount,
) -> Vec<Tag> {
    let mut tags = ctx.tags(tx_type);
    tags.push(Tag::new("tx.coin_to_buy", coin_to_buy.to_string()));
    tags.push(Tag::new("tx.coin_to_sell", coin_to_sell.to_string()));
    tags.push(Tag::new("tx.return", value.to_string()));
    tags
}

/// Sells an exact amount
pub(super) fn sell(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    coin_to_sell: CoinId,
    value_to_sell: &Amount,
    coin_to_buy: CoinId,
    minimum_value_to_buy: &Amount,
) -> ExecutionResult<Vec<Tag>> {
    check_pair(state, coin_to_sell, coin_to_buy)?;
    let (mut exchange, commission, mut spends) = price_commission(state, ctx)?;
    let value = if coin_to_sell.is_base() {
        exchange.buy(&state.coins, coin_to_buy, value_to_sell)?
    } else if coin_to_buy.is_base() {
        exchange.sell(&state.coins, coin_to_sell, value_to_sell)?
    } else {
        let base = exchange.sell(&state.coins, coin_to_sell, value_to_sell)?;
        exchange.buy(&state.coins, coin_to_buy, &base)?
    };
    if value < *minimum_value_to_buy {
        return Err(ExecutionError::MinimumValueToBuyReached {
            minimum: minimum_value_to_buy.clone(),
            got: value,
        });
    }
    spends.add(coin_to_sell, value_to_sell);
    spends.check(&state.accounts, &ctx.sender)?;

    let tags = conversion_tags(ctx, TxType::SellCoin, coin_to_sell, coin_to_buy, &value);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };
    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    state.accounts.add_balance(&ctx.sender, coin_to_buy, &value);
    Ok(tags)
}

/// Sells the whole balance of a coin. The commission is taken from the proceeds in base coin,
/// whatever the gas coin of the transaction.
pub(super) fn sell_all(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    coin_to_sell: CoinId,
    coin_to_buy: CoinId,
    minimum_value_to_buy: &Amount,
) -> ExecutionResult<Vec<Tag>> {
    check_pair(state, coin_to_sell, coin_to_buy)?;
    let available = state.accounts.get_balance(&ctx.sender, coin_to_sell);
    let commission = ctx.tx.commission_in_base_coin();
    let not_enough = || ExecutionError::InsufficientFunds {
        address: ctx.sender,
        coin: CoinId::BASE,
        needed: commission.clone(),
    };

    let mut exchange = Exchange::new();
    let value = if coin_to_sell.is_base() {
        let to_sell = available.checked_sub(&commission).ok_or_else(not_enough)?;
        exchange.buy(&state.coins, coin_to_buy, &to_sell)?
    } else {
        let base = exchange.sell(&state.coins, coin_to_sell, &available)?;
        let base = base.checked_sub(&commission).ok_or_else(not_enough)?;
        if coin_to_buy.is_base() {
            base
        } else {
            exchange.buy(&state.coins, coin_to_buy, &base)?
        }
    };
    if value < *minimum_value_to_buy {
        return Err(ExecutionError::MinimumValueToBuyReached {
            minimum: minimum_value_to_buy.clone(),
            got: value,
        });
    }
    let mut spends = Spends::new();
    spends.add(coin_to_sell, &available);

    let mut tags = conversion_tags(ctx, TxType::SellAllCoin, coin_to_sell, coin_to_buy, &value);
    tags.push(Tag::new("tx.sell_amount", available.to_string()));
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };
    settle(state, ctx, exchange, spends, &commission, reward_pool)?;
    state.accounts.add_balance(&ctx.sender, coin_to_buy, &value);
    Ok(tags)
}

/// Buys an exact amount
pub(super) fn buy(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    coin_to_buy: CoinId,
    value_to_buy: &Amount,
    coin_to_sell: CoinId,
    maximum_value_to_sell: &Amount,
) -> ExecutionResult<Vec<Tag>> {
    check_pair(state, coin_to_sell, coin_to_buy)?;
    let (mut exchange, commission, mut spends) = price_commission(state, ctx)?;
    let needed = if coin_to_sell.is_base() {
        exchange.buy_exact(&state.coins, coin_to_buy, value_to_buy)?
    } else if coin_to_buy.is_base() {
        exchange.sell_for_exact(&state.coins, coin_to_sell, value_to_buy)?
    } else {
        let base = exchange.buy_exact(&state.coins, coin_to_buy, value_to_buy)?;
        exchange.sell_for_exact(&state.coins, coin_to_sell, &base)?
    };
    if needed > *maximum_value_to_sell {
        return Err(ExecutionError::MaximumValueToSellReached {
            maximum: maximum_value_to_sell.clone(),
            needed,
        });
    }
    spends.add(coin_to_sell, &needed);
    spends.check(&state.accounts, &ctx.sender)?;

    let tags = conversion_tags(ctx, TxType::BuyCoin, coin_to_sell, coin_to_buy, &needed);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };
    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    state.accounts.add_balance(&ctx.sender, coin_to_buy, value_to_buy);
    Ok(tags)
}
