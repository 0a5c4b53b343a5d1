// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! One handler per transaction type.
//!
//! Every handler follows the same steps. It validates the data against the state, then prices
//! the commission and the curve moves with an `Exchange`, then checks the sender balances. In
//! check mode it stops there, having only read the state. Otherwise it settles the commission
//! and applies its own mutations.

mod candidacy;
mod convert;
mod create_coin;
mod multisend;
mod send;
mod staking;

use crate::error::{ExecutionError, ExecutionResult};
use crate::spend::{Commission, Exchange, Spends};
use noah_models::transaction::{Transaction, TransactionData, TxType};
use noah_models::{Address, Amount, CoinId, Pubkey};
use noah_state::bus::CandidatesBus;
use noah_state::candidates::Candidate;
use noah_state::State;
use std::ops::Deref;

/// Key/value attached to an applied transaction, indexed by the consensus engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: &'static str,
    pub value: String,
}

impl Tag {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Tag {
            key,
            value: value.into(),
        }
    }
}

/// What a handler knows about the transaction it runs
pub(crate) struct TxContext<'a> {
    pub tx: &'a Transaction,
    pub sender: Address,
    pub height: u64,
}

impl TxContext<'_> {
    /// Tags every applied transaction carries
    fn tags(&self, tx_type: TxType) -> Vec<Tag> {
        vec![
            Tag::new("tx.type", hex::encode([u8::from(tx_type)])),
            Tag::new("tx.from", hex::encode(self.sender.to_bytes())),
        ]
    }
}

/// State a handler runs against. A check only reads it, so it can run on a shared borrow.
pub(crate) enum StateAccess<'a> {
    Check(&'a State),
    Deliver(&'a mut State),
}

impl StateAccess<'_> {
    /// Mutable state, `None` in check mode
    pub fn deliver(&mut self) -> Option<&mut State> {
        match self {
            StateAccess::Check(_) => None,
            StateAccess::Deliver(state) => Some(&mut **state),
        }
    }
}

impl Deref for StateAccess<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        match self {
            StateAccess::Check(state) => *state,
            StateAccess::Deliver(state) => &**state,
        }
    }
}

/// Applies a transaction with a handler
#[cfg(test)]
pub(crate) fn run(
    state: &mut State,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
) -> ExecutionResult<Vec<Tag>> {
    dispatch(&mut StateAccess::Deliver(state), ctx, reward_pool)
}

/// Runs the handler of the transaction type
pub(crate) fn dispatch(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
) -> ExecutionResult<Vec<Tag>> {
    match &ctx.tx.data {
        TransactionData::Send { coin, to, value } => {
            send::run(state, ctx, reward_pool, *coin, to, value)
        }
        TransactionData::SellCoin {
            coin_to_sell,
            value_to_sell,
            coin_to_buy,
            minimum_value_to_buy,
        } => convert::sell(
            state,
            ctx,
            reward_pool,
            *coin_to_sell,
            value_to_sell,
            *coin_to_buy,
            minimum_value_to_buy,
        ),
        TransactionData::SellAllCoin {
            coin_to_sell,
            coin_to_buy,
            minimum_value_to_buy,
        } => convert::sell_all(
            state,
            ctx,
            reward_pool,
            *coin_to_sell,
            *coin_to_buy,
            minimum_value_to_buy,
        ),
        TransactionData::BuyCoin {
            coin_to_buy,
            value_to_buy,
            coin_to_sell,
            maximum_value_to_sell,
        } => convert::buy(
            state,
            ctx,
            reward_pool,
            *coin_to_buy,
            value_to_buy,
            *coin_to_sell,
            maximum_value_to_sell,
        ),
        TransactionData::CreateCoin {
            name,
            symbol,
            initial_amount,
            initial_reserve,
            crr,
            max_supply,
        } => create_coin::run(
            state,
            ctx,
            reward_pool,
            create_coin::CreateCoinArgs {
                name,
                symbol,
                initial_amount,
                initial_reserve,
                crr: *crr,
                max_supply,
            },
        ),
        TransactionData::DeclareCandidacy {
            address,
            pub_key,
            commission,
            coin,
            stake,
        } => candidacy::declare(
            state,
            ctx,
            reward_pool,
            *address,
            *pub_key,
            *commission,
            *coin,
            stake,
        ),
        TransactionData::Delegate {
            pub_key,
            coin,
            value,
        } => staking::delegate(state, ctx, reward_pool, pub_key, *coin, value),
        TransactionData::Unbond {
            pub_key,
            coin,
            value,
        } => staking::unbond(state, ctx, reward_pool, pub_key, *coin, value),
        TransactionData::SetCandidateOnline { pub_key } => {
            candidacy::set_status(state, ctx, reward_pool, pub_key, true)
        }
        TransactionData::SetCandidateOffline { pub_key } => {
            candidacy::set_status(state, ctx, reward_pool, pub_key, false)
        }
        TransactionData::MultiSend { list } => multisend::run(state, ctx, reward_pool, list),
        TransactionData::EditCandidate {
            pub_key,
            reward_address,
            owner_address,
            control_address,
        } => candidacy::edit(
            state,
            ctx,
            reward_pool,
            pub_key,
            *reward_address,
            *owner_address,
            *control_address,
        ),
        TransactionData::EditCandidatePublicKey {
            pub_key,
            new_pub_key,
        } => candidacy::change_pubkey(state, ctx, reward_pool, pub_key, *new_pub_key),
        TransactionData::SetHaltBlock { pub_key, height } => {
            candidacy::set_halt_block(state, ctx, reward_pool, pub_key, *height)
        }
    }
}

fn ensure_coin(state: &State, coin: CoinId) -> ExecutionResult<()> {
    if state.coins.exists_id(coin) {
        Ok(())
    } else {
        Err(ExecutionError::CoinNotExists(coin))
    }
}

fn get_candidate<'a>(state: &'a State, pub_key: &Pubkey) -> ExecutionResult<&'a Candidate> {
    state
        .candidates
        .get_candidate(pub_key)
        .ok_or(ExecutionError::CandidateNotFound(*pub_key))
}

/// Prices the commission and starts the spends of the sender with it
fn price_commission(
    state: &State,
    ctx: &TxContext<'_>,
) -> ExecutionResult<(Exchange, Commission, Spends)> {
    let mut exchange = Exchange::new();
    let commission = Commission::compute(&mut exchange, &state.coins, ctx.tx)?;
    let mut spends = Spends::new();
    spends.add(commission.coin, &commission.value);
    Ok((exchange, commission, spends))
}

/// Writes the curve moves, debits the sender and credits the reward pool with the base coin
/// value of the commission
fn settle(
    state: &mut State,
    ctx: &TxContext<'_>,
    exchange: Exchange,
    spends: Spends,
    commission: &Amount,
    reward_pool: &mut Amount,
) -> ExecutionResult<()> {
    exchange.apply(&mut state.coins)?;
    spends.apply(&mut state.accounts, &ctx.sender)?;
    *reward_pool += commission;
    Ok(())
}

