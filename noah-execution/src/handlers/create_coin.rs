// Copyright (c) 2022 MASSA LABS <info@massa.net>

use super::{price_commission, settle, StateAccess, Tag, TxContext};
use crate::error::{ExecutionError, ExecutionResult};
use noah_models::config::constants::{
    MAX_COIN_NAME_BYTES, MAX_COIN_SUPPLY, MAX_CRR, MIN_COIN_RESERVE, MIN_COIN_SUPPLY, MIN_CRR,
};
use noah_models::transaction::TxType;
use noah_models::{Amount, CoinId, CoinSymbol};
use noah_state::bus::AccountsBus;
use noah_state::State;
use tracing::info;

pub(super) struct CreateCoinArgs<'a> {
    pub name: &'a str,
    pub symbol: &'a CoinSymbol,
    pub initial_amount: &'a Amount,
    pub initial_reserve: &'a Amount,
    pub crr: u32,
    pub max_supply: &'a Amount,
}

fn validate(state: &State, args: &CreateCoinArgs<'_>) -> ExecutionResult<()> {
    if args.name.len() > MAX_COIN_NAME_BYTES {
        return Err(ExecutionError::InvalidCoinName(MAX_COIN_NAME_BYTES));
    }
    if *args.symbol == CoinSymbol::base() {
        return Err(ExecutionError::InvalidCoinSymbol(args.symbol.clone()));
    }
    if state.coins.get_by_symbol(args.symbol).is_some() {
        return Err(ExecutionError::CoinAlreadyExists(args.symbol.clone()));
    }
    if !(MIN_CRR..=MAX_CRR).contains(&args.crr) {
        return Err(ExecutionError::WrongCrr(args.crr));
    }
    if *args.max_supply > *MAX_COIN_SUPPLY {
        return Err(ExecutionError::WrongCoinSupply(format!(
            "max supply should be at most {}",
            *MAX_COIN_SUPPLY
        )));
    }
    if *args.initial_amount < *MIN_COIN_SUPPLY || args.initial_amount > args.max_supply {
        return Err(ExecutionError::WrongCoinSupply(format!(
            "supply should be between {} and {}",
            *MIN_COIN_SUPPLY, args.max_supply
        )));
    }
    if *args.initial_reserve < *MIN_COIN_RESERVE {
        return Err(ExecutionError::WrongCoinSupply(format!(
            "reserve should be at least {}",
            *MIN_COIN_RESERVE
        )));
    }
    Ok(())
}

/// Creates a coin under the next identifier. The sender pays the reserve in base coin and
/// receives the initial supply.
pub(super) fn run(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    args: CreateCoinArgs<'_>,
) -> ExecutionResult<Vec<Tag>> {
    validate(state, &args)?;
    let (exchange, commission, mut spends) = price_commission(state, ctx)?;
    spends.add(CoinId::BASE, args.initial_reserve);
    spends.check(&state.accounts, &ctx.sender)?;

    let id = state.app.get_next_coin_id();
    let mut tags = ctx.tags(TxType::CreateCoin);
    tags.push(Tag::new("tx.coin", args.symbol.to_string()));
    tags.push(Tag::new("tx.coin_id", id.to_string()));
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    state.coins.create(
        id,
        args.symbol.clone(),
        args.name.to_string(),
        args.initial_amount.clone(),
        args.crr,
        args.initial_reserve.clone(),
        args.max_supply.clone(),
        None,
    )?;
    state.app.set_coins_count(id.0);
    state
        .accounts
        .add_balance(&ctx.sender, id, args.initial_amount);
    info!("coin {} created as {} by {}", args.symbol, id, ctx.sender);
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use crate::error::ExecutionError;
    use crate::handlers::{run, TxContext};
    use crate::test_tools::{address, open_state};
    use assert_matches::assert_matches;
    use noah_models::transaction::{Transaction, TransactionData};
    use noah_models::{Amount, CoinId, CoinSymbol};
    use noah_state::bus::{AccountsBus, CoinsBus};
    use noah_state::State;

    fn create_tx(symbol: &str, crr: u32) -> Transaction {
        Transaction {
            nonce: 1,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data: TransactionData::CreateCoin {
                name: "My coin".to_string(),
                symbol: CoinSymbol::new(symbol).unwrap(),
                initial_amount: Amount::from_noah(1_000_000),
                initial_reserve: Amount::from_noah(300_000),
                crr,
                max_supply: Amount::from_noah(10_000_000),
            },
            payload: Vec::new(),
        }
    }

    fn apply(state: &mut State, tx: &Transaction) -> Result<(), ExecutionError> {
        let ctx = TxContext {
            tx,
            sender: address(1),
            height: 1,
        };
        run(state, &ctx, &mut Amount::zero()).map(|_| ())
    }

    #[test]
    fn test_create_coin() {
        let (_dir, mut state) = open_state();
        // a seven letter symbol costs 100 000 gas, 100 base coins at gas price 1
        state
            .accounts
            .add_balance(&address(1), CoinId::BASE, &Amount::from_noah(300_100));
        apply(&mut state, &create_tx("MYCOINS", 50)).unwrap();

        let coin = state.coins.get_coin(CoinId(1)).unwrap();
        assert_eq!(coin.reserve, Amount::from_noah(300_000));
        assert_eq!(coin.crr, 50);
        assert_eq!(state.app.get_coins_count(), 1);
        assert_eq!(
            state.accounts.get_balance(&address(1), CoinId(1)),
            Amount::from_noah(1_000_000)
        );
        assert!(state.accounts.get_balance(&address(1), CoinId::BASE).is_zero());
        state.check().unwrap();

        assert_matches!(
            apply(&mut state, &create_tx("MYCOINS", 50)),
            Err(ExecutionError::CoinAlreadyExists(_))
        );
    }

    #[test]
    fn test_create_coin_bounds() {
        let (_dir, mut state) = open_state();
        state
            .accounts
            .add_balance(&address(1), CoinId::BASE, &Amount::from_noah(1_000_000));
        assert_matches!(
            apply(&mut state, &create_tx("MYCOINS", 5)),
            Err(ExecutionError::WrongCrr(5))
        );
        assert_matches!(
            apply(&mut state, &create_tx("NOAH", 50)),
            Err(ExecutionError::InvalidCoinSymbol(_))
        );
        let mut tx = create_tx("MYCOINS", 50);
        if let TransactionData::CreateCoin {
            initial_reserve, ..
        } = &mut tx.data
        {
            *initial_reserve = Amount::from_noah(1000);
        }
        assert_matches!(
            apply(&mut state, &tx),
            Err(ExecutionError::WrongCoinSupply(_))
        );
        assert!(state.coins.get_coin(CoinId(1)).is_none());
    }
}
