// Copyright (c) 2022 MASSA LABS <info@massa.net>

use super::{ensure_coin, price_commission, settle, StateAccess, Tag, TxContext};
use crate::error::ExecutionResult;
use noah_models::transaction::TxType;
use noah_models::{Address, Amount, CoinId};
use noah_state::bus::AccountsBus;

pub(super) fn run(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    coin: CoinId,
    to: &Address,
    value: &Amount,
) -> ExecutionResult<Vec<Tag>> {
    ensure_coin(state, coin)?;
    let (exchange, commission, mut spends) = price_commission(state, ctx)?;
    spends.add(coin, value);
    spends.check(&state.accounts, &ctx.sender)?;

    let mut tags = ctx.tags(TxType::Send);
    tags.push(Tag::new("tx.to", hex::encode(to.to_bytes())));
    tags.push(Tag::new("tx.coin", coin.to_string()));
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    state.accounts.add_balance(to, coin, value);
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use crate::error::ExecutionError;
    use crate::handlers::{run, TxContext};
    use crate::test_tools::{address, open_state};
    use assert_matches::assert_matches;
    use noah_models::transaction::{Transaction, TransactionData};
    use noah_models::{Amount, CoinId};
    use noah_state::bus::AccountsBus;

    fn send_tx(value: u64) -> Transaction {
        Transaction {
            nonce: 1,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data: TransactionData::Send {
                coin: CoinId::BASE,
                to: address(2),
                value: Amount::from_noah(value),
            },
            payload: Vec::new(),
        }
    }

    #[test]
    fn test_send_moves_value_and_commission() {
        let (_dir, mut state) = open_state();
        let sender = address(1);
        state
            .accounts
            .add_balance(&sender, CoinId::BASE, &Amount::from_noah(100));
        let tx = send_tx(10);
        let ctx = TxContext {
            tx: &tx,
            sender,
            height: 1,
        };
        let mut pool = Amount::zero();
        let tags = run(&mut state, &ctx, &mut pool).unwrap();
        assert_eq!(tags[0].value, "01");

        // 10 gas at price 1 costs 0.01
        assert_eq!(pool, Amount::from_u64(10_000_000_000_000_000));
        assert_eq!(
            state.accounts.get_balance(&address(2), CoinId::BASE),
            Amount::from_noah(10)
        );
        assert_eq!(
            state.accounts.get_balance(&sender, CoinId::BASE),
            &Amount::from_noah(89) + &Amount::from_u64(990_000_000_000_000_000)
        );
    }

    #[test]
    fn test_send_without_funds_changes_nothing() {
        let (_dir, mut state) = open_state();
        let sender = address(1);
        state
            .accounts
            .add_balance(&sender, CoinId::BASE, &Amount::from_noah(10));
        let tx = send_tx(10);
        let ctx = TxContext {
            tx: &tx,
            sender,
            height: 1,
        };
        let mut pool = Amount::zero();
        assert_matches!(
            run(&mut state, &ctx, &mut pool),
            Err(ExecutionError::InsufficientFunds { .. })
        );
        assert!(pool.is_zero());
        assert_eq!(
            state.accounts.get_balance(&sender, CoinId::BASE),
            Amount::from_noah(10)
        );
    }

    #[test]
    fn test_send_unknown_coin() {
        let (_dir, mut state) = open_state();
        let mut tx = send_tx(1);
        tx.data = TransactionData::Send {
            coin: CoinId(7),
            to: address(2),
            value: Amount::from_noah(1),
        };
        let ctx = TxContext {
            tx: &tx,
            sender: address(1),
            height: 1,
        };
        assert_matches!(
            run(&mut state, &ctx, &mut Amount::zero()),
            Err(ExecutionError::CoinNotExists(CoinId(7)))
        );
    }
}
