// Copyright (c) 2022 MASSA LABS <info@massa.net>

use super::{ensure_coin, price_commission, settle, StateAccess, Tag, TxContext};
use crate::error::{ExecutionError, ExecutionResult};
use noah_models::config::constants::MAX_MULTISEND_ITEMS;
use noah_models::transaction::{MultiSendItem, TxType};
use noah_models::Amount;
use noah_state::bus::AccountsBus;

pub(super) fn run(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    list: &[MultiSendItem],
) -> ExecutionResult<Vec<Tag>> {
    if list.is_empty() || list.len() > MAX_MULTISEND_ITEMS {
        return Err(ExecutionError::InvalidMultisendData(format!(
            "{} recipients, expected 1 to {}",
            list.len(),
            MAX_MULTISEND_ITEMS
        )));
    }
    for item in list {
        ensure_coin(state, item.coin)?;
    }
    let (exchange, commission, mut spends) = price_commission(state, ctx)?;
    for item in list {
        spends.add(item.coin, &item.value);
    }
    spends.check(&state.accounts, &ctx.sender)?;

    let mut tags = ctx.tags(TxType::MultiSend);
    let recipients: Vec<String> = list
        .iter()
        .map(|item| hex::encode(item.to.to_bytes()))
        .collect();
    tags.push(Tag::new("tx.to", recipients.join(",")));
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    for item in list {
        state.accounts.add_balance(&item.to, item.coin, &item.value);
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use crate::error::ExecutionError;
    use crate::handlers::{run, TxContext};
    use crate::test_tools::{address, open_state};
    use assert_matches::assert_matches;
    use noah_models::transaction::{MultiSendItem, Transaction, TransactionData};
    use noah_models::{Amount, CoinId};
    use noah_state::bus::AccountsBus;

    fn multisend_tx(list: Vec<MultiSendItem>) -> Transaction {
        Transaction {
            nonce: 1,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data: TransactionData::MultiSend { list },
            payload: Vec::new(),
        }
    }

    #[test]
    fn test_multisend_pays_every_recipient() {
        let (_dir, mut state) = open_state();
        let sender = address(1);
        state
            .accounts
            .add_balance(&sender, CoinId::BASE, &Amount::from_noah(100));
        let list = (2..5)
            .map(|byte| MultiSendItem {
                coin: CoinId::BASE,
                to: address(byte),
                value: Amount::from_noah(byte as u64),
            })
            .collect();
        let tx = multisend_tx(list);
        let ctx = TxContext {
            tx: &tx,
            sender,
            height: 1,
        };
        let mut pool = Amount::zero();
        run(&mut state, &ctx, &mut pool).unwrap();

        // 10 gas for the first recipient, 5 for each other
        assert_eq!(pool, Amount::from_u64(20_000_000_000_000_000));
        for byte in 2..5 {
            assert_eq!(
                state.accounts.get_balance(&address(byte), CoinId::BASE),
                Amount::from_noah(byte as u64)
            );
        }
    }

    #[test]
    fn test_empty_multisend() {
        let (_dir, mut state) = open_state();
        let tx = multisend_tx(Vec::new());
        let ctx = TxContext {
            tx: &tx,
            sender: address(1),
            height: 1,
        };
        assert_matches!(
            run(&mut state, &ctx, &mut Amount::zero()),
            Err(ExecutionError::InvalidMultisendData(_))
        );
    }
}
