// Copyright (c) 2022 MASSA LABS <info@massa.net>

use super::{ensure_coin, get_candidate, price_commission, settle, StateAccess, Tag, TxContext};
use crate::error::{ExecutionError, ExecutionResult};
use noah_models::transaction::TxType;
use noah_models::{Amount, CoinId, Pubkey};
use noah_state::bus::{FrozenFundsBus, WaitListBus};
use noah_state::coins::noah_value;

fn staking_tags(ctx: &TxContext<'_>, tx_type: TxType, pub_key: &Pubkey, coin: CoinId) -> Vec<Tag> {
    let mut tags = ctx.tags(tx_type);
    tags.push(Tag::new("tx.pub_key", hex::encode(pub_key.to_bytes())));
    tags.push(Tag::new("tx.coin", coin.to_string()));
    tags
}

/// Queues a stake on a candidate. A deferred delegation of the sender to the same candidate and
/// coin is folded into it.
pub(super) fn delegate(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    pub_key: &Pubkey,
    coin: CoinId,
    value: &Amount,
) -> ExecutionResult<Vec<Tag>> {
    ensure_coin(state, coin)?;
    let candidate_id = get_candidate(state, pub_key)?.id;
    if value.is_zero() {
        return Err(ExecutionError::StakeShouldBePositive);
    }
    if !state.candidates.is_delegator_stake_sufficient(
        &ctx.sender,
        pub_key,
        coin,
        value,
        &state.coins,
    ) {
        return Err(ExecutionError::TooLowStake);
    }
    let (exchange, commission, mut spends) = price_commission(state, ctx)?;
    spends.add(coin, value);
    spends.check(&state.accounts, &ctx.sender)?;

    let tags = staking_tags(ctx, TxType::Delegate, pub_key, coin);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    let mut total = value.clone();
    if let Some(item) = state.waitlist.get(&ctx.sender, candidate_id, coin) {
        state.waitlist.delete(&ctx.sender, candidate_id, coin);
        total += &item.value;
    }
    let valuation = noah_value(&state.coins, coin, &total);
    state
        .candidates
        .delegate(&ctx.sender, pub_key, coin, &total, &valuation)?;
    Ok(tags)
}

/// Withdraws a stake, or a deferred delegation that covers the value. The funds come back after
/// the unbond period.
pub(super) fn unbond(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    pub_key: &Pubkey,
    coin: CoinId,
    value: &Amount,
) -> ExecutionResult<Vec<Tag>> {
    ensure_coin(state, coin)?;
    let candidate_id = get_candidate(state, pub_key)?.id;
    if value.is_zero() {
        return Err(ExecutionError::StakeShouldBePositive);
    }
    let waiting = state
        .waitlist
        .get(&ctx.sender, candidate_id, coin)
        .filter(|item| item.value >= *value);
    if waiting.is_none() {
        let staked = state
            .candidates
            .get_stake_value_of_address(pub_key, &ctx.sender, coin)
            .ok_or(ExecutionError::StakeNotFound(ctx.sender, coin))?;
        if staked < *value {
            return Err(ExecutionError::InsufficientStake {
                address: ctx.sender,
                coin,
                has: staked,
                wanted: value.clone(),
            });
        }
    }
    let (exchange, commission, spends) = price_commission(state, ctx)?;
    spends.check(&state.accounts, &ctx.sender)?;

    let tags = staking_tags(ctx, TxType::Unbond, pub_key, coin);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    match waiting {
        Some(item) => {
            state.waitlist.delete(&ctx.sender, candidate_id, coin);
            let remaining = item.value.saturating_sub(value);
            if !remaining.is_zero() {
                state
                    .waitlist
                    .add_wait_list(&ctx.sender, candidate_id, coin, &remaining);
            }
        }
        None => {
            state
                .candidates
                .sub_stake(&ctx.sender, pub_key, coin, value)?;
        }
    }
    let release_height = ctx.height + state.config().unbond_period;
    state.frozen_funds.add_fund(
        release_height,
        &ctx.sender,
        Some(*pub_key),
        candidate_id,
        coin,
        value,
    );
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use crate::error::ExecutionError;
    use crate::handlers::{run, TxContext};
    use crate::test_tools::{address, open_state};
    use assert_matches::assert_matches;
    use noah_models::transaction::{Transaction, TransactionData};
    use noah_models::{Address, Amount, CoinId, Pubkey};
    use noah_state::bus::{AccountsBus, CandidatesBus, WaitListBus};
    use noah_state::State;

    const HEIGHT: u64 = 10;

    fn pubkey() -> Pubkey {
        Pubkey::from_bytes([4; 32])
    }

    fn apply(state: &mut State, sender: Address, data: TransactionData) -> Result<(), ExecutionError> {
        let tx = Transaction {
            nonce: 1,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data,
            payload: Vec::new(),
        };
        let ctx = TxContext {
            tx: &tx,
            sender,
            height: HEIGHT,
        };
        run(state, &ctx, &mut Amount::zero()).map(|_| ())
    }

    fn delegate(value: u64) -> TransactionData {
        TransactionData::Delegate {
            pub_key: pubkey(),
            coin: CoinId::BASE,
            value: Amount::from_noah(value),
        }
    }

    fn unbond(value: u64) -> TransactionData {
        TransactionData::Unbond {
            pub_key: pubkey(),
            coin: CoinId::BASE,
            value: Amount::from_noah(value),
        }
    }

    /// one candidate, a funded delegator
    fn staking_state() -> (tempfile::TempDir, State, u32) {
        let (dir, mut state) = open_state();
        let id = state
            .candidates
            .create(address(1), address(1), address(1), pubkey(), 10)
            .unwrap();
        state
            .accounts
            .add_balance(&address(2), CoinId::BASE, &Amount::from_noah(1000));
        (dir, state, id)
    }

    /// folds the queued delegations into the live stakes
    fn recalculate(state: &mut State) {
        let (candidates, _, _, mut bus) = state.split();
        candidates.recalculate_stakes(HEIGHT, &mut bus).unwrap();
    }

    #[test]
    fn test_delegate_merges_the_wait_list() {
        let (_dir, mut state, id) = staking_state();
        state
            .waitlist
            .add_wait_list(&address(2), id, CoinId::BASE, &Amount::from_noah(30));
        apply(&mut state, address(2), delegate(50)).unwrap();

        assert!(state.waitlist.get(&address(2), id, CoinId::BASE).is_none());
        let candidate = state.candidates.get_candidate(&pubkey()).unwrap();
        assert_eq!(candidate.updates.len(), 1);
        assert_eq!(candidate.updates[0].owner, address(2));
        assert_eq!(candidate.updates[0].value, Amount::from_noah(80));
        // 50 staked, 0.2 of commission
        assert_eq!(
            state.accounts.get_balance(&address(2), CoinId::BASE),
            &Amount::from_noah(949) + &Amount::from_u64(800_000_000_000_000_000)
        );
    }

    #[test]
    fn test_delegate_rejections() {
        let (_dir, mut state, _) = staking_state();
        assert_matches!(
            apply(&mut state, address(2), delegate(0)),
            Err(ExecutionError::StakeShouldBePositive)
        );
        assert_matches!(
            apply(&mut state, address(2), delegate(2000)),
            Err(ExecutionError::InsufficientFunds { .. })
        );
        assert_matches!(
            apply(
                &mut state,
                address(2),
                TransactionData::Delegate {
                    pub_key: Pubkey::from_bytes([5; 32]),
                    coin: CoinId::BASE,
                    value: Amount::from_noah(1),
                },
            ),
            Err(ExecutionError::CandidateNotFound(_))
        );
        assert_matches!(
            apply(
                &mut state,
                address(2),
                TransactionData::Delegate {
                    pub_key: pubkey(),
                    coin: CoinId(7),
                    value: Amount::from_noah(1),
                },
            ),
            Err(ExecutionError::CoinNotExists(_))
        );
    }

    #[test]
    fn test_unbond_freezes_the_stake() {
        let (_dir, mut state, id) = staking_state();
        apply(&mut state, address(2), delegate(100)).unwrap();
        // queued stakes cannot be unbonded before they go live
        assert_matches!(
            apply(&mut state, address(2), unbond(40)),
            Err(ExecutionError::StakeNotFound(..))
        );
        recalculate(&mut state);
        assert_matches!(
            apply(&mut state, address(2), unbond(101)),
            Err(ExecutionError::InsufficientStake { .. })
        );
        apply(&mut state, address(2), unbond(40)).unwrap();

        assert_eq!(
            state
                .candidates
                .get_stake_value_of_address(&pubkey(), &address(2), CoinId::BASE),
            Some(Amount::from_noah(60))
        );
        let release = HEIGHT + state.config().unbond_period;
        let funds = state.frozen_funds.get_frozen_funds(release);
        assert_eq!(funds.len(), 1);
        assert_eq!(funds[0].address, address(2));
        assert_eq!(funds[0].candidate_id, id);
        assert_eq!(funds[0].value, Amount::from_noah(40));
        state.check().unwrap();
    }

    #[test]
    fn test_unbond_from_the_wait_list() {
        let (_dir, mut state, id) = staking_state();
        state
            .waitlist
            .add_wait_list(&address(2), id, CoinId::BASE, &Amount::from_noah(30));
        apply(&mut state, address(2), unbond(20)).unwrap();

        let item = state.waitlist.get(&address(2), id, CoinId::BASE).unwrap();
        assert_eq!(item.value, Amount::from_noah(10));
        let release = HEIGHT + state.config().unbond_period;
        let funds = state.frozen_funds.get_frozen_funds(release);
        assert_eq!(funds[0].value, Amount::from_noah(20));
    }
}
