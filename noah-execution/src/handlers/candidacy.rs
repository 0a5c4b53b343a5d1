// Copyright (c) 2022 MASSA LABS <info@massa.net>

use super::{ensure_coin, get_candidate, price_commission, settle, StateAccess, Tag, TxContext};
use crate::error::{ExecutionError, ExecutionResult};
use noah_models::config::constants::{CANDIDATES_LIMIT_MULTIPLIER, MAX_COMMISSION, VALIDATORS_COUNT};
use noah_models::transaction::TxType;
use noah_models::{Address, Amount, CoinId, Pubkey};
use noah_state::bus::CandidatesBus;
use noah_state::coins::noah_value;
use noah_state::State;
use tracing::info;

fn tags_with_key(ctx: &TxContext<'_>, tx_type: TxType, pub_key: &Pubkey) -> Vec<Tag> {
    let mut tags = ctx.tags(tx_type);
    tags.push(Tag::new("tx.pub_key", hex::encode(pub_key.to_bytes())));
    tags
}

/// Registers a candidate owned and controlled by the sender, with a first self delegation
#[allow(clippy::too_many_arguments)]
pub(super) fn declare(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    reward_address: Address,
    pub_key: Pubkey,
    commission: u32,
    coin: CoinId,
    stake: &Amount,
) -> ExecutionResult<Vec<Tag>> {
    if commission > MAX_COMMISSION {
        return Err(ExecutionError::WrongCommission(commission));
    }
    ensure_coin(state, coin)?;
    if state.candidates.is_blocked_pubkey(&pub_key) {
        return Err(ExecutionError::PublicKeyInBlockList(pub_key));
    }
    if state.candidates.exists(&pub_key) {
        return Err(ExecutionError::CandidateExists(pub_key));
    }
    let limit = VALIDATORS_COUNT * CANDIDATES_LIMIT_MULTIPLIER;
    if !state
        .candidates
        .is_new_candidate_stake_sufficient(coin, stake, limit, &state.coins)
    {
        return Err(ExecutionError::TooLowStake);
    }
    let (exchange, commission_paid, mut spends) = price_commission(state, ctx)?;
    spends.add(coin, stake);
    spends.check(&state.accounts, &ctx.sender)?;

    let tags = tags_with_key(ctx, TxType::DeclareCandidacy, &pub_key);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(
        state,
        ctx,
        exchange,
        spends,
        &commission_paid.base_value,
        reward_pool,
    )?;
    let valuation = noah_value(&state.coins, coin, stake);
    let id = state.candidates.create(
        reward_address,
        ctx.sender,
        ctx.sender,
        pub_key,
        commission,
    )?;
    state
        .candidates
        .delegate(&ctx.sender, &pub_key, coin, stake, &valuation)?;
    info!("candidate {} declared with id {} by {}", pub_key, id, ctx.sender);
    Ok(tags)
}

/// The owner or the control address may switch a candidate
fn check_controller(state: &State, ctx: &TxContext<'_>, pub_key: &Pubkey) -> ExecutionResult<()> {
    let candidate = get_candidate(state, pub_key)?;
    if ctx.sender != candidate.owner_address && ctx.sender != candidate.control_address {
        return Err(ExecutionError::IsNotOwnerOfCandidate(ctx.sender, *pub_key));
    }
    Ok(())
}

fn check_owner(state: &State, ctx: &TxContext<'_>, pub_key: &Pubkey) -> ExecutionResult<()> {
    let candidate = get_candidate(state, pub_key)?;
    if ctx.sender != candidate.owner_address {
        return Err(ExecutionError::IsNotOwnerOfCandidate(ctx.sender, *pub_key));
    }
    Ok(())
}

/// Switches a candidate online or offline
pub(super) fn set_status(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    pub_key: &Pubkey,
    online: bool,
) -> ExecutionResult<Vec<Tag>> {
    check_controller(state, ctx, pub_key)?;
    let (exchange, commission, spends) = price_commission(state, ctx)?;
    spends.check(&state.accounts, &ctx.sender)?;

    let tx_type = if online {
        TxType::SetCandidateOnline
    } else {
        TxType::SetCandidateOffline
    };
    let tags = tags_with_key(ctx, tx_type, pub_key);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    if online {
        state.candidates.set_online(pub_key)?;
    } else {
        state.candidates.set_offline(pub_key);
    }
    Ok(tags)
}

/// Replaces the addresses of a candidate, owner only
pub(super) fn edit(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    pub_key: &Pubkey,
    reward_address: Address,
    owner_address: Address,
    control_address: Address,
) -> ExecutionResult<Vec<Tag>> {
    check_owner(state, ctx, pub_key)?;
    let (exchange, commission, spends) = price_commission(state, ctx)?;
    spends.check(&state.accounts, &ctx.sender)?;

    let tags = tags_with_key(ctx, TxType::EditCandidate, pub_key);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    state
        .candidates
        .edit(pub_key, reward_address, owner_address, control_address)?;
    Ok(tags)
}

/// Moves a candidate to a new consensus key, owner only. The old key can never be used again.
pub(super) fn change_pubkey(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    pub_key: &Pubkey,
    new_pub_key: Pubkey,
) -> ExecutionResult<Vec<Tag>> {
    check_owner(state, ctx, pub_key)?;
    if new_pub_key == *pub_key {
        return Err(ExecutionError::NewPublicKeyIsBad(new_pub_key));
    }
    if state.candidates.is_blocked_pubkey(&new_pub_key) {
        return Err(ExecutionError::PublicKeyInBlockList(new_pub_key));
    }
    if state.candidates.exists(&new_pub_key) {
        return Err(ExecutionError::CandidateExists(new_pub_key));
    }
    let (exchange, commission, spends) = price_commission(state, ctx)?;
    spends.check(&state.accounts, &ctx.sender)?;

    let mut tags = tags_with_key(ctx, TxType::EditCandidatePublicKey, pub_key);
    tags.push(Tag::new(
        "tx.new_pub_key",
        hex::encode(new_pub_key.to_bytes()),
    ));
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    state.candidates.change_pubkey(pub_key, new_pub_key)?;
    state.validators.change_pubkey(pub_key, new_pub_key);
    Ok(tags)
}

/// Records the vote of a candidate to halt the chain at `height`, owner only
pub(super) fn set_halt_block(
    state: &mut StateAccess<'_>,
    ctx: &TxContext<'_>,
    reward_pool: &mut Amount,
    pub_key: &Pubkey,
    height: u64,
) -> ExecutionResult<Vec<Tag>> {
    check_owner(state, ctx, pub_key)?;
    if height < ctx.height {
        return Err(ExecutionError::WrongHaltHeight {
            height,
            current: ctx.height,
        });
    }
    let (exchange, commission, spends) = price_commission(state, ctx)?;
    spends.check(&state.accounts, &ctx.sender)?;

    let tags = tags_with_key(ctx, TxType::SetHaltBlock, pub_key);
    let Some(state) = state.deliver() else {
        return Ok(tags);
    };

    settle(state, ctx, exchange, spends, &commission.base_value, reward_pool)?;
    state.halts.add_halt_block(height, *pub_key);
    info!("candidate {} voted to halt at height {}", pub_key, height);
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
    use noah_state::bus::{AccountsBus, CandidatesBus};
    use noah_state::State;

    fn pubkey(byte: u8) -> Pubkey {
        Pubkey::from_bytes([byte; 32])
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
            height: 1,
        };
        run(state, &ctx, &mut Amount::zero()).map(|_| ())
    }

    fn declare(state: &mut State, sender: Address, key: Pubkey) -> Result<(), ExecutionError> {
        apply(
            state,
            sender,
            TransactionData::DeclareCandidacy {
                address: sender,
                pub_key: key,
                commission: 10,
                coin: CoinId::BASE,
                stake: Amount::from_noah(100),
            },
        )
    }

    fn funded_state() -> (tempfile::TempDir, State) {
        let (dir, mut state) = open_state();
        for byte in 1..3 {
            state
                .accounts
                .add_balance(&address(byte), CoinId::BASE, &Amount::from_noah(1000));
        }
        (dir, state)
    }

    #[test]
    fn test_declare_candidacy() {
        let (_dir, mut state) = funded_state();
        declare(&mut state, address(1), pubkey(4)).unwrap();

        let candidate = state.candidates.get_candidate(&pubkey(4)).unwrap();
        assert_eq!(candidate.owner_address, address(1));
        assert_eq!(candidate.commission, 10);
        assert!(!candidate.is_online());
        assert_eq!(candidate.updates.len(), 1);
        assert_eq!(candidate.updates[0].value, Amount::from_noah(100));
        // 100 staked, 10 of commission
        assert_eq!(
            state.accounts.get_balance(&address(1), CoinId::BASE),
            Amount::from_noah(890)
        );
        state.check().unwrap();

        assert_matches!(
            declare(&mut state, address(2), pubkey(4)),
            Err(ExecutionError::CandidateExists(_))
        );
        assert_matches!(
            apply(
                &mut state,
                address(1),
                TransactionData::DeclareCandidacy {
                    address: address(1),
                    pub_key: pubkey(5),
                    commission: 101,
                    coin: CoinId::BASE,
                    stake: Amount::from_noah(1),
                },
            ),
            Err(ExecutionError::WrongCommission(101))
        );
    }

    #[test]
    fn test_status_and_edit_need_the_owner() {
        let (_dir, mut state) = funded_state();
        declare(&mut state, address(1), pubkey(4)).unwrap();

        assert_matches!(
            apply(
                &mut state,
                address(2),
                TransactionData::SetCandidateOnline { pub_key: pubkey(4) },
            ),
            Err(ExecutionError::IsNotOwnerOfCandidate(..))
        );
        apply(
            &mut state,
            address(1),
            TransactionData::SetCandidateOnline { pub_key: pubkey(4) },
        )
        .unwrap();
        assert!(state.candidates.get_candidate(&pubkey(4)).unwrap().is_online());

        // hand the control address to the second account
        apply(
            &mut state,
            address(1),
            TransactionData::EditCandidate {
                pub_key: pubkey(4),
                reward_address: address(1),
                owner_address: address(1),
                control_address: address(2),
            },
        )
        .unwrap();
        apply(
            &mut state,
            address(2),
            TransactionData::SetCandidateOffline { pub_key: pubkey(4) },
        )
        .unwrap();
        assert!(!state.candidates.get_candidate(&pubkey(4)).unwrap().is_online());
        assert_matches!(
            apply(
                &mut state,
                address(2),
                TransactionData::EditCandidate {
                    pub_key: pubkey(4),
                    reward_address: address(2),
                    owner_address: address(2),
                    control_address: address(2),
                },
            ),
            Err(ExecutionError::IsNotOwnerOfCandidate(..))
        );
    }

    #[test]
    fn test_rotated_key_cannot_be_declared_again() {
        let (_dir, mut state) = funded_state();
        declare(&mut state, address(1), pubkey(4)).unwrap();
        apply(
            &mut state,
            address(1),
            TransactionData::EditCandidatePublicKey {
                pub_key: pubkey(4),
                new_pub_key: pubkey(5),
            },
        )
        .unwrap();

        let candidate = state.candidates.get_candidate(&pubkey(5)).unwrap();
        assert_eq!(candidate.id, 1);
        assert!(state.candidates.get_candidate(&pubkey(4)).is_none());
        assert_matches!(
            declare(&mut state, address(2), pubkey(4)),
            Err(ExecutionError::PublicKeyInBlockList(_))
        );
        assert_matches!(
            apply(
                &mut state,
                address(1),
                TransactionData::EditCandidatePublicKey {
                    pub_key: pubkey(5),
                    new_pub_key: pubkey(5),
                },
            ),
            Err(ExecutionError::NewPublicKeyIsBad(_))
        );
    }

    #[test]
    fn test_halt_vote_needs_the_owner_and_a_future_height() {
        let (_dir, mut state) = funded_state();
        declare(&mut state, address(1), pubkey(4)).unwrap();
        let vote = |height| TransactionData::SetHaltBlock {
            pub_key: pubkey(4),
            height,
        };

        assert_matches!(
            apply(&mut state, address(2), vote(10)),
            Err(ExecutionError::IsNotOwnerOfCandidate(..))
        );
        // the block being applied is at height 1
        assert_matches!(
            apply(&mut state, address(1), vote(0)),
            Err(ExecutionError::WrongHaltHeight {
                height: 0,
                current: 1
            })
        );
        assert!(state.halts.get_halt_blocks(0).is_empty());

        apply(&mut state, address(1), vote(10)).unwrap();
        assert_eq!(state.halts.get_halt_blocks(10), vec![pubkey(4)]);
        // 100 staked, 10 for the declaration and 1 for the vote
        assert_eq!(
            state.accounts.get_balance(&address(1), CoinId::BASE),
            Amount::from_noah(889)
        );
        state.check().unwrap();
    }
}
