// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Genesis / export document. It is the only way to move a state from one chain to another.

use crate::address::Address;
use crate::amount::Amount;
use crate::coin::{CoinId, CoinSymbol, CoinVersion};
use crate::config::constants::{MAX_COMMISSION, MAX_CRR, MIN_CRR};
use crate::error::ModelsError;
use crate::pubkey::Pubkey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Full state snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    /// height the imported chain starts at
    pub start_height: u64,
    /// active validators
    pub validators: Vec<AppValidator>,
    /// every candidate with its stakes
    pub candidates: Vec<AppCandidate>,
    /// public keys that can never be used again
    #[serde(default)]
    pub block_list_candidates: Vec<Pubkey>,
    /// deferred delegations
    #[serde(default)]
    pub waitlist: Vec<AppWaitlistItem>,
    /// custom coins
    pub coins: Vec<AppCoin>,
    /// scheduled credits
    pub frozen_funds: Vec<AppFrozenFund>,
    /// balances and nonces
    pub accounts: Vec<AppAccount>,
    /// max gas per block
    pub max_gas: u64,
    /// value removed by punishments
    pub total_slashed: Amount,
    /// pending votes to halt the chain
    #[serde(default)]
    pub halt_blocks: Vec<AppHaltBlock>,
}

/// Vote of a candidate to halt the chain at a height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppHaltBlock {
    /// height to halt at
    pub height: u64,
    /// voting candidate
    pub candidate_key: Pubkey,
}

/// Validator in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppValidator {
    /// stake snapshot of the epoch
    pub total_noah_stake: Amount,
    /// consensus key
    pub public_key: Pubkey,
    /// not yet paid reward
    pub accum_reward: Amount,
    /// one bit per block of the signing window
    pub absent_times: u32,
}

/// Candidate in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCandidate {
    /// sequential identifier
    pub id: u32,
    /// receives the commission
    pub reward_address: Address,
    /// may edit the candidate
    pub owner_address: Address,
    /// may switch the candidate on and off
    pub control_address: Address,
    /// cached valuation in base coin
    pub total_noah_stake: Amount,
    /// consensus key
    pub public_key: Pubkey,
    /// commission, percent
    pub commission: u32,
    /// live stake slots
    pub stakes: Vec<AppStake>,
    /// pending updates
    #[serde(default)]
    pub updates: Vec<AppStake>,
    /// 1 offline, 2 online
    pub status: u8,
    /// kept out of the next validator sets until switched on again
    #[serde(default)]
    pub to_drop: bool,
}

/// Stake in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStake {
    /// delegator
    pub owner: Address,
    /// coin
    pub coin: CoinId,
    /// value in `coin`
    pub value: Amount,
    /// valuation in base coin
    pub noah_value: Amount,
}

/// Deferred delegation in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppWaitlistItem {
    /// candidate
    pub candidate_id: u32,
    /// delegator
    pub owner: Address,
    /// coin
    pub coin: CoinId,
    /// value
    pub value: Amount,
}

/// Custom coin in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCoin {
    /// identifier
    pub id: CoinId,
    /// name
    pub name: String,
    /// ticker
    pub symbol: CoinSymbol,
    /// supply
    pub volume: Amount,
    /// constant reserve ratio, percent
    pub crr: u32,
    /// base coin backing
    pub reserve: Amount,
    /// supply cap
    pub max_supply: Amount,
    /// symbol version
    #[serde(default)]
    pub version: CoinVersion,
}

/// Frozen fund in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFrozenFund {
    /// release height
    pub height: u64,
    /// beneficiary
    pub address: Address,
    /// originating candidate key
    pub candidate_key: Option<Pubkey>,
    /// originating candidate
    pub candidate_id: u32,
    /// coin
    pub coin: CoinId,
    /// value
    pub value: Amount,
}

/// Account in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAccount {
    /// address
    pub address: Address,
    /// non zero balances
    pub balance: Vec<AppBalance>,
    /// last used nonce
    pub nonce: u64,
}

/// One balance of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBalance {
    /// coin
    pub coin: CoinId,
    /// value
    pub value: Amount,
}

fn invalid(msg: String) -> ModelsError {
    ModelsError::InvalidAppState(msg)
}

impl AppState {
    /// Checks the internal consistency of the document: identifiers are unique, every
    /// reference resolves, and each custom coin volume matches what is held of it.
    pub fn verify(&self) -> Result<(), ModelsError> {
        let mut coins: BTreeMap<CoinId, &AppCoin> = BTreeMap::new();
        let mut symbols = BTreeSet::new();
        for coin in &self.coins {
            if coin.id.is_base() {
                return Err(invalid("base coin cannot be listed".into()));
            }
            if coins.insert(coin.id, coin).is_some() {
                return Err(invalid(format!("duplicate coin {}", coin.id)));
            }
            if !symbols.insert((coin.symbol.clone(), coin.version)) {
                return Err(invalid(format!(
                    "duplicate coin symbol {} version {}",
                    coin.symbol, coin.version
                )));
            }
            if !(MIN_CRR..=MAX_CRR).contains(&coin.crr) {
                return Err(invalid(format!("coin {} has a wrong crr", coin.id)));
            }
            if coin.reserve.is_zero() || coin.volume.is_zero() {
                return Err(invalid(format!("coin {} has an empty reserve", coin.id)));
            }
            if coin.volume > coin.max_supply {
                return Err(invalid(format!("coin {} exceeds its max supply", coin.id)));
            }
        }
        let check_coin = |coin: &CoinId| -> Result<(), ModelsError> {
            if coin.is_base() || coins.contains_key(coin) {
                Ok(())
            } else {
                Err(invalid(format!("unknown coin {}", coin)))
            }
        };

        let mut held: BTreeMap<CoinId, Amount> = BTreeMap::new();
        let mut add_held = |coin: CoinId, value: &Amount| {
            *held.entry(coin).or_default() += value;
        };

        let mut addresses = BTreeSet::new();
        for account in &self.accounts {
            if !addresses.insert(account.address) {
                return Err(invalid(format!("duplicate account {}", account.address)));
            }
            let mut account_coins = BTreeSet::new();
            for balance in &account.balance {
                check_coin(&balance.coin)?;
                if !account_coins.insert(balance.coin) {
                    return Err(invalid(format!(
                        "duplicate balance of {} for {}",
                        balance.coin, account.address
                    )));
                }
                add_held(balance.coin, &balance.value);
            }
        }

        let mut candidate_keys = BTreeSet::new();
        let mut candidate_ids = BTreeSet::new();
        for candidate in &self.candidates {
            if !candidate_keys.insert(candidate.public_key) {
                return Err(invalid(format!(
                    "duplicate candidate {}",
                    candidate.public_key
                )));
            }
            if candidate.id == 0 || !candidate_ids.insert(candidate.id) {
                return Err(invalid(format!("bad candidate id {}", candidate.id)));
            }
            if candidate.commission > MAX_COMMISSION {
                return Err(invalid(format!(
                    "candidate {} has a wrong commission",
                    candidate.public_key
                )));
            }
            let mut slots = BTreeSet::new();
            for stake in &candidate.stakes {
                check_coin(&stake.coin)?;
                if !slots.insert((stake.owner, stake.coin)) {
                    return Err(invalid(format!(
                        "duplicate stake of {} in {} for {}",
                        stake.owner, stake.coin, candidate.public_key
                    )));
                }
                add_held(stake.coin, &stake.value);
            }
            for update in &candidate.updates {
                check_coin(&update.coin)?;
                add_held(update.coin, &update.value);
            }
        }

        for key in &self.block_list_candidates {
            if candidate_keys.contains(key) {
                return Err(invalid(format!("candidate {} is block listed", key)));
            }
        }

        let mut validator_keys = BTreeSet::new();
        for validator in &self.validators {
            if !validator_keys.insert(validator.public_key) {
                return Err(invalid(format!(
                    "duplicate validator {}",
                    validator.public_key
                )));
            }
            if !candidate_keys.contains(&validator.public_key) {
                return Err(invalid(format!(
                    "validator {} is not a candidate",
                    validator.public_key
                )));
            }
        }

        for fund in &self.frozen_funds {
            check_coin(&fund.coin)?;
            add_held(fund.coin, &fund.value);
        }

        for item in &self.waitlist {
            check_coin(&item.coin)?;
            if !candidate_ids.contains(&item.candidate_id) {
                return Err(invalid(format!(
                    "waitlist references unknown candidate {}",
                    item.candidate_id
                )));
            }
            add_held(item.coin, &item.value);
        }

        for halt in &self.halt_blocks {
            if !candidate_keys.contains(&halt.candidate_key) {
                return Err(invalid(format!(
                    "halt vote of unknown candidate {}",
                    halt.candidate_key
                )));
            }
        }

        for (id, coin) in coins {
            let total = held.get(&id).cloned().unwrap_or_default();
            if total != coin.volume {
                return Err(invalid(format!(
                    "coin {} volume {} does not match the {} held",
                    id, coin.volume, total
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

    fn address(byte: u8) -> Address {
        Address::from_bytes(&[byte; 20])
    }

    fn sample() -> AppState {
        AppState {
            start_height: 10,
            coins: vec![AppCoin {
                id: CoinId(1),
                name: "Test".into(),
                symbol: CoinSymbol::new("TEST").unwrap(),
                volume: Amount::from_noah(30),
                crr: 50,
                reserve: Amount::from_noah(250_000),
                max_supply: Amount::from_noah(1000),
                version: 0,
            }],
            accounts: vec![AppAccount {
                address: address(1),
                balance: vec![
                    AppBalance {
                        coin: CoinId::BASE,
                        value: Amount::from_noah(5),
                    },
                    AppBalance {
                        coin: CoinId(1),
                        value: Amount::from_noah(10),
                    },
                ],
                nonce: 3,
            }],
            candidates: vec![AppCandidate {
                id: 1,
                reward_address: address(1),
                owner_address: address(1),
                control_address: address(1),
                total_noah_stake: Amount::from_noah(1),
                public_key: Pubkey::from_bytes([4; 32]),
                commission: 10,
                stakes: vec![AppStake {
                    owner: address(1),
                    coin: CoinId(1),
                    value: Amount::from_noah(10),
                    noah_value: Amount::from_noah(1),
                }],
                updates: vec![],
                status: 2,
                to_drop: false,
            }],
            frozen_funds: vec![AppFrozenFund {
                height: 100,
                address: address(2),
                candidate_key: Some(Pubkey::from_bytes([4; 32])),
                candidate_id: 1,
                coin: CoinId(1),
                value: Amount::from_noah(5),
            }],
            waitlist: vec![AppWaitlistItem {
                candidate_id: 1,
                owner: address(3),
                coin: CoinId(1),
                value: Amount::from_noah(5),
            }],
            max_gas: 100_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_consistent_state_verifies() {
        sample().verify().unwrap();
    }

    #[test]
    fn test_volume_mismatch_is_reported() {
        let mut state = sample();
        state.coins[0].volume = Amount::from_noah(31);
        assert_matches!(state.verify(), Err(ModelsError::InvalidAppState(msg)) if msg.contains("volume"));
    }

    #[test]
    fn test_validator_must_be_candidate() {
        let mut state = sample();
        state.validators.push(AppValidator {
            total_noah_stake: Amount::zero(),
            public_key: Pubkey::from_bytes([9; 32]),
            accum_reward: Amount::zero(),
            absent_times: 0,
        });
        assert_matches!(state.verify(), Err(ModelsError::InvalidAppState(_)));
    }

    #[test]
    fn test_halt_vote_must_come_from_a_candidate() {
        let mut state = sample();
        state.halt_blocks.push(AppHaltBlock {
            height: 20,
            candidate_key: Pubkey::from_bytes([4; 32]),
        });
        state.verify().unwrap();
        state.halt_blocks.push(AppHaltBlock {
            height: 20,
            candidate_key: Pubkey::from_bytes([9; 32]),
        });
        assert_matches!(state.verify(), Err(ModelsError::InvalidAppState(msg)) if msg.contains("halt"));
    }

    #[test]
    fn test_json_shape() {
        let state = sample();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["coins"][0]["symbol"], "TEST");
        assert_eq!(json["total_slashed"], "0");
        assert_eq!(json["candidates"][0]["to_drop"], false);
        let back: AppState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
