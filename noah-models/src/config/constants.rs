// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! DEFAULT VALUES USED TO INITIALIZE DIVERS CONFIGURATIONS STRUCTURES
//!
//! These values are hard-coded protocol parameters. Generally they are passed with
//! dependency injection in a `cfg` parameter to each module, which keeps them easy to
//! override in unit tests.

use crate::address::Address;
use crate::amount::Amount;
use crate::coin::CoinId;
use std::str::FromStr;

/// Ticker of the base coin
pub const BASE_COIN_SYMBOL: &str = "NOAH";
/// Identifier of the base coin
pub const BASE_COIN_ID: CoinId = CoinId::BASE;
/// Number of decimals of every coin, 1 coin = 10^18 units
pub const AMOUNT_DECIMALS: u32 = 18;
/// Max number of bytes of a serialized amount
pub const MAX_AMOUNT_BYTES: u64 = 32;

/// Max number of stake slots per candidate
pub const MAX_DELEGATORS_PER_CANDIDATE: usize = 1000;
/// Number of blocks an unbonded stake stays frozen
pub const UNBOND_PERIOD: u64 = 518400;
/// Size of the validator signing window, in blocks
pub const VALIDATOR_MAX_ABSENT_WINDOW: u64 = 24;
/// Number of missed blocks in the window above which a validator is dropped
pub const VALIDATOR_MAX_ABSENT_TIMES: u32 = 12;
/// Period of reward payouts and validator set updates, in blocks
pub const BLOCKS_PER_PAYOUT: u64 = 120;
/// Size of the validator set
pub const VALIDATORS_COUNT: usize = 64;
/// Max candidates count, as a multiple of the validator set size
pub const CANDIDATES_LIMIT_MULTIPLIER: usize = 3;
/// Total voting power shared by the validator set
pub const TOTAL_VOTING_POWER: u64 = 100_000_000;

/// Share of a stake kept after a missed-blocks punishment, percent
pub const PUNISH_KEEP_PERCENT: u32 = 99;
/// Share of a stake kept after a double-sign punishment, percent
pub const BYZANTINE_KEEP_PERCENT: u32 = 95;
/// Share of frozen funds slashed after a double-sign punishment, percent
pub const FROZEN_FUNDS_SLASH_PERCENT: u32 = 5;
/// DAO cut of the validator rewards, percent
pub const DAO_COMMISSION: u32 = 10;
/// Developers cut of the validator rewards, percent
pub const DEVELOPERS_COMMISSION: u32 = 10;
/// Max candidate commission, percent
pub const MAX_COMMISSION: u32 = 100;

/// Gas unit price, in base coin units
pub const COMMISSION_MULTIPLIER: u64 = 1_000_000_000_000_000;
/// Default max gas per block
pub const DEFAULT_MAX_GAS: u64 = 100_000;

/// Smallest allowed constant reserve ratio
pub const MIN_CRR: u32 = 10;
/// Largest allowed constant reserve ratio
pub const MAX_CRR: u32 = 100;
/// Max length of a coin name, in bytes
pub const MAX_COIN_NAME_BYTES: usize = 64;
/// Max length of a coin symbol, in bytes
pub const MAX_COIN_SYMBOL_BYTES: usize = 10;
/// Min reserve of a custom coin, in whole base coins
pub const MIN_COIN_RESERVE_NOAH: u64 = 250_000;
/// Min supply of a custom coin, in whole coins
pub const MIN_COIN_SUPPLY_NOAH: u64 = 1;
/// Max supply of a custom coin, in whole coins
pub const MAX_COIN_SUPPLY_NOAH: u64 = 1_000_000_000_000_000;

/// Reward of the first block, in whole base coins
pub const FIRST_BLOCK_REWARD_NOAH: u64 = 1344;
/// The block reward decreases by one coin every this many blocks
pub const BLOCK_REWARD_DECREASE_INTERVAL: u64 = 200_000;
/// Last block that is rewarded
pub const LAST_REWARDED_BLOCK: u64 = 37_861_990;

/// Max transaction size, in bytes
pub const MAX_TX_BYTES: usize = 7168;
/// Max payload size, in bytes
pub const MAX_PAYLOAD_BYTES: usize = 1024;
/// Max number of items of a multisend
pub const MAX_MULTISEND_ITEMS: usize = 100;

/// Gas of each transaction type
pub mod gas {
    /// send
    pub const SEND: u64 = 10;
    /// sell, sell all and buy
    pub const CONVERT: u64 = 100;
    /// declare candidacy
    pub const DECLARE_CANDIDACY: u64 = 10000;
    /// delegate
    pub const DELEGATE: u64 = 200;
    /// unbond
    pub const UNBOND: u64 = 200;
    /// set online and set offline
    pub const TOGGLE_CANDIDATE_STATUS: u64 = 100;
    /// edit candidate
    pub const EDIT_CANDIDATE: u64 = 10000;
    /// change candidate public key
    pub const EDIT_CANDIDATE_PUBLIC_KEY: u64 = 10000;
    /// set halt block
    pub const SET_HALT_BLOCK: u64 = 1000;
    /// multisend, first item
    pub const MULTISEND_BASE: u64 = 10;
    /// multisend, each item after the first
    pub const MULTISEND_DELTA: u64 = 5;
    /// create coin, by symbol length: 3, 4, 5, 6 and longer
    pub const CREATE_COIN: [u64; 5] = [1_000_000_000, 100_000_000, 10_000_000, 1_000_000, 100_000];
}

lazy_static::lazy_static! {
    /// Receives the DAO share of the validator rewards
    pub static ref DAO_ADDRESS: Address =
        Address::from_str("NOAHx7f6c3e2a9b8d4f1e0c5a6b7d8e9f0a1b2c3d4e5f")
            .expect("critical: invalid DAO address constant");
    /// Receives the developers share of the validator rewards
    pub static ref DEVELOPERS_ADDRESS: Address =
        Address::from_str("NOAHxf98017d1a37cc4bec05026ef94cb46102e16638e")
            .expect("critical: invalid developers address constant");
    /// Min reserve of a custom coin
    pub static ref MIN_COIN_RESERVE: Amount = Amount::from_noah(MIN_COIN_RESERVE_NOAH);
    /// Min supply of a custom coin
    pub static ref MIN_COIN_SUPPLY: Amount = Amount::from_noah(MIN_COIN_SUPPLY_NOAH);
    /// Max supply of a custom coin
    pub static ref MAX_COIN_SUPPLY: Amount = Amount::from_noah(MAX_COIN_SUPPLY_NOAH);
}

/// Gas of a coin creation for a given symbol length
pub fn create_coin_gas(symbol_len: usize) -> u64 {
    match symbol_len {
        3 => gas::CREATE_COIN[0],
        4 => gas::CREATE_COIN[1],
        5 => gas::CREATE_COIN[2],
        6 => gas::CREATE_COIN[3],
        _ => gas::CREATE_COIN[4],
    }
}

/// Block reward at a given height
/// ```
/// # use noah_models::config::constants::block_reward;
/// # use noah_models::amount::Amount;
/// assert_eq!(block_reward(1), Amount::from_noah(1344));
/// assert_eq!(block_reward(200_000), Amount::from_noah(1343));
/// assert_eq!(block_reward(37_861_991), Amount::zero());
/// ```
pub fn block_reward(height: u64) -> Amount {
    if height > LAST_REWARDED_BLOCK {
        return Amount::zero();
    }
    let decrease = height / BLOCK_REWARD_DECREASE_INTERVAL;
    let reward = FIRST_BLOCK_REWARD_NOAH.saturating_sub(decrease).max(1);
    Amount::from_noah(reward)
}
