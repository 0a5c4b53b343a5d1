// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Narrow interfaces the modules use to reach each other.
//!
//! `State` owns every module. A cross module call receives a `Bus` made of mutable borrows of
//! the sibling modules it may touch, split from the `State` fields, so no module holds a
//! reference to another.

use crate::candidates::Candidate;
use crate::coins::Coin;
use crate::error::StateResult;
use crate::waitlist::WaitListItem;
use noah_models::event::Event;
use noah_models::{Address, Amount, CoinId, Pubkey, TmAddress};

/// Balances as seen by the other modules
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait AccountsBus {
    /// Balance of `address` in `coin`, zero if absent
    fn get_balance(&self, address: &Address, coin: CoinId) -> Amount;
    /// Credits `value`
    fn add_balance(&mut self, address: &Address, coin: CoinId, value: &Amount);
    /// Debits `value`, fails without mutation if the balance is too low
    fn sub_balance(&mut self, address: &Address, coin: CoinId, value: &Amount) -> StateResult<()>;
}

/// Coins as seen by the other modules
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait CoinsBus {
    /// Custom coin by identifier, `None` for the base coin and unknown identifiers
    fn get_coin(&self, id: CoinId) -> Option<Coin>;
    /// Increases the volume, fails past the max supply
    fn add_volume(&mut self, id: CoinId, value: &Amount) -> StateResult<()>;
    /// Decreases the volume, fails below zero
    fn sub_volume(&mut self, id: CoinId, value: &Amount) -> StateResult<()>;
    /// Increases the reserve
    fn add_reserve(&mut self, id: CoinId, value: &Amount) -> StateResult<()>;
    /// Decreases the reserve, fails below zero
    fn sub_reserve(&mut self, id: CoinId, value: &Amount) -> StateResult<()>;
}

/// Global counters as seen by the other modules
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait AppBus {
    /// Adds base coin removed by a punishment or left as dust
    fn add_total_slashed(&mut self, value: &Amount);
    /// Base coin removed so far
    fn get_total_slashed(&self) -> Amount;
}

/// Frozen funds as seen by the other modules
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait FrozenFundsBus {
    /// Schedules a credit of `value` to `address` at `height`
    fn add_fund(
        &mut self,
        height: u64,
        address: &Address,
        candidate_key: Option<Pubkey>,
        candidate_id: u32,
        coin: CoinId,
        value: &Amount,
    );
}

/// Wait list as seen by the other modules
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait WaitListBus {
    /// Defers a delegation, merged with an existing entry of the same candidate and coin
    fn add_wait_list(&mut self, address: &Address, candidate_id: u32, coin: CoinId, value: &Amount);
    /// Deferred delegation of `address` to a candidate in a coin
    fn get(&self, address: &Address, candidate_id: u32, coin: CoinId) -> Option<WaitListItem>;
    /// Drops a deferred delegation
    fn delete(&mut self, address: &Address, candidate_id: u32, coin: CoinId);
}

/// Event log of the block being built
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait EventsBus {
    /// Appends an event
    fn add_event(&mut self, event: Event);
}

/// Candidates as seen by the validators
pub trait CandidatesBus {
    /// Candidate by consensus key
    fn get_candidate(&self, pub_key: &Pubkey) -> Option<&Candidate>;
    /// Candidate by consensus address
    fn get_candidate_by_tm_address(&self, tm_address: &TmAddress) -> Option<&Candidate>;
    /// Regular punishment for missed blocks, returns the removed base coin value
    fn punish(&mut self, height: u64, tm_address: &TmAddress, bus: &mut Bus<'_>)
        -> StateResult<Amount>;
    /// Switches a candidate off
    fn set_offline(&mut self, pub_key: &Pubkey);
}

/// Mutable borrows of the modules a cross module call may touch
pub struct Bus<'a> {
    /// balances
    pub accounts: &'a mut dyn AccountsBus,
    /// coins
    pub coins: &'a mut dyn CoinsBus,
    /// global counters
    pub app: &'a mut dyn AppBus,
    /// scheduled credits
    pub frozen_funds: &'a mut dyn FrozenFundsBus,
    /// deferred delegations
    pub waitlist: &'a mut dyn WaitListBus,
    /// block events
    pub events: &'a mut dyn EventsBus,
}
