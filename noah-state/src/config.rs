// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines a configuration structure containing all settings for state management

use noah_models::config::constants::{
    DAO_ADDRESS, DEVELOPERS_ADDRESS, MAX_DELEGATORS_PER_CANDIDATE, UNBOND_PERIOD,
};
use noah_models::Address;

/// State configuration
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// live stake slots per candidate
    pub max_delegators_per_candidate: usize,
    /// blocks between an unbond or a byzantine punishment and the release of the funds
    pub unbond_period: u64,
    /// receives the DAO share of rewards
    pub dao_address: Address,
    /// receives the developers share of rewards
    pub developers_address: Address,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            max_delegators_per_candidate: MAX_DELEGATORS_PER_CANDIDATE,
            unbond_period: UNBOND_PERIOD,
            dao_address: *DAO_ADDRESS,
            developers_address: *DEVELOPERS_ADDRESS,
        }
    }
}
