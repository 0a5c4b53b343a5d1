// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines all error types for the state modules

use displaydoc::Display;
use noah_db_exports::TreeStoreError;
use noah_models::{Address, CoinId, ModelsError, Pubkey};
use thiserror::Error;

/// state result
pub type StateResult<T, E = StateError> = core::result::Result<T, E>;

/// Semantic failures of the state modules. None of them leaves a module half mutated.
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum StateError {
    /// candidate {0} already exists
    CandidateExists(Pubkey),
    /// candidate {0} not found
    CandidateNotFound(Pubkey),
    /// public key {0} is in the block list
    PublicKeyInBlockList(Pubkey),
    /// stake of {0} in coin {1} not found
    StakeNotFound(Address, CoinId),
    /// insufficient stake of {0} in coin {1}
    InsufficientStake(Address, CoinId),
    /// insufficient funds of {0} in coin {1}
    InsufficientFunds(Address, CoinId),
    /// coin {0} does not exist
    CoinNotExists(CoinId),
    /// coin {0} already exists
    CoinAlreadyExists(CoinId),
    /// coin {0} reserve would fall below zero
    ReserveUnderflow(CoinId),
    /// coin {0} volume would fall below zero
    VolumeUnderflow(CoinId),
    /// coin {0} volume would exceed its max supply
    SupplyOverflow(CoinId),
    /// invariant check failed: {0}
    CheckerError(String),
    /// invalid app state: {0}
    InvalidAppState(String),
    /// models error: {0}
    ModelsError(#[from] ModelsError),
    /// tree store error: {0}
    TreeStoreError(#[from] TreeStoreError),
}
