// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use noah_state::StateError;
use thiserror::Error;

/// node result
pub type NodeResult<T, E = NodeError> = core::result::Result<T, E>;

/// node error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum NodeError {
    /// the chain is already initialized at version {0}
    AlreadyInitialized(u64),
    /// the chain is not initialized, a genesis file is required
    NotInitialized,
    /// conservation check failed at height {0}: {1}
    ConservationCheckFailed(u64, StateError),
    /// validators holding more than two thirds of the stake voted to halt at height {0}
    Halted(u64),
    /// invalid block input: {0}
    InvalidBlock(String),
    /// state error: {0}
    StateError(#[from] StateError),
}
