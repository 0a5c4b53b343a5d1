// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines all possible execution error categories and the codes returned to the
//! consensus engine

use displaydoc::Display;
use noah_models::{Address, Amount, CoinId, CoinSymbol, Pubkey};
use noah_state::StateError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// execution result
pub type ExecutionResult<T, E = ExecutionError> = core::result::Result<T, E>;

/// Status code of a delivered transaction, 0 means applied
#[derive(IntoPrimitive, TryFromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResponseCode {
    Ok = 0,

    // envelope
    WrongNonce = 101,
    CoinNotExists = 102,
    CoinReserveNotSufficient = 103,
    TooLargeTx = 105,
    DecodeError = 106,
    InsufficientFunds = 107,
    TooLongPayload = 109,
    InvalidMultisendData = 111,
    CoinSupplyOverflow = 112,
    WrongSignature = 113,
    WrongChainId = 114,
    CoinReserveUnderflow = 115,
    WrongHaltHeight = 117,

    // coin creation
    CoinAlreadyExists = 201,
    WrongCrr = 202,
    InvalidCoinSymbol = 203,
    InvalidCoinName = 204,
    WrongCoinSupply = 205,

    // conversion
    CrossConvert = 301,
    MaximumValueToSellReached = 302,
    MinimumValueToBuyReached = 303,

    // candidates
    CandidateExists = 401,
    WrongCommission = 402,
    CandidateNotFound = 403,
    StakeNotFound = 404,
    InsufficientStake = 405,
    IsNotOwnerOfCandidate = 406,
    StakeShouldBePositive = 408,
    TooLowStake = 409,
    PublicKeyInBlockList = 410,
    NewPublicKeyIsBad = 411,

    /// a state primitive refused a mutation its handler had checked
    Internal = 999,
}

/// Reasons a transaction is rejected
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ExecutionError {
    /// transaction of {0} bytes exceeds the limit of {1} bytes
    TooLargeTx(usize, usize),
    /// cannot decode transaction: {0}
    DecodeError(String),
    /// payload of {0} bytes exceeds the limit of {1} bytes
    TooLongPayload(usize, usize),
    /// wrong chain id {got}, expected {expected}
    WrongChainId { expected: u8, got: u8 },
    /// wrong signature: {0}
    WrongSignature(String),
    /// unexpected nonce {got}, expected {expected}
    WrongNonce { expected: u64, got: u64 },
    /// coin {0} does not exist
    CoinNotExists(CoinId),
    /// insufficient funds for sender account {address}: wanted {needed} of coin {coin}
    InsufficientFunds {
        address: Address,
        coin: CoinId,
        needed: Amount,
    },
    /// coin {coin} reserve is not sufficient: has {has}, required {required}
    CoinReserveNotSufficient {
        coin: CoinId,
        has: Amount,
        required: Amount,
    },
    /// coin {0} reserve would fall below the minimum reserve
    CoinReserveUnderflow(CoinId),
    /// coin {0} supply would exceed its max supply
    CoinSupplyOverflow(CoinId),
    /// coin to sell and coin to buy are both {0}
    CrossConvert(CoinId),
    /// wanted to get at least {minimum}, would get {got}
    MinimumValueToBuyReached { minimum: Amount, got: Amount },
    /// wanted to sell at most {maximum}, would sell {needed}
    MaximumValueToSellReached { maximum: Amount, needed: Amount },
    /// coin {0} already exists
    CoinAlreadyExists(CoinSymbol),
    /// invalid coin symbol {0}
    InvalidCoinSymbol(CoinSymbol),
    /// coin name is longer than {0} bytes
    InvalidCoinName(usize),
    /// constant reserve ratio {0} is out of bounds
    WrongCrr(u32),
    /// wrong coin supply: {0}
    WrongCoinSupply(String),
    /// invalid multisend list: {0}
    InvalidMultisendData(String),
    /// candidate {0} already exists
    CandidateExists(Pubkey),
    /// candidate {0} not found
    CandidateNotFound(Pubkey),
    /// commission {0} is out of bounds
    WrongCommission(u32),
    /// stake of {0} in coin {1} not found
    StakeNotFound(Address, CoinId),
    /// insufficient stake of {address} in coin {coin}: has {has}, wanted {wanted}
    InsufficientStake {
        address: Address,
        coin: CoinId,
        has: Amount,
        wanted: Amount,
    },
    /// {0} is not the owner of candidate {1}
    IsNotOwnerOfCandidate(Address, Pubkey),
    /// stake should be positive
    StakeShouldBePositive,
    /// stake is too low to enter
    TooLowStake,
    /// public key {0} is in the block list
    PublicKeyInBlockList(Pubkey),
    /// new public key {0} is the current one
    NewPublicKeyIsBad(Pubkey),
    /// halt height {height} is below the current height {current}
    WrongHaltHeight { height: u64, current: u64 },
    /// state error: {0}
    StateError(#[from] StateError),
}

impl ExecutionError {
    /// Code reported to the consensus engine
    pub fn code(&self) -> ResponseCode {
        match self {
            ExecutionError::TooLargeTx(..) => ResponseCode::TooLargeTx,
            ExecutionError::DecodeError(_) => ResponseCode::DecodeError,
            ExecutionError::TooLongPayload(..) => ResponseCode::TooLongPayload,
            ExecutionError::WrongChainId { .. } => ResponseCode::WrongChainId,
            ExecutionError::WrongSignature(_) => ResponseCode::WrongSignature,
            ExecutionError::WrongNonce { .. } => ResponseCode::WrongNonce,
            ExecutionError::CoinNotExists(_) => ResponseCode::CoinNotExists,
            ExecutionError::InsufficientFunds { .. } => ResponseCode::InsufficientFunds,
            ExecutionError::CoinReserveNotSufficient { .. } => {
                ResponseCode::CoinReserveNotSufficient
            }
            ExecutionError::CoinReserveUnderflow(_) => ResponseCode::CoinReserveUnderflow,
            ExecutionError::CoinSupplyOverflow(_) => ResponseCode::CoinSupplyOverflow,
            ExecutionError::CrossConvert(_) => ResponseCode::CrossConvert,
            ExecutionError::MinimumValueToBuyReached { .. } => {
                ResponseCode::MinimumValueToBuyReached
            }
            ExecutionError::MaximumValueToSellReached { .. } => {
                ResponseCode::MaximumValueToSellReached
            }
            ExecutionError::CoinAlreadyExists(_) => ResponseCode::CoinAlreadyExists,
            ExecutionError::InvalidCoinSymbol(_) => ResponseCode::InvalidCoinSymbol,
            ExecutionError::InvalidCoinName(_) => ResponseCode::InvalidCoinName,
            ExecutionError::WrongCrr(_) => ResponseCode::WrongCrr,
            ExecutionError::WrongCoinSupply(_) => ResponseCode::WrongCoinSupply,
            ExecutionError::InvalidMultisendData(_) => ResponseCode::InvalidMultisendData,
            ExecutionError::CandidateExists(_) => ResponseCode::CandidateExists,
            ExecutionError::CandidateNotFound(_) => ResponseCode::CandidateNotFound,
            ExecutionError::WrongCommission(_) => ResponseCode::WrongCommission,
            ExecutionError::StakeNotFound(..) => ResponseCode::StakeNotFound,
            ExecutionError::InsufficientStake { .. } => ResponseCode::InsufficientStake,
            ExecutionError::IsNotOwnerOfCandidate(..) => ResponseCode::IsNotOwnerOfCandidate,
            ExecutionError::StakeShouldBePositive => ResponseCode::StakeShouldBePositive,
            ExecutionError::TooLowStake => ResponseCode::TooLowStake,
            ExecutionError::PublicKeyInBlockList(_) => ResponseCode::PublicKeyInBlockList,
            ExecutionError::NewPublicKeyIsBad(_) => ResponseCode::NewPublicKeyIsBad,
            ExecutionError::WrongHaltHeight { .. } => ResponseCode::WrongHaltHeight,
            ExecutionError::StateError(err) => match err {
                StateError::CandidateExists(_) => ResponseCode::CandidateExists,
                StateError::CandidateNotFound(_) => ResponseCode::CandidateNotFound,
                StateError::PublicKeyInBlockList(_) => ResponseCode::PublicKeyInBlockList,
                StateError::StakeNotFound(..) => ResponseCode::StakeNotFound,
                StateError::InsufficientStake(..) => ResponseCode::InsufficientStake,
                StateError::InsufficientFunds(..) => ResponseCode::InsufficientFunds,
                StateError::CoinNotExists(_) => ResponseCode::CoinNotExists,
                StateError::ReserveUnderflow(_) => ResponseCode::CoinReserveUnderflow,
                StateError::SupplyOverflow(_) => ResponseCode::CoinSupplyOverflow,
                _ => ResponseCode::Internal,
            },
        }
    }
}
