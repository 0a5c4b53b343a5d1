// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Data types shared by every crate of the node: addresses, keys, coins, amounts,
//! transactions, the genesis document and the protocol constants.

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

pub use address::Address;
pub use amount::Amount;
pub use coin::{CoinId, CoinSymbol, CoinVersion};
pub use error::{ModelsError, ModelsResult};
pub use pubkey::{Pubkey, TmAddress};

/// account addresses
pub mod address;
/// arbitrary precision amounts
pub mod amount;
/// genesis and export document
pub mod app_state;
/// coin identifiers and tickers
pub mod coin;
/// protocol constants
pub mod config;
/// models error
pub mod error;
/// balance changes recorded per block
pub mod event;
/// candidate consensus keys
pub mod pubkey;
/// transactions and their wire format
pub mod transaction;
