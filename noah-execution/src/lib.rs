// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! Transaction execution on top of the state. The `Executor` decodes and authenticates a
//! transaction, checks its envelope, then hands it to the handler of its type.
//!
//! # Architecture
//!
//! ## executor.rs
//! Envelope checks in a fixed order: size, decoding, payload, chain, signature, nonce and gas
//! coin. A rejection maps to a `ResponseCode`.
//!
//! ## spend.rs
//! Commission pricing and bonding curve moves on working copies of the coins, so that a
//! rejected transaction never touches the state.
//!
//! ## handlers
//! One module per family of transaction types.

mod config;
mod error;
mod executor;
mod handlers;
mod spend;

pub use config::ExecutionConfig;
pub use error::{ExecutionError, ExecutionResult, ResponseCode};
pub use executor::{Executor, TxResponse};
pub use handlers::Tag;

#[cfg(test)]
pub(crate) mod test_tools {
    use noah_db_exports::{ShareableTreeStore, TreeStoreConfig, TreeStoreController};
    use noah_db_worker::TreeStore;
    use noah_models::address::ADDRESS_SIZE_BYTES;
    use noah_models::transaction::{SignedTransaction, Transaction, TransactionData};
    use noah_models::{Address, Amount, CoinId, CoinSymbol};
    use noah_signature::KeyPair;
    use noah_state::bus::AccountsBus;
    use noah_state::{State, StateConfig};
    use parking_lot::RwLock;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Empty state in a temporary directory, dropped with the directory
    pub fn open_state() -> (TempDir, State) {
        let dir = tempfile::tempdir().expect("cannot create temp dir");
        let store = TreeStore::new(TreeStoreConfig {
            path: dir.path().to_path_buf(),
            keep_versions: 10,
        });
        let db: Box<dyn TreeStoreController> = Box::new(store);
        let db: ShareableTreeStore = Arc::new(RwLock::new(db));
        let config = StateConfig {
            unbond_period: 100,
            ..Default::default()
        };
        (dir, State::new(db, config))
    }

    pub fn address(byte: u8) -> Address {
        Address::from_bytes(&[byte; ADDRESS_SIZE_BYTES])
    }

    /// Creates a custom coin whose supply is held by `holder`
    pub fn create_test_coin(
        state: &mut State,
        id: CoinId,
        volume: u64,
        reserve: u64,
        crr: u32,
        holder: Address,
    ) {
        let volume = Amount::from_noah(volume);
        state
            .coins
            .create(
                id,
                CoinSymbol::new(&format!("TEST{}", id.0)).expect("invalid test symbol"),
                "Test coin".to_string(),
                volume.clone(),
                crr,
                Amount::from_noah(reserve),
                Amount::from_noah(1_000_000_000),
                None,
            )
            .expect("cannot create test coin");
        state.app.set_coins_count(id.0);
        state.accounts.add_balance(&holder, id, &volume);
    }

    /// Signs a transaction on chain 1, paid in base coin at gas price 1
    pub fn signed_tx(keypair: &KeyPair, nonce: u64, data: TransactionData) -> SignedTransaction {
        Transaction {
            nonce,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data,
            payload: Vec::new(),
        }
        .sign(keypair)
        .expect("cannot sign transaction")
    }
}
