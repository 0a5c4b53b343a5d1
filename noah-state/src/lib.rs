// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! State of the chain: balances, coins and their bonding curves, candidates and their
//! delegations, the validator set, and the ledgers of deferred funds. Every module keeps
//! its entries in memory with dirty tracking and writes them to the tree store on `commit`.
//!
//! # Architecture
//!
//! ## state.rs
//! `State` owns every module, commits them in a fixed order and runs the conservation check.
//!
//! ## bus.rs
//! Narrow traits through which a module reaches the others. A `Bus` is a set of mutable
//! borrows split from the `State`, there is no shared registry.
//!
//! ## checker.rs
//! Per block deltas: what moved of each coin against how its volume changed.
//!
//! ## events.rs
//! Rewards, slashes and unbonds of the block, stored by height outside of the root hash.
//!
//! ## Test exports
//!
//! With the `test-exports` feature, mocks of the bus traits are exported.

pub mod accounts;
pub mod app;
pub mod bus;
pub mod candidates;
pub mod checker;
pub mod coins;
mod config;
mod error;
pub mod events;
pub mod frozen_funds;
pub mod halts;
mod state;
pub mod validators;
pub mod waitlist;

pub use coins::formula;
pub use config::StateConfig;
pub use error::{StateError, StateResult};
pub use state::State;

#[cfg(test)]
pub(crate) mod test_tools {
    use crate::bus::{
        Bus, MockAccountsBus, MockAppBus, MockCoinsBus, MockEventsBus, MockFrozenFundsBus,
        MockWaitListBus,
    };
    use noah_db_exports::{DBBatch, ShareableTreeStore, TreeStoreConfig, TreeStoreController};
    use noah_db_worker::TreeStore;
    use noah_models::address::ADDRESS_SIZE_BYTES;
    use noah_models::Address;
    use parking_lot::RwLock;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Fresh store in a temporary directory, dropped with the directory
    pub fn open_store() -> (TempDir, ShareableTreeStore) {
        let dir = tempfile::tempdir().expect("cannot create temp dir");
        let store = TreeStore::new(TreeStoreConfig {
            path: dir.path().to_path_buf(),
            keep_versions: 10,
        });
        let db: Box<dyn TreeStoreController> = Box::new(store);
        (dir, Arc::new(RwLock::new(db)))
    }

    pub fn address(byte: u8) -> Address {
        Address::from_bytes(&[byte; ADDRESS_SIZE_BYTES])
    }

    /// Applies a batch and saves a version
    pub fn commit_batch(db: &ShareableTreeStore, batch: DBBatch) {
        let mut db = db.write();
        db.write_batch(batch);
        db.save_version().expect("cannot save version");
    }

    /// Mocks behind every bus trait, without expectations
    pub struct MockedBus {
        pub accounts: MockAccountsBus,
        pub coins: MockCoinsBus,
        pub app: MockAppBus,
        pub frozen_funds: MockFrozenFundsBus,
        pub waitlist: MockWaitListBus,
        pub events: MockEventsBus,
    }

    impl MockedBus {
        pub fn new() -> Self {
            MockedBus {
                accounts: MockAccountsBus::new(),
                coins: MockCoinsBus::new(),
                app: MockAppBus::new(),
                frozen_funds: MockFrozenFundsBus::new(),
                waitlist: MockWaitListBus::new(),
                events: MockEventsBus::new(),
            }
        }

        pub fn bus(&mut self) -> Bus<'_> {
            Bus {
                accounts: &mut self.accounts,
                coins: &mut self.coins,
                app: &mut self.app,
                frozen_funds: &mut self.frozen_funds,
                waitlist: &mut self.waitlist,
                events: &mut self.events,
            }
        }
    }
}
