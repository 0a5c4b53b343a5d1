// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Owner of every state module.
//!
//! A block mutates the modules in memory. `commit` gathers their dirty entries into one
//! batch written in a fixed order, then saves a new version of the tree store.

use crate::accounts::Accounts;
use crate::app::{App, AppModel};
use crate::bus::{AppBus, Bus};
use crate::candidates::Candidates;
use crate::checker::Checker;
use crate::coins::Coins;
use crate::config::StateConfig;
use crate::error::{StateError, StateResult};
use crate::events::Events;
use crate::frozen_funds::FrozenFunds;
use crate::halts::Halts;
use crate::validators::Validators;
use crate::waitlist::WaitList;
use noah_db_exports::{DBBatch, ShareableTreeStore};
use noah_hash::Hash;
use noah_models::app_state::AppState;
use tracing::{debug, info};

/// The whole state of the chain at the working version of the tree store
pub struct State {
    db: ShareableTreeStore,
    config: StateConfig,
    pub app: App,
    pub accounts: Accounts,
    pub coins: Coins,
    pub candidates: Candidates,
    pub validators: Validators,
    pub frozen_funds: FrozenFunds,
    pub waitlist: WaitList,
    pub halts: Halts,
    pub events: Events,
    /// deltas that belong to no module, such as the block reward issuance
    checker: Checker,
}

impl State {
    /// Loads every module from the working version of `db`
    pub fn new(db: ShareableTreeStore, config: StateConfig) -> Self {
        State {
            app: App::new(db.clone()),
            accounts: Accounts::new(db.clone()),
            coins: Coins::new(db.clone()),
            candidates: Candidates::new(db.clone(), &config),
            validators: Validators::new(db.clone(), &config),
            frozen_funds: FrozenFunds::new(db.clone()),
            waitlist: WaitList::new(db.clone()),
            halts: Halts::new(db.clone()),
            events: Events::new(db.clone()),
            checker: Checker::new(),
            config,
            db,
        }
    }

    pub fn db(&self) -> &ShareableTreeStore {
        &self.db
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Last saved version
    pub fn version(&self) -> u64 {
        self.db.read().version()
    }

    /// Root hash of the last saved version
    pub fn root_hash(&self) -> Hash {
        self.db.read().root_hash()
    }

    /// Cross module borrows of the modules that do not drive the call
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

    /// Splits the state into the staking modules and a bus over all the others
    pub fn split(&mut self) -> (&mut Candidates, &mut Validators, &mut Checker, Bus<'_>) {
        (
            &mut self.candidates,
            &mut self.validators,
            &mut self.checker,
            Bus {
                accounts: &mut self.accounts,
                coins: &mut self.coins,
                app: &mut self.app,
                frozen_funds: &mut self.frozen_funds,
                waitlist: &mut self.waitlist,
                events: &mut self.events,
            },
        )
    }

    /// Deltas that belong to no module
    pub fn checker_mut(&mut self) -> &mut Checker {
        &mut self.checker
    }

    /// Verifies that every custom coin moved exactly as much as its volume changed
    pub fn check(&self) -> StateResult<()> {
        let mut merged = self.checker.clone();
        merged.merge(self.app.checker());
        merged.merge(self.accounts.checker());
        merged.merge(self.coins.checker());
        merged.merge(self.candidates.checker());
        merged.merge(self.frozen_funds.checker());
        merged.merge(self.waitlist.checker());
        merged.remove_base_coin();
        merged.check()
    }

    fn reset_checkers(&mut self) {
        self.checker.reset();
        self.app.reset_checker();
        self.accounts.reset_checker();
        self.coins.reset_checker();
        self.candidates.reset_checker();
        self.frozen_funds.reset_checker();
        self.waitlist.reset_checker();
    }

    /// Writes every dirty entry and saves a new version. Returns its root hash and number.
    pub fn commit(&mut self) -> StateResult<(Hash, u64)> {
        let mut batch = DBBatch::new();
        self.app.commit(&mut batch);
        self.accounts.commit(&mut batch);
        self.coins.commit(&mut batch);
        self.candidates.commit(&mut batch);
        self.validators.commit(&mut batch);
        self.frozen_funds.commit(&mut batch);
        self.waitlist.commit(&mut batch);
        self.halts.commit(&mut batch);
        self.events.commit(self.app.get_height());
        debug!("committing {} changed keys", batch.len());

        let (hash, version) = {
            let mut db = self.db.write();
            db.write_batch(batch);
            db.save_version()?
        };
        self.reset_checkers();
        info!("state version {} saved, root {}", version, hash);
        Ok((hash, version))
    }

    /// Drops every uncommitted change and reloads the modules from the last saved version
    pub fn discard(&mut self) {
        self.db.write().discard_changes();
        *self = State::new(self.db.clone(), self.config.clone());
    }

    /// Genesis document of the working version. Uncommitted changes are not included.
    pub fn export(&self, height: u64) -> AppState {
        let model = self.app.model();
        let (candidates, block_list_candidates) = self.candidates.export();
        AppState {
            start_height: height,
            validators: self.validators.export(),
            candidates,
            block_list_candidates,
            waitlist: self.waitlist.export(),
            coins: self.coins.export(model.coins_count),
            frozen_funds: self.frozen_funds.export(height),
            accounts: self.accounts.export(),
            max_gas: model.max_gas,
            total_slashed: self.app.get_total_slashed(),
            halt_blocks: self.halts.export(height),
        }
    }

    /// Loads a genesis document into an empty state
    pub fn import(&mut self, app_state: &AppState) -> StateResult<()> {
        app_state
            .verify()
            .map_err(|err| StateError::InvalidAppState(err.to_string()))?;
        self.app.set_model(AppModel {
            max_gas: app_state.max_gas,
            total_slashed: app_state.total_slashed.clone(),
            coins_count: app_state
                .coins
                .iter()
                .map(|coin| coin.id.0)
                .max()
                .unwrap_or_default(),
            height: app_state.start_height,
        });
        self.accounts.import(&app_state.accounts);
        self.coins.import(&app_state.coins)?;
        self.candidates
            .import(&app_state.candidates, &app_state.block_list_candidates)?;
        self.validators.import(&app_state.validators);
        self.frozen_funds.import(&app_state.frozen_funds);
        self.waitlist.import(&app_state.waitlist);
        self.halts.import(&app_state.halt_blocks);
        self.check()?;
        info!(
            "imported {} accounts, {} coins, {} candidates at height {}",
            app_state.accounts.len(),
            app_state.coins.len(),
            app_state.candidates.len(),
            app_state.start_height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AccountsBus, CandidatesBus, CoinsBus};
    use crate::checker::plus;
    use crate::test_tools::{address, open_store};
    use assert_matches::assert_matches;
    use noah_models::coin::CoinSymbol;
    use noah_models::{Amount, CoinId, Pubkey};

    fn scripted_block(state: &mut State) {
        let key = Pubkey::from_bytes([4; 32]);
        state
            .candidates
            .create(address(1), address(1), address(1), key, 10)
            .unwrap();
        state.candidates.set_online(&key).unwrap();
        state
            .accounts
            .add_balance(&address(1), CoinId::BASE, &Amount::from_noah(1_000_000));
        state
            .coins
            .create(
                CoinId(1),
                CoinSymbol::new("ABC").unwrap(),
                "Abc".to_string(),
                Amount::from_noah(1000),
                50,
                Amount::from_noah(500),
                Amount::from_noah(100_000),
                None,
            )
            .unwrap();
        state.app.set_coins_count(1);
        state
            .accounts
            .add_balance(&address(1), CoinId(1), &Amount::from_noah(400));
        state
            .candidates
            .delegate(
                &address(1),
                &key,
                CoinId(1),
                &Amount::from_noah(600),
                &Amount::zero(),
            )
            .unwrap();
        let (candidates, _, _, mut bus) = state.split();
        candidates.recalculate_stakes(1, &mut bus).unwrap();
    }

    #[test]
    fn test_commit_is_deterministic() {
        let (_dir_a, db_a) = open_store();
        let (_dir_b, db_b) = open_store();
        let mut state_a = State::new(db_a, StateConfig::default());
        let mut state_b = State::new(db_b, StateConfig::default());
        scripted_block(&mut state_a);
        scripted_block(&mut state_b);
        state_a.check().unwrap();

        let (hash_a, version_a) = state_a.commit().unwrap();
        let (hash_b, version_b) = state_b.commit().unwrap();
        assert_eq!(version_a, 1);
        assert_eq!((hash_a, version_a), (hash_b, version_b));

        let key = Pubkey::from_bytes([4; 32]);
        let candidate = state_a.candidates.get_candidate(&key).unwrap();
        assert_eq!(candidate.id, 1);
        assert!(!candidate.total_noah_stake.is_zero());
    }

    #[test]
    fn test_check_catches_unbacked_coins() {
        let (_dir, db) = open_store();
        let mut state = State::new(db, StateConfig::default());
        scripted_block(&mut state);
        state.commit().unwrap();
        state
            .accounts
            .add_balance(&address(2), CoinId(1), &Amount::from_noah(1));
        assert_matches!(state.check(), Err(StateError::CheckerError(_)));

        state.coins.add_volume(CoinId(1), &Amount::from_noah(1)).unwrap();
        state.check().unwrap();
        state
            .checker_mut()
            .add_coin(CoinId(1), plus(&Amount::from_noah(1)));
        assert!(state.check().is_err());

        state.discard();
        state.check().unwrap();
        assert!(state
            .accounts
            .get_balance(&address(2), CoinId(1))
            .is_zero());
    }

    #[test]
    fn test_export_then_import() {
        let (_dir, db) = open_store();
        let mut state = State::new(db, StateConfig::default());
        scripted_block(&mut state);
        state.app.set_height(10);
        state.commit().unwrap();
        let exported = state.export(10);
        assert_eq!(exported.coins.len(), 1);
        assert_eq!(exported.candidates.len(), 1);

        let (_dir_copy, db_copy) = open_store();
        let mut copy = State::new(db_copy, StateConfig::default());
        copy.import(&exported).unwrap();
        copy.commit().unwrap();
        assert_eq!(copy.export(10), exported);
        assert_eq!(copy.root_hash(), state.root_hash());
    }
}
