// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Block lifecycle driven by the consensus engine: `begin_block`, `deliver_tx` for each
//! transaction, `end_block`, then `commit`.
//!
//! Blocks are built on a working `State`. Queries and transaction checks are served by a second
//! `State` over the same store, rebuilt after every commit so that it always reflects the last
//! committed version.

use crate::error::{NodeError, NodeResult};
use noah_db_exports::ShareableTreeStore;
use noah_execution::{ExecutionConfig, Executor, TxResponse};
use noah_hash::Hash;
use noah_logging::noah_trace;
use noah_models::app_state::AppState;
use noah_models::event::Event;
use noah_models::config::constants::{
    block_reward, BLOCKS_PER_PAYOUT, TOTAL_VOTING_POWER, VALIDATORS_COUNT,
};
use noah_models::{Address, Amount, CoinId, Pubkey, TmAddress};
use noah_state::bus::{AccountsBus, AppBus, CandidatesBus, CoinsBus, EventsBus};
use noah_state::candidates::Candidate;
use noah_state::checker::plus;
use noah_state::coins::Coin;
use noah_state::validators::Validator;
use noah_state::{State, StateConfig};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Block lifecycle configuration
#[derive(Debug, Clone)]
pub struct BlockchainConfig {
    /// state modules settings
    pub state: StateConfig,
    /// transaction envelope limits
    pub execution: ExecutionConfig,
    /// size of the active validator set
    pub validators_count: usize,
    /// blocks between two payouts, the validator set is rebuilt at the same heights
    pub blocks_per_payout: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        BlockchainConfig {
            state: StateConfig::default(),
            execution: ExecutionConfig::default(),
            validators_count: VALIDATORS_COUNT,
            blocks_per_payout: BLOCKS_PER_PAYOUT,
        }
    }
}

/// Whether a validator signed the previous block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub tm_address: TmAddress,
    pub signed: bool,
}

/// Double signing reported by the consensus engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evidence {
    pub tm_address: TmAddress,
    pub total_voting_power: u64,
}

/// Voting power sent to the consensus engine, zero removes the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorUpdate {
    pub pub_key: Pubkey,
    pub power: u64,
}

/// Share of the total voting power, at least 1
fn voting_power(stake: &Amount, total: &Amount) -> u64 {
    if total.is_zero() {
        return 1;
    }
    stake
        .mul_div(Amount::from_u64(TOTAL_VOTING_POWER).as_biguint(), total.as_biguint())
        .to_u64()
        .unwrap_or(TOTAL_VOTING_POWER)
        .max(1)
}

pub struct Blockchain {
    db: ShareableTreeStore,
    config: BlockchainConfig,
    executor: Executor,
    /// block being built
    state: State,
    /// last committed version
    committed: Arc<RwLock<State>>,
    height: u64,
    /// commissions of the block
    reward_pool: Amount,
    /// a validator left the set during the block
    validators_dropped: bool,
}

impl Blockchain {
    /// Opens the state at the last saved version of `db`
    pub fn new(db: ShareableTreeStore, config: BlockchainConfig) -> Self {
        let state = State::new(db.clone(), config.state.clone());
        let committed = State::new(db.clone(), config.state.clone());
        let height = state.app.get_height();
        Blockchain {
            executor: Executor::new(config.execution.clone()),
            db,
            config,
            state,
            committed: Arc::new(RwLock::new(committed)),
            height,
            reward_pool: Amount::zero(),
            validators_dropped: false,
        }
    }

    /// Last started block, or the last committed one between blocks
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Saved versions, zero before the genesis
    pub fn version(&self) -> u64 {
        self.state.version()
    }

    /// Imports the genesis document and commits it. Returns the initial validator set.
    pub fn init_chain(&mut self, app_state: &AppState) -> NodeResult<Vec<ValidatorUpdate>> {
        let version = self.state.version();
        if version != 0 {
            return Err(NodeError::AlreadyInitialized(version));
        }
        self.state.import(app_state)?;
        self.height = app_state.start_height;
        self.commit()?;

        let validators = self.state.validators.get_validators();
        let total: Amount = validators
            .iter()
            .map(|validator| &validator.total_noah_stake)
            .sum();
        Ok(validators
            .iter()
            .map(|validator| ValidatorUpdate {
                pub_key: validator.pub_key,
                power: voting_power(&validator.total_noah_stake, &total),
            })
            .collect())
    }

    /// Records the signatures of the previous block, punishes double signers and releases the
    /// frozen funds due at `height`
    pub fn begin_block(
        &mut self,
        height: u64,
        votes: &[Vote],
        evidence: &[Evidence],
    ) -> NodeResult<()> {
        self.check_halt(height)?;
        self.height = height;
        self.state.app.set_height(height);

        for vote in votes {
            if vote.signed {
                self.state
                    .validators
                    .set_validator_present(height, &vote.tm_address);
                continue;
            }
            let (candidates, validators, _, mut bus) = self.state.split();
            if validators.set_validator_absent(height, &vote.tm_address, candidates, &mut bus)? {
                self.validators_dropped = true;
            }
        }

        let punish_until = height + self.state.config().unbond_period;
        for item in evidence {
            if self
                .state
                .validators
                .get_by_tm_address(&item.tm_address)
                .is_none()
            {
                continue;
            }
            let Some((candidate_id, candidate_key)) = self
                .state
                .candidates
                .get_candidate_by_tm_address(&item.tm_address)
                .filter(|candidate| candidate.is_online())
                .map(|candidate| (candidate.id, candidate.pub_key))
            else {
                continue;
            };
            let state = &mut self.state;
            state.frozen_funds.punish_frozen_funds_with_id(
                height..=punish_until,
                candidate_id,
                &candidate_key,
                &mut state.coins,
                &mut state.app,
                &mut state.events,
            )?;
            state.validators.punish_byzantine_validator(&item.tm_address);
            let (candidates, _, _, mut bus) = state.split();
            candidates.punish_byzantine(height, &item.tm_address, &mut bus)?;
            self.validators_dropped = true;
        }

        let funds = self.state.frozen_funds.get_frozen_funds(height);
        if !funds.is_empty() {
            for fund in &funds {
                self.state
                    .accounts
                    .add_balance(&fund.address, fund.coin, &fund.value);
                if let Some(candidate_key) = fund.candidate_key {
                    self.state.events.add_event(Event::Unbond {
                        address: fund.address,
                        amount: fund.value.clone(),
                        coin: fund.coin,
                        validator_pub_key: candidate_key,
                    });
                }
            }
            self.state.frozen_funds.delete(height);
            debug!("{} frozen funds released at height {}", funds.len(), height);
        }
        Ok(())
    }

    /// Fails when the validators that voted to halt at `height` hold more than two thirds of
    /// the stake of the set
    fn check_halt(&self, height: u64) -> NodeResult<()> {
        let votes = self.state.halts.get_halt_blocks(height);
        if votes.is_empty() {
            return Ok(());
        }
        let mut total = Amount::zero();
        let mut voted = Amount::zero();
        for validator in self.state.validators.get_validators() {
            total += &validator.total_noah_stake;
            if votes.contains(&validator.pub_key) {
                voted += &validator.total_noah_stake;
            }
        }
        if !total.is_zero() && voted.mul_u64(3) > total.mul_u64(2) {
            warn!("{} of {} staked voted to halt at height {}", voted, total, height);
            return Err(NodeError::Halted(height));
        }
        debug!("{} halt votes at height {} below the threshold", votes.len(), height);
        Ok(())
    }

    /// Applies a transaction of the current block
    pub fn deliver_tx(&mut self, raw: &[u8]) -> TxResponse {
        self.executor
            .deliver_tx(&mut self.state, raw, self.height, &mut self.reward_pool)
    }

    /// Checks a transaction against the last committed version, concurrently with the queries
    pub fn check_tx(&self, raw: &[u8]) -> TxResponse {
        let committed = self.committed.read();
        self.executor.check_tx(&committed, raw, self.height + 1)
    }

    /// Distributes the block reward. At payout heights, or when a validator left the set,
    /// rebuilds the set and returns the voting power changes.
    pub fn end_block(&mut self, height: u64) -> NodeResult<Vec<ValidatorUpdate>> {
        let emission = block_reward(height);
        self.state
            .checker_mut()
            .add_coin_volume(CoinId::BASE, plus(&emission));
        let mut reward = emission;
        reward += &self.reward_pool;
        let rest = self.state.validators.distribute_reward(height, &reward);
        self.state.app.add_total_slashed(&rest);

        let is_payout = height % self.config.blocks_per_payout == 0;
        if is_payout {
            let (candidates, validators, _, mut bus) = self.state.split();
            validators.pay_rewards(height, &*candidates, &mut bus)?;
        }
        self.state.halts.delete(height);
        if !is_payout && !self.validators_dropped {
            return Ok(Vec::new());
        }
        self.update_validators(height)
    }

    fn update_validators(&mut self, height: u64) -> NodeResult<Vec<ValidatorUpdate>> {
        self.validators_dropped = false;
        let validators_count = self.config.validators_count;
        let (candidates, validators, _, mut bus) = self.state.split();
        candidates.recalculate_stakes(height, &mut bus)?;

        let new_set = candidates.get_new_candidates(validators_count);
        if new_set.is_empty() {
            warn!("no candidate can validate at height {}, the set is kept", height);
            return Ok(Vec::new());
        }
        let total: Amount = new_set
            .iter()
            .map(|candidate| &candidate.total_noah_stake)
            .sum();
        let mut updates: Vec<ValidatorUpdate> = new_set
            .iter()
            .map(|candidate| ValidatorUpdate {
                pub_key: candidate.pub_key,
                power: voting_power(&candidate.total_noah_stake, &total),
            })
            .collect();
        // a validator that left at an earlier rebuild was already removed
        for validator in validators.get_validators() {
            if !validator.left_set
                && !new_set
                    .iter()
                    .any(|candidate| candidate.pub_key == validator.pub_key)
            {
                updates.push(ValidatorUpdate {
                    pub_key: validator.pub_key,
                    power: 0,
                });
            }
        }
        validators.set_new_validators(&new_set);
        info!(
            "validator set rebuilt at height {}: {} validators",
            height,
            new_set.len()
        );
        noah_trace!("blockchain.update_validators", {
            "height": height,
            "count": new_set.len(),
            "total_stake": total.to_string()
        });
        Ok(updates)
    }

    /// Verifies the conservation of every custom coin, then saves a new version and publishes
    /// it to the readers. A failed check leaves the block uncommitted and the node must stop.
    pub fn commit(&mut self) -> NodeResult<(Hash, u64)> {
        self.state
            .check()
            .map_err(|err| NodeError::ConservationCheckFailed(self.height, err))?;
        let (hash, version) = self.state.commit()?;
        *self.committed.write() = State::new(self.db.clone(), self.config.state.clone());
        self.reward_pool = Amount::zero();
        self.validators_dropped = false;
        info!(
            "height {} committed as version {}, root {}",
            self.height, version, hash
        );
        Ok((hash, version))
    }

    /// Drops a partially applied block
    pub fn discard(&mut self) {
        self.state.discard();
        self.height = self.state.app.get_height();
        self.reward_pool = Amount::zero();
        self.validators_dropped = false;
    }

    /// Committed balance
    pub fn balance(&self, address: &Address, coin: CoinId) -> Amount {
        self.committed.read().accounts.get_balance(address, coin)
    }

    /// Committed candidate
    pub fn candidate(&self, pub_key: &Pubkey) -> Option<Candidate> {
        self.committed
            .read()
            .candidates
            .get_candidate(pub_key)
            .cloned()
    }

    /// Committed validator set
    pub fn validators(&self) -> Vec<Validator> {
        self.committed.read().validators.get_validators().to_vec()
    }

    /// Committed custom coin
    pub fn coin(&self, id: CoinId) -> Option<Coin> {
        self.committed.read().coins.get_coin(id)
    }

    /// Events recorded by the committed block at `height`
    pub fn events(&self, height: u64) -> Vec<Event> {
        self.committed.read().events.load_events(height)
    }

    /// Genesis document of the committed version
    pub fn export(&self) -> AppState {
        let committed = self.committed.read();
        committed.export(committed.app.get_height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use noah_db_exports::{TreeStoreConfig, TreeStoreController};
    use noah_db_worker::TreeStore;
    use noah_models::address::ADDRESS_SIZE_BYTES;
    use noah_models::app_state::{
        AppAccount, AppBalance, AppCandidate, AppFrozenFund, AppHaltBlock, AppStake,
        AppValidator,
    };
    use noah_models::config::constants::DAO_COMMISSION;
    use noah_models::event::Role;
    use noah_models::transaction::{Transaction, TransactionData};
    use noah_signature::KeyPair;
    use tempfile::TempDir;

    fn address(byte: u8) -> Address {
        Address::from_bytes(&[byte; ADDRESS_SIZE_BYTES])
    }

    fn pubkey(byte: u8) -> Pubkey {
        Pubkey::from_bytes([byte; 32])
    }

    fn open(config: BlockchainConfig) -> (TempDir, Blockchain) {
        let dir = tempfile::tempdir().expect("cannot create temp dir");
        let store = TreeStore::new(TreeStoreConfig {
            path: dir.path().to_path_buf(),
            keep_versions: 10,
        });
        let db: Box<dyn TreeStoreController> = Box::new(store);
        let config = BlockchainConfig {
            state: StateConfig {
                dao_address: address(50),
                developers_address: address(51),
                ..config.state
            },
            ..config
        };
        (dir, Blockchain::new(Arc::new(RwLock::new(db)), config))
    }

    fn candidate(id: u32, key: Pubkey, owner: Address, stake: u64) -> AppCandidate {
        AppCandidate {
            id,
            reward_address: owner,
            owner_address: owner,
            control_address: owner,
            total_noah_stake: Amount::from_noah(stake),
            public_key: key,
            commission: 10,
            stakes: vec![AppStake {
                owner,
                coin: CoinId::BASE,
                value: Amount::from_noah(stake),
                noah_value: Amount::from_noah(stake),
            }],
            updates: Vec::new(),
            status: 2,
            to_drop: false,
        }
    }

    /// one validator with a self stake of 100, a second online candidate with 50, and a
    /// funded account
    fn genesis(funded: Address) -> AppState {
        AppState {
            start_height: 0,
            validators: vec![AppValidator {
                total_noah_stake: Amount::from_noah(100),
                public_key: pubkey(4),
                accum_reward: Amount::zero(),
                absent_times: 0,
            }],
            candidates: vec![
                candidate(1, pubkey(4), address(1), 100),
                candidate(2, pubkey(5), address(2), 50),
            ],
            accounts: vec![AppAccount {
                address: funded,
                balance: vec![AppBalance {
                    coin: CoinId::BASE,
                    value: Amount::from_noah(1000),
                }],
                nonce: 0,
            }],
            max_gas: 100_000,
            ..Default::default()
        }
    }

    fn signed(tm_address: TmAddress) -> Vote {
        Vote {
            tm_address,
            signed: true,
        }
    }

    #[test]
    fn test_init_chain() {
        let (_dir, mut chain) = open(BlockchainConfig::default());
        let updates = chain.init_chain(&genesis(address(9))).unwrap();
        assert_eq!(
            updates,
            vec![ValidatorUpdate {
                pub_key: pubkey(4),
                power: TOTAL_VOTING_POWER,
            }]
        );
        assert_eq!(chain.version(), 1);
        assert_eq!(chain.candidate(&pubkey(5)).unwrap().id, 2);
        assert_eq!(
            chain.balance(&address(9), CoinId::BASE),
            Amount::from_noah(1000)
        );
        assert_matches!(
            chain.init_chain(&genesis(address(9))),
            Err(NodeError::AlreadyInitialized(1))
        );
    }

    #[test]
    fn test_block_with_a_transaction() {
        let keypair = KeyPair::generate();
        let sender = Address::from_public_key(&keypair.get_public_key());
        let (_dir, mut chain) = open(BlockchainConfig::default());
        chain.init_chain(&genesis(sender)).unwrap();

        let raw = Transaction {
            nonce: 1,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data: TransactionData::Send {
                coin: CoinId::BASE,
                to: address(7),
                value: Amount::from_noah(10),
            },
            payload: Vec::new(),
        }
        .sign(&keypair)
        .unwrap()
        .to_bytes()
        .unwrap();
        assert!(chain.check_tx(&raw).is_ok());

        chain
            .begin_block(1, &[signed(pubkey(4).tm_address())], &[])
            .unwrap();
        let response = chain.deliver_tx(&raw);
        assert!(response.is_ok(), "{}", response.log);
        // not visible before the commit
        assert!(chain.balance(&address(7), CoinId::BASE).is_zero());
        assert!(chain.end_block(1).unwrap().is_empty());
        let (_, version) = chain.commit().unwrap();
        assert_eq!(version, 2);

        assert_eq!(
            chain.balance(&address(7), CoinId::BASE),
            Amount::from_noah(10)
        );
        // block reward and the 0.01 commission of the send
        assert_eq!(
            chain.validators()[0].accum_reward,
            &Amount::from_noah(1344) + &Amount::from_u64(10_000_000_000_000_000)
        );
        assert_eq!(chain.check_tx(&raw).code, noah_execution::ResponseCode::WrongNonce);
        assert_eq!(chain.export().start_height, 1);
    }

    #[test]
    fn test_discard_drops_the_block() {
        let keypair = KeyPair::generate();
        let sender = Address::from_public_key(&keypair.get_public_key());
        let (_dir, mut chain) = open(BlockchainConfig::default());
        chain.init_chain(&genesis(sender)).unwrap();
        let raw = Transaction {
            nonce: 1,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data: TransactionData::Send {
                coin: CoinId::BASE,
                to: address(7),
                value: Amount::from_noah(10),
            },
            payload: Vec::new(),
        }
        .sign(&keypair)
        .unwrap()
        .to_bytes()
        .unwrap();

        chain.begin_block(1, &[], &[]).unwrap();
        assert!(chain.deliver_tx(&raw).is_ok());
        chain.discard();
        assert_eq!(chain.height(), 0);

        // the same transaction applies again in the replayed block
        chain.begin_block(1, &[], &[]).unwrap();
        assert!(chain.deliver_tx(&raw).is_ok());
        chain.end_block(1).unwrap();
        chain.commit().unwrap();
        assert_eq!(
            chain.balance(&address(7), CoinId::BASE),
            Amount::from_noah(10)
        );
        assert!(chain.coin(CoinId(1)).is_none());
    }

    #[test]
    fn test_payout_and_frozen_funds() {
        let (_dir, mut chain) = open(BlockchainConfig {
            blocks_per_payout: 2,
            ..Default::default()
        });
        let mut app_state = genesis(address(9));
        app_state.frozen_funds.push(AppFrozenFund {
            height: 1,
            address: address(3),
            candidate_key: Some(pubkey(5)),
            candidate_id: 2,
            coin: CoinId::BASE,
            value: Amount::from_noah(5),
        });
        chain.init_chain(&app_state).unwrap();

        let votes = [signed(pubkey(4).tm_address())];
        chain.begin_block(1, &votes, &[]).unwrap();
        chain.end_block(1).unwrap();
        chain.commit().unwrap();
        assert_eq!(
            chain.balance(&address(3), CoinId::BASE),
            Amount::from_noah(5)
        );
        assert_eq!(
            chain.events(1),
            vec![Event::Unbond {
                address: address(3),
                amount: Amount::from_noah(5),
                coin: CoinId::BASE,
                validator_pub_key: pubkey(5),
            }]
        );

        chain.begin_block(2, &votes, &[]).unwrap();
        let updates = chain.end_block(2).unwrap();
        chain.commit().unwrap();
        // both candidates enter the set pro rata to their stake
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].pub_key, pubkey(4));
        assert_eq!(updates[0].power, 66_666_666);
        assert_eq!(updates[1].power, 33_333_333);
        assert_eq!(
            chain.balance(&address(50), CoinId::BASE),
            Amount::from_noah(2 * 1344).percent(DAO_COMMISSION)
        );
        assert!(chain
            .validators()
            .iter()
            .all(|validator| validator.accum_reward.is_zero()));

        let events = chain.events(2);
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            Event::Reward {
                role: Role::Dao,
                address: address(50),
                amount: Amount::from_noah(2 * 1344).percent(DAO_COMMISSION),
                validator_pub_key: pubkey(4),
            }
        );
        assert!(events.iter().all(|event| matches!(
            event,
            Event::Reward { validator_pub_key, .. } if *validator_pub_key == pubkey(4)
        )));
        assert!(chain.events(3).is_empty());
    }

    #[test]
    fn test_absent_validator_is_replaced() {
        let (_dir, mut chain) = open(BlockchainConfig::default());
        chain.init_chain(&genesis(address(9))).unwrap();
        let absent = [Vote {
            tm_address: pubkey(4).tm_address(),
            signed: false,
        }];
        let mut updates = Vec::new();
        for height in 1..=13 {
            chain.begin_block(height, &absent, &[]).unwrap();
            updates = chain.end_block(height).unwrap();
            chain.commit().unwrap();
        }
        assert_eq!(
            updates,
            vec![
                ValidatorUpdate {
                    pub_key: pubkey(5),
                    power: TOTAL_VOTING_POWER,
                },
                ValidatorUpdate {
                    pub_key: pubkey(4),
                    power: 0,
                },
            ]
        );
        let punished = chain.candidate(&pubkey(4)).unwrap();
        assert!(!punished.is_online());
        assert_eq!(punished.stakes[0].value, Amount::from_noah(99));
    }

    #[test]
    fn test_double_signer_is_slashed() {
        let (_dir, mut chain) = open(BlockchainConfig::default());
        chain.init_chain(&genesis(address(9))).unwrap();
        let evidence = [Evidence {
            tm_address: pubkey(4).tm_address(),
            total_voting_power: TOTAL_VOTING_POWER,
        }];
        chain.begin_block(1, &[], &evidence).unwrap();
        let updates = chain.end_block(1).unwrap();
        chain.commit().unwrap();

        assert_eq!(updates.last().unwrap().power, 0);
        let punished = chain.candidate(&pubkey(4)).unwrap();
        assert!(punished.total_noah_stake.is_zero());
        assert!(punished.stakes.is_empty());
        // 95% of the stake comes back after the unbond period
        let release = 1 + StateConfig::default().unbond_period;
        let exported = chain.export();
        let fund = exported
            .frozen_funds
            .iter()
            .find(|fund| fund.height == release)
            .unwrap();
        assert_eq!(fund.value, Amount::from_noah(95));
        assert_eq!(
            chain.events(1),
            vec![Event::Slash {
                address: address(1),
                amount: Amount::from_noah(5),
                coin: CoinId::BASE,
                validator_pub_key: pubkey(4),
            }]
        );
    }

    #[test]
    fn test_halt_votes_stop_the_chain() {
        let (_dir, mut chain) = open(BlockchainConfig::default());
        let mut app_state = genesis(address(9));
        app_state.halt_blocks = vec![
            AppHaltBlock {
                height: 2,
                candidate_key: pubkey(5),
            },
            AppHaltBlock {
                height: 3,
                candidate_key: pubkey(4),
            },
        ];
        chain.init_chain(&app_state).unwrap();
        assert_eq!(chain.export().halt_blocks, app_state.halt_blocks);

        let votes = [signed(pubkey(4).tm_address())];
        for height in 1..=2 {
            // the candidate voting at height 2 holds no stake in the set
            chain.begin_block(height, &votes, &[]).unwrap();
            chain.end_block(height).unwrap();
            chain.commit().unwrap();
        }
        assert!(chain.committed.read().halts.get_halt_blocks(2).is_empty());

        assert_matches!(
            chain.begin_block(3, &votes, &[]),
            Err(NodeError::Halted(3))
        );
        assert_eq!(chain.height(), 2);
    }

    #[test]
    fn test_departed_validator_is_removed_once() {
        let (_dir, mut chain) = open(BlockchainConfig::default());
        let mut app_state = genesis(address(9));
        // an absent validator earns nothing, this reward keeps it listed once out of the set
        app_state.validators[0].accum_reward = Amount::from_noah(1);
        app_state
            .candidates
            .push(candidate(3, pubkey(6), address(3), 30));
        chain.init_chain(&app_state).unwrap();
        let absent = [Vote {
            tm_address: pubkey(4).tm_address(),
            signed: false,
        }];
        let mut updates = Vec::new();
        for height in 1..=13 {
            chain.begin_block(height, &absent, &[]).unwrap();
            updates = chain.end_block(height).unwrap();
            chain.commit().unwrap();
        }
        assert!(updates.contains(&ValidatorUpdate {
            pub_key: pubkey(4),
            power: 0,
        }));
        // kept in the list until its reward is paid
        let departed = chain
            .validators()
            .into_iter()
            .find(|validator| validator.pub_key == pubkey(4))
            .unwrap();
        assert!(departed.left_set);

        let evidence = [Evidence {
            tm_address: pubkey(5).tm_address(),
            total_voting_power: TOTAL_VOTING_POWER,
        }];
        chain.begin_block(14, &[], &evidence).unwrap();
        let updates = chain.end_block(14).unwrap();
        chain.commit().unwrap();
        assert_eq!(
            updates,
            vec![
                ValidatorUpdate {
                    pub_key: pubkey(6),
                    power: TOTAL_VOTING_POWER,
                },
                ValidatorUpdate {
                    pub_key: pubkey(5),
                    power: 0,
                },
            ]
        );
    }

    #[test]
    fn test_check_runs_beside_readers() {
        let keypair = KeyPair::generate();
        let sender = Address::from_public_key(&keypair.get_public_key());
        let (_dir, mut chain) = open(BlockchainConfig::default());
        chain.init_chain(&genesis(sender)).unwrap();
        let raw = Transaction {
            nonce: 1,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data: TransactionData::Send {
                coin: CoinId::BASE,
                to: address(7),
                value: Amount::from_noah(10),
            },
            payload: Vec::new(),
        }
        .sign(&keypair)
        .unwrap()
        .to_bytes()
        .unwrap();

        let reader = chain.committed.read();
        assert!(chain.check_tx(&raw).is_ok());
        // a check leaves the nonce alone
        assert!(chain.check_tx(&raw).is_ok());
        assert!(reader.accounts.get_balance(&address(7), CoinId::BASE).is_zero());
        drop(reader);
        assert_eq!(
            chain.balance(&sender, CoinId::BASE),
            Amount::from_noah(1000)
        );
    }
}
