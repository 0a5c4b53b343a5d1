// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Candidates and their delegations.
//!
//! Every candidate is loaded at start and lives in an arena keyed by its sequential
//! identifier, with lookups by consensus key and consensus address. Delegations first land
//! in a per candidate update queue. `recalculate_stakes` revalues every stake through the
//! coin curves, folds the queue into the live slots, and refunds the stakes that no longer
//! fit to the wait list.

mod model;

pub use model::*;

use crate::bus::{Bus, CandidatesBus, CoinsBus};
use crate::checker::{minus, plus, Checker};
use crate::coins::{noah_value, sell_into_curves, sum_returns};
use crate::config::StateConfig;
use crate::error::{StateError, StateResult};
use noah_db_exports::{
    DBBatch, ShareableTreeStore, CANDIDATES_PREFIX, CANDIDATE_DESER_ERROR, CANDIDATE_SER_ERROR,
};
use noah_logging::noah_trace;
use noah_models::app_state::{AppCandidate, AppStake};
use noah_models::config::constants::{BYZANTINE_KEEP_PERCENT, PUNISH_KEEP_PERCENT};
use noah_models::event::Event;
use noah_models::pubkey::PUBKEY_SIZE_BYTES;
use noah_models::{Address, Amount, CoinId, Pubkey, TmAddress};
use noah_serialization::{
    DeserializeError, Deserializer, Serializer, U32VarIntDeserializer, U32VarIntSerializer,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::Included;
use tracing::{debug, info, warn};

const RECORD_IDENT: u8 = b'r';
const STAKE_IDENT: u8 = b's';
const UPDATES_IDENT: u8 = b'u';
const BLOCK_LIST_IDENT: u8 = b'b';
const MAX_ID_IDENT: u8 = b'm';

/// Live slots addressable by the two bytes of a slot key
pub const MAX_STAKE_SLOTS: usize = u16::MAX as usize + 1;

/// Candidate record key
macro_rules! record_key {
    ($pub_key:expr) => {
        [&[CANDIDATES_PREFIX, RECORD_IDENT][..], &$pub_key.to_bytes()[..]].concat()
    };
}

/// Prefix of every stake slot of a candidate
macro_rules! stake_prefix {
    ($id:expr) => {
        [&[CANDIDATES_PREFIX, STAKE_IDENT][..], &$id.to_be_bytes()[..]].concat()
    };
}

/// Stake slot key
macro_rules! stake_key {
    ($id:expr, $slot:expr) => {
        [
            &stake_prefix!($id)[..],
            &u16::try_from($slot).expect(CANDIDATE_SER_ERROR).to_be_bytes()[..],
        ]
        .concat()
    };
}

/// Pending updates key
macro_rules! updates_key {
    ($id:expr) => {
        [&[CANDIDATES_PREFIX, UPDATES_IDENT][..], &$id.to_be_bytes()[..]].concat()
    };
}

/// Block list entry key
macro_rules! block_list_key {
    ($pub_key:expr) => {
        [&[CANDIDATES_PREFIX, BLOCK_LIST_IDENT][..], &$pub_key.to_bytes()[..]].concat()
    };
}

/// Ordering of the live slots: highest valuation first, then owner and coin
fn compare_stakes(a: &Stake, b: &Stake) -> Ordering {
    b.noah_value
        .cmp(&a.noah_value)
        .then_with(|| a.owner.cmp(&b.owner))
        .then_with(|| a.coin.cmp(&b.coin))
}

/// Base coin valuation of every staked custom coin, computed once per recalculation.
///
/// A coin is valued as if all of its staked supply was sold at once, each stake then gets
/// its pro rata part. The valuation does not depend on the order the stakes are visited in.
struct CoinsCache {
    totals: BTreeMap<CoinId, (Amount, Amount)>,
}

impl CoinsCache {
    fn new<'a>(coins: &dyn CoinsBus, stakes: impl Iterator<Item = &'a Stake>) -> Self {
        let mut amounts: BTreeMap<CoinId, Amount> = BTreeMap::new();
        for stake in stakes.filter(|stake| !stake.coin.is_base()) {
            *amounts.entry(stake.coin).or_default() += &stake.value;
        }
        let totals = amounts
            .into_iter()
            .map(|(coin, total_amount)| {
                let total_noah = noah_value(coins, coin, &total_amount);
                (coin, (total_noah, total_amount))
            })
            .collect();
        CoinsCache { totals }
    }

    fn value_of(&self, coin: CoinId, value: &Amount) -> Amount {
        if coin.is_base() {
            return value.clone();
        }
        match self.totals.get(&coin) {
            Some((total_noah, total_amount)) => {
                value.mul_div(total_noah.as_biguint(), total_amount.as_biguint())
            }
            None => Amount::zero(),
        }
    }
}

/// Candidates under the `c` prefix
pub struct Candidates {
    db: ShareableTreeStore,
    max_delegators: usize,
    unbond_period: u64,
    list: BTreeMap<u32, Candidate>,
    pubkeys: BTreeMap<Pubkey, u32>,
    tm_addresses: BTreeMap<TmAddress, u32>,
    block_list: BTreeSet<Pubkey>,
    dirty_block_list: BTreeSet<Pubkey>,
    removed_records: BTreeSet<Pubkey>,
    max_id: u32,
    is_max_id_dirty: bool,
    checker: Checker,
}

impl Candidates {
    /// Loads every candidate of the working version
    pub fn new(db: ShareableTreeStore, config: &StateConfig) -> Self {
        if config.max_delegators_per_candidate > MAX_STAKE_SLOTS {
            warn!(
                "{} delegators per candidate requested, bounded to {}",
                config.max_delegators_per_candidate, MAX_STAKE_SLOTS
            );
        }
        let mut candidates = Candidates {
            db,
            max_delegators: config.max_delegators_per_candidate.min(MAX_STAKE_SLOTS),
            unbond_period: config.unbond_period,
            list: BTreeMap::new(),
            pubkeys: BTreeMap::new(),
            tm_addresses: BTreeMap::new(),
            block_list: BTreeSet::new(),
            dirty_block_list: BTreeSet::new(),
            removed_records: BTreeSet::new(),
            max_id: 0,
            is_max_id_dirty: false,
            checker: Checker::new(),
        };
        candidates.load_candidates();
        candidates
    }

    /// Reads the records, their stakes and updates, the block list and the last identifier
    pub fn load_candidates(&mut self) {
        self.list.clear();
        self.pubkeys.clear();
        self.tm_addresses.clear();
        self.block_list.clear();
        self.dirty_block_list.clear();
        self.removed_records.clear();
        self.is_max_id_dirty = false;

        let db = self.db.read();
        let record_deserializer = CandidateDeserializer::new();
        let stake_deserializer = StakeDeserializer::new();
        let updates_deserializer = StakeListDeserializer::new();

        for (_, value) in db.prefix_iterator(&[CANDIDATES_PREFIX, RECORD_IDENT]) {
            let (_, mut candidate) = record_deserializer
                .deserialize::<DeserializeError>(&value)
                .expect(CANDIDATE_DESER_ERROR);
            for (_, value) in db.prefix_iterator(&stake_prefix!(candidate.id)) {
                let (_, stake) = stake_deserializer
                    .deserialize::<DeserializeError>(&value)
                    .expect(CANDIDATE_DESER_ERROR);
                candidate.stakes.push(stake);
            }
            if let Some(value) = db.get(&updates_key!(candidate.id)) {
                let (_, updates) = updates_deserializer
                    .deserialize::<DeserializeError>(&value)
                    .expect(CANDIDATE_DESER_ERROR);
                candidate.updates = updates;
            }
            self.pubkeys.insert(candidate.pub_key, candidate.id);
            self.tm_addresses.insert(candidate.tm_address(), candidate.id);
            self.list.insert(candidate.id, candidate);
        }

        for (key, _) in db.prefix_iterator(&[CANDIDATES_PREFIX, BLOCK_LIST_IDENT]) {
            let bytes: [u8; PUBKEY_SIZE_BYTES] =
                key[2..].try_into().expect(CANDIDATE_DESER_ERROR);
            self.block_list.insert(Pubkey::from_bytes(bytes));
        }

        self.max_id = match db.get(&[CANDIDATES_PREFIX, MAX_ID_IDENT]) {
            Some(value) => {
                let (_, max_id) = U32VarIntDeserializer::new(Included(0), Included(u32::MAX))
                    .deserialize::<DeserializeError>(&value)
                    .expect(CANDIDATE_DESER_ERROR);
                max_id
            }
            None => 0,
        };
        debug!("loaded {} candidates", self.list.len());
    }

    fn get_mut(&mut self, pub_key: &Pubkey) -> StateResult<&mut Candidate> {
        let id = self
            .pubkeys
            .get(pub_key)
            .ok_or(StateError::CandidateNotFound(*pub_key))?;
        self.list
            .get_mut(id)
            .ok_or(StateError::CandidateNotFound(*pub_key))
    }

    /// Registers a candidate under the next identifier and returns it
    pub fn create(
        &mut self,
        reward_address: Address,
        owner_address: Address,
        control_address: Address,
        pub_key: Pubkey,
        commission: u32,
    ) -> StateResult<u32> {
        let id = self.max_id + 1;
        self.create_with_id(
            id,
            reward_address,
            owner_address,
            control_address,
            pub_key,
            commission,
        )?;
        Ok(id)
    }

    /// Registers a candidate under a given identifier, used by the genesis import
    pub fn create_with_id(
        &mut self,
        id: u32,
        reward_address: Address,
        owner_address: Address,
        control_address: Address,
        pub_key: Pubkey,
        commission: u32,
    ) -> StateResult<()> {
        if self.is_blocked_pubkey(&pub_key) {
            return Err(StateError::PublicKeyInBlockList(pub_key));
        }
        if self.exists(&pub_key) || self.list.contains_key(&id) {
            return Err(StateError::CandidateExists(pub_key));
        }
        let candidate = Candidate::new(
            id,
            pub_key,
            reward_address,
            owner_address,
            control_address,
            commission,
        );
        self.pubkeys.insert(pub_key, id);
        self.tm_addresses.insert(candidate.tm_address(), id);
        self.list.insert(id, candidate);
        self.removed_records.remove(&pub_key);
        if id > self.max_id {
            self.max_id = id;
            self.is_max_id_dirty = true;
        }
        noah_trace!("candidates.create", { "id": id, "pub_key": pub_key.to_string() });
        Ok(())
    }

    /// Changes the addresses of a candidate
    pub fn edit(
        &mut self,
        pub_key: &Pubkey,
        reward_address: Address,
        owner_address: Address,
        control_address: Address,
    ) -> StateResult<()> {
        let candidate = self.get_mut(pub_key)?;
        candidate.reward_address = reward_address;
        candidate.owner_address = owner_address;
        candidate.control_address = control_address;
        candidate.is_dirty = true;
        Ok(())
    }

    /// Moves a candidate to a new consensus key. The old key is block listed for good, the
    /// identifier and the stakes are kept.
    pub fn change_pubkey(&mut self, old: &Pubkey, new: Pubkey) -> StateResult<()> {
        if self.is_blocked_pubkey(&new) {
            return Err(StateError::PublicKeyInBlockList(new));
        }
        if self.exists(&new) {
            return Err(StateError::CandidateExists(new));
        }
        let id = *self
            .pubkeys
            .get(old)
            .ok_or(StateError::CandidateNotFound(*old))?;
        let candidate = self
            .list
            .get_mut(&id)
            .ok_or(StateError::CandidateNotFound(*old))?;
        let old_tm_address = candidate.tm_address();
        candidate.pub_key = new;
        candidate.tm_address = new.tm_address();
        candidate.is_dirty = true;

        self.tm_addresses.remove(&old_tm_address);
        self.tm_addresses.insert(new.tm_address(), id);
        self.pubkeys.remove(old);
        self.pubkeys.insert(new, id);
        self.removed_records.insert(*old);
        self.block_list.insert(*old);
        self.dirty_block_list.insert(*old);
        info!("candidate {} changed its public key {} -> {}", id, old, new);
        Ok(())
    }

    /// true once a key was rotated away from, forever
    pub fn is_blocked_pubkey(&self, pub_key: &Pubkey) -> bool {
        self.block_list.contains(pub_key)
    }

    pub fn exists(&self, pub_key: &Pubkey) -> bool {
        self.pubkeys.contains_key(pub_key)
    }

    /// Identifier of a candidate
    pub fn id(&self, pub_key: &Pubkey) -> Option<u32> {
        self.pubkeys.get(pub_key).copied()
    }

    /// Current key of a candidate
    pub fn pubkey_by_id(&self, id: u32) -> Option<Pubkey> {
        self.list.get(&id).map(|candidate| candidate.pub_key)
    }

    pub fn count(&self) -> usize {
        self.list.len()
    }

    /// Every candidate, by identifier
    pub fn get_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.list.values()
    }

    /// Live stakes of a candidate
    pub fn get_stakes(&self, pub_key: &Pubkey) -> Vec<Stake> {
        self.get_candidate(pub_key)
            .map(|candidate| candidate.stakes.clone())
            .unwrap_or_default()
    }

    pub fn get_stake_of_address(
        &self,
        pub_key: &Pubkey,
        owner: &Address,
        coin: CoinId,
    ) -> Option<Stake> {
        self.get_candidate(pub_key)?.get_stake(owner, coin).cloned()
    }

    /// Value in coin of a live stake
    pub fn get_stake_value_of_address(
        &self,
        pub_key: &Pubkey,
        owner: &Address,
        coin: CoinId,
    ) -> Option<Amount> {
        self.get_stake_of_address(pub_key, owner, coin)
            .map(|stake| stake.value)
    }

    /// Cached total valuation, summed from the slots when a stake changed since the last
    /// recalculation
    pub fn get_total_stake(&self, pub_key: &Pubkey) -> Amount {
        match self.get_candidate(pub_key) {
            Some(candidate) if candidate.is_total_stake_stale => candidate.sum_stakes(),
            Some(candidate) => candidate.total_noah_stake.clone(),
            None => Amount::zero(),
        }
    }

    /// Queues a delegation, merged with a queued one of the same owner and coin
    pub fn delegate(
        &mut self,
        owner: &Address,
        pub_key: &Pubkey,
        coin: CoinId,
        value: &Amount,
        noah_value: &Amount,
    ) -> StateResult<()> {
        let candidate = self.get_mut(pub_key)?;
        match candidate
            .updates
            .iter_mut()
            .find(|update| update.owner == *owner && update.coin == coin)
        {
            Some(update) => {
                update.value += value;
                update.noah_value += noah_value;
            }
            None => candidate.updates.push(Stake {
                owner: *owner,
                coin,
                value: value.clone(),
                noah_value: noah_value.clone(),
            }),
        }
        candidate.is_updates_dirty = true;
        self.checker.add_coin(coin, plus(value));
        Ok(())
    }

    /// Replaces the live slots and the queue of a candidate, used by the genesis import
    pub fn set_stakes(
        &mut self,
        pub_key: &Pubkey,
        stakes: Vec<Stake>,
        updates: Vec<Stake>,
    ) -> StateResult<()> {
        if stakes.len() > MAX_STAKE_SLOTS {
            return Err(StateError::InvalidAppState(format!(
                "candidate {} has {} stakes, at most {} fit",
                pub_key,
                stakes.len(),
                MAX_STAKE_SLOTS
            )));
        }
        let id = *self
            .pubkeys
            .get(pub_key)
            .ok_or(StateError::CandidateNotFound(*pub_key))?;
        let candidate = self
            .list
            .get_mut(&id)
            .ok_or(StateError::CandidateNotFound(*pub_key))?;
        for stake in candidate.stakes.iter().chain(candidate.updates.iter()) {
            self.checker.add_coin(stake.coin, minus(&stake.value));
        }
        for stake in stakes.iter().chain(updates.iter()) {
            self.checker.add_coin(stake.coin, plus(&stake.value));
        }
        let previous_len = candidate.stakes.len();
        candidate.stakes = stakes;
        candidate.updates = updates;
        candidate.mark_stakes_from(0, previous_len);
        candidate.is_updates_dirty = true;
        candidate.total_noah_stake = candidate.sum_stakes();
        candidate.is_total_stake_stale = false;
        candidate.is_dirty = true;
        Ok(())
    }

    /// Decreases a live stake, flooring at zero. Returns the value actually removed.
    pub fn sub_stake(
        &mut self,
        owner: &Address,
        pub_key: &Pubkey,
        coin: CoinId,
        value: &Amount,
    ) -> StateResult<Amount> {
        let candidate = self.get_mut(pub_key)?;
        let idx = candidate
            .stake_index(owner, coin)
            .ok_or(StateError::StakeNotFound(*owner, coin))?;
        let stake = &mut candidate.stakes[idx];
        let removed = value.min(&stake.value).clone();
        let remaining = stake.value.saturating_sub(&removed);
        stake.noah_value = stake
            .noah_value
            .mul_div(remaining.as_biguint(), stake.value.as_biguint());
        stake.value = remaining;
        candidate.dirty_stakes.insert(idx);
        candidate.is_total_stake_stale = true;
        self.checker.add_coin(coin, minus(&removed));
        Ok(removed)
    }

    pub fn set_online(&mut self, pub_key: &Pubkey) -> StateResult<()> {
        let candidate = self.get_mut(pub_key)?;
        candidate.status = CandidateStatus::Online;
        candidate.to_drop = false;
        candidate.is_dirty = true;
        Ok(())
    }

    /// Excludes a candidate from the next validator sets until it is switched on again
    pub fn set_to_drop(&mut self, pub_key: &Pubkey) -> StateResult<()> {
        let candidate = self.get_mut(pub_key)?;
        candidate.to_drop = true;
        candidate.is_dirty = true;
        Ok(())
    }

    /// Revalues every stake, folds the queued delegations into the live slots, and refunds
    /// the slots past the bound to the wait list
    pub fn recalculate_stakes(&mut self, height: u64, bus: &mut Bus<'_>) -> StateResult<()> {
        let cache = CoinsCache::new(
            &*bus.coins,
            self.list
                .values()
                .flat_map(|candidate| candidate.stakes.iter().chain(candidate.updates.iter())),
        );
        let mut evicted_count = 0usize;
        for candidate in self.list.values_mut() {
            let previous = candidate.stakes.clone();

            for stake in candidate.stakes.iter_mut() {
                stake.noah_value = cache.value_of(stake.coin, &stake.value);
            }
            let updates = std::mem::take(&mut candidate.updates);
            if !updates.is_empty() {
                candidate.is_updates_dirty = true;
            }
            for update in updates {
                if update.value.is_zero() {
                    continue;
                }
                match candidate.stake_index(&update.owner, update.coin) {
                    Some(idx) => {
                        let stake = &mut candidate.stakes[idx];
                        stake.value += &update.value;
                        stake.noah_value = cache.value_of(stake.coin, &stake.value);
                    }
                    None => candidate.stakes.push(Stake {
                        noah_value: cache.value_of(update.coin, &update.value),
                        ..update
                    }),
                }
            }

            candidate.stakes.retain(|stake| !stake.value.is_zero());
            candidate.stakes.sort_by(compare_stakes);
            if candidate.stakes.len() > self.max_delegators {
                for stake in candidate.stakes.split_off(self.max_delegators) {
                    bus.waitlist
                        .add_wait_list(&stake.owner, candidate.id, stake.coin, &stake.value);
                    self.checker.add_coin(stake.coin, minus(&stake.value));
                    evicted_count += 1;
                }
            }

            let end = previous.len().max(candidate.stakes.len());
            for idx in 0..end {
                if previous.get(idx) != candidate.stakes.get(idx) {
                    candidate.dirty_stakes.insert(idx);
                }
            }
            let total = candidate.sum_stakes();
            if total != candidate.total_noah_stake {
                candidate.total_noah_stake = total;
                candidate.is_dirty = true;
            }
            candidate.is_total_stake_stale = false;
        }
        if evicted_count > 0 {
            info!(
                "{} stakes moved to the wait list at height {}",
                evicted_count, height
            );
        }
        noah_trace!("candidates.recalculate_stakes", { "height": height, "evicted": evicted_count });
        Ok(())
    }

    /// Byzantine punishment: every stake loses 5% to the slashed total and the rest is
    /// unbonded to the frozen funds
    pub fn punish_byzantine(
        &mut self,
        height: u64,
        tm_address: &TmAddress,
        bus: &mut Bus<'_>,
    ) -> StateResult<()> {
        let Some(id) = self.tm_addresses.get(tm_address).copied() else {
            return Ok(());
        };
        let Some(candidate) = self.list.get_mut(&id) else {
            return Ok(());
        };
        let release_height = height + self.unbond_period;
        let burns = slashed_by_coin(&candidate.stakes, BYZANTINE_KEEP_PERCENT);
        let slashed_total = sum_returns(&sell_into_curves(&mut *bus.coins, &burns)?);
        if !slashed_total.is_zero() {
            bus.app.add_total_slashed(&slashed_total);
        }
        for (idx, stake) in candidate.stakes.iter_mut().enumerate() {
            if stake.value.is_zero() {
                continue;
            }
            let kept = stake.value.percent(BYZANTINE_KEEP_PERCENT);
            let slashed = stake.value.saturating_sub(&kept);
            if !slashed.is_zero() {
                bus.events.add_event(Event::Slash {
                    address: stake.owner,
                    amount: slashed,
                    coin: stake.coin,
                    validator_pub_key: candidate.pub_key,
                });
            }
            if !kept.is_zero() {
                bus.frozen_funds.add_fund(
                    release_height,
                    &stake.owner,
                    Some(candidate.pub_key),
                    candidate.id,
                    stake.coin,
                    &kept,
                );
            }
            self.checker.add_coin(stake.coin, minus(&stake.value));
            stake.value = Amount::zero();
            stake.noah_value = Amount::zero();
            candidate.dirty_stakes.insert(idx);
        }
        candidate.total_noah_stake = Amount::zero();
        candidate.is_total_stake_stale = false;
        candidate.is_dirty = true;
        warn!(
            "byzantine punishment of candidate {} at height {}: {} slashed",
            candidate.pub_key, height, slashed_total
        );
        noah_trace!("candidates.punish_byzantine", {
            "height": height,
            "pub_key": candidate.pub_key.to_string(),
            "slashed": slashed_total.to_string()
        });
        Ok(())
    }

    /// Admission of a new candidate: free while the candidates count is within `limit`,
    /// then the stake must beat one of the `limit` best candidates
    pub fn is_new_candidate_stake_sufficient(
        &self,
        coin: CoinId,
        stake: &Amount,
        limit: usize,
        coins: &dyn CoinsBus,
    ) -> bool {
        if self.count() <= limit {
            return true;
        }
        let value = noah_value(coins, coin, stake);
        let mut totals: Vec<Amount> = self
            .list
            .values()
            .map(|candidate| self.get_total_stake(&candidate.pub_key))
            .collect();
        totals.sort_by(|a, b| b.cmp(a));
        totals.truncate(limit);
        totals.iter().any(|total| value > *total)
    }

    /// true if a delegation fits in the live slots of a candidate
    pub fn is_delegator_stake_sufficient(
        &self,
        owner: &Address,
        pub_key: &Pubkey,
        coin: CoinId,
        value: &Amount,
        coins: &dyn CoinsBus,
    ) -> bool {
        let Some(candidate) = self.get_candidate(pub_key) else {
            return false;
        };
        if candidate.stakes.len() < self.max_delegators {
            return true;
        }
        if candidate.get_stake(owner, coin).is_some() {
            return true;
        }
        match candidate.stakes.iter().map(|stake| &stake.noah_value).min() {
            Some(lowest) => noah_value(coins, coin, value) > *lowest,
            None => true,
        }
    }

    /// Best online candidates by valuation, ties broken by ascending key
    pub fn get_new_candidates(&self, max_count: usize) -> Vec<&Candidate> {
        let mut result: Vec<&Candidate> = self
            .list
            .values()
            .filter(|candidate| candidate.is_online() && !candidate.to_drop)
            .filter(|candidate| !candidate.total_noah_stake.is_zero())
            .collect();
        result.sort_by(|a, b| {
            b.total_noah_stake
                .cmp(&a.total_noah_stake)
                .then_with(|| a.pub_key.cmp(&b.pub_key))
        });
        result.truncate(max_count);
        result
    }

    /// Deltas reported since the last reset
    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn reset_checker(&mut self) {
        self.checker.reset();
    }

    /// Writes the dirty records, slots, queues and block list entries into `batch`
    pub fn commit(&mut self, batch: &mut DBBatch) {
        let record_serializer = CandidateSerializer::new();
        let stake_serializer = StakeSerializer::new();
        let updates_serializer = StakeListSerializer::new();

        for pub_key in std::mem::take(&mut self.removed_records) {
            batch.insert(record_key!(pub_key), None);
        }
        for candidate in self.list.values_mut() {
            if candidate.is_dirty {
                let mut bytes = Vec::new();
                record_serializer
                    .serialize(candidate, &mut bytes)
                    .expect(CANDIDATE_SER_ERROR);
                batch.insert(record_key!(candidate.pub_key), Some(bytes));
                candidate.is_dirty = false;
            }
            if candidate.is_updates_dirty {
                let value = if candidate.updates.is_empty() {
                    None
                } else {
                    let mut bytes = Vec::new();
                    updates_serializer
                        .serialize(&candidate.updates, &mut bytes)
                        .expect(CANDIDATE_SER_ERROR);
                    Some(bytes)
                };
                batch.insert(updates_key!(candidate.id), value);
                candidate.is_updates_dirty = false;
            }
            for idx in std::mem::take(&mut candidate.dirty_stakes) {
                let value = candidate.stakes.get(idx).map(|stake| {
                    let mut bytes = Vec::new();
                    stake_serializer
                        .serialize(stake, &mut bytes)
                        .expect(CANDIDATE_SER_ERROR);
                    bytes
                });
                batch.insert(stake_key!(candidate.id, idx), value);
            }
        }
        for pub_key in std::mem::take(&mut self.dirty_block_list) {
            batch.insert(block_list_key!(pub_key), Some(Vec::new()));
        }
        if self.is_max_id_dirty {
            let mut bytes = Vec::new();
            U32VarIntSerializer::new()
                .serialize(&self.max_id, &mut bytes)
                .expect(CANDIDATE_SER_ERROR);
            batch.insert(vec![CANDIDATES_PREFIX, MAX_ID_IDENT], Some(bytes));
            self.is_max_id_dirty = false;
        }
    }

    /// Candidates and block list of the genesis document
    pub fn export(&self) -> (Vec<AppCandidate>, Vec<Pubkey>) {
        let to_app_stake = |stake: &Stake| AppStake {
            owner: stake.owner,
            coin: stake.coin,
            value: stake.value.clone(),
            noah_value: stake.noah_value.clone(),
        };
        let candidates = self
            .list
            .values()
            .map(|candidate| AppCandidate {
                id: candidate.id,
                reward_address: candidate.reward_address,
                owner_address: candidate.owner_address,
                control_address: candidate.control_address,
                total_noah_stake: self.get_total_stake(&candidate.pub_key),
                public_key: candidate.pub_key,
                commission: candidate.commission,
                stakes: candidate.stakes.iter().map(to_app_stake).collect(),
                updates: candidate.updates.iter().map(to_app_stake).collect(),
                status: candidate.status.into(),
                to_drop: candidate.to_drop,
            })
            .collect();
        (candidates, self.block_list.iter().copied().collect())
    }

    /// Loads the candidates and the block list of a genesis document
    pub fn import(
        &mut self,
        candidates: &[AppCandidate],
        block_list: &[Pubkey],
    ) -> StateResult<()> {
        let to_stake = |stake: &AppStake| Stake {
            owner: stake.owner,
            coin: stake.coin,
            value: stake.value.clone(),
            noah_value: stake.noah_value.clone(),
        };
        for pub_key in block_list {
            self.block_list.insert(*pub_key);
            self.dirty_block_list.insert(*pub_key);
        }
        for app_candidate in candidates {
            let status = CandidateStatus::try_from(app_candidate.status).map_err(|_| {
                StateError::InvalidAppState(format!(
                    "candidate {} has an unknown status",
                    app_candidate.public_key
                ))
            })?;
            self.create_with_id(
                app_candidate.id,
                app_candidate.reward_address,
                app_candidate.owner_address,
                app_candidate.control_address,
                app_candidate.public_key,
                app_candidate.commission,
            )?;
            self.set_stakes(
                &app_candidate.public_key,
                app_candidate.stakes.iter().map(to_stake).collect(),
                app_candidate.updates.iter().map(to_stake).collect(),
            )?;
            let candidate = self.get_mut(&app_candidate.public_key)?;
            candidate.status = status;
            candidate.to_drop = app_candidate.to_drop;
        }
        Ok(())
    }
}

impl CandidatesBus for Candidates {
    fn get_candidate(&self, pub_key: &Pubkey) -> Option<&Candidate> {
        self.pubkeys.get(pub_key).and_then(|id| self.list.get(id))
    }

    fn get_candidate_by_tm_address(&self, tm_address: &TmAddress) -> Option<&Candidate> {
        self.tm_addresses
            .get(tm_address)
            .and_then(|id| self.list.get(id))
    }

    fn punish(
        &mut self,
        height: u64,
        tm_address: &TmAddress,
        bus: &mut Bus<'_>,
    ) -> StateResult<Amount> {
        let Some(id) = self.tm_addresses.get(tm_address).copied() else {
            return Ok(Amount::zero());
        };
        let Some(candidate) = self.list.get_mut(&id) else {
            return Ok(Amount::zero());
        };
        let burns = slashed_by_coin(&candidate.stakes, PUNISH_KEEP_PERCENT);
        let slashed_total = sum_returns(&sell_into_curves(&mut *bus.coins, &burns)?);
        if !slashed_total.is_zero() {
            bus.app.add_total_slashed(&slashed_total);
        }
        for (idx, stake) in candidate.stakes.iter_mut().enumerate() {
            let kept = stake.value.percent(PUNISH_KEEP_PERCENT);
            let slashed = stake.value.saturating_sub(&kept);
            if slashed.is_zero() {
                continue;
            }
            self.checker.add_coin(stake.coin, minus(&slashed));
            bus.events.add_event(Event::Slash {
                address: stake.owner,
                amount: slashed,
                coin: stake.coin,
                validator_pub_key: candidate.pub_key,
            });
            stake.noah_value = stake.noah_value.percent(PUNISH_KEEP_PERCENT);
            stake.value = kept;
            candidate.dirty_stakes.insert(idx);
        }
        candidate.total_noah_stake = candidate.sum_stakes();
        candidate.is_total_stake_stale = false;
        candidate.is_dirty = true;
        warn!(
            "candidate {} punished at height {}: {} slashed",
            candidate.pub_key, height, slashed_total
        );
        noah_trace!("candidates.punish", {
            "height": height,
            "pub_key": candidate.pub_key.to_string(),
            "slashed": slashed_total.to_string()
        });
        Ok(slashed_total)
    }

    fn set_offline(&mut self, pub_key: &Pubkey) {
        if let Ok(candidate) = self.get_mut(pub_key) {
            candidate.status = CandidateStatus::Offline;
            candidate.is_dirty = true;
        }
    }
}

/// Part of every stake a punishment burns, summed per coin
fn slashed_by_coin(stakes: &[Stake], keep_percent: u32) -> BTreeMap<CoinId, Amount> {
    let mut burns: BTreeMap<CoinId, Amount> = BTreeMap::new();
    for stake in stakes {
        let slashed = stake.value.saturating_sub(&stake.value.percent(keep_percent));
        if !slashed.is_zero() {
            *burns.entry(stake.coin).or_default() += &slashed;
        }
    }
    burns
}
