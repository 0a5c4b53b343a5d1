// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Active validator set.
//!
//! The set is rebuilt at epoch boundaries from the best candidates. Between two rebuilds it
//! tracks a rolling window of missed blocks per validator and accumulates the block rewards
//! that `pay_rewards` later splits between the DAO, the developers, the candidate and its
//! delegators.

use crate::bus::{Bus, CandidatesBus};
use crate::candidates::Candidate;
use crate::config::StateConfig;
use crate::error::StateResult;
use noah_db_exports::{
    DBBatch, ShareableTreeStore, VALIDATORS_PREFIX, VALIDATOR_DESER_ERROR, VALIDATOR_SER_ERROR,
};
use noah_logging::noah_trace;
use noah_models::amount::{AmountDeserializer, AmountSerializer};
use noah_models::app_state::AppValidator;
use noah_models::config::constants::{
    DAO_COMMISSION, DEVELOPERS_COMMISSION, VALIDATOR_MAX_ABSENT_TIMES,
    VALIDATOR_MAX_ABSENT_WINDOW,
};
use noah_models::event::{Event, Role};
use noah_models::pubkey::{PubkeyDeserializer, PubkeySerializer};
use noah_models::{Address, Amount, CoinId, Pubkey, TmAddress};
use noah_serialization::{
    BoolDeserializer, BoolSerializer, DeserializeError, Deserializer, SerializeError, Serializer,
    U32VarIntDeserializer, U32VarIntSerializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::multi::length_count;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::Included;
use tracing::{debug, info, warn};

const LIST_IDENT: u8 = b'l';
const STAKE_IDENT: u8 = b's';
const REWARD_IDENT: u8 = b'r';

/// Stake snapshot key of a validator
macro_rules! stake_key {
    ($pub_key:expr) => {
        [&[VALIDATORS_PREFIX, STAKE_IDENT][..], &$pub_key.to_bytes()[..]].concat()
    };
}

/// Accumulated reward key of a validator
macro_rules! reward_key {
    ($pub_key:expr) => {
        [&[VALIDATORS_PREFIX, REWARD_IDENT][..], &$pub_key.to_bytes()[..]].concat()
    };
}

/// A member of the active set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub pub_key: Pubkey,
    /// candidate valuation when the set was built
    pub total_noah_stake: Amount,
    /// rewards since the last payout
    pub accum_reward: Amount,
    /// one bit per block of the window, set when the block was not signed
    pub absent_times: u32,
    /// removed at the next payout
    pub to_drop: bool,
    /// out of the set since a rebuild, kept until its reward is paid
    pub left_set: bool,

    tm_address: TmAddress,
    is_stake_dirty: bool,
    is_reward_dirty: bool,
}

impl Validator {
    fn new(pub_key: Pubkey, total_noah_stake: Amount) -> Self {
        Validator {
            pub_key,
            total_noah_stake,
            accum_reward: Amount::zero(),
            absent_times: 0,
            to_drop: false,
            left_set: false,
            tm_address: pub_key.tm_address(),
            is_stake_dirty: true,
            is_reward_dirty: true,
        }
    }

    /// Consensus address
    pub fn tm_address(&self) -> TmAddress {
        self.tm_address
    }

    /// Missed blocks in the window
    pub fn count_absent_times(&self) -> u32 {
        self.absent_times.count_ones()
    }

    fn is_absent_at(&self, height: u64) -> bool {
        self.absent_times & window_bit(height) != 0
    }
}

fn window_bit(height: u64) -> u32 {
    1 << (height % VALIDATOR_MAX_ABSENT_WINDOW)
}

/// Set entry as stored in the list record, the amounts live under their own keys
struct ValidatorRecord {
    pub_key: Pubkey,
    absent_times: u32,
    to_drop: bool,
    left_set: bool,
}

/// Serializer for the list record
#[derive(Default)]
struct ValidatorListSerializer {
    u64_serializer: U64VarIntSerializer,
    u32_serializer: U32VarIntSerializer,
    pubkey_serializer: PubkeySerializer,
    bool_serializer: BoolSerializer,
}

impl Serializer<Vec<ValidatorRecord>> for ValidatorListSerializer {
    fn serialize(
        &self,
        value: &Vec<ValidatorRecord>,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&(value.len() as u64), buffer)?;
        for record in value {
            self.pubkey_serializer.serialize(&record.pub_key, buffer)?;
            self.u32_serializer.serialize(&record.absent_times, buffer)?;
            self.bool_serializer.serialize(&record.to_drop, buffer)?;
            self.bool_serializer.serialize(&record.left_set, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for the list record
struct ValidatorListDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    u32_deserializer: U32VarIntDeserializer,
    pubkey_deserializer: PubkeyDeserializer,
    bool_deserializer: BoolDeserializer,
}

impl ValidatorListDeserializer {
    fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u16::MAX as u64)),
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            pubkey_deserializer: PubkeyDeserializer::new(),
            bool_deserializer: BoolDeserializer::new(),
        }
    }
}

impl Deserializer<Vec<ValidatorRecord>> for ValidatorListDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<ValidatorRecord>, E> {
        context(
            "Failed ValidatorList deserialization",
            length_count(
                context("Failed length deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
                tuple((
                    |input| self.pubkey_deserializer.deserialize(input),
                    context("Failed absent_times deserialization", |input| {
                        self.u32_deserializer.deserialize(input)
                    }),
                    |input| self.bool_deserializer.deserialize(input),
                    |input| self.bool_deserializer.deserialize(input),
                ))
                .map(|(pub_key, absent_times, to_drop, left_set)| ValidatorRecord {
                    pub_key,
                    absent_times,
                    to_drop,
                    left_set,
                }),
            ),
        )
        .parse(buffer)
    }
}

fn decode_amount(bytes: &[u8]) -> Amount {
    let (_, amount) = AmountDeserializer::new()
        .deserialize::<DeserializeError>(bytes)
        .expect(VALIDATOR_DESER_ERROR);
    amount
}

/// Validators under the `v` prefix
pub struct Validators {
    db: ShareableTreeStore,
    dao_address: Address,
    developers_address: Address,
    list: Vec<Validator>,
    removed: BTreeSet<Pubkey>,
    is_list_dirty: bool,
}

impl Validators {
    /// Loads the set of the working version
    pub fn new(db: ShareableTreeStore, config: &StateConfig) -> Self {
        let mut validators = Validators {
            db,
            dao_address: config.dao_address,
            developers_address: config.developers_address,
            list: Vec::new(),
            removed: BTreeSet::new(),
            is_list_dirty: false,
        };
        validators.load_validators();
        validators
    }

    /// Reads the list record and the amounts of every validator
    pub fn load_validators(&mut self) {
        let db = self.db.read();
        let records = match db.get(&[VALIDATORS_PREFIX, LIST_IDENT]) {
            Some(bytes) => {
                let (_, records) = ValidatorListDeserializer::new()
                    .deserialize::<DeserializeError>(&bytes)
                    .expect(VALIDATOR_DESER_ERROR);
                records
            }
            None => Vec::new(),
        };
        self.list = records
            .into_iter()
            .map(|record| Validator {
                total_noah_stake: db
                    .get(&stake_key!(record.pub_key))
                    .map(|bytes| decode_amount(&bytes))
                    .unwrap_or_default(),
                accum_reward: db
                    .get(&reward_key!(record.pub_key))
                    .map(|bytes| decode_amount(&bytes))
                    .unwrap_or_default(),
                absent_times: record.absent_times,
                to_drop: record.to_drop,
                left_set: record.left_set,
                tm_address: record.pub_key.tm_address(),
                pub_key: record.pub_key,
                is_stake_dirty: false,
                is_reward_dirty: false,
            })
            .collect();
        self.removed.clear();
        self.is_list_dirty = false;
    }

    /// The active set, in ranking order
    pub fn get_validators(&self) -> &[Validator] {
        &self.list
    }

    pub fn get_by_tm_address(&self, tm_address: &TmAddress) -> Option<&Validator> {
        self.list
            .iter()
            .find(|validator| validator.tm_address == *tm_address)
    }

    pub fn get_by_pubkey(&self, pub_key: &Pubkey) -> Option<&Validator> {
        self.list
            .iter()
            .find(|validator| validator.pub_key == *pub_key)
    }

    pub fn count(&self) -> usize {
        self.list.len()
    }

    /// Adds a validator, used by the genesis import
    pub fn create(&mut self, pub_key: Pubkey, total_noah_stake: Amount) {
        self.list.push(Validator::new(pub_key, total_noah_stake));
        self.removed.remove(&pub_key);
        self.is_list_dirty = true;
    }

    /// Counts a missed block, from the first block of the validator on. Past the allowed
    /// number of misses in the window the candidate is punished and switched off, and the
    /// validator is marked to drop. Returns true in that case. A validator already marked to
    /// drop is left alone.
    pub fn set_validator_absent(
        &mut self,
        height: u64,
        tm_address: &TmAddress,
        candidates: &mut dyn CandidatesBus,
        bus: &mut Bus<'_>,
    ) -> StateResult<bool> {
        let Some(validator) = self
            .list
            .iter_mut()
            .find(|validator| validator.tm_address == *tm_address)
        else {
            return Ok(false);
        };
        if validator.to_drop {
            return Ok(false);
        }
        validator.absent_times |= window_bit(height);
        self.is_list_dirty = true;
        if validator.count_absent_times() <= VALIDATOR_MAX_ABSENT_TIMES {
            return Ok(false);
        }

        validator.absent_times = 0;
        validator.to_drop = true;
        let pub_key = validator.pub_key;
        candidates.set_offline(&pub_key);
        let slashed = candidates.punish(height, tm_address, bus)?;
        if let Some(candidate) = candidates.get_candidate(&pub_key) {
            validator.total_noah_stake = candidate.total_noah_stake.clone();
            validator.is_stake_dirty = true;
        }
        warn!(
            "validator {} dropped at height {} for missing blocks, {} slashed",
            pub_key, height, slashed
        );
        Ok(true)
    }

    /// Clears the bit of `height` for a validator that signed
    pub fn set_validator_present(&mut self, height: u64, tm_address: &TmAddress) {
        if let Some(validator) = self
            .list
            .iter_mut()
            .find(|validator| validator.tm_address == *tm_address)
        {
            validator.absent_times &= !window_bit(height);
            self.is_list_dirty = true;
        }
    }

    /// Zeroes the stake snapshot of a double signing validator and marks it to drop
    pub fn punish_byzantine_validator(&mut self, tm_address: &TmAddress) {
        if let Some(validator) = self
            .list
            .iter_mut()
            .find(|validator| validator.tm_address == *tm_address)
        {
            validator.total_noah_stake = Amount::zero();
            validator.to_drop = true;
            validator.is_stake_dirty = true;
            self.is_list_dirty = true;
            warn!("byzantine validator {}", validator.pub_key);
        }
    }

    pub fn add_accum_reward(&mut self, pub_key: &Pubkey, reward: &Amount) {
        if let Some(validator) = self
            .list
            .iter_mut()
            .find(|validator| validator.pub_key == *pub_key)
        {
            validator.accum_reward += reward;
            validator.is_reward_dirty = true;
        }
    }

    /// Shares a block reward between the validators that signed `height` and stay in the
    /// set, pro rata to their stake. Returns the undistributed remainder.
    pub fn distribute_reward(&mut self, height: u64, reward: &Amount) -> Amount {
        let eligible = |validator: &Validator| {
            !validator.to_drop && !validator.is_absent_at(height)
        };
        let total_stake: Amount = self
            .list
            .iter()
            .filter(|validator| eligible(validator))
            .map(|validator| &validator.total_noah_stake)
            .sum();
        if total_stake.is_zero() {
            return reward.clone();
        }
        let mut distributed = Amount::zero();
        for validator in self.list.iter_mut().filter(|validator| eligible(validator)) {
            let share = reward.mul_div(
                validator.total_noah_stake.as_biguint(),
                total_stake.as_biguint(),
            );
            if share.is_zero() {
                continue;
            }
            distributed += &share;
            validator.accum_reward += &share;
            validator.is_reward_dirty = true;
        }
        reward.saturating_sub(&distributed)
    }

    /// Pays the accumulated rewards and removes the validators marked to drop.
    ///
    /// From each accumulator the DAO and the developers take their cut, the candidate takes
    /// its commission on the rest, and the delegators share what remains pro rata to their
    /// stake valuation. Truncation dust goes to the slashed total.
    pub fn pay_rewards(
        &mut self,
        height: u64,
        candidates: &dyn CandidatesBus,
        bus: &mut Bus<'_>,
    ) -> StateResult<()> {
        let mut paid_total = Amount::zero();
        for validator in self.list.iter_mut() {
            if validator.accum_reward.is_zero() {
                continue;
            }
            let total = std::mem::take(&mut validator.accum_reward);
            validator.is_reward_dirty = true;

            let Some(candidate) = candidates.get_candidate(&validator.pub_key) else {
                bus.app.add_total_slashed(&total);
                continue;
            };

            let pub_key = validator.pub_key;
            let mut pay = |role: Role, address: &Address, amount: &Amount| {
                bus.accounts.add_balance(address, CoinId::BASE, amount);
                if !amount.is_zero() {
                    bus.events.add_event(Event::Reward {
                        role,
                        address: *address,
                        amount: amount.clone(),
                        validator_pub_key: pub_key,
                    });
                }
            };

            let dao = total.percent(DAO_COMMISSION);
            pay(Role::Dao, &self.dao_address, &dao);
            let developers = total.percent(DEVELOPERS_COMMISSION);
            pay(Role::Developers, &self.developers_address, &developers);

            let remaining = total.saturating_sub(&dao).saturating_sub(&developers);
            let commission = remaining.percent(candidate.commission);
            pay(Role::Validator, &candidate.reward_address, &commission);
            let remaining = remaining.saturating_sub(&commission);

            let denominator = validator
                .total_noah_stake
                .clone()
                .max(candidate.sum_stakes());
            let mut delegators_paid = Amount::zero();
            if !denominator.is_zero() {
                for stake in &candidate.stakes {
                    let share =
                        remaining.mul_div(stake.noah_value.as_biguint(), denominator.as_biguint());
                    if share.is_zero() {
                        continue;
                    }
                    pay(Role::Delegator, &stake.owner, &share);
                    delegators_paid += &share;
                }
            }

            let dust = remaining.saturating_sub(&delegators_paid);
            if !dust.is_zero() {
                bus.app.add_total_slashed(&dust);
            }
            noah_trace!("validators.pay_rewards", {
                "height": height,
                "pub_key": validator.pub_key.to_string(),
                "reward": total.to_string(),
                "dust": dust.to_string()
            });
            paid_total += &total;
        }

        let removed = &mut self.removed;
        let before = self.list.len();
        self.list.retain(|validator| {
            if validator.to_drop {
                removed.insert(validator.pub_key);
            }
            !validator.to_drop
        });
        if self.list.len() != before {
            self.is_list_dirty = true;
        }
        info!("rewards paid at height {}: {}", height, paid_total);
        Ok(())
    }

    /// Follows a candidate key rotation. The stake and the reward move to the new key.
    pub fn change_pubkey(&mut self, old: &Pubkey, new: Pubkey) {
        let Some(validator) = self
            .list
            .iter_mut()
            .find(|validator| validator.pub_key == *old)
        else {
            return;
        };
        validator.pub_key = new;
        validator.tm_address = new.tm_address();
        validator.is_stake_dirty = true;
        validator.is_reward_dirty = true;
        self.removed.insert(*old);
        self.removed.remove(&new);
        self.is_list_dirty = true;
    }

    /// Rebuilds the set from the ranked candidates. Staying validators keep their reward
    /// and their window. Leaving ones with an unpaid reward stay until the next payout, marked
    /// `left_set`.
    pub fn set_new_validators(&mut self, candidates: &[&Candidate]) {
        let mut previous: BTreeMap<Pubkey, Validator> = std::mem::take(&mut self.list)
            .into_iter()
            .map(|validator| (validator.pub_key, validator))
            .collect();
        let mut list = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut validator = match previous.remove(&candidate.pub_key) {
                Some(mut validator) => {
                    validator.to_drop = false;
                    validator.left_set = false;
                    validator
                }
                None => Validator::new(candidate.pub_key, Amount::zero()),
            };
            validator.total_noah_stake = candidate.total_noah_stake.clone();
            validator.is_stake_dirty = true;
            self.removed.remove(&candidate.pub_key);
            list.push(validator);
        }
        for (pub_key, mut validator) in previous {
            if validator.accum_reward.is_zero() {
                self.removed.insert(pub_key);
            } else {
                validator.to_drop = true;
                validator.left_set = true;
                list.push(validator);
            }
        }
        self.list = list;
        self.is_list_dirty = true;
        debug!("new validator set of {}", self.list.len());
    }

    /// Writes the list record and the dirty amounts into `batch`
    pub fn commit(&mut self, batch: &mut DBBatch) {
        let amount_serializer = AmountSerializer::new();
        for pub_key in std::mem::take(&mut self.removed) {
            batch.insert(stake_key!(pub_key), None);
            batch.insert(reward_key!(pub_key), None);
        }
        for validator in self.list.iter_mut() {
            if validator.is_stake_dirty {
                let mut bytes = Vec::new();
                amount_serializer
                    .serialize(&validator.total_noah_stake, &mut bytes)
                    .expect(VALIDATOR_SER_ERROR);
                batch.insert(stake_key!(validator.pub_key), Some(bytes));
                validator.is_stake_dirty = false;
            }
            if validator.is_reward_dirty {
                let mut bytes = Vec::new();
                amount_serializer
                    .serialize(&validator.accum_reward, &mut bytes)
                    .expect(VALIDATOR_SER_ERROR);
                batch.insert(reward_key!(validator.pub_key), Some(bytes));
                validator.is_reward_dirty = false;
            }
        }
        if self.is_list_dirty {
            let records: Vec<ValidatorRecord> = self
                .list
                .iter()
                .map(|validator| ValidatorRecord {
                    pub_key: validator.pub_key,
                    absent_times: validator.absent_times,
                    to_drop: validator.to_drop,
                    left_set: validator.left_set,
                })
                .collect();
            let mut bytes = Vec::new();
            ValidatorListSerializer::default()
                .serialize(&records, &mut bytes)
                .expect(VALIDATOR_SER_ERROR);
            batch.insert(vec![VALIDATORS_PREFIX, LIST_IDENT], Some(bytes));
            self.is_list_dirty = false;
        }
    }

    /// Validators of the genesis document
    pub fn export(&self) -> Vec<AppValidator> {
        self.list
            .iter()
            .map(|validator| AppValidator {
                total_noah_stake: validator.total_noah_stake.clone(),
                public_key: validator.pub_key,
                accum_reward: validator.accum_reward.clone(),
                absent_times: validator.absent_times,
            })
            .collect()
    }

    /// Loads the validators of a genesis document
    pub fn import(&mut self, validators: &[AppValidator]) {
        for app_validator in validators {
            let mut validator =
                Validator::new(app_validator.public_key, app_validator.total_noah_stake.clone());
            validator.accum_reward = app_validator.accum_reward.clone();
            validator.absent_times = app_validator.absent_times;
            self.removed.remove(&validator.pub_key);
            self.list.push(validator);
            self.is_list_dirty = true;
        }
    }
}
