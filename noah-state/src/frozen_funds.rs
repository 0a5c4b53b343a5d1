// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Unbonded stakes waiting for their release height.

use crate::bus::{AppBus, CoinsBus, EventsBus, FrozenFundsBus};
use crate::checker::{minus, plus, Checker};
use crate::coins::{sell_into_curves, sum_returns};
use crate::error::StateResult;
use noah_db_exports::{
    DBBatch, ShareableTreeStore, FROZEN_FUNDS_DESER_ERROR, FROZEN_FUNDS_PREFIX,
    FROZEN_FUNDS_SER_ERROR,
};
use noah_models::address::{AddressDeserializer, AddressSerializer};
use noah_models::amount::{AmountDeserializer, AmountSerializer};
use noah_models::app_state::AppFrozenFund;
use noah_models::coin::{CoinIdDeserializer, CoinIdSerializer};
use noah_models::config::constants::FROZEN_FUNDS_SLASH_PERCENT;
use noah_models::event::Event;
use noah_models::pubkey::{PubkeyDeserializer, PubkeySerializer};
use noah_models::{Address, Amount, CoinId, Pubkey};
use noah_serialization::{
    DeserializeError, Deserializer, OptionDeserializer, OptionSerializer, SerializeError,
    Serializer, U32VarIntDeserializer, U32VarIntSerializer, U64VarIntDeserializer,
    U64VarIntSerializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::multi::length_count;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::Included;
use std::ops::RangeInclusive;
use tracing::debug;

/// Frozen funds key of a release height
macro_rules! frozen_funds_key {
    ($height:expr) => {
        [&[FROZEN_FUNDS_PREFIX][..], &$height.to_be_bytes()[..]].concat()
    };
}

/// A credit scheduled for a release height
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenFund {
    pub address: Address,
    /// candidate the funds were staked to, if it still had a key
    pub candidate_key: Option<Pubkey>,
    pub candidate_id: u32,
    pub coin: CoinId,
    pub value: Amount,
}

/// Serializer for the frozen funds of a height
pub struct FrozenFundsSerializer {
    u64_serializer: U64VarIntSerializer,
    u32_serializer: U32VarIntSerializer,
    address_serializer: AddressSerializer,
    key_serializer: OptionSerializer<Pubkey, PubkeySerializer>,
    coin_serializer: CoinIdSerializer,
    amount_serializer: AmountSerializer,
}

impl FrozenFundsSerializer {
    /// Creates a new `FrozenFundsSerializer`
    pub fn new() -> Self {
        Self {
            u64_serializer: U64VarIntSerializer::new(),
            u32_serializer: U32VarIntSerializer::new(),
            address_serializer: AddressSerializer::new(),
            key_serializer: OptionSerializer::new(PubkeySerializer::new()),
            coin_serializer: CoinIdSerializer::new(),
            amount_serializer: AmountSerializer::new(),
        }
    }
}

impl Default for FrozenFundsSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer<Vec<FrozenFund>> for FrozenFundsSerializer {
    fn serialize(&self, value: &Vec<FrozenFund>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&(value.len() as u64), buffer)?;
        for fund in value {
            self.address_serializer.serialize(&fund.address, buffer)?;
            self.key_serializer.serialize(&fund.candidate_key, buffer)?;
            self.u32_serializer.serialize(&fund.candidate_id, buffer)?;
            self.coin_serializer.serialize(&fund.coin, buffer)?;
            self.amount_serializer.serialize(&fund.value, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for the frozen funds of a height
pub struct FrozenFundsDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    u32_deserializer: U32VarIntDeserializer,
    address_deserializer: AddressDeserializer,
    key_deserializer: OptionDeserializer<Pubkey, PubkeyDeserializer>,
    coin_deserializer: CoinIdDeserializer,
    amount_deserializer: AmountDeserializer,
}

impl FrozenFundsDeserializer {
    /// Creates a new `FrozenFundsDeserializer`
    pub fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u32::MAX as u64)),
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            address_deserializer: AddressDeserializer::new(),
            key_deserializer: OptionDeserializer::new(PubkeyDeserializer::new()),
            coin_deserializer: CoinIdDeserializer::new(),
            amount_deserializer: AmountDeserializer::new(),
        }
    }
}

impl Default for FrozenFundsDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Vec<FrozenFund>> for FrozenFundsDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<FrozenFund>, E> {
        context(
            "Failed FrozenFunds deserialization",
            length_count(
                context("Failed length deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
                tuple((
                    |input| self.address_deserializer.deserialize(input),
                    context("Failed candidate_key deserialization", |input| {
                        self.key_deserializer.deserialize(input)
                    }),
                    context("Failed candidate_id deserialization", |input| {
                        self.u32_deserializer.deserialize(input)
                    }),
                    |input| self.coin_deserializer.deserialize(input),
                    |input| self.amount_deserializer.deserialize(input),
                ))
                .map(
                    |(address, candidate_key, candidate_id, coin, value)| FrozenFund {
                        address,
                        candidate_key,
                        candidate_id,
                        coin,
                        value,
                    },
                ),
            ),
        )
        .parse(buffer)
    }
}

fn decode_funds(bytes: &[u8]) -> Vec<FrozenFund> {
    let (_, funds) = FrozenFundsDeserializer::new()
        .deserialize::<DeserializeError>(bytes)
        .expect(FROZEN_FUNDS_DESER_ERROR);
    funds
}

fn height_from_key(key: &[u8]) -> u64 {
    let bytes: [u8; 8] = key[1..].try_into().expect(FROZEN_FUNDS_DESER_ERROR);
    u64::from_be_bytes(bytes)
}

/// Frozen funds under the `f` prefix, one list per release height
pub struct FrozenFunds {
    db: ShareableTreeStore,
    list: BTreeMap<u64, Vec<FrozenFund>>,
    dirty: BTreeSet<u64>,
    checker: Checker,
}

impl FrozenFunds {
    pub fn new(db: ShareableTreeStore) -> Self {
        FrozenFunds {
            db,
            list: BTreeMap::new(),
            dirty: BTreeSet::new(),
            checker: Checker::new(),
        }
    }

    fn read_funds(&self, height: u64) -> Vec<FrozenFund> {
        self.db
            .read()
            .get(&frozen_funds_key!(height))
            .map(|bytes| decode_funds(&bytes))
            .unwrap_or_default()
    }

    fn get_or_load(&mut self, height: u64) -> &mut Vec<FrozenFund> {
        if !self.list.contains_key(&height) {
            let funds = self.read_funds(height);
            self.list.insert(height, funds);
        }
        self.list.entry(height).or_default()
    }

    /// Funds released at `height`
    pub fn get_frozen_funds(&self, height: u64) -> Vec<FrozenFund> {
        match self.list.get(&height) {
            Some(funds) => funds.clone(),
            None => self.read_funds(height),
        }
    }

    /// Drops the funds of `height` once they were paid out
    pub fn delete(&mut self, height: u64) {
        let funds = std::mem::take(self.get_or_load(height));
        for fund in &funds {
            self.checker.add_coin(fund.coin, minus(&fund.value));
        }
        self.dirty.insert(height);
    }

    /// Slashes the funds unbonded from candidate `candidate_id` and released within `heights`.
    /// The slashed coins are sold into their curve and counted in the total slashed.
    pub fn punish_frozen_funds_with_id(
        &mut self,
        heights: RangeInclusive<u64>,
        candidate_id: u32,
        candidate_key: &Pubkey,
        coins: &mut dyn CoinsBus,
        app: &mut dyn AppBus,
        events: &mut dyn EventsBus,
    ) -> StateResult<()> {
        let (from_height, to_height) = heights.into_inner();
        let mut heights: BTreeSet<u64> = self
            .list
            .range(from_height..=to_height)
            .map(|(height, _)| *height)
            .collect();
        {
            let db = self.db.read();
            let low = frozen_funds_key!(from_height);
            let high = frozen_funds_key!(to_height.saturating_add(1));
            let stored: Vec<u64> = db
                .iterator(&low, Some(&high))
                .map(|(key, _)| height_from_key(&key))
                .collect();
            heights.extend(stored);
        }
        let mut burns: BTreeMap<CoinId, Amount> = BTreeMap::new();
        let mut touched = Vec::new();
        for height in heights {
            let funds = self.get_or_load(height);
            let mut slashed_any = false;
            for fund in funds.iter().filter(|fund| fund.candidate_id == candidate_id) {
                let slashed = fund.value.percent(FROZEN_FUNDS_SLASH_PERCENT);
                if !slashed.is_zero() {
                    *burns.entry(fund.coin).or_default() += &slashed;
                    slashed_any = true;
                }
            }
            if slashed_any {
                touched.push(height);
            }
        }
        let slashed_total = sum_returns(&sell_into_curves(coins, &burns)?);
        if !slashed_total.is_zero() {
            app.add_total_slashed(&slashed_total);
        }
        for height in touched {
            let Some(funds) = self.list.get_mut(&height) else {
                continue;
            };
            for fund in funds.iter_mut().filter(|fund| fund.candidate_id == candidate_id) {
                let slashed = fund.value.percent(FROZEN_FUNDS_SLASH_PERCENT);
                if slashed.is_zero() {
                    continue;
                }
                fund.value = fund.value.saturating_sub(&slashed);
                self.checker.add_coin(fund.coin, minus(&slashed));
                events.add_event(Event::Slash {
                    address: fund.address,
                    amount: slashed,
                    coin: fund.coin,
                    validator_pub_key: *candidate_key,
                });
            }
            self.dirty.insert(height);
            debug!("frozen funds of candidate {} at height {} slashed", candidate_id, height);
        }
        Ok(())
    }

    /// Deltas reported since the last reset
    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn reset_checker(&mut self) {
        self.checker.reset();
    }

    /// Writes the dirty heights into `batch` and empties the cache
    pub fn commit(&mut self, batch: &mut DBBatch) {
        let serializer = FrozenFundsSerializer::new();
        for height in std::mem::take(&mut self.dirty) {
            let value = match self.list.get(&height) {
                Some(funds) if !funds.is_empty() => {
                    let mut bytes = Vec::new();
                    serializer
                        .serialize(funds, &mut bytes)
                        .expect(FROZEN_FUNDS_SER_ERROR);
                    Some(bytes)
                }
                _ => None,
            };
            batch.insert(frozen_funds_key!(height), value);
        }
        self.list.clear();
    }

    /// Funds released after `height`, the cache must have been committed
    pub fn export(&self, height: u64) -> Vec<AppFrozenFund> {
        let db = self.db.read();
        let mut result = Vec::new();
        for (key, value) in db.iterator(&frozen_funds_key!(height + 1), None) {
            if key.first() != Some(&FROZEN_FUNDS_PREFIX) {
                break;
            }
            let release_height = height_from_key(&key);
            result.extend(decode_funds(&value).into_iter().map(|fund| AppFrozenFund {
                height: release_height,
                address: fund.address,
                candidate_key: fund.candidate_key,
                candidate_id: fund.candidate_id,
                coin: fund.coin,
                value: fund.value,
            }));
        }
        result
    }

    /// Loads the frozen funds of a genesis document
    pub fn import(&mut self, funds: &[AppFrozenFund]) {
        for fund in funds {
            self.add_fund(
                fund.height,
                &fund.address,
                fund.candidate_key,
                fund.candidate_id,
                fund.coin,
                &fund.value,
            );
        }
    }
}

impl FrozenFundsBus for FrozenFunds {
    fn add_fund(
        &mut self,
        height: u64,
        address: &Address,
        candidate_key: Option<Pubkey>,
        candidate_id: u32,
        coin: CoinId,
        value: &Amount,
    ) {
        self.get_or_load(height).push(FrozenFund {
            address: *address,
            candidate_key,
            candidate_id,
            coin,
            value: value.clone(),
        });
        self.dirty.insert(height);
        self.checker.add_coin(coin, plus(value));
    }
}
