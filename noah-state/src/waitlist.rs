// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Delegations that did not fit in the stake slots of their candidate, kept per owner until
//! they are unbonded or delegated again.

use crate::bus::WaitListBus;
use crate::checker::{minus, plus, Checker};
use noah_db_exports::{
    DBBatch, ShareableTreeStore, WAITLIST_DESER_ERROR, WAITLIST_PREFIX, WAITLIST_SER_ERROR,
};
use noah_models::address::ADDRESS_SIZE_BYTES;
use noah_models::amount::{AmountDeserializer, AmountSerializer};
use noah_models::app_state::AppWaitlistItem;
use noah_models::coin::{CoinIdDeserializer, CoinIdSerializer};
use noah_models::{Address, Amount, CoinId};
use noah_serialization::{
    DeserializeError, Deserializer, SerializeError, Serializer, U32VarIntDeserializer,
    U32VarIntSerializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::multi::length_count;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::Included;

/// Wait list key of an owner
macro_rules! waitlist_key {
    ($addr:expr) => {
        [&[WAITLIST_PREFIX][..], &$addr.to_bytes()[..]].concat()
    };
}

/// A deferred delegation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitListItem {
    pub candidate_id: u32,
    pub coin: CoinId,
    pub value: Amount,
}

/// Serializer for the wait list of an owner
#[derive(Default)]
pub struct WaitListSerializer {
    u64_serializer: U64VarIntSerializer,
    u32_serializer: U32VarIntSerializer,
    coin_serializer: CoinIdSerializer,
    amount_serializer: AmountSerializer,
}

impl WaitListSerializer {
    /// Creates a new `WaitListSerializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serializer<Vec<WaitListItem>> for WaitListSerializer {
    fn serialize(
        &self,
        value: &Vec<WaitListItem>,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&(value.len() as u64), buffer)?;
        for item in value {
            self.u32_serializer.serialize(&item.candidate_id, buffer)?;
            self.coin_serializer.serialize(&item.coin, buffer)?;
            self.amount_serializer.serialize(&item.value, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for the wait list of an owner
pub struct WaitListDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    u32_deserializer: U32VarIntDeserializer,
    coin_deserializer: CoinIdDeserializer,
    amount_deserializer: AmountDeserializer,
}

impl WaitListDeserializer {
    /// Creates a new `WaitListDeserializer`
    pub fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u32::MAX as u64)),
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            coin_deserializer: CoinIdDeserializer::new(),
            amount_deserializer: AmountDeserializer::new(),
        }
    }
}

impl Default for WaitListDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Vec<WaitListItem>> for WaitListDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<WaitListItem>, E> {
        context(
            "Failed WaitList deserialization",
            length_count(
                context("Failed length deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
                tuple((
                    context("Failed candidate_id deserialization", |input| {
                        self.u32_deserializer.deserialize(input)
                    }),
                    |input| self.coin_deserializer.deserialize(input),
                    |input| self.amount_deserializer.deserialize(input),
                ))
                .map(|(candidate_id, coin, value)| WaitListItem {
                    candidate_id,
                    coin,
                    value,
                }),
            ),
        )
        .parse(buffer)
    }
}

/// Wait list under the `w` prefix
pub struct WaitList {
    db: ShareableTreeStore,
    list: BTreeMap<Address, Vec<WaitListItem>>,
    dirty: BTreeSet<Address>,
    checker: Checker,
}

fn read_items(db: &ShareableTreeStore, address: &Address) -> Vec<WaitListItem> {
    match db.read().get(&waitlist_key!(address)) {
        Some(bytes) => {
            let (_, items) = WaitListDeserializer::new()
                .deserialize::<DeserializeError>(&bytes)
                .expect(WAITLIST_DESER_ERROR);
            items
        }
        None => Vec::new(),
    }
}

impl WaitList {
    pub fn new(db: ShareableTreeStore) -> Self {
        WaitList {
            db,
            list: BTreeMap::new(),
            dirty: BTreeSet::new(),
            checker: Checker::new(),
        }
    }

    fn get_or_load(&mut self, address: &Address) -> &mut Vec<WaitListItem> {
        let db = &self.db;
        self.list
            .entry(*address)
            .or_insert_with(|| read_items(db, address))
    }

    /// Every deferred delegation of `address`
    pub fn get_by_address(&self, address: &Address) -> Vec<WaitListItem> {
        match self.list.get(address) {
            Some(items) => items.clone(),
            None => read_items(&self.db, address),
        }
    }

    /// Deferred delegations of `address` to a candidate, in every coin
    pub fn get_by_address_and_candidate(
        &self,
        address: &Address,
        candidate_id: u32,
    ) -> Vec<WaitListItem> {
        self.get_by_address(address)
            .into_iter()
            .filter(|item| item.candidate_id == candidate_id)
            .collect()
    }

    /// Deltas reported since the last reset
    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn reset_checker(&mut self) {
        self.checker.reset();
    }

    /// Writes the dirty lists into `batch` and empties the cache
    pub fn commit(&mut self, batch: &mut DBBatch) {
        let serializer = WaitListSerializer::new();
        for address in std::mem::take(&mut self.dirty) {
            let value = match self.list.get(&address) {
                Some(items) if !items.is_empty() => {
                    let mut bytes = Vec::new();
                    serializer
                        .serialize(items, &mut bytes)
                        .expect(WAITLIST_SER_ERROR);
                    Some(bytes)
                }
                _ => None,
            };
            batch.insert(waitlist_key!(address), value);
        }
        self.list.clear();
    }

    /// Every entry of the working version, the cache must have been committed
    pub fn export(&self) -> Vec<AppWaitlistItem> {
        let db = self.db.read();
        let deserializer = WaitListDeserializer::new();
        let mut result = Vec::new();
        for (key, value) in db.prefix_iterator(&[WAITLIST_PREFIX]) {
            let addr_bytes: [u8; ADDRESS_SIZE_BYTES] =
                key[1..].try_into().expect(WAITLIST_DESER_ERROR);
            let owner = Address::from_bytes(&addr_bytes);
            let (_, items) = deserializer
                .deserialize::<DeserializeError>(&value)
                .expect(WAITLIST_DESER_ERROR);
            result.extend(items.into_iter().map(|item| AppWaitlistItem {
                candidate_id: item.candidate_id,
                owner,
                coin: item.coin,
                value: item.value,
            }));
        }
        result
    }

    /// Loads the wait list of a genesis document
    pub fn import(&mut self, items: &[AppWaitlistItem]) {
        for item in items {
            self.add_wait_list(&item.owner, item.candidate_id, item.coin, &item.value);
        }
    }
}

impl WaitListBus for WaitList {
    fn add_wait_list(&mut self, address: &Address, candidate_id: u32, coin: CoinId, value: &Amount) {
        let items = self.get_or_load(address);
        match items
            .iter_mut()
            .find(|item| item.candidate_id == candidate_id && item.coin == coin)
        {
            Some(item) => item.value += value,
            None => items.push(WaitListItem {
                candidate_id,
                coin,
                value: value.clone(),
            }),
        }
        self.dirty.insert(*address);
        self.checker.add_coin(coin, plus(value));
    }

    fn get(&self, address: &Address, candidate_id: u32, coin: CoinId) -> Option<WaitListItem> {
        self.get_by_address(address)
            .into_iter()
            .find(|item| item.candidate_id == candidate_id && item.coin == coin)
    }

    fn delete(&mut self, address: &Address, candidate_id: u32, coin: CoinId) {
        let items = self.get_or_load(address);
        let Some(idx) = items
            .iter()
            .position(|item| item.candidate_id == candidate_id && item.coin == coin)
        else {
            return;
        };
        let removed = items.remove(idx);
        self.dirty.insert(*address);
        self.checker.add_coin(coin, minus(&removed.value));
    }
}
