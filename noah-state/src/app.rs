// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::bus::AppBus;
use crate::checker::{plus, Checker};
use noah_db_exports::{
    DBBatch, ShareableTreeStore, APP_DESER_ERROR, APP_PREFIX, APP_SER_ERROR,
};
use noah_models::amount::{AmountDeserializer, AmountSerializer};
use noah_models::config::constants::DEFAULT_MAX_GAS;
use noah_models::{Amount, CoinId};
use noah_serialization::{
    DeserializeError, Deserializer, SerializeError, Serializer, U32VarIntDeserializer,
    U32VarIntSerializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::sequence::tuple;
use nom::{IResult, Parser};
use std::ops::Bound::Included;

/// Global counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppModel {
    /// max gas per block
    pub max_gas: u64,
    /// base coin removed by punishments and reward dust
    pub total_slashed: Amount,
    /// number of custom coins ever created, the last assigned coin identifier
    pub coins_count: u32,
    /// last applied block
    pub height: u64,
}

impl Default for AppModel {
    fn default() -> Self {
        AppModel {
            max_gas: DEFAULT_MAX_GAS,
            total_slashed: Amount::zero(),
            coins_count: 0,
            height: 0,
        }
    }
}

/// Module holding the global counters under the `d` key
pub struct App {
    db: ShareableTreeStore,
    model: AppModel,
    is_dirty: bool,
    checker: Checker,
}

impl App {
    /// Loads the counters from the working version of the store
    pub fn new(db: ShareableTreeStore) -> Self {
        let model = db
            .read()
            .get(&[APP_PREFIX])
            .map(|bytes| {
                let (_, model) = AppModelDeserializer::new()
                    .deserialize::<DeserializeError>(&bytes)
                    .expect(APP_DESER_ERROR);
                model
            })
            .unwrap_or_default();
        App {
            db,
            model,
            is_dirty: false,
            checker: Checker::new(),
        }
    }

    /// Current counters
    pub fn model(&self) -> &AppModel {
        &self.model
    }

    pub fn get_max_gas(&self) -> u64 {
        self.model.max_gas
    }

    pub fn set_max_gas(&mut self, max_gas: u64) {
        self.model.max_gas = max_gas;
        self.is_dirty = true;
    }

    pub fn get_coins_count(&self) -> u32 {
        self.model.coins_count
    }

    pub fn set_coins_count(&mut self, count: u32) {
        self.model.coins_count = count;
        self.is_dirty = true;
    }

    /// Last applied block, zero before the genesis
    pub fn get_height(&self) -> u64 {
        self.model.height
    }

    pub fn set_height(&mut self, height: u64) {
        self.model.height = height;
        self.is_dirty = true;
    }

    /// Identifier the next created coin receives
    pub fn get_next_coin_id(&self) -> CoinId {
        CoinId(self.model.coins_count + 1)
    }

    /// Overwrites the counters, used by the genesis import
    pub fn set_model(&mut self, model: AppModel) {
        self.model = model;
        self.is_dirty = true;
    }

    /// Deltas reported since the last reset
    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn reset_checker(&mut self) {
        self.checker.reset();
    }

    /// Writes the counters into `batch` if they changed
    pub fn commit(&mut self, batch: &mut DBBatch) {
        if !self.is_dirty {
            return;
        }
        let mut bytes = Vec::new();
        AppModelSerializer::new()
            .serialize(&self.model, &mut bytes)
            .expect(APP_SER_ERROR);
        batch.insert(vec![APP_PREFIX], Some(bytes));
        self.is_dirty = false;
    }

    /// Drops the uncommitted changes and reloads the counters
    pub fn reload(&mut self) {
        *self = App::new(self.db.clone());
    }
}

impl AppBus for App {
    fn add_total_slashed(&mut self, value: &Amount) {
        if value.is_zero() {
            return;
        }
        self.model.total_slashed += value;
        self.checker.add_coin(CoinId::BASE, plus(value));
        self.is_dirty = true;
    }

    fn get_total_slashed(&self) -> Amount {
        self.model.total_slashed.clone()
    }
}

/// Serializer for `AppModel`
#[derive(Default)]
pub struct AppModelSerializer {
    u64_serializer: U64VarIntSerializer,
    u32_serializer: U32VarIntSerializer,
    amount_serializer: AmountSerializer,
}

impl AppModelSerializer {
    /// Creates a new `AppModelSerializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serializer<AppModel> for AppModelSerializer {
    fn serialize(&self, value: &AppModel, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&value.max_gas, buffer)?;
        self.amount_serializer
            .serialize(&value.total_slashed, buffer)?;
        self.u32_serializer.serialize(&value.coins_count, buffer)?;
        self.u64_serializer.serialize(&value.height, buffer)?;
        Ok(())
    }
}

/// Deserializer for `AppModel`
pub struct AppModelDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    u32_deserializer: U32VarIntDeserializer,
    amount_deserializer: AmountDeserializer,
}

impl AppModelDeserializer {
    /// Creates a new `AppModelDeserializer`
    pub fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            amount_deserializer: AmountDeserializer::new(),
        }
    }
}

impl Default for AppModelDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<AppModel> for AppModelDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], AppModel, E> {
        context(
            "Failed AppModel deserialization",
            tuple((
                context("Failed max_gas deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
                context("Failed total_slashed deserialization", |input| {
                    self.amount_deserializer.deserialize(input)
                }),
                context("Failed coins_count deserialization", |input| {
                    self.u32_deserializer.deserialize(input)
                }),
                context("Failed height deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
            )),
        )
        .map(|(max_gas, total_slashed, coins_count, height)| AppModel {
            max_gas,
            total_slashed,
            coins_count,
            height,
        })
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tools::open_store;

    #[test]
    fn test_counters_survive_commit() {
        let (_dir, db) = open_store();
        let mut app = App::new(db.clone());
        assert_eq!(app.get_max_gas(), DEFAULT_MAX_GAS);
        app.set_max_gas(42);
        app.set_coins_count(3);
        app.set_height(12);
        app.add_total_slashed(&Amount::from_u64(7));
        assert_eq!(app.get_next_coin_id(), CoinId(4));

        let mut batch = DBBatch::new();
        app.commit(&mut batch);
        db.write().write_batch(batch);
        db.write().save_version().unwrap();

        let app = App::new(db);
        assert_eq!(
            app.model(),
            &AppModel {
                max_gas: 42,
                total_slashed: Amount::from_u64(7),
                coins_count: 3,
                height: 12,
            }
        );
    }
}
