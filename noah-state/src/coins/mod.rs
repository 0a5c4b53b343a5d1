// Copyright (c) 2022 MASSA LABS <info@massa.net>

pub mod formula;
mod model;

pub use model::*;

use crate::bus::CoinsBus;
use crate::checker::{minus, plus, Checker};
use crate::error::{StateError, StateResult};
use noah_db_exports::{
    DBBatch, ShareableTreeStore, COINS_PREFIX, COIN_DESER_ERROR, COIN_SER_ERROR,
};
use noah_models::app_state::AppCoin;
use noah_models::{Amount, CoinId, CoinSymbol, CoinVersion};
use noah_serialization::{DeserializeError, Deserializer, Serializer};
use std::collections::{BTreeMap, BTreeSet};

const SYMBOL_IDENT: u8 = b's';

/// Coin record key
macro_rules! coin_key {
    ($id:expr) => {
        [&[COINS_PREFIX][..], &$id.to_be_bytes()[..]].concat()
    };
}

/// Symbol index key
macro_rules! symbol_key {
    ($symbol:expr) => {
        [&[COINS_PREFIX, SYMBOL_IDENT][..], $symbol.as_str().as_bytes()].concat()
    };
}

/// Custom coins under the `q` prefix
pub struct Coins {
    db: ShareableTreeStore,
    list: BTreeMap<CoinId, Coin>,
    dirty: BTreeSet<CoinId>,
    symbols: BTreeMap<CoinSymbol, Vec<(CoinVersion, CoinId)>>,
    dirty_symbols: BTreeSet<CoinSymbol>,
    checker: Checker,
}

impl Coins {
    pub fn new(db: ShareableTreeStore) -> Self {
        Coins {
            db,
            list: BTreeMap::new(),
            dirty: BTreeSet::new(),
            symbols: BTreeMap::new(),
            dirty_symbols: BTreeSet::new(),
            checker: Checker::new(),
        }
    }

    fn read_coin(&self, id: CoinId) -> Option<Coin> {
        let bytes = self.db.read().get(&coin_key!(id))?;
        let (_, coin) = CoinDeserializer::new()
            .deserialize::<DeserializeError>(&bytes)
            .expect(COIN_DESER_ERROR);
        Some(coin)
    }

    fn get_mut(&mut self, id: CoinId) -> StateResult<&mut Coin> {
        if !self.list.contains_key(&id) {
            let coin = self.read_coin(id).ok_or(StateError::CoinNotExists(id))?;
            self.list.insert(id, coin);
        }
        self.list.get_mut(&id).ok_or(StateError::CoinNotExists(id))
    }

    /// true if a custom coin with this identifier exists, or for the base coin
    pub fn exists_id(&self, id: CoinId) -> bool {
        id.is_base() || self.list.contains_key(&id) || self.db.read().has(&coin_key!(id))
    }

    /// Every version of a symbol with the identifier of its coin, oldest first
    pub fn get_symbol_versions(&self, symbol: &CoinSymbol) -> Vec<(CoinVersion, CoinId)> {
        if let Some(versions) = self.symbols.get(symbol) {
            return versions.clone();
        }
        match self.db.read().get(&symbol_key!(symbol)) {
            Some(bytes) => {
                let (_, versions) = SymbolVersionsDeserializer::new()
                    .deserialize::<DeserializeError>(&bytes)
                    .expect(COIN_DESER_ERROR);
                versions
            }
            None => Vec::new(),
        }
    }

    /// Identifier of the coin carrying `symbol` at `version`
    pub fn exists(&self, symbol: &CoinSymbol, version: CoinVersion) -> Option<CoinId> {
        if *symbol == CoinSymbol::base() {
            return Some(CoinId::BASE);
        }
        self.get_symbol_versions(symbol)
            .into_iter()
            .find(|(v, _)| *v == version)
            .map(|(_, id)| id)
    }

    /// Latest coin carrying `symbol`
    pub fn get_by_symbol(&self, symbol: &CoinSymbol) -> Option<Coin> {
        let (_, id) = self.get_symbol_versions(symbol).into_iter().max()?;
        self.get_coin(id)
    }

    /// Registers a new coin. Its volume and reserve are reported as issued: the caller credits
    /// the volume to a holder and takes the reserve from one.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        id: CoinId,
        symbol: CoinSymbol,
        name: String,
        volume: Amount,
        crr: u32,
        reserve: Amount,
        max_supply: Amount,
        version: Option<CoinVersion>,
    ) -> StateResult<()> {
        if self.exists_id(id) {
            return Err(StateError::CoinAlreadyExists(id));
        }
        let mut versions = self.get_symbol_versions(&symbol);
        let version = version.unwrap_or_else(|| {
            versions
                .iter()
                .map(|(v, _)| v + 1)
                .max()
                .unwrap_or_default()
        });
        versions.push((version, id));
        versions.sort();
        self.symbols.insert(symbol.clone(), versions);
        self.dirty_symbols.insert(symbol.clone());

        self.checker.add_coin_volume(id, plus(&volume));
        self.checker.add_coin(CoinId::BASE, plus(&reserve));
        self.list.insert(
            id,
            Coin {
                id,
                name,
                symbol,
                crr,
                volume,
                reserve,
                max_supply,
                version,
            },
        );
        self.dirty.insert(id);
        Ok(())
    }

    /// Deltas reported since the last reset
    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn reset_checker(&mut self) {
        self.checker.reset();
    }

    /// Writes the dirty coins and symbol indices into `batch` and empties the cache
    pub fn commit(&mut self, batch: &mut DBBatch) {
        let coin_serializer = CoinSerializer::new();
        for id in std::mem::take(&mut self.dirty) {
            if let Some(coin) = self.list.get(&id) {
                let mut bytes = Vec::new();
                coin_serializer
                    .serialize(coin, &mut bytes)
                    .expect(COIN_SER_ERROR);
                batch.insert(coin_key!(id), Some(bytes));
            }
        }
        let symbols_serializer = SymbolVersionsSerializer::new();
        for symbol in std::mem::take(&mut self.dirty_symbols) {
            if let Some(versions) = self.symbols.get(&symbol) {
                let mut bytes = Vec::new();
                symbols_serializer
                    .serialize(versions, &mut bytes)
                    .expect(COIN_SER_ERROR);
                batch.insert(symbol_key!(symbol), Some(bytes));
            }
        }
        self.list.clear();
        self.symbols.clear();
    }

    /// Coins `1..=coins_count` of the working version
    pub fn export(&self, coins_count: u32) -> Vec<AppCoin> {
        (1..=coins_count)
            .filter_map(|id| self.get_coin(CoinId(id)))
            .map(|coin| AppCoin {
                id: coin.id,
                name: coin.name,
                symbol: coin.symbol,
                volume: coin.volume,
                crr: coin.crr,
                reserve: coin.reserve,
                max_supply: coin.max_supply,
                version: coin.version,
            })
            .collect()
    }

    /// Loads the coins of a genesis document
    pub fn import(&mut self, coins: &[AppCoin]) -> StateResult<()> {
        for coin in coins {
            self.create(
                coin.id,
                coin.symbol.clone(),
                coin.name.clone(),
                coin.volume.clone(),
                coin.crr,
                coin.reserve.clone(),
                coin.max_supply.clone(),
                Some(coin.version),
            )?;
        }
        Ok(())
    }
}

impl CoinsBus for Coins {
    fn get_coin(&self, id: CoinId) -> Option<Coin> {
        if id.is_base() {
            return None;
        }
        match self.list.get(&id) {
            Some(coin) => Some(coin.clone()),
            None => self.read_coin(id),
        }
    }

    fn add_volume(&mut self, id: CoinId, value: &Amount) -> StateResult<()> {
        let coin = self.get_mut(id)?;
        let volume = &coin.volume + value;
        if volume > coin.max_supply {
            return Err(StateError::SupplyOverflow(id));
        }
        coin.volume = volume;
        self.dirty.insert(id);
        self.checker.add_coin_volume(id, plus(value));
        Ok(())
    }

    fn sub_volume(&mut self, id: CoinId, value: &Amount) -> StateResult<()> {
        let coin = self.get_mut(id)?;
        coin.volume = coin
            .volume
            .checked_sub(value)
            .ok_or(StateError::VolumeUnderflow(id))?;
        self.dirty.insert(id);
        self.checker.add_coin_volume(id, minus(value));
        Ok(())
    }

    fn add_reserve(&mut self, id: CoinId, value: &Amount) -> StateResult<()> {
        let coin = self.get_mut(id)?;
        coin.reserve += value;
        self.dirty.insert(id);
        self.checker.add_coin(CoinId::BASE, plus(value));
        Ok(())
    }

    fn sub_reserve(&mut self, id: CoinId, value: &Amount) -> StateResult<()> {
        let coin = self.get_mut(id)?;
        coin.reserve = coin
            .reserve
            .checked_sub(value)
            .ok_or(StateError::ReserveUnderflow(id))?;
        self.dirty.insert(id);
        self.checker.add_coin(CoinId::BASE, minus(value));
        Ok(())
    }
}

/// Burns amounts of coins into their curves and returns the base coin each coin gave up from
/// its reserve. Every burn is priced before any curve moves, so on error nothing is burnt.
/// Base coin amounts are returned as is.
pub fn sell_into_curves(
    coins: &mut dyn CoinsBus,
    burns: &BTreeMap<CoinId, Amount>,
) -> StateResult<BTreeMap<CoinId, Amount>> {
    let mut returns = BTreeMap::new();
    for (coin, value) in burns {
        if coin.is_base() || value.is_zero() {
            returns.insert(*coin, value.clone());
            continue;
        }
        let info = coins.get_coin(*coin).ok_or(StateError::CoinNotExists(*coin))?;
        if *value > info.volume {
            return Err(StateError::VolumeUnderflow(*coin));
        }
        let ret = formula::calculate_sale_return(&info.volume, &info.reserve, info.crr, value);
        if ret > info.reserve {
            return Err(StateError::ReserveUnderflow(*coin));
        }
        returns.insert(*coin, ret);
    }
    for (coin, value) in burns {
        if coin.is_base() || value.is_zero() {
            continue;
        }
        let ret = returns.get(coin).cloned().unwrap_or_default();
        coins.sub_volume(*coin, value)?;
        coins.sub_reserve(*coin, &ret)?;
    }
    Ok(returns)
}

/// Total of the amounts of `returns`
pub fn sum_returns(returns: &BTreeMap<CoinId, Amount>) -> Amount {
    let mut total = Amount::zero();
    for value in returns.values() {
        total += value;
    }
    total
}

/// Base coin value of `value` coins sold into the curve, without mutation
pub fn noah_value(coins: &dyn CoinsBus, coin: CoinId, value: &Amount) -> Amount {
    if coin.is_base() {
        return value.clone();
    }
    match coins.get_coin(coin) {
        Some(info) => formula::calculate_sale_return(&info.volume, &info.reserve, info.crr, value),
        None => Amount::zero(),
    }
}
