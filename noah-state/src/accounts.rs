// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::bus::AccountsBus;
use crate::checker::{minus, plus, Checker};
use crate::error::{StateError, StateResult};
use noah_db_exports::{
    DBBatch, ShareableTreeStore, ACCOUNTS_PREFIX, ACCOUNT_DESER_ERROR, ACCOUNT_SER_ERROR,
};
use noah_models::address::ADDRESS_SIZE_BYTES;
use noah_models::amount::{AmountDeserializer, AmountSerializer};
use noah_models::app_state::{AppAccount, AppBalance};
use noah_models::{Address, Amount, CoinId};
use noah_serialization::{
    DeserializeError, Deserializer, Serializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::Included;

const BALANCE_IDENT: u8 = b'b';

/// Account record key
macro_rules! account_key {
    ($addr:expr) => {
        [&[ACCOUNTS_PREFIX][..], &$addr.to_bytes()[..]].concat()
    };
}

/// Prefix of every balance of an account
macro_rules! balance_prefix {
    ($addr:expr) => {
        [&account_key!($addr)[..], &[BALANCE_IDENT]].concat()
    };
}

/// Balance key
macro_rules! balance_key {
    ($addr:expr, $coin:expr) => {
        [&balance_prefix!($addr)[..], &$coin.to_be_bytes()[..]].concat()
    };
}

/// Cached account. Balances are loaded all at once, a zero balance is removed.
#[derive(Debug, Clone, Default)]
struct Account {
    nonce: u64,
    balances: BTreeMap<CoinId, Amount>,
    dirty_balances: BTreeSet<CoinId>,
    is_dirty: bool,
}

/// Nonces and balances under the `a` prefix
pub struct Accounts {
    db: ShareableTreeStore,
    list: BTreeMap<Address, Account>,
    checker: Checker,
}

fn decode_nonce(bytes: &[u8]) -> u64 {
    let (_, nonce) = U64VarIntDeserializer::new(Included(0), Included(u64::MAX))
        .deserialize::<DeserializeError>(bytes)
        .expect(ACCOUNT_DESER_ERROR);
    nonce
}

fn decode_balance(bytes: &[u8]) -> Amount {
    let (_, amount) = AmountDeserializer::new()
        .deserialize::<DeserializeError>(bytes)
        .expect(ACCOUNT_DESER_ERROR);
    amount
}

fn coin_from_balance_key(key: &[u8]) -> CoinId {
    let offset = 1 + ADDRESS_SIZE_BYTES + 1;
    let bytes: [u8; 4] = key[offset..]
        .try_into()
        .expect(ACCOUNT_DESER_ERROR);
    CoinId(u32::from_be_bytes(bytes))
}

fn read_nonce(db: &ShareableTreeStore, address: &Address) -> u64 {
    db.read()
        .get(&account_key!(address))
        .map(|bytes| decode_nonce(&bytes))
        .unwrap_or_default()
}

fn read_balances(db: &ShareableTreeStore, address: &Address) -> BTreeMap<CoinId, Amount> {
    let db = db.read();
    let balances = db
        .prefix_iterator(&balance_prefix!(address))
        .map(|(key, value)| (coin_from_balance_key(&key), decode_balance(&value)))
        .collect();
    balances
}

impl Accounts {
    pub fn new(db: ShareableTreeStore) -> Self {
        Accounts {
            db,
            list: BTreeMap::new(),
            checker: Checker::new(),
        }
    }

    fn get_or_load(&mut self, address: &Address) -> &mut Account {
        let db = &self.db;
        self.list.entry(*address).or_insert_with(|| Account {
            nonce: read_nonce(db, address),
            balances: read_balances(db, address),
            ..Default::default()
        })
    }

    /// Last nonce used by `address`, 0 for a fresh account
    pub fn get_nonce(&self, address: &Address) -> u64 {
        match self.list.get(address) {
            Some(account) => account.nonce,
            None => read_nonce(&self.db, address),
        }
    }

    pub fn set_nonce(&mut self, address: &Address, nonce: u64) {
        let account = self.get_or_load(address);
        account.nonce = nonce;
        account.is_dirty = true;
    }

    /// Every non zero balance of `address`
    pub fn get_balances(&self, address: &Address) -> BTreeMap<CoinId, Amount> {
        match self.list.get(address) {
            Some(account) => account.balances.clone(),
            None => read_balances(&self.db, address),
        }
    }

    /// Deltas reported since the last reset
    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn reset_checker(&mut self) {
        self.checker.reset();
    }

    /// Writes the dirty accounts into `batch` and empties the cache
    pub fn commit(&mut self, batch: &mut DBBatch) {
        let nonce_serializer = U64VarIntSerializer::new();
        let amount_serializer = AmountSerializer::new();
        for (address, account) in std::mem::take(&mut self.list) {
            if account.is_dirty {
                let mut bytes = Vec::new();
                nonce_serializer
                    .serialize(&account.nonce, &mut bytes)
                    .expect(ACCOUNT_SER_ERROR);
                batch.insert(account_key!(address), Some(bytes));
            }
            for coin in account.dirty_balances {
                match account.balances.get(&coin) {
                    Some(value) => {
                        let mut bytes = Vec::new();
                        amount_serializer
                            .serialize(value, &mut bytes)
                            .expect(ACCOUNT_SER_ERROR);
                        batch.insert(balance_key!(address, coin), Some(bytes));
                    }
                    None => {
                        batch.insert(balance_key!(address, coin), None);
                    }
                }
            }
        }
    }

    /// Every account of the working version, the cache must have been committed
    pub fn export(&self) -> Vec<AppAccount> {
        let mut accounts: BTreeMap<Address, AppAccount> = BTreeMap::new();
        let db = self.db.read();
        for (key, value) in db.prefix_iterator(&[ACCOUNTS_PREFIX]) {
            let addr_bytes: [u8; ADDRESS_SIZE_BYTES] = key[1..1 + ADDRESS_SIZE_BYTES]
                .try_into()
                .expect(ACCOUNT_DESER_ERROR);
            let address = Address::from_bytes(&addr_bytes);
            let entry = accounts.entry(address).or_insert_with(|| AppAccount {
                address,
                balance: Vec::new(),
                nonce: 0,
            });
            if key.len() == 1 + ADDRESS_SIZE_BYTES {
                entry.nonce = decode_nonce(&value);
            } else {
                entry.balance.push(AppBalance {
                    coin: coin_from_balance_key(&key),
                    value: decode_balance(&value),
                });
            }
        }
        accounts.into_values().collect()
    }

    /// Loads the accounts of a genesis document
    pub fn import(&mut self, accounts: &[AppAccount]) {
        for app_account in accounts {
            self.set_nonce(&app_account.address, app_account.nonce);
            for balance in &app_account.balance {
                self.add_balance(&app_account.address, balance.coin, &balance.value);
            }
        }
    }
}

impl AccountsBus for Accounts {
    fn get_balance(&self, address: &Address, coin: CoinId) -> Amount {
        if let Some(account) = self.list.get(address) {
            return account.balances.get(&coin).cloned().unwrap_or_default();
        }
        self.db
            .read()
            .get(&balance_key!(address, coin))
            .map(|bytes| decode_balance(&bytes))
            .unwrap_or_default()
    }

    fn add_balance(&mut self, address: &Address, coin: CoinId, value: &Amount) {
        if value.is_zero() {
            return;
        }
        let account = self.get_or_load(address);
        *account.balances.entry(coin).or_default() += value;
        account.dirty_balances.insert(coin);
        account.is_dirty = true;
        self.checker.add_coin(coin, plus(value));
    }

    fn sub_balance(&mut self, address: &Address, coin: CoinId, value: &Amount) -> StateResult<()> {
        let account = self.get_or_load(address);
        let current = account.balances.get(&coin).cloned().unwrap_or_default();
        let remaining = current
            .checked_sub(value)
            .ok_or(StateError::InsufficientFunds(*address, coin))?;
        if remaining.is_zero() {
            account.balances.remove(&coin);
        } else {
            account.balances.insert(coin, remaining);
        }
        account.dirty_balances.insert(coin);
        account.is_dirty = true;
        self.checker.add_coin(coin, minus(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tools::{address, commit_batch, open_store};
    use assert_matches::assert_matches;

    #[test]
    fn test_balances_and_nonce() {
        let (_dir, db) = open_store();
        let mut accounts = Accounts::new(db.clone());
        let alice = address(1);
        accounts.add_balance(&alice, CoinId::BASE, &Amount::from_u64(100));
        accounts.add_balance(&alice, CoinId(2), &Amount::from_u64(5));
        accounts.set_nonce(&alice, 3);
        assert_matches!(
            accounts.sub_balance(&alice, CoinId(2), &Amount::from_u64(6)),
            Err(StateError::InsufficientFunds(_, CoinId(2)))
        );
        accounts.sub_balance(&alice, CoinId(2), &Amount::from_u64(5)).unwrap();

        let mut batch = DBBatch::new();
        accounts.commit(&mut batch);
        commit_batch(&db, batch);

        let accounts = Accounts::new(db);
        assert_eq!(accounts.get_nonce(&alice), 3);
        assert_eq!(
            accounts.get_balance(&alice, CoinId::BASE),
            Amount::from_u64(100)
        );
        // zero balances are removed
        assert_eq!(accounts.get_balances(&alice).len(), 1);
        let exported = accounts.export();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].nonce, 3);
        assert_eq!(exported[0].balance[0].coin, CoinId::BASE);
    }

    #[test]
    fn test_checker_follows_balances() {
        let (_dir, db) = open_store();
        let mut accounts = Accounts::new(db);
        let bob = address(2);
        accounts.add_balance(&bob, CoinId(1), &Amount::from_u64(10));
        accounts.sub_balance(&bob, CoinId(1), &Amount::from_u64(4)).unwrap();
        assert_eq!(accounts.checker().get_delta(CoinId(1)), plus(&Amount::from_u64(6)));
    }
}
