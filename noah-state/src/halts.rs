// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Votes of candidates to halt the chain, one list of keys per height.

use noah_db_exports::{
    DBBatch, ShareableTreeStore, HALTS_DESER_ERROR, HALTS_PREFIX, HALTS_SER_ERROR,
};
use noah_models::app_state::AppHaltBlock;
use noah_models::pubkey::{PubkeyDeserializer, PubkeySerializer};
use noah_models::Pubkey;
use noah_serialization::{
    DeserializeError, Deserializer, SerializeError, Serializer, U32VarIntDeserializer,
    U32VarIntSerializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::multi::length_count;
use nom::{IResult, Parser};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::Included;
use tracing::debug;

/// Halt votes key of a height
macro_rules! halts_key {
    ($height:expr) => {
        [&[HALTS_PREFIX][..], &$height.to_be_bytes()[..]].concat()
    };
}

/// Serializer for the halt votes of a height
#[derive(Default)]
pub struct HaltsSerializer {
    len_serializer: U32VarIntSerializer,
    pubkey_serializer: PubkeySerializer,
}

impl HaltsSerializer {
    /// Creates a new `HaltsSerializer`
    pub const fn new() -> Self {
        Self {
            len_serializer: U32VarIntSerializer::new(),
            pubkey_serializer: PubkeySerializer::new(),
        }
    }
}

impl Serializer<Vec<Pubkey>> for HaltsSerializer {
    fn serialize(&self, value: &Vec<Pubkey>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let len: u32 = value
            .len()
            .try_into()
            .map_err(|_| SerializeError::NumberTooBig("too many halt votes".to_string()))?;
        self.len_serializer.serialize(&len, buffer)?;
        for key in value {
            self.pubkey_serializer.serialize(key, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for the halt votes of a height
pub struct HaltsDeserializer {
    len_deserializer: U32VarIntDeserializer,
    pubkey_deserializer: PubkeyDeserializer,
}

impl HaltsDeserializer {
    /// Creates a new `HaltsDeserializer`
    pub const fn new() -> Self {
        Self {
            len_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            pubkey_deserializer: PubkeyDeserializer::new(),
        }
    }
}

impl Default for HaltsDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Vec<Pubkey>> for HaltsDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<Pubkey>, E> {
        context(
            "Failed halt votes deserialization",
            length_count(
                context("Failed length deserialization", |input| {
                    self.len_deserializer.deserialize(input)
                }),
                |input| self.pubkey_deserializer.deserialize(input),
            ),
        )
        .parse(buffer)
    }
}

fn decode_halts(bytes: &[u8]) -> Vec<Pubkey> {
    let (_, keys) = HaltsDeserializer::new()
        .deserialize::<DeserializeError>(bytes)
        .expect(HALTS_DESER_ERROR);
    keys
}

/// Halt votes under the `h` prefix
pub struct Halts {
    db: ShareableTreeStore,
    list: BTreeMap<u64, Vec<Pubkey>>,
    dirty: BTreeSet<u64>,
}

impl Halts {
    pub fn new(db: ShareableTreeStore) -> Self {
        Halts {
            db,
            list: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    fn read_halts(&self, height: u64) -> Vec<Pubkey> {
        self.db
            .read()
            .get(&halts_key!(height))
            .map(|bytes| decode_halts(&bytes))
            .unwrap_or_default()
    }

    /// Candidates that voted to halt at `height`
    pub fn get_halt_blocks(&self, height: u64) -> Vec<Pubkey> {
        match self.list.get(&height) {
            Some(keys) => keys.clone(),
            None => self.read_halts(height),
        }
    }

    /// Records the vote of `pub_key`, a repeated vote is kept once
    pub fn add_halt_block(&mut self, height: u64, pub_key: Pubkey) {
        if !self.list.contains_key(&height) {
            let keys = self.read_halts(height);
            self.list.insert(height, keys);
        }
        let keys = self.list.entry(height).or_default();
        if !keys.contains(&pub_key) {
            keys.push(pub_key);
            self.dirty.insert(height);
        }
    }

    /// Drops every vote at `height`
    pub fn delete(&mut self, height: u64) {
        if self.get_halt_blocks(height).is_empty() {
            return;
        }
        self.list.insert(height, Vec::new());
        self.dirty.insert(height);
        debug!("halt votes of height {} dropped", height);
    }

    /// Writes the dirty heights into `batch` and empties the cache
    pub fn commit(&mut self, batch: &mut DBBatch) {
        let serializer = HaltsSerializer::new();
        for height in std::mem::take(&mut self.dirty) {
            let value = match self.list.get(&height) {
                Some(keys) if !keys.is_empty() => {
                    let mut bytes = Vec::new();
                    serializer
                        .serialize(keys, &mut bytes)
                        .expect(HALTS_SER_ERROR);
                    Some(bytes)
                }
                _ => None,
            };
            batch.insert(halts_key!(height), value);
        }
        self.list.clear();
    }

    /// Votes for heights above `height`, the cache must have been committed
    pub fn export(&self, height: u64) -> Vec<AppHaltBlock> {
        let db = self.db.read();
        let mut result = Vec::new();
        for (key, value) in db.iterator(&halts_key!(height + 1), None) {
            if key.first() != Some(&HALTS_PREFIX) {
                break;
            }
            let bytes: [u8; 8] = key[1..].try_into().expect(HALTS_DESER_ERROR);
            let halt_height = u64::from_be_bytes(bytes);
            result.extend(
                decode_halts(&value)
                    .into_iter()
                    .map(|candidate_key| AppHaltBlock {
                        height: halt_height,
                        candidate_key,
                    }),
            );
        }
        result
    }

    /// Loads the votes of a genesis document
    pub fn import(&mut self, halts: &[AppHaltBlock]) {
        for halt in halts {
            self.add_halt_block(halt.height, halt.candidate_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tools::{commit_batch, open_store};

    #[test]
    fn test_votes_are_kept_per_height() {
        let (_dir, db) = open_store();
        let mut halts = Halts::new(db.clone());
        let first = Pubkey::from_bytes([1; 32]);
        let second = Pubkey::from_bytes([2; 32]);
        halts.add_halt_block(30, first);
        halts.add_halt_block(30, first);
        halts.add_halt_block(30, second);
        halts.add_halt_block(40, second);
        assert_eq!(halts.get_halt_blocks(30), vec![first, second]);

        let mut batch = DBBatch::new();
        halts.commit(&mut batch);
        commit_batch(&db, batch);

        let reloaded = Halts::new(db.clone());
        assert_eq!(reloaded.get_halt_blocks(30), vec![first, second]);
        assert!(reloaded.get_halt_blocks(35).is_empty());
        assert_eq!(
            reloaded.export(30),
            vec![AppHaltBlock {
                height: 40,
                candidate_key: second
            }]
        );
    }

    #[test]
    fn test_deleted_height_leaves_the_store() {
        let (_dir, db) = open_store();
        let mut halts = Halts::new(db.clone());
        let key = Pubkey::from_bytes([1; 32]);
        halts.import(&[AppHaltBlock {
            height: 12,
            candidate_key: key,
        }]);
        let mut batch = DBBatch::new();
        halts.commit(&mut batch);
        commit_batch(&db, batch);

        halts.delete(12);
        assert!(halts.get_halt_blocks(12).is_empty());
        let mut batch = DBBatch::new();
        halts.commit(&mut batch);
        assert_eq!(batch.get(&halts_key!(12u64)), Some(&None));
        commit_batch(&db, batch);
        assert!(db.read().get(&halts_key!(12u64)).is_none());
        assert!(halts.export(0).is_empty());
    }
}
