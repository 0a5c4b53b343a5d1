// Copyright (c) 2022 MASSA LABS <info@massa.net>

use std::collections::BTreeMap;

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

/// Set of changes, `None` deletes the key
pub type DBBatch = BTreeMap<Key, Option<Value>>;
