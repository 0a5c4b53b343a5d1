// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::{DBBatch, Key, TreeStoreError, Value};
use noah_hash::Hash;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;

/// Sorted key value store with a working overlay and saved, content addressed versions.
///
/// Reads and writes operate on the working version: keys that were not touched since the
/// last `save_version` fall through to the saved data. Only `save_version` writes to disk.
pub trait TreeStoreController: Send + Sync + Debug {
    /// Reads a key of the working version
    fn get(&self, key: &[u8]) -> Option<Value>;

    /// true if the key exists in the working version
    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Sets a key in the working version
    fn set(&mut self, key: Key, value: Value);

    /// Deletes a key from the working version
    fn delete(&mut self, key: &[u8]);

    /// Applies a batch of changes to the working version
    fn write_batch(&mut self, batch: DBBatch) {
        for (key, value) in batch {
            match value {
                Some(value) => self.set(key, value),
                None => self.delete(&key),
            }
        }
    }

    /// Ordered iteration over `[low, high)` of the working version, unbounded above if `high` is `None`
    fn iterator<'a>(
        &'a self,
        low: &[u8],
        high: Option<&[u8]>,
    ) -> Box<dyn Iterator<Item = (Key, Value)> + 'a>;

    /// Ordered iteration over the keys starting with `prefix`
    fn prefix_iterator<'a>(&'a self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Key, Value)> + 'a> {
        let prefix = prefix.to_vec();
        Box::new(
            self.iterator(&prefix, None)
                .take_while(move |(key, _)| key.starts_with(&prefix)),
        )
    }

    /// Persists the working version, returns its root hash and number
    fn save_version(&mut self) -> Result<(Hash, u64), TreeStoreError>;

    /// Drops the changes made since the last `save_version`
    fn discard_changes(&mut self);

    /// Last saved version, 0 for an empty store
    fn version(&self) -> u64;

    /// Root hash of the last saved version
    fn root_hash(&self) -> Hash;

    /// Reads a key as it was at a saved version still retained
    fn get_versioned(&self, key: &[u8], version: u64) -> Result<Option<Value>, TreeStoreError>;

    /// Stores the events of the block at `height`, written with the next `save_version`.
    /// Events are kept out of the root hash and of the history.
    fn set_events(&mut self, height: u64, events: Value);

    /// Events of the block at `height`, pending ones included
    fn get_events(&self, height: u64) -> Option<Value>;
}

/// Tree store shared between the block processing and the read paths
pub type ShareableTreeStore = Arc<RwLock<Box<dyn TreeStoreController>>>;
