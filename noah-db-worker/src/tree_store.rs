// Copyright (c) 2022 MASSA LABS <info@massa.net>

use noah_db_exports::{
    DBBatch, Key, TreeStoreConfig, TreeStoreController, TreeStoreError, Value, CF_ERROR,
    CRUD_ERROR, EVENTS_CF, HISTORY_ABSENT_TAG, HISTORY_CF, HISTORY_DESER_ERROR, HISTORY_PRESENT_TAG,
    METADATA_CF, OPEN_ERROR, STATE_CF, STATE_HASH_ERROR, STATE_HASH_INITIAL_BYTES,
    STATE_HASH_KEY, VERSION_DESER_ERROR, VERSION_KEY,
};
use noah_hash::{Hash, HashXof, HASH_XOF_SIZE_BYTES};
use noah_logging::noah_trace;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;
use tracing::debug;

const OLDEST_VERSION_KEY: &[u8; 1] = b"o";

/// RocksDB backed versioned tree store.
///
/// Four column families:
/// * state: the last saved version, every entry takes part in the root hash
/// * history: undo log, `version (8 bytes BE) + key` -> value of `key` before `version`
/// * metadata: extended root hash, last saved version, oldest readable version
/// * events: `height (8 bytes BE)` -> events of the block, outside the hash and never pruned
pub struct TreeStore {
    /// The rocksdb instance
    pub db: Arc<DB>,
    /// configuration for the `TreeStore`
    pub config: TreeStoreConfig,
    /// changes since the last saved version
    working: DBBatch,
    /// events recorded since the last saved version
    working_events: BTreeMap<u64, Value>,
    /// last saved version
    version: u64,
    /// oldest version that `get_versioned` can still read
    oldest_version: u64,
    /// root hash of the last saved version
    root_hash: Hash,
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore")
            .field("db", &self.db)
            .field("config", &self.config)
            .field("version", &self.version)
            .field("root_hash", &self.root_hash)
            .field("pending_changes", &self.working.len())
            .field("pending_events", &self.working_events.len())
            .finish()
    }
}

impl TreeStore {
    /// Opens (or creates) a `TreeStore` and restores its last saved version
    pub fn new(config: TreeStoreConfig) -> Self {
        let db_opts = Self::default_db_opts();
        Self::new_with_options(config, db_opts).expect(OPEN_ERROR)
    }

    /// RocksDB options used by `new`
    pub fn default_db_opts() -> Options {
        let mut db_opts = Options::default();
        db_opts.set_max_open_files(820);
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts
    }

    /// Returns a new `TreeStore` instance given a config and RocksDB options
    pub fn new_with_options(
        config: TreeStoreConfig,
        db_opts: Options,
    ) -> Result<Self, rocksdb::Error> {
        let db = DB::open_cf_descriptors(
            &db_opts,
            &config.path,
            vec![
                ColumnFamilyDescriptor::new(STATE_CF, Options::default()),
                ColumnFamilyDescriptor::new(METADATA_CF, Options::default()),
                ColumnFamilyDescriptor::new(HISTORY_CF, Options::default()),
                ColumnFamilyDescriptor::new(EVENTS_CF, Options::default()),
            ],
        )?;

        let mut store = Self {
            db: Arc::new(db),
            config,
            working: DBBatch::new(),
            working_events: BTreeMap::new(),
            version: 0,
            oldest_version: 0,
            root_hash: Hash::zero(),
        };
        store.load_version();
        Ok(store)
    }

    /// Restores the last saved version number and root hash from the metadata
    pub fn load_version(&mut self) {
        self.version = self.get_metadata_u64(VERSION_KEY).unwrap_or(0);
        self.oldest_version = self.get_metadata_u64(OLDEST_VERSION_KEY).unwrap_or(0);
        self.root_hash = self.get_xof_db_hash().condense();
        self.working.clear();
        self.working_events.clear();
        debug!(
            "tree store opened at version {} with root {}",
            self.version, self.root_hash
        );
    }

    fn get_metadata_u64(&self, key: &[u8]) -> Option<u64> {
        let handle = self.db.cf_handle(METADATA_CF).expect(CF_ERROR);
        self.db
            .get_cf(handle, key)
            .expect(CRUD_ERROR)
            .map(|bytes| u64::from_be_bytes(bytes.as_slice().try_into().expect(VERSION_DESER_ERROR)))
    }

    /// Get the current XOF state hash of the saved version
    pub fn get_xof_db_hash(&self) -> HashXof<HASH_XOF_SIZE_BYTES> {
        let handle = self.db.cf_handle(METADATA_CF).expect(CF_ERROR);
        self.db
            .get_cf(handle, STATE_HASH_KEY)
            .expect(CRUD_ERROR)
            .as_deref()
            .map(|state_hash_bytes| HashXof(state_hash_bytes.try_into().expect(STATE_HASH_ERROR)))
            .unwrap_or(HashXof(*STATE_HASH_INITIAL_BYTES))
    }

    fn get_saved(&self, key: &[u8]) -> Option<Value> {
        let handle = self.db.cf_handle(STATE_CF).expect(CF_ERROR);
        self.db.get_cf(handle, key).expect(CRUD_ERROR)
    }

    fn get_history(&self, version: u64, key: &[u8]) -> Option<Option<Value>> {
        let handle = self.db.cf_handle(HISTORY_CF).expect(CF_ERROR);
        self.db
            .get_cf(handle, history_key(version, key))
            .expect(CRUD_ERROR)
            .map(|entry| decode_history(&entry))
    }
}

fn history_key(version: u64, key: &[u8]) -> Vec<u8> {
    let mut history_key = Vec::with_capacity(8 + key.len());
    history_key.extend_from_slice(&version.to_be_bytes());
    history_key.extend_from_slice(key);
    history_key
}

fn encode_history(previous: Option<&[u8]>) -> Vec<u8> {
    match previous {
        Some(value) => {
            let mut entry = Vec::with_capacity(1 + value.len());
            entry.push(HISTORY_PRESENT_TAG);
            entry.extend_from_slice(value);
            entry
        }
        None => vec![HISTORY_ABSENT_TAG],
    }
}

fn decode_history(entry: &[u8]) -> Option<Value> {
    match entry.split_first() {
        Some((&HISTORY_PRESENT_TAG, value)) => Some(value.to_vec()),
        Some((&HISTORY_ABSENT_TAG, [])) => None,
        _ => panic!("{}", HISTORY_DESER_ERROR),
    }
}

/// Merges the saved entries with the working overlay, the overlay wins on equal keys
struct MergedIterator<'a> {
    saved: Peekable<Box<dyn Iterator<Item = (Key, Value)> + 'a>>,
    overlay: Peekable<std::collections::btree_map::Range<'a, Key, Option<Value>>>,
}

impl<'a> Iterator for MergedIterator<'a> {
    type Item = (Key, Value);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let order = match (self.saved.peek(), self.overlay.peek()) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((saved_key, _)), Some((overlay_key, _))) => {
                    saved_key.as_slice().cmp(overlay_key.as_slice())
                }
            };
            if order == Ordering::Less {
                return self.saved.next();
            }
            if order == Ordering::Equal {
                self.saved.next();
            }
            if let Some((key, Some(value))) = self.overlay.next() {
                return Some((key.clone(), value.clone()));
            }
        }
    }
}

impl TreeStoreController for TreeStore {
    fn get(&self, key: &[u8]) -> Option<Value> {
        match self.working.get(key) {
            Some(value) => value.clone(),
            None => self.get_saved(key),
        }
    }

    fn set(&mut self, key: Key, value: Value) {
        self.working.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.working.insert(key.to_vec(), None);
    }

    fn iterator<'a>(
        &'a self,
        low: &[u8],
        high: Option<&[u8]>,
    ) -> Box<dyn Iterator<Item = (Key, Value)> + 'a> {
        let handle = self.db.cf_handle(STATE_CF).expect(CF_ERROR);
        let high_owned = high.map(|h| h.to_vec());
        let saved: Box<dyn Iterator<Item = (Key, Value)> + 'a> = Box::new(
            self.db
                .iterator_cf(handle, IteratorMode::From(low, Direction::Forward))
                .map(|entry| entry.expect(CRUD_ERROR))
                .map(|(k, v)| (k.to_vec(), v.to_vec()))
                .take_while(move |(k, _)| match &high_owned {
                    Some(high) => k < high,
                    None => true,
                }),
        );
        let overlay = self.working.range::<[u8], _>((
            Included(low),
            match high {
                Some(high) => Excluded(high),
                None => Unbounded,
            },
        ));
        Box::new(MergedIterator {
            saved: saved.peekable(),
            overlay: overlay.peekable(),
        })
    }

    fn save_version(&mut self) -> Result<(Hash, u64), TreeStoreError> {
        let handle_state = self.db.cf_handle(STATE_CF).expect(CF_ERROR);
        let handle_metadata = self.db.cf_handle(METADATA_CF).expect(CF_ERROR);
        let handle_history = self.db.cf_handle(HISTORY_CF).expect(CF_ERROR);
        let handle_events = self.db.cf_handle(EVENTS_CF).expect(CF_ERROR);

        let new_version = self.version + 1;
        let mut current_xor_hash = self.get_xof_db_hash();
        let mut batch = WriteBatch::default();
        let mut changed = 0usize;

        for (key, value) in std::mem::take(&mut self.working) {
            let prev_value = self.db.get_cf(handle_state, &key).expect(CRUD_ERROR);
            if prev_value == value {
                continue;
            }
            changed += 1;
            if let Some(prev_value) = &prev_value {
                current_xor_hash ^= HashXof::compute_from_kv(&key, prev_value);
            }
            batch.put_cf(
                handle_history,
                history_key(new_version, &key),
                encode_history(prev_value.as_deref()),
            );
            match value {
                Some(value) => {
                    current_xor_hash ^= HashXof::compute_from_kv(&key, &value);
                    batch.put_cf(handle_state, &key, &value);
                }
                None => batch.delete_cf(handle_state, &key),
            }
        }

        for (height, events) in std::mem::take(&mut self.working_events) {
            batch.put_cf(handle_events, height.to_be_bytes(), events);
        }

        let keep = self.config.keep_versions.max(1);
        let oldest_version = self
            .oldest_version
            .max((new_version + 1).saturating_sub(keep));
        if oldest_version > self.oldest_version {
            // undo entries of versions up to `oldest_version` are no longer reachable
            batch.delete_range_cf(
                handle_history,
                0u64.to_be_bytes(),
                (oldest_version + 1).to_be_bytes(),
            );
        }

        batch.put_cf(handle_metadata, STATE_HASH_KEY, current_xor_hash.0);
        batch.put_cf(handle_metadata, VERSION_KEY, new_version.to_be_bytes());
        batch.put_cf(
            handle_metadata,
            OLDEST_VERSION_KEY,
            oldest_version.to_be_bytes(),
        );

        self.db
            .write(batch)
            .map_err(|e| TreeStoreError::RocksDBError(format!("Can't write batch to disk: {}", e)))?;

        self.version = new_version;
        self.oldest_version = oldest_version;
        self.root_hash = current_xor_hash.condense();
        noah_trace!("tree_store.save_version", {
            "version": new_version,
            "changed_keys": changed,
            "root_hash": self.root_hash.to_string()
        });
        Ok((self.root_hash, self.version))
    }

    fn discard_changes(&mut self) {
        self.working.clear();
        self.working_events.clear();
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn root_hash(&self) -> Hash {
        self.root_hash
    }

    fn get_versioned(&self, key: &[u8], version: u64) -> Result<Option<Value>, TreeStoreError> {
        if version > self.version || version < self.oldest_version {
            return Err(TreeStoreError::VersionNotAvailable {
                requested: version,
                oldest: self.oldest_version,
                latest: self.version,
            });
        }
        // the first change after `version` holds the value the key had at `version`
        for later in (version + 1)..=self.version {
            if let Some(previous) = self.get_history(later, key) {
                return Ok(previous);
            }
        }
        Ok(self.get_saved(key))
    }

    fn set_events(&mut self, height: u64, events: Value) {
        self.working_events.insert(height, events);
    }

    fn get_events(&self, height: u64) -> Option<Value> {
        if let Some(events) = self.working_events.get(&height) {
            return Some(events.clone());
        }
        let handle = self.db.cf_handle(EVENTS_CF).expect(CF_ERROR);
        self.db
            .get_cf(handle, height.to_be_bytes())
            .expect(CRUD_ERROR)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use noah_db_exports::ShareableTreeStore;
    use parking_lot::RwLock;
    use tempfile::tempdir;

    fn config(path: &std::path::Path, keep_versions: u64) -> TreeStoreConfig {
        TreeStoreConfig {
            path: path.to_path_buf(),
            keep_versions,
        }
    }

    fn initial_hash() -> Hash {
        HashXof(*STATE_HASH_INITIAL_BYTES).condense()
    }

    #[test]
    fn test_init() {
        // a second instance on the same path must be refused
        let temp_dir_db = tempdir().expect("Unable to create a temp folder");
        let mut db_opts = TreeStore::default_db_opts();
        db_opts.set_paranoid_checks(true);

        let db = TreeStore::new_with_options(config(temp_dir_db.path(), 10), db_opts.clone())
            .unwrap();
        assert_eq!(db.version(), 0);
        assert_eq!(db.root_hash(), initial_hash());

        let db2 = TreeStore::new_with_options(config(temp_dir_db.path(), 10), db_opts);
        assert!(db2.is_err());
    }

    #[test]
    fn test_overlay_falls_through_to_saved_version() {
        let temp_dir_db = tempdir().expect("Unable to create a temp folder");
        let mut db = TreeStore::new(config(temp_dir_db.path(), 10));

        db.set(b"a1".to_vec(), b"one".to_vec());
        db.set(b"a2".to_vec(), b"two".to_vec());
        assert_eq!(db.get(b"a1"), Some(b"one".to_vec()));
        assert_eq!(db.version(), 0);

        let (hash, version) = db.save_version().unwrap();
        assert_eq!(version, 1);
        assert_ne!(hash, initial_hash());

        db.delete(b"a1");
        assert!(!db.has(b"a1"));
        assert!(db.has(b"a2"));
        db.discard_changes();
        assert!(db.has(b"a1"));
    }

    #[test]
    fn test_root_hash_is_order_independent() {
        let dir_1 = tempdir().expect("Unable to create a temp folder");
        let dir_2 = tempdir().expect("Unable to create a temp folder");
        let mut db_1 = TreeStore::new(config(dir_1.path(), 10));
        let mut db_2 = TreeStore::new(config(dir_2.path(), 10));

        db_1.set(vec![1], vec![10]);
        db_1.set(vec![2], vec![20]);
        db_1.set(vec![3], vec![30]);
        db_1.delete(&[3]);

        db_2.write_batch(DBBatch::from([
            (vec![2], Some(vec![20])),
            (vec![1], Some(vec![99])),
        ]));
        db_2.set(vec![1], vec![10]);

        assert_eq!(db_1.save_version().unwrap(), db_2.save_version().unwrap());

        // a key added then removed over two versions leaves no trace in the hash
        db_1.set(vec![4], vec![40]);
        db_1.save_version().unwrap();
        db_1.delete(&[4]);
        let (hash_1, _) = db_1.save_version().unwrap();
        assert_eq!(hash_1, db_2.root_hash());
    }

    #[test]
    fn test_iterator_merges_overlay() {
        let temp_dir_db = tempdir().expect("Unable to create a temp folder");
        let db = TreeStore::new(config(temp_dir_db.path(), 10));
        let db: Box<dyn TreeStoreController> = Box::new(db);
        let db: ShareableTreeStore = Arc::new(RwLock::new(db));

        {
            let mut guard = db.write();
            guard.set(b"k1".to_vec(), b"saved1".to_vec());
            guard.set(b"k2".to_vec(), b"saved2".to_vec());
            guard.set(b"k4".to_vec(), b"saved4".to_vec());
            guard.set(b"z".to_vec(), b"other".to_vec());
            guard.save_version().unwrap();

            guard.delete(b"k2");
            guard.set(b"k3".to_vec(), b"new3".to_vec());
            guard.set(b"k4".to_vec(), b"new4".to_vec());
        }

        let guard = db.read();
        let all: Vec<_> = guard.prefix_iterator(b"k").collect();
        assert_eq!(
            all,
            vec![
                (b"k1".to_vec(), b"saved1".to_vec()),
                (b"k3".to_vec(), b"new3".to_vec()),
                (b"k4".to_vec(), b"new4".to_vec()),
            ]
        );
        let bounded: Vec<_> = guard
            .iterator(b"k2", Some(b"k4"))
            .map(|(k, _)| k)
            .collect();
        assert_eq!(bounded, vec![b"k3".to_vec()]);
    }

    #[test]
    fn test_versioned_reads_and_pruning() {
        let temp_dir_db = tempdir().expect("Unable to create a temp folder");
        let mut db = TreeStore::new(config(temp_dir_db.path(), 3));

        db.set(b"key".to_vec(), b"v1".to_vec());
        db.save_version().unwrap(); // 1
        db.set(b"key".to_vec(), b"v2".to_vec());
        db.save_version().unwrap(); // 2
        db.set(b"other".to_vec(), b"x".to_vec());
        db.save_version().unwrap(); // 3

        assert_eq!(db.get_versioned(b"key", 3).unwrap(), Some(b"v2".to_vec()));
        assert_eq!(db.get_versioned(b"key", 2).unwrap(), Some(b"v2".to_vec()));
        assert_eq!(db.get_versioned(b"key", 1).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(db.get_versioned(b"other", 2).unwrap(), None);

        db.delete(b"key");
        db.save_version().unwrap(); // 4, keeps 2..=4

        assert_eq!(db.get_versioned(b"key", 4).unwrap(), None);
        assert_eq!(db.get_versioned(b"key", 3).unwrap(), Some(b"v2".to_vec()));
        assert_matches!(
            db.get_versioned(b"key", 1),
            Err(TreeStoreError::VersionNotAvailable {
                requested: 1,
                oldest: 2,
                latest: 4
            })
        );
        assert_matches!(
            db.get_versioned(b"key", 5),
            Err(TreeStoreError::VersionNotAvailable { .. })
        );
    }

    #[test]
    fn test_reopen_restores_version() {
        let temp_dir_db = tempdir().expect("Unable to create a temp folder");
        let (hash, version) = {
            let mut db = TreeStore::new(config(temp_dir_db.path(), 10));
            db.set(b"a".to_vec(), b"b".to_vec());
            db.save_version().unwrap();
            db.set(b"a".to_vec(), b"c".to_vec());
            // never saved
            (db.root_hash(), db.version())
        };
        let db = TreeStore::new(config(temp_dir_db.path(), 10));
        assert_eq!(db.version(), version);
        assert_eq!(db.root_hash(), hash);
        assert_eq!(db.get(b"a"), Some(b"b".to_vec()));
    }

    #[test]
    fn test_events_stay_out_of_the_root_hash() {
        let dir_1 = tempdir().expect("Unable to create a temp folder");
        let dir_2 = tempdir().expect("Unable to create a temp folder");
        let mut db_1 = TreeStore::new(config(dir_1.path(), 1));
        let mut db_2 = TreeStore::new(config(dir_2.path(), 1));

        db_1.set(b"a".to_vec(), b"b".to_vec());
        db_1.set_events(7, b"events".to_vec());
        assert_eq!(db_1.get_events(7), Some(b"events".to_vec()));
        db_2.set(b"a".to_vec(), b"b".to_vec());
        assert_eq!(db_1.save_version().unwrap(), db_2.save_version().unwrap());

        db_1.set_events(8, b"dropped".to_vec());
        db_1.discard_changes();
        assert_eq!(db_1.get_events(8), None);

        // pruning of the history leaves the events alone
        db_1.set(b"a".to_vec(), b"c".to_vec());
        db_1.save_version().unwrap();
        drop(db_1);
        let db_1 = TreeStore::new(config(dir_1.path(), 1));
        assert_eq!(db_1.get_events(7), Some(b"events".to_vec()));
    }
}
