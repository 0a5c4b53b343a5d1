// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! `TreeStore` is the versioned key value store the node state lives in. It wraps:
//! * A RocksDB database (on Disk)
//! * A working overlay of uncommitted changes (on RAM)
//! * a config
//!
//! # RocksDB
//!
//! RocksDB stores keys and values, which are arbitrarily-sized byte streams (aka vec<u8> or &[u8]).
//! It supports both point lookups and range scans.
//!
//! We use 3 rocksdb columns:
//! * state: all data of the last saved version, used to compute the root hash
//! * history: the undo log of the retained versions
//! * metadata: root hash, version numbers
//!
//! Note that data is stored with a one byte module prefix (see constants.rs in noah-db-exports).
//! For instance, a balance will be stored (in column: 'state') as:
//! * key: ACCOUNTS_PREFIX+Address+'b'+CoinId (serialized as bytes)
//! * value: Amount (serialized as bytes)
//!
//! # Root hash
//!
//! Whenever an entry of the column 'state' changes, the extended hash is updated using Xor
//! (For more detail: HashXof). Removing the previous `(key, value)` and adding the new one
//! makes the hash a pure function of the saved key set, whatever the order of the writes.
//! The 32 bytes root hash is the hash of that extended hash.
//!
//! # Versions
//!
//! Every `save_version` writes, next to the new values, the value each changed key had
//! before. Reading a key at an older version walks those undo entries forward from that
//! version. Only the last `keep_versions` versions stay readable.

mod tree_store;

pub use crate::tree_store::*;
