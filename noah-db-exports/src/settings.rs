// Copyright (c) 2022 MASSA LABS <info@massa.net>

use std::path::PathBuf;

/// Config structure for a `TreeStore`
#[derive(Debug, Clone)]
pub struct TreeStoreConfig {
    /// The path to the database, used in the wrapped RocksDB instance
    pub path: PathBuf,
    /// Number of saved versions that stay readable with `get_versioned`, the latest included
    pub keep_versions: u64,
}
