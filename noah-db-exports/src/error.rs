// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use thiserror::Error;

/// tree store result
pub type TreeStoreResult<T, E = TreeStoreError> = core::result::Result<T, E>;

/// tree store error
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeStoreError {
    /// rocks db error: {0}
    RocksDBError(String),
    /// version {requested} is not available, retained versions are {oldest} to {latest}
    VersionNotAvailable {
        /// requested version
        requested: u64,
        /// oldest retained version
        oldest: u64,
        /// last saved version
        latest: u64,
    },
}
