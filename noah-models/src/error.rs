// Copyright (c) 2022 MASSA LABS <info@massa.net>

use displaydoc::Display;
use thiserror::Error;

/// models result
pub type ModelsResult<T, E = ModelsError> = core::result::Result<T, E>;

/// models error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ModelsError {
    /// Serialization error: {0}
    SerializeError(String),
    /// Deserialization error: {0}
    DeserializeError(String),
    /// noah_hash error: {0}
    NoahHashError(#[from] noah_hash::NoahHashError),
    /// noah_signature error: {0}
    NoahSignatureError(String),
    /// amount parse error: {0}
    AmountParseError(String),
    /// address parse error: {0}
    AddressParseError(String),
    /// public key parse error: {0}
    PubkeyParseError(String),
    /// invalid coin symbol: {0}
    InvalidCoinSymbol(String),
    /// Wrong prefix: expected {0}, got {1}
    WrongPrefix(String, String),
    /// invalid app state: {0}
    InvalidAppState(String),
}

impl From<noah_signature::NoahSignatureError> for ModelsError {
    fn from(err: noah_signature::NoahSignatureError) -> Self {
        ModelsError::NoahSignatureError(err.to_string())
    }
}
