// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::constants::{BASE_COIN_SYMBOL, MAX_COIN_SYMBOL_BYTES};
use crate::error::ModelsError;
use noah_serialization::{
    Deserializer, SerializeError, Serializer, U32VarIntDeserializer, U32VarIntSerializer,
    VecU8Deserializer, VecU8Serializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::{IResult, Parser};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;
use std::str::FromStr;

lazy_static::lazy_static! {
    static ref SYMBOL_RE: Regex = Regex::new(r"^[A-Z0-9]{3,10}$").expect("valid regex");
}

/// Version of a coin symbol. A symbol can be reused after a recreation, each reuse bumps it.
pub type CoinVersion = u16;

/// Numeric identifier of a coin, assigned sequentially at creation
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CoinId(pub u32);

impl CoinId {
    /// The base coin
    pub const BASE: CoinId = CoinId(0);

    /// true for the base coin
    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }

    /// Big-endian form used in storage keys, keeps the key order numeric
    pub fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Next identifier
    pub fn next(&self) -> CoinId {
        CoinId(self.0 + 1)
    }
}

impl std::fmt::Display for CoinId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticker of a coin, upper case letters and digits only
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CoinSymbol(String);

impl CoinSymbol {
    /// Validates a ticker
    /// ```
    /// # use noah_models::coin::CoinSymbol;
    /// assert!(CoinSymbol::new("ABC").is_ok());
    /// assert!(CoinSymbol::new("abc").is_err());
    /// assert!(CoinSymbol::new("AB").is_err());
    /// ```
    pub fn new(symbol: &str) -> Result<Self, ModelsError> {
        if symbol == BASE_COIN_SYMBOL {
            return Ok(CoinSymbol(symbol.to_string()));
        }
        if !SYMBOL_RE.is_match(symbol) {
            return Err(ModelsError::InvalidCoinSymbol(symbol.to_string()));
        }
        Ok(CoinSymbol(symbol.to_string()))
    }

    /// Symbol of the base coin
    pub fn base() -> Self {
        CoinSymbol(BASE_COIN_SYMBOL.to_string())
    }

    /// Ticker as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes, drives the creation fee
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a valid symbol
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for CoinSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CoinSymbol {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoinSymbol::new(s)
    }
}

impl TryFrom<String> for CoinSymbol {
    type Error = ModelsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CoinSymbol::new(&value)
    }
}

impl From<CoinSymbol> for String {
    fn from(value: CoinSymbol) -> Self {
        value.0
    }
}

/// Serializer for `CoinId`
#[derive(Clone, Default)]
pub struct CoinIdSerializer {
    u32_serializer: U32VarIntSerializer,
}

impl CoinIdSerializer {
    /// Creates a new `CoinIdSerializer`
    pub const fn new() -> Self {
        Self {
            u32_serializer: U32VarIntSerializer::new(),
        }
    }
}

impl Serializer<CoinId> for CoinIdSerializer {
    fn serialize(&self, value: &CoinId, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.u32_serializer.serialize(&value.0, buffer)
    }
}

/// Deserializer for `CoinId`
#[derive(Clone)]
pub struct CoinIdDeserializer {
    u32_deserializer: U32VarIntDeserializer,
}

impl CoinIdDeserializer {
    /// Creates a new `CoinIdDeserializer`
    pub const fn new() -> Self {
        Self {
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
        }
    }
}

impl Default for CoinIdDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<CoinId> for CoinIdDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], CoinId, E> {
        context("Failed CoinId deserialization", |input| {
            self.u32_deserializer.deserialize(input)
        })
        .map(CoinId)
        .parse(buffer)
    }
}

/// Serializer for `CoinSymbol`
#[derive(Clone, Default)]
pub struct CoinSymbolSerializer {
    bytes_serializer: VecU8Serializer,
}

impl CoinSymbolSerializer {
    /// Creates a new `CoinSymbolSerializer`
    pub const fn new() -> Self {
        Self {
            bytes_serializer: VecU8Serializer::new(),
        }
    }
}

impl Serializer<CoinSymbol> for CoinSymbolSerializer {
    fn serialize(&self, value: &CoinSymbol, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.bytes_serializer
            .serialize(&value.0.as_bytes().to_vec(), buffer)
    }
}

/// Deserializer for `CoinSymbol`. Only checks the length, the format is checked by handlers
/// so that a badly formatted ticker maps to its own response code.
#[derive(Clone)]
pub struct CoinSymbolDeserializer {
    bytes_deserializer: VecU8Deserializer,
}

impl CoinSymbolDeserializer {
    /// Creates a new `CoinSymbolDeserializer`
    pub const fn new() -> Self {
        Self {
            bytes_deserializer: VecU8Deserializer::new(
                Included(0),
                Included(MAX_COIN_SYMBOL_BYTES as u64),
            ),
        }
    }
}

impl Default for CoinSymbolDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<CoinSymbol> for CoinSymbolDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], CoinSymbol, E> {
        context("Failed CoinSymbol deserialization", |input: &'a [u8]| {
            let (rest, bytes) = self.bytes_deserializer.deserialize(input)?;
            let symbol = String::from_utf8(bytes).map_err(|_| {
                nom::Err::Error(ParseError::from_error_kind(
                    input,
                    nom::error::ErrorKind::Verify,
                ))
            })?;
            Ok((rest, CoinSymbol(symbol)))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noah_serialization::DeserializeError;

    #[test]
    fn test_symbol_rules() {
        assert!(CoinSymbol::new("ABCDEFGHIJ").is_ok());
        assert!(CoinSymbol::new("ABCDEFGHIJK").is_err());
        assert!(CoinSymbol::new("AB-C").is_err());
        assert!(CoinSymbol::new("NOAH").is_ok());
        assert!(serde_json::from_str::<CoinSymbol>("\"low\"").is_err());
    }

    #[test]
    fn test_symbol_wire_format_skips_validation() {
        let mut buffer = Vec::new();
        VecU8Serializer::new()
            .serialize(&b"ab".to_vec(), &mut buffer)
            .unwrap();
        let (rest, symbol) = CoinSymbolDeserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(symbol.as_str(), "ab");
        assert!(CoinSymbol::new(symbol.as_str()).is_err());
    }
}
