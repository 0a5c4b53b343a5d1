// Copyright (c) 2022 MASSA LABS <info@massa.net>

use noah_models::amount::{AmountDeserializer, AmountSerializer};
use noah_models::coin::{
    CoinIdDeserializer, CoinIdSerializer, CoinSymbolDeserializer, CoinSymbolSerializer,
};
use noah_models::config::constants::MAX_COIN_NAME_BYTES;
use noah_models::{Amount, CoinId, CoinSymbol, CoinVersion};
use noah_serialization::{
    Deserializer, SerializeError, Serializer, U16VarIntDeserializer, U16VarIntSerializer,
    U32VarIntDeserializer, U32VarIntSerializer, U64VarIntDeserializer, U64VarIntSerializer,
    VecU8Deserializer, VecU8Serializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::multi::length_count;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use std::ops::Bound::Included;

/// A custom coin backed by a base coin reserve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub id: CoinId,
    pub name: String,
    pub symbol: CoinSymbol,
    /// constant reserve ratio, percent
    pub crr: u32,
    /// issued supply
    pub volume: Amount,
    /// base coin backing
    pub reserve: Amount,
    pub max_supply: Amount,
    pub version: CoinVersion,
}

/// Serializer for `Coin`
#[derive(Default)]
pub struct CoinSerializer {
    id_serializer: CoinIdSerializer,
    name_serializer: VecU8Serializer,
    symbol_serializer: CoinSymbolSerializer,
    u32_serializer: U32VarIntSerializer,
    u16_serializer: U16VarIntSerializer,
    amount_serializer: AmountSerializer,
}

impl CoinSerializer {
    /// Creates a new `CoinSerializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serializer<Coin> for CoinSerializer {
    fn serialize(&self, value: &Coin, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.id_serializer.serialize(&value.id, buffer)?;
        self.name_serializer
            .serialize(&value.name.as_bytes().to_vec(), buffer)?;
        self.symbol_serializer.serialize(&value.symbol, buffer)?;
        self.u32_serializer.serialize(&value.crr, buffer)?;
        self.amount_serializer.serialize(&value.volume, buffer)?;
        self.amount_serializer.serialize(&value.reserve, buffer)?;
        self.amount_serializer.serialize(&value.max_supply, buffer)?;
        self.u16_serializer.serialize(&value.version, buffer)?;
        Ok(())
    }
}

/// Deserializer for `Coin`
pub struct CoinDeserializer {
    id_deserializer: CoinIdDeserializer,
    name_deserializer: VecU8Deserializer,
    symbol_deserializer: CoinSymbolDeserializer,
    u32_deserializer: U32VarIntDeserializer,
    u16_deserializer: U16VarIntDeserializer,
    amount_deserializer: AmountDeserializer,
}

impl CoinDeserializer {
    /// Creates a new `CoinDeserializer`
    pub fn new() -> Self {
        Self {
            id_deserializer: CoinIdDeserializer::new(),
            name_deserializer: VecU8Deserializer::new(
                Included(0),
                Included(MAX_COIN_NAME_BYTES as u64),
            ),
            symbol_deserializer: CoinSymbolDeserializer::new(),
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(100)),
            u16_deserializer: U16VarIntDeserializer::new(Included(0), Included(u16::MAX)),
            amount_deserializer: AmountDeserializer::new(),
        }
    }
}

impl Default for CoinDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Coin> for CoinDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Coin, E> {
        context(
            "Failed Coin deserialization",
            tuple((
                |input| self.id_deserializer.deserialize(input),
                context("Failed name deserialization", |input| {
                    self.name_deserializer.deserialize(input)
                }),
                |input| self.symbol_deserializer.deserialize(input),
                context("Failed crr deserialization", |input| {
                    self.u32_deserializer.deserialize(input)
                }),
                |input| self.amount_deserializer.deserialize(input),
                |input| self.amount_deserializer.deserialize(input),
                |input| self.amount_deserializer.deserialize(input),
                context("Failed version deserialization", |input| {
                    self.u16_deserializer.deserialize(input)
                }),
            )),
        )
        .map(
            |(id, name, symbol, crr, volume, reserve, max_supply, version)| Coin {
                id,
                name: String::from_utf8_lossy(&name).into_owned(),
                symbol,
                crr,
                volume,
                reserve,
                max_supply,
                version,
            },
        )
        .parse(buffer)
    }
}

/// Serializer for the versions of a symbol
#[derive(Default)]
pub struct SymbolVersionsSerializer {
    u64_serializer: U64VarIntSerializer,
    u16_serializer: U16VarIntSerializer,
    id_serializer: CoinIdSerializer,
}

impl SymbolVersionsSerializer {
    /// Creates a new `SymbolVersionsSerializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serializer<Vec<(CoinVersion, CoinId)>> for SymbolVersionsSerializer {
    fn serialize(
        &self,
        value: &Vec<(CoinVersion, CoinId)>,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&(value.len() as u64), buffer)?;
        for (version, id) in value {
            self.u16_serializer.serialize(version, buffer)?;
            self.id_serializer.serialize(id, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for the versions of a symbol
pub struct SymbolVersionsDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    u16_deserializer: U16VarIntDeserializer,
    id_deserializer: CoinIdDeserializer,
}

impl SymbolVersionsDeserializer {
    /// Creates a new `SymbolVersionsDeserializer`
    pub fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(
                Included(0),
                Included(u16::MAX as u64 + 1),
            ),
            u16_deserializer: U16VarIntDeserializer::new(Included(0), Included(u16::MAX)),
            id_deserializer: CoinIdDeserializer::new(),
        }
    }
}

impl Default for SymbolVersionsDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Vec<(CoinVersion, CoinId)>> for SymbolVersionsDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<(CoinVersion, CoinId)>, E> {
        context(
            "Failed SymbolVersions deserialization",
            length_count(
                context("Failed length deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
                tuple((
                    |input| self.u16_deserializer.deserialize(input),
                    |input| self.id_deserializer.deserialize(input),
                )),
            ),
        )
        .parse(buffer)
    }
}
