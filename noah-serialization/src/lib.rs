// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Binary serialization primitives shared by every crate that writes to the state tree
//! or to the transaction wire format.
//!
//! A `Serializer<T>` appends the binary form of a `T` to a buffer, a `Deserializer<T>`
//! is a nom parser over a byte slice. Deserializers are generic over the nom error type
//! so that callers pick between a cheap error (`nom::error::Error`) and the
//! context-collecting `DeserializeError`.

#![warn(missing_docs)]

use displaydoc::Display;
use nom::{
    bytes::complete::take,
    error::{context, ContextError, ErrorKind, FromExternalError, ParseError},
    IResult, Parser,
};
use num::BigUint;
use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};
use thiserror::Error;

/// Errors raised while serializing
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone)]
pub enum SerializeError {
    /// Number {0} is too big to be serialized
    NumberTooBig(String),
    /// General error {0}
    GeneralError(String),
}

/// Error collected while running a deserializer, keeps every context on the way up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializeError<'a> {
    errors: Vec<(&'a [u8], String)>,
}

impl<'a> DeserializeError<'a> {
    /// Number of bytes left in the buffer when the innermost error happened
    pub fn remaining(&self) -> Option<usize> {
        self.errors.first().map(|(input, _)| input.len())
    }
}

impl<'a> ParseError<&'a [u8]> for DeserializeError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self {
            errors: vec![(input, kind.description().to_string())],
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, kind.description().to_string()));
        other
    }
}

impl<'a> ContextError<&'a [u8]> for DeserializeError<'a> {
    fn add_context(input: &'a [u8], ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, ctx.to_string()));
        other
    }
}

impl<'a, E> FromExternalError<&'a [u8], E> for DeserializeError<'a> {
    fn from_external_error(input: &'a [u8], kind: ErrorKind, _e: E) -> Self {
        Self::from_error_kind(input, kind)
    }
}

impl<'a> std::fmt::Display for DeserializeError<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut last_input = None;
        for (input, error) in self.errors.iter() {
            if last_input == Some(input) {
                write!(f, " / {}", error)?;
            } else {
                if last_input.is_some() {
                    writeln!(f)?;
                }
                write!(f, "{} (remaining {} bytes)", error, input.len())?;
            }
            last_input = Some(input);
        }
        Ok(())
    }
}

/// Parse a value out of a byte buffer
pub trait Deserializer<T> {
    /// Deserialize a value `T` from the beginning of `buffer`.
    ///
    /// Returns the rest of the buffer and the value on success.
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], T, E>;
}

/// Append the binary form of a value to a buffer
pub trait Serializer<T> {
    /// Serialize `value` at the end of `buffer`
    fn serialize(&self, value: &T, buffer: &mut Vec<u8>) -> Result<(), SerializeError>;
}

/// Serializer for `u16` in a varint form
#[derive(Debug, Clone, Default)]
pub struct U16VarIntSerializer;

/// Serializer for `u32` in a varint form
#[derive(Debug, Clone, Default)]
pub struct U32VarIntSerializer;

/// Serializer for `u64` in a varint form
#[derive(Debug, Clone, Default)]
pub struct U64VarIntSerializer;

macro_rules! impl_varint_serializer {
    ($type:ident, $s:ident, $encode:path, $buffer:path) => {
        impl $s {
            /// Creates a varint serializer
            pub const fn new() -> Self {
                Self
            }
        }

        impl Serializer<$type> for $s {
            fn serialize(
                &self,
                value: &$type,
                buffer: &mut Vec<u8>,
            ) -> Result<(), SerializeError> {
                buffer.extend_from_slice($encode(*value, &mut $buffer()));
                Ok(())
            }
        }
    };
}

impl_varint_serializer!(
    u16,
    U16VarIntSerializer,
    unsigned_varint::encode::u16,
    unsigned_varint::encode::u16_buffer
);
impl_varint_serializer!(
    u32,
    U32VarIntSerializer,
    unsigned_varint::encode::u32,
    unsigned_varint::encode::u32_buffer
);
impl_varint_serializer!(
    u64,
    U64VarIntSerializer,
    unsigned_varint::encode::u64,
    unsigned_varint::encode::u64_buffer
);

macro_rules! impl_varint_deserializer {
    ($type:ident, $d:ident, $decode:path, $ctx:expr) => {
        /// Bounded varint deserializer
        #[derive(Debug, Clone)]
        pub struct $d {
            range: (Bound<$type>, Bound<$type>),
        }

        impl $d {
            /// Creates a varint deserializer that only accepts values in `[min, max]` bounds
            pub const fn new(min: Bound<$type>, max: Bound<$type>) -> Self {
                Self { range: (min, max) }
            }
        }

        impl Deserializer<$type> for $d {
            fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
                &self,
                buffer: &'a [u8],
            ) -> IResult<&'a [u8], $type, E> {
                context($ctx, |input: &'a [u8]| {
                    let (rest, value) = $decode(input).map_err(|_| {
                        nom::Err::Error(ParseError::from_error_kind(input, ErrorKind::Fail))
                    })?;
                    if !self.range.contains(&value) {
                        return Err(nom::Err::Error(ParseError::from_error_kind(
                            input,
                            ErrorKind::Verify,
                        )));
                    }
                    Ok((rest, value))
                })(buffer)
            }
        }
    };
}

impl_varint_deserializer!(
    u16,
    U16VarIntDeserializer,
    unsigned_varint::nom::u16,
    "Failed u16 deserialization"
);
impl_varint_deserializer!(
    u32,
    U32VarIntDeserializer,
    unsigned_varint::nom::u32,
    "Failed u32 deserialization"
);
impl_varint_deserializer!(
    u64,
    U64VarIntDeserializer,
    unsigned_varint::nom::u64,
    "Failed u64 deserialization"
);

/// Serializer for length-prefixed byte vectors
#[derive(Debug, Clone, Default)]
pub struct VecU8Serializer {
    len_serializer: U64VarIntSerializer,
}

impl VecU8Serializer {
    /// Creates a new `VecU8Serializer`
    pub const fn new() -> Self {
        Self {
            len_serializer: U64VarIntSerializer::new(),
        }
    }
}

impl Serializer<Vec<u8>> for VecU8Serializer {
    fn serialize(&self, value: &Vec<u8>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let len: u64 = value.len().try_into().map_err(|err| {
            SerializeError::NumberTooBig(format!("too many bytes in Vec<u8>: {}", err))
        })?;
        self.len_serializer.serialize(&len, buffer)?;
        buffer.extend_from_slice(value);
        Ok(())
    }
}

/// Deserializer for length-prefixed byte vectors
#[derive(Debug, Clone)]
pub struct VecU8Deserializer {
    len_deserializer: U64VarIntDeserializer,
}

impl VecU8Deserializer {
    /// Creates a new `VecU8Deserializer` accepting lengths within the given bounds
    pub const fn new(min_length: Bound<u64>, max_length: Bound<u64>) -> Self {
        Self {
            len_deserializer: U64VarIntDeserializer::new(min_length, max_length),
        }
    }
}

impl Deserializer<Vec<u8>> for VecU8Deserializer {
    /// ```
    /// use std::ops::Bound::Included;
    /// use noah_serialization::{Serializer, Deserializer, DeserializeError, VecU8Serializer, VecU8Deserializer};
    ///
    /// let vec = vec![1, 2, 3];
    /// let mut serialized = Vec::new();
    /// VecU8Serializer::new().serialize(&vec, &mut serialized).unwrap();
    /// let deserializer = VecU8Deserializer::new(Included(0), Included(1000));
    /// let (rest, vec_deser) = deserializer.deserialize::<DeserializeError>(&serialized).unwrap();
    /// assert!(rest.is_empty());
    /// assert_eq!(vec, vec_deser);
    /// ```
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<u8>, E> {
        context("Failed Vec<u8> deserialization", |input: &'a [u8]| {
            let (rest, len) = self.len_deserializer.deserialize(input)?;
            let len = usize::try_from(len).map_err(|_| {
                nom::Err::Error(ParseError::from_error_kind(input, ErrorKind::TooLarge))
            })?;
            take(len).map(|bytes: &[u8]| bytes.to_vec()).parse(rest)
        })(buffer)
    }
}

/// Serializer for arbitrary precision unsigned integers (big-endian, length-prefixed)
#[derive(Debug, Clone, Default)]
pub struct BigUintSerializer {
    bytes_serializer: VecU8Serializer,
}

impl BigUintSerializer {
    /// Creates a new `BigUintSerializer`
    pub const fn new() -> Self {
        Self {
            bytes_serializer: VecU8Serializer::new(),
        }
    }
}

impl Serializer<BigUint> for BigUintSerializer {
    fn serialize(&self, value: &BigUint, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let bytes = if value.bits() == 0 {
            Vec::new()
        } else {
            value.to_bytes_be()
        };
        self.bytes_serializer.serialize(&bytes, buffer)
    }
}

/// Deserializer for arbitrary precision unsigned integers
#[derive(Debug, Clone)]
pub struct BigUintDeserializer {
    bytes_deserializer: VecU8Deserializer,
}

impl BigUintDeserializer {
    /// Creates a new `BigUintDeserializer` accepting at most `max_bytes` bytes of magnitude
    pub const fn new(max_bytes: u64) -> Self {
        Self {
            bytes_deserializer: VecU8Deserializer::new(Bound::Included(0), Bound::Included(max_bytes)),
        }
    }
}

impl Deserializer<BigUint> for BigUintDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], BigUint, E> {
        context("Failed BigUint deserialization", |input: &'a [u8]| {
            self.bytes_deserializer
                .deserialize(input)
                .map(|(rest, bytes)| (rest, BigUint::from_bytes_be(&bytes)))
        })(buffer)
    }
}

/// Serializer for `bool` as a single byte
#[derive(Debug, Clone, Default)]
pub struct BoolSerializer;

impl BoolSerializer {
    /// Creates a new `BoolSerializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<bool> for BoolSerializer {
    fn serialize(&self, value: &bool, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.push(u8::from(*value));
        Ok(())
    }
}

/// Deserializer for `bool`, rejects bytes other than 0 and 1
#[derive(Debug, Clone, Default)]
pub struct BoolDeserializer;

impl BoolDeserializer {
    /// Creates a new `BoolDeserializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<bool> for BoolDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], bool, E> {
        context("Failed bool deserialization", |input: &'a [u8]| {
            match input.first() {
                Some(0) => Ok((&input[1..], false)),
                Some(1) => Ok((&input[1..], true)),
                _ => Err(nom::Err::Error(ParseError::from_error_kind(
                    input,
                    ErrorKind::Verify,
                ))),
            }
        })(buffer)
    }
}

/// Serializer for `Option<T>`: a presence byte followed by the value
#[derive(Debug, Clone)]
pub struct OptionSerializer<T, ST>
where
    ST: Serializer<T>,
{
    data_serializer: ST,
    phantom_t: PhantomData<T>,
}

impl<T, ST> OptionSerializer<T, ST>
where
    ST: Serializer<T>,
{
    /// Creates a new `OptionSerializer` around the serializer of the value
    pub const fn new(data_serializer: ST) -> Self {
        Self {
            data_serializer,
            phantom_t: PhantomData,
        }
    }
}

impl<T, ST> Serializer<Option<T>> for OptionSerializer<T, ST>
where
    ST: Serializer<T>,
{
    fn serialize(&self, value: &Option<T>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        match value {
            Some(data) => {
                buffer.push(1);
                self.data_serializer.serialize(data, buffer)
            }
            None => {
                buffer.push(0);
                Ok(())
            }
        }
    }
}

/// Deserializer for `Option<T>`
#[derive(Debug, Clone)]
pub struct OptionDeserializer<T, DT>
where
    DT: Deserializer<T>,
{
    data_deserializer: DT,
    phantom_t: PhantomData<T>,
}

impl<T, DT> OptionDeserializer<T, DT>
where
    DT: Deserializer<T>,
{
    /// Creates a new `OptionDeserializer` around the deserializer of the value
    pub const fn new(data_deserializer: DT) -> Self {
        Self {
            data_deserializer,
            phantom_t: PhantomData,
        }
    }
}

impl<T, DT> Deserializer<Option<T>> for OptionDeserializer<T, DT>
where
    DT: Deserializer<T>,
{
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Option<T>, E> {
        context("Failed Option deserialization", |input: &'a [u8]| {
            match input.first() {
                Some(0) => Ok((&input[1..], None)),
                Some(1) => self
                    .data_deserializer
                    .deserialize(&input[1..])
                    .map(|(rest, data)| (rest, Some(data))),
                _ => Err(nom::Err::Error(ParseError::from_error_kind(
                    input,
                    ErrorKind::Verify,
                ))),
            }
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paste::paste;
    use std::ops::Bound::Included;

    macro_rules! gen_varint_tests {
        ($($type:ident);*) => {
            $(
                paste! {
                    #[test]
                    fn [<test_ $type _max_value>]() {
                        let serializer = [<$type:upper VarIntSerializer>]::new();
                        let deserializer = [<$type:upper VarIntDeserializer>]::new(Included(0), Included($type::MAX));
                        let mut buffer = Vec::new();
                        serializer.serialize(&$type::MAX, &mut buffer).unwrap();
                        let (rest, value) = deserializer.deserialize::<DeserializeError>(&buffer).unwrap();
                        assert!(rest.is_empty());
                        assert_eq!(value, $type::MAX);
                    }

                    #[test]
                    fn [<test_ $type _out_of_bounds>]() {
                        let serializer = [<$type:upper VarIntSerializer>]::new();
                        let deserializer = [<$type:upper VarIntDeserializer>]::new(Included(0), Included(10));
                        let mut buffer = Vec::new();
                        serializer.serialize(&11, &mut buffer).unwrap();
                        assert!(deserializer.deserialize::<DeserializeError>(&buffer).is_err());
                    }
                }
            )*
        };
    }

    gen_varint_tests!(u16; u32; u64);

    #[test]
    fn test_biguint_zero_is_empty() {
        let mut buffer = Vec::new();
        BigUintSerializer::new()
            .serialize(&BigUint::from(0u8), &mut buffer)
            .unwrap();
        assert_eq!(buffer, vec![0]);
        let (rest, value) = BigUintDeserializer::new(32)
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(value, BigUint::from(0u8));
    }

    #[test]
    fn test_biguint_too_long_is_rejected() {
        let big = BigUint::from(1u8) << 512usize;
        let mut buffer = Vec::new();
        BigUintSerializer::new().serialize(&big, &mut buffer).unwrap();
        assert!(BigUintDeserializer::new(32)
            .deserialize::<DeserializeError>(&buffer)
            .is_err());
        let (_, value) = BigUintDeserializer::new(128)
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert_eq!(value, big);
    }

    #[test]
    fn test_bool_rejects_garbage() {
        assert!(BoolDeserializer::new()
            .deserialize::<DeserializeError>(&[2])
            .is_err());
        let (_, value) = BoolDeserializer::new()
            .deserialize::<DeserializeError>(&[1])
            .unwrap();
        assert!(value);
    }

    #[test]
    fn test_option_presence_byte() {
        let serializer = OptionSerializer::new(U32VarIntSerializer::new());
        let deserializer =
            OptionDeserializer::new(U32VarIntDeserializer::new(Included(0), Included(u32::MAX)));
        let mut buffer = Vec::new();
        serializer.serialize(&Some(300u32), &mut buffer).unwrap();
        serializer.serialize(&None, &mut buffer).unwrap();
        let (rest, first) = deserializer.deserialize::<DeserializeError>(&buffer).unwrap();
        let (rest, second) = deserializer.deserialize::<DeserializeError>(rest).unwrap();
        assert!(rest.is_empty());
        assert_eq!(first, Some(300));
        assert_eq!(second, None);
        assert!(deserializer.deserialize::<DeserializeError>(&[2]).is_err());
    }
}
