// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::ModelsError;
use noah_hash::Hash;
use noah_serialization::{Deserializer, SerializeError, Serializer};
use noah_signature::PublicKey;
use nom::error::{context, ContextError, ParseError};
use nom::IResult;
use std::str::FromStr;

/// Size of a serialized address, in bytes
pub const ADDRESS_SIZE_BYTES: usize = 20;

const ADDRESS_PREFIX: &str = "NOAHx";

/// Account address, derived from an ed25519 public key
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub struct Address([u8; ADDRESS_SIZE_BYTES]);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}", ADDRESS_PREFIX, hex::encode(self.0))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Address {
    /// Computes the address of the owner of a public key: the trailing 20 bytes of its hash.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let hash = Hash::compute_from(public_key.to_bytes());
        let mut bytes = [0u8; ADDRESS_SIZE_BYTES];
        bytes.copy_from_slice(&hash.to_bytes()[32 - ADDRESS_SIZE_BYTES..]);
        Address(bytes)
    }

    /// Raw bytes
    pub fn to_bytes(&self) -> &[u8; ADDRESS_SIZE_BYTES] {
        &self.0
    }

    /// From raw bytes
    pub const fn from_bytes(data: &[u8; ADDRESS_SIZE_BYTES]) -> Address {
        Address(*data)
    }
}

impl FromStr for Address {
    type Err = ModelsError;
    /// ## Example
    /// ```rust
    /// # use noah_signature::KeyPair;
    /// # use std::str::FromStr;
    /// # use noah_models::address::Address;
    /// # let keypair = KeyPair::generate();
    /// # let address = Address::from_public_key(&keypair.get_public_key());
    /// let ser = address.to_string();
    /// let res_addr = Address::from_str(&ser).unwrap();
    /// assert_eq!(address, res_addr);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = s.strip_prefix(ADDRESS_PREFIX).ok_or_else(|| {
            ModelsError::WrongPrefix(
                ADDRESS_PREFIX.to_string(),
                s.chars().take(ADDRESS_PREFIX.len()).collect(),
            )
        })?;
        let decoded =
            hex::decode(data).map_err(|err| ModelsError::AddressParseError(err.to_string()))?;
        let bytes: [u8; ADDRESS_SIZE_BYTES] = decoded.as_slice().try_into().map_err(|_| {
            ModelsError::AddressParseError(format!(
                "expected {} bytes, got {}",
                ADDRESS_SIZE_BYTES,
                decoded.len()
            ))
        })?;
        Ok(Address(bytes))
    }
}

impl ::serde::Serialize for Address {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(&self.to_string())
        } else {
            s.serialize_bytes(self.to_bytes())
        }
    }
}

impl<'de> ::serde::Deserialize<'de> for Address {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Address, D::Error> {
        if d.is_human_readable() {
            struct AddressVisitor;

            impl<'de> ::serde::de::Visitor<'de> for AddressVisitor {
                type Value = Address;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("NOAHx + hex::encode(bytes)")
                }

                fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Address::from_str(v).map_err(E::custom)
                }
            }
            d.deserialize_str(AddressVisitor)
        } else {
            struct BytesVisitor;

            impl<'de> ::serde::de::Visitor<'de> for BytesVisitor {
                type Value = Address;

                fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                    formatter.write_str("a bytestring")
                }

                fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
                where
                    E: ::serde::de::Error,
                {
                    Ok(Address::from_bytes(v.try_into().map_err(E::custom)?))
                }
            }

            d.deserialize_bytes(BytesVisitor)
        }
    }
}

/// Serializer for `Address`
#[derive(Default, Clone)]
pub struct AddressSerializer;

impl AddressSerializer {
    /// Creates a new `AddressSerializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<Address> for AddressSerializer {
    fn serialize(&self, value: &Address, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(value.to_bytes());
        Ok(())
    }
}

/// Deserializer for `Address`
#[derive(Default, Clone)]
pub struct AddressDeserializer;

impl AddressDeserializer {
    /// Creates a new `AddressDeserializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<Address> for AddressDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Address, E> {
        context("Failed Address deserialization", |input: &'a [u8]| {
            if input.len() < ADDRESS_SIZE_BYTES {
                return Err(nom::Err::Error(ParseError::from_error_kind(
                    input,
                    nom::error::ErrorKind::LengthValue,
                )));
            }
            let mut bytes = [0u8; ADDRESS_SIZE_BYTES];
            bytes.copy_from_slice(&input[..ADDRESS_SIZE_BYTES]);
            Ok((&input[ADDRESS_SIZE_BYTES..], Address(bytes)))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use noah_signature::KeyPair;

    #[test]
    fn test_address_str_format() {
        let address = Address::from_str("NOAHxf98017d1a37cc4bec05026ef94cb46102e16638e").unwrap();
        assert_eq!(
            address.to_string(),
            "NOAHxf98017d1a37cc4bec05026ef94cb46102e16638e"
        );
        assert_matches!(
            Address::from_str("Mxf98017d1a37cc4bec05026ef94cb46102e16638e"),
            Err(ModelsError::WrongPrefix(..))
        );
        assert_matches!(
            Address::from_str("NOAHxf98017"),
            Err(ModelsError::AddressParseError(_))
        );
    }

    #[test]
    fn test_address_is_stable_for_a_key() {
        let keypair = KeyPair::generate();
        let a = Address::from_public_key(&keypair.get_public_key());
        let b = Address::from_public_key(&keypair.get_public_key());
        assert_eq!(a, b);
        let other = Address::from_public_key(&KeyPair::generate().get_public_key());
        assert_ne!(a, other);
    }
}
