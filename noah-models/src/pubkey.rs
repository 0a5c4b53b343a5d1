// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::ModelsError;
use noah_serialization::{Deserializer, SerializeError, Serializer};
use nom::error::{context, ContextError, ParseError};
use nom::IResult;
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Size of a candidate consensus public key
pub const PUBKEY_SIZE_BYTES: usize = 32;
/// Size of a consensus level address
pub const TM_ADDRESS_SIZE_BYTES: usize = 20;

const PUBKEY_PREFIX: &str = "Np";

/// Consensus public key of a candidate.
///
/// This is the identity the consensus engine knows a validator by. It is never used to
/// verify transaction signatures.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub struct Pubkey([u8; PUBKEY_SIZE_BYTES]);

/// Consensus level address of a validator: first 20 bytes of `sha256(pubkey)`
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub struct TmAddress([u8; TM_ADDRESS_SIZE_BYTES]);

impl Pubkey {
    /// From raw bytes
    pub const fn from_bytes(data: [u8; PUBKEY_SIZE_BYTES]) -> Self {
        Pubkey(data)
    }

    /// Raw bytes
    pub fn to_bytes(&self) -> &[u8; PUBKEY_SIZE_BYTES] {
        &self.0
    }

    /// Derives the consensus level address
    /// ```
    /// # use noah_models::pubkey::Pubkey;
    /// let pubkey = Pubkey::from_bytes([4; 32]);
    /// assert_eq!(pubkey.tm_address(), pubkey.tm_address());
    /// assert_ne!(pubkey.tm_address(), Pubkey::from_bytes([5; 32]).tm_address());
    /// ```
    pub fn tm_address(&self) -> TmAddress {
        let digest = Sha256::digest(self.0);
        let mut bytes = [0u8; TM_ADDRESS_SIZE_BYTES];
        bytes.copy_from_slice(&digest[..TM_ADDRESS_SIZE_BYTES]);
        TmAddress(bytes)
    }
}

impl TmAddress {
    /// From raw bytes
    pub const fn from_bytes(data: [u8; TM_ADDRESS_SIZE_BYTES]) -> Self {
        TmAddress(data)
    }

    /// Raw bytes
    pub fn to_bytes(&self) -> &[u8; TM_ADDRESS_SIZE_BYTES] {
        &self.0
    }
}

impl std::fmt::Display for Pubkey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}", PUBKEY_PREFIX, hex::encode(self.0))
    }
}

impl std::fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl std::fmt::Display for TmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl std::fmt::Debug for TmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Pubkey {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = s.strip_prefix(PUBKEY_PREFIX).ok_or_else(|| {
            ModelsError::WrongPrefix(
                PUBKEY_PREFIX.to_string(),
                s.chars().take(PUBKEY_PREFIX.len()).collect(),
            )
        })?;
        let decoded =
            hex::decode(data).map_err(|err| ModelsError::PubkeyParseError(err.to_string()))?;
        let bytes: [u8; PUBKEY_SIZE_BYTES] = decoded.as_slice().try_into().map_err(|_| {
            ModelsError::PubkeyParseError(format!(
                "expected {} bytes, got {}",
                PUBKEY_SIZE_BYTES,
                decoded.len()
            ))
        })?;
        Ok(Pubkey(bytes))
    }
}

impl FromStr for TmAddress {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded =
            hex::decode(s).map_err(|err| ModelsError::PubkeyParseError(err.to_string()))?;
        let bytes: [u8; TM_ADDRESS_SIZE_BYTES] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| ModelsError::PubkeyParseError("bad tm address length".into()))?;
        Ok(TmAddress(bytes))
    }
}

impl serde::Serialize for Pubkey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Pubkey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(d)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Serializer for `Pubkey`
#[derive(Default, Clone)]
pub struct PubkeySerializer;

impl PubkeySerializer {
    /// Creates a new `PubkeySerializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<Pubkey> for PubkeySerializer {
    fn serialize(&self, value: &Pubkey, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(&value.0);
        Ok(())
    }
}

/// Deserializer for `Pubkey`
#[derive(Default, Clone)]
pub struct PubkeyDeserializer;

impl PubkeyDeserializer {
    /// Creates a new `PubkeyDeserializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<Pubkey> for PubkeyDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Pubkey, E> {
        context("Failed Pubkey deserialization", |input: &'a [u8]| {
            if input.len() < PUBKEY_SIZE_BYTES {
                return Err(nom::Err::Error(ParseError::from_error_kind(
                    input,
                    nom::error::ErrorKind::LengthValue,
                )));
            }
            let mut bytes = [0u8; PUBKEY_SIZE_BYTES];
            bytes.copy_from_slice(&input[..PUBKEY_SIZE_BYTES]);
            Ok((&input[PUBKEY_SIZE_BYTES..], Pubkey(bytes)))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_display_roundtrip() {
        let pubkey = Pubkey::from_bytes([0xab; 32]);
        let s = pubkey.to_string();
        assert!(s.starts_with("Npabab"));
        assert_eq!(Pubkey::from_str(&s).unwrap(), pubkey);
    }

    #[test]
    fn test_tm_address_is_sha256_prefix() {
        let pubkey = Pubkey::from_bytes([4; 32]);
        let digest = Sha256::digest([4u8; 32]);
        assert_eq!(&pubkey.tm_address().to_bytes()[..], &digest[..20]);
    }
}
