// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::NoahSignatureError;
use ed25519_dalek::{Signer, Verifier};
use noah_hash::Hash;
use noah_serialization::Deserializer;
use nom::{
    error::{context, ContextError, ParseError},
    IResult,
};
use std::{convert::TryInto, str::FromStr};

/// Size of a public key
pub const PUBLIC_KEY_SIZE_BYTES: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;
/// Size of a secret key
pub const SECRET_KEY_SIZE_BYTES: usize = ed25519_dalek::SECRET_KEY_LENGTH;
/// Size of a signature
pub const SIGNATURE_SIZE_BYTES: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// `KeyPair` is used for signing transactions
#[derive(Clone)]
pub struct KeyPair(ed25519_dalek::SigningKey);

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "KeyPair({})", self.get_public_key())
    }
}

impl std::fmt::Display for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl FromStr for KeyPair {
    type Err = NoahSignatureError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyPair::from_bs58_check(s)
    }
}

impl KeyPair {
    /// Generate a new `KeyPair`
    ///
    /// # Example
    ///  ```
    /// # use noah_signature::KeyPair;
    /// # use noah_hash::Hash;
    /// let keypair = KeyPair::generate();
    /// let data = Hash::compute_from("Hello World!".as_bytes());
    /// let signature = keypair.sign(&data);
    /// assert!(keypair.get_public_key().verify_signature(&data, &signature).is_ok());
    /// ```
    pub fn generate() -> KeyPair {
        let mut rng = rand::rngs::OsRng;
        KeyPair(ed25519_dalek::SigningKey::generate(&mut rng))
    }

    /// Returns the Signature produced by signing a hash
    pub fn sign(&self, hash: &Hash) -> Signature {
        Signature(self.0.sign(hash.to_bytes()))
    }

    /// Return the secret bytes of the keypair
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE_BYTES] {
        self.0.to_bytes()
    }

    /// Build a `KeyPair` from secret bytes
    ///
    /// # Example
    /// ```
    /// # use noah_signature::KeyPair;
    /// let keypair = KeyPair::generate();
    /// let keypair2 = KeyPair::from_bytes(&keypair.to_bytes());
    /// assert_eq!(keypair.get_public_key(), keypair2.get_public_key());
    /// ```
    pub fn from_bytes(data: &[u8; SECRET_KEY_SIZE_BYTES]) -> Self {
        KeyPair(ed25519_dalek::SigningKey::from_bytes(data))
    }

    /// Get the public key of the keypair
    pub fn get_public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Encode a keypair into its base58 form
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    /// Decode a base58 encoded keypair
    pub fn from_bs58_check(data: &str) -> Result<Self, NoahSignatureError> {
        let bytes = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| {
                NoahSignatureError::ParsingError(format!(
                    "secret key bs58_check parsing error: {}",
                    err
                ))
            })?;
        let bytes: [u8; SECRET_KEY_SIZE_BYTES] = bytes.as_slice().try_into().map_err(|_| {
            NoahSignatureError::ParsingError("secret key has a wrong length".to_string())
        })?;
        Ok(KeyPair::from_bytes(&bytes))
    }
}

/// Public key used to check signatures
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bytes().cmp(other.to_bytes())
    }
}

impl FromStr for PublicKey {
    type Err = NoahSignatureError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicKey::from_bs58_check(s)
    }
}

impl PublicKey {
    /// Checks a signature of a hash
    ///
    /// # Example
    ///  ```
    /// # use noah_signature::KeyPair;
    /// # use noah_hash::Hash;
    /// let keypair = KeyPair::generate();
    /// let data = Hash::compute_from("Hello World!".as_bytes());
    /// let signature = keypair.sign(&data);
    /// let other = Hash::compute_from("Bye World!".as_bytes());
    /// assert!(keypair.get_public_key().verify_signature(&other, &signature).is_err());
    /// ```
    pub fn verify_signature(
        &self,
        hash: &Hash,
        signature: &Signature,
    ) -> Result<(), NoahSignatureError> {
        self.0
            .verify(hash.to_bytes(), &signature.0)
            .map_err(NoahSignatureError::EngineError)
    }

    /// Encode into base58 with checksum
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    /// Raw bytes of the key
    pub fn to_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE_BYTES] {
        self.0.as_bytes()
    }

    /// Decode from base58 with checksum
    pub fn from_bs58_check(data: &str) -> Result<PublicKey, NoahSignatureError> {
        let bytes = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| {
                NoahSignatureError::ParsingError(format!(
                    "public key bs58_check parsing error: {}",
                    err
                ))
            })?;
        let bytes: [u8; PUBLIC_KEY_SIZE_BYTES] = bytes.as_slice().try_into().map_err(|_| {
            NoahSignatureError::ParsingError("public key has a wrong length".to_string())
        })?;
        PublicKey::from_bytes(&bytes)
    }

    /// Decode from raw bytes, rejects points that are not on the curve
    pub fn from_bytes(data: &[u8; PUBLIC_KEY_SIZE_BYTES]) -> Result<PublicKey, NoahSignatureError> {
        ed25519_dalek::VerifyingKey::from_bytes(data)
            .map(PublicKey)
            .map_err(|err| {
                NoahSignatureError::ParsingError(format!("public key bytes parsing error: {}", err))
            })
    }
}

/// Deserializer for `PublicKey`
#[derive(Default, Clone)]
pub struct PublicKeyDeserializer;

impl PublicKeyDeserializer {
    /// Creates a `PublicKeyDeserializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<PublicKey> for PublicKeyDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], PublicKey, E> {
        context("Failed public key deserialization", |input: &'a [u8]| {
            let key = input
                .get(..PUBLIC_KEY_SIZE_BYTES)
                .and_then(|bytes| bytes.try_into().ok())
                .and_then(|bytes| PublicKey::from_bytes(bytes).ok())
                .ok_or_else(|| {
                    nom::Err::Error(ParseError::from_error_kind(
                        input,
                        nom::error::ErrorKind::LengthValue,
                    ))
                })?;
            Ok((&input[PUBLIC_KEY_SIZE_BYTES..], key))
        })(buffer)
    }
}

impl ::serde::Serialize for PublicKey {
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&self.to_bs58_check())
    }
}

impl<'de> ::serde::Deserialize<'de> for PublicKey {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<PublicKey, D::Error> {
        let s = String::deserialize(d)?;
        PublicKey::from_bs58_check(&s).map_err(::serde::de::Error::custom)
    }
}

/// Signature generated from a `KeyPair` and a hash
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.to_bytes()).with_check().into_string())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Signature {
    /// Raw bytes of the signature
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE_BYTES] {
        self.0.to_bytes()
    }

    /// Build a signature from raw bytes
    pub fn from_bytes(data: &[u8; SIGNATURE_SIZE_BYTES]) -> Signature {
        Signature(ed25519_dalek::Signature::from_bytes(data))
    }
}

/// Deserializer for `Signature`
#[derive(Default, Clone)]
pub struct SignatureDeserializer;

impl SignatureDeserializer {
    /// Creates a `SignatureDeserializer`
    pub const fn new() -> Self {
        Self
    }
}

impl Deserializer<Signature> for SignatureDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Signature, E> {
        context("Failed signature deserialization", |input: &'a [u8]| {
            let bytes: &[u8; SIGNATURE_SIZE_BYTES] = input
                .get(..SIGNATURE_SIZE_BYTES)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| {
                    nom::Err::Error(ParseError::from_error_kind(
                        input,
                        nom::error::ErrorKind::LengthValue,
                    ))
                })?;
            Ok((&input[SIGNATURE_SIZE_BYTES..], Signature::from_bytes(bytes)))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noah_serialization::DeserializeError;

    #[test]
    fn test_keypair_bs58_roundtrip() {
        let keypair = KeyPair::generate();
        let decoded = KeyPair::from_str(&keypair.to_string()).unwrap();
        assert_eq!(keypair.get_public_key(), decoded.get_public_key());
    }

    #[test]
    fn test_public_key_serde_json() {
        let public_key = KeyPair::generate().get_public_key();
        let json = serde_json::to_string(&public_key).unwrap();
        let decoded: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(public_key, decoded);
    }

    #[test]
    fn test_tampered_signature_fails() {
        let keypair = KeyPair::generate();
        let hash = Hash::compute_from(b"payload");
        let mut bytes = keypair.sign(&hash).to_bytes();
        bytes[0] ^= 1;
        let tampered = Signature::from_bytes(&bytes);
        assert!(keypair
            .get_public_key()
            .verify_signature(&hash, &tampered)
            .is_err());
    }

    #[test]
    fn test_short_signature_buffer() {
        assert!(SignatureDeserializer::new()
            .deserialize::<DeserializeError>(&[0u8; 10])
            .is_err());
    }
}
