// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::error::NoahHashError;
use crate::settings::HASH_SIZE_BYTES;
use std::str::FromStr;

/// blake3 hash of transactions, addresses and state roots
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash)]
pub struct Hash([u8; HASH_SIZE_BYTES]);

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl Hash {
    /// Root of an empty store
    pub fn zero() -> Self {
        Self([0; HASH_SIZE_BYTES])
    }

    /// # Example
    ///  ```
    /// # use noah_hash::Hash;
    /// let hash = Hash::compute_from(b"hello world");
    /// assert_ne!(hash, Hash::zero());
    /// ```
    pub fn compute_from(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// bs58 with checksum
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    /// Raw bytes
    pub fn to_bytes(&self) -> &[u8; HASH_SIZE_BYTES] {
        &self.0
    }

    /// From raw bytes
    pub fn from_bytes(data: &[u8; HASH_SIZE_BYTES]) -> Hash {
        Hash(*data)
    }
}

impl FromStr for Hash {
    type Err = NoahHashError;

    /// Parses the bs58 check form
    /// ```
    /// # use noah_hash::Hash;
    /// # use std::str::FromStr;
    /// let hash = Hash::compute_from(b"hello world");
    /// assert_eq!(Hash::from_str(&hash.to_string()).unwrap(), hash);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|err| NoahHashError::ParsingError(err.to_string()))?;
        let bytes: [u8; HASH_SIZE_BYTES] = decoded.as_slice().try_into().map_err(|_| {
            NoahHashError::ParsingError(format!(
                "expected {} bytes, got {}",
                HASH_SIZE_BYTES,
                decoded.len()
            ))
        })?;
        Ok(Hash(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_blake3() {
        let data = "abc".as_bytes();
        let hash = Hash::compute_from(data);
        assert_eq!(hash.to_bytes(), blake3::hash(data).as_bytes());
    }

    #[test]
    fn test_bad_bs58_is_rejected() {
        assert!(Hash::from_str("not a hash").is_err());
        let short = bs58::encode([1u8; 4]).with_check().into_string();
        assert!(Hash::from_str(&short).is_err());
    }
}
