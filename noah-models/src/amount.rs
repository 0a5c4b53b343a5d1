// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::constants::{AMOUNT_DECIMALS, MAX_AMOUNT_BYTES};
use crate::error::ModelsError;
use noah_serialization::{
    BigUintDeserializer, BigUintSerializer, Deserializer, SerializeError, Serializer,
};
use nom::error::{context, ContextError, ParseError};
use nom::{IResult, Parser};
use num::{BigUint, ToPrimitive, Zero};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// An amount of coins in the smallest unit (1 NOAH = 10^18 qnoah).
///
/// Backed by an arbitrary precision unsigned integer: additions never overflow and
/// subtractions are always explicit about underflow (`checked_sub` / `saturating_sub`).
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Default, Hash)]
pub struct Amount(BigUint);

impl Amount {
    /// Create a zero Amount
    pub fn zero() -> Self {
        Amount(BigUint::zero())
    }

    /// returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Wraps a raw amount expressed in the smallest unit
    pub fn from_raw(raw: BigUint) -> Self {
        Amount(raw)
    }

    /// Raw amount expressed in the smallest unit
    pub fn from_u64(raw: u64) -> Self {
        Amount(BigUint::from(raw))
    }

    /// Whole coins, scaled by `10^18`
    /// ```
    /// # use noah_models::amount::Amount;
    /// assert_eq!(Amount::from_noah(1).to_string(), "1000000000000000000");
    /// ```
    pub fn from_noah(coins: u64) -> Self {
        Amount(BigUint::from(coins) * Self::unit())
    }

    /// `10^18`, the number of smallest units in one coin
    pub fn unit() -> BigUint {
        BigUint::from(10u32).pow(AMOUNT_DECIMALS)
    }

    /// Underlying integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Consumes into the underlying integer
    pub fn into_biguint(self) -> BigUint {
        self.0
    }

    /// `Some(u64)` if the raw value fits
    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    /// safely subtract another amount from self, returning None on underflow
    /// ```
    /// # use noah_models::amount::Amount;
    /// assert_eq!(Amount::from_u64(5).checked_sub(&Amount::from_u64(7)), None);
    /// assert_eq!(Amount::from_u64(7).checked_sub(&Amount::from_u64(5)), Some(Amount::from_u64(2)));
    /// ```
    #[must_use]
    pub fn checked_sub(&self, amount: &Amount) -> Option<Self> {
        if self.0 < amount.0 {
            None
        } else {
            Some(Amount(&self.0 - &amount.0))
        }
    }

    /// safely subtract another amount from self, flooring the result at zero
    #[must_use]
    pub fn saturating_sub(&self, amount: &Amount) -> Self {
        self.checked_sub(amount).unwrap_or_default()
    }

    /// `self * numerator / denominator`, truncated. Zero when `denominator` is zero.
    #[must_use]
    pub fn mul_div(&self, numerator: &BigUint, denominator: &BigUint) -> Self {
        if denominator.is_zero() {
            return Amount::zero();
        }
        Amount(&self.0 * numerator / denominator)
    }

    /// `percent`% of self, truncated
    #[must_use]
    pub fn percent(&self, percent: u32) -> Self {
        self.mul_div(&BigUint::from(percent), &BigUint::from(100u32))
    }

    /// Multiply by a small integer
    #[must_use]
    pub fn mul_u64(&self, factor: u64) -> Self {
        Amount(&self.0 * BigUint::from(factor))
    }

    /// Integer division by a small integer, zero when dividing by zero
    #[must_use]
    pub fn div_u64(&self, divisor: u64) -> Self {
        if divisor == 0 {
            return Amount::zero();
        }
        Amount(&self.0 / BigUint::from(divisor))
    }

    /// Human readable form with 18 decimals, trailing zeros trimmed
    /// ```
    /// # use noah_models::amount::Amount;
    /// # use std::str::FromStr;
    /// let amount = Amount::from_str("1500000000000000000").unwrap();
    /// assert_eq!(amount.to_noah_string(), "1.5");
    /// ```
    pub fn to_noah_string(&self) -> String {
        let unit = Self::unit();
        let int_part = &self.0 / &unit;
        let frac_part = &self.0 % &unit;
        if frac_part.is_zero() {
            return int_part.to_string();
        }
        let frac = format!("{:0>width$}", frac_part, width = AMOUNT_DECIMALS as usize);
        format!("{}.{}", int_part, frac.trim_end_matches('0'))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Amount> for &'a Amount {
    type Output = Amount;

    fn add(self, rhs: &'a Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) {
        self.0 += &rhs.0;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, v| acc + v)
    }
}

impl<'a> std::iter::Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |mut acc, v| {
            acc += v;
            acc
        })
    }
}

impl From<BigUint> for Amount {
    fn from(value: BigUint) -> Self {
        Amount(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = ModelsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModelsError::AmountParseError(format!(
                "not a decimal integer: {:?}",
                s
            )));
        }
        BigUint::from_str(s)
            .map(Amount)
            .map_err(|err| ModelsError::AmountParseError(err.to_string()))
    }
}

impl serde::Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Amount, D::Error> {
        struct AmountVisitor;

        impl<'de> serde::de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an amount in qnoah as a decimal string")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Amount::from_str(v).map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Amount::from_u64(v))
            }
        }

        d.deserialize_any(AmountVisitor)
    }
}

/// Serializer for `Amount`
#[derive(Clone, Default)]
pub struct AmountSerializer {
    biguint_serializer: BigUintSerializer,
}

impl AmountSerializer {
    /// Creates an `AmountSerializer`
    pub const fn new() -> Self {
        Self {
            biguint_serializer: BigUintSerializer::new(),
        }
    }
}

impl Serializer<Amount> for AmountSerializer {
    fn serialize(&self, value: &Amount, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.biguint_serializer.serialize(&value.0, buffer)
    }
}

/// Deserializer for `Amount`
#[derive(Clone)]
pub struct AmountDeserializer {
    biguint_deserializer: BigUintDeserializer,
}

impl AmountDeserializer {
    /// Creates an `AmountDeserializer`
    pub const fn new() -> Self {
        Self {
            biguint_deserializer: BigUintDeserializer::new(MAX_AMOUNT_BYTES),
        }
    }
}

impl Default for AmountDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Amount> for AmountDeserializer {
    /// ```
    /// use noah_models::amount::{Amount, AmountSerializer, AmountDeserializer};
    /// use noah_serialization::{Serializer, Deserializer, DeserializeError};
    ///
    /// let amount = Amount::from_noah(42);
    /// let mut serialized = vec![];
    /// AmountSerializer::new().serialize(&amount, &mut serialized).unwrap();
    /// let (rest, deserialized) = AmountDeserializer::new().deserialize::<DeserializeError>(&serialized).unwrap();
    /// assert!(rest.is_empty());
    /// assert_eq!(deserialized, amount);
    /// ```
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Amount, E> {
        context("Failed Amount deserialization", |input| {
            self.biguint_deserializer.deserialize(input)
        })
        .map(Amount)
        .parse(buffer)
    }
}
