// Copyright (c) 2022 MASSA LABS <info@massa.net>

use noah_models::address::{AddressDeserializer, AddressSerializer};
use noah_models::amount::{AmountDeserializer, AmountSerializer};
use noah_models::coin::{CoinIdDeserializer, CoinIdSerializer};
use noah_models::config::constants::MAX_COMMISSION;
use noah_models::pubkey::{PubkeyDeserializer, PubkeySerializer};
use noah_models::{Address, Amount, CoinId, Pubkey, TmAddress};
use noah_serialization::{
    BoolDeserializer, BoolSerializer, Deserializer, SerializeError, Serializer,
    U32VarIntDeserializer, U32VarIntSerializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use nom::error::{context, ContextError, ErrorKind, ParseError};
use nom::multi::length_count;
use nom::number::complete::u8 as parse_u8;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::collections::BTreeSet;
use std::ops::Bound::Included;

/// Candidate status. A new candidate starts offline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum CandidateStatus {
    Offline = 1,
    Online = 2,
}

/// A delegation backing a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stake {
    pub owner: Address,
    pub coin: CoinId,
    /// value in `coin`
    pub value: Amount,
    /// valuation in base coin, refreshed by `recalculate_stakes`
    pub noah_value: Amount,
}

/// A candidate and its delegations.
///
/// The live stakes are sorted by descending base coin valuation. Each slot is stored under
/// its own key so that only the slots that moved are rewritten.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: u32,
    pub pub_key: Pubkey,
    pub reward_address: Address,
    pub owner_address: Address,
    pub control_address: Address,
    /// percent of the rewards kept by the candidate
    pub commission: u32,
    pub status: CandidateStatus,
    /// excluded from the next validator sets until switched on again
    pub to_drop: bool,
    /// cached sum of the stakes valuations
    pub total_noah_stake: Amount,
    pub stakes: Vec<Stake>,
    /// delegations waiting for the next `recalculate_stakes`
    pub updates: Vec<Stake>,

    pub(crate) tm_address: TmAddress,
    pub(crate) is_dirty: bool,
    pub(crate) is_updates_dirty: bool,
    pub(crate) is_total_stake_stale: bool,
    pub(crate) dirty_stakes: BTreeSet<usize>,
}

impl Candidate {
    pub(crate) fn new(
        id: u32,
        pub_key: Pubkey,
        reward_address: Address,
        owner_address: Address,
        control_address: Address,
        commission: u32,
    ) -> Self {
        Candidate {
            id,
            pub_key,
            reward_address,
            owner_address,
            control_address,
            commission,
            status: CandidateStatus::Offline,
            to_drop: false,
            total_noah_stake: Amount::zero(),
            stakes: Vec::new(),
            updates: Vec::new(),
            tm_address: pub_key.tm_address(),
            is_dirty: true,
            is_updates_dirty: false,
            is_total_stake_stale: false,
            dirty_stakes: BTreeSet::new(),
        }
    }

    /// Consensus address
    pub fn tm_address(&self) -> TmAddress {
        self.tm_address
    }

    pub fn is_online(&self) -> bool {
        self.status == CandidateStatus::Online
    }

    pub(crate) fn stake_index(&self, owner: &Address, coin: CoinId) -> Option<usize> {
        self.stakes
            .iter()
            .position(|stake| stake.owner == *owner && stake.coin == coin)
    }

    /// Live stake of `owner` in `coin`
    pub fn get_stake(&self, owner: &Address, coin: CoinId) -> Option<&Stake> {
        self.stake_index(owner, coin).map(|idx| &self.stakes[idx])
    }

    /// Sum of the live stakes valuations
    pub fn sum_stakes(&self) -> Amount {
        self.stakes.iter().map(|stake| &stake.noah_value).sum()
    }

    /// Marks the slots from `from` to the end of the longer of both layouts as rewritten
    pub(crate) fn mark_stakes_from(&mut self, from: usize, previous_len: usize) {
        let end = previous_len.max(self.stakes.len());
        self.dirty_stakes.extend(from..end);
    }
}

/// Serializer for `Stake`
#[derive(Default)]
pub struct StakeSerializer {
    address_serializer: AddressSerializer,
    coin_serializer: CoinIdSerializer,
    amount_serializer: AmountSerializer,
}

impl StakeSerializer {
    /// Creates a new `StakeSerializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serializer<Stake> for StakeSerializer {
    fn serialize(&self, value: &Stake, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.address_serializer.serialize(&value.owner, buffer)?;
        self.coin_serializer.serialize(&value.coin, buffer)?;
        self.amount_serializer.serialize(&value.value, buffer)?;
        self.amount_serializer.serialize(&value.noah_value, buffer)?;
        Ok(())
    }
}

/// Deserializer for `Stake`
#[derive(Default)]
pub struct StakeDeserializer {
    address_deserializer: AddressDeserializer,
    coin_deserializer: CoinIdDeserializer,
    amount_deserializer: AmountDeserializer,
}

impl StakeDeserializer {
    /// Creates a new `StakeDeserializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Deserializer<Stake> for StakeDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Stake, E> {
        context(
            "Failed Stake deserialization",
            tuple((
                |input| self.address_deserializer.deserialize(input),
                |input| self.coin_deserializer.deserialize(input),
                |input| self.amount_deserializer.deserialize(input),
                |input| self.amount_deserializer.deserialize(input),
            )),
        )
        .map(|(owner, coin, value, noah_value)| Stake {
            owner,
            coin,
            value,
            noah_value,
        })
        .parse(buffer)
    }
}

/// Serializer for a list of pending updates
#[derive(Default)]
pub struct StakeListSerializer {
    u64_serializer: U64VarIntSerializer,
    stake_serializer: StakeSerializer,
}

impl StakeListSerializer {
    /// Creates a new `StakeListSerializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serializer<Vec<Stake>> for StakeListSerializer {
    fn serialize(&self, value: &Vec<Stake>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&(value.len() as u64), buffer)?;
        for stake in value {
            self.stake_serializer.serialize(stake, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for a list of pending updates
pub struct StakeListDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    stake_deserializer: StakeDeserializer,
}

impl StakeListDeserializer {
    /// Creates a new `StakeListDeserializer`
    pub fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u32::MAX as u64)),
            stake_deserializer: StakeDeserializer::new(),
        }
    }
}

impl Default for StakeListDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Vec<Stake>> for StakeListDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<Stake>, E> {
        context(
            "Failed stake list deserialization",
            length_count(
                context("Failed length deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
                |input| self.stake_deserializer.deserialize(input),
            ),
        )
        .parse(buffer)
    }
}

/// Serializer for the candidate record, stakes and updates are stored apart
#[derive(Default)]
pub struct CandidateSerializer {
    u32_serializer: U32VarIntSerializer,
    pubkey_serializer: PubkeySerializer,
    address_serializer: AddressSerializer,
    bool_serializer: BoolSerializer,
    amount_serializer: AmountSerializer,
}

impl CandidateSerializer {
    /// Creates a new `CandidateSerializer`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serializer<Candidate> for CandidateSerializer {
    fn serialize(&self, value: &Candidate, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.u32_serializer.serialize(&value.id, buffer)?;
        self.pubkey_serializer.serialize(&value.pub_key, buffer)?;
        self.address_serializer
            .serialize(&value.reward_address, buffer)?;
        self.address_serializer
            .serialize(&value.owner_address, buffer)?;
        self.address_serializer
            .serialize(&value.control_address, buffer)?;
        self.u32_serializer.serialize(&value.commission, buffer)?;
        buffer.push(value.status.into());
        self.bool_serializer.serialize(&value.to_drop, buffer)?;
        self.amount_serializer
            .serialize(&value.total_noah_stake, buffer)?;
        Ok(())
    }
}

/// Deserializer for the candidate record
pub struct CandidateDeserializer {
    u32_deserializer: U32VarIntDeserializer,
    commission_deserializer: U32VarIntDeserializer,
    pubkey_deserializer: PubkeyDeserializer,
    address_deserializer: AddressDeserializer,
    bool_deserializer: BoolDeserializer,
    amount_deserializer: AmountDeserializer,
}

impl CandidateDeserializer {
    /// Creates a new `CandidateDeserializer`
    pub fn new() -> Self {
        Self {
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            commission_deserializer: U32VarIntDeserializer::new(
                Included(0),
                Included(MAX_COMMISSION),
            ),
            pubkey_deserializer: PubkeyDeserializer::new(),
            address_deserializer: AddressDeserializer::new(),
            bool_deserializer: BoolDeserializer::new(),
            amount_deserializer: AmountDeserializer::new(),
        }
    }
}

impl Default for CandidateDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Candidate> for CandidateDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Candidate, E> {
        context(
            "Failed Candidate deserialization",
            tuple((
                context("Failed id deserialization", |input| {
                    self.u32_deserializer.deserialize(input)
                }),
                |input| self.pubkey_deserializer.deserialize(input),
                |input| self.address_deserializer.deserialize(input),
                |input| self.address_deserializer.deserialize(input),
                |input| self.address_deserializer.deserialize(input),
                context("Failed commission deserialization", |input| {
                    self.commission_deserializer.deserialize(input)
                }),
                context("Failed status deserialization", |input: &'a [u8]| {
                    let (rest, byte) = parse_u8::<&'a [u8], E>(input)?;
                    let status = CandidateStatus::try_from(byte).map_err(|_| {
                        nom::Err::Error(ParseError::from_error_kind(input, ErrorKind::Verify))
                    })?;
                    Ok((rest, status))
                }),
                |input| self.bool_deserializer.deserialize(input),
                |input| self.amount_deserializer.deserialize(input),
            )),
        )
        .map(
            |(
                id,
                pub_key,
                reward_address,
                owner_address,
                control_address,
                commission,
                status,
                to_drop,
                total_noah_stake,
            )| {
                let mut candidate = Candidate::new(
                    id,
                    pub_key,
                    reward_address,
                    owner_address,
                    control_address,
                    commission,
                );
                candidate.status = status;
                candidate.to_drop = to_drop;
                candidate.total_noah_stake = total_noah_stake;
                candidate.is_dirty = false;
                candidate
            },
        )
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noah_serialization::DeserializeError;

    #[test]
    fn test_candidate_record_keeps_flags() {
        let mut candidate = Candidate::new(
            7,
            Pubkey::from_bytes([4; 32]),
            Address::from_bytes(&[1; 20]),
            Address::from_bytes(&[2; 20]),
            Address::from_bytes(&[3; 20]),
            10,
        );
        candidate.status = CandidateStatus::Online;
        candidate.to_drop = true;
        candidate.total_noah_stake = Amount::from_noah(5);

        let mut bytes = Vec::new();
        CandidateSerializer::new()
            .serialize(&candidate, &mut bytes)
            .unwrap();
        let (rest, decoded) = CandidateDeserializer::new()
            .deserialize::<DeserializeError>(&bytes)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.status, CandidateStatus::Online);
        assert!(decoded.to_drop);
        assert_eq!(decoded.total_noah_stake, Amount::from_noah(5));
        assert_eq!(decoded.tm_address(), Pubkey::from_bytes([4; 32]).tm_address());
        assert!(!decoded.is_dirty);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let candidate = Candidate::new(
            1,
            Pubkey::from_bytes([4; 32]),
            Address::default(),
            Address::default(),
            Address::default(),
            0,
        );
        let mut bytes = Vec::new();
        CandidateSerializer::new()
            .serialize(&candidate, &mut bytes)
            .unwrap();
        // id, pubkey, 3 addresses and the commission come before the status byte
        let status_offset = 1 + 32 + 3 * 20 + 1;
        bytes[status_offset] = 9;
        assert!(CandidateDeserializer::new()
            .deserialize::<DeserializeError>(&bytes)
            .is_err());
    }
}
