// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::address::{Address, AddressDeserializer, AddressSerializer};
use crate::amount::{Amount, AmountDeserializer, AmountSerializer};
use crate::coin::{CoinId, CoinIdDeserializer, CoinIdSerializer};
use crate::pubkey::{Pubkey, PubkeyDeserializer, PubkeySerializer};
use noah_serialization::{
    Deserializer, SerializeError, Serializer, U32VarIntDeserializer, U32VarIntSerializer,
};
use nom::error::{context, ContextError, ErrorKind, ParseError};
use nom::multi::length_count;
use nom::number::complete::be_u8;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// Who a reward was paid to
#[derive(
    IntoPrimitive, TryFromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Role {
    /// commission of the candidate
    Validator = 0,
    /// share of a stake
    Delegator = 1,
    /// DAO cut
    Dao = 2,
    /// developers cut
    Developers = 3,
}

/// Balance change made by the block lifecycle rather than by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// base coin paid out of the reward of a validator
    Reward {
        /// recipient role
        role: Role,
        /// recipient
        address: Address,
        /// base coin paid
        amount: Amount,
        /// validator the reward was earned by
        validator_pub_key: Pubkey,
    },
    /// part of a stake or of a frozen fund burnt by a punishment
    Slash {
        /// stake owner
        address: Address,
        /// value burnt, in `coin`
        amount: Amount,
        /// coin of the stake
        coin: CoinId,
        /// punished candidate
        validator_pub_key: Pubkey,
    },
    /// frozen fund credited back to its owner
    Unbond {
        /// owner
        address: Address,
        /// value credited, in `coin`
        amount: Amount,
        /// coin of the fund
        coin: CoinId,
        /// candidate the stake was withdrawn from
        validator_pub_key: Pubkey,
    },
}

const REWARD_TAG: u8 = 0;
const SLASH_TAG: u8 = 1;
const UNBOND_TAG: u8 = 2;

/// Serializer for `Event`
#[derive(Clone, Default)]
pub struct EventSerializer {
    address_serializer: AddressSerializer,
    amount_serializer: AmountSerializer,
    coin_id_serializer: CoinIdSerializer,
    pubkey_serializer: PubkeySerializer,
}

impl EventSerializer {
    /// Creates a new `EventSerializer`
    pub const fn new() -> Self {
        Self {
            address_serializer: AddressSerializer::new(),
            amount_serializer: AmountSerializer::new(),
            coin_id_serializer: CoinIdSerializer::new(),
            pubkey_serializer: PubkeySerializer::new(),
        }
    }
}

impl Serializer<Event> for EventSerializer {
    fn serialize(&self, value: &Event, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        match value {
            Event::Reward {
                role,
                address,
                amount,
                validator_pub_key,
            } => {
                buffer.push(REWARD_TAG);
                buffer.push(u8::from(*role));
                self.address_serializer.serialize(address, buffer)?;
                self.amount_serializer.serialize(amount, buffer)?;
                self.pubkey_serializer.serialize(validator_pub_key, buffer)?;
            }
            Event::Slash {
                address,
                amount,
                coin,
                validator_pub_key,
            }
            | Event::Unbond {
                address,
                amount,
                coin,
                validator_pub_key,
            } => {
                let tag = if matches!(value, Event::Slash { .. }) {
                    SLASH_TAG
                } else {
                    UNBOND_TAG
                };
                buffer.push(tag);
                self.address_serializer.serialize(address, buffer)?;
                self.amount_serializer.serialize(amount, buffer)?;
                self.coin_id_serializer.serialize(coin, buffer)?;
                self.pubkey_serializer.serialize(validator_pub_key, buffer)?;
            }
        }
        Ok(())
    }
}

/// Deserializer for `Event`
#[derive(Clone)]
pub struct EventDeserializer {
    address_deserializer: AddressDeserializer,
    amount_deserializer: AmountDeserializer,
    coin_id_deserializer: CoinIdDeserializer,
    pubkey_deserializer: PubkeyDeserializer,
}

impl EventDeserializer {
    /// Creates a new `EventDeserializer`
    pub const fn new() -> Self {
        Self {
            address_deserializer: AddressDeserializer::new(),
            amount_deserializer: AmountDeserializer::new(),
            coin_id_deserializer: CoinIdDeserializer::new(),
            pubkey_deserializer: PubkeyDeserializer::new(),
        }
    }

    fn coin_move<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        input: &'a [u8],
    ) -> IResult<&'a [u8], (Address, Amount, CoinId, Pubkey), E> {
        tuple((
            |input| self.address_deserializer.deserialize(input),
            |input| self.amount_deserializer.deserialize(input),
            |input| self.coin_id_deserializer.deserialize(input),
            |input| self.pubkey_deserializer.deserialize(input),
        ))
        .parse(input)
    }
}

impl Default for EventDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Event> for EventDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Event, E> {
        context("Failed Event deserialization", |buffer| {
            let (input, tag) = be_u8(buffer)?;
            match tag {
                REWARD_TAG => {
                    let (rest, role) = be_u8(input)?;
                    let role = Role::try_from(role).map_err(|_| {
                        nom::Err::Error(ParseError::from_error_kind(input, ErrorKind::Tag))
                    })?;
                    context(
                        "Failed Reward deserialization",
                        tuple((
                            |input| self.address_deserializer.deserialize(input),
                            |input| self.amount_deserializer.deserialize(input),
                            |input| self.pubkey_deserializer.deserialize(input),
                        )),
                    )
                    .map(|(address, amount, validator_pub_key)| Event::Reward {
                        role,
                        address,
                        amount,
                        validator_pub_key,
                    })
                    .parse(rest)
                }
                SLASH_TAG => context("Failed Slash deserialization", |input| {
                    self.coin_move(input)
                })
                .map(|(address, amount, coin, validator_pub_key)| Event::Slash {
                    address,
                    amount,
                    coin,
                    validator_pub_key,
                })
                .parse(input),
                UNBOND_TAG => context("Failed Unbond deserialization", |input| {
                    self.coin_move(input)
                })
                .map(|(address, amount, coin, validator_pub_key)| Event::Unbond {
                    address,
                    amount,
                    coin,
                    validator_pub_key,
                })
                .parse(input),
                _ => Err(nom::Err::Error(ParseError::from_error_kind(
                    buffer,
                    ErrorKind::Tag,
                ))),
            }
        })(buffer)
    }
}

/// Serializer for the events of a block
#[derive(Clone, Default)]
pub struct EventsSerializer {
    len_serializer: U32VarIntSerializer,
    event_serializer: EventSerializer,
}

impl EventsSerializer {
    /// Creates a new `EventsSerializer`
    pub const fn new() -> Self {
        Self {
            len_serializer: U32VarIntSerializer::new(),
            event_serializer: EventSerializer::new(),
        }
    }
}

impl Serializer<Vec<Event>> for EventsSerializer {
    fn serialize(&self, value: &Vec<Event>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let len: u32 = value
            .len()
            .try_into()
            .map_err(|_| SerializeError::NumberTooBig("too many events".to_string()))?;
        self.len_serializer.serialize(&len, buffer)?;
        for event in value {
            self.event_serializer.serialize(event, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for the events of a block
#[derive(Clone)]
pub struct EventsDeserializer {
    len_deserializer: U32VarIntDeserializer,
    event_deserializer: EventDeserializer,
}

impl EventsDeserializer {
    /// Creates a new `EventsDeserializer`
    pub const fn new() -> Self {
        Self {
            len_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            event_deserializer: EventDeserializer::new(),
        }
    }
}

impl Default for EventsDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Vec<Event>> for EventsDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<Event>, E> {
        context(
            "Failed events deserialization",
            length_count(
                |input| self.len_deserializer.deserialize(input),
                |input| self.event_deserializer.deserialize(input),
            ),
        )
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noah_serialization::DeserializeError;

    #[test]
    fn test_unknown_tag_and_role_are_rejected() {
        let key = Pubkey::from_bytes([4; 32]);
        let mut buffer = Vec::new();
        EventSerializer::new()
            .serialize(
                &Event::Reward {
                    role: Role::Dao,
                    address: Address::default(),
                    amount: Amount::from_u64(5),
                    validator_pub_key: key,
                },
                &mut buffer,
            )
            .unwrap();
        assert_eq!(&buffer[..2], &[REWARD_TAG, 2]);

        let mut bad_role = buffer.clone();
        bad_role[1] = 9;
        assert!(EventDeserializer::new()
            .deserialize::<DeserializeError>(&bad_role)
            .is_err());
        let mut bad_tag = buffer;
        bad_tag[0] = 7;
        assert!(EventDeserializer::new()
            .deserialize::<DeserializeError>(&bad_tag)
            .is_err());
    }

    #[test]
    fn test_block_events_keep_their_order() {
        let key = Pubkey::from_bytes([4; 32]);
        let events = vec![
            Event::Slash {
                address: Address::default(),
                amount: Amount::from_noah(1),
                coin: CoinId(3),
                validator_pub_key: key,
            },
            Event::Unbond {
                address: Address::default(),
                amount: Amount::from_noah(2),
                coin: CoinId::BASE,
                validator_pub_key: key,
            },
        ];
        let mut buffer = Vec::new();
        EventsSerializer::new().serialize(&events, &mut buffer).unwrap();
        let (rest, decoded) = EventsDeserializer::new()
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, events);
        // slash and unbond share a layout, only the tag tells them apart
        assert_eq!(buffer[1], SLASH_TAG);
    }
}
