// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::address::{Address, AddressDeserializer, AddressSerializer};
use crate::amount::{Amount, AmountDeserializer, AmountSerializer};
use crate::coin::{
    CoinId, CoinIdDeserializer, CoinIdSerializer, CoinSymbol, CoinSymbolDeserializer,
    CoinSymbolSerializer,
};
use crate::config::constants::{
    create_coin_gas, gas, COMMISSION_MULTIPLIER, MAX_COIN_NAME_BYTES, MAX_MULTISEND_ITEMS,
    MAX_PAYLOAD_BYTES,
};
use crate::error::ModelsError;
use crate::pubkey::{Pubkey, PubkeyDeserializer, PubkeySerializer};
use noah_hash::Hash;
use noah_serialization::{
    DeserializeError, Deserializer, SerializeError, Serializer, U32VarIntDeserializer,
    U32VarIntSerializer, U64VarIntDeserializer, U64VarIntSerializer, VecU8Deserializer,
    VecU8Serializer,
};
use noah_signature::{KeyPair, PublicKey, PublicKeyDeserializer, Signature, SignatureDeserializer};
use nom::error::{context, ContextError, ErrorKind, ParseError};
use nom::multi::length_count;
use nom::number::complete::be_u8;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// Wire identifier of each transaction type
#[derive(IntoPrimitive, TryFromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TxType {
    /// send coins
    Send = 0x01,
    /// sell an exact amount of a coin
    SellCoin = 0x02,
    /// sell the whole balance of a coin
    SellAllCoin = 0x03,
    /// buy an exact amount of a coin
    BuyCoin = 0x04,
    /// create a coin
    CreateCoin = 0x05,
    /// register a candidate
    DeclareCandidacy = 0x06,
    /// stake to a candidate
    Delegate = 0x07,
    /// withdraw a stake
    Unbond = 0x08,
    /// switch a candidate online
    SetCandidateOnline = 0x0A,
    /// switch a candidate offline
    SetCandidateOffline = 0x0B,
    /// send to several recipients
    MultiSend = 0x0D,
    /// change candidate addresses
    EditCandidate = 0x0E,
    /// vote to halt the chain at a height
    SetHaltBlock = 0x0F,
    /// rotate the candidate public key
    EditCandidatePublicKey = 0x14,
}

/// One recipient of a multisend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSendItem {
    /// coin
    pub coin: CoinId,
    /// recipient
    pub to: Address,
    /// value
    pub value: Amount,
}

/// Type specific part of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionData {
    /// transfer `value` of `coin` to `to`
    Send {
        /// coin
        coin: CoinId,
        /// recipient
        to: Address,
        /// value
        value: Amount,
    },
    /// sell `value_to_sell` of `coin_to_sell` for at least `minimum_value_to_buy`
    SellCoin {
        /// coin to sell
        coin_to_sell: CoinId,
        /// value to sell
        value_to_sell: Amount,
        /// coin to buy
        coin_to_buy: CoinId,
        /// slippage guard
        minimum_value_to_buy: Amount,
    },
    /// sell the whole balance of `coin_to_sell`
    SellAllCoin {
        /// coin to sell
        coin_to_sell: CoinId,
        /// coin to buy
        coin_to_buy: CoinId,
        /// slippage guard
        minimum_value_to_buy: Amount,
    },
    /// buy exactly `value_to_buy` of `coin_to_buy`
    BuyCoin {
        /// coin to buy
        coin_to_buy: CoinId,
        /// value to buy
        value_to_buy: Amount,
        /// coin to sell
        coin_to_sell: CoinId,
        /// slippage guard
        maximum_value_to_sell: Amount,
    },
    /// create a bonding curve coin
    CreateCoin {
        /// name
        name: String,
        /// ticker
        symbol: CoinSymbol,
        /// initial supply, credited to the sender
        initial_amount: Amount,
        /// initial reserve, debited from the sender
        initial_reserve: Amount,
        /// constant reserve ratio, percent
        crr: u32,
        /// supply cap
        max_supply: Amount,
    },
    /// register a new candidate and self-delegate
    DeclareCandidacy {
        /// reward address
        address: Address,
        /// consensus key
        pub_key: Pubkey,
        /// commission, percent
        commission: u32,
        /// coin of the initial stake
        coin: CoinId,
        /// initial stake
        stake: Amount,
    },
    /// stake to a candidate
    Delegate {
        /// candidate
        pub_key: Pubkey,
        /// coin
        coin: CoinId,
        /// value
        value: Amount,
    },
    /// withdraw a stake, it stays frozen for the unbond period
    Unbond {
        /// candidate
        pub_key: Pubkey,
        /// coin
        coin: CoinId,
        /// value
        value: Amount,
    },
    /// switch a candidate online
    SetCandidateOnline {
        /// candidate
        pub_key: Pubkey,
    },
    /// switch a candidate offline
    SetCandidateOffline {
        /// candidate
        pub_key: Pubkey,
    },
    /// send to several recipients at once
    MultiSend {
        /// recipients
        list: Vec<MultiSendItem>,
    },
    /// change the addresses of a candidate
    EditCandidate {
        /// candidate
        pub_key: Pubkey,
        /// new reward address
        reward_address: Address,
        /// new owner address
        owner_address: Address,
        /// new control address
        control_address: Address,
    },
    /// rotate the consensus key of a candidate, the old one gets block-listed
    EditCandidatePublicKey {
        /// current key
        pub_key: Pubkey,
        /// new key
        new_pub_key: Pubkey,
    },
    /// vote of a candidate to halt the chain at `height`
    SetHaltBlock {
        /// voting candidate
        pub_key: Pubkey,
        /// height to halt at
        height: u64,
    },
}

impl TransactionData {
    /// Wire identifier
    pub fn tx_type(&self) -> TxType {
        match self {
            TransactionData::Send { .. } => TxType::Send,
            TransactionData::SellCoin { .. } => TxType::SellCoin,
            TransactionData::SellAllCoin { .. } => TxType::SellAllCoin,
            TransactionData::BuyCoin { .. } => TxType::BuyCoin,
            TransactionData::CreateCoin { .. } => TxType::CreateCoin,
            TransactionData::DeclareCandidacy { .. } => TxType::DeclareCandidacy,
            TransactionData::Delegate { .. } => TxType::Delegate,
            TransactionData::Unbond { .. } => TxType::Unbond,
            TransactionData::SetCandidateOnline { .. } => TxType::SetCandidateOnline,
            TransactionData::SetCandidateOffline { .. } => TxType::SetCandidateOffline,
            TransactionData::MultiSend { .. } => TxType::MultiSend,
            TransactionData::EditCandidate { .. } => TxType::EditCandidate,
            TransactionData::EditCandidatePublicKey { .. } => TxType::EditCandidatePublicKey,
            TransactionData::SetHaltBlock { .. } => TxType::SetHaltBlock,
        }
    }

    /// Gas consumed by the transaction
    pub fn gas(&self) -> u64 {
        match self {
            TransactionData::Send { .. } => gas::SEND,
            TransactionData::SellCoin { .. }
            | TransactionData::SellAllCoin { .. }
            | TransactionData::BuyCoin { .. } => gas::CONVERT,
            TransactionData::CreateCoin { symbol, .. } => create_coin_gas(symbol.len()),
            TransactionData::DeclareCandidacy { .. } => gas::DECLARE_CANDIDACY,
            TransactionData::Delegate { .. } => gas::DELEGATE,
            TransactionData::Unbond { .. } => gas::UNBOND,
            TransactionData::SetCandidateOnline { .. }
            | TransactionData::SetCandidateOffline { .. } => gas::TOGGLE_CANDIDATE_STATUS,
            TransactionData::MultiSend { list } => {
                gas::MULTISEND_BASE
                    + gas::MULTISEND_DELTA * (list.len().saturating_sub(1) as u64)
            }
            TransactionData::EditCandidate { .. } => gas::EDIT_CANDIDATE,
            TransactionData::EditCandidatePublicKey { .. } => gas::EDIT_CANDIDATE_PUBLIC_KEY,
            TransactionData::SetHaltBlock { .. } => gas::SET_HALT_BLOCK,
        }
    }
}

/// Unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// must be the sender nonce + 1
    pub nonce: u64,
    /// network identifier
    pub chain_id: u8,
    /// gas price multiplier
    pub gas_price: u32,
    /// coin the commission is paid in
    pub gas_coin: CoinId,
    /// type specific part
    pub data: TransactionData,
    /// free-form payload
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Gas consumed
    pub fn gas(&self) -> u64 {
        self.data.gas()
    }

    /// Commission in base coin: `gas * gas_price * 10^15`
    pub fn commission_in_base_coin(&self) -> Amount {
        Amount::from_u64(self.gas())
            .mul_u64(self.gas_price as u64)
            .mul_u64(COMMISSION_MULTIPLIER)
    }

    /// Hash of the serialized content, the message being signed
    pub fn content_hash(&self) -> Result<Hash, ModelsError> {
        let mut buffer = Vec::new();
        TransactionSerializer::new()
            .serialize(self, &mut buffer)
            .map_err(|err| ModelsError::SerializeError(err.to_string()))?;
        Ok(Hash::compute_from(&buffer))
    }

    /// Signs the transaction
    pub fn sign(self, keypair: &KeyPair) -> Result<SignedTransaction, ModelsError> {
        let hash = self.content_hash()?;
        Ok(SignedTransaction {
            signature: keypair.sign(&hash),
            public_key: keypair.get_public_key(),
            content: self,
        })
    }
}

/// Transaction with the sender key and signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// signed content
    pub content: Transaction,
    /// sender key
    pub public_key: PublicKey,
    /// signature of the content hash
    pub signature: Signature,
}

impl SignedTransaction {
    /// Address of the sender
    pub fn sender(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Checks the signature against the content
    pub fn verify_signature(&self) -> Result<(), ModelsError> {
        let hash = self.content.content_hash()?;
        self.public_key.verify_signature(&hash, &self.signature)?;
        Ok(())
    }

    /// Wire bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelsError> {
        let mut buffer = Vec::new();
        SignedTransactionSerializer::new()
            .serialize(self, &mut buffer)
            .map_err(|err| ModelsError::SerializeError(err.to_string()))?;
        Ok(buffer)
    }

    /// Decodes wire bytes, trailing bytes are an error
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelsError> {
        let (rest, tx) = SignedTransactionDeserializer::new()
            .deserialize::<DeserializeError>(bytes)
            .map_err(|err| ModelsError::DeserializeError(err.to_string()))?;
        if !rest.is_empty() {
            return Err(ModelsError::DeserializeError(format!(
                "{} trailing bytes",
                rest.len()
            )));
        }
        Ok(tx)
    }

    /// Identifier: hash of the wire bytes
    pub fn hash(&self) -> Result<Hash, ModelsError> {
        Ok(Hash::compute_from(&self.to_bytes()?))
    }
}

/// Serializer for `TransactionData`
#[derive(Clone, Default)]
pub struct TransactionDataSerializer {
    u64_serializer: U64VarIntSerializer,
    u32_serializer: U32VarIntSerializer,
    coin_id_serializer: CoinIdSerializer,
    amount_serializer: AmountSerializer,
    address_serializer: AddressSerializer,
    pubkey_serializer: PubkeySerializer,
    symbol_serializer: CoinSymbolSerializer,
    bytes_serializer: VecU8Serializer,
}

impl TransactionDataSerializer {
    /// Creates a new `TransactionDataSerializer`
    pub const fn new() -> Self {
        Self {
            u64_serializer: U64VarIntSerializer::new(),
            u32_serializer: U32VarIntSerializer::new(),
            coin_id_serializer: CoinIdSerializer::new(),
            amount_serializer: AmountSerializer::new(),
            address_serializer: AddressSerializer::new(),
            pubkey_serializer: PubkeySerializer::new(),
            symbol_serializer: CoinSymbolSerializer::new(),
            bytes_serializer: VecU8Serializer::new(),
        }
    }
}

impl Serializer<TransactionData> for TransactionDataSerializer {
    fn serialize(
        &self,
        value: &TransactionData,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        buffer.push(u8::from(value.tx_type()));
        match value {
            TransactionData::Send { coin, to, value } => {
                self.coin_id_serializer.serialize(coin, buffer)?;
                self.address_serializer.serialize(to, buffer)?;
                self.amount_serializer.serialize(value, buffer)?;
            }
            TransactionData::SellCoin {
                coin_to_sell,
                value_to_sell,
                coin_to_buy,
                minimum_value_to_buy,
            } => {
                self.coin_id_serializer.serialize(coin_to_sell, buffer)?;
                self.amount_serializer.serialize(value_to_sell, buffer)?;
                self.coin_id_serializer.serialize(coin_to_buy, buffer)?;
                self.amount_serializer
                    .serialize(minimum_value_to_buy, buffer)?;
            }
            TransactionData::SellAllCoin {
                coin_to_sell,
                coin_to_buy,
                minimum_value_to_buy,
            } => {
                self.coin_id_serializer.serialize(coin_to_sell, buffer)?;
                self.coin_id_serializer.serialize(coin_to_buy, buffer)?;
                self.amount_serializer
                    .serialize(minimum_value_to_buy, buffer)?;
            }
            TransactionData::BuyCoin {
                coin_to_buy,
                value_to_buy,
                coin_to_sell,
                maximum_value_to_sell,
            } => {
                self.coin_id_serializer.serialize(coin_to_buy, buffer)?;
                self.amount_serializer.serialize(value_to_buy, buffer)?;
                self.coin_id_serializer.serialize(coin_to_sell, buffer)?;
                self.amount_serializer
                    .serialize(maximum_value_to_sell, buffer)?;
            }
            TransactionData::CreateCoin {
                name,
                symbol,
                initial_amount,
                initial_reserve,
                crr,
                max_supply,
            } => {
                self.bytes_serializer
                    .serialize(&name.as_bytes().to_vec(), buffer)?;
                self.symbol_serializer.serialize(symbol, buffer)?;
                self.amount_serializer.serialize(initial_amount, buffer)?;
                self.amount_serializer.serialize(initial_reserve, buffer)?;
                self.u32_serializer.serialize(crr, buffer)?;
                self.amount_serializer.serialize(max_supply, buffer)?;
            }
            TransactionData::DeclareCandidacy {
                address,
                pub_key,
                commission,
                coin,
                stake,
            } => {
                self.address_serializer.serialize(address, buffer)?;
                self.pubkey_serializer.serialize(pub_key, buffer)?;
                self.u32_serializer.serialize(commission, buffer)?;
                self.coin_id_serializer.serialize(coin, buffer)?;
                self.amount_serializer.serialize(stake, buffer)?;
            }
            TransactionData::Delegate {
                pub_key,
                coin,
                value,
            }
            | TransactionData::Unbond {
                pub_key,
                coin,
                value,
            } => {
                self.pubkey_serializer.serialize(pub_key, buffer)?;
                self.coin_id_serializer.serialize(coin, buffer)?;
                self.amount_serializer.serialize(value, buffer)?;
            }
            TransactionData::SetCandidateOnline { pub_key }
            | TransactionData::SetCandidateOffline { pub_key } => {
                self.pubkey_serializer.serialize(pub_key, buffer)?;
            }
            TransactionData::MultiSend { list } => {
                let len: u32 = list.len().try_into().map_err(|_| {
                    SerializeError::NumberTooBig("too many multisend items".to_string())
                })?;
                self.u32_serializer.serialize(&len, buffer)?;
                for item in list {
                    self.coin_id_serializer.serialize(&item.coin, buffer)?;
                    self.address_serializer.serialize(&item.to, buffer)?;
                    self.amount_serializer.serialize(&item.value, buffer)?;
                }
            }
            TransactionData::EditCandidate {
                pub_key,
                reward_address,
                owner_address,
                control_address,
            } => {
                self.pubkey_serializer.serialize(pub_key, buffer)?;
                self.address_serializer.serialize(reward_address, buffer)?;
                self.address_serializer.serialize(owner_address, buffer)?;
                self.address_serializer.serialize(control_address, buffer)?;
            }
            TransactionData::EditCandidatePublicKey {
                pub_key,
                new_pub_key,
            } => {
                self.pubkey_serializer.serialize(pub_key, buffer)?;
                self.pubkey_serializer.serialize(new_pub_key, buffer)?;
            }
            TransactionData::SetHaltBlock { pub_key, height } => {
                self.pubkey_serializer.serialize(pub_key, buffer)?;
                self.u64_serializer.serialize(height, buffer)?;
            }
        }
        Ok(())
    }
}

/// Deserializer for `TransactionData`
#[derive(Clone)]
pub struct TransactionDataDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    u32_deserializer: U32VarIntDeserializer,
    multisend_len_deserializer: U32VarIntDeserializer,
    coin_id_deserializer: CoinIdDeserializer,
    amount_deserializer: AmountDeserializer,
    address_deserializer: AddressDeserializer,
    pubkey_deserializer: PubkeyDeserializer,
    symbol_deserializer: CoinSymbolDeserializer,
    name_deserializer: VecU8Deserializer,
}

impl TransactionDataDeserializer {
    /// Creates a new `TransactionDataDeserializer`
    pub const fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            multisend_len_deserializer: U32VarIntDeserializer::new(
                Included(0),
                Included(MAX_MULTISEND_ITEMS as u32),
            ),
            coin_id_deserializer: CoinIdDeserializer::new(),
            amount_deserializer: AmountDeserializer::new(),
            address_deserializer: AddressDeserializer::new(),
            pubkey_deserializer: PubkeyDeserializer::new(),
            symbol_deserializer: CoinSymbolDeserializer::new(),
            name_deserializer: VecU8Deserializer::new(
                Included(0),
                Included(MAX_COIN_NAME_BYTES as u64),
            ),
        }
    }

    fn coin_address_amount<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        input: &'a [u8],
    ) -> IResult<&'a [u8], (CoinId, Address, Amount), E> {
        tuple((
            context("Failed coin deserialization", |input| {
                self.coin_id_deserializer.deserialize(input)
            }),
            context("Failed address deserialization", |input| {
                self.address_deserializer.deserialize(input)
            }),
            context("Failed value deserialization", |input| {
                self.amount_deserializer.deserialize(input)
            }),
        ))
        .parse(input)
    }

    fn pubkey_coin_amount<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        input: &'a [u8],
    ) -> IResult<&'a [u8], (Pubkey, CoinId, Amount), E> {
        tuple((
            context("Failed pub_key deserialization", |input| {
                self.pubkey_deserializer.deserialize(input)
            }),
            context("Failed coin deserialization", |input| {
                self.coin_id_deserializer.deserialize(input)
            }),
            context("Failed value deserialization", |input| {
                self.amount_deserializer.deserialize(input)
            }),
        ))
        .parse(input)
    }
}

impl Default for TransactionDataDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<TransactionData> for TransactionDataDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], TransactionData, E> {
        context("Failed TransactionData deserialization", |buffer| {
            let (input, id) = be_u8(buffer)?;
            let tx_type = TxType::try_from(id).map_err(|_| {
                nom::Err::Error(ParseError::from_error_kind(buffer, ErrorKind::Tag))
            })?;
            match tx_type {
                TxType::Send => context("Failed Send deserialization", |input| {
                    self.coin_address_amount(input)
                })
                .map(|(coin, to, value)| TransactionData::Send { coin, to, value })
                .parse(input),
                TxType::SellCoin => context(
                    "Failed SellCoin deserialization",
                    tuple((
                        |input| self.coin_id_deserializer.deserialize(input),
                        |input| self.amount_deserializer.deserialize(input),
                        |input| self.coin_id_deserializer.deserialize(input),
                        |input| self.amount_deserializer.deserialize(input),
                    )),
                )
                .map(
                    |(coin_to_sell, value_to_sell, coin_to_buy, minimum_value_to_buy)| {
                        TransactionData::SellCoin {
                            coin_to_sell,
                            value_to_sell,
                            coin_to_buy,
                            minimum_value_to_buy,
                        }
                    },
                )
                .parse(input),
                TxType::SellAllCoin => context(
                    "Failed SellAllCoin deserialization",
                    tuple((
                        |input| self.coin_id_deserializer.deserialize(input),
                        |input| self.coin_id_deserializer.deserialize(input),
                        |input| self.amount_deserializer.deserialize(input),
                    )),
                )
                .map(
                    |(coin_to_sell, coin_to_buy, minimum_value_to_buy)| {
                        TransactionData::SellAllCoin {
                            coin_to_sell,
                            coin_to_buy,
                            minimum_value_to_buy,
                        }
                    },
                )
                .parse(input),
                TxType::BuyCoin => context(
                    "Failed BuyCoin deserialization",
                    tuple((
                        |input| self.coin_id_deserializer.deserialize(input),
                        |input| self.amount_deserializer.deserialize(input),
                        |input| self.coin_id_deserializer.deserialize(input),
                        |input| self.amount_deserializer.deserialize(input),
                    )),
                )
                .map(
                    |(coin_to_buy, value_to_buy, coin_to_sell, maximum_value_to_sell)| {
                        TransactionData::BuyCoin {
                            coin_to_buy,
                            value_to_buy,
                            coin_to_sell,
                            maximum_value_to_sell,
                        }
                    },
                )
                .parse(input),
                TxType::CreateCoin => {
                    let (rest, name_bytes) =
                        context("Failed name deserialization", |input| {
                            self.name_deserializer.deserialize(input)
                        })(input)?;
                    let name = String::from_utf8(name_bytes).map_err(|_| {
                        nom::Err::Error(ParseError::from_error_kind(input, ErrorKind::Verify))
                    })?;
                    context(
                        "Failed CreateCoin deserialization",
                        tuple((
                            |input| self.symbol_deserializer.deserialize(input),
                            |input| self.amount_deserializer.deserialize(input),
                            |input| self.amount_deserializer.deserialize(input),
                            |input| self.u32_deserializer.deserialize(input),
                            |input| self.amount_deserializer.deserialize(input),
                        )),
                    )
                    .map(
                        |(symbol, initial_amount, initial_reserve, crr, max_supply)| {
                            TransactionData::CreateCoin {
                                name: name.clone(),
                                symbol,
                                initial_amount,
                                initial_reserve,
                                crr,
                                max_supply,
                            }
                        },
                    )
                    .parse(rest)
                }
                TxType::DeclareCandidacy => context(
                    "Failed DeclareCandidacy deserialization",
                    tuple((
                        |input| self.address_deserializer.deserialize(input),
                        |input| self.pubkey_deserializer.deserialize(input),
                        |input| self.u32_deserializer.deserialize(input),
                        |input| self.coin_id_deserializer.deserialize(input),
                        |input| self.amount_deserializer.deserialize(input),
                    )),
                )
                .map(|(address, pub_key, commission, coin, stake)| {
                    TransactionData::DeclareCandidacy {
                        address,
                        pub_key,
                        commission,
                        coin,
                        stake,
                    }
                })
                .parse(input),
                TxType::Delegate => context("Failed Delegate deserialization", |input| {
                    self.pubkey_coin_amount(input)
                })
                .map(|(pub_key, coin, value)| TransactionData::Delegate {
                    pub_key,
                    coin,
                    value,
                })
                .parse(input),
                TxType::Unbond => context("Failed Unbond deserialization", |input| {
                    self.pubkey_coin_amount(input)
                })
                .map(|(pub_key, coin, value)| TransactionData::Unbond {
                    pub_key,
                    coin,
                    value,
                })
                .parse(input),
                TxType::SetCandidateOnline => {
                    context("Failed SetCandidateOnline deserialization", |input| {
                        self.pubkey_deserializer.deserialize(input)
                    })
                    .map(|pub_key| TransactionData::SetCandidateOnline { pub_key })
                    .parse(input)
                }
                TxType::SetCandidateOffline => {
                    context("Failed SetCandidateOffline deserialization", |input| {
                        self.pubkey_deserializer.deserialize(input)
                    })
                    .map(|pub_key| TransactionData::SetCandidateOffline { pub_key })
                    .parse(input)
                }
                TxType::MultiSend => context(
                    "Failed MultiSend deserialization",
                    length_count(
                        |input| self.multisend_len_deserializer.deserialize(input),
                        |input| self.coin_address_amount(input),
                    ),
                )
                .map(|items| TransactionData::MultiSend {
                    list: items
                        .into_iter()
                        .map(|(coin, to, value)| MultiSendItem { coin, to, value })
                        .collect(),
                })
                .parse(input),
                TxType::EditCandidate => context(
                    "Failed EditCandidate deserialization",
                    tuple((
                        |input| self.pubkey_deserializer.deserialize(input),
                        |input| self.address_deserializer.deserialize(input),
                        |input| self.address_deserializer.deserialize(input),
                        |input| self.address_deserializer.deserialize(input),
                    )),
                )
                .map(
                    |(pub_key, reward_address, owner_address, control_address)| {
                        TransactionData::EditCandidate {
                            pub_key,
                            reward_address,
                            owner_address,
                            control_address,
                        }
                    },
                )
                .parse(input),
                TxType::EditCandidatePublicKey => context(
                    "Failed EditCandidatePublicKey deserialization",
                    tuple((
                        |input| self.pubkey_deserializer.deserialize(input),
                        |input| self.pubkey_deserializer.deserialize(input),
                    )),
                )
                .map(|(pub_key, new_pub_key)| TransactionData::EditCandidatePublicKey {
                    pub_key,
                    new_pub_key,
                })
                .parse(input),
                TxType::SetHaltBlock => context(
                    "Failed SetHaltBlock deserialization",
                    tuple((
                        |input| self.pubkey_deserializer.deserialize(input),
                        context("Failed height deserialization", |input| {
                            self.u64_deserializer.deserialize(input)
                        }),
                    )),
                )
                .map(|(pub_key, height)| TransactionData::SetHaltBlock { pub_key, height })
                .parse(input),
            }
        })(buffer)
    }
}

/// Serializer for `Transaction`
#[derive(Clone, Default)]
pub struct TransactionSerializer {
    u64_serializer: U64VarIntSerializer,
    u32_serializer: U32VarIntSerializer,
    coin_id_serializer: CoinIdSerializer,
    data_serializer: TransactionDataSerializer,
    payload_serializer: VecU8Serializer,
}

impl TransactionSerializer {
    /// Creates a new `TransactionSerializer`
    pub const fn new() -> Self {
        Self {
            u64_serializer: U64VarIntSerializer::new(),
            u32_serializer: U32VarIntSerializer::new(),
            coin_id_serializer: CoinIdSerializer::new(),
            data_serializer: TransactionDataSerializer::new(),
            payload_serializer: VecU8Serializer::new(),
        }
    }
}

impl Serializer<Transaction> for TransactionSerializer {
    fn serialize(&self, value: &Transaction, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&value.nonce, buffer)?;
        buffer.push(value.chain_id);
        self.u32_serializer.serialize(&value.gas_price, buffer)?;
        self.coin_id_serializer.serialize(&value.gas_coin, buffer)?;
        self.data_serializer.serialize(&value.data, buffer)?;
        self.payload_serializer.serialize(&value.payload, buffer)?;
        Ok(())
    }
}

/// Deserializer for `Transaction`
#[derive(Clone)]
pub struct TransactionDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    u32_deserializer: U32VarIntDeserializer,
    coin_id_deserializer: CoinIdDeserializer,
    data_deserializer: TransactionDataDeserializer,
    payload_deserializer: VecU8Deserializer,
}

impl TransactionDeserializer {
    /// Creates a new `TransactionDeserializer`
    pub const fn new() -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
            u32_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            coin_id_deserializer: CoinIdDeserializer::new(),
            data_deserializer: TransactionDataDeserializer::new(),
            // oversized payloads are parsed so that they map to their own response code
            payload_deserializer: VecU8Deserializer::new(
                Included(0),
                Included(MAX_PAYLOAD_BYTES as u64 * 8),
            ),
        }
    }
}

impl Default for TransactionDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Transaction> for TransactionDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Transaction, E> {
        context(
            "Failed Transaction deserialization",
            tuple((
                context("Failed nonce deserialization", |input| {
                    self.u64_deserializer.deserialize(input)
                }),
                context("Failed chain_id deserialization", be_u8),
                context("Failed gas_price deserialization", |input| {
                    self.u32_deserializer.deserialize(input)
                }),
                context("Failed gas_coin deserialization", |input| {
                    self.coin_id_deserializer.deserialize(input)
                }),
                context("Failed data deserialization", |input| {
                    self.data_deserializer.deserialize(input)
                }),
                context("Failed payload deserialization", |input| {
                    self.payload_deserializer.deserialize(input)
                }),
            )),
        )
        .map(
            |(nonce, chain_id, gas_price, gas_coin, data, payload)| Transaction {
                nonce,
                chain_id,
                gas_price,
                gas_coin,
                data,
                payload,
            },
        )
        .parse(buffer)
    }
}

/// Serializer for `SignedTransaction`
#[derive(Clone, Default)]
pub struct SignedTransactionSerializer {
    content_serializer: TransactionSerializer,
}

impl SignedTransactionSerializer {
    /// Creates a new `SignedTransactionSerializer`
    pub const fn new() -> Self {
        Self {
            content_serializer: TransactionSerializer::new(),
        }
    }
}

impl Serializer<SignedTransaction> for SignedTransactionSerializer {
    fn serialize(
        &self,
        value: &SignedTransaction,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.content_serializer.serialize(&value.content, buffer)?;
        buffer.extend_from_slice(value.public_key.to_bytes());
        buffer.extend_from_slice(&value.signature.to_bytes());
        Ok(())
    }
}

/// Deserializer for `SignedTransaction`
#[derive(Clone, Default)]
pub struct SignedTransactionDeserializer {
    content_deserializer: TransactionDeserializer,
    public_key_deserializer: PublicKeyDeserializer,
    signature_deserializer: SignatureDeserializer,
}

impl SignedTransactionDeserializer {
    /// Creates a new `SignedTransactionDeserializer`
    pub const fn new() -> Self {
        Self {
            content_deserializer: TransactionDeserializer::new(),
            public_key_deserializer: PublicKeyDeserializer::new(),
            signature_deserializer: SignatureDeserializer::new(),
        }
    }
}

impl Deserializer<SignedTransaction> for SignedTransactionDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], SignedTransaction, E> {
        context(
            "Failed SignedTransaction deserialization",
            tuple((
                |input| self.content_deserializer.deserialize(input),
                |input| self.public_key_deserializer.deserialize(input),
                |input| self.signature_deserializer.deserialize(input),
            )),
        )
        .map(|(content, public_key, signature)| SignedTransaction {
            content,
            public_key,
            signature,
        })
        .parse(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn send_tx(nonce: u64) -> Transaction {
        Transaction {
            nonce,
            chain_id: 1,
            gas_price: 1,
            gas_coin: CoinId::BASE,
            data: TransactionData::Send {
                coin: CoinId::BASE,
                to: Address::from_str("NOAHxf98017d1a37cc4bec05026ef94cb46102e16638e").unwrap(),
                value: Amount::from_noah(1),
            },
            payload: b"hello".to_vec(),
        }
    }

    #[test]
    fn test_signed_transaction_wire_format() {
        let keypair = KeyPair::generate();
        let signed = send_tx(1).sign(&keypair).unwrap();
        let bytes = signed.to_bytes().unwrap();
        let decoded = SignedTransaction::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, signed);
        decoded.verify_signature().unwrap();
        assert_eq!(
            decoded.sender(),
            Address::from_public_key(&keypair.get_public_key())
        );
    }

    #[test]
    fn test_tampered_transaction_is_rejected() {
        let keypair = KeyPair::generate();
        let mut signed = send_tx(1).sign(&keypair).unwrap();
        signed.content.nonce = 2;
        assert!(signed.verify_signature().is_err());
    }

    #[test]
    fn test_unknown_type_and_trailing_bytes() {
        let keypair = KeyPair::generate();
        let mut bytes = send_tx(1).sign(&keypair).unwrap().to_bytes().unwrap();
        bytes.push(0);
        assert!(SignedTransaction::from_bytes(&bytes).is_err());

        // nonce 1, chain 1, gas price 1, gas coin 0, then an unknown type byte
        let garbage = [1u8, 1, 1, 0, 0x42];
        assert!(TransactionDeserializer::new()
            .deserialize::<DeserializeError>(&garbage)
            .is_err());
    }

    #[test]
    fn test_gas_and_commission() {
        let tx = send_tx(1);
        assert_eq!(tx.gas(), 10);
        assert_eq!(
            tx.commission_in_base_coin(),
            Amount::from_u64(10 * COMMISSION_MULTIPLIER)
        );
        let multisend = TransactionData::MultiSend {
            list: vec![
                MultiSendItem {
                    coin: CoinId::BASE,
                    to: Address::default(),
                    value: Amount::from_u64(1),
                };
                3
            ],
        };
        assert_eq!(multisend.gas(), 20);
        let create = TransactionData::CreateCoin {
            name: "Test".into(),
            symbol: CoinSymbol::new("ABCD").unwrap(),
            initial_amount: Amount::from_noah(100),
            initial_reserve: Amount::from_noah(250_000),
            crr: 50,
            max_supply: Amount::from_noah(1000),
        };
        assert_eq!(create.gas(), 100_000_000);
        let halt = TransactionData::SetHaltBlock {
            pub_key: Pubkey::from_bytes([7; 32]),
            height: 300,
        };
        assert_eq!(halt.gas(), 1000);
        assert_eq!(u8::from(halt.tx_type()), 0x0F);
    }

    #[test]
    fn test_every_type_decodes() {
        let pubkey = Pubkey::from_bytes([7; 32]);
        let datas = vec![
            TransactionData::SellAllCoin {
                coin_to_sell: CoinId(1),
                coin_to_buy: CoinId::BASE,
                minimum_value_to_buy: Amount::zero(),
            },
            TransactionData::DeclareCandidacy {
                address: Address::default(),
                pub_key: pubkey,
                commission: 10,
                coin: CoinId::BASE,
                stake: Amount::from_noah(5),
            },
            TransactionData::Unbond {
                pub_key: pubkey,
                coin: CoinId(3),
                value: Amount::from_u64(9),
            },
            TransactionData::EditCandidatePublicKey {
                pub_key: pubkey,
                new_pub_key: Pubkey::from_bytes([8; 32]),
            },
            TransactionData::SetHaltBlock {
                pub_key: pubkey,
                height: u64::MAX,
            },
        ];
        for data in datas {
            let mut buffer = Vec::new();
            TransactionDataSerializer::new()
                .serialize(&data, &mut buffer)
                .unwrap();
            let (rest, decoded) = TransactionDataDeserializer::new()
                .deserialize::<DeserializeError>(&buffer)
                .unwrap();
            assert!(rest.is_empty());
            assert_eq!(decoded, data);
        }
    }
}
