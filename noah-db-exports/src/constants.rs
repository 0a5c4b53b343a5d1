// Copyright (c) 2022 MASSA LABS <info@massa.net>

// Column families
pub const METADATA_CF: &str = "metadata";
pub const STATE_CF: &str = "state";
pub const HISTORY_CF: &str = "history";
pub const EVENTS_CF: &str = "events";

// Hash
pub const STATE_HASH_BYTES_LEN: usize = 512;
pub const STATE_HASH_KEY: &[u8; 1] = b"h";
pub const STATE_HASH_INITIAL_BYTES: &[u8; STATE_HASH_BYTES_LEN] = &[0; STATE_HASH_BYTES_LEN];

// Version
pub const VERSION_KEY: &[u8; 1] = b"v";
pub const VERSION_DESER_ERROR: &str = "critical: version deserialization failed";

// History entries: tag byte then the previous value
pub const HISTORY_ABSENT_TAG: u8 = 0;
pub const HISTORY_PRESENT_TAG: u8 = 1;
pub const HISTORY_DESER_ERROR: &str = "critical: history entry deserialization failed";

// Errors
pub const CF_ERROR: &str = "critical: rocksdb column family operation failed";
pub const OPEN_ERROR: &str = "critical: rocksdb open operation failed";
pub const CRUD_ERROR: &str = "critical: rocksdb crud operation failed";
pub const STATE_HASH_ERROR: &str = "critical: saved state hash is corrupted";

// Module prefixes, one byte each
pub const ACCOUNTS_PREFIX: u8 = b'a';
pub const CANDIDATES_PREFIX: u8 = b'c';
pub const APP_PREFIX: u8 = b'd';
pub const FROZEN_FUNDS_PREFIX: u8 = b'f';
pub const HALTS_PREFIX: u8 = b'h';
pub const COINS_PREFIX: u8 = b'q';
pub const VALIDATORS_PREFIX: u8 = b'v';
pub const WAITLIST_PREFIX: u8 = b'w';

// Module records
pub const ACCOUNT_DESER_ERROR: &str = "critical: account deserialization failed";
pub const ACCOUNT_SER_ERROR: &str = "critical: account serialization failed";
pub const APP_DESER_ERROR: &str = "critical: app deserialization failed";
pub const APP_SER_ERROR: &str = "critical: app serialization failed";
pub const CANDIDATE_DESER_ERROR: &str = "critical: candidate deserialization failed";
pub const CANDIDATE_SER_ERROR: &str = "critical: candidate serialization failed";
pub const COIN_DESER_ERROR: &str = "critical: coin deserialization failed";
pub const COIN_SER_ERROR: &str = "critical: coin serialization failed";
pub const FROZEN_FUNDS_DESER_ERROR: &str = "critical: frozen funds deserialization failed";
pub const FROZEN_FUNDS_SER_ERROR: &str = "critical: frozen funds serialization failed";
pub const HALTS_DESER_ERROR: &str = "critical: halt blocks deserialization failed";
pub const HALTS_SER_ERROR: &str = "critical: halt blocks serialization failed";
pub const EVENTS_DESER_ERROR: &str = "critical: events deserialization failed";
pub const EVENTS_SER_ERROR: &str = "critical: events serialization failed";
pub const VALIDATOR_DESER_ERROR: &str = "critical: validator deserialization failed";
pub const VALIDATOR_SER_ERROR: &str = "critical: validator serialization failed";
pub const WAITLIST_DESER_ERROR: &str = "critical: waitlist deserialization failed";
pub const WAITLIST_SER_ERROR: &str = "critical: waitlist serialization failed";
