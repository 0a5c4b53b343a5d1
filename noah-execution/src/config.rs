// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines a configuration structure containing all settings for the transaction
//! executor

use noah_models::config::constants::{MAX_PAYLOAD_BYTES, MAX_TX_BYTES};

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// network identifier every transaction must carry
    pub chain_id: u8,
    /// max size of an encoded transaction
    pub max_tx_bytes: usize,
    /// max size of a transaction payload
    pub max_payload_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            chain_id: 1,
            max_tx_bytes: MAX_TX_BYTES,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}
