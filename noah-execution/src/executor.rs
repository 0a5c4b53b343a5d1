// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::config::ExecutionConfig;
use crate::error::{ExecutionError, ExecutionResult, ResponseCode};
use crate::handlers::{self, StateAccess, Tag, TxContext};
use noah_logging::noah_trace;
use noah_models::transaction::SignedTransaction;
use noah_models::Amount;
use noah_state::State;
use tracing::debug;

/// Outcome of a transaction, as reported to the consensus engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResponse {
    pub code: ResponseCode,
    /// empty on success
    pub log: String,
    pub tags: Vec<Tag>,
    pub gas_wanted: u64,
    pub gas_used: u64,
}

impl TxResponse {
    pub fn is_ok(&self) -> bool {
        self.code == ResponseCode::Ok
    }
}

/// Decodes, authenticates and applies transactions
pub struct Executor {
    config: ExecutionConfig,
}

impl Executor {
    pub fn new(config: ExecutionConfig) -> Self {
        Executor { config }
    }

    /// Runs every check of `deliver_tx`. The state is only read.
    pub fn check_tx(&self, state: &State, raw: &[u8], height: u64) -> TxResponse {
        let mut reward_pool = Amount::zero();
        self.process(StateAccess::Check(state), raw, height, &mut reward_pool)
    }

    /// Applies a transaction. On success its commission is added to `reward_pool` and the
    /// sender nonce advances. On failure nothing changes.
    pub fn deliver_tx(
        &self,
        state: &mut State,
        raw: &[u8],
        height: u64,
        reward_pool: &mut Amount,
    ) -> TxResponse {
        self.process(StateAccess::Deliver(state), raw, height, reward_pool)
    }

    fn process(
        &self,
        mut state: StateAccess<'_>,
        raw: &[u8],
        height: u64,
        reward_pool: &mut Amount,
    ) -> TxResponse {
        let mut gas_wanted = 0;
        match self.execute(&mut state, raw, height, reward_pool, &mut gas_wanted) {
            Ok(tags) => TxResponse {
                code: ResponseCode::Ok,
                log: String::new(),
                tags,
                gas_wanted,
                gas_used: gas_wanted,
            },
            Err(err) => {
                debug!("transaction rejected at height {}: {}", height, err);
                TxResponse {
                    code: err.code(),
                    log: err.to_string(),
                    tags: Vec::new(),
                    gas_wanted,
                    gas_used: 0,
                }
            }
        }
    }

    fn execute(
        &self,
        state: &mut StateAccess<'_>,
        raw: &[u8],
        height: u64,
        reward_pool: &mut Amount,
        gas_wanted: &mut u64,
    ) -> ExecutionResult<Vec<Tag>> {
        if raw.len() > self.config.max_tx_bytes {
            return Err(ExecutionError::TooLargeTx(raw.len(), self.config.max_tx_bytes));
        }
        let signed = SignedTransaction::from_bytes(raw)
            .map_err(|err| ExecutionError::DecodeError(err.to_string()))?;
        let tx = &signed.content;
        *gas_wanted = tx.gas();

        if tx.payload.len() > self.config.max_payload_bytes {
            return Err(ExecutionError::TooLongPayload(
                tx.payload.len(),
                self.config.max_payload_bytes,
            ));
        }
        if tx.chain_id != self.config.chain_id {
            return Err(ExecutionError::WrongChainId {
                expected: self.config.chain_id,
                got: tx.chain_id,
            });
        }
        signed
            .verify_signature()
            .map_err(|err| ExecutionError::WrongSignature(err.to_string()))?;

        let sender = signed.sender();
        let expected = state.accounts.get_nonce(&sender) + 1;
        if tx.nonce != expected {
            return Err(ExecutionError::WrongNonce {
                expected,
                got: tx.nonce,
            });
        }
        if !state.coins.exists_id(tx.gas_coin) {
            return Err(ExecutionError::CoinNotExists(tx.gas_coin));
        }

        let ctx = TxContext {
            tx,
            sender,
            height,
        };
        let tags = handlers::dispatch(state, &ctx, reward_pool)?;
        if let Some(state) = state.deliver() {
            state.accounts.set_nonce(&sender, tx.nonce);
            noah_trace!("execution.deliver_tx", {
                "height": height,
                "from": sender.to_string(),
                "nonce": tx.nonce,
                "gas": *gas_wanted,
            });
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tools::{address, open_state, signed_tx};
    use noah_models::transaction::TransactionData;
    use noah_models::{Address, CoinId};
    use noah_signature::KeyPair;
    use noah_state::bus::AccountsBus;

    fn funded_sender(state: &mut State) -> (KeyPair, Address) {
        let keypair = KeyPair::generate();
        let sender = Address::from_public_key(&keypair.get_public_key());
        state
            .accounts
            .add_balance(&sender, CoinId::BASE, &Amount::from_noah(100));
        (keypair, sender)
    }

    fn send(value: u64) -> TransactionData {
        TransactionData::Send {
            coin: CoinId::BASE,
            to: address(7),
            value: Amount::from_noah(value),
        }
    }

    #[test]
    fn test_deliver_advances_the_nonce() {
        let (_dir, mut state) = open_state();
        let (keypair, sender) = funded_sender(&mut state);
        let executor = Executor::new(ExecutionConfig::default());
        let mut pool = Amount::zero();

        let raw = signed_tx(&keypair, 1, send(10)).to_bytes().unwrap();
        let response = executor.deliver_tx(&mut state, &raw, 5, &mut pool);
        assert!(response.is_ok(), "{}", response.log);
        assert_eq!(response.gas_used, 10);
        assert_eq!(state.accounts.get_nonce(&sender), 1);
        assert_eq!(
            state.accounts.get_balance(&address(7), CoinId::BASE),
            Amount::from_noah(10)
        );

        // replay
        let response = executor.deliver_tx(&mut state, &raw, 5, &mut pool);
        assert_eq!(response.code, ResponseCode::WrongNonce);
        assert_eq!(response.gas_used, 0);
        assert_eq!(
            state.accounts.get_balance(&address(7), CoinId::BASE),
            Amount::from_noah(10)
        );
    }

    #[test]
    fn test_check_does_not_mutate() {
        let (_dir, mut state) = open_state();
        let (keypair, sender) = funded_sender(&mut state);
        let executor = Executor::new(ExecutionConfig::default());

        let raw = signed_tx(&keypair, 1, send(10)).to_bytes().unwrap();
        let response = executor.check_tx(&state, &raw, 5);
        assert!(response.is_ok(), "{}", response.log);
        assert!(!response.tags.is_empty());
        assert_eq!(state.accounts.get_nonce(&sender), 0);
        assert_eq!(
            state.accounts.get_balance(&sender, CoinId::BASE),
            Amount::from_noah(100)
        );
        assert!(state
            .accounts
            .get_balance(&address(7), CoinId::BASE)
            .is_zero());
    }

    #[test]
    fn test_envelope_rejections() {
        let (_dir, mut state) = open_state();
        let (keypair, _) = funded_sender(&mut state);
        let executor = Executor::new(ExecutionConfig::default());

        let response = executor.check_tx(&state, &[1, 2, 3], 5);
        assert_eq!(response.code, ResponseCode::DecodeError);

        let oversized = vec![0; ExecutionConfig::default().max_tx_bytes + 1];
        let response = executor.check_tx(&state, &oversized, 5);
        assert_eq!(response.code, ResponseCode::TooLargeTx);

        let mut tx = signed_tx(&keypair, 1, send(1));
        tx.content.chain_id = 2;
        tx = tx.content.sign(&keypair).unwrap();
        let response = executor.check_tx(&state, &tx.to_bytes().unwrap(), 5);
        assert_eq!(response.code, ResponseCode::WrongChainId);

        // content changed after signing
        let mut tx = signed_tx(&keypair, 1, send(1));
        tx.content.nonce = 2;
        let response = executor.check_tx(&state, &tx.to_bytes().unwrap(), 5);
        assert_eq!(response.code, ResponseCode::WrongSignature);

        let mut tx = signed_tx(&keypair, 1, send(1));
        tx.content.payload = vec![0; ExecutionConfig::default().max_payload_bytes + 1];
        tx = tx.content.sign(&keypair).unwrap();
        let response = executor.check_tx(&state, &tx.to_bytes().unwrap(), 5);
        assert_eq!(response.code, ResponseCode::TooLongPayload);

        let response = executor.check_tx(
            &state,
            &signed_tx(&keypair, 1, send(1000)).to_bytes().unwrap(),
            5,
        );
        assert_eq!(response.code, ResponseCode::InsufficientFunds);
    }
}
