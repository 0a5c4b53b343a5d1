// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Block input in JSON lines, one block per line, for instance
//! `{"height": 1, "votes": [{"tm_address": "AB12..", "signed": true}], "txs": ["f8a3.."]}`.

use crate::blockchain::{Blockchain, Evidence, ValidatorUpdate, Vote};
use crate::error::{NodeError, NodeResult};
use noah_models::TmAddress;
use serde::Deserialize;
use std::io::BufRead;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct VoteInput {
    tm_address: String,
    signed: bool,
}

#[derive(Debug, Deserialize)]
struct EvidenceInput {
    tm_address: String,
    total_voting_power: u64,
}

#[derive(Debug, Deserialize)]
struct BlockInput {
    height: u64,
    #[serde(default)]
    votes: Vec<VoteInput>,
    #[serde(default)]
    evidence: Vec<EvidenceInput>,
    /// hex encoded signed transactions
    #[serde(default)]
    txs: Vec<String>,
}

/// A decoded block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub height: u64,
    pub votes: Vec<Vote>,
    pub evidence: Vec<Evidence>,
    pub txs: Vec<Vec<u8>>,
}

fn parse_tm_address(s: &str) -> NodeResult<TmAddress> {
    TmAddress::from_str(s).map_err(|err| NodeError::InvalidBlock(format!("{}: {}", s, err)))
}

impl FromStr for Block {
    type Err = NodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let input: BlockInput =
            serde_json::from_str(line).map_err(|err| NodeError::InvalidBlock(err.to_string()))?;
        let votes = input
            .votes
            .iter()
            .map(|vote| {
                Ok(Vote {
                    tm_address: parse_tm_address(&vote.tm_address)?,
                    signed: vote.signed,
                })
            })
            .collect::<NodeResult<Vec<_>>>()?;
        let evidence = input
            .evidence
            .iter()
            .map(|item| {
                Ok(Evidence {
                    tm_address: parse_tm_address(&item.tm_address)?,
                    total_voting_power: item.total_voting_power,
                })
            })
            .collect::<NodeResult<Vec<_>>>()?;
        let txs = input
            .txs
            .iter()
            .map(|tx| {
                hex::decode(tx).map_err(|err| {
                    NodeError::InvalidBlock(format!("transaction is not hex: {}", err))
                })
            })
            .collect::<NodeResult<Vec<_>>>()?;
        Ok(Block {
            height: input.height,
            votes,
            evidence,
            txs,
        })
    }
}

/// Summary of an applied block
#[derive(Debug, Default)]
pub struct BlockOutcome {
    pub delivered: usize,
    pub rejected: usize,
    pub validator_updates: Vec<ValidatorUpdate>,
}

/// Runs the whole lifecycle of a block and commits it. On failure the partial block is
/// discarded.
pub fn apply_block(chain: &mut Blockchain, block: &Block) -> NodeResult<BlockOutcome> {
    let res = run_block(chain, block);
    if res.is_err() {
        chain.discard();
    }
    res
}

fn run_block(chain: &mut Blockchain, block: &Block) -> NodeResult<BlockOutcome> {
    let mut outcome = BlockOutcome::default();
    chain.begin_block(block.height, &block.votes, &block.evidence)?;
    for tx in &block.txs {
        let response = chain.deliver_tx(tx);
        if response.is_ok() {
            outcome.delivered += 1;
        } else {
            outcome.rejected += 1;
            debug!("{:?} at height {}: {}", response.code, block.height, response.log);
        }
    }
    outcome.validator_updates = chain.end_block(block.height)?;
    chain.commit()?;
    Ok(outcome)
}

/// Applies every block of `reader` above the committed height, in order. Returns the number
/// of applied blocks.
pub fn replay(chain: &mut Blockchain, reader: impl BufRead) -> NodeResult<u64> {
    let mut applied = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| NodeError::InvalidBlock(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let block: Block = line
            .parse()
            .map_err(|err| NodeError::InvalidBlock(format!("line {}: {}", idx + 1, err)))?;
        if block.height <= chain.height() {
            continue;
        }
        if block.height != chain.height() + 1 {
            return Err(NodeError::InvalidBlock(format!(
                "expected height {}, got {}",
                chain.height() + 1,
                block.height
            )));
        }
        let outcome = apply_block(chain, &block)?;
        if !outcome.validator_updates.is_empty() {
            info!(
                "{} validator updates at height {}",
                outcome.validator_updates.len(),
                block.height
            );
        }
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockchainConfig;
    use assert_matches::assert_matches;
    use noah_db_exports::{TreeStoreConfig, TreeStoreController};
    use noah_db_worker::TreeStore;
    use noah_models::app_state::{AppCandidate, AppStake, AppState, AppValidator};
    use noah_models::{Address, Amount, CoinId, Pubkey};
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn genesis() -> AppState {
        let owner = Address::from_bytes(&[1; noah_models::address::ADDRESS_SIZE_BYTES]);
        AppState {
            validators: vec![AppValidator {
                total_noah_stake: Amount::from_noah(100),
                public_key: Pubkey::from_bytes([4; 32]),
                accum_reward: Amount::zero(),
                absent_times: 0,
            }],
            candidates: vec![AppCandidate {
                id: 1,
                reward_address: owner,
                owner_address: owner,
                control_address: owner,
                total_noah_stake: Amount::from_noah(100),
                public_key: Pubkey::from_bytes([4; 32]),
                commission: 10,
                stakes: vec![AppStake {
                    owner,
                    coin: CoinId::BASE,
                    value: Amount::from_noah(100),
                    noah_value: Amount::from_noah(100),
                }],
                updates: Vec::new(),
                status: 2,
                to_drop: false,
            }],
            ..Default::default()
        }
    }

    fn block_line(height: u64) -> String {
        let tm_address = Pubkey::from_bytes([4; 32]).tm_address();
        format!(
            r#"{{"height": {}, "votes": [{{"tm_address": "{}", "signed": true}}]}}"#,
            height, tm_address
        )
    }

    #[test]
    fn test_parse_block() {
        let block: Block = block_line(3).parse().unwrap();
        assert_eq!(block.height, 3);
        assert_eq!(
            block.votes,
            vec![Vote {
                tm_address: Pubkey::from_bytes([4; 32]).tm_address(),
                signed: true,
            }]
        );
        assert!(block.txs.is_empty());

        let block: Block = r#"{"height": 1, "txs": ["00ff"]}"#.parse().unwrap();
        assert_eq!(block.txs, vec![vec![0, 255]]);

        assert_matches!(
            r#"{"height": 1, "txs": ["zz"]}"#.parse::<Block>(),
            Err(NodeError::InvalidBlock(_))
        );
        assert_matches!(
            r#"{"height": 1, "votes": [{"tm_address": "AB", "signed": true}]}"#.parse::<Block>(),
            Err(NodeError::InvalidBlock(_))
        );
    }

    #[test]
    fn test_replay_skips_committed_heights() {
        let dir = tempfile::tempdir().expect("cannot create temp dir");
        let store = TreeStore::new(TreeStoreConfig {
            path: dir.path().to_path_buf(),
            keep_versions: 10,
        });
        let db: Box<dyn TreeStoreController> = Box::new(store);
        let db = Arc::new(RwLock::new(db));
        let mut chain = Blockchain::new(db.clone(), BlockchainConfig::default());
        chain.init_chain(&genesis()).unwrap();

        let input = [block_line(1), block_line(2)].join("\n");
        assert_eq!(replay(&mut chain, input.as_bytes()).unwrap(), 2);
        drop(chain);

        // reopened at the committed height, only the new block applies
        let mut chain = Blockchain::new(db, BlockchainConfig::default());
        assert_eq!(chain.height(), 2);
        let input = [block_line(1), block_line(2), block_line(3)].join("\n");
        assert_eq!(replay(&mut chain, input.as_bytes()).unwrap(), 1);
        assert_eq!(chain.height(), 3);

        let input = block_line(5);
        assert_matches!(
            replay(&mut chain, input.as_bytes()),
            Err(NodeError::InvalidBlock(_))
        );
    }
}
