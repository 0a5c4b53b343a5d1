// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Noah validator node state
#![warn(unused_crate_dependencies)]

use crate::blockchain::{Blockchain, BlockchainConfig};
use crate::error::NodeError;
use crate::settings::SETTINGS;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use noah_db_exports::{ShareableTreeStore, TreeStoreConfig, TreeStoreController};
use noah_db_worker::TreeStore;
use noah_execution::ExecutionConfig;
use noah_models::app_state::AppState;
use noah_models::{Address, CoinId, Pubkey};
use noah_state::StateConfig;
use parking_lot::RwLock;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod blockchain;
mod error;
mod replay;
mod settings;

#[derive(Parser)]
#[command(version, about = "Noah validator node state")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initializes the chain if needed, then applies blocks
    Run {
        /// Genesis document, required on an empty storage
        #[arg(long)]
        genesis: Option<PathBuf>,
        /// Blocks to apply, in JSON lines. Without it the node waits for a stop signal.
        #[arg(long)]
        blocks: Option<PathBuf>,
    },
    /// Writes the genesis document of the last committed version
    Export {
        /// Output file, stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Reads the last committed version
    #[command(subcommand)]
    Query(Query),
}

#[derive(Subcommand)]
enum Query {
    /// Balance of an address
    Balance {
        address: Address,
        /// coin id, the base coin by default
        #[arg(long, default_value_t = 0)]
        coin: u32,
    },
    /// A candidate and its stakes
    Candidate { pub_key: Pubkey },
    /// The active validator set
    Validators,
    /// A custom coin
    Coin { id: u32 },
    /// Rewards, slashes and unbonds recorded by a block, as JSON
    Events { height: u64 },
}

fn blockchain_config() -> BlockchainConfig {
    let chain = &SETTINGS.chain;
    BlockchainConfig {
        state: StateConfig {
            max_delegators_per_candidate: chain.max_delegators_per_candidate,
            unbond_period: chain.unbond_period,
            ..Default::default()
        },
        execution: ExecutionConfig {
            chain_id: chain.chain_id,
            ..Default::default()
        },
        validators_count: chain.validators_count,
        blocks_per_payout: chain.blocks_per_payout,
    }
}

fn open_store() -> ShareableTreeStore {
    let store = TreeStore::new(TreeStoreConfig {
        path: SETTINGS.storage.path.clone(),
        keep_versions: SETTINGS.storage.keep_versions,
    });
    let db: Box<dyn TreeStoreController> = Box::new(store);
    Arc::new(RwLock::new(db))
}

fn read_genesis(path: &Path) -> Result<AppState> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid genesis document {}", path.display()))
}

fn run(genesis: Option<PathBuf>, blocks: Option<PathBuf>) -> Result<()> {
    let mut chain = Blockchain::new(open_store(), blockchain_config());
    if chain.version() == 0 {
        let path = genesis.ok_or(NodeError::NotInitialized)?;
        let updates = chain.init_chain(&read_genesis(&path)?)?;
        info!(
            "chain initialized at height {} with {} validators",
            chain.height(),
            updates.len()
        );
    } else {
        if genesis.is_some() {
            warn!("storage already initialized, the genesis document is ignored");
        }
        info!(
            "resuming at height {}, version {}",
            chain.height(),
            chain.version()
        );
    }

    match blocks {
        Some(path) => {
            let file =
                File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
            let applied = replay::replay(&mut chain, BufReader::new(file))?;
            info!("{} blocks applied, height {}", applied, chain.height());
        }
        None => {
            let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
            ctrlc::set_handler(move || {
                let _ = stop_tx.try_send(());
            })
            .context("cannot set the stop signal handler")?;
            info!("waiting for a stop signal");
            let _ = stop_rx.recv();
            info!("stop signal received");
        }
    }
    Ok(())
}

fn export(output: Option<PathBuf>) -> Result<()> {
    let chain = Blockchain::new(open_store(), blockchain_config());
    if chain.version() == 0 {
        return Err(NodeError::NotInitialized.into());
    }
    let app_state = chain.export();
    match output {
        Some(path) => {
            let file =
                File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
            serde_json::to_writer_pretty(file, &app_state)?;
            info!(
                "height {} exported to {}",
                app_state.start_height,
                path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&app_state)?),
    }
    Ok(())
}

fn query(query: Query) -> Result<()> {
    let chain = Blockchain::new(open_store(), blockchain_config());
    if chain.version() == 0 {
        return Err(NodeError::NotInitialized.into());
    }
    match query {
        Query::Balance { address, coin } => {
            println!("{}", chain.balance(&address, CoinId(coin)).to_noah_string());
        }
        Query::Candidate { pub_key } => {
            let candidate = chain
                .candidate(&pub_key)
                .with_context(|| format!("candidate {} not found", pub_key))?;
            println!(
                "id {} status {:?} commission {}% stake {}",
                candidate.id,
                candidate.status,
                candidate.commission,
                candidate.total_noah_stake.to_noah_string()
            );
            for stake in &candidate.stakes {
                println!(
                    "  {} {} {} ({})",
                    stake.owner,
                    stake.coin,
                    stake.value.to_noah_string(),
                    stake.noah_value.to_noah_string()
                );
            }
        }
        Query::Validators => {
            for validator in chain.validators() {
                println!(
                    "{} stake {} reward {} absent {}",
                    validator.pub_key,
                    validator.total_noah_stake.to_noah_string(),
                    validator.accum_reward.to_noah_string(),
                    validator.count_absent_times()
                );
            }
        }
        Query::Coin { id } => {
            let coin = chain
                .coin(CoinId(id))
                .with_context(|| format!("coin {} not found", id))?;
            println!(
                "{} {} crr {}% volume {} reserve {} max supply {}",
                coin.symbol,
                coin.name,
                coin.crr,
                coin.volume.to_noah_string(),
                coin.reserve.to_noah_string(),
                coin.max_supply.to_noah_string()
            );
        }
        Query::Events { height } => {
            let events = chain.events(height);
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&SETTINGS.logging.level))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run { genesis, blocks } => run(genesis, blocks),
        Command::Export { output } => export(output),
        Command::Query(q) => query(q),
    }
}
