// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Node settings.
//!
//! Sources are merged in order, a later one overriding an earlier one:
//! 1. the file at `NOAH_CONFIG_PATH`, `base_config/config.toml` by default. It must exist.
//! 2. the file at `NOAH_CONFIG_OVERRIDE_PATH`, `config/config.toml` by default, if present.
//! 3. the user configuration directory of the platform, if present.
//! 4. environment variables prefixed with `NOAH`, for instance `NOAH_LOGGING__LEVEL`.

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

lazy_static::lazy_static! {
    pub static ref SETTINGS: Settings = build_noah_settings("noah-node", "NOAH");
}

/// Merges every source into `T`. Panics on a missing base file or an invalid value, the node
/// cannot start without its settings.
pub fn build_noah_settings<T: serde::de::DeserializeOwned>(app_name: &str, env_prefix: &str) -> T {
    let mut builder = config::Config::builder();
    let config_path = std::env::var("NOAH_CONFIG_PATH")
        .unwrap_or_else(|_| "base_config/config.toml".to_string());
    builder = builder.add_source(config::File::with_name(&config_path));

    let config_override_path = std::env::var("NOAH_CONFIG_OVERRIDE_PATH")
        .unwrap_or_else(|_| "config/config.toml".to_string());
    if Path::new(&config_override_path).is_file() {
        builder = builder.add_source(config::File::with_name(&config_override_path));
    }

    if let Some(proj_dirs) = ProjectDirs::from("network", "Noah", app_name) {
        let user_config_path = proj_dirs.config_dir().join("config.toml");
        if user_config_path.is_file() {
            builder = builder.add_source(config::File::from(user_config_path));
        }
    }

    builder
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .expect("critical: cannot read the node settings")
        .try_deserialize()
        .expect("critical: invalid node settings")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, for instance `info` or `noah_state=debug`
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// RocksDB directory
    pub path: PathBuf,
    /// saved versions kept readable
    pub keep_versions: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    /// network identifier carried by transactions
    pub chain_id: u8,
    /// size of the active validator set
    pub validators_count: usize,
    /// live stake slots per candidate
    pub max_delegators_per_candidate: usize,
    /// blocks between an unbond and the release of the funds
    pub unbond_period: u64,
    /// blocks between two reward payouts and validator set rebuilds
    pub blocks_per_payout: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub chain: ChainSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn with_config<T>(content: &str, f: impl FnOnce() -> T) -> T {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("cannot create temp file");
        file.write_all(content.as_bytes())
            .expect("cannot write temp file");
        std::env::set_var("NOAH_CONFIG_PATH", file.path());
        std::env::set_var("NOAH_CONFIG_OVERRIDE_PATH", "/nonexistent/config.toml");
        let res = f();
        std::env::remove_var("NOAH_CONFIG_PATH");
        std::env::remove_var("NOAH_CONFIG_OVERRIDE_PATH");
        res
    }

    #[test]
    #[serial]
    fn test_base_config_parses() {
        let base = include_str!("../base_config/config.toml");
        let settings: Settings =
            with_config(base, || build_noah_settings("noah-node-test", "NOAH_TEST"));
        assert_eq!(settings.chain.validators_count, 64);
        assert_eq!(settings.chain.blocks_per_payout, 120);
        assert_eq!(settings.chain.unbond_period, 518400);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_the_file() {
        let base = include_str!("../base_config/config.toml");
        std::env::set_var("NOAH_TEST_CHAIN__CHAIN_ID", "2");
        let settings: Settings =
            with_config(base, || build_noah_settings("noah-node-test", "NOAH_TEST"));
        std::env::remove_var("NOAH_TEST_CHAIN__CHAIN_ID");
        assert_eq!(settings.chain.chain_id, 2);
    }
}
