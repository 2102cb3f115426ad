//! Keeper configuration.
//!
//! This module provides:
//! - Pool configuration (JSON): pools, strategies, keeper contracts, gas options
//! - Runtime settings (TOML): loop interval and retry policies
//! - `${VAR}` expansion from the environment

mod pools;
mod settings;

pub use pools::{EthOptions, KeeperAddresses, KeeperConfig, PoolConfig, RawPoolConfig, Strategy};
pub use settings::{KeeperSettings, LoopSettings, RetrySettings};

use std::path::PathBuf;

use keeper_chain::ChainReadError;

/// Configuration problem. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pool config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("pool {pool}: unknown keeperType '{value}'")]
    UnknownKeeperType { pool: String, value: String },

    #[error("pool {pool}: keeperType {strategy} needs a non-empty flashLoanPools list")]
    MissingFlashLoanPools { pool: String, strategy: &'static str },

    #[error("pool {pool}: no keeper contract configured for {strategy}")]
    KeeperNotConfigured { pool: String, strategy: &'static str },

    #[error("{field}: '{value}' is not a valid address")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: '{value}' is not a valid amount ({reason})")]
    InvalidAmount {
        field: String,
        value: String,
        reason: String,
    },

    #[error("duplicate pool {0}")]
    DuplicatePool(String),

    /// Reading token metadata for min-profit scaling failed.
    #[error(transparent)]
    Chain(#[from] ChainReadError),
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
///
/// Unset variables are an error rather than left in place.
pub fn expand_env(s: &str) -> Result<String, ConfigError> {
    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern");

    let mut result = String::with_capacity(s.len());
    let mut last = 0;
    for cap in re.captures_iter(s) {
        let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = std::env::var(name.as_str())
            .map_err(|_| ConfigError::MissingEnv(name.as_str().to_string()))?;
        result.push_str(&s[last..full.start()]);
        result.push_str(&value);
        last = full.end();
    }
    result.push_str(&s[last..]);

    Ok(result)
}

fn read_file(path: &std::path::Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        // Unique var names, tests run in parallel
        std::env::set_var("KEEPER_CFG_TEST_VAR", "test_value");
        assert_eq!(expand_env("${KEEPER_CFG_TEST_VAR}").unwrap(), "test_value");
        assert_eq!(
            expand_env("prefix_${KEEPER_CFG_TEST_VAR}_suffix").unwrap(),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("no_vars").unwrap(), "no_vars");
        std::env::remove_var("KEEPER_CFG_TEST_VAR");
    }

    #[test]
    fn test_expand_env_missing() {
        let err = expand_env("${KEEPER_CFG_SURELY_UNSET}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(name) if name == "KEEPER_CFG_SURELY_UNSET"));
    }
}
