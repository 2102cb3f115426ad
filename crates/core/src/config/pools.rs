//! Pool configuration (JSON).

use std::collections::HashSet;
use std::path::Path;

use alloy::primitives::utils::parse_units;
use alloy::primitives::{Address, U256};
use keeper_chain::{KeeperContracts, PoolStateReader};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{expand_env, read_file, ConfigError};

/// Top-level keeper configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeeperConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Keeper contract per strategy
    #[serde(default)]
    pub keepers: KeeperAddresses,

    pub marginly_pools: Vec<RawPoolConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(default)]
    pub eth_options: EthOptions,

    /// Expected chain id, checked against the node when set
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// Transaction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthOptions {
    #[serde(default)]
    pub gas_limit: Option<u64>,

    /// Fixed gas price in gwei; node price when absent
    #[serde(default)]
    pub gas_price: Option<f64>,

    /// "legacy" or "eip1559"
    #[serde(default = "default_pricing")]
    pub pricing: String,

    /// Upper bound in gwei
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price: f64,

    /// EIP-1559 tip in gwei
    #[serde(default)]
    pub priority_fee: Option<f64>,
}

fn default_pricing() -> String {
    "legacy".to_string()
}
fn default_max_gas_price() -> f64 {
    100.0
}

impl Default for EthOptions {
    fn default() -> Self {
        Self {
            gas_limit: None,
            gas_price: None,
            pricing: default_pricing(),
            max_gas_price: default_max_gas_price(),
            priority_fee: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeeperAddresses {
    #[serde(default)]
    pub aave: Option<String>,
    #[serde(default)]
    pub uniswap_v3: Option<String>,
    #[serde(default)]
    pub algebra: Option<String>,
    #[serde(default)]
    pub balancer: Option<String>,
}

impl KeeperAddresses {
    pub fn resolve(&self) -> Result<KeeperContracts, ConfigError> {
        let parse = |value: &Option<String>, field: &str| {
            value
                .as_deref()
                .map(|v| parse_address(v, &format!("keepers.{field}")))
                .transpose()
        };
        Ok(KeeperContracts {
            aave: parse(&self.aave, "aave")?,
            uniswap_v3: parse(&self.uniswap_v3, "uniswapV3")?,
            algebra: parse(&self.algebra, "algebra")?,
            balancer: parse(&self.balancer, "balancer")?,
        })
    }
}

/// One `marginlyPools` entry as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPoolConfig {
    pub address: String,
    /// Decimal string in quote token units
    pub min_profit_quote: String,
    /// Decimal string in base token units
    pub min_profit_base: String,
    pub keeper_type: String,
    #[serde(default)]
    pub flash_loan_pools: Vec<String>,
    /// Opaque integer forwarded to the keeper contract
    #[serde(default)]
    pub swap_call_data: Option<String>,
    #[serde(default)]
    pub swap_pool: Option<String>,
}

/// How a breach in a pool gets executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Refresh the pool; it liquidates the worst positions itself.
    Reinit,
    /// Aave flash loan through the Aave keeper.
    Aave,
    /// Flash swap from the first listed pool holding the asset.
    UniswapV3 { pools: Vec<Address> },
    /// Same as `UniswapV3` on Algebra pools.
    Algebra { pools: Vec<Address> },
    /// Balancer vault flash loan.
    Balancer,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Reinit => "reinit",
            Strategy::Aave => "aave",
            Strategy::UniswapV3 { .. } => "uniswapV3",
            Strategy::Algebra { .. } => "algebra",
            Strategy::Balancer => "balancer",
        }
    }

    fn parse(raw: &RawPoolConfig) -> Result<Self, ConfigError> {
        let pools = || -> Result<Vec<Address>, ConfigError> {
            raw.flash_loan_pools
                .iter()
                .enumerate()
                .map(|(i, p)| parse_address(p, &format!("{}.flashLoanPools[{i}]", raw.address)))
                .collect()
        };

        let strategy = match raw.keeper_type.as_str() {
            "reinit" => Strategy::Reinit,
            "aave" => Strategy::Aave,
            "uniswapV3" => Strategy::UniswapV3 { pools: pools()? },
            "algebra" => Strategy::Algebra { pools: pools()? },
            "balancer" => Strategy::Balancer,
            other => {
                return Err(ConfigError::UnknownKeeperType {
                    pool: raw.address.clone(),
                    value: other.to_string(),
                })
            }
        };

        if let Strategy::UniswapV3 { pools } | Strategy::Algebra { pools } = &strategy {
            if pools.is_empty() {
                return Err(ConfigError::MissingFlashLoanPools {
                    pool: raw.address.clone(),
                    strategy: strategy.name(),
                });
            }
        }
        Ok(strategy)
    }

    fn keeper_configured(&self, keepers: &KeeperContracts) -> bool {
        match self {
            Strategy::Reinit => true,
            Strategy::Aave => keepers.aave.is_some(),
            Strategy::UniswapV3 { .. } => keepers.uniswap_v3.is_some(),
            Strategy::Algebra { .. } => keepers.algebra.is_some(),
            Strategy::Balancer => keepers.balancer.is_some(),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A pool ready for scanning: addresses parsed, min profits in token units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub address: Address,
    pub strategy: Strategy,
    pub min_profit_base: U256,
    pub min_profit_quote: U256,
    pub swap_call_data: U256,
    pub swap_pool: Address,
}

/// [`RawPoolConfig`] with everything but the min-profit scaling resolved.
#[derive(Debug, Clone)]
struct ValidatedPool {
    address: Address,
    strategy: Strategy,
    swap_call_data: U256,
    swap_pool: Address,
}

impl KeeperConfig {
    /// Load from a JSON file, expanding `${VAR}` placeholders first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = read_file(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env(content)?;
        let config: KeeperConfig = serde_json::from_str(&expanded)?;
        Ok(config)
    }

    fn validate_pools(&self) -> Result<Vec<ValidatedPool>, ConfigError> {
        let keepers = self.keepers.resolve()?;
        let mut seen = HashSet::new();

        self.marginly_pools
            .iter()
            .map(|raw| {
                let address = parse_address(&raw.address, "marginlyPools.address")?;
                if !seen.insert(address) {
                    return Err(ConfigError::DuplicatePool(raw.address.clone()));
                }

                let strategy = Strategy::parse(raw)?;
                if !strategy.keeper_configured(&keepers) {
                    return Err(ConfigError::KeeperNotConfigured {
                        pool: raw.address.clone(),
                        strategy: strategy.name(),
                    });
                }

                let swap_call_data = match raw.swap_call_data.as_deref() {
                    Some(v) => parse_integer(v, &format!("{}.swapCallData", raw.address))?,
                    None => U256::ZERO,
                };
                let swap_pool = match raw.swap_pool.as_deref() {
                    Some(v) => parse_address(v, &format!("{}.swapPool", raw.address))?,
                    None => Address::ZERO,
                };

                Ok(ValidatedPool {
                    address,
                    strategy,
                    swap_call_data,
                    swap_pool,
                })
            })
            .collect()
    }

    /// Check everything that does not need the chain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_pools().map(|_| ())
    }

    /// Resolve all pools, scaling min profits by each token's decimals.
    pub async fn resolve_pools(
        &self,
        reader: &dyn PoolStateReader,
    ) -> Result<Vec<PoolConfig>, ConfigError> {
        let validated = self.validate_pools()?;
        let mut pools = Vec::with_capacity(validated.len());

        for (raw, pool) in self.marginly_pools.iter().zip(validated) {
            let snapshot = reader.read_pool_snapshot(pool.address).await?;
            let base_decimals = reader.token_decimals(snapshot.base_token).await?;
            let quote_decimals = reader.token_decimals(snapshot.quote_token).await?;

            let min_profit_base = scale_amount(
                &raw.min_profit_base,
                base_decimals,
                &format!("{}.minProfitBase", raw.address),
            )?;
            let min_profit_quote = scale_amount(
                &raw.min_profit_quote,
                quote_decimals,
                &format!("{}.minProfitQuote", raw.address),
            )?;

            info!(
                pool = %pool.address,
                strategy = %pool.strategy,
                min_profit_base = %min_profit_base,
                min_profit_quote = %min_profit_quote,
                "Pool configured"
            );

            pools.push(PoolConfig {
                address: pool.address,
                strategy: pool.strategy,
                min_profit_base,
                min_profit_quote,
                swap_call_data: pool.swap_call_data,
                swap_pool: pool.swap_pool,
            });
        }

        Ok(pools)
    }
}

fn parse_address(value: &str, field: &str) -> Result<Address, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_integer(value: &str, field: &str) -> Result<U256, ConfigError> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|e| ConfigError::InvalidAmount {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `"1.5"` with 6 decimals is `1_500_000`.
pub(crate) fn scale_amount(value: &str, decimals: u8, field: &str) -> Result<U256, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAmount {
        field: field.to_string(),
        value: value.to_string(),
        reason,
    };
    let parsed = parse_units(value.trim(), decimals).map_err(|e| invalid(e.to_string()))?;
    if parsed.is_negative() {
        return Err(invalid("negative".to_string()));
    }
    Ok(parsed.get_absolute())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL_A: &str = "0x1111111111111111111111111111111111111111";
    const POOL_B: &str = "0x2222222222222222222222222222222222222222";
    const KEEPER: &str = "0x3333333333333333333333333333333333333333";
    const DEX: &str = "0x4444444444444444444444444444444444444444";

    fn config_json(keeper_type: &str, extra: &str) -> String {
        format!(
            r#"{{
                "connection": {{ "ethOptions": {{ "gasLimit": 2000000 }} }},
                "keepers": {{ "aave": "{KEEPER}", "uniswapV3": "{KEEPER}" }},
                "marginlyPools": [
                    {{
                        "address": "{POOL_A}",
                        "minProfitQuote": "1.5",
                        "minProfitBase": "0.001",
                        "keeperType": "{keeper_type}"
                        {extra}
                    }}
                ]
            }}"#
        )
    }

    #[test]
    fn test_parse_aave_pool() {
        let config = KeeperConfig::from_json(&config_json("aave", "")).unwrap();
        assert_eq!(config.connection.eth_options.gas_limit, Some(2_000_000));
        assert_eq!(config.connection.eth_options.pricing, "legacy");

        let pools = config.validate_pools().unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].strategy, Strategy::Aave);
        assert_eq!(pools[0].swap_pool, Address::ZERO);
    }

    #[test]
    fn test_parse_flash_swap_pools() {
        let extra = format!(r#", "flashLoanPools": ["{DEX}"], "swapCallData": "42", "swapPool": "{POOL_B}""#);
        let config = KeeperConfig::from_json(&config_json("uniswapV3", &extra)).unwrap();
        let pools = config.validate_pools().unwrap();

        assert_eq!(
            pools[0].strategy,
            Strategy::UniswapV3 {
                pools: vec![DEX.parse().unwrap()]
            }
        );
        assert_eq!(pools[0].swap_call_data, U256::from(42u8));
        assert_eq!(pools[0].swap_pool, POOL_B.parse::<Address>().unwrap());
    }

    #[test]
    fn test_unknown_keeper_type_rejected() {
        let config = KeeperConfig::from_json(&config_json("compound", "")).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKeeperType { value, .. } if value == "compound"));
    }

    #[test]
    fn test_flash_swap_without_pools_rejected() {
        let config = KeeperConfig::from_json(&config_json("uniswapV3", "")).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingFlashLoanPools { strategy: "uniswapV3", .. })
        ));
    }

    #[test]
    fn test_missing_keeper_contract_rejected() {
        let config = KeeperConfig::from_json(&config_json("balancer", "")).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::KeeperNotConfigured { strategy: "balancer", .. })
        ));
    }

    #[test]
    fn test_env_placeholder_expanded() {
        std::env::set_var("KEEPER_POOLS_TEST_AAVE", KEEPER);
        let json = config_json("aave", "").replace(
            &format!(r#""aave": "{KEEPER}""#),
            r#""aave": "${KEEPER_POOLS_TEST_AAVE}""#,
        );
        let config = KeeperConfig::from_json(&json).unwrap();
        assert_eq!(config.keepers.aave.as_deref(), Some(KEEPER));
        std::env::remove_var("KEEPER_POOLS_TEST_AAVE");
    }

    #[test]
    fn test_min_profit_scaling() {
        assert_eq!(scale_amount("1.5", 6, "f").unwrap(), U256::from(1_500_000u64));
        assert_eq!(scale_amount("0.001", 18, "f").unwrap(), U256::from(1_000_000_000_000_000u64));
        assert_eq!(scale_amount("0", 8, "f").unwrap(), U256::ZERO);
        assert!(scale_amount("-1", 6, "f").is_err());
        assert!(scale_amount("abc", 6, "f").is_err());
    }

    #[tokio::test]
    async fn test_resolve_pools_scales_by_token_decimals() {
        use crate::risk::tests::{snapshot, MockReader};

        let config = KeeperConfig::from_json(&config_json("aave", "")).unwrap();
        // mock tokens report 18 decimals
        let pools = config
            .resolve_pools(&MockReader::new(snapshot()))
            .await
            .unwrap();

        assert_eq!(pools[0].address, POOL_A.parse::<Address>().unwrap());
        assert_eq!(pools[0].min_profit_base, U256::from(10u64.pow(15)));
        assert_eq!(pools[0].min_profit_quote, U256::from(15u64 * 10u64.pow(17)));
    }

    #[test]
    fn test_swap_call_data_hex() {
        assert_eq!(parse_integer("0x2a", "f").unwrap(), U256::from(42u8));
        assert!(parse_integer("4.2", "f").is_err());
    }
}
