//! Gas pricing for keeper transactions.
//!
//! The config's `ethOptions` either pins a legacy gas price or asks for
//! EIP-1559 pricing. Both are expressed through [`GasStrategy`] so the
//! transaction sender does not care which one is active.
//!
//! ```rust,ignore
//! let legacy = LegacyGasStrategy::new(1_000_000_000, 10_000_000_000);
//! let eip1559 = Eip1559GasStrategy::new(10_000_000, 500_000_000_000);
//! ```

mod eip1559;
mod legacy;

pub use eip1559::Eip1559GasStrategy;
pub use legacy::LegacyGasStrategy;

use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::ChainReadError;
use crate::provider::ProviderManager;

const GWEI: f64 = 1e9;

/// Gas parameters fetched from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasParams {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl GasParams {
    /// Upper bound of the per-gas price paid.
    pub fn effective_gas_price(&self) -> u128 {
        match self {
            GasParams::Legacy { gas_price } => *gas_price,
            GasParams::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }
}

/// Gas pricing strategy.
#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Current gas parameters for the next transaction.
    async fn fetch_params(&self, provider: &ProviderManager) -> Result<GasParams, ChainReadError>;

    /// Write the parameters into a transaction request.
    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams);

    fn strategy_name(&self) -> &'static str;
}

/// Build a strategy from `ethOptions` values (all prices in gwei).
///
/// A fixed `gas_price_gwei` yields a legacy strategy pinned to that price.
/// Otherwise `pricing_model` picks between legacy (node price, capped) and
/// EIP-1559.
pub fn create_gas_strategy(
    pricing_model: &str,
    gas_price_gwei: Option<f64>,
    max_gas_price_gwei: f64,
    priority_fee_gwei: Option<f64>,
) -> Box<dyn GasStrategy> {
    let max_gas_price = (max_gas_price_gwei * GWEI) as u128;

    if let Some(fixed) = gas_price_gwei {
        let price = (fixed * GWEI) as u128;
        return Box::new(LegacyGasStrategy::fixed(price.min(max_gas_price)));
    }

    match pricing_model.to_lowercase().as_str() {
        "eip1559" | "eip-1559" => {
            let priority_fee = (priority_fee_gwei.unwrap_or(0.01) * GWEI) as u128;
            Box::new(Eip1559GasStrategy::new(priority_fee, max_gas_price))
        }
        _ => Box::new(LegacyGasStrategy::new(1_000_000_000, max_gas_price)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_params_effective_price() {
        let legacy = GasParams::Legacy {
            gas_price: 1_000_000_000,
        };
        assert_eq!(legacy.effective_gas_price(), 1_000_000_000);

        let eip1559 = GasParams::Eip1559 {
            max_fee_per_gas: 50_000_000_000,
            max_priority_fee_per_gas: 2_000_000_000,
        };
        assert_eq!(eip1559.effective_gas_price(), 50_000_000_000);
    }

    #[test]
    fn test_create_gas_strategy() {
        let fixed = create_gas_strategy("eip1559", Some(0.1), 10.0, None);
        assert_eq!(fixed.strategy_name(), "Legacy");

        let eip1559 = create_gas_strategy("Eip1559", None, 500.0, Some(2.0));
        assert_eq!(eip1559.strategy_name(), "EIP-1559");

        // Unknown defaults to Legacy
        let unknown = create_gas_strategy("Unknown", None, 10.0, None);
        assert_eq!(unknown.strategy_name(), "Legacy");
    }
}
