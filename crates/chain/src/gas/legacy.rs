//! Legacy gas pricing (single `gasPrice`).

use super::{GasParams, GasStrategy};
use crate::error::ChainReadError;
use crate::provider::ProviderManager;
use alloy::network::TransactionBuilder;
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

/// Legacy gas pricing strategy.
///
/// Either pinned to a configured price, or follows `eth_gasPrice` capped at
/// `max_gas_price`.
#[derive(Debug)]
pub struct LegacyGasStrategy {
    /// Used when the node does not answer `eth_gasPrice`.
    default_gas_price: u128,
    max_gas_price: u128,
    pinned: bool,
}

impl LegacyGasStrategy {
    pub fn new(default_gas_price: u128, max_gas_price: u128) -> Self {
        Self {
            default_gas_price: default_gas_price.min(max_gas_price),
            max_gas_price,
            pinned: false,
        }
    }

    /// Always use `gas_price`, never ask the node.
    pub fn fixed(gas_price: u128) -> Self {
        Self {
            default_gas_price: gas_price,
            max_gas_price: gas_price,
            pinned: true,
        }
    }

    fn cap(&self, gas_price: u128) -> u128 {
        gas_price.min(self.max_gas_price)
    }
}

#[async_trait]
impl GasStrategy for LegacyGasStrategy {
    async fn fetch_params(&self, provider: &ProviderManager) -> Result<GasParams, ChainReadError> {
        if self.pinned {
            return Ok(GasParams::Legacy {
                gas_price: self.default_gas_price,
            });
        }

        let gas_price = provider
            .http()
            .get_gas_price()
            .await
            .unwrap_or(self.default_gas_price);

        Ok(GasParams::Legacy {
            gas_price: self.cap(gas_price),
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        match params {
            GasParams::Legacy { gas_price } => tx.set_gas_price(*gas_price),
            GasParams::Eip1559 { max_fee_per_gas, .. } => tx.set_gas_price(*max_fee_per_gas),
        }
    }

    fn strategy_name(&self) -> &'static str {
        "Legacy"
    }
}
