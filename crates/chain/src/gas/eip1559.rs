//! EIP-1559 pricing: twice the latest base fee plus the node's tip, never
//! above `ethOptions.maxGasPrice`.

use super::{GasParams, GasStrategy};
use crate::error::ChainReadError;
use crate::provider::ProviderManager;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

/// Headroom over the base fee for it to rise before inclusion.
const BASE_FEE_HEADROOM: u128 = 2;

#[derive(Debug)]
pub struct Eip1559GasStrategy {
    /// Tip used when the node cannot suggest one
    fallback_tip: u128,
    max_fee_cap: u128,
}

impl Eip1559GasStrategy {
    pub fn new(fallback_tip: u128, max_fee_cap: u128) -> Self {
        Self {
            fallback_tip,
            max_fee_cap,
        }
    }

    fn params_for(&self, base_fee: u128, tip: u128) -> GasParams {
        let max_fee_per_gas = base_fee
            .saturating_mul(BASE_FEE_HEADROOM)
            .saturating_add(tip)
            .min(self.max_fee_cap);
        GasParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas: tip.min(max_fee_per_gas),
        }
    }
}

#[async_trait]
impl GasStrategy for Eip1559GasStrategy {
    async fn fetch_params(&self, provider: &ProviderManager) -> Result<GasParams, ChainReadError> {
        let http = provider.http();

        let base_fee = http
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ChainReadError::rpc("eth_getBlockByNumber", e))?
            .and_then(|block| block.header.base_fee_per_gas)
            .ok_or_else(|| ChainReadError::malformed("eth_getBlockByNumber", "no base fee"))?;

        let tip = http
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(self.fallback_tip);

        Ok(self.params_for(u128::from(base_fee), tip))
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        let (max_fee, tip) = match *params {
            GasParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (max_fee_per_gas, max_priority_fee_per_gas),
            GasParams::Legacy { gas_price } => (gas_price, self.fallback_tip.min(gas_price)),
        };
        tx.set_max_fee_per_gas(max_fee);
        tx.set_max_priority_fee_per_gas(tip);
    }

    fn strategy_name(&self) -> &'static str {
        "EIP-1559"
    }
}
