//! Pool state reads.
//!
//! [`PoolStateReader`] is the read seam between the risk scanner and the
//! node. The RPC implementation fans independent getters out concurrently
//! but never retries and never caches: every pass sees fresh state.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::debug;

use crate::contracts::{IMarginlyPool, IERC20};
use crate::error::ChainReadError;
use crate::provider::ProviderManager;
use crate::types::{
    CoefficientsX96, HeapHead, Mode, PoolParameters, PoolSnapshot, PoolTotals, Position,
    PositionType, SystemLeverageX96,
};

/// Read access to pool and position state.
#[async_trait]
pub trait PoolStateReader: Send + Sync {
    /// Read everything one risk pass needs for `pool`.
    async fn read_pool_snapshot(&self, pool: Address) -> Result<PoolSnapshot, ChainReadError>;

    /// Read a single position.
    async fn read_position(
        &self,
        pool: Address,
        account: Address,
    ) -> Result<Position, ChainReadError>;

    /// Read the head of the short (`short = true`) or long leverage heap.
    /// `None` when the heap is empty.
    async fn read_heap_head(
        &self,
        pool: Address,
        short: bool,
    ) -> Result<Option<HeapHead>, ChainReadError>;

    /// ERC20 decimals of a token.
    async fn token_decimals(&self, token: Address) -> Result<u8, ChainReadError>;
}

/// [`PoolStateReader`] over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcPoolReader {
    provider: Arc<ProviderManager>,
}

impl RpcPoolReader {
    pub fn new(provider: Arc<ProviderManager>) -> Self {
        Self { provider }
    }
}

fn to_u64(value: U256, call: &'static str) -> Result<u64, ChainReadError> {
    u64::try_from(value).map_err(|_| ChainReadError::malformed(call, format!("{value} overflows u64")))
}

#[async_trait]
impl PoolStateReader for RpcPoolReader {
    async fn read_pool_snapshot(&self, pool_address: Address) -> Result<PoolSnapshot, ChainReadError> {
        let provider = self.provider.http();
        let pool = IMarginlyPool::new(pool_address, &provider);
        let err = |call: &'static str| {
            move |e: alloy::contract::Error| ChainReadError::call(pool_address, call, e)
        };

        // Pool state
        let mode_call = pool.mode();
        let params_call = pool.params();
        let price_call = pool.getBasePrice();
        let reinit_call = pool.lastReinitTimestampSeconds();
        let leverage_call = pool.systemLeverage();
        let base_token_call = pool.baseToken();
        let quote_token_call = pool.quoteToken();

        let (mode, params, price, last_reinit, leverage, base_token, quote_token, block_timestamp) =
            futures::try_join!(
                async { mode_call.call().await.map_err(err("mode")) },
                async { params_call.call().await.map_err(err("params")) },
                async { price_call.call().await.map_err(err("getBasePrice")) },
                async { reinit_call.call().await.map_err(err("lastReinitTimestampSeconds")) },
                async { leverage_call.call().await.map_err(err("systemLeverage")) },
                async { base_token_call.call().await.map_err(err("baseToken")) },
                async { quote_token_call.call().await.map_err(err("quoteToken")) },
                self.provider.latest_block_timestamp(),
            )?;

        // Coefficients and totals
        let base_coll_call = pool.baseCollateralCoeff();
        let base_debt_call = pool.baseDebtCoeff();
        let quote_coll_call = pool.quoteCollateralCoeff();
        let quote_debt_call = pool.quoteDebtCoeff();
        let base_delev_call = pool.baseDelevCoeff();
        let quote_delev_call = pool.quoteDelevCoeff();
        let disc_base_coll_call = pool.discountedBaseCollateral();
        let disc_base_debt_call = pool.discountedBaseDebt();
        let disc_quote_coll_call = pool.discountedQuoteCollateral();
        let disc_quote_debt_call = pool.discountedQuoteDebt();

        let (
            base_coll,
            base_debt,
            quote_coll,
            quote_debt,
            base_delev,
            quote_delev,
            disc_base_coll,
            disc_base_debt,
            disc_quote_coll,
            disc_quote_debt,
        ) = futures::try_join!(
            async { base_coll_call.call().await.map_err(err("baseCollateralCoeff")) },
            async { base_debt_call.call().await.map_err(err("baseDebtCoeff")) },
            async { quote_coll_call.call().await.map_err(err("quoteCollateralCoeff")) },
            async { quote_debt_call.call().await.map_err(err("quoteDebtCoeff")) },
            async { base_delev_call.call().await.map_err(err("baseDelevCoeff")) },
            async { quote_delev_call.call().await.map_err(err("quoteDelevCoeff")) },
            async { disc_base_coll_call.call().await.map_err(err("discountedBaseCollateral")) },
            async { disc_base_debt_call.call().await.map_err(err("discountedBaseDebt")) },
            async { disc_quote_coll_call.call().await.map_err(err("discountedQuoteCollateral")) },
            async { disc_quote_debt_call.call().await.map_err(err("discountedQuoteDebt")) },
        )?;

        let mode = Mode::from_id(mode._0)
            .ok_or_else(|| ChainReadError::malformed("mode", format!("unknown mode {}", mode._0)))?;

        let params = PoolParameters {
            max_leverage: params.maxLeverage,
            interest_rate: params.interestRate.to::<u32>(),
            fee: params.fee.to::<u32>(),
            swap_fee: params.swapFee.to::<u32>(),
            price_seconds_ago: params.priceSecondsAgo.to::<u32>(),
            mc_slippage: params.mcSlippage.to::<u32>(),
            position_min_amount: U256::from_limbs_slice(params.positionMinAmount.as_limbs()),
            quote_limit: U256::from_limbs_slice(params.quoteLimit.as_limbs()),
        };

        let snapshot = PoolSnapshot {
            pool: pool_address,
            mode,
            params,
            base_price_x96: price._0.inner,
            coefficients: CoefficientsX96 {
                base_collateral: base_coll.inner,
                base_debt: base_debt.inner,
                quote_collateral: quote_coll.inner,
                quote_debt: quote_debt.inner,
                base_delev: base_delev.inner,
                quote_delev: quote_delev.inner,
            },
            totals: PoolTotals {
                discounted_base_collateral: disc_base_coll._0,
                discounted_base_debt: disc_base_debt._0,
                discounted_quote_collateral: disc_quote_coll._0,
                discounted_quote_debt: disc_quote_debt._0,
            },
            system_leverage: SystemLeverageX96 {
                short_x96: leverage.shortX96,
                long_x96: leverage.longX96,
            },
            last_reinit_timestamp: to_u64(last_reinit._0, "lastReinitTimestampSeconds")?,
            block_timestamp,
            base_token: base_token._0,
            quote_token: quote_token._0,
        };

        debug!(
            pool = %pool_address,
            mode = %snapshot.mode,
            max_leverage = snapshot.params.max_leverage,
            seconds_passed = snapshot.seconds_passed(),
            "Pool snapshot read"
        );

        Ok(snapshot)
    }

    async fn read_position(
        &self,
        pool_address: Address,
        account: Address,
    ) -> Result<Position, ChainReadError> {
        let provider = self.provider.http();
        let pool = IMarginlyPool::new(pool_address, &provider);

        let raw = pool
            .positions(account)
            .call()
            .await
            .map_err(|e| ChainReadError::call(pool_address, "positions", e))?;

        let position_type = PositionType::from_id(raw.positionType).ok_or_else(|| {
            ChainReadError::malformed("positions", format!("unknown position type {}", raw.positionType))
        })?;

        Ok(Position {
            position_type,
            heap_position: raw.heapPosition,
            discounted_base_amount: raw.discountedBaseAmount,
            discounted_quote_amount: raw.discountedQuoteAmount,
        })
    }

    async fn read_heap_head(
        &self,
        pool_address: Address,
        short: bool,
    ) -> Result<Option<HeapHead>, ChainReadError> {
        let provider = self.provider.http();
        let pool = IMarginlyPool::new(pool_address, &provider);

        let raw = pool
            .getHeapPosition(0, short)
            .call()
            .await
            .map_err(|e| ChainReadError::call(pool_address, "getHeapPosition", e))?;

        if !raw.success || raw.node.account.is_zero() {
            return Ok(None);
        }

        Ok(Some(HeapHead {
            account: raw.node.account,
            key: U256::from(raw.node.key.to::<u128>()),
        }))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainReadError> {
        let provider = self.provider.http();
        let erc20 = IERC20::new(token, &provider);
        let decimals = erc20
            .decimals()
            .call()
            .await
            .map_err(|e| ChainReadError::call(token, "decimals", e))?;
        Ok(decimals._0)
    }
}
