//! Liquidation dispatch.
//!
//! Turns a breach into a keeper contract call according to the pool's
//! configured [`Strategy`]. When the strategy cannot run right now (Aave
//! reserve not borrowable, no flash pool holding the asset) the pool is
//! `reinit`ed instead, which lets it liquidate its worst positions itself.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use keeper_chain::contracts::encode_keeper_params;
use keeper_chain::{
    AaveCall, BalancerCall, ExecutionError, FlashSwapCall, FlashSwapDex, StrategyExecutor,
    TxSummary,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{PoolConfig, Strategy};
use crate::retry::RetryPolicy;
use crate::risk::LiquidationParams;

/// Aave referral code; the keeper has none.
const AAVE_REFERRAL_CODE: u16 = 0;

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Strategy actually executed
    pub strategy_used: &'static str,
    /// The configured strategy was unavailable and `reinit` ran instead
    pub fell_back: bool,
    pub tx_hash: B256,
    /// Growth of the liquidator's `asset` balance. `None` for `reinit` or
    /// when balances could not be read.
    pub profit: Option<U256>,
    /// Native currency spent, in wei. The keeper account's balance delta
    /// for flash liquidations, the receipt's gas cost otherwise.
    pub gas_spent: U256,
}

/// Balances around a flash liquidation.
#[derive(Debug, Clone, Copy)]
struct BalanceSnapshot {
    asset: U256,
    native: U256,
}

/// Executes liquidations through the configured strategy.
pub struct LiquidationDispatcher {
    executor: Arc<dyn StrategyExecutor>,
    retry: RetryPolicy,
}

impl LiquidationDispatcher {
    pub fn new(executor: Arc<dyn StrategyExecutor>, retry: RetryPolicy) -> Self {
        Self { executor, retry }
    }

    /// Liquidate `params` in `pool`. Reverts and unconfirmed broadcasts are
    /// logged and returned, never retried.
    #[instrument(
        skip(self, pool, params),
        fields(pool = %pool.address, position = %params.position, strategy = %pool.strategy)
    )]
    pub async fn dispatch(
        &self,
        pool: &PoolConfig,
        params: &LiquidationParams,
    ) -> Result<DispatchOutcome, ExecutionError> {
        info!(
            pool = %pool.address,
            position = %params.position,
            side = %params.side,
            asset = %params.asset,
            amount = %params.amount,
            min_profit = %params.min_profit,
            "Dispatching liquidation"
        );

        let result = match &pool.strategy {
            Strategy::Reinit => self.reinit(pool.address, false).await,
            Strategy::Aave => self.aave(pool, params).await,
            Strategy::UniswapV3 { pools } => {
                self.flash_swap(FlashSwapDex::UniswapV3, pools, pool, params).await
            }
            Strategy::Algebra { pools } => {
                self.flash_swap(FlashSwapDex::Algebra, pools, pool, params).await
            }
            Strategy::Balancer => self.balancer(pool, params).await,
        };

        match &result {
            Ok(outcome) => info!(
                pool = %pool.address,
                position = %params.position,
                strategy = outcome.strategy_used,
                fell_back = outcome.fell_back,
                tx_hash = %outcome.tx_hash,
                profit = %outcome.profit.map(|p| p.to_string()).unwrap_or_else(|| "n/a".into()),
                gas_spent = %outcome.gas_spent,
                "Liquidation dispatched"
            ),
            Err(e @ ExecutionError::Reverted { .. }) => warn!(
                pool = %pool.address,
                position = %params.position,
                error = %e,
                "Liquidation reverted, candidate abandoned for this pass"
            ),
            Err(ExecutionError::Unconfirmed { tx_hash, reason }) => error!(
                pool = %pool.address,
                position = %params.position,
                tx_hash = %tx_hash,
                reason = %reason,
                "Liquidation broadcast but unconfirmed, not resubmitting"
            ),
            Err(e) => error!(
                pool = %pool.address,
                position = %params.position,
                error = %e,
                "Liquidation failed"
            ),
        }

        result
    }

    async fn reinit(&self, pool: Address, fell_back: bool) -> Result<DispatchOutcome, ExecutionError> {
        let receipt = self.retry.run("reinit", || self.executor.reinit(pool)).await?;
        Ok(outcome("reinit", fell_back, &receipt, None))
    }

    async fn aave(
        &self,
        pool: &PoolConfig,
        params: &LiquidationParams,
    ) -> Result<DispatchOutcome, ExecutionError> {
        let borrowable = self
            .retry
            .run("is_borrowable", || self.executor.is_borrowable(params.asset))
            .await?;
        if !borrowable {
            info!(asset = %params.asset, "Asset not borrowable on Aave, falling back to reinit");
            return self.reinit(pool.address, true).await;
        }

        let call = AaveCall {
            asset: params.asset,
            amount: params.amount,
            referral_code: AAVE_REFERRAL_CODE,
            params: self.keeper_params(pool, params),
        };
        self.measured("aave", params.asset, || self.executor.aave_liquidate(&call))
            .await
    }

    async fn flash_swap(
        &self,
        dex: FlashSwapDex,
        flash_pools: &[Address],
        pool: &PoolConfig,
        params: &LiquidationParams,
    ) -> Result<DispatchOutcome, ExecutionError> {
        let Some((flash_pool, amount0, amount1)) =
            self.find_flash_pool(flash_pools, params.asset, params.amount).await
        else {
            info!(
                asset = %params.asset,
                dex = dex.as_str(),
                "No flash pool holds the asset, falling back to reinit"
            );
            return self.reinit(pool.address, true).await;
        };

        let call = FlashSwapCall {
            pool: flash_pool,
            amount0,
            amount1,
            params: self.keeper_params(pool, params),
        };
        self.measured(dex.as_str(), params.asset, || {
            self.executor.flash_swap_liquidate(dex, &call)
        })
        .await
    }

    async fn balancer(
        &self,
        pool: &PoolConfig,
        params: &LiquidationParams,
    ) -> Result<DispatchOutcome, ExecutionError> {
        let call = BalancerCall {
            asset: params.asset,
            amount: params.amount,
            params: self.keeper_params(pool, params),
        };
        self.measured("balancer", params.asset, || self.executor.balancer_liquidate(&call))
            .await
    }

    /// First pool whose token0 or token1 is `asset`, with the amounts to
    /// borrow on each side. Pools whose tokens cannot be read are skipped.
    async fn find_flash_pool(
        &self,
        flash_pools: &[Address],
        asset: Address,
        amount: U256,
    ) -> Option<(Address, U256, U256)> {
        for &candidate in flash_pools {
            let (token0, token1) = match self
                .retry
                .run("pool_tokens", || self.executor.pool_tokens(candidate))
                .await
            {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(
                        flash_pool = %candidate,
                        error = %e,
                        "Cannot read flash pool tokens, skipping"
                    );
                    continue;
                }
            };
            if token0 == asset {
                debug!(flash_pool = %candidate, "Asset is token0");
                return Some((candidate, amount, U256::ZERO));
            }
            if token1 == asset {
                debug!(flash_pool = %candidate, "Asset is token1");
                return Some((candidate, U256::ZERO, amount));
            }
        }
        None
    }

    fn keeper_params(&self, pool: &PoolConfig, params: &LiquidationParams) -> alloy::primitives::Bytes {
        encode_keeper_params(
            pool.address,
            params.position,
            self.executor.liquidator(),
            pool.swap_pool,
            params.min_profit,
            pool.swap_call_data,
        )
    }

    /// Run a flash liquidation and measure what it earned.
    async fn measured<F, Fut>(
        &self,
        strategy: &'static str,
        asset: Address,
        submit: F,
    ) -> Result<DispatchOutcome, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<TxSummary, ExecutionError>>,
    {
        let before = self.balances(asset).await;
        let receipt = self.retry.run(strategy, submit).await?;
        let after = self.balances(asset).await;

        let mut dispatched = outcome(strategy, false, &receipt, None);
        if let (Some(before), Some(after)) = (before, after) {
            if after.asset < before.asset {
                warn!(
                    asset = %asset,
                    before = %before.asset,
                    after = %after.asset,
                    "Asset balance decreased after liquidation"
                );
            }
            let native_spent = before.native.saturating_sub(after.native);
            info!(
                native_spent = %native_spent,
                receipt_gas_cost = %dispatched.gas_spent,
                "Native balance delta around liquidation"
            );
            dispatched.profit = Some(after.asset.saturating_sub(before.asset));
            dispatched.gas_spent = native_spent;
        }

        Ok(dispatched)
    }

    async fn balances(&self, asset: Address) -> Option<BalanceSnapshot> {
        let read = async {
            let asset_balance = self.executor.token_balance(asset).await?;
            let native = self.executor.native_balance().await?;
            Ok::<_, ExecutionError>(BalanceSnapshot {
                asset: asset_balance,
                native,
            })
        };
        match read.await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(asset = %asset, error = %e, "Balance snapshot failed");
                None
            }
        }
    }
}

fn outcome(
    strategy_used: &'static str,
    fell_back: bool,
    receipt: &TxSummary,
    profit: Option<U256>,
) -> DispatchOutcome {
    DispatchOutcome {
        strategy_used,
        fell_back,
        tx_hash: receipt.tx_hash,
        profit,
        gas_spent: receipt.gas_spent(),
    }
}
