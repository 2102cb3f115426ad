//! Liquidation execution seam.
//!
//! [`StrategyExecutor`] is everything the dispatcher needs from the chain:
//! availability probes, balance snapshots and the keeper contract calls.
//! [`RpcStrategyExecutor`] implements it against a node with the keeper
//! account's [`TransactionSender`].

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::contracts::{
    reserve_allows_borrowing, IAaveKeeper, IAavePool, IBalancerKeeper, IDexPool,
    IFlashSwapKeeper, IMarginlyPool, IERC20,
};
use crate::error::{ChainReadError, ExecutionError};
use crate::provider::ProviderManager;
use crate::signer::{TransactionSender, TxSummary};

/// Flash-swap DEX family. Both share the keeper ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashSwapDex {
    UniswapV3,
    Algebra,
}

impl FlashSwapDex {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashSwapDex::UniswapV3 => "uniswapV3",
            FlashSwapDex::Algebra => "algebra",
        }
    }
}

/// Arguments of the Aave keeper's `liquidatePosition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AaveCall {
    pub asset: Address,
    pub amount: U256,
    pub referral_code: u16,
    pub params: Bytes,
}

/// Arguments of a flash-swap keeper's `liquidatePosition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashSwapCall {
    pub pool: Address,
    pub amount0: U256,
    pub amount1: U256,
    pub params: Bytes,
}

/// Arguments of the Balancer keeper's `liquidatePosition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancerCall {
    pub asset: Address,
    pub amount: U256,
    pub params: Bytes,
}

/// Chain-side operations used to carry out a liquidation.
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    /// Account that receives liquidation profit.
    fn liquidator(&self) -> Address;

    /// Whether the Aave keeper's lending pool lets us borrow `asset` now.
    async fn is_borrowable(&self, asset: Address) -> Result<bool, ExecutionError>;

    /// `(token0, token1)` of a Uniswap V3 / Algebra pool.
    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address), ExecutionError>;

    /// Liquidator's balance of `token`.
    async fn token_balance(&self, token: Address) -> Result<U256, ExecutionError>;

    /// Liquidator's native balance.
    async fn native_balance(&self) -> Result<U256, ExecutionError>;

    /// Call `reinit()` on a Marginly pool.
    async fn reinit(&self, pool: Address) -> Result<TxSummary, ExecutionError>;

    async fn aave_liquidate(&self, call: &AaveCall) -> Result<TxSummary, ExecutionError>;

    async fn flash_swap_liquidate(
        &self,
        dex: FlashSwapDex,
        call: &FlashSwapCall,
    ) -> Result<TxSummary, ExecutionError>;

    async fn balancer_liquidate(&self, call: &BalancerCall) -> Result<TxSummary, ExecutionError>;
}

/// Keeper contract deployment per strategy. Absent means the strategy is
/// not available on this chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeeperContracts {
    pub aave: Option<Address>,
    pub uniswap_v3: Option<Address>,
    pub algebra: Option<Address>,
    pub balancer: Option<Address>,
}

/// [`StrategyExecutor`] over JSON-RPC.
pub struct RpcStrategyExecutor {
    provider: Arc<ProviderManager>,
    sender: Arc<TransactionSender>,
    keepers: KeeperContracts,
    /// Lending pool behind the Aave keeper, immutable once deployed.
    aave_pool: OnceCell<Address>,
}

impl RpcStrategyExecutor {
    pub fn new(
        provider: Arc<ProviderManager>,
        sender: Arc<TransactionSender>,
        keepers: KeeperContracts,
    ) -> Self {
        Self {
            provider,
            sender,
            keepers,
            aave_pool: OnceCell::new(),
        }
    }

    fn keeper(&self, slot: Option<Address>, name: &'static str) -> Result<Address, ExecutionError> {
        slot.ok_or(ExecutionError::KeeperNotConfigured(name))
    }

    async fn aave_lending_pool(&self) -> Result<Address, ExecutionError> {
        let keeper = self.keeper(self.keepers.aave, "aave")?;
        let pool = self
            .aave_pool
            .get_or_try_init(|| async {
                let provider = self.provider.http();
                let contract = IAaveKeeper::new(keeper, &provider);
                let pool = contract
                    .POOL()
                    .call()
                    .await
                    .map_err(|e| ChainReadError::call(keeper, "POOL", e))?;
                debug!(keeper = %keeper, pool = %pool._0, "Resolved Aave lending pool");
                Ok::<_, ChainReadError>(pool._0)
            })
            .await?;
        Ok(*pool)
    }

    async fn submit(&self, to: Address, calldata: Vec<u8>) -> Result<TxSummary, ExecutionError> {
        self.sender.send_transaction(to, Bytes::from(calldata)).await
    }
}

#[async_trait]
impl StrategyExecutor for RpcStrategyExecutor {
    fn liquidator(&self) -> Address {
        self.sender.address()
    }

    async fn is_borrowable(&self, asset: Address) -> Result<bool, ExecutionError> {
        let lending_pool = self.aave_lending_pool().await?;
        let provider = self.provider.http();
        let pool = IAavePool::new(lending_pool, &provider);
        let config = pool
            .getConfiguration(asset)
            .call()
            .await
            .map_err(|e| ChainReadError::call(lending_pool, "getConfiguration", e))?;
        Ok(reserve_allows_borrowing(config._0.data))
    }

    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address), ExecutionError> {
        let provider = self.provider.http();
        let dex = IDexPool::new(pool, &provider);
        let token0_call = dex.token0();
        let token1_call = dex.token1();
        let (token0, token1) = futures::try_join!(
            async { token0_call.call().await.map_err(|e| ChainReadError::call(pool, "token0", e)) },
            async { token1_call.call().await.map_err(|e| ChainReadError::call(pool, "token1", e)) },
        )?;
        Ok((token0._0, token1._0))
    }

    async fn token_balance(&self, token: Address) -> Result<U256, ExecutionError> {
        let provider = self.provider.http();
        let erc20 = IERC20::new(token, &provider);
        let balance = erc20
            .balanceOf(self.liquidator())
            .call()
            .await
            .map_err(|e| ChainReadError::call(token, "balanceOf", e))?;
        Ok(balance._0)
    }

    async fn native_balance(&self) -> Result<U256, ExecutionError> {
        Ok(self.provider.native_balance(self.liquidator()).await?)
    }

    async fn reinit(&self, pool: Address) -> Result<TxSummary, ExecutionError> {
        info!(pool = %pool, "Submitting reinit");
        self.submit(pool, IMarginlyPool::reinitCall {}.abi_encode()).await
    }

    async fn aave_liquidate(&self, call: &AaveCall) -> Result<TxSummary, ExecutionError> {
        let keeper = self.keeper(self.keepers.aave, "aave")?;
        let calldata = IAaveKeeper::liquidatePositionCall {
            asset: call.asset,
            amount: call.amount,
            referralCode: call.referral_code,
            params: call.params.clone(),
        }
        .abi_encode();
        self.submit(keeper, calldata).await
    }

    async fn flash_swap_liquidate(
        &self,
        dex: FlashSwapDex,
        call: &FlashSwapCall,
    ) -> Result<TxSummary, ExecutionError> {
        let keeper = match dex {
            FlashSwapDex::UniswapV3 => self.keeper(self.keepers.uniswap_v3, "uniswapV3")?,
            FlashSwapDex::Algebra => self.keeper(self.keepers.algebra, "algebra")?,
        };
        let calldata = IFlashSwapKeeper::liquidatePositionCall {
            pool: call.pool,
            amount0: call.amount0,
            amount1: call.amount1,
            params: call.params.clone(),
        }
        .abi_encode();
        self.submit(keeper, calldata).await
    }

    async fn balancer_liquidate(&self, call: &BalancerCall) -> Result<TxSummary, ExecutionError> {
        let keeper = self.keeper(self.keepers.balancer, "balancer")?;
        let calldata = IBalancerKeeper::liquidatePositionCall {
            asset: call.asset,
            amount: call.amount,
            params: call.params.clone(),
        }
        .abi_encode();
        self.submit(keeper, calldata).await
    }
}

impl std::fmt::Debug for RpcStrategyExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcStrategyExecutor")
            .field("liquidator", &self.sender.address())
            .field("keepers", &self.keepers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_swap_calldata_layout() {
        let pool: Address = "0x4444444444444444444444444444444444444444".parse().unwrap();
        let calldata = IFlashSwapKeeper::liquidatePositionCall {
            pool,
            amount0: U256::ZERO,
            amount1: U256::from(2000u64),
            params: Bytes::from(vec![0u8; 32]),
        }
        .abi_encode();

        let decoded = IFlashSwapKeeper::liquidatePositionCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.pool, pool);
        assert_eq!(decoded.amount0, U256::ZERO);
        assert_eq!(decoded.amount1, U256::from(2000u64));
    }

    #[test]
    fn test_reinit_calldata_is_selector_only() {
        let calldata = IMarginlyPool::reinitCall {}.abi_encode();
        assert_eq!(calldata.len(), 4);
        assert_eq!(&calldata[..], &IMarginlyPool::reinitCall::SELECTOR[..]);
    }

    #[test]
    fn test_dex_names() {
        assert_eq!(FlashSwapDex::UniswapV3.as_str(), "uniswapV3");
        assert_eq!(FlashSwapDex::Algebra.as_str(), "algebra");
    }
}
