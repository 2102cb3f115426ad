//! Keeper contract interfaces.
//!
//! Each execution strategy has its own on-chain keeper contract. All of them
//! take the same ABI-encoded [`KeeperCallParams`] blob describing which
//! position to liquidate and the minimum profit to accept.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolValue;

sol! {
    /// Liquidation parameters decoded by every keeper contract
    #[derive(Debug, PartialEq, Eq)]
    struct KeeperCallParams {
        address marginlyPool;
        address positionToLiquidate;
        address liquidator;
        address swapPool;
        uint256 minProfit;
        uint256 swapCallData;
    }

    /// Aave flash-loan keeper
    #[sol(rpc)]
    interface IAaveKeeper {
        function POOL() external view returns (address);

        function liquidatePosition(
            address asset,
            uint256 amount,
            uint16 referralCode,
            bytes calldata params
        ) external;
    }

    /// Uniswap V3 / Algebra flash-swap keeper
    #[sol(rpc)]
    interface IFlashSwapKeeper {
        function liquidatePosition(
            address pool,
            uint256 amount0,
            uint256 amount1,
            bytes calldata params
        ) external;
    }

    /// Balancer vault flash-loan keeper
    #[sol(rpc)]
    interface IBalancerKeeper {
        function liquidatePosition(
            address asset,
            uint256 amount,
            bytes calldata params
        ) external;
    }

    /// Aave reserve configuration bitmap
    #[derive(Debug)]
    struct ReserveConfigurationMap {
        uint256 data;
    }

    /// Aave V3 pool (subset)
    #[sol(rpc)]
    interface IAavePool {
        function getConfiguration(address asset) external view returns (ReserveConfigurationMap memory);
    }
}

/// Aave reserve configuration bit positions.
pub mod reserve_flags {
    pub const ACTIVE_BIT: usize = 56;
    pub const FROZEN_BIT: usize = 57;
    pub const BORROWING_ENABLED_BIT: usize = 58;
    pub const PAUSED_BIT: usize = 60;
}

/// Whether an Aave reserve currently lets the keeper borrow the asset.
pub fn reserve_allows_borrowing(configuration: U256) -> bool {
    use reserve_flags::*;
    configuration.bit(ACTIVE_BIT)
        && !configuration.bit(FROZEN_BIT)
        && !configuration.bit(PAUSED_BIT)
        && configuration.bit(BORROWING_ENABLED_BIT)
}

/// ABI-encode the keeper params blob.
pub fn encode_keeper_params(
    marginly_pool: Address,
    position: Address,
    liquidator: Address,
    swap_pool: Address,
    min_profit: U256,
    swap_call_data: U256,
) -> Bytes {
    let params = KeeperCallParams {
        marginlyPool: marginly_pool,
        positionToLiquidate: position,
        liquidator,
        swapPool: swap_pool,
        minProfit: min_profit,
        swapCallData: swap_call_data,
    };
    Bytes::from(params.abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    #[test]
    fn test_keeper_params_roundtrip() {
        let pool: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let position: Address = "0x2222222222222222222222222222222222222222".parse().unwrap();
        let liquidator: Address = "0x3333333333333333333333333333333333333333".parse().unwrap();

        let encoded = encode_keeper_params(
            pool,
            position,
            liquidator,
            Address::ZERO,
            U256::from(5u64),
            U256::from(42u64),
        );
        // six static words
        assert_eq!(encoded.len(), 6 * 32);

        let decoded = KeeperCallParams::abi_decode(&encoded, true).unwrap();
        assert_eq!(decoded.marginlyPool, pool);
        assert_eq!(decoded.positionToLiquidate, position);
        assert_eq!(decoded.minProfit, U256::from(5u64));
        assert_eq!(decoded.swapCallData, U256::from(42u64));
    }

    #[test]
    fn test_reserve_flags() {
        let active = U256::from(1u64) << 56;
        let borrowing = U256::from(1u64) << 58;
        let frozen = U256::from(1u64) << 57;
        let paused = U256::from(1u64) << 60;

        assert!(reserve_allows_borrowing(active | borrowing));
        assert!(!reserve_allows_borrowing(borrowing));
        assert!(!reserve_allows_borrowing(active));
        assert!(!reserve_allows_borrowing(active | borrowing | frozen));
        assert!(!reserve_allows_borrowing(active | borrowing | paused));
    }
}
