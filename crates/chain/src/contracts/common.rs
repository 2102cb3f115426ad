//! Common contract interfaces shared across strategies.
//!
//! ERC20 for balance snapshots and decimals, and the minimal DEX pool
//! surface used to match flash-loan sources against the liquidation asset.

use alloy::sol;

// ERC20 interface for token interactions
sol! {
    /// Standard ERC20 interface (subset for keeper needs)
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

// Uniswap V3 and Algebra pools expose the same token getters
sol! {
    /// Flash-loan source pool (Uniswap V3 / Algebra)
    #[sol(rpc)]
    interface IDexPool {
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_common_selectors() {
        // balanceOf(address): 70a08231
        assert_eq!(hex::encode(IERC20::balanceOfCall::SELECTOR), "70a08231");
        // decimals(): 313ce567
        assert_eq!(hex::encode(IERC20::decimalsCall::SELECTOR), "313ce567");
        // token0(): 0dfe1681
        assert_eq!(hex::encode(IDexPool::token0Call::SELECTOR), "0dfe1681");
        // token1(): d21220a7
        assert_eq!(hex::encode(IDexPool::token1Call::SELECTOR), "d21220a7");
    }
}
