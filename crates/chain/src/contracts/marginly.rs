//! Marginly pool interface.
//!
//! Read surface used by the risk scanner plus the `reinit` write call.

use alloy::sol;

sol! {
    /// Q96 fixed-point wrapper as returned by the pool
    #[derive(Debug)]
    struct FixedPoint {
        uint256 inner;
    }

    /// Heap node: leverage key and position owner
    #[derive(Debug)]
    struct Node {
        uint96 key;
        address account;
    }

    #[sol(rpc)]
    interface IMarginlyPool {
        function mode() external view returns (uint8);

        function params() external view returns (
            uint8 maxLeverage,
            uint24 priceSecondsAgo,
            uint24 priceSecondsAgoMC,
            uint24 interestRate,
            uint24 fee,
            uint24 swapFee,
            uint24 mcSlippage,
            uint184 positionMinAmount,
            uint184 quoteLimit
        );

        function getBasePrice() external view returns (FixedPoint memory);

        function baseCollateralCoeff() external view returns (uint256 inner);
        function baseDebtCoeff() external view returns (uint256 inner);
        function quoteCollateralCoeff() external view returns (uint256 inner);
        function quoteDebtCoeff() external view returns (uint256 inner);
        function baseDelevCoeff() external view returns (uint256 inner);
        function quoteDelevCoeff() external view returns (uint256 inner);

        function discountedBaseCollateral() external view returns (uint256);
        function discountedBaseDebt() external view returns (uint256);
        function discountedQuoteCollateral() external view returns (uint256);
        function discountedQuoteDebt() external view returns (uint256);

        function systemLeverage() external view returns (uint256 shortX96, uint256 longX96);

        function lastReinitTimestampSeconds() external view returns (uint256);

        function baseToken() external view returns (address);
        function quoteToken() external view returns (address);

        function positions(address account) external view returns (
            uint8 positionType,
            uint32 heapPosition,
            uint256 discountedBaseAmount,
            uint256 discountedQuoteAmount
        );

        function getHeapPosition(uint32 index, bool short) external view returns (bool success, Node memory node);

        function reinit() external;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_heap_position_encoding() {
        let call = IMarginlyPool::getHeapPositionCall {
            index: 0,
            short: true,
        };
        let encoded = call.abi_encode();
        // selector + two static words
        assert_eq!(encoded.len(), 4 + 64);
        // bool short = true in the last byte of the second word
        assert_eq!(encoded[4 + 63], 1);
    }

    #[test]
    fn test_positions_encoding() {
        let account: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let encoded = IMarginlyPool::positionsCall { account }.abi_encode();
        assert_eq!(encoded.len(), 4 + 32);
        assert_eq!(encoded[4 + 31], 0xaa);
    }

    #[test]
    fn test_reinit_has_no_arguments() {
        let encoded = IMarginlyPool::reinitCall {}.abi_encode();
        assert_eq!(encoded.len(), 4);
    }
}
