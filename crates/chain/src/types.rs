//! Plain data read from a Marginly pool.
//!
//! Q96 values are kept as raw `U256` here (suffix `_x96`); the core crate
//! wraps them into its fixed-point type.

use alloy::primitives::{Address, U256};
use std::fmt;

/// Pool operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Regular,
    ShortEmergency,
    LongEmergency,
}

impl Mode {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Regular),
            1 => Some(Self::ShortEmergency),
            2 => Some(Self::LongEmergency),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Regular => "Regular",
            Self::ShortEmergency => "ShortEmergency",
            Self::LongEmergency => "LongEmergency",
        };
        f.write_str(name)
    }
}

/// Position type as stored on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionType {
    Uninitialized,
    Lend,
    Short,
    Long,
}

impl PositionType {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Uninitialized),
            1 => Some(Self::Lend),
            2 => Some(Self::Short),
            3 => Some(Self::Long),
            _ => None,
        }
    }
}

/// Snapshot of a single position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub position_type: PositionType,
    pub heap_position: u32,
    pub discounted_base_amount: U256,
    pub discounted_quote_amount: U256,
}

/// Head of a leverage heap: the riskiest position on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapHead {
    pub account: Address,
    /// Leverage key as maintained by the pool (informational only)
    pub key: U256,
}

/// Pool parameters. Rates are parts-per-million of `WHOLE_ONE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolParameters {
    pub max_leverage: u8,
    pub interest_rate: u32,
    pub fee: u32,
    pub swap_fee: u32,
    pub price_seconds_ago: u32,
    pub mc_slippage: u32,
    pub position_min_amount: U256,
    pub quote_limit: U256,
}

/// Raw Q96 coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoefficientsX96 {
    pub base_collateral: U256,
    pub base_debt: U256,
    pub quote_collateral: U256,
    pub quote_debt: U256,
    pub base_delev: U256,
    pub quote_delev: U256,
}

/// Pool-wide discounted totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolTotals {
    pub discounted_base_collateral: U256,
    pub discounted_base_debt: U256,
    pub discounted_quote_collateral: U256,
    pub discounted_quote_debt: U256,
}

/// Interest multipliers per side (Q96).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemLeverageX96 {
    pub short_x96: U256,
    pub long_x96: U256,
}

/// Everything one risk pass over a pool needs.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pool: Address,
    pub mode: Mode,
    pub params: PoolParameters,
    pub base_price_x96: U256,
    pub coefficients: CoefficientsX96,
    pub totals: PoolTotals,
    pub system_leverage: SystemLeverageX96,
    pub last_reinit_timestamp: u64,
    pub block_timestamp: u64,
    pub base_token: Address,
    pub quote_token: Address,
}

impl PoolSnapshot {
    /// Seconds since the last on-chain reinit, as seen at the latest block.
    pub fn seconds_passed(&self) -> u64 {
        self.block_timestamp.saturating_sub(self.last_reinit_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_id() {
        assert_eq!(Mode::from_id(0), Some(Mode::Regular));
        assert_eq!(Mode::from_id(2), Some(Mode::LongEmergency));
        assert_eq!(Mode::from_id(3), None);
    }

    #[test]
    fn test_position_type_from_id() {
        assert_eq!(PositionType::from_id(2), Some(PositionType::Short));
        assert_eq!(PositionType::from_id(3), Some(PositionType::Long));
        assert_eq!(PositionType::from_id(9), None);
    }
}
