//! Marginly keeper core logic.
//!
//! This crate provides:
//! - Q96 fixed-point arithmetic and interest/fee accrual projection
//! - Per-pool risk scan of the riskiest short and long positions
//! - Strategy dispatch to the keeper contracts with `reinit` fallback
//! - The sequential keeper loop with explicit stop token
//! - Pool configuration and runtime settings

pub mod accrual;
pub mod config;
mod dispatcher;
pub mod fp96;
mod keeper;
pub mod retry;
mod risk;

pub use accrual::{accrue, PoolCoefficients};
pub use config::{ConfigError, KeeperConfig, KeeperSettings, PoolConfig, Strategy};
pub use dispatcher::{DispatchOutcome, LiquidationDispatcher};
pub use fp96::{Fp96, MathError, Q96};
pub use keeper::{stop_channel, Keeper, PassSummary, StopHandle, StopToken};
pub use retry::{RetryPolicy, Retryable};
pub use risk::{
    is_breach, leverage_x96, LiquidationParams, RiskScanner, ScanOutcome, Side,
};
