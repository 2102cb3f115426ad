//! Keeper chain interaction layer.
//!
//! This crate provides:
//! - Provider management for the node's HTTP endpoint
//! - Contract bindings for Marginly pools, keeper contracts, Aave, ERC20 and DEX pools
//! - Pool state reads behind the [`PoolStateReader`] seam
//! - Liquidation execution behind the [`StrategyExecutor`] seam
//! - Transaction signing and sending with a local nonce manager
//! - Gas strategy abstraction (Legacy + EIP-1559)

pub mod contracts;
mod error;
mod executor;
pub mod gas;
mod provider;
mod reader;
mod signer;
mod types;

pub use error::{ChainReadError, ExecutionError};
pub use executor::{
    AaveCall, BalancerCall, FlashSwapCall, FlashSwapDex, KeeperContracts, RpcStrategyExecutor,
    StrategyExecutor,
};
pub use provider::ProviderManager;
pub use reader::{PoolStateReader, RpcPoolReader};
pub use signer::{NonceManager, TransactionSender, TransactionSenderBuilder, TxSummary};
pub use types::{
    CoefficientsX96, HeapHead, Mode, PoolParameters, PoolSnapshot, PoolTotals, Position,
    PositionType, SystemLeverageX96,
};
