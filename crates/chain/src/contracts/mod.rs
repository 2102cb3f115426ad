//! Contract bindings for the keeper.
//!
//! Inline `sol!` definitions for every contract the keeper touches:
//! - [`marginly`]: the margin pool (state reads and `reinit`)
//! - [`keeper`]: the per-strategy keeper contracts and the Aave pool
//! - [`common`]: ERC20 and flash-source DEX pools

pub mod common;
pub mod keeper;
pub mod marginly;

pub use common::{IDexPool, IERC20};
pub use keeper::{
    encode_keeper_params, reserve_allows_borrowing, IAaveKeeper, IAavePool, IBalancerKeeper,
    IFlashSwapKeeper, KeeperCallParams,
};
pub use marginly::{IMarginlyPool, Node};
