//! Per-pool risk scan.
//!
//! One scan reads a pool snapshot, projects coefficients forward to the
//! current block, then checks the riskiest short and long positions (the
//! heads of the pool's leverage heaps) against `maxLeverage`.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use keeper_chain::{
    ChainReadError, HeapHead, Mode, PoolSnapshot, PoolStateReader, Position, PositionType,
};
use smallvec::SmallVec;
use tracing::{debug, error, info, instrument, warn};

use crate::accrual::{accrue, PoolCoefficients};
use crate::config::PoolConfig;
use crate::fp96::{mul_div, Fp96, MathError, Q96};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Short,
    Long,
}

impl Side {
    fn is_short(self) -> bool {
        matches!(self, Side::Short)
    }

    fn position_type(self) -> PositionType {
        match self {
            Side::Short => PositionType::Short,
            Side::Long => PositionType::Long,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Short => "short",
            Side::Long => "long",
        })
    }
}

/// A breached position and what it takes to liquidate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationParams {
    pub pool: Address,
    pub position: Address,
    pub side: Side,
    /// Token the keeper must borrow to repay the debt
    pub asset: Address,
    /// Debt to repay, in `asset` units
    pub amount: U256,
    pub is_quote_asset: bool,
    /// Minimum profit in `asset` units
    pub min_profit: U256,
    pub leverage_x96: U256,
}

/// Result of scanning one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Pool is in emergency mode; nothing to do here.
    Emergency(Mode),
    /// Breaches found, short side first. Possibly empty.
    Candidates(SmallVec<[LiquidationParams; 2]>),
}

impl ScanOutcome {
    pub fn candidates(&self) -> &[LiquidationParams] {
        match self {
            ScanOutcome::Emergency(_) => &[],
            ScanOutcome::Candidates(c) => c,
        }
    }
}

/// Real collateral and debt of a position, both in quote units, plus the
/// debt in its own token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exposure {
    pub collateral: U256,
    pub debt: U256,
    pub amount: U256,
}

/// Short: quote collateral against base debt valued at `base_price`.
pub fn short_exposure(
    coeffs: &PoolCoefficients,
    base_price: Fp96,
    position: &Position,
) -> Result<Exposure, MathError> {
    let discounted_base = position.discounted_base_amount;
    let discounted_quote = position.discounted_quote_amount;

    let collateral = coeffs
        .quote_collateral
        .mul_uint(discounted_quote)?
        .saturating_sub(coeffs.quote_delev.mul_uint(discounted_base)?);
    let debt = coeffs.base_debt.mul(base_price)?.mul_uint(discounted_base)?;
    let amount = coeffs.base_debt.mul_uint(discounted_base)?;

    Ok(Exposure { collateral, debt, amount })
}

/// Long: base collateral valued at `base_price` against quote debt.
pub fn long_exposure(
    coeffs: &PoolCoefficients,
    base_price: Fp96,
    position: &Position,
) -> Result<Exposure, MathError> {
    let discounted_base = position.discounted_base_amount;
    let discounted_quote = position.discounted_quote_amount;

    let real_base = coeffs
        .base_collateral
        .mul_uint(discounted_base)?
        .saturating_sub(coeffs.base_delev.mul_uint(discounted_quote)?);
    let collateral = base_price.mul_uint(real_base)?;
    let debt = coeffs.quote_debt.mul_uint(discounted_quote)?;

    Ok(Exposure {
        collateral,
        debt,
        amount: debt,
    })
}

/// `collateral / (collateral - debt)` scaled by 2^96. Unbounded (MAX) once
/// debt reaches collateral.
pub fn leverage_x96(collateral: U256, debt: U256) -> Result<U256, MathError> {
    if collateral <= debt {
        return Ok(U256::MAX);
    }
    mul_div(Q96, collateral, collateral - debt)
}

/// Strictly above the pool's max leverage.
pub fn is_breach(leverage_x96: U256, max_leverage: u8) -> bool {
    leverage_x96 > U256::from(max_leverage) << 96
}

fn leverage_display(leverage_x96: U256) -> String {
    if leverage_x96 == U256::MAX {
        "inf".to_string()
    } else {
        Fp96::from_raw(leverage_x96).to_string()
    }
}

/// Scans pools for over-leveraged positions.
pub struct RiskScanner {
    reader: Arc<dyn PoolStateReader>,
    retry: RetryPolicy,
}

impl RiskScanner {
    pub fn new(reader: Arc<dyn PoolStateReader>, retry: RetryPolicy) -> Self {
        Self { reader, retry }
    }

    /// Scan one pool. Errors only when a read keeps failing after retries.
    #[instrument(skip(self, pool), fields(pool = %pool.address))]
    pub async fn scan(&self, pool: &PoolConfig) -> Result<ScanOutcome, ChainReadError> {
        let address = pool.address;
        let snapshot = self
            .retry
            .run("read_pool_snapshot", || self.reader.read_pool_snapshot(address))
            .await?;

        if snapshot.mode != Mode::Regular {
            info!(pool = %address, mode = %snapshot.mode, "Pool in emergency mode, skipping");
            return Ok(ScanOutcome::Emergency(snapshot.mode));
        }

        let coeffs = self.current_coefficients(&snapshot);
        let base_price = Fp96::from_raw(snapshot.base_price_x96);

        let mut candidates = SmallVec::new();
        for side in [Side::Short, Side::Long] {
            if let Some(params) = self.check_side(pool, &snapshot, &coeffs, base_price, side).await? {
                candidates.push(params);
            }
        }

        debug!(pool = %address, candidates = candidates.len(), "Scan complete");
        Ok(ScanOutcome::Candidates(candidates))
    }

    /// Coefficients as of the current block. Falls back to the on-chain
    /// values when the projection fails.
    fn current_coefficients(&self, snapshot: &PoolSnapshot) -> PoolCoefficients {
        let stored = PoolCoefficients::from(snapshot.coefficients);
        let seconds_passed = snapshot.seconds_passed();

        debug!(
            pool = %snapshot.pool,
            last_reinit = %chrono::DateTime::from_timestamp(snapshot.last_reinit_timestamp as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            seconds_passed = seconds_passed,
            "Projecting coefficients"
        );

        match accrue(
            &stored,
            &snapshot.params,
            &snapshot.totals,
            &snapshot.system_leverage,
            seconds_passed,
        ) {
            Ok(coeffs) => coeffs,
            Err(e) => {
                error!(
                    pool = %snapshot.pool,
                    seconds_passed = seconds_passed,
                    error = %e,
                    "Coefficient projection failed, using on-chain coefficients"
                );
                stored
            }
        }
    }

    async fn check_side(
        &self,
        pool: &PoolConfig,
        snapshot: &PoolSnapshot,
        coeffs: &PoolCoefficients,
        base_price: Fp96,
        side: Side,
    ) -> Result<Option<LiquidationParams>, ChainReadError> {
        let address = pool.address;
        let head: Option<HeapHead> = self
            .retry
            .run("read_heap_head", || self.reader.read_heap_head(address, side.is_short()))
            .await?;
        let Some(head) = head else {
            debug!(pool = %address, side = %side, "Heap empty");
            return Ok(None);
        };

        let position = self
            .retry
            .run("read_position", || self.reader.read_position(address, head.account))
            .await?;
        if position.position_type != side.position_type() {
            warn!(
                pool = %address,
                position = %head.account,
                side = %side,
                position_type = ?position.position_type,
                "Heap head has unexpected position type"
            );
            return Ok(None);
        }

        let evaluated = match side {
            Side::Short => short_exposure(coeffs, base_price, &position),
            Side::Long => long_exposure(coeffs, base_price, &position),
        }
        .and_then(|exposure| Ok((exposure, leverage_x96(exposure.collateral, exposure.debt)?)));

        let (exposure, leverage) = match evaluated {
            Ok(v) => v,
            Err(e) => {
                error!(
                    pool = %address,
                    position = %head.account,
                    side = %side,
                    error = %e,
                    "Leverage computation failed"
                );
                return Ok(None);
            }
        };

        let max_leverage = snapshot.params.max_leverage;
        if !is_breach(leverage, max_leverage) {
            debug!(
                pool = %address,
                position = %head.account,
                side = %side,
                leverage = %leverage_display(leverage),
                max_leverage = max_leverage,
                "Within max leverage"
            );
            return Ok(None);
        }

        let (asset, is_quote_asset, min_profit) = match side {
            Side::Short => (snapshot.base_token, false, pool.min_profit_base),
            Side::Long => (snapshot.quote_token, true, pool.min_profit_quote),
        };

        info!(
            pool = %address,
            position = %head.account,
            side = %side,
            leverage = %leverage_display(leverage),
            max_leverage = max_leverage,
            collateral = %exposure.collateral,
            debt = %exposure.debt,
            amount = %exposure.amount,
            "Max leverage breached"
        );

        Ok(Some(LiquidationParams {
            pool: address,
            position: head.account,
            side,
            asset,
            amount: exposure.amount,
            is_quote_asset,
            min_profit,
            leverage_x96: leverage,
        }))
    }
}
