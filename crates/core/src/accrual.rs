//! Interest accrual projection.
//!
//! Pools only update their coefficients on `reinit` or on user actions.
//! The keeper replays the same accrual locally so leverage is judged
//! against what the pool would see if it were touched now.

use alloy::primitives::U256;
use keeper_chain::{CoefficientsX96, PoolParameters, PoolTotals, SystemLeverageX96};

use crate::fp96::{Fp96, MathError};

/// Denominator of parts-per-million pool parameters.
pub const WHOLE_ONE: u64 = 1_000_000;

/// 365.25 days.
pub const SECONDS_IN_YEAR: u64 = 31_557_600;

/// Pool coefficients as fixed-point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCoefficients {
    pub base_collateral: Fp96,
    pub base_debt: Fp96,
    pub quote_collateral: Fp96,
    pub quote_debt: Fp96,
    pub base_delev: Fp96,
    pub quote_delev: Fp96,
}

impl From<CoefficientsX96> for PoolCoefficients {
    fn from(raw: CoefficientsX96) -> Self {
        Self {
            base_collateral: Fp96::from_raw(raw.base_collateral),
            base_debt: Fp96::from_raw(raw.base_debt),
            quote_collateral: Fp96::from_raw(raw.quote_collateral),
            quote_debt: Fp96::from_raw(raw.quote_debt),
            base_delev: Fp96::from_raw(raw.base_delev),
            quote_delev: Fp96::from_raw(raw.quote_delev),
        }
    }
}

/// Per-call constants shared by both sides.
struct Rates {
    seconds_passed: u64,
    seconds_in_year: Fp96,
    interest_rate: Fp96,
    fee_dt: Fp96,
}

impl Rates {
    /// `(1 + interest * leverage / year) ^ seconds`
    fn accrued_rate(&self, leverage_x96: U256) -> Result<Fp96, MathError> {
        self.interest_rate
            .mul(Fp96::from_raw(leverage_x96))?
            .div(self.seconds_in_year)?
            .add(Fp96::one())?
            .pow_taylor(self.seconds_passed)
    }
}

/// Coefficients after `seconds_passed` of interest and fee accrual.
///
/// Zero elapsed time returns `prev` untouched. A side with no collateral,
/// or whose realized collateral nets to zero, keeps its coefficients.
pub fn accrue(
    prev: &PoolCoefficients,
    params: &PoolParameters,
    totals: &PoolTotals,
    system_leverage: &SystemLeverageX96,
    seconds_passed: u64,
) -> Result<PoolCoefficients, MathError> {
    if seconds_passed == 0 {
        return Ok(*prev);
    }

    let whole_one = U256::from(WHOLE_ONE);
    let seconds_in_year = Fp96::from_integer(U256::from(SECONDS_IN_YEAR))?;
    let one_plus_fee = Fp96::from_ratio(U256::from(params.fee), whole_one)?
        .div(seconds_in_year)?
        .add(Fp96::one())?;

    let rates = Rates {
        seconds_passed,
        seconds_in_year,
        interest_rate: Fp96::from_ratio(U256::from(params.interest_rate), whole_one)?,
        fee_dt: one_plus_fee.pow_taylor(seconds_passed)?,
    };

    let mut next = *prev;
    if !totals.discounted_base_collateral.is_zero() {
        accrue_base(&mut next, &rates, totals, system_leverage.short_x96)?;
    }
    if !totals.discounted_quote_collateral.is_zero() {
        accrue_quote(&mut next, &rates, totals, system_leverage.long_x96)?;
    }
    Ok(next)
}

/// Shorts owe base. Base debt grows at the short-leverage rate and the
/// interest is credited to base collateral.
fn accrue_base(
    coeffs: &mut PoolCoefficients,
    rates: &Rates,
    totals: &PoolTotals,
    short_x96: U256,
) -> Result<(), MathError> {
    let real_debt_prev = coeffs.base_debt.mul_uint(totals.discounted_base_debt)?;
    let accrued_rate_dt = rates.accrued_rate(short_x96)?;

    let real_collateral = coeffs
        .base_collateral
        .mul_uint(totals.discounted_base_collateral)?
        .checked_sub(coeffs.base_delev.mul_uint(totals.discounted_quote_debt)?)
        .ok_or(MathError::Underflow)?;
    if real_collateral.is_zero() {
        return Ok(());
    }

    let interest = accrued_rate_dt.sub(Fp96::one())?.mul_uint(real_debt_prev)?;
    let factor = Fp96::one().add(Fp96::from_ratio(interest, real_collateral)?)?;

    coeffs.base_collateral = coeffs.base_collateral.mul(factor)?;
    coeffs.base_delev = coeffs.base_delev.mul(factor)?;
    coeffs.base_debt = coeffs.base_debt.mul(accrued_rate_dt)?.mul(rates.fee_dt)?;
    Ok(())
}

/// Mirror of [`accrue_base`]: longs owe quote at the long-leverage rate.
fn accrue_quote(
    coeffs: &mut PoolCoefficients,
    rates: &Rates,
    totals: &PoolTotals,
    long_x96: U256,
) -> Result<(), MathError> {
    let real_debt_prev = coeffs.quote_debt.mul_uint(totals.discounted_quote_debt)?;
    let accrued_rate_dt = rates.accrued_rate(long_x96)?;

    let real_collateral = coeffs
        .quote_collateral
        .mul_uint(totals.discounted_quote_collateral)?
        .checked_sub(coeffs.quote_delev.mul_uint(totals.discounted_base_debt)?)
        .ok_or(MathError::Underflow)?;
    if real_collateral.is_zero() {
        return Ok(());
    }

    let interest = accrued_rate_dt.sub(Fp96::one())?.mul_uint(real_debt_prev)?;
    let factor = Fp96::one().add(Fp96::from_ratio(interest, real_collateral)?)?;

    coeffs.quote_collateral = coeffs.quote_collateral.mul(factor)?;
    coeffs.quote_delev = coeffs.quote_delev.mul(factor)?;
    coeffs.quote_debt = coeffs.quote_debt.mul(accrued_rate_dt)?.mul(rates.fee_dt)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp96::Q96;

    fn params(interest_rate: u32, fee: u32) -> PoolParameters {
        PoolParameters {
            max_leverage: 20,
            interest_rate,
            fee,
            swap_fee: 1_000,
            price_seconds_ago: 900,
            mc_slippage: 50_000,
            position_min_amount: U256::from(1u8),
            quote_limit: U256::MAX,
        }
    }

    fn unit_coefficients() -> PoolCoefficients {
        PoolCoefficients {
            base_collateral: Fp96::one(),
            base_debt: Fp96::one(),
            quote_collateral: Fp96::one(),
            quote_debt: Fp96::one(),
            base_delev: Fp96::ZERO,
            quote_delev: Fp96::ZERO,
        }
    }

    fn pow10(exp: u64) -> U256 {
        U256::from(10u8).pow(U256::from(exp))
    }

    fn totals() -> PoolTotals {
        PoolTotals {
            discounted_base_collateral: pow10(24),
            discounted_base_debt: pow10(23),
            discounted_quote_collateral: pow10(24),
            discounted_quote_debt: pow10(23),
        }
    }

    fn leverage() -> SystemLeverageX96 {
        SystemLeverageX96 {
            short_x96: Q96 * U256::from(2u8),
            long_x96: Q96 * U256::from(2u8),
        }
    }

    #[test]
    fn test_zero_seconds_is_identity() {
        let prev = unit_coefficients();
        let next = accrue(&prev, &params(100_000, 10_000), &totals(), &leverage(), 0).unwrap();
        assert_eq!(next, prev);
    }

    #[test]
    fn test_debt_coefficient_grows_with_time() {
        let prev = unit_coefficients();
        let p = params(100_000, 10_000);

        let hour = accrue(&prev, &p, &totals(), &leverage(), 3_600).unwrap();
        let day = accrue(&prev, &p, &totals(), &leverage(), 86_400).unwrap();

        assert!(hour.base_debt > prev.base_debt);
        assert!(day.base_debt > hour.base_debt);
        assert!(hour.quote_debt > prev.quote_debt);
        assert!(day.quote_debt > hour.quote_debt);

        // lenders earn the interest
        assert!(day.base_collateral > prev.base_collateral);
        assert!(day.quote_collateral > prev.quote_collateral);
    }

    #[test]
    fn test_collateral_unchanged_without_debt() {
        let prev = unit_coefficients();
        let mut t = totals();
        t.discounted_base_debt = U256::ZERO;

        let next = accrue(&prev, &params(100_000, 0), &t, &leverage(), 3_600).unwrap();
        assert_eq!(next.base_collateral, prev.base_collateral);
        // the coefficient itself still accrues
        assert!(next.base_debt > prev.base_debt);
    }

    #[test]
    fn test_empty_side_skipped() {
        let prev = unit_coefficients();
        let mut t = totals();
        t.discounted_base_collateral = U256::ZERO;

        let next = accrue(&prev, &params(100_000, 10_000), &t, &leverage(), 3_600).unwrap();
        assert_eq!(next.base_collateral, prev.base_collateral);
        assert_eq!(next.base_debt, prev.base_debt);
        assert_eq!(next.base_delev, prev.base_delev);
        assert!(next.quote_debt > prev.quote_debt);
    }

    #[test]
    fn test_zero_realized_collateral_skipped() {
        let mut prev = unit_coefficients();
        prev.base_delev = Fp96::one();
        let t = PoolTotals {
            discounted_base_collateral: U256::from(1_000u64),
            discounted_base_debt: U256::ZERO,
            discounted_quote_collateral: U256::ZERO,
            discounted_quote_debt: U256::from(1_000u64),
        };

        let next = accrue(&prev, &params(100_000, 10_000), &t, &leverage(), 3_600).unwrap();
        assert_eq!(next, prev);
    }

    #[test]
    fn test_matches_contract_replay() {
        let fp = |raw: u128| Fp96::from_raw(U256::from(raw));
        let prev = PoolCoefficients {
            base_collateral: fp(80_020_444_139_406_980_969_479_389_839),
            base_debt: fp(118_842_243_771_396_506_390_315_925_504),
            quote_collateral: fp(85_143_780_563_275_102_946_211_830_142),
            quote_debt: fp(104_218_774_981_726_544_207_339_521_329),
            base_delev: fp(1_237_940_039_285_380_274_899_124),
            quote_delev: fp(3_961_408_125_713_216_879_677_197),
        };
        let t = PoolTotals {
            discounted_base_collateral: pow10(24),
            discounted_base_debt: pow10(23) * U256::from(4u8),
            discounted_quote_collateral: pow10(27) * U256::from(2u8),
            discounted_quote_debt: pow10(26) * U256::from(6u8),
        };
        let lev = SystemLeverageX96 {
            short_x96: Q96 * U256::from(3u8),
            long_x96: Q96 * U256::from(5u8) / U256::from(2u8),
        };

        let next = accrue(&prev, &params(54_000, 10_000), &t, &lev, 25_213).unwrap();

        assert_eq!(next.base_collateral, fp(80_026_654_896_364_053_141_195_977_760));
        assert_eq!(next.base_debt, fp(118_858_576_159_296_999_077_750_806_844));
        assert_eq!(next.quote_collateral, fp(85_147_153_008_995_953_577_197_958_893));
        assert_eq!(next.quote_debt, fp(104_230_849_218_233_598_076_464_734_496));
        assert_eq!(next.base_delev, fp(1_238_036_121_540_285_475_575_432));
        assert_eq!(next.quote_delev, fp(3_961_565_032_463_113_616_596_942));
    }

    #[test]
    fn test_series_out_of_range() {
        let extreme = SystemLeverageX96 {
            short_x96: U256::from(1u8) << 200,
            long_x96: Q96,
        };
        let result = accrue(&unit_coefficients(), &params(100_000, 0), &totals(), &extreme, 60);
        assert_eq!(result, Err(MathError::SeriesOutOfRange));
    }
}
