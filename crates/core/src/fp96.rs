//! Q96 fixed-point arithmetic matching the Marginly contracts.
//!
//! Every product or quotient goes through [`mul_div`] with a 512-bit
//! intermediate and floor rounding, so keeper-side projections of pool
//! coefficients agree with on-chain values bit for bit.

use alloy::primitives::{U256, U512};

/// 2^96
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// Arithmetic failure in fixed-point math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("result overflows 256 bits")]
    Overflow,
    #[error("subtraction underflow")]
    Underflow,
    /// `pow_taylor` base outside `[1, 2)`; the truncated series is invalid there.
    #[error("taylor series base out of range")]
    SeriesOutOfRange,
}

/// `floor(a * b / denominator)` with a full-width intermediate.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = U512::from_limbs_slice(a.as_limbs()) * U512::from_limbs_slice(b.as_limbs());
    let quotient = product / U512::from_limbs_slice(denominator.as_limbs());

    let limbs = quotient.as_limbs();
    if limbs[4..].iter().any(|&limb| limb != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from_limbs_slice(&limbs[..4]))
}

/// Unsigned value scaled by 2^96.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fp96(U256);

impl Fp96 {
    pub const ZERO: Fp96 = Fp96(U256::ZERO);
    pub const ONE: Fp96 = Fp96(Q96);

    /// Wrap an already-scaled value (as returned by the contracts).
    #[inline]
    pub const fn from_raw(inner: U256) -> Self {
        Self(inner)
    }

    /// Underlying scaled value.
    #[inline]
    pub const fn raw(self) -> U256 {
        self.0
    }

    #[inline]
    pub fn one() -> Self {
        Self::ONE
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `n << 96`
    pub fn from_integer(n: U256) -> Result<Self, MathError> {
        n.checked_mul(Q96).map(Self).ok_or(MathError::Overflow)
    }

    /// `a / b` as a fixed-point number.
    pub fn from_ratio(numerator: U256, denominator: U256) -> Result<Self, MathError> {
        mul_div(Q96, numerator, denominator).map(Self)
    }

    pub fn add(self, other: Fp96) -> Result<Fp96, MathError> {
        self.0.checked_add(other.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn sub(self, other: Fp96) -> Result<Fp96, MathError> {
        self.0.checked_sub(other.0).map(Self).ok_or(MathError::Underflow)
    }

    pub fn mul(self, other: Fp96) -> Result<Fp96, MathError> {
        mul_div(self.0, other.0, Q96).map(Self)
    }

    pub fn div(self, other: Fp96) -> Result<Fp96, MathError> {
        mul_div(self.0, Q96, other.0).map(Self)
    }

    /// `self * x` as a plain integer.
    pub fn mul_uint(self, x: U256) -> Result<U256, MathError> {
        mul_div(self.0, x, Q96)
    }

    /// `self^n` for `self` in `[1, 2)` using the first three Taylor terms
    /// of `(1 + x)^n`. Floor rounding at every step, like the contract.
    pub fn pow_taylor(self, n: u64) -> Result<Fp96, MathError> {
        let x = self.0.checked_sub(Q96).ok_or(MathError::SeriesOutOfRange)?;
        if x >= Q96 {
            return Err(MathError::SeriesOutOfRange);
        }

        let exponent = U256::from(n);
        let mut result = Q96;
        let mut term = Q96;
        for i in 0..n.min(3) {
            let i = U256::from(i);
            let multiplier = (exponent - i)
                .checked_mul(x)
                .ok_or(MathError::Overflow)?
                / (i + U256::from(1u8));
            term = term.checked_mul(multiplier).ok_or(MathError::Overflow)? / Q96;
            result = result.checked_add(term).ok_or(MathError::Overflow)?;
        }
        Ok(Self(result))
    }
}

impl std::fmt::Display for Fp96 {
    /// Approximate decimal rendering, for logs only.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let integer: U256 = self.0 >> 96usize;
        let fraction: U256 = self.0 - (integer << 96usize);
        let scaled: U256 = (fraction * U256::from(1_000_000u64)) >> 96usize;
        let millionths = scaled.to::<u64>();
        write!(f, "{integer}.{millionths:06}")
    }
}
