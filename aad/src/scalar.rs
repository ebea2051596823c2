//! Numeric bound shared by plain-`f64` pricing and tape-recorded valuation.

use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use crate::number::{self, Number};

/// Scalar type accepted by every generic evaluation routine. Constants enter
/// through `From<f64>`; mixed operations against `f64` are part of the bound
/// so generic code can keep plain constants on the right-hand side.
pub trait Scalar:
    Copy
    + Debug
    + Display
    + PartialEq
    + PartialOrd
    + From<f64>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + Neg<Output = Self>
    + AddAssign
{
    /// The underlying `f64` value (the primal under AAD).
    fn primal(self) -> f64;

    fn ln(self) -> Self;
    fn exp(self) -> Self;
    fn sqrt(self) -> Self;
    fn powf(self, rhs: Self) -> Self;
    fn abs(self) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
}

impl Scalar for f64 {
    #[inline]
    fn primal(self) -> f64 {
        self
    }
    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }
    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }
    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    #[inline]
    fn powf(self, rhs: Self) -> Self {
        f64::powf(self, rhs)
    }
    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }
    #[inline]
    fn min(self, other: Self) -> Self {
        f64::min(self, other)
    }
    #[inline]
    fn max(self, other: Self) -> Self {
        f64::max(self, other)
    }
}

impl Scalar for Number {
    #[inline]
    fn primal(self) -> f64 {
        self.value()
    }
    #[inline]
    fn ln(self) -> Self {
        number::log(self)
    }
    #[inline]
    fn exp(self) -> Self {
        number::exp(self)
    }
    #[inline]
    fn sqrt(self) -> Self {
        number::sqrt(self)
    }
    #[inline]
    fn powf(self, rhs: Self) -> Self {
        number::pow(self, rhs)
    }
    #[inline]
    fn abs(self) -> Self {
        number::fabs(self)
    }
    #[inline]
    fn min(self, other: Self) -> Self {
        number::min(self, other)
    }
    #[inline]
    fn max(self, other: Self) -> Self {
        number::max(self, other)
    }
}
