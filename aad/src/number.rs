//! The differentiable scalar.
//!
//! A `Number` is a primal value plus the index of its node on the thread's
//! tape. Every operator evaluates eagerly, records a node of the matching
//! arity and stores the local derivatives at the operand primals, so that by
//! propagation time the tape is a flat list of (partials, child adjoint
//! slots) and no control flow needs to be replayed.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::math;
use crate::tape::TAPE;

#[derive(Clone, Copy)]
pub struct Number {
    value: f64,
    node: usize,
}

impl Number {
    /// Put a new independent input on the tape.
    #[inline]
    pub fn new(value: f64) -> Self {
        let node = TAPE.with(|t| t.borrow_mut().record_leaf());
        Number { value, node }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn node(&self) -> usize {
        self.node
    }

    /// Re-register an existing number as a fresh leaf, e.g. after a rewind.
    pub fn put_on_tape(&mut self) {
        self.node = TAPE.with(|t| t.borrow_mut().record_leaf());
    }

    /// ∂(seeded output)/∂self after a propagation.
    #[inline]
    pub fn adjoint(&self) -> f64 {
        TAPE.with(|t| t.borrow().adjoint(self.node))
    }

    /// Multi-output adjoint for output dimension `k`.
    #[inline]
    pub fn adjoint_at(&self, k: usize) -> f64 {
        TAPE.with(|t| t.borrow().adjoint_at(self.node, k))
    }

    /// Seed dimension `k` of this node's adjoint vector.
    pub fn set_adjoint_at(&self, k: usize, value: f64) {
        TAPE.with(|t| t.borrow_mut().set_adjoint_at(self.node, k, value));
    }

    pub fn reset_adjoints() {
        TAPE.with(|t| t.borrow_mut().reset_adjoints());
    }

    /// Seed this node with adjoint 1 and sweep back to the first node.
    pub fn propagate_to_start(&self) {
        TAPE.with(|t| {
            let mut tape = t.borrow_mut();
            tape.set_adjoint(self.node, 1.0);
            tape.propagate(self.node, 0);
        });
    }

    /// Seed this node with adjoint 1 and sweep back to the tape mark.
    pub fn propagate_to_mark(&self) {
        TAPE.with(|t| {
            let mut tape = t.borrow_mut();
            tape.set_adjoint(self.node, 1.0);
            let to = tape.mark_position();
            tape.propagate(self.node, to);
        });
    }

    /// Sweep the shared prefix, from just below the mark to the start.
    pub fn propagate_mark_to_start() {
        TAPE.with(|t| t.borrow_mut().propagate_mark_to_start());
    }

    /* ── recording helpers ──────────────────────────────────────────── */

    #[inline]
    fn unary(arg: &Number, value: f64, der: f64) -> Number {
        let node = TAPE.with(|t| t.borrow_mut().record_unary(arg.node, der));
        Number { value, node }
    }

    #[inline]
    fn binary(lhs: &Number, rhs: &Number, value: f64, lder: f64, rder: f64) -> Number {
        let node = TAPE.with(|t| t.borrow_mut().record_binary(lhs.node, rhs.node, lder, rder));
        Number { value, node }
    }

    /// `self` raised to a constant exponent.
    pub fn powf(self, rhs: f64) -> Number {
        let e = self.value.powf(rhs);
        Number::unary(&self, e, rhs * self.value.powf(rhs - 1.0))
    }
}

/* ── arithmetic ─────────────────────────────────────────────────────── */

impl Add for Number {
    type Output = Number;
    #[inline]
    fn add(self, rhs: Number) -> Number {
        Number::binary(&self, &rhs, self.value + rhs.value, 1.0, 1.0)
    }
}
impl Add<f64> for Number {
    type Output = Number;
    #[inline]
    fn add(self, rhs: f64) -> Number {
        Number::unary(&self, self.value + rhs, 1.0)
    }
}
impl Add<Number> for f64 {
    type Output = Number;
    #[inline]
    fn add(self, rhs: Number) -> Number {
        rhs + self
    }
}

impl Sub for Number {
    type Output = Number;
    #[inline]
    fn sub(self, rhs: Number) -> Number {
        Number::binary(&self, &rhs, self.value - rhs.value, 1.0, -1.0)
    }
}
impl Sub<f64> for Number {
    type Output = Number;
    #[inline]
    fn sub(self, rhs: f64) -> Number {
        Number::unary(&self, self.value - rhs, 1.0)
    }
}
impl Sub<Number> for f64 {
    type Output = Number;
    #[inline]
    fn sub(self, rhs: Number) -> Number {
        Number::unary(&rhs, self - rhs.value, -1.0)
    }
}

impl Mul for Number {
    type Output = Number;
    #[inline]
    fn mul(self, rhs: Number) -> Number {
        Number::binary(&self, &rhs, self.value * rhs.value, rhs.value, self.value)
    }
}
impl Mul<f64> for Number {
    type Output = Number;
    #[inline]
    fn mul(self, rhs: f64) -> Number {
        Number::unary(&self, self.value * rhs, rhs)
    }
}
impl Mul<Number> for f64 {
    type Output = Number;
    #[inline]
    fn mul(self, rhs: Number) -> Number {
        rhs * self
    }
}

impl Div for Number {
    type Output = Number;
    #[inline]
    fn div(self, rhs: Number) -> Number {
        let inv = 1.0 / rhs.value;
        Number::binary(
            &self,
            &rhs,
            self.value * inv,
            inv,
            -self.value * inv * inv,
        )
    }
}
impl Div<f64> for Number {
    type Output = Number;
    #[inline]
    fn div(self, rhs: f64) -> Number {
        Number::unary(&self, self.value / rhs, 1.0 / rhs)
    }
}
impl Div<Number> for f64 {
    type Output = Number;
    #[inline]
    fn div(self, rhs: Number) -> Number {
        Number::unary(&rhs, self / rhs.value, -self / (rhs.value * rhs.value))
    }
}

impl Neg for Number {
    type Output = Number;
    #[inline]
    fn neg(self) -> Number {
        Number::unary(&self, -self.value, -1.0)
    }
}

macro_rules! impl_compound {
    ($Trait:ident, $method:ident, $op:tt) => {
        impl $Trait for Number {
            #[inline]
            fn $method(&mut self, rhs: Number) {
                *self = *self $op rhs;
            }
        }
        impl $Trait<f64> for Number {
            #[inline]
            fn $method(&mut self, rhs: f64) {
                *self = *self $op rhs;
            }
        }
    };
}

impl_compound!(AddAssign, add_assign, +);
impl_compound!(SubAssign, sub_assign, -);
impl_compound!(MulAssign, mul_assign, *);
impl_compound!(DivAssign, div_assign, /);

/* ── unary functions ────────────────────────────────────────────────── */

#[inline]
pub fn exp(arg: Number) -> Number {
    let e = arg.value().exp();
    Number::unary(&arg, e, e)
}

#[inline]
pub fn log(arg: Number) -> Number {
    Number::unary(&arg, arg.value().ln(), 1.0 / arg.value())
}

#[inline]
pub fn sqrt(arg: Number) -> Number {
    let e = arg.value().sqrt();
    Number::unary(&arg, e, 0.5 / e)
}

/// |x|, differentiating as +1 at exactly 0.
#[inline]
pub fn fabs(arg: Number) -> Number {
    let der = if arg.value() >= 0.0 { 1.0 } else { -1.0 };
    Number::unary(&arg, arg.value().abs(), der)
}

#[inline]
pub fn normal_dens(arg: Number) -> Number {
    let e = math::norm_pdf(arg.value());
    Number::unary(&arg, e, -arg.value() * e)
}

#[inline]
pub fn normal_cdf(arg: Number) -> Number {
    Number::unary(&arg, math::norm_cdf(arg.value()), math::norm_pdf(arg.value()))
}

/* ── binary functions ───────────────────────────────────────────────── */

pub fn pow(lhs: Number, rhs: Number) -> Number {
    let e = lhs.value().powf(rhs.value());
    Number::binary(
        &lhs,
        &rhs,
        e,
        rhs.value() * lhs.value().powf(rhs.value() - 1.0),
        e * lhs.value().ln(),
    )
}

/// Ties send the whole derivative to the right operand.
pub fn max(lhs: Number, rhs: Number) -> Number {
    let lmax = lhs.value() > rhs.value();
    let e = if lmax { lhs.value() } else { rhs.value() };
    let (lder, rder) = if lmax { (1.0, 0.0) } else { (0.0, 1.0) };
    Number::binary(&lhs, &rhs, e, lder, rder)
}

/// Ties send the whole derivative to the right operand.
pub fn min(lhs: Number, rhs: Number) -> Number {
    let lmin = lhs.value() < rhs.value();
    let e = if lmin { lhs.value() } else { rhs.value() };
    let (lder, rder) = if lmin { (1.0, 0.0) } else { (0.0, 1.0) };
    Number::binary(&lhs, &rhs, e, lder, rder)
}

/* ── comparisons, conversions, formatting ───────────────────────────── */

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl PartialEq<f64> for Number {
    fn eq(&self, other: &f64) -> bool {
        self.value == *other
    }
}
impl PartialEq<Number> for f64 {
    fn eq(&self, other: &Number) -> bool {
        *self == other.value
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}
impl PartialOrd<f64> for Number {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value.partial_cmp(other)
    }
}
impl PartialOrd<Number> for f64 {
    fn partial_cmp(&self, other: &Number) -> Option<Ordering> {
        self.partial_cmp(&other.value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::new(value)
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Number(node={}, value={})", self.node, self.value)
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}
