//! Payoff scripting for derivatives valuation.
//!
//! Scripts are dated events of assignments, `PAYS` cash-flows, conditionals
//! and loops. Each event parses into an AST which successive visitors index,
//! pre-process and evaluate over market scenarios; evaluation is generic over
//! the scalar, so the same product prices with plain `f64` and differentiates
//! with the tape-recording number from `adkit`.

pub mod nodes;
pub mod parsing;
pub mod prelude;
pub mod products;
pub mod scenario;
pub mod utils;
pub mod visitors;
